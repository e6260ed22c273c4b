pub mod recovery;
pub mod resolvers;
