pub mod propagate;
pub mod resolve;
pub mod resolvers;
pub mod util;

pub use propagate::*;
pub use resolve::*;
pub use resolvers::*;
pub use util::*;
