use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use constjump::commands::{list_resolvers_command, propagate_command, resolve_command};
use constjump::logging::{level_for, AppLogger};

/// Indirect jump resolution by constant propagation.
///
/// This CLI is a thin wrapper around `constjump-core`. Programs are read as
/// already-lifted JSON or YAML fixtures.
#[derive(Parser, Debug)]
#[command(name = "constjump", version, about = "Resolve indirect jumps by constant propagation")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Offer every indirect jump of a program to the resolver chain.
    ///
    /// Prints a summary per jump, or the full recovery report with `--json`.
    Resolve {
        /// Lifted program (.json, or YAML for any other extension).
        #[arg(long)]
        program: String,

        /// Resolver config (.json, or YAML). Defaults are used when omitted.
        #[arg(long)]
        config: Option<String>,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Show the constant replacements computed for one function.
    Propagate {
        /// Lifted program (.json, or YAML for any other extension).
        #[arg(long)]
        program: String,

        /// Function entry address (0x-prefixed hex or decimal).
        #[arg(long)]
        function: String,

        /// Resolver config supplying the propagation limits.
        #[arg(long)]
        config: Option<String>,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// List the configured resolver chain.
    Resolvers {
        /// Resolver config (.json, or YAML). Defaults are used when omitted.
        #[arg(long)]
        config: Option<String>,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let logger = AppLogger::init();
    logger.set_level(level_for(cli.verbose, cli.quiet));
    if log::set_logger(logger).is_err() {
        eprintln!("warning: a logger was already installed");
    }

    match cli.command {
        Command::Resolve { program, config, json } => {
            resolve_command(&program, config.as_deref(), json)?
        }
        Command::Propagate { program, function, config, json } => {
            propagate_command(&program, &function, config.as_deref(), json)?
        }
        Command::Resolvers { config, json } => list_resolvers_command(config.as_deref(), json)?,
    }

    Ok(())
}
