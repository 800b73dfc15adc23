mod commands;
mod config;
mod error;

use std::path::PathBuf;

use clap::Parser;
use clap_verbosity_flag::{Verbosity, WarnLevel};
use tessera_rt::{BootstrapStack, Runtime};

use crate::config::CliConfig;
use crate::error::CliError;

#[derive(Parser, Debug)]
#[command(name = "tessera")]
#[command(about = "Tessera runtime thread and stack inspection tool", long_about = None)]
struct Args {
    /// Runtime config file (TOML with a [runtime] table)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    verbose: Verbosity<WarnLevel>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Spawn threads that return their index and join them in order
    Spawn {
        /// Number of threads to spawn
        #[arg(short = 'n', long, value_name = "N", default_value_t = 4)]
        count: usize,
        /// Stack size of each spawned thread, in bytes
        #[arg(long, value_name = "BYTES")]
        stack_size: Option<usize>,
    },

    /// Probe the main thread's stack and compare it with the OS-reported bounds
    Probe,

    /// List the live thread objects of the runtime
    Threads {
        /// Extra threads to keep parked while listing
        #[arg(short = 'n', long, value_name = "N", default_value_t = 2)]
        parked: usize,
    },
}

fn main() -> miette::Result<()> {
    let args = Args::parse();
    env_logger::Builder::new()
        .filter_level(args.verbose.log_level_filter())
        .init();

    run(args)?;
    Ok(())
}

fn run(args: Args) -> Result<(), CliError> {
    let mut config = CliConfig::runtime_config(args.config.as_deref())?;
    match &args.command {
        Command::Spawn {
            stack_size: Some(stack_size),
            ..
        } => config.stack_size = *stack_size,
        Command::Probe => config.bootstrap_stack = BootstrapStack::Probe,
        _ => {}
    }

    // Bootstrapping happens here, on the process's original thread, before
    // anything is spawned.
    let runtime = Runtime::init(config)?;
    let result = match args.command {
        Command::Spawn { count, .. } => commands::spawn::handle_spawn(&runtime, count),
        Command::Probe => commands::probe::handle_probe(&runtime),
        Command::Threads { parked } => commands::threads::handle_threads(&runtime, parked),
    };
    runtime.shutdown();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn spawn_flags_parse() {
        let args = Args::parse_from(["tessera", "spawn", "-n", "10", "--stack-size", "2097152"]);
        match args.command {
            Command::Spawn { count, stack_size } => {
                assert_eq!(count, 10);
                assert_eq!(stack_size, Some(2 * 1024 * 1024));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn config_flag_is_global() {
        let args = Args::parse_from(["tessera", "probe", "--config", "tessera.toml"]);
        assert_eq!(args.config, Some(PathBuf::from("tessera.toml")));
        assert!(matches!(args.command, Command::Probe));
    }
}
