use std::path::PathBuf;

use miette::Diagnostic;
use tessera_rt::RuntimeError;
use thiserror::Error;

/// Errors reported by the `tessera` binary.
#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    #[error(transparent)]
    #[diagnostic(code(tessera::cli::runtime_error))]
    Runtime(#[from] RuntimeError),

    #[error("Failed to read config file {path}")]
    #[diagnostic(code(tessera::cli::io_error))]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {path}")]
    #[diagnostic(
        code(tessera::cli::config_error),
        help("expected a [runtime] table with stack_size and bootstrap_stack (\"probe\" or \"query\")")
    )]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Thread {inspect} terminated abnormally")]
    #[diagnostic(code(tessera::cli::thread_failed))]
    ThreadFailed {
        inspect: String,
        #[source]
        source: RuntimeError,
    },
}
