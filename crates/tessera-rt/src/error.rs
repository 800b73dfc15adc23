use thiserror::Error;

use crate::thread::Termination;

/// Recoverable errors reported by the Tessera runtime.
///
/// Failures that leave the runtime in an unusable state (an OS thread that
/// cannot be created, a thread-local slot that cannot be written) are not
/// represented here; they go through [`fatal!`] and abort the process.
#[derive(Error, Debug, Clone)]
pub enum RuntimeError {
    #[error("Thread must be created with a block.")]
    NoBlockGiven,

    #[error("Runtime attempted to bootstrap while already bootstrapped.")]
    AlreadyBootstrapped,

    #[error("Runtime has not been bootstrapped.")]
    NotBootstrapped,

    #[error("Calling OS thread is not managed by this runtime.")]
    NotARuntimeThread,

    #[error("Target thread must not be the current thread.")]
    JoinSelf,

    #[error("The bootstrap thread cannot be joined.")]
    NotJoinable,

    #[error("Thread terminated abnormally: {0}")]
    ThreadTerminated(Termination),

    #[error("Invalid runtime configuration: {0}")]
    InvalidConfig(String),
}

/// Logs an unrecoverable runtime-integrity failure and aborts the process.
macro_rules! fatal {
    ($($arg:tt)+) => {{
        log::error!("FATAL: {}", format_args!($($arg)+));
        eprintln!("FATAL ERROR: {}", format_args!($($arg)+));
        std::process::abort()
    }};
}

pub(crate) use fatal;
