//! Native thread lifecycle for the Tessera runtime.
//!
//! This crate provides:
//! - Spawning, joining and inspecting OS threads that run runtime blocks
//! - A registry of live threads and their stack extents for the collector
//! - Thread-local slots keyed by interned identifiers ("current thread")
//! - Discovery of the bootstrap thread's usable stack by probing

#[cfg(not(unix))]
compile_error!("tessera-rt supports unix targets only");

pub mod config;
pub mod error;
pub mod runtime;
pub mod stack;
pub mod symbol;
pub mod thread;
pub mod value;

pub use config::{BootstrapStack, RuntimeConfig, DEFAULT_STACK_SIZE};
pub use error::RuntimeError;
pub use runtime::Runtime;
pub use stack::StackExtent;
pub use symbol::{Symbol, SymbolTable};
pub use thread::{
    Block, BoxedBlock, Completion, Flow, OsThreadId, Termination, ThreadId, ThreadKind,
    ThreadLocalStore, ThreadObject, ThreadRegistry, ThreadStatus,
};
pub use value::Value;
