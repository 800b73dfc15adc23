//! Runtime threads: the managed handle of each OS thread, the registry of
//! live threads, and the thread-local store used to find the current one.
//!
//! ## Modules
//!
//! - [`block`]: the closure contract and the tagged result crossing the thread boundary
//! - [`local`]: identifier-keyed, OS-thread-scoped storage slots
//! - [`registry`]: the set of live thread objects enumerated by the collector
//! - [`object`]: thread objects, spawning, joining

pub mod block;
pub mod local;
pub mod object;
pub mod registry;

pub use block::{Block, BoxedBlock, Completion, Flow, Termination};
pub use local::{SlotId, ThreadLocalStore};
pub use object::{OsThreadId, ThreadId, ThreadKind, ThreadObject, ThreadStatus};
pub use registry::ThreadRegistry;
