//! Collector-facing view of the Tessera runtime's threads.
//!
//! The mark phase itself lives elsewhere; this crate only enumerates what a
//! conservative collector has to treat as roots: every word on every live
//! thread's stack, and the values thread objects hold on to.

mod roots;

pub use roots::{
    collect_stack_summaries, scan_thread_stacks, visit_thread_roots, RootVisitor, StackSummary,
};
