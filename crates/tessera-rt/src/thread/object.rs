use std::fmt;
use std::os::unix::thread::JoinHandleExt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam::channel::{self, Receiver, Sender};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use super::block::{panic_message, run_block, BoxedBlock, Completion, Termination};
use super::registry::ThreadRegistry;
use crate::error::{fatal, RuntimeError};
use crate::runtime::Runtime;
use crate::stack::{os, StackExtent};
use crate::symbol::Symbol;
use crate::value::Value;

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a [`ThreadObject`], unique for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(u64);

impl ThreadId {
    fn next() -> Self {
        ThreadId(NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// Identity of an OS thread (its `pthread_t`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OsThreadId(usize);

impl OsThreadId {
    pub fn current() -> Self {
        // SAFETY: pthread_self has no preconditions.
        OsThreadId(unsafe { libc::pthread_self() } as usize)
    }

    pub fn as_usize(self) -> usize {
        self.0
    }
}

impl fmt::LowerHex for OsThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl fmt::Display for OsThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadKind {
    /// The thread the runtime was bootstrapped on.
    Main,
    /// A thread created by [`Runtime::spawn`].
    Spawned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadStatus {
    Run,
    Sleep,
    Dead,
}

impl fmt::Display for ThreadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            ThreadStatus::Run => "run",
            ThreadStatus::Sleep => "sleep",
            ThreadStatus::Dead => "dead",
        })
    }
}

pub(crate) struct ThreadInner {
    id: ThreadId,
    kind: ThreadKind,
    registry: Arc<ThreadRegistry>,
    os_thread: OnceCell<OsThreadId>,
    /// Written once by the thread itself before its block runs.
    stack: OnceCell<StackExtent>,
    block: Mutex<Option<BoxedBlock>>,
    join_handle: Mutex<Option<JoinHandle<Completion>>>,
    /// Written once, by the first join.
    completion: OnceCell<Completion>,
    sleeping: AtomicBool,
    finished: AtomicBool,
    /// Set once the object is visible in the registry.
    registered: AtomicBool,
    variables: Mutex<FxHashMap<Symbol, Value>>,
}

impl ThreadInner {
    pub(crate) fn id(&self) -> ThreadId {
        self.id
    }
}

impl Drop for ThreadInner {
    fn drop(&mut self) {
        if *self.registered.get_mut() {
            self.registry.remove(self.id);
        }
    }
}

/// The managed handle of one OS thread.
///
/// Cloning is cheap and yields another handle to the same thread; the object
/// stays registered until the last handle is gone. A spawned OS thread holds a
/// handle to itself while it runs.
#[derive(Clone)]
pub struct ThreadObject {
    inner: Arc<ThreadInner>,
}

impl ThreadObject {
    /// Builds an object that the registry does not know about yet.
    pub(crate) fn allocate(
        kind: ThreadKind,
        registry: &Arc<ThreadRegistry>,
        block: Option<BoxedBlock>,
    ) -> Self {
        let inner = Arc::new(ThreadInner {
            id: ThreadId::next(),
            kind,
            registry: Arc::clone(registry),
            os_thread: OnceCell::new(),
            stack: OnceCell::new(),
            block: Mutex::new(block),
            join_handle: Mutex::new(None),
            completion: OnceCell::new(),
            sleeping: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            registered: AtomicBool::new(false),
            variables: Mutex::new(FxHashMap::default()),
        });
        Self { inner }
    }

    pub(crate) fn register(&self) {
        if self.inner.registered.swap(true, Ordering::AcqRel) {
            fatal!("thread {:?} registered twice", self.id());
        }
        self.inner.registry.add(&self.inner);
    }

    pub(crate) fn from_inner(inner: Arc<ThreadInner>) -> Self {
        Self { inner }
    }

    /// Wraps the calling OS thread, whose stack extent is already known.
    pub(crate) fn bootstrap(registry: &Arc<ThreadRegistry>, stack: StackExtent) -> Self {
        let thread = Self::allocate(ThreadKind::Main, registry, None);
        let _ = thread.inner.os_thread.set(OsThreadId::current());
        if thread.inner.stack.set(stack).is_err() {
            fatal!("bootstrap thread stack extent written twice");
        }
        thread.register();
        thread
    }

    /// Starts an OS thread running `block` and returns without waiting for
    /// the block.
    ///
    /// The object is registered, and returned, only once the new thread has
    /// published its stack extent and the join handle is in place. Its block
    /// starts after that.
    pub(crate) fn spawn(
        runtime: &Runtime,
        block: Option<BoxedBlock>,
        stack_size: usize,
    ) -> Result<Self, RuntimeError> {
        let block = block.ok_or(RuntimeError::NoBlockGiven)?;
        let thread = Self::allocate(ThreadKind::Spawned, runtime.registry(), Some(block));
        let (handshake, bound, start) = Handshake::new();

        {
            let mut join_handle = thread.inner.join_handle.lock();
            let wrapper_runtime = runtime.clone();
            let wrapper_thread = thread.clone();
            let spawned = std::thread::Builder::new()
                .name(format!("tessera-{}", thread.id().as_u64()))
                .stack_size(stack_size)
                .spawn(move || {
                    thread_wrapper(wrapper_runtime, wrapper_thread, stack_size, handshake)
                });
            let handle = match spawned {
                Ok(handle) => handle,
                Err(err) => fatal!("could not create OS thread: {}", err),
            };
            let _ = thread.inner.os_thread.set(OsThreadId(handle.as_pthread_t() as usize));
            *join_handle = Some(handle);
        }

        if bound.recv().is_err() {
            fatal!("{:?} exited before publishing its stack", thread.id());
        }
        thread.register();
        // Lets the block run.
        let _ = start.send(());
        log::debug!("Spawned {} ({:?})", thread.inspect(), thread.id());
        Ok(thread)
    }

    pub fn id(&self) -> ThreadId {
        self.inner.id
    }

    pub fn kind(&self) -> ThreadKind {
        self.inner.kind
    }

    pub fn is_main(&self) -> bool {
        self.inner.kind == ThreadKind::Main
    }

    pub fn os_thread(&self) -> Option<OsThreadId> {
        self.inner.os_thread.get().copied()
    }

    /// The thread's stack extent, once the thread has started running.
    pub fn stack_extent(&self) -> Option<StackExtent> {
        self.inner.stack.get().copied()
    }

    /// False once the thread's block has finished.
    pub fn is_alive(&self) -> bool {
        !self.inner.finished.load(Ordering::Acquire)
    }

    pub fn is_sleeping(&self) -> bool {
        self.inner.sleeping.load(Ordering::Acquire)
    }

    pub(crate) fn set_sleeping(&self, sleeping: bool) {
        self.inner.sleeping.store(sleeping, Ordering::Release);
    }

    /// Whether this object is bound to the calling OS thread.
    pub fn is_current(&self) -> bool {
        self.is_alive() && self.os_thread() == Some(OsThreadId::current())
    }

    pub fn status(&self) -> ThreadStatus {
        if !self.is_alive() {
            ThreadStatus::Dead
        } else if self.is_sleeping() {
            ThreadStatus::Sleep
        } else {
            ThreadStatus::Run
        }
    }

    /// Waits for the thread to finish and captures what its block produced.
    ///
    /// Joining is idempotent and may happen from several threads at once:
    /// the first caller performs the OS-level join, concurrent callers wait
    /// for it, later callers return immediately. Every call reports the same
    /// outcome, so a block that terminated abnormally makes every join fail
    /// with [`RuntimeError::ThreadTerminated`]. On success the thread itself
    /// is returned.
    pub fn join(&self) -> Result<&Self, RuntimeError> {
        if self.is_main() {
            return Err(RuntimeError::NotJoinable);
        }
        if self.is_current() {
            return Err(RuntimeError::JoinSelf);
        }
        match self.wait_for_completion() {
            Completion::Normal(_) => Ok(self),
            Completion::Abnormal(termination) => {
                Err(RuntimeError::ThreadTerminated(termination.clone()))
            }
        }
    }

    fn wait_for_completion(&self) -> &Completion {
        if let Some(completion) = self.inner.completion.get() {
            return completion;
        }

        let mut handle = self.inner.join_handle.lock();
        if let Some(handle) = handle.take() {
            let completion = handle.join().unwrap_or_else(|payload| {
                Completion::Abnormal(Termination::Panicked(panic_message(payload.as_ref())))
            });
            log::debug!("Joined {:?}: {:?}", self.id(), completion);
            let _ = self.inner.completion.set(completion);
        }
        drop(handle);

        match self.inner.completion.get() {
            Some(completion) => completion,
            None => fatal!("joined thread {:?} left no completion", self.id()),
        }
    }

    /// What the thread produced, if a join has captured it.
    ///
    /// This never looks at the OS thread: before the first join completes it
    /// returns `None`, even if the block has long finished.
    pub fn value(&self) -> Option<Completion> {
        self.inner.completion.get().cloned()
    }

    pub fn thread_variable_get(&self, key: Symbol) -> Option<Value> {
        self.inner.variables.lock().get(&key).copied()
    }

    pub fn thread_variable_set(&self, key: Symbol, value: Value) {
        self.inner.variables.lock().insert(key, value);
    }

    /// Visits the managed values this object keeps alive outside any stack.
    pub fn for_each_root(&self, mut visitor: impl FnMut(Value)) {
        if let Some(completion) = self.inner.completion.get() {
            let held = match completion {
                Completion::Normal(value) => Some(*value),
                Completion::Abnormal(termination) => termination.value(),
            };
            if let Some(value) = held {
                visitor(value);
            }
        }
        let variables: Vec<Value> = self.inner.variables.lock().values().copied().collect();
        for value in variables {
            visitor(value);
        }
    }

    /// Diagnostic representation, e.g. `#<Thread:0x7f3a2c1ff640 run>`.
    pub fn inspect(&self) -> String {
        let os_thread = self.os_thread().map_or(0, OsThreadId::as_usize);
        format!("#<Thread:{:#x} {}>", os_thread, self.status())
    }

    /// Records the calling OS thread's identity and stack extent. Runs on the
    /// new thread before its block, and only once.
    fn bind_current_os_thread(&self, start: usize, stack_size: usize) {
        let _ = self.inner.os_thread.set(OsThreadId::current());
        let extent = match os::current_thread_bounds() {
            Some(bounds) if bounds.contains(start) => StackExtent::new(start, start - bounds.end()),
            _ => StackExtent::new(start, stack_size.min(start)),
        };
        if self.inner.stack.set(extent).is_err() {
            fatal!("stack extent of {:?} written twice", self.id());
        }
    }

    fn mark_finished(&self) {
        self.inner.finished.store(true, Ordering::Release);
    }
}

/// The new thread's half of the spawn handshake: it reports that its stack
/// is bound, then waits until the spawner has registered it.
struct Handshake {
    bound: Sender<()>,
    start: Receiver<()>,
}

impl Handshake {
    fn new() -> (Self, Receiver<()>, Sender<()>) {
        let (bound_tx, bound_rx) = channel::bounded(1);
        let (start_tx, start_rx) = channel::bounded(1);
        let handshake = Handshake {
            bound: bound_tx,
            start: start_rx,
        };
        (handshake, bound_rx, start_tx)
    }

    fn bound_and_wait(self) {
        let _ = self.bound.send(());
        let _ = self.start.recv();
    }
}

/// Entry point of every spawned OS thread.
fn thread_wrapper(
    runtime: Runtime,
    thread: ThreadObject,
    stack_size: usize,
    handshake: Handshake,
) -> Completion {
    // Everything the block touches lives in frames below this local.
    let anchor = 0usize;
    let start = std::hint::black_box(&anchor) as *const usize as usize;
    thread.bind_current_os_thread(start, stack_size);
    handshake.bound_and_wait();
    run_thread(runtime, thread)
}

#[inline(never)]
fn run_thread(runtime: Runtime, thread: ThreadObject) -> Completion {
    let block = match thread.inner.block.lock().take() {
        Some(block) => block,
        None => fatal!("spawned thread {:?} has no block", thread.id()),
    };

    runtime.publish_current(&thread);
    log::trace!("{:?} running on stack {:?}", thread.id(), thread.stack_extent());
    let completion = run_block(block);
    thread.mark_finished();
    runtime.unpublish_current();
    completion
}

impl PartialEq for ThreadObject {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for ThreadObject {}

impl fmt::Debug for ThreadObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadObject")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("os_thread", &self.os_thread())
            .field("stack", &self.stack_extent())
            .field("status", &self.status())
            .finish()
    }
}

impl fmt::Display for ThreadObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inspect())
    }
}
