use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use crate::config::{BootstrapStack, RuntimeConfig};
use crate::error::RuntimeError;
use crate::stack::{approximate_stack_pointer, os, probe, StackExtent};
use crate::symbol::{Symbol, SymbolTable};
use crate::thread::{
    Block, BoxedBlock, Flow, SlotId, ThreadLocalStore, ThreadObject, ThreadRegistry,
};

struct RuntimeShared {
    config: RuntimeConfig,
    registry: Arc<ThreadRegistry>,
    /// Holds the current thread object under [`Symbol::CURRENT_THREAD`].
    locals: ThreadLocalStore<ThreadObject>,
    current_slot: SlotId,
    symbols: SymbolTable,
    bootstrapped: AtomicBool,
    bootstrap_strategy: OnceCell<BootstrapStack>,
    main: Mutex<Option<ThreadObject>>,
}

/// The runtime context: owns the thread registry and the current-thread
/// storage, and is passed to everything that spawns or looks up threads.
///
/// Cloning yields another handle to the same runtime.
#[derive(Clone)]
pub struct Runtime {
    shared: Arc<RuntimeShared>,
}

impl Runtime {
    /// Creates a runtime without bootstrapping the calling thread.
    pub fn new(config: RuntimeConfig) -> Result<Self, RuntimeError> {
        config.validate()?;
        log::debug!("Creating runtime with {:?}", config);
        let locals = ThreadLocalStore::new();
        let current_slot = locals.slot_for(Symbol::CURRENT_THREAD);
        Ok(Self {
            shared: Arc::new(RuntimeShared {
                config,
                registry: Arc::new(ThreadRegistry::new()),
                locals,
                current_slot,
                symbols: SymbolTable::new(),
                bootstrapped: AtomicBool::new(false),
                bootstrap_strategy: OnceCell::new(),
                main: Mutex::new(None),
            }),
        })
    }

    /// Creates a runtime and bootstraps the calling thread as its main thread.
    pub fn init(config: RuntimeConfig) -> Result<Self, RuntimeError> {
        let runtime = Self::new(config)?;
        runtime.bootstrap()?;
        Ok(runtime)
    }

    /// Wraps the calling OS thread in the runtime's main thread object.
    ///
    /// On the process's original thread the stack is probed, which
    /// temporarily replaces the process-wide fault handlers. If this runtime
    /// already has live spawned threads the OS-reported bounds are used
    /// instead.
    pub fn bootstrap(&self) -> Result<ThreadObject, RuntimeError> {
        if self.shared.bootstrapped.swap(true, Ordering::AcqRel) {
            return Err(RuntimeError::AlreadyBootstrapped);
        }

        let (stack, strategy) = self.discover_bootstrap_stack();
        let _ = self.shared.bootstrap_strategy.set(strategy);
        let main = ThreadObject::bootstrap(&self.shared.registry, stack);
        self.publish_current(&main);
        *self.shared.main.lock() = Some(main.clone());
        log::info!(
            "Runtime bootstrapped: main thread {} with stack {} ({:?})",
            main.inspect(),
            stack,
            strategy
        );
        Ok(main)
    }

    fn discover_bootstrap_stack(&self) -> (StackExtent, BootstrapStack) {
        let config = &self.shared.config;
        let reported = os::current_thread_bounds();
        let start = config
            .bootstrap_stack_start
            .or(reported.map(|bounds| bounds.start()))
            .unwrap_or_else(approximate_stack_pointer);

        if config.bootstrap_stack == BootstrapStack::Probe {
            let live = self.shared.registry.len();
            if !os::is_initial_thread() {
                log::debug!("Bootstrapping off the initial thread; using OS-reported stack bounds");
            } else if live > 0 {
                log::warn!(
                    "Not probing the bootstrap stack with {} live spawned thread(s); using OS-reported bounds",
                    live
                );
            } else {
                let limit = match reported {
                    Some(bounds) if bounds.contains(start - 1) => start - bounds.end(),
                    _ => probe::MAX_PROBE_SIZE,
                };
                // SAFETY: `start` is on this thread's stack and the runtime
                // has no other threads.
                match unsafe { probe::probe_stack_bounds(start, limit) } {
                    Some(extent) => return (extent, BootstrapStack::Probe),
                    None => log::warn!("Stack probe from {:#x} found no readable words", start),
                }
            }
        }

        let extent = match reported {
            Some(bounds) if bounds.contains(start - 1) => StackExtent::new(start, start - bounds.end()),
            _ => {
                log::warn!(
                    "No OS stack bounds for the bootstrap thread; assuming {} bytes",
                    config.stack_size
                );
                StackExtent::new(start, config.stack_size.min(start))
            }
        };
        (extent, BootstrapStack::Query)
    }

    /// How the bootstrap thread's stack extent was actually determined.
    pub fn bootstrap_strategy(&self) -> Option<BootstrapStack> {
        self.shared.bootstrap_strategy.get().copied()
    }

    /// Releases the main thread object and unpublishes it from the calling
    /// thread. Spawned threads are neither joined nor cancelled.
    pub fn shutdown(self) {
        if let Some(main) = self.shared.main.lock().take() {
            if main.is_current() {
                self.unpublish_current();
            } else {
                log::warn!("Runtime shut down off its main thread; {} stays published there", main.inspect());
            }
        }
        let remaining = self.shared.registry.len();
        if remaining > 0 {
            log::warn!("Runtime shut down with {} live thread object(s)", remaining);
        }
        log::info!("Runtime shut down.");
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.shared.config
    }

    pub fn registry(&self) -> &Arc<ThreadRegistry> {
        &self.shared.registry
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.shared.symbols
    }

    /// The bootstrap thread, once [`Runtime::bootstrap`] has run.
    pub fn main_thread(&self) -> Option<ThreadObject> {
        self.shared.main.lock().clone()
    }

    pub fn expect_main_thread(&self) -> Result<ThreadObject, RuntimeError> {
        self.main_thread().ok_or(RuntimeError::NotBootstrapped)
    }

    /// The thread object bound to the calling OS thread, if the runtime
    /// manages it.
    pub fn current_thread(&self) -> Option<ThreadObject> {
        self.shared.locals.get_slot(self.shared.current_slot)
    }

    pub fn expect_current_thread(&self) -> Result<ThreadObject, RuntimeError> {
        self.current_thread().ok_or(RuntimeError::NotARuntimeThread)
    }

    pub(crate) fn publish_current(&self, thread: &ThreadObject) {
        self.shared.locals.set_slot(self.shared.current_slot, thread.clone());
    }

    pub(crate) fn unpublish_current(&self) {
        drop(self.shared.locals.take_slot(self.shared.current_slot));
    }

    /// Starts a new thread running `block`. Fails if no block is given.
    pub fn spawn(&self, block: Option<BoxedBlock>) -> Result<ThreadObject, RuntimeError> {
        ThreadObject::spawn(self, block, self.shared.config.stack_size)
    }

    pub fn spawn_with<F>(&self, f: F) -> Result<ThreadObject, RuntimeError>
    where
        F: FnOnce() -> Flow + Send + 'static,
    {
        self.spawn(Some(Box::new(f) as Box<dyn Block>))
    }

    /// Every live thread object, in no particular order.
    pub fn threads(&self) -> Vec<ThreadObject> {
        self.shared.registry.snapshot()
    }

    /// Blocks the calling runtime thread for `duration` with its sleeping
    /// flag raised.
    pub fn sleep_current(&self, duration: Duration) -> Result<(), RuntimeError> {
        let thread = self.expect_current_thread()?;
        let _sleeping = SleepGuard::enter(&thread);
        std::thread::sleep(duration);
        Ok(())
    }
}

struct SleepGuard<'a> {
    thread: &'a ThreadObject,
}

impl<'a> SleepGuard<'a> {
    fn enter(thread: &'a ThreadObject) -> Self {
        thread.set_sleeping(true);
        Self { thread }
    }
}

impl Drop for SleepGuard<'_> {
    fn drop(&mut self) {
        self.thread.set_sleeping(false);
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.shared.config)
            .field("registry", &self.shared.registry)
            .field("bootstrapped", &self.shared.bootstrapped.load(Ordering::Relaxed))
            .finish()
    }
}
