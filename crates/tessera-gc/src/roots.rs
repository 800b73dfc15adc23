use std::fmt;
use std::ptr;

use tessera_rt::stack::{approximate_stack_pointer, StackExtent, WORD};
use tessera_rt::{OsThreadId, Runtime, ThreadId, ThreadObject, ThreadStatus, Value};

/// Receives candidate references found while enumerating roots.
pub trait RootVisitor {
    /// Called once per word. The word may or may not be a reference; deciding
    /// that is the collector's business.
    fn visit(&mut self, word: usize);
}

impl<F: FnMut(usize)> RootVisitor for F {
    fn visit(&mut self, word: usize) {
        self(word)
    }
}

/// Scans the stack of every live runtime thread, word by word.
///
/// Threads whose block has finished are skipped. For the calling thread only
/// the part of the stack below the caller's frame is skipped; the rest of its
/// extent is scanned like any other.
///
/// # Safety
///
/// Every other thread in the registry must be stopped or parked for the whole
/// scan, and every published extent must still be mapped. Both hold while the
/// runtime's threads are alive and waiting at a safe point.
pub unsafe fn scan_thread_stacks(runtime: &Runtime, visitor: &mut dyn RootVisitor) {
    let mut threads = 0;
    let mut words = 0;
    runtime.registry().for_each(|thread| {
        let Some(extent) = scannable_extent(thread) else {
            return;
        };
        log::trace!("Scanning {} stack {}", thread.inspect(), extent);
        for addr in extent.words() {
            visitor.visit(ptr::read_volatile(addr as *const usize));
            words += 1;
        }
        threads += 1;
    });
    log::debug!("Scanned {} words on {} thread stacks", words, threads);
}

fn scannable_extent(thread: &ThreadObject) -> Option<StackExtent> {
    if !thread.is_alive() {
        return None;
    }
    let extent = thread.stack_extent()?;
    if thread.is_current() {
        let sp = approximate_stack_pointer();
        if extent.contains(sp) {
            let live = (extent.start() - sp) & !(WORD - 1);
            return Some(StackExtent::new(extent.start(), live));
        }
    }
    Some(extent)
}

/// Visits the values thread objects keep alive off-stack: captured
/// completion values and thread variables.
pub fn visit_thread_roots(runtime: &Runtime, visitor: &mut dyn RootVisitor) {
    runtime.registry().for_each(|thread| {
        thread.for_each_root(|value: Value| visitor.visit(value.to_bits()));
    });
}

/// A point-in-time description of one registered thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackSummary {
    pub thread: ThreadId,
    pub os_thread: Option<OsThreadId>,
    pub status: ThreadStatus,
    pub is_main: bool,
    pub extent: Option<StackExtent>,
}

impl StackSummary {
    fn of(thread: &ThreadObject) -> Self {
        Self {
            thread: thread.id(),
            os_thread: thread.os_thread(),
            status: thread.status(),
            is_main: thread.is_main(),
            extent: thread.stack_extent(),
        }
    }
}

impl fmt::Display for StackSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let role = if self.is_main { "main" } else { "spawned" };
        match self.os_thread {
            Some(os_thread) => write!(f, "{} {} {:<5}", os_thread, role, self.status)?,
            None => write!(f, "- {} {:<5}", role, self.status)?,
        }
        match self.extent {
            Some(extent) => write!(f, " {}", extent),
            None => f.write_str(" (stack not yet known)"),
        }
    }
}

/// Summaries of every registered thread, main thread first, then by id.
pub fn collect_stack_summaries(runtime: &Runtime) -> Vec<StackSummary> {
    let mut summaries: Vec<StackSummary> = runtime.threads().iter().map(StackSummary::of).collect();
    summaries.sort_by_key(|summary| (!summary.is_main, summary.thread));
    summaries
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_rt::{BootstrapStack, Flow, RuntimeConfig};

    const MARKER: usize = 0x5eed_cafe_f00d_0001;

    fn runtime() -> Runtime {
        let _ = env_logger::builder().is_test(true).try_init();
        Runtime::new(RuntimeConfig::default().with_bootstrap_stack(BootstrapStack::Query)).unwrap()
    }

    #[test]
    fn closures_are_visitors() {
        let mut seen = Vec::new();
        {
            let mut visitor = |word: usize| seen.push(word);
            let visitor: &mut dyn RootVisitor = &mut visitor;
            visitor.visit(1);
            visitor.visit(2);
        }
        assert_eq!(seen, vec![1, 2]);
    }

    #[test]
    fn scan_finds_words_on_a_parked_thread() {
        let runtime = runtime();
        let (parked, wait_parked) = crossbeam::channel::bounded::<()>(0);
        let (release, wait_release) = crossbeam::channel::bounded::<()>(0);

        let thread = runtime
            .spawn_with(move || {
                let marker = MARKER;
                // Borrowing the marker gives it a stack slot.
                let pinned = std::hint::black_box(&marker);
                parked.send(()).unwrap();
                wait_release.recv().unwrap();
                Flow::Return(Value::from_bits(*pinned & 1))
            })
            .unwrap();

        wait_parked.recv().unwrap();
        let mut found = false;
        // SAFETY: the only other runtime thread is blocked on the channel.
        unsafe {
            scan_thread_stacks(&runtime, &mut |word: usize| found |= word == MARKER);
        }
        release.send(()).unwrap();
        thread.join().unwrap();
        assert!(found, "marker not found on {}", thread.stack_extent().unwrap());
    }

    #[test]
    fn finished_threads_are_not_scanned() {
        let runtime = runtime();
        let thread = runtime.spawn_with(|| Flow::Return(Value::NIL)).unwrap();
        thread.join().unwrap();

        let mut words = 0;
        // SAFETY: no runtime thread is running.
        unsafe {
            scan_thread_stacks(&runtime, &mut |_: usize| words += 1);
        }
        assert_eq!(words, 0);
    }

    #[test]
    fn thread_roots_include_values_and_variables() {
        let runtime = runtime();
        let key = runtime.symbols().intern("tag");
        let thread = runtime.spawn_with(|| Flow::Return(Value::from_bits(0x10))).unwrap();
        thread.join().unwrap();
        thread.thread_variable_set(key, Value::from_bits(0x20));

        let mut roots = Vec::new();
        visit_thread_roots(&runtime, &mut |word: usize| roots.push(word));
        roots.sort_unstable();
        assert_eq!(roots, vec![0x10, 0x20]);
    }

    #[test]
    fn summaries_put_the_main_thread_first() {
        let runtime = runtime();
        let spawned = runtime.spawn_with(|| Flow::Return(Value::NIL)).unwrap();
        let main = runtime.bootstrap().unwrap();
        spawned.join().unwrap();

        let summaries = collect_stack_summaries(&runtime);
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].thread, main.id());
        assert_eq!(summaries[0].status, ThreadStatus::Run);
        assert_eq!(summaries[1].thread, spawned.id());
        assert_eq!(summaries[1].status, ThreadStatus::Dead);
        assert!(summaries[1].to_string().contains("spawned dead"));
    }
}
