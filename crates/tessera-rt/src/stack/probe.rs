//! Empirical discovery of the usable stack extent of a thread.
//!
//! The OS-reported size of the process's original stack is derived from the
//! stack resource limit, which overstates the region that can actually be read
//! (process startup data such as arguments and environment eats into it).
//! Scanning past the real boundary faults, so the boundary is found the same
//! way: walk down one word at a time with volatile reads until the first read
//! faults, and recover from the fault with a non-local jump back into
//! [`probe_stack_bounds`].
//!
//! This is the only module in the runtime that installs signal handlers or
//! performs non-local jumps.
//!
//! # Contract
//!
//! * Input: a starting (high) address inside the calling thread's stack and an
//!   upper bound on how far to walk.
//! * Output: the extent `[start - size, start)` where every word was readable,
//!   or `None` if not even the first word below `start` was.
//! * The SIGSEGV and SIGBUS dispositions are process-wide. While the probe runs
//!   no other thread may fault, so it must only be called before the runtime
//!   spawns threads. Concurrent calls are serialised by an internal lock.

use std::cell::UnsafeCell;
use std::mem;
use std::ptr;
use std::sync::atomic::{compiler_fence, AtomicUsize, Ordering};

use libc::c_int;
use parking_lot::Mutex;

use super::{StackExtent, WORD};
use crate::error::fatal;

/// Upper bound on the walk when the caller has no better one.
pub const MAX_PROBE_SIZE: usize = 256 * 1024 * 1024;

/// Storage for a `sigjmp_buf`. Large and aligned enough for every supported
/// libc (glibc x86_64 needs 200 bytes, aarch64 312, Darwin 196).
#[repr(C, align(16))]
struct SigJmpBuf([u64; 64]);

extern "C" {
    #[cfg_attr(all(target_os = "linux", target_env = "gnu"), link_name = "__sigsetjmp")]
    fn sigsetjmp(env: *mut SigJmpBuf, savemask: c_int) -> c_int;
    fn siglongjmp(env: *mut SigJmpBuf, val: c_int) -> !;
}

struct ResumePoint(UnsafeCell<SigJmpBuf>);

// SAFETY: only touched while PROBE_LOCK is held, and by the fault handler on
// the thread holding it.
unsafe impl Sync for ResumePoint {}

static RESUME_POINT: ResumePoint = ResumePoint(UnsafeCell::new(SigJmpBuf([0; 64])));

/// Lowest address the walk has attempted to read.
static PROBE_CURSOR: AtomicUsize = AtomicUsize::new(0);

static PROBE_LOCK: Mutex<()> = parking_lot::const_mutex(());

extern "C" fn on_fault(_signal: c_int) {
    // SAFETY: the handler is only installed between sigsetjmp and the restore
    // in probe_stack_bounds, so the resume point is live.
    unsafe { siglongjmp(RESUME_POINT.0.get(), 1) }
}

unsafe fn install_fault_handler(signal: c_int, previous: *mut libc::sigaction) {
    let mut action: libc::sigaction = mem::zeroed();
    action.sa_sigaction = on_fault as extern "C" fn(c_int) as libc::sighandler_t;
    libc::sigemptyset(&mut action.sa_mask);
    action.sa_flags = 0;
    if libc::sigaction(signal, &action, previous) != 0 {
        fatal!("could not install stack probe handler for signal {}", signal);
    }
}

unsafe fn restore_handler(signal: c_int, previous: *const libc::sigaction) {
    if libc::sigaction(signal, previous, ptr::null_mut()) != 0 {
        fatal!("could not restore handler for signal {}", signal);
    }
}

/// Reads downward from `start` until a read faults or `floor` is reached.
/// Never returns through a fault; control resumes in `probe_stack_bounds`.
#[inline(never)]
unsafe fn walk_down(start: usize, floor: usize) {
    let mut cursor = start;
    while cursor >= floor + WORD {
        cursor -= WORD;
        PROBE_CURSOR.store(cursor, Ordering::SeqCst);
        ptr::read_volatile(cursor as *const usize);
    }
}

/// Discovers how far below `start` the calling thread's stack is readable.
///
/// `start` is rounded down to a word boundary and the walk never goes more
/// than `max_size` bytes below it.
///
/// # Safety
///
/// `start` must lie inside the calling thread's stack, and no other thread of
/// the process may raise SIGSEGV or SIGBUS while this runs (see the module
/// contract). Previously installed handlers for both signals are restored
/// before returning.
pub unsafe fn probe_stack_bounds(start: usize, max_size: usize) -> Option<StackExtent> {
    let _guard = PROBE_LOCK.lock();

    let start = start & !(WORD - 1);
    let floor = start.saturating_sub(max_size);
    PROBE_CURSOR.store(start, Ordering::SeqCst);

    let mut previous_segv: libc::sigaction = mem::zeroed();
    let mut previous_bus: libc::sigaction = mem::zeroed();
    install_fault_handler(libc::SIGSEGV, &mut previous_segv);
    install_fault_handler(libc::SIGBUS, &mut previous_bus);

    // Nothing in this frame is modified between sigsetjmp and the jump; the
    // walk runs in its own frame and reports progress through PROBE_CURSOR.
    let resumed = sigsetjmp(RESUME_POINT.0.get(), 1) != 0;
    if !resumed {
        walk_down(start, floor);
    }
    compiler_fence(Ordering::SeqCst);

    restore_handler(libc::SIGBUS, &previous_bus);
    restore_handler(libc::SIGSEGV, &previous_segv);

    let cursor = PROBE_CURSOR.load(Ordering::SeqCst);
    // On a fault the cursor holds the first unreadable word.
    let last_valid = if resumed { cursor + WORD } else { cursor };
    log::debug!(
        "Stack probe from {:#x}: last readable word {:#x} ({})",
        start,
        last_valid,
        if resumed { "faulted" } else { "reached limit" }
    );

    let size = start - last_valid;
    if size == 0 {
        None
    } else {
        Some(StackExtent::new(start, size))
    }
}
