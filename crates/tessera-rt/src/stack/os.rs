//! Stack bounds and thread identity as reported by the operating system.

use super::StackExtent;

/// Stack bounds of the calling thread according to its pthread attributes.
///
/// For threads created through pthreads this is exact. For the process's
/// original thread the reported size is derived from the stack resource limit
/// and overstates what can actually be touched, which is why the bootstrap
/// thread is probed instead.
#[cfg(any(target_os = "linux", target_os = "android"))]
pub fn current_thread_bounds() -> Option<StackExtent> {
    use std::{mem, ptr};

    // SAFETY: `attr` is initialised by pthread_getattr_np and destroyed once.
    unsafe {
        let mut attr: libc::pthread_attr_t = mem::zeroed();
        if libc::pthread_getattr_np(libc::pthread_self(), &mut attr) != 0 {
            return None;
        }
        let mut addr: *mut libc::c_void = ptr::null_mut();
        let mut size: libc::size_t = 0;
        let ret = libc::pthread_attr_getstack(&attr, &mut addr, &mut size);
        libc::pthread_attr_destroy(&mut attr);
        if ret != 0 || addr.is_null() || size == 0 {
            return None;
        }
        Some(StackExtent::new(addr as usize + size, size))
    }
}

#[cfg(target_os = "macos")]
pub fn current_thread_bounds() -> Option<StackExtent> {
    // SAFETY: both calls only read the calling thread's descriptor.
    unsafe {
        let this = libc::pthread_self();
        let top = libc::pthread_get_stackaddr_np(this) as usize;
        let size = libc::pthread_get_stacksize_np(this);
        if top == 0 || size == 0 {
            return None;
        }
        Some(StackExtent::new(top, size))
    }
}

#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "macos")))]
pub fn current_thread_bounds() -> Option<StackExtent> {
    None
}

/// Whether the calling thread is the one the process started on.
#[cfg(any(target_os = "linux", target_os = "android"))]
pub fn is_initial_thread() -> bool {
    // SAFETY: plain syscalls without arguments that can be misused.
    unsafe { libc::syscall(libc::SYS_gettid) as libc::pid_t == libc::getpid() }
}

#[cfg(target_os = "macos")]
pub fn is_initial_thread() -> bool {
    // SAFETY: no arguments.
    unsafe { libc::pthread_main_np() != 0 }
}

#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "macos")))]
pub fn is_initial_thread() -> bool {
    false
}
