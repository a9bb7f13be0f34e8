//! Cooperative cancellation for the loop controller.
//!
//! The handle is owned by one controller instance and cloned into the signal
//! handler and the child wait loop; nothing lives in module-level state, so
//! multiple controllers can coexist in one process without cross-talk.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use anyhow::{Context, Result};

/// Shared cancellation flag plus the "current child" registration.
///
/// The flag is checked at the top of every iteration and inside the child
/// wait loop; the wait loop terminates the registered child when the flag is
/// set, so the pending wait observes the forced close.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    requested: AtomicBool,
    /// Pid of the in-flight agent process; 0 when none is running.
    current_child: AtomicU32,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation. Safe to call from a signal handler thread.
    pub fn request(&self) {
        self.inner.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.inner.requested.load(Ordering::SeqCst)
    }

    /// Register the in-flight child so an external observer can see which
    /// process a cancellation will terminate.
    pub fn register_child(&self, pid: u32) {
        self.inner.current_child.store(pid, Ordering::SeqCst);
    }

    /// Clear the registration once the invocation finishes.
    pub fn clear_child(&self) {
        self.inner.current_child.store(0, Ordering::SeqCst);
    }

    pub fn current_child(&self) -> Option<u32> {
        match self.inner.current_child.load(Ordering::SeqCst) {
            0 => None,
            pid => Some(pid),
        }
    }
}

/// Install a Ctrl-C handler that flips this handle's flag.
///
/// The in-flight wait loop notices the flag, terminates the registered
/// child, and the controller records `paused_user_interrupt` before exit.
pub fn install_ctrlc(interrupt: &Interrupt) -> Result<()> {
    let handle = interrupt.clone();
    ctrlc::set_handler(move || {
        eprintln!("interrupt received, pausing loop");
        handle.request();
    })
    .context("install interrupt handler")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_is_observed_across_clones() {
        let interrupt = Interrupt::new();
        let clone = interrupt.clone();
        assert!(!interrupt.is_requested());
        clone.request();
        assert!(interrupt.is_requested());
    }

    #[test]
    fn child_registration_round_trips() {
        let interrupt = Interrupt::new();
        assert_eq!(interrupt.current_child(), None);
        interrupt.register_child(4242);
        assert_eq!(interrupt.current_child(), Some(4242));
        interrupt.clear_child();
        assert_eq!(interrupt.current_child(), None);
    }

    #[test]
    fn handles_are_independent_between_instances() {
        let a = Interrupt::new();
        let b = Interrupt::new();
        a.request();
        assert!(!b.is_requested());
    }
}
