use core::sync::atomic::{AtomicBool, Ordering};

/// Observable state of a [`ReadyFlag`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlagState {
    Ready,
    Busy,
}

/// Single-writer spin flag gating access to an output register.
///
/// Starts out `Ready`. `acquire` spins until it can move the flag to `Busy`,
/// `release` puts it back. There is no fairness between contenders and no
/// reentrancy protection: acquiring twice from the same context never returns.
#[derive(Debug)]
pub struct ReadyFlag {
    ready: AtomicBool,
}

impl ReadyFlag {
    pub const fn new() -> Self {
        Self {
            ready: AtomicBool::new(true),
        }
    }

    /// Busy-wait until the flag is claimed.
    pub fn acquire(&self) {
        while self
            .ready
            .compare_exchange_weak(true, false, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            // Spin on a plain load until released, then retry the claim
            while !self.ready.load(Ordering::Relaxed) {
                core::hint::spin_loop();
            }
        }
    }

    /// Claim the flag if it is currently `Ready`.
    pub fn try_acquire(&self) -> bool {
        self.ready
            .compare_exchange(true, false, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    pub fn release(&self) {
        self.ready.store(true, Ordering::Release);
    }

    pub fn state(&self) -> FlagState {
        if self.ready.load(Ordering::Acquire) {
            FlagState::Ready
        } else {
            FlagState::Busy
        }
    }
}

impl Default for ReadyFlag {
    fn default() -> Self {
        Self::new()
    }
}
