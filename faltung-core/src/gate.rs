//! Reinit gate - single-slot guard against overlapping reconfiguration cycles
//!
//! Host buffer-size changes can be reported on every block; the gate
//! coalesces such storms into one in-flight cycle. It is a plain
//! compare-and-swap flag: one writer enters it on the audio context,
//! one writer clears it on the commit or failure path, never
//! concurrently by protocol construction.

use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
pub struct ReinitGate {
    pending: AtomicBool,
}

impl ReinitGate {
    pub fn new() -> Self {
        Self {
            pending: AtomicBool::new(false),
        }
    }

    /// Open a reconfiguration cycle. Succeeds iff the gate is idle;
    /// a failed attempt has no side effect.
    pub fn try_enter(&self) -> bool {
        self.pending
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Close the cycle unconditionally.
    pub fn leave(&self) {
        self.pending.store(false, Ordering::Release);
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }
}
