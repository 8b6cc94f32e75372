//! Three-phase backpressure loop for the producer's publish path.
//!
//! A plain spin-then-yield backoff isn't enough here: the producer also
//! needs to periodically refresh `min_tail` from the live consumer tails
//! while it waits, rather than scanning them only once per block. This
//! loop adds that middle spin-with-refresh phase between the initial
//! tight spin and the final yield.

use std::hint;
use std::thread;

const PHASE1_SPINS: u32 = 10;
const PHASE2_SPINS: u32 = 32;
const REFRESH_PERIOD: u32 = 32;

/// Drives one publisher's wait for ring space to free up.
#[derive(Debug)]
pub(crate) struct BackpressureLoop {
    spin: u32,
    callback_fired: bool,
}

impl BackpressureLoop {
    pub(crate) fn new() -> Self {
        Self {
            spin: 0,
            callback_fired: false,
        }
    }

    /// Advances the loop by one step.
    ///
    /// `refresh` recomputes `min_tail` via the live-tail scan and publishes
    /// it. `on_blocked` is the optional backpressure callback; it fires
    /// exactly once, on the spin→yield transition.
    pub(crate) fn step(&mut self, mut refresh: impl FnMut(), mut on_blocked: impl FnMut()) {
        if self.spin < PHASE1_SPINS {
            hint::spin_loop();
        } else if self.spin < PHASE1_SPINS + PHASE2_SPINS {
            hint::spin_loop();
            if (self.spin - PHASE1_SPINS) % REFRESH_PERIOD == 0 {
                refresh();
            }
        } else {
            if !self.callback_fired {
                on_blocked();
                self.callback_fired = true;
            }
            if (self.spin - PHASE1_SPINS - PHASE2_SPINS) % REFRESH_PERIOD == 0 {
                refresh();
            }
            thread::yield_now();
        }
        self.spin = self.spin.saturating_add(1);
    }
}
