//! Debug-only invariant checks for the SHM ring: active only under
//! `debug_assertions`, zero cost in release builds.

/// `head - min_tail <= capacity` must hold after every publish step.
macro_rules! debug_assert_backpressure_bound {
    ($head:expr, $min_tail:expr, $capacity:expr) => {
        debug_assert!(
            $head.wrapping_sub($min_tail) <= $capacity as u64,
            "backpressure invariant violated: head {} min_tail {} capacity {}",
            $head,
            $min_tail,
            $capacity
        )
    };
}

/// A sequence counter (`head` or a consumer `tail`) must never move backward.
macro_rules! debug_assert_monotonic {
    ($name:literal, $old:expr, $new:expr) => {
        debug_assert!(
            $new >= $old,
            "{} decreased from {} to {}",
            $name,
            $old,
            $new
        )
    };
}

/// A slot read must only happen once its `slot_seq` fence has been observed.
macro_rules! debug_assert_slot_ready {
    ($slot_seq:expr, $expected:expr) => {
        debug_assert!(
            $slot_seq == $expected,
            "read slot before its publish fence: slot_seq {} expected {}",
            $slot_seq,
            $expected
        )
    };
}

pub(crate) use debug_assert_backpressure_bound;
pub(crate) use debug_assert_monotonic;
pub(crate) use debug_assert_slot_ready;
