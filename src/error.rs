//! # Errors
//!
//! Only the control thread ever sees a `DelayError` as a value. The audio
//! thread cannot stop to report anything, so on that side the same errors
//! are turned into debug assertions and a safe fallback (clamp the delay,
//! pass the block through untouched).

use thiserror::Error;

/// Everything that can go wrong while configuring or driving the delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DelayError {
    /// A delay length was requested that the pre-allocated buffer can't hold.
    #[error("delay of {requested} samples exceeds the capacity of {capacity} samples")]
    DelayExceedsCapacity { requested: usize, capacity: usize },

    /// The host announced a stream configuration we can't size buffers for.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    /// The caller broke the processing contract (e.g. processing before
    /// `prepare()`).
    #[error("contract violation: {0}")]
    ContractViolation(&'static str),
}
