//! # DSP
//!
//! The real-time core of the plugin:
//!
//! - **`delay_line`**: per-channel ring buffers with pop-then-push access
//!   and a runtime-adjustable delay length.
//!
//! - **`processor`**: the gated feedback loop that runs once per audio
//!   block on top of the delay line.
//!
//! - **`io`**: the small traits the processor reads audio, the feedback
//!   gain and the gate through, plus adapters for nih-plug's types.

pub mod delay_line;
pub mod io;
pub mod processor;
