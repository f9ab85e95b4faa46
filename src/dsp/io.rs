//! # Processor I/O
//!
//! The feedback processor doesn't know about hosts, parameter objects or
//! MIDI. It only sees three narrow capabilities:
//!
//! - **[`SampleBuffer`]**: channels × samples of audio it may read and
//!   overwrite in place.
//! - **[`ParameterSource`]**: a scalar it reads once per sample (the
//!   feedback gain).
//! - **[`GateSource`]**: a boolean it reads once per block (is the note
//!   held?).
//!
//! Adapters for nih-plug's `Buffer` and `FloatParam` live here; the
//! note-tracking gate lives in [`crate::keyboard`]. Plain `f32`, `bool` and
//! `[Vec<f32>]` implementations cover offline rendering and tests.

use nih_plug::prelude::*;

/// Indexed read/write access to a block of audio.
///
/// Indices must be in range; an out-of-range index is a caller bug and
/// panics.
pub trait SampleBuffer {
    fn num_channels(&self) -> usize;
    fn num_samples(&self) -> usize;
    fn sample(&self, channel: usize, index: usize) -> f32;
    fn set_sample(&mut self, channel: usize, index: usize, value: f32);

    /// Mix `value` on top of whatever is already in the slot.
    fn add_sample(&mut self, channel: usize, index: usize, value: f32) {
        let current = self.sample(channel, index);
        self.set_sample(channel, index, current + value);
    }
}

/// A scalar read on the audio thread while something else may be writing
/// it. Stale values are fine; it only has to catch up eventually.
pub trait ParameterSource {
    /// The value to use for the next sample.
    fn next_value(&self) -> f32;
}

/// Whether the effect path is currently open.
pub trait GateSource {
    fn is_open(&self) -> bool;
}

impl SampleBuffer for Buffer<'_> {
    fn num_channels(&self) -> usize {
        self.channels()
    }

    fn num_samples(&self) -> usize {
        self.samples()
    }

    #[inline]
    fn sample(&self, channel: usize, index: usize) -> f32 {
        self.as_slice_immutable()[channel][index]
    }

    #[inline]
    fn set_sample(&mut self, channel: usize, index: usize, value: f32) {
        self.as_slice()[channel][index] = value;
    }

    #[inline]
    fn add_sample(&mut self, channel: usize, index: usize, value: f32) {
        self.as_slice()[channel][index] += value;
    }
}

impl SampleBuffer for [Vec<f32>] {
    fn num_channels(&self) -> usize {
        self.len()
    }

    /// The shortest channel decides the block length.
    fn num_samples(&self) -> usize {
        self.iter().map(Vec::len).min().unwrap_or(0)
    }

    fn sample(&self, channel: usize, index: usize) -> f32 {
        self[channel][index]
    }

    fn set_sample(&mut self, channel: usize, index: usize, value: f32) {
        self[channel][index] = value;
    }
}

impl ParameterSource for f32 {
    fn next_value(&self) -> f32 {
        *self
    }
}

/// Host parameters are read through their smoother so knob moves don't
/// produce zipper noise in the feedback path.
impl ParameterSource for FloatParam {
    #[inline]
    fn next_value(&self) -> f32 {
        self.smoothed.next()
    }
}

impl GateSource for bool {
    fn is_open(&self) -> bool {
        *self
    }
}
