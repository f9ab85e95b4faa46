//! # Delay Line (Multi-Channel Ring Buffer)
//!
//! A delay line stores audio samples and hands them back a fixed number of
//! samples later. Each channel owns its own circular buffer and its own
//! write cursor; all channels share one capacity and one delay length.
//!
//! ## Pop, then push
//!
//! Every sample step on a channel is exactly one [`pop_sample`] followed by
//! exactly one [`push_sample`]:
//!
//! ```text
//!            write cursor (next slot to overwrite)
//!                 │
//!   ┌───┬───┬───┬─▼─┬───┬───┬───┬───┐
//!   │ e │ f │ g │ a │ b │ c │ d │ e'│   capacity = 8
//!   └───┴───┴─▲─┴───┴───┴───┴───┴───┘
//!             │
//!   read = write - delay_length (mod capacity), delay_length = 1
//! ```
//!
//! Reading before writing means the old value is always fetched before the
//! slot is overwritten, so a read never sees the sample being written in the
//! same step.
//!
//! A delay length of 0 can't mean "the value being written right now"
//! (that value doesn't exist yet when we read), so it reads the most recent
//! push, exactly like a delay of 1.
//!
//! [`pop_sample`]: DelayLine::pop_sample
//! [`push_sample`]: DelayLine::push_sample

use nih_plug::prelude::*;

use crate::error::DelayError;

/// A fixed-capacity ring buffer per audio channel.
///
/// The buffers are allocated once in [`configure()`](Self::configure) on the
/// control thread. Everything after that (pops, pushes, delay length
/// changes up to the capacity) is allocation-free and safe to run on the
/// audio thread.
#[derive(Debug, Default)]
pub struct DelayLine {
    /// One circular buffer per channel, each `capacity` samples long.
    buffers: Vec<Vec<f32>>,

    /// Per-channel write cursor. Always points at the next slot to be
    /// overwritten.
    write_pos: Vec<usize>,

    /// Number of slots in every channel buffer. Zero until configured.
    capacity: usize,

    /// Active delay in samples, always `<= capacity`.
    delay_length: usize,

    /// The largest block the host promised to send.
    max_block_size: usize,
}

impl DelayLine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Size the per-channel buffers for `max_delay_seconds` of audio at
    /// `sample_rate` (rounded up to whole samples) and rewind every cursor.
    ///
    /// Buffers are replaced with silence. The active delay length is kept,
    /// clamped to the new capacity.
    ///
    /// Must not run concurrently with [`pop_sample()`](Self::pop_sample) or
    /// [`push_sample()`](Self::push_sample); the host suspends processing
    /// around stream reconfiguration.
    pub fn configure(
        &mut self,
        sample_rate: f32,
        num_channels: usize,
        max_block_size: usize,
        max_delay_seconds: f32,
    ) -> Result<(), DelayError> {
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(DelayError::InvalidConfig("sample rate must be positive"));
        }
        if !(max_delay_seconds.is_finite() && max_delay_seconds > 0.0) {
            return Err(DelayError::InvalidConfig(
                "maximum delay time must be positive",
            ));
        }
        if num_channels == 0 {
            return Err(DelayError::InvalidConfig("at least one channel is required"));
        }

        // seconds * sample_rate = samples, e.g. 5 s at 48 kHz is 240000
        // samples, about 940 KB of f32 per channel. Rounding up means the
        // full `max_delay_seconds` always fits even when the product is
        // fractional. The multiply is done in f64 so large rates don't lose
        // whole samples to f32 precision.
        let capacity = (max_delay_seconds as f64 * sample_rate as f64).ceil() as usize;
        if capacity == 0 {
            return Err(DelayError::InvalidConfig("delay capacity rounds to zero"));
        }

        self.buffers = (0..num_channels).map(|_| vec![0.0; capacity]).collect();
        self.write_pos = vec![0; num_channels];
        self.capacity = capacity;
        self.delay_length = self.delay_length.min(capacity);
        self.max_block_size = max_block_size;

        Ok(())
    }

    /// Set the active delay length, refusing anything the buffer can't hold.
    /// On error the previous delay length is kept.
    pub fn try_set_delay_length(&mut self, samples: usize) -> Result<(), DelayError> {
        if samples > self.capacity {
            return Err(DelayError::DelayExceedsCapacity {
                requested: samples,
                capacity: self.capacity,
            });
        }

        self.delay_length = samples;
        Ok(())
    }

    /// Set the active delay length, clamping to the capacity instead of
    /// failing. Returns the delay length that is now in effect.
    pub fn set_delay_length(&mut self, samples: usize) -> usize {
        if let Err(err) = self.try_set_delay_length(samples) {
            nih_debug_assert_failure!("{}", err);
            self.delay_length = self.capacity;
        }

        self.delay_length
    }

    /// Read the sample `delay_length` steps behind `channel`'s write cursor.
    ///
    /// Doesn't touch any state, so calling it twice without a push in
    /// between returns the same value.
    ///
    /// Panics if `channel` is out of range or the line was never configured.
    #[inline]
    pub fn pop_sample(&self, channel: usize) -> f32 {
        // The slot under the write cursor hasn't been written for this step
        // yet: it still holds the sample from `capacity` steps ago. So a
        // delay of 0 can't be served from it. The most recent push sits one
        // slot back, which is why 0 reads the same place as 1.
        let offset = self.delay_length.max(1);

        // Go back `offset` slots on the ring. Adding `capacity` before
        // subtracting keeps the `usize` from underflowing; since
        // `1 <= offset <= capacity`, the sum is never negative and never
        // wraps more than once.
        //
        // Example: `write_pos = 2`, `offset = 5`, `capacity = 8`:
        // ```text
        // (2 + 8 - 5) % 8 = 5
        // ```
        // Slot 5 is five steps behind slot 2 on a ring of 8.
        let read_pos = (self.write_pos[channel] + self.capacity - offset) % self.capacity;

        self.buffers[channel][read_pos]
    }

    /// Store `value` at `channel`'s write cursor and advance the cursor.
    ///
    /// Call exactly once per sample, after the matching
    /// [`pop_sample()`](Self::pop_sample).
    #[inline]
    pub fn push_sample(&mut self, channel: usize, value: f32) {
        let pos = self.write_pos[channel];
        self.buffers[channel][pos] = value;

        // Step forward, wrapping back to slot 0 past the end of the ring.
        // The overwritten slot is now the newest sample; the one under the
        // new cursor is the oldest, and the next push will replace it.
        self.write_pos[channel] = (pos + 1) % self.capacity;
    }

    /// Fill every buffer with silence and rewind the cursors. Doesn't
    /// allocate.
    pub fn clear(&mut self) {
        for buffer in &mut self.buffers {
            buffer.fill(0.0);
        }
        self.write_pos.fill(0);
    }

    pub fn is_configured(&self) -> bool {
        self.capacity > 0
    }

    pub fn num_channels(&self) -> usize {
        self.buffers.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn delay_length(&self) -> usize {
        self.delay_length
    }

    pub fn max_block_size(&self) -> usize {
        self.max_block_size
    }

    #[cfg(test)]
    fn write_pos(&self, channel: usize) -> usize {
        self.write_pos[channel]
    }
}

// ─────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────
