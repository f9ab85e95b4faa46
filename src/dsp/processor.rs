//! # Gated Feedback Processor
//!
//! Wraps a [`DelayLine`] in a feedback loop that only runs while the gate
//! is open:
//!
//! ```text
//! Input ──┬───────────────────────────────────────────►(+)──► Output
//!         │                                             ▲
//!         └──►(+)──► [Delay Line] ──┬── delayed ────────┘
//!              ▲                    │
//!              └──── × feedback ◄───┘
//! ```
//!
//! The output is the untouched input plus the delayed tap taken *before*
//! the feedback gain is applied. The gain only scales what goes back into
//! the line.
//!
//! ## Gate
//!
//! The gate is sampled once, at the start of each block. While it's closed
//! the block is passed through untouched and nothing is pushed into the
//! delay line, so the line's history is frozen rather than filled with
//! silence. Reopening the gate picks up exactly where it left off. A note
//! pressed in the middle of a block therefore takes effect on the next
//! block.

use nih_plug::prelude::*;

use super::delay_line::DelayLine;
use super::io::{GateSource, ParameterSource, SampleBuffer};
use crate::error::DelayError;

/// Stream-independent settings, turned into sample counts in
/// [`FeedbackProcessor::prepare()`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessorConfig {
    /// Longest delay the buffers are sized for.
    pub max_delay_seconds: f32,
    /// Delay in effect right after `prepare()`.
    pub delay_seconds: f32,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            max_delay_seconds: 5.0,
            delay_seconds: 0.5,
        }
    }
}

/// The per-block delay/feedback loop.
#[derive(Debug, Default)]
pub struct FeedbackProcessor {
    config: ProcessorConfig,
    delay_line: DelayLine,
}

impl FeedbackProcessor {
    pub fn new(config: ProcessorConfig) -> Self {
        Self {
            config,
            delay_line: DelayLine::new(),
        }
    }

    /// Size the delay line for the announced stream and apply the initial
    /// delay time. Control thread only; allocates.
    pub fn prepare(
        &mut self,
        sample_rate: f32,
        num_channels: usize,
        max_block_size: usize,
    ) -> Result<(), DelayError> {
        self.delay_line.configure(
            sample_rate,
            num_channels,
            max_block_size,
            self.config.max_delay_seconds,
        )?;

        let delay_samples =
            (self.config.delay_seconds as f64 * sample_rate as f64).round() as usize;
        self.delay_line.try_set_delay_length(delay_samples)
    }

    /// Forget all delayed audio. Doesn't allocate.
    pub fn reset(&mut self) {
        self.delay_line.clear();
    }

    /// Change the delay without reallocating. Lengths past the capacity are
    /// clamped; the length now in effect is returned.
    pub fn set_delay_length(&mut self, samples: usize) -> usize {
        self.delay_line.set_delay_length(samples)
    }

    pub fn delay_length(&self) -> usize {
        self.delay_line.delay_length()
    }

    pub fn capacity(&self) -> usize {
        self.delay_line.capacity()
    }

    /// Channels the delay line was prepared for.
    pub fn num_channels(&self) -> usize {
        self.delay_line.num_channels()
    }

    /// Run one block in place.
    ///
    /// `gate` is checked once for the whole block. `feedback` is read once
    /// per sample and shared by all channels at that sample. It's read even
    /// while the gate is closed, so a smoothed host parameter keeps ramping
    /// in step with the host's timeline instead of pausing with the gate.
    ///
    /// # Algorithm
    ///
    /// For every sample, for every channel:
    ///
    /// 1. **Pop** the delayed sample
    /// 2. **Push** `input + delayed * feedback` back into the line
    /// 3. **Add** the delayed sample on top of the input in the buffer
    ///
    /// Channels never mix. Within a channel, samples have to go in order
    /// because short delays read what earlier samples of the same block
    /// pushed.
    pub fn process_block<B, G, P>(&mut self, buffer: &mut B, gate: G, feedback: &P)
    where
        B: SampleBuffer + ?Sized,
        G: GateSource,
        P: ParameterSource + ?Sized,
    {
        if !gate.is_open() {
            // Identity on the audio, nothing pushed into the line. Only the
            // feedback source moves forward.
            for _ in 0..buffer.num_samples() {
                feedback.next_value();
            }
            return;
        }

        if !self.delay_line.is_configured() {
            nih_debug_assert_failure!(
                "{}",
                DelayError::ContractViolation("process_block() called before prepare()")
            );
            return;
        }

        let num_samples = buffer.num_samples();
        nih_debug_assert!(
            num_samples <= self.delay_line.max_block_size(),
            "block of {} samples exceeds the prepared maximum of {}",
            num_samples,
            self.delay_line.max_block_size()
        );

        // Channels we never sized a ring for are left untouched.
        nih_debug_assert!(
            buffer.num_channels() <= self.delay_line.num_channels(),
            "{}",
            DelayError::ContractViolation("more channels than prepared")
        );
        let num_channels = buffer.num_channels().min(self.delay_line.num_channels());

        for index in 0..num_samples {
            // One gain per time step. Reading it inside the channel loop
            // would advance a smoother once per channel and make stereo
            // ramps run twice as fast as mono ones.
            let gain = feedback.next_value();

            for channel in 0..num_channels {
                // Step 1: POP the sample from `delay_length` steps ago. This
                // has to happen before the push below, or a one-sample
                // delay would read the value we're about to write.
                let delayed = self.delay_line.pop_sample(channel);
                let input = buffer.sample(channel, index);

                // Step 2: PUSH the input plus the scaled echo. This is the
                // recursion: with gain 0.5 every trip around the ring comes
                // back at half the level, so echoes decay 1, 0.5, 0.25, ...
                self.delay_line.push_sample(channel, input + delayed * gain);

                // Step 3: ADD the unscaled echo on top of the dry input. The
                // gain only shapes what goes back into the line; the first
                // echo always comes out at full level.
                buffer.add_sample(channel, index, delayed);
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    fn assert_close(actual: f32, expected: f32, what: &str) {
        assert!(
            (actual - expected).abs() < 1e-6,
            "{what}: expected {expected}, got {actual}"
        );
    }

    /// A mono processor with a capacity of exactly `capacity` samples.
    fn processor(capacity: usize, delay: usize) -> FeedbackProcessor {
        let mut p = FeedbackProcessor::new(ProcessorConfig {
            max_delay_seconds: capacity as f32,
            delay_seconds: 0.0,
        });
        p.prepare(1.0, 1, 4096).unwrap();
        p.set_delay_length(delay);
        p
    }

    #[test]
    fn test_prepare_uses_reference_timing() {
        let mut p = FeedbackProcessor::default();
        p.prepare(44100.0, 2, 512).unwrap();

        assert_eq!(p.capacity(), 220_500, "5 s at 44.1 kHz");
        assert_eq!(p.delay_length(), 22_050, "0.5 s at 44.1 kHz");
    }

    #[test]
    fn test_prepare_rejects_initial_delay_past_capacity() {
        let mut p = FeedbackProcessor::new(ProcessorConfig {
            max_delay_seconds: 1.0,
            delay_seconds: 2.0,
        });
        assert_eq!(
            p.prepare(100.0, 1, 64),
            Err(DelayError::DelayExceedsCapacity {
                requested: 200,
                capacity: 100
            })
        );
    }

    /// With no feedback the wet part of the output (output - input) is the
    /// input shifted by exactly the delay length.
    #[test]
    fn test_zero_feedback_is_pure_delay() {
        const DELAY: usize = 5;
        let mut p = processor(64, DELAY);

        let input: Vec<f32> = (0..40).map(|i| ((i * 7 % 11) as f32 - 5.0) / 5.0).collect();
        let mut channels = vec![input.clone()];
        p.process_block(channels.as_mut_slice(), true, &0.0_f32);

        for (i, (&out, &dry)) in channels[0].iter().zip(&input).enumerate() {
            let expected_wet = if i >= DELAY { input[i - DELAY] } else { 0.0 };
            assert_close(out - dry, expected_wet, &format!("wet sample {i}"));
        }
    }

    /// 48 kHz, 0.5 s delay, 50% feedback, one impulse: echoes every 24000
    /// samples, each half as loud as the one before.
    #[test]
    fn test_impulse_echoes_decay_by_feedback() {
        let mut p = FeedbackProcessor::default();
        p.prepare(48000.0, 1, 48000).unwrap();
        assert_eq!(p.capacity(), 240_000);
        assert_eq!(p.delay_length(), 24_000);

        let mut block: Vec<Vec<f32>> = vec![vec![0.0; 48000]];
        block[0][0] = 1.0;
        p.process_block(block.as_mut_slice(), true, &0.5_f32);

        assert_close(block[0][0], 1.0, "dry impulse");
        assert_close(block[0][24000], 1.0, "first echo");
        for i in [1, 100, 23999, 24001, 47999] {
            assert_close(block[0][i], 0.0, &format!("sample {i}"));
        }

        let mut block: Vec<Vec<f32>> = vec![vec![0.0; 48000]];
        p.process_block(block.as_mut_slice(), true, &0.5_f32);
        assert_close(block[0][0], 0.5, "second echo");
        assert_close(block[0][24000], 0.25, "third echo");

        let mut block: Vec<Vec<f32>> = vec![vec![0.0; 48000]];
        p.process_block(block.as_mut_slice(), true, &0.5_f32);
        assert_close(block[0][0], 0.125, "fourth echo");
    }

    /// Delay 0 behaves as a one-sample feedback loop: each output is the
    /// input plus the previous step's post-feedback value.
    #[test]
    fn test_zero_delay_is_one_sample_loop() {
        let mut p = processor(16, 0);

        let mut block: Vec<Vec<f32>> = vec![vec![1.0, 0.0, 0.0, 0.0]];
        p.process_block(block.as_mut_slice(), true, &0.8_f32);

        let expected = [1.0, 1.0, 0.8, 0.64];
        for (i, (&out, &exp)) in block[0].iter().zip(&expected).enumerate() {
            assert_close(out, exp, &format!("sample {i}"));
        }
    }

    /// A closed gate leaves the buffer alone and freezes the line, so the
    /// history written before closing comes out after reopening with no gap.
    #[test]
    fn test_closed_gate_freezes_history() {
        let mut p = processor(16, 4);

        let mut block: Vec<Vec<f32>> = vec![vec![1.0, 2.0]];
        p.process_block(block.as_mut_slice(), true, &0.0_f32);

        for _ in 0..3 {
            let mut block: Vec<Vec<f32>> = vec![vec![9.0, -9.0, 9.0]];
            p.process_block(block.as_mut_slice(), false, &0.0_f32);
            assert_eq!(block, vec![vec![9.0, -9.0, 9.0]], "closed gate must be identity");
        }

        let mut block: Vec<Vec<f32>> = vec![vec![0.0; 6]];
        p.process_block(block.as_mut_slice(), true, &0.0_f32);
        let expected = [0.0, 0.0, 1.0, 2.0, 0.0, 0.0];
        for (i, (&out, &exp)) in block[0].iter().zip(&expected).enumerate() {
            assert_close(out, exp, &format!("sample {i} after reopening"));
        }
    }

    /// Counts how often the processor asks for the feedback gain.
    struct CountingSource {
        reads: Cell<usize>,
    }

    impl ParameterSource for CountingSource {
        fn next_value(&self) -> f32 {
            self.reads.set(self.reads.get() + 1);
            0.0
        }
    }

    /// The feedback source advances once per sample whether or not the
    /// gate is open, so a smoother's ramp tracks the host's timeline.
    #[test]
    fn test_feedback_source_advances_while_gate_closed() {
        let mut p = FeedbackProcessor::new(ProcessorConfig {
            max_delay_seconds: 8.0,
            delay_seconds: 2.0,
        });
        p.prepare(1.0, 2, 64).unwrap();
        let feedback = CountingSource {
            reads: Cell::new(0),
        };

        let mut block: Vec<Vec<f32>> = vec![vec![1.0; 5], vec![1.0; 5]];
        p.process_block(block.as_mut_slice(), false, &feedback);
        assert_eq!(feedback.reads.get(), 5, "one read per sample while closed");
        assert_eq!(block, vec![vec![1.0; 5], vec![1.0; 5]]);

        p.process_block(block.as_mut_slice(), true, &feedback);
        assert_eq!(
            feedback.reads.get(),
            10,
            "one read per sample, not per channel, while open"
        );
    }

    #[test]
    fn test_stereo_channels_do_not_bleed() {
        let mut p = FeedbackProcessor::new(ProcessorConfig {
            max_delay_seconds: 8.0,
            delay_seconds: 2.0,
        });
        p.prepare(1.0, 2, 64).unwrap();

        let mut block: Vec<Vec<f32>> = vec![vec![1.0, 0.0, 0.0, 0.0], vec![0.0; 4]];
        p.process_block(block.as_mut_slice(), true, &0.5_f32);

        assert_close(block[0][2], 1.0, "left echo");
        assert!(block[1].iter().all(|s| s.abs() < 1e-6), "right stays silent");
    }

    #[test]
    fn test_unprepared_processing_is_identity() {
        let mut p = FeedbackProcessor::default();

        let mut block: Vec<Vec<f32>> = vec![vec![0.5, -0.5]];
        p.process_block(block.as_mut_slice(), true, &0.5_f32);
        assert_eq!(block, vec![vec![0.5, -0.5]]);
    }

    #[test]
    fn test_unprepared_channels_are_untouched() {
        let mut p = processor(8, 1);

        let mut block: Vec<Vec<f32>> = vec![vec![1.0, 0.0], vec![1.0, 0.0]];
        p.process_block(block.as_mut_slice(), true, &0.0_f32);

        assert_close(block[0][1], 1.0, "prepared channel echoes");
        assert_eq!(block[1], vec![1.0, 0.0], "extra channel passes through");
    }

    #[test]
    fn test_reset_discards_history() {
        let mut p = processor(16, 2);

        let mut block: Vec<Vec<f32>> = vec![vec![1.0, 1.0]];
        p.process_block(block.as_mut_slice(), true, &0.5_f32);
        p.reset();

        let mut block: Vec<Vec<f32>> = vec![vec![0.0; 4]];
        p.process_block(block.as_mut_slice(), true, &0.5_f32);
        assert!(block[0].iter().all(|s| s.abs() < 1e-6));
        assert_eq!(p.delay_length(), 2, "reset keeps the delay length");
    }

    #[test]
    fn test_delay_length_clamps_to_capacity() {
        let mut p = processor(32, 4);
        assert_eq!(p.set_delay_length(33), 32);
        assert_eq!(p.delay_length(), 32);
    }
}
