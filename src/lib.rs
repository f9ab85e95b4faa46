//! # Expressive Delay: A Note-Gated Feedback Delay
//!
//! A feedback delay that only runs while a key is held. Hold middle C
//! (note 60 on MIDI channel 1) and the input is fed through a half-second
//! delay with adjustable feedback; let go and the audio passes through
//! untouched while the delay's memory waits, frozen, for the next press.
//!
//! Built with [nih-plug](https://github.com/robbert-vdh/nih-plug); ships
//! as CLAP, VST3 and AUv2.
//!
//! ## Signal Flow
//!
//! ```text
//!  MIDI ──► [Keyboard State] ──► gate (C4 held?) ─────┐ checked once per block
//!                                                     ▼
//! Input ──┬──────────────────────────────────────────(+)──► Output
//!         │                                           ▲
//!         └──►(+)──► [Delay Line, 0.5 s] ──┬──────────┘
//!              ▲                           │
//!              └─────── × feedback ◄───────┘
//! ```

pub mod dsp;
pub mod error;
pub mod keyboard;
mod params;

use std::num::NonZeroU32;
use std::sync::Arc;

use dsp::io::SampleBuffer;
use dsp::processor::{FeedbackProcessor, ProcessorConfig};
use error::DelayError;
use keyboard::KeyboardState;
use nih_plug::prelude::*;
use params::PluginParams;

/// MIDI channel of the gate note (zero-based, so this is channel 1).
const GATE_CHANNEL: u8 = 0;

/// The gate note: middle C.
const GATE_NOTE: u8 = 60;

/// The main plugin struct.
///
/// Parameters are shared with the host through an `Arc`; everything else is
/// owned by the audio thread and only touched in `process()`, or in
/// `initialize()`/`reset()`/`deactivate()` while the host has processing
/// suspended.
struct ExpressiveDelay {
    params: Arc<PluginParams>,

    /// The delay/feedback loop. Sized in `initialize()`.
    processor: FeedbackProcessor,

    /// Which notes are held, updated from the block's note events before
    /// the gate is read.
    keyboard: KeyboardState,
}

impl Default for ExpressiveDelay {
    fn default() -> Self {
        Self {
            params: Arc::new(PluginParams::default()),
            processor: FeedbackProcessor::new(ProcessorConfig::default()),
            keyboard: KeyboardState::new(),
        }
    }
}

impl Plugin for ExpressiveDelay {
    const NAME: &'static str = "Expressive Delay";
    const VENDOR: &'static str = "Expressive Audio";
    const URL: &'static str = "";
    const EMAIL: &'static str = "";
    const VERSION: &'static str = env!("CARGO_PKG_VERSION");

    // Stereo first since that's what most tracks are; mono as a fallback.
    // Input and output always match.
    const AUDIO_IO_LAYOUTS: &'static [AudioIOLayout] = &[
        AudioIOLayout {
            main_input_channels: NonZeroU32::new(2),
            main_output_channels: NonZeroU32::new(2),
            aux_input_ports: &[],
            aux_output_ports: &[],
            names: PortNames::const_default(),
        },
        AudioIOLayout {
            main_input_channels: NonZeroU32::new(1),
            main_output_channels: NonZeroU32::new(1),
            aux_input_ports: &[],
            aux_output_ports: &[],
            names: PortNames::const_default(),
        },
    ];

    // Note on/off drives the gate. CCs are needed too, so All Notes Off
    // and All Sound Off from a controller's panic button can release a
    // stuck gate note.
    const MIDI_INPUT: MidiConfig = MidiConfig::MidiCCs;

    // With sample-accurate automation nih-plug splits the host's block at
    // every parameter change and calls `process()` once per piece. The gate
    // would then be re-read mid-block, wherever the host happened to put an
    // automation point. The feedback knob is smoothed per sample anyway,
    // so we keep whole host blocks and read the gate once per block.
    const SAMPLE_ACCURATE_AUTOMATION: bool = false;

    type SysExMessage = ();
    type BackgroundTask = ();

    fn params(&self) -> Arc<dyn Params> {
        self.params.clone()
    }

    /// Allocate the delay buffers for the host's stream configuration.
    ///
    /// Returning `false` tells the host we can't run with this
    /// configuration.
    fn initialize(
        &mut self,
        audio_io_layout: &AudioIOLayout,
        buffer_config: &BufferConfig,
        _context: &mut impl InitContext<Self>,
    ) -> bool {
        match self.prepare_stream(audio_io_layout, buffer_config) {
            Ok(num_channels) => {
                nih_log!(
                    "Prepared {} channel(s) at {} Hz: capacity {} samples, delay {} samples",
                    num_channels,
                    buffer_config.sample_rate,
                    self.processor.capacity(),
                    self.processor.delay_length()
                );
                true
            }
            Err(err) => {
                nih_error!("Could not prepare the delay line: {}", err);
                false
            }
        }
    }

    /// Clear the delay buffers so stale echoes don't bleed into the next
    /// playback. Called from the audio thread, so no allocation here.
    fn reset(&mut self) {
        self.processor.reset();
    }

    /// Nothing to free beyond what drops with the plugin. Held notes are
    /// forgotten so a missed note-off can't leave the gate stuck open after
    /// the stream restarts.
    fn deactivate(&mut self) {
        self.keyboard.all_notes_off(None);
        nih_trace!("Deactivated, all held notes released");
    }

    fn process(
        &mut self,
        buffer: &mut Buffer,
        _aux: &mut AuxiliaryBuffers,
        context: &mut impl ProcessContext<Self>,
    ) -> ProcessStatus {
        self.run_block(buffer, std::iter::from_fn(|| context.next_event()));

        ProcessStatus::Normal
    }
}

impl ExpressiveDelay {
    /// Size the processor for the host's layout and buffer settings.
    /// Returns the number of channels it was prepared for.
    fn prepare_stream(
        &mut self,
        audio_io_layout: &AudioIOLayout,
        buffer_config: &BufferConfig,
    ) -> Result<usize, DelayError> {
        // Input and output channel counts always match in our layouts, so
        // the main input decides how many rings we need.
        let num_channels = audio_io_layout
            .main_input_channels
            .map(|c| c.get() as usize)
            .unwrap_or(2);

        self.processor.prepare(
            buffer_config.sample_rate,
            num_channels,
            buffer_config.max_buffer_size as usize,
        )?;

        Ok(num_channels)
    }

    /// One host block: apply every note event first, then look at the gate
    /// once. A press halfway through the block opens the gate for the next
    /// block, not for the rest of this one.
    fn run_block<B, E>(&mut self, buffer: &mut B, events: E)
    where
        B: SampleBuffer + ?Sized,
        E: IntoIterator<Item = NoteEvent<()>>,
    {
        for event in events {
            self.keyboard.process_event(&event);
        }

        let gate = self.keyboard.gate(GATE_CHANNEL, GATE_NOTE);
        self.processor.process_block(buffer, gate, &self.params.feedback);
    }
}

impl ClapPlugin for ExpressiveDelay {
    const CLAP_ID: &'static str = "com.expressive-audio.expressive-delay";
    const CLAP_DESCRIPTION: Option<&'static str> =
        Some("A feedback delay that runs while middle C is held");
    const CLAP_MANUAL_URL: Option<&'static str> = None;
    const CLAP_SUPPORT_URL: Option<&'static str> = None;
    const CLAP_FEATURES: &'static [ClapFeature] = &[
        ClapFeature::AudioEffect,
        ClapFeature::Stereo,
        ClapFeature::Mono,
        ClapFeature::Delay,
    ];
}

impl Vst3Plugin for ExpressiveDelay {
    const VST3_CLASS_ID: [u8; 16] = *b"ExprssveDelay001";
    const VST3_SUBCATEGORIES: &'static [Vst3SubCategory] =
        &[Vst3SubCategory::Fx, Vst3SubCategory::Delay];
}

// Entry points the hosts use to create plugin instances: `clap_entry` for
// CLAP, `GetPluginFactory` for VST3, and an AUv2 factory wrapped around the
// CLAP entry for Logic Pro.
nih_export_clap!(ExpressiveDelay);
nih_export_vst3!(ExpressiveDelay);
clap_wrapper::export_auv2!();
