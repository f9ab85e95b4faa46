//! # Plugin Parameters
//!
//! The plugin exposes a single knob, **Feedback**. Its `#[id]` is what the
//! host stores in presets and session state, so it must never change once
//! released. nih-plug saves and restores every `#[id]` parameter on its own;
//! that is the whole of the plugin's persisted state.

use nih_plug::prelude::*;

/// All user-facing parameters for Expressive Delay.
#[derive(Params)]
pub struct PluginParams {
    /// **Feedback**: how much of the delayed signal is fed back into the
    /// delay line.
    ///
    /// - 0% = one echo per held note
    /// - 50% = each repeat at half the level of the one before
    /// - 100% = repeats never decay while the note is held
    ///
    /// Range: 0% to 100%. Default: 50%.
    #[id = "feedback"]
    pub feedback: FloatParam,
}

impl Default for PluginParams {
    fn default() -> Self {
        Self {
            feedback: FloatParam::new("Feedback", 0.5, FloatRange::Linear { min: 0.0, max: 1.0 })
                .with_unit("%")
                .with_smoother(SmoothingStyle::Linear(20.0))
                // Display as percentage: 0.5 → "50.0%"
                .with_value_to_string(formatters::v2s_f32_percentage(1))
                .with_string_to_value(formatters::s2v_f32_percentage()),
        }
    }
}
