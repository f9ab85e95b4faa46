//! # Keyboard State
//!
//! Tracks which notes are currently held down on each MIDI channel, so the
//! plugin can ask "is middle C pressed right now?" at the start of a block.
//!
//! Each channel is one `u128`: bit `n` is set while note `n` is held. That
//! keeps the whole state at 256 bytes with no allocation, which is what we
//! need on the audio thread.

use nih_plug::prelude::*;

use crate::dsp::io::GateSource;

/// Number of MIDI channels.
const NUM_CHANNELS: usize = 16;

/// Number of MIDI note numbers.
const NUM_NOTES: u8 = 128;

/// Channel mode message: silence everything on the channel right away.
const CC_ALL_SOUND_OFF: u8 = 120;

/// Channel mode message: release every held note on the channel. This is
/// what a controller's "panic" button sends.
const CC_ALL_NOTES_OFF: u8 = 123;

/// Held notes, per MIDI channel.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct KeyboardState {
    held: [u128; NUM_CHANNELS],
}

impl KeyboardState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one host note event into the state.
    ///
    /// A note-on with zero velocity counts as a release. All Sound Off and
    /// All Notes Off release every note on their channel. Anything else is
    /// ignored.
    pub fn process_event<S>(&mut self, event: &NoteEvent<S>) {
        match *event {
            NoteEvent::NoteOn {
                channel,
                note,
                velocity,
                ..
            } => {
                if velocity > 0.0 {
                    self.note_on(channel, note);
                } else {
                    self.note_off(channel, note);
                }
            }
            NoteEvent::NoteOff { channel, note, .. } | NoteEvent::Choke { channel, note, .. } => {
                self.note_off(channel, note);
            }
            NoteEvent::MidiCC { channel, cc, .. }
                if cc == CC_ALL_SOUND_OFF || cc == CC_ALL_NOTES_OFF =>
            {
                self.all_notes_off(Some(channel));
            }
            _ => (),
        }
    }

    /// Mark `note` as held. Out-of-range channels or notes are ignored.
    pub fn note_on(&mut self, channel: u8, note: u8) {
        if let Some(mask) = note_mask(note) {
            if let Some(held) = self.held.get_mut(channel as usize) {
                *held |= mask;
            }
        }
    }

    /// Mark `note` as released. Out-of-range channels or notes are ignored.
    pub fn note_off(&mut self, channel: u8, note: u8) {
        if let Some(mask) = note_mask(note) {
            if let Some(held) = self.held.get_mut(channel as usize) {
                *held &= !mask;
            }
        }
    }

    /// Release every note on `channel`, or on all channels for `None`.
    pub fn all_notes_off(&mut self, channel: Option<u8>) {
        match channel {
            Some(channel) => {
                if let Some(held) = self.held.get_mut(channel as usize) {
                    *held = 0;
                }
            }
            None => self.held.fill(0),
        }
    }

    pub fn is_note_on(&self, channel: u8, note: u8) -> bool {
        match (note_mask(note), self.held.get(channel as usize)) {
            (Some(mask), Some(held)) => held & mask != 0,
            _ => false,
        }
    }

    /// A gate that is open while `note` is held on `channel`.
    pub fn gate(&self, channel: u8, note: u8) -> NoteGate<'_> {
        NoteGate {
            keyboard: self,
            channel,
            note,
        }
    }
}

fn note_mask(note: u8) -> Option<u128> {
    (note < NUM_NOTES).then(|| 1u128 << note)
}

/// One fixed note on one channel, viewed as a gate.
#[derive(Debug, Clone, Copy)]
pub struct NoteGate<'a> {
    keyboard: &'a KeyboardState,
    channel: u8,
    note: u8,
}

impl GateSource for NoteGate<'_> {
    fn is_open(&self) -> bool {
        self.keyboard.is_note_on(self.channel, self.note)
    }
}
