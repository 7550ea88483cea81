//! Note keyboard: semitone frequencies for `PLAY_NOTE`.
//!
//! `freq = base × 2^(semitone / 12) × 2^(octave_shift)`
//!
//! Twenty-four letter keys map to semitones 0..=23 above the base frequency.
//! `o` and `p` transpose down and up by one octave, clamped to
//! [`OCTAVE_SHIFT_RANGE`].

use crate::config::{NoteSettings, OCTAVE_SHIFT_RANGE};
use crate::error::{AppResult, DriveError};
use crate::motion::MotionModel;
use tracing::info;

/// Keys in semitone order.
pub const KEY_SEQUENCE: [char; 24] = [
    'z', 'x', 'c', 'v', 'b', 'n', 'm', 'a', 's', 'd', 'f', 'g', 'h', 'j', 'k', 'l', 'q', 'w',
    'e', 'r', 't', 'y', 'u', 'i',
];

/// Frequency of `semitone` above `base_hz`, transposed by whole octaves.
pub fn note_frequency(base_hz: f64, semitone: i32, octave_shift: i32) -> f64 {
    base_hz * 2f64.powf(f64::from(semitone) / 12.0) * 2f64.powi(octave_shift)
}

/// What a key press means on the note keyboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    /// Play the semitone at this index.
    Note(usize),
    /// Transpose one octave down.
    OctaveDown,
    /// Transpose one octave up.
    OctaveUp,
}

/// Map a key to its action. Case-insensitive.
pub fn key_action(key: char) -> Option<KeyAction> {
    let key = key.to_ascii_lowercase();
    match key {
        'o' => Some(KeyAction::OctaveDown),
        'p' => Some(KeyAction::OctaveUp),
        _ => KEY_SEQUENCE
            .iter()
            .position(|&k| k == key)
            .map(KeyAction::Note),
    }
}

/// A note that was sent to the motor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayedNote {
    /// Semitone index above the base.
    pub semitone: usize,
    /// Hz
    pub frequency: f64,
    /// Milliseconds
    pub duration_ms: u32,
}

/// Keyboard state plus the settings that feed `play_note`.
#[derive(Debug, Clone, Default)]
pub struct NotePlayer {
    settings: NoteSettings,
}

impl NotePlayer {
    /// Player with the given settings.
    pub fn new(settings: NoteSettings) -> Self {
        Self { settings }
    }

    /// Current settings, including the live octave shift.
    pub fn settings(&self) -> &NoteSettings {
        &self.settings
    }

    /// Shift by `delta` octaves, clamped. Returns the new shift.
    pub fn shift_octave(&mut self, delta: i32) -> i32 {
        let shifted = self.settings.octave_shift.saturating_add(delta);
        self.settings.octave_shift =
            shifted.clamp(*OCTAVE_SHIFT_RANGE.start(), *OCTAVE_SHIFT_RANGE.end());
        self.settings.octave_shift
    }

    /// Frequency for `semitone` under the current settings.
    pub fn frequency_for(&self, semitone: usize) -> f64 {
        let semitone = i32::try_from(semitone).unwrap_or(i32::MAX);
        note_frequency(
            self.settings.base_frequency_hz,
            semitone,
            self.settings.octave_shift,
        )
    }

    /// Send `PLAY_NOTE` for `semitone`.
    pub fn play_semitone(
        &self,
        model: &mut MotionModel,
        semitone: usize,
    ) -> AppResult<PlayedNote> {
        if semitone >= KEY_SEQUENCE.len() {
            return Err(DriveError::InvalidArgument(format!(
                "semitone {} outside 0..{}",
                semitone,
                KEY_SEQUENCE.len()
            )));
        }

        let note = PlayedNote {
            semitone,
            frequency: self.frequency_for(semitone),
            duration_ms: self.settings.duration_ms,
        };
        model.play_note(note.frequency, note.duration_ms)?;
        info!(
            "Note {}: {:.2} Hz, Duration: {} ms",
            note.semitone, note.frequency, note.duration_ms
        );
        Ok(note)
    }

    /// Handle a keyboard key. Returns `None` for keys with no meaning.
    pub fn press_key(
        &mut self,
        model: &mut MotionModel,
        key: char,
    ) -> AppResult<Option<KeyOutcome>> {
        let outcome = match key_action(key) {
            Some(KeyAction::Note(idx)) => KeyOutcome::Played(self.play_semitone(model, idx)?),
            Some(KeyAction::OctaveDown) => KeyOutcome::Octave(self.shift_octave(-1)),
            Some(KeyAction::OctaveUp) => KeyOutcome::Octave(self.shift_octave(1)),
            None => return Ok(None),
        };
        Ok(Some(outcome))
    }
}

/// Result of a handled key press.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KeyOutcome {
    /// A note was sent.
    Played(PlayedNote),
    /// The octave shift changed (or was already at its limit).
    Octave(i32),
}
