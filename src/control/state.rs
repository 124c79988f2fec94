//! Control State
//!
//! The single record of mutable playback parameters, plus the adjustment
//! policy applied to it by operator keys. Only the Coordinator mutates it;
//! the status display receives copies.
//!
//! Every adjustment returns whether anything changed, so a key pressed at a
//! range boundary is a silent no-op.

use crate::engine::{PlaybackMode, TransportState};

// ============================================================================
// Constants
// ============================================================================

pub const PITCH_MIN: f64 = 0.1;
pub const PITCH_MAX: f64 = 100.0;
pub const TEMPO_MIN: f64 = 0.1;
pub const TEMPO_MAX: f64 = 30.0;

/// Additive step for volume and balance
pub const VOLUME_STEP: f64 = 0.01;

/// Multiplicative steps for pitch and tempo
const RATIO_UP: f64 = 1.01;
const RATIO_DOWN: f64 = 0.99;

/// Add `delta` and snap to the volume grid so repeated steps land exactly on 0 and 1
#[inline]
fn step_volume(value: f64, delta: f64) -> f64 {
    (((value + delta) * 100.0).round() / 100.0).clamp(0.0, 1.0)
}

// ============================================================================
// Control State
// ============================================================================

/// Mutable playback parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlState {
    pub volume_master: f64,
    pub volume_left: f64,
    pub volume_right: f64,
    pub muted: bool,
    pub pitch: f64,
    pub tempo: f64,
    pub transport: TransportState,
    pub mode: PlaybackMode,
}

impl Default for ControlState {
    fn default() -> Self {
        Self {
            volume_master: 1.0,
            volume_left: 1.0,
            volume_right: 1.0,
            muted: false,
            pitch: 1.0,
            tempo: 1.0,
            transport: TransportState::Stopped,
            mode: PlaybackMode::Normal,
        }
    }
}

impl ControlState {
    /// Initial state from validated startup values
    ///
    /// A master volume of 0.0 starts muted.
    pub fn new(volume: f64, pitch: f64, tempo: f64, mode: PlaybackMode) -> Self {
        let volume_master = volume.clamp(0.0, 1.0);
        Self {
            volume_master,
            muted: volume_master == 0.0,
            pitch: pitch.clamp(PITCH_MIN, PITCH_MAX),
            tempo: tempo.clamp(TEMPO_MIN, TEMPO_MAX),
            mode,
            ..Self::default()
        }
    }

    /// Gain sent to the gain stage for `channel` (0 = left or mono, 1 = right)
    pub fn effective_gain(&self, channel: usize) -> f64 {
        let volume = match channel {
            0 => self.volume_left,
            _ => self.volume_right,
        };
        if self.muted {
            0.0
        } else {
            volume * self.volume_master
        }
    }

    // ========================================================================
    // Volume and mute
    // ========================================================================

    pub fn volume_up(&mut self) -> bool {
        self.set_master(step_volume(self.volume_master, VOLUME_STEP))
    }

    pub fn volume_down(&mut self) -> bool {
        self.set_master(step_volume(self.volume_master, -VOLUME_STEP))
    }

    /// Master changes recompute mute: muted exactly when master is 0.0
    fn set_master(&mut self, value: f64) -> bool {
        if value == self.volume_master {
            return false;
        }
        self.volume_master = value;
        self.muted = value == 0.0;
        true
    }

    /// Toggle the zero multiplier; stored volumes are untouched
    pub fn toggle_mute(&mut self) -> bool {
        self.muted = !self.muted;
        true
    }

    // ========================================================================
    // Balance
    // ========================================================================

    /// Raise left while below 1.0, then lower right
    pub fn balance_left(&mut self) -> bool {
        Self::shift_balance(&mut self.volume_left, &mut self.volume_right)
    }

    /// Raise right while below 1.0, then lower left
    pub fn balance_right(&mut self) -> bool {
        Self::shift_balance(&mut self.volume_right, &mut self.volume_left)
    }

    pub fn balance_mid(&mut self) -> bool {
        self.volume_left = 1.0;
        self.volume_right = 1.0;
        true
    }

    fn shift_balance(toward: &mut f64, away: &mut f64) -> bool {
        if *toward < 1.0 {
            *toward = step_volume(*toward, VOLUME_STEP);
            true
        } else if *away > 0.0 {
            *away = step_volume(*away, -VOLUME_STEP);
            true
        } else {
            false
        }
    }

    // ========================================================================
    // Pitch and tempo
    // ========================================================================

    pub fn pitch_up(&mut self) -> bool {
        Self::scale(&mut self.pitch, RATIO_UP, PITCH_MIN, PITCH_MAX)
    }

    pub fn pitch_down(&mut self) -> bool {
        Self::scale(&mut self.pitch, RATIO_DOWN, PITCH_MIN, PITCH_MAX)
    }

    pub fn pitch_reset(&mut self) -> bool {
        self.pitch = 1.0;
        true
    }

    pub fn tempo_up(&mut self) -> bool {
        Self::scale(&mut self.tempo, RATIO_UP, TEMPO_MIN, TEMPO_MAX)
    }

    pub fn tempo_down(&mut self) -> bool {
        Self::scale(&mut self.tempo, RATIO_DOWN, TEMPO_MIN, TEMPO_MAX)
    }

    pub fn tempo_reset(&mut self) -> bool {
        self.tempo = 1.0;
        true
    }

    fn scale(value: &mut f64, factor: f64, min: f64, max: f64) -> bool {
        let next = (*value * factor).clamp(min, max);
        if next == *value {
            return false;
        }
        *value = next;
        true
    }
}
