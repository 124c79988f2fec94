//! Player configuration
//!
//! Built once from the command line. Out-of-range values are clamped and
//! reported as warnings; values that cannot be given a meaning are errors.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::cli::Cli;
use crate::control::state::{PITCH_MAX, PITCH_MIN, TEMPO_MAX, TEMPO_MIN};
use crate::engine::PlaybackMode;
use crate::error::{KplayError, Result};

/// Default fade ramp length
pub const DEFAULT_FADE: Duration = Duration::from_millis(300);

/// Where the processed audio goes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, clap::ValueEnum)]
pub enum OutputKind {
    #[default]
    #[value(name = "portaudio")]
    PortAudio,
    #[value(name = "alsa")]
    Alsa,
    #[value(name = "tinyalsa")]
    TinyAlsa,
    /// Raw native-format bytes on standard output
    #[value(name = "stdout")]
    Stdout,
    /// Discard everything
    #[value(name = "null")]
    Null,
}

impl OutputKind {
    /// Name of the sink stage implementation
    pub fn stage_name(self) -> &'static str {
        match self {
            OutputKind::PortAudio => "portaudio-playback",
            OutputKind::Alsa => "alsa-playback",
            OutputKind::TinyAlsa => "tinyalsa-playback",
            OutputKind::Stdout => "byte-sink",
            OutputKind::Null => "discard-sink",
        }
    }

    /// Whether this sink is an audio device
    pub fn is_device(self) -> bool {
        matches!(
            self,
            OutputKind::PortAudio | OutputKind::Alsa | OutputKind::TinyAlsa
        )
    }
}

/// How the reference engine paces its real-time loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Pacing {
    /// One period per period duration, or as fast as a clocked device sink accepts
    #[default]
    Realtime,
    /// As fast as possible
    FreeRunning,
}

/// A value that was clamped into range
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConfigWarning {
    VolumeTooHigh(f64),
    PitchTooHigh(f64),
    PitchTooLow(f64),
    TempoTooFast(f64),
    TempoTooSlow(f64),
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigWarning::VolumeTooHigh(v) => write!(f, "'-v {v}' is too high, defaulting to 1.0"),
            ConfigWarning::PitchTooHigh(v) => {
                write!(f, "'-p {v}' is too high, defaulting to {PITCH_MAX}")
            }
            ConfigWarning::PitchTooLow(v) => {
                write!(f, "'-p {v}' is too low, defaulting to {PITCH_MIN}")
            }
            ConfigWarning::TempoTooFast(v) => {
                write!(f, "'-t {v}' is too fast, defaulting to {TEMPO_MAX}")
            }
            ConfigWarning::TempoTooSlow(v) => {
                write!(f, "'-t {v}' is too slow, defaulting to {TEMPO_MIN}")
            }
        }
    }
}

/// Everything a playback session needs to know
#[derive(Debug, Clone)]
pub struct PlayerConfig {
    pub wav_path: PathBuf,
    pub output: OutputKind,
    pub save_path: Option<PathBuf>,
    pub mode: PlaybackMode,
    /// Suppress the banner and status line
    pub quiet: bool,
    /// Initial master volume in [0, 1]
    pub volume: f64,
    pub pitch: f64,
    pub tempo: f64,
    /// Fade-in ramp at the start of every run, `None` to disable
    pub fade_in: Option<Duration>,
    pub fade_out: Duration,
    pub pacing: Pacing,
}

impl PlayerConfig {
    /// Defaults for a file
    pub fn new(wav_path: impl Into<PathBuf>) -> Self {
        Self {
            wav_path: wav_path.into(),
            output: OutputKind::default(),
            save_path: None,
            mode: PlaybackMode::default(),
            quiet: false,
            volume: 1.0,
            pitch: 1.0,
            tempo: 1.0,
            fade_in: Some(DEFAULT_FADE),
            fade_out: DEFAULT_FADE,
            pacing: Pacing::default(),
        }
    }

    /// Validate command-line values
    ///
    /// # Returns
    /// The config and any clamp warnings to show the operator.
    ///
    /// # Errors
    /// `InvalidArgument` for a negative volume, a zero pitch or tempo, or NaN.
    pub fn from_cli(cli: &Cli) -> Result<(Self, Vec<ConfigWarning>)> {
        let mut warnings = Vec::new();
        let mut config = Self::new(&cli.wav_file);
        config.output = cli.output;
        config.save_path = cli.save_file.clone();
        config.mode = cli.mode;
        config.quiet = cli.silent;

        if let Some(volume) = cli.volume {
            let (value, warning) = validate_volume(volume)?;
            config.volume = value;
            warnings.extend(warning);
        }
        if let Some(pitch) = cli.pitch {
            let (value, warning) = validate_pitch(pitch)?;
            config.pitch = value;
            warnings.extend(warning);
        }
        if let Some(tempo) = cli.tempo {
            let (value, warning) = validate_tempo(tempo)?;
            config.tempo = value;
            warnings.extend(warning);
        }

        Ok((config, warnings))
    }
}

/// `-v`: negative is an error, above 1.0 clamps
pub fn validate_volume(volume: f64) -> Result<(f64, Option<ConfigWarning>)> {
    if volume.is_nan() || volume < 0.0 {
        return Err(invalid("-v", volume, "volume must not be negative"));
    }
    if volume > 1.0 {
        return Ok((1.0, Some(ConfigWarning::VolumeTooHigh(volume))));
    }
    Ok((volume, None))
}

/// `-p`: zero is an error, out of range clamps
pub fn validate_pitch(pitch: f64) -> Result<(f64, Option<ConfigWarning>)> {
    if pitch.is_nan() || pitch == 0.0 {
        return Err(invalid("-p", pitch, "pitch must not be zero"));
    }
    if pitch > PITCH_MAX {
        return Ok((PITCH_MAX, Some(ConfigWarning::PitchTooHigh(pitch))));
    }
    if pitch < PITCH_MIN {
        return Ok((PITCH_MIN, Some(ConfigWarning::PitchTooLow(pitch))));
    }
    Ok((pitch, None))
}

/// `-t`: zero is an error, out of range clamps
pub fn validate_tempo(tempo: f64) -> Result<(f64, Option<ConfigWarning>)> {
    if tempo.is_nan() || tempo == 0.0 {
        return Err(invalid("-t", tempo, "tempo must not be zero"));
    }
    if tempo > TEMPO_MAX {
        return Ok((TEMPO_MAX, Some(ConfigWarning::TempoTooFast(tempo))));
    }
    if tempo < TEMPO_MIN {
        return Ok((TEMPO_MIN, Some(ConfigWarning::TempoTooSlow(tempo))));
    }
    Ok((tempo, None))
}

fn invalid(flag: &'static str, value: f64, reason: &'static str) -> KplayError {
    KplayError::InvalidArgument {
        flag,
        value: value.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_defaults() {
        let config = PlayerConfig::new("song.wav");
        assert_eq!(config.output, OutputKind::PortAudio);
        assert_eq!(config.mode, PlaybackMode::Normal);
        assert_eq!(config.volume, 1.0);
        assert_eq!(config.fade_in, Some(DEFAULT_FADE));
    }

    #[test]
    fn test_volume_rules() {
        assert_eq!(validate_volume(0.5).unwrap(), (0.5, None));
        assert_eq!(validate_volume(0.0).unwrap(), (0.0, None));
        assert_eq!(
            validate_volume(2.0).unwrap(),
            (1.0, Some(ConfigWarning::VolumeTooHigh(2.0)))
        );
        assert!(validate_volume(-0.1).is_err());
    }

    #[test_case(0.0 ; "zero")]
    #[test_case(f64::NAN ; "nan")]
    fn test_pitch_and_tempo_reject(value: f64) {
        assert!(validate_pitch(value).is_err());
        assert!(validate_tempo(value).is_err());
    }

    #[test_case(500.0, 100.0 ; "pitch above range")]
    #[test_case(0.01, 0.1 ; "pitch below range")]
    #[test_case(-3.0, 0.1 ; "negative pitch clamps low")]
    fn test_pitch_clamps(input: f64, expected: f64) {
        let (value, warning) = validate_pitch(input).unwrap();
        assert_eq!(value, expected);
        assert!(warning.is_some());
    }

    #[test]
    fn test_tempo_clamps() {
        assert_eq!(validate_tempo(31.0).unwrap().0, TEMPO_MAX);
        assert_eq!(validate_tempo(0.05).unwrap().0, TEMPO_MIN);
        assert_eq!(validate_tempo(2.0).unwrap(), (2.0, None));
    }

    #[test]
    fn test_warning_text() {
        assert_eq!(
            ConfigWarning::PitchTooHigh(120.0).to_string(),
            "'-p 120' is too high, defaulting to 100"
        );
    }
}
