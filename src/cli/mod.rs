//! CLI Module
//!
//! Command-line interface for the kplay player.

pub mod commands;

use clap::Parser;
use std::path::PathBuf;

use crate::config::OutputKind;
use crate::engine::PlaybackMode;

/// kplay - real-time WAV playback with live volume, balance, pitch and tempo control
#[derive(Parser, Debug)]
#[command(name = "kplay")]
#[command(version, about, long_about = None)]
#[command(allow_negative_numbers = true)]
pub struct Cli {
    /// Output sink
    #[arg(short, long, value_enum, default_value_t = OutputKind::PortAudio)]
    pub output: OutputKind,

    /// Also save the processed audio to this WAV file
    #[arg(short = 'f', long = "file", value_name = "FILE")]
    pub save_file: Option<PathBuf>,

    /// What happens at end of file
    #[arg(short, long, value_enum, default_value_t = PlaybackMode::Normal)]
    pub mode: PlaybackMode,

    /// Suppress the key banner and status line
    #[arg(short, long)]
    pub silent: bool,

    /// Initial master volume [0.0, 1.0]
    #[arg(short, long, value_name = "FLOAT")]
    pub volume: Option<f64>,

    /// Initial pitch ratio [0.1, 100.0]
    #[arg(short, long, value_name = "FLOAT")]
    pub pitch: Option<f64>,

    /// Initial tempo ratio [0.1, 30.0]
    #[arg(short, long, value_name = "FLOAT")]
    pub tempo: Option<f64>,

    /// WAV file to play
    #[arg(value_name = "WAVFILE")]
    pub wav_file: PathBuf,
}
