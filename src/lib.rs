//! kplay - Real-Time WAV Playback Controller
//!
//! Streams PCM audio from a WAV file through a chain of processing stages
//! to an output sink while an operator, or a scripted batch run, changes
//! volume, balance, pitch, tempo and transport state at any moment.
//!
//! # Architecture
//!
//! - `engine`: formats, the source reader, audio blocks and the transport state machine
//! - `pipeline`: the engine boundary, the declarative topology and the reference engine
//! - `dsp`: stage processors run by the reference engine
//! - `control`: Control State, the Event Queue, the Coordinator, input and status
//!
//! The Coordinator is the only code that mutates Control State or commands
//! the engine. Every other thread talks to it through the Event Queue.

pub mod cli;
pub mod config;
pub mod control;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod pipeline;

pub use error::{KplayError, Result};
