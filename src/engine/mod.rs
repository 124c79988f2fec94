//! Audio Engine Module
//!
//! Core playback building blocks:
//! - Audio formats and sample conversion
//! - WAV source reader
//! - Audio blocks travelling over links
//! - Transport state machine

pub mod buffer;
pub mod format;
pub mod source;
pub mod transport;

pub use buffer::{AudioBlock, BlockData};
pub use format::{AudioFormatDescriptor, BitDepth, ChannelLayout, LinkFormat, SampleFormat};
pub use source::{FrameSource, ReadOutcome, WavSource, PROGRESS_FULL};
pub use transport::{PlaybackMode, TransportCommand, TransportMachine, TransportState};
