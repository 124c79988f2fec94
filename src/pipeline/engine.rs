//! Pipeline engine boundary
//!
//! The engine owns the real-time thread, the stage instances and the links
//! between them. The Coordinator only talks to it through this trait, with
//! typed parameters instead of string arguments.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::OutputKind;
use crate::engine::{FrameSource, LinkFormat};
use crate::error::EngineError;

/// Handle to a stage created by an engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StageId(pub usize);

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One end of a link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Port {
    pub stage: StageId,
    pub index: usize,
}

impl Port {
    pub fn new(stage: StageId, index: usize) -> Self {
        Self { stage, index }
    }
}

/// A typed connection between an output port and an input port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkSpec {
    pub format: LinkFormat,
    pub from: Port,
    pub to: Port,
}

/// Stage implementations an engine may provide
#[derive(Clone)]
pub enum StageKind {
    /// Pulls native frames from a source, blocking
    StreamIn { source: Arc<dyn FrameSource> },
    /// Linear ramp up at the start of every run
    FadeIn { duration: Duration },
    /// Converts between the link formats on either side
    FormatAdapter,
    /// One stereo stream to two mono streams
    Deinterleave,
    /// One port per channel, independent gain on each
    Gain { channels: usize },
    /// Two mono streams to one stereo stream
    Interleave,
    /// Pitch and tempo shifting
    PitchTempo,
    /// Copies input to output unchanged
    PassThrough,
    /// Ramp down on demand, then end the run
    FadeOut { duration: Duration },
    /// Copies one stream to two outputs
    Duplicator,
    /// Writes the stream to a WAV file
    FileWriter { path: PathBuf },
    /// Final sink selected by `-o`
    Output(OutputKind),
}

impl StageKind {
    /// Short implementation name used in logs and errors
    pub fn name(&self) -> &'static str {
        match self {
            StageKind::StreamIn { .. } => "stream-in",
            StageKind::FadeIn { .. } => "fade-in",
            StageKind::FormatAdapter => "format-adapter",
            StageKind::Deinterleave => "deinterleave",
            StageKind::Gain { .. } => "gain",
            StageKind::Interleave => "interleave",
            StageKind::PitchTempo => "pitch-tempo",
            StageKind::PassThrough => "pass-through",
            StageKind::FadeOut { .. } => "fade-out",
            StageKind::Duplicator => "duplicator",
            StageKind::FileWriter { .. } => "file-writer",
            StageKind::Output(kind) => kind.stage_name(),
        }
    }

    /// Number of (input, output) ports
    pub fn ports(&self) -> (usize, usize) {
        match self {
            StageKind::StreamIn { .. } => (0, 1),
            StageKind::Deinterleave => (1, 2),
            StageKind::Interleave => (2, 1),
            StageKind::Duplicator => (1, 2),
            StageKind::Gain { channels } => (*channels, *channels),
            StageKind::FileWriter { .. } | StageKind::Output(_) => (1, 0),
            StageKind::FadeIn { .. }
            | StageKind::FormatAdapter
            | StageKind::PitchTempo
            | StageKind::PassThrough
            | StageKind::FadeOut { .. } => (1, 1),
        }
    }
}

impl fmt::Debug for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Runtime parameters, identified by variant rather than by string
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StageParameter {
    /// Effective gain for one gain-stage port
    Gain { port: usize, value: f64 },
    Pitch(f64),
    Tempo(f64),
}

/// One-shot actions on a stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageTrigger {
    /// Start the fade-out ramp; the run ends when it completes
    FadeOut,
}

/// Why the engine stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    UserRequested,
    EndOfStream,
}

/// Lifecycle notifications from the engine's real-time thread.
///
/// Implementations must return immediately and never block on the caller
/// that issued the command.
pub trait TransportCallbacks: Send + Sync {
    fn on_started(&self);
    fn on_stopped(&self, reason: StopReason);
}

/// Command and parameter interface of a pipeline engine
pub trait PipelineEngine {
    /// Create a stage; fails if no implementation is available
    fn create_stage(&mut self, kind: StageKind) -> Result<StageId, EngineError>;

    /// Destroy a stage and every link touching it
    fn remove_stage(&mut self, stage: StageId) -> Result<(), EngineError>;

    /// Connect two ports; both ends must accept the format
    fn link(&mut self, link: LinkSpec) -> Result<(), EngineError>;

    /// Update a parameter; accepted whether or not the engine is running
    fn set_parameter(&mut self, stage: StageId, parameter: StageParameter)
        -> Result<(), EngineError>;

    /// Fire a one-shot action on a stage
    fn trigger(&mut self, stage: StageId, trigger: StageTrigger) -> Result<(), EngineError>;

    /// Register the lifecycle listener
    fn set_callbacks(&mut self, callbacks: Arc<dyn TransportCallbacks>);

    /// Begin pulling audio; `on_started` follows asynchronously
    fn start(&mut self) -> Result<(), EngineError>;

    /// Stop pulling audio; `on_stopped(UserRequested)` follows asynchronously
    fn stop(&mut self) -> Result<(), EngineError>;

    /// Stop everything and release the real-time thread
    fn shutdown(&mut self);
}
