//! Error handling for kplay
//!
//! Startup failures (bad file, graph build, engine start) are fatal; everything
//! that can go wrong after playback begins is reported and survived.

use std::path::PathBuf;

use thiserror::Error;

use crate::pipeline::{StageId, StageRole};

/// Result type alias for kplay operations
pub type Result<T> = std::result::Result<T, KplayError>;

/// Reasons a WAV file is rejected by the Source Reader.
///
/// Each variant names the specific check that failed.
#[derive(Error, Debug)]
pub enum OpenError {
    #[error("unable to open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("not a RIFF/WAVE file: {reason}")]
    NotRiffWave { reason: String },

    #[error("audio format is not linear PCM")]
    NotPcm,

    #[error("no data chunk found")]
    MissingDataChunk,

    #[error("{channels} channels are not supported (mono and stereo only)")]
    UnsupportedChannels { channels: u16 },

    #[error("{bits} bits per sample is not supported (16, 24 or 32 only)")]
    UnsupportedBitDepth { bits: u16 },

    #[error("malformed WAV header: {reason}")]
    Malformed { reason: String },
}

/// Failures reported by a pipeline engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("no implementation available for the {stage} stage")]
    StageUnavailable { stage: &'static str },

    #[error("unknown stage {0}")]
    UnknownStage(StageId),

    #[error("stage {stage} has no {direction} port {port}")]
    InvalidPort {
        stage: StageId,
        direction: &'static str,
        port: usize,
    },

    #[error("incompatible link: {reason}")]
    IncompatibleLink { reason: String },

    #[error("stage {stage} rejected parameter: {reason}")]
    ParameterRejected { stage: StageId, reason: String },

    #[error("the graph cannot change while the engine thread is alive")]
    GraphLocked,

    #[error("failed to start: {reason}")]
    StartFailed { reason: String },

    #[error("engine worker thread is gone")]
    WorkerGone,
}

/// Failure while assembling the pipeline graph.
///
/// Whatever was already created has been released when this is returned.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("failed to create the {role} stage: {source}")]
    Stage {
        role: StageRole,
        #[source]
        source: EngineError,
    },

    #[error("failed to link {from} -> {to}: {source}")]
    Link {
        from: StageRole,
        to: StageRole,
        #[source]
        source: EngineError,
    },
}

/// Main error type for kplay operations
#[derive(Error, Debug)]
pub enum KplayError {
    #[error(transparent)]
    Open(#[from] OpenError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("invalid {flag} argument '{value}': {reason}")]
    InvalidArgument {
        flag: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("terminal setup failed: {0}")]
    Terminal(#[source] std::io::Error),

    #[error("failed to spawn {name} thread: {source}")]
    Thread {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl KplayError {
    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            KplayError::Open(OpenError::Io { .. }) => "FILE_NOT_READABLE",
            KplayError::Open(_) => "UNSUPPORTED_FILE",
            KplayError::Build(_) => "GRAPH_BUILD_FAILED",
            KplayError::Engine(EngineError::StartFailed { .. }) => "ENGINE_START_FAILED",
            KplayError::Engine(_) => "ENGINE_ERROR",
            KplayError::InvalidArgument { .. } => "INVALID_ARGUMENT",
            KplayError::Terminal(_) => "TERMINAL_ERROR",
            KplayError::Thread { .. } => "THREAD_SPAWN_FAILED",
            KplayError::Io(_) => "IO_ERROR",
        }
    }

    /// Whether this error ends the session.
    ///
    /// Only rejected parameter updates are survivable once playback runs;
    /// the Coordinator logs those instead of returning them.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            KplayError::Engine(EngineError::ParameterRejected { .. })
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = KplayError::from(OpenError::UnsupportedBitDepth { bits: 8 });
        assert_eq!(err.error_code(), "UNSUPPORTED_FILE");

        let err = KplayError::from(EngineError::StartFailed {
            reason: "no device".to_string(),
        });
        assert_eq!(err.error_code(), "ENGINE_START_FAILED");
    }

    #[test]
    fn test_open_error_names_failed_check() {
        let err = OpenError::UnsupportedBitDepth { bits: 8 };
        assert_eq!(
            err.to_string(),
            "8 bits per sample is not supported (16, 24 or 32 only)"
        );

        let err = OpenError::UnsupportedChannels { channels: 6 };
        assert!(err.to_string().contains("6 channels"));
    }

    #[test]
    fn test_parameter_rejection_is_not_fatal() {
        let err = KplayError::from(EngineError::ParameterRejected {
            stage: StageId(3),
            reason: "stopped".to_string(),
        });
        assert!(!err.is_fatal());
        assert!(KplayError::from(OpenError::NotPcm).is_fatal());
    }
}
