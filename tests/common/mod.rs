//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use kplay::config::{OutputKind, Pacing, PlayerConfig};
use kplay::control::{ControlState, KeyPoll, KeySource, StatusSink};
use kplay::engine::{PlaybackMode, TransportState};
use kplay::error::EngineError;
use kplay::pipeline::{
    LinkSpec, PipelineEngine, StageId, StageKind, StageParameter, StageTrigger, StopReason,
    TransportCallbacks,
};

pub const RATE: u32 = 44_100;

/// Sample value of `frame` on `channel`: a ramp, offset per channel
pub fn ramp_value(frame: usize, channel: usize, bits: u16) -> i32 {
    let limit = match bits {
        8 => 100,
        _ => 30_000,
    };
    ((frame + channel * 7) % limit) as i32 - limit as i32 / 2
}

/// Write a PCM WAV file holding a ramp
pub fn write_wav(path: &Path, channels: u16, bits: u16, frames: usize) {
    let spec = hound::WavSpec {
        channels,
        sample_rate: RATE,
        bits_per_sample: bits,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for frame in 0..frames {
        for channel in 0..channels as usize {
            writer
                .write_sample(ramp_value(frame, channel, bits))
                .unwrap();
        }
    }
    writer.finalize().unwrap();
}

/// One second of 16-bit audio in `dir`
pub fn one_second(dir: &Path, channels: u16) -> PathBuf {
    let path = dir.join(format!("tone-{channels}ch.wav"));
    write_wav(&path, channels, 16, RATE as usize);
    path
}

/// All integer samples of a WAV file
pub fn read_samples(path: &Path) -> Vec<i32> {
    hound::WavReader::open(path)
        .unwrap()
        .into_samples::<i32>()
        .map(Result::unwrap)
        .collect()
}

/// Quiet, free-running, discarding config for `path`
pub fn test_config(path: &Path, mode: PlaybackMode) -> PlayerConfig {
    let mut config = PlayerConfig::new(path);
    config.output = OutputKind::Null;
    config.mode = mode;
    config.quiet = true;
    config.pacing = Pacing::FreeRunning;
    config
}

// ============================================================================
// Status and keys
// ============================================================================

/// Counts transitions into Playing seen through the status hook
#[derive(Debug, Default)]
pub struct StartCounter {
    last: Mutex<Option<TransportState>>,
    starts: AtomicUsize,
}

impl StartCounter {
    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }
}

impl StatusSink for StartCounter {
    fn publish(&self, state: &ControlState) {
        let mut last = self.last.lock();
        if state.transport == TransportState::Playing && *last != Some(TransportState::Playing) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }
        *last = Some(state.transport);
    }
}

/// Presses the exit key once the counter reaches `wanted` starts
pub struct ExitAfterStarts {
    pub counter: Arc<StartCounter>,
    pub wanted: usize,
}

impl KeySource for ExitAfterStarts {
    fn poll_key(&mut self, timeout: Duration) -> io::Result<KeyPoll> {
        if self.counter.starts() >= self.wanted {
            return Ok(KeyPoll::Key('c'));
        }
        thread::sleep(timeout.min(Duration::from_millis(5)));
        Ok(KeyPoll::Idle)
    }
}

// ============================================================================
// Recording engine
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Create(&'static str),
    Link(LinkSpec),
    Remove(StageId),
    Set(StageId, StageParameter),
    Trigger(StageId),
    Start,
    Stop,
    Shutdown,
}

/// Records every call and answers lifecycle commands synchronously.
///
/// The first `short_runs` starts are followed at once by an end-of-stream
/// stop, as if the file were empty. Starts past `start_limit` fail.
#[derive(Default)]
pub struct RecordingEngine {
    pub calls: Vec<Call>,
    pub short_runs: usize,
    pub pitch_available: bool,
    /// Starts accepted before every later one fails
    pub start_limit: Option<usize>,
    next: usize,
    callbacks: Option<Arc<dyn TransportCallbacks>>,
}

impl RecordingEngine {
    pub fn new(short_runs: usize) -> Self {
        Self {
            short_runs,
            ..Self::default()
        }
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls.iter().filter(|c| *c == call).count()
    }

    pub fn live_stages(&self) -> usize {
        let created = self
            .calls
            .iter()
            .filter(|c| matches!(c, Call::Create(_)))
            .count();
        let removed = self
            .calls
            .iter()
            .filter(|c| matches!(c, Call::Remove(_)))
            .count();
        created - removed
    }
}

impl PipelineEngine for RecordingEngine {
    fn create_stage(&mut self, kind: StageKind) -> Result<StageId, EngineError> {
        if matches!(kind, StageKind::PitchTempo) && !self.pitch_available {
            return Err(EngineError::StageUnavailable { stage: "pitch-tempo" });
        }
        self.calls.push(Call::Create(kind.name()));
        self.next += 1;
        Ok(StageId(self.next))
    }

    fn remove_stage(&mut self, stage: StageId) -> Result<(), EngineError> {
        self.calls.push(Call::Remove(stage));
        Ok(())
    }

    fn link(&mut self, link: LinkSpec) -> Result<(), EngineError> {
        self.calls.push(Call::Link(link));
        Ok(())
    }

    fn set_parameter(
        &mut self,
        stage: StageId,
        parameter: StageParameter,
    ) -> Result<(), EngineError> {
        self.calls.push(Call::Set(stage, parameter));
        Ok(())
    }

    fn trigger(&mut self, stage: StageId, _trigger: StageTrigger) -> Result<(), EngineError> {
        self.calls.push(Call::Trigger(stage));
        if let Some(callbacks) = &self.callbacks {
            callbacks.on_stopped(StopReason::UserRequested);
        }
        Ok(())
    }

    fn set_callbacks(&mut self, callbacks: Arc<dyn TransportCallbacks>) {
        self.callbacks = Some(callbacks);
    }

    fn start(&mut self) -> Result<(), EngineError> {
        self.calls.push(Call::Start);
        if self
            .start_limit
            .is_some_and(|limit| self.count(&Call::Start) > limit)
        {
            return Err(EngineError::StartFailed {
                reason: "device lost".to_string(),
            });
        }
        if let Some(callbacks) = &self.callbacks {
            callbacks.on_started();
            if self.short_runs > 0 {
                self.short_runs -= 1;
                callbacks.on_stopped(StopReason::EndOfStream);
            }
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), EngineError> {
        self.calls.push(Call::Stop);
        if let Some(callbacks) = &self.callbacks {
            callbacks.on_stopped(StopReason::UserRequested);
        }
        Ok(())
    }

    fn shutdown(&mut self) {
        self.calls.push(Call::Shutdown);
    }
}
