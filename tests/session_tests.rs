//! Session Tests
//!
//! End-to-end playback sessions: topology selection, end-of-stream policy
//! per playback mode, and the save-file path, run both against a recording
//! engine and against the in-process `LocalEngine`.

mod common;

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use common::{
    one_second, read_samples, test_config, Call, ExitAfterStarts, RecordingEngine, StartCounter,
};
use kplay::cli::commands::run_session;
use kplay::config::{OutputKind, Pacing, DEFAULT_FADE};
use kplay::control::{KeySource, ScriptedKeys, SilentStatus};
use kplay::engine::{FrameSource, LinkFormat, PlaybackMode, SampleFormat, WavSource};
use kplay::error::EngineError;
use kplay::pipeline::{
    build_graph, LinkSpec, LocalEngine, PipelineEngine, SessionLayout, StageId, StageKind,
    StageParameter, StageRole, StageTrigger, TopologyPlan, TransportCallbacks,
};

fn open(path: &std::path::Path) -> Arc<WavSource> {
    Arc::new(WavSource::open(path).unwrap())
}

// === Scenario A: topology ===

#[test]
fn test_stereo_default_topology() {
    let dir = TempDir::new().unwrap();
    let source = open(&one_second(dir.path(), 2));
    let layout = SessionLayout {
        format: source.format(),
        output: OutputKind::PortAudio,
        save_path: None,
        fade_in: Some(DEFAULT_FADE),
        fade_out: DEFAULT_FADE,
    };
    let plan = TopologyPlan::new(&layout, source.clone());
    assert_eq!(
        plan.roles(),
        vec![
            StageRole::Ingest,
            StageRole::FadeIn,
            StageRole::ToWorking,
            StageRole::Deinterleave,
            StageRole::Gain,
            StageRole::Interleave,
            StageRole::PitchTempo,
            StageRole::FadeOut,
            StageRole::ToNative,
            StageRole::Output,
        ]
    );

    // Device stages are only opened at start, so the build succeeds anywhere
    let mut engine = LocalEngine::new(Pacing::FreeRunning);
    let graph = build_graph(&mut engine, &plan).unwrap();
    assert!(graph.is_degraded());

    let mono_float = LinkFormat {
        sample_rate: 44_100,
        sample_format: SampleFormat::F32,
        channels: 1,
        frame_size: 882,
    };
    let into_gain = graph.links_into(StageRole::Gain);
    assert_eq!(into_gain.len(), 2);
    for (port, link) in into_gain.iter().enumerate() {
        assert_eq!(link.format, mono_float);
        assert_eq!(link.to.index, port);
    }
    graph.release(&mut engine);
    assert_eq!(engine.stage_count(), 0);
}

#[test]
fn test_mono_topology_skips_channel_fan_out() {
    let dir = TempDir::new().unwrap();
    let source = open(&one_second(dir.path(), 1));
    let layout = SessionLayout {
        format: source.format(),
        output: OutputKind::Stdout,
        save_path: Some(dir.path().join("copy.wav")),
        fade_in: None,
        fade_out: DEFAULT_FADE,
    };
    let plan = TopologyPlan::new(&layout, source);
    assert!(!plan.contains(StageRole::Deinterleave));
    assert!(!plan.contains(StageRole::Interleave));
    assert!(!plan.contains(StageRole::FadeIn));
    assert!(plan.contains(StageRole::Duplicator));

    let into_writer = plan.links_into(StageRole::FileWriter);
    assert_eq!(into_writer.len(), 1);
    assert_eq!(into_writer[0].from, StageRole::Duplicator);
    assert_eq!(into_writer[0].from_port, 1);
    assert_eq!(into_writer[0].format.sample_format, SampleFormat::S16);
}

// === Scenario B: noninteractive ===

#[test]
fn test_noninteractive_exits_at_end_of_stream_recorded() {
    let dir = TempDir::new().unwrap();
    let path = one_second(dir.path(), 2);
    let source = open(&path);
    let config = test_config(&path, PlaybackMode::Noninteractive);
    let mut engine = RecordingEngine::new(1);

    // Keys are never read in noninteractive mode
    let keys: Box<dyn KeySource> = Box::new(ScriptedKeys::new(['x', 'x', 'x']));
    let summary = run_session(
        &config,
        source.clone(),
        &mut engine,
        Some(keys),
        Arc::new(SilentStatus),
    )
    .unwrap();

    assert_eq!(summary.starts, 1);
    assert_eq!(summary.end_of_stream_stops, 1);
    assert_eq!(summary.seeks, 1);
    assert_eq!(source.position(), 0);
    assert_eq!(engine.count(&Call::Start), 1);
    assert_eq!(engine.count(&Call::Stop), 0);
    assert_eq!(engine.count(&Call::Shutdown), 1);
    assert_eq!(engine.live_stages(), 0);
}

#[test]
fn test_initial_parameters_pushed_before_start() {
    let dir = TempDir::new().unwrap();
    let path = one_second(dir.path(), 2);
    let mut config = test_config(&path, PlaybackMode::Noninteractive);
    config.volume = 0.5;
    let mut engine = RecordingEngine::new(1);
    engine.pitch_available = true;

    run_session(&config, open(&path), &mut engine, None, Arc::new(SilentStatus)).unwrap();

    let start = engine.calls.iter().position(|c| *c == Call::Start).unwrap();
    let pushed: Vec<StageParameter> = engine.calls[..start]
        .iter()
        .filter_map(|c| match c {
            Call::Set(_, parameter) => Some(*parameter),
            _ => None,
        })
        .collect();
    assert_eq!(
        pushed,
        vec![
            StageParameter::Gain {
                port: 0,
                value: 0.5
            },
            StageParameter::Gain {
                port: 1,
                value: 0.5
            },
            StageParameter::Pitch(1.0),
            StageParameter::Tempo(1.0),
        ]
    );
}

#[test]
fn test_noninteractive_local_engine() {
    let dir = TempDir::new().unwrap();
    let path = one_second(dir.path(), 2);
    let source = open(&path);
    let config = test_config(&path, PlaybackMode::Noninteractive);
    let mut engine = LocalEngine::new(Pacing::FreeRunning);

    let summary = run_session(&config, source.clone(), &mut engine, None, Arc::new(SilentStatus))
        .unwrap();

    assert_eq!(summary.starts, 1);
    assert_eq!(summary.end_of_stream_stops, 1);
    assert_eq!(summary.seeks, 1);
    assert_eq!(source.position(), 0);
    assert_eq!(engine.stage_count(), 0);
}

// === Scenario C: repeat ===

#[test]
fn test_repeat_restarts_without_input_recorded() {
    let dir = TempDir::new().unwrap();
    let path = one_second(dir.path(), 2);
    let config = test_config(&path, PlaybackMode::Repeat);
    let counter = Arc::new(StartCounter::default());
    let keys: Box<dyn KeySource> = Box::new(ExitAfterStarts {
        counter: Arc::clone(&counter),
        wanted: 2,
    });
    let mut engine = RecordingEngine::new(1);

    let summary = run_session(&config, open(&path), &mut engine, Some(keys), counter).unwrap();

    assert_eq!(summary.starts, 2);
    assert_eq!(summary.end_of_stream_stops, 1);
    assert_eq!(summary.seeks, 1);
    assert_eq!(engine.count(&Call::Start), 2);
    // Exit while playing stops first and waits for the confirmation
    assert_eq!(engine.count(&Call::Stop), 1);
    assert_eq!(summary.user_stops, 1);
}

#[test]
fn test_repeat_local_engine() {
    let dir = TempDir::new().unwrap();
    let path = one_second(dir.path(), 1);
    let config = test_config(&path, PlaybackMode::Repeat);
    let counter = Arc::new(StartCounter::default());
    let keys: Box<dyn KeySource> = Box::new(ExitAfterStarts {
        counter: Arc::clone(&counter),
        wanted: 2,
    });
    let mut engine = LocalEngine::new(Pacing::FreeRunning);

    let summary = run_session(&config, open(&path), &mut engine, Some(keys), counter).unwrap();

    assert!(summary.starts >= 2);
    assert!(summary.end_of_stream_stops >= 1);
    assert!(summary.seeks >= 1);
}

/// `LocalEngine` whose device disappears after the first run
struct FailingRestart {
    inner: LocalEngine,
    starts: usize,
}

impl PipelineEngine for FailingRestart {
    fn create_stage(&mut self, kind: StageKind) -> Result<StageId, EngineError> {
        self.inner.create_stage(kind)
    }

    fn remove_stage(&mut self, stage: StageId) -> Result<(), EngineError> {
        self.inner.remove_stage(stage)
    }

    fn link(&mut self, link: LinkSpec) -> Result<(), EngineError> {
        self.inner.link(link)
    }

    fn set_parameter(
        &mut self,
        stage: StageId,
        parameter: StageParameter,
    ) -> Result<(), EngineError> {
        self.inner.set_parameter(stage, parameter)
    }

    fn trigger(&mut self, stage: StageId, trigger: StageTrigger) -> Result<(), EngineError> {
        self.inner.trigger(stage, trigger)
    }

    fn set_callbacks(&mut self, callbacks: Arc<dyn TransportCallbacks>) {
        self.inner.set_callbacks(callbacks)
    }

    fn start(&mut self) -> Result<(), EngineError> {
        self.starts += 1;
        if self.starts > 1 {
            return Err(EngineError::StartFailed {
                reason: "device lost".to_string(),
            });
        }
        self.inner.start()
    }

    fn stop(&mut self) -> Result<(), EngineError> {
        self.inner.stop()
    }

    fn shutdown(&mut self) {
        self.inner.shutdown()
    }
}

#[test]
fn test_repeat_restart_failure_ends_session_recorded() {
    let dir = TempDir::new().unwrap();
    let path = one_second(dir.path(), 2);
    let config = test_config(&path, PlaybackMode::Repeat);
    let mut engine = RecordingEngine::new(1);
    engine.start_limit = Some(1);

    let err = run_session(&config, open(&path), &mut engine, None, Arc::new(SilentStatus))
        .unwrap_err();

    assert_eq!(err.error_code(), "ENGINE_START_FAILED");
    assert_eq!(engine.count(&Call::Start), 2);
    assert_eq!(engine.count(&Call::Shutdown), 1);
    assert_eq!(engine.live_stages(), 0);
}

#[test]
fn test_repeat_restart_failure_ends_session_local_engine() {
    let dir = TempDir::new().unwrap();
    let path = one_second(dir.path(), 1);
    let config = test_config(&path, PlaybackMode::Repeat);

    // A hang here would mean the loop kept waiting after the failed restart
    let (done, outcome) = mpsc::channel();
    thread::spawn(move || {
        let mut engine = FailingRestart {
            inner: LocalEngine::new(Pacing::FreeRunning),
            starts: 0,
        };
        let result = run_session(&config, open(&path), &mut engine, None, Arc::new(SilentStatus));
        let _ = done.send((result.map_err(|e| e.error_code()), engine.inner.stage_count()));
    });

    let (result, stages) = outcome.recv_timeout(Duration::from_secs(10)).unwrap();
    assert_eq!(result.unwrap_err(), "ENGINE_START_FAILED");
    assert_eq!(stages, 0);
}

// === Save file ===

#[test]
fn test_save_file_matches_source() {
    let dir = TempDir::new().unwrap();
    let path = one_second(dir.path(), 2);
    let saved = dir.path().join("saved.wav");
    let mut config = test_config(&path, PlaybackMode::Noninteractive);
    config.save_path = Some(saved.clone());
    config.fade_in = None;
    let mut engine = LocalEngine::new(Pacing::FreeRunning);

    run_session(&config, open(&path), &mut engine, None, Arc::new(SilentStatus)).unwrap();
    drop(engine);

    let spec = hound::WavReader::open(&saved).unwrap().spec();
    assert_eq!(spec.channels, 2);
    assert_eq!(spec.bits_per_sample, 16);
    assert_eq!(spec.sample_rate, 44_100);
    assert!(read_samples(&path) == read_samples(&saved));
}

#[test]
fn test_save_file_carries_initial_gain() {
    let dir = TempDir::new().unwrap();
    let path = one_second(dir.path(), 1);
    let saved = dir.path().join("half.wav");
    let mut config = test_config(&path, PlaybackMode::Noninteractive);
    config.save_path = Some(saved.clone());
    config.fade_in = None;
    config.volume = 0.5;
    let mut engine = LocalEngine::new(Pacing::FreeRunning);

    run_session(&config, open(&path), &mut engine, None, Arc::new(SilentStatus)).unwrap();
    drop(engine);

    let original = read_samples(&path);
    let halved = read_samples(&saved);
    assert_eq!(original.len(), halved.len());
    for (a, b) in original.iter().zip(&halved) {
        assert!((a / 2 - b).abs() <= 1, "{} -> {}", a, b);
    }
}

#[test]
fn test_failed_start_releases_graph() {
    let dir = TempDir::new().unwrap();
    let path = one_second(dir.path(), 2);
    let mut config = test_config(&path, PlaybackMode::Noninteractive);
    // The writer is only created on the real-time thread, so this fails at start
    config.save_path = Some(dir.path().join("missing").join("out.wav"));
    let mut engine = LocalEngine::new(Pacing::FreeRunning);

    let err = run_session(&config, open(&path), &mut engine, None, Arc::new(SilentStatus))
        .unwrap_err();
    assert_eq!(err.error_code(), "ENGINE_START_FAILED");
    assert_eq!(engine.stage_count(), 0);
}
