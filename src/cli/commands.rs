//! CLI Command Implementations
//!
//! Session orchestration: open the source, build the graph, run the
//! Coordinator, then tear everything down in order.

use std::sync::Arc;

use anyhow::Context;
use log::{debug, info};

use crate::cli::Cli;
use crate::config::PlayerConfig;
use crate::control::{
    banner, event_queue, ConsoleStatus, ControlState, Coordinator, EventReceiver, EventSender,
    InputRelay, KeySource, SessionSummary, SilentStatus, StatusSink, TerminalKeys,
};
use crate::engine::{FrameSource, WavSource};
use crate::error::Result;
use crate::pipeline::{
    build_graph, LocalEngine, PipelineEngine, PipelineGraph, SessionLayout, TopologyPlan,
};

/// Validate the command line and play the file
pub fn run(cli: &Cli) -> anyhow::Result<()> {
    let (config, warnings) = PlayerConfig::from_cli(cli)?;
    for warning in &warnings {
        eprintln!("Warning: {}", warning);
    }

    let summary = play(&config)?;
    debug!("{:?}", summary);
    Ok(())
}

/// Play one file on the reference engine with terminal input and status
pub fn play(config: &PlayerConfig) -> anyhow::Result<SessionSummary> {
    let source = WavSource::open(&config.wav_path)
        .with_context(|| format!("cannot play {}", config.wav_path.display()))?;
    let channels = source.format().channels;

    let status: Arc<dyn StatusSink> = if config.quiet {
        Arc::new(SilentStatus)
    } else {
        Arc::new(ConsoleStatus::new(channels))
    };
    let listener = Arc::clone(&status);
    let source: Arc<dyn FrameSource> =
        Arc::new(source.with_progress_listener(move |progress| listener.progress(progress)));

    // The banner goes out before raw mode is enabled
    let keys: Option<Box<dyn KeySource>> = if config.mode.is_interactive() {
        if !config.quiet {
            eprintln!("{}", banner(channels.is_stereo()));
        }
        Some(Box::new(TerminalKeys::new()?))
    } else {
        None
    };

    let mut engine = LocalEngine::new(config.pacing);
    let summary = run_session(config, source, &mut engine, keys, status)?;
    if !config.quiet {
        eprintln!();
    }
    Ok(summary)
}

/// Run a complete session on any engine
///
/// Builds the graph for `source`, pushes the initial parameters, starts
/// playback and drives the Coordinator until it exits. The engine is shut
/// down and the graph released before returning, on success or failure.
///
/// # Arguments
/// * `config` - Validated player configuration
/// * `source` - Opened reader; its format decides the topology
/// * `engine` - Engine to build on
/// * `keys` - Operator input, ignored in noninteractive mode
/// * `status` - Display hook
///
/// # Errors
/// Graph build failures and engine start failures, including a failed
/// restart after end of stream or a play key.
pub fn run_session<E: PipelineEngine + ?Sized>(
    config: &PlayerConfig,
    source: Arc<dyn FrameSource>,
    engine: &mut E,
    keys: Option<Box<dyn KeySource>>,
    status: Arc<dyn StatusSink>,
) -> Result<SessionSummary> {
    let layout = SessionLayout {
        format: source.format(),
        output: config.output,
        save_path: config.save_path.clone(),
        fade_in: config.fade_in,
        fade_out: config.fade_out,
    };
    let plan = TopologyPlan::new(&layout, Arc::clone(&source));
    let graph = build_graph(engine, &plan)?;
    info!(
        "Pipeline ready: {} stages, {} links{}",
        graph.stage_count(),
        graph.links().len(),
        if graph.is_degraded() {
            " (pitch/tempo disabled)"
        } else {
            ""
        }
    );

    let (events, queue) = event_queue();
    engine.set_callbacks(Arc::new(events.clone()));

    let state = ControlState::new(config.volume, config.pitch, config.tempo, config.mode);
    let keys = keys.filter(|_| config.mode.is_interactive());
    let result = drive(engine, &graph, source, state, status, keys, events, &queue);

    engine.shutdown();
    graph.release(engine);
    result
}

#[allow(clippy::too_many_arguments)]
fn drive<E: PipelineEngine + ?Sized>(
    engine: &mut E,
    graph: &PipelineGraph,
    source: Arc<dyn FrameSource>,
    state: ControlState,
    status: Arc<dyn StatusSink>,
    keys: Option<Box<dyn KeySource>>,
    events: EventSender,
    queue: &EventReceiver,
) -> Result<SessionSummary> {
    let mut coordinator = Coordinator::new(engine, graph, source, state, status);
    coordinator.push_initial_parameters();

    let relay = keys
        .map(|keys| InputRelay::spawn(keys, events))
        .transpose()?;

    coordinator.start()?;
    let result = coordinator.run(queue);

    if let Some(relay) = relay {
        relay.stop();
    }
    result
}
