//! Coordinator (control loop)
//!
//! The sole consumer of the Event Queue and the only code that mutates
//! Control State or calls the engine's command and parameter interface.
//! Transport decisions come from `TransportMachine`; this module carries
//! them out and applies the key adjustment policy.
//!
//! Only a failed start is returned as an error, whether it is the initial
//! start or a later restart. Everything else is logged and survived so the
//! operator keeps control.

use std::sync::Arc;

use log::{debug, error, info, warn};

use crate::control::event::{Event, EventReceiver};
use crate::control::keys::ControlKey;
use crate::control::state::ControlState;
use crate::control::status::StatusSink;
use crate::engine::{ChannelLayout, FrameSource, TransportCommand, TransportMachine};
use crate::error::{EngineError, KplayError};
use crate::pipeline::{
    PipelineEngine, PipelineGraph, StageId, StageParameter, StageRole, StageTrigger, StopReason,
};

/// What a session did, returned when the loop ends
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    /// `TransportStarted` events observed
    pub starts: usize,
    pub user_stops: usize,
    pub end_of_stream_stops: usize,
    pub seeks: usize,
    /// Parameter pushes or triggers the engine refused
    pub rejected_updates: usize,
    pub final_state: ControlState,
}

/// Which parameter group a key changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Push {
    Gains,
    Pitch,
    Tempo,
}

/// Drives one playback session
pub struct Coordinator<'a, E: PipelineEngine + ?Sized> {
    engine: &'a mut E,
    graph: &'a PipelineGraph,
    source: Arc<dyn FrameSource>,
    channels: ChannelLayout,
    state: ControlState,
    transport: TransportMachine,
    status: Arc<dyn StatusSink>,
    summary: SessionSummary,
    finished: bool,
    /// Restart failure that ended the loop
    failure: Option<EngineError>,
}

impl<'a, E: PipelineEngine + ?Sized> Coordinator<'a, E> {
    /// Take control of a built graph
    ///
    /// # Arguments
    /// * `engine` - Engine the graph was built on
    /// * `graph` - Stage handles for parameter pushes
    /// * `source` - Reader to rewind on seek
    /// * `state` - Initial Control State; its mode selects the end-of-stream policy
    /// * `status` - Display hook, called after every event
    pub fn new(
        engine: &'a mut E,
        graph: &'a PipelineGraph,
        source: Arc<dyn FrameSource>,
        state: ControlState,
        status: Arc<dyn StatusSink>,
    ) -> Self {
        let channels = source.format().channels;
        Self {
            engine,
            graph,
            source,
            channels,
            state,
            transport: TransportMachine::new(state.mode),
            status,
            summary: SessionSummary {
                starts: 0,
                user_stops: 0,
                end_of_stream_stops: 0,
                seeks: 0,
                rejected_updates: 0,
                final_state: state,
            },
            finished: false,
            failure: None,
        }
    }

    pub fn state(&self) -> &ControlState {
        &self.state
    }

    pub fn summary(&self) -> &SessionSummary {
        &self.summary
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    // ========================================================================
    // Session lifecycle
    // ========================================================================

    /// Send every stage its starting value
    pub fn push_initial_parameters(&mut self) {
        self.push(Push::Gains);
        self.push(Push::Pitch);
        self.push(Push::Tempo);
    }

    /// Issue the initial Start
    ///
    /// # Errors
    /// The engine's start failure, which ends the session.
    pub fn start(&mut self) -> Result<(), KplayError> {
        if self.transport.request_start().is_empty() {
            return Ok(());
        }
        debug!("[COORD] -> Start");
        if let Err(e) = self.engine.start() {
            self.transport.on_start_failed();
            return Err(e.into());
        }
        self.publish();
        Ok(())
    }

    /// Drain events until the session ends
    ///
    /// # Errors
    /// A restart the engine refused, which ends the session like a failed
    /// initial start.
    pub fn run(&mut self, events: &EventReceiver) -> Result<SessionSummary, KplayError> {
        info!("Session started ({:?} mode)", self.state.mode);
        while !self.finished {
            match events.recv() {
                Some(event) => self.handle(event),
                None => {
                    warn!("Event queue closed before exit");
                    break;
                }
            }
        }
        info!(
            "Session finished: {} start(s), {} end-of-stream stop(s), {} rejected update(s)",
            self.summary.starts, self.summary.end_of_stream_stops, self.summary.rejected_updates
        );
        self.summary.final_state = self.state;
        match self.failure.take() {
            Some(e) => Err(e.into()),
            None => Ok(self.summary.clone()),
        }
    }

    /// Apply one event
    pub fn handle(&mut self, event: Event) {
        debug!("[COORD] event {:?}", event);
        match event {
            Event::Key(key) => self.on_key(key),
            Event::TransportStarted => {
                self.summary.starts += 1;
                let commands = self.transport.on_started();
                self.execute(commands);
            }
            Event::TransportStopped(reason) => {
                match reason {
                    StopReason::UserRequested => self.summary.user_stops += 1,
                    StopReason::EndOfStream => self.summary.end_of_stream_stops += 1,
                }
                let commands = self.transport.on_stopped(reason);
                self.execute(commands);
            }
            Event::Shutdown => {
                let commands = self.transport.on_exit_request();
                self.execute(commands);
            }
        }
        self.publish();
    }

    fn publish(&mut self) {
        self.state.transport = self.transport.state();
        self.summary.final_state = self.state;
        self.status.publish(&self.state);
    }

    // ========================================================================
    // Keys
    // ========================================================================

    fn on_key(&mut self, key: char) {
        let Some(action) = ControlKey::from_char(key) else {
            debug!("[COORD] unbound key {:?}", key);
            return;
        };
        if action.is_balance() && !self.channels.is_stereo() {
            debug!("[COORD] {:?} ignored for mono source", action);
            return;
        }

        let push = match action {
            ControlKey::BalanceLeft => self.state.balance_left().then_some(Push::Gains),
            ControlKey::BalanceMid => self.state.balance_mid().then_some(Push::Gains),
            ControlKey::BalanceRight => self.state.balance_right().then_some(Push::Gains),
            ControlKey::VolumeDown => self.state.volume_down().then_some(Push::Gains),
            ControlKey::VolumeUp => self.state.volume_up().then_some(Push::Gains),
            ControlKey::MuteToggle => self.state.toggle_mute().then_some(Push::Gains),
            ControlKey::PitchUp => self.state.pitch_up().then_some(Push::Pitch),
            ControlKey::PitchDown => self.state.pitch_down().then_some(Push::Pitch),
            ControlKey::PitchReset => self.state.pitch_reset().then_some(Push::Pitch),
            ControlKey::TempoUp => self.state.tempo_up().then_some(Push::Tempo),
            ControlKey::TempoDown => self.state.tempo_down().then_some(Push::Tempo),
            ControlKey::TempoReset => self.state.tempo_reset().then_some(Push::Tempo),
            ControlKey::SeekToBegin => {
                let commands = self.transport.on_seek();
                self.execute(commands);
                None
            }
            ControlKey::PlayStop => {
                let commands = self.transport.on_play_stop();
                self.execute(commands);
                None
            }
            ControlKey::Exit => {
                let commands = self.transport.on_exit_request();
                self.execute(commands);
                None
            }
        };

        if let Some(push) = push {
            self.push(push);
        }
    }

    // ========================================================================
    // Engine commands
    // ========================================================================

    fn execute(&mut self, commands: Vec<TransportCommand>) {
        for command in commands {
            debug!("[COORD] -> {:?}", command);
            match command {
                TransportCommand::Start => {
                    if let Err(e) = self.engine.start() {
                        error!("Failed to start playback: {}", e);
                        self.transport.on_start_failed();
                        self.failure = Some(e);
                        self.finished = true;
                        return;
                    }
                }
                TransportCommand::BeginFadeOut => {
                    let result = match self.graph.stage(StageRole::FadeOut) {
                        Some(stage) => self.engine.trigger(stage, StageTrigger::FadeOut),
                        None => Err(EngineError::StageUnavailable { stage: "fade-out" }),
                    };
                    if let Err(e) = result {
                        warn!("Fade-out rejected, stopping immediately: {}", e);
                        self.summary.rejected_updates += 1;
                        let fallback = self.transport.on_fade_rejected();
                        self.execute(fallback);
                    }
                }
                TransportCommand::Stop => {
                    if let Err(e) = self.engine.stop() {
                        error!("Failed to stop playback: {}", e);
                        // No confirmation will ever arrive
                        if self.transport.is_exiting() {
                            self.finished = true;
                        }
                    }
                }
                TransportCommand::SeekToBegin => match self.source.seek_to_begin() {
                    Ok(()) => self.summary.seeks += 1,
                    Err(e) => warn!("Seek to begin failed: {}", e),
                },
                TransportCommand::Exit => self.finished = true,
            }
        }
    }

    fn push(&mut self, push: Push) {
        match push {
            Push::Gains => {
                let Some(stage) = self.graph.stage(StageRole::Gain) else {
                    return;
                };
                for channel in 0..self.channels.count() {
                    let value = self.state.effective_gain(channel);
                    self.set(stage, StageParameter::Gain { port: channel, value });
                }
            }
            Push::Pitch | Push::Tempo => {
                let parameter = match push {
                    Push::Pitch => StageParameter::Pitch(self.state.pitch),
                    _ => StageParameter::Tempo(self.state.tempo),
                };
                if self.graph.is_degraded() {
                    debug!("[COORD] no pitch/tempo stage, {:?} not applied", parameter);
                    return;
                }
                if let Some(stage) = self.graph.stage(StageRole::PitchTempo) {
                    self.set(stage, parameter);
                }
            }
        }
    }

    fn set(&mut self, stage: StageId, parameter: StageParameter) {
        if let Err(e) = self.engine.set_parameter(stage, parameter) {
            warn!("Parameter update {:?} rejected: {}", parameter, e);
            self.summary.rejected_updates += 1;
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
