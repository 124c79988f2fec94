//! Transport State Machine for kplay
//!
//! Pure state machine for play/stop, repeat and exit policy. It never talks
//! to the engine itself: every input returns the commands the Coordinator
//! must issue, so the transitions can be tested without threads.
//!
//! The transition to `Playing` happens only when the engine reports that it
//! started, never optimistically when Start is issued.

use std::fmt;

use log::debug;

use crate::pipeline::StopReason;

/// Transport states representing the current playback mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportState {
    /// Pipeline is not running (initial state)
    #[default]
    Stopped,
    /// Pipeline is pulling audio
    Playing,
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportState::Stopped => write!(f, "STOPPED"),
            TransportState::Playing => write!(f, "PLAYING"),
        }
    }
}

/// What happens when the source runs out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum PlaybackMode {
    /// Stay stopped at end of stream
    #[default]
    Normal,
    /// Rewind and play again
    Repeat,
    /// No keyboard; rewind and exit at end of stream
    Noninteractive,
}

impl PlaybackMode {
    /// Whether operator keys are read in this mode
    pub fn is_interactive(self) -> bool {
        self != PlaybackMode::Noninteractive
    }
}

/// Commands the Coordinator issues on behalf of the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportCommand {
    Start,
    /// Ask the fade-out stage to ramp down; the engine stops when it completes
    BeginFadeOut,
    Stop,
    SeekToBegin,
    /// Terminate the control loop
    Exit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExitPhase {
    Running,
    /// Exit requested while a Start was outstanding
    AwaitingStart,
    /// Stop issued, waiting for the engine's confirmation
    AwaitingStop,
    Done,
}

/// Manages transport state and the stop/seek/repeat/exit policy
#[derive(Debug, Clone)]
pub struct TransportMachine {
    state: TransportState,
    mode: PlaybackMode,
    start_pending: bool,
    fade_pending: bool,
    exit: ExitPhase,
}

impl TransportMachine {
    /// Create a stopped machine
    ///
    /// # Example
    /// ```
    /// use kplay::engine::{PlaybackMode, TransportMachine};
    /// let transport = TransportMachine::new(PlaybackMode::Normal);
    /// assert!(!transport.is_playing());
    /// ```
    pub fn new(mode: PlaybackMode) -> Self {
        Self {
            state: TransportState::Stopped,
            mode,
            start_pending: false,
            fade_pending: false,
            exit: ExitPhase::Running,
        }
    }

    // ========================================================================
    // Operator requests
    // ========================================================================

    /// Request playback; used for the initial start and the play key while stopped
    pub fn request_start(&mut self) -> Vec<TransportCommand> {
        if self.is_exiting() || self.state == TransportState::Playing || self.start_pending {
            return Vec::new();
        }
        self.start_pending = true;
        debug!("[TRANSPORT] start requested");
        vec![TransportCommand::Start]
    }

    /// Play/stop toggle
    ///
    /// Stopped: issue Start. Playing: trigger the fade-out; the state only
    /// changes once the engine reports it stopped.
    pub fn on_play_stop(&mut self) -> Vec<TransportCommand> {
        match self.state {
            TransportState::Stopped => self.request_start(),
            TransportState::Playing => {
                if self.is_exiting() || self.fade_pending {
                    return Vec::new();
                }
                self.fade_pending = true;
                debug!("[TRANSPORT] fade-out requested");
                vec![TransportCommand::BeginFadeOut]
            }
        }
    }

    /// The fade-out trigger was rejected; fall back to a hard stop
    pub fn on_fade_rejected(&mut self) -> Vec<TransportCommand> {
        self.fade_pending = false;
        if self.state == TransportState::Playing {
            vec![TransportCommand::Stop]
        } else {
            Vec::new()
        }
    }

    /// Seek to the first frame; valid in any state
    pub fn on_seek(&mut self) -> Vec<TransportCommand> {
        vec![TransportCommand::SeekToBegin]
    }

    /// Exit key or shutdown request
    ///
    /// The loop only terminates once the engine has confirmed it stopped.
    pub fn on_exit_request(&mut self) -> Vec<TransportCommand> {
        if self.is_exiting() {
            return Vec::new();
        }
        match self.state {
            TransportState::Playing => {
                self.exit = ExitPhase::AwaitingStop;
                vec![TransportCommand::Stop]
            }
            TransportState::Stopped if self.start_pending => {
                self.exit = ExitPhase::AwaitingStart;
                Vec::new()
            }
            TransportState::Stopped => {
                self.exit = ExitPhase::Done;
                vec![TransportCommand::Exit]
            }
        }
    }

    // ========================================================================
    // Engine notifications
    // ========================================================================

    /// The engine reported it started
    pub fn on_started(&mut self) -> Vec<TransportCommand> {
        self.state = TransportState::Playing;
        self.start_pending = false;
        self.fade_pending = false;

        if self.exit == ExitPhase::AwaitingStart {
            self.exit = ExitPhase::AwaitingStop;
            return vec![TransportCommand::Stop];
        }
        Vec::new()
    }

    /// The engine reported it stopped
    pub fn on_stopped(&mut self, reason: StopReason) -> Vec<TransportCommand> {
        self.state = TransportState::Stopped;
        self.fade_pending = false;

        match self.exit {
            ExitPhase::AwaitingStop => {
                self.exit = ExitPhase::Done;
                return vec![TransportCommand::Exit];
            }
            ExitPhase::Done | ExitPhase::AwaitingStart => return Vec::new(),
            ExitPhase::Running => {}
        }

        match (reason, self.mode) {
            (StopReason::UserRequested, _) | (StopReason::EndOfStream, PlaybackMode::Normal) => {
                Vec::new()
            }
            (StopReason::EndOfStream, PlaybackMode::Repeat) => {
                self.start_pending = true;
                vec![TransportCommand::SeekToBegin, TransportCommand::Start]
            }
            (StopReason::EndOfStream, PlaybackMode::Noninteractive) => {
                self.exit = ExitPhase::Done;
                vec![TransportCommand::SeekToBegin, TransportCommand::Exit]
            }
        }
    }

    /// A Start command failed to reach the engine
    pub fn on_start_failed(&mut self) {
        self.start_pending = false;
    }

    // ========================================================================
    // State Queries
    // ========================================================================

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn mode(&self) -> PlaybackMode {
        self.mode
    }

    pub fn is_playing(&self) -> bool {
        self.state == TransportState::Playing
    }

    /// Whether an exit has been requested
    pub fn is_exiting(&self) -> bool {
        self.exit != ExitPhase::Running
    }

    /// Whether the loop may terminate
    pub fn is_done(&self) -> bool {
        self.exit == ExitPhase::Done
    }
}

impl Default for TransportMachine {
    fn default() -> Self {
        Self::new(PlaybackMode::Normal)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
