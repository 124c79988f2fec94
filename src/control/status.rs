//! Status display
//!
//! One overwritten line on stderr, refreshed by the Coordinator after every
//! event and by the real-time thread after every source read. The real-time
//! side only renders when the snapshot lock is free.

use std::io::{self, Write};

use parking_lot::Mutex;

use crate::control::state::ControlState;
use crate::engine::{ChannelLayout, PROGRESS_FULL};

/// Receives state snapshots and progress updates
pub trait StatusSink: Send + Sync {
    /// New Control State snapshot (Coordinator thread)
    fn publish(&self, state: &ControlState);

    /// Playback progress in hundredths of a percent (real-time thread, must not wait)
    fn progress(&self, _progress: u32) {}
}

/// Discards everything (`-s`, tests)
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentStatus;

impl StatusSink for SilentStatus {
    fn publish(&self, _state: &ControlState) {}
}

/// Format the status line for `state`
pub fn render_status(state: &ControlState, channels: ChannelLayout, progress: u32) -> String {
    let muted = if state.muted { "MUTED" } else { "     " };
    let percent = f64::from(progress.min(PROGRESS_FULL)) / 100.0;
    let volumes = match channels {
        ChannelLayout::Stereo => format!(
            "L-CH VOLUME: {:<6.2} R-CH VOLUME: {:<6.2}",
            state.volume_left * state.volume_master,
            state.volume_right * state.volume_master
        ),
        ChannelLayout::Mono => format!("MONO-CH VOLUME: {:<6.2}", state.volume_master),
    };
    format!(
        "{}  {}  PITCH: {:<8.4} TEMPO: {:<8.4} {:<7} {:>6.2}%",
        volumes, muted, state.pitch, state.tempo, state.transport, percent
    )
}

#[derive(Debug)]
struct Snapshot {
    state: Option<ControlState>,
    progress: u32,
}

/// Renders to stderr so stdout stays clean for the byte sink
#[derive(Debug)]
pub struct ConsoleStatus {
    channels: ChannelLayout,
    snapshot: Mutex<Snapshot>,
}

impl ConsoleStatus {
    pub fn new(channels: ChannelLayout) -> Self {
        Self {
            channels,
            snapshot: Mutex::new(Snapshot {
                state: None,
                progress: 0,
            }),
        }
    }

    fn render(&self, snapshot: &Snapshot) {
        if let Some(state) = &snapshot.state {
            let line = render_status(state, self.channels, snapshot.progress);
            let mut err = io::stderr().lock();
            let _ = write!(err, "\r{line}");
            let _ = err.flush();
        }
    }
}

impl StatusSink for ConsoleStatus {
    fn publish(&self, state: &ControlState) {
        let mut snapshot = self.snapshot.lock();
        snapshot.state = Some(*state);
        self.render(&snapshot);
    }

    fn progress(&self, progress: u32) {
        // Skip this refresh rather than wait on the Coordinator
        if let Some(mut snapshot) = self.snapshot.try_lock() {
            snapshot.progress = progress;
            self.render(&snapshot);
        }
    }
}
