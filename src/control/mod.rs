//! Control Module
//!
//! The control side of a playback session:
//! - Control State and its adjustment policy
//! - The Event Queue shared by the input relay and the engine
//! - The Coordinator control loop
//! - Operator input and the status line

pub mod coordinator;
pub mod event;
pub mod input;
pub mod keys;
pub mod state;
pub mod status;

pub use coordinator::{Coordinator, SessionSummary};
pub use event::{event_queue, Event, EventReceiver, EventSender};
pub use input::{InputRelay, KeyPoll, KeySource, ScriptedKeys, TerminalKeys};
pub use keys::{banner, ControlKey, EXIT_KEY};
pub use state::ControlState;
pub use status::{render_status, ConsoleStatus, SilentStatus, StatusSink};
