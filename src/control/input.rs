//! Operator key input
//!
//! A dedicated thread polls a `KeySource` and forwards every key as an
//! event. It never touches Control State. Polling uses a short timeout so
//! the relay notices a stop request without waiting for a key.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossterm::event::{self as term, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use log::{debug, error};

use crate::control::event::{Event, EventSender};
use crate::control::keys::EXIT_KEY;
use crate::error::KplayError;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Result of one poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPoll {
    Key(char),
    /// Nothing within the timeout
    Idle,
    /// The input will never produce another key
    Closed,
}

/// Something that yields operator keys
pub trait KeySource: Send {
    /// Wait up to `timeout` for the next key
    fn poll_key(&mut self, timeout: Duration) -> io::Result<KeyPoll>;
}

// ============================================================================
// Relay thread
// ============================================================================

/// Handle to the running input thread
#[derive(Debug)]
pub struct InputRelay {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl InputRelay {
    /// Start forwarding keys from `keys` to `events`
    ///
    /// # Errors
    /// `KplayError::Thread` if the thread cannot be spawned.
    pub fn spawn(mut keys: Box<dyn KeySource>, events: EventSender) -> Result<Self, KplayError> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name("kplay-input".to_string())
            .spawn(move || {
                while !flag.load(Ordering::Acquire) {
                    match keys.poll_key(POLL_INTERVAL) {
                        Ok(KeyPoll::Key(key)) => {
                            if !events.send(Event::Key(key)) || key == EXIT_KEY {
                                break;
                            }
                        }
                        Ok(KeyPoll::Idle) => {}
                        Ok(KeyPoll::Closed) => {
                            debug!("[INPUT] key source closed");
                            events.send(Event::Shutdown);
                            break;
                        }
                        Err(e) => {
                            error!("Reading operator input failed: {}", e);
                            events.send(Event::Shutdown);
                            break;
                        }
                    }
                }
                debug!("[INPUT] relay finished");
            })
            .map_err(|source| KplayError::Thread {
                name: "kplay-input",
                source,
            })?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Ask the thread to finish and wait for it
    pub fn stop(mut self) {
        self.halt();
    }

    fn halt(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Input thread panicked");
            }
        }
    }
}

impl Drop for InputRelay {
    fn drop(&mut self) {
        self.halt();
    }
}

// ============================================================================
// Key sources
// ============================================================================

/// Single key presses from the terminal in raw mode
///
/// Raw mode is restored when this is dropped.
#[derive(Debug)]
pub struct TerminalKeys {
    _private: (),
}

impl TerminalKeys {
    /// Switch the terminal to unbuffered, no-echo input
    ///
    /// # Errors
    /// `KplayError::Terminal` when standard input is not a terminal.
    pub fn new() -> Result<Self, KplayError> {
        terminal::enable_raw_mode().map_err(KplayError::Terminal)?;
        Ok(Self { _private: () })
    }
}

impl KeySource for TerminalKeys {
    fn poll_key(&mut self, timeout: Duration) -> io::Result<KeyPoll> {
        if !term::poll(timeout)? {
            return Ok(KeyPoll::Idle);
        }
        let term::Event::Key(key) = term::read()? else {
            return Ok(KeyPoll::Idle);
        };
        if key.kind != KeyEventKind::Press {
            return Ok(KeyPoll::Idle);
        }
        // Raw mode swallows SIGINT
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return Ok(KeyPoll::Key(EXIT_KEY));
        }
        match key.code {
            KeyCode::Char(c) => Ok(KeyPoll::Key(c)),
            _ => Ok(KeyPoll::Idle),
        }
    }
}

impl Drop for TerminalKeys {
    fn drop(&mut self) {
        if let Err(e) = terminal::disable_raw_mode() {
            error!("Failed to restore terminal mode: {}", e);
        }
    }
}

/// Replays a fixed key sequence, then reports closed
#[derive(Debug, Clone, Default)]
pub struct ScriptedKeys {
    keys: VecDeque<(Duration, char)>,
}

impl ScriptedKeys {
    /// Keys delivered back to back
    pub fn new(keys: impl IntoIterator<Item = char>) -> Self {
        Self {
            keys: keys.into_iter().map(|key| (Duration::ZERO, key)).collect(),
        }
    }

    /// Each key after its own delay
    pub fn with_delays(keys: impl IntoIterator<Item = (Duration, char)>) -> Self {
        Self {
            keys: keys.into_iter().collect(),
        }
    }
}

impl KeySource for ScriptedKeys {
    fn poll_key(&mut self, timeout: Duration) -> io::Result<KeyPoll> {
        let Some((delay, key)) = self.keys.front_mut() else {
            return Ok(KeyPoll::Closed);
        };
        if *delay > timeout {
            *delay -= timeout;
            thread::sleep(timeout);
            return Ok(KeyPoll::Idle);
        }
        thread::sleep(*delay);
        let key = *key;
        self.keys.pop_front();
        Ok(KeyPoll::Key(key))
    }
}
