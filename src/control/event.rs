//! Event Queue
//!
//! Unbounded multi-producer, single-consumer channel from the input relay
//! and the engine's callbacks to the Coordinator. Each producer's events
//! arrive in the order it sent them; nothing is promised across producers.

use crossbeam::channel::{self, Receiver, Sender};
use log::trace;

use crate::pipeline::{StopReason, TransportCallbacks};

/// Control events consumed by the Coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Key(char),
    TransportStarted,
    TransportStopped(StopReason),
    /// A producer can no longer deliver events; end the session
    Shutdown,
}

/// Create a connected sender/receiver pair
pub fn event_queue() -> (EventSender, EventReceiver) {
    let (tx, rx) = channel::unbounded();
    (EventSender { tx }, EventReceiver { rx })
}

/// Producer handle, cheap to clone
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: Sender<Event>,
}

impl EventSender {
    /// Enqueue without blocking
    ///
    /// # Returns
    /// `false` once the Coordinator has gone away
    pub fn send(&self, event: Event) -> bool {
        trace!("[EVENT] enqueue {:?}", event);
        self.tx.send(event).is_ok()
    }
}

/// Engine notifications become events; the engine thread never waits on the Coordinator
impl TransportCallbacks for EventSender {
    fn on_started(&self) {
        self.send(Event::TransportStarted);
    }

    fn on_stopped(&self, reason: StopReason) {
        self.send(Event::TransportStopped(reason));
    }
}

/// Consumer handle owned by the Coordinator
#[derive(Debug)]
pub struct EventReceiver {
    rx: Receiver<Event>,
}

impl EventReceiver {
    /// Block until the next event, `None` once every sender is gone
    pub fn recv(&self) -> Option<Event> {
        self.rx.recv().ok()
    }

    pub fn try_recv(&self) -> Option<Event> {
        self.rx.try_recv().ok()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_fifo_per_producer() {
        let (tx, rx) = event_queue();
        let keys = tx.clone();
        let producer = thread::spawn(move || {
            for key in ['a', 's', 'd'] {
                keys.send(Event::Key(key));
            }
        });
        producer.join().unwrap();
        tx.on_started();

        assert_eq!(rx.recv(), Some(Event::Key('a')));
        assert_eq!(rx.recv(), Some(Event::Key('s')));
        assert_eq!(rx.recv(), Some(Event::Key('d')));
        assert_eq!(rx.recv(), Some(Event::TransportStarted));
        assert!(rx.is_empty());
    }

    #[test]
    fn test_closed_queue() {
        let (tx, rx) = event_queue();
        tx.on_stopped(StopReason::EndOfStream);
        drop(tx);
        assert_eq!(rx.recv(), Some(Event::TransportStopped(StopReason::EndOfStream)));
        assert_eq!(rx.recv(), None);

        let (tx, rx) = event_queue();
        drop(rx);
        assert!(!tx.send(Event::Shutdown));
    }
}
