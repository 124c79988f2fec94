//! Processor trait definition
//!
//! Base trait for the stage processors run by the local engine's real-time
//! thread. A processor receives one block per input port and returns one
//! block per output port for every period.

use std::io;

use crate::engine::AudioBlock;
use crate::pipeline::{StageParameter, StageTrigger};

/// What the engine should do after a processor ran
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Flow {
    #[default]
    Continue,
    /// The source has nothing more; drop this period and end the run
    EndOfStream,
    /// A requested fade finished; deliver this period, then end the run
    FadeComplete,
}

/// Base trait for all stage processors
///
/// Processors are created on the real-time thread and never leave it, so
/// they need not be `Send`.
pub trait Processor {
    /// Implementation name for logs
    fn name(&self) -> &'static str;

    /// Process one period
    ///
    /// # Arguments
    /// * `inputs` - One block per input port, in port order
    ///
    /// # Returns
    /// One block per output port, in port order
    fn process(&mut self, inputs: Vec<AudioBlock>) -> io::Result<Vec<AudioBlock>>;

    /// Flow state after the last `process` call
    fn flow(&self) -> Flow {
        Flow::Continue
    }

    /// Apply a parameter that was already validated by the engine
    fn set_parameter(&mut self, _parameter: StageParameter) {}

    fn trigger(&mut self, _trigger: StageTrigger) {}

    /// Prepare for a new run
    fn rearm(&mut self) {}

    /// Whether this processor blocks at the device clock
    fn is_clocked(&self) -> bool {
        false
    }

    /// Flush and close at shutdown
    fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Take the single input of a one-port processor
pub(crate) fn single(inputs: Vec<AudioBlock>) -> io::Result<AudioBlock> {
    inputs.into_iter().next().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "processor received no input block")
    })
}
