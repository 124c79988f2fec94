//! Routing processors
//!
//! Format adapters, channel split/merge, fan-out and pass-through. None of
//! these change the signal level.

use std::io;

use crate::dsp::processor::{single, Processor};
use crate::engine::buffer::{deinterleave, interleave};
use crate::engine::{AudioBlock, BlockData, SampleFormat};

/// Converts blocks to the sample format of its output link
#[derive(Debug, Clone)]
pub struct FormatAdapter {
    output: SampleFormat,
}

impl FormatAdapter {
    pub fn new(output: SampleFormat) -> Self {
        Self { output }
    }
}

impl Processor for FormatAdapter {
    fn name(&self) -> &'static str {
        "format-adapter"
    }

    fn process(&mut self, inputs: Vec<AudioBlock>) -> io::Result<Vec<AudioBlock>> {
        let block = single(inputs)?;
        let converted = if self.output.is_float() {
            block.into_float()
        } else {
            block.into_pcm(self.output)
        };
        Ok(vec![converted])
    }
}

/// One interleaved stream to one mono stream per channel
#[derive(Debug, Clone, Default)]
pub struct Deinterleave;

impl Processor for Deinterleave {
    fn name(&self) -> &'static str {
        "deinterleave"
    }

    fn process(&mut self, inputs: Vec<AudioBlock>) -> io::Result<Vec<AudioBlock>> {
        let block = single(inputs)?.into_float();
        let channels = block.channels;
        let BlockData::Float(samples) = block.data else {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "expected float samples"));
        };
        Ok(deinterleave(&samples, channels)
            .into_iter()
            .map(|channel| AudioBlock::float(1, channel))
            .collect())
    }
}

/// One mono stream per port to one interleaved stream
#[derive(Debug, Clone, Default)]
pub struct Interleave;

impl Processor for Interleave {
    fn name(&self) -> &'static str {
        "interleave"
    }

    fn process(&mut self, inputs: Vec<AudioBlock>) -> io::Result<Vec<AudioBlock>> {
        let channels: Vec<Vec<f32>> = inputs
            .into_iter()
            .map(|block| match block.into_float().data {
                BlockData::Float(samples) => samples,
                BlockData::Pcm(_) => Vec::new(),
            })
            .collect();
        Ok(vec![AudioBlock::float(channels.len(), interleave(&channels))])
    }
}

/// Copies its input to both output ports
#[derive(Debug, Clone, Default)]
pub struct Duplicator;

impl Processor for Duplicator {
    fn name(&self) -> &'static str {
        "duplicator"
    }

    fn process(&mut self, inputs: Vec<AudioBlock>) -> io::Result<Vec<AudioBlock>> {
        let block = single(inputs)?;
        Ok(vec![block.clone(), block])
    }
}

/// Forwards its input unchanged
///
/// Stands in for the pitch/tempo stage when none is available.
#[derive(Debug, Clone, Default)]
pub struct PassThrough;

impl Processor for PassThrough {
    fn name(&self) -> &'static str {
        "pass-through"
    }

    fn process(&mut self, inputs: Vec<AudioBlock>) -> io::Result<Vec<AudioBlock>> {
        Ok(vec![single(inputs)?])
    }
}
