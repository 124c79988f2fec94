//! Stream ingest
//!
//! Pulls one period of native frames from the source per call, blocking.

use std::io;
use std::sync::Arc;

use crate::dsp::processor::{Flow, Processor};
use crate::engine::{AudioBlock, FrameSource, ReadOutcome};

pub struct StreamIn {
    source: Arc<dyn FrameSource>,
    frames: usize,
    buffer: Vec<u8>,
    flow: Flow,
}

impl StreamIn {
    /// Read `frames` frames per period from `source`
    pub fn new(source: Arc<dyn FrameSource>, frames: usize) -> Self {
        let bytes = frames * source.format().frame_bytes();
        Self {
            source,
            frames,
            buffer: vec![0; bytes],
            flow: Flow::Continue,
        }
    }
}

impl Processor for StreamIn {
    fn name(&self) -> &'static str {
        "stream-in"
    }

    fn process(&mut self, _inputs: Vec<AudioBlock>) -> io::Result<Vec<AudioBlock>> {
        match self.source.read(&mut self.buffer, self.frames)? {
            ReadOutcome::Frames(_) => {
                let format = self.source.format();
                Ok(vec![AudioBlock::pcm(
                    format.channels.count(),
                    format.native_format(),
                    self.buffer.clone(),
                )])
            }
            ReadOutcome::EndOfStream => {
                self.flow = Flow::EndOfStream;
                Ok(Vec::new())
            }
        }
    }

    fn flow(&self) -> Flow {
        self.flow
    }

    fn rearm(&mut self) {
        self.flow = Flow::Continue;
    }
}
