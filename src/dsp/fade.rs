//! Fade ramps
//!
//! Linear fade-in at the start of every run and an on-demand fade-out that
//! ends the run once it reaches silence.

use std::io;
use std::time::Duration;

use crate::dsp::processor::{single, Flow, Processor};
use crate::engine::{AudioBlock, BlockData};
use crate::pipeline::StageTrigger;

/// Length of a ramp in frames, at least one
fn ramp_frames(duration: Duration, sample_rate: u32) -> usize {
    ((duration.as_secs_f64() * sample_rate as f64).round() as usize).max(1)
}

/// Multiply each frame of `samples` by `gain(frame_index)`
fn apply_per_frame(samples: &mut [f32], channels: usize, mut gain: impl FnMut(usize) -> f32) {
    for (frame, chunk) in samples.chunks_mut(channels.max(1)).enumerate() {
        let g = gain(frame);
        for sample in chunk {
            *sample *= g;
        }
    }
}

// ============================================================================
// Fade-in
// ============================================================================

/// Ramps from silence to full level over the first frames of a run
///
/// Keeps the block in the format it arrived in.
#[derive(Debug, Clone)]
pub struct FadeIn {
    length: usize,
    position: usize,
}

impl FadeIn {
    pub fn new(duration: Duration, sample_rate: u32) -> Self {
        Self {
            length: ramp_frames(duration, sample_rate),
            position: 0,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.position >= self.length
    }
}

impl Processor for FadeIn {
    fn name(&self) -> &'static str {
        "fade-in"
    }

    fn process(&mut self, inputs: Vec<AudioBlock>) -> io::Result<Vec<AudioBlock>> {
        let mut block = single(inputs)?;
        if self.is_complete() {
            return Ok(vec![block]);
        }

        let native = match block.data {
            BlockData::Pcm(_) => Some(block.format),
            BlockData::Float(_) => None,
        };
        let (start, length, channels) = (self.position, self.length, block.channels);
        let frames = block.with_float_samples(|samples| {
            apply_per_frame(samples, channels, |frame| {
                ((start + frame) as f32 / length as f32).min(1.0)
            });
            samples.len() / channels.max(1)
        });
        self.position = (start + frames).min(length);

        Ok(vec![match native {
            Some(format) => block.into_pcm(format),
            None => block,
        }])
    }

    fn rearm(&mut self) {
        self.position = 0;
    }
}

// ============================================================================
// Fade-out
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FadeState {
    Idle,
    Fading { position: usize },
    Silent,
}

/// Passes audio through until triggered, then ramps to silence
#[derive(Debug, Clone)]
pub struct FadeOut {
    length: usize,
    state: FadeState,
}

impl FadeOut {
    pub fn new(duration: Duration, sample_rate: u32) -> Self {
        Self {
            length: ramp_frames(duration, sample_rate),
            state: FadeState::Idle,
        }
    }

    pub fn is_fading(&self) -> bool {
        matches!(self.state, FadeState::Fading { .. })
    }
}

impl Processor for FadeOut {
    fn name(&self) -> &'static str {
        "fade-out"
    }

    fn process(&mut self, inputs: Vec<AudioBlock>) -> io::Result<Vec<AudioBlock>> {
        let mut block = single(inputs)?;
        let channels = block.channels;

        match self.state {
            FadeState::Idle => {}
            FadeState::Fading { position } => {
                let length = self.length;
                let frames = block.with_float_samples(|samples| {
                    apply_per_frame(samples, channels, |frame| {
                        1.0 - ((position + frame) as f32 / length as f32).min(1.0)
                    });
                    samples.len() / channels.max(1)
                });
                let position = position + frames;
                self.state = if position >= length {
                    FadeState::Silent
                } else {
                    FadeState::Fading { position }
                };
            }
            FadeState::Silent => block.with_float_samples(|samples| samples.fill(0.0)),
        }

        Ok(vec![block])
    }

    fn flow(&self) -> Flow {
        match self.state {
            FadeState::Silent => Flow::FadeComplete,
            _ => Flow::Continue,
        }
    }

    fn trigger(&mut self, trigger: StageTrigger) {
        match trigger {
            StageTrigger::FadeOut if self.state == FadeState::Idle => {
                self.state = FadeState::Fading { position: 0 };
            }
            StageTrigger::FadeOut => {}
        }
    }

    fn rearm(&mut self) {
        self.state = FadeState::Idle;
    }
}
