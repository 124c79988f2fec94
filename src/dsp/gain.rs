//! Gain Processor
//!
//! Per-channel linear gain, one mono port per channel. Changes ramp across
//! one period so a volume step never produces a click.

use std::io;

use crate::dsp::processor::Processor;
use crate::engine::AudioBlock;
use crate::pipeline::StageParameter;

// ============================================================================
// Constants
// ============================================================================

/// Gains closer than this to the current value skip the ramp
const GAIN_EPSILON: f32 = 1.0e-6;

// ============================================================================
// Gain Processor
// ============================================================================

/// Independent gain on each channel port
///
/// # Example
/// ```ignore
/// use kplay::dsp::{GainProcessor, Processor};
///
/// let mut gain = GainProcessor::new(2);
/// gain.set_parameter(StageParameter::Gain { port: 1, value: 0.5 });
/// ```
#[derive(Debug, Clone)]
pub struct GainProcessor {
    /// Gain applied at the end of the last period, per port
    current: Vec<f32>,
    /// Requested gain, per port
    target: Vec<f32>,
}

impl GainProcessor {
    /// Create a unity-gain processor
    ///
    /// # Arguments
    /// * `channels` - Number of ports
    pub fn new(channels: usize) -> Self {
        Self {
            current: vec![1.0; channels],
            target: vec![1.0; channels],
        }
    }

    /// Requested gain on `port`
    pub fn gain(&self, port: usize) -> Option<f32> {
        self.target.get(port).copied()
    }

    fn apply(&mut self, port: usize, samples: &mut [f32]) {
        let (Some(from), Some(to)) = (self.current.get(port).copied(), self.target.get(port).copied())
        else {
            return;
        };

        if (to - from).abs() < GAIN_EPSILON {
            if (to - 1.0).abs() >= f32::EPSILON {
                for sample in samples.iter_mut() {
                    *sample *= to;
                }
            }
        } else {
            let steps = samples.len().max(1) as f32;
            for (i, sample) in samples.iter_mut().enumerate() {
                let gain = from + (to - from) * (i + 1) as f32 / steps;
                *sample *= gain;
            }
        }
        self.current[port] = to;
    }
}

impl Processor for GainProcessor {
    fn name(&self) -> &'static str {
        "gain"
    }

    fn process(&mut self, inputs: Vec<AudioBlock>) -> io::Result<Vec<AudioBlock>> {
        let mut outputs = Vec::with_capacity(inputs.len());
        for (port, mut block) in inputs.into_iter().enumerate() {
            block.with_float_samples(|samples| self.apply(port, samples));
            outputs.push(block);
        }
        Ok(outputs)
    }

    fn set_parameter(&mut self, parameter: StageParameter) {
        if let StageParameter::Gain { port, value } = parameter {
            if let Some(target) = self.target.get_mut(port) {
                *target = value as f32;
            }
        }
    }

    fn rearm(&mut self) {
        // Start each run at the requested level
        self.current.clone_from(&self.target);
    }
}

// ============================================================================
// Tests
// ============================================================================
