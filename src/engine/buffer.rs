//! Audio blocks
//!
//! One period of audio as it travels over a single link. Native-format
//! blocks carry raw little-endian bytes; working-format blocks carry
//! interleaved floats.

use crate::engine::format::{decode_sample, encode_sample, SampleFormat};

/// Sample storage for one period
#[derive(Debug, Clone, PartialEq)]
pub enum BlockData {
    /// Little-endian PCM bytes in the link's native format
    Pcm(Vec<u8>),
    /// Interleaved float samples
    Float(Vec<f32>),
}

/// One period of interleaved audio
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBlock {
    pub channels: usize,
    pub format: SampleFormat,
    pub data: BlockData,
}

impl AudioBlock {
    /// Wrap raw PCM bytes
    pub fn pcm(channels: usize, format: SampleFormat, bytes: Vec<u8>) -> Self {
        Self {
            channels,
            format,
            data: BlockData::Pcm(bytes),
        }
    }

    /// Wrap interleaved float samples
    pub fn float(channels: usize, samples: Vec<f32>) -> Self {
        Self {
            channels,
            format: SampleFormat::F32,
            data: BlockData::Float(samples),
        }
    }

    /// Number of frames in the block
    pub fn frames(&self) -> usize {
        let samples = match &self.data {
            BlockData::Pcm(bytes) => bytes.len() / self.format.bytes_per_sample(),
            BlockData::Float(samples) => samples.len(),
        };
        samples / self.channels.max(1)
    }

    /// Convert to interleaved floats, decoding PCM if needed
    pub fn into_float(self) -> Self {
        let channels = self.channels;
        Self::float(channels, self.into_samples())
    }

    /// Convert to PCM bytes in `format`
    pub fn into_pcm(self, format: SampleFormat) -> Self {
        let channels = self.channels;
        let samples = self.into_samples();
        let width = format.bytes_per_sample();
        let mut bytes = vec![0u8; samples.len() * width];
        for (sample, out) in samples.iter().zip(bytes.chunks_exact_mut(width)) {
            encode_sample(format, *sample, out);
        }
        Self::pcm(channels, format, bytes)
    }

    /// Run `f` over the samples as floats, decoding PCM in place first
    pub fn with_float_samples<T>(&mut self, f: impl FnOnce(&mut [f32]) -> T) -> T {
        let data = std::mem::replace(&mut self.data, BlockData::Float(Vec::new()));
        let mut samples = match data {
            BlockData::Float(samples) => samples,
            BlockData::Pcm(bytes) => decode_bytes(self.format, &bytes),
        };
        let result = f(&mut samples);
        self.format = SampleFormat::F32;
        self.data = BlockData::Float(samples);
        result
    }

    fn into_samples(self) -> Vec<f32> {
        match self.data {
            BlockData::Float(samples) => samples,
            BlockData::Pcm(bytes) => decode_bytes(self.format, &bytes),
        }
    }
}

fn decode_bytes(format: SampleFormat, bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(format.bytes_per_sample())
        .map(|sample| decode_sample(format, sample))
        .collect()
}

/// De-interleave samples from [L,R,L,R,...] to [[L,L,...], [R,R,...]]
pub fn deinterleave(samples: &[f32], channels: usize) -> Vec<Vec<f32>> {
    let frames = samples.len() / channels.max(1);
    let mut result = vec![Vec::with_capacity(frames); channels];

    for (i, sample) in samples.iter().enumerate() {
        result[i % channels].push(*sample);
    }

    result
}

/// Interleave channels from [[L,L,...], [R,R,...]] to [L,R,L,R,...]
///
/// Shorter channels are padded with silence.
pub fn interleave(channels: &[Vec<f32>]) -> Vec<f32> {
    let frames = channels.iter().map(Vec::len).max().unwrap_or(0);
    let mut result = Vec::with_capacity(frames * channels.len());

    for frame in 0..frames {
        for channel in channels {
            result.push(channel.get(frame).copied().unwrap_or(0.0));
        }
    }

    result
}
