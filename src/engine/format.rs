//! Audio format descriptions
//!
//! The native format comes from the WAV header and never changes for a
//! session. Processing between the two format adapters runs on 32-bit float.

use std::fmt;

// ============================================================================
// Constants
// ============================================================================

/// Duration of one pipeline frame in milliseconds
pub const FRAME_DURATION_MS: u32 = 20;

/// Full-scale divisors for the supported PCM depths
const S16_SCALE: f32 = 32_768.0;
const S24_SCALE: f32 = 8_388_608.0;
const S32_SCALE: f32 = 2_147_483_648.0;

// ============================================================================
// Channel layout and bit depth
// ============================================================================

/// Supported channel layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelLayout {
    Mono,
    Stereo,
}

impl ChannelLayout {
    /// Map a header channel count, `None` for anything but 1 or 2
    pub fn from_count(channels: u16) -> Option<Self> {
        match channels {
            1 => Some(ChannelLayout::Mono),
            2 => Some(ChannelLayout::Stereo),
            _ => None,
        }
    }

    /// Number of interleaved channels
    pub fn count(self) -> usize {
        match self {
            ChannelLayout::Mono => 1,
            ChannelLayout::Stereo => 2,
        }
    }

    pub fn is_stereo(self) -> bool {
        self == ChannelLayout::Stereo
    }
}

/// PCM bit depths accepted from the source file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BitDepth {
    Sixteen,
    TwentyFour,
    ThirtyTwo,
}

impl BitDepth {
    pub fn from_bits(bits: u16) -> Option<Self> {
        match bits {
            16 => Some(BitDepth::Sixteen),
            24 => Some(BitDepth::TwentyFour),
            32 => Some(BitDepth::ThirtyTwo),
            _ => None,
        }
    }

    pub fn bits(self) -> u16 {
        match self {
            BitDepth::Sixteen => 16,
            BitDepth::TwentyFour => 24,
            BitDepth::ThirtyTwo => 32,
        }
    }

    /// Native sample format for this depth (24-bit is packed in 3 bytes)
    pub fn sample_format(self) -> SampleFormat {
        match self {
            BitDepth::Sixteen => SampleFormat::S16,
            BitDepth::TwentyFour => SampleFormat::S24Packed,
            BitDepth::ThirtyTwo => SampleFormat::S32,
        }
    }
}

// ============================================================================
// Sample formats
// ============================================================================

/// Sample encodings that can travel over a link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleFormat {
    /// Signed 16-bit little endian
    S16,
    /// Signed 24-bit little endian, 3 bytes per sample
    S24Packed,
    /// Signed 32-bit little endian
    S32,
    /// 32-bit float working format
    F32,
}

impl SampleFormat {
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::S16 => 2,
            SampleFormat::S24Packed => 3,
            SampleFormat::S32 | SampleFormat::F32 => 4,
        }
    }

    pub fn is_float(self) -> bool {
        self == SampleFormat::F32
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SampleFormat::S16 => "s16",
            SampleFormat::S24Packed => "s24_3",
            SampleFormat::S32 => "s32",
            SampleFormat::F32 => "float",
        };
        f.write_str(name)
    }
}

/// Decode one little-endian PCM sample to float in [-1.0, 1.0)
///
/// `bytes` must hold exactly one sample of `format`.
#[inline]
pub fn decode_sample(format: SampleFormat, bytes: &[u8]) -> f32 {
    match format {
        SampleFormat::S16 => i16::from_le_bytes([bytes[0], bytes[1]]) as f32 / S16_SCALE,
        SampleFormat::S24Packed => {
            // Place the 3 bytes in the top of an i32 so the shift sign-extends
            let raw = i32::from_le_bytes([0, bytes[0], bytes[1], bytes[2]]) >> 8;
            raw as f32 / S24_SCALE
        }
        SampleFormat::S32 => {
            i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f32 / S32_SCALE
        }
        SampleFormat::F32 => f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
    }
}

/// Encode one float sample into `out` as little-endian `format`, clipping to full scale
#[inline]
pub fn encode_sample(format: SampleFormat, sample: f32, out: &mut [u8]) {
    match format {
        SampleFormat::S16 => {
            let v = (sample * S16_SCALE).round().clamp(-S16_SCALE, S16_SCALE - 1.0) as i16;
            out.copy_from_slice(&v.to_le_bytes());
        }
        SampleFormat::S24Packed => {
            let v = (sample * S24_SCALE).round().clamp(-S24_SCALE, S24_SCALE - 1.0) as i32;
            out.copy_from_slice(&v.to_le_bytes()[..3]);
        }
        SampleFormat::S32 => {
            let v = (sample as f64 * S32_SCALE as f64)
                .round()
                .clamp(-(S32_SCALE as f64), S32_SCALE as f64 - 1.0) as i32;
            out.copy_from_slice(&v.to_le_bytes());
        }
        SampleFormat::F32 => out.copy_from_slice(&sample.to_le_bytes()),
    }
}

// ============================================================================
// Descriptors
// ============================================================================

/// Format of the source payload, derived once from the WAV header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormatDescriptor {
    pub sample_rate: u32,
    pub bit_depth: BitDepth,
    pub channels: ChannelLayout,
}

impl AudioFormatDescriptor {
    pub fn new(sample_rate: u32, bit_depth: BitDepth, channels: ChannelLayout) -> Self {
        Self {
            sample_rate,
            bit_depth,
            channels,
        }
    }

    /// Native (source and output) sample format
    pub fn native_format(&self) -> SampleFormat {
        self.bit_depth.sample_format()
    }

    /// Bytes in one interleaved frame
    pub fn frame_bytes(&self) -> usize {
        self.native_format().bytes_per_sample() * self.channels.count()
    }

    /// Frames per pipeline period (20 ms worth, at least one)
    pub fn frames_per_period(&self) -> usize {
        ((FRAME_DURATION_MS as u64 * self.sample_rate as u64 / 1000) as usize).max(1)
    }

    /// Link format carrying `channels` channels of `sample_format` at this rate
    pub fn link_format(&self, sample_format: SampleFormat, channels: usize) -> LinkFormat {
        LinkFormat {
            sample_rate: self.sample_rate,
            sample_format,
            channels,
            frame_size: self.frames_per_period(),
        }
    }
}

/// Format agreement carried by one link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkFormat {
    pub sample_rate: u32,
    pub sample_format: SampleFormat,
    pub channels: usize,
    /// Frames per period
    pub frame_size: usize,
}

impl LinkFormat {
    /// Bytes per period for a PCM link
    pub fn period_bytes(&self) -> usize {
        self.frame_size * self.channels * self.sample_format.bytes_per_sample()
    }

    /// Samples per period across all channels
    pub fn period_samples(&self) -> usize {
        self.frame_size * self.channels
    }
}

impl fmt::Display for LinkFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}Hz/{}/{}ch/{}",
            self.sample_rate, self.sample_format, self.channels, self.frame_size
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_frames_per_period_is_20ms() {
        let format =
            AudioFormatDescriptor::new(44_100, BitDepth::Sixteen, ChannelLayout::Stereo);
        assert_eq!(format.frames_per_period(), 882);
        assert_eq!(format.frame_bytes(), 4);
    }

    #[test_case(SampleFormat::S16, 0.5 ; "s16")]
    #[test_case(SampleFormat::S24Packed, -0.25 ; "s24")]
    #[test_case(SampleFormat::S32, 0.125 ; "s32")]
    #[test_case(SampleFormat::F32, -0.75 ; "float")]
    fn test_encode_decode_exact_for_dyadic_values(format: SampleFormat, value: f32) {
        let mut bytes = vec![0u8; format.bytes_per_sample()];
        encode_sample(format, value, &mut bytes);
        assert_eq!(decode_sample(format, &bytes), value);
    }

    #[test]
    fn test_s24_sign_extension() {
        // 0xFFFFFF is -1 in 24-bit two's complement
        let decoded = decode_sample(SampleFormat::S24Packed, &[0xFF, 0xFF, 0xFF]);
        assert_eq!(decoded, -1.0 / 8_388_608.0);
    }

    #[test]
    fn test_encode_clips_out_of_range() {
        let mut bytes = [0u8; 2];
        encode_sample(SampleFormat::S16, 4.0, &mut bytes);
        assert_eq!(i16::from_le_bytes(bytes), i16::MAX);
        encode_sample(SampleFormat::S16, -4.0, &mut bytes);
        assert_eq!(i16::from_le_bytes(bytes), i16::MIN);
    }

    #[test]
    fn test_layout_and_depth_lookup() {
        assert_eq!(ChannelLayout::from_count(2), Some(ChannelLayout::Stereo));
        assert_eq!(ChannelLayout::from_count(3), None);
        assert_eq!(BitDepth::from_bits(24), Some(BitDepth::TwentyFour));
        assert_eq!(BitDepth::from_bits(8), None);
    }
}
