//! Output sinks
//!
//! Terminal stages: they consume native-format blocks and produce nothing.
//! The file writer keeps its WAV open across runs and finalizes the header
//! at shutdown.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::debug;

use crate::dsp::processor::{single, Processor};
use crate::engine::{AudioBlock, BlockData, SampleFormat};

/// Native PCM bytes of `block` in `format`, converting if it arrived as floats
fn native_bytes(block: AudioBlock, format: SampleFormat) -> Vec<u8> {
    let is_native = matches!(block.data, BlockData::Pcm(_)) && block.format == format;
    let block = if is_native { block } else { block.into_pcm(format) };
    match block.data {
        BlockData::Pcm(bytes) => bytes,
        BlockData::Float(_) => Vec::new(),
    }
}

fn hound_error(e: hound::Error) -> io::Error {
    match e {
        hound::Error::IoError(e) => e,
        other => io::Error::new(io::ErrorKind::Other, other),
    }
}

// ============================================================================
// WAV file writer
// ============================================================================

/// Writes the stream to a PCM WAV file
pub struct FileWriter {
    path: PathBuf,
    format: SampleFormat,
    writer: Option<hound::WavWriter<BufWriter<File>>>,
}

impl FileWriter {
    /// Create (truncate) the file and write a provisional header
    ///
    /// # Errors
    /// Any I/O error creating the file, or a float `format`.
    pub fn create(
        path: impl AsRef<Path>,
        sample_rate: u32,
        channels: usize,
        format: SampleFormat,
    ) -> io::Result<Self> {
        if format.is_float() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "file writer only accepts integer PCM",
            ));
        }
        let spec = hound::WavSpec {
            channels: channels as u16,
            sample_rate,
            bits_per_sample: (format.bytes_per_sample() * 8) as u16,
            sample_format: hound::SampleFormat::Int,
        };
        let path = path.as_ref().to_path_buf();
        let writer = hound::WavWriter::create(&path, spec).map_err(hound_error)?;
        debug!("[SINK] writing {} as {}", path.display(), format);
        Ok(Self {
            path,
            format,
            writer: Some(writer),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Processor for FileWriter {
    fn name(&self) -> &'static str {
        "file-writer"
    }

    fn process(&mut self, inputs: Vec<AudioBlock>) -> io::Result<Vec<AudioBlock>> {
        let bytes = native_bytes(single(inputs)?, self.format);
        let Some(writer) = self.writer.as_mut() else {
            return Ok(Vec::new());
        };

        let width = self.format.bytes_per_sample();
        for sample in bytes.chunks_exact(width) {
            let result = match self.format {
                SampleFormat::S16 => writer.write_sample(i16::from_le_bytes([sample[0], sample[1]])),
                SampleFormat::S24Packed => {
                    writer.write_sample(i32::from_le_bytes([0, sample[0], sample[1], sample[2]]) >> 8)
                }
                SampleFormat::S32 | SampleFormat::F32 => writer.write_sample(i32::from_le_bytes([
                    sample[0], sample[1], sample[2], sample[3],
                ])),
            };
            result.map_err(hound_error)?;
        }
        Ok(Vec::new())
    }

    fn finish(&mut self) -> io::Result<()> {
        match self.writer.take() {
            Some(writer) => writer.finalize().map_err(hound_error),
            None => Ok(()),
        }
    }
}

// ============================================================================
// Byte and discard sinks
// ============================================================================

/// Raw native-format frames on standard output
pub struct ByteSink {
    format: SampleFormat,
    out: io::Stdout,
}

impl ByteSink {
    pub fn new(format: SampleFormat) -> Self {
        Self {
            format,
            out: io::stdout(),
        }
    }
}

impl Processor for ByteSink {
    fn name(&self) -> &'static str {
        "byte-sink"
    }

    fn process(&mut self, inputs: Vec<AudioBlock>) -> io::Result<Vec<AudioBlock>> {
        let bytes = native_bytes(single(inputs)?, self.format);
        self.out.lock().write_all(&bytes)?;
        Ok(Vec::new())
    }

    fn finish(&mut self) -> io::Result<()> {
        self.out.lock().flush()
    }
}

/// Drops everything
#[derive(Debug, Default)]
pub struct DiscardSink {
    frames: u64,
}

impl DiscardSink {
    /// Frames consumed since creation
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl Processor for DiscardSink {
    fn name(&self) -> &'static str {
        "discard-sink"
    }

    fn process(&mut self, inputs: Vec<AudioBlock>) -> io::Result<Vec<AudioBlock>> {
        self.frames += single(inputs)?.frames() as u64;
        Ok(Vec::new())
    }
}

// ============================================================================
// Audio device
// ============================================================================

#[cfg(feature = "device-output")]
pub use device::DeviceSink;

#[cfg(feature = "device-output")]
mod device {
    use std::io;
    use std::thread;
    use std::time::Duration;

    use rodio::buffer::SamplesBuffer;
    use rodio::{OutputStream, Sink};

    use super::single;
    use crate::dsp::processor::Processor;
    use crate::engine::{AudioBlock, BlockData};

    /// Periods queued in the device before `process` waits
    const QUEUED_PERIODS: usize = 3;

    /// Default system output device
    ///
    /// `process` blocks while the device queue is full, so the device clock
    /// paces the real-time loop.
    pub struct DeviceSink {
        /// Must outlive `sink`
        _stream: OutputStream,
        sink: Sink,
        sample_rate: u32,
        period: Duration,
    }

    impl DeviceSink {
        /// Open the default output device
        pub fn open(sample_rate: u32, period: Duration) -> io::Result<Self> {
            let (stream, handle) = OutputStream::try_default()
                .map_err(|e| io::Error::new(io::ErrorKind::NotFound, e))?;
            let sink =
                Sink::try_new(&handle).map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            Ok(Self {
                _stream: stream,
                sink,
                sample_rate,
                period,
            })
        }
    }

    impl Processor for DeviceSink {
        fn name(&self) -> &'static str {
            "device"
        }

        fn process(&mut self, inputs: Vec<AudioBlock>) -> io::Result<Vec<AudioBlock>> {
            let block = single(inputs)?.into_float();
            let channels = block.channels as u16;
            if let BlockData::Float(samples) = block.data {
                self.sink
                    .append(SamplesBuffer::new(channels, self.sample_rate, samples));
            }
            while self.sink.len() > QUEUED_PERIODS {
                thread::sleep(self.period / 4);
            }
            Ok(Vec::new())
        }

        fn is_clocked(&self) -> bool {
            true
        }

        fn finish(&mut self) -> io::Result<()> {
            self.sink.stop();
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_writer_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");

        let mut writer = FileWriter::create(&path, 8_000, 2, SampleFormat::S16).unwrap();
        let bytes = vec![0x01, 0x00, 0xFF, 0xFF, 0x00, 0x40, 0x00, 0xC0];
        writer
            .process(vec![AudioBlock::pcm(2, SampleFormat::S16, bytes)])
            .unwrap();
        writer.finish().unwrap();

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().channels, 2);
        let samples: Vec<i16> = reader.into_samples().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![1, -1, 16_384, -16_384]);
    }

    #[test]
    fn test_file_writer_handles_24_bit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out24.wav");

        let mut writer = FileWriter::create(&path, 8_000, 1, SampleFormat::S24Packed).unwrap();
        writer
            .process(vec![AudioBlock::pcm(
                1,
                SampleFormat::S24Packed,
                vec![0xFF, 0xFF, 0xFF, 0x00, 0x00, 0x40],
            )])
            .unwrap();
        writer.finish().unwrap();

        let samples: Vec<i32> = hound::WavReader::open(&path)
            .unwrap()
            .into_samples()
            .map(|s| s.unwrap())
            .collect();
        assert_eq!(samples, vec![-1, 0x40_0000]);
    }

    #[test]
    fn test_float_writer_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(FileWriter::create(dir.path().join("f.wav"), 8_000, 1, SampleFormat::F32).is_err());
    }

    #[test]
    fn test_discard_counts_frames() {
        let mut sink = DiscardSink::default();
        sink.process(vec![AudioBlock::float(2, vec![0.0; 8])]).unwrap();
        assert_eq!(sink.frames(), 4);
    }
}
