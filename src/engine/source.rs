//! Source Reader
//!
//! Sequential, seekable producer of raw PCM frames from a validated WAV
//! stream. Reads run on the engine's real-time thread, seeks come from the
//! Coordinator; a single lock serialises the two so a read observes either
//! the pre-seek or the post-seek cursor, never a mix.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use log::debug;
use parking_lot::Mutex;

use crate::engine::format::{AudioFormatDescriptor, BitDepth, ChannelLayout};
use crate::error::OpenError;

/// Progress scale: hundredths of a percent
pub const PROGRESS_FULL: u32 = 10_000;

/// Smallest file that can hold the RIFF and WAVE tags
const MIN_RIFF_BYTES: u64 = 12;

/// Outcome of one blocking read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// The requested number of frames was delivered (tail zero-filled on a short read)
    Frames(usize),
    /// Nothing left to read
    EndOfStream,
}

/// Callback receiving playback progress in hundredths of a percent
pub type ProgressListener = Box<dyn Fn(u32) + Send + Sync>;

/// A producer of interleaved native-format frames.
///
/// This is what the ingest stage pulls from.
pub trait FrameSource: Send + Sync {
    /// Format of the frames produced
    fn format(&self) -> AudioFormatDescriptor;

    /// Fill `buffer` with `frames` frames, blocking until done or end of stream.
    ///
    /// `buffer` must hold at least `frames * format().frame_bytes()` bytes.
    fn read(&self, buffer: &mut [u8], frames: usize) -> io::Result<ReadOutcome>;

    /// Move the read cursor back to the first payload byte
    fn seek_to_begin(&self) -> io::Result<()>;
}

struct Cursor<R> {
    reader: R,
    /// Payload bytes consumed so far
    position: u64,
}

/// A validated WAV payload
pub struct WavSource<R = BufReader<File>> {
    format: AudioFormatDescriptor,
    data_offset: u64,
    data_len: u64,
    cursor: Mutex<Cursor<R>>,
    progress: Option<ProgressListener>,
}

impl WavSource<BufReader<File>> {
    /// Open and validate a WAV file
    ///
    /// # Errors
    /// One `OpenError` variant per failed check; nothing is returned on failure.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, OpenError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| OpenError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(BufReader::new(file)).map_err(|err| match err {
            OpenError::Io { source, .. } => OpenError::Io {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }
}

impl<R: Read + Seek> WavSource<R> {
    /// Validate a WAV stream held by any seekable reader
    ///
    /// Only the checks needed to pick a topology are applied: RIFF/WAVE tags,
    /// PCM, a `data` chunk, channel count, bit depth and a packed frame
    /// layout. Size fields are trusted no further than the bytes present.
    pub fn from_reader(mut reader: R) -> Result<Self, OpenError> {
        let total = reader.seek(SeekFrom::End(0)).map_err(io_error)?;
        if total < MIN_RIFF_BYTES {
            return Err(OpenError::NotRiffWave {
                reason: format!("file is only {} bytes", total),
            });
        }
        reader.seek(SeekFrom::Start(0)).map_err(io_error)?;

        let riff: [u8; 12] = read_array(&mut reader).map_err(io_error)?;
        if &riff[0..4] != b"RIFF" || &riff[8..12] != b"WAVE" {
            return Err(OpenError::NotRiffWave {
                reason: "missing RIFF/WAVE tags".to_string(),
            });
        }

        let (fmt, data_offset, declared_len) = scan_chunks(&mut reader)?;

        let channels = ChannelLayout::from_count(fmt.channels).ok_or(
            OpenError::UnsupportedChannels {
                channels: fmt.channels,
            },
        )?;
        let bit_depth = BitDepth::from_bits(fmt.bits_per_sample).ok_or(
            OpenError::UnsupportedBitDepth {
                bits: fmt.bits_per_sample,
            },
        )?;
        if fmt.sample_rate == 0 {
            return Err(OpenError::Malformed {
                reason: "sample rate is zero".to_string(),
            });
        }

        let format = AudioFormatDescriptor::new(fmt.sample_rate, bit_depth, channels);
        // Padded containers (24-bit samples in 4 bytes) would skew every frame
        if fmt.block_align as usize != format.frame_bytes() {
            return Err(OpenError::Malformed {
                reason: format!(
                    "block align {} does not match {} packed {}-bit channel(s)",
                    fmt.block_align,
                    channels.count(),
                    bit_depth.bits()
                ),
            });
        }

        // Streaming writers leave 0xFFFFFFFF and truncated files overstate the size
        let data_len = u64::from(declared_len).min(total.saturating_sub(data_offset));

        debug!(
            "opened WAV: {} Hz, {} bit, {} ch, {} payload bytes at offset {}",
            format.sample_rate,
            bit_depth.bits(),
            channels.count(),
            data_len,
            data_offset
        );

        Ok(Self {
            format,
            data_offset,
            data_len,
            cursor: Mutex::new(Cursor {
                reader,
                position: 0,
            }),
            progress: None,
        })
    }

    /// Attach the progress side channel
    pub fn with_progress_listener(mut self, listener: impl Fn(u32) + Send + Sync + 'static) -> Self {
        self.progress = Some(Box::new(listener));
        self
    }

    /// Total payload bytes
    pub fn data_len(&self) -> u64 {
        self.data_len
    }

    /// Payload bytes consumed so far
    pub fn position(&self) -> u64 {
        self.cursor.lock().position
    }

    fn progress_for(&self, position: u64) -> u32 {
        if self.data_len == 0 {
            return PROGRESS_FULL;
        }
        (position.min(self.data_len) * PROGRESS_FULL as u64 / self.data_len) as u32
    }

    fn report(&self, position: u64) {
        if let Some(listener) = &self.progress {
            listener(self.progress_for(position));
        }
    }
}

impl<R: Read + Seek + Send> FrameSource for WavSource<R> {
    fn format(&self) -> AudioFormatDescriptor {
        self.format
    }

    fn read(&self, buffer: &mut [u8], frames: usize) -> io::Result<ReadOutcome> {
        let wanted = frames * self.format.frame_bytes();
        let buffer = &mut buffer[..wanted];

        let (filled, position) = {
            let mut cursor = self.cursor.lock();
            let remaining = self.data_len - cursor.position.min(self.data_len);
            let limit = (wanted as u64).min(remaining) as usize;

            let mut filled = 0;
            while filled < limit {
                match cursor.reader.read(&mut buffer[filled..limit]) {
                    Ok(0) => break,
                    Ok(n) => filled += n,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e),
                }
            }
            cursor.position += filled as u64;
            (filled, cursor.position)
        };

        buffer[filled..].fill(0);
        self.report(position);

        if filled == 0 {
            Ok(ReadOutcome::EndOfStream)
        } else {
            Ok(ReadOutcome::Frames(frames))
        }
    }

    fn seek_to_begin(&self) -> io::Result<()> {
        let mut cursor = self.cursor.lock();
        cursor.reader.seek(SeekFrom::Start(self.data_offset))?;
        cursor.position = 0;
        debug!("source rewound to payload start");
        Ok(())
    }
}

// ============================================================================
// Header parsing
// ============================================================================

const FORMAT_PCM: u16 = 0x0001;
const FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// Bytes of the fmt chunk that are looked at (the extensible layout)
const FMT_READ_MAX: usize = 40;

/// The fields of a `fmt ` chunk kplay relies on
#[derive(Debug, Clone, Copy)]
struct FmtChunk {
    format_tag: u16,
    channels: u16,
    sample_rate: u32,
    block_align: u16,
    bits_per_sample: u16,
}

impl FmtChunk {
    fn parse(body: &[u8]) -> Result<Self, OpenError> {
        if body.len() < 16 {
            return Err(OpenError::Malformed {
                reason: format!("fmt chunk is only {} bytes", body.len()),
            });
        }
        let u16_at = |i: usize| u16::from_le_bytes([body[i], body[i + 1]]);
        let u32_at =
            |i: usize| u32::from_le_bytes([body[i], body[i + 1], body[i + 2], body[i + 3]]);

        let mut format_tag = u16_at(0);
        // The extensible layout carries the real tag at the head of its sub-format GUID
        if format_tag == FORMAT_EXTENSIBLE && body.len() >= 26 {
            format_tag = u16_at(24);
        }

        // byte_rate at offset 8 is informational and not checked
        Ok(Self {
            format_tag,
            channels: u16_at(2),
            sample_rate: u32_at(4),
            block_align: u16_at(12),
            bits_per_sample: u16_at(14),
        })
    }
}

/// Walk the chunk list up to the `data` chunk
///
/// Returns the format, the payload offset and the declared payload length,
/// leaving `reader` at the first payload byte.
fn scan_chunks<R: Read + Seek>(reader: &mut R) -> Result<(FmtChunk, u64, u32), OpenError> {
    let mut fmt = None;
    loop {
        let header: [u8; 8] = match read_array(reader) {
            Ok(header) => header,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                return Err(OpenError::MissingDataChunk)
            }
            Err(e) => return Err(io_error(e)),
        };
        let id = [header[0], header[1], header[2], header[3]];
        let size = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

        match &id {
            b"fmt " => {
                let mut body = vec![0u8; (size as usize).min(FMT_READ_MAX)];
                reader.read_exact(&mut body).map_err(|e| match e.kind() {
                    io::ErrorKind::UnexpectedEof => OpenError::Malformed {
                        reason: "fmt chunk is truncated".to_string(),
                    },
                    _ => io_error(e),
                })?;
                let chunk = FmtChunk::parse(&body)?;
                if chunk.format_tag != FORMAT_PCM {
                    return Err(OpenError::NotPcm);
                }
                fmt = Some(chunk);
                skip(reader, u64::from(size) - body.len() as u64 + u64::from(size & 1))?;
            }
            b"data" => {
                let fmt = fmt.ok_or_else(|| OpenError::Malformed {
                    reason: "data chunk precedes the fmt chunk".to_string(),
                })?;
                let offset = reader.stream_position().map_err(io_error)?;
                return Ok((fmt, offset, size));
            }
            _ => {
                debug!("skipping {:?} chunk", String::from_utf8_lossy(&id));
                skip(reader, u64::from(size) + u64::from(size & 1))?;
            }
        }
    }
}

fn read_array<const N: usize, R: Read>(reader: &mut R) -> io::Result<[u8; N]> {
    let mut bytes = [0u8; N];
    reader.read_exact(&mut bytes)?;
    Ok(bytes)
}

fn skip<R: Seek>(reader: &mut R, bytes: u64) -> Result<(), OpenError> {
    if bytes > 0 {
        reader
            .seek(SeekFrom::Current(bytes as i64))
            .map_err(io_error)?;
    }
    Ok(())
}

fn io_error(source: io::Error) -> OpenError {
    OpenError::Io {
        path: Default::default(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor as IoCursor;

    fn header(format_tag: u16, channels: u16, bits: u16, data: &[u8]) -> Vec<u8> {
        let rate: u32 = 8_000;
        let block_align = channels * bits / 8;
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&(36 + data.len() as u32).to_le_bytes());
        bytes.extend_from_slice(b"WAVE");
        bytes.extend_from_slice(b"fmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&format_tag.to_le_bytes());
        bytes.extend_from_slice(&channels.to_le_bytes());
        bytes.extend_from_slice(&rate.to_le_bytes());
        bytes.extend_from_slice(&(rate * block_align as u32).to_le_bytes());
        bytes.extend_from_slice(&block_align.to_le_bytes());
        bytes.extend_from_slice(&bits.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&(data.len() as u32).to_le_bytes());
        bytes.extend_from_slice(data);
        bytes
    }

    #[test]
    fn test_canonical_header_accepted() {
        let payload: Vec<u8> = (0..40).collect();
        let source = WavSource::from_reader(IoCursor::new(header(1, 2, 16, &payload))).unwrap();
        assert_eq!(source.format().channels, ChannelLayout::Stereo);
        assert_eq!(source.format().bit_depth, BitDepth::Sixteen);
        assert_eq!(source.data_len(), 40);
    }

    #[test]
    fn test_rejects_bad_magic() {
        let mut bytes = header(1, 1, 16, &[0; 8]);
        bytes[0..4].copy_from_slice(b"RIFX");
        let err = WavSource::from_reader(IoCursor::new(bytes)).err().unwrap();
        assert!(matches!(err, OpenError::NotRiffWave { .. }), "{err}");
    }

    #[test]
    fn test_rejects_tiny_file() {
        let err = WavSource::from_reader(IoCursor::new(b"RIFF".to_vec()))
            .err()
            .unwrap();
        assert!(matches!(err, OpenError::NotRiffWave { .. }));
    }

    #[test]
    fn test_rejects_missing_data_chunk() {
        let mut bytes = header(1, 1, 16, &[]);
        bytes.truncate(36);
        let err = WavSource::from_reader(IoCursor::new(bytes)).err().unwrap();
        assert!(matches!(err, OpenError::MissingDataChunk), "{err}");
    }

    #[test]
    fn test_skips_unknown_chunks() {
        let payload = [7u8; 8];
        let canonical = header(1, 1, 16, &payload);
        // RIFF/WAVE + fmt, then an odd-sized LIST chunk with its pad byte, then data
        let mut bytes = canonical[..36].to_vec();
        bytes.extend_from_slice(b"LIST");
        bytes.extend_from_slice(&3u32.to_le_bytes());
        bytes.extend_from_slice(&[1, 2, 3, 0]);
        bytes.extend_from_slice(&canonical[36..]);

        let source = WavSource::from_reader(IoCursor::new(bytes)).unwrap();
        assert_eq!(source.data_len(), 8);
        let mut buf = [0u8; 8];
        source.read(&mut buf, 4).unwrap();
        assert_eq!(buf, payload);
    }

    #[test]
    fn test_rejects_data_before_fmt() {
        let canonical = header(1, 1, 16, &[0; 4]);
        let mut bytes = canonical[..12].to_vec();
        bytes.extend_from_slice(&canonical[36..]);
        bytes.extend_from_slice(&canonical[12..36]);
        let err = WavSource::from_reader(IoCursor::new(bytes)).err().unwrap();
        assert!(matches!(err, OpenError::Malformed { .. }), "{err}");
    }

    #[test]
    fn test_rejects_eight_bit() {
        let err = WavSource::from_reader(IoCursor::new(header(1, 1, 8, &[0; 8])))
            .err()
            .unwrap();
        assert!(matches!(err, OpenError::UnsupportedBitDepth { bits: 8 }));
    }

    #[test]
    fn test_rejects_float_payload() {
        let err = WavSource::from_reader(IoCursor::new(header(3, 1, 32, &[0; 8])))
            .err()
            .unwrap();
        assert!(matches!(err, OpenError::NotPcm));
    }

    #[test]
    fn test_short_read_zero_fills() {
        let payload = [1u8, 2, 3, 4, 5, 6];
        let source = WavSource::from_reader(IoCursor::new(header(1, 1, 16, &payload))).unwrap();
        let mut buf = [0xAAu8; 8];
        assert_eq!(source.read(&mut buf, 4).unwrap(), ReadOutcome::Frames(4));
        assert_eq!(buf, [1, 2, 3, 4, 5, 6, 0, 0]);
        assert_eq!(source.read(&mut buf, 4).unwrap(), ReadOutcome::EndOfStream);
        assert_eq!(buf, [0; 8]);
    }

    #[test]
    fn test_seek_to_begin_rewinds() {
        let payload: Vec<u8> = (10..26).collect();
        let source = WavSource::from_reader(IoCursor::new(header(1, 1, 16, &payload))).unwrap();
        let mut first = [0u8; 4];
        let mut again = [0u8; 4];
        source.read(&mut first, 2).unwrap();
        source.read(&mut again, 2).unwrap();
        assert_ne!(first, again);

        source.seek_to_begin().unwrap();
        assert_eq!(source.position(), 0);
        source.read(&mut again, 2).unwrap();
        assert_eq!(first, again);
    }
}
