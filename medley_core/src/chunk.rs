//! Sequential RIFF/WAVE chunk reader.
//!
//! Only the 12-byte `RIFF....WAVE` preamble has a fixed position. Everything
//! after it is walked chunk by chunk until the `data` chunk is reached, so
//! vendor chunks (`LIST`, `bext`, `JUNK`, ...) may appear anywhere before it.

use std::fmt;
use std::io::{self, BufRead, BufReader, Read, Seek};

use log::debug;

use crate::TrackError;

/// Size in bytes of the canonical PCM `fmt ` body.
pub const PCM_FORMAT_CHUNK_SIZE: u32 = 16;

/// A four character chunk identifier packed as a little-endian `u32`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkId(u32);

impl ChunkId {
    pub const RIFF: ChunkId = ChunkId::from_bytes(*b"RIFF");
    pub const WAVE: ChunkId = ChunkId::from_bytes(*b"WAVE");
    pub const FMT: ChunkId = ChunkId::from_bytes(*b"fmt ");
    pub const DATA: ChunkId = ChunkId::from_bytes(*b"data");
    pub const DS64: ChunkId = ChunkId::from_bytes(*b"ds64");
    pub const LIST: ChunkId = ChunkId::from_bytes(*b"LIST");
    pub const BEXT: ChunkId = ChunkId::from_bytes(*b"bext");

    pub const fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(u32::from_le_bytes(bytes))
    }

    pub const fn to_bytes(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }
}

impl fmt::Debug for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChunkId({self})")
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.to_bytes() {
            write!(f, "{}", std::ascii::escape_default(byte))?;
        }
        Ok(())
    }
}

/// The mandatory container preamble.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RiffHeader {
    pub id: ChunkId,
    pub size: u32,
    pub form: ChunkId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkHeader {
    pub id: ChunkId,
    pub size: u32,
}

/// Decoded body of a `fmt ` chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FormatChunk {
    pub format_tag: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub byte_rate: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
}

impl FormatChunk {
    pub const TAG_PCM: u16 = 0x0001;
    pub const TAG_EXTENSIBLE: u16 = 0xFFFE;

    fn from_bytes(bytes: &[u8; PCM_FORMAT_CHUNK_SIZE as usize]) -> Self {
        let u16_at = |at: usize| u16::from_le_bytes([bytes[at], bytes[at + 1]]);
        let u32_at = |at: usize| {
            u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
        };

        Self {
            format_tag: u16_at(0),
            channels: u16_at(2),
            sample_rate: u32_at(4),
            byte_rate: u32_at(8),
            block_align: u16_at(12),
            bits_per_sample: u16_at(14),
        }
    }

    pub fn to_bytes(&self) -> [u8; PCM_FORMAT_CHUNK_SIZE as usize] {
        let mut bytes = [0u8; PCM_FORMAT_CHUNK_SIZE as usize];
        bytes[0..2].copy_from_slice(&self.format_tag.to_le_bytes());
        bytes[2..4].copy_from_slice(&self.channels.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.sample_rate.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.byte_rate.to_le_bytes());
        bytes[12..14].copy_from_slice(&self.block_align.to_le_bytes());
        bytes[14..16].copy_from_slice(&self.bits_per_sample.to_le_bytes());
        bytes
    }
}

/// Everything learned about a file by walking it up to its `data` chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WaveHeader {
    pub format: FormatChunk,
    pub data_chunk_size: u32,
    /// Stream position of the first payload byte of the `data` chunk.
    pub data_start_offset: u64,
    /// A `ds64` chunk was seen, i.e. the sizes are only placeholders.
    pub saw_ds64: bool,
}

/// Read and check the 12-byte `RIFF <size> WAVE` preamble.
pub fn read_riff_header<R: Read>(stream: &mut R) -> Result<RiffHeader, TrackError> {
    let mut bytes = [0u8; 12];
    if let Err(err) = stream.read_exact(&mut bytes) {
        return match err.kind() {
            io::ErrorKind::UnexpectedEof => Err(TrackError::NotRiff),
            _ => Err(TrackError::Io(err)),
        };
    }

    let id = ChunkId::from_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    if id != ChunkId::RIFF {
        return Err(TrackError::NotRiff);
    }

    let size = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    let form = ChunkId::from_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
    if form != ChunkId::WAVE {
        return Err(TrackError::NotWave);
    }

    Ok(RiffHeader { id, size, form })
}

/// Read the next chunk header, or `None` at end of stream.
///
/// Odd-sized chunks are followed by a single zero pad byte. Chunk ids never
/// start with NUL, so one leading zero byte is treated as that pad and
/// skipped; writers that omit the pad are tolerated as well.
pub fn next_chunk<R: BufRead>(stream: &mut R) -> io::Result<Option<ChunkHeader>> {
    let available = stream.fill_buf()?;
    if available.is_empty() {
        return Ok(None);
    }
    if available[0] == 0 {
        stream.consume(1);
    }

    let mut bytes = [0u8; 8];
    let mut filled = 0;
    while filled < bytes.len() {
        match stream.read(&mut bytes[filled..]) {
            Ok(0) => return Ok(None),
            Ok(read) => filled += read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }

    Ok(Some(ChunkHeader {
        id: ChunkId::from_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        size: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
    }))
}

/// Seek forward over `size` payload bytes, keeping whatever is still buffered.
pub fn skip_chunk<R: Read + Seek>(stream: &mut BufReader<R>, size: u32) -> io::Result<()> {
    stream.seek_relative(i64::from(size))
}

/// Decode a `fmt ` payload of `size` bytes, skipping any extension bytes.
pub fn read_format<R: Read + Seek>(
    stream: &mut BufReader<R>,
    size: u32,
) -> Result<FormatChunk, TrackError> {
    if size < PCM_FORMAT_CHUNK_SIZE {
        return Err(TrackError::TruncatedFormat(size));
    }

    let mut bytes = [0u8; PCM_FORMAT_CHUNK_SIZE as usize];
    stream.read_exact(&mut bytes).map_err(|err| match err.kind() {
        io::ErrorKind::UnexpectedEof => TrackError::TruncatedFormat(size),
        _ => TrackError::Io(err),
    })?;

    let extension = size - PCM_FORMAT_CHUNK_SIZE;
    if extension > 0 {
        skip_chunk(stream, extension)?;
    }

    Ok(FormatChunk::from_bytes(&bytes))
}

/// Walk a WAVE stream up to the start of its `data` payload.
///
/// On success the stream is left positioned at `data_start_offset`.
pub fn read_wave_header<R: Read + Seek>(
    stream: &mut BufReader<R>,
) -> Result<WaveHeader, TrackError> {
    read_riff_header(stream)?;

    let mut format = None;
    let mut saw_ds64 = false;

    while let Some(chunk) = next_chunk(stream)? {
        match chunk.id {
            ChunkId::FMT => {
                format = Some(read_format(stream, chunk.size)?);
            }
            ChunkId::DATA => {
                let format = format.ok_or(TrackError::MissingFormat)?;
                let data_start_offset = stream.stream_position()?;
                return Ok(WaveHeader {
                    format,
                    data_chunk_size: chunk.size,
                    data_start_offset,
                    saw_ds64,
                });
            }
            ChunkId::DS64 => {
                saw_ds64 = true;
                skip_chunk(stream, chunk.size)?;
            }
            other => {
                debug!("skipping '{other}' chunk of {} bytes", chunk.size);
                skip_chunk(stream, chunk.size)?;
            }
        }
    }

    Err(TrackError::MissingData)
}
