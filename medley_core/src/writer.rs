//! Writing the finished medley as a canonical 44-byte-header PCM WAVE file.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::warn;

use crate::chunk::{ChunkId, PCM_FORMAT_CHUNK_SIZE};
use crate::format::{AudioFormat, FrameTiming};
use crate::mixer::{Frame, FrameSink};
use crate::MedleyError;

/// `WAVE` tag, `fmt ` header and body, and `data` header.
pub const RIFF_HEADER_OVERHEAD: u32 = 4 + 8 + PCM_FORMAT_CHUNK_SIZE + 8;

/// Total header length in front of the first sample.
pub const OUTPUT_HEADER_LEN: usize = 12 + 8 + PCM_FORMAT_CHUNK_SIZE as usize + 8;

/// Sizes of the output container, fixed before any frame is written.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OutputHeader {
    pub format: AudioFormat,
    pub frames: u64,
    pub data_chunk_size: u32,
    pub riff_chunk_size: u32,
}

impl OutputHeader {
    pub fn new(
        format: AudioFormat,
        timing: &FrameTiming,
        track_count: usize,
    ) -> Result<Self, MedleyError> {
        let frames = timing.output_frames(track_count as u64);
        let bytes = frames * u64::from(format.block_align());
        let too_large = || MedleyError::OutputTooLarge { bytes };

        let data_chunk_size = u32::try_from(bytes).map_err(|_| too_large())?;
        let riff_chunk_size = RIFF_HEADER_OVERHEAD
            .checked_add(data_chunk_size)
            .ok_or_else(too_large)?;

        Ok(Self {
            format,
            frames,
            data_chunk_size,
            riff_chunk_size,
        })
    }

    pub fn to_bytes(&self) -> [u8; OUTPUT_HEADER_LEN] {
        let mut bytes = [0u8; OUTPUT_HEADER_LEN];
        bytes[0..4].copy_from_slice(&ChunkId::RIFF.to_bytes());
        bytes[4..8].copy_from_slice(&self.riff_chunk_size.to_le_bytes());
        bytes[8..12].copy_from_slice(&ChunkId::WAVE.to_bytes());
        bytes[12..16].copy_from_slice(&ChunkId::FMT.to_bytes());
        bytes[16..20].copy_from_slice(&PCM_FORMAT_CHUNK_SIZE.to_le_bytes());
        bytes[20..36].copy_from_slice(&self.format.to_chunk().to_bytes());
        bytes[36..40].copy_from_slice(&ChunkId::DATA.to_bytes());
        bytes[40..44].copy_from_slice(&self.data_chunk_size.to_le_bytes());
        bytes
    }
}

/// Streams frames to the destination file.
///
/// An unfinished writer removes its file when dropped so that an aborted
/// run does not leave a truncated medley behind.
#[derive(Debug)]
pub struct OutputWriter {
    path: PathBuf,
    stream: Option<BufWriter<File>>,
    header: OutputHeader,
    frames_written: u64,
}

impl OutputWriter {
    /// Create (or truncate) `path` and write the complete header.
    pub fn create(path: &Path, header: OutputHeader) -> Result<Self, MedleyError> {
        let unwritable = |source| MedleyError::OutputUnwritable {
            path: path.to_path_buf(),
            source,
        };

        let file = File::create(path).map_err(unwritable)?;
        let mut stream = BufWriter::new(file);
        if let Err(source) = stream.write_all(&header.to_bytes()) {
            drop(stream);
            remove_partial(path);
            return Err(unwritable(source));
        }

        Ok(Self {
            path: path.to_path_buf(),
            stream: Some(stream),
            header,
            frames_written: 0,
        })
    }

    pub fn header(&self) -> &OutputHeader {
        &self.header
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Flush and keep the file. Fails if the frame count disagrees with the header.
    pub fn finish(mut self) -> Result<u64, MedleyError> {
        if self.frames_written != self.header.frames {
            return Err(MedleyError::IncompleteOutput {
                expected: self.header.frames,
                written: self.frames_written,
            });
        }

        let stream = self.stream()?;
        stream.flush()?;
        stream.get_ref().sync_all()?;
        // Closed only on success; on any error above, drop removes the file.
        self.stream = None;
        Ok(self.frames_written)
    }

    fn stream(&mut self) -> Result<&mut BufWriter<File>, MedleyError> {
        self.stream.as_mut().ok_or_else(|| {
            MedleyError::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "output is already closed",
            ))
        })
    }
}

impl FrameSink for OutputWriter {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), MedleyError> {
        frame.write_to(self.stream()?)?;
        self.frames_written += 1;
        Ok(())
    }
}

impl Drop for OutputWriter {
    fn drop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            remove_partial(&self.path);
        }
    }
}

fn remove_partial(path: &Path) {
    if let Err(err) = fs::remove_file(path) {
        warn!(
            "failed to remove incomplete output '{}': {err}",
            path.display()
        );
    }
}
