//! WAVE fixtures shared by the unit tests.

use std::fs;
use std::path::Path;

use crate::chunk::FormatChunk;

/// One chunk with its header and, for odd payloads, the trailing pad byte.
pub fn chunk(id: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(payload.len() + 9);
    bytes.extend_from_slice(id);
    bytes.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    bytes.extend_from_slice(payload);
    if payload.len() % 2 == 1 {
        bytes.push(0);
    }
    bytes
}

/// A plain 16-byte PCM `fmt ` body.
pub fn pcm_format(channels: u16, sample_rate: u32, bits_per_sample: u16) -> Vec<u8> {
    let block_align = channels * (bits_per_sample / 8);
    FormatChunk {
        format_tag: FormatChunk::TAG_PCM,
        channels,
        sample_rate,
        byte_rate: sample_rate * u32::from(block_align),
        block_align,
        bits_per_sample,
    }
    .to_bytes()
    .to_vec()
}

/// `RIFF <size> WAVE` around already encoded chunks.
pub fn wave(chunks: &[Vec<u8>]) -> Vec<u8> {
    let body: Vec<u8> = chunks.concat();
    let mut bytes = Vec::with_capacity(body.len() + 12);
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(body.len() as u32 + 4).to_le_bytes());
    bytes.extend_from_slice(b"WAVE");
    bytes.extend_from_slice(&body);
    bytes
}

/// Write interleaved 16-bit `samples` as a canonical WAVE file.
pub fn write_pcm(path: &Path, channels: u16, sample_rate: u32, samples: &[i16]) {
    let payload: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
    let bytes = wave(&[
        chunk(b"fmt ", &pcm_format(channels, sample_rate, 16)),
        chunk(b"data", &payload),
    ]);
    fs::write(path, bytes).unwrap();
}

/// Write `frames` frames of silence at any bit depth.
pub fn write_silence(path: &Path, channels: u16, sample_rate: u32, bits: u16, frames: u32) {
    let payload = vec![0u8; frames as usize * usize::from(channels * (bits / 8))];
    let bytes = wave(&[
        chunk(b"fmt ", &pcm_format(channels, sample_rate, bits)),
        chunk(b"data", &payload),
    ]);
    fs::write(path, bytes).unwrap();
}
