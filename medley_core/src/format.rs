//! Audio format checks shared by every track of a medley.

use std::fmt;
use std::time::Duration;

use crate::chunk::{FormatChunk, WaveHeader};
use crate::TrackError;

pub const SUPPORTED_BITS_PER_SAMPLE: u16 = 16;
pub const MAX_CHANNELS: u16 = 2;

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Channel layout, rate and depth every retained track must share.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AudioFormat {
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
}

impl AudioFormat {
    pub fn block_align(&self) -> u16 {
        self.channels * (self.bits_per_sample / 8)
    }

    pub fn byte_rate(&self) -> u32 {
        self.sample_rate * u32::from(self.block_align())
    }

    /// Playing time of `bytes` of interleaved payload.
    pub fn duration_of(&self, bytes: u32) -> Duration {
        let bits_per_second = u64::from(self.channels)
            * u64::from(self.sample_rate)
            * u64::from(self.bits_per_sample);
        if bits_per_second == 0 {
            return Duration::ZERO;
        }
        let nanos = u128::from(bytes) * 8 * NANOS_PER_SEC / u128::from(bits_per_second);
        Duration::from_nanos(nanos.min(u128::from(u64::MAX)) as u64)
    }

    /// Header fields for a plain 16-byte PCM `fmt ` chunk.
    pub fn to_chunk(&self) -> FormatChunk {
        FormatChunk {
            format_tag: FormatChunk::TAG_PCM,
            channels: self.channels,
            sample_rate: self.sample_rate,
            byte_rate: self.byte_rate(),
            block_align: self.block_align(),
            bits_per_sample: self.bits_per_sample,
        }
    }
}

impl From<&FormatChunk> for AudioFormat {
    fn from(chunk: &FormatChunk) -> Self {
        Self {
            channels: chunk.channels,
            sample_rate: chunk.sample_rate,
            bits_per_sample: chunk.bits_per_sample,
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let layout = match self.channels {
            1 => "mono".to_owned(),
            2 => "stereo".to_owned(),
            n => format!("{n} channels"),
        };
        write!(f, "{layout}, {} Hz, {}-bit", self.sample_rate, self.bits_per_sample)
    }
}

/// The field in which a track disagrees with the master format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormatField {
    Channels,
    SampleRate,
    BitsPerSample,
}

impl fmt::Display for FormatField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FormatField::Channels => "channel count",
            FormatField::SampleRate => "sample rate",
            FormatField::BitsPerSample => "bits per sample",
        };
        f.write_str(name)
    }
}

/// Requested slice of every track, in wall-clock time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SegmentTiming {
    pub start_offset: Duration,
    pub segment_length: Duration,
    pub crossfade: Duration,
}

impl SegmentTiming {
    pub fn frames(&self, sample_rate: u32) -> FrameTiming {
        FrameTiming {
            start_offset_frames: duration_to_frames(self.start_offset, sample_rate),
            segment_frames: duration_to_frames(self.segment_length, sample_rate),
            crossfade_frames: duration_to_frames(self.crossfade, sample_rate),
        }
    }
}

/// [`SegmentTiming`] converted to frames at the master sample rate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameTiming {
    pub start_offset_frames: u64,
    pub segment_frames: u64,
    pub crossfade_frames: u64,
}

impl FrameTiming {
    /// Frames a track must hold for its segment to be read in full, or
    /// `None` when that count does not fit in a `u64`.
    pub fn required_frames(&self) -> Option<u64> {
        self.start_offset_frames.checked_add(self.segment_frames)
    }

    /// Length of the medley built from `track_count` segments.
    pub fn output_frames(&self, track_count: u64) -> u64 {
        if track_count == 0 {
            return 0;
        }
        self.segment_frames * track_count - self.crossfade_frames * (track_count - 1)
    }
}

/// Whole frames covered by `duration`, rounded down.
pub fn duration_to_frames(duration: Duration, sample_rate: u32) -> u64 {
    let frames = duration.as_nanos() * u128::from(sample_rate) / NANOS_PER_SEC;
    frames.min(u128::from(u64::MAX)) as u64
}

/// Decide whether a parsed track may join the medley.
///
/// Returns the track's format on acceptance. When `master` is `None` the
/// caller adopts the returned format as the master for every later track.
pub fn validate(
    header: &WaveHeader,
    master: Option<&AudioFormat>,
    timing: &SegmentTiming,
) -> Result<AudioFormat, TrackError> {
    let chunk = &header.format;

    if chunk.bits_per_sample != SUPPORTED_BITS_PER_SAMPLE {
        return Err(TrackError::UnsupportedBitDepth(chunk.bits_per_sample));
    }
    if chunk.channels == 0 || chunk.channels > MAX_CHANNELS {
        return Err(TrackError::UnsupportedChannelLayout(chunk.channels));
    }
    if chunk.format_tag != FormatChunk::TAG_PCM && chunk.format_tag != FormatChunk::TAG_EXTENSIBLE
    {
        return Err(TrackError::UnsupportedEncoding(chunk.format_tag));
    }
    if chunk.sample_rate == 0 {
        return Err(TrackError::InvalidSampleRate);
    }
    if header.saw_ds64 {
        return Err(TrackError::UnsupportedRf64);
    }

    let format = AudioFormat::from(chunk);
    if let Some(master) = master {
        let mismatch = if format.channels != master.channels {
            Some((
                FormatField::Channels,
                u32::from(master.channels),
                u32::from(format.channels),
            ))
        } else if format.sample_rate != master.sample_rate {
            Some((FormatField::SampleRate, master.sample_rate, format.sample_rate))
        } else if format.bits_per_sample != master.bits_per_sample {
            Some((
                FormatField::BitsPerSample,
                u32::from(master.bits_per_sample),
                u32::from(format.bits_per_sample),
            ))
        } else {
            None
        };

        if let Some((field, expected, found)) = mismatch {
            return Err(TrackError::FormatMismatch {
                field,
                expected,
                found,
            });
        }
    }

    let available = u64::from(header.data_chunk_size) / u64::from(format.block_align());
    let required = timing.frames(format.sample_rate).required_frames();
    if required.map_or(true, |required| available < required) {
        return Err(TrackError::TrackTooShort {
            required: timing.start_offset.saturating_add(timing.segment_length),
            available: format.duration_of(header.data_chunk_size),
        });
    }

    Ok(format)
}
