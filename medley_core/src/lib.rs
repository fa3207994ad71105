use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{info, warn};
use thiserror::Error;

pub mod chunk;
pub mod format;
pub mod mixer;
pub mod playlist;
pub mod scan;
pub mod writer;

#[cfg(test)]
mod test_support;

pub use format::{AudioFormat, FormatField, FrameTiming, SegmentTiming};
pub use mixer::{MixSession, OverflowMode};
pub use playlist::{Playlist, Rejection, Track, TrackSummary};
pub use writer::{OutputHeader, OutputWriter};

/// Reasons a single input file is left out of the medley.
#[derive(Debug, Error)]
pub enum TrackError {
    /// The file could not be opened for reading.
    #[error("cannot open file: {0}")]
    Open(#[source] std::io::Error),

    /// Wrapper around IO errors raised while parsing the header.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The file does not start with a `RIFF` container id.
    #[error("not a RIFF file")]
    NotRiff,

    /// The RIFF form type is something other than `WAVE`.
    #[error("RIFF file is not of type WAVE")]
    NotWave,

    /// The `fmt ` chunk is shorter than the 16-byte PCM body.
    #[error("format chunk of {0} bytes is too short")]
    TruncatedFormat(u32),

    /// A `data` chunk was found before any `fmt ` chunk.
    #[error("data chunk precedes the format chunk")]
    MissingFormat,

    /// The file ended without a `data` chunk.
    #[error("end of file reached before the data chunk")]
    MissingData,

    /// Samples are not 16 bits wide.
    #[error("unsupported bit depth: {0} bits per sample (only 16 is supported)")]
    UnsupportedBitDepth(u16),

    /// Neither mono nor stereo.
    #[error("unsupported channel layout: {0} channels (mono or stereo only)")]
    UnsupportedChannelLayout(u16),

    /// The format tag is neither PCM nor extensible PCM.
    #[error("unsupported encoding: format tag {0:#06x} is not PCM")]
    UnsupportedEncoding(u16),

    /// The header advertises a sample rate of zero.
    #[error("sample rate of zero")]
    InvalidSampleRate,

    /// A `ds64` chunk marks the file as RF64.
    #[error("RF64 files are not supported")]
    UnsupportedRf64,

    /// The track disagrees with the master format on `field`.
    #[error("{field} {found} does not match the first track's {expected}")]
    FormatMismatch {
        field: FormatField,
        expected: u32,
        found: u32,
    },

    /// The track ends before its segment does.
    #[error(
        "track lasts {:.3}s but the segment ends at {:.3}s",
        .available.as_secs_f64(),
        .required.as_secs_f64()
    )]
    TrackTooShort {
        required: Duration,
        available: Duration,
    },
}

/// Errors that end a medley run.
#[derive(Debug, Error)]
pub enum MedleyError {
    /// Wrapper around IO errors not tied to a particular file.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The source directory is missing or cannot be listed.
    #[error("cannot read source directory '{}'", .path.display())]
    SourceDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Every candidate was rejected, or there were none.
    #[error("no valid tracks found ({} file(s) rejected)", .rejected.len())]
    NoValidTracks { rejected: Vec<Rejection> },

    /// The destination file could not be created.
    #[error("cannot open '{}' for writing", .path.display())]
    OutputUnwritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Memory for the playlist could not be reserved.
    #[error("failed to allocate memory for the {what}")]
    Allocation { what: &'static str },

    /// A track ran out of data while it was being mixed.
    #[error("'{}' ended unexpectedly at frame {frame} of its segment", .path.display())]
    UnexpectedEof { path: PathBuf, frame: u64 },

    /// Reading or seeking a track failed while mixing.
    #[error("failed to read '{}'", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The segment is empty.
    #[error("segment length must cover at least one frame")]
    InvalidSegmentLength,

    /// The crossfade is longer than half of the segment.
    #[error(
        "crossfade of {:.3}s exceeds half of the {:.3}s segment",
        .crossfade.as_secs_f64(),
        .segment_length.as_secs_f64()
    )]
    InvalidCrossfade {
        crossfade: Duration,
        segment_length: Duration,
    },

    /// Same as `InvalidCrossfade`, once durations are rounded down to frames.
    #[error("crossfade of {crossfade_frames} frames exceeds half of the {segment_frames}-frame segment")]
    CrossfadeTooLong {
        crossfade_frames: u64,
        segment_frames: u64,
    },

    /// The medley would not fit the 32-bit RIFF size fields.
    #[error("medley of {bytes} bytes does not fit a RIFF container")]
    OutputTooLarge { bytes: u64 },

    /// The frames written disagree with the header.
    #[error("wrote {written} frames but the header announces {expected}")]
    IncompleteOutput { expected: u64, written: u64 },
}

/// Configuration for one medley run.
#[derive(Clone, Debug)]
pub struct Config {
    /// Directory scanned for `.wav`, `.wave` and `.bwf` files.
    pub source_dir: PathBuf,
    /// Destination file, replaced if it exists.
    pub output_path: PathBuf,
    pub timing: SegmentTiming,
    pub overflow: OverflowMode,
}

impl Config {
    /// Configuration with no start offset and no crossfade.
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(
        source_dir: P,
        output_path: Q,
        segment_length: Duration,
    ) -> Result<Self, MedleyError> {
        Self::builder(source_dir, output_path, segment_length).build()
    }

    pub fn builder<P: AsRef<Path>, Q: AsRef<Path>>(
        source_dir: P,
        output_path: Q,
        segment_length: Duration,
    ) -> ConfigBuilder {
        ConfigBuilder {
            source_dir: source_dir.as_ref().to_path_buf(),
            output_path: output_path.as_ref().to_path_buf(),
            timing: SegmentTiming {
                start_offset: Duration::ZERO,
                segment_length,
                crossfade: Duration::ZERO,
            },
            overflow: OverflowMode::default(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ConfigBuilder {
    source_dir: PathBuf,
    output_path: PathBuf,
    timing: SegmentTiming,
    overflow: OverflowMode,
}

impl ConfigBuilder {
    /// Position inside every track where its segment begins.
    pub fn start_offset(mut self, offset: Duration) -> Self {
        self.timing.start_offset = offset;
        self
    }

    pub fn crossfade(mut self, crossfade: Duration) -> Self {
        self.timing.crossfade = crossfade;
        self
    }

    pub fn overflow(mut self, overflow: OverflowMode) -> Self {
        self.overflow = overflow;
        self
    }

    pub fn build(self) -> Result<Config, MedleyError> {
        if self.timing.segment_length.is_zero() {
            return Err(MedleyError::InvalidSegmentLength);
        }
        if self.timing.crossfade * 2 > self.timing.segment_length {
            return Err(MedleyError::InvalidCrossfade {
                crossfade: self.timing.crossfade,
                segment_length: self.timing.segment_length,
            });
        }

        Ok(Config {
            source_dir: self.source_dir,
            output_path: self.output_path,
            timing: self.timing,
            overflow: self.overflow,
        })
    }
}

/// Notifications emitted while a medley is written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProgressEvent {
    Start {
        total_frames: u64,
        sample_rate: u32,
        tracks: usize,
    },
    Track {
        ordinal: usize,
        name: String,
    },
    Advance {
        written_frames: u64,
    },
    Finish,
}

/// What a dry run found: the medley that would be written.
#[derive(Debug)]
pub struct MedleyPlan {
    pub format: AudioFormat,
    pub tracks: Vec<TrackSummary>,
    pub rejected: Vec<Rejection>,
    pub header: OutputHeader,
}

impl MedleyPlan {
    pub fn duration(&self) -> Duration {
        self.format.duration_of(self.header.data_chunk_size)
    }
}

/// Outcome of a completed run.
#[derive(Debug)]
pub struct MedleyReport {
    pub format: AudioFormat,
    pub tracks: Vec<TrackSummary>,
    pub rejected: Vec<Rejection>,
    pub frames_written: u64,
    pub data_chunk_size: u32,
}

/// Build the medley described by `config`.
pub fn run(config: Config) -> Result<MedleyReport, MedleyError> {
    run_with_progress(config, |_| {})
}

/// Build the medley, reporting progress through `progress`.
pub fn run_with_progress<F>(config: Config, progress: F) -> Result<MedleyReport, MedleyError>
where
    F: FnMut(ProgressEvent),
{
    let candidates = scan::discover(&config.source_dir)?;
    run_with_candidates(&config, candidates, progress)
}

/// Build the medley from an explicit list of candidate files.
///
/// `config.source_dir` is not consulted.
pub fn run_with_candidates<F>(
    config: &Config,
    candidates: Vec<PathBuf>,
    mut progress: F,
) -> Result<MedleyReport, MedleyError>
where
    F: FnMut(ProgressEvent),
{
    let candidates = without_output(candidates, &config.output_path);
    let mut playlist = Playlist::build(candidates, &config.timing)?;
    let format = playlist.format();
    let timing = config.timing.frames(format.sample_rate);
    let mut session = MixSession::new(format, timing, config.overflow)?;

    let header = OutputHeader::new(format, &timing, playlist.len())?;
    info!(
        "writing {} track(s) to '{}' ({format}, {} frames)",
        playlist.len(),
        config.output_path.display(),
        header.frames
    );

    let mut writer = OutputWriter::create(&config.output_path, header)?;
    progress(ProgressEvent::Start {
        total_frames: header.frames,
        sample_rate: format.sample_rate,
        tracks: playlist.len(),
    });

    session.mix(playlist.tracks_mut(), &mut writer, &mut progress)?;
    let frames_written = writer.finish()?;
    progress(ProgressEvent::Finish);

    info!(
        "medley complete: {frames_written} frames, {} bytes of audio",
        header.data_chunk_size
    );

    let tracks = playlist.summaries();
    Ok(MedleyReport {
        format,
        tracks,
        rejected: playlist.into_rejected(),
        frames_written,
        data_chunk_size: header.data_chunk_size,
    })
}

/// Drop the destination from `candidates`, so an earlier medley written into
/// the source directory is never mixed into its own replacement.
fn without_output(candidates: Vec<PathBuf>, output_path: &Path) -> Vec<PathBuf> {
    let Ok(output) = std::fs::canonicalize(output_path) else {
        return candidates;
    };

    candidates
        .into_iter()
        .filter(|candidate| {
            let is_output = std::fs::canonicalize(candidate).is_ok_and(|path| path == output);
            if is_output {
                warn!(
                    "ignoring '{}': it is the output destination",
                    candidate.display()
                );
            }
            !is_output
        })
        .collect()
}

/// Validate the source directory and compute the output without writing it.
pub fn plan(config: &Config) -> Result<MedleyPlan, MedleyError> {
    let candidates = scan::discover(&config.source_dir)?;
    let candidates = without_output(candidates, &config.output_path);
    let playlist = Playlist::build(candidates, &config.timing)?;
    let format = playlist.format();
    let timing = config.timing.frames(format.sample_rate);
    MixSession::new(format, timing, config.overflow)?;
    let header = OutputHeader::new(format, &timing, playlist.len())?;

    let tracks = playlist.summaries();
    Ok(MedleyPlan {
        format,
        tracks,
        rejected: playlist.into_rejected(),
        header,
    })
}
