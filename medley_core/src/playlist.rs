//! Ordered, validated set of tracks taking part in a medley.

use std::fs::File;
use std::io::{self, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{info, warn};

use crate::chunk::read_wave_header;
use crate::format::{validate, AudioFormat, SegmentTiming};
use crate::mixer::Frame;
use crate::{MedleyError, TrackError};

/// One retained input file with its open stream.
#[derive(Debug)]
pub struct Track {
    pub ordinal: usize,
    pub display_name: String,
    pub path: PathBuf,
    pub format: AudioFormat,
    pub data_chunk_size: u32,
    pub data_start_offset: u64,
    /// Frames consumed since the start of this track's segment.
    pub sample_cursor: u64,
    stream: BufReader<File>,
}

impl Track {
    fn open(
        candidate: &Candidate,
        ordinal: usize,
        master: Option<&AudioFormat>,
        timing: &SegmentTiming,
    ) -> Result<Self, TrackError> {
        let file = File::open(&candidate.path).map_err(TrackError::Open)?;
        let mut stream = BufReader::new(file);
        let header = read_wave_header(&mut stream)?;
        let format = validate(&header, master, timing)?;

        Ok(Self {
            ordinal,
            display_name: candidate.display_name.clone(),
            path: candidate.path.clone(),
            format,
            data_chunk_size: header.data_chunk_size,
            data_start_offset: header.data_start_offset,
            sample_cursor: 0,
            stream,
        })
    }

    pub fn duration(&self) -> Duration {
        self.format.duration_of(self.data_chunk_size)
    }

    pub fn frame_count(&self) -> u64 {
        u64::from(self.data_chunk_size) / u64::from(self.format.block_align())
    }

    /// Position the stream `offset_frames` into the payload and reset the cursor.
    pub fn seek_to_segment(&mut self, offset_frames: u64) -> Result<(), MedleyError> {
        let read_error = |source| MedleyError::Read {
            path: self.path.clone(),
            source,
        };
        let position = offset_frames
            .checked_mul(u64::from(self.format.block_align()))
            .and_then(|bytes| bytes.checked_add(self.data_start_offset))
            .ok_or_else(|| {
                read_error(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "segment offset lies beyond any addressable position",
                ))
            })?;
        self.stream
            .seek(SeekFrom::Start(position))
            .map_err(read_error)?;
        self.sample_cursor = 0;
        Ok(())
    }

    /// Read the next interleaved frame and advance the cursor.
    pub fn read_frame(&mut self) -> Result<Frame, MedleyError> {
        match Frame::read_from(&mut self.stream, self.format.channels) {
            Ok(frame) => {
                self.sample_cursor += 1;
                Ok(frame)
            }
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
                Err(MedleyError::UnexpectedEof {
                    path: self.path.clone(),
                    frame: self.sample_cursor,
                })
            }
            Err(source) => Err(MedleyError::Read {
                path: self.path.clone(),
                source,
            }),
        }
    }

    pub fn summary(&self) -> TrackSummary {
        TrackSummary {
            ordinal: self.ordinal,
            display_name: self.display_name.clone(),
            path: self.path.clone(),
            duration: self.duration(),
        }
    }
}

/// Owned, stream-free description of a retained track.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackSummary {
    pub ordinal: usize,
    pub display_name: String,
    pub path: PathBuf,
    pub duration: Duration,
}

/// A candidate dropped during validation and the reason why.
#[derive(Debug)]
pub struct Rejection {
    pub ordinal: usize,
    pub display_name: String,
    pub path: PathBuf,
    pub reason: TrackError,
}

#[derive(Debug)]
struct Candidate {
    display_name: String,
    sort_key: String,
    path: PathBuf,
}

impl Candidate {
    fn new(path: PathBuf) -> Self {
        let display_name = display_name(&path);
        Self {
            sort_key: display_name.to_lowercase(),
            display_name,
            path,
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// Tracks in medley order, all sharing one master format. Never empty.
#[derive(Debug)]
pub struct Playlist {
    tracks: Vec<Track>,
    format: AudioFormat,
    rejected: Vec<Rejection>,
}

impl Playlist {
    /// Sort, open, parse and validate `candidates`.
    ///
    /// Candidates are ordered case-insensitively by file name and checked in
    /// that order; the first one to pass fixes the master format. Rejected
    /// files are closed immediately. Surviving tracks are renumbered from 1.
    pub fn build(candidates: Vec<PathBuf>, timing: &SegmentTiming) -> Result<Self, MedleyError> {
        let mut candidates: Vec<Candidate> = candidates.into_iter().map(Candidate::new).collect();
        candidates.sort_by(|a, b| a.sort_key.cmp(&b.sort_key));

        let mut tracks: Vec<Track> = Vec::new();
        tracks
            .try_reserve_exact(candidates.len())
            .map_err(|_| MedleyError::Allocation { what: "playlist" })?;

        let mut master: Option<AudioFormat> = None;
        let mut rejected = Vec::new();

        for (index, candidate) in candidates.iter().enumerate() {
            let ordinal = index + 1;
            match Track::open(candidate, ordinal, master.as_ref(), timing) {
                Ok(track) => {
                    info!(
                        "track {ordinal}: '{}' ({}, {:.2}s)",
                        track.display_name,
                        track.format,
                        track.duration().as_secs_f64()
                    );
                    master.get_or_insert(track.format);
                    tracks.push(track);
                }
                Err(reason) => {
                    warn!("skipping track {ordinal} '{}': {reason}", candidate.display_name);
                    rejected.push(Rejection {
                        ordinal,
                        display_name: candidate.display_name.clone(),
                        path: candidate.path.clone(),
                        reason,
                    });
                }
            }
        }

        let Some(format) = master else {
            return Err(MedleyError::NoValidTracks { rejected });
        };

        for (index, track) in tracks.iter_mut().enumerate() {
            track.ordinal = index + 1;
        }

        Ok(Self {
            tracks,
            format,
            rejected,
        })
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn tracks_mut(&mut self) -> &mut [Track] {
        &mut self.tracks
    }

    pub fn rejected(&self) -> &[Rejection] {
        &self.rejected
    }

    pub fn summaries(&self) -> Vec<TrackSummary> {
        self.tracks.iter().map(Track::summary).collect()
    }

    /// Close every stream, keeping the rejection list.
    pub fn into_rejected(self) -> Vec<Rejection> {
        self.rejected
    }
}
