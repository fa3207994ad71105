//! Sample-level crossfade mixing.
//!
//! Every track contributes `segment_frames` frames starting at the common
//! start offset. The last `crossfade_frames` frames of one segment overlap
//! the first `crossfade_frames` frames of the next, each side weighted with
//! a square-root (equal-power) curve. The first segment starts at full level
//! and the last one fades out to silence.

use std::io::{self, Read, Write};

use log::debug;

use crate::format::{AudioFormat, FrameTiming, MAX_CHANNELS};
use crate::playlist::Track;
use crate::{MedleyError, ProgressEvent};

/// Frames written between two [`ProgressEvent::Advance`] notifications.
pub const PROGRESS_INTERVAL_FRAMES: u64 = 8_192;

/// How a crossfade sum that leaves the 16-bit range is stored.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OverflowMode {
    /// Two's-complement wraparound, bit-compatible with earlier medleys.
    #[default]
    Wrap,
    /// Clamp to `i16::MIN..=i16::MAX`.
    Saturate,
}

/// One sample per channel at a single time index.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Frame {
    samples: [i16; MAX_CHANNELS as usize],
    channels: u16,
}

impl Frame {
    pub fn new(samples: &[i16]) -> Self {
        let mut frame = Self {
            samples: [0; MAX_CHANNELS as usize],
            channels: samples.len().min(MAX_CHANNELS as usize) as u16,
        };
        frame.samples[..frame.channels as usize]
            .copy_from_slice(&samples[..frame.channels as usize]);
        frame
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples[..self.channels as usize]
    }

    pub fn read_from<R: Read>(reader: &mut R, channels: u16) -> io::Result<Self> {
        let channels = channels.min(MAX_CHANNELS);
        let mut bytes = [0u8; 2 * MAX_CHANNELS as usize];
        let len = 2 * channels as usize;
        reader.read_exact(&mut bytes[..len])?;

        let mut frame = Self {
            samples: [0; MAX_CHANNELS as usize],
            channels,
        };
        for (sample, pair) in frame.samples.iter_mut().zip(bytes[..len].chunks_exact(2)) {
            *sample = i16::from_le_bytes([pair[0], pair[1]]);
        }
        Ok(frame)
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        for sample in self.samples() {
            writer.write_all(&sample.to_le_bytes())?;
        }
        Ok(())
    }

    /// Multiply every channel by `gain`, truncating toward zero.
    pub fn scaled(&self, gain: f64) -> Self {
        let mut frame = *self;
        for sample in frame.samples.iter_mut() {
            *sample = (f64::from(*sample) * gain) as i16;
        }
        frame
    }

    /// Channel-wise sum of two frames of the same layout.
    pub fn mixed(&self, other: &Frame, overflow: OverflowMode) -> Self {
        let mut frame = *self;
        for (sample, incoming) in frame.samples.iter_mut().zip(other.samples) {
            *sample = match overflow {
                OverflowMode::Wrap => sample.wrapping_add(incoming),
                OverflowMode::Saturate => sample.saturating_add(incoming),
            };
        }
        frame
    }
}

/// Gain of an incoming track `index` frames into a crossfade of `length`.
pub fn fade_in_gain(index: u64, length: u64) -> f64 {
    (index as f64 / length as f64).sqrt()
}

/// Gain of an outgoing track `index` frames into a crossfade of `length`.
pub fn fade_out_gain(index: u64, length: u64) -> f64 {
    (1.0 - index as f64 / length as f64).sqrt()
}

/// Destination for mixed frames.
pub trait FrameSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), MedleyError>;
}

impl FrameSink for Vec<Frame> {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), MedleyError> {
        self.push(*frame);
        Ok(())
    }
}

/// Settings fixed from the master track, plus the running output count.
#[derive(Clone, Copy, Debug)]
pub struct MixSession {
    format: AudioFormat,
    timing: FrameTiming,
    overflow: OverflowMode,
    written_frames: u64,
}

impl MixSession {
    pub fn new(
        format: AudioFormat,
        timing: FrameTiming,
        overflow: OverflowMode,
    ) -> Result<Self, MedleyError> {
        if timing.segment_frames == 0 {
            return Err(MedleyError::InvalidSegmentLength);
        }
        if timing.crossfade_frames > timing.segment_frames / 2 {
            return Err(MedleyError::CrossfadeTooLong {
                crossfade_frames: timing.crossfade_frames,
                segment_frames: timing.segment_frames,
            });
        }

        Ok(Self {
            format,
            timing,
            overflow,
            written_frames: 0,
        })
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn timing(&self) -> FrameTiming {
        self.timing
    }

    pub fn written_frames(&self) -> u64 {
        self.written_frames
    }

    /// Mix `tracks` in order into `sink`.
    ///
    /// During the crossfade window of track `k`, track `k + 1` is read ahead
    /// through its own cursor: its first `crossfade_frames` frames are its
    /// fade-in, so it continues from there once it becomes current.
    pub fn mix<S, F>(
        &mut self,
        tracks: &mut [Track],
        sink: &mut S,
        mut progress: F,
    ) -> Result<u64, MedleyError>
    where
        S: FrameSink + ?Sized,
        F: FnMut(ProgressEvent),
    {
        let segment = self.timing.segment_frames;
        let crossfade = self.timing.crossfade_frames;
        let crossfade_start = segment - crossfade;

        for track in tracks.iter_mut() {
            track.seek_to_segment(self.timing.start_offset_frames)?;
        }

        for index in 0..tracks.len() {
            let (head, tail) = tracks.split_at_mut(index + 1);
            let current = &mut head[index];
            let mut next = tail.first_mut();

            debug!(
                "mixing track {} '{}' from frame {}",
                current.ordinal, current.display_name, current.sample_cursor
            );
            progress(ProgressEvent::Track {
                ordinal: current.ordinal,
                name: current.display_name.clone(),
            });

            while current.sample_cursor < segment {
                let position = current.sample_cursor;
                let frame = current.read_frame()?;

                let output = if position >= crossfade_start {
                    let outgoing = frame.scaled(fade_out_gain(position - crossfade_start, crossfade));
                    match next.as_mut() {
                        Some(incoming) => {
                            let gain = fade_in_gain(incoming.sample_cursor, crossfade);
                            let frame = incoming.read_frame()?;
                            outgoing.mixed(&frame.scaled(gain), self.overflow)
                        }
                        None => outgoing,
                    }
                } else {
                    frame
                };

                sink.write_frame(&output)?;
                self.written_frames += 1;
                if self.written_frames % PROGRESS_INTERVAL_FRAMES == 0 {
                    progress(ProgressEvent::Advance {
                        written_frames: self.written_frames,
                    });
                }
            }

            progress(ProgressEvent::Advance {
                written_frames: self.written_frames,
            });
        }

        Ok(self.written_frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::SegmentTiming;
    use crate::playlist::Playlist;
    use crate::test_support::write_pcm;
    use std::fs;
    use std::time::Duration;
    use tempfile::tempdir;

    /// Mono tracks at 10 Hz so that one second is ten frames.
    fn mix_constant_tracks(
        levels: &[i16],
        frames: usize,
        start_ms: u64,
        length_ms: u64,
        crossfade_ms: u64,
        overflow: OverflowMode,
    ) -> (Vec<Frame>, Vec<ProgressEvent>) {
        let dir = tempdir().unwrap();
        let paths = levels
            .iter()
            .enumerate()
            .map(|(index, level)| {
                let path = dir.path().join(format!("{index:02}.wav"));
                write_pcm(&path, 1, 10, &vec![*level; frames]);
                path
            })
            .collect();

        let timing = SegmentTiming {
            start_offset: Duration::from_millis(start_ms),
            segment_length: Duration::from_millis(length_ms),
            crossfade: Duration::from_millis(crossfade_ms),
        };
        let mut playlist = Playlist::build(paths, &timing).unwrap();
        let format = playlist.format();
        let mut session = MixSession::new(format, timing.frames(10), overflow).unwrap();

        let mut output = Vec::new();
        let mut events = Vec::new();
        session
            .mix(playlist.tracks_mut(), &mut output, |event| events.push(event))
            .unwrap();
        (output, events)
    }

    fn levels(frames: &[Frame]) -> Vec<i16> {
        frames.iter().map(|frame| frame.samples()[0]).collect()
    }

    #[test]
    fn gains_follow_square_root_curves() {
        assert_eq!(fade_in_gain(0, 4), 0.0);
        assert_eq!(fade_in_gain(1, 4), 0.5);
        assert_eq!(fade_out_gain(0, 4), 1.0);
        assert_eq!(fade_out_gain(3, 4), 0.5);
        let (a, b) = (fade_in_gain(3, 10), fade_out_gain(3, 10));
        assert!((a * a + b * b - 1.0).abs() < 1e-12);
    }

    #[test]
    fn scaling_truncates_toward_zero() {
        let frame = Frame::new(&[1001, -1001]);
        assert_eq!(frame.scaled(0.5).samples(), &[500, -500]);
        assert_eq!(frame.scaled(1.0), frame);
    }

    #[test]
    fn crossfade_sum_wraps_unless_saturating() {
        let loud = Frame::new(&[30_000, -30_000]);
        assert_eq!(loud.mixed(&loud, OverflowMode::Wrap).samples(), &[-5_536, 5_536]);
        assert_eq!(
            loud.mixed(&loud, OverflowMode::Saturate).samples(),
            &[i16::MAX, i16::MIN]
        );
    }

    #[test]
    fn frames_round_trip_through_bytes() {
        let frame = Frame::new(&[-2, 513]);
        let mut bytes = Vec::new();
        frame.write_to(&mut bytes).unwrap();
        assert_eq!(bytes, vec![0xFE, 0xFF, 0x01, 0x02]);
        assert_eq!(Frame::read_from(&mut bytes.as_slice(), 2).unwrap(), frame);
    }

    #[test]
    fn two_tracks_overlap_by_the_crossfade() {
        // Segment of 8 frames, crossfade of 4.
        let (output, _) =
            mix_constant_tracks(&[1_000, 2_000], 10, 0, 800, 400, OverflowMode::Wrap);
        assert_eq!(output.len(), 12);

        let expected: Vec<i16> = vec![
            1_000,
            1_000,
            1_000,
            1_000,
            // window: outgoing sqrt(1 - j/4) plus incoming sqrt(j/4)
            1_000,
            866 + 1_000,
            707 + 1_414,
            500 + 1_732,
            // second track alone, fading out over the last 4 frames
            2_000,
            1_732,
            1_414,
            1_000,
        ];
        assert_eq!(levels(&output), expected);
    }

    #[test]
    fn half_segment_crossfade_leaves_no_solo_frames() {
        let (output, _) = mix_constant_tracks(
            &[1_000, 1_000, 1_000],
            10,
            0,
            400,
            200,
            OverflowMode::Wrap,
        );
        assert_eq!(output.len(), 3 * 4 - 2 * 2);
        assert_eq!(
            levels(&output),
            vec![1_000, 1_000, 1_000, 707 + 707, 1_000, 707 + 707, 1_000, 707]
        );
    }

    #[test]
    fn zero_crossfade_concatenates() {
        let (output, _) = mix_constant_tracks(&[1, 2, 3], 5, 100, 300, 0, OverflowMode::Wrap);
        assert_eq!(levels(&output), vec![1, 1, 1, 2, 2, 2, 3, 3, 3]);
    }

    #[test]
    fn loud_crossfades_wrap_by_default() {
        let (wrapped, _) =
            mix_constant_tracks(&[32_000, 32_000], 4, 0, 400, 200, OverflowMode::Wrap);
        let (clamped, _) =
            mix_constant_tracks(&[32_000, 32_000], 4, 0, 400, 200, OverflowMode::Saturate);

        // sqrt(0.5) * 32000 truncates to 22627 on both sides.
        assert_eq!(wrapped[3].samples(), &[22_627i16.wrapping_add(22_627)]);
        assert_eq!(clamped[3].samples(), &[i16::MAX]);
    }

    #[test]
    fn reports_track_changes_and_progress() {
        let (_, events) = mix_constant_tracks(&[1, 2], 10, 0, 500, 100, OverflowMode::Wrap);
        assert_eq!(
            events,
            vec![
                ProgressEvent::Track {
                    ordinal: 1,
                    name: "00.wav".to_owned()
                },
                ProgressEvent::Advance { written_frames: 5 },
                ProgressEvent::Track {
                    ordinal: 2,
                    name: "01.wav".to_owned()
                },
                ProgressEvent::Advance { written_frames: 9 },
            ]
        );
    }

    #[test]
    fn truncated_track_aborts_the_mix() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("short.wav");
        write_pcm(&path, 1, 10, &[7; 10]);

        let timing = SegmentTiming {
            start_offset: Duration::ZERO,
            segment_length: Duration::from_secs(1),
            crossfade: Duration::ZERO,
        };
        let mut playlist = Playlist::build(vec![path.clone()], &timing).unwrap();

        // Lose the tail of the payload after validation.
        let file = fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(44 + 12).unwrap();

        let mut session =
            MixSession::new(playlist.format(), timing.frames(10), OverflowMode::Wrap).unwrap();
        let err = session
            .mix(playlist.tracks_mut(), &mut Vec::new(), |_| {})
            .unwrap_err();
        match err {
            MedleyError::UnexpectedEof { path: failed, frame } => {
                assert_eq!(failed, path);
                assert_eq!(frame, 6);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn session_rejects_overlong_crossfades() {
        let format = AudioFormat {
            channels: 1,
            sample_rate: 10,
            bits_per_sample: 16,
        };
        let timing = FrameTiming {
            start_offset_frames: 0,
            segment_frames: 9,
            crossfade_frames: 5,
        };
        assert!(matches!(
            MixSession::new(format, timing, OverflowMode::Wrap),
            Err(MedleyError::CrossfadeTooLong { .. })
        ));

        let timing = FrameTiming {
            crossfade_frames: 4,
            ..timing
        };
        assert!(MixSession::new(format, timing, OverflowMode::Wrap).is_ok());
    }
}
