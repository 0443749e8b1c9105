//! Sampled brightness classification.
//!
//! Only every [`SAMPLE_STRIDE`]th frame of the first [`MAX_ANALYZED_FRAMES`]
//! is decoded, which caps the work per upload at 100 decodes no matter how
//! long the video is.

use std::path::Path;

use common::{
    data::{FrameAnalysisResult, FrameSample, FrameSummary},
    AnalysisError,
};
use log::debug;

use super::{VideoBackend, VideoSource};

pub const SAMPLE_STRIDE: u64 = 10;
pub const MAX_ANALYZED_FRAMES: u64 = 1000;
/// Upper bound on the example entries kept per bucket. Counts are not capped.
pub const MAX_EXAMPLES: usize = 20;
pub const DARK_THRESHOLD: f64 = 30.0;
pub const BRIGHT_THRESHOLD: f64 = 200.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Exposure {
    Dark,
    Normal,
    Bright,
}

impl Exposure {
    pub fn classify(brightness: f64) -> Self {
        if brightness < DARK_THRESHOLD {
            Exposure::Dark
        } else if brightness > BRIGHT_THRESHOLD {
            Exposure::Bright
        } else {
            Exposure::Normal
        }
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

pub fn analyze_frames(
    backend: &dyn VideoBackend,
    path: &Path,
    on_progress: impl FnMut(f64),
) -> Result<FrameAnalysisResult, AnalysisError> {
    let mut source = backend.open(path)?;
    Ok(sample_frames(source.as_mut(), on_progress))
}

/// Walks the source at a fixed stride and buckets each decoded frame.
///
/// A frame that fails to seek or decode is treated as the end of the stream.
pub fn sample_frames(
    source: &mut dyn VideoSource,
    mut on_progress: impl FnMut(f64),
) -> FrameAnalysisResult {
    let total_frames = source.frame_count();
    let frame_rate = source.frame_rate();
    let analysis_limit = total_frames.min(MAX_ANALYZED_FRAMES);

    let mut dark_frames = Vec::new();
    let mut bright_frames = Vec::new();
    let mut summary = FrameSummary::default();

    let mut frame_number = 0;
    while frame_number < analysis_limit {
        let frame = match source.read_frame(frame_number) {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                debug!("stream ended before frame {frame_number}");
                break;
            }
            Err(e) => {
                debug!("stopping frame sampling at {frame_number}: {e}");
                break;
            }
        };
        let brightness = frame.mean_brightness();
        let sample = FrameSample {
            frame: frame_number,
            brightness: round2(brightness),
        };
        match Exposure::classify(brightness) {
            Exposure::Dark => {
                summary.dark_count += 1;
                if dark_frames.len() < MAX_EXAMPLES {
                    dark_frames.push(sample);
                }
            }
            Exposure::Bright => {
                summary.bright_count += 1;
                if bright_frames.len() < MAX_EXAMPLES {
                    bright_frames.push(sample);
                }
            }
            Exposure::Normal => summary.normal_count += 1,
        }

        frame_number += SAMPLE_STRIDE;
        on_progress(frame_number.min(analysis_limit) as f64 / analysis_limit as f64 * 100.0);
    }

    let duration_seconds = if frame_rate > 0.0 {
        round2(total_frames as f64 / frame_rate)
    } else {
        0.0
    };

    FrameAnalysisResult {
        total_frames,
        frame_rate,
        duration_seconds,
        analysis_limit,
        dark_frames,
        bright_frames,
        normal_frames: summary.normal_count,
        summary,
    }
}
