//! [`VideoBackend`] that shells out to the `ffprobe` and `ffmpeg` executables.
//!
//! Both are blocking calls and must only run on the analysis worker.

use std::{
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use common::AnalysisError;
use log::debug;

use super::{Frame, Probe, VideoBackend, VideoSource};

pub struct FfmpegBackend {
    ffmpeg: String,
    ffprobe: String,
}

impl FfmpegBackend {
    pub fn new(ffmpeg: String, ffprobe: String) -> Self {
        Self { ffmpeg, ffprobe }
    }

    fn run_ffprobe(&self, path: &Path, extra: &[&str]) -> Result<Probe, AnalysisError> {
        let output = Command::new(&self.ffprobe)
            .args(["-v", "error", "-print_format", "json", "-show_format", "-show_streams"])
            .args(extra)
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| AnalysisError::Io(format!("failed to run {}: {e}", self.ffprobe)))?;
        if !output.status.success() {
            return Err(AnalysisError::Decode(format!(
                "ffprobe failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        serde_json::from_slice(&output.stdout)
            .map_err(|e| AnalysisError::Decode(format!("unreadable ffprobe output: {e}")))
    }
}

impl VideoBackend for FfmpegBackend {
    fn probe(&self, path: &Path) -> Result<Probe, AnalysisError> {
        self.run_ffprobe(path, &[])
    }

    fn open(&self, path: &Path) -> Result<Box<dyn VideoSource>, AnalysisError> {
        let probe = self
            .run_ffprobe(path, &["-select_streams", "v:0"])
            .map_err(|e| AnalysisError::VideoOpen(e.to_string()))?;
        let stream = probe
            .first_of("video")
            .ok_or_else(|| AnalysisError::VideoOpen("no video stream".to_string()))?;
        let (width, height) = match (stream.width, stream.height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
            _ => return Err(AnalysisError::VideoOpen("unknown frame size".to_string())),
        };
        let frame_rate = stream.frame_rate().unwrap_or(0.0);
        // nb_frames is missing for most Matroska files, estimate from duration.
        let frame_count = stream
            .nb_frames
            .as_deref()
            .and_then(|n| n.parse::<u64>().ok())
            .or_else(|| {
                let secs = stream
                    .duration
                    .as_deref()
                    .or(probe.format.duration.as_deref())?
                    .parse::<f64>()
                    .ok()?;
                Some((secs * frame_rate).round() as u64)
            })
            .unwrap_or(0);
        debug!(
            "opened {}: {width}x{height}, {frame_count} frames at {frame_rate:.3} fps",
            path.display()
        );
        Ok(Box::new(FfmpegSource {
            ffmpeg: self.ffmpeg.clone(),
            path: path.to_path_buf(),
            width,
            height,
            frame_count,
            frame_rate,
        }))
    }
}

struct FfmpegSource {
    ffmpeg: String,
    path: PathBuf,
    width: u32,
    height: u32,
    frame_count: u64,
    frame_rate: f64,
}

impl FfmpegSource {
    /// Input seek position for `index`, or a frame-number filter when the
    /// rate is unknown and timestamps cannot be computed.
    fn seek_args(&self, index: u64) -> (Vec<String>, Vec<String>) {
        if self.frame_rate > 0.0 {
            let ts = index as f64 / self.frame_rate;
            (vec!["-ss".to_string(), format!("{ts:.6}")], vec![])
        } else {
            (vec![], vec!["-vf".to_string(), format!("select=eq(n\\,{index})")])
        }
    }
}

impl VideoSource for FfmpegSource {
    fn frame_count(&self) -> u64 {
        self.frame_count
    }

    fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    fn read_frame(&mut self, index: u64) -> Result<Option<Frame>, AnalysisError> {
        let (before, after) = self.seek_args(index);
        let output = Command::new(&self.ffmpeg)
            .args(["-v", "error", "-nostdin"])
            .args(&before)
            .arg("-i")
            .arg(&self.path)
            .args(&after)
            .args(["-frames:v", "1", "-f", "rawvideo", "-pix_fmt", "rgb24", "pipe:1"])
            .stdin(Stdio::null())
            .output()
            .map_err(|e| AnalysisError::Io(format!("failed to run {}: {e}", self.ffmpeg)))?;
        if !output.status.success() {
            return Err(AnalysisError::Decode(format!(
                "frame {index}: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        let expected = self.width as usize * self.height as usize * 3;
        if output.stdout.len() < expected {
            return Ok(None);
        }
        let mut rgb = output.stdout;
        rgb.truncate(expected);
        Ok(Some(Frame {
            width: self.width,
            height: self.height,
            rgb,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(frame_rate: f64) -> FfmpegSource {
        FfmpegSource {
            ffmpeg: "ffmpeg".to_string(),
            path: PathBuf::from("clip.mp4"),
            width: 2,
            height: 2,
            frame_count: 100,
            frame_rate,
        }
    }

    #[test]
    fn seeks_by_timestamp_when_rate_is_known() {
        let (before, after) = source(25.0).seek_args(50);
        assert_eq!(before, vec!["-ss", "2.000000"]);
        assert!(after.is_empty());
    }

    #[test]
    fn selects_by_frame_number_otherwise() {
        let (before, after) = source(0.0).seek_args(30);
        assert!(before.is_empty());
        assert_eq!(after, vec!["-vf", "select=eq(n\\,30)"]);
    }

    #[test]
    fn missing_executable_is_an_error() {
        let backend = FfmpegBackend::new(
            "/nonexistent/ffmpeg".to_string(),
            "/nonexistent/ffprobe".to_string(),
        );
        assert!(matches!(
            backend.probe(Path::new("clip.mp4")),
            Err(AnalysisError::Io(_))
        ));
        assert!(matches!(
            backend.open(Path::new("clip.mp4")),
            Err(AnalysisError::VideoOpen(_))
        ));
    }
}
