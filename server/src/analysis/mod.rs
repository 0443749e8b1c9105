//! The per-upload analysis pipeline and the video backend it runs on.

use std::path::Path;

use common::AnalysisError;
use serde::Deserialize;

pub mod ffmpeg;
pub mod frames;
pub mod metadata;
pub mod orchestrator;
pub mod preview;

#[cfg(test)]
pub(crate) mod testing;

/// Container and stream information as reported by the prober.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Probe {
    #[serde(default)]
    pub streams: Vec<ProbeStream>,
    #[serde(default)]
    pub format: ProbeFormat,
}

/// One stream of a [`Probe`]. Numeric fields that ffprobe reports as strings
/// are kept as strings here and parsed by the consumer.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct ProbeStream {
    pub codec_type: Option<String>,
    pub codec_name: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub r_frame_rate: Option<String>,
    pub avg_frame_rate: Option<String>,
    pub bit_rate: Option<String>,
    pub duration: Option<String>,
    pub nb_frames: Option<String>,
    pub color_space: Option<String>,
    pub field_order: Option<String>,
    pub sample_rate: Option<String>,
    pub channels: Option<u32>,
}

#[derive(Deserialize, Clone, Debug, Default)]
pub struct ProbeFormat {
    pub duration: Option<String>,
}

impl Probe {
    pub fn first_of(&self, codec_type: &str) -> Option<&ProbeStream> {
        self.streams
            .iter()
            .find(|s| s.codec_type.as_deref() == Some(codec_type))
    }
}

impl ProbeStream {
    /// Average frame rate, falling back to the base rate when the average is
    /// unknown (`0/0`).
    pub fn frame_rate(&self) -> Option<f64> {
        self.avg_frame_rate
            .as_deref()
            .and_then(parse_rate)
            .or_else(|| self.r_frame_rate.as_deref().and_then(parse_rate))
    }
}

/// Parses ffprobe rationals such as `30000/1001`. Zero rates count as unknown.
pub fn parse_rate(rate: &str) -> Option<f64> {
    let (num, den) = match rate.split_once('/') {
        Some((n, d)) => (n.trim().parse::<f64>().ok()?, d.trim().parse::<f64>().ok()?),
        None => (rate.trim().parse::<f64>().ok()?, 1.0),
    };
    if den == 0.0 || num <= 0.0 {
        return None;
    }
    Some(num / den)
}

/// A decoded frame as packed 8-bit RGB.
#[derive(Clone, Debug)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
}

impl Frame {
    /// Mean over every channel byte, 0..=255.
    pub fn mean_brightness(&self) -> f64 {
        if self.rgb.is_empty() {
            return 0.0;
        }
        let sum: u64 = self.rgb.iter().map(|&b| u64::from(b)).sum();
        sum as f64 / self.rgb.len() as f64
    }
}

/// An opened video that frames can be pulled out of by index.
pub trait VideoSource {
    fn frame_count(&self) -> u64;
    fn frame_rate(&self) -> f64;
    /// Seeks to `index` and decodes it. `Ok(None)` past the end of the stream.
    fn read_frame(&mut self, index: u64) -> Result<Option<Frame>, AnalysisError>;
}

/// Whatever reads containers and decodes frames. Shared by every worker.
pub trait VideoBackend: Send + Sync {
    fn probe(&self, path: &Path) -> Result<Probe, AnalysisError>;
    fn open(&self, path: &Path) -> Result<Box<dyn VideoSource>, AnalysisError>;
}
