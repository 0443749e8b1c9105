use std::fmt;

use serde::{Deserialize, Serialize};

/// Sub-phase label of a running analysis.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// The record exists but the worker has not started its first stage.
    Queued,
    ExtractingMetadata,
    Hashing,
    SamplingFrames,
    ExtractingPreview,
}

impl Phase {
    pub fn label(&self) -> &'static str {
        match self {
            Phase::Queued => "Queued...",
            Phase::ExtractingMetadata => "Extracting metadata...",
            Phase::Hashing => "Calculating file hash...",
            Phase::SamplingFrames => "Analyzing video frames...",
            Phase::ExtractingPreview => "Extracting preview frame...",
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Status {
    /// The worker is still going. Progress fields may change.
    Running { phase: Phase },
    /// Every stage ran. Terminal.
    Complete,
    /// A stage failed hard and the pipeline stopped. Terminal.
    Error { message: String },
}

impl Status {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Status::Running { .. })
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Running { phase } => write!(f, "{}", phase.label()),
            Status::Complete => write!(f, "complete"),
            Status::Error { message } => write!(f, "error: {message}"),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum NotAvailable {
    #[serde(rename = "N/A")]
    Tag,
}

/// A metadata field that is either known or explicitly "N/A".
///
/// Missing values are serialized as the string `"N/A"` rather than being
/// skipped, so every metadata record has the same set of keys.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum Reading<T> {
    Missing(NotAvailable),
    Value(T),
}

impl<T> Reading<T> {
    pub fn missing() -> Self {
        Reading::Missing(NotAvailable::Tag)
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Reading::Value(v) => Some(v),
            Reading::Missing(_) => None,
        }
    }
}

impl<T> From<Option<T>> for Reading<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Reading::Value(v),
            None => Reading::missing(),
        }
    }
}

impl<T: fmt::Display> fmt::Display for Reading<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reading::Value(v) => write!(f, "{v}"),
            Reading::Missing(_) => write!(f, "N/A"),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct VideoTrack {
    pub codec: Reading<String>,
    pub duration_ms: Reading<u64>,
    pub width_px: Reading<u32>,
    pub height_px: Reading<u32>,
    pub frame_rate_fps: Reading<f64>,
    pub bit_rate_bps: Reading<u64>,
    pub color_space: Reading<String>,
    pub scan_type: Reading<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AudioTrack {
    pub codec: Reading<String>,
    pub sample_rate_hz: Reading<u32>,
    pub channels: Reading<u32>,
    pub bit_rate_bps: Reading<u64>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct VideoMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<VideoTrack>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<AudioTrack>,
}

/// Outcome of the metadata stage. A failure here degrades the payload but
/// does not fail the analysis.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum MetadataResult {
    Failed { error: String },
    Extracted(VideoMetadata),
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct HashResult {
    pub algorithm: String,
    /// Exact size in bytes of the hashed file.
    pub file_size: u64,
    pub file_size_display: String,
    pub hash: String,
    /// `hash` split into 16 hex character chunks.
    pub hash_breakdown: Vec<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FrameSample {
    pub frame: u64,
    pub brightness: f64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct FrameSummary {
    pub dark_count: u64,
    pub bright_count: u64,
    pub normal_count: u64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FrameAnalysisResult {
    pub total_frames: u64,
    pub frame_rate: f64,
    pub duration_seconds: f64,
    pub analysis_limit: u64,
    pub dark_frames: Vec<FrameSample>,
    pub bright_frames: Vec<FrameSample>,
    pub normal_frames: u64,
    pub summary: FrameSummary,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PreviewFrame {
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
    /// Base64 encoded image bytes.
    pub data: String,
}

/// Stage outputs. A key is only present once its stage has completed.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct AnalysisResults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MetadataResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<HashResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frames: Option<FrameAnalysisResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_frame: Option<PreviewFrame>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ProgressRecord {
    pub status: Status,
    pub metadata_done: bool,
    pub hash_progress: f64,
    pub frame_progress: f64,
    pub results: AnalysisResults,
    /** Unix seconds at which the upload was accepted */
    pub created_at: u64,
}

impl ProgressRecord {
    pub fn new(created_at: u64) -> Self {
        Self {
            status: Status::Running {
                phase: Phase::Queued,
            },
            metadata_done: false,
            hash_progress: 0.0,
            frame_progress: 0.0,
            results: AnalysisResults::default(),
            created_at,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
