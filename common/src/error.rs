use std::{error::Error, fmt, io};

/// Failures that escape an analysis stage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AnalysisError {
    /// The file could not be opened or read.
    Io(String),
    /// The decoder could not open the video at all.
    VideoOpen(String),
    /// The video opened but its frames or streams could not be decoded.
    Decode(String),
}

impl fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisError::Io(e) => write!(f, "I/O error: {e}"),
            AnalysisError::VideoOpen(e) => write!(f, "could not open video: {e}"),
            AnalysisError::Decode(e) => write!(f, "decode error: {e}"),
        }
    }
}

impl Error for AnalysisError {}

impl From<io::Error> for AnalysisError {
    fn from(value: io::Error) -> Self {
        Self::Io(value.to_string())
    }
}
