use std::path::PathBuf;

use clap::Parser;

use crate::files::DEFAULT_MAX_UPLOAD_BYTES;

/// Accepts video uploads and analyses them in the background.
///
/// Every option can also be set through its `FRAMESCOPE_*` environment
/// variable. Analysis state lives in memory only and is lost on restart.
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Config {
    #[arg(long, env = "FRAMESCOPE_BIND", default_value = "127.0.0.1")]
    pub bind: String,

    #[arg(short, long, env = "FRAMESCOPE_PORT", default_value_t = 5001)]
    pub port: u16,

    /// Directory uploads are written to. Created if missing.
    #[arg(long, env = "FRAMESCOPE_STORAGE", default_value = "uploads")]
    pub storage_root: PathBuf,

    #[arg(long, env = "FRAMESCOPE_MAX_UPLOAD", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    pub max_upload_bytes: u64,

    #[arg(long, env = "FRAMESCOPE_FFMPEG", default_value = "ffmpeg")]
    pub ffmpeg: String,

    #[arg(long, env = "FRAMESCOPE_FFPROBE", default_value = "ffprobe")]
    pub ffprobe: String,

    /// Remove each uploaded file once its analysis has finished.
    /// Uploads are kept indefinitely otherwise.
    #[arg(long, env = "FRAMESCOPE_DELETE_AFTER_ANALYSIS")]
    pub delete_after_analysis: bool,

    /// Forget finished analyses this many seconds after upload.
    /// Without it, records accumulate for the lifetime of the process.
    #[arg(long, env = "FRAMESCOPE_RETENTION_SECS")]
    pub retention_secs: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Config::command().debug_assert();
    }

    #[test]
    fn flags_override_defaults() {
        let config = Config::try_parse_from([
            "framescope-server",
            "--port",
            "8080",
            "--storage-root",
            "/tmp/videos",
            "--max-upload-bytes",
            "1024",
            "--delete-after-analysis",
            "--retention-secs",
            "3600",
        ])
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.storage_root, PathBuf::from("/tmp/videos"));
        assert_eq!(config.max_upload_bytes, 1024);
        assert!(config.delete_after_analysis);
        assert_eq!(config.retention_secs, Some(3600));
    }
}
