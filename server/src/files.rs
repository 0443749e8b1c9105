use futures_util::{pin_mut, Stream, StreamExt as _};
use std::{error::Error, fmt, io, path::Path};

use actix_web::web::Bytes;
use log::warn;
use tokio::{
    fs::{remove_file, File},
    io::AsyncWriteExt,
};

use crate::payloads::ErrorablePayload;
pub use common::allowed_file;

pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 500 * 1024 * 1024;

/// Why an upload was turned away before any analysis started.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UploadError {
    NoFile,
    NoFilename,
    Malformed(String),
    InvalidType,
    TooLarge(u64),
    Io(String),
}

impl fmt::Display for UploadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadError::NoFile => write!(f, "No file uploaded"),
            UploadError::NoFilename => write!(f, "No file selected"),
            UploadError::Malformed(e) => write!(f, "Malformed upload: {e}"),
            UploadError::InvalidType => write!(f, "Invalid file type"),
            UploadError::TooLarge(limit) => write!(f, "File too large (limit is {limit} bytes)"),
            UploadError::Io(e) => write!(f, "Failed to save file: {e}"),
        }
    }
}

impl Error for UploadError {}

impl From<io::Error> for UploadError {
    fn from(value: io::Error) -> Self {
        Self::Io(value.to_string())
    }
}

impl<T> From<UploadError> for ErrorablePayload<T> {
    fn from(value: UploadError) -> Self {
        match value {
            UploadError::Io(_) => Self::Err(value.to_string()),
            _ => Self::Invalid(value.to_string()),
        }
    }
}

/// Reduces a client supplied name to a safe single path component made of
/// ASCII letters, digits, `.`, `_` and `-`.
pub fn sanitize_filename(filename: &str) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    let trimmed = cleaned.trim_matches(|c| c == '.' || c == '_');
    if trimmed.is_empty() {
        "upload".to_string()
    } else {
        trimmed.to_string()
    }
}

/// On-disk name: the submission id keeps names unique, the sanitized original
/// name keeps them readable.
pub fn stored_name(id: &str, filename: &str) -> String {
    format!("{id}_{}", sanitize_filename(filename))
}

/// Streams `body` into a new file at `path`, refusing to go past `limit`
/// bytes. A file that already exists is never touched; one created here is
/// removed again if the upload fails.
pub async fn save_stream<S, E>(path: &Path, body: S, limit: u64) -> Result<u64, UploadError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: fmt::Display,
{
    let file = File::create_new(path).await?;
    let res = write_stream(file, body, limit).await;
    if res.is_err() {
        if let Err(e) = remove_file(path).await {
            warn!("could not clean up {}: {e}", path.display());
        }
    }
    res
}

async fn write_stream<S, E>(mut file: File, body: S, limit: u64) -> Result<u64, UploadError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: fmt::Display,
{
    pin_mut!(body);
    let mut written: u64 = 0;
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| UploadError::Io(format!("chunk read failed: {e}")))?;
        written += chunk.len() as u64;
        if written > limit {
            return Err(UploadError::TooLarge(limit));
        }
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    file.sync_all().await?;
    Ok(written)
}
