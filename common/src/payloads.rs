use crate::data::{AnalysisResults, ProgressRecord};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub const NOT_FOUND_MESSAGE: &str = "File not found";

// Response payloads

/// Either a successful body or an `{"error": "..."}` object.
///
/// The variant decides the HTTP status on the server side; on the wire only
/// the body is visible, so a client relies on the status code to tell
/// `Invalid` and `Err` apart.
#[derive(Clone, Debug, PartialEq)]
pub enum ErrorablePayload<T> {
    Ok(T),
    NotFound,
    /// The request was rejected before any work started.
    Invalid(String),
    Err(String),
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ErrorMessage {
    error: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawPayload<T> {
    Failure(ErrorMessage),
    Ok(T),
}

impl<T: Serialize> Serialize for ErrorablePayload<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ErrorablePayload::Ok(payload) => payload.serialize(serializer),
            ErrorablePayload::NotFound => ErrorBody {
                error: NOT_FOUND_MESSAGE,
            }
            .serialize(serializer),
            ErrorablePayload::Invalid(e) | ErrorablePayload::Err(e) => {
                ErrorBody { error: e }.serialize(serializer)
            }
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for ErrorablePayload<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match RawPayload::deserialize(deserializer)? {
            RawPayload::Ok(payload) => ErrorablePayload::Ok(payload),
            RawPayload::Failure(ErrorMessage { error }) if error == NOT_FOUND_MESSAGE => {
                ErrorablePayload::NotFound
            }
            RawPayload::Failure(ErrorMessage { error }) => ErrorablePayload::Err(error),
        })
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct UploadInformation {
    pub success: bool,
    pub file_id: String,
    /// The name the client sent, before sanitization.
    pub filename: String,
}

pub type NewUploadResponse = UploadInformation;

pub type ProgressResponse = ProgressRecord;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    NotReady,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum ResultsResponse {
    /// Serialized as `{"status": "not_ready"}`. Never carries partial results.
    Pending { status: Readiness },
    Ready(AnalysisResults),
}

impl ResultsResponse {
    pub fn not_ready() -> Self {
        ResultsResponse::Pending {
            status: Readiness::NotReady,
        }
    }
}
