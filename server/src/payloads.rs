use actix_web::{http::StatusCode, HttpResponse};
pub use common::payloads::*;
use serde::Serialize;

pub trait ToHttpResponse {
    /// HTTP status for this payload, given the one a successful request gets.
    fn status(&self, ok: StatusCode) -> StatusCode;

    /// The payload as a JSON response. `ok` is used for `ErrorablePayload::Ok`,
    /// e.g. `StatusCode::CREATED` for an accepted upload.
    fn to_response(self, ok: StatusCode) -> HttpResponse;
}

impl<T: Serialize> ToHttpResponse for ErrorablePayload<T> {
    fn status(&self, ok: StatusCode) -> StatusCode {
        match self {
            ErrorablePayload::Ok(_) => ok,
            ErrorablePayload::NotFound => StatusCode::NOT_FOUND,
            ErrorablePayload::Invalid(_) => StatusCode::BAD_REQUEST,
            ErrorablePayload::Err(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn to_response(self, ok: StatusCode) -> HttpResponse {
        HttpResponse::build(self.status(ok)).json(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses() {
        let tests: [(ErrorablePayload<()>, StatusCode); 4] = [
            (ErrorablePayload::Ok(()), StatusCode::CREATED),
            (ErrorablePayload::NotFound, StatusCode::NOT_FOUND),
            (
                ErrorablePayload::Invalid("Invalid file type".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (
                ErrorablePayload::Err("disk full".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (payload, expected) in tests {
            assert_eq!(payload.status(StatusCode::CREATED), expected);
        }
    }
}
