use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use dog_upload::UploadError;
use serde_json::json;

/// Message shown to clients in place of any server-side error detail
const GENERIC_SERVER_MESSAGE: &str = "The upload could not be processed";

#[derive(Debug)]
pub enum UploadHttpError {
    /// Failure reported by the upload controller
    Upload(UploadError),
    /// Request could not be read (bad multipart body, unreadable field, ...)
    BadRequest(String),
}

impl From<UploadError> for UploadHttpError {
    fn from(e: UploadError) -> Self {
        Self::Upload(e)
    }
}

impl UploadHttpError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Upload(e) => StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Feathers-style error body; 5xx responses never carry the underlying cause.
    pub fn to_json(&self) -> serde_json::Value {
        let status = self.status();
        let (name, class_name) = match status {
            StatusCode::BAD_REQUEST => ("BadRequest", "bad-request"),
            StatusCode::NOT_FOUND => ("NotFound", "not-found"),
            _ => ("GeneralError", "general-error"),
        };
        let message = match self {
            _ if status.is_server_error() => GENERIC_SERVER_MESSAGE.to_string(),
            Self::Upload(e) => e.to_string(),
            Self::BadRequest(msg) => msg.clone(),
        };

        json!({
            "name": name,
            "message": message,
            "code": status.as_u16(),
            "className": class_name,
        })
    }
}

impl IntoResponse for UploadHttpError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            if let Self::Upload(e) = &self {
                tracing::error!(error = %e, "upload request failed");
            }
        } else {
            tracing::debug!(status = status.as_u16(), error = ?self, "upload request rejected");
        }
        (status, Json(self.to_json())).into_response()
    }
}
