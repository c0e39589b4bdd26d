use std::collections::HashMap;

use axum::http::HeaderMap;

pub const UPLOAD_OFFSET: &str = "upload-offset";
pub const UPLOAD_LENGTH: &str = "upload-length";
pub const UPLOAD_NAME: &str = "upload-name";
pub const UPLOAD_CONTENT_TYPE: &str = "upload-content-type";

/// Query parameter carrying the encoded session identity
pub const PATCH_PARAM: &str = "patch";

/// Upload-related request parameters, read out of headers and query string
/// as raw strings. Validation is left to the controller.
#[derive(Debug, Clone, Default)]
pub struct UploadParams {
    pub identity: Option<String>,
    pub offset: Option<String>,
    pub length: Option<String>,
    pub name: Option<String>,
    pub content_type: Option<String>,
}

impl UploadParams {
    pub fn from_parts(headers: &HeaderMap, query: &HashMap<String, String>) -> Self {
        Self {
            identity: query.get(PATCH_PARAM).cloned(),
            offset: header(headers, UPLOAD_OFFSET),
            length: header(headers, UPLOAD_LENGTH),
            name: header(headers, UPLOAD_NAME),
            content_type: header(headers, UPLOAD_CONTENT_TYPE),
        }
    }
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
}
