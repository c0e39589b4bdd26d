use std::collections::HashMap;
use std::io;

use axum::{
    extract::multipart::MultipartRejection,
    extract::multipart::Field,
    extract::{Multipart, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing, Router,
};
use bytes::Bytes;
use dog_upload::{ByteStream, EncodedIdentity};
use futures::stream;
use tokio::sync::mpsc;

use crate::params::{UploadParams, UPLOAD_OFFSET};
use crate::{UploadHttpError, UploadState};

/// Multipart chunks buffered between the request body and the store
const FIELD_BUFFER_CHUNKS: usize = 4;

/// `/upload` endpoints speaking the FilePond server protocol:
///
/// - `POST` with a file field named after `input_name` stores it in one shot;
///   any other `POST` opens a chunked session. Both answer with the identity.
/// - `PATCH ?patch=<id>` carries one fragment (`Upload-Offset`, `Upload-Length`).
/// - `HEAD ?patch=<id>` reports the resume offset in `Upload-Offset`.
/// - `DELETE` with the identity as body drops the session.
pub fn upload_router(state: UploadState) -> Router<()> {
    Router::new()
        .route(
            "/upload",
            routing::post(create)
                .patch(patch)
                .head(probe)
                .delete(remove),
        )
        .with_state(state)
}

async fn create(
    State(state): State<UploadState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<String, UploadHttpError> {
    let params = UploadParams::from_parts(&headers, &query);
    let input_name = state.uploads.config().input_name.as_str();

    // A body that isn't multipart at all is a plain chunk-init request
    if let Ok(mut multipart) = multipart {
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| UploadHttpError::bad_request(e.to_string()))?
        {
            if field.name() != Some(input_name) {
                continue;
            }
            let Some(file_name) = field.file_name().map(str::to_string) else {
                continue;
            };

            let id = store_field(&state, &file_name, field).await?;
            return Ok(id.into_string());
        }
    }

    let id = state
        .uploads
        .initialize_session(params.name.as_deref(), params.content_type.as_deref())
        .await?;
    Ok(id.into_string())
}

/// Stream one multipart field into a simple upload without buffering it.
///
/// The field borrows the request body, so it is pumped through a bounded
/// channel that the store consumes concurrently.
async fn store_field(
    state: &UploadState,
    file_name: &str,
    mut field: Field<'_>,
) -> Result<EncodedIdentity, UploadHttpError> {
    let (tx, rx) = mpsc::channel::<Result<Bytes, io::Error>>(FIELD_BUFFER_CHUNKS);
    let body: ByteStream = Box::pin(stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|chunk| (chunk, rx))
    }));

    let pump = async move {
        loop {
            match field.chunk().await {
                Ok(Some(chunk)) => {
                    if tx.send(Ok(chunk)).await.is_err() {
                        return Ok(());
                    }
                }
                Ok(None) => return Ok(()),
                Err(e) => {
                    let _ = tx.send(Err(io::Error::other(e.to_string()))).await;
                    return Err(e);
                }
            }
        }
    };

    let (pumped, stored) = tokio::join!(pump, state.uploads.store_simple(Some(file_name), body));
    pumped.map_err(|e| UploadHttpError::bad_request(e.to_string()))?;
    Ok(stored?)
}

async fn patch(
    State(state): State<UploadState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Result<StatusCode, UploadHttpError> {
    let params = UploadParams::from_parts(&headers, &query);

    state
        .uploads
        .handle_fragment(
            params.identity.as_deref(),
            params.offset.as_deref(),
            params.length.as_deref(),
            body,
            params.content_type.as_deref(),
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn probe(
    State(state): State<UploadState>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, UploadHttpError> {
    let params = UploadParams::from_parts(&HeaderMap::new(), &query);
    let offset = state.uploads.received_bytes(params.identity.as_deref()).await?;
    Ok((StatusCode::OK, [(UPLOAD_OFFSET, offset.to_string())]))
}

async fn remove(State(state): State<UploadState>, body: Bytes) -> Result<StatusCode, UploadHttpError> {
    let identity = String::from_utf8_lossy(&body);
    state.uploads.delete_session(Some(&*identity)).await?;
    Ok(StatusCode::NO_CONTENT)
}
