use axum::extract::DefaultBodyLimit;
use axum::http::HeaderName;
use axum::Router;
use dog_upload::UploadSessionController;
use tokio::net::{TcpListener, ToSocketAddrs};
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::rest;
use crate::UploadState;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Default request body ceiling; fragments larger than this are rejected with 413
pub const DEFAULT_BODY_LIMIT: usize = 64 * 1024 * 1024;

#[derive(Clone)]
pub struct UploadApp {
    pub state: UploadState,
    pub router: Router<()>,
}

impl UploadApp {
    pub fn new(uploads: UploadSessionController) -> Self {
        Self::with_body_limit(uploads, DEFAULT_BODY_LIMIT)
    }

    pub fn with_body_limit(uploads: UploadSessionController, body_limit: usize) -> Self {
        let state = UploadState::new(uploads);
        let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

        let router = rest::upload_router(state.clone())
            .layer(DefaultBodyLimit::max(body_limit))
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::new(request_id)),
            );

        Self { state, router }
    }

    pub async fn listen<A>(self, addr: A) -> anyhow::Result<()>
    where
        A: ToSocketAddrs,
    {
        let listener = TcpListener::bind(addr).await?;
        tracing::info!(addr = ?listener.local_addr().ok(), "upload server listening");
        axum::serve(listener, self.router).await?;
        Ok(())
    }
}

pub fn axum(uploads: UploadSessionController) -> UploadApp {
    UploadApp::new(uploads)
}
