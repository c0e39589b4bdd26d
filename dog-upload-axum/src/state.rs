use std::sync::Arc;

use dog_upload::UploadSessionController;

/// Shared state handed to every upload handler
#[derive(Clone)]
pub struct UploadState {
    pub uploads: Arc<UploadSessionController>,
}

impl UploadState {
    pub fn new(uploads: UploadSessionController) -> Self {
        Self {
            uploads: Arc::new(uploads),
        }
    }
}
