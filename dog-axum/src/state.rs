use std::sync::Arc;

use axum::extract::FromRef;
use dog_runtime::ThreadPool;

use crate::uploads::UploadLimits;

/// Router state shared by every handler
#[derive(Clone)]
pub struct DogAxumState {
    pub pool: Arc<dyn ThreadPool>,
    pub upload_limits: UploadLimits,
}

impl DogAxumState {
    pub fn new(pool: Arc<dyn ThreadPool>) -> Self {
        Self {
            pool,
            upload_limits: UploadLimits::default(),
        }
    }

    pub fn with_upload_limits(mut self, limits: UploadLimits) -> Self {
        self.upload_limits = limits;
        self
    }
}

impl FromRef<DogAxumState> for UploadLimits {
    fn from_ref(state: &DogAxumState) -> Self {
        state.upload_limits
    }
}

impl FromRef<DogAxumState> for Arc<dyn ThreadPool> {
    fn from_ref(state: &DogAxumState) -> Self {
        Arc::clone(&state.pool)
    }
}

impl std::fmt::Debug for DogAxumState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DogAxumState")
            .field("pool", &self.pool.name())
            .field("pool_kind", &self.pool.kind())
            .field("upload_limits", &self.upload_limits)
            .finish()
    }
}
