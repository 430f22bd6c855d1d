//! dog-axum: Axum adapter for DogRS runtimes.
//!
//! Builds routers whose state carries the server thread pool chosen by
//! [`dog_runtime::ExecutorSelector`], with helpers to offload blocking work
//! onto that pool and to read multipart uploads.

pub mod app;
pub mod offload;
pub mod state;
pub mod uploads;
mod error;
pub use error::DogAxumError;
pub use state::DogAxumState;

pub use app::{axum, AxumApp};
pub use offload::{offload, ServerPool};
pub use uploads::{UploadError, UploadLimits, UploadedFile, Uploads};
