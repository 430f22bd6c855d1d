use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use dog_runtime::RuntimeError;
use serde_json::json;

use crate::uploads::UploadError;

#[derive(Debug)]
pub struct DogAxumError(pub anyhow::Error);

impl From<anyhow::Error> for DogAxumError {
    fn from(e: anyhow::Error) -> Self {
        Self(e)
    }
}

impl From<UploadError> for DogAxumError {
    fn from(e: UploadError) -> Self {
        Self(anyhow::Error::new(e))
    }
}

impl From<RuntimeError> for DogAxumError {
    fn from(e: RuntimeError) -> Self {
        Self(anyhow::Error::new(e))
    }
}

impl DogAxumError {
    /// Status and Feathers-style `name` for the first recognised error in the chain
    fn classify(&self) -> (StatusCode, &'static str, &'static str) {
        for cause in self.0.chain() {
            if let Some(upload) = cause.downcast_ref::<UploadError>() {
                return match upload {
                    UploadError::LimitExceeded { .. } => {
                        (StatusCode::PAYLOAD_TOO_LARGE, "PayloadTooLarge", "payload-too-large")
                    }
                    UploadError::Malformed(_) => (StatusCode::BAD_REQUEST, "BadRequest", "bad-request"),
                };
            }
            if let Some(runtime) = cause.downcast_ref::<RuntimeError>() {
                if runtime.is_shutdown() {
                    return (StatusCode::SERVICE_UNAVAILABLE, "Unavailable", "unavailable");
                }
            }
        }
        (StatusCode::INTERNAL_SERVER_ERROR, "GeneralError", "general-error")
    }
}

impl IntoResponse for DogAxumError {
    fn into_response(self) -> Response {
        let (status, name, class_name) = self.classify();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }

        let body = json!({
            "name": name,
            "message": self.0.to_string(),
            "code": status.as_u16(),
            "className": class_name,
        });
        (status, Json(body)).into_response()
    }
}
