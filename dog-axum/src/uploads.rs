//! Multipart uploads as plain descriptors.
//!
//! Decoding is done by `multer`; this module only turns the parts into
//! [`UploadedFile`] descriptors and text form params, addressed by field
//! name. Lookups never fail: a missing field is `None`/empty, and a request
//! that is not `multipart/form-data` yields an empty [`Uploads`].
//!
//! ```rust,ignore
//! async fn avatar(uploads: Uploads) -> Result<Json<Value>, DogAxumError> {
//!     let file = uploads.file("avatar").ok_or_else(|| anyhow::anyhow!("no avatar"))?;
//!     Ok(Json(json!({ "name": file.filename(), "size": file.size() })))
//! }
//! ```

use std::collections::HashMap;
use std::io::Cursor;

use axum::body::Body;
use axum::extract::{FromRef, FromRequest, Request};
use axum::http::header::CONTENT_TYPE;
use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::DogAxumError;

/// Size limits enforced while reading a multipart body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadLimits {
    /// Max bytes for any single part (None = unlimited)
    pub max_file_size: Option<u64>,
    /// Max bytes for the whole request body (None = unlimited)
    pub max_request_size: Option<u64>,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_file_size: Some(100 * 1024 * 1024),    // 100MB
            max_request_size: Some(500 * 1024 * 1024), // 500MB
        }
    }
}

impl UploadLimits {
    pub fn unlimited() -> Self {
        Self {
            max_file_size: None,
            max_request_size: None,
        }
    }

    pub fn max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = Some(bytes);
        self
    }

    pub fn max_request_size(mut self, bytes: u64) -> Self {
        self.max_request_size = Some(bytes);
        self
    }

    fn constraints(&self) -> multer::Constraints {
        let mut limit = multer::SizeLimit::new();
        if let Some(max) = self.max_request_size {
            limit = limit.whole_stream(max);
        }
        if let Some(max) = self.max_file_size {
            limit = limit.per_field(max);
        }
        multer::Constraints::new().size_limit(limit)
    }
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Upload exceeds {limit} of {max} bytes")]
    LimitExceeded {
        limit: &'static str,
        max: u64,
        field: Option<String>,
    },

    #[error("Malformed multipart body: {0}")]
    Malformed(String),
}

impl From<multer::Error> for UploadError {
    fn from(err: multer::Error) -> Self {
        match err {
            multer::Error::StreamSizeExceeded { limit } => Self::LimitExceeded {
                limit: "max_request_size",
                max: limit,
                field: None,
            },
            multer::Error::FieldSizeExceeded { limit, field_name } => Self::LimitExceeded {
                limit: "max_file_size",
                max: limit,
                field: field_name,
            },
            other => Self::Malformed(other.to_string()),
        }
    }
}

/// One uploaded file part.
#[derive(Debug, Clone, Serialize)]
pub struct UploadedFile {
    field_name: String,
    filename: String,
    content_type: Option<String>,
    size: u64,
    extension: String,
    #[serde(skip)]
    data: Bytes,
}

impl UploadedFile {
    pub fn new(field_name: impl Into<String>, filename: impl Into<String>, content_type: Option<String>, data: Bytes) -> Self {
        let filename = filename.into();
        Self {
            field_name: field_name.into(),
            extension: extension_of(&filename),
            filename,
            content_type,
            size: data.len() as u64,
            data,
        }
    }

    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    /// Filename as submitted by the client
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Content type declared by the client, not sniffed
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Extension including the leading dot (".png"), empty if there is none.
    ///
    /// A dotfile's leading dot is part of its name, so ".bashrc" has no
    /// extension while ".env.local" has ".local".
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Readable stream over the file content
    pub fn content(&self) -> Cursor<Bytes> {
        Cursor::new(self.data.clone())
    }

    pub fn bytes(&self) -> &Bytes {
        &self.data
    }
}

fn extension_of(filename: &str) -> String {
    match filename.rfind('.') {
        Some(idx) if idx > 0 && idx + 1 < filename.len() => filename[idx..].to_string(),
        _ => String::new(),
    }
}

/// Files and text fields of a multipart request, in submission order
#[derive(Debug, Clone, Default)]
pub struct Uploads {
    files: Vec<UploadedFile>,
    params: Vec<(String, String)>,
}

impl Uploads {
    /// Read `body` as multipart if `content_type` says so, else return nothing.
    pub async fn from_body(content_type: Option<&str>, body: Body, limits: &UploadLimits) -> Result<Self, UploadError> {
        let Some(content_type) = content_type.filter(|ct| is_multipart(ct)) else {
            return Ok(Self::default());
        };

        let boundary = multer::parse_boundary(content_type)?;
        let mut multipart = multer::Multipart::with_constraints(body.into_data_stream(), boundary, limits.constraints());
        let mut uploads = Self::default();

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            match field.file_name().map(str::to_string) {
                Some(filename) => {
                    let content_type = field.content_type().map(|m| m.to_string());
                    let data = field.bytes().await?;
                    debug!(field = %name, filename = %filename, size = data.len(), "received upload");
                    uploads.files.push(UploadedFile::new(name, filename, content_type, data));
                }
                None => {
                    let value = field.text().await?;
                    uploads.params.push((name, value));
                }
            }
        }

        Ok(uploads)
    }

    /// First file uploaded under `name`
    pub fn file(&self, name: &str) -> Option<&UploadedFile> {
        self.files.iter().find(|f| f.field_name == name)
    }

    /// Every file uploaded under `name`
    pub fn files(&self, name: &str) -> Vec<&UploadedFile> {
        self.files.iter().filter(|f| f.field_name == name).collect()
    }

    pub fn all(&self) -> &[UploadedFile] {
        &self.files
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.params.is_empty()
    }

    /// First text value submitted under `name`
    pub fn form_param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn form_params(&self, name: &str) -> Vec<&str> {
        self.params
            .iter()
            .filter(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
            .collect()
    }

    pub fn form_param_map(&self) -> HashMap<String, Vec<String>> {
        let mut map: HashMap<String, Vec<String>> = HashMap::new();
        for (key, value) in &self.params {
            map.entry(key.clone()).or_default().push(value.clone());
        }
        map
    }
}

fn is_multipart(content_type: &str) -> bool {
    content_type
        .trim_start()
        .to_ascii_lowercase()
        .starts_with("multipart/form-data")
}

impl<S> FromRequest<S> for Uploads
where
    S: Send + Sync,
    UploadLimits: FromRef<S>,
{
    type Rejection = DogAxumError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let limits = UploadLimits::from_ref(state);
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        Uploads::from_body(content_type.as_deref(), req.into_body(), &limits)
            .await
            .map_err(DogAxumError::from)
    }
}
