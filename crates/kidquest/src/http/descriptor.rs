//! Request descriptors.

use std::time::Duration;

use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::multipart::{Form, Part};
use serde_json::Value;

use crate::error::ApiError;

/// Everything needed to perform one request attempt.
///
/// A descriptor is never mutated between attempts. The replay issued after a
/// token refresh is a new descriptor derived with [`for_replay`](Self::for_replay).
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: Method,
    /// Path relative to the base URL, or an absolute URL.
    pub path: String,
    pub query: Vec<(String, String)>,
    /// Extra headers, applied after the defaults.
    pub headers: HeaderMap,
    pub body: RequestBody,
    /// Per-attempt deadline; `None` uses the client default.
    pub timeout: Option<Duration>,
    /// Send without `Authorization` and never trigger a refresh.
    pub skip_auth: bool,
    /// Make exactly one attempt.
    pub skip_retry: bool,
    pub(crate) replayed: bool,
}

impl RequestDescriptor {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
            timeout: None,
            skip_auth: false,
            skip_retry: false,
            replayed: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attach a JSON body.
    pub fn json(mut self, body: Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    /// Attach a multipart body.
    pub fn upload(mut self, form: UploadForm) -> Self {
        self.body = RequestBody::Upload(form);
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn skip_auth(mut self) -> Self {
        self.skip_auth = true;
        self
    }

    pub fn skip_retry(mut self) -> Self {
        self.skip_retry = true;
        self
    }

    /// The single replay of this request after a successful refresh.
    ///
    /// Replays make one attempt and never start another refresh.
    pub fn for_replay(&self) -> Self {
        Self {
            skip_retry: true,
            replayed: true,
            ..self.clone()
        }
    }

    /// Whether this descriptor is a post-refresh replay.
    pub fn is_replay(&self) -> bool {
        self.replayed
    }

    /// Whether a 401 on this request may start a token refresh.
    pub(crate) fn may_refresh(&self) -> bool {
        !self.skip_auth && !self.replayed
    }
}

/// Request payload.
#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(Value),
    /// Multipart form; sent without the JSON `Content-Type` so the
    /// transport sets its own boundary.
    Upload(UploadForm),
}

impl RequestBody {
    pub fn is_upload(&self) -> bool {
        matches!(self, RequestBody::Upload(_))
    }
}

/// A multipart form that can be rebuilt for every attempt.
#[derive(Debug, Clone, Default)]
pub struct UploadForm {
    fields: Vec<(String, String)>,
    files: Vec<UploadFile>,
}

/// One file part of an [`UploadForm`].
#[derive(Clone)]
pub struct UploadFile {
    pub field: String,
    pub file_name: String,
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for UploadFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadFile")
            .field("field", &self.field)
            .field("file_name", &self.file_name)
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl UploadForm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a text field.
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    /// Add a file part.
    pub fn file(
        mut self,
        field: impl Into<String>,
        file_name: impl Into<String>,
        mime_type: Option<&str>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        self.files.push(UploadFile {
            field: field.into(),
            file_name: file_name.into(),
            mime_type: mime_type.map(str::to_string),
            bytes: bytes.into(),
        });
        self
    }

    pub fn files(&self) -> &[UploadFile] {
        &self.files
    }

    /// Build a fresh multipart form.
    ///
    /// # Errors
    ///
    /// Returns a `Validation` error for a malformed MIME type.
    pub(crate) fn to_multipart(&self) -> Result<Form, ApiError> {
        let mut form = Form::new();
        for (name, value) in &self.fields {
            form = form.text(name.clone(), value.clone());
        }
        for file in &self.files {
            let mut part = Part::bytes(file.bytes.clone()).file_name(file.file_name.clone());
            if let Some(mime) = &file.mime_type {
                part = part.mime_str(mime).map_err(|e| {
                    ApiError::new(
                        crate::ErrorKind::Validation,
                        None,
                        format!("invalid MIME type '{}' for {}: {}", mime, file.file_name, e),
                    )
                })?;
            }
            form = form.part(file.field.clone(), part);
        }
        Ok(form)
    }
}
