//! Streaming `multipart/form-data` uploads.
//!
//! The payload is flattened into text fields, the file goes last as a binary
//! part streamed from disk (or memory) with its length declared up front.

use std::path::Path;

use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::multipart::{Form, Part};
use reqwest::Body;
use serde::Serialize;
use serde_json::{Number, Value};
use tokio::io::AsyncReadExt;
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::error::{Error, Result};
use crate::transport::Transport;

enum Source {
    Disk(tokio::fs::File),
    Memory(Bytes),
}

/// A file to attach to a request. Consumed by the upload.
pub struct InputFile {
    name: String,
    len: u64,
    source: Source,
}

impl InputFile {
    /// Open a file on disk. Only its base name is sent to the server.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = tokio::fs::File::open(path).await?;
        let len = file.metadata().await?.len();
        Ok(Self {
            name: base_name(&path.to_string_lossy()),
            len,
            source: Source::Disk(file),
        })
    }

    pub fn from_bytes(name: &str, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self {
            name: base_name(name),
            len: data.len() as u64,
            source: Source::Memory(data),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn into_stream(self) -> BoxStream<'static, std::io::Result<Bytes>> {
        match self.source {
            // Never send more than we promised in Content-Length.
            Source::Disk(file) => ReaderStream::new(file.take(self.len)).boxed(),
            Source::Memory(data) => stream::once(async move { Ok(data) }).boxed(),
        }
    }
}

impl std::fmt::Debug for InputFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputFile")
            .field("name", &self.name)
            .field("len", &self.len)
            .finish()
    }
}

/// Last path component, with either separator style.
fn base_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or("");
    if base.is_empty() || base == "." || base == ".." {
        "file".to_string()
    } else {
        base.to_string()
    }
}

/// Flatten a JSON object payload into `(name, value)` text fields.
///
/// Scalars use their plain text form (numbers in fixed-point), nested
/// objects and arrays are embedded as compact JSON, nulls are dropped.
pub fn form_fields<P>(payload: &P) -> Result<Vec<(String, String)>>
where
    P: Serialize + ?Sized,
{
    let map = match serde_json::to_value(payload).map_err(Error::Encode)? {
        Value::Object(map) => map,
        Value::Null => return Err(Error::Validation("payload can't be null".to_string())),
        other => {
            return Err(Error::Validation(format!(
                "multipart payload must be a JSON object, got {}",
                json_kind(&other)
            )))
        }
    };

    Ok(map
        .into_iter()
        .filter_map(|(name, value)| field_text(value).map(|text| (name, text)))
        .collect())
}

fn field_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(fixed_point(&n)),
        Value::String(s) => Some(s),
        nested @ (Value::Array(_) | Value::Object(_)) => Some(nested.to_string()),
    }
}

fn fixed_point(n: &Number) -> String {
    if let Some(i) = n.as_i64() {
        i.to_string()
    } else if let Some(u) = n.as_u64() {
        u.to_string()
    } else {
        // f64's Display never switches to exponent notation.
        n.as_f64().map(|f| f.to_string()).unwrap_or_else(|| n.to_string())
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Text fields first, then the file as a streamed part of known length.
///
/// Every part has a known size, so reqwest can announce the exact
/// `Content-Length` without buffering the file.
pub fn build_form(fields: Vec<(String, String)>, field_name: &str, file: InputFile) -> Result<Form> {
    let file_name = file.name().to_string();
    let len = file.len();
    let part = Part::stream_with_length(Body::wrap_stream(file.into_stream()), len)
        .file_name(file_name)
        .mime_str("application/octet-stream")?;

    let form = fields
        .into_iter()
        .fold(Form::new(), |form, (name, value)| form.text(name, value));
    Ok(form.part(field_name.to_string(), part))
}

impl Transport {
    /// POST `payload` plus `file` (as form field `field_name`) to `method`.
    pub async fn upload<P>(
        &self,
        file: InputFile,
        method: &str,
        field_name: &str,
        payload: &P,
    ) -> Result<Bytes>
    where
        P: Serialize + ?Sized,
    {
        let fields = form_fields(payload)?;
        debug!(
            "POST {} multipart ({} fields, file {} of {} bytes)",
            method,
            fields.len(),
            file.name(),
            file.len()
        );

        let form = build_form(fields, field_name, file)?;
        let request = self.client().post(self.endpoint(method)).multipart(form);
        self.send(request).await
    }
}
