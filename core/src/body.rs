//! Request body shapes.
//!
//! # Design
//! A body is JSON, plain text, a binary blob, or a multipart form. The shape
//! decides the derived `Content-Type` header (see `request::get_headers`);
//! turning a `Multipart` into bytes is left to the transport, which picks
//! either `multipart/form-data` or `application/x-www-form-urlencoded`.

use bytes::{BufMut, Bytes, BytesMut};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde_json::Value;
use uuid::Uuid;

/// Binary payload with an optional MIME type and file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub bytes: Bytes,
    pub mime: Option<String>,
    pub file_name: Option<String>,
}

impl Blob {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
            mime: None,
            file_name: None,
        }
    }

    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = Some(mime.into());
        self
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }
}

/// Request body.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Json(Value),
    Text(String),
    Blob(Blob),
    Multipart(Multipart),
}

impl From<Value> for Body {
    fn from(value: Value) -> Self {
        Body::Json(value)
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Body::Text(text)
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Self {
        Body::Text(text.to_string())
    }
}

impl From<Blob> for Body {
    fn from(blob: Blob) -> Self {
        Body::Blob(blob)
    }
}

impl From<Multipart> for Body {
    fn from(form: Multipart) -> Self {
        Body::Multipart(form)
    }
}

/// One value of a multipart form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    Text(String),
    Blob(Blob),
}

/// Ordered multipart form. A field name may repeat.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Multipart {
    parts: Vec<(String, Part)>,
}

/// `application/x-www-form-urlencoded` keeps only these bytes unescaped.
const FORM_URLENCODED: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'*')
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b' ');

impl Multipart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_text(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.parts.push((name.into(), Part::Text(value.into())));
    }

    pub fn append_blob(&mut self, name: impl Into<String>, blob: Blob) {
        self.parts.push((name.into(), Part::Blob(blob)));
    }

    pub fn parts(&self) -> &[(String, Part)] {
        &self.parts
    }

    /// Values appended under `name`, in order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Part> + 'a {
        self.parts
            .iter()
            .filter(move |(key, _)| key == name)
            .map(|(_, part)| part)
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// `Content-Type` value matching [`Multipart::encode`] with `boundary`.
    pub fn content_type(boundary: &str) -> String {
        format!("multipart/form-data; boundary={boundary}")
    }

    /// Encode as `multipart/form-data`.
    pub fn encode(&self, boundary: &str) -> Bytes {
        let mut out = BytesMut::new();
        for (name, part) in &self.parts {
            out.put_slice(format!("--{boundary}\r\n").as_bytes());
            match part {
                Part::Text(text) => {
                    out.put_slice(
                        format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", escape_quoted(name))
                            .as_bytes(),
                    );
                    out.put_slice(text.as_bytes());
                }
                Part::Blob(blob) => {
                    let file_name = blob.file_name.as_deref().unwrap_or("blob");
                    out.put_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                            escape_quoted(name),
                            escape_quoted(file_name)
                        )
                        .as_bytes(),
                    );
                    let mime = blob.mime.as_deref().unwrap_or("application/octet-stream");
                    out.put_slice(format!("Content-Type: {mime}\r\n\r\n").as_bytes());
                    out.put_slice(&blob.bytes);
                }
            }
            out.put_slice(b"\r\n");
        }
        out.put_slice(format!("--{boundary}--\r\n").as_bytes());
        out.freeze()
    }

    /// Encode as `application/x-www-form-urlencoded`. Blob parts are read as
    /// UTF-8 text.
    pub fn to_urlencoded(&self) -> String {
        self.parts
            .iter()
            .map(|(name, part)| {
                let value = match part {
                    Part::Text(text) => text.clone(),
                    Part::Blob(blob) => String::from_utf8_lossy(&blob.bytes).into_owned(),
                };
                format!("{}={}", form_escape(name), form_escape(&value))
            })
            .collect::<Vec<_>>()
            .join("&")
    }
}

/// Fresh boundary for [`Multipart::encode`].
pub fn generate_boundary() -> String {
    format!("----api-core-{}", Uuid::new_v4().simple())
}

fn escape_quoted(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn form_escape(value: &str) -> String {
    utf8_percent_encode(value, FORM_URLENCODED)
        .to_string()
        .replace(' ', "+")
}
