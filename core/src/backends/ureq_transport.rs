//! Ureq-based transport (blocking).
//!
//! Each exchange runs on tokio's blocking pool so the calling task stays
//! free. An abort resolves the send immediately; the blocking call itself
//! runs to completion or timeout in the background and its result is
//! discarded.

use std::io::Read as _;
use std::time::Duration;

use crate::body::{generate_boundary, Body, Multipart};
use crate::error::TransportError;
use crate::http::{decode_body, HttpRequest, HttpResponse, Transport};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A [`Transport`] backed by [`ureq`].
#[derive(Debug, Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            // Error statuses are classified by the request pipeline.
            .http_status_as_error(false)
            .build()
            .new_agent();
        Self { agent }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl Transport for UreqTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        if request.signal.is_aborted() {
            return Err(TransportError::new("Request aborted"));
        }

        let signal = request.signal.clone();
        let agent = self.agent.clone();
        let exchange = tokio::task::spawn_blocking(move || run(&agent, request));

        tokio::select! {
            biased;
            _ = signal.aborted() => Err(TransportError::new("Request aborted")),
            joined = exchange => match joined {
                Ok(outcome) => outcome,
                Err(err) => Err(TransportError::with_source("transport task failed", err)),
            },
        }
    }
}

fn run(agent: &ureq::Agent, request: HttpRequest) -> Result<HttpResponse, TransportError> {
    let method = http::Method::from_bytes(request.method.as_str().as_bytes())
        .map_err(|e| TransportError::with_source("invalid method", e))?;
    let mut headers = request.headers;
    let payload = request.body.map(|body| encode_body(body, &mut headers));

    let mut builder = http::Request::builder().method(method).uri(&request.url);
    for (name, value) in &headers {
        builder = builder.header(name, value);
    }

    let result = match payload {
        Some(bytes) => {
            let req = builder
                .body(bytes)
                .map_err(|e| TransportError::with_source("invalid request", e))?;
            agent.run(req)
        }
        None => {
            let req = builder
                .body(())
                .map_err(|e| TransportError::with_source("invalid request", e))?;
            agent.run(req)
        }
    };

    match result {
        Ok(response) => convert_response(response),
        Err(ureq::Error::Timeout(_)) => Err(TransportError::new("request timed out")),
        Err(ureq::Error::HostNotFound) => Err(TransportError::new("host not found")),
        Err(ureq::Error::Io(e)) => Err(TransportError::with_source("connection failed", e)),
        Err(e) => Err(TransportError::with_source("request failed", e)),
    }
}

/// Serialize `body`, filling in `Content-Type` where only the encoding
/// knows it.
fn encode_body(body: Body, headers: &mut crate::http::Headers) -> Vec<u8> {
    let content_type = crate::http::header_value(headers, "Content-Type").map(str::to_string);
    match body {
        Body::Json(value) => value.to_string().into_bytes(),
        Body::Text(text) => text.into_bytes(),
        Body::Blob(blob) => {
            if content_type.is_none() {
                if let Some(mime) = blob.mime {
                    headers.insert("Content-Type".to_string(), mime);
                }
            }
            blob.bytes.to_vec()
        }
        Body::Multipart(form) => encode_form(&form, content_type.as_deref(), headers),
    }
}

fn encode_form(form: &Multipart, content_type: Option<&str>, headers: &mut crate::http::Headers) -> Vec<u8> {
    if content_type.is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded")) {
        return form.to_urlencoded().into_bytes();
    }
    let boundary = generate_boundary();
    headers.retain(|name, _| !name.eq_ignore_ascii_case("Content-Type"));
    headers.insert("Content-Type".to_string(), Multipart::content_type(&boundary));
    form.encode(&boundary).to_vec()
}

fn convert_response(response: http::Response<ureq::Body>) -> Result<HttpResponse, TransportError> {
    let (parts, body) = response.into_parts();

    let mut bytes = Vec::new();
    body.into_reader()
        .read_to_end(&mut bytes)
        .map_err(|e| TransportError::with_source("failed to read response body", e))?;

    let headers = parts
        .headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect();

    Ok(HttpResponse {
        status: parts.status.as_u16(),
        status_text: parts.status.canonical_reason().unwrap_or_default().to_string(),
        headers,
        data: decode_body(&bytes),
    })
}
