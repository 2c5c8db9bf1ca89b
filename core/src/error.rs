//! Error types for the request core.
//!
//! # Design
//! A request can fail in three caller-visible ways: it was cancelled, the
//! server answered with a status the classifier rejects (`ApiError`), or the
//! transport gave up without producing any response (`TransportError`). The
//! last kind is handed through untouched so callers see the transport's own
//! diagnosis. Everything else that can go wrong inside the pipeline (a
//! resolver, an interceptor, a transformer, payload decoding) gets its own
//! variant on the crate-level `Error`.

use serde_json::Value;
use thiserror::Error;

use crate::http::HttpResponse;
use crate::options::RequestOptions;
use crate::result::ApiResult;

/// Boxed error returned by user-supplied resolvers, interceptors, transformers
/// and cancel handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A response the classifier rejected.
///
/// Only the pipeline builds these, always from the `ApiResult` of a finished
/// exchange together with the options that produced it.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ApiError {
    pub message: String,
    /// Final URL, including substituted path parameters and query string.
    pub url: String,
    pub status: u16,
    pub status_text: String,
    /// Raw (untransformed) body, or the requested response header value.
    pub body: Option<Value>,
    pub request: RequestOptions,
}

impl ApiError {
    pub(crate) fn new(request: &RequestOptions, result: &ApiResult, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            url: result.url.clone(),
            status: result.status,
            status_text: result.status_text.clone(),
            body: result.body.clone(),
            request: request.clone(),
        }
    }
}

/// Rejection reason of an operation that was cancelled before it settled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct CancelError(String);

impl CancelError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    /// Always true; lets callers holding only this type test for cancellation.
    pub fn is_cancelled(&self) -> bool {
        true
    }
}

impl Default for CancelError {
    fn default() -> Self {
        Self::new("Request aborted")
    }
}

/// Failure reported by a [`Transport`](crate::http::Transport).
///
/// Transports that treat non-2xx statuses as errors attach the response; the
/// pipeline then classifies that response like any other. Without a response
/// the error reaches the caller as-is.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct TransportError {
    message: String,
    source: Option<BoxError>,
    response: Option<HttpResponse>,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
            response: None,
        }
    }

    pub fn with_source(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
            response: None,
        }
    }

    /// Attach the response that came back alongside the failure.
    pub fn with_response(mut self, response: HttpResponse) -> Self {
        self.response = Some(response);
        self
    }

    pub fn response(&self) -> Option<&HttpResponse> {
        self.response.as_ref()
    }

    /// Take the attached response, or give the error back if there is none.
    pub fn into_response(mut self) -> Result<HttpResponse, Self> {
        match self.response.take() {
            Some(response) => Ok(response),
            None => Err(self),
        }
    }
}

/// Every way a request operation can be rejected.
#[derive(Debug, Error)]
pub enum Error {
    /// The response status was classified as a failure.
    #[error(transparent)]
    Api(Box<ApiError>),

    #[error(transparent)]
    Cancelled(#[from] CancelError),

    /// The transport failed without producing a response.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A header, token or credential resolver failed.
    #[error("failed to resolve request configuration: {0}")]
    Resolve(#[source] BoxError),

    #[error("interceptor failed: {0}")]
    Interceptor(#[source] BoxError),

    #[error("response transformer failed: {0}")]
    Transform(#[source] BoxError),

    /// A payload could not be encoded to or decoded from JSON.
    #[error("JSON conversion failed: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled(_))
    }

    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            Error::Api(err) => Some(err),
            _ => None,
        }
    }

    /// HTTP status of a classified failure.
    pub fn status(&self) -> Option<u16> {
        self.api_error().map(|err| err.status)
    }
}

impl From<ApiError> for Error {
    fn from(err: ApiError) -> Self {
        Error::Api(Box::new(err))
    }
}
