//! Outcome of one finished HTTP exchange, before error classification.

use serde_json::Value;

/// The classified result of a completed exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResult {
    /// Final URL, with path parameters and query string applied.
    pub url: String,
    /// `true` iff `status` is in `200..300`.
    pub ok: bool,
    pub status: u16,
    pub status_text: String,
    /// The requested response header if present, otherwise the (possibly
    /// transformed) response body. `None` for `204 No Content`.
    pub body: Option<Value>,
}
