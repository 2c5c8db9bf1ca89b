//! Per-call request description.
//!
//! # Design
//! `RequestOptions` is declarative: it names the URL template, parameters,
//! headers and body of one call and is consumed by `request::request`.
//! Parameter values are `Param`, a small tagged value that covers what URL
//! templates and query strings need (including date-times) without forcing
//! callers through `serde_json::Value`.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde_json::{Number, Value};
use uuid::Uuid;

use crate::body::{Blob, Body};
use crate::error::BoxError;
use crate::http::HttpMethod;

/// A path, query, header or cookie parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    DateTime(DateTime<Utc>),
    List(Vec<Param>),
    /// Ordered key/value pairs; expands to `parent[child]` in query strings.
    Map(Vec<(String, Param)>),
}

impl Param {
    pub fn is_null(&self) -> bool {
        matches!(self, Param::Null)
    }

    /// Plain string form used for path segments, header values and leaf
    /// query values. Lists join with commas; maps have no useful text form.
    pub fn to_plain_string(&self) -> String {
        match self {
            Param::Null => "null".to_string(),
            Param::Bool(value) => value.to_string(),
            Param::Number(value) => value.to_string(),
            Param::String(value) => value.clone(),
            Param::DateTime(value) => value.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            Param::List(items) => items
                .iter()
                .map(|item| if item.is_null() { String::new() } else { item.to_plain_string() })
                .collect::<Vec<_>>()
                .join(","),
            Param::Map(_) => "[object Object]".to_string(),
        }
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_plain_string())
    }
}

impl From<&str> for Param {
    fn from(value: &str) -> Self {
        Param::String(value.to_string())
    }
}

impl From<String> for Param {
    fn from(value: String) -> Self {
        Param::String(value)
    }
}

impl From<bool> for Param {
    fn from(value: bool) -> Self {
        Param::Bool(value)
    }
}

macro_rules! param_from_integer {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Param {
            fn from(value: $ty) -> Self {
                Param::Number(Number::from(value))
            }
        })*
    };
}

param_from_integer!(i32, i64, u16, u32, u64, usize);

impl From<f64> for Param {
    fn from(value: f64) -> Self {
        Number::from_f64(value).map_or(Param::Null, Param::Number)
    }
}

impl From<DateTime<Utc>> for Param {
    fn from(value: DateTime<Utc>) -> Self {
        Param::DateTime(value)
    }
}

impl From<Uuid> for Param {
    fn from(value: Uuid) -> Self {
        Param::String(value.to_string())
    }
}

impl<T: Into<Param>> From<Option<T>> for Param {
    fn from(value: Option<T>) -> Self {
        value.map_or(Param::Null, Into::into)
    }
}

impl<T: Into<Param>> From<Vec<T>> for Param {
    fn from(items: Vec<T>) -> Self {
        Param::List(items.into_iter().map(Into::into).collect())
    }
}

impl From<Value> for Param {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Param::Null,
            Value::Bool(value) => Param::Bool(value),
            Value::Number(value) => Param::Number(value),
            Value::String(value) => Param::String(value),
            Value::Array(items) => Param::List(items.into_iter().map(Param::from).collect()),
            Value::Object(entries) => {
                Param::Map(entries.into_iter().map(|(key, value)| (key, Param::from(value))).collect())
            }
        }
    }
}

/// A multipart form field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FormValue {
    /// Appended as-is.
    Text(String),
    /// Appended as a file part.
    Blob(Blob),
    /// Strings are appended as-is, `null` drops the field, arrays add one
    /// part per element, anything else is JSON-stringified.
    Json(Value),
    /// One part per element.
    List(Vec<FormValue>),
}

impl FormValue {
    pub(crate) fn to_json(&self) -> Value {
        match self {
            FormValue::Text(text) => Value::String(text.clone()),
            FormValue::Blob(_) => Value::Object(Default::default()),
            FormValue::Json(value) => value.clone(),
            FormValue::List(items) => Value::Array(items.iter().map(FormValue::to_json).collect()),
        }
    }
}

impl From<&str> for FormValue {
    fn from(value: &str) -> Self {
        FormValue::Text(value.to_string())
    }
}

impl From<String> for FormValue {
    fn from(value: String) -> Self {
        FormValue::Text(value)
    }
}

impl From<Blob> for FormValue {
    fn from(value: Blob) -> Self {
        FormValue::Blob(value)
    }
}

impl From<Value> for FormValue {
    fn from(value: Value) -> Self {
        FormValue::Json(value)
    }
}

impl From<Vec<FormValue>> for FormValue {
    fn from(items: Vec<FormValue>) -> Self {
        FormValue::List(items)
    }
}

/// Async transform applied to a successful response body.
pub type ResponseTransformer = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value, BoxError>> + Send + Sync>;

/// Declarative description of one HTTP call.
///
/// Set at most one of `body` and `form_data`.
#[derive(Clone, Default)]
pub struct RequestOptions {
    pub method: HttpMethod,
    /// URL template relative to the configured base, e.g. `/api/v1/items/{id}`.
    /// `{api-version}` is replaced with the configured version.
    pub url: String,
    pub path: Vec<(String, Param)>,
    pub query: Vec<(String, Param)>,
    pub headers: Vec<(String, Param)>,
    pub cookies: Vec<(String, Param)>,
    pub body: Option<Body>,
    pub form_data: Option<Vec<(String, FormValue)>>,
    pub media_type: Option<String>,
    /// Per-request status messages; override and extend the default table.
    pub errors: BTreeMap<u16, String>,
    /// When set, resolve with this response header instead of the body.
    pub response_header: Option<String>,
    pub response_transformer: Option<ResponseTransformer>,
}

impl RequestOptions {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn path_param(mut self, name: impl Into<String>, value: impl Into<Param>) -> Self {
        self.path.push((name.into(), value.into()));
        self
    }

    pub fn query_param(mut self, name: impl Into<String>, value: impl Into<Param>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<Param>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn cookie(mut self, name: impl Into<String>, value: impl Into<Param>) -> Self {
        self.cookies.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn form_field(mut self, name: impl Into<String>, value: impl Into<FormValue>) -> Self {
        self.form_data
            .get_or_insert_with(Vec::new)
            .push((name.into(), value.into()));
        self
    }

    pub fn media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }

    pub fn error(mut self, status: u16, message: impl Into<String>) -> Self {
        self.errors.insert(status, message.into());
        self
    }

    pub fn response_header(mut self, name: impl Into<String>) -> Self {
        self.response_header = Some(name.into());
        self
    }

    pub fn response_transformer<F, Fut>(mut self, transform: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, BoxError>> + Send + 'static,
    {
        self.response_transformer = Some(Arc::new(move |value| transform(value).boxed()));
        self
    }

    /// First path parameter named `name`.
    pub fn path_value(&self, name: &str) -> Option<&Param> {
        self.path
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }
}

impl fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestOptions")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("path", &self.path)
            .field("query", &self.query)
            .field("headers", &self.headers)
            .field("cookies", &self.cookies)
            .field("body", &self.body)
            .field("form_data", &self.form_data)
            .field("media_type", &self.media_type)
            .field("errors", &self.errors)
            .field("response_header", &self.response_header)
            .field(
                "response_transformer",
                &self.response_transformer.as_ref().map(|_| "<fn>"),
            )
            .finish()
    }
}
