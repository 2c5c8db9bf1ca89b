//! The request pipeline.
//!
//! # Design
//! `request` turns `RequestOptions` plus a `ClientConfig` into a settled
//! `Cancelable`. The steps are plain functions so each can be tested alone:
//!
//! 1. `get_url`: substitute the URL template, prepend the base, append the
//!    query string.
//! 2. `get_form_data` / `get_request_body`: pick the payload.
//! 3. `get_headers`: resolve dynamic config concurrently, merge, add auth and
//!    the derived `Content-Type`.
//! 4. `send_request`: run request interceptors and the transport, wired to
//!    the operation's cancellation.
//! 5. Response interceptors, body/header extraction, optional transform.
//! 6. `catch_error_codes`: classify the outcome.

use std::sync::{Arc, LazyLock};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use futures_util::future::try_join4;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use regex::{Captures, Regex};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::body::{Body, Multipart};
use crate::cancelable::{Cancelable, OnCancel};
use crate::config::{resolve, ClientConfig};
use crate::error::{ApiError, Error};
use crate::http::{AbortController, Headers, HttpRequest, HttpResponse, Transport};
use crate::options::{FormValue, Param, RequestOptions};
use crate::result::ApiResult;

/// Bytes `encodeURIComponent` leaves alone.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Query keys additionally keep the brackets of nested `parent[child]` keys.
const QUERY_KEY: &AsciiSet = &URI_COMPONENT.remove(b'[').remove(b']');

/// Bytes `encodeURI` leaves alone.
const URI: &AsciiSet = &URI_COMPONENT
    .remove(b';')
    .remove(b',')
    .remove(b'/')
    .remove(b'?')
    .remove(b':')
    .remove(b'@')
    .remove(b'&')
    .remove(b'=')
    .remove(b'+')
    .remove(b'$')
    .remove(b'#');

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(.*?)\}").expect("placeholder pattern is valid"));

pub fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

pub fn base64(value: &str) -> String {
    STANDARD.encode(value)
}

pub fn encode_uri(value: &str) -> String {
    utf8_percent_encode(value, URI).to_string()
}

pub fn encode_uri_component(value: &str) -> String {
    utf8_percent_encode(value, URI_COMPONENT).to_string()
}

/// Build `?key=value&...` from query parameters.
///
/// Nulls are dropped, date-times render as ISO-8601, lists repeat the key,
/// maps expand to `parent[child]`. Returns `""` when nothing remains.
pub fn get_query_string(params: &[(String, Param)]) -> String {
    fn append(qs: &mut Vec<String>, key: &str, value: &str) {
        qs.push(format!(
            "{}={}",
            utf8_percent_encode(key, QUERY_KEY),
            encode_uri_component(value)
        ));
    }

    fn encode_pair(qs: &mut Vec<String>, key: &str, value: &Param) {
        match value {
            Param::Null => {}
            Param::List(items) => {
                for item in items {
                    encode_pair(qs, key, item);
                }
            }
            Param::Map(entries) => {
                for (child, item) in entries {
                    encode_pair(qs, &format!("{key}[{child}]"), item);
                }
            }
            leaf => append(qs, key, &leaf.to_plain_string()),
        }
    }

    let mut qs = Vec::new();
    for (key, value) in params {
        encode_pair(&mut qs, key, value);
    }
    if qs.is_empty() {
        String::new()
    } else {
        format!("?{}", qs.join("&"))
    }
}

/// Resolve the final URL for `options`.
///
/// Unmatched `{placeholders}` are left as they are.
pub fn get_url(config: &ClientConfig, options: &RequestOptions) -> String {
    let template = options.url.replacen("{api-version}", &config.version, 1);
    let path = PLACEHOLDER.replace_all(&template, |caps: &Captures<'_>| {
        match options.path_value(&caps[1]) {
            Some(value) => {
                let raw = value.to_plain_string();
                match &config.encode_path {
                    Some(encode) => encode(&raw),
                    None => encode_uri(&raw),
                }
            }
            None => caps[0].to_string(),
        }
    });
    format!("{}{}{}", config.base, path, get_query_string(&options.query))
}

/// Build the multipart payload from `options.form_data`, if any.
pub fn get_form_data(options: &RequestOptions) -> Option<Multipart> {
    fn process(form: &mut Multipart, key: &str, value: &FormValue) {
        match value {
            FormValue::Text(text) => form.append_text(key, text.clone()),
            FormValue::Blob(blob) => form.append_blob(key, blob.clone()),
            FormValue::Json(Value::String(text)) => form.append_text(key, text.clone()),
            other => form.append_text(key, other.to_json().to_string()),
        }
    }

    let fields = options.form_data.as_ref()?;
    let mut form = Multipart::new();
    for (key, value) in fields {
        match value {
            FormValue::Json(Value::Null) => {}
            FormValue::Json(Value::Array(items)) => {
                for item in items {
                    process(&mut form, key, &FormValue::Json(item.clone()));
                }
            }
            FormValue::List(items) => {
                for item in items {
                    process(&mut form, key, item);
                }
            }
            single => process(&mut form, key, single),
        }
    }
    Some(form)
}

pub fn get_request_body(options: &RequestOptions) -> Option<Body> {
    options.body.clone()
}

/// Resolve and merge the outbound headers.
///
/// Precedence, lowest first: `Accept: application/json`, config headers,
/// cookies, explicit option headers. A non-empty token then sets bearer
/// auth; otherwise a non-empty username and password set basic auth.
pub async fn get_headers(config: &ClientConfig, options: &RequestOptions) -> Result<Headers, Error> {
    let (token, username, password, additional) = try_join4(
        resolve(options, config.token.as_ref()),
        resolve(options, config.username.as_ref()),
        resolve(options, config.password.as_ref()),
        resolve(options, config.headers.as_ref()),
    )
    .await
    .map_err(Error::Resolve)?;

    let mut headers = Headers::new();
    headers.insert("Accept".to_string(), "application/json".to_string());
    if let Some(additional) = additional {
        headers.extend(additional);
    }

    let cookie = options
        .cookies
        .iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join("; ");
    if !cookie.is_empty() {
        headers.insert("Cookie".to_string(), cookie);
    }

    for (name, value) in &options.headers {
        if value.is_null() {
            headers.remove(name);
        } else {
            headers.insert(name.clone(), value.to_plain_string());
        }
    }

    let non_empty = |value: &Option<String>| value.as_deref().is_some_and(|v| !v.is_empty());
    if non_empty(&token) {
        headers.insert(
            "Authorization".to_string(),
            format!("Bearer {}", token.unwrap_or_default()),
        );
    } else if non_empty(&username) && non_empty(&password) {
        let credentials = base64(&format!(
            "{}:{}",
            username.unwrap_or_default(),
            password.unwrap_or_default()
        ));
        headers.insert("Authorization".to_string(), format!("Basic {credentials}"));
    }

    if let Some(content_type) = content_type(options) {
        headers.insert("Content-Type".to_string(), content_type);
    }

    Ok(headers)
}

fn content_type(options: &RequestOptions) -> Option<String> {
    match &options.body {
        Some(body) => {
            if let Some(media_type) = &options.media_type {
                return Some(media_type.clone());
            }
            match body {
                Body::Blob(blob) => Some(
                    blob.mime
                        .clone()
                        .filter(|mime| !mime.is_empty())
                        .unwrap_or_else(|| "application/octet-stream".to_string()),
                ),
                Body::Text(_) => Some("text/plain".to_string()),
                Body::Json(_) => Some("application/json".to_string()),
                Body::Multipart(_) => None,
            }
        }
        None if options.form_data.is_some() => options.media_type.clone(),
        None => None,
    }
}

/// Run request interceptors and the transport.
///
/// Registers a cancel handler that aborts the in-flight call. A transport
/// failure that still carries a response yields that response.
#[allow(clippy::too_many_arguments)]
pub async fn send_request<T, C>(
    config: &ClientConfig,
    options: &RequestOptions,
    url: &str,
    body: Option<Body>,
    form_data: Option<Multipart>,
    headers: Headers,
    on_cancel: &OnCancel<T>,
    transport: &C,
) -> Result<HttpResponse, Error>
where
    C: Transport,
{
    let controller = AbortController::new();
    let mut request = HttpRequest {
        method: options.method,
        url: url.to_string(),
        headers,
        body: body.or(form_data.map(Body::Multipart)),
        signal: controller.signal(),
        with_credentials: config.with_credentials,
    };

    on_cancel.register(move || {
        controller.abort();
        Ok(())
    });

    request = config
        .interceptors
        .request
        .apply(request)
        .await
        .map_err(Error::Interceptor)?;

    tracing::debug!(method = %request.method, url = %request.url, "sending request");
    match transport.send(request).await {
        Ok(response) => Ok(response),
        Err(err) => err.into_response().map_err(Error::Transport),
    }
}

/// Value of the response header named `name`, if requested and present.
pub fn get_response_header(response: &HttpResponse, name: Option<&str>) -> Option<String> {
    name.and_then(|name| response.header(name)).map(str::to_string)
}

/// Response body, absent for `204 No Content`.
pub fn get_response_body(response: &HttpResponse) -> Option<Value> {
    (response.status != 204).then(|| response.data.clone())
}

/// Message for statuses the client reports as errors by default.
pub fn default_error_message(status: u16) -> Option<&'static str> {
    let message = match status {
        400 => "Bad Request",
        401 => "Unauthorized",
        402 => "Payment Required",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        406 => "Not Acceptable",
        407 => "Proxy Authentication Required",
        408 => "Request Timeout",
        409 => "Conflict",
        410 => "Gone",
        411 => "Length Required",
        412 => "Precondition Failed",
        413 => "Payload Too Large",
        414 => "URI Too Long",
        415 => "Unsupported Media Type",
        416 => "Range Not Satisfiable",
        417 => "Expectation Failed",
        418 => "Im a teapot",
        421 => "Misdirected Request",
        422 => "Unprocessable Content",
        423 => "Locked",
        424 => "Failed Dependency",
        425 => "Too Early",
        426 => "Upgrade Required",
        428 => "Precondition Required",
        429 => "Too Many Requests",
        431 => "Request Header Fields Too Large",
        451 => "Unavailable For Legal Reasons",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        505 => "HTTP Version Not Supported",
        506 => "Variant Also Negotiates",
        507 => "Insufficient Storage",
        508 => "Loop Detected",
        510 => "Not Extended",
        511 => "Network Authentication Required",
        _ => return None,
    };
    Some(message)
}

/// Classify a finished exchange.
///
/// The status table (defaults merged with `options.errors`) is consulted
/// before `ok`, so a per-request entry for a 2xx status still fails. An
/// empty message disables the entry.
pub fn catch_error_codes(options: &RequestOptions, result: &ApiResult) -> Result<(), ApiError> {
    let mapped = match options.errors.get(&result.status) {
        Some(message) => Some(message.as_str()),
        None => default_error_message(result.status),
    };
    if let Some(message) = mapped.filter(|message| !message.is_empty()) {
        return Err(ApiError::new(options, result, message));
    }

    if !result.ok {
        let body = result
            .body
            .as_ref()
            .and_then(|body| serde_json::to_string_pretty(body).ok())
            .unwrap_or_else(|| "undefined".to_string());
        let status_text = if result.status_text.is_empty() {
            "unknown"
        } else {
            result.status_text.as_str()
        };
        return Err(ApiError::new(
            options,
            result,
            format!(
                "Generic Error: status: {}; status text: {}; body: {}",
                result.status, status_text, body
            ),
        ));
    }

    Ok(())
}

/// Issue one request.
///
/// Resolves with the payload decoded into `T`; use `Option<Value>` to get
/// the raw payload (`None` for `204 No Content`). Rejects with
/// [`Error::Api`] for classified failures, [`Error::Cancelled`] when
/// cancelled, and [`Error::Transport`] when the transport produced no
/// response.
pub fn request<T, C>(config: &ClientConfig, options: RequestOptions, transport: Arc<C>) -> Cancelable<T>
where
    T: DeserializeOwned + Send + 'static,
    C: Transport + 'static,
{
    let config = config.clone();
    Cancelable::new(move |on_cancel| async move {
        match execute(&config, &options, transport.as_ref(), &on_cancel).await {
            Ok(Some(value)) => on_cancel.resolve(value),
            // Cancelled while resolving headers; cancel() already settled.
            Ok(None) => {}
            Err(err) => on_cancel.reject(err),
        }
    })
}

async fn execute<T, C>(
    config: &ClientConfig,
    options: &RequestOptions,
    transport: &C,
    on_cancel: &OnCancel<T>,
) -> Result<Option<T>, Error>
where
    T: DeserializeOwned,
    C: Transport,
{
    let url = get_url(config, options);
    let form_data = get_form_data(options);
    let body = get_request_body(options);
    let headers = get_headers(config, options).await?;

    if on_cancel.is_cancelled() {
        return Ok(None);
    }

    let response = send_request(config, options, &url, body, form_data, headers, on_cancel, transport).await?;
    let response = config
        .interceptors
        .response
        .apply(response)
        .await
        .map_err(Error::Interceptor)?;

    let ok = is_success(response.status);
    let response_header = get_response_header(&response, options.response_header.as_deref());
    let mut body = get_response_body(&response);
    if ok {
        if let Some(transform) = &options.response_transformer {
            let raw = body.take().unwrap_or(Value::Null);
            body = Some(transform(raw).await.map_err(Error::Transform)?);
        }
    }

    let result = ApiResult {
        url,
        ok,
        status: response.status,
        status_text: response.status_text,
        body: response_header.map(Value::String).or(body),
    };
    tracing::debug!(status = result.status, url = %result.url, "received response");

    catch_error_codes(options, &result)?;

    let payload = result.body.unwrap_or(Value::Null);
    Ok(Some(serde_json::from_value(payload)?))
}
