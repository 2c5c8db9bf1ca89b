//! HTTP request core for the admin backend client.
//!
//! # Overview
//! A declarative [`RequestOptions`] plus an explicit [`ClientConfig`] go in;
//! a [`Cancelable`] future comes out. The pipeline in [`request`] resolves the
//! URL, headers and body, runs interceptors, hands the exchange to a
//! [`Transport`] and classifies the outcome into a typed payload or an
//! [`Error`].
//!
//! # Design
//! - The network sits behind the [`Transport`] trait. [`UreqTransport`] is the
//!   bundled backend; tests plug in scripted transports.
//! - Configuration is a value, not global state. Interceptor chains are
//!   copy-on-write, so registering one never races a request in flight.
//! - [`ApiClient`] layers the backend's typed endpoints on top of the
//!   pipeline. DTOs are defined independently from the mock-server crate;
//!   integration tests catch schema drift.

pub mod backends;
pub mod body;
pub mod cancelable;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod options;
pub mod request;
pub mod result;
pub mod types;

#[cfg(feature = "ureq-transport")]
pub use backends::UreqTransport;
pub use body::{Blob, Body, Multipart, Part};
pub use cancelable::{CancelHandle, Cancelable, OnCancel, State};
pub use client::ApiClient;
pub use config::{middleware, ClientConfig, Credentials, Interceptors, Middleware, Resolvable};
pub use error::{ApiError, BoxError, CancelError, Error, TransportError};
pub use http::{AbortController, AbortSignal, Headers, HttpMethod, HttpRequest, HttpResponse, Transport};
pub use options::{FormValue, Param, RequestOptions};
pub use request::request;
pub use result::ApiResult;
