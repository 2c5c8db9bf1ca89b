//! Client configuration: base URL, auth material and interceptor chains.
//!
//! # Design
//! `ClientConfig` is an explicit value handed to every `request` call rather
//! than process-wide state. Applications build it once at startup and reuse
//! it; the pipeline clones it per call, which is cheap because resolvers and
//! interceptor lists live behind `Arc`s. Mutating a chain therefore never
//! disturbs a request that is already running.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use crate::error::BoxError;
use crate::http::{Headers, HttpRequest, HttpResponse};
use crate::options::RequestOptions;

/// Async function computing a configuration value at call time.
pub type Resolver<T> = Arc<dyn Fn(&RequestOptions) -> BoxFuture<'static, Result<T, BoxError>> + Send + Sync>;

/// A configuration value that is either fixed or computed per request.
pub enum Resolvable<T> {
    Static(T),
    Resolver(Resolver<T>),
}

impl<T> Resolvable<T> {
    pub fn resolver<F, Fut>(resolve: F) -> Self
    where
        F: Fn(&RequestOptions) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
    {
        Resolvable::Resolver(Arc::new(move |options| resolve(options).boxed()))
    }
}

impl<T: Clone> Resolvable<T> {
    pub async fn resolve(&self, options: &RequestOptions) -> Result<T, BoxError> {
        match self {
            Resolvable::Static(value) => Ok(value.clone()),
            Resolvable::Resolver(resolve) => resolve(options).await,
        }
    }
}

impl<T: Clone> Clone for Resolvable<T> {
    fn clone(&self) -> Self {
        match self {
            Resolvable::Static(value) => Resolvable::Static(value.clone()),
            Resolvable::Resolver(resolve) => Resolvable::Resolver(Arc::clone(resolve)),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Resolvable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolvable::Static(value) => f.debug_tuple("Static").field(value).finish(),
            Resolvable::Resolver(_) => f.write_str("Resolver(<fn>)"),
        }
    }
}

impl<T> From<T> for Resolvable<T> {
    fn from(value: T) -> Self {
        Resolvable::Static(value)
    }
}

impl From<&str> for Resolvable<String> {
    fn from(value: &str) -> Self {
        Resolvable::Static(value.to_string())
    }
}

/// Resolve an optional configuration value for `options`.
pub async fn resolve<T: Clone>(
    options: &RequestOptions,
    resolvable: Option<&Resolvable<T>>,
) -> Result<Option<T>, BoxError> {
    match resolvable {
        Some(resolvable) => resolvable.resolve(options).await.map(Some),
        None => Ok(None),
    }
}

/// An interceptor: receives a request or response and returns the value to
/// continue with.
pub type Middleware<T> = Arc<dyn Fn(T) -> BoxFuture<'static, Result<T, BoxError>> + Send + Sync>;

/// Wrap an async closure as a [`Middleware`].
///
/// Keep the returned `Arc` to [`eject`](Interceptors::eject) it later.
pub fn middleware<T, F, Fut>(intercept: F) -> Middleware<T>
where
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
{
    Arc::new(move |value| intercept(value).boxed())
}

/// Ordered interceptor chain. Every mutation swaps in a new list.
pub struct Interceptors<T> {
    fns: Arc<[Middleware<T>]>,
}

impl<T> Interceptors<T> {
    pub fn new() -> Self {
        Self { fns: Arc::from(Vec::new()) }
    }

    /// Append `middleware` to the chain.
    pub fn register(&mut self, middleware: Middleware<T>) {
        let mut fns = self.fns.to_vec();
        fns.push(middleware);
        self.fns = fns.into();
    }

    /// Remove the first registration of this exact `middleware`.
    pub fn eject(&mut self, middleware: &Middleware<T>) {
        if let Some(index) = self.fns.iter().position(|f| Arc::ptr_eq(f, middleware)) {
            let mut fns = self.fns.to_vec();
            fns.remove(index);
            self.fns = fns.into();
        }
    }

    pub fn len(&self) -> usize {
        self.fns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fns.is_empty()
    }

    /// Run `value` through every interceptor in registration order.
    pub async fn apply(&self, mut value: T) -> Result<T, BoxError> {
        let fns = Arc::clone(&self.fns);
        for intercept in fns.iter() {
            value = intercept(value).await?;
        }
        Ok(value)
    }
}

impl<T> Default for Interceptors<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Interceptors<T> {
    fn clone(&self) -> Self {
        Self {
            fns: Arc::clone(&self.fns),
        }
    }
}

impl<T> fmt::Debug for Interceptors<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interceptors").field("len", &self.fns.len()).finish()
    }
}

/// The request-stage and response-stage chains.
#[derive(Debug, Clone, Default)]
pub struct InterceptorChains {
    pub request: Interceptors<HttpRequest>,
    pub response: Interceptors<HttpResponse>,
}

/// Credentials mode advertised to the transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Credentials {
    #[default]
    Include,
    Omit,
    SameOrigin,
}

impl Credentials {
    pub fn as_str(&self) -> &'static str {
        match self {
            Credentials::Include => "include",
            Credentials::Omit => "omit",
            Credentials::SameOrigin => "same-origin",
        }
    }
}

/// Encodes substituted path parameter values.
pub type PathEncoder = Arc<dyn Fn(&str) -> String + Send + Sync>;

pub const DEFAULT_VERSION: &str = "0.1.0";

/// Settings shared by every request of one API client.
#[derive(Clone)]
pub struct ClientConfig {
    /// Prepended to every URL template.
    pub base: String,
    pub credentials: Credentials,
    /// Defaults to URI encoding when unset.
    pub encode_path: Option<PathEncoder>,
    pub headers: Option<Resolvable<Headers>>,
    pub username: Option<Resolvable<String>>,
    pub password: Option<Resolvable<String>>,
    pub token: Option<Resolvable<String>>,
    /// Substituted for `{api-version}` in URL templates.
    pub version: String,
    pub with_credentials: bool,
    pub interceptors: InterceptorChains,
}

impl ClientConfig {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            ..Self::default()
        }
    }

    /// Build a config from `API_URL` (base) and `API_TOKEN` (static bearer
    /// token). Unset variables leave the defaults in place.
    pub fn from_env() -> Self {
        let mut config = Self::new(std::env::var("API_URL").unwrap_or_default());
        if let Ok(token) = std::env::var("API_TOKEN") {
            config.token = Some(Resolvable::Static(token));
        }
        config
    }

    pub fn with_token(mut self, token: impl Into<Resolvable<String>>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_basic_auth(
        mut self,
        username: impl Into<Resolvable<String>>,
        password: impl Into<Resolvable<String>>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_headers(mut self, headers: impl Into<Resolvable<Headers>>) -> Self {
        self.headers = Some(headers.into());
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_path_encoder<F>(mut self, encode: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.encode_path = Some(Arc::new(encode));
        self
    }

    pub fn send_credentials(mut self, with_credentials: bool) -> Self {
        self.with_credentials = with_credentials;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base: String::new(),
            credentials: Credentials::default(),
            encode_path: None,
            headers: None,
            username: None,
            password: None,
            token: None,
            version: DEFAULT_VERSION.to_string(),
            with_credentials: false,
            interceptors: InterceptorChains::default(),
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base", &self.base)
            .field("credentials", &self.credentials)
            .field("encode_path", &self.encode_path.as_ref().map(|_| "<fn>"))
            .field("headers", &self.headers)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("version", &self.version)
            .field("with_credentials", &self.with_credentials)
            .field("interceptors", &self.interceptors)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpMethod;
    use std::sync::Mutex;

    fn tagging(log: Arc<Mutex<Vec<&'static str>>>, tag: &'static str) -> Middleware<Vec<&'static str>> {
        middleware(move |mut trail: Vec<&'static str>| {
            let log = Arc::clone(&log);
            async move {
                log.lock().unwrap().push(tag);
                trail.push(tag);
                Ok(trail)
            }
        })
    }

    #[tokio::test]
    async fn chain_runs_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut chain = Interceptors::new();
        chain.register(tagging(Arc::clone(&log), "f1"));
        chain.register(tagging(Arc::clone(&log), "f2"));

        let trail = chain.apply(Vec::new()).await.unwrap();
        assert_eq!(trail, vec!["f1", "f2"]);
        assert_eq!(*log.lock().unwrap(), vec!["f1", "f2"]);
    }

    #[tokio::test]
    async fn eject_removes_only_the_matching_registration() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let f1 = tagging(Arc::clone(&log), "f1");
        let f2 = tagging(Arc::clone(&log), "f2");
        let mut chain = Interceptors::new();
        chain.register(Arc::clone(&f1));
        chain.register(Arc::clone(&f2));
        chain.register(Arc::clone(&f1));

        chain.eject(&f1);
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.apply(Vec::new()).await.unwrap(), vec!["f2", "f1"]);

        let stranger = tagging(log, "f3");
        chain.eject(&stranger);
        assert_eq!(chain.len(), 2);
    }

    #[tokio::test]
    async fn snapshot_is_unaffected_by_later_registration() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut chain = Interceptors::new();
        chain.register(tagging(Arc::clone(&log), "f1"));
        let snapshot = chain.clone();
        chain.register(tagging(log, "f2"));

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.apply(Vec::new()).await.unwrap(), vec!["f1"]);
    }

    #[tokio::test]
    async fn failing_interceptor_stops_the_chain() {
        let mut chain: Interceptors<u32> = Interceptors::new();
        chain.register(middleware(|_| async { Err::<u32, BoxError>("denied".into()) }));
        chain.register(middleware(|value| async move { Ok(value + 1) }));
        let err = chain.apply(1).await.unwrap_err();
        assert_eq!(err.to_string(), "denied");
    }

    #[tokio::test]
    async fn resolvable_uses_static_value_or_resolver() {
        let options = RequestOptions::new(HttpMethod::Get, "/api/v1/users/me");
        let fixed: Resolvable<String> = "abc".into();
        assert_eq!(fixed.resolve(&options).await.unwrap(), "abc");

        let dynamic = Resolvable::resolver(|options: &RequestOptions| {
            let url = options.url.clone();
            async move { Ok(format!("token-for-{url}")) }
        });
        assert_eq!(dynamic.resolve(&options).await.unwrap(), "token-for-/api/v1/users/me");

        assert_eq!(resolve::<String>(&options, None).await.unwrap(), None);
    }

    #[test]
    fn defaults_match_generated_client() {
        let config = ClientConfig::default();
        assert_eq!(config.base, "");
        assert_eq!(config.version, "0.1.0");
        assert_eq!(config.credentials, Credentials::Include);
        assert!(!config.with_credentials);
        assert!(config.interceptors.request.is_empty());
        assert!(config.interceptors.response.is_empty());
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let config = ClientConfig::new("http://localhost:8000").with_token("s3cret");
        let rendered = format!("{config:?}");
        assert!(rendered.contains("http://localhost:8000"));
        assert!(!rendered.contains("s3cret"));
    }
}
