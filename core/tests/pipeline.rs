//! Request pipeline behavior over scripted transports.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use api_core::{
    middleware, request, AbortSignal, BoxError, ClientConfig, Error, HttpMethod, HttpRequest, HttpResponse,
    Param, RequestOptions, State, Transport, TransportError,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Notify;

type Reply = Box<dyn Fn(&HttpRequest) -> Result<HttpResponse, TransportError> + Send + Sync>;

/// Answers every request through `reply` and remembers what it was sent.
struct Scripted {
    reply: Reply,
    seen: Mutex<Vec<HttpRequest>>,
}

impl Scripted {
    fn new(reply: impl Fn(&HttpRequest) -> Result<HttpResponse, TransportError> + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            reply: Box::new(reply),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn status(status: u16, data: Value) -> Arc<Self> {
        Self::new(move |_| Ok(response(status, data.clone())))
    }

    fn last(&self) -> HttpRequest {
        self.seen.lock().unwrap().last().cloned().expect("no request was sent")
    }

    fn count(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

impl Transport for Scripted {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let outcome = (self.reply)(&request);
        self.seen.lock().unwrap().push(request);
        outcome
    }
}

/// Never answers; exposes the abort signal it was handed.
#[derive(Default)]
struct Hanging {
    started: Notify,
    signal: Mutex<Option<AbortSignal>>,
}

impl Transport for Hanging {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        *self.signal.lock().unwrap() = Some(request.signal.clone());
        self.started.notify_one();
        std::future::pending().await
    }
}

fn response(status: u16, data: Value) -> HttpResponse {
    HttpResponse {
        status,
        status_text: String::new(),
        headers: Vec::new(),
        data,
    }
}

fn get(url: &str) -> RequestOptions {
    RequestOptions::new(HttpMethod::Get, url)
}

#[derive(Debug, Deserialize, PartialEq)]
struct Item {
    id: u32,
    title: String,
}

// --- outcomes ---

#[tokio::test]
async fn ok_response_decodes_into_the_payload_type() {
    let transport = Scripted::status(200, json!({"id": 1, "title": "Pen"}));
    let item: Item = request(&ClientConfig::default(), get("/items/1"), transport).await.unwrap();
    assert_eq!(item, Item { id: 1, title: "Pen".to_string() });
}

#[tokio::test]
async fn no_content_resolves_without_a_body() {
    let transport = Scripted::status(204, Value::String(String::new()));
    let body: Option<Value> = request(&ClientConfig::default(), get("/items/1"), transport).await.unwrap();
    assert_eq!(body, None);
}

#[tokio::test]
async fn mismatched_payload_is_a_json_error() {
    let transport = Scripted::status(200, json!({"unexpected": true}));
    let err = request::<Item, _>(&ClientConfig::default(), get("/items/1"), transport)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Json(_)));
}

#[tokio::test]
async fn not_found_uses_the_default_message() {
    let transport = Scripted::status(404, json!({"detail": "Item not found"}));
    let config = ClientConfig::new("http://api.test");
    let err = request::<Value, _>(&config, get("/items/{id}").path_param("id", 9), transport)
        .await
        .unwrap_err();

    let api = err.api_error().unwrap();
    assert_eq!(api.message, "Not Found");
    assert_eq!(api.status, 404);
    assert_eq!(api.url, "http://api.test/items/9");
    assert_eq!(api.body, Some(json!({"detail": "Item not found"})));
    assert_eq!(api.request.path_value("id"), Some(&Param::from(9)));
}

#[tokio::test]
async fn override_message_applies_even_to_success() {
    let transport = Scripted::status(200, json!([]));
    let options = get("/legacy").error(200, "Use /v2 instead");
    let err = request::<Value, _>(&ClientConfig::default(), options, transport)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Use /v2 instead");
}

#[tokio::test]
async fn transport_failure_without_response_propagates() {
    let transport = Scripted::new(|_| Err(TransportError::new("connection refused")));
    let err = request::<Value, _>(&ClientConfig::default(), get("/items/"), transport)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Transport(_)));
    assert_eq!(err.to_string(), "connection refused");
}

#[tokio::test]
async fn transport_failure_with_response_is_classified() {
    let transport = Scripted::new(|_| {
        Err(TransportError::new("status 500").with_response(response(500, json!("boom"))))
    });
    let err = request::<Value, _>(&ClientConfig::default(), get("/items/"), transport)
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(500));
    assert_eq!(err.to_string(), "Internal Server Error");
}

// --- response shaping ---

#[tokio::test]
async fn requested_response_header_replaces_the_body() {
    let transport = Scripted::new(|_| {
        let mut reply = response(201, json!({"id": 1}));
        reply.headers.push(("Location".to_string(), "/items/1".to_string()));
        Ok(reply)
    });
    let config = ClientConfig::default();

    let location: String = request(&config, get("/items/").response_header("location"), Arc::clone(&transport))
        .await
        .unwrap();
    assert_eq!(location, "/items/1");

    let body: Value = request(&config, get("/items/").response_header("etag"), transport)
        .await
        .unwrap();
    assert_eq!(body, json!({"id": 1}));
}

#[tokio::test]
async fn transformer_runs_only_on_success() {
    let wrap = |body: Value| async move { Ok::<_, BoxError>(json!({ "wrapped": body })) };
    let config = ClientConfig::default();

    let ok: Value = request(
        &config,
        get("/items/1").response_transformer(wrap),
        Scripted::status(200, json!(1)),
    )
    .await
    .unwrap();
    assert_eq!(ok, json!({"wrapped": 1}));

    let empty: Value = request(
        &config,
        get("/items/1").response_transformer(wrap),
        Scripted::status(204, Value::Null),
    )
    .await
    .unwrap();
    assert_eq!(empty, json!({"wrapped": null}));

    let err = request::<Value, _>(
        &config,
        get("/items/1").response_transformer(wrap),
        Scripted::status(404, json!({"detail": "gone"})),
    )
    .await
    .unwrap_err();
    assert_eq!(err.api_error().unwrap().body, Some(json!({"detail": "gone"})));
}

#[tokio::test]
async fn failing_transformer_rejects() {
    let options = get("/items/1").response_transformer(|_| async { Err::<Value, BoxError>("bad shape".into()) });
    let err = request::<Value, _>(&ClientConfig::default(), options, Scripted::status(200, json!(1)))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Transform(_)));
}

// --- interceptors ---

fn trail(tag: &'static str) -> api_core::Middleware<HttpRequest> {
    middleware(move |mut request: HttpRequest| async move {
        let header = request.headers.entry("X-Trail".to_string()).or_default();
        if !header.is_empty() {
            header.push(',');
        }
        header.push_str(tag);
        Ok(request)
    })
}

fn stamp(tag: &'static str) -> api_core::Middleware<HttpResponse> {
    middleware(move |mut response: HttpResponse| async move {
        if let Value::Array(steps) = &mut response.data {
            steps.push(json!(tag));
        }
        Ok(response)
    })
}

#[tokio::test]
async fn interceptors_run_in_registration_order() {
    let mut config = ClientConfig::default();
    config.interceptors.request.register(trail("f1"));
    config.interceptors.request.register(trail("f2"));
    config.interceptors.response.register(stamp("g1"));
    config.interceptors.response.register(stamp("g2"));

    let transport = Scripted::status(200, json!([]));
    let steps: Vec<String> = request(&config, get("/items/"), Arc::clone(&transport)).await.unwrap();

    assert_eq!(transport.last().headers["X-Trail"], "f1,f2");
    assert_eq!(steps, vec!["g1", "g2"]);
}

#[tokio::test]
async fn ejected_interceptor_no_longer_runs() {
    let f1 = trail("f1");
    let mut config = ClientConfig::default();
    config.interceptors.request.register(Arc::clone(&f1));
    config.interceptors.request.register(trail("f2"));
    config.interceptors.request.eject(&f1);

    let transport = Scripted::status(200, json!(null));
    request::<Value, _>(&config, get("/items/"), Arc::clone(&transport)).await.unwrap();
    assert_eq!(transport.last().headers["X-Trail"], "f2");
}

#[tokio::test]
async fn failing_interceptor_skips_the_transport() {
    let mut config = ClientConfig::default();
    config
        .interceptors
        .request
        .register(middleware(|_: HttpRequest| async { Err::<HttpRequest, BoxError>("offline mode".into()) }));

    let transport = Scripted::status(200, json!(null));
    let err = request::<Value, _>(&config, get("/items/"), Arc::clone(&transport))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Interceptor(_)));
    assert_eq!(transport.count(), 0);
}

// --- outbound request ---

#[tokio::test]
async fn token_overrides_explicit_authorization() {
    let config = ClientConfig::default().with_token("abc");
    let transport = Scripted::status(200, json!(null));
    let options = get("/users/me").header("Authorization", "Custom xyz");
    request::<Value, _>(&config, options, Arc::clone(&transport)).await.unwrap();

    let sent = transport.last();
    assert_eq!(sent.headers["Authorization"], "Bearer abc");
    assert_eq!(sent.headers["Accept"], "application/json");
}

#[tokio::test]
async fn basic_auth_without_token() {
    let config = ClientConfig::default().with_basic_auth("admin", "changethis");
    let transport = Scripted::status(200, json!(null));
    request::<Value, _>(&config, get("/users/me"), Arc::clone(&transport)).await.unwrap();
    assert_eq!(
        transport.last().headers["Authorization"],
        "Basic YWRtaW46Y2hhbmdldGhpcw=="
    );
}

#[tokio::test]
async fn url_combines_version_path_and_query() {
    let config = ClientConfig::new("https://api.test").with_version("3").send_credentials(true);
    let transport = Scripted::status(200, json!(null));
    let options = get("/api/v{api-version}/users/{id}/posts/{postId}")
        .path_param("id", 7)
        .path_param("postId", "a b")
        .query_param("a", vec![1, 2])
        .query_param("b", json!({"c": 3}))
        .query_param("gone", Param::Null);
    request::<Value, _>(&config, options, Arc::clone(&transport)).await.unwrap();

    let sent = transport.last();
    assert_eq!(sent.url, "https://api.test/api/v3/users/7/posts/a%20b?a=1&a=2&b[c]=3");
    assert_eq!(sent.method, HttpMethod::Get);
    assert!(sent.with_credentials);
}

#[tokio::test]
async fn dynamic_headers_resolve_per_request() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let config = ClientConfig::default().with_headers(api_core::Resolvable::resolver(move |_: &RequestOptions| {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        async move {
            let mut headers = api_core::Headers::new();
            headers.insert("X-Request-Number".to_string(), n.to_string());
            Ok(headers)
        }
    }));

    let transport = Scripted::status(200, json!(null));
    for _ in 0..2 {
        request::<Value, _>(&config, get("/items/"), Arc::clone(&transport)).await.unwrap();
    }
    assert_eq!(transport.last().headers["X-Request-Number"], "1");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn token_and_headers_resolve_concurrently() {
    // Each resolver waits for the other; run one after the other they would hang.
    let barrier = Arc::new(tokio::sync::Barrier::new(2));
    let for_token = Arc::clone(&barrier);
    let for_headers = Arc::clone(&barrier);
    let config = ClientConfig::default()
        .with_token(api_core::Resolvable::resolver(move |_: &RequestOptions| {
            let barrier = Arc::clone(&for_token);
            async move {
                barrier.wait().await;
                Ok("t0k".to_string())
            }
        }))
        .with_headers(api_core::Resolvable::resolver(move |_: &RequestOptions| {
            let barrier = Arc::clone(&for_headers);
            async move {
                barrier.wait().await;
                let mut headers = api_core::Headers::new();
                headers.insert("X-Trace".to_string(), "on".to_string());
                Ok(headers)
            }
        }));

    let transport = Scripted::status(200, json!(null));
    let outcome = tokio::time::timeout(
        Duration::from_secs(2),
        request::<Value, _>(&config, get("/items/"), Arc::clone(&transport)),
    )
    .await;
    assert!(outcome.expect("resolvers ran sequentially").is_ok());

    let sent = transport.last();
    assert_eq!(sent.headers["Authorization"], "Bearer t0k");
    assert_eq!(sent.headers["X-Trace"], "on");
}

#[tokio::test]
async fn failing_resolver_skips_the_transport() {
    let config = ClientConfig::default().with_token(api_core::Resolvable::resolver(|_: &RequestOptions| async {
        Err::<String, BoxError>("token store unavailable".into())
    }));
    let transport = Scripted::status(200, json!(null));
    let err = request::<Value, _>(&config, get("/items/"), Arc::clone(&transport))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Resolve(_)));
    assert_eq!(transport.count(), 0);
}

// --- cancellation ---

#[tokio::test]
async fn cancel_during_transport_aborts_the_exchange() {
    let transport = Arc::new(Hanging::default());
    let op = request::<Value, _>(&ClientConfig::default(), get("/slow"), Arc::clone(&transport));
    let handle = op.handle();
    let task = tokio::spawn(op);

    transport.started.notified().await;
    assert_eq!(handle.state(), State::Pending);
    handle.cancel();

    let err = task.await.unwrap().unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(err.to_string(), "Request aborted");
    assert!(handle.is_cancelled());
    let signal = transport.signal.lock().unwrap().clone().unwrap();
    assert!(signal.is_aborted());
}

#[tokio::test]
async fn cancel_before_first_poll_never_reaches_the_transport() {
    let transport = Scripted::status(200, json!(null));
    let op = request::<Value, _>(&ClientConfig::default(), get("/items/"), Arc::clone(&transport));
    op.cancel();
    assert!(op.await.unwrap_err().is_cancelled());
    assert_eq!(transport.count(), 0);
}
