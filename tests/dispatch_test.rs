//! Dispatch engine tests against mocked upstream deployments.
//!
//! Each `MockServer` stands for one deployment of a model; alternates are
//! separate servers.

use std::time::{Duration, Instant};

use serde_json::{Map, json};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use passerelle::{
    DispatchPolicy, Dispatcher, Message, ModelEntry, ModelRegistry, ModelTrait, PasserelleError,
    RetryPolicy, RouteKind, UpstreamBody, UpstreamClient, UpstreamRequest,
};

const CHAT_PATH: &str = "/api/openai_compat/v1/chat/completions";
const COMPLETIONS_PATH: &str = "/api/openai_compat/v1/completions";
const MODELS_PATH: &str = "/api/openai_compat/v1/models";

// ============================================================================
// Helpers
// ============================================================================

/// No probe, no pre-flight, 10ms backoff unit without jitter.
fn fast_policy() -> DispatchPolicy {
    DispatchPolicy::new()
        .auth_probe(false)
        .preflight(false)
        .retry(
            RetryPolicy::new()
                .unit(Duration::from_millis(10))
                .jitter(false),
        )
}

fn dispatcher(policy: DispatchPolicy) -> Dispatcher {
    Dispatcher::new(UpstreamClient::new("test-token").unwrap(), policy)
}

fn chat_request(messages: Vec<Message>) -> UpstreamRequest {
    UpstreamRequest {
        model: "Upstream-M".to_string(),
        body: UpstreamBody::Messages(messages),
        max_tokens: 1000,
        temperature: 0.7,
        options: Map::new(),
    }
}

fn chat_ok(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "created": 1700000000,
        "model": "Upstream-M",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }]
    })
}

async fn mount_models_ok(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(MODELS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .mount(server)
        .await;
}

// ============================================================================
// Retry
// ============================================================================

#[tokio::test]
async fn retries_transient_errors_then_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_ok("ok")))
        .expect(1)
        .mount(&server)
        .await;

    let entry = ModelEntry::new("m", "Upstream-M", server.uri());
    let d = dispatcher(fast_policy().max_attempts(3, 3));

    let start = Instant::now();
    let body = d
        .dispatch(RouteKind::Chat, &chat_request(vec![Message::user("hi")]), &entry)
        .await
        .unwrap();

    assert_eq!(body["choices"][0]["message"]["content"], "ok");
    // Backoffs: 10ms * 2^0 + 10ms * 2^1
    assert!(start.elapsed() >= Duration::from_millis(30));
}

#[tokio::test]
async fn slow_models_get_more_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let entry = ModelEntry::new("m", "Upstream-M", server.uri()).with_trait(ModelTrait::Slow);
    let d = dispatcher(fast_policy());

    let err = d
        .dispatch(RouteKind::Chat, &chat_request(vec![Message::user("hi")]), &entry)
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 503);
    assert!(err.is_transient());
}

#[tokio::test]
async fn standard_models_stop_after_two_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(ResponseTemplate::new(502))
        .expect(2)
        .mount(&server)
        .await;

    let entry = ModelEntry::new("m", "Upstream-M", server.uri());
    let err = dispatcher(fast_policy())
        .dispatch(RouteKind::Chat, &chat_request(vec![Message::user("hi")]), &entry)
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 502);
}

#[tokio::test]
async fn timeout_is_transient_and_reported_as_500() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(chat_ok("late"))
                .set_delay(Duration::from_millis(500)),
        )
        .expect(2)
        .mount(&server)
        .await;

    let entry = ModelEntry::new("m", "Upstream-M", server.uri());
    let policy = fast_policy().timeouts(Duration::from_millis(100), Duration::from_millis(100));
    let err = dispatcher(policy)
        .dispatch(RouteKind::Chat, &chat_request(vec![Message::user("hi")]), &entry)
        .await
        .unwrap_err();

    assert!(matches!(err, PasserelleError::Timeout { .. }), "{err:?}");
    assert_eq!(err.status_code(), 500);
}

/// Base URL of a local port nothing listens on.
fn refused_base_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{port}")
}

#[tokio::test]
async fn refused_connection_is_retried_then_reported_as_500() {
    let entry = ModelEntry::new("m", "Upstream-M", refused_base_url()).with_trait(ModelTrait::Slow);
    let start = Instant::now();
    let err = dispatcher(fast_policy())
        .dispatch(RouteKind::Chat, &chat_request(vec![Message::user("hi")]), &entry)
        .await
        .unwrap_err();

    assert!(matches!(err, PasserelleError::Connection { .. }), "{err:?}");
    assert!(err.is_transient());
    assert_eq!(err.status_code(), 500);
    assert_eq!(err.to_body(Some("m")).error, "transient_upstream_error");
    // Three attempts: backoffs of 10ms then 20ms.
    assert!(start.elapsed() >= Duration::from_millis(30));
}

#[tokio::test]
async fn refused_primary_falls_back_to_alternate() {
    let alternate = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_ok("alternate")))
        .expect(1)
        .mount(&alternate)
        .await;

    let entry =
        ModelEntry::new("m", "Upstream-M", refused_base_url()).with_alternate(alternate.uri());
    let start = Instant::now();
    let body = dispatcher(fast_policy())
        .dispatch(RouteKind::Chat, &chat_request(vec![Message::user("hi")]), &entry)
        .await
        .unwrap();

    assert_eq!(body["choices"][0]["message"]["content"], "alternate");
    // The primary was retried once before falling back.
    assert!(start.elapsed() >= Duration::from_millis(10));
}

// ============================================================================
// Fallback
// ============================================================================

#[tokio::test]
async fn auth_probe_failure_skips_to_alternate() {
    let primary = MockServer::start().await;
    let alternate = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(MODELS_PATH))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&primary)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_ok("primary")))
        .expect(0)
        .mount(&primary)
        .await;

    mount_models_ok(&alternate).await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .and(header("Authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_ok("alternate")))
        .expect(1)
        .mount(&alternate)
        .await;

    let entry = ModelEntry::new("m", "Upstream-M", primary.uri()).with_alternate(alternate.uri());
    let body = dispatcher(fast_policy().auth_probe(true))
        .dispatch(RouteKind::Chat, &chat_request(vec![Message::user("hi")]), &entry)
        .await
        .unwrap();
    assert_eq!(body["choices"][0]["message"]["content"], "alternate");
}

#[tokio::test]
async fn probe_server_error_does_not_skip_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(MODELS_PATH))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_ok("ok")))
        .expect(1)
        .mount(&server)
        .await;

    let entry = ModelEntry::new("m", "Upstream-M", server.uri());
    let body = dispatcher(fast_policy().auth_probe(true))
        .dispatch(RouteKind::Chat, &chat_request(vec![Message::user("hi")]), &entry)
        .await
        .unwrap();
    assert_eq!(body["choices"][0]["message"]["content"], "ok");
}

#[tokio::test]
async fn full_attempt_auth_failure_advances_without_retry() {
    let primary = MockServer::start().await;
    let alternate = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&primary)
        .await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_ok("alternate")))
        .expect(1)
        .mount(&alternate)
        .await;

    let entry = ModelEntry::new("m", "Upstream-M", primary.uri()).with_alternate(alternate.uri());
    let body = dispatcher(fast_policy().max_attempts(3, 3))
        .dispatch(RouteKind::Chat, &chat_request(vec![Message::user("hi")]), &entry)
        .await
        .unwrap();
    assert_eq!(body["choices"][0]["message"]["content"], "alternate");
}

#[tokio::test]
async fn quota_exceeded_advances_without_retry() {
    let primary = MockServer::start().await;
    let alternate = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "30"))
        .expect(1)
        .mount(&primary)
        .await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_ok("alternate")))
        .expect(1)
        .mount(&alternate)
        .await;

    let entry = ModelEntry::new("m", "Upstream-M", primary.uri()).with_alternate(alternate.uri());
    let body = dispatcher(fast_policy())
        .dispatch(RouteKind::Chat, &chat_request(vec![Message::user("hi")]), &entry)
        .await
        .unwrap();
    assert_eq!(body["choices"][0]["message"]["content"], "alternate");
}

#[tokio::test]
async fn client_error_is_fatal_for_endpoint_only() {
    let primary = MockServer::start().await;
    let alternate = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such deployment"))
        .expect(1)
        .mount(&primary)
        .await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_ok("alternate")))
        .expect(1)
        .mount(&alternate)
        .await;

    let entry = ModelEntry::new("m", "Upstream-M", primary.uri()).with_alternate(alternate.uri());
    let body = dispatcher(fast_policy())
        .dispatch(RouteKind::Chat, &chat_request(vec![Message::user("hi")]), &entry)
        .await
        .unwrap();
    assert_eq!(body["choices"][0]["message"]["content"], "alternate");
}

#[tokio::test]
async fn exhausted_candidates_return_last_error() {
    let primary = MockServer::start().await;
    let alternate = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&primary)
        .await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(ResponseTemplate::new(403).set_body_string("bad token"))
        .expect(1)
        .mount(&alternate)
        .await;

    let entry = ModelEntry::new("m", "Upstream-M", primary.uri()).with_alternate(alternate.uri());
    let err = dispatcher(fast_policy())
        .dispatch(RouteKind::Chat, &chat_request(vec![Message::user("hi")]), &entry)
        .await
        .unwrap_err();

    assert!(matches!(err, PasserelleError::AuthFailure { status: 403, .. }), "{err:?}");
    assert_eq!(err.status_code(), 403);
    assert!(err.endpoint().unwrap().starts_with(&alternate.uri()));
}

#[tokio::test]
async fn malformed_success_body_advances() {
    let primary = MockServer::start().await;
    let alternate = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .expect(1)
        .mount(&primary)
        .await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_ok("alternate")))
        .expect(1)
        .mount(&alternate)
        .await;

    let entry = ModelEntry::new("m", "Upstream-M", primary.uri()).with_alternate(alternate.uri());
    let body = dispatcher(fast_policy())
        .dispatch(RouteKind::Chat, &chat_request(vec![Message::user("hi")]), &entry)
        .await
        .unwrap();
    assert_eq!(body["choices"][0]["message"]["content"], "alternate");
}

#[tokio::test]
async fn max_candidates_caps_fan_out() {
    let primary = MockServer::start().await;
    let alternate = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(ResponseTemplate::new(400))
        .expect(1)
        .mount(&primary)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_ok("alternate")))
        .expect(0)
        .mount(&alternate)
        .await;

    let entry = ModelEntry::new("m", "Upstream-M", primary.uri()).with_alternate(alternate.uri());
    let d = dispatcher(fast_policy().max_candidates(1));
    assert_eq!(d.candidates(&entry), vec![primary.uri().as_str()]);

    let err = d
        .dispatch(RouteKind::Chat, &chat_request(vec![Message::user("hi")]), &entry)
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 400);
}

// ============================================================================
// Pre-flight
// ============================================================================

#[tokio::test]
async fn preflight_sends_last_user_message_only() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .and(body_partial_json(json!({
            "max_tokens": 50,
            "messages": [{"role": "user", "content": "second"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_ok("warm")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .and(body_partial_json(json!({"max_tokens": 1000})))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_ok("full")))
        .expect(1)
        .mount(&server)
        .await;

    let entry = ModelEntry::new("m", "Upstream-M", server.uri());
    let request = chat_request(vec![
        Message::system("be nice"),
        Message::user("first"),
        Message::assistant("reply"),
        Message::user("second"),
    ]);
    let body = dispatcher(fast_policy().preflight(true))
        .dispatch(RouteKind::Chat, &request, &entry)
        .await
        .unwrap();
    assert_eq!(body["choices"][0]["message"]["content"], "full");
}

#[tokio::test]
async fn preflight_skipped_for_single_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_ok("full")))
        .expect(1)
        .mount(&server)
        .await;

    let entry = ModelEntry::new("m", "Upstream-M", server.uri());
    dispatcher(fast_policy().preflight(true))
        .dispatch(RouteKind::Chat, &chat_request(vec![Message::user("hi")]), &entry)
        .await
        .unwrap();
}

#[tokio::test]
async fn preflight_auth_failure_skips_endpoint() {
    let primary = MockServer::start().await;
    let alternate = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&primary)
        .await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_ok("alternate")))
        .expect(2)
        .mount(&alternate)
        .await;

    let entry = ModelEntry::new("m", "Upstream-M", primary.uri()).with_alternate(alternate.uri());
    let request = chat_request(vec![Message::user("first"), Message::user("second")]);
    let body = dispatcher(fast_policy().preflight(true))
        .dispatch(RouteKind::Chat, &request, &entry)
        .await
        .unwrap();
    assert_eq!(body["choices"][0]["message"]["content"], "alternate");
}

#[tokio::test]
async fn completion_route_skips_preflight() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .and(body_partial_json(json!({"prompt": "Once upon"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"index": 0, "text": " a time", "finish_reason": "stop"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let entry = ModelEntry::new("m", "Upstream-M", server.uri());
    let request = UpstreamRequest {
        body: UpstreamBody::Prompt("Once upon".to_string()),
        ..chat_request(vec![])
    };
    let body = dispatcher(fast_policy().preflight(true))
        .dispatch(RouteKind::Completion, &request, &entry)
        .await
        .unwrap();
    assert_eq!(body["choices"][0]["text"], " a time");
}

// ============================================================================
// Diagnostics
// ============================================================================

#[tokio::test]
async fn diagnose_reports_every_endpoint() {
    let healthy = MockServer::start().await;
    let locked = MockServer::start().await;
    mount_models_ok(&healthy).await;
    Mock::given(method("GET"))
        .and(path(MODELS_PATH))
        .respond_with(ResponseTemplate::new(401))
        .mount(&locked)
        .await;

    let mut registry = ModelRegistry::new();
    registry.insert(ModelEntry::new("a", "A", healthy.uri()).with_alternate(locked.uri()));

    let reports = dispatcher(fast_policy()).diagnose(&registry).await;
    assert_eq!(reports.len(), 2);
    assert!(reports[0].reachable);
    assert_eq!(reports[0].status, Some(200));
    assert!(!reports[1].reachable);
    assert_eq!(reports[1].status, Some(401));
    assert!(reports[1].error.is_some());
}
