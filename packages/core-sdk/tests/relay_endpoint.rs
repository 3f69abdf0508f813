use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use axum::{
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};

use voxrelay_core_sdk::{
    client::RelayClient,
    config::{ProviderConfig, ProviderPreset},
    persona,
    relay::Relay,
    server,
};

/**
 * \brief 模拟上游：记录调用次数、最后一次请求体与 Authorization 头。
 */
struct MockUpstream {
    status: StatusCode,
    body: String,
    calls: AtomicUsize,
    last_body: Mutex<Option<Value>>,
    last_auth: Mutex<Option<String>>,
}

impl MockUpstream {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn last_body(&self) -> Value {
        self.last_body.lock().unwrap().clone().expect("upstream was not called")
    }

    fn last_auth(&self) -> Option<String> {
        self.last_auth.lock().unwrap().clone()
    }
}

async fn completions(
    State(mock): State<Arc<MockUpstream>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    mock.calls.fetch_add(1, Ordering::SeqCst);
    *mock.last_body.lock().unwrap() = Some(body);
    *mock.last_auth.lock().unwrap() = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());
    (
        mock.status,
        [("content-type", "application/json")],
        mock.body.clone(),
    )
        .into_response()
}

async fn spawn_upstream(status: u16, body: impl Into<String>) -> (String, Arc<MockUpstream>) {
    let mock = Arc::new(MockUpstream {
        status: StatusCode::from_u16(status).unwrap(),
        body: body.into(),
        calls: AtomicUsize::new(0),
        last_body: Mutex::new(None),
        last_auth: Mutex::new(None),
    });
    let app = Router::new()
        .route("/v1/chat/completions", post(completions))
        .with_state(mock.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}/v1", addr), mock)
}

fn reply_body(content: &str) -> String {
    json!({
        "id": "chatcmpl-1",
        "choices": [{"index": 0, "message": {"role": "assistant", "content": content}, "finish_reason": "stop"}]
    })
    .to_string()
}

fn config_for(base_url: &str, api_key: Option<&str>) -> ProviderConfig {
    let mut config = ProviderConfig::new(ProviderPreset::OpenAI, api_key.map(|k| k.to_string()));
    config.base_url = base_url.to_string();
    config
}

async fn spawn_relay(config: ProviderConfig) -> String {
    let relay = Arc::new(Relay::new(config).unwrap());
    let app = server::router(relay, None);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn post_chat(relay: &str, body: Value) -> (u16, Value) {
    let resp = reqwest::Client::new()
        .post(format!("{}/api/chat", relay))
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

#[tokio::test]
async fn non_post_methods_are_rejected_without_upstream_call() {
    let (base, mock) = spawn_upstream(200, reply_body("hi")).await;
    let relay = spawn_relay(config_for(&base, Some("test-key"))).await;
    let client = reqwest::Client::new();

    for method in [
        reqwest::Method::GET,
        reqwest::Method::PUT,
        reqwest::Method::DELETE,
        reqwest::Method::PATCH,
    ] {
        let resp = client
            .request(method, format!("{}/api/chat", relay))
            .json(&json!({"text": "hello"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 405);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body, json!({"error": "Method not allowed"}));
    }
    assert_eq!(mock.calls(), 0);
}

#[tokio::test]
async fn missing_or_non_string_text_is_rejected() {
    let (base, mock) = spawn_upstream(200, reply_body("hi")).await;
    let relay = spawn_relay(config_for(&base, Some("test-key"))).await;

    for body in [
        json!({}),
        json!({"text": 5}),
        json!({"text": ["a"]}),
        json!({"text": ""}),
        json!({"history": []}),
    ] {
        let (status, reply) = post_chat(&relay, body).await;
        assert_eq!(status, 400);
        assert_eq!(reply, json!({"error": "Text parameter is required"}));
    }

    let resp = reqwest::Client::new()
        .post(format!("{}/api/chat", relay))
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);

    assert_eq!(mock.calls(), 0);
}

#[tokio::test]
async fn empty_history_sends_system_then_user() {
    let (base, mock) = spawn_upstream(200, reply_body("Hello!")).await;
    let relay = spawn_relay(config_for(&base, Some("test-key"))).await;

    let (status, reply) = post_chat(&relay, json!({"text": "Hi there"})).await;
    assert_eq!(status, 200);
    assert_eq!(reply, json!({"reply": "Hello!"}));

    assert_eq!(mock.calls(), 1);
    assert_eq!(mock.last_auth().as_deref(), Some("Bearer test-key"));
    let sent = mock.last_body();
    assert_eq!(
        sent["messages"],
        json!([
            {"role": "system", "content": persona::ASSISTANT},
            {"role": "user", "content": "Hi there"}
        ])
    );
    assert_eq!(sent["max_tokens"], json!(1000));
    assert_eq!(sent["temperature"], json!(0.7));
    assert_eq!(sent["model"], json!("gpt-4o-mini"));
}

#[tokio::test]
async fn history_is_forwarded_in_order() {
    let (base, mock) = spawn_upstream(200, reply_body("four")).await;
    let relay = spawn_relay(config_for(&base, Some("test-key"))).await;

    let history = json!([
        {"role": "user", "content": "one"},
        {"role": "assistant", "content": "1"},
        {"role": "user", "content": "two"},
        {"role": "assistant", "content": "2"},
        {"role": "user", "content": "three"},
        {"role": "assistant", "content": "3"}
    ]);
    let (status, _) = post_chat(&relay, json!({"text": "four?", "history": history})).await;
    assert_eq!(status, 200);

    let messages = mock.last_body()["messages"].as_array().unwrap().clone();
    assert_eq!(messages.len(), 6 + 2);
    assert_eq!(messages[0]["role"], "system");
    assert_eq!(Value::Array(messages[1..7].to_vec()), history);
    assert_eq!(messages[7], json!({"role": "user", "content": "four?"}));
}

#[tokio::test]
async fn malformed_history_is_rejected() {
    let (base, mock) = spawn_upstream(200, reply_body("hi")).await;
    let relay = spawn_relay(config_for(&base, Some("test-key"))).await;

    let (status, reply) = post_chat(
        &relay,
        json!({"text": "hi", "history": [{"role": "user", "text": "wrong field"}]}),
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(
        reply,
        json!({"error": "History must be a list of user/assistant messages"})
    );
    assert_eq!(mock.calls(), 0);
}

#[tokio::test]
async fn upstream_status_is_forwarded_without_body() {
    let (base, mock) = spawn_upstream(503, "raw upstream detail: overloaded").await;
    let relay = spawn_relay(config_for(&base, Some("test-key"))).await;

    let (status, reply) = post_chat(&relay, json!({"text": "hello"})).await;
    assert_eq!(status, 503);
    assert_eq!(reply, json!({"error": "Failed to get response from AI service"}));
    assert!(!reply.to_string().contains("overloaded"));
    assert_eq!(mock.calls(), 1);
}

#[tokio::test]
async fn upstream_without_reply_content_is_500() {
    let (base, _mock) = spawn_upstream(200, json!({"choices": []}).to_string()).await;
    let relay = spawn_relay(config_for(&base, Some("test-key"))).await;

    let (status, reply) = post_chat(&relay, json!({"text": "hello"})).await;
    assert_eq!(status, 500);
    assert_eq!(reply, json!({"error": "No response received"}));
}

#[tokio::test]
async fn reply_is_returned_unchanged() {
    let content = "  Sure! Here's a line.\n\nAnd another.  ";
    let (base, _mock) = spawn_upstream(200, reply_body(content)).await;
    let relay = spawn_relay(config_for(&base, Some("test-key"))).await;

    let (status, reply) = post_chat(&relay, json!({"text": "hello"})).await;
    assert_eq!(status, 200);
    assert_eq!(reply, json!({"reply": content}));
}

#[tokio::test]
async fn model_resolution_priority() {
    let (base, mock) = spawn_upstream(200, reply_body("ok")).await;

    let mut with_default = config_for(&base, Some("test-key"));
    with_default.default_model = Some("y".to_string());
    let relay = spawn_relay(with_default).await;

    post_chat(&relay, json!({"text": "a", "model": "x"})).await;
    assert_eq!(mock.last_body()["model"], "x");

    post_chat(&relay, json!({"text": "a"})).await;
    assert_eq!(mock.last_body()["model"], "y");

    let relay = spawn_relay(config_for(&base, Some("test-key"))).await;
    post_chat(&relay, json!({"text": "a"})).await;
    assert_eq!(mock.last_body()["model"], "gpt-4o-mini");
}

#[tokio::test]
async fn missing_credential_is_a_configuration_error() {
    let (base, mock) = spawn_upstream(200, reply_body("hi")).await;
    let relay = spawn_relay(config_for(&base, None)).await;

    let (status, reply) = post_chat(&relay, json!({"text": "hello"})).await;
    assert_eq!(status, 500);
    assert_eq!(reply, json!({"error": "Server configuration error"}));
    assert!(!reply.to_string().contains("OPENAI_API_KEY"));
    assert_eq!(mock.calls(), 0);
}

#[tokio::test]
async fn undecodable_upstream_body_is_internal_error() {
    let (base, _mock) = spawn_upstream(200, "<html>oops</html>").await;
    let relay = spawn_relay(config_for(&base, Some("test-key"))).await;

    let (status, reply) = post_chat(&relay, json!({"text": "hello"})).await;
    assert_eq!(status, 500);
    assert_eq!(reply, json!({"error": "Internal server error"}));
}

#[tokio::test]
async fn unreachable_upstream_is_internal_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let relay = spawn_relay(config_for(&format!("http://{}/v1", addr), Some("test-key"))).await;

    let (status, reply) = post_chat(&relay, json!({"text": "hello"})).await;
    assert_eq!(status, 500);
    assert_eq!(reply, json!({"error": "Internal server error"}));
}

#[tokio::test]
async fn github_models_preset_sends_biography_persona() {
    let (base, mock) = spawn_upstream(200, reply_body("I grew up by the sea.")).await;
    let mut config = ProviderConfig::new(ProviderPreset::GitHubModels, Some("ghp-token".to_string()));
    config.base_url = base;
    let relay = spawn_relay(config).await;

    let (status, _) = post_chat(&relay, json!({"text": "Where did you grow up?"})).await;
    assert_eq!(status, 200);
    let sent = mock.last_body();
    assert_eq!(sent["messages"][0]["content"], persona::BIOGRAPHY);
    assert_eq!(sent["model"], "openai/gpt-4o-mini");
    assert_eq!(mock.last_auth().as_deref(), Some("Bearer ghp-token"));
}

#[tokio::test]
async fn health_reports_configuration_without_secrets() {
    let relay = spawn_relay(config_for("http://127.0.0.1:1/v1", Some("sk-secret"))).await;
    let resp = reqwest::get(format!("{}/api/health", relay)).await.unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(
        body,
        json!({"ok": true, "provider": "openai", "model": "gpt-4o-mini", "configured": true})
    );
}

#[tokio::test]
async fn relay_client_tracks_the_conversation() {
    let (base, mock) = spawn_upstream(200, reply_body("pong")).await;
    let relay = spawn_relay(config_for(&base, Some("test-key"))).await;
    let mut client = RelayClient::new(relay.clone()).unwrap();

    assert_eq!(client.send("  ping  ").await.unwrap(), "pong");
    assert_eq!(client.conversation().len(), 2);

    client.send("again").await.unwrap();
    let messages = mock.last_body()["messages"].clone();
    assert_eq!(
        messages,
        json!([
            {"role": "system", "content": persona::ASSISTANT},
            {"role": "user", "content": "ping"},
            {"role": "assistant", "content": "pong"},
            {"role": "user", "content": "again"}
        ])
    );
    assert_eq!(client.conversation().len(), 4);

    client.clear();
    assert!(client.conversation().is_empty());
}

#[tokio::test]
async fn relay_client_keeps_conversation_on_failure() {
    let (base, _mock) = spawn_upstream(429, "rate limited").await;
    let relay = spawn_relay(config_for(&base, Some("test-key"))).await;
    let mut client = RelayClient::new(relay).unwrap();

    let err = client.send("hello").await.unwrap_err();
    assert!(err.to_string().contains("429"));
    assert!(err.to_string().contains("Failed to get response from AI service"));
    assert!(client.conversation().is_empty());
}
