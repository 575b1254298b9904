mod common;

use std::sync::Arc;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use common::{config_of, descriptor, store_with_keys};
use serde_json::{json, Value};
use tower::ServiceExt;
use trial_orchestrator::server::{self, REQUEST_ID_HEADER};
use trial_orchestrator::{CredentialStore, Gateway, MemoryCredentialStore, ProviderDescriptor};
use wiremock::matchers::{header, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CHAT_PATH: &str = "/v1/chat/completions";

fn upstream(id: &str, priority: i64, server: &MockServer) -> ProviderDescriptor
{   descriptor(id, priority, &server.uri(), CHAT_PATH)
      .with_adapter("cerebras")
      .with_default_model("probe-model")
}

fn app(
  providers: Vec<ProviderDescriptor>
, store: Arc<MemoryCredentialStore>
) -> Router
{   let gateway = Gateway::new(config_of(providers), store).unwrap();
    server::router(Arc::new(gateway))
}

async fn reply_with(server: &MockServer, status: u16, body: Value)
{   Mock::given(method("POST"))
      .respond_with(ResponseTemplate::new(status).set_body_json(body))
      .mount(server)
      .await;
}

fn completion(text: &str) -> Value
{   json!({
      "id": "up-1",
      "choices": [{
        "message": {"role": "assistant", "content": text},
        "finish_reason": "stop"
      }]
    })
}

fn post_json(uri: &str, body: Value) -> Request<Body>
{   Request::builder()
      .method("POST")
      .uri(uri)
      .header("content-type", "application/json")
      .body(Body::from(body.to_string()))
      .unwrap()
}

fn chat_body() -> Value
{   json!({
      "model": "llama3.1-8b",
      "messages": [{"role": "user", "content": "ping"}]
    })
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value)
{   let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
      .await
      .unwrap();
    let body = if bytes.is_empty()
    {   Value::Null
    }
    else
    {   serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

async fn last_error(store: &MemoryCredentialStore, id: &str) -> Option<String>
{   store.get_record(id).await.unwrap().and_then(|r| r.last_error)
}

#[tokio::test]
async fn test_fails_over_from_rejected_key()
{   let server_a = MockServer::start().await;
    let server_b = MockServer::start().await;
    reply_with(&server_a, 401, json!({"error": {"message": "bad key"}})).await;
    reply_with(&server_b, 200, completion("from b")).await;

    let store = store_with_keys(&[("a", "ka"), ("b", "kb")]).await;
    let app = app(
      vec![upstream("a", 1, &server_a), upstream("b", 2, &server_b)],
      store.clone()
    );

    let (status, body) = send(&app, post_json("/v1/chat/completions", chat_body())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["object"], "chat.completion");
    assert!(body["created"].as_i64().unwrap() > 0);
    assert_eq!(body["model"], "llama3.1-8b");
    assert_eq!(body["choices"][0]["message"]["role"], "assistant");
    assert_eq!(body["choices"][0]["message"]["content"], "from b");

    assert_eq!(last_error(&store, "a").await.as_deref(), Some("auth"));
    assert_eq!(last_error(&store, "b").await, None);

    let (_, events) = send(
      &app,
      Request::get("/admin/events?limit=10").body(Body::empty()).unwrap()
    ).await;
    let kinds: Vec<&str> = events["events"]
      .as_array()
      .unwrap()
      .iter()
      .filter_map(|e| e["kind"].as_str())
      .collect();
    assert!(kinds.contains(&"provider_switched"));
    assert!(kinds.contains(&"provider_success"));
}

#[tokio::test]
async fn test_all_rate_limited_is_429()
{   let server_a = MockServer::start().await;
    let server_b = MockServer::start().await;
    reply_with(&server_a, 429, json!({"error": "slow down"})).await;
    reply_with(&server_b, 429, json!({"error": "slow down"})).await;

    let store = store_with_keys(&[("a", "ka"), ("b", "kb")]).await;
    let app = app(
      vec![upstream("a", 1, &server_a), upstream("b", 2, &server_b)],
      store.clone()
    );

    let (status, body) = send(&app, post_json("/v1/chat/completions", chat_body())).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"]["code"], "provider_unavailable");
    assert_eq!(body["error"]["type"], "server_error");
    assert!(body["error"]["message"].as_str().unwrap().contains("'b'"));

    for id in ["a", "b"]
    {   assert_eq!(last_error(&store, id).await.as_deref(), Some("rate_limit"));
    }
}

#[tokio::test]
async fn test_single_provider_without_key_is_401()
{   let server_a = MockServer::start().await;
    let store = Arc::new(MemoryCredentialStore::new());
    let app = app(vec![upstream("a", 1, &server_a)], store);

    let (status, body) = send(&app, post_json("/v1/chat/completions", chat_body())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "provider_auth_required");
    assert!(server_a.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_malformed_body_is_400()
{   let store = Arc::new(MemoryCredentialStore::new());
    let app = app(vec![], store);

    let request = Request::builder()
      .method("POST")
      .uri("/v1/chat/completions")
      .header("content-type", "application/json")
      .body(Body::from("{not json"))
      .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "invalid_request_error");

    let (status, _) = send(
      &app,
      post_json("/v1/chat/completions", json!({"model": "m", "messages": []}))
    ).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_admin_credential_is_stored_after_probe()
{   let server_a = MockServer::start().await;
    Mock::given(method("POST"))
      .and(header("authorization", "Bearer fresh"))
      .respond_with(ResponseTemplate::new(200).set_body_json(completion(".")))
      .expect(1)
      .mount(&server_a)
      .await;

    let store = Arc::new(MemoryCredentialStore::new());
    store.record_error("a", "auth").await.unwrap();
    let app = app(vec![upstream("a", 1, &server_a)], store.clone());

    let (status, body) = send(
      &app,
      post_json("/admin/providers/a/credentials", json!({"api_key": " fresh "}))
    ).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(store.get_api_key("a").await.unwrap().as_deref(), Some("fresh"));
    assert_eq!(last_error(&store, "a").await, None);
}

#[tokio::test]
async fn test_admin_rejected_credential_is_not_stored()
{   let server_a = MockServer::start().await;
    reply_with(&server_a, 401, json!({"error": {"message": "nope"}})).await;

    let store = Arc::new(MemoryCredentialStore::new());
    let app = app(vec![upstream("a", 1, &server_a)], store.clone());

    let (status, body) = send(
      &app,
      post_json("/admin/providers/a/credentials", json!({"api_key": "wrong"}))
    ).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "invalid_api_key");
    assert_eq!(store.get_api_key("a").await.unwrap(), None);
    assert_eq!(last_error(&store, "a").await.as_deref(), Some("auth"));
}

#[tokio::test]
async fn test_admin_credential_routes_validate_input()
{   let server_a = MockServer::start().await;
    let store = Arc::new(MemoryCredentialStore::new());
    let app = app(vec![upstream("a", 1, &server_a)], store);

    let (status, _) = send(
      &app,
      post_json("/admin/providers/a/credentials", json!({"api_key": "  "}))
    ).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
      &app,
      post_json("/admin/providers/ghost/credentials", json!({"api_key": "k"}))
    ).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "provider_not_found");

    let delete = Request::delete("/admin/providers/a/credentials")
      .body(Body::empty())
      .unwrap();
    let (status, body) = send(&app, delete).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "credential_not_found");
}

#[tokio::test]
async fn test_delete_credential()
{   let server_a = MockServer::start().await;
    let store = store_with_keys(&[("a", "ka")]).await;
    let app = app(vec![upstream("a", 1, &server_a)], store.clone());

    let delete = Request::delete("/admin/providers/a/credentials")
      .body(Body::empty())
      .unwrap();
    let (status, _) = send(&app, delete).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(store.get_record("a").await.unwrap(), None);
}

#[tokio::test]
async fn test_healthcheck_routes()
{   let server_a = MockServer::start().await;
    reply_with(&server_a, 503, json!({"error": {"message": "down"}})).await;
    let server_b = MockServer::start().await;
    reply_with(&server_b, 200, completion(".")).await;

    let store = store_with_keys(&[("b", "kb"), ("c", "kc")]).await;
    let server_c = MockServer::start().await;
    reply_with(&server_c, 503, json!({"error": {"message": "down"}})).await;
    let app = app(
      vec![
        upstream("a", 1, &server_a)
      , upstream("b", 2, &server_b)
      , upstream("c", 3, &server_c)
      ],
      store.clone()
    );
    let check = |id: &str| {
      Request::post(format!("/admin/providers/{}/healthcheck", id))
        .body(Body::empty())
        .unwrap()
    };

    let (status, _) = send(&app, check("ghost")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&app, check("a")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], "Provider API key not configured");

    store.record_error("b", "rate_limit").await.unwrap();
    let (status, _) = send(&app, check("b")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(last_error(&store, "b").await, None);

    let (status, body) = send(&app, check("c")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"]["message"]
      .as_str()
      .unwrap()
      .starts_with("Provider health check failed"));
    assert_eq!(
      last_error(&store, "c").await.as_deref(),
      Some("Provider error: down")
    );
}

#[tokio::test]
async fn test_list_providers_in_attempt_order()
{   let server_a = MockServer::start().await;
    let store = store_with_keys(&[("b", "kb")]).await;
    store.record_error("c", "rate_limit").await.unwrap();

    let mut c = upstream("c", 5, &server_a);
    c.availability.cooldown_seconds = Some(60);
    let app = app(
      vec![upstream("a", 10, &server_a), upstream("b", 20, &server_a), c],
      store
    );

    let (status, body) = send(
      &app,
      Request::get("/admin/providers").body(Body::empty()).unwrap()
    ).await;
    assert_eq!(status, StatusCode::OK);
    let providers = body["providers"].as_array().unwrap();
    let ids: Vec<&str> = providers.iter().filter_map(|p| p["id"].as_str()).collect();
    assert_eq!(ids, vec!["c", "a", "b"]);

    assert_eq!(providers[0]["last_error"], "rate_limit");
    assert_eq!(providers[0]["cooldown_seconds"], 60);
    assert_eq!(providers[0]["available"], false);
    assert_eq!(providers[1]["has_api_key"], false);
    assert_eq!(providers[2]["has_api_key"], true);
    assert_eq!(providers[2]["available"], true);
}

#[tokio::test]
async fn test_request_id_is_echoed_or_generated()
{   let store = Arc::new(MemoryCredentialStore::new());
    let app = app(vec![], store);

    let request = Request::get("/healthz")
      .header(REQUEST_ID_HEADER, "trace-123")
      .body(Body::empty())
      .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[REQUEST_ID_HEADER], "trace-123");

    let response = app
      .clone()
      .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
      .await
      .unwrap();
    let generated = response.headers()[REQUEST_ID_HEADER].to_str().unwrap();
    assert_eq!(generated.len(), 32);
}

#[tokio::test]
async fn test_request_id_reaches_events_and_provider_logs()
{   let server_a = MockServer::start().await;
    reply_with(&server_a, 429, json!({"error": {"message": "slow down"}})).await;
    let server_b = MockServer::start().await;
    reply_with(&server_b, 200, completion("from b")).await;

    let store = store_with_keys(&[("a", "ka"), ("b", "kb")]).await;
    let app = app(
      vec![upstream("a", 1, &server_a), upstream("b", 2, &server_b)],
      store
    );

    let mut request = post_json("/v1/chat/completions", chat_body());
    request.headers_mut().insert(REQUEST_ID_HEADER, "trace-7".parse().unwrap());
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);

    let (_, events) = send(
      &app,
      Request::get("/admin/events?limit=10").body(Body::empty()).unwrap()
    ).await;
    let events = events["events"].as_array().unwrap();
    assert!(!events.is_empty());
    assert!(events.iter().all(|e| e["request_id"] == "trace-7"));

    let (status, body) = send(
      &app,
      Request::get("/admin/providers/a/logs").body(Body::empty()).unwrap()
    ).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["provider_id"], "a");
    let logs = body["logs"].as_array().unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0]["request_id"], "trace-7");
    assert_eq!(logs[0]["request_body"]["model"], "llama3.1-8b");
    assert_eq!(logs[0]["response_body"]["error"]["status_code"], 429);

    let (_, body) = send(
      &app,
      Request::get("/admin/providers/b/logs?limit=1").body(Body::empty()).unwrap()
    ).await;
    assert_eq!(body["logs"][0]["response_body"]["id"], "up-1");

    let (status, body) = send(
      &app,
      Request::get("/admin/providers/ghost/logs").body(Body::empty()).unwrap()
    ).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "provider_not_found");
}

#[tokio::test]
async fn test_malformed_credential_body_is_openai_error()
{   let server_a = MockServer::start().await;
    let store = Arc::new(MemoryCredentialStore::new());
    let app = app(vec![upstream("a", 1, &server_a)], store.clone());

    let request = Request::builder()
      .method("POST")
      .uri("/admin/providers/a/credentials")
      .header("content-type", "application/json")
      .body(Body::from("{not json"))
      .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "invalid_request_error");
    assert!(body["error"]["message"].is_string());
    assert_eq!(store.get_record("a").await.unwrap(), None);
}

#[tokio::test]
async fn test_get_credential_is_redacted()
{   let server_a = MockServer::start().await;
    let server_b = MockServer::start().await;
    let store = store_with_keys(&[("a", "sk-live-abcdef123456")]).await;
    store.record_error("a", "rate_limit").await.unwrap();
    let app = app(
      vec![upstream("a", 1, &server_a), upstream("b", 2, &server_b)],
      store
    );
    let get = |id: &str| {
      Request::get(format!("/admin/providers/{}/credentials", id))
        .body(Body::empty())
        .unwrap()
    };

    let (status, body) = send(&app, get("a")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["provider_id"], "a");
    assert_eq!(body["has_api_key"], true);
    assert_eq!(body["api_key_hint"], "****3456");
    assert_eq!(body["last_error"], "rate_limit");
    assert!(body.get("api_key").is_none());
    assert!(!body.to_string().contains("sk-live"));

    let (status, body) = send(&app, get("b")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "credential_not_found");

    let (status, body) = send(&app, get("ghost")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "provider_not_found");
}
