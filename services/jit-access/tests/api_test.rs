//! HTTP 接口测试

mod common;

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use jit_access::api::{router, AppState};
use jit_access::application::catalog::CatalogSynchronizer;
use jit_access::domain::catalog::{checksum_of, CatalogDocument, CatalogKey};
use jit_access::domain::role::Role;
use jit_access::infrastructure::persistence::{InMemoryCatalogRepository, InMemoryCatalogSessionRepository};
use jit_config::CatalogConfig;
use serde_json::{json, Value};
use tower::ServiceExt;

use common::{fast_settings, ops_user, Fixture, StaticDirectory};

fn app(fixture: &Fixture) -> Router {
    let synchronizer = Arc::new(CatalogSynchronizer::new(
        fixture.roles.clone(),
        fixture.providers.clone(),
        Arc::new(InMemoryCatalogRepository::new()),
        Arc::new(InMemoryCatalogSessionRepository::new()),
        CatalogConfig::default(),
    ));
    router(AppState {
        orchestrator: fixture.orchestrator(fast_settings()),
        synchronizer,
        providers: fixture.providers.clone(),
        roles: fixture.roles.clone(),
        metrics: None,
        database: None,
    })
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

fn operator_body() -> Value {
    json!({
        "identity": { "kind": "user", "id": "alice@example.com", "groups": ["ops"] },
        "role": "operator",
        "duration_secs": 600,
        "reason": "deploy hotfix"
    })
}

/// 创建请求并审批
#[tokio::test]
async fn test_request_and_approve() {
    let fixture = Fixture::new();
    let app = app(&fixture);

    let (status, created) = send(&app, "POST", "/api/requests", Some(operator_body())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["state"], "pending_approval");
    let id = created["id"].as_str().unwrap().to_string();

    let (status, fetched) = send(&app, "GET", &format!("/api/requests/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["request"]["reason"], "deploy hotfix");

    let (status, approved) = send(
        &app,
        "POST",
        &format!("/api/requests/{id}/approve"),
        Some(json!({ "actor": "lead" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(approved["state"], "approved");

    let (status, problem) = send(
        &app,
        "POST",
        &format!("/api/requests/{id}/deny"),
        Some(json!({ "actor": "lead" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(problem["status"], 409);
}

/// 错误映射到 Problem Details
#[tokio::test]
async fn test_errors_are_problem_details() {
    let fixture = Fixture::new();
    let app = app(&fixture);

    let mut outsider = operator_body();
    outsider["identity"] = json!({ "kind": "user", "id": "mallory@example.org" });
    let (status, problem) = send(&app, "POST", "/api/requests", Some(outsider)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(problem["status"], 403);

    let mut unknown = operator_body();
    unknown["role"] = json!("root");
    let (status, _) = send(&app, "POST", "/api/requests", Some(unknown)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // 角色没有时长上限时仍拒绝超出时间范围的时长
    fixture.roles.upsert_role(Role::new("open").with_provider("cloud"));
    let mut endless = operator_body();
    endless["role"] = json!("open");
    endless["duration_secs"] = json!(u64::MAX);
    let (status, problem) = send(&app, "POST", "/api/requests", Some(endless)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(problem["status"], 400);
    assert_eq!(fixture.authorizer.authorize_calls(), 0);

    let (status, _) = send(&app, "GET", "/api/requests/not-a-uuid", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let missing = uuid::Uuid::new_v4();
    let (status, _) = send(&app, "GET", &format!("/api/requests/{missing}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        "POST",
        &format!("/api/requests/{missing}/approve"),
        Some(json!({ "actor": "  " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

/// 通过身份目录查找主体后再做范围校验
#[tokio::test]
async fn test_request_with_identity_lookup() {
    let fixture = Fixture::new();
    fixture
        .providers
        .register("directory", Arc::new(StaticDirectory { identities: vec![ops_user()] }))
        .unwrap();
    let app = app(&fixture);

    let lookup = |id: &str| {
        json!({
            "identity_lookup": { "provider": "directory", "id": id },
            "role": "operator",
            "duration_secs": 600
        })
    };

    let (status, created) = send(&app, "POST", "/api/requests", Some(lookup("alice@example.com"))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["state"], "pending_approval");

    let (status, _) = send(&app, "POST", "/api/requests", Some(lookup("nobody@example.com"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // chat 未实现 Identity 能力
    let mut body = lookup("alice@example.com");
    body["identity_lookup"]["provider"] = json!("chat");
    let (status, problem) = send(&app, "POST", "/api/requests", Some(body)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(problem["status"], 422);

    let mut both = operator_body();
    both["identity_lookup"] = json!({ "provider": "directory", "id": "alice@example.com" });
    let (status, _) = send(&app, "POST", "/api/requests", Some(both)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

/// 通过 HTTP 分块推送目录
#[tokio::test]
async fn test_catalog_session_over_http() {
    let fixture = Fixture::new();
    let app = app(&fixture);

    let document = CatalogDocument {
        roles: vec![Role::new("bucket-admin").allow_permission("s3:*")],
        permissions: Vec::new(),
    };
    let bytes = serde_json::to_vec(&document).unwrap();
    let (first, second) = bytes.split_at(bytes.len() / 2);

    let (status, started) = send(
        &app,
        "POST",
        "/api/catalog/sessions",
        Some(json!({ "provider": "cloud", "version": "7" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let session = started["session_id"].as_str().unwrap().to_string();

    for (sequence, chunk) in [first, second].iter().enumerate() {
        let (status, pushed) = send(
            &app,
            "POST",
            &format!("/api/catalog/sessions/{session}/chunks"),
            Some(json!({ "sequence": sequence, "payload": STANDARD.encode(chunk) })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(pushed["accepted"], true);
    }

    let (status, committed) = send(
        &app,
        "POST",
        &format!("/api/catalog/sessions/{session}/commit"),
        Some(json!({ "checksum": checksum_of([first, second]) })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(committed["installed_version"], "7");
    assert_eq!(
        fixture.roles.installed_version(&CatalogKey::new("cloud", "default")),
        Some("7".to_string())
    );

    let (status, _) = send(
        &app,
        "POST",
        &format!("/api/catalog/sessions/{session}/abort"),
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

/// 健康检查
#[tokio::test]
async fn test_health_and_metrics() {
    let fixture = Fixture::new();
    let app = app(&fixture);

    let (status, health) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["roles"], 2);
    assert_eq!(health["providers"], json!(["chat", "cloud"]));

    let (status, _) = send(&app, "GET", "/metrics", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
