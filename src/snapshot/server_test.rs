//! Tests for the snapshot routes
//! 快照路由的测试

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::Utc;
use object_store::{memory::InMemory, path::Path, signer::Signer, ObjectStore};
use reqwest::{Method, Url};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use super::capture::testing::{frame, FakeBackend, FakeEncoder};
use super::capture::{BackendError, CaptureOptions, SnapshotCapturer};
use super::server::{create_snapshot_router, SnapshotState};
use super::storage::ObjectSnapshotStore;
use crate::auth::{IdentityProvider, Principal, ProviderError};

struct AcceptToken;

#[async_trait]
impl IdentityProvider for AcceptToken {
    async fn verify_id_token(&self, token: &str) -> Result<Principal, ProviderError> {
        if token == "good" {
            Ok(Principal {
                uid: "cam-owner".to_string(),
                expires_at: Utc::now(),
                email: None,
            })
        } else {
            Err(ProviderError::Invalid("bad signature".to_string()))
        }
    }
}

#[derive(Debug)]
struct FakeSigner;

#[async_trait]
impl Signer for FakeSigner {
    async fn signed_url(
        &self,
        method: Method,
        path: &Path,
        expires_in: Duration,
    ) -> object_store::Result<Url> {
        let url = format!(
            "https://signed.test/{path}?method={method}&expires={}",
            expires_in.as_secs()
        );
        Ok(Url::parse(&url).unwrap())
    }
}

struct Fixture {
    router: Router,
    backend: Arc<FakeBackend>,
    objects: Arc<InMemory>,
}

fn fixture(open_failures: usize, reads: Vec<Result<Option<super::Frame>, BackendError>>) -> Fixture {
    let backend = Arc::new(FakeBackend::new(open_failures, reads));
    let objects = Arc::new(InMemory::new());
    let options = CaptureOptions {
        open_backoff_ms: 1,
        read_backoff_ms: 1,
        ..CaptureOptions::default()
    };
    let state = SnapshotState {
        identity: Arc::new(AcceptToken),
        capturer: Arc::new(SnapshotCapturer::new(
            backend.clone(),
            Arc::new(FakeEncoder { fail: false }),
            options,
        )),
        store: Arc::new(ObjectSnapshotStore::new(
            "vss-snapshots",
            objects.clone(),
            Some(Arc::new(FakeSigner)),
        )),
        prefix: "snapshots".to_string(),
        signed_url_ttl: Duration::from_secs(900),
        include_signed_url: false,
        allowed_origins: vec![],
    };
    Fixture {
        router: create_snapshot_router(state),
        backend,
        objects,
    }
}

async fn post(router: Router, uri: &str, token: Option<&str>, body: &str) -> (StatusCode, Value) {
    let mut req = Request::post(uri).header("content-type", "application/json");
    if let Some(token) = token {
        req = req.header("authorization", format!("Bearer {token}"));
    }
    let resp = router
        .oneshot(req.body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

#[tokio::test]
async fn test_take_snapshot_stores_jpeg() {
    let fx = fixture(1, vec![Ok(None), Ok(Some(frame(640, 360)))]);
    let (status, body) = post(
        fx.router,
        "/take-snapshot",
        Some("good"),
        r#"{"rtsp_url": "rtsp://admin:pw@cam/live"}"#,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "success");
    assert_eq!(body["resolution"], "640x360");
    assert!(body.get("snapshotUrl").is_none());

    let name = body["gcsObjectName"].as_str().unwrap();
    assert!(name.starts_with("snapshots/snap_cam-owner_"));
    let stored = fx.objects.get(&Path::from(name)).await.unwrap();
    let bytes = stored.bytes().await.unwrap();
    assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    assert_eq!(fx.backend.releases(), 1);
}

#[tokio::test]
async fn test_take_snapshot_requires_auth_first() {
    let fx = fixture(0, vec![]);
    let (status, body) = post(fx.router, "/take-snapshot", None, "garbage").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Authentication failed: Authorization header missing");
    assert_eq!(fx.backend.opens(), 0);
}

#[tokio::test]
async fn test_take_snapshot_validation() {
    let (status, body) = post(fixture(0, vec![]).router, "/take-snapshot", Some("good"), "garbage").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid JSON payload");

    let (status, body) = post(fixture(0, vec![]).router, "/take-snapshot", Some("good"), "{}").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "No RTSP URL provided");
}

#[tokio::test]
async fn test_local_sources_are_rejected() {
    for url in ["file:///etc/shadow", "concat:/tmp/a.mp4|/tmp/b.mp4"] {
        let fx = fixture(0, vec![Ok(Some(frame(2, 2)))]);
        let body = serde_json::json!({ "rtsp_url": url }).to_string();
        let (status, resp) = post(fx.router, "/take-snapshot", Some("good"), &body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{url}");
        assert_eq!(resp["message"], "Invalid RTSP URL");
        assert_eq!(fx.backend.opens(), 0);
    }
}

#[tokio::test]
async fn test_unopenable_stream_is_500() {
    let fx = fixture(usize::MAX, vec![]);
    let (status, body) = post(
        fx.router,
        "/take-snapshot",
        Some("good"),
        r#"{"rtsp_url": "rtsp://cam/live"}"#,
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["message"], "Could not open video stream for rtsp://cam/live");
    assert_eq!(fx.backend.opens(), 3);
    assert_eq!(fx.backend.releases(), 0);
}

#[tokio::test]
async fn test_retrieve_snapshot() {
    let fx = fixture(0, vec![]);
    fx.objects
        .put(&Path::from("snapshots/snap_a_1.jpg"), vec![0xFF, 0xD8].into())
        .await
        .unwrap();

    let (status, body) = post(
        fx.router.clone(),
        "/retrieve-snapshot",
        Some("good"),
        r#"{"gcsObjectName": "snapshots/snap_a_1.jpg"}"#,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(
        body["signedUrl"],
        "https://signed.test/snapshots/snap_a_1.jpg?method=GET&expires=900"
    );

    let (status, body) = post(
        fx.router.clone(),
        "/retrieve-snapshot",
        Some("good"),
        r#"{"gcsObjectName": "snapshots/missing.jpg"}"#,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Snapshot object not found");

    let (status, body) = post(fx.router.clone(), "/retrieve-snapshot", Some("good"), "{}").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "No gcsObjectName provided");

    let (status, _) = post(
        fx.router,
        "/retrieve-snapshot",
        Some("good"),
        r#"{"gcsObjectName": "private/keys.json"}"#,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_wrong_method_and_liveness() {
    let fx = fixture(0, vec![]);
    let resp = fx
        .router
        .clone()
        .oneshot(Request::get("/take-snapshot").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);

    let resp = fx
        .router
        .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}
