//! End-to-end filtering tests: proxy service against a live mock upstream.
//!
//! Each test starts a hyper server on an ephemeral port serving a canned
//! upstream response, points a `ProxyService` at it, and asserts on the
//! bytes that come back through the full forward/rewrite pipeline.

mod helpers;

use bytes::Bytes;
use helpers::mock_upstream::MockUpstream;
use http::header::HeaderName;
use http::{Request, StatusCode, header};
use http_body_util::{BodyExt, Full};
use labelgate::config::GateConfig;
use labelgate::error::GateError;
use labelgate::proxy_service::ProxyService;
use serde_json::json;

const RULES_FIXTURE: &str = r#"{"status":"success","data":{"groups":[{"name":"g1","file":"f","interval":10,"rules":[{"type":"alerting","name":"r1","query":"up==0","duration":0,"labels":[{"name":"tenant","value":"a"}],"annotations":[],"alerts":[],"health":"ok"},{"type":"recording","name":"r2","query":"up","labels":[{"name":"tenant","value":"b"}],"health":"ok"}]}]}}"#;

const ALERTS_FIXTURE: &str = r#"{"status":"success","data":{"alerts":[{"labels":[{"name":"tenant","value":"a"}],"annotations":[],"state":"firing","activeAt":"2024-03-01T12:00:00Z","value":"1e+00"},{"labels":[{"name":"tenant","value":"b"}],"annotations":[],"state":"pending","value":"1e+00"}]}}"#;

async fn proxy_for(addr: std::net::SocketAddr) -> ProxyService {
    ProxyService::new(
        format!("http://{}", addr),
        "tenant",
        HeaderName::from_static("x-scope-orgid"),
        GateConfig::default(),
    )
    .unwrap()
}

fn request(path: &str, tenant: Option<&str>) -> Request<Full<Bytes>> {
    let mut builder = Request::builder().uri(path);
    if let Some(tenant) = tenant {
        builder = builder.header("X-Scope-OrgID", tenant);
    }
    builder.body(Full::new(Bytes::new())).unwrap()
}

#[tokio::test]
async fn test_rules_endpoint_filters_for_tenant() {
    let upstream = MockUpstream::new(StatusCode::OK, RULES_FIXTURE);
    let addr = upstream.start().await;
    let proxy = proxy_for(addr).await;

    let resp = proxy
        .handle_request(request("/api/v1/rules", Some("a")))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let content_length: usize = resp
        .headers()
        .get(header::CONTENT_LENGTH)
        .unwrap()
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(content_length, body.len());

    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["status"], "success");
    assert_eq!(
        value["data"],
        json!({
            "groups": [{
                "name": "g1",
                "file": "f",
                "interval": 10.0,
                "rules": [{
                    "type": "alerting",
                    "name": "r1",
                    "query": "up==0",
                    "duration": 0.0,
                    "labels": [{"name": "tenant", "value": "a"}],
                    "annotations": [],
                    "alerts": [],
                    "health": "ok"
                }]
            }]
        })
    );
}

#[tokio::test]
async fn test_rules_endpoint_no_match_yields_empty_groups() {
    let upstream = MockUpstream::new(StatusCode::OK, RULES_FIXTURE);
    let addr = upstream.start().await;
    let proxy = proxy_for(addr).await;

    let resp = proxy
        .handle_request(request("/api/v1/rules", Some("nobody")))
        .await
        .unwrap();

    let body = resp.into_body().collect().await.unwrap().to_bytes();
    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    // The groups key is present and empty, never omitted.
    assert_eq!(value["data"]["groups"], json!([]));
}

#[tokio::test]
async fn test_alerts_endpoint_filters_flat_list() {
    let upstream = MockUpstream::new(StatusCode::OK, ALERTS_FIXTURE);
    let addr = upstream.start().await;
    let proxy = proxy_for(addr).await;

    let resp = proxy
        .handle_request(request("/api/v1/alerts", Some("a")))
        .await
        .unwrap();

    let body = resp.into_body().collect().await.unwrap().to_bytes();
    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(
        value["data"]["alerts"],
        json!([{
            "labels": [{"name": "tenant", "value": "a"}],
            "annotations": [],
            "state": "firing",
            "activeAt": "2024-03-01T12:00:00Z",
            "value": "1e+00"
        }])
    );
}

#[tokio::test]
async fn test_alerts_endpoint_no_match_yields_empty_alerts() {
    let upstream = MockUpstream::new(StatusCode::OK, ALERTS_FIXTURE);
    let addr = upstream.start().await;
    let proxy = proxy_for(addr).await;

    let resp = proxy
        .handle_request(request("/api/v1/alerts", Some("nobody")))
        .await
        .unwrap();

    let body = resp.into_body().collect().await.unwrap().to_bytes();
    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["data"]["alerts"], json!([]));
}

#[tokio::test]
async fn test_non_200_upstream_passes_through_unmodified() {
    // The body would fail envelope decode; the gate must never attempt it.
    let upstream = MockUpstream::new(StatusCode::SERVICE_UNAVAILABLE, "definitely not json {");
    let addr = upstream.start().await;
    let proxy = proxy_for(addr).await;

    let resp = proxy
        .handle_request(request("/api/v1/rules", Some("a")))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"definitely not json {");
}

#[tokio::test]
async fn test_missing_tenant_header_fails_before_upstream() {
    let upstream = MockUpstream::new(StatusCode::OK, RULES_FIXTURE);
    let addr = upstream.start().await;
    let proxy = proxy_for(addr).await;

    let err = proxy
        .handle_request(request("/api/v1/rules", None))
        .await
        .unwrap_err();

    assert!(matches!(err, GateError::MissingTenant(_)));
    assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    // Fail closed and fail fast: the upstream never saw the request.
    assert!(upstream.seen().is_empty());
}

#[tokio::test]
async fn test_malformed_200_rules_body_fails_closed() {
    let upstream = MockUpstream::new(StatusCode::OK, "definitely not json {");
    let addr = upstream.start().await;
    let proxy = proxy_for(addr).await;

    let err = proxy
        .handle_request(request("/api/v1/rules", Some("a")))
        .await
        .unwrap_err();

    assert!(matches!(err, GateError::DecodeEnvelope(_)));
}

#[tokio::test]
async fn test_unknown_rule_kind_fails_closed() {
    let body = r#"{"status":"success","data":{"groups":[{"name":"g","file":"f","interval":1,"rules":[{"type":"unknown","name":"r","query":"up","health":"ok"}]}]}}"#;
    let upstream = MockUpstream::new(StatusCode::OK, body);
    let addr = upstream.start().await;
    let proxy = proxy_for(addr).await;

    let err = proxy
        .handle_request(request("/api/v1/rules", Some("a")))
        .await
        .unwrap_err();

    assert!(matches!(err, GateError::DecodeRules(_)));
    assert!(err.to_string().contains("can't decode rules data"));
}

#[tokio::test]
async fn test_passthrough_route_streams_unmodified() {
    // Non-envelope body on an unfiltered route: bytes must come through
    // untouched, tenant header or not.
    let upstream = MockUpstream::new(StatusCode::OK, "definitely not json {");
    let addr = upstream.start().await;
    let proxy = proxy_for(addr).await;

    let resp = proxy
        .handle_request(request("/api/v1/query?query=up", None))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"definitely not json {");

    // The path and query reached the upstream unchanged.
    let seen = upstream.seen();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].uri, "/api/v1/query?query=up");
}

#[tokio::test]
async fn test_upstream_envelope_error_status_fails_closed() {
    let body = r#"{"status":"error","errorType":"internal","error":"boom"}"#;
    let upstream = MockUpstream::new(StatusCode::OK, body);
    let addr = upstream.start().await;
    let proxy = proxy_for(addr).await;

    let err = proxy
        .handle_request(request("/api/v1/alerts", Some("a")))
        .await
        .unwrap_err();

    match err {
        GateError::UnexpectedApiStatus(status) => assert_eq!(status, "error"),
        other => panic!("expected UnexpectedApiStatus, got: {:?}", other),
    }
}
