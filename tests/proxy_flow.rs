//! End-to-end forwarding tests against mock backends.

mod common;

use common::{http_client, raw_request, start_backend, start_ok_backend, start_proxy, test_config};

#[tokio::test]
async fn routes_by_host_with_forwarding_headers() {
    let dir = tempfile::tempdir().unwrap();
    let backend = start_ok_backend("hello from upstream").await;
    let proxy = start_proxy(test_config(dir.path())).await;
    proxy
        .state
        .routes
        .insert("a.test", &backend.addr.to_string())
        .unwrap();

    let response = http_client()
        .get(proxy.url("/x?y=1"))
        .header("Host", "a.test")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    // Security headers ride on every proxied response.
    assert_eq!(response.headers().get("x-frame-options").unwrap(), "DENY");
    assert_eq!(
        response.headers().get("x-content-type-options").unwrap(),
        "nosniff"
    );
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(response.text().await.unwrap(), "hello from upstream");

    let seen = backend.requests();
    assert_eq!(seen.len(), 1);
    let request = seen[0].to_ascii_lowercase();
    assert!(request.starts_with("get /x?y=1 http/1.1"), "{request}");
    assert!(request.contains("x-forwarded-host: a.test"), "{request}");
    assert!(request.contains("x-forwarded-proto: http"), "{request}");
    assert!(request.contains("x-forwarded-for: 127.0.0.1"), "{request}");
    assert!(request.contains("x-real-ip: 127.0.0.1"), "{request}");
    // No hop-by-hop header reaches the upstream.
    for hop in ["connection:", "keep-alive:", "transfer-encoding:", "upgrade:", "te:"] {
        assert!(!request.contains(hop), "{hop} leaked upstream: {request}");
    }
}

#[tokio::test]
async fn invalid_host_is_rejected_without_upstream_hit() {
    let dir = tempfile::tempdir().unwrap();
    let backend = start_ok_backend("unused").await;
    let proxy = start_proxy(test_config(dir.path())).await;
    proxy
        .state
        .routes
        .insert("a.test", &backend.addr.to_string())
        .unwrap();

    let (status, _, _) = raw_request(
        proxy.addr,
        "GET / HTTP/1.1\r\nHost: bad host!\r\nConnection: close\r\n\r\n",
    )
    .await;

    assert_eq!(status, 400);
    assert_eq!(backend.hits(), 0);
}

#[tokio::test]
async fn missing_route_yields_502_with_host_in_body() {
    let dir = tempfile::tempdir().unwrap();
    let proxy = start_proxy(test_config(dir.path())).await;

    let response = http_client()
        .get(proxy.url("/"))
        .header("Host", "unrouted.test")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 502);
    assert_eq!(
        response.text().await.unwrap(),
        "No backend configured for host: unrouted.test"
    );
}

#[tokio::test]
async fn request_body_streams_to_backend() {
    let dir = tempfile::tempdir().unwrap();
    let backend = start_ok_backend("created").await;
    let proxy = start_proxy(test_config(dir.path())).await;
    proxy
        .state
        .routes
        .insert("a.test", &backend.addr.to_string())
        .unwrap();

    let response = http_client()
        .post(proxy.url("/submit"))
        .header("Host", "a.test")
        .body("payload-bytes")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let seen = backend.requests();
    assert!(seen[0].contains("payload-bytes"), "{}", seen[0]);
}

#[tokio::test]
async fn backend_5xx_passes_through_after_retries() {
    let dir = tempfile::tempdir().unwrap();
    let backend = start_backend(|_req| async { (500, "upstream exploded".to_string()) }).await;
    let proxy = start_proxy(test_config(dir.path())).await;
    proxy
        .state
        .routes
        .insert("a.test", &backend.addr.to_string())
        .unwrap();

    let response = http_client()
        .get(proxy.url("/"))
        .header("Host", "a.test")
        .send()
        .await
        .unwrap();

    // The final attempt's 5xx body reaches the client.
    assert_eq!(response.status(), 500);
    assert_eq!(response.text().await.unwrap(), "upstream exploded");
    // Three attempts were made before giving up.
    assert_eq!(backend.hits(), 3);
}

#[tokio::test]
async fn counters_track_success_and_failure() {
    let dir = tempfile::tempdir().unwrap();
    let backend = start_ok_backend("ok").await;
    let proxy = start_proxy(test_config(dir.path())).await;
    proxy
        .state
        .routes
        .insert("a.test", &backend.addr.to_string())
        .unwrap();

    let client = http_client();
    client
        .get(proxy.url("/"))
        .header("Host", "a.test")
        .send()
        .await
        .unwrap();
    client
        .get(proxy.url("/"))
        .header("Host", "unrouted.test")
        .send()
        .await
        .unwrap();

    let snapshot = proxy.state.stats.snapshot();
    assert_eq!(snapshot.total_requests, 2);
    assert_eq!(snapshot.success_requests, 1);
    assert_eq!(snapshot.failed_requests, 1);
    assert_eq!(snapshot.host_stats["a.test"].success, 1);
    assert_eq!(snapshot.host_stats["unrouted.test"].failed, 1);
}
