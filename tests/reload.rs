//! Route reload and prober reconciliation (the SIGHUP path, driven at the
//! component level).

mod common;

use common::{http_client, start_ok_backend, start_proxy, test_config};
use rproxy::routing::RouteTable;

#[tokio::test]
async fn reload_picks_up_externally_added_route() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let routes_file = config.paths.routes_file();
    let backend_a = start_ok_backend("a").await;
    let backend_b = start_ok_backend("b").await;

    let proxy = start_proxy(config).await;
    proxy
        .state
        .routes
        .insert("a.test", &backend_a.addr.to_string())
        .unwrap();
    proxy.state.sync_probers().await;

    let client = http_client();
    let before = client
        .get(proxy.url("/"))
        .header("Host", "b.test")
        .send()
        .await
        .unwrap();
    assert_eq!(before.status(), 502);

    // The external management surface writes through its own handle.
    let external = RouteTable::open(&routes_file).unwrap();
    external
        .insert("b.test", &backend_b.addr.to_string())
        .unwrap();

    // What the supervisor does on SIGHUP.
    proxy.state.routes.reload().unwrap();
    proxy.state.sync_probers().await;

    let after = client
        .get(proxy.url("/"))
        .header("Host", "b.test")
        .send()
        .await
        .unwrap();
    assert_eq!(after.status(), 200);
    assert_eq!(after.text().await.unwrap(), "b");

    // The new backend is under probing; the old route kept its prober.
    let probed = proxy.state.health.probed();
    assert!(probed.contains(&format!("http://{}/", backend_b.addr)));
    assert!(probed.contains(&format!("http://{}/", backend_a.addr)));

    proxy.state.health.stop_all().await;
}

#[tokio::test]
async fn prober_reconciliation_stops_removed_backends() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let routes_file = config.paths.routes_file();
    let backend = start_ok_backend("a").await;

    let proxy = start_proxy(config).await;
    proxy
        .state
        .routes
        .insert("a.test", &backend.addr.to_string())
        .unwrap();
    proxy.state.sync_probers().await;
    assert_eq!(proxy.state.health.probed().len(), 1);

    let external = RouteTable::open(&routes_file).unwrap();
    external.remove("a.test").unwrap();

    proxy.state.routes.reload().unwrap();
    proxy.state.sync_probers().await;
    assert!(proxy.state.health.probed().is_empty());
}

#[tokio::test]
async fn sync_probers_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let backend = start_ok_backend("a").await;
    let proxy = start_proxy(test_config(dir.path())).await;
    proxy
        .state
        .routes
        .insert("a.test", &backend.addr.to_string())
        .unwrap();

    proxy.state.sync_probers().await;
    proxy.state.sync_probers().await;
    assert_eq!(proxy.state.health.probed().len(), 1);

    proxy.state.health.stop_all().await;
}
