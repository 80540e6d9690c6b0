use std::sync::Arc;
use std::time::Duration;

use app_lib::{
    config::Settings,
    core::{
        auto_switch::{AutoSwitch, TickOutcome},
        catalog::{Node, ProxyType},
        tester::{LatencyTester, ProgressSink, TestRunToken},
        timer::{TaskKind, Timer},
    },
    state::Store,
};
use serde_json::json;
use tokio::runtime::Handle;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod common;

use common::{client_for, mount_delay, mount_proxies, proxies_body, settings_for, store_for};

fn auto_switch(server: &MockServer, store: &Arc<Store>, settings: &Settings) -> AutoSwitch {
    let tester = LatencyTester::new(
        client_for(server),
        settings.test_url.clone(),
        Arc::new(TestRunToken::default()),
        Arc::clone(store) as Arc<dyn ProgressSink>,
    );
    AutoSwitch::new(client_for(server), tester, Arc::clone(store), settings)
}

async fn expect_select(server: &MockServer, name: &str, times: u64) {
    Mock::given(method("PUT"))
        .and(path("/proxies/GLOBAL"))
        .and(body_json(json!({ "name": name })))
        .respond_with(ResponseTemplate::new(204))
        .expect(times)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_keywords_limit_the_candidates() {
    let server = MockServer::start().await;
    mount_proxies(&server, proxies_body(&["US-1", "HK-2", "JP-3"], "US-1", &[])).await;
    Mock::given(method("GET"))
        .and(path("/proxies/US-1/delay"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"delay": 5})))
        .expect(0)
        .mount(&server)
        .await;
    mount_delay(&server, "HK-2", 120).await;
    mount_delay(&server, "JP-3", 80).await;
    expect_select(&server, "JP-3", 1).await;

    let store = store_for(&server);
    let settings = Settings {
        smart_connect_keywords: "HK, jp".into(),
        ..settings_for(&server)
    };

    let outcome = auto_switch(&server, &store, &settings).tick().await;
    assert_eq!(
        outcome,
        TickOutcome::Switched {
            from: "US-1".into(),
            to: "JP-3".into()
        }
    );
    assert_eq!(store.read(|snap| snap.current_node.clone()), "JP-3");
}

#[tokio::test]
async fn test_fastest_already_active_is_kept() {
    let server = MockServer::start().await;
    mount_proxies(&server, proxies_body(&["HK-1", "HK-2"], "HK-1", &[])).await;
    mount_delay(&server, "HK-1", 40).await;
    mount_delay(&server, "HK-2", 90).await;
    expect_select(&server, "HK-2", 0).await;

    let store = store_for(&server);
    let outcome = auto_switch(&server, &store, &settings_for(&server))
        .tick()
        .await;
    assert_eq!(outcome, TickOutcome::Kept("HK-1".into()));
}

#[tokio::test]
async fn test_latencies_merge_into_stored_nodes() {
    let server = MockServer::start().await;
    mount_proxies(&server, proxies_body(&["HK-1", "SG-9"], "HK-1", &[])).await;
    mount_delay(&server, "HK-1", 60).await;
    mount_delay(&server, "SG-9", 30).await;
    expect_select(&server, "SG-9", 1).await;

    let store = store_for(&server);
    store
        .update(|snap| {
            snap.nodes = vec![Node {
                name: "HK-1".into(),
                proxy_type: ProxyType::Shadowsocks,
                alive: true,
                latency: None,
            }]
        })
        .unwrap();

    auto_switch(&server, &store, &settings_for(&server))
        .tick()
        .await;

    let nodes = store.read(|snap| snap.nodes.clone());
    assert_eq!(nodes.len(), 2);
    assert_eq!(nodes[0].latency, Some(60));
    assert_eq!(nodes[1].name, "SG-9");
    assert_eq!(nodes[1].proxy_type, ProxyType::Shadowsocks);
    assert_eq!(nodes[1].latency, Some(30));
}

#[tokio::test]
async fn test_no_reachable_node_skips() {
    let server = MockServer::start().await;
    mount_proxies(&server, proxies_body(&["HK-1"], "HK-1", &[])).await;
    Mock::given(method("GET"))
        .and(path("/proxies/HK-1/delay"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let store = store_for(&server);
    let outcome = auto_switch(&server, &store, &settings_for(&server))
        .tick()
        .await;
    assert!(matches!(outcome, TickOutcome::Skipped(_)));
}

#[tokio::test]
async fn test_unreachable_daemon_fails_the_tick() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/proxies"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let store = store_for(&server);
    let outcome = auto_switch(&server, &store, &settings_for(&server))
        .tick()
        .await;
    assert!(matches!(outcome, TickOutcome::Failed(_)));
    assert!(!store.read(|snap| snap.is_testing));
}

/// Polls until the daemon has seen a `GET /proxies`.
async fn catalog_fetched(server: &MockServer) -> bool {
    for _ in 0..100 {
        let requests = server.received_requests().await.unwrap_or_default();
        if requests.iter().any(|r| r.url.path() == "/proxies") {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_start_and_stop_manage_one_task() {
    let server = MockServer::start().await;
    mount_proxies(&server, proxies_body(&["HK-1"], "HK-1", &[])).await;
    mount_delay(&server, "HK-1", 40).await;

    let store = store_for(&server);
    let timer = Timer::new(Handle::current());
    let switch = auto_switch(&server, &store, &settings_for(&server));

    switch.stop(&timer);
    assert!(!timer.is_scheduled(TaskKind::AutoSwitch));

    switch.start(&timer, Duration::from_secs(300)).expect("start");
    assert!(catalog_fetched(&server).await, "start should tick right away");

    switch.start(&timer, Duration::from_secs(600)).expect("restart");
    assert!(timer.is_scheduled(TaskKind::AutoSwitch));
    assert_eq!(
        timer.interval_of(TaskKind::AutoSwitch),
        Some(Duration::from_secs(600))
    );
    assert!(!timer.is_scheduled(TaskKind::Traffic));

    switch.stop(&timer);
    assert!(!timer.is_scheduled(TaskKind::AutoSwitch));
    switch.stop(&timer);
    assert!(!timer.is_scheduled(TaskKind::AutoSwitch));
}
