use std::sync::Arc;

use app_lib::{
    cmd::{Request, Response, dispatch},
    config::Settings,
    core::AppContext,
    error::ConnectionIssue,
    state::{Snapshot, Store},
};
use serde_json::{Value, json};
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod common;

use common::{SECRET, context_for, mount_delay, mount_proxies, proxies_body};

async fn send(ctx: &app_lib::core::AppContext, message: Value) -> Value {
    let request: Request = serde_json::from_value(message).expect("request");
    let response: Response = dispatch(ctx, request).await;
    serde_json::to_value(response).expect("response")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_disconnect_is_idempotent() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/proxies/GLOBAL"))
        .and(body_json(json!({"name": "DIRECT"})))
        .respond_with(ResponseTemplate::new(204))
        .expect(2)
        .mount(&server)
        .await;

    let ctx = context_for(&server);
    for _ in 0..2 {
        let reply = send(&ctx, json!({"action": "disconnect"})).await;
        assert_eq!(reply["success"], true);
    }
    assert_eq!(ctx.store().read(|snap| snap.current_node.clone()), "DIRECT");

    let nodes = send(&ctx, json!({"action": "getNodes"})).await;
    assert_eq!(nodes["data"]["currentNode"], "DIRECT");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_connect_accepts_name_or_node() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/proxies/GLOBAL"))
        .respond_with(ResponseTemplate::new(204))
        .expect(2)
        .mount(&server)
        .await;

    let ctx = context_for(&server);
    let reply = send(&ctx, json!({"action": "connect", "node": "HK-1"})).await;
    assert_eq!(reply["data"]["message"], "Connected: HK-1");

    let reply = send(&ctx, json!({"action": "connect", "node": {"name": "JP-2"}})).await;
    assert_eq!(reply["success"], true);
    assert_eq!(ctx.store().read(|snap| snap.current_node.clone()), "JP-2");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_all_delays_updates_the_store() {
    let server = MockServer::start().await;
    mount_proxies(&server, proxies_body(&["HK-1", "JP-2"], "HK-1", &[])).await;
    mount_delay(&server, "HK-1", 150).await;
    mount_delay(&server, "JP-2", 70).await;

    let ctx = context_for(&server);
    let reply = send(&ctx, json!({"action": "testAllDelays"})).await;
    assert_eq!(
        reply["data"],
        json!([{"name": "JP-2", "delay": 70}, {"name": "HK-1", "delay": 150}])
    );

    let nodes = send(&ctx, json!({"action": "getNodes"})).await;
    assert_eq!(nodes["data"]["nodes"][0]["name"], "HK-1");
    assert_eq!(nodes["data"]["nodes"][0]["latency"], 150);
    assert_eq!(nodes["data"]["nodes"][0]["current"], true);

    let progress = send(&ctx, json!({"action": "getTestProgress"})).await;
    assert_eq!(progress["data"]["isTesting"], false);
    assert_eq!(progress["data"]["progress"], Value::Null);
    assert_eq!(progress["data"]["total"], 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_single_delay() {
    let server = MockServer::start().await;
    mount_delay(&server, "HK-1", 42).await;

    let ctx = context_for(&server);
    let reply = send(&ctx, json!({"action": "testDelay", "nodeName": "HK-1"})).await;
    assert_eq!(reply["data"], json!({"name": "HK-1", "delay": 42}));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_traffic_update_without_subscriptions_fails() {
    let server = MockServer::start().await;
    let ctx = context_for(&server);

    let reply = send(&ctx, json!({"action": "updateTrafficInfo"})).await;
    assert_eq!(reply["success"], false);
    assert_eq!(reply["error"], "subscription list is empty");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_saved_subscriptions_are_reloaded() {
    let server = MockServer::start().await;
    let ctx = context_for(&server);

    let reply = send(
        &ctx,
        json!({
            "action": "saveSubscriptions",
            "subscriptions": [{"name": "main", "url": "https://example.com/sub"}]
        }),
    )
    .await;
    assert_eq!(reply["success"], true);
    assert_eq!(reply["data"]["subscriptions"][0]["name"], "main");
    assert_eq!(ctx.runtime().traffic.subscriptions().len(), 1);

    let reply = send(&ctx, json!({"action": "reloadSubscriptions"})).await;
    assert_eq!(reply["data"]["subscriptions"][0]["healthStatus"], "unknown");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_mode_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/configs"))
        .and(body_json(json!({"mode": "global"})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/configs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"mode": "global"})))
        .mount(&server)
        .await;

    let ctx = context_for(&server);
    let reply = send(&ctx, json!({"action": "switchMode", "mode": "Global"})).await;
    assert_eq!(reply["success"], true);

    let reply = send(&ctx, json!({"action": "getCurrentMode"})).await;
    assert_eq!(reply["data"]["mode"], "global");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_smart_connect_against_dead_daemon_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/proxies"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let ctx = context_for(&server);
    let reply = send(&ctx, json!({"action": "triggerSmartConnect"})).await;
    assert_eq!(reply["success"], false);
}

fn unreachable_context() -> AppContext {
    let store = Store::with_snapshot(Snapshot {
        settings: Settings {
            api_url: "http://127.0.0.1:1".into(),
            api_secret: SECRET.into(),
            ..Settings::default()
        },
        ..Snapshot::default()
    });
    AppContext::new(Arc::new(store), tokio::runtime::Handle::current()).expect("context")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unreachable_daemon_gets_a_short_message() {
    let ctx = unreachable_context();
    let unreachable = ConnectionIssue::Unreachable.message();

    let reply = send(&ctx, json!({"action": "reloadNodes"})).await;
    assert_eq!(reply["success"], false);
    assert_eq!(reply["error"], unreachable.as_str());

    ctx.store()
        .update(|snap| snap.connection_error = None)
        .expect("clear");
    let reply = send(&ctx, json!({"action": "testAllDelays"})).await;
    assert_eq!(reply["success"], false);
    assert_eq!(reply["error"], unreachable.as_str());
    assert_eq!(
        ctx.store().read(|snap| snap.connection_error.clone()),
        Some(unreachable)
    );
    assert!(!ctx.is_testing());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_daemon_not_serving_is_reported_as_such() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let ctx = context_for(&server);
    let reply = send(&ctx, json!({"action": "updateNodes"})).await;
    assert_eq!(reply["success"], false);
    assert_eq!(
        reply["error"],
        ConnectionIssue::DaemonNotResponding.message().as_str()
    );
}
