//! Shared fixtures: a mock controller API and stores wired to it.
#![allow(dead_code)]

use std::sync::Arc;

use app_lib::{
    config::Settings,
    core::AppContext,
    ipc::ControllerClient,
    state::{Snapshot, Store},
};
use serde_json::{Value, json};
use tokio::runtime::Handle;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const SECRET: &str = "s3cret";

pub fn settings_for(server: &MockServer) -> Settings {
    Settings {
        api_url: server.uri(),
        api_secret: SECRET.to_string(),
        ..Settings::default()
    }
}

pub fn client_for(server: &MockServer) -> ControllerClient {
    ControllerClient::new(&server.uri(), SECRET).expect("client")
}

pub fn store_for(server: &MockServer) -> Arc<Store> {
    Arc::new(Store::with_snapshot(Snapshot {
        settings: settings_for(server),
        ..Snapshot::default()
    }))
}

pub fn context_for(server: &MockServer) -> AppContext {
    AppContext::new(store_for(server), Handle::current()).expect("context")
}

/// `GET /proxies` body with a `GLOBAL` selector over `members`.
///
/// Every member is a Shadowsocks leaf unless listed in `groups`.
pub fn proxies_body(members: &[&str], now: &str, groups: &[(&str, &str)]) -> Value {
    let mut proxies = serde_json::Map::new();
    proxies.insert(
        "GLOBAL".into(),
        json!({"name": "GLOBAL", "type": "Selector", "all": members, "now": now}),
    );
    for name in members {
        let kind = groups
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, kind)| *kind)
            .unwrap_or("Shadowsocks");
        proxies.insert(
            name.to_string(),
            json!({"name": name, "type": kind, "history": []}),
        );
    }
    json!({ "proxies": proxies })
}

pub async fn mount_proxies(server: &MockServer, body: Value) {
    Mock::given(method("GET"))
        .and(path("/proxies"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

pub async fn mount_hello(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"hello": "mihomo"})))
        .mount(server)
        .await;
}

pub async fn mount_delay(server: &MockServer, name: &str, delay: i64) {
    Mock::given(method("GET"))
        .and(path(format!("/proxies/{name}/delay")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "delay": delay })))
        .mount(server)
        .await;
}

pub fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}
