use std::time::Duration;

use app_lib::{
    cmd::{Request, Response, dispatch},
    config::Settings,
    core::timer::TaskKind,
};
use serde_json::{Value, json};
use wiremock::MockServer;

mod common;

use common::{context_for, mount_hello, mount_proxies, proxies_body, settings_for};

async fn mount_daemon(server: &MockServer) {
    mount_hello(server).await;
    mount_proxies(server, proxies_body(&["HK-1"], "HK-1", &[])).await;
}

fn smart(server: &MockServer, interval_secs: u64) -> Settings {
    Settings {
        smart_connect: true,
        auto_switch_interval_secs: interval_secs,
        traffic_interval_secs: 900,
        ..settings_for(server)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_reload_replaces_the_timers() {
    let server = MockServer::start().await;
    mount_daemon(&server).await;

    let ctx = context_for(&server);
    ctx.store()
        .update(|snap| snap.settings = smart(&server, 600))
        .expect("save");
    ctx.reload().expect("reload");
    let timer = ctx.timer();
    assert_eq!(
        timer.interval_of(TaskKind::AutoSwitch),
        Some(Duration::from_secs(600))
    );
    assert_eq!(
        timer.interval_of(TaskKind::Traffic),
        Some(Duration::from_secs(900))
    );

    ctx.store()
        .update(|snap| {
            snap.settings.smart_connect = false;
            snap.settings.traffic_interval_secs = 1200;
        })
        .expect("save");
    let runtime = ctx.reload().expect("reload");
    assert!(!runtime.settings.smart_connect);
    assert!(!timer.is_scheduled(TaskKind::AutoSwitch));
    assert_eq!(
        timer.interval_of(TaskKind::Traffic),
        Some(Duration::from_secs(1200))
    );

    ctx.stop();
    assert!(!timer.is_scheduled(TaskKind::Traffic));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_settings_update_without_smart_connect_drops_the_loop() {
    let server = MockServer::start().await;
    mount_daemon(&server).await;

    let ctx = context_for(&server);
    ctx.store()
        .update(|snap| snap.settings = smart(&server, 600))
        .expect("save");
    ctx.start().expect("start");
    assert!(ctx.timer().is_scheduled(TaskKind::AutoSwitch));

    let settings = Settings {
        smart_connect: false,
        ..settings_for(&server)
    };
    let request: Request = serde_json::from_value(json!({
        "action": "updateSettings",
        "settings": serde_json::to_value(&settings).expect("settings"),
    }))
    .expect("request");
    let response: Response = dispatch(&ctx, request).await;
    let reply: Value = serde_json::to_value(response).expect("response");

    assert_eq!(reply["success"], true);
    assert_eq!(reply["data"]["message"], "Settings updated, reconnected");
    assert!(!ctx.timer().is_scheduled(TaskKind::AutoSwitch));
    assert!(ctx.timer().is_scheduled(TaskKind::Traffic));
    assert_eq!(ctx.runtime().settings, settings);
    ctx.stop();
}
