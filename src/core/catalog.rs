use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
    config::Settings,
    error::{ConnectionIssue, Error, Result},
    ipc::{ControllerClient, Mode},
    logging,
    state::Store,
    utils::logging::Type,
};

/// Group whose members are the switchable nodes.
pub const SELECTION_GROUP: &str = "GLOBAL";
/// Active name meaning "no proxy".
pub const DIRECT_SENTINEL: &str = "DIRECT";

const RESERVED_NAMES: [&str; 3] = ["DIRECT", "REJECT", "GLOBAL"];

// 订阅信息伪节点: 剩余流量 / 距离下次重置 / 套餐到期 / 流量告警 / 过期时间
#[allow(clippy::expect_used)]
static BANNER_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new("剩余流量|距离下次重置|套餐到期|流量告警|过期时间").expect("banner pattern")
});

/// Proxy type as reported by the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ProxyType {
    Selector,
    URLTest,
    Fallback,
    LoadBalance,
    Relay,
    Direct,
    Reject,
    RejectDrop,
    Compatible,
    Pass,
    Dns,
    Shadowsocks,
    ShadowsocksR,
    Snell,
    Socks5,
    Http,
    Vmess,
    Vless,
    Trojan,
    Hysteria,
    Hysteria2,
    Tuic,
    WireGuard,
    Ssh,
    AnyTLS,
    Mieru,
    Unknown(String),
}

impl ProxyType {
    /// Group and built-in types that are never offered as nodes.
    pub fn is_group(&self) -> bool {
        matches!(
            self,
            ProxyType::Selector
                | ProxyType::URLTest
                | ProxyType::Fallback
                | ProxyType::LoadBalance
                | ProxyType::Relay
                | ProxyType::Direct
                | ProxyType::Reject
                | ProxyType::RejectDrop
                | ProxyType::Compatible
                | ProxyType::Pass
                | ProxyType::Dns
        )
    }

    pub fn as_str(&self) -> &str {
        match self {
            ProxyType::Selector => "Selector",
            ProxyType::URLTest => "URLTest",
            ProxyType::Fallback => "Fallback",
            ProxyType::LoadBalance => "LoadBalance",
            ProxyType::Relay => "Relay",
            ProxyType::Direct => "Direct",
            ProxyType::Reject => "Reject",
            ProxyType::RejectDrop => "RejectDrop",
            ProxyType::Compatible => "Compatible",
            ProxyType::Pass => "Pass",
            ProxyType::Dns => "Dns",
            ProxyType::Shadowsocks => "Shadowsocks",
            ProxyType::ShadowsocksR => "ShadowsocksR",
            ProxyType::Snell => "Snell",
            ProxyType::Socks5 => "Socks5",
            ProxyType::Http => "Http",
            ProxyType::Vmess => "Vmess",
            ProxyType::Vless => "Vless",
            ProxyType::Trojan => "Trojan",
            ProxyType::Hysteria => "Hysteria",
            ProxyType::Hysteria2 => "Hysteria2",
            ProxyType::Tuic => "Tuic",
            ProxyType::WireGuard => "WireGuard",
            ProxyType::Ssh => "Ssh",
            ProxyType::AnyTLS => "AnyTLS",
            ProxyType::Mieru => "Mieru",
            ProxyType::Unknown(raw) => raw,
        }
    }

    /// Short label for display.
    pub fn label(&self) -> &str {
        match self {
            ProxyType::Shadowsocks => "SS",
            ProxyType::ShadowsocksR => "SSR",
            ProxyType::Socks5 => "SOCKS5",
            ProxyType::Http => "HTTP",
            ProxyType::Vmess => "VMess",
            ProxyType::Vless => "VLESS",
            ProxyType::Hysteria2 => "HY2",
            ProxyType::Tuic => "TUIC",
            ProxyType::Ssh => "SSH",
            other => other.as_str(),
        }
    }
}

impl Default for ProxyType {
    fn default() -> Self {
        ProxyType::Unknown("unknown".to_string())
    }
}

impl From<String> for ProxyType {
    fn from(raw: String) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "selector" => ProxyType::Selector,
            "urltest" => ProxyType::URLTest,
            "fallback" => ProxyType::Fallback,
            "loadbalance" => ProxyType::LoadBalance,
            "relay" => ProxyType::Relay,
            "direct" => ProxyType::Direct,
            "reject" => ProxyType::Reject,
            "rejectdrop" => ProxyType::RejectDrop,
            "compatible" => ProxyType::Compatible,
            "pass" => ProxyType::Pass,
            "dns" => ProxyType::Dns,
            "shadowsocks" | "ss" => ProxyType::Shadowsocks,
            "shadowsocksr" | "ssr" => ProxyType::ShadowsocksR,
            "snell" => ProxyType::Snell,
            "socks5" => ProxyType::Socks5,
            "http" => ProxyType::Http,
            "vmess" => ProxyType::Vmess,
            "vless" => ProxyType::Vless,
            "trojan" => ProxyType::Trojan,
            "hysteria" => ProxyType::Hysteria,
            "hysteria2" => ProxyType::Hysteria2,
            "tuic" => ProxyType::Tuic,
            "wireguard" => ProxyType::WireGuard,
            "ssh" => ProxyType::Ssh,
            "anytls" => ProxyType::AnyTLS,
            "mieru" => ProxyType::Mieru,
            _ => ProxyType::Unknown(raw),
        }
    }
}

impl From<ProxyType> for String {
    fn from(value: ProxyType) -> Self {
        match value {
            ProxyType::Unknown(raw) => raw,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for ProxyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DelayRecord {
    #[serde(default)]
    pub delay: i64,
}

/// One entry of `GET /proxies`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProxyEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub proxy_type: ProxyType,
    pub alive: Option<bool>,
    pub all: Vec<String>,
    pub now: Option<String>,
    pub history: Vec<DelayRecord>,
}

impl ProxyEntry {
    /// Missing liveness counts as alive.
    pub fn is_alive(&self) -> bool {
        self.alive != Some(false)
    }

    /// Delay of the newest history entry; zero means never measured.
    pub fn last_delay(&self) -> Option<i64> {
        self.history.first().map(|h| h.delay).filter(|d| *d != 0)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProxyMap {
    #[serde(default)]
    pub proxies: HashMap<String, ProxyEntry>,
}

impl ProxyMap {
    pub fn get(&self, name: &str) -> Option<&ProxyEntry> {
        self.proxies.get(name)
    }

    pub fn group(&self, name: &str) -> Result<&ProxyEntry> {
        self.proxies
            .get(name)
            .ok_or_else(|| Error::GroupNotFound(name.to_string()))
    }
}

/// A selectable node; `latency` is `-1` after a failed probe and `None` when untested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub name: String,
    #[serde(rename = "type")]
    pub proxy_type: ProxyType,
    pub alive: bool,
    pub latency: Option<i64>,
}

/// A node as handed to a consumer, with the derived `current` flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeView {
    #[serde(flatten)]
    pub node: Node,
    pub current: bool,
}

pub fn node_views(nodes: &[Node], active: &str) -> Vec<NodeView> {
    nodes
        .iter()
        .map(|node| NodeView {
            current: node.name == active,
            node: node.clone(),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    /// Every member name of the selection group, unfiltered.
    pub group: Vec<String>,
    pub nodes: Vec<Node>,
    pub active: String,
}

pub fn is_banner(name: &str) -> bool {
    BANNER_PATTERN.is_match(name)
}

pub fn is_reserved(name: &str) -> bool {
    RESERVED_NAMES.contains(&name)
}

/// Members of `group` that are real, selectable nodes, in member order.
pub fn selectable_members<'a>(
    map: &'a ProxyMap,
    group: &'a ProxyEntry,
) -> Vec<(&'a str, &'a ProxyEntry)> {
    group
        .all
        .iter()
        .filter(|name| !is_banner(name) && !is_reserved(name))
        .filter_map(|name| map.get(name).map(|entry| (name.as_str(), entry)))
        .filter(|(_, entry)| !entry.proxy_type.is_group())
        .collect()
}

pub fn build_catalog(map: &ProxyMap) -> Result<Catalog> {
    let group = map.group(SELECTION_GROUP)?;
    let nodes = selectable_members(map, group)
        .into_iter()
        .map(|(name, entry)| Node {
            name: name.to_string(),
            proxy_type: entry.proxy_type.clone(),
            alive: entry.is_alive(),
            latency: entry.last_delay(),
        })
        .collect();

    Ok(Catalog {
        group: group.all.clone(),
        nodes,
        active: group.now.clone().unwrap_or_default(),
    })
}

/// Builds the node list from the live proxy map and owns the stored copy.
#[derive(Clone)]
pub struct NodeCatalog {
    client: ControllerClient,
}

impl NodeCatalog {
    pub fn new(client: ControllerClient) -> Self {
        Self { client }
    }

    pub async fn refresh(&self) -> Result<Catalog> {
        let map = self.client.get_proxies().await?;
        build_catalog(&map)
    }

    /// Liveness check, optional rule mode, then a refresh written to the store.
    ///
    /// On failure the classified message lands in `connectionError` and the
    /// stored nodes stay as they were.
    pub async fn connect(&self, store: &Store, settings: &Settings) -> Result<Catalog> {
        if settings.is_unconfigured() {
            logging!(info, Type::Catalog, "controller API not configured yet");
            store.update(|snap| {
                snap.nodes.clear();
                snap.current_node.clear();
                snap.connection_error = Some(ConnectionIssue::NotConfigured.message());
            })?;
            return Err(Error::NotConfigured);
        }

        match self.try_connect(store, settings).await {
            Ok(catalog) => Ok(catalog),
            Err((issue, err)) => {
                logging!(warn, Type::Catalog, "connect failed: {}", err);
                store.update(|snap| snap.connection_error = Some(issue.message()))?;
                Err(err)
            }
        }
    }

    async fn try_connect(
        &self,
        store: &Store,
        settings: &Settings,
    ) -> std::result::Result<Catalog, (ConnectionIssue, Error)> {
        self.client
            .hello()
            .await
            .map_err(|e| (ConnectionIssue::from_liveness(&e), e))?;

        let classified = |e: Error| (ConnectionIssue::classify(&e), e);
        store
            .update(|snap| snap.connection_error = None)
            .map_err(classified)?;

        if settings.rule_mode_on_connect
            && let Err(e) = self.client.patch_mode(Mode::Rule).await
        {
            logging!(warn, Type::Catalog, "failed to switch to rule mode: {}", e);
        }

        let catalog = self.refresh().await.map_err(classified)?;
        store
            .update(|snap| {
                snap.nodes = catalog.nodes.clone();
                snap.proxy_group = catalog.group.clone();
                snap.current_node = catalog.active.clone();
            })
            .map_err(classified)?;

        logging!(
            info,
            Type::Catalog,
            "catalog refreshed: {} nodes, active {}",
            catalog.nodes.len(),
            catalog.active
        );
        Ok(catalog)
    }
}
