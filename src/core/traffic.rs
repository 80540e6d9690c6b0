use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use parking_lot::RwLock;
use reqwest::{
    Client,
    header::{ACCEPT, USER_AGENT},
};
use serde::{Deserialize, Serialize};

use crate::{
    config::{
        HealthStatus, Quota, Subscription, TrafficSummary, UserInfo, percent_of, signed_difference,
    },
    error::{Error, Result},
    logging,
    state::Store,
    utils::logging::Type,
};

pub const PROBE_USER_AGENT: &str = "clash-verge/1.3.8";
pub const PROBE_ACCEPT: &str = "application/vnd.clash.config";
pub const USERINFO_HEADER: &str = "subscription-userinfo";

const HEAD_TIMEOUT: Duration = Duration::from_secs(10);
const FETCH_TIMEOUT: Duration = Duration::from_secs(15);

const UNAVAILABLE_MESSAGE: &str = "no subscription reported usage information";

/// Usage summed over every subscription that produced a reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateTraffic {
    pub upload: u64,
    pub download: u64,
    pub used: u64,
    pub total: Quota,
    pub remaining: Quota,
    pub remaining_percent: Option<f64>,
    /// Soonest expiry among contributors; zero or negative once one expired.
    pub days_to_expiry: Option<i64>,
    pub count: usize,
    pub is_infinite: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum TrafficSnapshot {
    #[default]
    NoSubscriptions,
    /// Subscriptions exist but none produced a reading.
    Unavailable,
    Available(AggregateTraffic),
}

impl TrafficSnapshot {
    pub fn available(&self) -> Option<&AggregateTraffic> {
        match self {
            TrafficSnapshot::Available(agg) => Some(agg),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<String> {
        match self {
            TrafficSnapshot::Unavailable => Some(UNAVAILABLE_MESSAGE.to_string()),
            _ => None,
        }
    }
}

/// Folds the current readings into a fresh snapshot.
pub fn aggregate(subscriptions: &[Subscription]) -> TrafficSnapshot {
    if subscriptions.is_empty() {
        return TrafficSnapshot::NoSubscriptions;
    }
    let readings: Vec<&TrafficSummary> = subscriptions
        .iter()
        .filter_map(|s| s.traffic.as_ref())
        .collect();
    if readings.is_empty() {
        return TrafficSnapshot::Unavailable;
    }

    let sum = |field: fn(&TrafficSummary) -> u64| {
        readings
            .iter()
            .fold(0u64, |acc, t| acc.saturating_add(field(t)))
    };
    let upload = sum(|t| t.upload);
    let download = sum(|t| t.download);
    let used = sum(|t| t.used);
    let total_bytes = sum(|t| t.total_bytes);
    let is_infinite = readings.iter().any(|t| t.is_infinite);
    let days_to_expiry = readings.iter().filter_map(|t| t.days_to_expiry).min();

    let (total, remaining, remaining_percent) = if is_infinite {
        (Quota::Unbounded, Quota::Unbounded, None)
    } else {
        let remaining = signed_difference(total_bytes, used);
        (
            Quota::Limited(i64::try_from(total_bytes).unwrap_or(i64::MAX)),
            Quota::Limited(remaining),
            Some(percent_of(remaining, total_bytes)),
        )
    };

    TrafficSnapshot::Available(AggregateTraffic {
        upload,
        download,
        used,
        total,
        remaining,
        remaining_percent,
        days_to_expiry,
        count: readings.len(),
        is_infinite,
    })
}

/// Copies fresh readings onto the matching entries of `list` (same name and url).
/// Entries without a reading are left as they are.
pub fn apply_readings(list: &mut [Subscription], readings: &[Subscription]) {
    for sub in list.iter_mut() {
        if let Some(reading) = readings
            .iter()
            .find(|r| r.name == sub.name && r.url == sub.url)
        {
            sub.health_status = reading.health_status;
            sub.traffic = reading.traffic.clone();
            sub.traffic_error = reading.traffic_error;
        }
    }
}

/// Polls every subscription for health and quota and keeps the aggregate current.
#[derive(Clone)]
pub struct TrafficAggregator {
    http: Client,
    store: Arc<Store>,
    subscriptions: Arc<RwLock<Vec<Subscription>>>,
    updating: Arc<AtomicBool>,
}

impl TrafficAggregator {
    /// `updating` is the overlap guard; share it between instances that must not
    /// refresh at the same time.
    pub fn new(store: Arc<Store>, updating: Arc<AtomicBool>) -> Result<Self> {
        let http = Client::builder()
            .build()
            .map_err(|e| Error::Network(format!("failed to build HTTP client: {e}")))?;
        let aggregator = Self {
            http,
            store,
            subscriptions: Arc::new(RwLock::new(Vec::new())),
            updating,
        };
        aggregator.reload_subscriptions();
        Ok(aggregator)
    }

    /// Re-reads the subscription list from the store.
    pub fn reload_subscriptions(&self) -> usize {
        let list = self.store.read(|snap| snap.subscriptions.clone());
        let count = list.len();
        *self.subscriptions.write() = list;
        logging!(debug, Type::Traffic, "loaded {} subscriptions", count);
        count
    }

    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.subscriptions.read().clone()
    }

    pub fn is_updating(&self) -> bool {
        self.updating.load(Ordering::SeqCst)
    }

    /// One aggregation pass. Returns `None` when a pass is already in flight.
    pub async fn refresh(&self) -> Result<Option<TrafficSnapshot>> {
        if self
            .updating
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            logging!(debug, Type::Traffic, "traffic refresh already running, skipped");
            return Ok(None);
        }
        let updating = Arc::clone(&self.updating);
        let _guard = scopeguard::guard((), move |()| updating.store(false, Ordering::SeqCst));

        let current = self.subscriptions();
        if current.is_empty() {
            self.store.update(|snap| {
                snap.traffic_info = TrafficSnapshot::NoSubscriptions;
                snap.traffic_error = None;
            })?;
            return Ok(Some(TrafficSnapshot::NoSubscriptions));
        }

        let now = Utc::now();
        let readings: Vec<Subscription> =
            join_all(current.iter().map(|sub| self.probe(sub, now))).await;

        // the list may have been edited meanwhile; only touch entries still present
        let (merged, snapshot) = self.store.update(|snap| {
            apply_readings(&mut snap.subscriptions, &readings);
            let snapshot = aggregate(&snap.subscriptions);
            snap.traffic_info = snapshot.clone();
            snap.traffic_error = snapshot.error_message();
            (snap.subscriptions.clone(), snapshot)
        })?;

        if let TrafficSnapshot::Available(agg) = &snapshot {
            logging!(
                info,
                Type::Traffic,
                "traffic updated from {}/{} subscriptions",
                agg.count,
                merged.len()
            );
        } else {
            logging!(warn, Type::Traffic, "{}", UNAVAILABLE_MESSAGE);
        }

        *self.subscriptions.write() = merged;
        Ok(Some(snapshot))
    }

    /// Health probe plus usage read for one subscription. Never fails; a failure
    /// is recorded on the returned copy.
    async fn probe(&self, sub: &Subscription, now: DateTime<Utc>) -> Subscription {
        let mut out = sub.clone();
        match self.read_usage(sub, now).await {
            Ok((health, traffic)) => {
                out.health_status = health;
                out.traffic_error = traffic.is_none();
                out.traffic = traffic;
            }
            Err(e) => {
                logging!(debug, Type::Traffic, "subscription {} failed: {}", sub.name, e);
                out.health_status = HealthStatus::Error;
                out.traffic_error = true;
                out.traffic = None;
            }
        }
        out
    }

    async fn read_usage(
        &self,
        sub: &Subscription,
        now: DateTime<Utc>,
    ) -> Result<(HealthStatus, Option<TrafficSummary>)> {
        let url = sub.probe_url();
        let head = self
            .http
            .head(&url)
            .header(USER_AGENT, PROBE_USER_AGENT)
            .header(ACCEPT, PROBE_ACCEPT)
            .timeout(HEAD_TIMEOUT)
            .send()
            .await
            .map_err(|e| Error::from_reqwest(e, HEAD_TIMEOUT))?;

        // only 200 is healthy; other statuses, 2xx included, skip the usage read
        let health = HealthStatus::from_status(head.status().as_u16());
        if health != HealthStatus::Healthy {
            return Ok((health, None));
        }

        let full = self
            .http
            .get(&url)
            .header(USER_AGENT, PROBE_USER_AGENT)
            .header(ACCEPT, PROBE_ACCEPT)
            .timeout(FETCH_TIMEOUT)
            .send()
            .await
            .map_err(|e| Error::from_reqwest(e, FETCH_TIMEOUT))?;

        let traffic = full
            .headers()
            .get(USERINFO_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|raw| TrafficSummary::derive(UserInfo::parse(raw), now));
        Ok((health, traffic))
    }
}
