use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 5 TiB; quotas at or above this are treated as unlimited.
pub const INFINITE_QUOTA_BYTES: u64 = 5 * (1 << 40);

const SECS_PER_DAY: i64 = 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Expired,
    Down,
    Error,
    #[default]
    Unknown,
}

impl HealthStatus {
    pub fn from_status(status: u16) -> Self {
        match status {
            200 => Self::Healthy,
            401 | 403 => Self::Expired,
            404 => Self::Down,
            _ => Self::Error,
        }
    }
}

/// A byte amount that may be unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "bytes")]
pub enum Quota {
    Limited(i64),
    Unbounded,
}

/// Counters carried by the `Subscription-Userinfo` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UserInfo {
    pub upload: u64,
    pub download: u64,
    pub total: u64,
    pub expire: Option<i64>,
}

impl UserInfo {
    /// Parses `upload=1; download=2; total=3; expire=1700000000`.
    ///
    /// Unknown keys are ignored; missing or unparsable counters are 0.
    pub fn parse(header: &str) -> Self {
        let mut info = UserInfo::default();
        for part in header.split(';') {
            let Some((key, value)) = part.split_once('=') else {
                continue;
            };
            let value = value.trim();
            match key.trim().to_ascii_lowercase().as_str() {
                "upload" => info.upload = parse_counter(value),
                "download" => info.download = parse_counter(value),
                "total" => info.total = parse_counter(value),
                "expire" => info.expire = value.parse::<i64>().ok().filter(|ts| *ts > 0),
                _ => {}
            }
        }
        info
    }
}

fn parse_counter(value: &str) -> u64 {
    value
        .parse::<u64>()
        .ok()
        .or_else(|| value.parse::<f64>().ok().map(|v| v.max(0.0) as u64))
        .unwrap_or(0)
}

/// Per-subscription usage derived from one header reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrafficSummary {
    pub upload: u64,
    pub download: u64,
    pub used: u64,
    /// Raw quota as reported, kept for aggregation even when unbounded.
    pub total_bytes: u64,
    pub total: Quota,
    pub remaining: Quota,
    /// `None` when the quota is unbounded.
    pub remaining_percent: Option<f64>,
    pub expire_at: Option<i64>,
    pub days_to_expiry: Option<i64>,
    pub is_infinite: bool,
}

impl TrafficSummary {
    pub fn derive(info: UserInfo, now: DateTime<Utc>) -> Self {
        let used = info.upload.saturating_add(info.download);
        let remaining = signed_difference(info.total, used);
        let is_infinite = info.total >= INFINITE_QUOTA_BYTES;

        let (total, remaining, remaining_percent) = if is_infinite {
            (Quota::Unbounded, Quota::Unbounded, None)
        } else {
            (
                Quota::Limited(i64::try_from(info.total).unwrap_or(i64::MAX)),
                Quota::Limited(remaining),
                Some(percent_of(remaining, info.total)),
            )
        };

        Self {
            upload: info.upload,
            download: info.download,
            used,
            total_bytes: info.total,
            total,
            remaining,
            remaining_percent,
            expire_at: info.expire,
            days_to_expiry: info.expire.map(|ts| days_until(ts, now)),
            is_infinite,
        }
    }
}

/// `total - used`, clamped into `i64` since both come from a remote header.
pub(crate) fn signed_difference(total: u64, used: u64) -> i64 {
    let diff = i128::from(total) - i128::from(used);
    i64::try_from(diff).unwrap_or(if diff < 0 { i64::MIN } else { i64::MAX })
}

pub(crate) fn percent_of(remaining: i64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        remaining as f64 / total as f64 * 100.0
    }
}

/// Whole days until `expire`, rounded up; zero or negative once expired.
pub fn days_until(expire: i64, now: DateTime<Utc>) -> i64 {
    let diff = expire - now.timestamp();
    let days = diff.div_euclid(SECS_PER_DAY);
    if diff.rem_euclid(SECS_PER_DAY) > 0 {
        days + 1
    } else {
        days
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub name: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traffic: Option<TrafficSummary>,
    #[serde(default)]
    pub health_status: HealthStatus,
    /// Set when the last pass produced no usage reading.
    #[serde(default)]
    pub traffic_error: bool,
}

impl Subscription {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            traffic: None,
            health_status: HealthStatus::Unknown,
            traffic_error: false,
        }
    }

    /// The subscription URL with `flag=clash` appended.
    pub fn probe_url(&self) -> String {
        let connector = if self.url.contains('?') { '&' } else { '?' };
        format!("{}{}flag=clash", self.url, connector)
    }
}
