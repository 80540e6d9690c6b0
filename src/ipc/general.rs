use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{
    config::Settings,
    core::catalog::ProxyMap,
    error::{Error, Result},
    logging,
    utils::logging::Type,
};

/// Deadline for control calls that do not pass their own.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

// 定义用于URL路径的编码集合，只编码真正必要的字符
const URL_PATH_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'/')
    .add(b'?')
    .add(b'#')
    .add(b'&')
    .add(b'%');

const FAILURE_WARN_THRESHOLD: u64 = 3;

fn encode_segment(segment: &str) -> String {
    utf8_percent_encode(segment, URL_PATH_ENCODE_SET).to_string()
}

// 连续失败计数
#[derive(Debug, Default)]
struct ConnectionStats {
    consecutive_failures: AtomicU64,
}

impl ConnectionStats {
    fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
    }

    /// Returns the consecutive failure count including this one.
    fn record_failure(&self) -> u64 {
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Traffic routing mode of the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[serde(alias = "Rule")]
    Rule,
    #[serde(alias = "Global")]
    Global,
    #[serde(alias = "Direct")]
    Direct,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Rule => "rule",
            Mode::Global => "global",
            Mode::Direct => "direct",
        }
    }
}

impl FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "rule" => Ok(Mode::Rule),
            "global" => Ok(Mode::Global),
            "direct" => Ok(Mode::Direct),
            other => Err(Error::Decode(format!("unknown mode {other}"))),
        }
    }
}

/// Client for the daemon's RESTful control API.
///
/// The only place that attaches the bearer secret and enforces deadlines.
/// It never retries; callers decide what a failure means.
#[derive(Clone)]
pub struct ControllerClient {
    client: Client,
    base: String,
    secret: String,
    stats: Arc<ConnectionStats>,
}

impl ControllerClient {
    pub fn new(base: &str, secret: &str) -> Result<Self> {
        // The controller is local; never route control calls through a system proxy.
        let client = Client::builder()
            .no_proxy()
            .build()
            .map_err(|e| Error::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base: base.trim_end_matches('/').to_string(),
            secret: secret.to_string(),
            stats: Arc::new(ConnectionStats::default()),
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(&settings.api_url, &settings.api_secret)
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// Issues one request and parses the JSON body; an empty body parses as `null`.
    pub async fn call(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
        timeout: Duration,
    ) -> Result<Value> {
        let url = format!("{}{}", self.base, endpoint);
        let mut request = self
            .client
            .request(method.clone(), &url)
            .bearer_auth(&self.secret)
            .timeout(timeout);
        if let Some(body) = body {
            request = request.json(body);
        }

        match self.execute(request, timeout).await {
            Ok(value) => {
                self.stats.record_success();
                Ok(value)
            }
            Err(err) => {
                let consecutive = self.stats.record_failure();
                logging!(debug, Type::Ipc, "请求失败 [{}] {}: {}", method, endpoint, err);
                if consecutive == FAILURE_WARN_THRESHOLD {
                    logging!(
                        warn,
                        Type::Ipc,
                        "{} consecutive controller failures, last: {}",
                        consecutive,
                        err
                    );
                }
                Err(err)
            }
        }
    }

    async fn execute(&self, request: reqwest::RequestBuilder, timeout: Duration) -> Result<Value> {
        let response = request
            .send()
            .await
            .map_err(|e| Error::from_reqwest(e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Http {
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| Error::from_reqwest(e, timeout))?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(&body)?)
    }

    /// Liveness check on `GET /`.
    pub async fn hello(&self) -> Result<Value> {
        self.call(Method::GET, "/", None, DEFAULT_TIMEOUT).await
    }

    pub async fn get_proxies(&self) -> Result<ProxyMap> {
        let value = self
            .call(Method::GET, "/proxies", None, DEFAULT_TIMEOUT)
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Switches `group` to `name`.
    pub async fn select_proxy(&self, group: &str, name: &str) -> Result<()> {
        let url = format!("/proxies/{}", encode_segment(group));
        let payload = json!({ "name": name });
        self.call(Method::PUT, &url, Some(&payload), DEFAULT_TIMEOUT)
            .await?;
        logging!(info, Type::Ipc, "switched {} -> {}", group, name);
        Ok(())
    }

    /// One latency probe through `name`.
    ///
    /// The daemon is asked to give up at half the client deadline so a slow node
    /// comes back as a daemon-side failure rather than a client timeout.
    pub async fn proxy_delay(&self, name: &str, test_url: &str, deadline: Duration) -> Result<i64> {
        let daemon_timeout = (deadline.as_millis() / 2).max(1);
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("timeout", &daemon_timeout.to_string())
            .append_pair("url", test_url)
            .finish();
        let url = format!("/proxies/{}/delay?{}", encode_segment(name), query);

        let value = self.call(Method::GET, &url, None, deadline).await?;
        value
            .get("delay")
            .and_then(Value::as_i64)
            .ok_or_else(|| Error::Decode(format!("delay response without delay: {value}")))
    }

    pub async fn get_configs(&self) -> Result<Value> {
        self.call(Method::GET, "/configs", None, DEFAULT_TIMEOUT)
            .await
    }

    pub async fn get_mode(&self) -> Result<Mode> {
        let config = self.get_configs().await?;
        config
            .get("mode")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Decode("configs without mode".to_string()))?
            .parse()
    }

    pub async fn patch_mode(&self, mode: Mode) -> Result<()> {
        let payload = json!({ "mode": mode.as_str() });
        self.call(Method::PATCH, "/configs", Some(&payload), DEFAULT_TIMEOUT)
            .await?;
        Ok(())
    }
}
