use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};

use crate::{
    config::clamp_concurrency,
    core::catalog::Node,
    error::{Error, Result},
    ipc::ControllerClient,
    logging, logging_error,
    state::Store,
    utils::logging::Type,
};

/// Delay recorded for a probe that failed, timed out or was never run.
pub const FAILED_DELAY: i64 = -1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub name: String,
    pub delay: i64,
}

impl ProbeResult {
    pub fn is_valid(&self) -> bool {
        self.delay > 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestProgress {
    pub completed: usize,
    pub total: usize,
    /// Every result collected so far, in completion order.
    pub current: Vec<ProbeResult>,
    pub started_at: i64,
}

/// System-wide "a batch is running" flag shared by every tester instance.
#[derive(Debug, Default)]
pub struct TestRunToken {
    running: AtomicBool,
}

impl TestRunToken {
    pub fn try_acquire(&self) -> bool {
        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn release(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Where a batch reports its progress.
pub trait ProgressSink: Send + Sync {
    fn begin(&self, total: usize, started_at: i64) -> Result<()>;

    fn publish(&self, progress: &TestProgress) -> Result<()>;

    /// Clears the running flag and the progress record. Must not fail.
    fn finish(&self);
}

impl ProgressSink for Store {
    fn begin(&self, total: usize, started_at: i64) -> Result<()> {
        self.update(|snap| {
            snap.is_testing = true;
            snap.test_total = total;
            snap.test_progress = Some(TestProgress {
                completed: 0,
                total,
                current: Vec::new(),
                started_at,
            });
        })
    }

    fn publish(&self, progress: &TestProgress) -> Result<()> {
        self.update(|snap| snap.test_progress = Some(progress.clone()))
    }

    fn finish(&self) {
        logging_error!(
            Type::SpeedTest,
            result => self.update(|snap| {
                snap.is_testing = false;
                snap.test_progress = None;
            })
        );
    }
}

#[derive(Clone)]
pub struct LatencyTester {
    client: ControllerClient,
    test_url: String,
    token: Arc<TestRunToken>,
    sink: Arc<dyn ProgressSink>,
}

impl LatencyTester {
    pub fn new(
        client: ControllerClient,
        test_url: impl Into<String>,
        token: Arc<TestRunToken>,
        sink: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            client,
            test_url: test_url.into(),
            token,
            sink,
        }
    }

    pub fn is_running(&self) -> bool {
        self.token.is_running()
    }

    /// Probes one node; any failure is reported as [`FAILED_DELAY`].
    pub async fn run_one(&self, name: &str, timeout: Duration) -> i64 {
        match self.client.proxy_delay(name, &self.test_url, timeout).await {
            Ok(delay) => delay,
            Err(e) => {
                logging!(debug, Type::SpeedTest, "probe {} failed: {}", name, e);
                FAILED_DELAY
            }
        }
    }

    /// Probes every name in windows of `concurrency`, sorted fastest first.
    ///
    /// Fails with [`Error::AlreadyRunning`] while another batch holds the token.
    /// The running flag and progress record are cleared however the batch ends,
    /// including when this future is dropped.
    pub async fn run_all(
        &self,
        names: &[String],
        concurrency: usize,
        timeout: Duration,
    ) -> Result<Vec<ProbeResult>> {
        if !self.token.try_acquire() {
            logging!(info, Type::SpeedTest, "latency test already running, rejected");
            return Err(Error::AlreadyRunning);
        }
        let sink = Arc::clone(&self.sink);
        let token = Arc::clone(&self.token);
        let _cleanup = scopeguard::guard((), move |()| {
            sink.finish();
            token.release();
        });

        let concurrency = clamp_concurrency(concurrency);
        let total = names.len();
        let started_at = chrono::Utc::now().timestamp_millis();
        let mut results: Vec<ProbeResult> = Vec::with_capacity(total);

        logging!(
            info,
            Type::SpeedTest,
            "testing {} nodes, {} at a time",
            total,
            concurrency
        );
        self.sink.begin(total, started_at)?;

        for window in names.chunks(concurrency) {
            let probes = window.iter().map(|name| async move {
                ProbeResult {
                    name: name.clone(),
                    delay: self.run_one(name, timeout).await,
                }
            });
            results.extend(join_all(probes).await);

            self.sink.publish(&TestProgress {
                completed: results.len(),
                total,
                current: results.clone(),
                started_at,
            })?;
        }

        let results = finalize(names, results);
        logging!(
            info,
            Type::SpeedTest,
            "latency test done: {}/{} reachable",
            results.iter().filter(|r| r.is_valid()).count(),
            total
        );
        Ok(results)
    }
}

/// Gives every name without a result [`FAILED_DELAY`] and sorts fastest first,
/// failures last.
pub fn finalize(names: &[String], results: Vec<ProbeResult>) -> Vec<ProbeResult> {
    let mut by_name: HashMap<String, i64> =
        results.into_iter().map(|r| (r.name, r.delay)).collect();
    let mut out: Vec<ProbeResult> = names
        .iter()
        .map(|name| ProbeResult {
            name: name.clone(),
            delay: by_name.remove(name).unwrap_or(FAILED_DELAY),
        })
        .collect();
    sort_results(&mut out);
    out
}

pub fn sort_results(results: &mut [ProbeResult]) {
    results.sort_by_key(|r| (r.delay < 0, r.delay));
}

/// The fastest result with a positive delay.
pub fn best(results: &[ProbeResult]) -> Option<&ProbeResult> {
    results
        .iter()
        .filter(|r| r.is_valid())
        .min_by_key(|r| r.delay)
}

/// Writes delays into `nodes` by name and returns the results that matched no node.
pub fn merge_latencies<'a>(
    nodes: &mut [Node],
    results: &'a [ProbeResult],
) -> Vec<&'a ProbeResult> {
    let index: HashMap<&str, &ProbeResult> =
        results.iter().map(|r| (r.name.as_str(), r)).collect();
    for node in nodes.iter_mut() {
        if let Some(result) = index.get(node.name.as_str()) {
            node.latency = Some(result.delay);
        }
    }
    results
        .iter()
        .filter(|r| !nodes.iter().any(|n| n.name == r.name))
        .collect()
}
