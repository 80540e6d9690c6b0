use std::sync::Arc;
use std::time::Duration;

use crate::{
    config::Settings,
    core::{
        catalog::{Node, SELECTION_GROUP, selectable_members},
        tester::{LatencyTester, best, merge_latencies},
        timer::{TaskKind, Timer},
    },
    error::{Error, Result},
    ipc::ControllerClient,
    logging,
    state::Store,
    utils::logging::Type,
};

/// What one tick did. Informational only; a tick never fails its caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Skipped(&'static str),
    /// The fastest node is already active.
    Kept(String),
    Switched { from: String, to: String },
    Failed(String),
}

/// True when `name` contains any keyword; no keywords lets everything through.
///
/// Keywords are expected lowercased, as produced by [`crate::config::parse_keywords`].
pub fn matches_keywords(name: &str, keywords: &[String]) -> bool {
    if keywords.is_empty() {
        return true;
    }
    let name = name.to_lowercase();
    keywords.iter().any(|k| name.contains(k.as_str()))
}

/// Periodically moves the selection group to the fastest node.
#[derive(Clone)]
pub struct AutoSwitch {
    client: ControllerClient,
    tester: LatencyTester,
    store: Arc<Store>,
    keywords: Vec<String>,
    concurrency: usize,
    timeout: Duration,
}

impl AutoSwitch {
    pub fn new(
        client: ControllerClient,
        tester: LatencyTester,
        store: Arc<Store>,
        settings: &Settings,
    ) -> Self {
        Self {
            client,
            tester,
            store,
            keywords: settings.keywords(),
            concurrency: settings.concurrency(),
            timeout: settings.probe_timeout(),
        }
    }

    /// Schedules the loop and runs one tick immediately. Restarts when already running.
    pub fn start(&self, timer: &Timer, interval: Duration) -> Result<()> {
        self.stop(timer);

        let this = self.clone();
        timer.schedule(TaskKind::AutoSwitch, interval, move || {
            let this = this.clone();
            async move {
                this.tick().await;
            }
        })?;

        let this = self.clone();
        timer.run_now(TaskKind::AutoSwitch, async move {
            this.tick().await;
        });
        logging!(
            info,
            Type::AutoSwitch,
            "smart connect started, every {}s",
            interval.as_secs()
        );
        Ok(())
    }

    pub fn stop(&self, timer: &Timer) {
        if timer.cancel(TaskKind::AutoSwitch) {
            logging!(info, Type::AutoSwitch, "smart connect stopped");
        }
    }

    pub async fn tick(&self) -> TickOutcome {
        let outcome = match self.try_tick().await {
            Ok(outcome) => outcome,
            Err(Error::AlreadyRunning) => TickOutcome::Skipped("latency test already running"),
            Err(e) => TickOutcome::Failed(e.to_string()),
        };
        match &outcome {
            TickOutcome::Skipped(reason) => {
                logging!(debug, Type::AutoSwitch, "tick skipped: {}", reason)
            }
            TickOutcome::Kept(name) => {
                logging!(info, Type::AutoSwitch, "{} is still the fastest", name)
            }
            TickOutcome::Switched { from, to } => {
                logging!(info, Type::AutoSwitch, "switched {} -> {}", from, to)
            }
            TickOutcome::Failed(e) => logging!(warn, Type::AutoSwitch, "tick failed: {}", e),
        }
        outcome
    }

    async fn try_tick(&self) -> Result<TickOutcome> {
        let map = self.client.get_proxies().await?;
        let group = map.group(SELECTION_GROUP)?;
        let active = group.now.clone().unwrap_or_default();

        let candidates: Vec<String> = selectable_members(&map, group)
            .into_iter()
            .map(|(name, _)| name)
            .filter(|name| matches_keywords(name, &self.keywords))
            .map(str::to_string)
            .collect();
        if candidates.is_empty() {
            return Ok(TickOutcome::Skipped("no node matches the keywords"));
        }

        let results = self
            .tester
            .run_all(&candidates, self.concurrency, self.timeout)
            .await?;
        let Some(fastest) = best(&results).cloned() else {
            return Ok(TickOutcome::Skipped("no reachable node"));
        };

        self.store.update(|snap| {
            let unseen: Vec<Node> = merge_latencies(&mut snap.nodes, &results)
                .into_iter()
                .filter_map(|r| {
                    map.get(&r.name).map(|entry| Node {
                        name: r.name.clone(),
                        proxy_type: entry.proxy_type.clone(),
                        alive: entry.is_alive(),
                        latency: Some(r.delay),
                    })
                })
                .collect();
            snap.nodes.extend(unseen);
        })?;

        if fastest.name == active {
            return Ok(TickOutcome::Kept(active));
        }

        self.client
            .select_proxy(SELECTION_GROUP, &fastest.name)
            .await?;
        self.store
            .update(|snap| snap.current_node = fastest.name.clone())?;
        Ok(TickOutcome::Switched {
            from: active,
            to: fastest.name,
        })
    }
}
