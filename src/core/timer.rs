use crate::{
    error::{Error, Result},
    logging, logging_error,
    utils::logging::Type,
};
use delay_timer::prelude::{DelayTimer, DelayTimerBuilder, TaskBuilder};
use parking_lot::RwLock;
use std::{
    collections::HashMap,
    fmt,
    future::Future,
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};
use tokio::runtime::Handle;

type TaskID = u64;

/// Periodic jobs; each kind is registered at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    AutoSwitch,
    Traffic,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::AutoSwitch => f.write_str("auto-switch"),
            TaskKind::Traffic => f.write_str("traffic"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TimerTask {
    pub task_id: TaskID,
    pub interval_secs: u64,
    #[allow(unused)]
    pub registered_at: i64,
}

pub struct Timer {
    /// cron manager
    delay_timer: Arc<RwLock<DelayTimer>>,

    /// registered tasks by kind
    timer_map: Arc<RwLock<HashMap<TaskKind, TimerTask>>>,

    /// increment id
    timer_count: AtomicU64,

    /// jobs run on the application runtime, not on the timer's own executor
    handle: Handle,
}

impl Timer {
    pub fn new(handle: Handle) -> Self {
        Timer {
            delay_timer: Arc::new(RwLock::new(DelayTimerBuilder::default().build())),
            timer_map: Arc::new(RwLock::new(HashMap::new())),
            timer_count: AtomicU64::new(1),
            handle,
        }
    }

    /// Registers `job` to run every `interval`, replacing an earlier registration
    /// of the same kind. A run is never started while the previous one is still going.
    pub fn schedule<F, Fut>(&self, kind: TaskKind, interval: Duration, job: F) -> Result<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.cancel(kind);

        let tid = self.timer_count.fetch_add(1, Ordering::Relaxed);
        let secs = interval.as_secs().max(1);
        let handle = self.handle.clone();
        let job = Arc::new(job);

        let task = TaskBuilder::default()
            .set_task_id(tid)
            .set_maximum_parallel_runnable_num(1)
            .set_frequency_repeated_by_seconds(secs)
            .spawn_async_routine(move || {
                let handle = handle.clone();
                let job = Arc::clone(&job);
                Box::pin(async move {
                    if let Err(e) = handle.spawn((*job)()).await {
                        logging_error!(Type::Timer, "{} task aborted: {}", kind, e);
                    }
                }) as Pin<Box<dyn Future<Output = ()> + Send>>
            })
            .map_err(|e| Error::Scheduler(format!("failed to create {kind} task: {e}")))?;

        self.delay_timer
            .write()
            .add_task(task)
            .map_err(|e| Error::Scheduler(format!("failed to add {kind} task: {e}")))?;

        self.timer_map.write().insert(
            kind,
            TimerTask {
                task_id: tid,
                interval_secs: secs,
                registered_at: chrono::Local::now().timestamp(),
            },
        );
        logging!(
            info,
            Type::Timer,
            "Added task: kind={}, id={}, interval={}s",
            kind,
            tid,
            secs
        );
        Ok(())
    }

    /// Removes the task of `kind`; returns whether one was registered.
    pub fn cancel(&self, kind: TaskKind) -> bool {
        let Some(task) = self.timer_map.write().remove(&kind) else {
            return false;
        };
        if let Err(e) = self.delay_timer.write().remove_task(task.task_id) {
            logging!(
                warn,
                Type::Timer,
                "Failed to remove task {} for {}: {}",
                task.task_id,
                kind,
                e
            );
        } else {
            logging!(debug, Type::Timer, "Removed task {} for {}", task.task_id, kind);
        }
        true
    }

    /// Runs one job of `kind` right away, outside the periodic schedule.
    pub fn run_now<Fut>(&self, kind: TaskKind, fut: Fut)
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        logging!(debug, Type::Timer, "running {} task now", kind);
        self.handle.spawn(fut);
    }

    pub fn cancel_all(&self) {
        let kinds: Vec<TaskKind> = self.timer_map.read().keys().copied().collect();
        for kind in kinds {
            self.cancel(kind);
        }
    }

    pub fn is_scheduled(&self, kind: TaskKind) -> bool {
        self.timer_map.read().contains_key(&kind)
    }

    pub fn interval_of(&self, kind: TaskKind) -> Option<Duration> {
        self.timer_map
            .read()
            .get(&kind)
            .map(|t| Duration::from_secs(t.interval_secs))
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
