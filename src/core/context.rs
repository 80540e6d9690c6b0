use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use parking_lot::RwLock;
use tokio::runtime::Handle;

use crate::{
    config::Settings,
    core::{
        auto_switch::AutoSwitch,
        catalog::{Catalog, NodeCatalog},
        tester::{LatencyTester, ProgressSink, TestRunToken},
        timer::{TaskKind, Timer},
        traffic::TrafficAggregator,
    },
    error::Result,
    ipc::ControllerClient,
    logging, logging_error,
    state::Store,
    utils::logging::Type,
};

/// Everything derived from one version of the settings.
pub struct Runtime {
    pub settings: Settings,
    pub client: ControllerClient,
    pub catalog: NodeCatalog,
    pub tester: LatencyTester,
    pub auto_switch: AutoSwitch,
    pub traffic: TrafficAggregator,
}

impl Runtime {
    pub fn build(
        settings: Settings,
        store: &Arc<Store>,
        token: &Arc<TestRunToken>,
        traffic_updating: &Arc<AtomicBool>,
    ) -> Result<Self> {
        let client = ControllerClient::from_settings(&settings)?;
        let sink: Arc<dyn ProgressSink> = Arc::clone(store) as Arc<dyn ProgressSink>;
        let tester = LatencyTester::new(
            client.clone(),
            settings.test_url.clone(),
            Arc::clone(token),
            sink,
        );
        let auto_switch = AutoSwitch::new(
            client.clone(),
            tester.clone(),
            Arc::clone(store),
            &settings,
        );
        let traffic = TrafficAggregator::new(Arc::clone(store), Arc::clone(traffic_updating))?;

        Ok(Self {
            catalog: NodeCatalog::new(client.clone()),
            client,
            tester,
            auto_switch,
            traffic,
            settings,
        })
    }
}

/// Process-wide state: the store, the scheduler, the shared run token and the
/// current [`Runtime`].
pub struct AppContext {
    store: Arc<Store>,
    timer: Timer,
    token: Arc<TestRunToken>,
    traffic_updating: Arc<AtomicBool>,
    runtime: RwLock<Arc<Runtime>>,
}

impl AppContext {
    /// Builds the runtime from the stored settings. Timers are not started.
    pub fn new(store: Arc<Store>, handle: Handle) -> Result<Self> {
        let token = Arc::new(TestRunToken::default());
        let traffic_updating = Arc::new(AtomicBool::new(false));
        let runtime = Runtime::build(store.settings(), &store, &token, &traffic_updating)?;

        Ok(Self {
            store,
            timer: Timer::new(handle),
            token,
            traffic_updating,
            runtime: RwLock::new(Arc::new(runtime)),
        })
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn timer(&self) -> &Timer {
        &self.timer
    }

    pub fn runtime(&self) -> Arc<Runtime> {
        Arc::clone(&*self.runtime.read())
    }

    pub fn is_testing(&self) -> bool {
        self.token.is_running()
    }

    /// Schedules the periodic loops for the current runtime.
    pub fn start(&self) -> Result<()> {
        let rt = self.runtime();

        if rt.settings.smart_connect {
            rt.auto_switch
                .start(&self.timer, rt.settings.auto_switch_interval())?;
        }

        let traffic = rt.traffic.clone();
        self.timer
            .schedule(TaskKind::Traffic, rt.settings.traffic_interval(), move || {
                let traffic = traffic.clone();
                async move {
                    logging_error!(Type::Traffic, result => traffic.refresh().await);
                }
            })?;
        let traffic = rt.traffic.clone();
        self.timer.run_now(TaskKind::Traffic, async move {
            logging_error!(Type::Traffic, result => traffic.refresh().await);
        });
        Ok(())
    }

    pub fn stop(&self) {
        self.timer.cancel_all();
    }

    /// Cancels the timers, rebuilds the runtime from the stored settings and
    /// starts the timers again.
    pub fn reload(&self) -> Result<Arc<Runtime>> {
        self.stop();
        let runtime = Arc::new(Runtime::build(
            self.store.settings(),
            &self.store,
            &self.token,
            &self.traffic_updating,
        )?);
        *self.runtime.write() = Arc::clone(&runtime);
        logging!(info, Type::Config, "runtime rebuilt for {}", runtime.client.base());
        self.start()?;
        Ok(runtime)
    }

    /// Liveness check plus catalog refresh against the current runtime.
    pub async fn connect(&self) -> Result<Catalog> {
        let rt = self.runtime();
        rt.catalog.connect(&self.store, &rt.settings).await
    }
}
