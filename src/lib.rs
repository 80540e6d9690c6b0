pub mod cmd;
pub mod config;
pub mod core;
pub mod error;
pub mod ipc;
pub mod state;
pub mod utils;

pub use error::{Error, Result};

use utils::logging::Type;

/// Application initialization helper functions
mod app_init {
    use super::*;
    use crate::{
        config::AppConfig,
        core::AppContext,
        state::Store,
        utils::{dirs, init, server},
    };
    use anyhow::Context;
    use std::sync::Arc;
    use tokio::runtime::Handle;

    /// Loads the process config and installs the logger.
    pub fn setup() -> anyhow::Result<(AppConfig, std::path::PathBuf)> {
        let config_path = dirs::app_config_path()?;
        let config = AppConfig::load(&config_path)?;
        let home = match &config.data_dir {
            Some(dir) => dir.clone(),
            None => dirs::app_home_dir()?,
        };
        init::init_logger(&config, &home)?;
        logging!(
            info,
            Type::Setup,
            true,
            "config {} data {}",
            config_path.display(),
            home.display()
        );
        Ok((config, home))
    }

    pub async fn start(config: AppConfig, home: std::path::PathBuf) -> anyhow::Result<()> {
        let addr = config.listen_addr()?;
        let store = Store::open(dirs::storage_path(&home)).context("failed to open storage")?;

        // a previous process may have died mid-run
        store
            .update(|snap| {
                snap.is_testing = false;
                snap.test_progress = None;
            })
            .context("failed to reset test state")?;

        let ctx = Arc::new(AppContext::new(Arc::new(store), Handle::current())?);
        ctx.start().context("failed to start periodic tasks")?;

        match ctx.connect().await {
            Ok(catalog) => logging!(
                info,
                Type::Setup,
                true,
                "connected, {} nodes, active {}",
                catalog.nodes.len(),
                catalog.active
            ),
            Err(e) => logging!(warn, Type::Setup, true, "initial connect failed: {}", e),
        }

        tokio::select! {
            _ = server::serve(Arc::clone(&ctx), addr) => {
                logging!(warn, Type::Server, "message server stopped");
            }
            signal = tokio::signal::ctrl_c() => {
                logging_error!(Type::Setup, result => signal);
                logging!(info, Type::Setup, true, "shutting down");
            }
        }

        ctx.stop();
        Ok(())
    }
}

/// Runs the daemon until interrupted.
pub fn run() -> anyhow::Result<()> {
    use anyhow::Context;

    let (config, home) = app_init::setup()?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("proxyhub")
        .build()
        .context("failed to build the tokio runtime")?;
    runtime.block_on(app_init::start(config, home))
}
