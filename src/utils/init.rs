use crate::{
    config::AppConfig,
    logging,
    utils::{dirs, logging::Type},
};
use anyhow::{Context, Result};
use log::LevelFilter;
use log4rs::{
    append::{console::ConsoleAppender, file::FileAppender},
    config::{Appender, Logger, Root},
    encode::pattern::PatternEncoder,
};
use std::path::Path;

const LOG_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} {l} - {m}{n}";

fn parse_level(level: &str) -> LevelFilter {
    match level.to_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}

/// Installs the console and file appenders.
///
/// Calling it again after a logger is installed keeps the first logger.
pub fn init_logger(config: &AppConfig, home: &Path) -> Result<()> {
    let level = parse_level(&config.log_level);
    let log_file = dirs::app_logs_dir(home).join(dirs::LOG_FILE);

    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(LOG_PATTERN)))
        .build();
    let file = FileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(LOG_PATTERN)))
        .build(&log_file)
        .with_context(|| format!("failed to open log file {}", log_file.display()))?;

    let log_config = log4rs::Config::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .appender(Appender::builder().build("file", Box::new(file)))
        .logger(
            Logger::builder()
                .appenders(["file", "stdout"])
                .additive(false)
                .build("app", level),
        )
        .build(Root::builder().appender("stdout").build(LevelFilter::Warn))
        .context("invalid log4rs configuration")?;

    if log4rs::init_config(log_config).is_err() {
        logging!(debug, Type::Setup, "logger already installed, keeping it");
        return Ok(());
    }

    logging!(info, Type::Setup, "logger ready at {}", log_file.display());
    Ok(())
}
