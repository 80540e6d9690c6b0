use super::{CmdResult, MessagePayload};
use crate::{
    config::Settings,
    core::AppContext,
    error::{ConnectionIssue, Error},
    logging,
    utils::logging::Type,
    wrap_err,
};

/// Persists `settings` when given, rebuilds the runtime and reconnects.
pub async fn update_settings(
    ctx: &AppContext,
    settings: Option<Settings>,
) -> CmdResult<MessagePayload> {
    if let Some(settings) = settings {
        wrap_err!(ctx.store().update(|snap| snap.settings = settings))?;
    }
    wrap_err!(ctx.reload())?;

    match ctx.connect().await {
        Ok(catalog) => {
            logging!(
                info,
                Type::Cmd,
                "settings applied, {} nodes",
                catalog.nodes.len()
            );
            Ok(MessagePayload::new("Settings updated, reconnected"))
        }
        // unset configuration is a valid state to save
        Err(Error::NotConfigured) => Ok(MessagePayload::new("Settings updated")),
        Err(e) => {
            logging!(warn, Type::Cmd, "reconnect after settings update failed: {}", e);
            let recorded = ctx.store().read(|snap| snap.connection_error.clone());
            Err(recorded.unwrap_or_else(|| ConnectionIssue::classify(&e).message()))
        }
    }
}
