use serde::Serialize;

use super::{CmdResult, MessagePayload};
use crate::{
    core::{
        AppContext,
        auto_switch::TickOutcome,
        catalog::{DIRECT_SENTINEL, NodeView, SELECTION_GROUP, node_views},
    },
    error::ConnectionIssue,
    logging,
    utils::logging::Type,
    wrap_err,
};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodesPayload {
    pub nodes: Vec<NodeView>,
    pub proxy_group: Vec<String>,
    pub current_node: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickPayload {
    pub outcome: &'static str,
    pub detail: Option<String>,
    pub current_node: String,
}

impl TickPayload {
    fn from_outcome(outcome: &TickOutcome, current_node: String) -> Self {
        let (outcome, detail) = match outcome {
            TickOutcome::Skipped(reason) => ("skipped", Some(reason.to_string())),
            TickOutcome::Kept(name) => ("kept", Some(name.clone())),
            TickOutcome::Switched { to, .. } => ("switched", Some(to.clone())),
            TickOutcome::Failed(e) => ("failed", Some(e.clone())),
        };
        Self {
            outcome,
            detail,
            current_node,
        }
    }
}

/// Stored nodes with the derived `current` flag.
pub fn get_nodes(ctx: &AppContext) -> CmdResult<NodesPayload> {
    Ok(ctx.store().read(|snap| NodesPayload {
        nodes: node_views(&snap.nodes, &snap.current_node),
        proxy_group: snap.proxy_group.clone(),
        current_node: snap.current_node.clone(),
    }))
}

/// Full refresh against the daemon, then the fresh list.
pub async fn reload_nodes(ctx: &AppContext) -> CmdResult<NodesPayload> {
    let catalog = match ctx.connect().await {
        Ok(catalog) => catalog,
        Err(e) => {
            logging!(warn, Type::Cmd, "reload nodes failed: {}", e);
            // connect records the classified message, including the liveness case
            let recorded = ctx.store().read(|snap| snap.connection_error.clone());
            return Err(recorded.unwrap_or_else(|| ConnectionIssue::classify(&e).message()));
        }
    };
    logging!(info, Type::Cmd, "reloaded {} nodes", catalog.nodes.len());
    get_nodes(ctx)
}

pub async fn connect_node(ctx: &AppContext, name: &str) -> CmdResult<MessagePayload> {
    let rt = ctx.runtime();
    wrap_err!(rt.client.select_proxy(SELECTION_GROUP, name).await)?;
    wrap_err!(
        ctx.store()
            .update(|snap| snap.current_node = name.to_string())
    )?;
    Ok(MessagePayload::new(format!("Connected: {name}")))
}

/// Points the selection group at `DIRECT`.
pub async fn disconnect(ctx: &AppContext) -> CmdResult<MessagePayload> {
    let rt = ctx.runtime();
    wrap_err!(rt.client.select_proxy(SELECTION_GROUP, DIRECT_SENTINEL).await)?;
    wrap_err!(
        ctx.store()
            .update(|snap| snap.current_node = DIRECT_SENTINEL.to_string())
    )?;
    Ok(MessagePayload::new("Disconnected"))
}

/// One auto-switch tick, now.
pub async fn trigger_smart_connect(ctx: &AppContext) -> CmdResult<TickPayload> {
    let rt = ctx.runtime();
    let outcome = rt.auto_switch.tick().await;
    if let TickOutcome::Failed(e) = &outcome {
        return Err(e.clone());
    }
    let current = ctx.store().read(|snap| snap.current_node.clone());
    Ok(TickPayload::from_outcome(&outcome, current))
}
