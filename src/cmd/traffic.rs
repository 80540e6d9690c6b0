use serde::Serialize;

use super::CmdResult;
use crate::{
    config::Subscription,
    core::{AppContext, traffic::TrafficSnapshot},
    logging,
    utils::logging::Type,
    wrap_err,
};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionsPayload {
    pub subscriptions: Vec<Subscription>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrafficPayload {
    pub traffic_info: TrafficSnapshot,
    pub traffic_error: Option<String>,
    pub subscriptions: Vec<Subscription>,
}

pub fn reload_subscriptions(ctx: &AppContext) -> CmdResult<SubscriptionsPayload> {
    let rt = ctx.runtime();
    rt.traffic.reload_subscriptions();
    Ok(SubscriptionsPayload {
        subscriptions: rt.traffic.subscriptions(),
    })
}

/// Reloads the list and runs one aggregation pass.
pub async fn update_traffic_info(ctx: &AppContext) -> CmdResult<TrafficPayload> {
    let rt = ctx.runtime();
    if rt.traffic.reload_subscriptions() == 0 {
        return Err("subscription list is empty".to_string());
    }
    if wrap_err!(rt.traffic.refresh().await)?.is_none() {
        logging!(info, Type::Cmd, "traffic refresh already in flight");
    }
    Ok(ctx.store().read(|snap| TrafficPayload {
        traffic_info: snap.traffic_info.clone(),
        traffic_error: snap.traffic_error.clone(),
        subscriptions: snap.subscriptions.clone(),
    }))
}

/// Replaces the stored subscription list.
pub fn save_subscriptions(
    ctx: &AppContext,
    subscriptions: Vec<Subscription>,
) -> CmdResult<SubscriptionsPayload> {
    wrap_err!(
        ctx.store()
            .update(|snap| snap.subscriptions = subscriptions)
    )?;
    reload_subscriptions(ctx)
}
