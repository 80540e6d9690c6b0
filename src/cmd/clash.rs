use serde::Serialize;

use super::{CmdResult, MessagePayload};
use crate::{core::AppContext, ipc::Mode, logging, utils::logging::Type, wrap_err};

#[derive(Debug, Clone, Serialize)]
pub struct ModePayload {
    pub mode: Mode,
}

/// 修改代理模式
pub async fn switch_mode(ctx: &AppContext, mode: Mode) -> CmdResult<MessagePayload> {
    let rt = ctx.runtime();
    wrap_err!(rt.client.patch_mode(mode).await)?;
    logging!(info, Type::Cmd, "mode switched to {}", mode.as_str());
    Ok(MessagePayload::new(format!("Switched to {} mode", mode.as_str())))
}

pub async fn get_current_mode(ctx: &AppContext) -> CmdResult<ModePayload> {
    let rt = ctx.runtime();
    let mode = wrap_err!(rt.client.get_mode().await)?;
    Ok(ModePayload { mode })
}
