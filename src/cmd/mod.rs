use serde::{Deserialize, Serialize};

use crate::{
    config::{Settings, Subscription},
    core::AppContext,
    ipc::Mode,
    logging,
    utils::logging::Type,
};

pub type CmdResult<T = ()> = Result<T, String>;

/// Logs the error of a `Result` and turns it into its message.
#[macro_export]
macro_rules! wrap_err {
    ($stat:expr) => {
        match $stat {
            Ok(a) => Ok(a),
            Err(err) => {
                log::error!(target: "app", "{}", err);
                Err(err.to_string())
            }
        }
    };
}

// Command modules
pub mod clash;
pub mod proxy;
pub mod settings;
pub mod traffic;

pub use clash::*;
pub use proxy::*;
pub use settings::*;
pub use speed_test::*;
pub use traffic::*;

/// A UI message, tagged by `action`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Request {
    GetNodes,
    UpdateNodes,
    ReloadNodes,
    Connect {
        node: NodeRef,
    },
    Disconnect,
    #[serde(rename_all = "camelCase")]
    TestDelay {
        node_name: String,
    },
    TestAllDelays,
    GetTestProgress,
    ReloadSubscriptions,
    TriggerSmartConnect,
    UpdateTrafficInfo,
    SwitchMode {
        mode: Mode,
    },
    GetCurrentMode,
    UpdateSettings {
        #[serde(default)]
        settings: Option<Settings>,
    },
    SaveSubscriptions {
        subscriptions: Vec<Subscription>,
    },
}

/// A node as sent by the UI; either `"name"` or `{"name": ...}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum NodeRef {
    Name(String),
    Node { name: String },
}

impl NodeRef {
    pub fn name(&self) -> &str {
        match self {
            NodeRef::Name(name) | NodeRef::Node { name } => name,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Payload {
    Nodes(NodesPayload),
    Delay(DelayPayload),
    Results(Vec<crate::core::tester::ProbeResult>),
    Progress(ProgressPayload),
    Subscriptions(SubscriptionsPayload),
    Traffic(TrafficPayload),
    Mode(ModePayload),
    Tick(TickPayload),
    Message(MessagePayload),
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Response {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Payload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub fn ok(data: Payload) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

impl<T: Into<Payload>> From<CmdResult<T>> for Response {
    fn from(result: CmdResult<T>) -> Self {
        match result {
            Ok(data) => Response::ok(data.into()),
            Err(e) => Response::fail(e),
        }
    }
}

macro_rules! payload_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for Payload {
            fn from(value: $ty) -> Self {
                Payload::$variant(value)
            }
        })*
    };
}

payload_from! {
    NodesPayload => Nodes,
    DelayPayload => Delay,
    Vec<crate::core::tester::ProbeResult> => Results,
    ProgressPayload => Progress,
    SubscriptionsPayload => Subscriptions,
    TrafficPayload => Traffic,
    ModePayload => Mode,
    TickPayload => Tick,
    MessagePayload => Message,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessagePayload {
    pub message: String,
}

impl MessagePayload {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Routes one request to its handler.
pub async fn dispatch(ctx: &AppContext, request: Request) -> Response {
    logging!(debug, Type::Cmd, "request {:?}", request);
    match request {
        Request::GetNodes => get_nodes(ctx).into(),
        Request::UpdateNodes | Request::ReloadNodes => reload_nodes(ctx).await.into(),
        Request::Connect { node } => connect_node(ctx, node.name()).await.into(),
        Request::Disconnect => disconnect(ctx).await.into(),
        Request::TestDelay { node_name } => test_delay(ctx, &node_name).await.into(),
        Request::TestAllDelays => test_all_delays(ctx).await.into(),
        Request::GetTestProgress => get_test_progress(ctx).into(),
        Request::ReloadSubscriptions => reload_subscriptions(ctx).into(),
        Request::TriggerSmartConnect => trigger_smart_connect(ctx).await.into(),
        Request::UpdateTrafficInfo => update_traffic_info(ctx).await.into(),
        Request::SwitchMode { mode } => switch_mode(ctx, mode).await.into(),
        Request::GetCurrentMode => get_current_mode(ctx).await.into(),
        Request::UpdateSettings { settings } => update_settings(ctx, settings).await.into(),
        Request::SaveSubscriptions { subscriptions } => {
            save_subscriptions(ctx, subscriptions).into()
        }
    }
}
