use std::{net::SocketAddr, sync::Arc};

use serde_json::Value;
use warp::{Filter, Rejection, Reply};

use crate::{
    cmd::{self, Request, Response},
    core::AppContext,
    logging,
    utils::logging::Type,
};

/// `POST /message` carrying one [`Request`] as JSON.
///
/// A body that is not JSON at all is rejected by warp with 400; a JSON body
/// that is not a known request gets a `success: false` response.
pub fn routes(
    ctx: Arc<AppContext>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::post()
        .and(warp::path("message"))
        .and(warp::path::end())
        .and(warp::body::json::<Value>())
        .and(warp::any().map(move || Arc::clone(&ctx)))
        .then(handle_message)
}

async fn handle_message(body: Value, ctx: Arc<AppContext>) -> warp::reply::Json {
    let response = match serde_json::from_value::<Request>(body) {
        Ok(request) => cmd::dispatch(&ctx, request).await,
        Err(e) => {
            logging!(warn, Type::Server, "bad message: {}", e);
            Response::fail(format!("invalid message: {e}"))
        }
    };
    warp::reply::json(&response)
}

/// Serves the message endpoint until the future is dropped.
pub async fn serve(ctx: Arc<AppContext>, addr: SocketAddr) {
    logging!(info, Type::Server, true, "listening on http://{}/message", addr);
    warp::serve(routes(ctx)).run(addr).await;
}
