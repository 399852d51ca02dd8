use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};

use crate::{routes::auth::CallerIdentity, services::websocket_service, state::SharedState};

#[utoipa::path(
    get,
    path = "/ws",
    tag = "realtime",
    responses((status = 101, description = "Switching protocols to WebSocket"))
)]
/// Upgrade the HTTP connection into the caller's observer channel.
pub async fn ws_handler(
    State(state): State<SharedState>,
    caller: CallerIdentity,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let shared_state = state.clone();
    ws.on_upgrade(move |socket| websocket_service::handle_socket(shared_state, socket, caller.0))
}

/// Configure the WebSocket endpoint.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/ws", get(ws_handler))
}
