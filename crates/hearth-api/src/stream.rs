use axum::{
    extract::{Query, State},
    response::IntoResponse,
};
use tracing::info;

use hearth_types::api::RoomQuery;

use crate::AppState;

/// GET /stream?room=: a payload-free `update` event whenever the room changes.
pub async fn stream(State(state): State<AppState>, Query(query): Query<RoomQuery>) -> impl IntoResponse {
    let subscription = state.chat.hub().subscribe(&query.room);
    info!(
        "Update stream {} opened for room {:?}",
        subscription.id(),
        subscription.room()
    );
    hearth_gateway::stream::sse(subscription, state.shutdown.clone())
}
