use axum::{
    Json,
    extract::{Query, State},
    response::IntoResponse,
};

use hearth_types::api::{IdentityResponse, RoomQuery, StatusResponse, UpdateStatusRequest};

use crate::AppState;
use crate::identity::Identity;

pub async fn update_status(
    State(state): State<AppState>,
    Identity(identity): Identity,
    Json(req): Json<UpdateStatusRequest>,
) -> impl IntoResponse {
    state
        .chat
        .heartbeat(&req.room, &identity, &req.nickname, &req.avatar);
    Json(StatusResponse::ok())
}

pub async fn active_users(
    State(state): State<AppState>,
    Query(query): Query<RoomQuery>,
) -> impl IntoResponse {
    Json(state.chat.active_presence(&query.room))
}

pub async fn my_ip(Identity(ip): Identity) -> impl IntoResponse {
    Json(IdentityResponse { ip })
}
