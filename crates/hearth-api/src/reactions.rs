use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};

use hearth_types::api::{MessageIdRequest, ReactRequest, StatusResponse};

use crate::identity::Identity;
use crate::{AppState, blocking};

/// Anyone may react to any message. Reacting to a message that no longer
/// exists is accepted and has no effect.
pub async fn react_message(
    State(state): State<AppState>,
    Identity(identity): Identity,
    Json(req): Json<ReactRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let chat = state.chat.clone();
    blocking(move || chat.toggle_reaction(req.id, &req.emoji, &identity)).await?;
    Ok(Json(StatusResponse::ok()))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Identity(identity): Identity,
    Json(req): Json<MessageIdRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let chat = state.chat.clone();
    blocking(move || chat.mark_read(req.id, &identity)).await?;
    Ok(Json(StatusResponse::ok()))
}
