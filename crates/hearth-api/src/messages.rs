use axum::{
    Json,
    extract::{Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::debug;

use hearth_chat::{ChatError, NewMessage};
use hearth_types::api::{
    EditMessageRequest, MessageIdRequest, MessagesQuery, SendMessageRequest, StatusResponse,
};

use crate::identity::Identity;
use crate::{AppState, blocking, denied};

/// Blank messages are dropped here and still answered with `ok`.
pub async fn send_message(
    State(state): State<AppState>,
    Identity(identity): Identity,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let new = NewMessage {
        room: req.room,
        author_name: req.user,
        author_avatar: req.avatar,
        text: req.text,
        kind: req.kind,
        target_identity: req.target,
        origin_identity: identity,
    };

    let chat = state.chat.clone();
    match blocking(move || chat.post(new)).await? {
        Ok(msg) => debug!("Message {} posted to {:?}", msg.id, msg.room),
        Err(e) => debug!("Ignoring post: {}", e),
    }
    Ok(Json(StatusResponse::ok()))
}

pub async fn get_messages(
    State(state): State<AppState>,
    Query(query): Query<MessagesQuery>,
) -> impl IntoResponse {
    Json(state.chat.list_since(&query.room, query.after))
}

pub async fn edit_message(
    State(state): State<AppState>,
    Identity(identity): Identity,
    req: Result<Json<EditMessageRequest>, JsonRejection>,
) -> Result<Response, StatusCode> {
    // An id that is not a message id cannot name a message this caller wrote.
    let Ok(Json(req)) = req else {
        return Ok(denied());
    };
    let chat = state.chat.clone();
    let result = blocking(move || chat.edit(req.id, &req.text, &identity)).await?;
    Ok(respond(result.map(|_| ())))
}

pub async fn delete_message(
    State(state): State<AppState>,
    Identity(identity): Identity,
    req: Result<Json<MessageIdRequest>, JsonRejection>,
) -> Result<Response, StatusCode> {
    let Ok(Json(req)) = req else {
        return Ok(denied());
    };
    let chat = state.chat.clone();
    let result = blocking(move || chat.delete(req.id, &identity)).await?;
    Ok(respond(result))
}

fn respond(result: Result<(), ChatError>) -> Response {
    match result {
        Ok(()) => Json(StatusResponse::ok()).into_response(),
        Err(_) => denied(),
    }
}
