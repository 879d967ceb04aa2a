use axum::response::{IntoResponse, Redirect};

/// OS connectivity checks (Android, iOS, Windows) land here when the server
/// is acting as a captive portal; send them to the chat page.
pub async fn captive_portal() -> impl IntoResponse {
    Redirect::to("/")
}

pub async fn ping() -> &'static str {
    "pong"
}
