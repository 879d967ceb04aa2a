pub mod identity;
pub mod messages;
pub mod portal;
pub mod presence;
pub mod reactions;
pub mod stream;

use std::path::Path;
use std::sync::Arc;

use axum::{
    Json, Router,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeFile;
use tower_http::trace::TraceLayer;
use tracing::error;

use hearth_chat::ChatState;
use hearth_types::api::StatusResponse;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub chat: ChatState,
    /// Take identity from `X-Forwarded-For` rather than the socket peer.
    pub trust_forwarded: bool,
    /// Cancelled when the server starts shutting down; ends open update streams.
    pub shutdown: CancellationToken,
}

/// All chat routes. `index` is served as-is at `/`.
pub fn router(state: AppState, index: &Path) -> Router {
    Router::new()
        .route_service("/", ServeFile::new(index))
        .route("/generate_204", get(portal::captive_portal))
        .route("/hotspot-detect.html", get(portal::captive_portal))
        .route("/ncsi.txt", get(portal::captive_portal))
        .route("/success.txt", get(portal::captive_portal))
        .route("/ping", get(portal::ping))
        .route("/my_ip", get(presence::my_ip))
        .route("/update_status", post(presence::update_status))
        .route("/active_users", get(presence::active_users))
        .route("/send", post(messages::send_message))
        .route("/messages", get(messages::get_messages))
        .route("/edit_message", post(messages::edit_message))
        .route("/delete_message", post(messages::delete_message))
        .route("/react_message", post(reactions::react_message))
        .route("/mark_read", post(reactions::mark_read))
        .route("/stream", get(stream::stream))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Run a chat call that may touch the disk off the async runtime.
pub(crate) async fn blocking<F, T>(f: F) -> Result<T, StatusCode>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

/// 403 for edit/delete by anyone but the author, or of a missing message.
pub(crate) fn denied() -> Response {
    (StatusCode::FORBIDDEN, Json(StatusResponse::error("Unauthorized"))).into_response()
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::time::Duration;

    use axum::body::Body;
    use axum::extract::ConnectInfo;
    use axum::extract::connect_info::MockConnectInfo;
    use axum::http::{Method, Request, header};
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use hearth_chat::ChatConfig;
    use hearth_gateway::Hub;
    use hearth_store::Store;

    use super::*;

    const ALICE: [u8; 4] = [10, 0, 0, 1];
    const BOB: [u8; 4] = [10, 0, 0, 2];

    struct Harness {
        app: Router,
        state: AppState,
        _dir: tempfile::TempDir,
    }

    fn harness(trust_forwarded: bool) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let index = dir.path().join("index.html");
        std::fs::write(&index, "<h1>hearth</h1>").unwrap();

        let store = Store::open(dir.path().join("data")).unwrap();
        let chat = ChatState::open(store, Hub::new(), ChatConfig::default());
        let state: AppState = Arc::new(AppStateInner {
            chat,
            trust_forwarded,
            shutdown: CancellationToken::new(),
        });
        let app = router(state.clone(), &index).layer(MockConnectInfo(SocketAddr::from((ALICE, 40000))));
        Harness {
            app,
            state,
            _dir: dir,
        }
    }

    fn from(ip: [u8; 4], mut request: Request<Body>) -> Request<Body> {
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from((ip, 40001))));
        request
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_uri(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn chat_round_trip_over_http() {
        let h = harness(false);

        let (status, body) = send(&h.app, post_json("/send", json!({"user": "Alice", "text": "hi"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ok"}));

        let (_, messages) = send(&h.app, get_uri("/messages?room=public")).await;
        assert_eq!(messages.as_array().unwrap().len(), 1);
        let first = &messages[0];
        assert_eq!(first["text"], "hi");
        assert_eq!(first["ip"], "10.0.0.1");
        assert_eq!(first["reactions"], json!({}));
        assert_eq!(first["read_by"], json!([]));
        let id = first["id"].as_u64().unwrap();

        send(&h.app, from(BOB, post_json("/react_message", json!({"id": id})))).await;
        send(&h.app, from(BOB, post_json("/mark_read", json!({"id": id})))).await;
        let (_, messages) = send(&h.app, get_uri("/messages")).await;
        assert_eq!(messages[0]["reactions"], json!({"👍": ["10.0.0.2"]}));
        assert_eq!(messages[0]["read_by"], json!(["10.0.0.2"]));

        let (_, later) = send(&h.app, get_uri(&format!("/messages?room=public&after={id}"))).await;
        assert_eq!(later, json!([]));
    }

    #[tokio::test]
    async fn blank_post_is_accepted_but_stored_nowhere() {
        let h = harness(false);
        let (status, body) = send(&h.app, post_json("/send", json!({"text": "   "}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert!(h.state.chat.list_since("public", -1).is_empty());
    }

    #[tokio::test]
    async fn edit_and_delete_by_someone_else_are_forbidden() {
        let h = harness(false);
        send(&h.app, post_json("/send", json!({"text": "original"}))).await;

        let (status, body) =
            send(&h.app, from(BOB, post_json("/edit_message", json!({"id": 0, "text": "x"})))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body, json!({"status": "error", "message": "Unauthorized"}));

        let (status, _) = send(&h.app, from(BOB, post_json("/delete_message", json!({"id": 0})))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = send(&h.app, post_json("/delete_message", json!({"id": 77}))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send(&h.app, post_json("/edit_message", json!({"id": 0, "text": "fixed"}))).await;
        assert_eq!(status, StatusCode::OK);
        let (_, messages) = send(&h.app, get_uri("/messages")).await;
        assert_eq!(messages[0]["text"], "fixed");
        assert_eq!(messages[0]["edited"], true);

        let (status, _) = send(&h.app, post_json("/delete_message", json!({"id": 0}))).await;
        assert_eq!(status, StatusCode::OK);
        let (_, messages) = send(&h.app, get_uri("/messages")).await;
        assert_eq!(messages, json!([]));

        let (status, _) = send(&h.app, from(BOB, post_json("/react_message", json!({"id": 0})))).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn presence_lists_heartbeats_per_room() {
        let h = harness(false);
        send(
            &h.app,
            post_json("/update_status", json!({"room": "den", "nickname": "Al", "avatar": "🦊"})),
        )
        .await;

        let (_, den) = send(&h.app, get_uri("/active_users?room=den")).await;
        assert_eq!(den, json!({"10.0.0.1": {"nickname": "Al", "avatar": "🦊"}}));
        let (_, public) = send(&h.app, get_uri("/active_users")).await;
        assert_eq!(public, json!({}));
    }

    #[tokio::test]
    async fn identity_comes_from_peer_or_trusted_proxy() {
        let h = harness(false);
        let (_, body) = send(&h.app, from(BOB, get_uri("/my_ip"))).await;
        assert_eq!(body, json!({"ip": "10.0.0.2"}));

        let forwarded = || {
            Request::builder()
                .uri("/my_ip")
                .header("x-forwarded-for", "203.0.113.9, 10.0.0.254")
                .body(Body::empty())
                .unwrap()
        };
        let (_, body) = send(&h.app, forwarded()).await;
        assert_eq!(body["ip"], "10.0.0.1");

        let trusting = harness(true);
        let (_, body) = send(&trusting.app, forwarded()).await;
        assert_eq!(body["ip"], "203.0.113.9");
    }

    #[tokio::test]
    async fn captive_portal_checks_redirect_home() {
        let h = harness(false);
        for path in ["/generate_204", "/hotspot-detect.html", "/ncsi.txt", "/success.txt"] {
            let response = h.app.clone().oneshot(get_uri(path)).await.unwrap();
            assert!(response.status().is_redirection(), "{path}");
            assert_eq!(response.headers()[header::LOCATION], "/");
        }

        let response = h.app.clone().oneshot(get_uri("/ping")).await.unwrap();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"pong");

        let response = h.app.clone().oneshot(get_uri("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn stream_signals_updates_and_unsubscribes_on_disconnect() {
        let h = harness(false);
        let response = h.app.clone().oneshot(get_uri("/stream?room=public")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/event-stream");
        assert_eq!(h.state.chat.hub().subscriber_count("public"), 1);

        let mut body = response.into_body();
        send(&h.app, post_json("/send", json!({"text": "wake up"}))).await;

        let frame = tokio::time::timeout(Duration::from_secs(1), body.frame())
            .await
            .expect("no event after post")
            .unwrap()
            .unwrap();
        let data = frame.into_data().unwrap();
        assert_eq!(std::str::from_utf8(&data).unwrap(), "data: update\n\n");

        drop(body);
        assert_eq!(h.state.chat.hub().subscriber_count("public"), 0);
    }

    #[tokio::test]
    async fn graceful_shutdown_closes_open_streams() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let h = harness(false);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(h.state.clone(), &h._dir.path().join("index.html"));
        let shutdown = h.state.shutdown.clone();
        let server = tokio::spawn(async move {
            axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
        });

        let mut client = tokio::net::TcpStream::connect(addr).await.unwrap();
        client
            .write_all(b"GET /stream?room=public HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .unwrap();
        let mut head = Vec::new();
        let mut buf = [0u8; 512];
        while !String::from_utf8_lossy(&head).contains("\r\n\r\n") {
            let n = tokio::time::timeout(Duration::from_secs(1), client.read(&mut buf))
                .await
                .expect("no response to /stream")
                .unwrap();
            assert!(n > 0, "connection closed before headers");
            head.extend_from_slice(&buf[..n]);
        }
        assert!(String::from_utf8_lossy(&head).starts_with("HTTP/1.1 200"));
        assert_eq!(h.state.chat.hub().subscriber_count("public"), 1);

        h.state.shutdown.cancel();
        let served = tokio::time::timeout(Duration::from_secs(3), server)
            .await
            .expect("server kept running with a stream open")
            .unwrap();
        assert!(served.is_ok());
        assert_eq!(h.state.chat.hub().subscriber_count("public"), 0);
    }

    #[tokio::test]
    async fn malformed_ids_are_lenient_or_forbidden() {
        let h = harness(false);
        send(&h.app, post_json("/send", json!({"text": "one"}))).await;

        let (status, messages) = send(&h.app, get_uri("/messages?after=abc")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(messages.as_array().unwrap().len(), 1);
        let (_, messages) = send(&h.app, get_uri("/messages?after=")).await;
        assert_eq!(messages.as_array().unwrap().len(), 1);

        let (status, body) = send(&h.app, post_json("/edit_message", json!({"id": "x", "text": "y"}))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body, json!({"status": "error", "message": "Unauthorized"}));
        let (status, _) = send(&h.app, post_json("/delete_message", json!({"id": -1}))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (_, messages) = send(&h.app, get_uri("/messages")).await;
        assert_eq!(messages[0]["text"], "one");
    }
}
