use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{StatusCode, request::Parts},
};
use tracing::error;

use crate::AppState;

const FORWARDED_FOR: &str = "x-forwarded-for";

/// The caller's identity: their network address.
///
/// With `trust_forwarded` set, the first `X-Forwarded-For` hop is used
/// instead of the socket peer, for deployments behind a reverse proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity(pub String);

impl FromRequestParts<AppState> for Identity {
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if state.trust_forwarded
            && let Some(ip) = forwarded_client(parts)
        {
            return Ok(Identity(ip));
        }

        let ConnectInfo(addr) = ConnectInfo::<SocketAddr>::from_request_parts(parts, state)
            .await
            .map_err(|e| {
                error!("Peer address unavailable: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            })?;
        Ok(Identity(addr.ip().to_string()))
    }
}

fn forwarded_client(parts: &Parts) -> Option<String> {
    let header = parts.headers.get(FORWARDED_FOR)?.to_str().ok()?;
    let first = header.split(',').next()?.trim();
    (!first.is_empty()).then(|| first.to_string())
}
