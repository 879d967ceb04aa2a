use std::convert::Infallible;

use async_stream::stream;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::Stream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::hub::Subscription;

/// SSE data payload sent on every wake. Clients re-fetch when they see it.
pub const UPDATE_SIGNAL: &str = "update";

/// One `update` event per wake of `subscription`, ending once `shutdown` is
/// cancelled.
///
/// The subscription lives inside the stream, so dropping the stream (the
/// client went away) deregisters it from the hub.
pub fn updates(
    subscription: Subscription,
    shutdown: CancellationToken,
) -> impl Stream<Item = Result<Event, Infallible>> {
    stream! {
        debug!("Update stream opened for room {:?}", subscription.room());
        loop {
            let woken = tokio::select! {
                _ = shutdown.cancelled() => false,
                _ = subscription.changed() => true,
            };
            if !woken {
                debug!("Update stream for room {:?} closed by shutdown", subscription.room());
                break;
            }
            yield Ok(Event::default().data(UPDATE_SIGNAL));
        }
    }
}

/// Wrap [`updates`] as an SSE response with keep-alive comments, which also
/// surface a dead connection without waiting for the next wake.
pub fn sse(
    subscription: Subscription,
    shutdown: CancellationToken,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    Sse::new(updates(subscription, shutdown)).keep_alive(KeepAlive::default())
}
