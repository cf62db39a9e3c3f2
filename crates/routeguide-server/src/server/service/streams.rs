//! Per-call stream drivers.
//!
//! Each streaming RPC is reduced to a pump between an inbound stream, one of
//! the components, and (for server streaming) an outbound channel:
//!
//! - [`feed_features`] - `ListFeatures`: store iterator -> outbound channel.
//! - [`summarize_route`] - `RecordRoute`: inbound points -> aggregator.
//! - [`relay_notes`] - `RouteChat`: inbound notes -> relay; the relay writes
//!   to the outbound channel on its own.
//!
//! The drivers are generic over the inbound stream so they can be exercised
//! without a transport. All of them stop when the shared shutdown token is
//! cancelled.

use crate::server::{
    chat::Subscription,
    route::RouteAggregator,
    store::FeatureStore,
    telemetry::{increment_notes_relayed, increment_peers_evicted, increment_points_recorded},
};
use core::pin::pin;
use futures::{Stream, StreamExt};
use routeguide_core::{
    Error,
    proto::{Feature, Point, Rectangle, RouteNote, RouteSummary},
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tonic::Status;

/// Streams every feature inside `rect` to `resp_tx`, in store order.
///
/// Features are produced lazily, so the first results reach the client
/// before the scan finishes. Returns the number of features sent.
///
/// # Errors
///
/// - [`Error::RequestCancelled`] if the client goes away mid-stream.
/// - [`Error::ServiceShutdown`] if the server shuts down mid-stream; the
///   client is told with a best-effort `UNAVAILABLE`.
pub async fn feed_features(
    store: &FeatureStore,
    rect: &Rectangle,
    resp_tx: &mpsc::Sender<Result<Feature, Status>>,
    shutdown: &CancellationToken,
) -> routeguide_core::Result<usize> {
    let mut sent = 0;

    for feature in store.within(rect) {
        tokio::select! {
            biased;

            () = shutdown.cancelled() => {
                let _ = resp_tx.try_send(Err(Error::ServiceShutdown.into()));
                return Err(Error::ServiceShutdown);
            }
            res = resp_tx.send(Ok(feature.clone())) => {
                if res.is_err() {
                    return Err(Error::RequestCancelled);
                }
            }
        }
        sent += 1;
    }

    Ok(sent)
}

/// Folds the inbound points of one `RecordRoute` call into a summary.
///
/// The summary is only produced when the client half-closes cleanly. An
/// inbound error or a server shutdown discards the route.
///
/// # Errors
///
/// - [`Error::RequestCancelled`] if the inbound stream fails.
/// - [`Error::ServiceShutdown`] if the server shuts down first.
pub async fn summarize_route<S>(
    store: &FeatureStore,
    inbound: S,
    shutdown: &CancellationToken,
) -> routeguide_core::Result<RouteSummary>
where
    S: Stream<Item = Result<Point, Status>>,
{
    let mut inbound = pin!(inbound);
    let mut route = RouteAggregator::new(store);

    loop {
        tokio::select! {
            biased;

            () = shutdown.cancelled() => return Err(Error::ServiceShutdown),
            msg = inbound.next() => match msg {
                Some(Ok(point)) => route.record(point),
                Some(Err(_status)) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!("RecordRoute inbound failed: {_status}");
                    return Err(Error::RequestCancelled);
                }
                None => break,
            },
        }
    }

    increment_points_recorded(u64::try_from(route.point_count()).unwrap_or_default());
    Ok(route.finish())
}

/// Publishes every inbound note of one `RouteChat` call to the relay.
///
/// Returns `Ok(())` when the client half-closes. The caller drops the
/// subscription afterwards, which ends the outbound stream.
///
/// # Errors
///
/// - [`Error::RequestCancelled`] if the inbound stream fails or the outbound
///   receiver has been dropped.
/// - [`Error::ServiceShutdown`] if the server shuts down; the client is told
///   with a best-effort `UNAVAILABLE`.
pub async fn relay_notes<S>(
    subscription: &Subscription,
    inbound: S,
    outbound: &mpsc::UnboundedSender<Result<RouteNote, Status>>,
    shutdown: &CancellationToken,
) -> routeguide_core::Result<()>
where
    S: Stream<Item = Result<RouteNote, Status>>,
{
    let mut inbound = pin!(inbound);

    loop {
        tokio::select! {
            biased;

            () = shutdown.cancelled() => {
                let _ = outbound.send(Err(Error::ServiceShutdown.into()));
                return Err(Error::ServiceShutdown);
            }
            () = outbound.closed() => return Err(Error::RequestCancelled),
            msg = inbound.next() => match msg {
                Some(Ok(note)) => {
                    let delivery = subscription.publish(note);
                    increment_notes_relayed(delivery.delivered as u64);
                    if delivery.evicted > 0 {
                        increment_peers_evicted(delivery.evicted as u64);
                        #[cfg(feature = "tracing")]
                        tracing::debug!(
                            "Evicted {} departed RouteChat peer(s)",
                            delivery.evicted
                        );
                    }
                }
                Some(Err(_status)) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!("RouteChat inbound failed: {_status}");
                    return Err(Error::RequestCancelled);
                }
                None => return Ok(()),
            },
        }
    }
}
