//! gRPC service implementation for the RouteGuide API.
//!
//! This module defines [`RouteGuideService`], the concrete implementation of
//! the [`RouteGuide`] gRPC service defined in the protobuf specification.
//!
//! ## Responsibilities
//!
//! - Answer `GetFeature` lookups straight from the [`FeatureStore`].
//! - Spawn one producer task per `ListFeatures` call, driven by
//!   [`feed_features`].
//! - Fold `RecordRoute` points into a summary via [`summarize_route`].
//! - Join each `RouteChat` call to the shared [`ChatRelay`] and pump its notes
//!   with [`relay_notes`].
//! - Refuse, drain and cancel streaming calls during shutdown.

use crate::server::{
    chat::ChatRelay,
    config::ServerConfig,
    service::{
        lifecycle::Lifecycle,
        streams::{feed_features, relay_notes, summarize_route},
    },
    store::FeatureStore,
    telemetry::{increment_features_streamed, increment_requests, increment_stream_errors},
};
use core::{pin::Pin, time::Duration};
use futures::TryStreamExt;
use routeguide_core::proto::{
    Feature, Point, Rectangle, RouteNote, RouteSummary, route_guide_server::RouteGuide,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::{
    Stream,
    wrappers::{ReceiverStream, UnboundedReceiverStream},
};
use tonic::{Request, Response, Status, Streaming};

/// RouteGuide gRPC service.
///
/// Cloning is cheap: every clone shares the same feature store, chat relay
/// and lifecycle, so a clone handed to the tonic router and the one kept for
/// shutdown act on the same state.
#[derive(Clone)]
pub struct RouteGuideService {
    config: ServerConfig,
    store: Arc<FeatureStore>,
    relay: ChatRelay,
    lifecycle: Arc<Lifecycle>,
}

impl RouteGuideService {
    pub fn new(config: ServerConfig, store: Arc<FeatureStore>) -> Self {
        let relay = ChatRelay::new(config.chat_history_limit);
        let lifecycle = Lifecycle::new(Duration::from_secs(config.shutdown_timeout));

        Self {
            config,
            store,
            relay,
            lifecycle: Arc::new(lifecycle),
        }
    }

    /// Number of streaming calls currently running.
    pub fn streams_inflight(&self) -> usize {
        self.lifecycle.streams_inflight()
    }

    /// Number of live `RouteChat` participants.
    pub fn chat_participants(&self) -> usize {
        self.relay.subscriber_count()
    }

    /// Number of `RouteChat` participants whose latest note was sent from
    /// `point`.
    pub fn chat_participants_at(&self, point: &Point) -> usize {
        self.relay.subscribers_at(point)
    }

    /// Initiates a graceful shutdown.
    ///
    /// New streaming calls are refused with `UNAVAILABLE`. Calls already
    /// running get `shutdown_timeout` seconds to finish before they are
    /// cancelled.
    pub async fn shutdown(&self) {
        self.lifecycle.shutdown().await;
    }
}

#[tonic::async_trait]
impl RouteGuide for RouteGuideService {
    type ListFeaturesStream = Pin<Box<dyn Stream<Item = Result<Feature, Status>> + Send>>;
    type RouteChatStream = UnboundedReceiverStream<Result<RouteNote, Status>>;

    /// Returns the named feature at the requested point, or an unnamed feature
    /// carrying the point when nothing is known there.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(
        latitude = req.get_ref().latitude,
        longitude = req.get_ref().longitude,
    )))]
    async fn get_feature(&self, req: Request<Point>) -> Result<Response<Feature>, Status> {
        increment_requests("GetFeature");
        let feature = self.store.feature_at(req.into_inner());

        #[cfg(feature = "tracing")]
        tracing::debug!(found = !feature.name.is_empty(), "GetFeature");

        Ok(Response::new(feature))
    }

    /// Streams every named feature inside the requested rectangle.
    ///
    /// Results are produced by a spawned task into a bounded buffer of
    /// `stream_buffer_size` entries, so a slow client applies backpressure to
    /// the scan instead of growing memory.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    async fn list_features(
        &self,
        req: Request<Rectangle>,
    ) -> Result<Response<Self::ListFeaturesStream>, Status> {
        increment_requests("ListFeatures");
        let guard = self
            .lifecycle
            .begin_stream()
            .inspect_err(|_| increment_stream_errors())?;

        let rect = req.into_inner();
        let (resp_tx, resp_rx) =
            mpsc::channel::<Result<Feature, Status>>(self.config.stream_buffer_size);
        let store = Arc::clone(&self.store);
        let shutdown = self.lifecycle.shutdown_token();

        let fut = async move {
            let _guard = guard;
            match feed_features(&store, &rect, &resp_tx, &shutdown).await {
                Ok(_sent) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!("ListFeatures sent {} feature(s)", _sent);
                }
                Err(_e) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!("ListFeatures stopped early: {}", _e);
                }
            }
        };
        #[cfg(feature = "tracing")]
        let fut = {
            use tracing::Instrument;
            let span = tracing::info_span!("list_features_stream");
            fut.instrument(span)
        };

        tokio::spawn(fut);

        let stream = ReceiverStream::new(resp_rx)
            .inspect_ok(|_| increment_features_streamed(1))
            .inspect_err(|_| increment_stream_errors());

        Ok(Response::new(Box::pin(stream)))
    }

    /// Consumes a client stream of points and replies with a single summary
    /// once the client half-closes.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    async fn record_route(
        &self,
        req: Request<Streaming<Point>>,
    ) -> Result<Response<RouteSummary>, Status> {
        increment_requests("RecordRoute");
        let _guard = self
            .lifecycle
            .begin_stream()
            .inspect_err(|_| increment_stream_errors())?;

        let shutdown = self.lifecycle.shutdown_token();
        let summary = summarize_route(&self.store, req.into_inner(), &shutdown)
            .await
            .inspect_err(|_e| {
                increment_stream_errors();
                #[cfg(feature = "tracing")]
                tracing::warn!("RecordRoute failed: {}", _e);
            })?;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            point_count = summary.point_count,
            feature_count = summary.feature_count,
            distance = summary.distance,
            "RecordRoute finished"
        );

        Ok(Response::new(summary))
    }

    /// Joins the caller to the location-keyed chat.
    ///
    /// Each inbound note is relayed to every other participant currently at
    /// the note's location. The outbound buffer is unbounded, so a slow
    /// reader still receives every note. The outbound stream ends once the
    /// client half-closes or disconnects.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    async fn route_chat(
        &self,
        req: Request<Streaming<RouteNote>>,
    ) -> Result<Response<Self::RouteChatStream>, Status> {
        increment_requests("RouteChat");
        let guard = self
            .lifecycle
            .begin_stream()
            .inspect_err(|_| increment_stream_errors())?;

        let inbound = req.into_inner();
        let (resp_tx, resp_rx) = mpsc::unbounded_channel::<Result<RouteNote, Status>>();
        let subscription = self.relay.join(resp_tx.clone());
        let shutdown = self.lifecycle.shutdown_token();

        let fut = async move {
            let _guard = guard;
            let result = relay_notes(&subscription, inbound, &resp_tx, &shutdown).await;
            // Leaving the relay releases its sender clone; dropping ours
            // below then ends the outbound stream.
            drop(subscription);

            if let Err(_e) = result {
                increment_stream_errors();
                #[cfg(feature = "tracing")]
                tracing::debug!("RouteChat ended: {}", _e);
            }
        };
        #[cfg(feature = "tracing")]
        let fut = {
            use tracing::Instrument;
            let span = tracing::info_span!("route_chat_stream");
            fut.instrument(span)
        };

        tokio::spawn(fut);

        Ok(Response::new(UnboundedReceiverStream::new(resp_rx)))
    }
}
