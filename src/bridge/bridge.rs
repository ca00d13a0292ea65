//! # Shard Bridge
//!
//! Request/response and broadcast messaging between shard processes over a
//! single shared pub/sub channel. Every request type dispatches through the
//! one [`DispatchTable`], whether the request arrived from the wire or from
//! this process itself - the local short-circuit path skips the transport
//! round trip but not the table.
//!
//! Pending correlations are actively expired by a reaper independent of
//! whether a response ever arrives or the caller still awaits the future,
//! so abandoned requests cannot grow the map without bound.

use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::BridgeSettings;

use super::dispatch::{DispatchTable, RequestContext};
use super::errors::{BridgeError, BridgeResult};
use super::message::{ShardMessage, ShardMessageKind, ShardTarget};
use super::transport::BridgeTransport;

#[derive(Debug)]
enum PendingRequest {
    /// Waiting for exactly one response
    Single {
        tx: Option<oneshot::Sender<Value>>,
        deadline: Instant,
    },
    /// Collecting every response that arrives before the deadline
    Aggregate {
        responses: Vec<Value>,
        deadline: Instant,
    },
}

impl PendingRequest {
    fn deadline(&self) -> Instant {
        match self {
            PendingRequest::Single { deadline, .. } => *deadline,
            PendingRequest::Aggregate { deadline, .. } => *deadline,
        }
    }
}

/// Cross-shard request/response and broadcast bridge
pub struct ShardBridge {
    shard_id: String,
    transport: Arc<dyn BridgeTransport>,
    dispatch: Arc<DispatchTable>,
    pending: Arc<DashMap<Uuid, PendingRequest>>,
    settings: BridgeSettings,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for ShardBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardBridge")
            .field("shard_id", &self.shard_id)
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl ShardBridge {
    pub fn new(
        shard_id: impl Into<String>,
        transport: Arc<dyn BridgeTransport>,
        dispatch: Arc<DispatchTable>,
        settings: BridgeSettings,
    ) -> Arc<Self> {
        let (shutdown_tx, _) = watch::channel(false);
        Arc::new(Self {
            shard_id: shard_id.into(),
            transport,
            dispatch,
            pending: Arc::new(DashMap::new()),
            settings,
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn shard_id(&self) -> &str {
        &self.shard_id
    }

    /// Subscribe to the channel and start the receive loop and the
    /// correlation reaper. Called once by the hosting process.
    pub async fn initialize(self: &Arc<Self>) -> BridgeResult<()> {
        let mut incoming = self.transport.subscribe().await?;

        let receiver = Arc::clone(self);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let receive_loop = tokio::spawn(async move {
            loop {
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    received = incoming.recv() => {
                        match received {
                            Some(message) => receiver.handle_incoming(message),
                            None => {
                                warn!(shard = %receiver.shard_id, "Transport subscription ended");
                                break;
                            }
                        }
                    }
                }
            }
        });

        let reaper = Arc::clone(self);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let reap_interval = self.settings.reaper_interval();
        let reaper_loop = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(reap_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        reaper.reap_expired();
                    }
                }
            }
        });

        let mut tasks = self.tasks.lock().await;
        tasks.push(receive_loop);
        tasks.push(reaper_loop);

        info!(shard = %self.shard_id, "Shard bridge initialized");
        Ok(())
    }

    /// Stop background tasks and drop pending correlations. Outstanding
    /// request futures resolve as timeouts.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let mut tasks = self.tasks.lock().await;
        for handle in tasks.drain(..) {
            let _ = handle.await;
        }
        let dropped = self.pending.len();
        self.pending.clear();
        if dropped > 0 {
            warn!(shard = %self.shard_id, dropped, "Dropped pending requests at shutdown");
        }
    }

    // ---- Outbound API ----------------------------------------------------

    /// Send a request to one shard and await its response. When the target
    /// is this shard the handler runs in-process through the shared
    /// dispatch table without touching the transport.
    pub async fn request(
        &self,
        target_shard: &str,
        request_type: &str,
        payload: Value,
        timeout: Duration,
    ) -> BridgeResult<Value> {
        if target_shard == self.shard_id {
            let ctx = RequestContext {
                origin_shard: self.shard_id.clone(),
                correlation_id: Uuid::new_v4(),
                local: true,
            };
            return self.dispatch.dispatch(request_type, ctx, payload).await;
        }

        let message = ShardMessage::request(
            &self.shard_id,
            ShardTarget::shard(target_shard),
            request_type,
            payload,
        );
        let correlation_id = message.correlation_id;

        let (tx, rx) = oneshot::channel();
        self.pending.insert(
            correlation_id,
            PendingRequest::Single {
                tx: Some(tx),
                deadline: Instant::now() + timeout + self.settings.reaper_interval(),
            },
        );

        if let Err(err) = self.transport.publish(&message).await {
            self.pending.remove(&correlation_id);
            return Err(err);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(value)) => Ok(value),
            // Channel closed (reaper dropped the entry) or deadline hit:
            // both are timeouts to the caller
            Ok(Err(_)) | Err(_) => {
                self.pending.remove(&correlation_id);
                Err(BridgeError::timeout(request_type, timeout.as_millis() as u64))
            }
        }
    }

    /// Fan a request out to every shard and aggregate the responses that
    /// arrive before the deadline. Partial results are success; only an
    /// empty result set after the deadline is a timeout.
    pub async fn request_all(
        &self,
        request_type: &str,
        payload: Value,
        timeout: Duration,
    ) -> BridgeResult<Vec<Value>> {
        let message = ShardMessage::request(
            &self.shard_id,
            ShardTarget::All,
            request_type,
            payload.clone(),
        );
        let correlation_id = message.correlation_id;

        // Reap deadline sits past the caller's own deadline so the reaper
        // never races the requester collecting its results
        self.pending.insert(
            correlation_id,
            PendingRequest::Aggregate {
                responses: Vec::new(),
                deadline: Instant::now() + timeout + self.settings.reaper_interval() * 2,
            },
        );

        let publish_result = self.transport.publish(&message).await;

        // This shard is an eligible target: handle locally through the same
        // dispatch table instead of round-tripping the transport.
        let ctx = RequestContext {
            origin_shard: self.shard_id.clone(),
            correlation_id,
            local: true,
        };
        match self.dispatch.dispatch(request_type, ctx, payload).await {
            Ok(value) => self.record_response(correlation_id, value),
            Err(err) => {
                debug!(shard = %self.shard_id, request_type, error = %err, "Local handler declined all-request");
            }
        }

        if let Err(err) = publish_result {
            // Remote shards never saw the request; resolve with whatever the
            // local handler produced so single-shard deployments still work.
            let responses = self.take_aggregate(correlation_id);
            warn!(shard = %self.shard_id, error = %err, "Publish failed for all-request");
            return if responses.is_empty() {
                Err(err)
            } else {
                Ok(responses)
            };
        }

        tokio::time::sleep(timeout).await;

        let responses = self.take_aggregate(correlation_id);
        if responses.is_empty() {
            Err(BridgeError::timeout(request_type, timeout.as_millis() as u64))
        } else {
            Ok(responses)
        }
    }

    /// Publish a fire-and-forget broadcast; no correlation bookkeeping. The
    /// local handler runs too, through the same dispatch table.
    pub async fn broadcast(&self, request_type: &str, payload: Value) -> BridgeResult<()> {
        let message = ShardMessage::broadcast(&self.shard_id, request_type, payload.clone());

        let dispatch = Arc::clone(&self.dispatch);
        let ctx = RequestContext {
            origin_shard: self.shard_id.clone(),
            correlation_id: message.correlation_id,
            local: true,
        };
        let request_type_owned = request_type.to_string();
        tokio::spawn(async move {
            if let Err(err) = dispatch.dispatch(&request_type_owned, ctx, payload).await {
                debug!(request_type = %request_type_owned, error = %err, "Local broadcast handler failed");
            }
        });

        self.transport.publish(&message).await
    }

    /// Number of outstanding correlations, exposed for tests and stats
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    // ---- Inbound handling ------------------------------------------------

    /// Route one inbound envelope. Handler work is spawned so a slow
    /// handler - or one that itself issues bridge requests - never stalls
    /// the receive loop.
    fn handle_incoming(&self, message: ShardMessage) {
        match message.kind {
            ShardMessageKind::Request => {
                // Own requests were already handled via the local path
                if message.origin_shard == self.shard_id {
                    return;
                }
                if !message.target.includes(&self.shard_id) {
                    return;
                }

                let ctx = RequestContext {
                    origin_shard: message.origin_shard.clone(),
                    correlation_id: message.correlation_id,
                    local: false,
                };
                let dispatch = Arc::clone(&self.dispatch);
                let transport = Arc::clone(&self.transport);
                let shard_id = self.shard_id.clone();
                tokio::spawn(async move {
                    match dispatch
                        .dispatch(&message.request_type, ctx, message.payload.clone())
                        .await
                    {
                        Ok(payload) => {
                            let response =
                                ShardMessage::response_to(&message, &shard_id, payload);
                            if let Err(err) = transport.publish(&response).await {
                                warn!(
                                    shard = %shard_id,
                                    correlation_id = %message.correlation_id,
                                    error = %err,
                                    "Failed to publish response"
                                );
                            }
                        }
                        Err(err) => {
                            // No response: the requester aggregates only
                            // shards that could answer, and "zero answers"
                            // stays distinguishable from an error payload.
                            debug!(
                                shard = %shard_id,
                                request_type = %message.request_type,
                                error = %err,
                                "Handler declined request"
                            );
                        }
                    }
                });
            }
            ShardMessageKind::Response => {
                if !message.target.includes(&self.shard_id) {
                    return;
                }
                self.record_response(message.correlation_id, message.payload);
            }
            ShardMessageKind::Broadcast => {
                if message.origin_shard == self.shard_id {
                    return;
                }
                let ctx = RequestContext {
                    origin_shard: message.origin_shard.clone(),
                    correlation_id: message.correlation_id,
                    local: false,
                };
                let dispatch = Arc::clone(&self.dispatch);
                let shard_id = self.shard_id.clone();
                tokio::spawn(async move {
                    if let Err(err) = dispatch
                        .dispatch(&message.request_type, ctx, message.payload)
                        .await
                    {
                        debug!(
                            shard = %shard_id,
                            error = %err,
                            "Broadcast handler failed"
                        );
                    }
                });
            }
        }
    }

    fn record_response(&self, correlation_id: Uuid, payload: Value) {
        let mut remove_after = false;
        if let Some(mut entry) = self.pending.get_mut(&correlation_id) {
            match entry.value_mut() {
                PendingRequest::Single { tx, .. } => {
                    if let Some(tx) = tx.take() {
                        let _ = tx.send(payload);
                    }
                    remove_after = true;
                }
                PendingRequest::Aggregate { responses, .. } => {
                    responses.push(payload);
                }
            }
        }
        if remove_after {
            self.pending.remove(&correlation_id);
        }
    }

    fn take_aggregate(&self, correlation_id: Uuid) -> Vec<Value> {
        match self.pending.remove(&correlation_id) {
            Some((_, PendingRequest::Aggregate { responses, .. })) => responses,
            _ => Vec::new(),
        }
    }

    /// Drop correlations whose deadline has passed, whether or not anyone
    /// still awaits them
    fn reap_expired(&self) {
        let now = Instant::now();
        let expired: Vec<Uuid> = self
            .pending
            .iter()
            .filter(|entry| entry.value().deadline() <= now)
            .map(|entry| *entry.key())
            .collect();

        for correlation_id in expired {
            if self.pending.remove(&correlation_id).is_some() {
                debug!(correlation_id = %correlation_id, "Reaped expired correlation");
            }
        }
    }
}
