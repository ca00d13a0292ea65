//! # Bridge Transport
//!
//! Typed message-passing seam under the shard bridge. Production rides a
//! single Redis pub/sub channel; [`InProcessTransport`] serves tests and
//! single-shard deployments with identical semantics, which keeps the local
//! and remote dispatch paths on one interface.

use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use super::errors::{BridgeError, BridgeResult};
use super::message::ShardMessage;

/// Transport contract: fire-and-forget publish plus a subscription stream
#[async_trait]
pub trait BridgeTransport: Send + Sync + std::fmt::Debug {
    async fn publish(&self, message: &ShardMessage) -> BridgeResult<()>;

    /// Open a subscription delivering every message on the shared channel,
    /// including this process's own publishes
    async fn subscribe(&self) -> BridgeResult<mpsc::Receiver<ShardMessage>>;
}

/// Redis pub/sub transport over one well-known channel
pub struct RedisTransport {
    client: redis::Client,
    publisher: ConnectionManager,
    channel: String,
}

impl std::fmt::Debug for RedisTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisTransport")
            .field("channel", &self.channel)
            .finish()
    }
}

impl RedisTransport {
    pub async fn connect(url: &str, channel: impl Into<String>) -> BridgeResult<Self> {
        let client =
            redis::Client::open(url).map_err(|e| BridgeError::transport(e.to_string()))?;
        let publisher = ConnectionManager::new(client.clone())
            .await
            .map_err(|e| BridgeError::transport(e.to_string()))?;

        Ok(Self {
            client,
            publisher,
            channel: channel.into(),
        })
    }
}

#[async_trait]
impl BridgeTransport for RedisTransport {
    async fn publish(&self, message: &ShardMessage) -> BridgeResult<()> {
        let raw = message
            .to_json()
            .map_err(|e| BridgeError::serialization(e.to_string()))?;

        let mut conn = self.publisher.clone();
        let _: i64 = conn
            .publish(&self.channel, raw)
            .await
            .map_err(|e| BridgeError::transport(e.to_string()))?;
        Ok(())
    }

    async fn subscribe(&self) -> BridgeResult<mpsc::Receiver<ShardMessage>> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| BridgeError::transport(e.to_string()))?;
        pubsub
            .subscribe(&self.channel)
            .await
            .map_err(|e| BridgeError::transport(e.to_string()))?;

        let (tx, rx) = mpsc::channel(1024);
        let channel = self.channel.clone();

        tokio::spawn(async move {
            let mut stream = pubsub.on_message();
            while let Some(msg) = stream.next().await {
                let raw: String = match msg.get_payload() {
                    Ok(raw) => raw,
                    Err(err) => {
                        warn!(channel = %channel, error = %err, "Unreadable pub/sub payload");
                        continue;
                    }
                };
                match ShardMessage::from_json(&raw) {
                    Ok(message) => {
                        if tx.send(message).await.is_err() {
                            debug!(channel = %channel, "Subscriber dropped, ending pump");
                            break;
                        }
                    }
                    Err(err) => {
                        warn!(channel = %channel, error = %err, "Malformed shard message");
                    }
                }
            }
        });

        Ok(rx)
    }
}

/// In-process transport on a tokio broadcast channel. Every subscriber sees
/// every published message, mirroring Redis pub/sub fan-out.
#[derive(Debug, Clone)]
pub struct InProcessTransport {
    sender: broadcast::Sender<ShardMessage>,
}

impl InProcessTransport {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }
}

impl Default for InProcessTransport {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl BridgeTransport for InProcessTransport {
    async fn publish(&self, message: &ShardMessage) -> BridgeResult<()> {
        // No subscribers is fine; the message simply has no audience yet
        let _ = self.sender.send(message.clone());
        Ok(())
    }

    async fn subscribe(&self) -> BridgeResult<mpsc::Receiver<ShardMessage>> {
        let mut source = self.sender.subscribe();
        let (tx, rx) = mpsc::channel(1024);

        tokio::spawn(async move {
            loop {
                match source.recv().await {
                    Ok(message) => {
                        if tx.send(message).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "In-process transport lagged, messages dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(rx)
    }
}
