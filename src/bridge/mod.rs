//! # Cross-Shard Bridge
//!
//! Request/response and broadcast protocol over a shared pub/sub channel,
//! used by any shard to query or command data living on another shard.
//! Local and remote dispatch share one typed table; the local path skips
//! the transport, never the table.

pub mod bridge;
pub mod dispatch;
pub mod errors;
pub mod message;
pub mod transport;

pub use bridge::ShardBridge;
pub use dispatch::{DispatchTable, RequestContext, RequestHandler};
pub use errors::{BridgeError, BridgeResult};
pub use message::{ShardMessage, ShardMessageKind, ShardTarget};
pub use transport::{BridgeTransport, InProcessTransport, RedisTransport};
