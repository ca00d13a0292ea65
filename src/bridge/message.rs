//! # Shard Message Envelopes
//!
//! Wire format for the cross-shard bridge. One well-known pub/sub channel
//! carries JSON envelopes of three kinds: requests (targeted or to all
//! shards), responses echoing the request's correlation id, and
//! fire-and-forget broadcasts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Message kinds carried on the shared channel; a closed set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShardMessageKind {
    Request,
    Response,
    Broadcast,
}

/// Addressing for a message: every shard, or one specific shard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum ShardTarget {
    All,
    Shard(String),
}

impl From<ShardTarget> for String {
    fn from(target: ShardTarget) -> Self {
        match target {
            ShardTarget::All => "all".to_string(),
            ShardTarget::Shard(id) => id,
        }
    }
}

impl From<String> for ShardTarget {
    fn from(raw: String) -> Self {
        if raw == "all" {
            ShardTarget::All
        } else {
            ShardTarget::Shard(raw)
        }
    }
}

impl ShardTarget {
    pub fn shard(id: impl Into<String>) -> Self {
        ShardTarget::Shard(id.into())
    }

    /// Whether a message with this target should be handled by `shard_id`
    pub fn includes(&self, shard_id: &str) -> bool {
        match self {
            ShardTarget::All => true,
            ShardTarget::Shard(id) => id == shard_id,
        }
    }
}

/// One request, response, or broadcast on the shared channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardMessage {
    /// Unique per request; responses echo the originating id
    pub correlation_id: Uuid,
    pub kind: ShardMessageKind,
    /// Request type from the closed, statically registered handler set
    pub request_type: String,
    pub origin_shard: String,
    pub target: ShardTarget,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

impl ShardMessage {
    /// Build a request envelope with a fresh correlation id
    pub fn request(
        origin_shard: impl Into<String>,
        target: ShardTarget,
        request_type: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            kind: ShardMessageKind::Request,
            request_type: request_type.into(),
            origin_shard: origin_shard.into(),
            target,
            payload,
            timestamp: Utc::now(),
        }
    }

    /// Build the response to a request, echoing its correlation id and
    /// addressing the original sender
    pub fn response_to(request: &ShardMessage, origin_shard: impl Into<String>, payload: Value) -> Self {
        Self {
            correlation_id: request.correlation_id,
            kind: ShardMessageKind::Response,
            request_type: request.request_type.clone(),
            origin_shard: origin_shard.into(),
            target: ShardTarget::shard(request.origin_shard.clone()),
            payload,
            timestamp: Utc::now(),
        }
    }

    /// Build a fire-and-forget broadcast
    pub fn broadcast(
        origin_shard: impl Into<String>,
        request_type: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            kind: ShardMessageKind::Broadcast,
            request_type: request_type.into(),
            origin_shard: origin_shard.into(),
            target: ShardTarget::All,
            payload,
            timestamp: Utc::now(),
        }
    }

    /// Convert to JSON for the wire
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse from the wire
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_round_trip() {
        let message = ShardMessage::request(
            "shard-1",
            ShardTarget::shard("shard-3"),
            "get_guild_count",
            json!({"guild_id": 42}),
        );

        let raw = message.to_json().unwrap();
        let parsed = ShardMessage::from_json(&raw).unwrap();

        assert_eq!(parsed.correlation_id, message.correlation_id);
        assert_eq!(parsed.kind, ShardMessageKind::Request);
        assert_eq!(parsed.target, ShardTarget::shard("shard-3"));
        assert_eq!(parsed.payload, json!({"guild_id": 42}));
    }

    #[test]
    fn test_target_wire_format() {
        let all = serde_json::to_string(&ShardTarget::All).unwrap();
        assert_eq!(all, "\"all\"");

        let specific = serde_json::to_string(&ShardTarget::shard("shard-7")).unwrap();
        assert_eq!(specific, "\"shard-7\"");

        let parsed: ShardTarget = serde_json::from_str("\"all\"").unwrap();
        assert_eq!(parsed, ShardTarget::All);
    }

    #[test]
    fn test_response_echoes_correlation_and_addresses_origin() {
        let request = ShardMessage::request("shard-1", ShardTarget::All, "ping", json!({}));
        let response = ShardMessage::response_to(&request, "shard-2", json!({"pong": true}));

        assert_eq!(response.correlation_id, request.correlation_id);
        assert_eq!(response.kind, ShardMessageKind::Response);
        assert_eq!(response.target, ShardTarget::shard("shard-1"));
    }

    #[test]
    fn test_target_includes() {
        assert!(ShardTarget::All.includes("shard-9"));
        assert!(ShardTarget::shard("shard-2").includes("shard-2"));
        assert!(!ShardTarget::shard("shard-2").includes("shard-3"));
    }
}
