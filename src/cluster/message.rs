use serde::{Deserialize, Serialize};

/// Message classes a member can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    Event,
    Record,
    Rpc,
    Presence,
    StateRegistry,
    Monitoring,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Emit,
    Subscribe,
    Unsubscribe,
    Update,
    Request,
    Response,
}

/// Application-level message exchanged between members. Carried opaquely by
/// the relay; only the member dispatch layer interprets it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterMessage {
    pub topic: Topic,
    pub action: Action,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl ClusterMessage {
    pub fn new(topic: Topic, action: Action) -> Self {
        Self {
            topic,
            action,
            name: None,
            payload: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// Transport-level wrapper around a [`ClusterMessage`], one JSON document
/// per wire frame. A missing `to_server` means broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub message: ClusterMessage,
    pub from_server: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_server: Option<String>,
}

impl Envelope {
    pub fn broadcast(message: ClusterMessage, from_server: impl Into<String>) -> Self {
        Self {
            message,
            from_server: from_server.into(),
            to_server: None,
        }
    }

    pub fn direct(
        message: ClusterMessage,
        from_server: impl Into<String>,
        to_server: impl Into<String>,
    ) -> Self {
        Self {
            message,
            from_server: from_server.into(),
            to_server: Some(to_server.into()),
        }
    }

    /// Whether the member named `server_name` should hand this envelope to
    /// its subscribers. Addressing is a member-side filter; the relay
    /// forwards every frame to everyone but the sender.
    pub fn is_addressed_to(&self, server_name: &str) -> bool {
        match &self.to_server {
            Some(target) => target == server_name,
            None => true,
        }
    }
}
