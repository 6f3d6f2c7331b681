//! Message-level units crossing the pipeline boundary, plus the client-facing
//! wrapper types the manager accepts and emits.
//!
//! The real command catalogue (the individual write/read/subscribe commands
//! an event-store client actually sends) is a different crate's concern —
//! out of scope here per design. [`Message`] carries only the protocol
//! control messages the connection core's own state machine inspects
//! (heartbeats, subscription lifecycle) plus one opaque `Custom` variant
//! standing in for everything else.

use serde::{Deserialize, Serialize};

use crate::correlation::CorrelationId;

/// Username/password stand-in for the real credentials crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Protocol-level messages the connection core's state machine inspects
/// directly, plus an escape hatch for application command bodies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    Ping,
    Pong,
    HeartbeatRequest,
    HeartbeatResponse,
    SubscribeCompleted,
    Unsubscribe,
    UnsubscribeCompleted,
    /// Opaque application-defined command/response body.
    Custom(Vec<u8>),
}

impl Message {
    pub fn is_heartbeat_probe(&self) -> bool {
        matches!(self, Message::HeartbeatRequest | Message::Ping)
    }
}

/// A decode or protocol-layer failure surfaced in place of a decoded message.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
pub enum MessageFailure {
    #[error("frame did not decode: {0}")]
    Decode(String),
    #[error("connection lost")]
    ConnectionLost,
}

/// `(message, correlationId, credentials?)` handed to the pipeline for
/// transmission.
#[derive(Debug, Clone, PartialEq)]
pub struct PackageOut {
    pub message: Message,
    pub correlation_id: CorrelationId,
    pub credentials: Option<Credentials>,
}

/// `(correlationId, message-or-failure)` produced by the pipeline from an
/// inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub struct PackageIn {
    pub correlation_id: CorrelationId,
    pub result: Result<Message, MessageFailure>,
}

/// Higher-level shape the client-facing façade accepts; the manager wraps it
/// into a [`PackageOut`] with a freshly minted correlation id and either
/// explicit or default credentials.
#[derive(Debug, Clone, PartialEq)]
pub enum OutLike {
    Out(Message),
    WithCredentials(Message, Credentials),
}

impl OutLike {
    pub fn into_package(self, correlation_id: CorrelationId, default: Option<Credentials>) -> PackageOut {
        match self {
            OutLike::Out(message) => PackageOut {
                message,
                correlation_id,
                credentials: default,
            },
            OutLike::WithCredentials(message, credentials) => PackageOut {
                message,
                correlation_id,
                credentials: Some(credentials),
            },
        }
    }
}

/// What the manager delivers to a registered client.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Message {
        correlation_id: CorrelationId,
        message: Message,
    },
    Failure {
        correlation_id: CorrelationId,
        failure: MessageFailure,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn heartbeat_probes_are_identified() {
        assert!(Message::Ping.is_heartbeat_probe());
        assert!(Message::HeartbeatRequest.is_heartbeat_probe());
        assert!(!Message::Pong.is_heartbeat_probe());
    }

    #[test]
    fn out_like_uses_explicit_credentials_when_given() {
        let id = CorrelationId::new();
        let creds = Credentials {
            username: "u".into(),
            password: "p".into(),
        };
        let pkg = OutLike::WithCredentials(Message::Ping, creds.clone()).into_package(id, None);
        assert_eq!(pkg.credentials, Some(creds));
    }

    #[test]
    fn out_like_falls_back_to_default_credentials() {
        let id = CorrelationId::new();
        let default = Credentials {
            username: "d".into(),
            password: "d".into(),
        };
        let pkg = OutLike::Out(Message::Ping).into_package(id, Some(default.clone()));
        assert_eq!(pkg.credentials, Some(default));
    }
}
