use connectify_common::ConnectifyError;

/// Errors surfaced by the presence transport and tracker.
///
/// None of these are fatal to the host: the tracker logs them and falls back
/// to the unjoined state, where every status query resolves to offline.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PresenceError {
    #[error("session is not authenticated")]
    NotAuthenticated,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("join rejected on {topic}: {reason}")]
    JoinRejected { topic: String, reason: String },

    #[error("join timed out on {topic}")]
    JoinTimeout { topic: String },

    #[error("push {event} rejected: {reason}")]
    PushRejected { event: String, reason: String },

    #[error("push {event} timed out")]
    PushTimeout { event: String },

    #[error("channel {0} is not joined")]
    NotJoined(String),

    #[error("disconnected")]
    Disconnected,

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for PresenceError {
    fn from(e: serde_json::Error) -> Self {
        PresenceError::Serialization(e.to_string())
    }
}

impl From<PresenceError> for ConnectifyError {
    fn from(e: PresenceError) -> Self {
        match e {
            PresenceError::Connection(msg) => ConnectifyError::Network(msg),
            other => ConnectifyError::Presence(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = PresenceError::JoinRejected {
            topic: "status".into(),
            reason: "unauthorized".into(),
        };
        assert_eq!(err.to_string(), "join rejected on status: unauthorized");

        let err = PresenceError::PushTimeout {
            event: "status:update".into(),
        };
        assert_eq!(err.to_string(), "push status:update timed out");
    }

    #[test]
    fn converts_into_connectify_error() {
        let err: ConnectifyError = PresenceError::Connection("refused".into()).into();
        assert!(matches!(err, ConnectifyError::Network(_)));

        let err: ConnectifyError = PresenceError::Disconnected.into();
        assert!(matches!(err, ConnectifyError::Presence(ref m) if m == "disconnected"));
    }
}
