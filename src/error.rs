//! Error types for relay distribution and resolution.

use std::time::Duration;

use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`], used to decide between retrying,
/// advancing to the next relay, or surfacing to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Connect/publish timeout or refusal. Retried for broadcast, advances the
    /// relay for resolution.
    TransientNetwork,
    /// Malformed identifier, event or missing required tag. Never retried.
    ProtocolDecode,
    /// Every relay was tried and none succeeded.
    ExhaustedRelays,
    /// Key material could not sign or derive a secret.
    SigningFailure,
}

/// Errors produced by the broadcaster, resolver and receipt composer.
#[derive(Error, Debug)]
pub enum Error {
    /// The relay could not be reached or the handshake failed.
    #[error("relay {relay}: connection failed: {reason}")]
    Connect { relay: String, reason: String },

    /// A network step exceeded its deadline.
    #[error("relay {relay}: {stage} timed out after {timeout:?}")]
    Timeout {
        relay: String,
        stage: &'static str,
        timeout: Duration,
    },

    /// The relay answered `OK false` for a published event.
    #[error("relay {relay} rejected event: {reason}")]
    Rejected { relay: String, reason: String },

    /// The connection broke or the relay spoke something unexpected.
    #[error("relay {relay}: {reason}")]
    Transport { relay: String, reason: String },

    /// A human-readable identifier could not be decoded.
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// An event lacks a tag the operation requires.
    #[error("missing required tag: {0}")]
    MissingTag(&'static str),

    /// An event is structurally unusable for the requested operation.
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    /// No relay in the list yielded a profile record.
    #[error("no profile found for {identifier} on relays {relays:?}")]
    ProfileNotFound {
        identifier: String,
        relays: Vec<String>,
    },

    /// Every relay in a non-empty set failed to accept the event.
    #[error("event {event_id} could not be published to any of {attempted} relays")]
    PublishFailed { event_id: String, attempted: usize },

    /// Signing, key parsing, secret derivation or encryption failed.
    #[error("signing failed: {0}")]
    Signing(String),

    /// An operation needs the service key but none is configured.
    #[error("no private key configured")]
    MissingKey,

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Classify this error according to the propagation policy.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Connect { .. }
            | Self::Timeout { .. }
            | Self::Rejected { .. }
            | Self::Transport { .. } => ErrorClass::TransientNetwork,
            Self::InvalidIdentifier(_)
            | Self::MissingTag(_)
            | Self::InvalidEvent(_)
            | Self::Json(_) => ErrorClass::ProtocolDecode,
            Self::ProfileNotFound { .. } | Self::PublishFailed { .. } => {
                ErrorClass::ExhaustedRelays
            }
            Self::Signing(_) | Self::MissingKey => ErrorClass::SigningFailure,
        }
    }

    /// True when retrying the same relay could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::TransientNetwork
    }

    pub(crate) fn transport(relay: &str, reason: impl ToString) -> Self {
        Self::Transport {
            relay: relay.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn connect(relay: &str, reason: impl ToString) -> Self {
        Self::Connect {
            relay: relay.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classes_follow_taxonomy() {
        let timeout = Error::Timeout {
            relay: "wss://a".into(),
            stage: "connect",
            timeout: Duration::from_secs(5),
        };
        assert_eq!(timeout.class(), ErrorClass::TransientNetwork);
        assert!(timeout.is_transient());
        assert_eq!(Error::MissingTag("p").class(), ErrorClass::ProtocolDecode);
        assert_eq!(
            Error::ProfileNotFound {
                identifier: "npub1x".into(),
                relays: vec![],
            }
            .class(),
            ErrorClass::ExhaustedRelays
        );
        assert_eq!(
            Error::Signing("bad key".into()).class(),
            ErrorClass::SigningFailure
        );
        assert!(!Error::Signing("bad key".into()).is_transient());
    }

    #[test]
    fn not_found_message_names_identifier_and_relays() {
        let err = Error::ProfileNotFound {
            identifier: "npub1abc".into(),
            relays: vec!["wss://r1".into(), "wss://r2".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("npub1abc"));
        assert!(msg.contains("wss://r1"));
        assert!(msg.contains("wss://r2"));
    }
}
