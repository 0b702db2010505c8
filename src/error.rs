//! Errors surfaced by the socket engine.

use std::fmt;

/// Errors that can occur during socket operations.
///
/// Rejected subscriptions are not errors: they reach the `rejected`
/// callbacks instead. Removing an unknown registration or unsubscribing an
/// unknown channel is a no-op.
#[derive(Debug)]
pub enum SocketError {
    /// The configured credential is missing, empty or malformed.
    InvalidCredential,
    /// `perform` was called on a channel without a live subscription.
    NotSubscribed(String),
    /// The transport adapter failed; the cause is passed through unchanged.
    Transport(anyhow::Error),
}

impl fmt::Display for SocketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidCredential => write!(
                f,
                "Invalid credential: an app key is required to connect to the transport"
            ),
            Self::NotSubscribed(channel) => {
                write!(f, "Not subscribed to channel '{channel}': call subscribe first")
            }
            Self::Transport(e) => write!(f, "Transport error: {e:#}"),
        }
    }
}

impl std::error::Error for SocketError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<anyhow::Error> for SocketError {
    fn from(e: anyhow::Error) -> Self {
        Self::Transport(e)
    }
}
