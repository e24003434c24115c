//! Connection state of the MQTT session.

use std::fmt;

/// Where the MQTT session currently is in its lifecycle.
///
/// ```text
/// Disconnected -> Connecting -> Connected -> Disconnected
///                               Connected -> Reconnecting -> Connected
/// ```
///
/// Only [`Connected`](Self::Connected) accepts publishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// No session, either because none was ever requested or because it was closed.
    Disconnected,
    /// First handshake in progress.
    Connecting,
    Connected,
    /// An established session was lost; the transport is retrying. Carries the reason.
    Reconnecting(String),
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting(_) => "reconnecting",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reconnecting(reason) => write!(f, "reconnecting ({reason})"),
            other => f.write_str(other.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_connected_accepts_publishes() {
        assert!(ConnectionState::Connected.is_connected());
        assert!(!ConnectionState::Connecting.is_connected());
        assert!(!ConnectionState::Disconnected.is_connected());
        assert!(!ConnectionState::Reconnecting("reset".into()).is_connected());
    }

    #[test]
    fn display_includes_reconnect_reason() {
        assert_eq!(
            ConnectionState::Reconnecting("connection reset".into()).to_string(),
            "reconnecting (connection reset)"
        );
        assert_eq!(ConnectionState::Connected.to_string(), "connected");
    }
}
