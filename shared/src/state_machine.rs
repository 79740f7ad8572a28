//! Vehicle Link State Machine
//!
//! Defines the valid transitions of the client's link to a vehicle. Only the
//! connection controller drives these events.

use std::fmt;

/// Whether commands may currently be forwarded to the vehicle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        *self == ConnectionState::Connected
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}

/// Events that can trigger link transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// Connect request issued on the control channel
    ConnectRequested,
    /// Driver acknowledged the connect request
    ConnectSucceeded,
    /// Connect request failed or was refused
    ConnectFailed,
    /// Operator dropped the link locally
    DisconnectRequested,
}

/// Result of a state transition attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionResult {
    /// Transition was valid and state changed (or stayed put)
    Success(ConnectionState),
    /// Transition was invalid from current state
    Invalid { from: ConnectionState, event: LinkEvent },
}

/// Get the next state for a given event, if the transition is valid
pub fn next_state(from: ConnectionState, event: LinkEvent) -> Option<ConnectionState> {
    use ConnectionState::*;
    use LinkEvent::*;

    match (from, event) {
        // A second connect while one is in flight is refused
        (Disconnected, ConnectRequested) => Some(Connecting),
        // Re-confirming a live link keeps it live
        (Connected, ConnectRequested) => Some(Connected),

        (Connecting | Connected, ConnectSucceeded) => Some(Connected),
        (Connecting, ConnectFailed) => Some(Disconnected),

        // Disconnect is always honoured; late connect results are then invalid
        (_, DisconnectRequested) => Some(Disconnected),

        _ => None,
    }
}

/// Apply an event to a state
pub fn transition(from: ConnectionState, event: LinkEvent) -> TransitionResult {
    match next_state(from, event) {
        Some(state) => TransitionResult::Success(state),
        None => TransitionResult::Invalid { from, event },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConnectionState::*;

    #[test]
    fn test_initial_state() {
        assert_eq!(ConnectionState::default(), Disconnected);
        assert!(!Disconnected.is_connected());
    }

    #[test]
    fn test_connect_flow() {
        let result = transition(Disconnected, LinkEvent::ConnectRequested);
        assert_eq!(result, TransitionResult::Success(Connecting));

        let result = transition(Connecting, LinkEvent::ConnectSucceeded);
        assert_eq!(result, TransitionResult::Success(Connected));
        assert!(Connected.is_connected());
    }

    #[test]
    fn test_failed_connect_returns_to_disconnected() {
        assert_eq!(
            transition(Connecting, LinkEvent::ConnectFailed),
            TransitionResult::Success(Disconnected)
        );
    }

    #[test]
    fn test_concurrent_connect_rejected() {
        assert!(matches!(
            transition(Connecting, LinkEvent::ConnectRequested),
            TransitionResult::Invalid { from: Connecting, .. }
        ));
    }

    #[test]
    fn test_late_result_after_disconnect_is_invalid() {
        let state = match transition(Connecting, LinkEvent::DisconnectRequested) {
            TransitionResult::Success(s) => s,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(state, Disconnected);
        assert!(matches!(
            transition(state, LinkEvent::ConnectSucceeded),
            TransitionResult::Invalid { .. }
        ));
    }

    #[test]
    fn test_connect_while_connected_keeps_link_up() {
        assert_eq!(next_state(Connected, LinkEvent::ConnectRequested), Some(Connected));
        assert_eq!(next_state(Connected, LinkEvent::ConnectSucceeded), Some(Connected));
        // A failed re-confirm does not drop a live link
        assert_eq!(next_state(Connected, LinkEvent::ConnectFailed), None);
    }
}
