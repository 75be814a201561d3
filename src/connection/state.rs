//! Handshake state machine

use crate::{Error, Result};

/// Handshake / session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Initial state (nothing sent)
    Initial,

    /// Startup sent, awaiting an authentication challenge
    StartupSent,

    /// Password sent, awaiting the verdict
    Authenticating,

    /// `AuthenticationOk` received; collecting backend data and parameters
    Authenticated,

    /// `ReadyForQuery` received
    Ready,

    /// Handshake failed
    Failed,

    /// Closed
    Closed,
}

impl ConnectionState {
    /// Check if transition is valid
    pub fn can_transition_to(&self, next: ConnectionState) -> bool {
        use ConnectionState::*;

        matches!(
            (self, next),
            (Initial, StartupSent)
                | (StartupSent, Authenticating)
                | (StartupSent, Authenticated)
                | (Authenticating, Authenticated)
                | (Authenticated, Ready)
                | (Initial | StartupSent | Authenticating | Authenticated, Failed)
                | (_, Closed)
        )
    }

    /// Transition to new state
    pub fn transition(&mut self, next: ConnectionState) -> Result<()> {
        if !self.can_transition_to(next) {
            return Err(Error::InvalidState {
                expected: format!("valid transition from {:?}", self),
                actual: format!("{:?}", next),
            });
        }
        *self = next;
        Ok(())
    }

    /// A password may be sent in this state
    pub fn awaits_challenge(&self) -> bool {
        matches!(self, Self::StartupSent)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initial => write!(f, "initial"),
            Self::StartupSent => write!(f, "startup_sent"),
            Self::Authenticating => write!(f, "authenticating"),
            Self::Authenticated => write!(f, "authenticated"),
            Self::Ready => write!(f, "ready"),
            Self::Failed => write!(f, "failed"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_flow() {
        let mut state = ConnectionState::Initial;
        assert!(state.transition(ConnectionState::StartupSent).is_ok());
        assert!(state.transition(ConnectionState::Authenticating).is_ok());
        assert!(state.transition(ConnectionState::Authenticated).is_ok());
        assert!(state.transition(ConnectionState::Ready).is_ok());
    }

    #[test]
    fn test_trust_skips_authenticating() {
        let mut state = ConnectionState::StartupSent;
        assert!(state.transition(ConnectionState::Authenticated).is_ok());
    }

    #[test]
    fn test_ready_before_authenticated_is_invalid() {
        let mut state = ConnectionState::StartupSent;
        let err = state.transition(ConnectionState::Ready).unwrap_err();
        assert!(matches!(err, Error::InvalidState { .. }));
        assert_eq!(state, ConnectionState::StartupSent);
    }

    #[test]
    fn test_second_challenge_is_invalid() {
        let mut state = ConnectionState::Authenticating;
        assert!(state.transition(ConnectionState::Authenticating).is_err());
        assert!(!state.awaits_challenge());
    }

    #[test]
    fn test_close_from_any_state() {
        let mut state = ConnectionState::Authenticated;
        assert!(state.transition(ConnectionState::Closed).is_ok());
    }

    #[test]
    fn test_ready_cannot_fail_handshake() {
        let mut state = ConnectionState::Ready;
        assert!(state.transition(ConnectionState::Failed).is_err());
    }
}
