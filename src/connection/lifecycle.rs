//! Connection lifecycle state machine

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::error::GatewayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ConnectionState {
    Connecting = 0,
    Authenticating = 1,
    Registered = 2,
    Streaming = 3,
    Closing = 4,
    Closed = 5,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Connecting,
            1 => ConnectionState::Authenticating,
            2 => ConnectionState::Registered,
            3 => ConnectionState::Streaming,
            4 => ConnectionState::Closing,
            _ => ConnectionState::Closed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Authenticating => "authenticating",
            ConnectionState::Registered => "registered",
            ConnectionState::Streaming => "streaming",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
        }
    }

    /// Authenticating -> Closed goes through Closing so the transport is
    /// closed by the same step on every path.
    pub fn can_transition_to(&self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Connecting, Authenticating)
                | (Authenticating, Registered)
                | (Authenticating, Closing)
                | (Registered, Streaming)
                | (Registered, Closing)
                | (Streaming, Closing)
                | (Closing, Closed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        *self == ConnectionState::Closed
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Atomic holder for a connection's lifecycle state.
///
/// Created with the `Connection` when the listener accepts a stream.
#[derive(Debug)]
pub struct Lifecycle {
    state: AtomicU8,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(ConnectionState::Connecting as u8),
        }
    }

    /// Lifecycle of a stream the listener has already accepted.
    pub fn authenticating() -> Self {
        Self {
            state: AtomicU8::new(ConnectionState::Authenticating as u8),
        }
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Move to `next`, returning the previous state.
    pub fn advance(&self, next: ConnectionState) -> Result<ConnectionState, GatewayError> {
        let mut current = self.state();
        loop {
            if !current.can_transition_to(next) {
                return Err(GatewayError::InvalidTransition {
                    from: current,
                    to: next,
                });
            }
            match self.state.compare_exchange(
                current as u8,
                next as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(current),
                Err(actual) => current = ConnectionState::from_u8(actual),
            }
        }
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.state(), ConnectionState::Connecting);

        for next in [
            ConnectionState::Authenticating,
            ConnectionState::Registered,
            ConnectionState::Streaming,
            ConnectionState::Closing,
            ConnectionState::Closed,
        ] {
            lifecycle.advance(next).unwrap();
            assert_eq!(lifecycle.state(), next);
        }
        assert!(lifecycle.state().is_terminal());
    }

    #[test]
    fn test_accepted_stream_starts_authenticating() {
        let lifecycle = Lifecycle::authenticating();
        assert_eq!(lifecycle.state(), ConnectionState::Authenticating);
        assert!(lifecycle.advance(ConnectionState::Authenticating).is_err());
        lifecycle.advance(ConnectionState::Registered).unwrap();
    }

    #[test]
    fn test_rejected_authentication_never_registers() {
        let lifecycle = Lifecycle::new();
        lifecycle.advance(ConnectionState::Authenticating).unwrap();
        lifecycle.advance(ConnectionState::Closing).unwrap();

        let err = lifecycle.advance(ConnectionState::Registered).unwrap_err();
        assert!(matches!(
            err,
            GatewayError::InvalidTransition {
                from: ConnectionState::Closing,
                to: ConnectionState::Registered
            }
        ));

        lifecycle.advance(ConnectionState::Closed).unwrap();
    }

    #[test]
    fn test_closed_is_terminal() {
        let lifecycle = Lifecycle::new();
        lifecycle.advance(ConnectionState::Authenticating).unwrap();
        lifecycle.advance(ConnectionState::Closing).unwrap();
        lifecycle.advance(ConnectionState::Closed).unwrap();

        for next in [
            ConnectionState::Connecting,
            ConnectionState::Authenticating,
            ConnectionState::Registered,
            ConnectionState::Streaming,
            ConnectionState::Closing,
            ConnectionState::Closed,
        ] {
            assert!(lifecycle.advance(next).is_err());
        }
    }

    #[test]
    fn test_cannot_skip_authentication() {
        let lifecycle = Lifecycle::new();
        assert!(lifecycle.advance(ConnectionState::Registered).is_err());
        assert!(lifecycle.advance(ConnectionState::Streaming).is_err());
        assert_eq!(lifecycle.state(), ConnectionState::Connecting);
    }
}
