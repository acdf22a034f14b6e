//! Session connection states.
//!
//! ```text
//! Idle ─► Resolving ─► Connecting ─► Handshaking ─► Open ─► Closing ─► Closed
//!   │          │            │              │          │
//!   │          └────────────┴──────────────┴──────────┴──────► Errored
//!   └──────────────────────────────────────────────────────────► Closed
//! ```
//!
//! `Idle ─► Closed` only happens when every handle is dropped before
//! `connect` was called.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

// ============================================================================
// State
// ============================================================================

/// Lifecycle state of a [`Session`](crate::Session).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum State {
    /// Constructed, `connect` not called yet.
    #[default]
    Idle,
    /// Waiting for name resolution.
    Resolving,
    /// Trying resolved endpoints under the connect-phase deadline.
    Connecting,
    /// Transport established, WebSocket upgrade in progress.
    Handshaking,
    /// Exchanging messages.
    Open,
    /// Close handshake in progress.
    Closing,
    /// Closed on request. Terminal.
    Closed,
    /// Failed or lost the connection. Terminal.
    Errored,
}

impl State {
    /// Returns `true` for states a session never leaves.
    #[inline]
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Errored)
    }

    /// Returns `true` while `connect` is still in progress.
    #[inline]
    #[must_use]
    pub const fn is_connecting(&self) -> bool {
        matches!(self, Self::Resolving | Self::Connecting | Self::Handshaking)
    }

    /// Returns `true` if the state machine may move from `self` to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: State) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Resolving | Self::Closed)
                | (Self::Resolving, Self::Connecting | Self::Errored)
                | (Self::Connecting, Self::Handshaking | Self::Errored)
                | (Self::Handshaking, Self::Open | Self::Errored)
                | (Self::Open, Self::Closing | Self::Errored)
                | (Self::Closing, Self::Closed)
        )
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Resolving => "resolving",
            Self::Connecting => "connecting",
            Self::Handshaking => "handshaking",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
            Self::Errored => "errored",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [State; 8] = [
        State::Idle,
        State::Resolving,
        State::Connecting,
        State::Handshaking,
        State::Open,
        State::Closing,
        State::Closed,
        State::Errored,
    ];

    #[test]
    fn test_default_is_idle() {
        assert_eq!(State::default(), State::Idle);
    }

    #[test]
    fn test_happy_path_is_allowed() {
        let path = [
            State::Idle,
            State::Resolving,
            State::Connecting,
            State::Handshaking,
            State::Open,
            State::Closing,
            State::Closed,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_no_stage_is_skipped() {
        assert!(!State::Idle.can_transition_to(State::Connecting));
        assert!(!State::Resolving.can_transition_to(State::Handshaking));
        assert!(!State::Connecting.can_transition_to(State::Open));
        assert!(!State::Idle.can_transition_to(State::Open));
    }

    #[test]
    fn test_terminal_states_are_absorbing() {
        for next in ALL {
            assert!(!State::Closed.can_transition_to(next));
            assert!(!State::Errored.can_transition_to(next));
        }
        assert!(State::Closed.is_terminal());
        assert!(State::Errored.is_terminal());
        assert!(!State::Closing.is_terminal());
    }

    #[test]
    fn test_closing_cannot_error() {
        assert!(!State::Closing.can_transition_to(State::Errored));
    }

    #[test]
    fn test_is_connecting() {
        let connecting: Vec<State> = ALL.into_iter().filter(State::is_connecting).collect();
        assert_eq!(
            connecting,
            [State::Resolving, State::Connecting, State::Handshaking]
        );
    }
}
