//! Connection state machine.
//!
//! Four states, five legal transitions. The connection id is cleared by the
//! caller on every entry to `Connecting` (see `connection.rs`); this module
//! only owns the atomic state itself.

use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    Disconnecting = 3,
}

impl ConnectionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => ConnectionState::Disconnected,
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            3 => ConnectionState::Disconnecting,
            _ => unreachable!("invalid connection state discriminant"),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnecting => "disconnecting",
        }
    }

    fn is_legal_transition(from: ConnectionState, to: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (from, to),
            (Disconnected, Connecting)
                | (Connecting, Connected)
                | (Connecting, Disconnected)
                | (Connected, Disconnecting)
                | (Disconnecting, Disconnected)
        )
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Atomic holder for [`ConnectionState`] with compare-and-swap transitions.
#[derive(Debug)]
pub struct StateCell(AtomicU8);

impl Default for StateCell {
    fn default() -> Self {
        Self::new(ConnectionState::Disconnected)
    }
}

impl StateCell {
    pub fn new(initial: ConnectionState) -> Self {
        Self(AtomicU8::new(initial as u8))
    }

    pub fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::SeqCst))
    }

    /// Attempts `from -> to`. Returns `false` without mutating if either the
    /// current state isn't `from` or the transition is not in the legal set.
    pub fn try_transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        if !ConnectionState::is_legal_transition(from, to) {
            return false;
        }
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Unconditionally moves to `to`, returning the prior state. Only used
    /// for terminal cleanup paths (e.g. dtor-equivalent shutdown) where the
    /// prior state is already known to make the transition legal or where
    /// the transition is force-applied regardless (mirrors the original's
    /// destructor force-set to `disconnected`).
    pub fn force(&self, to: ConnectionState) -> ConnectionState {
        ConnectionState::from_u8(self.0.swap(to as u8, Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConnectionState::*;

    #[test]
    fn legal_transitions_succeed() {
        let cell = StateCell::new(Disconnected);
        assert!(cell.try_transition(Disconnected, Connecting));
        assert!(cell.try_transition(Connecting, Connected));
        assert!(cell.try_transition(Connected, Disconnecting));
        assert!(cell.try_transition(Disconnecting, Disconnected));
    }

    #[test]
    fn illegal_transition_rejected() {
        let cell = StateCell::new(Disconnected);
        assert!(!cell.try_transition(Disconnected, Connected));
        assert_eq!(cell.get(), Disconnected);
    }

    #[test]
    fn cas_fails_if_current_state_does_not_match_expected() {
        let cell = StateCell::new(Connected);
        assert!(!cell.try_transition(Disconnected, Connecting));
        assert_eq!(cell.get(), Connected);
    }
}
