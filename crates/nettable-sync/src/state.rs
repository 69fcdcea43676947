//! Connection lifecycle state machine.
//!
//! The transition rules live in a pure function so they can be tested
//! without any locking or threads; [`crate::connection::Connection`]
//! wraps them in a mutex and fires the notifier for emitted events.

/// Lifecycle state of one connection.
///
/// States advance `Created -> Init -> Handshake -> Active -> Dead`.
/// `Dead` is a one-way latch: once reached, no further transition is
/// accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Constructed, threads not started.
    Created,
    /// Threads starting, handshake not yet begun.
    Init,
    /// Handshake in progress.
    Handshake,
    /// Handshake complete, table traffic flowing.
    Active,
    /// Terminal. The connection never leaves this state.
    Dead,
}

/// One-shot notification emitted by a state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// First transition into [`ConnectionState::Active`].
    Connected,
    /// First transition into [`ConnectionState::Dead`].
    Disconnected,
}

/// Apply a requested transition to the current state.
///
/// Returns the resulting state and the at-most-one event the caller must
/// deliver to the notifier. Requests against a dead connection are
/// ignored and never re-emit events.
pub fn transition(
    current: ConnectionState,
    requested: ConnectionState,
) -> (ConnectionState, Option<ConnectionEvent>) {
    if current == ConnectionState::Dead {
        return (ConnectionState::Dead, None);
    }
    let event = if current != ConnectionState::Active && requested == ConnectionState::Active {
        Some(ConnectionEvent::Connected)
    } else if requested == ConnectionState::Dead {
        Some(ConnectionEvent::Disconnected)
    } else {
        None
    };
    (requested, event)
}
