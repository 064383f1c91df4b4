//! Connection finite-state machine (FSM) types and per-connection variables.
//!
//! Transitions are driven by [`crate::handshake`] (open) and
//! [`crate::connection`] (data transfer and close):
//!
//! ```text
//!  initiator:  CLOSED ──SYN──▶ SYN_SENT ──SYN+ACK──▶ ESTABLISHED
//!  responder:  LISTEN ──SYN──▶ SYN_RECEIVED ──ACK──▶ ESTABLISHED
//!
//!  closing side:   ESTABLISHED ──FIN──▶ FIN_WAIT ──FIN+ACK / ACK──▶ CLOSED
//!  other side:     ESTABLISHED ──FIN / FIN+ACK──▶ LAST_ACK ──ACK──▶ CLOSED
//! ```
//!
//! The close path is a single FIN / FIN-ACK / ACK exchange rather than the
//! full four-way teardown.

use std::fmt;

use crate::packet::seq_le;

/// All possible states of the connection FSM.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection exists; initial state of an initiator.
    #[default]
    Closed,
    /// Responder waiting for a SYN.
    Listen,
    /// SYN has been sent; waiting for SYN-ACK.
    SynSent,
    /// SYN received; SYN-ACK sent; waiting for ACK.
    SynReceived,
    /// Three-way handshake complete; data transfer in progress.
    Established,
    /// Local side sent FIN; waiting for the peer's FIN-ACK.
    FinWait,
    /// Peer's FIN answered with FIN-ACK; waiting for the final ACK.
    LastAck,
}

impl ConnectionState {
    /// `true` while application data may still flow.
    pub fn is_open(self) -> bool {
        self == Self::Established
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Closed => "CLOSED",
            Self::Listen => "LISTEN",
            Self::SynSent => "SYN_SENT",
            Self::SynReceived => "SYN_RECEIVED",
            Self::Established => "ESTABLISHED",
            Self::FinWait => "FIN_WAIT",
            Self::LastAck => "LAST_ACK",
        };
        f.write_str(name)
    }
}

/// Which side of the handshake this endpoint played.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Responder,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Role::Initiator => "initiator",
            Role::Responder => "responder",
        })
    }
}

/// Port identifiers stamped into every outbound header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Ports {
    pub local: u16,
    pub peer: u16,
}

impl Ports {
    pub fn new(local: u16, peer: u16) -> Self {
        Self { local, peer }
    }
}

/// Sequence-space variables of one logical connection.
///
/// # Sequence-number layout
///
/// ```text
///  base_sequence_number     sequence_number
///      │                          │
///  ────┼──────────────────────────┼──────────────▶ seq space
///      │ <──── in flight ────────▶│ <── unsent ──▶
/// ```
///
/// Invariant: `base_sequence_number ≤ sequence_number`, and
/// `sequence_number` never moves backwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionVars {
    pub role: Role,
    pub ports: Ports,
    /// Next byte to send.
    pub sequence_number: u32,
    /// Next byte expected from the peer.
    pub ack_number: u32,
    /// Lowest unacknowledged byte.
    pub base_sequence_number: u32,
    /// Receive window most recently advertised by the peer.
    pub peer_window: u16,
}

impl ConnectionVars {
    /// Variables of a freshly established connection: nothing in flight.
    pub fn established(
        role: Role,
        ports: Ports,
        sequence_number: u32,
        ack_number: u32,
        peer_window: u16,
    ) -> Self {
        Self {
            role,
            ports,
            sequence_number,
            ack_number,
            base_sequence_number: sequence_number,
            peer_window,
        }
    }

    /// Advance `sequence_number` past `len` freshly transmitted bytes.
    pub fn advance_sequence(&mut self, len: u32) {
        self.sequence_number = self.sequence_number.wrapping_add(len);
    }

    /// Slide the left window edge forward to `end`.
    ///
    /// Ignored unless `base_sequence_number < end ≤ sequence_number`, which
    /// keeps the base monotonic and bounded by the send edge.
    pub fn advance_base(&mut self, end: u32) {
        if seq_le(self.base_sequence_number, end) && seq_le(end, self.sequence_number) {
            self.base_sequence_number = end;
        }
    }

    /// Bytes between the left window edge and the next byte to send.
    pub fn outstanding(&self) -> u32 {
        self.sequence_number.wrapping_sub(self.base_sequence_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars() -> ConnectionVars {
        ConnectionVars::established(Role::Initiator, Ports::new(12345, 8080), 1000, 50, 4096)
    }

    #[test]
    fn established_starts_with_nothing_in_flight() {
        let v = vars();
        assert_eq!(v.base_sequence_number, v.sequence_number);
        assert_eq!(v.outstanding(), 0);
    }

    #[test]
    fn base_never_passes_sequence_number() {
        let mut v = vars();
        v.advance_sequence(730);
        v.advance_base(5000);
        assert_eq!(v.base_sequence_number, 1000);
        v.advance_base(1730);
        assert_eq!(v.base_sequence_number, 1730);
    }

    #[test]
    fn base_never_moves_backwards() {
        let mut v = vars();
        v.advance_sequence(1460);
        v.advance_base(2460);
        v.advance_base(1730);
        assert_eq!(v.base_sequence_number, 2460);
    }

    #[test]
    fn display_uses_protocol_names() {
        assert_eq!(ConnectionState::FinWait.to_string(), "FIN_WAIT");
        assert_eq!(ConnectionState::default(), ConnectionState::Closed);
        assert!(ConnectionState::Established.is_open());
        assert!(!ConnectionState::LastAck.is_open());
    }
}
