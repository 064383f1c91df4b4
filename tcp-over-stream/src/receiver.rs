//! Receive side: in-order delivery and bounded reassembly.
//!
//! ```text
//!        expected
//!           │
//!  ─────────┼──────┬──────┬──────┬──────────▶ seq space
//!  delivered│ gap  │ held │ gap  │ held
//! ```
//!
//! A segment starting at `expected` is delivered at once, after which the
//! reorder buffer is drained for as long as the next expected offset is held.
//! Segments from the future are held while there is room; older segments are
//! discarded.  Every data segment is answered with one cumulative ACK.

use std::collections::BTreeMap;

use crate::packet::{flags, seq_lt, Header, Packet};
use crate::state::ConnectionVars;

/// How one inbound data segment was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrival {
    /// Delivered, together with `drained` buffered successors.
    InOrder { drained: usize },
    /// Held in the reorder buffer.
    Buffered,
    /// Already delivered or already held.
    Duplicate,
    /// Reorder buffer full; dropped without acknowledgement of its bytes.
    Overflow,
}

#[derive(Debug)]
pub struct ReceiverEngine {
    expected: u32,
    out_of_order: BTreeMap<u32, Vec<u8>>,
    capacity: usize,
    advertised_window: u16,
    /// Everything delivered so far, kept for the persistence hook.
    stream: Vec<u8>,
}

impl ReceiverEngine {
    pub fn new(expected: u32, capacity: usize, advertised_window: u16) -> Self {
        Self {
            expected,
            out_of_order: BTreeMap::new(),
            capacity: capacity.max(1),
            advertised_window,
            stream: Vec::new(),
        }
    }

    /// Next sequence number expected from the peer.
    pub fn expected(&self) -> u32 {
        self.expected
    }

    pub fn buffered(&self) -> usize {
        self.out_of_order.len()
    }

    /// The reassembled inbound stream.
    pub fn stream(&self) -> &[u8] {
        &self.stream
    }

    /// Accept one data segment.  Newly deliverable bytes are appended to
    /// `delivered` in stream order.
    pub fn on_segment(&mut self, seq: u32, payload: &[u8], delivered: &mut Vec<u8>) -> Arrival {
        if payload.is_empty() {
            return Arrival::Duplicate;
        }

        if seq == self.expected {
            self.deliver(payload, delivered);
            let mut drained = 0;
            while let Some(next) = self.out_of_order.remove(&self.expected) {
                self.deliver(&next, delivered);
                drained += 1;
            }
            let expected = self.expected;
            self.out_of_order.retain(|&k, _| seq_lt(expected, k));
            log::trace!("[recv] in order seq={seq}; drained {drained}; expected={expected}");
            return Arrival::InOrder { drained };
        }

        if seq_lt(seq, self.expected) {
            log::trace!("[recv] old segment seq={seq} < expected={}", self.expected);
            return Arrival::Duplicate;
        }

        if self.out_of_order.contains_key(&seq) {
            return Arrival::Duplicate;
        }
        if self.out_of_order.len() >= self.capacity {
            log::debug!(
                "[recv] reorder buffer full ({} segments); dropping seq={seq}",
                self.capacity
            );
            return Arrival::Overflow;
        }
        self.out_of_order.insert(seq, payload.to_vec());
        log::trace!("[recv] buffered seq={seq}; expected={}", self.expected);
        Arrival::Buffered
    }

    /// Cumulative ACK for the current receive state.
    pub fn ack_segment(&self, vars: &ConnectionVars) -> Packet {
        Packet::control(Header {
            src_port: vars.ports.local,
            dst_port: vars.ports.peer,
            seq: vars.sequence_number,
            ack: self.expected,
            flags: flags::ACK,
            window: self.advertised_window,
            ..Header::default()
        })
    }

    fn deliver(&mut self, payload: &[u8], delivered: &mut Vec<u8>) {
        self.expected = self.expected.wrapping_add(payload.len() as u32);
        self.stream.extend_from_slice(payload);
        delivered.extend_from_slice(payload);
    }
}
