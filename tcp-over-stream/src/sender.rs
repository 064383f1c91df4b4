//! Sliding-window send side.
//!
//! [`SenderEngine`] owns everything the sending direction of a connection
//! needs: the unacked-segment queue, the ACK processor, the RTT estimator,
//! the congestion controller and the loss simulator.  Each entry point takes
//! the shared [`ConnectionVars`] and returns an [`Outbound`] describing the
//! segments to write and the timers to arm.
//!
//! # Window
//!
//! ```text
//!  effective = min(peer window, max window, cwnd)
//!  may send  ⇔  in_flight + MSS ≤ effective   (or nothing is in flight)
//! ```
//!
//! The "nothing in flight" escape keeps a peer that advertises less than one
//! MSS from stalling the sender forever.
//!
//! This module only manages state; all socket I/O is the caller's
//! responsibility.

use tokio::time::Instant;

use crate::ack::{AckOutcome, AckProcessor};
use crate::config::Config;
use crate::congestion::CongestionController;
use crate::packet::{flags, Header, Packet};
use crate::retransmit::{Expiry, RetransmissionQueue, TimerRequest};
use crate::rtt::RttEstimator;
use crate::simulator::{LossSimulator, Verdict};
use crate::state::ConnectionVars;
use crate::trace::{CwndTrace, TraceEvent, TransferStats};

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// Side effects requested by the engine.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Outbound {
    /// Segments to put on the wire, in order.
    pub packets: Vec<Packet>,
    /// Retransmission timers to arm.
    pub timers: Vec<TimerRequest>,
}

impl Outbound {
    pub fn is_empty(&self) -> bool {
        self.packets.is_empty() && self.timers.is_empty()
    }

    pub fn extend(&mut self, other: Outbound) {
        self.packets.extend(other.packets);
        self.timers.extend(other.timers);
    }
}

// ---------------------------------------------------------------------------
// SenderEngine
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct SenderEngine {
    mss: usize,
    max_window: u32,
    /// Receive window we advertise on outgoing data segments.
    advertised_window: u16,
    queue: RetransmissionQueue,
    acks: AckProcessor,
    rtt: RttEstimator,
    cc: CongestionController,
    loss: LossSimulator,
    stats: TransferStats,
    trace: CwndTrace,
}

impl SenderEngine {
    /// Build the send side of a connection that was just established.
    pub fn new(config: &Config, vars: &ConnectionVars, now: Instant) -> Self {
        Self {
            mss: config.mss,
            max_window: config.max_window,
            advertised_window: config.window_size,
            queue: RetransmissionQueue::new(config.max_retries),
            acks: AckProcessor::new(vars.base_sequence_number),
            rtt: RttEstimator::new(config.initial_rtt, config.rto_min, config.rto_max),
            cc: CongestionController::new(
                config.variant,
                config.mss_u32(),
                config.initial_ssthresh,
                config.timeout_burst,
            ),
            loss: LossSimulator::new(config.loss_probability, config.seed),
            stats: TransferStats::default(),
            trace: CwndTrace::new(config.mss_u32(), now),
        }
    }

    pub fn mss(&self) -> usize {
        self.mss
    }

    pub fn effective_window(&self, vars: &ConnectionVars) -> u32 {
        u32::from(vars.peer_window)
            .min(self.max_window)
            .min(self.cc.cwnd())
    }

    pub fn bytes_in_flight(&self) -> u32 {
        self.queue.bytes_in_flight()
    }

    /// `true` when one more full segment fits in the effective window.
    pub fn can_send(&self, vars: &ConnectionVars) -> bool {
        let in_flight = self.bytes_in_flight();
        in_flight == 0
            || in_flight.saturating_add(self.mss as u32) <= self.effective_window(vars)
    }

    pub fn has_unacked(&self) -> bool {
        !self.queue.is_empty()
    }

    pub fn unacked_segments(&self) -> usize {
        self.queue.len()
    }

    pub fn congestion(&self) -> &CongestionController {
        &self.cc
    }

    pub fn rtt(&self) -> &RttEstimator {
        &self.rtt
    }

    pub fn stats(&self) -> TransferStats {
        self.stats
    }

    pub fn trace(&self) -> &CwndTrace {
        &self.trace
    }

    /// Cut one segment from `payload`, register it and pass it through the
    /// loss gate.
    ///
    /// The sequence number advances by the payload length whether or not the
    /// gate lets the segment through; a dropped segment is later resent at the
    /// same sequence number.
    pub fn transmit(&mut self, vars: &mut ConnectionVars, payload: &[u8], now: Instant) -> Outbound {
        debug_assert!(payload.len() <= self.mss, "segment larger than MSS");
        let packet = Packet {
            header: Header {
                src_port: vars.ports.local,
                dst_port: vars.ports.peer,
                seq: vars.sequence_number,
                ack: vars.ack_number,
                flags: flags::ACK | flags::PSH,
                window: self.advertised_window,
                ..Header::default()
            },
            payload: payload.to_vec(),
        };
        let seq = packet.header.seq;
        vars.advance_sequence(payload.len() as u32);
        self.queue.register(packet.clone(), now);
        self.stats.segments_sent += 1;
        self.trace.record(now, TraceEvent::Send, self.cc.state());

        let mut out = Outbound {
            timers: vec![TimerRequest {
                seq,
                rto: self.rtt.rto(),
            }],
            ..Outbound::default()
        };
        if self.gate(seq, "send") {
            log::debug!(
                "[send] seq={seq} len={} cwnd={} in_flight={}",
                payload.len(),
                self.cc.cwnd(),
                self.bytes_in_flight()
            );
            out.packets.push(packet);
        }
        out
    }

    /// Handle the acknowledgement fields of an inbound segment.
    pub fn on_ack(
        &mut self,
        vars: &mut ConnectionVars,
        header: &Header,
        pure: bool,
        now: Instant,
    ) -> Outbound {
        vars.peer_window = header.window;
        let outcome = self.acks.process(
            header.ack,
            pure,
            now,
            vars,
            &mut self.queue,
            &mut self.rtt,
            &mut self.cc,
        );
        match outcome {
            AckOutcome::NewData {
                acked_bytes,
                rtt_samples,
                ..
            } => {
                self.stats.bytes_acked += u64::from(acked_bytes);
                self.stats.rtt_samples += rtt_samples as u64;
                Outbound::default()
            }
            AckOutcome::FastRetransmit { ack } => self.fast_retransmit(vars, ack, now),
            AckOutcome::Duplicate { .. } | AckOutcome::Ignored => Outbound::default(),
        }
    }

    /// Retransmission timer for `seq` fired.
    pub fn on_timer(&mut self, seq: u32, now: Instant) -> Outbound {
        match self.queue.on_expiry(seq, now) {
            Expiry::Gone => Outbound::default(),
            Expiry::Abandoned { seq, len, retries } => {
                self.stats.abandoned += 1;
                log::warn!(
                    "[rtx] giving up on seq={seq} ({len} bytes) after {retries} retransmissions; \
                     the range is lost"
                );
                Outbound::default()
            }
            Expiry::Retry {
                packet,
                attempt,
                penalize,
            } => {
                self.stats.retransmissions += 1;
                if penalize {
                    self.stats.timeouts += 1;
                    self.cc.on_timeout(now);
                    self.trace.record(now, TraceEvent::Timeout, self.cc.state());
                }
                log::debug!(
                    "[rtx] timeout seq={seq} attempt={attempt} cwnd={} ssthresh={}",
                    self.cc.cwnd(),
                    self.cc.ssthresh()
                );
                let mut out = Outbound {
                    timers: vec![TimerRequest {
                        seq,
                        rto: self.rtt.rto(),
                    }],
                    ..Outbound::default()
                };
                if self.gate(seq, "retransmit") {
                    out.packets.push(packet);
                }
                out
            }
        }
    }

    fn fast_retransmit(&mut self, vars: &ConnectionVars, ack: u32, now: Instant) -> Outbound {
        self.trace
            .record(now, TraceEvent::FastRetransmit, self.cc.state());
        let Some(packet) = self
            .queue
            .take_earliest_for_retransmit(vars.base_sequence_number, now)
        else {
            return Outbound::default();
        };
        self.stats.fast_retransmits += 1;
        log::debug!(
            "[rtx] fast retransmit seq={} on triple duplicate ack={ack}; cwnd={} mode={}",
            packet.header.seq,
            self.cc.cwnd(),
            self.cc.mode()
        );
        let mut out = Outbound::default();
        if self.gate(packet.header.seq, "fast retransmit") {
            out.packets.push(packet);
        }
        out
    }

    /// Run the loss gate; `true` means the segment goes on the wire.
    fn gate(&mut self, seq: u32, what: &str) -> bool {
        match self.loss.decide() {
            Verdict::Send => true,
            Verdict::Drop => {
                self.stats.segments_dropped += 1;
                log::debug!(
                    "[send] simulated loss (p={}): {what} seq={seq} dropped",
                    self.loss.probability()
                );
                false
            }
        }
    }
}
