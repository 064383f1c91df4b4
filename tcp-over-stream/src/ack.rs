//! Cumulative and duplicate acknowledgement processing.
//!
//! [`AckProcessor::process`] applies one inbound acknowledgement number to
//! the send-side state:
//!
//! 1. cumulative removal of every segment ending at or before the ACK,
//!    sliding the left window edge forward;
//! 2. RTT sampling from removed segments that were never retransmitted;
//! 3. classification as new progress, duplicate or stale, feeding the
//!    congestion controller accordingly.
//!
//! Only pure ACKs (no payload) can count as duplicates.  A data segment from
//! a peer that is sending in the other direction repeats its ACK number
//! without signalling loss.

use tokio::time::Instant;

use crate::congestion::{CongestionController, DupAckResponse};
use crate::packet::seq_lt;
use crate::retransmit::RetransmissionQueue;
use crate::rtt::RttEstimator;
use crate::state::ConnectionVars;

/// Consecutive duplicates that trigger fast retransmit.
pub const DUP_ACK_THRESHOLD: u32 = 3;

/// Result of processing one acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckOutcome {
    /// The ACK moved past the previous one.
    NewData {
        acked_bytes: u32,
        segments: usize,
        rtt_samples: usize,
    },
    /// Repeat of the last ACK with data still outstanding.
    Duplicate { count: u32 },
    /// Third duplicate: the caller must resend the earliest unacked segment.
    FastRetransmit { ack: u32 },
    /// Older than the last ACK, or a duplicate that cannot signal loss.
    Ignored,
}

/// Tracks the last acknowledgement seen and the duplicate counter.
#[derive(Debug, Clone)]
pub struct AckProcessor {
    last_ack: u32,
    dup_count: u32,
}

impl AckProcessor {
    /// Start with `initial_ack` (the first data sequence number) as the last
    /// acknowledgement seen.
    pub fn new(initial_ack: u32) -> Self {
        Self {
            last_ack: initial_ack,
            dup_count: 0,
        }
    }

    pub fn duplicate_count(&self) -> u32 {
        self.dup_count
    }

    /// Apply acknowledgement number `ack`.
    ///
    /// `pure` is `true` when the carrying segment had no payload.
    #[allow(clippy::too_many_arguments)]
    pub fn process(
        &mut self,
        ack: u32,
        pure: bool,
        now: Instant,
        vars: &mut ConnectionVars,
        queue: &mut RetransmissionQueue,
        rtt: &mut RttEstimator,
        cc: &mut CongestionController,
    ) -> AckOutcome {
        if seq_lt(self.last_ack, ack) {
            if !seq_lt(vars.sequence_number, ack) {
                return self.on_new_ack(ack, now, vars, queue, rtt, cc);
            }
            log::warn!(
                "[ack] ack={ack} acknowledges unsent data (seq={}); ignored",
                vars.sequence_number
            );
            return AckOutcome::Ignored;
        }

        if ack == self.last_ack && pure && !queue.is_empty() {
            self.dup_count += 1;
            cc.on_duplicate_ack();
            log::trace!("[ack] duplicate #{} for ack={ack}", self.dup_count);
            if self.dup_count >= DUP_ACK_THRESHOLD {
                self.dup_count = 0;
                return match cc.on_triple_duplicate(ack, now) {
                    DupAckResponse::FastRetransmit => AckOutcome::FastRetransmit { ack },
                    DupAckResponse::Ignore => AckOutcome::Duplicate {
                        count: DUP_ACK_THRESHOLD,
                    },
                };
            }
            return AckOutcome::Duplicate {
                count: self.dup_count,
            };
        }

        AckOutcome::Ignored
    }

    fn on_new_ack(
        &mut self,
        ack: u32,
        now: Instant,
        vars: &mut ConnectionVars,
        queue: &mut RetransmissionQueue,
        rtt: &mut RttEstimator,
        cc: &mut CongestionController,
    ) -> AckOutcome {
        let base = vars.base_sequence_number;
        let removed = queue.remove_acked(ack, base);

        let mut acked_bytes = 0u32;
        let mut rtt_samples = 0usize;
        let mut furthest = base;
        for segment in &removed {
            acked_bytes = acked_bytes.saturating_add(segment.len());
            if let Some(sample) = segment.rtt_sample(now) {
                rtt.record_sample(sample);
                rtt_samples += 1;
            }
            if seq_lt(furthest, segment.end_seq()) {
                furthest = segment.end_seq();
            }
        }
        vars.advance_base(furthest);

        self.last_ack = ack;
        self.dup_count = 0;
        cc.on_new_ack(acked_bytes, ack);

        log::trace!(
            "[ack] ack={ack} acked {} segment(s), {acked_bytes} bytes; base={}",
            removed.len(),
            vars.base_sequence_number
        );
        AckOutcome::NewData {
            acked_bytes,
            segments: removed.len(),
            rtt_samples,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::congestion::{Mode, Variant};
    use crate::packet::{flags, Header, Packet};
    use crate::state::{Ports, Role};

    const MSS: u32 = 730;

    struct Fixture {
        acks: AckProcessor,
        vars: ConnectionVars,
        queue: RetransmissionQueue,
        rtt: RttEstimator,
        cc: CongestionController,
    }

    impl Fixture {
        fn new(variant: Variant) -> Self {
            Self {
                acks: AckProcessor::new(0),
                vars: ConnectionVars::established(Role::Initiator, Ports::new(1, 2), 0, 0, 4096),
                queue: RetransmissionQueue::new(15),
                rtt: RttEstimator::new(
                    Duration::from_millis(1000),
                    Duration::from_millis(100),
                    Duration::from_millis(5000),
                ),
                cc: CongestionController::new(variant, MSS, 65_535, Duration::from_millis(500)),
            }
        }

        fn send(&mut self, len: usize, now: Instant) {
            let packet = Packet {
                header: Header {
                    seq: self.vars.sequence_number,
                    flags: flags::ACK | flags::PSH,
                    ..Header::default()
                },
                payload: vec![0; len],
            };
            self.vars.advance_sequence(len as u32);
            self.queue.register(packet, now);
        }

        fn ack(&mut self, ack: u32, now: Instant) -> AckOutcome {
            self.acks.process(
                ack,
                true,
                now,
                &mut self.vars,
                &mut self.queue,
                &mut self.rtt,
                &mut self.cc,
            )
        }
    }

    #[test]
    fn new_ack_advances_base_and_samples_rtt() {
        let mut f = Fixture::new(Variant::Reno);
        let t0 = Instant::now();
        f.send(730, t0);
        f.send(730, t0);
        let outcome = f.ack(730, t0 + Duration::from_millis(200));
        assert_eq!(
            outcome,
            AckOutcome::NewData {
                acked_bytes: 730,
                segments: 1,
                rtt_samples: 1
            }
        );
        assert_eq!(f.vars.base_sequence_number, 730);
        assert_eq!(f.rtt.estimated(), Duration::from_millis(200));
        assert_eq!(f.cc.cwnd(), 2 * MSS);
    }

    #[test]
    fn retransmitted_segment_gives_no_sample() {
        let mut f = Fixture::new(Variant::Reno);
        let t0 = Instant::now();
        f.send(730, t0);
        f.queue.on_expiry(0, t0 + Duration::from_secs(1));
        let outcome = f.ack(730, t0 + Duration::from_millis(1200));
        assert!(matches!(outcome, AckOutcome::NewData { rtt_samples: 0, .. }));
        assert!(!f.rtt.has_sample());
    }

    #[test]
    fn three_duplicates_trigger_fast_retransmit() {
        let mut f = Fixture::new(Variant::Reno);
        f.cc.set_window(2920, 65_535);
        let t0 = Instant::now();
        for _ in 0..4 {
            f.send(730, t0);
        }
        assert!(matches!(f.ack(730, t0), AckOutcome::NewData { .. }));
        f.cc.set_window(2920, 65_535);
        assert_eq!(f.ack(730, t0), AckOutcome::Duplicate { count: 1 });
        assert_eq!(f.ack(730, t0), AckOutcome::Duplicate { count: 2 });
        assert_eq!(f.ack(730, t0), AckOutcome::FastRetransmit { ack: 730 });
        assert_eq!(f.acks.duplicate_count(), 0);
        assert_eq!(f.cc.mode(), Mode::FastRecovery);
        assert_eq!(f.cc.cwnd(), 3650);
        assert_eq!(f.cc.ssthresh(), 1460);
    }

    #[test]
    fn duplicates_with_nothing_outstanding_are_ignored() {
        let mut f = Fixture::new(Variant::Reno);
        let t0 = Instant::now();
        f.send(730, t0);
        f.ack(730, t0);
        for _ in 0..5 {
            assert_eq!(f.ack(730, t0), AckOutcome::Ignored);
        }
    }

    #[test]
    fn data_bearing_repeat_is_not_a_duplicate() {
        let mut f = Fixture::new(Variant::Reno);
        let t0 = Instant::now();
        f.send(730, t0);
        f.send(730, t0);
        f.ack(730, t0);
        for _ in 0..3 {
            let outcome = f.acks.process(
                730, false, t0, &mut f.vars, &mut f.queue, &mut f.rtt, &mut f.cc,
            );
            assert_eq!(outcome, AckOutcome::Ignored);
        }
        assert_eq!(f.acks.duplicate_count(), 0);
    }

    #[test]
    fn stale_ack_changes_nothing() {
        let mut f = Fixture::new(Variant::Reno);
        let t0 = Instant::now();
        f.send(730, t0);
        f.send(730, t0);
        f.ack(1460, t0);
        let cwnd = f.cc.cwnd();
        assert_eq!(f.ack(730, t0), AckOutcome::Ignored);
        assert_eq!(f.vars.base_sequence_number, 1460);
        assert_eq!(f.cc.cwnd(), cwnd);
    }

    #[test]
    fn ack_beyond_send_edge_is_ignored() {
        let mut f = Fixture::new(Variant::Reno);
        let t0 = Instant::now();
        f.send(730, t0);
        assert_eq!(f.ack(5000, t0), AckOutcome::Ignored);
        assert_eq!(f.vars.base_sequence_number, 0);
        assert_eq!(f.queue.len(), 1);
    }

    #[test]
    fn new_ack_resets_duplicate_counter() {
        let mut f = Fixture::new(Variant::Tahoe);
        let t0 = Instant::now();
        for _ in 0..3 {
            f.send(730, t0);
        }
        f.ack(730, t0);
        f.ack(730, t0);
        f.ack(730, t0);
        assert_eq!(f.acks.duplicate_count(), 2);
        f.ack(1460, t0);
        assert_eq!(f.acks.duplicate_count(), 0);
    }
}
