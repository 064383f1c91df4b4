//! Unacknowledged-segment bookkeeping and timer-expiry decisions.
//!
//! Every transmitted data segment is registered here together with the time
//! it was sent.  The connection arms one timer per registration; when that
//! timer fires it asks [`RetransmissionQueue::on_expiry`] what to do.
//!
//! There is no cancel operation.  Acknowledging a segment removes it from the
//! queue, and a timer that fires for a sequence number that is no longer
//! present resolves to [`Expiry::Gone`] and does nothing.
//!
//! This module only manages state; all socket I/O and timer spawning are the
//! caller's responsibility.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::packet::Packet;

/// One in-flight data segment.
#[derive(Debug, Clone)]
pub struct UnackedSegment {
    /// Exact bytes to put back on the wire when retransmitting.
    pub packet: Packet,
    /// Time of the most recent transmission attempt.
    pub sent_at: Instant,
    /// Retransmissions performed so far; `0` means the original send.
    pub retry_count: u32,
    /// Set once this segment has triggered the timeout congestion response.
    pub timeout_processed: bool,
}

impl UnackedSegment {
    pub fn new(packet: Packet, sent_at: Instant) -> Self {
        Self {
            packet,
            sent_at,
            retry_count: 0,
            timeout_processed: false,
        }
    }

    pub fn seq(&self) -> u32 {
        self.packet.header.seq
    }

    pub fn len(&self) -> u32 {
        self.packet.payload.len() as u32
    }

    pub fn end_seq(&self) -> u32 {
        self.packet.end_seq()
    }

    /// Karn's rule: only never-retransmitted segments yield RTT samples.
    pub fn rtt_sample(&self, now: Instant) -> Option<Duration> {
        (self.retry_count == 0).then(|| now.saturating_duration_since(self.sent_at))
    }
}

/// Ask the connection to arm one retransmission timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerRequest {
    pub seq: u32,
    pub rto: Duration,
}

/// What a fired timer should do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expiry {
    /// Segment already acknowledged (or abandoned); nothing to do.
    Gone,
    /// Retry ceiling reached: the segment was removed and its bytes are lost.
    Abandoned { seq: u32, len: u32, retries: u32 },
    /// Retransmit `packet` unchanged and re-arm.  `penalize` is `true` the
    /// first time this segment times out and the congestion controller must
    /// react.
    Retry {
        packet: Packet,
        attempt: u32,
        penalize: bool,
    },
}

/// Unacknowledged segments keyed by starting sequence number.
#[derive(Debug)]
pub struct RetransmissionQueue {
    segments: HashMap<u32, UnackedSegment>,
    max_retries: u32,
}

impl RetransmissionQueue {
    pub fn new(max_retries: u32) -> Self {
        Self {
            segments: HashMap::new(),
            max_retries,
        }
    }

    /// Track a freshly transmitted segment.
    pub fn register(&mut self, packet: Packet, now: Instant) {
        let seq = packet.header.seq;
        self.segments.insert(seq, UnackedSegment::new(packet, now));
    }

    pub fn contains(&self, seq: u32) -> bool {
        self.segments.contains_key(&seq)
    }

    pub fn get(&self, seq: u32) -> Option<&UnackedSegment> {
        self.segments.get(&seq)
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Payload bytes still awaiting acknowledgement.
    ///
    /// Abandoned segments no longer count, so a permanently lost range does
    /// not pin the window shut.
    pub fn bytes_in_flight(&self) -> u32 {
        self.segments.values().map(UnackedSegment::len).sum()
    }

    /// Remove every segment whose end is covered by cumulative ACK `ack`.
    pub fn remove_acked(&mut self, ack: u32, base: u32) -> Vec<UnackedSegment> {
        // Offsets from the left window edge keep the comparison wrap-safe.
        let limit = ack.wrapping_sub(base);
        let covered: Vec<u32> = self
            .segments
            .values()
            .filter(|s| s.end_seq().wrapping_sub(base) <= limit)
            .map(UnackedSegment::seq)
            .collect();
        covered
            .into_iter()
            .filter_map(|seq| self.segments.remove(&seq))
            .collect()
    }

    /// Decide what the timer for `seq` does, updating retry bookkeeping.
    pub fn on_expiry(&mut self, seq: u32, now: Instant) -> Expiry {
        let Some(segment) = self.segments.get_mut(&seq) else {
            return Expiry::Gone;
        };
        if segment.retry_count >= self.max_retries {
            let retries = segment.retry_count;
            let len = segment.len();
            self.segments.remove(&seq);
            return Expiry::Abandoned { seq, len, retries };
        }
        segment.retry_count += 1;
        segment.sent_at = now;
        let penalize = !segment.timeout_processed;
        segment.timeout_processed = true;
        Expiry::Retry {
            packet: segment.packet.clone(),
            attempt: segment.retry_count,
            penalize,
        }
    }

    /// Lowest-sequence segment at or after `from`, marked as retransmitted.
    ///
    /// Used by fast retransmit; the segment's running timer is left alone.
    pub fn take_earliest_for_retransmit(&mut self, from: u32, now: Instant) -> Option<Packet> {
        let seq = self
            .segments
            .keys()
            .copied()
            .min_by_key(|seq| seq.wrapping_sub(from))?;
        let segment = self.segments.get_mut(&seq)?;
        segment.retry_count += 1;
        segment.sent_at = now;
        Some(segment.packet.clone())
    }

    /// Sequence numbers currently tracked, in ascending order from `base`.
    pub fn sequence_numbers(&self, base: u32) -> Vec<u32> {
        let mut seqs: Vec<u32> = self.segments.keys().copied().collect();
        seqs.sort_by_key(|seq| seq.wrapping_sub(base));
        seqs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{flags, Header};

    fn segment(seq: u32, len: usize) -> Packet {
        Packet {
            header: Header {
                seq,
                flags: flags::ACK | flags::PSH,
                window: 4096,
                ..Header::default()
            },
            payload: vec![seq as u8; len],
        }
    }

    fn queue_with(seqs: &[(u32, usize)], max_retries: u32) -> RetransmissionQueue {
        let mut q = RetransmissionQueue::new(max_retries);
        let now = Instant::now();
        for &(seq, len) in seqs {
            q.register(segment(seq, len), now);
        }
        q
    }

    #[test]
    fn cumulative_ack_removes_covered_segments_only() {
        let mut q = queue_with(&[(0, 730), (730, 730), (1460, 540)], 15);
        let removed = q.remove_acked(1460, 0);
        let mut seqs: Vec<u32> = removed.iter().map(UnackedSegment::seq).collect();
        seqs.sort_unstable();
        assert_eq!(seqs, vec![0, 730]);
        assert_eq!(q.len(), 1);
        assert_eq!(q.bytes_in_flight(), 540);
    }

    #[test]
    fn removal_works_across_sequence_wrap() {
        let base = u32::MAX - 100;
        let mut q = queue_with(&[(base, 200), (base.wrapping_add(200), 200)], 15);
        let removed = q.remove_acked(base.wrapping_add(200), base);
        assert_eq!(removed.len(), 1);
        assert!(q.contains(base.wrapping_add(200)));
    }

    #[test]
    fn expiry_of_acknowledged_segment_is_a_no_op() {
        let mut q = queue_with(&[(0, 730)], 15);
        q.remove_acked(730, 0);
        assert_eq!(q.on_expiry(0, Instant::now()), Expiry::Gone);
        assert_eq!(q.on_expiry(0, Instant::now()), Expiry::Gone);
    }

    #[test]
    fn retry_resends_identical_bytes_and_penalizes_once() {
        let mut q = queue_with(&[(730, 100)], 15);
        let original = q.get(730).map(|s| s.packet.clone());

        let (packet, attempt, penalize) = match q.on_expiry(730, Instant::now()) {
            Expiry::Retry {
                packet,
                attempt,
                penalize,
            } => (packet, attempt, penalize),
            other => panic!("expected retry, got {other:?}"),
        };
        assert_eq!(Some(packet), original);
        assert_eq!(attempt, 1);
        assert!(penalize);

        let second = q.on_expiry(730, Instant::now());
        assert!(matches!(
            second,
            Expiry::Retry {
                attempt: 2,
                penalize: false,
                ..
            }
        ));
    }

    #[test]
    fn retry_ceiling_abandons_segment() {
        let mut q = queue_with(&[(0, 50)], 2);
        let now = Instant::now();
        assert!(matches!(q.on_expiry(0, now), Expiry::Retry { .. }));
        assert!(matches!(q.on_expiry(0, now), Expiry::Retry { .. }));
        assert_eq!(
            q.on_expiry(0, now),
            Expiry::Abandoned {
                seq: 0,
                len: 50,
                retries: 2
            }
        );
        assert!(q.is_empty());
        assert_eq!(q.bytes_in_flight(), 0);
        assert_eq!(q.on_expiry(0, now), Expiry::Gone);
    }

    #[test]
    fn karn_rule_excludes_retransmitted_segments() {
        let t0 = Instant::now();
        let mut fresh = UnackedSegment::new(segment(0, 10), t0);
        let later = t0 + Duration::from_millis(40);
        assert_eq!(fresh.rtt_sample(later), Some(Duration::from_millis(40)));
        fresh.retry_count = 1;
        assert_eq!(fresh.rtt_sample(later), None);
    }

    #[test]
    fn fast_retransmit_picks_lowest_sequence() {
        let mut q = queue_with(&[(1460, 730), (730, 730), (2190, 730)], 15);
        let packet = q.take_earliest_for_retransmit(730, Instant::now());
        assert_eq!(packet.map(|p| p.header.seq), Some(730));
        assert_eq!(q.get(730).map(|s| s.retry_count), Some(1));
        assert_eq!(q.sequence_numbers(730), vec![730, 1460, 2190]);
    }
}
