//! Round-trip-time estimation and retransmission timeout.
//!
//! Jacobson/Karels estimator (RFC 6298 §2) with the classic gains
//! α = 1/8 and β = 1/4:
//!
//! ```text
//!  first sample R:   SRTT = R            RTTVAR = R / 2
//!  later samples:    RTTVAR = 3/4·RTTVAR + 1/4·|SRTT − R|
//!                    SRTT   = 7/8·SRTT   + 1/8·R
//!  RTO = clamp(SRTT + 4·RTTVAR, rto_min, rto_max)
//! ```
//!
//! Callers apply Karn's rule: only segments that were never retransmitted
//! may feed [`RttEstimator::record_sample`].

use std::time::Duration;

/// Samples are floored to this so the estimate stays positive even when the
/// clock does not advance between send and ACK.
const MIN_SAMPLE: Duration = Duration::from_micros(1);

/// Smoothed RTT state plus the RTO clamp.
#[derive(Debug, Clone)]
pub struct RttEstimator {
    /// Smoothed RTT (SRTT).  Holds the configured initial estimate until the
    /// first sample arrives.
    estimated: Duration,
    /// RTT variation (RTTVAR).
    deviation: Duration,
    sampled: bool,
    rto_min: Duration,
    rto_max: Duration,
}

impl RttEstimator {
    pub fn new(initial_rtt: Duration, rto_min: Duration, rto_max: Duration) -> Self {
        Self {
            estimated: initial_rtt,
            deviation: Duration::ZERO,
            sampled: false,
            rto_min,
            rto_max,
        }
    }

    /// Fold one RTT measurement into the estimate.
    pub fn record_sample(&mut self, sample: Duration) {
        let sample = sample.max(MIN_SAMPLE);
        if self.sampled {
            let diff = sample.abs_diff(self.estimated);
            self.deviation = self.deviation * 3 / 4 + diff / 4;
            self.estimated = self.estimated * 7 / 8 + sample / 8;
        } else {
            self.estimated = sample;
            self.deviation = sample / 2;
            self.sampled = true;
        }
        log::trace!(
            "[rtt] sample={:?} srtt={:?} rttvar={:?} rto={:?}",
            sample,
            self.estimated,
            self.deviation,
            self.rto()
        );
    }

    /// Current retransmission timeout.
    pub fn rto(&self) -> Duration {
        (self.estimated + self.deviation * 4).clamp(self.rto_min, self.rto_max)
    }

    pub fn estimated(&self) -> Duration {
        self.estimated
    }

    pub fn deviation(&self) -> Duration {
        self.deviation
    }

    /// `true` once at least one sample has been recorded.
    pub fn has_sample(&self) -> bool {
        self.sampled
    }
}
