//! Byte-counted TCP congestion control with Tahoe and Reno variants.
//!
//! ```text
//!              cwnd ≥ ssthresh
//!  SLOW_START ─────────────────▶ CONGESTION_AVOIDANCE
//!      ▲  ▲                          │          ▲
//!      │  └──── timeout ─────────────┤          │ new ACK past marker
//!      │                   3 dup ACKs│ (Reno)   │
//!      │                             ▼          │
//!      └──────── timeout ───── FAST_RECOVERY ───┘
//! ```
//!
//! Tahoe has no fast recovery: a triple duplicate ACK is handled exactly
//! like a timeout.  Every transition leaves `cwnd ≥ MSS`.
//!
//! The controller only decides window sizes; the caller performs the
//! retransmissions it asks for.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use tokio::time::Instant;

use crate::packet::seq_lt;

/// Loss-response policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Variant {
    Tahoe,
    #[default]
    Reno,
}

impl FromStr for Variant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tahoe" => Ok(Self::Tahoe),
            "reno" => Ok(Self::Reno),
            _ => Err(format!("unknown congestion-control variant: {s}")),
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Tahoe => "tahoe",
            Self::Reno => "reno",
        })
    }
}

/// Congestion-control phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    SlowStart,
    CongestionAvoidance,
    FastRecovery,
}

impl Mode {
    /// Upper-snake name used in logs and the cwnd trace.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SlowStart => "SLOW_START",
            Self::CongestionAvoidance => "CONGESTION_AVOIDANCE",
            Self::FastRecovery => "FAST_RECOVERY",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of the congestion variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CongestionState {
    /// Congestion window in bytes.
    pub cwnd: u32,
    /// Slow-start threshold in bytes.
    pub ssthresh: u32,
    pub mode: Mode,
    /// Congestion-avoidance accumulator.
    pub bytes_acked_since_increase: u32,
    /// ACK number that must be exceeded to leave fast recovery.
    pub recovery_marker: Option<u32>,
    pub variant: Variant,
}

/// What a triple duplicate ACK asks the caller to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DupAckResponse {
    /// Retransmit the earliest unacknowledged segment now.
    FastRetransmit,
    /// Already recovering; nothing to resend.
    Ignore,
}

/// Single-writer owner of [`CongestionState`].
#[derive(Debug, Clone)]
pub struct CongestionController {
    state: CongestionState,
    mss: u32,
    /// Window recorded at the first timeout of the current burst.
    window_before_loss: u32,
    last_timeout: Option<Instant>,
    burst_window: Duration,
}

impl CongestionController {
    /// Start in slow start with a one-segment window.
    pub fn new(variant: Variant, mss: u32, initial_ssthresh: u32, burst_window: Duration) -> Self {
        let mss = mss.max(1);
        Self {
            state: CongestionState {
                cwnd: mss,
                ssthresh: initial_ssthresh.max(mss),
                mode: Mode::SlowStart,
                bytes_acked_since_increase: 0,
                recovery_marker: None,
                variant,
            },
            mss,
            window_before_loss: mss,
            last_timeout: None,
            burst_window,
        }
    }

    pub fn state(&self) -> &CongestionState {
        &self.state
    }

    pub fn cwnd(&self) -> u32 {
        self.state.cwnd
    }

    pub fn ssthresh(&self) -> u32 {
        self.state.ssthresh
    }

    pub fn mode(&self) -> Mode {
        self.state.mode
    }

    /// Overwrite window and threshold, keeping the current mode.
    #[cfg(test)]
    pub(crate) fn set_window(&mut self, cwnd: u32, ssthresh: u32) {
        self.state.cwnd = cwnd;
        self.state.ssthresh = ssthresh;
        self.enforce_floor();
    }

    /// New cumulative progress: `acked` bytes were freshly acknowledged by
    /// acknowledgement number `ack`.
    pub fn on_new_ack(&mut self, acked: u32, ack: u32) {
        if acked == 0 {
            return;
        }
        let s = &mut self.state;
        match s.mode {
            Mode::FastRecovery => {
                let past_marker = s.recovery_marker.map_or(true, |m| seq_lt(m, ack));
                if past_marker {
                    s.cwnd = s.ssthresh;
                    s.mode = Mode::CongestionAvoidance;
                    s.bytes_acked_since_increase = 0;
                    s.recovery_marker = None;
                    log::debug!("[cc] leave fast recovery at ack={ack}: cwnd={}", s.cwnd);
                }
            }
            Mode::SlowStart => {
                s.cwnd = s.cwnd.saturating_add(acked);
                if s.cwnd >= s.ssthresh {
                    s.mode = Mode::CongestionAvoidance;
                    s.bytes_acked_since_increase = 0;
                    log::debug!(
                        "[cc] slow start -> congestion avoidance: cwnd={} ssthresh={}",
                        s.cwnd,
                        s.ssthresh
                    );
                }
            }
            Mode::CongestionAvoidance => {
                s.bytes_acked_since_increase = s.bytes_acked_since_increase.saturating_add(acked);
                if s.bytes_acked_since_increase >= s.cwnd {
                    s.cwnd = s.cwnd.saturating_add(self.mss);
                    s.bytes_acked_since_increase = 0;
                }
            }
        }
        self.enforce_floor();
    }

    /// A duplicate ACK arrived.  Inflates the window while in fast recovery.
    pub fn on_duplicate_ack(&mut self) {
        if self.state.mode == Mode::FastRecovery {
            self.state.cwnd = self.state.cwnd.saturating_add(self.mss);
        }
    }

    /// The third duplicate of `ack` arrived.
    pub fn on_triple_duplicate(&mut self, ack: u32, now: Instant) -> DupAckResponse {
        match self.state.variant {
            Variant::Tahoe => {
                self.on_timeout(now);
                DupAckResponse::FastRetransmit
            }
            Variant::Reno if self.state.mode == Mode::FastRecovery => DupAckResponse::Ignore,
            Variant::Reno => {
                let s = &mut self.state;
                s.ssthresh = (s.cwnd / 2).max(self.mss);
                s.cwnd = s.ssthresh + 3 * self.mss;
                s.mode = Mode::FastRecovery;
                s.bytes_acked_since_increase = 0;
                s.recovery_marker = Some(ack);
                log::debug!(
                    "[cc] enter fast recovery at ack={ack}: cwnd={} ssthresh={}",
                    s.cwnd,
                    s.ssthresh
                );
                self.enforce_floor();
                DupAckResponse::FastRetransmit
            }
        }
    }

    /// Retransmission timeout.
    ///
    /// Timeouts within `burst_window` of the previous one reuse the window
    /// recorded at the first timeout of the burst, so a flight of expiring
    /// segments halves the threshold once rather than repeatedly.
    pub fn on_timeout(&mut self, now: Instant) {
        let in_burst = self
            .last_timeout
            .is_some_and(|prev| now.saturating_duration_since(prev) <= self.burst_window);
        if !in_burst {
            self.window_before_loss = self.state.cwnd;
        }
        self.last_timeout = Some(now);

        let s = &mut self.state;
        s.ssthresh = (self.window_before_loss / 2).max(self.mss);
        s.cwnd = self.mss;
        s.mode = Mode::SlowStart;
        s.bytes_acked_since_increase = 0;
        s.recovery_marker = None;
        log::debug!(
            "[cc] timeout{}: cwnd={} ssthresh={}",
            if in_burst { " (same burst)" } else { "" },
            s.cwnd,
            s.ssthresh
        );
        self.enforce_floor();
    }

    fn enforce_floor(&mut self) {
        if self.state.cwnd < self.mss {
            self.state.cwnd = self.mss;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    const MSS: u32 = 730;

    fn controller(variant: Variant) -> CongestionController {
        CongestionController::new(variant, MSS, 65_535, Duration::from_millis(500))
    }

    #[test]
    fn starts_in_slow_start_with_one_segment() {
        let cc = controller(Variant::Reno);
        assert_eq!(cc.cwnd(), MSS);
        assert_eq!(cc.mode(), Mode::SlowStart);
    }

    #[test]
    fn slow_start_adds_acked_bytes() {
        let mut cc = controller(Variant::Reno);
        cc.on_new_ack(730, 730);
        cc.on_new_ack(730, 1460);
        assert_eq!(cc.cwnd(), 3 * MSS);
        assert_eq!(cc.mode(), Mode::SlowStart);
    }

    #[test]
    fn slow_start_hands_over_at_threshold() {
        let mut cc = controller(Variant::Reno);
        cc.set_window(MSS, 1460);
        cc.on_new_ack(730, 730);
        assert_eq!(cc.cwnd(), 1460);
        assert_eq!(cc.mode(), Mode::CongestionAvoidance);
    }

    #[test]
    fn congestion_avoidance_adds_one_mss_per_window() {
        let mut cc = controller(Variant::Reno);
        cc.set_window(MSS, 1460);
        cc.on_new_ack(730, 730); // now CA with cwnd = 1460
        cc.on_new_ack(730, 1460);
        assert_eq!(cc.cwnd(), 1460, "accumulator below cwnd");
        cc.on_new_ack(730, 2190);
        assert_eq!(cc.cwnd(), 1460 + MSS);
        assert_eq!(cc.state().bytes_acked_since_increase, 0);
    }

    #[test]
    fn reno_triple_duplicate_enters_fast_recovery() {
        let mut cc = controller(Variant::Reno);
        cc.set_window(2920, 65_535);
        let response = cc.on_triple_duplicate(730, Instant::now());
        assert_eq!(response, DupAckResponse::FastRetransmit);
        assert_eq!(cc.ssthresh(), 1460);
        assert_eq!(cc.cwnd(), 3650);
        assert_eq!(cc.mode(), Mode::FastRecovery);
        assert_eq!(cc.state().recovery_marker, Some(730));
    }

    #[test]
    fn reno_fast_recovery_is_entered_once_per_episode() {
        let mut cc = controller(Variant::Reno);
        cc.set_window(2920, 65_535);
        cc.on_triple_duplicate(730, Instant::now());
        cc.on_duplicate_ack();
        assert_eq!(cc.cwnd(), 3650 + MSS, "window inflation");
        assert_eq!(
            cc.on_triple_duplicate(730, Instant::now()),
            DupAckResponse::Ignore
        );
        assert_eq!(cc.ssthresh(), 1460);
        assert_eq!(cc.cwnd(), 3650 + MSS);
    }

    #[test]
    fn reno_new_ack_past_marker_deflates() {
        let mut cc = controller(Variant::Reno);
        cc.set_window(2920, 65_535);
        cc.on_triple_duplicate(730, Instant::now());
        cc.on_new_ack(2190, 2920);
        assert_eq!(cc.cwnd(), 1460);
        assert_eq!(cc.mode(), Mode::CongestionAvoidance);
        assert_eq!(cc.state().recovery_marker, None);
    }

    #[test]
    fn duplicate_outside_recovery_does_not_inflate() {
        let mut cc = controller(Variant::Reno);
        cc.set_window(2920, 65_535);
        cc.on_duplicate_ack();
        assert_eq!(cc.cwnd(), 2920);
    }

    #[test]
    fn tahoe_triple_duplicate_behaves_like_timeout() {
        let mut cc = controller(Variant::Tahoe);
        cc.set_window(2920, 65_535);
        let response = cc.on_triple_duplicate(730, Instant::now());
        assert_eq!(response, DupAckResponse::FastRetransmit);
        assert_eq!(cc.ssthresh(), 1460);
        assert_eq!(cc.cwnd(), MSS);
        assert_eq!(cc.mode(), Mode::SlowStart);
    }

    #[test]
    fn timeout_collapses_window() {
        let mut cc = controller(Variant::Reno);
        cc.set_window(2920, 65_535);
        cc.on_timeout(Instant::now());
        assert_eq!(cc.ssthresh(), 1460);
        assert_eq!(cc.cwnd(), 730);
        assert_eq!(cc.mode(), Mode::SlowStart);
    }

    #[test]
    fn timeouts_in_one_burst_reuse_saved_window() {
        let mut cc = controller(Variant::Reno);
        cc.set_window(2920, 65_535);
        let t0 = Instant::now();
        cc.on_timeout(t0);
        cc.on_timeout(t0 + Duration::from_millis(100));
        cc.on_timeout(t0 + Duration::from_millis(200));
        assert_eq!(cc.ssthresh(), 1460, "burst must not halve again");
        assert_eq!(cc.cwnd(), MSS);
    }

    #[test]
    fn separate_bursts_halve_from_current_window() {
        let mut cc = controller(Variant::Reno);
        cc.set_window(2920, 65_535);
        let t0 = Instant::now();
        cc.on_timeout(t0);
        cc.on_timeout(t0 + Duration::from_secs(5));
        // Window was MSS when the second burst began.
        assert_eq!(cc.ssthresh(), MSS);
    }

    #[test]
    fn timeout_during_fast_recovery_returns_to_slow_start() {
        let mut cc = controller(Variant::Reno);
        cc.set_window(2920, 65_535);
        cc.on_triple_duplicate(730, Instant::now());
        cc.on_timeout(Instant::now());
        assert_eq!(cc.mode(), Mode::SlowStart);
        assert_eq!(cc.cwnd(), MSS);
        assert_eq!(cc.state().recovery_marker, None);
    }

    #[test]
    fn tahoe_never_enters_fast_recovery() {
        let mut cc = controller(Variant::Tahoe);
        let mut rng = StdRng::seed_from_u64(7);
        let t0 = Instant::now();
        for step in 0..2_000u64 {
            let now = t0 + Duration::from_millis(step * 37);
            match rng.random_range(0..4) {
                0 => cc.on_timeout(now),
                1 => {
                    cc.on_triple_duplicate(rng.random(), now);
                }
                2 => cc.on_duplicate_ack(),
                _ => cc.on_new_ack(rng.random_range(1..3000), rng.random()),
            }
            assert_ne!(cc.mode(), Mode::FastRecovery);
        }
    }

    #[test]
    fn window_never_drops_below_one_segment() {
        for variant in [Variant::Tahoe, Variant::Reno] {
            let mut cc = controller(variant);
            let mut rng = StdRng::seed_from_u64(42);
            let t0 = Instant::now();
            let mut ack = 0u32;
            for step in 0..5_000u64 {
                let now = t0 + Duration::from_millis(step * 13);
                match rng.random_range(0..5) {
                    0 => cc.on_timeout(now),
                    1 => {
                        cc.on_triple_duplicate(ack, now);
                    }
                    2 => cc.on_duplicate_ack(),
                    _ => {
                        let acked = rng.random_range(0..2 * MSS);
                        ack = ack.wrapping_add(acked);
                        cc.on_new_ack(acked, ack);
                    }
                }
                assert!(cc.cwnd() >= MSS, "{variant}: cwnd={} at step {step}", cc.cwnd());
            }
        }
    }

    #[test]
    fn variant_parses_case_insensitively() {
        assert_eq!("Tahoe".parse::<Variant>(), Ok(Variant::Tahoe));
        assert_eq!("RENO".parse::<Variant>(), Ok(Variant::Reno));
        assert!("cubic".parse::<Variant>().is_err());
    }
}
