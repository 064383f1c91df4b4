//! Tunable protocol parameters.
//!
//! One [`Config`] is handed to every connection; the CLI fills it from
//! command-line flags and the tests build it with struct-update syntax on
//! top of [`Config::default`].

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::congestion::Variant;
use crate::packet::HEADER_LEN;

/// Largest MSS whose segment still fits a `u16` length budget.
pub const MAX_MSS: usize = u16::MAX as usize - HEADER_LEN;

/// Protocol and simulation parameters for one connection.
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum segment size: largest payload carried by one segment.
    pub mss: usize,
    /// Receive window advertised to the peer.
    pub window_size: u16,
    /// Upper bound on the sender's own window regardless of cwnd.
    pub max_window: u32,
    /// Reorder-buffer budget in bytes; capacity is `receive_buffer / mss`
    /// segments.
    pub receive_buffer: usize,
    /// Retransmissions allowed per segment before it is abandoned.
    pub max_retries: u32,
    /// Probability in `[0, 1]` that the loss simulator drops a segment.
    pub loss_probability: f64,
    /// Seed for the loss simulator; `None` seeds from the OS.
    pub seed: Option<u64>,
    /// RTT estimate used before the first sample.
    pub initial_rtt: Duration,
    pub rto_min: Duration,
    pub rto_max: Duration,
    pub variant: Variant,
    /// Slow-start threshold before the first loss event.
    pub initial_ssthresh: u32,
    /// Consecutive timeouts closer together than this form one burst.
    pub timeout_burst: Duration,
    /// Bounded wait for window space before re-polling.
    pub window_wait: Duration,
    /// Bounded wait for outstanding ACKs before sending FIN.
    pub drain_timeout: Duration,
    pub handshake_timeout: Duration,
    /// Bounded wait for the FIN-ACK / final ACK.
    pub close_timeout: Duration,
    /// Where the reassembled inbound stream is written when a FIN arrives.
    pub output_path: Option<PathBuf>,
    /// Where the congestion-window trace is written on close.
    pub trace_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mss: 730,
            window_size: 4096,
            max_window: 4096,
            receive_buffer: 8192,
            max_retries: 15,
            loss_probability: 0.0,
            seed: None,
            initial_rtt: Duration::from_millis(1000),
            rto_min: Duration::from_millis(100),
            rto_max: Duration::from_millis(5000),
            variant: Variant::Reno,
            initial_ssthresh: 65_535,
            timeout_burst: Duration::from_millis(500),
            window_wait: Duration::from_millis(2000),
            drain_timeout: Duration::from_secs(15),
            handshake_timeout: Duration::from_secs(5),
            close_timeout: Duration::from_secs(2),
            output_path: None,
            trace_path: None,
        }
    }
}

impl Config {
    /// Check cross-field constraints.  Connections refuse to start with an
    /// invalid configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mss == 0 || self.mss > MAX_MSS {
            return Err(ConfigError::Mss(self.mss));
        }
        if !(0.0..=1.0).contains(&self.loss_probability) {
            return Err(ConfigError::LossProbability(self.loss_probability));
        }
        if self.rto_min > self.rto_max {
            return Err(ConfigError::RtoBounds {
                min: self.rto_min,
                max: self.rto_max,
            });
        }
        if (self.max_window as usize) < self.mss {
            return Err(ConfigError::WindowBelowMss {
                window: self.max_window,
                mss: self.mss,
            });
        }
        if self.window_size == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        Ok(())
    }

    /// Segments the receiver may hold out of order.
    pub fn reorder_capacity(&self) -> usize {
        (self.receive_buffer / self.mss.max(1)).max(1)
    }

    /// MSS as a window quantity.
    pub fn mss_u32(&self) -> u32 {
        self.mss as u32
    }
}

/// Reasons a [`Config`] is rejected.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("mss must be between 1 and {} bytes, got {0}", MAX_MSS)]
    Mss(usize),
    #[error("loss probability must be within [0, 1], got {0}")]
    LossProbability(f64),
    #[error("rto_min ({min:?}) exceeds rto_max ({max:?})")]
    RtoBounds { min: Duration, max: Duration },
    #[error("max window of {window} bytes cannot hold one {mss}-byte segment")]
    WindowBelowMss { window: u32, mss: usize },
    #[error("advertised window must be non-zero")]
    ZeroWindow,
}
