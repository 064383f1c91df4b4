//! Congestion-window trace and per-connection transfer statistics.
//!
//! [`CwndTrace`] records one row per data transmission and per loss event.
//! On close the connection writes it as CSV:
//!
//! ```text
//! Time_ms,Packet_Number,CWND_MSS,SSThresh,State,Event
//! 0,1,1.00,65535,SLOW_START,SEND
//! 412,7,1.00,1460,SLOW_START,TIMEOUT
//! ```
//!
//! `CWND_MSS` is the window in segments; `SSThresh` stays in bytes.

use std::fmt::{self, Write as _};
use std::path::Path;

use tokio::time::Instant;

use crate::congestion::{CongestionState, Mode};

/// Event column of a trace row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceEvent {
    Send,
    Timeout,
    FastRetransmit,
}

impl TraceEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Send => "SEND",
            Self::Timeout => "TIMEOUT",
            Self::FastRetransmit => "FAST_RETRANSMIT",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TraceRow {
    pub time_ms: u64,
    /// Number of data transmissions so far, including this one.
    pub packet_number: u64,
    pub cwnd_mss: f64,
    pub ssthresh: u32,
    pub mode: Mode,
    pub event: TraceEvent,
}

/// In-memory congestion-window time series.
#[derive(Debug, Clone)]
pub struct CwndTrace {
    started: Instant,
    mss: u32,
    packets: u64,
    rows: Vec<TraceRow>,
}

impl CwndTrace {
    pub const HEADER: &'static str = "Time_ms,Packet_Number,CWND_MSS,SSThresh,State,Event";

    pub fn new(mss: u32, started: Instant) -> Self {
        Self {
            started,
            mss: mss.max(1),
            packets: 0,
            rows: Vec::new(),
        }
    }

    /// Append a row describing `cc` right after `event`.
    pub fn record(&mut self, now: Instant, event: TraceEvent, cc: &CongestionState) {
        if event == TraceEvent::Send {
            self.packets += 1;
        }
        self.rows.push(TraceRow {
            time_ms: now.saturating_duration_since(self.started).as_millis() as u64,
            packet_number: self.packets,
            cwnd_mss: f64::from(cc.cwnd) / f64::from(self.mss),
            ssthresh: cc.ssthresh,
            mode: cc.mode,
            event,
        });
    }

    pub fn rows(&self) -> &[TraceRow] {
        &self.rows
    }

    pub fn to_csv(&self) -> String {
        let mut out = String::with_capacity(Self::HEADER.len() + 1 + self.rows.len() * 48);
        out.push_str(Self::HEADER);
        out.push('\n');
        for row in &self.rows {
            // Writing into a String cannot fail.
            let _ = writeln!(
                out,
                "{},{},{:.2},{},{},{}",
                row.time_ms,
                row.packet_number,
                row.cwnd_mss,
                row.ssthresh,
                row.mode,
                row.event.as_str()
            );
        }
        out
    }

    pub async fn write_csv(&self, path: &Path) -> std::io::Result<()> {
        tokio::fs::write(path, self.to_csv()).await
    }
}

/// Counters kept by one connection's send side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferStats {
    /// New data segments handed to transmission.
    pub segments_sent: u64,
    /// Transmission attempts swallowed by the loss simulator.
    pub segments_dropped: u64,
    /// Timeout-driven retransmissions.
    pub retransmissions: u64,
    pub fast_retransmits: u64,
    pub timeouts: u64,
    /// Segments given up after the retry ceiling.
    pub abandoned: u64,
    pub bytes_acked: u64,
    pub rtt_samples: u64,
}

impl TransferStats {
    /// Share of transmission attempts that the simulator dropped.
    pub fn loss_rate(&self) -> f64 {
        let attempts = self.segments_sent + self.retransmissions + self.fast_retransmits;
        if attempts == 0 {
            0.0
        } else {
            self.segments_dropped as f64 / attempts as f64
        }
    }
}

impl fmt::Display for TransferStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sent={} dropped={} ({:.1}%) retransmitted={} fast_retransmits={} timeouts={} \
             abandoned={} bytes_acked={} rtt_samples={}",
            self.segments_sent,
            self.segments_dropped,
            self.loss_rate() * 100.0,
            self.retransmissions,
            self.fast_retransmits,
            self.timeouts,
            self.abandoned,
            self.bytes_acked,
            self.rtt_samples
        )
    }
}
