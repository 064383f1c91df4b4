//! `tcp-over-stream`: a TCP-like congestion-controlled transport simulated
//! on top of a reliable byte stream.
//!
//! # Architecture
//!
//! ```text
//!  application bytes
//!        │ send()                               recv() ▲
//!  ┌─────▼───────────────────────────────────────────┴─────┐
//!  │                     Connection                         │
//!  │  handshake ─ FSM ─ close                               │
//!  │  ┌──────────────┐  ACKs   ┌──────────────┐             │
//!  │  │ SenderEngine │◀────────│  AckProcessor│             │
//!  │  │  window      │         └──────┬───────┘             │
//!  │  │  loss gate   │   RTT ◀────────┤                     │
//!  │  │  rtx queue   │   cwnd ◀───────┘  ReceiverEngine     │
//!  │  └──────┬───────┘                   (reassembly)       │
//!  └─────────┼───────────────────────────────▲──────────────┘
//!            │ length-prefixed segments      │
//!  ┌─────────▼───────────────────────────────┴──────┐
//!  │ socket: SegmentReader / SegmentWriter (tokio)   │
//!  └─────────────────────────────────────────────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`packet`]      wire format (serialise / deserialise)
//! - [`socket`]      length-prefixed framing over an async byte stream
//! - [`state`]       finite-state-machine types and sequence variables
//! - [`config`]      tunable parameters and validation
//! - [`handshake`]   three-way open and close segments
//! - [`rtt`]         RTT estimation and RTO
//! - [`congestion`]  Tahoe / Reno congestion control
//! - [`retransmit`]  unacked-segment queue and timer expiry
//! - [`simulator`]   synthetic packet-loss injection
//! - [`ack`]         cumulative / duplicate ACK processing
//! - [`sender`]      sliding-window send side
//! - [`receiver`]    in-order delivery and reorder buffer
//! - [`trace`]       cwnd trace and transfer statistics
//! - [`connection`]  per-connection tasks and public API

pub mod ack;
pub mod config;
pub mod congestion;
pub mod connection;
pub mod handshake;
pub mod packet;
pub mod receiver;
pub mod retransmit;
pub mod rtt;
pub mod sender;
pub mod simulator;
pub mod socket;
pub mod state;
pub mod trace;

pub use config::Config;
pub use congestion::Variant;
pub use connection::{ConnError, Connection, Snapshot};
pub use state::{ConnectionState, Ports};
