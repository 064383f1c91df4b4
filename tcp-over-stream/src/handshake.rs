//! Three-way open and the segments of the simplified close.
//!
//! ```text
//!  initiator                               responder
//!  CLOSED                                  LISTEN
//!    │ ── SYN seq=x ─────────────────────▶   │
//!  SYN_SENT                                SYN_RECEIVED
//!    │ ◀──────────── SYN+ACK seq=y ack=x+1 ─ │
//!    │ ── ACK seq=x+1 ack=y+1 ───────────▶   │
//!  ESTABLISHED                             ESTABLISHED
//! ```
//!
//! Any unexpected flag combination or acknowledgement number aborts the
//! handshake with [`ConnError::ProtocolViolation`]; there is no retry.  Each
//! read is bounded by `Config::handshake_timeout`.

use rand::Rng;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;

use crate::config::Config;
use crate::connection::ConnError;
use crate::packet::{flags, Header, Packet};
use crate::socket::{SegmentReader, SegmentWriter};
use crate::state::{ConnectionState, ConnectionVars, Ports, Role};

/// Initial sequence numbers are drawn from `[0, ISN_RANGE)`.
const ISN_RANGE: u32 = 1_000_000;

fn random_isn() -> u32 {
    rand::rng().random_range(0..ISN_RANGE)
}

fn transition(state: &mut ConnectionState, next: ConnectionState) {
    log::debug!("[handshake] {state} -> {next}");
    *state = next;
}

async fn read_bounded<R>(
    reader: &mut SegmentReader<R>,
    config: &Config,
    waiting_for: &str,
) -> Result<Packet, ConnError>
where
    R: AsyncRead + Unpin,
{
    let packet = timeout(config.handshake_timeout, reader.read_segment())
        .await
        .map_err(|_| ConnError::HandshakeTimeout(waiting_for.to_owned()))??;
    if packet.header.has(flags::RST) {
        return Err(ConnError::Reset);
    }
    Ok(packet)
}

fn violation(expected: &str, got: &Header) -> ConnError {
    ConnError::ProtocolViolation(format!(
        "expected {expected}, got flags={:#04x} seq={} ack={}",
        got.flags, got.seq, got.ack
    ))
}

/// Active open.  Returns the variables of the established connection.
pub async fn initiate<R, W>(
    reader: &mut SegmentReader<R>,
    writer: &mut SegmentWriter<W>,
    ports: Ports,
    config: &Config,
    state: &mut ConnectionState,
) -> Result<ConnectionVars, ConnError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let isn = random_isn();
    let syn = Packet::control(Header {
        src_port: ports.local,
        dst_port: ports.peer,
        seq: isn,
        flags: flags::SYN,
        window: config.window_size,
        ..Header::default()
    });
    writer.write_segment(&syn).await?;
    log::debug!("[handshake] -> SYN seq={isn}");
    transition(state, ConnectionState::SynSent);

    let synack = read_bounded(reader, config, "SYN+ACK").await?;
    let h = &synack.header;
    if !h.has(flags::SYN | flags::ACK) {
        return Err(violation("SYN+ACK", h));
    }
    if h.ack != isn.wrapping_add(1) {
        return Err(violation(&format!("ack={}", isn.wrapping_add(1)), h));
    }
    log::debug!("[handshake] <- SYN+ACK seq={} ack={}", h.seq, h.ack);

    let vars = ConnectionVars::established(
        Role::Initiator,
        ports,
        isn.wrapping_add(1),
        h.seq.wrapping_add(1),
        h.window,
    );
    writer.write_segment(&ack_segment(&vars, config.window_size)).await?;
    log::debug!(
        "[handshake] -> ACK seq={} ack={}",
        vars.sequence_number,
        vars.ack_number
    );
    transition(state, ConnectionState::Established);
    Ok(vars)
}

/// Passive open.  The peer port is taken from the SYN.
pub async fn respond<R, W>(
    reader: &mut SegmentReader<R>,
    writer: &mut SegmentWriter<W>,
    ports: Ports,
    config: &Config,
    state: &mut ConnectionState,
) -> Result<ConnectionVars, ConnError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    transition(state, ConnectionState::Listen);
    let syn = read_bounded(reader, config, "SYN").await?;
    let h = &syn.header;
    if !h.has(flags::SYN) || h.has(flags::ACK) {
        return Err(violation("SYN", h));
    }
    let ports = Ports::new(ports.local, h.src_port);
    let peer_isn = h.seq;
    log::debug!("[handshake] <- SYN seq={peer_isn}");

    let isn = random_isn();
    let synack = Packet::control(Header {
        src_port: ports.local,
        dst_port: ports.peer,
        seq: isn,
        ack: peer_isn.wrapping_add(1),
        flags: flags::SYN | flags::ACK,
        window: config.window_size,
        ..Header::default()
    });
    writer.write_segment(&synack).await?;
    log::debug!(
        "[handshake] -> SYN+ACK seq={isn} ack={}",
        peer_isn.wrapping_add(1)
    );
    transition(state, ConnectionState::SynReceived);

    let ack = read_bounded(reader, config, "ACK").await?;
    let h = &ack.header;
    if !h.has(flags::ACK) || h.has(flags::SYN) {
        return Err(violation("ACK", h));
    }
    if h.ack != isn.wrapping_add(1) {
        return Err(violation(&format!("ack={}", isn.wrapping_add(1)), h));
    }
    log::debug!("[handshake] <- ACK ack={}", h.ack);

    let vars = ConnectionVars::established(
        Role::Responder,
        ports,
        isn.wrapping_add(1),
        peer_isn.wrapping_add(1),
        h.window,
    );
    transition(state, ConnectionState::Established);
    Ok(vars)
}

// ---------------------------------------------------------------------------
// Close segments
// ---------------------------------------------------------------------------

fn control(vars: &ConnectionVars, seq: u32, ack: u32, flags: u8, window: u16) -> Packet {
    Packet::control(Header {
        src_port: vars.ports.local,
        dst_port: vars.ports.peer,
        seq,
        ack,
        flags,
        window,
        ..Header::default()
    })
}

/// Pure ACK carrying the current sequence and acknowledgement numbers.
pub fn ack_segment(vars: &ConnectionVars, window: u16) -> Packet {
    control(
        vars,
        vars.sequence_number,
        vars.ack_number,
        flags::ACK,
        window,
    )
}

/// FIN sent by the side that closes first.
pub fn fin_segment(vars: &ConnectionVars, window: u16) -> Packet {
    control(
        vars,
        vars.sequence_number,
        vars.ack_number,
        flags::FIN | flags::ACK,
        window,
    )
}

/// Answer to a peer FIN: acknowledges the FIN's sequence slot.
pub fn fin_ack_segment(vars: &ConnectionVars, fin: &Header, window: u16) -> Packet {
    control(
        vars,
        vars.sequence_number,
        fin.seq.wrapping_add(1),
        flags::FIN | flags::ACK,
        window,
    )
}

/// Last segment of the close: acknowledges the peer's FIN-ACK.
pub fn final_ack_segment(vars: &ConnectionVars, fin_ack: &Header, window: u16) -> Packet {
    control(
        vars,
        vars.sequence_number.wrapping_add(1),
        fin_ack.seq.wrapping_add(1),
        flags::ACK,
        window,
    )
}

/// RST aborting the connection.
pub fn reset_segment(vars: &ConnectionVars) -> Packet {
    control(
        vars,
        vars.sequence_number,
        vars.ack_number,
        flags::RST,
        0,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars() -> ConnectionVars {
        ConnectionVars::established(Role::Initiator, Ports::new(40000, 8080), 501, 901, 4096)
    }

    #[test]
    fn isn_is_in_range() {
        for _ in 0..1_000 {
            assert!(random_isn() < ISN_RANGE);
        }
    }

    #[test]
    fn fin_exchange_numbers() {
        let v = vars();
        let fin = fin_segment(&v, 4096);
        assert!(fin.header.has(flags::FIN | flags::ACK));
        assert_eq!((fin.header.seq, fin.header.ack), (501, 901));

        let peer = ConnectionVars::established(Role::Responder, Ports::new(8080, 40000), 901, 501, 4096);
        let fin_ack = fin_ack_segment(&peer, &fin.header, 4096);
        assert_eq!((fin_ack.header.seq, fin_ack.header.ack), (901, 502));

        let last = final_ack_segment(&v, &fin_ack.header, 4096);
        assert_eq!(last.header.flags, flags::ACK);
        assert_eq!((last.header.seq, last.header.ack), (502, 902));
    }

    #[test]
    fn reset_carries_rst_only() {
        let rst = reset_segment(&vars());
        assert_eq!(rst.header.flags, flags::RST);
        assert_eq!((rst.header.src_port, rst.header.dst_port), (40000, 8080));
    }

    #[tokio::test]
    async fn both_sides_agree_on_sequence_numbers() {
        let (a, b) = tokio::io::duplex(1024);
        let (ar, aw) = tokio::io::split(a);
        let (br, bw) = tokio::io::split(b);
        let cfg = Config::default();

        let server = tokio::spawn(async move {
            let cfg = Config::default();
            let mut state = ConnectionState::Closed;
            let mut r = SegmentReader::new(br);
            let mut w = SegmentWriter::new(bw);
            let vars = respond(&mut r, &mut w, Ports::new(8080, 0), &cfg, &mut state).await;
            (vars, state)
        });

        let mut state = ConnectionState::Closed;
        let mut r = SegmentReader::new(ar);
        let mut w = SegmentWriter::new(aw);
        let client = initiate(&mut r, &mut w, Ports::new(40000, 8080), &cfg, &mut state)
            .await
            .unwrap();
        let (server, server_state) = server.await.unwrap();
        let server = server.unwrap();

        assert_eq!(state, ConnectionState::Established);
        assert_eq!(server_state, ConnectionState::Established);
        assert_eq!(client.sequence_number, server.ack_number);
        assert_eq!(server.sequence_number, client.ack_number);
        assert_eq!(client.base_sequence_number, client.sequence_number);
        assert_eq!(server.ports, Ports::new(8080, 40000));
        assert_eq!(client.peer_window, cfg.window_size);
    }
}
