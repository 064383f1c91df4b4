//! Per-connection lifecycle manager.
//!
//! # Architecture
//!
//! ```text
//!  Application
//!      │ send() / flush() / close()            recv()
//!      ▼                                         ▲
//!  ┌───────────────────────────────┐            │ mpsc
//!  │ Shared                        │     ┌──────┴───────┐
//!  │  Mutex<Engine>                │◀────│ inbound task │◀── SegmentReader
//!  │   ├── ConnectionVars          │     └──────────────┘
//!  │   ├── SenderEngine            │     ┌──────────────┐
//!  │   └── ReceiverEngine          │◀────│ timer driver │◀── fired timers
//!  │  Mutex<SegmentWriter> ────────┼──▶ wire            └──────────────┘
//!  └───────────────────────────────┘
//! ```
//!
//! Three flows touch one [`Engine`]: the caller's `send`, the inbound task
//! and the timer driver.  The engine sits behind a synchronous mutex that is
//! never held across an `.await`; every engine call returns an [`Outbound`]
//! that is written after the lock is released.
//!
//! Retransmission timers are fire-and-forget tasks that post the sequence
//! number to the timer driver after the RTO.  They are never cancelled: a
//! segment that was acknowledged in the meantime makes the firing a no-op.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{timeout, timeout_at, Instant};

use crate::config::{Config, ConfigError};
use crate::congestion::Mode;
use crate::handshake;
use crate::packet::{flags, Packet};
use crate::receiver::ReceiverEngine;
use crate::retransmit::TimerRequest;
use crate::sender::{Outbound, SenderEngine};
use crate::socket::{SegmentReader, SegmentWriter, SocketError};
use crate::state::{ConnectionState, ConnectionVars, Ports, Role};
use crate::trace::{CwndTrace, TransferStats};

type BoxedReader = SegmentReader<Box<dyn AsyncRead + Send + Unpin>>;
type BoxedWriter = SegmentWriter<Box<dyn AsyncWrite + Send + Unpin>>;
type Delivery = Result<Vec<u8>, ConnError>;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConnError {
    /// The peer answered the handshake with the wrong flags or numbers.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
    #[error("handshake timed out waiting for {0}")]
    HandshakeTimeout(String),
    #[error(transparent)]
    Socket(#[from] SocketError),
    #[error("operation not permitted in state {0}")]
    BadState(ConnectionState),
    #[error("connection reset by peer")]
    Reset,
    /// The peer finished sending; no more data will arrive.
    #[error("end of stream")]
    Eof,
    /// An earlier transport failure already tore the connection down.
    #[error("transport closed")]
    TransportClosed,
    #[error("could not write received stream to {}: {source}", .path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Observation
// ---------------------------------------------------------------------------

/// Point-in-time view of the send-side variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub role: Role,
    pub state: ConnectionState,
    pub cwnd: u32,
    pub ssthresh: u32,
    pub mode: Mode,
    pub sequence_number: u32,
    pub base_sequence_number: u32,
    pub ack_number: u32,
    pub bytes_in_flight: u32,
    pub unacked_segments: usize,
    pub rto: Duration,
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

struct Engine {
    state: ConnectionState,
    vars: ConnectionVars,
    tx: SenderEngine,
    rx: ReceiverEngine,
    /// Set once FIN is sent or received; timers stop retransmitting.
    closed: bool,
    /// Set after a transport failure.
    fatal: bool,
}

impl Engine {
    fn ensure_open(&self) -> Result<(), ConnError> {
        if self.fatal {
            return Err(ConnError::TransportClosed);
        }
        if !self.state.is_open() {
            return Err(ConnError::BadState(self.state));
        }
        Ok(())
    }
}

struct Shared {
    engine: Mutex<Engine>,
    writer: tokio::sync::Mutex<BoxedWriter>,
    config: Config,
    /// Woken whenever window space may have opened or the unacked set shrank.
    window_open: Notify,
    state_tx: watch::Sender<ConnectionState>,
    deliver_tx: mpsc::UnboundedSender<Delivery>,
    timer_tx: mpsc::UnboundedSender<u32>,
    finalized: tokio::sync::Mutex<bool>,
}

/// What the inbound task must do after an engine update.
enum Action {
    None,
    Data {
        out: Outbound,
        delivered: Vec<u8>,
    },
    PeerFin {
        fin_ack: Packet,
        stream: Vec<u8>,
    },
    FinAcked {
        final_ack: Packet,
    },
    Closed,
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

impl Shared {
    fn engine(&self) -> MutexGuard<'_, Engine> {
        self.engine.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, engine: &mut Engine, next: ConnectionState) {
        if engine.state != next {
            log::debug!("[close] {} -> {next}", engine.state);
            engine.state = next;
            self.state_tx.send_replace(next);
        }
    }

    fn arm(&self, req: TimerRequest) {
        let fired = self.timer_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(req.rto).await;
            let _ = fired.send(req.seq);
        });
    }

    async fn write(&self, packets: &[Packet]) -> Result<(), SocketError> {
        if packets.is_empty() {
            return Ok(());
        }
        let mut writer = self.writer.lock().await;
        for packet in packets {
            writer.write_segment(packet).await?;
        }
        Ok(())
    }

    /// Arm the requested timers, then put the packets on the wire.
    async fn dispatch(&self, out: Outbound) -> Result<(), ConnError> {
        for req in out.timers {
            self.arm(req);
        }
        if let Err(err) = self.write(&out.packets).await {
            log::warn!("[send] transport write failed: {err}");
            self.fail(ConnError::Socket(err));
            return Err(ConnError::TransportClosed);
        }
        Ok(())
    }

    /// Tear the connection down after a fatal error, forwarding it once.
    ///
    /// The error is queued before `Closed` is published: a reader woken by
    /// the state change must find it in the delivery queue.
    fn fail(&self, err: ConnError) {
        {
            let mut guard = self.engine();
            let engine = &mut *guard;
            if engine.fatal {
                return;
            }
            engine.fatal = true;
            engine.closed = true;
            let _ = self.deliver_tx.send(Err(err));
            self.set_state(engine, ConnectionState::Closed);
        }
        self.window_open.notify_waiters();
    }

    // -----------------------------------------------------------------------
    // Sender flow
    // -----------------------------------------------------------------------

    async fn send_segment(&self, chunk: &[u8]) -> Result<(), ConnError> {
        loop {
            let notified = self.window_open.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let out = {
                let mut guard = self.engine();
                let engine = &mut *guard;
                engine.ensure_open()?;
                engine
                    .tx
                    .can_send(&engine.vars)
                    .then(|| engine.tx.transmit(&mut engine.vars, chunk, Instant::now()))
            };
            if let Some(out) = out {
                return self.dispatch(out).await;
            }
            if timeout(self.config.window_wait, notified).await.is_err() {
                log::debug!(
                    "[send] window still full after {:?}; polling again",
                    self.config.window_wait
                );
            }
        }
    }

    async fn flush(&self) -> Result<usize, ConnError> {
        let deadline = Instant::now() + self.config.drain_timeout;
        loop {
            let notified = self.window_open.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let remaining = {
                let engine = self.engine();
                if engine.fatal {
                    return Err(ConnError::TransportClosed);
                }
                if engine.closed {
                    return Ok(engine.tx.unacked_segments());
                }
                engine.tx.unacked_segments()
            };
            if remaining == 0 {
                return Ok(0);
            }
            if timeout_at(deadline, notified).await.is_err() {
                log::warn!(
                    "[close] {remaining} segment(s) still unacknowledged after {:?}",
                    self.config.drain_timeout
                );
                return Ok(remaining);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Timer flow
    // -----------------------------------------------------------------------

    async fn on_timer(&self, seq: u32) {
        let (out, shrank) = {
            let mut guard = self.engine();
            let engine = &mut *guard;
            if engine.closed {
                return;
            }
            let before = engine.tx.unacked_segments();
            let out = engine.tx.on_timer(seq, Instant::now());
            (out, engine.tx.unacked_segments() < before)
        };
        if shrank {
            self.window_open.notify_waiters();
        }
        if let Err(err) = self.dispatch(out).await {
            log::warn!("[rtx] retransmission of seq={seq} failed: {err}");
        }
    }

    // -----------------------------------------------------------------------
    // Inbound flow
    // -----------------------------------------------------------------------

    async fn on_segment(&self, packet: Packet) -> Flow {
        let h = &packet.header;
        if h.has(flags::RST) {
            log::warn!("[recv] connection reset by peer");
            self.fail(ConnError::Reset);
            return Flow::Stop;
        }

        let window = self.config.window_size;
        let now = Instant::now();
        let action = {
            let mut guard = self.engine();
            let engine = &mut *guard;
            match engine.state {
                ConnectionState::Established if h.has(flags::FIN) => {
                    if h.has(flags::ACK) {
                        engine.tx.on_ack(&mut engine.vars, h, false, now);
                    }
                    engine.vars.ack_number = h.seq.wrapping_add(1);
                    let fin_ack = handshake::fin_ack_segment(&engine.vars, h, window);
                    // The FIN-ACK occupies one sequence slot.
                    engine.vars.advance_sequence(1);
                    engine.closed = true;
                    self.set_state(engine, ConnectionState::LastAck);
                    log::debug!("[close] <- FIN seq={}; -> FIN+ACK", h.seq);
                    Action::PeerFin {
                        fin_ack,
                        stream: engine.rx.stream().to_vec(),
                    }
                }
                ConnectionState::Established => {
                    let mut out = Outbound::default();
                    let mut delivered = Vec::new();
                    if h.has(flags::ACK) {
                        out.extend(engine.tx.on_ack(
                            &mut engine.vars,
                            h,
                            packet.payload.is_empty(),
                            now,
                        ));
                    }
                    if !packet.payload.is_empty() {
                        let arrival = engine.rx.on_segment(h.seq, &packet.payload, &mut delivered);
                        engine.vars.ack_number = engine.rx.expected();
                        out.packets.push(engine.rx.ack_segment(&engine.vars));
                        log::trace!(
                            "[recv] seq={} len={} {arrival:?}; -> ACK {}",
                            h.seq,
                            packet.payload.len(),
                            engine.vars.ack_number
                        );
                    }
                    Action::Data { out, delivered }
                }
                ConnectionState::FinWait if h.has(flags::FIN) => {
                    log::debug!("[close] <- FIN+ACK seq={}; -> ACK", h.seq);
                    Action::FinAcked {
                        final_ack: handshake::final_ack_segment(&engine.vars, h, window),
                    }
                }
                ConnectionState::LastAck
                    if h.has(flags::ACK) && h.ack == engine.vars.sequence_number =>
                {
                    log::debug!("[close] <- final ACK");
                    self.set_state(engine, ConnectionState::Closed);
                    Action::Closed
                }
                state => {
                    log::trace!("[recv] ignoring segment {:?} in state {state}", h);
                    Action::None
                }
            }
        };

        match action {
            Action::None => Flow::Continue,
            Action::Data { out, delivered } => {
                if h.has(flags::ACK) {
                    self.window_open.notify_waiters();
                }
                if !delivered.is_empty() {
                    let _ = self.deliver_tx.send(Ok(delivered));
                }
                match self.dispatch(out).await {
                    Ok(()) => Flow::Continue,
                    Err(_) => Flow::Stop,
                }
            }
            Action::PeerFin { fin_ack, stream } => {
                let eof = self.persist(&stream).await.err().unwrap_or(ConnError::Eof);
                if let Err(err) = self.write(&[fin_ack]).await {
                    log::warn!("[close] could not send FIN+ACK: {err}");
                }
                self.window_open.notify_waiters();
                let _ = self.deliver_tx.send(Err(eof));
                Flow::Continue
            }
            Action::FinAcked { final_ack } => {
                if let Err(err) = self.write(&[final_ack]).await {
                    log::warn!("[close] could not send final ACK: {err}");
                }
                let mut guard = self.engine();
                self.set_state(&mut guard, ConnectionState::Closed);
                Flow::Stop
            }
            Action::Closed => {
                self.finalize().await;
                Flow::Stop
            }
        }
    }

    async fn on_read_error(&self, err: SocketError) {
        let state = self.engine().state;
        if err.is_eof() && matches!(state, ConnectionState::FinWait | ConnectionState::LastAck) {
            log::debug!("[close] peer closed the stream in {state}");
            {
                let mut guard = self.engine();
                self.set_state(&mut guard, ConnectionState::Closed);
            }
            if state == ConnectionState::LastAck {
                self.finalize().await;
            }
            return;
        }
        log::warn!("[recv] transport read failed in {state}: {err}");
        self.fail(ConnError::Socket(err));
    }

    async fn persist(&self, stream: &[u8]) -> Result<(), ConnError> {
        let Some(path) = &self.config.output_path else {
            return Ok(());
        };
        match tokio::fs::write(path, stream).await {
            Ok(()) => {
                log::info!("[close] wrote {} bytes to {}", stream.len(), path.display());
                Ok(())
            }
            Err(source) => {
                log::error!("[close] failed to write {}: {source}", path.display());
                Err(ConnError::Persist {
                    path: path.clone(),
                    source,
                })
            }
        }
    }

    /// Log statistics, write the trace and shut the write half down.  Runs
    /// once; concurrent callers wait for the first to finish.
    async fn finalize(&self) {
        let mut done = self.finalized.lock().await;
        if *done {
            return;
        }
        *done = true;

        let (stats, trace) = {
            let engine = self.engine();
            (engine.tx.stats(), engine.tx.trace().clone())
        };
        log::info!("[close] transfer statistics: {stats}");
        if let Some(path) = &self.config.trace_path {
            match trace.write_csv(path).await {
                Ok(()) => log::info!(
                    "[close] wrote {} trace rows to {}",
                    trace.rows().len(),
                    path.display()
                ),
                Err(err) => log::warn!("[close] failed to write {}: {err}", path.display()),
            }
        }
        if let Err(err) = self.writer.lock().await.shutdown().await {
            log::trace!("[close] shutdown: {err}");
        }
    }
}

async fn wait_closed(state: &mut watch::Receiver<ConnectionState>) {
    let _ = state.wait_for(|s| *s == ConnectionState::Closed).await;
}

async fn run_inbound(
    shared: Arc<Shared>,
    mut reader: BoxedReader,
    mut state: watch::Receiver<ConnectionState>,
) {
    loop {
        let result = tokio::select! {
            result = reader.read_segment() => result,
            _ = wait_closed(&mut state) => break,
        };
        match result {
            Ok(packet) => {
                if shared.on_segment(packet).await == Flow::Stop {
                    break;
                }
            }
            Err(err) => {
                shared.on_read_error(err).await;
                break;
            }
        }
    }
    log::trace!("[recv] inbound task finished");
}

async fn run_timers(
    shared: Arc<Shared>,
    mut fired: mpsc::UnboundedReceiver<u32>,
    mut state: watch::Receiver<ConnectionState>,
) {
    loop {
        tokio::select! {
            Some(seq) = fired.recv() => shared.on_timer(seq).await,
            _ = wait_closed(&mut state) => break,
            else => break,
        }
    }
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// A reliable, congestion-controlled connection over a byte stream.
///
/// Obtain one with [`Connection::open`] (TCP), or with
/// [`Connection::connect`] / [`Connection::accept`] over any async stream.
pub struct Connection {
    shared: Arc<Shared>,
    inbound: mpsc::UnboundedReceiver<Delivery>,
    state: watch::Receiver<ConnectionState>,
    /// Set after `recv` returned end of stream or an error.
    drained: bool,
    tasks: Vec<JoinHandle<()>>,
}

impl Connection {
    /// Connect over TCP to `addr` and run the active open.
    pub async fn open<A: ToSocketAddrs>(addr: A, config: Config) -> Result<Self, ConnError> {
        let stream = TcpStream::connect(addr).await.map_err(SocketError::from)?;
        stream.set_nodelay(true).map_err(SocketError::from)?;
        let ports = ports_of(stream.local_addr(), stream.peer_addr());
        log::info!("[handshake] connected to {:?}", stream.peer_addr().ok());
        Self::connect(stream, ports, config).await
    }

    /// Active open over an established byte stream.
    pub async fn connect<S>(io: S, ports: Ports, config: Config) -> Result<Self, ConnError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        config.validate()?;
        let (mut reader, mut writer) = split(io);
        let mut state = ConnectionState::Closed;
        let vars = handshake::initiate(&mut reader, &mut writer, ports, &config, &mut state).await?;
        Ok(Self::start(reader, writer, vars, config))
    }

    /// Passive open over an established byte stream.
    pub async fn accept<S>(io: S, ports: Ports, config: Config) -> Result<Self, ConnError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        config.validate()?;
        let (mut reader, mut writer) = split(io);
        let mut state = ConnectionState::Closed;
        let vars = handshake::respond(&mut reader, &mut writer, ports, &config, &mut state).await?;
        Ok(Self::start(reader, writer, vars, config))
    }

    fn start(reader: BoxedReader, writer: BoxedWriter, vars: ConnectionVars, config: Config) -> Self {
        log::info!(
            "[handshake] established as {} ({} -> {})",
            vars.role,
            vars.ports.local,
            vars.ports.peer
        );
        let now = Instant::now();
        let engine = Engine {
            state: ConnectionState::Established,
            tx: SenderEngine::new(&config, &vars, now),
            rx: ReceiverEngine::new(vars.ack_number, config.reorder_capacity(), config.window_size),
            vars,
            closed: false,
            fatal: false,
        };
        let (state_tx, state_rx) = watch::channel(ConnectionState::Established);
        let (deliver_tx, inbound) = mpsc::unbounded_channel();
        let (timer_tx, fired) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            engine: Mutex::new(engine),
            writer: tokio::sync::Mutex::new(writer),
            config,
            window_open: Notify::new(),
            state_tx,
            deliver_tx,
            timer_tx,
            finalized: tokio::sync::Mutex::new(false),
        });
        let tasks = vec![
            tokio::spawn(run_inbound(Arc::clone(&shared), reader, state_rx.clone())),
            tokio::spawn(run_timers(Arc::clone(&shared), fired, state_rx.clone())),
        ];
        Self {
            shared,
            inbound,
            state: state_rx,
            drained: false,
            tasks,
        }
    }

    /// Send `data`, cutting it into MSS-sized segments.
    ///
    /// Returns once every segment has been handed to transmission; use
    /// [`flush`](Self::flush) to wait for acknowledgements.
    pub async fn send(&self, data: &[u8]) -> Result<(), ConnError> {
        for chunk in data.chunks(self.shared.config.mss) {
            self.shared.send_segment(chunk).await?;
        }
        Ok(())
    }

    /// Next chunk of in-order data from the peer.
    ///
    /// Returns [`ConnError::Eof`] once the peer has closed.
    pub async fn recv(&mut self) -> Result<Vec<u8>, ConnError> {
        if self.drained {
            return Err(ConnError::Eof);
        }
        let item = tokio::select! {
            biased;
            item = self.inbound.recv() => item,
            _ = wait_closed(&mut self.state) => self.inbound.try_recv().ok(),
        };
        match item {
            Some(Ok(data)) => Ok(data),
            Some(Err(err)) => {
                self.drained = true;
                Err(err)
            }
            None => {
                self.drained = true;
                Err(ConnError::Eof)
            }
        }
    }

    /// Wait, up to the drain timeout, for every sent segment to be
    /// acknowledged.  Returns how many segments are still unacknowledged.
    pub async fn flush(&self) -> Result<usize, ConnError> {
        self.shared.flush().await
    }

    /// Flush, then run the FIN / FIN-ACK / ACK exchange.
    pub async fn close(&self) -> Result<(), ConnError> {
        let shared = &self.shared;
        let state = self.state();
        match state {
            ConnectionState::Established => {}
            ConnectionState::LastAck | ConnectionState::FinWait => {
                self.await_closed().await;
                shared.finalize().await;
                return Ok(());
            }
            ConnectionState::Closed => {
                shared.finalize().await;
                return Ok(());
            }
            other => return Err(ConnError::BadState(other)),
        }

        let remaining = shared.flush().await?;
        if remaining > 0 {
            log::warn!("[close] closing with {remaining} unacknowledged segment(s)");
        }

        let fin = {
            let mut guard = shared.engine();
            let engine = &mut *guard;
            if engine.state != ConnectionState::Established {
                // The peer closed while we were draining.
                None
            } else {
                engine.closed = true;
                shared.set_state(engine, ConnectionState::FinWait);
                Some(handshake::fin_segment(&engine.vars, shared.config.window_size))
            }
        };
        if let Some(fin) = fin {
            log::debug!("[close] -> FIN seq={}", fin.header.seq);
            shared.write(&[fin]).await?;
        }

        self.await_closed().await;
        shared.finalize().await;
        Ok(())
    }

    async fn await_closed(&self) {
        let mut state = self.state.clone();
        if timeout(self.shared.config.close_timeout, wait_closed(&mut state))
            .await
            .is_err()
        {
            log::warn!(
                "[close] no answer within {:?}; forcing the connection closed",
                self.shared.config.close_timeout
            );
            let mut guard = self.shared.engine();
            guard.closed = true;
            self.shared.set_state(&mut guard, ConnectionState::Closed);
        }
    }

    /// Current FSM state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn stats(&self) -> TransferStats {
        self.shared.engine().tx.stats()
    }

    /// Congestion-window trace recorded so far.
    pub fn trace(&self) -> CwndTrace {
        self.shared.engine().tx.trace().clone()
    }

    /// The full stream received from the peer so far.
    pub fn received(&self) -> Vec<u8> {
        self.shared.engine().rx.stream().to_vec()
    }

    pub fn snapshot(&self) -> Snapshot {
        let engine = self.shared.engine();
        let cc = engine.tx.congestion();
        Snapshot {
            role: engine.vars.role,
            state: engine.state,
            cwnd: cc.cwnd(),
            ssthresh: cc.ssthresh(),
            mode: cc.mode(),
            sequence_number: engine.vars.sequence_number,
            base_sequence_number: engine.vars.base_sequence_number,
            ack_number: engine.vars.ack_number,
            bytes_in_flight: engine.tx.bytes_in_flight(),
            unacked_segments: engine.tx.unacked_segments(),
            rto: engine.tx.rtt().rto(),
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

fn split<S>(io: S) -> (BoxedReader, BoxedWriter)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (r, w) = tokio::io::split(io);
    (
        SegmentReader::new(Box::new(r) as Box<dyn AsyncRead + Send + Unpin>),
        SegmentWriter::new(Box::new(w) as Box<dyn AsyncWrite + Send + Unpin>),
    )
}

fn ports_of(local: std::io::Result<SocketAddr>, peer: std::io::Result<SocketAddr>) -> Ports {
    Ports::new(
        local.map(|a| a.port()).unwrap_or_default(),
        peer.map(|a| a.port()).unwrap_or_default(),
    )
}

impl std::fmt::Display for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} cwnd={} ssthresh={} mode={} seq={} base={} in_flight={}",
            self.role,
            self.state,
            self.cwnd,
            self.ssthresh,
            self.mode,
            self.sequence_number,
            self.base_sequence_number,
            self.bytes_in_flight
        )
    }
}
