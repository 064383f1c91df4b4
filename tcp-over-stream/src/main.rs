//! Entry point for `tcp-over-stream`.
//!
//! Parses CLI arguments and dispatches into either **server** or **client** mode.
//! All actual protocol work is delegated to library modules; `main.rs` owns only
//! process setup (logging, argument parsing, file I/O).

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::net::TcpListener;

use tcp_over_stream::{ConnError, Config, Connection, Ports, Variant};

/// TCP-style congestion-controlled transfer over a reliable byte stream.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Accept clients and store each received stream in a file.
    Server {
        /// Local address to bind.
        #[arg(short, long, default_value = "0.0.0.0:8080")]
        bind: String,
        /// Directory for `received_file_<n>.txt`.
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,
        #[command(flatten)]
        tuning: Tuning,
    },
    /// Send a file to a server and close.
    Client {
        /// Remote server address.
        #[arg(short, long, default_value = "127.0.0.1:8080")]
        server: String,
        /// File to send.
        #[arg(short, long)]
        file: PathBuf,
        /// Probability that the sender drops a segment.
        #[arg(short, long, default_value_t = 0.15)]
        loss: f64,
        /// Seed for the loss simulator.
        #[arg(long)]
        seed: Option<u64>,
        /// Write the congestion-window trace to this CSV file.
        #[arg(long)]
        trace: Option<PathBuf>,
        #[command(flatten)]
        tuning: Tuning,
    },
}

/// Protocol parameters shared by both modes.
#[derive(Args)]
struct Tuning {
    /// Maximum segment size in bytes.
    #[arg(long, default_value_t = 730)]
    mss: usize,
    /// Congestion-control variant: tahoe or reno.
    #[arg(long, default_value_t = Variant::Reno)]
    variant: Variant,
    /// Retransmissions per segment before it is abandoned.
    #[arg(long, default_value_t = 15)]
    max_retries: u32,
}

impl Tuning {
    fn config(&self) -> Config {
        Config {
            mss: self.mss,
            variant: self.variant,
            max_retries: self.max_retries,
            ..Config::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();

    match cli.mode {
        Mode::Server {
            bind,
            out_dir,
            tuning,
        } => serve(&bind, out_dir, tuning.config()).await,
        Mode::Client {
            server,
            file,
            loss,
            seed,
            trace,
            tuning,
        } => {
            let config = Config {
                loss_probability: loss,
                seed,
                trace_path: trace,
                ..tuning.config()
            };
            send_file(&server, &file, config).await
        }
    }
}

async fn serve(bind: &str, out_dir: PathBuf, config: Config) -> Result<()> {
    config.validate().context("invalid server configuration")?;
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("binding {bind}"))?;
    log::info!("Server listening on {}", listener.local_addr()?);

    let clients = Arc::new(AtomicUsize::new(0));
    loop {
        let (stream, peer) = listener.accept().await?;
        stream.set_nodelay(true)?;
        let n = clients.fetch_add(1, Ordering::Relaxed) + 1;
        let config = Config {
            output_path: Some(out_dir.join(format!("received_file_{n}.txt"))),
            ..config.clone()
        };
        let ports = Ports::new(stream.local_addr()?.port(), peer.port());
        log::info!("Client #{n} connected from {peer}");

        tokio::spawn(async move {
            if let Err(err) = handle_client(stream, ports, config).await {
                log::error!("Client #{n} ({peer}): {err:#}");
            }
        });
    }
}

async fn handle_client(stream: tokio::net::TcpStream, ports: Ports, config: Config) -> Result<()> {
    let mut conn = Connection::accept(stream, ports, config).await?;
    let mut received = 0usize;
    loop {
        match conn.recv().await {
            Ok(chunk) => received += chunk.len(),
            Err(ConnError::Eof) => break,
            Err(err) => return Err(err.into()),
        }
    }
    conn.close().await?;
    log::info!("Received {received} bytes; connection {}", conn.state());
    Ok(())
}

async fn send_file(server: &str, file: &Path, config: Config) -> Result<()> {
    let data = tokio::fs::read(file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;
    log::info!(
        "Sending {} ({} bytes) to {server} with {} loss, {} variant",
        file.display(),
        data.len(),
        config.loss_probability,
        config.variant
    );

    let conn = Connection::open(server, config).await?;
    conn.send(&data).await?;
    conn.close().await?;

    let stats = conn.stats();
    println!("File sent: {} bytes", data.len());
    println!("Packet loss statistics: {stats}");
    Ok(())
}
