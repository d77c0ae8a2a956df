//! Entry point for `rdt-over-udp`.
//!
//! A small file-transfer tool that exercises the reliability engines over a
//! simulated lossy channel: the client streams one file to the server, which
//! writes it to disk; both ends report throughput.  All protocol work is
//! delegated to library modules; this file owns only argument parsing, file
//! I/O, and logging setup.
//!
//! The transfer itself is trivially framed: an 8-byte little-endian length
//! prelude, then the file content in window-sized messages.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand, ValueEnum};

use rdt_over_udp::connection::{ConnError, StopWaitConnection};
use rdt_over_udp::gbn_connection::GbnConnection;
use rdt_over_udp::packet::PAYLOAD_MAX;
use rdt_over_udp::simulator::ChannelConfig;

/// Reliable file transfer over a simulated unreliable UDP channel.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Probability that the channel drops a packet.
    #[arg(long, default_value_t = 0.0)]
    loss: f64,

    /// Probability that the channel corrupts one byte of a packet.
    #[arg(long, default_value_t = 0.0)]
    corrupt: f64,

    /// Go-Back-N window size (ignored by the stop-and-wait engine).
    #[arg(long, default_value_t = 8)]
    window: usize,

    /// Reliability engine to use.
    #[arg(long, value_enum, default_value_t = Engine::Gbn)]
    engine: Engine,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Clone, Copy, ValueEnum)]
enum Engine {
    /// Stop-and-wait: one packet in flight.
    StopWait,
    /// Go-Back-N: pipelined sliding window.
    Gbn,
}

#[derive(Subcommand)]
enum Mode {
    /// Receive one file from a peer and write it to disk.
    Server {
        /// Local address to bind (e.g. 0.0.0.0:9000).
        #[arg(short, long, default_value = "0.0.0.0:9000")]
        bind: SocketAddr,
        /// Address of the sending peer (needed to address ACKs).
        #[arg(short, long)]
        peer: SocketAddr,
        /// Output file path.
        #[arg(short, long)]
        out: PathBuf,
    },
    /// Send one file to a server.
    Client {
        /// Remote server address (e.g. 127.0.0.1:9000).
        #[arg(short, long)]
        server: SocketAddr,
        /// Local address to bind.
        #[arg(short, long, default_value = "0.0.0.0:0")]
        bind: SocketAddr,
        /// File to transfer.
        #[arg(short, long)]
        file: PathBuf,
    },
}

/// Either reliability engine behind one dispatching surface.
enum Conn {
    StopWait(StopWaitConnection),
    Gbn(GbnConnection),
}

impl Conn {
    async fn bind(
        engine: Engine,
        local: SocketAddr,
        config: ChannelConfig,
        window: usize,
    ) -> Result<Self, ConnError> {
        Ok(match engine {
            Engine::StopWait => Self::StopWait(StopWaitConnection::bind(local, config).await?),
            Engine::Gbn => Self::Gbn(GbnConnection::bind(local, config, window).await?),
        })
    }

    fn set_peer(&mut self, addr: SocketAddr) {
        match self {
            Self::StopWait(c) => c.set_peer(addr),
            Self::Gbn(c) => c.set_peer(addr),
        }
    }

    /// Largest message one `send` call moves without truncation.
    fn message_max(&self, window: usize) -> usize {
        match self {
            Self::StopWait(_) => PAYLOAD_MAX,
            Self::Gbn(_) => PAYLOAD_MAX * window,
        }
    }

    async fn send(&mut self, message: &[u8]) -> Result<usize, ConnError> {
        match self {
            Self::StopWait(c) => c.send(message).await,
            Self::Gbn(c) => c.send(message).await,
        }
    }

    async fn recv(&mut self, max_len: usize) -> Result<Vec<u8>, ConnError> {
        match self {
            Self::StopWait(c) => c.recv(max_len).await,
            Self::Gbn(c) => c.recv(max_len).await,
        }
    }

    async fn close(self) -> Result<(), ConnError> {
        match self {
            Self::StopWait(c) => c.close().await,
            Self::Gbn(c) => c.close().await,
        }
    }
}

#[tokio::main]
async fn main() {
    // Initialise env_logger; set RUST_LOG=debug to watch the protocol talk.
    env_logger::init();

    let cli = Cli::parse();
    let config = ChannelConfig::new(cli.loss, cli.corrupt);

    let result = match cli.mode {
        Mode::Server { bind, peer, out } => {
            run_server(cli.engine, bind, peer, out, config, cli.window).await
        }
        Mode::Client { server, bind, file } => {
            run_client(cli.engine, bind, server, file, config, cli.window).await
        }
    };

    if let Err(e) = result {
        log::error!("transfer failed: {e}");
        std::process::exit(1);
    }
}

async fn run_client(
    engine: Engine,
    bind: SocketAddr,
    server: SocketAddr,
    file: PathBuf,
    config: ChannelConfig,
    window: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let content = tokio::fs::read(&file).await?;
    log::info!("sending {} ({} bytes) to {server}", file.display(), content.len());

    let mut conn = Conn::bind(engine, bind, config, window).await?;
    conn.set_peer(server);

    let started = Instant::now();

    // Length prelude, then the content in engine-sized messages.
    conn.send(&(content.len() as u64).to_le_bytes()).await?;
    for chunk in content.chunks(conn.message_max(window)) {
        conn.send(chunk).await?;
    }

    let elapsed = started.elapsed();
    report("sent", content.len(), elapsed);
    conn.close().await?;
    Ok(())
}

async fn run_server(
    engine: Engine,
    bind: SocketAddr,
    peer: SocketAddr,
    out: PathBuf,
    config: ChannelConfig,
    window: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut conn = Conn::bind(engine, bind, config, window).await?;
    conn.set_peer(peer);
    log::info!("waiting for a transfer from {peer}");

    let prelude = conn.recv(PAYLOAD_MAX).await?;
    if prelude.len() != 8 {
        return Err(format!("bad length prelude: {} byte(s)", prelude.len()).into());
    }
    let total = u64::from_le_bytes(prelude.as_slice().try_into()?) as usize;
    log::info!("expecting {total} byte(s)");

    let started = Instant::now();
    let mut content = Vec::with_capacity(total);
    while content.len() < total {
        let unit = conn.recv(PAYLOAD_MAX).await?;
        content.extend_from_slice(&unit);
    }

    let elapsed = started.elapsed();
    tokio::fs::write(&out, &content).await?;
    report("received", content.len(), elapsed);
    conn.close().await?;
    Ok(())
}

fn report(verb: &str, bytes: usize, elapsed: std::time::Duration) {
    let secs = elapsed.as_secs_f64().max(f64::EPSILON);
    println!(
        "{verb} {bytes} bytes in {:.3} s ({:.1} KiB/s)",
        elapsed.as_secs_f64(),
        bytes as f64 / 1024.0 / secs
    );
}
