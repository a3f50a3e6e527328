//! Entry point for `serial-arq`.
//!
//! Parses CLI arguments and runs either the **send** (initiator) or
//! **receive** (responder) side of a file transfer over a serial device.
//! All protocol work is delegated to the library; `main.rs` owns only
//! process setup (logging, argument parsing, opening files).

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use serial_arq::{Link, LinkConfig, LinkError, Role};

/// Stop-and-wait ARQ link over a serial line.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,

    #[command(flatten)]
    link: LinkArgs,
}

#[derive(Args)]
struct LinkArgs {
    /// Milliseconds to wait for the peer after each transmission.
    #[arg(long, global = true, default_value_t = 3000)]
    timeout_ms: u64,

    /// Transmissions per frame before giving up.
    #[arg(long, global = true, default_value_t = 3)]
    max_attempts: u32,

    /// Maximum payload bytes per frame.
    #[arg(long, global = true, default_value_t = 256)]
    max_payload: usize,
}

impl LinkArgs {
    fn config(&self) -> LinkConfig {
        LinkConfig::new()
            .with_timeout(Duration::from_millis(self.timeout_ms))
            .with_max_attempts(self.max_attempts)
            .with_max_payload(self.max_payload)
    }
}

#[derive(Subcommand)]
enum Mode {
    /// Connect as initiator and send a file.
    Send {
        /// Serial device (e.g. /dev/ttyS0).
        #[arg(short, long)]
        device: PathBuf,
        /// File to transmit.
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Wait as responder and write received data to a file.
    Receive {
        /// Serial device (e.g. /dev/ttyS1).
        #[arg(short, long)]
        device: PathBuf,
        /// Destination file.
        #[arg(short, long)]
        out: PathBuf,
    },
}

async fn open_device(path: &Path) -> Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .await
        .with_context(|| format!("opening {}", path.display()))
}

async fn run_send(device: PathBuf, file: PathBuf, config: LinkConfig) -> Result<()> {
    let mut input = File::open(&file)
        .await
        .with_context(|| format!("opening {}", file.display()))?;
    let port = open_device(&device).await?;

    let mut link = Link::connect(port, Role::Initiator, config).await?;
    log::info!("link established on {}", device.display());

    let mut chunk = vec![0u8; config.max_payload];
    let mut total = 0usize;
    loop {
        let n = input.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        match link.send(&chunk[..n]).await {
            Ok(sent) => total += sent,
            Err(e) => {
                // A failed link still owes the peer a DISC.
                if let Err(close) = link.disconnect().await {
                    log::warn!("{close}");
                }
                return Err(e.into());
            }
        }
    }
    log::info!("sent {total} bytes in {} frame(s)", link.stats().frames_sent);

    if let Err(e) = link.disconnect().await {
        log::warn!("{e}");
    }
    Ok(())
}

async fn run_receive(device: PathBuf, out: PathBuf, config: LinkConfig) -> Result<()> {
    let port = open_device(&device).await?;
    let mut output = File::create(&out)
        .await
        .with_context(|| format!("creating {}", out.display()))?;

    let mut link = Link::connect(port, Role::Responder, config).await?;
    log::info!("link established on {}", device.display());

    let mut buf = vec![0u8; config.max_payload];
    let mut total = 0usize;
    loop {
        match link.receive(&mut buf).await {
            Ok(n) => {
                output.write_all(&buf[..n]).await?;
                total += n;
            }
            Err(LinkError::PeerDisconnected) => break,
            Err(e) if !e.is_fatal() => log::warn!("{e}"),
            Err(e) => return Err(e.into()),
        }
    }
    output.flush().await?;
    log::info!("received {total} bytes into {}", out.display());

    if let Err(e) = link.disconnect().await {
        log::warn!("{e}");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();
    let config = cli.link.config();

    match cli.mode {
        Mode::Send { device, file } => run_send(device, file, config).await,
        Mode::Receive { device, out } => run_receive(device, out, config).await,
    }
}
