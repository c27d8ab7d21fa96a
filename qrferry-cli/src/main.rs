// qrferry: send and receive files as QR frame payloads on disk.
// Rendering the payloads as QR codes and scanning them back is left to external tools.

mod commands;
mod config;

use clap::{Parser, Subcommand};
use qrferry_core::EcLevel;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Air-gapped file transfer over QR codes", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Split a file into frames: writes info.json and one frame-NNNNNN.bin per chunk
    Send {
        file: PathBuf,
        /// output directory for the payloads
        #[arg(long)]
        out: PathBuf,
        /// payload bytes per frame (clamped to the QR capacity)
        #[arg(long)]
        chunk_size: Option<usize>,
        /// error-correction level: L, M, Q or H
        #[arg(long)]
        level: Option<EcLevel>,
    },
    /// Write only the frames a recovery payload asks for. Use the same chunk size and level as `send`.
    Resend {
        file: PathBuf,
        /// scanned recovery payload (JSON)
        #[arg(long)]
        recovery: PathBuf,
        #[arg(long)]
        out: PathBuf,
        #[arg(long)]
        chunk_size: Option<usize>,
        #[arg(long)]
        level: Option<EcLevel>,
    },
    /// Rebuild a file from a directory of scanned payloads (announcement + frames, any order)
    Receive {
        scans: PathBuf,
        /// directory the received file is written to
        #[arg(long)]
        out: PathBuf,
        /// where to write the recovery payload if chunks are missing (default: <out>/recovery.json)
        #[arg(long)]
        recovery: Option<PathBuf>,
    },
    /// Describe one scanned payload
    Inspect { payload: PathBuf },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cfg.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        match cli.command {
            Commands::Send {
                file,
                out,
                chunk_size,
                level,
            } => {
                let transfer = commands::transfer_config(&cfg, chunk_size, level);
                commands::send(&file, &out, &transfer).await
            }
            Commands::Resend {
                file,
                recovery,
                out,
                chunk_size,
                level,
            } => {
                let transfer = commands::transfer_config(&cfg, chunk_size, level);
                commands::resend(&file, &recovery, &out, &transfer).await
            }
            Commands::Receive {
                scans,
                out,
                recovery,
            } => {
                let recovery = recovery.unwrap_or_else(|| out.join("recovery.json"));
                commands::receive(&scans, &out, &recovery).await
            }
            Commands::Inspect { payload } => commands::inspect(&payload).await,
        }
    })
}
