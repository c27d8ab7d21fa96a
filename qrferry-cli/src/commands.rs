//! Filesystem side of send / resend / receive: payloads in and out of directories.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use qrferry_core::{
    decode_message, encode_message, protocol::JSON_START, ChunkSet, EcLevel, FileDigest, Message,
    OutboundFrame, ReceiverSession, ReceiverState, ScanEvent, SenderSession, TransferConfig,
    TransmissionMode, DIGEST_LEN,
};
use tracing::{info, warn};

use crate::config::Config;

pub const INFO_FILE: &str = "info.json";

/// Config values with command-line overrides applied.
pub fn transfer_config(
    cfg: &Config,
    chunk_size: Option<usize>,
    level: Option<EcLevel>,
) -> TransferConfig {
    let mut t = cfg.transfer();
    if let Some(n) = chunk_size {
        t.chunk_size = n;
    }
    if let Some(l) = level {
        t.error_correction = l;
    }
    t
}

pub fn frame_file_name(index: u64) -> String {
    format!("frame-{index:06}.bin")
}

async fn write_frames(out: &Path, frames: &[&OutboundFrame]) -> anyhow::Result<()> {
    for f in frames {
        let p = out.join(frame_file_name(f.index));
        tokio::fs::write(&p, &f.bytes)
            .await
            .with_context(|| format!("writing {}", p.display()))?;
    }
    Ok(())
}

async fn open_sender(file: &Path, transfer: &TransferConfig) -> anyhow::Result<SenderSession> {
    let tx = SenderSession::open(file, transfer)
        .await
        .with_context(|| format!("reading {}", file.display()))?;
    report_chunking(tx.chunks(), transfer);
    Ok(tx)
}

fn report_chunking(set: &ChunkSet, transfer: &TransferConfig) {
    if set.adjusted {
        warn!(
            "chunk size {} does not fit level {}; using {}",
            transfer.chunk_size, transfer.error_correction, set.chunk_size
        );
    }
}

/// Write the announcement and every frame.
pub async fn send(file: &Path, out: &Path, transfer: &TransferConfig) -> anyhow::Result<()> {
    let tx = open_sender(file, transfer).await?;
    tokio::fs::create_dir_all(out)
        .await
        .with_context(|| format!("creating {}", out.display()))?;
    let info_path = out.join(INFO_FILE);
    tokio::fs::write(&info_path, tx.announcement_json()?)
        .await
        .with_context(|| format!("writing {}", info_path.display()))?;
    let frames = tx.frames(&[], TransmissionMode::All);
    write_frames(out, &frames).await?;
    let d = tx.descriptor();
    info!(
        "{}: {} bytes, {} frames of {} bytes (level {}), hash {}",
        d.name,
        d.size,
        d.total_chunks,
        tx.chunks().chunk_size,
        transfer.error_correction,
        d.hash
    );
    println!("{}", out.display());
    Ok(())
}

/// Write the frames a recovery payload asks for.
pub async fn resend(
    file: &Path,
    recovery: &Path,
    out: &Path,
    transfer: &TransferConfig,
) -> anyhow::Result<()> {
    let tx = open_sender(file, transfer).await?;
    let scanned = tokio::fs::read(recovery)
        .await
        .with_context(|| format!("reading {}", recovery.display()))?;
    let frames = tx
        .on_scanned(&scanned)
        .with_context(|| format!("answering {}", recovery.display()))?;
    tokio::fs::create_dir_all(out)
        .await
        .with_context(|| format!("creating {}", out.display()))?;
    write_frames(out, &frames).await?;
    info!(
        "resending {} of {} frames",
        frames.len(),
        tx.descriptor().total_chunks
    );
    println!("{}", out.display());
    Ok(())
}

/// Scanned payloads in name order. The announcement may be anywhere: JSON files go first.
async fn scanned_payloads(dir: &Path) -> anyhow::Result<Vec<(PathBuf, Vec<u8>)>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("listing {}", dir.display()))?;
    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            paths.push(entry.path());
        }
    }
    paths.sort();
    let mut out = Vec::with_capacity(paths.len());
    for p in paths {
        let bytes = tokio::fs::read(&p)
            .await
            .with_context(|| format!("reading {}", p.display()))?;
        out.push((p, bytes));
    }
    out.sort_by_key(|(_, b)| decode_message(b).is_err());
    Ok(out)
}

/// Name to write a received file under: the last component of the announced name.
pub fn output_name(announced: &str) -> String {
    Path::new(announced)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "received.bin".to_string())
}

/// Feed every scanned payload; write the file or a recovery payload.
pub async fn receive(scans: &Path, out: &Path, recovery: &Path) -> anyhow::Result<()> {
    let mut rx = ReceiverSession::new();
    let mut completed = None;
    for (path, bytes) in scanned_payloads(scans).await? {
        match rx.on_scanned(&bytes) {
            Ok(ScanEvent::Completed(file)) => completed = Some(file),
            Ok(_) => {}
            Err(e) if e.is_fatal() => {
                return Err(e).with_context(|| format!("while scanning {}", path.display()));
            }
            Err(e) => warn!("skipping {}: {}", path.display(), e),
        }
    }

    tokio::fs::create_dir_all(out)
        .await
        .with_context(|| format!("creating {}", out.display()))?;
    if let Some(file) = completed {
        let target = out.join(output_name(&file.descriptor.name));
        tokio::fs::write(&target, &file.data)
            .await
            .with_context(|| format!("writing {}", target.display()))?;
        if let Some(stats) = rx.stats() {
            info!(
                "received {} ({} frames, {} duplicates, {} rejected)",
                file.descriptor.name, stats.count, stats.duplicates, stats.errors
            );
        }
        println!("{}", target.display());
        return Ok(());
    }

    if rx.state() == ReceiverState::Idle {
        bail!("no file announcement found in {}", scans.display());
    }
    let req = match rx.recovery_request() {
        Some(req) => req,
        None => bail!("no transfer in progress"),
    };
    let missing = req.missing_chunks.len();
    tokio::fs::write(recovery, encode_message(&Message::Recovery(req))?)
        .await
        .with_context(|| format!("writing {}", recovery.display()))?;
    warn!(
        "{} chunks missing ({:.1}% received); recovery payload written",
        missing,
        rx.progress_percent()
    );
    println!("{}", recovery.display());
    Ok(())
}

/// One-line description of a scanned payload.
pub fn describe(bytes: &[u8]) -> String {
    if bytes.first() == Some(&JSON_START) {
        if let Ok(msg) = decode_message(bytes) {
            return match msg {
                Message::FileInfo(info) => format!(
                    "file info: {} ({} bytes, {} chunks of {}), hash {}",
                    info.file_name,
                    info.file_size,
                    info.total_chunks,
                    info.chunk_size,
                    info.file_hash
                ),
                Message::Recovery(req) => format!(
                    "recovery for {}: {} missing {:?}",
                    req.file_hash,
                    req.missing_chunks.len(),
                    req.missing_chunks
                ),
            };
        }
    }
    match FileDigest::from_prefix(bytes) {
        Some(d) => format!(
            "frame for {}: {} bytes after the digest (index + payload)",
            d,
            bytes.len() - DIGEST_LEN
        ),
        None => format!("unrecognized payload of {} bytes", bytes.len()),
    }
}

pub async fn inspect(payload: &Path) -> anyhow::Result<()> {
    let bytes = tokio::fs::read(payload)
        .await
        .with_context(|| format!("reading {}", payload.display()))?;
    println!("{}", describe(&bytes));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run<F: std::future::Future<Output = anyhow::Result<()>>>(f: F) -> anyhow::Result<()> {
        tokio::runtime::Runtime::new().unwrap().block_on(f)
    }

    fn small_chunks() -> TransferConfig {
        TransferConfig {
            chunk_size: 64,
            error_correction: EcLevel::M,
        }
    }

    #[test]
    fn send_lost_frames_then_resend() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("report.pdf");
        let data: Vec<u8> = (0..1000u32).map(|i| (i * 31 % 256) as u8).collect();
        std::fs::write(&src, &data).unwrap();

        let frames_dir = dir.path().join("frames");
        run(send(&src, &frames_dir, &small_chunks())).unwrap();
        assert!(frames_dir.join(INFO_FILE).exists());
        assert!(frames_dir.join(frame_file_name(15)).exists());
        assert!(!frames_dir.join(frame_file_name(16)).exists());

        // Lose two frames in transit.
        std::fs::remove_file(frames_dir.join(frame_file_name(3))).unwrap();
        std::fs::remove_file(frames_dir.join(frame_file_name(9))).unwrap();

        let recv_dir = dir.path().join("recv");
        let recovery = recv_dir.join("recovery.json");
        run(receive(&frames_dir, &recv_dir, &recovery)).unwrap();
        assert!(!recv_dir.join("report.pdf").exists());
        let req = std::fs::read_to_string(&recovery).unwrap();
        assert!(req.contains(r#""missingChunks":[3,9]"#));

        let resend_dir = dir.path().join("resend");
        run(resend(&src, &recovery, &resend_dir, &small_chunks())).unwrap();
        let mut names: Vec<String> = std::fs::read_dir(&resend_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec![frame_file_name(3), frame_file_name(9)]);

        for n in &names {
            std::fs::copy(resend_dir.join(n), frames_dir.join(n)).unwrap();
        }
        run(receive(&frames_dir, &recv_dir, &recovery)).unwrap();
        assert_eq!(std::fs::read(recv_dir.join("report.pdf")).unwrap(), data);
    }

    #[test]
    fn receive_without_announcement_fails() {
        let dir = tempfile::tempdir().unwrap();
        let scans = dir.path().join("scans");
        std::fs::create_dir_all(&scans).unwrap();
        std::fs::write(scans.join("frame-000000.bin"), [1u8; 30]).unwrap();
        let out = dir.path().join("out");
        assert!(run(receive(&scans, &out, &out.join("r.json"))).is_err());
    }

    #[test]
    fn transfer_config_overrides() {
        let cfg = Config::default();
        let t = transfer_config(&cfg, Some(10), None);
        assert_eq!(t.chunk_size, 10);
        assert_eq!(t.error_correction, EcLevel::M);
        let t = transfer_config(&cfg, None, Some(EcLevel::L));
        assert_eq!(t.chunk_size, 1024);
        assert_eq!(t.error_correction, EcLevel::L);
    }

    #[test]
    fn output_name_strips_directories() {
        assert_eq!(output_name("../../etc/passwd"), "passwd");
        assert_eq!(output_name("photo.jpg"), "photo.jpg");
        assert_eq!(output_name(""), "received.bin");
    }

    #[test]
    fn describe_payloads() {
        let set = qrferry_core::split_with_size("a.txt", b"hello", 2).unwrap();
        let info = encode_message(&set.announcement()).unwrap();
        assert!(describe(info.as_bytes()).starts_with("file info: a.txt"));
        assert!(describe(&set.frames[0].bytes).starts_with("frame for"));
        assert!(describe(b"short").starts_with("unrecognized"));
    }
}
