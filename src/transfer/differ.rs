//! Differ stage: compare destination checksums against the source.
//!
//! Runs on the source. Blocks are compared at fixed offsets: a block either
//! matches the destination block at the same offset or is copied whole.

use crate::error::{IoResultExt, Result, SyncError};
use crate::transfer::channel::{Checksum, Delta};
use crate::transfer::fingerprint::Fingerprint;
use crate::transfer::manager::Manager;
use crate::transfer::read_full;
use std::collections::HashMap;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs::File;
use tokio::io::AsyncSeekExt;

/// Run the differ to completion, then signal deltas done.
pub async fn diff<M: Manager + ?Sized>(manager: &M) {
    match diff_all(manager).await {
        Ok(()) => tracing::debug!("Diff complete"),
        Err(e) => manager.report_error(e),
    }
    manager.delta_done();
}

/// Per-transfer differ state
struct Differ<'a, M: ?Sized> {
    manager: &'a M,
    block_size: usize,
    /// Open source handles, reused across a file's checksums
    open: HashMap<PathBuf, File>,
    /// Offsets at which a source file is known to end
    eof: HashMap<PathBuf, u64>,
}

async fn diff_all<M: Manager + ?Sized>(manager: &M) -> Result<()> {
    let mut rx = manager
        .signature_channel()
        .ok_or(SyncError::QueueClosed("signature"))?;

    let mut differ = Differ {
        manager,
        block_size: manager.request().block_size,
        open: HashMap::new(),
        eof: HashMap::new(),
    };

    while let Some(checksum) = rx.recv().await {
        differ.process(checksum).await?;
    }
    Ok(())
}

impl<'a, M: Manager + ?Sized> Differ<'a, M> {
    async fn process(&mut self, checksum: Checksum) -> Result<()> {
        if let Some(&end) = self.eof.get(&checksum.source_path) {
            if checksum.offset >= end {
                return Ok(());
            }
        }

        if checksum.eof {
            self.copy_tail(&checksum).await
        } else {
            self.compare_block(&checksum).await
        }
    }

    async fn handle(&mut self, path: &Path) -> Result<&mut File> {
        if !self.open.contains_key(path) {
            let file = File::open(path).await.with_path(path)?;
            self.open.insert(path.to_path_buf(), file);
        }
        self.open
            .get_mut(path)
            .ok_or_else(|| SyncError::Protocol(format!("lost handle for {}", path.display())))
    }

    /// The destination ends at `checksum.offset`: copy everything the source
    /// has from there on, then mark the end.
    async fn copy_tail(&mut self, checksum: &Checksum) -> Result<()> {
        let src = &checksum.source_path;
        let dst = &checksum.destination_path;
        let block_size = self.block_size;
        let manager = self.manager;

        if checksum.len > self.block_size {
            return Err(SyncError::Protocol(format!(
                "checksum for {} at offset {} covers {} bytes, block size is {}",
                dst.display(),
                checksum.offset,
                checksum.len,
                self.block_size
            )));
        }

        let file = self.handle(src).await?;
        file.seek(SeekFrom::Start(checksum.offset))
            .await
            .with_path(src)?;

        let mut buf = vec![0u8; block_size];
        let mut offset = checksum.offset;
        loop {
            let n = read_full(file, &mut buf).await.with_path(src)?;
            if n == 0 {
                break;
            }
            manager
                .queue_delta(Delta::copy(dst.clone(), offset, &buf[..n]))
                .await?;
            offset += n as u64;
            if n < block_size {
                break;
            }
        }

        self.finish_file(src, dst, offset).await
    }

    async fn compare_block(&mut self, checksum: &Checksum) -> Result<()> {
        let src = &checksum.source_path;
        let dst = &checksum.destination_path;
        let manager = self.manager;

        let file = self.handle(src).await?;
        file.seek(SeekFrom::Start(checksum.offset))
            .await
            .with_path(src)?;

        let mut buf = vec![0u8; checksum.len];
        let n = read_full(file, &mut buf).await.with_path(src)?;
        let block = &buf[..n];

        let delta = if n != checksum.len {
            (n > 0).then(|| Delta::copy(dst.clone(), checksum.offset, block))
        } else if checksum.fingerprint == Some(Fingerprint::of(block)) {
            Some(Delta::no_op(dst.clone(), checksum.offset, n))
        } else {
            Some(Delta::copy(dst.clone(), checksum.offset, block))
        };
        if let Some(delta) = delta {
            manager.queue_delta(delta).await?;
        }

        // Source ended inside this block
        if n < checksum.len {
            self.finish_file(src, dst, checksum.offset + n as u64).await?;
        }
        Ok(())
    }

    /// Emit the EOF delta carrying the source's mode and mtime, and close
    /// the handle.
    async fn finish_file(&mut self, src: &Path, dst: &Path, end: u64) -> Result<()> {
        let meta = match self.open.remove(src) {
            Some(file) => file.metadata().await,
            None => tokio::fs::metadata(src).await,
        }
        .with_path(src)?;

        let mtime = meta.modified().unwrap_or_else(|_| SystemTime::now());
        self.eof.insert(src.to_path_buf(), end);
        self.manager
            .queue_delta(Delta::eof(dst.to_path_buf(), end, mode_of(&meta), mtime))
            .await
    }
}

#[cfg(unix)]
fn mode_of(meta: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn mode_of(meta: &std::fs::Metadata) -> u32 {
    if meta.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}
