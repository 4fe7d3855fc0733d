//! Signer stage: describe what the destination already has.
//!
//! Runs on the destination. Directories and symlinks are created here; for
//! regular files one checksum per block is emitted, followed by an EOF
//! record at the file's end.

use crate::error::{IoResultExt, Result, SyncError};
use crate::transfer::channel::{Checksum, EntryKind, FileInfo};
use crate::transfer::manager::Manager;
use crate::transfer::read_full;
use std::io::ErrorKind;
use std::path::Path;
use tokio::fs::File;

/// Run the signer to completion, then signal signatures done.
pub async fn sign<M: Manager + ?Sized>(manager: &M) {
    match sign_all(manager).await {
        Ok(files) => tracing::debug!("Signed {} files", files),
        Err(e) => manager.report_error(e),
    }
    manager.signature_done();
}

async fn sign_all<M: Manager + ?Sized>(manager: &M) -> Result<u64> {
    let mut rx = manager
        .file_info_channel()
        .ok_or(SyncError::QueueClosed("file info"))?;
    let block_size = manager.request().block_size;

    let mut files = 0u64;
    while let Some(info) = rx.recv().await {
        match info.kind {
            EntryKind::Directory => create_dir(&info).await?,
            EntryKind::Symlink => create_symlink(&info).await?,
            EntryKind::File => {
                sign_file(manager, &info, block_size).await?;
                files += 1;
            }
        }
    }
    Ok(files)
}

async fn create_dir(info: &FileInfo) -> Result<()> {
    let path = &info.destination_path;
    let mut builder = tokio::fs::DirBuilder::new();
    #[cfg(unix)]
    builder.mode(info.mode);

    match builder.create(path).await {
        Ok(()) => {
            tracing::trace!("Created directory {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(e).with_path(path),
    }
}

async fn create_symlink(info: &FileInfo) -> Result<()> {
    let path = &info.destination_path;
    let target = info.target.as_deref().ok_or_else(|| {
        SyncError::Protocol(format!("symlink {} has no target", info.source_path.display()))
    })?;

    match tokio::fs::read_link(path).await {
        Ok(existing) if existing == target => return Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        // Stale link or some other entry in the way
        _ => tokio::fs::remove_file(path).await.with_path(path)?,
    }

    symlink(target, path).await.with_path(path)
}

#[cfg(unix)]
async fn symlink(target: &Path, path: &Path) -> std::io::Result<()> {
    tokio::fs::symlink(target, path).await
}

#[cfg(windows)]
async fn symlink(target: &Path, path: &Path) -> std::io::Result<()> {
    tokio::fs::symlink_file(target, path).await
}

async fn sign_file<M: Manager + ?Sized>(
    manager: &M,
    info: &FileInfo,
    block_size: usize,
) -> Result<()> {
    let src = &info.source_path;
    let dst = &info.destination_path;

    let mut file = match File::open(dst).await {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return manager
                .queue_signature(Checksum::eof(src.clone(), dst.clone(), 0))
                .await;
        }
        Err(e) => return Err(e).with_path(dst),
    };

    let mut buf = vec![0u8; block_size];
    let mut offset = 0u64;
    loop {
        let n = read_full(&mut file, &mut buf).await.with_path(dst)?;
        if n == 0 {
            break;
        }
        manager
            .queue_signature(Checksum::block(src.clone(), dst.clone(), offset, &buf[..n]))
            .await?;
        offset += n as u64;
        if n < block_size {
            break;
        }
    }

    manager
        .queue_signature(Checksum::eof(src.clone(), dst.clone(), offset))
        .await
}
