//! Patcher stage: apply deltas to destination files.
//!
//! Runs on the destination. Its successful completion is the event that
//! ends a transfer.

use crate::error::{IoResultExt, Result, SyncError};
use crate::transfer::channel::{Delta, DeltaOp};
use crate::transfer::manager::Manager;
use filetime::FileTime;
use std::collections::HashMap;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};

/// Apply every delta, then signal patch done unless the transfer failed.
pub async fn patch<M: Manager + ?Sized>(manager: &M) {
    match apply_all(manager).await {
        Ok(files) if !manager.is_failed() => {
            tracing::debug!("Patched {} files", files);
            manager.patch_done();
        }
        Ok(_) => {}
        Err(e) => manager.report_error(e),
    }
}

async fn apply_all<M: Manager + ?Sized>(manager: &M) -> Result<u64> {
    let mut rx = manager
        .delta_channel()
        .ok_or(SyncError::QueueClosed("delta"))?;

    let mut open: HashMap<PathBuf, File> = HashMap::new();
    let mut files = 0u64;

    while let Some(delta) = rx.recv().await {
        let Delta { path, offset, op } = delta;
        match op {
            DeltaOp::NoOp { .. } => {}
            DeltaOp::Copy(content) => {
                if !open.contains_key(&path) {
                    let file = open_for_patch(&path).await?;
                    open.insert(path.clone(), file);
                }
                if let Some(file) = open.get_mut(&path) {
                    file.seek(SeekFrom::Start(offset)).await.with_path(&path)?;
                    file.write_all(&content).await.with_path(&path)?;
                }
            }
            DeltaOp::Eof { mode, mtime } => {
                let mut file = match open.remove(&path) {
                    Some(file) => file,
                    None => open_for_patch(&path).await?,
                };
                file.flush().await.with_path(&path)?;
                file.set_len(offset).await.with_path(&path)?;
                file.sync_all().await.with_path(&path)?;
                drop(file);

                apply_metadata(&path, mode, mtime).await;
                files += 1;
            }
        }
    }

    Ok(files)
}

async fn open_for_patch(path: &Path) -> Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open(path)
        .await
        .with_path(path)
}

/// Apply the source's permission bits and mtime. Failures are logged, not
/// fatal: the content is already in place.
async fn apply_metadata(path: &Path, mode: u32, mtime: SystemTime) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(mode);
        if let Err(e) = tokio::fs::set_permissions(path, perms).await {
            tracing::warn!("Failed to set mode {:o} on {}: {}", mode, path.display(), e);
        }
    }
    #[cfg(not(unix))]
    let _ = mode;

    let target = path.to_path_buf();
    let result = tokio::task::spawn_blocking(move || {
        filetime::set_file_mtime(&target, FileTime::from_system_time(mtime))
    })
    .await;

    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!("Failed to set mtime on {}: {}", path.display(), e),
        Err(e) => tracing::warn!("Failed to set mtime on {}: {}", path.display(), e),
    }
}
