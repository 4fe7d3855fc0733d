//! Walker stage: enumerate the source tree.
//!
//! Pre-order, depth-first, entries sorted by file name within a directory.
//! The root itself is the first entry. Hidden files are included and no
//! ignore files are consulted.

use crate::error::{IoResultExt, Result, SyncError};
use crate::transfer::channel::{EntryKind, FileInfo};
use crate::transfer::manager::Manager;
use ignore::{DirEntry, WalkBuilder};
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

/// Entries buffered between the blocking walk and the pipeline
const WALK_BUFFER: usize = 64;

/// Run the walker to completion, then signal file-info done.
pub async fn walk<M: Manager + ?Sized>(manager: &M) {
    match walk_tree(manager).await {
        Ok(count) => tracing::debug!("Walked {} entries", count),
        Err(e) => manager.report_error(e),
    }
    manager.file_info_done();
}

async fn walk_tree<M: Manager + ?Sized>(manager: &M) -> Result<u64> {
    let request = manager.request();
    let root = request.source.clone();
    let destination = request.destination.clone();
    let follow_links = request.follow_links;

    let (tx, mut rx) = mpsc::channel::<Result<FileInfo>>(WALK_BUFFER);

    // WalkBuilder is synchronous; stream entries out of a blocking thread
    let handle = tokio::task::spawn_blocking(move || {
        let walker = WalkBuilder::new(&root)
            .standard_filters(false)
            .follow_links(follow_links)
            .sort_by_file_name(|a, b| a.cmp(b))
            .build();

        for entry in walker {
            let item = entry
                .map_err(SyncError::from)
                .and_then(|entry| file_info(&root, &destination, &entry));
            let failed = item.is_err();
            if tx.blocking_send(item).is_err() || failed {
                break;
            }
        }
    });

    let mut count = 0u64;
    while let Some(item) = rx.recv().await {
        manager.queue_file_info(item?).await?;
        count += 1;
    }
    handle.await?;

    Ok(count)
}

fn file_info(root: &Path, destination: &Path, entry: &DirEntry) -> Result<FileInfo> {
    let path = entry.path();
    let meta = entry.metadata()?;
    let file_type = meta.file_type();

    let kind = if file_type.is_dir() {
        EntryKind::Directory
    } else if file_type.is_symlink() {
        EntryKind::Symlink
    } else {
        EntryKind::File
    };

    let target = match kind {
        EntryKind::Symlink => Some(std::fs::read_link(path).with_path(path)?),
        _ => None,
    };

    Ok(FileInfo {
        kind,
        mode: permission_bits(&meta, kind),
        size: meta.len(),
        mtime: meta.modified().with_path(path)?,
        target,
        source_path: path.to_path_buf(),
        destination_path: destination_path(root, destination, path)?,
    })
}

/// Map a path under the source root to the same relative path under the
/// destination root. The root itself maps to the destination root.
pub fn destination_path(root: &Path, destination: &Path, path: &Path) -> Result<PathBuf> {
    let rel = path.strip_prefix(root).map_err(|_| {
        SyncError::InvalidRequest(format!(
            "{} is outside the source root {}",
            path.display(),
            root.display()
        ))
    })?;

    if rel.as_os_str().is_empty() {
        Ok(destination.to_path_buf())
    } else {
        Ok(destination.join(rel))
    }
}

#[cfg(unix)]
fn permission_bits(meta: &Metadata, _kind: EntryKind) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn permission_bits(meta: &Metadata, kind: EntryKind) -> u32 {
    match kind {
        EntryKind::Directory => 0o755,
        _ if meta.permissions().readonly() => 0o444,
        _ => 0o644,
    }
}
