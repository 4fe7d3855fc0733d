//! Message and queue types for the transfer pipeline.
//!
//! Four-stage pipeline: Walker -> Signer -> Differ -> Patcher
//! Stages are connected by bounded queues for backpressure. Closing a queue
//! is the only signal its consumer gets that no more messages are coming.

use crate::error::{Result, SyncError};
use crate::transfer::fingerprint::Fingerprint;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;
use tokio::sync::mpsc;

// =============================================================================
// FileInfo: Walker -> Signer
// =============================================================================

/// Kind of filesystem entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
}

/// One filesystem entry under the source root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub kind: EntryKind,

    /// Permission bits
    pub mode: u32,

    /// Size in bytes
    pub size: u64,

    /// Modification time
    pub mtime: SystemTime,

    /// Symlink target, for symlinks only
    pub target: Option<PathBuf>,

    /// Absolute path under the source root
    pub source_path: PathBuf,

    /// Absolute path under the destination root
    pub destination_path: PathBuf,
}

impl FileInfo {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    pub fn is_symlink(&self) -> bool {
        self.kind == EntryKind::Symlink
    }
}

// =============================================================================
// Checksum: Signer -> Differ
// =============================================================================

/// Fingerprint of one destination block, or the end-of-file marker.
///
/// An EOF record with no blocks before it means the destination file does
/// not exist. An EOF record after blocks means the destination ends at
/// `offset` and anything the source has past it must be copied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checksum {
    pub source_path: PathBuf,
    pub destination_path: PathBuf,

    /// Block length in bytes (0 for EOF)
    pub len: usize,

    /// Byte offset of the block
    pub offset: u64,

    /// Block fingerprint, absent on EOF records
    pub fingerprint: Option<Fingerprint>,

    pub eof: bool,
}

impl Checksum {
    pub fn block(
        source_path: PathBuf,
        destination_path: PathBuf,
        offset: u64,
        block: &[u8],
    ) -> Self {
        Self {
            source_path,
            destination_path,
            len: block.len(),
            offset,
            fingerprint: Some(Fingerprint::of(block)),
            eof: false,
        }
    }

    pub fn eof(source_path: PathBuf, destination_path: PathBuf, offset: u64) -> Self {
        Self {
            source_path,
            destination_path,
            len: 0,
            offset,
            fingerprint: None,
            eof: true,
        }
    }
}

// =============================================================================
// Delta: Differ -> Patcher
// =============================================================================

/// What the patcher does at a delta's offset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeltaOp {
    /// Write these bytes
    Copy(Vec<u8>),

    /// Destination block already matches
    NoOp { len: usize },

    /// Truncate the file here, then apply the source's mode and mtime
    Eof { mode: u32, mtime: SystemTime },
}

/// One edit instruction for a destination file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delta {
    pub path: PathBuf,
    pub offset: u64,
    pub op: DeltaOp,
}

impl Delta {
    pub fn copy(path: PathBuf, offset: u64, content: &[u8]) -> Self {
        Self {
            path,
            offset,
            op: DeltaOp::Copy(content.to_vec()),
        }
    }

    pub fn no_op(path: PathBuf, offset: u64, len: usize) -> Self {
        Self {
            path,
            offset,
            op: DeltaOp::NoOp { len },
        }
    }

    pub fn eof(path: PathBuf, offset: u64, mode: u32, mtime: SystemTime) -> Self {
        Self {
            path,
            offset,
            op: DeltaOp::Eof { mode, mtime },
        }
    }

    /// Number of bytes of the destination this delta covers
    pub fn len(&self) -> usize {
        match &self.op {
            DeltaOp::Copy(content) => content.len(),
            DeltaOp::NoOp { len } => *len,
            DeltaOp::Eof { .. } => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_copy(&self) -> bool {
        matches!(self.op, DeltaOp::Copy(_))
    }

    pub fn is_eof(&self) -> bool {
        matches!(self.op, DeltaOp::Eof { .. })
    }
}

// =============================================================================
// Queue
// =============================================================================

/// Lock a std mutex, ignoring poisoning (the guarded state stays consistent
/// because no critical section in this crate can panic halfway).
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A bounded pipeline queue owned by a manager.
///
/// The consumer takes the receiving end once; `close` drops the sending end
/// so the consumer sees the end of the stream after draining.
pub struct Queue<T> {
    name: &'static str,
    tx: Mutex<Option<mpsc::Sender<T>>>,
    rx: Mutex<Option<mpsc::Receiver<T>>>,
}

impl<T: Send> Queue<T> {
    pub fn new(name: &'static str, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            name,
            tx: Mutex::new(Some(tx)),
            rx: Mutex::new(Some(rx)),
        }
    }

    /// Push an item, waiting for space if the queue is full.
    pub async fn push(&self, item: T) -> Result<()> {
        let tx = lock(&self.tx).clone();
        match tx {
            Some(tx) => tx
                .send(item)
                .await
                .map_err(|_| SyncError::QueueClosed(self.name)),
            None => Err(SyncError::QueueClosed(self.name)),
        }
    }

    pub fn close(&self) {
        lock(&self.tx).take();
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.tx).is_none()
    }

    /// Take the consumer end. Only the first call gets it.
    pub fn take_receiver(&self) -> Option<mpsc::Receiver<T>> {
        lock(&self.rx).take()
    }
}

// =============================================================================
// Tests
// =============================================================================
