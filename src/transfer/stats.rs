//! Transfer statistics.
//!
//! Observational only: nothing in the pipeline branches on these numbers.

use crate::transfer::channel::{Delta, DeltaOp, EntryKind, FileInfo};
use serde::Serialize;

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct TransferStats {
    /// Regular files walked
    pub files: u64,

    /// Directories walked (including the source root)
    pub directories: u64,

    /// Symlinks walked
    pub symlinks: u64,

    /// Total bytes of regular files under the source root
    pub source_size: u64,

    /// Literal bytes carried by copy deltas
    pub bytes_sent: u64,

    /// Bytes the destination already had
    pub bytes_same: u64,

    /// Packets the destination asked the source to resend
    pub packets_resent_by_source: u64,

    /// Packets the source asked the destination to resend
    pub packets_resent_by_destination: u64,

    /// Status round-trips over the control connection
    pub status_exchanges: u64,
}

impl TransferStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_file_info(&mut self, fi: &FileInfo) {
        match fi.kind {
            EntryKind::Directory => self.directories += 1,
            EntryKind::Symlink => self.symlinks += 1,
            EntryKind::File => {
                self.files += 1;
                self.source_size += fi.size;
            }
        }
    }

    pub fn record_delta(&mut self, delta: &Delta) {
        match &delta.op {
            DeltaOp::Copy(content) => self.bytes_sent += content.len() as u64,
            DeltaOp::NoOp { len } => self.bytes_same += *len as u64,
            DeltaOp::Eof { .. } => {}
        }
    }
}
