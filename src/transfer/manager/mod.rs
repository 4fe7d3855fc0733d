//! Role managers.
//!
//! A manager owns every queue of one side of a transfer and decides where a
//! stage's output goes: into a local queue, or through the [`Packeter`] to
//! the peer. Stages only ever talk to their manager.
//!
//! ```text
//!                 Local            Source              Destination
//! file info    local queue     -> packets            <- packets, local queue
//! signatures   local queue     <- packets, local     -> packets
//! deltas       local queue     -> packets            <- packets, local queue
//! ```

mod destination;
mod local;
mod source;

pub use destination::DestinationManager;
pub use local::LocalManager;
pub use source::SourceManager;

use crate::error::{Result, SyncError};
use crate::request::Request;
use crate::transfer::channel::{lock, Checksum, Delta, FileInfo};
use crate::transfer::packet::Packeter;
use crate::transfer::stats::TransferStats;
use async_trait::async_trait;
use std::sync::Mutex;
use tokio::sync::{mpsc, watch};

/// Lifecycle of a transfer as seen by one side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Running,
    Done,
    Failed,
}

#[async_trait]
pub trait Manager: Send + Sync {
    fn request(&self) -> &Request;

    async fn queue_file_info(&self, info: FileInfo) -> Result<()>;
    fn file_info_done(&self);
    fn file_info_channel(&self) -> Option<mpsc::Receiver<FileInfo>>;

    async fn queue_signature(&self, checksum: Checksum) -> Result<()>;
    fn signature_done(&self);
    fn signature_channel(&self) -> Option<mpsc::Receiver<Checksum>>;

    async fn queue_delta(&self, delta: Delta) -> Result<()>;
    fn delta_done(&self);
    fn delta_channel(&self) -> Option<mpsc::Receiver<Delta>>;

    /// The patcher applied every delta.
    fn patch_done(&self);

    /// Record a fatal error. The first one wins; every local queue is closed
    /// so all stages unwind.
    fn report_error(&self, err: SyncError);

    fn is_failed(&self) -> bool;
    fn is_done(&self) -> bool;
    fn take_error(&self) -> Option<SyncError>;
    fn stats(&self) -> TransferStats;
    fn phase(&self) -> watch::Receiver<Phase>;

    /// Resolves once the transfer is done or has failed.
    async fn finished(&self) -> Phase {
        let mut rx = self.phase();
        let phase = match rx.wait_for(|phase| *phase != Phase::Running).await {
            Ok(phase) => *phase,
            Err(_) => Phase::Failed,
        };
        phase
    }
}

pub trait NetworkManager: Manager {
    fn packeter(&self) -> &Packeter;

    /// The status exchange is over.
    fn tcp_done(&self);

    /// Datagram loops stop once this is true
    fn net_done(&self) -> bool {
        self.is_done() || self.is_failed()
    }
}

// =============================================================================
// Shared state
// =============================================================================

/// Bookkeeping every manager carries.
pub(crate) struct ManagerCore {
    request: Request,
    stats: Mutex<TransferStats>,
    error: Mutex<Option<SyncError>>,
    phase: watch::Sender<Phase>,
}

impl ManagerCore {
    pub(crate) fn new(request: Request) -> Self {
        let (phase, _) = watch::channel(Phase::Running);
        Self {
            request,
            stats: Mutex::new(TransferStats::new()),
            error: Mutex::new(None),
            phase,
        }
    }

    pub(crate) fn request(&self) -> &Request {
        &self.request
    }

    pub(crate) fn update_stats(&self, f: impl FnOnce(&mut TransferStats)) {
        f(&mut lock(&self.stats));
    }

    pub(crate) fn stats(&self) -> TransferStats {
        lock(&self.stats).clone()
    }

    pub(crate) fn mark_done(&self) {
        self.phase.send_if_modified(|phase| {
            if *phase == Phase::Running {
                *phase = Phase::Done;
                true
            } else {
                false
            }
        });
    }

    /// Store `err` unless an earlier error is already recorded.
    pub(crate) fn fail(&self, err: SyncError) {
        {
            let mut slot = lock(&self.error);
            if slot.is_none() {
                tracing::error!("Transfer {} failed: {}", self.request.id, err);
                *slot = Some(err);
            } else {
                tracing::debug!("Ignoring follow-up error: {}", err);
            }
        }
        self.phase.send_replace(Phase::Failed);
    }

    /// Message describing the recorded failure, if any
    pub(crate) fn failure(&self) -> Option<String> {
        lock(&self.error).as_ref().map(|e| e.to_string())
    }

    pub(crate) fn is_failed(&self) -> bool {
        *self.phase.borrow() == Phase::Failed
    }

    pub(crate) fn is_done(&self) -> bool {
        *self.phase.borrow() == Phase::Done
    }

    pub(crate) fn take_error(&self) -> Option<SyncError> {
        lock(&self.error).take()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }
}
