//! Both roots on one machine: every queue is local.

use super::{Manager, ManagerCore, Phase};
use crate::error::{Result, SyncError};
use crate::request::Request;
use crate::transfer::channel::{Checksum, Delta, FileInfo, Queue};
use crate::transfer::options::TransferOptions;
use crate::transfer::stats::TransferStats;
use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

pub struct LocalManager {
    core: ManagerCore,
    file_infos: Queue<FileInfo>,
    signatures: Queue<Checksum>,
    deltas: Queue<Delta>,
}

impl LocalManager {
    pub fn new(request: Request, opts: &TransferOptions) -> Self {
        Self {
            core: ManagerCore::new(request),
            file_infos: Queue::new("file info", opts.file_info_queue),
            signatures: Queue::new("signature", opts.signature_queue),
            deltas: Queue::new("delta", opts.delta_queue),
        }
    }
}

#[async_trait]
impl Manager for LocalManager {
    fn request(&self) -> &Request {
        self.core.request()
    }

    async fn queue_file_info(&self, info: FileInfo) -> Result<()> {
        self.core.update_stats(|s| s.record_file_info(&info));
        self.file_infos.push(info).await
    }

    fn file_info_done(&self) {
        self.file_infos.close();
    }

    fn file_info_channel(&self) -> Option<mpsc::Receiver<FileInfo>> {
        self.file_infos.take_receiver()
    }

    async fn queue_signature(&self, checksum: Checksum) -> Result<()> {
        self.signatures.push(checksum).await
    }

    fn signature_done(&self) {
        self.signatures.close();
    }

    fn signature_channel(&self) -> Option<mpsc::Receiver<Checksum>> {
        self.signatures.take_receiver()
    }

    async fn queue_delta(&self, delta: Delta) -> Result<()> {
        self.core.update_stats(|s| s.record_delta(&delta));
        self.deltas.push(delta).await
    }

    fn delta_done(&self) {
        self.deltas.close();
    }

    fn delta_channel(&self) -> Option<mpsc::Receiver<Delta>> {
        self.deltas.take_receiver()
    }

    fn patch_done(&self) {
        self.core.mark_done();
    }

    fn report_error(&self, err: SyncError) {
        self.core.fail(err);
        self.file_infos.close();
        self.signatures.close();
        self.deltas.close();
    }

    fn is_failed(&self) -> bool {
        self.core.is_failed()
    }

    fn is_done(&self) -> bool {
        self.core.is_done()
    }

    fn take_error(&self) -> Option<SyncError> {
        self.core.take_error()
    }

    fn stats(&self) -> TransferStats {
        self.core.stats()
    }

    fn phase(&self) -> watch::Receiver<Phase> {
        self.core.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_report_error_closes_queues() {
        let manager = LocalManager::new(Request::local("/a", "/b"), &TransferOptions::default());
        let mut deltas = manager.delta_channel().unwrap();

        manager.report_error(SyncError::Protocol("boom".into()));

        assert!(manager.is_failed());
        assert_eq!(manager.finished().await, Phase::Failed);
        assert!(deltas.recv().await.is_none());
        assert!(manager
            .queue_delta(Delta::no_op(PathBuf::from("/b/x"), 0, 1))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_patch_done_finishes() {
        let manager = LocalManager::new(Request::local("/a", "/b"), &TransferOptions::default());
        manager.patch_done();
        assert_eq!(manager.finished().await, Phase::Done);
        assert!(manager.take_error().is_none());
    }

    #[tokio::test]
    async fn test_finished_wakes_on_later_completion() {
        let manager = std::sync::Arc::new(LocalManager::new(
            Request::local("/a", "/b"),
            &TransferOptions::default(),
        ));
        let waiter = {
            let m = std::sync::Arc::clone(&manager);
            tokio::spawn(async move { m.finished().await })
        };

        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());
        manager.patch_done();

        assert_eq!(waiter.await.unwrap(), Phase::Done);
    }
}
