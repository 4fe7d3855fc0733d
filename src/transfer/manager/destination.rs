//! Destination side of a network transfer: runs Signer and Patcher.
//!
//! File infos and deltas arrive through the packeter and are queued locally.
//! Signatures leave through the packeter.

use super::{Manager, ManagerCore, NetworkManager, Phase};
use crate::error::{Result, SyncError};
use crate::request::Request;
use crate::transfer::channel::{lock, Checksum, Delta, FileInfo, Queue};
use crate::transfer::options::TransferOptions;
use crate::transfer::packet::{ContentType, Packeter};
use crate::transfer::stats::TransferStats;
use crate::transfer::status::{stage_delivered, DestinationTransferStatus, SourceTransferStatus};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::{mpsc, watch};

pub struct DestinationManager {
    core: ManagerCore,
    packeter: Packeter,
    file_infos: Queue<FileInfo>,
    deltas: Queue<Delta>,
    last_signature_packet: Mutex<Option<u64>>,
    patched: AtomicBool,
}

impl DestinationManager {
    pub fn new(request: Request, opts: &TransferOptions) -> Self {
        Self {
            core: ManagerCore::new(request),
            packeter: Packeter::new(opts.fragment_size, opts.packet_queue),
            file_infos: Queue::new("file info", opts.file_info_queue),
            deltas: Queue::new("delta", opts.delta_queue),
            last_signature_packet: Mutex::new(None),
            patched: AtomicBool::new(false),
        }
    }

    /// Status to send to the source this round.
    pub fn outgoing_status(&self) -> DestinationTransferStatus {
        let packeter = self.packeter.status();

        self.core.update_stats(|s| {
            s.packets_resent_by_source += packeter.resend.len() as u64;
            s.status_exchanges += 1;
        });

        DestinationTransferStatus {
            packeter,
            last_signature_packet: *lock(&self.last_signature_packet),
            patch_done: self.patched.load(Ordering::Acquire),
            failed: self.core.failure(),
        }
    }

    /// Apply a status received from the source.
    pub async fn receive_status_update(&self, source: &SourceTransferStatus) -> Result<()> {
        if let Some(reason) = &source.failed {
            self.report_error(SyncError::Remote(reason.clone()));
            return Ok(());
        }

        self.core.update_stats(|s| {
            s.packets_resent_by_destination += source.packeter.resend.len() as u64
        });
        self.packeter.receive_status(&source.packeter).await?;

        let decoded = self.packeter.last_decoded();
        if stage_delivered(source.last_file_info_packet, decoded) {
            self.file_info_done();
        }
        if stage_delivered(source.last_delta_packet, decoded) {
            self.delta_done();
        }
        Ok(())
    }
}

#[async_trait]
impl Manager for DestinationManager {
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
        let payload = bincode::serialize(&checksum)?;
        self.packeter
            .fragment(&payload, ContentType::Signature)
            .await?;
        Ok(())
    }

    fn signature_done(&self) {
        *lock(&self.last_signature_packet) = Some(self.packeter.last_sent());
    }

    fn signature_channel(&self) -> Option<mpsc::Receiver<Checksum>> {
        None
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
        tracing::debug!("Patch complete for {}", self.core.request().id);
        self.patched.store(true, Ordering::Release);
    }

    fn report_error(&self, err: SyncError) {
        self.core.fail(err);
        self.file_infos.close();
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

impl NetworkManager for DestinationManager {
    fn packeter(&self) -> &Packeter {
        &self.packeter
    }

    fn tcp_done(&self) {
        self.packeter.close();
        self.core.mark_done();
    }
}
