//! Source side of a network transfer: runs Walker and Differ.
//!
//! File infos and deltas leave through the packeter. Signatures arrive from
//! the destination and are queued locally for the differ.

use super::{Manager, ManagerCore, NetworkManager, Phase};
use crate::error::{Result, SyncError};
use crate::request::Request;
use crate::transfer::channel::{lock, Checksum, Delta, FileInfo, Queue};
use crate::transfer::options::TransferOptions;
use crate::transfer::packet::{ContentType, Packeter};
use crate::transfer::stats::TransferStats;
use crate::transfer::status::{stage_delivered, DestinationTransferStatus, SourceTransferStatus};
use async_trait::async_trait;
use std::sync::Mutex;
use tokio::sync::{mpsc, watch};

#[derive(Default)]
struct Markers {
    last_file_info_packet: Option<u64>,
    last_delta_packet: Option<u64>,
}

pub struct SourceManager {
    core: ManagerCore,
    packeter: Packeter,
    signatures: Queue<Checksum>,
    markers: Mutex<Markers>,
}

impl SourceManager {
    pub fn new(request: Request, opts: &TransferOptions) -> Self {
        Self {
            core: ManagerCore::new(request),
            packeter: Packeter::new(opts.fragment_size, opts.packet_queue),
            signatures: Queue::new("signature", opts.signature_queue),
            markers: Mutex::new(Markers::default()),
        }
    }

    /// Status to send to the destination this round.
    pub fn outgoing_status(&self) -> SourceTransferStatus {
        let packeter = self.packeter.status();
        let markers = lock(&self.markers);

        self.core.update_stats(|s| {
            s.packets_resent_by_destination += packeter.resend.len() as u64;
            s.status_exchanges += 1;
        });

        SourceTransferStatus {
            packeter,
            last_file_info_packet: markers.last_file_info_packet,
            last_delta_packet: markers.last_delta_packet,
            failed: self.core.failure(),
        }
    }

    /// Apply a status received from the destination.
    pub async fn receive_status_update(&self, dest: &DestinationTransferStatus) -> Result<()> {
        if let Some(reason) = &dest.failed {
            self.report_error(SyncError::Remote(reason.clone()));
            return Ok(());
        }

        self.core
            .update_stats(|s| s.packets_resent_by_source += dest.packeter.resend.len() as u64);
        self.packeter.receive_status(&dest.packeter).await?;

        if stage_delivered(dest.last_signature_packet, self.packeter.last_decoded()) {
            self.signature_done();
        }
        if dest.patch_done {
            tracing::debug!("Destination reports patch complete");
            self.patch_done();
        }
        Ok(())
    }

    fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        Ok(bincode::serialize(value)?)
    }
}

#[async_trait]
impl Manager for SourceManager {
    fn request(&self) -> &Request {
        self.core.request()
    }

    async fn queue_file_info(&self, info: FileInfo) -> Result<()> {
        self.core.update_stats(|s| s.record_file_info(&info));
        let payload = Self::encode(&info)?;
        self.packeter.fragment(&payload, ContentType::FileInfo).await?;
        Ok(())
    }

    fn file_info_done(&self) {
        lock(&self.markers).last_file_info_packet = Some(self.packeter.last_sent());
    }

    fn file_info_channel(&self) -> Option<mpsc::Receiver<FileInfo>> {
        None
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
        let payload = Self::encode(&delta)?;
        self.packeter.fragment(&payload, ContentType::Delta).await?;
        Ok(())
    }

    fn delta_done(&self) {
        lock(&self.markers).last_delta_packet = Some(self.packeter.last_sent());
    }

    fn delta_channel(&self) -> Option<mpsc::Receiver<Delta>> {
        None
    }

    fn patch_done(&self) {
        self.core.mark_done();
    }

    fn report_error(&self, err: SyncError) {
        self.core.fail(err);
        self.signatures.close();
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

impl NetworkManager for SourceManager {
    fn packeter(&self) -> &Packeter {
        &self.packeter
    }

    fn tcp_done(&self) {
        self.packeter.close();
        self.core.mark_done();
    }
}
