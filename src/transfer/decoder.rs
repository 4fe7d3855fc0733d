//! Decoder loop: turn complete packet groups back into pipeline messages.
//!
//! Groups are decoded strictly in packet order, so per-file ordering on the
//! sending side is preserved on the receiving side.

use crate::error::Result;
use crate::transfer::channel::{Checksum, Delta, FileInfo};
use crate::transfer::manager::NetworkManager;
use crate::transfer::options::TransferOptions;
use crate::transfer::packet::{ContentType, PacketGroup};

/// Run until the transfer is done or failed.
pub async fn decode<M: NetworkManager + ?Sized>(manager: &M, opts: &TransferOptions) {
    if let Err(e) = decode_packets(manager, opts).await {
        manager.report_error(e);
    }
}

async fn decode_packets<M: NetworkManager + ?Sized>(
    manager: &M,
    opts: &TransferOptions,
) -> Result<()> {
    let packeter = manager.packeter();
    let mut groups = 0u64;

    while !manager.net_done() {
        match packeter.take_next_group() {
            Some(group) => {
                let last_id = group.last_id;
                dispatch(manager, group).await?;
                packeter.mark_decoded(last_id);
                groups += 1;
            }
            None => packeter.wait_for_arrivals(opts.decoder_poll()).await,
        }
        tokio::task::yield_now().await;
    }

    tracing::debug!("Decoder stopped after {} groups", groups);
    Ok(())
}

async fn dispatch<M: NetworkManager + ?Sized>(manager: &M, group: PacketGroup) -> Result<()> {
    match group.content_type {
        ContentType::FileInfo => {
            let info: FileInfo = bincode::deserialize(&group.payload)?;
            manager.queue_file_info(info).await
        }
        ContentType::Signature => {
            let checksum: Checksum = bincode::deserialize(&group.payload)?;
            manager.queue_signature(checksum).await
        }
        ContentType::Delta => {
            let delta: Delta = bincode::deserialize(&group.payload)?;
            manager.queue_delta(delta).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Request;
    use crate::transfer::manager::{DestinationManager, Manager, SourceManager};
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_groups_cross_between_managers() {
        let opts = TransferOptions::default();
        let source = SourceManager::new(Request::local("/src", "/dst"), &opts);
        let dest = Arc::new(DestinationManager::new(Request::local("/src", "/dst"), &opts));
        let mut outbound = source.packeter().outbound_channel().unwrap();
        let mut deltas = dest.delta_channel().unwrap();

        let decoder = {
            let dest = Arc::clone(&dest);
            let opts = opts.clone();
            tokio::spawn(async move { decode(&*dest, &opts).await })
        };

        let delta = Delta::copy(PathBuf::from("/dst/file"), 0, &vec![9u8; 1500]);
        source.queue_delta(delta.clone()).await.unwrap();

        // Deliver the packets in reverse to exercise reassembly
        let mut packets = Vec::new();
        while let Ok(p) = outbound.try_recv() {
            packets.push(p);
        }
        assert!(packets.len() > 1);
        for p in packets.into_iter().rev() {
            dest.packeter().receive(p);
        }

        let received = tokio::time::timeout(Duration::from_secs(5), deltas.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, delta);
        assert_eq!(dest.stats().bytes_sent, 1500);

        dest.tcp_done();
        decoder.await.unwrap();
        assert!(!dest.is_failed());
    }
}
