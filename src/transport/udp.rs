//! Datagram sender and receiver.
//!
//! Each side binds one UDP socket per transfer and shares it between the two
//! loops. The sender drains the packeter's outbound queue to the fixed peer
//! address; the receiver feeds every decodable datagram to the packeter.
//! Loss and reordering are repaired by the status exchange, not here.

use crate::error::{Result, SyncError};
use crate::transfer::manager::NetworkManager;
use crate::transfer::options::TransferOptions;
use crate::transfer::packet::{Packet, MAX_DATAGRAM_SIZE};
use bytes::Bytes;
use std::io::ErrorKind;
use std::net::{IpAddr, SocketAddr};
use tokio::net::UdpSocket;

pub async fn send_packets<M: NetworkManager + ?Sized>(
    manager: &M,
    socket: &UdpSocket,
    peer: SocketAddr,
) {
    match send_loop(manager, socket, peer).await {
        Ok(sent) => tracing::debug!("Datagram sender stopped after {} packets", sent),
        Err(e) => manager.report_error(e),
    }
}

async fn send_loop<M: NetworkManager + ?Sized>(
    manager: &M,
    socket: &UdpSocket,
    peer: SocketAddr,
) -> Result<u64> {
    let mut outbound = manager
        .packeter()
        .outbound_channel()
        .ok_or(SyncError::QueueClosed("packet"))?;

    let mut sent = 0u64;
    loop {
        tokio::select! {
            packet = outbound.recv() => {
                let Some(packet) = packet else { break };
                let datagram = packet.encode()?;
                let n = socket.send_to(&datagram, peer).await?;
                if n != datagram.len() {
                    return Err(SyncError::Protocol(format!(
                        "short datagram write: {} of {} bytes",
                        n,
                        datagram.len()
                    )));
                }
                sent += 1;
            }
            _ = manager.finished() => break,
        }
    }
    Ok(sent)
}

/// Receive datagrams until the transfer is over. Only datagrams from the
/// peer's address are accepted.
pub async fn receive_packets<M: NetworkManager + ?Sized>(
    manager: &M,
    socket: &UdpSocket,
    peer: SocketAddr,
    opts: &TransferOptions,
) {
    match receive_loop(manager, socket, peer.ip().to_canonical(), opts).await {
        Ok(received) => tracing::debug!("Datagram receiver stopped after {} packets", received),
        Err(e) => manager.report_error(e),
    }
}

async fn receive_loop<M: NetworkManager + ?Sized>(
    manager: &M,
    socket: &UdpSocket,
    peer: IpAddr,
    opts: &TransferOptions,
) -> Result<u64> {
    let packeter = manager.packeter();
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
    let mut received = 0u64;

    while !manager.net_done() {
        let read = tokio::time::timeout(opts.udp_read_timeout(), socket.recv_from(&mut buf)).await;
        let (n, from) = match read {
            // Timeouts only give the loop a chance to notice completion
            Err(_) => continue,
            Ok(Err(e))
                if matches!(e.kind(), ErrorKind::ConnectionReset | ErrorKind::ConnectionRefused) =>
            {
                continue
            }
            Ok(Err(e)) => return Err(e.into()),
            Ok(Ok(read)) => read,
        };
        if from.ip().to_canonical() != peer {
            tracing::debug!("Ignoring datagram from unexpected address {}", from);
            continue;
        }

        match Packet::decode(Bytes::copy_from_slice(&buf[..n])) {
            Ok(packet) => {
                packeter.receive(packet);
                received += 1;
            }
            Err(e) => tracing::warn!("Dropping datagram from {}: {}", from, e),
        }
    }
    Ok(received)
}
