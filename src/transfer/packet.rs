//! Packets and the Packeter.
//!
//! Pipeline messages are serialized, cut into fixed-size packets, numbered
//! and kept in a send cache until the peer confirms them. On the receiving
//! side packets wait in a receive cache until a complete, gap-free group can
//! be handed to the decoder.
//!
//! Datagram format (all integers big-endian):
//!
//! ```text
//! id:u64 | flags:u8 | type:u8 | len:u16 | content[len]
//! ```

use crate::error::{Result, SyncError};
use crate::transfer::channel::Queue;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, Notify};

/// Fixed header size of an encoded packet
pub const PACKET_HEADER_SIZE: usize = 8 + 1 + 1 + 2;

/// Largest datagram the receiver accepts
pub const MAX_DATAGRAM_SIZE: usize = 64 * 1024;

// =============================================================================
// Packet
// =============================================================================

/// What a packet group decodes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ContentType {
    FileInfo = 0x00,
    Signature = 0x01,
    Delta = 0x02,
}

impl ContentType {
    pub fn from_u8(b: u8) -> Option<Self> {
        match b {
            0x00 => Some(Self::FileInfo),
            0x01 => Some(Self::Signature),
            0x02 => Some(Self::Delta),
            _ => None,
        }
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PacketFlags: u8 {
        /// Last packet of a message
        const END_OF_GROUP = 1 << 0;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub id: u64,
    pub end_of_group: bool,
    pub content_type: ContentType,
    pub content: Bytes,
}

impl Packet {
    /// Lay the packet out as a datagram. Content longer than the 16-bit
    /// length field can describe is refused.
    pub fn encode(&self) -> Result<Bytes> {
        let len = u16::try_from(self.content.len()).map_err(|_| {
            SyncError::Protocol(format!(
                "packet {} content of {} bytes exceeds the datagram length field",
                self.id,
                self.content.len()
            ))
        })?;
        let mut buf = BytesMut::with_capacity(PACKET_HEADER_SIZE + self.content.len());
        let mut flags = PacketFlags::empty();
        if self.end_of_group {
            flags |= PacketFlags::END_OF_GROUP;
        }

        buf.put_u64(self.id);
        buf.put_u8(flags.bits());
        buf.put_u8(self.content_type as u8);
        buf.put_u16(len);
        buf.put_slice(&self.content);

        Ok(buf.freeze())
    }

    pub fn decode(mut datagram: Bytes) -> Result<Self> {
        if datagram.remaining() < PACKET_HEADER_SIZE {
            return Err(SyncError::Protocol("packet shorter than header".into()));
        }
        let id = datagram.get_u64();
        let flags = PacketFlags::from_bits_truncate(datagram.get_u8());
        let content_type = ContentType::from_u8(datagram.get_u8())
            .ok_or_else(|| SyncError::Protocol("unknown packet content type".into()))?;
        let len = datagram.get_u16() as usize;
        if datagram.remaining() != len {
            return Err(SyncError::Protocol(format!(
                "packet {} content truncated: expected {} bytes, got {}",
                id,
                len,
                datagram.remaining()
            )));
        }

        Ok(Self {
            id,
            end_of_group: flags.contains(PacketFlags::END_OF_GROUP),
            content_type,
            content: datagram,
        })
    }
}

// =============================================================================
// PacketerStatus
// =============================================================================

/// Snapshot exchanged with the peer on every status round.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketerStatus {
    /// Highest id received with no gaps before it
    pub last_received: u64,
    /// Ids this side is missing and wants resent
    pub resend: Vec<u64>,
    /// Highest id this side has sent
    pub last_sent: u64,
}

// =============================================================================
// Packeter
// =============================================================================

#[derive(Default)]
struct SendCache {
    packets: BTreeMap<u64, Packet>,
    last_sent: u64,
}

#[derive(Default)]
struct ReceiveCache {
    packets: BTreeMap<u64, Packet>,
    last_received: u64,
}

/// A complete, in-order run of packets ready for decoding
#[derive(Debug)]
pub struct PacketGroup {
    pub content_type: ContentType,
    pub payload: Vec<u8>,
    /// Id of the group's end-of-group packet
    pub last_id: u64,
}

pub struct Packeter {
    fragment_size: usize,
    send: Mutex<SendCache>,
    receive: RwLock<ReceiveCache>,
    last_sent: AtomicU64,
    peer_last_sent: AtomicU64,
    last_decoded: AtomicU64,
    outbound: Queue<Packet>,
    arrivals: Notify,
}

impl Packeter {
    pub fn new(fragment_size: usize, queue_capacity: usize) -> Self {
        Self {
            fragment_size: fragment_size.max(1),
            send: Mutex::new(SendCache::default()),
            receive: RwLock::new(ReceiveCache::default()),
            last_sent: AtomicU64::new(0),
            peer_last_sent: AtomicU64::new(0),
            last_decoded: AtomicU64::new(0),
            outbound: Queue::new("packet", queue_capacity),
            arrivals: Notify::new(),
        }
    }

    fn read_cache(&self) -> RwLockReadGuard<'_, ReceiveCache> {
        self.receive.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_cache(&self) -> RwLockWriteGuard<'_, ReceiveCache> {
        self.receive.write().unwrap_or_else(PoisonError::into_inner)
    }

    // -------------------------------------------------------------------------
    // Send side
    // -------------------------------------------------------------------------

    /// Cut `payload` into packets, cache them and queue them for sending.
    /// Returns the id of the group's last packet.
    pub async fn fragment(&self, payload: &[u8], content_type: ContentType) -> Result<u64> {
        let mut cache = self.send.lock().await;

        let mut pieces: Vec<&[u8]> = payload.chunks(self.fragment_size).collect();
        if pieces.is_empty() {
            pieces.push(&[]);
        }
        let last = pieces.len() - 1;

        for (i, piece) in pieces.into_iter().enumerate() {
            let packet = Packet {
                id: cache.last_sent + 1,
                end_of_group: i == last,
                content_type,
                content: Bytes::copy_from_slice(piece),
            };
            cache.last_sent = packet.id;
            cache.packets.insert(packet.id, packet.clone());
            self.last_sent.store(packet.id, Ordering::Release);
            self.outbound.push(packet).await?;
        }

        Ok(cache.last_sent)
    }

    /// Apply the peer's status: drop what it confirmed, resend what it asked
    /// for, and report what we are missing from it.
    pub async fn receive_status(&self, peer: &PacketerStatus) -> Result<PacketerStatus> {
        self.peer_last_sent.fetch_max(peer.last_sent, Ordering::AcqRel);

        let resend: Vec<Packet> = {
            let mut cache = self.send.lock().await;
            // Everything at or below the peer's contiguous mark is confirmed
            let kept = cache.packets.split_off(&(peer.last_received + 1));
            cache.packets = kept;
            peer.resend
                .iter()
                .filter_map(|id| cache.packets.get(id).cloned())
                .collect()
        };

        if !resend.is_empty() {
            tracing::debug!("Resending {} packets", resend.len());
        }
        for packet in resend {
            self.outbound.push(packet).await?;
        }

        Ok(self.status())
    }

    /// This side's status against the last peer status seen.
    pub fn status(&self) -> PacketerStatus {
        self.status_for(self.peer_last_sent.load(Ordering::Acquire))
    }

    /// This side's status, given the highest id the peer says it has sent.
    pub fn status_for(&self, peer_last_sent: u64) -> PacketerStatus {
        let cache = self.read_cache();
        let resend = (cache.last_received + 1..=peer_last_sent)
            .filter(|id| !cache.packets.contains_key(id))
            .collect();

        PacketerStatus {
            last_received: cache.last_received,
            resend,
            last_sent: self.last_sent(),
        }
    }

    /// Number of packets still waiting for confirmation
    pub async fn unconfirmed(&self) -> usize {
        self.send.lock().await.packets.len()
    }

    /// Consumer end of the outbound queue, taken by the datagram sender.
    pub fn outbound_channel(&self) -> Option<mpsc::Receiver<Packet>> {
        self.outbound.take_receiver()
    }

    /// Stop accepting outbound packets; the sender drains and exits.
    pub fn close(&self) {
        self.outbound.close();
    }

    // -------------------------------------------------------------------------
    // Receive side
    // -------------------------------------------------------------------------

    /// Store an incoming packet and advance the contiguous mark.
    pub fn receive(&self, packet: Packet) {
        {
            let mut cache = self.write_cache();
            if packet.id <= cache.last_received || cache.packets.contains_key(&packet.id) {
                // Duplicate from a resend
                return;
            }
            cache.packets.insert(packet.id, packet);

            let mut next = cache.last_received + 1;
            while cache.packets.contains_key(&next) {
                cache.last_received = next;
                next += 1;
            }
        }
        self.arrivals.notify_one();
    }

    /// Remove and return the next complete group after the last decoded
    /// packet, or `None` if it has not fully arrived yet.
    pub fn take_next_group(&self) -> Option<PacketGroup> {
        let start = self.last_decoded() + 1;
        let mut cache = self.write_cache();

        let mut end = None;
        for id in start..=cache.last_received {
            match cache.packets.get(&id) {
                // Gap: wait for the resend
                None => return None,
                Some(packet) if packet.end_of_group => {
                    end = Some(id);
                    break;
                }
                Some(_) => {}
            }
        }
        let end = end?;

        let mut payload = Vec::new();
        let mut content_type = ContentType::FileInfo;
        for id in start..=end {
            if let Some(packet) = cache.packets.remove(&id) {
                payload.extend_from_slice(&packet.content);
                content_type = packet.content_type;
            }
        }

        Some(PacketGroup {
            content_type,
            payload,
            last_id: end,
        })
    }

    /// Record that every packet up to `id` has been delivered to the pipeline.
    pub fn mark_decoded(&self, id: u64) {
        self.last_decoded.fetch_max(id, Ordering::AcqRel);
    }

    /// Wait for a packet arrival, at most `timeout`.
    pub async fn wait_for_arrivals(&self, timeout: Duration) {
        let _ = tokio::time::timeout(timeout, self.arrivals.notified()).await;
    }

    // -------------------------------------------------------------------------
    // Counters and completion
    // -------------------------------------------------------------------------

    pub fn last_sent(&self) -> u64 {
        self.last_sent.load(Ordering::Acquire)
    }

    pub fn last_received(&self) -> u64 {
        self.read_cache().last_received
    }

    pub fn last_decoded(&self) -> u64 {
        self.last_decoded.load(Ordering::Acquire)
    }
}

// =============================================================================
// Tests
// =============================================================================
