//! Tunables for one transfer.
//!
//! Passed explicitly to every stage and loop; there are no process-wide
//! defaults to mutate.

use crate::error::{Result, SyncError};
use crate::transfer::packet::PACKET_HEADER_SIZE;
use serde::Deserialize;
use std::time::Duration;

/// Default block length in bytes
pub const DEFAULT_BLOCK_SIZE: usize = 2048;

/// Largest block size a request may ask for (16MB)
pub const MAX_BLOCK_SIZE: usize = 16 * 1024 * 1024;

/// Default packet payload size, small enough for any path MTU
pub const DEFAULT_FRAGMENT_SIZE: usize = 500;

/// Largest packet payload that still fits one UDP datagram (65507 bytes of
/// IPv4 payload, less the packet header)
pub const MAX_FRAGMENT_SIZE: usize = 65_507 - PACKET_HEADER_SIZE;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransferOptions {
    /// Capacity of the Walker -> Signer queue
    pub file_info_queue: usize,
    /// Capacity of the Signer -> Differ queue
    pub signature_queue: usize,
    /// Capacity of the Differ -> Patcher queue
    pub delta_queue: usize,
    /// Capacity of the outbound packet queue
    pub packet_queue: usize,
    /// Maximum payload bytes per packet
    pub fragment_size: usize,
    /// Pause between status exchanges on the source side
    pub status_interval_ms: u64,
    /// Bound on every status read/write
    pub io_timeout_ms: u64,
    /// Per-read timeout of the datagram receiver
    pub udp_read_timeout_ms: u64,
    /// Longest the decoder sleeps without a packet arrival
    pub decoder_poll_ms: u64,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            file_info_queue: 10,
            signature_queue: 10,
            delta_queue: 10,
            packet_queue: 100,
            fragment_size: DEFAULT_FRAGMENT_SIZE,
            status_interval_ms: 100,
            io_timeout_ms: 10_000,
            udp_read_timeout_ms: 100,
            decoder_poll_ms: 50,
        }
    }
}

impl TransferOptions {
    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.status_interval_ms)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }

    pub fn udp_read_timeout(&self) -> Duration {
        Duration::from_millis(self.udp_read_timeout_ms)
    }

    pub fn decoder_poll(&self) -> Duration {
        Duration::from_millis(self.decoder_poll_ms)
    }

    /// Reject values no transfer can run with.
    pub fn validate(&self) -> Result<()> {
        if self.fragment_size == 0 || self.fragment_size > MAX_FRAGMENT_SIZE {
            return Err(SyncError::Config(format!(
                "fragment_size must be between 1 and {}, got {}",
                MAX_FRAGMENT_SIZE, self.fragment_size
            )));
        }
        let queues = [
            ("file_info_queue", self.file_info_queue),
            ("signature_queue", self.signature_queue),
            ("delta_queue", self.delta_queue),
            ("packet_queue", self.packet_queue),
        ];
        if let Some((name, _)) = queues.iter().find(|(_, cap)| *cap == 0) {
            return Err(SyncError::Config(format!("{} must be at least 1", name)));
        }
        if self.io_timeout_ms == 0 || self.udp_read_timeout_ms == 0 {
            return Err(SyncError::Config("timeouts must be at least 1 ms".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = TransferOptions::default();
        assert_eq!(opts.fragment_size, 500);
        assert_eq!(opts.file_info_queue, 10);
        assert_eq!(opts.status_interval(), Duration::from_millis(100));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let opts: TransferOptions = toml::from_str("fragment_size = 1200\n").unwrap();
        assert_eq!(opts.fragment_size, 1200);
        assert_eq!(opts.packet_queue, 100);
    }

    #[test]
    fn test_validate_fragment_size_bounds() {
        assert!(TransferOptions::default().validate().is_ok());

        for size in [0, MAX_FRAGMENT_SIZE + 1, 70_000] {
            let opts = TransferOptions {
                fragment_size: size,
                ..Default::default()
            };
            assert!(matches!(opts.validate(), Err(SyncError::Config(_))), "{}", size);
        }

        let largest = TransferOptions {
            fragment_size: MAX_FRAGMENT_SIZE,
            ..Default::default()
        };
        assert!(largest.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_queue() {
        let opts = TransferOptions {
            delta_queue: 0,
            ..Default::default()
        };
        let err = opts.validate().unwrap_err();
        assert!(err.to_string().contains("delta_queue"));
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(toml::from_str::<TransferOptions>("fragment_sise = 1\n").is_err());
    }
}
