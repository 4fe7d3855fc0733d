//! Messages of the reliability-status exchange.
//!
//! The source and destination trade these over the control connection until
//! the destination reports the patch complete or either side fails.

use crate::transfer::packet::PacketerStatus;
use serde::{Deserialize, Serialize};

/// Status sent by the side running Walker and Differ.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceTransferStatus {
    pub packeter: PacketerStatus,

    /// Highest packet id sent when the walk finished, `None` while walking
    pub last_file_info_packet: Option<u64>,

    /// Highest packet id sent when diffing finished, `None` while diffing
    pub last_delta_packet: Option<u64>,

    /// Set when the source hit a fatal error
    pub failed: Option<String>,
}

/// Status sent by the side running Signer and Patcher.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationTransferStatus {
    pub packeter: PacketerStatus,

    /// Highest packet id sent when signing finished, `None` while signing
    pub last_signature_packet: Option<u64>,

    /// The patcher applied every delta
    pub patch_done: bool,

    pub failed: Option<String>,
}

/// Final message each side sends on a clean finish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestDone;

/// True once every packet up to the recorded stage marker has been decoded.
pub fn stage_delivered(marker: Option<u64>, last_decoded: u64) -> bool {
    matches!(marker, Some(last) if last_decoded >= last)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_delivered() {
        assert!(!stage_delivered(None, 100));
        // An empty stage finishes before anything was sent
        assert!(stage_delivered(Some(0), 0));
        assert!(!stage_delivered(Some(5), 4));
        assert!(stage_delivered(Some(5), 5));
    }

    #[test]
    fn test_status_wire_roundtrip() {
        let status = SourceTransferStatus {
            packeter: PacketerStatus {
                last_received: 3,
                resend: vec![5, 7],
                last_sent: 12,
            },
            last_file_info_packet: Some(4),
            last_delta_packet: None,
            failed: Some("disk full".into()),
        };
        let decoded: SourceTransferStatus =
            bincode::deserialize(&bincode::serialize(&status).unwrap()).unwrap();
        assert_eq!(decoded, status);
    }
}
