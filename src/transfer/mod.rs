//! Block-level delta transfer.
//!
//! Architecture:
//! ```text
//!   Walker ──FileInfo──> Signer ──Checksum──> Differ ──Delta──> Patcher
//!  (source)           (destination)          (source)        (destination)
//! ```
//!
//! In a local transfer all four stages share one [`manager::LocalManager`].
//! Across the network the arrows that cross between hosts are carried as
//! packet groups over UDP, and the two managers trade status over TCP until
//! the patcher reports completion.

pub mod channel;
pub mod decoder;
pub mod differ;
pub mod fingerprint;
pub mod manager;
pub mod options;
pub mod packet;
pub mod patcher;
pub mod signer;
pub mod stats;
pub mod status;
pub mod walker;

pub use channel::{Checksum, Delta, DeltaOp, EntryKind, FileInfo};
pub use fingerprint::Fingerprint;
pub use manager::{
    DestinationManager, LocalManager, Manager, NetworkManager, Phase, SourceManager,
};
pub use options::TransferOptions;
pub use packet::{Packet, Packeter, PacketerStatus};
pub use stats::TransferStats;

use tokio::io::{AsyncRead, AsyncReadExt};

/// Read until `buf` is full or the reader hits end of file.
/// Returns the number of bytes read.
pub(crate) async fn read_full<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut [u8],
) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]).await? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_full_stops_at_eof() {
        let data = b"0123456789".to_vec();
        let mut reader = &data[..];

        let mut buf = [0u8; 4];
        assert_eq!(read_full(&mut reader, &mut buf).await.unwrap(), 4);
        assert_eq!(read_full(&mut reader, &mut buf).await.unwrap(), 4);
        assert_eq!(read_full(&mut reader, &mut buf).await.unwrap(), 2);
        assert_eq!(&buf[..2], b"89");
        assert_eq!(read_full(&mut reader, &mut buf).await.unwrap(), 0);
    }
}
