//! dsync: block-level delta directory synchronization.
//!
//! A transfer walks the source tree, fingerprints destination blocks,
//! diffs them against the source at fixed offsets and patches only the
//! blocks that changed. Local transfers run all four stages in-process;
//! network transfers split them between the requester and a `dsyncd`
//! daemon, carrying pipeline messages as UDP packets that are repaired by a
//! status exchange over one TCP connection.

pub mod config;
pub mod error;
pub mod path;
pub mod request;
pub mod server;
pub mod sync;
pub mod transfer;
pub mod transport;

pub use config::DaemonConfig;
pub use error::{Result, SyncError};
pub use path::SyncPath;
pub use request::{Request, RequestResponse, Role};
pub use sync::{initiate_sync, sync_incoming, sync_local, sync_outgoing};
pub use transfer::{TransferOptions, TransferStats};
