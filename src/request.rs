//! Transfer requests and the daemon's answer.

use crate::error::{Result, SyncError};
use crate::path::SyncPath;
use crate::transfer::options::{DEFAULT_BLOCK_SIZE, MAX_BLOCK_SIZE};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Default daemon port
pub const DEFAULT_PORT: u16 = 4200;

/// Which side of the transfer the requester plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// Both roots are on this machine
    Local,
    /// Requester pulls: the remote side is the source
    Incoming,
    /// Requester pushes: the remote side is the destination
    Outgoing,
}

/// One transfer, immutable once sent to the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub id: Uuid,
    pub role: Role,
    pub source: PathBuf,
    pub destination: PathBuf,

    /// Remote daemon host, empty for local transfers
    pub host: String,
    pub port: u16,

    pub block_size: usize,
    pub follow_links: bool,

    /// Requester's datagram port, filled in just before sending
    pub requester_udp_port: u16,
}

impl Request {
    pub fn local(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: Role::Local,
            source: source.into(),
            destination: destination.into(),
            host: String::new(),
            port: DEFAULT_PORT,
            block_size: DEFAULT_BLOCK_SIZE,
            follow_links: false,
            requester_udp_port: 0,
        }
    }

    /// Build a request from two command-line addresses.
    ///
    /// At most one side may name a host. Relative local paths are resolved
    /// against `cwd`.
    pub fn from_addresses(source: &SyncPath, destination: &SyncPath, cwd: &Path) -> Result<Self> {
        let (role, remote) = match (&source.host, &destination.host) {
            (Some(_), Some(_)) => {
                return Err(SyncError::InvalidAddress(
                    "source and destination cannot both be remote".into(),
                ))
            }
            (Some(_), None) => (Role::Incoming, source),
            (None, Some(_)) => (Role::Outgoing, destination),
            (None, None) => (Role::Local, source),
        };

        let resolve = |p: &SyncPath| -> PathBuf {
            if p.host.is_none() && p.path.is_relative() {
                cwd.join(&p.path)
            } else {
                p.path.clone()
            }
        };

        let mut request = Self::local(resolve(source), resolve(destination));
        request.role = role;
        if role != Role::Local {
            request.host = remote.host.clone().unwrap_or_default();
            request.port = remote.port.unwrap_or(DEFAULT_PORT);
        }
        Ok(request)
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn with_follow_links(mut self, follow_links: bool) -> Self {
        self.follow_links = follow_links;
        self
    }

    /// Reject requests no stage can run.
    pub fn verify(&self) -> Result<()> {
        if !self.source.is_absolute() {
            return Err(SyncError::InvalidRequest(format!(
                "source path must be absolute: {}",
                self.source.display()
            )));
        }
        if !self.destination.is_absolute() {
            return Err(SyncError::InvalidRequest(format!(
                "destination path must be absolute: {}",
                self.destination.display()
            )));
        }
        if self.block_size == 0 || self.block_size > MAX_BLOCK_SIZE {
            return Err(SyncError::InvalidRequest(format!(
                "block size must be between 1 and {} bytes, got {}",
                MAX_BLOCK_SIZE, self.block_size
            )));
        }
        if self.role != Role::Local && self.host.is_empty() {
            return Err(SyncError::InvalidRequest(
                "network transfer without a remote host".into(),
            ));
        }
        Ok(())
    }

    /// `host:port` of the remote daemon
    pub fn remote_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Daemon's reply to a [`Request`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestResponse {
    pub accepted: bool,
    pub reason: Option<String>,
    pub request_id: Uuid,
    /// Daemon's datagram port for this transfer
    pub udp_port: u16,
}

impl RequestResponse {
    pub fn accept(request: &Request, udp_port: u16) -> Self {
        Self {
            accepted: true,
            reason: None,
            request_id: request.id,
            udp_port,
        }
    }

    pub fn reject(request: &Request, reason: impl Into<String>) -> Self {
        Self {
            accepted: false,
            reason: Some(reason.into()),
            request_id: request.id,
            udp_port: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> SyncPath {
        SyncPath::parse(s).unwrap()
    }

    #[test]
    fn test_local_addresses() {
        let req = Request::from_addresses(&addr("src"), &addr("/abs/dst"), Path::new("/home/me"))
            .unwrap();
        assert_eq!(req.role, Role::Local);
        assert_eq!(req.source, PathBuf::from("/home/me/src"));
        assert_eq!(req.destination, PathBuf::from("/abs/dst"));
        assert!(req.verify().is_ok());
    }

    #[test]
    fn test_push_and_pull_roles() {
        let cwd = Path::new("/work");

        let push = Request::from_addresses(&addr("data"), &addr("backup:/srv/data"), cwd).unwrap();
        assert_eq!(push.role, Role::Outgoing);
        assert_eq!(push.host, "backup");
        assert_eq!(push.port, DEFAULT_PORT);
        assert_eq!(push.source, PathBuf::from("/work/data"));

        let pull =
            Request::from_addresses(&addr("backup:4300:/srv/data"), &addr("data"), cwd).unwrap();
        assert_eq!(pull.role, Role::Incoming);
        assert_eq!(pull.port, 4300);
        assert_eq!(pull.remote_addr(), "backup:4300");
    }

    #[test]
    fn test_both_remote_rejected() {
        let err = Request::from_addresses(&addr("a:/x"), &addr("b:/y"), Path::new("/"));
        assert!(matches!(err, Err(SyncError::InvalidAddress(_))));
    }

    #[test]
    fn test_verify_block_size_bounds() {
        let req = Request::local("/a", "/b");
        assert!(req.clone().with_block_size(0).verify().is_err());
        assert!(req.clone().with_block_size(1).verify().is_ok());
        assert!(req.clone().with_block_size(MAX_BLOCK_SIZE).verify().is_ok());
        assert!(req.with_block_size(MAX_BLOCK_SIZE + 1).verify().is_err());
    }

    #[test]
    fn test_verify_relative_paths() {
        assert!(Request::local("a", "/b").verify().is_err());
        assert!(Request::local("/a", "b").verify().is_err());
    }

    #[test]
    fn test_request_wire_roundtrip() {
        let req = Request::local("/a", "/b").with_follow_links(true);
        let decoded: Request = bincode::deserialize(&bincode::serialize(&req).unwrap()).unwrap();
        assert_eq!(decoded, req);
    }
}
