//! Command-line address parsing: `path`, `host:path`, `host:port:path`.

use crate::error::{Result, SyncError};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPath {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub path: PathBuf,
}

impl SyncPath {
    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self {
            host: None,
            port: None,
            path: path.into(),
        }
    }

    pub fn is_remote(&self) -> bool {
        self.host.is_some()
    }

    pub fn parse(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(SyncError::InvalidAddress("empty path".into()));
        }

        let parts: Vec<&str> = s.split(':').collect();
        match parts.as_slice() {
            [path] => Ok(Self::local(*path)),
            [host, path] => {
                if host.is_empty() || path.is_empty() {
                    return Err(SyncError::InvalidAddress(format!(
                        "expected host:path, got {}",
                        s
                    )));
                }
                Ok(Self {
                    host: Some(host.to_string()),
                    port: None,
                    path: PathBuf::from(path),
                })
            }
            [host, port, path] => {
                if host.is_empty() || path.is_empty() {
                    return Err(SyncError::InvalidAddress(format!(
                        "expected host:port:path, got {}",
                        s
                    )));
                }
                let port = port.parse::<u16>().map_err(|_| {
                    SyncError::InvalidAddress(format!("unparsable port number: {}", port))
                })?;
                Ok(Self {
                    host: Some(host.to_string()),
                    port: Some(port),
                    path: PathBuf::from(path),
                })
            }
            _ => Err(SyncError::InvalidAddress(format!(
                "unknown address format: {}",
                s
            ))),
        }
    }
}

impl std::str::FromStr for SyncPath {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl std::fmt::Display for SyncPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.host, self.port) {
            (Some(host), Some(port)) => write!(f, "{}:{}:{}", host, port, self.path.display()),
            (Some(host), None) => write!(f, "{}:{}", host, self.path.display()),
            _ => write!(f, "{}", self.path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_local() {
        let p = SyncPath::parse("/home/user/docs").unwrap();
        assert!(!p.is_remote());
        assert_eq!(p.path, PathBuf::from("/home/user/docs"));
    }

    #[test]
    fn test_parse_host_path() {
        let p = SyncPath::parse("server:/srv/data").unwrap();
        assert_eq!(p.host.as_deref(), Some("server"));
        assert_eq!(p.port, None);
        assert_eq!(p.path, PathBuf::from("/srv/data"));
    }

    #[test]
    fn test_parse_host_port_path() {
        let p = SyncPath::parse("10.0.0.5:4300:/srv/data").unwrap();
        assert_eq!(p.host.as_deref(), Some("10.0.0.5"));
        assert_eq!(p.port, Some(4300));
        assert_eq!(p.to_string(), "10.0.0.5:4300:/srv/data");
    }

    #[test]
    fn test_parse_errors() {
        assert!(SyncPath::parse("").is_err());
        assert!(SyncPath::parse("host:notaport:/x").is_err());
        assert!(SyncPath::parse("a:b:c:d").is_err());
        assert!(SyncPath::parse(":/x").is_err());
    }
}
