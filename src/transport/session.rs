//! Transfer session setup: the request handshake on the control connection
//! and the datagram socket each side uses for the transfer.

use crate::error::{Result, SyncError};
use crate::request::{Request, RequestResponse, Role};
use crate::transfer::options::TransferOptions;
use crate::transport::frame::{read_message, write_message};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::{TcpStream, UdpSocket};

/// An established transfer: control stream plus datagram socket
pub struct Session {
    pub stream: TcpStream,
    pub socket: Arc<UdpSocket>,
    /// Where the peer receives datagrams
    pub peer_udp: SocketAddr,
}

impl Session {
    /// Requester side: connect to the daemon, send the request and wait for
    /// it to be accepted.
    pub async fn connect(request: &mut Request, opts: &TransferOptions) -> Result<Self> {
        let addr = request.remote_addr();
        let mut stream = tokio::time::timeout(opts.io_timeout(), TcpStream::connect(&addr))
            .await
            .map_err(|_| SyncError::Timeout("connecting to daemon"))??;
        tracing::debug!("Connected to {}", addr);

        // Datagrams go out on the same address family as the control stream
        let local = stream.local_addr()?;
        let socket = UdpSocket::bind(SocketAddr::new(unspecified(local.ip()), 0)).await?;
        request.requester_udp_port = socket.local_addr()?.port();

        write_message(&mut stream, &*request).await?;
        let response: RequestResponse =
            tokio::time::timeout(opts.io_timeout(), read_message(&mut stream))
                .await
                .map_err(|_| SyncError::Timeout("waiting for request response"))??;

        if !response.accepted {
            return Err(SyncError::Rejected(
                response.reason.unwrap_or_else(|| "no reason given".into()),
            ));
        }
        if response.request_id != request.id {
            return Err(SyncError::Protocol(format!(
                "response for request {} while waiting on {}",
                response.request_id, request.id
            )));
        }

        let peer_udp = SocketAddr::new(stream.peer_addr()?.ip(), response.udp_port);
        Ok(Self {
            stream,
            socket: Arc::new(socket),
            peer_udp,
        })
    }

    /// Daemon side: read a request, validate it and answer. Rejected
    /// requests are answered before the error is returned.
    pub async fn accept(
        mut stream: TcpStream,
        udp_port: u16,
        opts: &TransferOptions,
    ) -> Result<(Request, Self)> {
        let request: Request = tokio::time::timeout(opts.io_timeout(), read_message(&mut stream))
            .await
            .map_err(|_| SyncError::Timeout("waiting for request"))??;

        let verdict = match request.role {
            Role::Local => Err(SyncError::InvalidRequest(
                "a daemon cannot serve a local transfer".into(),
            )),
            _ => request.verify(),
        };
        if let Err(e) = verdict {
            write_message(&mut stream, &RequestResponse::reject(&request, e.to_string())).await?;
            return Err(e);
        }

        let local = stream.local_addr()?;
        let socket = match UdpSocket::bind(SocketAddr::new(local.ip(), udp_port)).await {
            Ok(socket) => socket,
            Err(e) => {
                let reason = format!("cannot bind datagram socket: {}", e);
                write_message(&mut stream, &RequestResponse::reject(&request, &reason)).await?;
                return Err(e.into());
            }
        };

        let response = RequestResponse::accept(&request, socket.local_addr()?.port());
        write_message(&mut stream, &response).await?;

        let peer_udp = SocketAddr::new(stream.peer_addr()?.ip(), request.requester_udp_port);
        tracing::info!(
            "Accepted transfer {} ({:?}) from {}",
            request.id,
            request.role,
            peer_udp
        );

        Ok((
            request,
            Self {
                stream,
                socket: Arc::new(socket),
                peer_udp,
            },
        ))
    }
}

fn unspecified(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_handshake_exchanges_udp_ports() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let opts = TransferOptions::default();

        let daemon = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            Session::accept(stream, 0, &TransferOptions::default()).await
        });

        let mut request = Request::local("/src", "/dst");
        request.role = Role::Outgoing;
        request.host = "127.0.0.1".into();
        request.port = port;

        let client = Session::connect(&mut request, &opts).await.unwrap();
        let (received, server) = daemon.await.unwrap().unwrap();

        assert_eq!(received.id, request.id);
        assert_ne!(request.requester_udp_port, 0);
        assert_eq!(server.peer_udp.port(), request.requester_udp_port);
        assert_eq!(client.peer_udp.port(), server.socket.local_addr().unwrap().port());
    }

    #[tokio::test]
    async fn test_invalid_request_rejected_with_reason() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let daemon = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            Session::accept(stream, 0, &TransferOptions::default()).await
        });

        let mut request = Request::local("/src", "relative/dst");
        request.role = Role::Incoming;
        request.host = "127.0.0.1".into();
        request.port = port;

        let result = Session::connect(&mut request, &TransferOptions::default()).await;
        match result {
            Err(SyncError::Rejected(reason)) => assert!(reason.contains("absolute")),
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("request should have been rejected"),
        }
        assert!(matches!(
            daemon.await.unwrap(),
            Err(SyncError::InvalidRequest(_))
        ));
    }
}
