//! Daemon mode - runs when invoked as `dsyncd`
//!
//! Accepts one control connection per transfer. Each connection carries a
//! request; the daemon plays the opposite role of the requester.

use crate::config::DaemonConfig;
use crate::error::{Result, SyncError};
use crate::request::Role;
use crate::sync::{sync_incoming, sync_outgoing};
use crate::transfer::options::TransferOptions;
use crate::transfer::stats::TransferStats;
use crate::transport::Session;
use tokio::net::{TcpListener, TcpStream};

/// Main daemon entry point: listen until interrupted.
pub async fn serve(config: DaemonConfig) -> Result<()> {
    let listener = TcpListener::bind(config.listen_addr()).await?;
    tracing::info!("dsyncd listening on {}", listener.local_addr()?);

    run(listener, config).await
}

/// Accept loop on an already bound listener.
pub async fn run(listener: TcpListener, config: DaemonConfig) -> Result<()> {
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        tracing::warn!("Accept failed: {}", e);
                        continue;
                    }
                };
                tracing::debug!("Connection from {}", peer);

                let udp_port = config.udp_port;
                let opts = config.transfer.clone();
                tokio::spawn(async move {
                    match handle_connection(stream, udp_port, &opts).await {
                        Ok(stats) => tracing::info!(
                            "Transfer from {} complete: {} files, {} bytes sent",
                            peer,
                            stats.files,
                            stats.bytes_sent
                        ),
                        Err(e) => tracing::warn!("Transfer from {} failed: {}", peer, e),
                    }
                });
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                return Ok(());
            }
        }
    }
}

/// Serve one transfer request on `stream`.
pub async fn handle_connection(
    stream: TcpStream,
    udp_port: u16,
    opts: &TransferOptions,
) -> Result<TransferStats> {
    opts.validate()?;
    let (request, session) = Session::accept(stream, udp_port, opts).await?;

    match request.role {
        // Requester pushes: we are the destination
        Role::Outgoing => sync_incoming(request, session, opts).await,
        // Requester pulls: we are the source
        Role::Incoming => sync_outgoing(request, session, opts).await,
        Role::Local => Err(SyncError::InvalidRequest(
            "a daemon cannot serve a local transfer".into(),
        )),
    }
}
