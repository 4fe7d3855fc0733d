//! Reliability-status loops over the control connection.
//!
//! The source drives the exchange: it writes its status, reads the
//! destination's reply, applies it and sleeps for the status interval. The
//! destination answers every source status with its own. The exchange ends
//! when the destination reports the patch complete, or after either side
//! sends a failure.
//!
//! On a clean finish the two sides trade `RequestDone`: source writes then
//! reads, destination reads then writes.

use crate::error::{Result, SyncError};
use crate::transfer::manager::{DestinationManager, Manager, NetworkManager, SourceManager};
use crate::transfer::options::TransferOptions;
use crate::transfer::status::{DestinationTransferStatus, RequestDone, SourceTransferStatus};
use crate::transport::frame::{read_message, write_message, Message};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};

async fn send<S, T>(stream: &mut S, msg: &T, limit: Duration) -> Result<()>
where
    S: AsyncWrite + Unpin,
    T: Message,
{
    tokio::time::timeout(limit, write_message(stream, msg))
        .await
        .map_err(|_| SyncError::Timeout("writing status"))?
}

async fn recv<S, T>(stream: &mut S, limit: Duration) -> Result<T>
where
    S: AsyncRead + Unpin,
    T: Message,
{
    tokio::time::timeout(limit, read_message(stream))
        .await
        .map_err(|_| SyncError::Timeout("reading status"))?
}

// =============================================================================
// Source
// =============================================================================

pub async fn source_loop<S>(stream: &mut S, manager: &SourceManager, opts: &TransferOptions)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if let Err(e) = run_source(stream, manager, opts).await {
        manager.report_error(e);
    }
    manager.tcp_done();
}

async fn run_source<S>(stream: &mut S, manager: &SourceManager, opts: &TransferOptions) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let limit = opts.io_timeout();

    loop {
        let status = manager.outgoing_status();
        let failed = status.failed.is_some();
        send(stream, &status, limit).await?;
        if failed {
            return Ok(());
        }

        let dest: DestinationTransferStatus = recv(stream, limit).await?;
        manager.receive_status_update(&dest).await?;

        if manager.is_done() {
            break;
        }
        if !manager.is_failed() {
            tokio::time::sleep(opts.status_interval()).await;
        }
    }

    send(stream, &RequestDone, limit).await?;
    let _: RequestDone = recv(stream, limit).await?;
    tracing::debug!("Source status exchange complete");
    Ok(())
}

// =============================================================================
// Destination
// =============================================================================

pub async fn destination_loop<S>(
    stream: &mut S,
    manager: &DestinationManager,
    opts: &TransferOptions,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if let Err(e) = run_destination(stream, manager, opts).await {
        manager.report_error(e);
    }
    manager.tcp_done();
}

async fn run_destination<S>(
    stream: &mut S,
    manager: &DestinationManager,
    opts: &TransferOptions,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let limit = opts.io_timeout();

    loop {
        let source: SourceTransferStatus = recv(stream, limit).await?;
        manager.receive_status_update(&source).await?;

        let status = manager.outgoing_status();
        send(stream, &status, limit).await?;
        if status.failed.is_some() {
            return Ok(());
        }
        if status.patch_done {
            break;
        }
    }

    let _: RequestDone = recv(stream, limit).await?;
    send(stream, &RequestDone, limit).await?;
    tracing::debug!("Destination status exchange complete");
    Ok(())
}
