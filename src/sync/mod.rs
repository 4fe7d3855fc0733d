//! Transfer orchestration.
//!
//! Spawns the stages and loops for one side of a transfer, waits for the
//! manager to report completion, and returns the statistics or the first
//! error any task recorded.

use crate::error::{Result, SyncError};
use crate::request::{Request, Role};
use crate::transfer::manager::{
    DestinationManager, LocalManager, Manager, Phase, SourceManager,
};
use crate::transfer::options::TransferOptions;
use crate::transfer::stats::TransferStats;
use crate::transfer::{decoder, differ, patcher, signer, walker};
use crate::transport::{status, udp, Session};
use std::sync::Arc;
use tokio::task::{JoinHandle, JoinSet};

/// Run a transfer described by `request`, contacting a daemon if either
/// side is remote.
pub async fn initiate_sync(mut request: Request, opts: &TransferOptions) -> Result<TransferStats> {
    request.verify()?;
    opts.validate()?;
    tracing::info!(
        "Starting {:?} transfer {}: {} -> {}",
        request.role,
        request.id,
        request.source.display(),
        request.destination.display()
    );

    match request.role {
        Role::Local => sync_local(request, opts).await,
        Role::Outgoing => {
            let session = Session::connect(&mut request, opts).await?;
            sync_outgoing(request, session, opts).await
        }
        Role::Incoming => {
            let session = Session::connect(&mut request, opts).await?;
            sync_incoming(request, session, opts).await
        }
    }
}

/// Both roots on this machine: all four stages share one manager.
pub async fn sync_local(request: Request, opts: &TransferOptions) -> Result<TransferStats> {
    request.verify()?;
    opts.validate()?;
    let manager = Arc::new(LocalManager::new(request, opts));
    let mut tasks = JoinSet::new();

    let m = Arc::clone(&manager);
    tasks.spawn(async move { walker::walk(&*m).await });
    let m = Arc::clone(&manager);
    tasks.spawn(async move { signer::sign(&*m).await });
    let m = Arc::clone(&manager);
    tasks.spawn(async move { differ::diff(&*m).await });
    let m = Arc::clone(&manager);
    tasks.spawn(async move { patcher::patch(&*m).await });

    wait(&*manager, tasks, None, opts).await
}

/// This side is the source: walk and diff locally, sign and patch remotely.
pub async fn sync_outgoing(
    request: Request,
    session: Session,
    opts: &TransferOptions,
) -> Result<TransferStats> {
    let manager = Arc::new(SourceManager::new(request, opts));
    let Session {
        mut stream,
        socket,
        peer_udp,
    } = session;
    let mut tasks = spawn_datagram_loops(&manager, &socket, peer_udp, opts);

    let m = Arc::clone(&manager);
    tasks.spawn(async move { walker::walk(&*m).await });
    let m = Arc::clone(&manager);
    tasks.spawn(async move { differ::diff(&*m).await });

    let m = Arc::clone(&manager);
    let o = opts.clone();
    let control = tokio::spawn(async move { status::source_loop(&mut stream, &m, &o).await });

    wait(&*manager, tasks, Some(control), opts).await
}

/// This side is the destination: sign and patch locally.
pub async fn sync_incoming(
    request: Request,
    session: Session,
    opts: &TransferOptions,
) -> Result<TransferStats> {
    let manager = Arc::new(DestinationManager::new(request, opts));
    let Session {
        mut stream,
        socket,
        peer_udp,
    } = session;
    let mut tasks = spawn_datagram_loops(&manager, &socket, peer_udp, opts);

    let m = Arc::clone(&manager);
    tasks.spawn(async move { signer::sign(&*m).await });
    let m = Arc::clone(&manager);
    tasks.spawn(async move { patcher::patch(&*m).await });

    let m = Arc::clone(&manager);
    let o = opts.clone();
    let control =
        tokio::spawn(async move { status::destination_loop(&mut stream, &m, &o).await });

    wait(&*manager, tasks, Some(control), opts).await
}

/// Decoder plus the datagram sender and receiver, common to both network
/// roles.
fn spawn_datagram_loops<M>(
    manager: &Arc<M>,
    socket: &Arc<tokio::net::UdpSocket>,
    peer: std::net::SocketAddr,
    opts: &TransferOptions,
) -> JoinSet<()>
where
    M: crate::transfer::manager::NetworkManager + 'static,
{
    let mut tasks = JoinSet::new();

    let (m, o) = (Arc::clone(manager), opts.clone());
    tasks.spawn(async move { decoder::decode(&*m, &o).await });

    let (m, s) = (Arc::clone(manager), Arc::clone(socket));
    tasks.spawn(async move { udp::send_packets(&*m, &s, peer).await });

    let (m, s, o) = (Arc::clone(manager), Arc::clone(socket), opts.clone());
    tasks.spawn(async move { udp::receive_packets(&*m, &s, peer, &o).await });

    tasks
}

/// Wait for the manager to finish and collect the result.
///
/// On failure the control loop gets up to one I/O timeout to tell the peer
/// before every task is aborted.
async fn wait<M: Manager + ?Sized>(
    manager: &M,
    mut tasks: JoinSet<()>,
    control: Option<JoinHandle<()>>,
    opts: &TransferOptions,
) -> Result<TransferStats> {
    let phase = manager.finished().await;

    if phase == Phase::Failed {
        if let Some(control) = control {
            if tokio::time::timeout(opts.io_timeout(), control).await.is_err() {
                tracing::debug!("Status loop did not stop in time");
            }
        }
        tasks.abort_all();
        while tasks.join_next().await.is_some() {}

        return Err(manager
            .take_error()
            .unwrap_or_else(|| SyncError::Protocol("transfer failed without an error".into())));
    }

    if let Some(control) = control {
        control.await?;
    }
    while let Some(joined) = tasks.join_next().await {
        joined?;
    }

    // A task may still have failed while winding down
    if let Some(e) = manager.take_error() {
        return Err(e);
    }

    let stats = manager.stats();
    tracing::info!(
        "Transfer {} complete: {} files, {} bytes sent, {} bytes unchanged",
        manager.request().id,
        stats.files,
        stats.bytes_sent,
        stats.bytes_same
    );
    Ok(stats)
}
