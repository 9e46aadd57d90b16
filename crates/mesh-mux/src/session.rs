//! Client session handling
//!
//! Each TCP client gets two tasks: the session task reads client bytes and
//! submits them to the multiplexer, and a drain task copies the session's
//! radio traffic subscription back to the socket. The two directions never
//! touch, so a slow client cannot stall radio reads and vice versa.

use std::net::SocketAddr;
use std::time::Instant;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, warn};

use crate::actor::MuxCommand;

/// Opaque session identity, unique for the lifetime of the proxy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub u64);

/// Session metadata held by the multiplexer
#[derive(Debug, Clone)]
pub struct SessionMeta {
    /// Session identity
    pub id: SessionId,
    /// Client socket address
    pub peer: SocketAddr,
    /// When the client connected
    pub connected_at: Instant,
}

/// Serve one client connection until it closes
pub async fn run_client_session(
    stream: TcpStream,
    meta: SessionMeta,
    mux_tx: mpsc::Sender<MuxCommand>,
) {
    let id = meta.id;

    let (resp_tx, resp_rx) = oneshot::channel();
    if mux_tx
        .send(MuxCommand::RegisterSession {
            meta,
            response: resp_tx,
        })
        .await
        .is_err()
    {
        return;
    }
    let Ok(mut radio_rx) = resp_rx.await else {
        return;
    };

    let (mut read_half, mut write_half) = stream.into_split();

    // Drain task: radio traffic to the client socket
    let drain = tokio::spawn(async move {
        loop {
            match radio_rx.recv().await {
                Ok(data) => {
                    if write_half.write_all(&data).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    // Slow client: oldest chunks were dropped, keep going
                    warn!("session {} fell behind, dropped {} radio chunk(s)", id.0, n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let mut buf = vec![0u8; 4096];
    loop {
        match read_half.read(&mut buf).await {
            Ok(0) => {
                debug!("session {} closed by client", id.0);
                break;
            }
            Ok(n) => {
                if mux_tx
                    .send(MuxCommand::SubmitWrite {
                        id,
                        data: buf[..n].to_vec(),
                    })
                    .await
                    .is_err()
                {
                    break;
                }
            }
            Err(e) => {
                debug!("session {} read error: {e}", id.0);
                break;
            }
        }
    }

    drain.abort();
    let _ = mux_tx.send(MuxCommand::UnregisterSession { id }).await;
}
