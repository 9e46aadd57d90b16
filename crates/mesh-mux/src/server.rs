//! TCP proxy server
//!
//! Accepts client connections and spawns a session task per client. The
//! listener is bound by the caller so bind failures surface at startup and
//! tests can bind to an ephemeral port.

use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::actor::MuxCommand;
use crate::session::{run_client_session, SessionId, SessionMeta};

/// Accept clients forever
pub async fn run_proxy_server(listener: TcpListener, mux_tx: mpsc::Sender<MuxCommand>) {
    if let Ok(addr) = listener.local_addr() {
        info!("listening on {addr}");
    }

    let mut next_id: u64 = 1;
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let meta = SessionMeta {
                    id: SessionId(next_id),
                    peer,
                    connected_at: std::time::Instant::now(),
                };
                next_id += 1;
                tokio::spawn(run_client_session(stream, meta, mux_tx.clone()));
            }
            Err(e) => {
                // Transient accept errors (fd exhaustion etc.); keep serving
                warn!("accept failed: {e}");
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}
