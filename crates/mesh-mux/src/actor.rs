//! Multiplexer actor
//!
//! All arbitration between client sessions and the single radio link happens
//! in this actor. Session tasks and the transport tasks only exchange bytes
//! with it through channels, so every ordering decision is made in one place:
//!
//! - Client submissions are forwarded to the radio in the order the actor
//!   receives them, each as one contiguous write.
//! - Radio bytes fan out to every registered session through a broadcast
//!   channel. A session only ever receives radio traffic, never another
//!   session's submissions and never its own.
//! - While the radio link is down, submissions are held in a bounded queue
//!   and flushed in order when the link returns.
//!
//! The actor also taps both byte streams into per-direction frame codecs for
//! the event log. Observation is diagnostic only and never gates forwarding.

use std::collections::{HashMap, VecDeque};

use mesh_protocol::{Direction, FrameCodec, FrameEvent};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::config::MuxConfig;
use crate::logger::EventLogger;
use crate::session::{SessionId, SessionMeta};

/// Commands sent to the multiplexer actor
#[derive(Debug)]
pub enum MuxCommand {
    /// Register a new client session
    RegisterSession {
        /// Session metadata
        meta: SessionMeta,
        /// Channel to send back the session's radio traffic subscription
        response: oneshot::Sender<broadcast::Receiver<Vec<u8>>>,
    },

    /// Remove a client session
    UnregisterSession {
        /// Session to remove
        id: SessionId,
    },

    /// Bytes submitted by a client session for the radio
    SubmitWrite {
        /// Submitting session
        id: SessionId,
        /// Raw bytes, forwarded as one contiguous write
        data: Vec<u8>,
    },

    /// Bytes read from the radio link
    TransportBytes {
        /// Raw bytes as read
        data: Vec<u8>,
    },

    /// The radio link is (re)established
    TransportUp {
        /// Queue feeding the transport writer task
        write_tx: mpsc::Sender<Vec<u8>>,
    },

    /// The radio link was lost
    TransportDown,

    /// Submissions the transport writer accepted but never sent, returned
    /// by the supervisor after link loss
    ReclaimWrites {
        /// Unsent submissions, oldest first
        data: Vec<Vec<u8>>,
    },

    /// Shut down the actor
    Shutdown,
}

struct MuxState {
    sessions: HashMap<SessionId, SessionMeta>,
    /// Fan-out of radio bytes to all sessions; kept alive even with no
    /// subscribers so late sessions can join
    radio_tx: broadcast::Sender<Vec<u8>>,
    /// Writer queue for the current link, `None` while disconnected
    write_tx: Option<mpsc::Sender<Vec<u8>>>,
    /// Submissions held during an outage, oldest first
    pending: VecDeque<Vec<u8>>,
    to_radio: FrameCodec,
    from_radio: FrameCodec,
    logger: EventLogger,
    config: MuxConfig,
}

impl MuxState {
    fn new(logger: EventLogger, config: MuxConfig) -> Self {
        let (radio_tx, _) = broadcast::channel(config.broadcast_capacity);
        Self {
            sessions: HashMap::new(),
            radio_tx,
            write_tx: None,
            pending: VecDeque::new(),
            to_radio: FrameCodec::new(Direction::ToRadio),
            from_radio: FrameCodec::new(Direction::FromRadio),
            logger,
            config,
        }
    }

    /// Tap a byte chunk into the observation codec for its direction
    fn observe(&mut self, direction: Direction, data: &[u8]) {
        if !self.logger.enabled() {
            return;
        }
        let codec = match direction {
            Direction::ToRadio => &mut self.to_radio,
            Direction::FromRadio => &mut self.from_radio,
        };
        codec.push_bytes(data);
        while let Some(event) = codec.next_event() {
            match event {
                FrameEvent::Frame(frame) => self.logger.log_frame(&frame),
                FrameEvent::Desync { skipped } => self.logger.log_desync(direction, skipped),
            }
        }
    }

    async fn forward_to_radio(&mut self, data: Vec<u8>) {
        if let Some(tx) = &self.write_tx {
            if let Err(e) = tx.send(data).await {
                // Writer task is gone; the link is effectively down
                warn!("radio writer queue closed, holding submission");
                self.write_tx = None;
                self.hold(e.0);
            }
        } else {
            self.hold(data);
        }
    }

    fn hold(&mut self, data: Vec<u8>) {
        if self.pending.len() >= self.config.pending_limit {
            warn!(
                "pending buffer full ({} submissions), dropping {} bytes",
                self.pending.len(),
                data.len()
            );
            return;
        }
        self.pending.push_back(data);
    }

    async fn flush_pending(&mut self) {
        while let Some(data) = self.pending.pop_front() {
            let Some(tx) = &self.write_tx else {
                self.pending.push_front(data);
                return;
            };
            if let Err(e) = tx.send(data).await {
                self.write_tx = None;
                self.pending.push_front(e.0);
                return;
            }
        }
    }
}

/// Run the multiplexer actor until shutdown
///
/// Session tasks, the proxy server, and the reconnect supervisor all hold
/// clones of the command sender; the actor exits when every sender is
/// dropped or a [`MuxCommand::Shutdown`] arrives.
pub async fn run_mux_actor(
    mut cmd_rx: mpsc::Receiver<MuxCommand>,
    logger: EventLogger,
    config: MuxConfig,
) {
    let mut state = MuxState::new(logger, config);
    info!("multiplexer actor started");

    while let Some(cmd) = cmd_rx.recv().await {
        match cmd {
            MuxCommand::RegisterSession { meta, response } => {
                let id = meta.id;
                let peer = meta.peer;
                state.sessions.insert(id, meta);
                // The subscription starts here: no backfill of radio
                // traffic that predates the session.
                let _ = response.send(state.radio_tx.subscribe());
                info!(
                    "client connected: {} (session {}, {} active)",
                    peer,
                    id.0,
                    state.sessions.len()
                );
            }

            MuxCommand::UnregisterSession { id } => {
                if let Some(meta) = state.sessions.remove(&id) {
                    info!(
                        "client disconnected: {} (session {}, connected {:.0?}, {} active)",
                        meta.peer,
                        id.0,
                        meta.connected_at.elapsed(),
                        state.sessions.len()
                    );
                }
            }

            MuxCommand::SubmitWrite { id, data } => {
                debug!("session {} submitted {} bytes", id.0, data.len());
                state.observe(Direction::ToRadio, &data);
                state.forward_to_radio(data).await;
            }

            MuxCommand::TransportBytes { data } => {
                state.observe(Direction::FromRadio, &data);
                // Err means no session is currently subscribed
                let _ = state.radio_tx.send(data);
            }

            MuxCommand::TransportUp { write_tx } => {
                state.write_tx = Some(write_tx);
                if !state.pending.is_empty() {
                    info!(
                        "radio link up, flushing {} held submission(s)",
                        state.pending.len()
                    );
                }
                state.flush_pending().await;
            }

            MuxCommand::TransportDown => {
                state.write_tx = None;
                debug!("radio link down, holding client submissions");
            }

            MuxCommand::ReclaimWrites { data } => {
                // These predate anything held since the loss, so they go to
                // the front of the pending buffer in their original order
                debug!("reclaiming {} unsent submission(s)", data.len());
                for item in data.into_iter().rev() {
                    state.pending.push_front(item);
                }
                let limit = state.config.pending_limit;
                if state.pending.len() > limit {
                    warn!(
                        "pending buffer over limit after reclaim, dropping {} newest submission(s)",
                        state.pending.len() - limit
                    );
                    state.pending.truncate(limit);
                }
            }

            MuxCommand::Shutdown => {
                info!("multiplexer actor shutting down");
                break;
            }
        }
    }

    info!("multiplexer actor stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    fn spawn_actor(
        config: MuxConfig,
    ) -> (mpsc::Sender<MuxCommand>, tokio::task::JoinHandle<()>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let logger = EventLogger::new(crate::logger::EventLogLevel::Off, false);
        let handle = tokio::spawn(run_mux_actor(cmd_rx, logger, config));
        (cmd_tx, handle)
    }

    async fn register(
        cmd_tx: &mpsc::Sender<MuxCommand>,
        id: u64,
    ) -> broadcast::Receiver<Vec<u8>> {
        let peer: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        let (resp_tx, resp_rx) = oneshot::channel();
        cmd_tx
            .send(MuxCommand::RegisterSession {
                meta: SessionMeta {
                    id: SessionId(id),
                    peer,
                    connected_at: std::time::Instant::now(),
                },
                response: resp_tx,
            })
            .await
            .unwrap();
        resp_rx.await.unwrap()
    }

    #[tokio::test]
    async fn radio_bytes_fan_out_to_all_sessions() {
        let (cmd_tx, actor) = spawn_actor(MuxConfig::default());
        let mut rx_a = register(&cmd_tx, 1).await;
        let mut rx_b = register(&cmd_tx, 2).await;

        cmd_tx
            .send(MuxCommand::TransportBytes {
                data: vec![1, 2, 3],
            })
            .await
            .unwrap();

        assert_eq!(rx_a.recv().await.unwrap(), vec![1, 2, 3]);
        assert_eq!(rx_b.recv().await.unwrap(), vec![1, 2, 3]);

        cmd_tx.send(MuxCommand::Shutdown).await.unwrap();
        actor.await.unwrap();
    }

    #[tokio::test]
    async fn submissions_never_echo_back() {
        let (cmd_tx, actor) = spawn_actor(MuxConfig::default());
        let mut rx = register(&cmd_tx, 1).await;

        let (write_tx, mut write_rx) = mpsc::channel(8);
        cmd_tx
            .send(MuxCommand::TransportUp { write_tx })
            .await
            .unwrap();
        cmd_tx
            .send(MuxCommand::SubmitWrite {
                id: SessionId(1),
                data: vec![9, 9, 9],
            })
            .await
            .unwrap();

        // The radio sees the submission
        assert_eq!(write_rx.recv().await.unwrap(), vec![9, 9, 9]);

        // No session does, not even the submitter
        cmd_tx
            .send(MuxCommand::TransportBytes { data: vec![7] })
            .await
            .unwrap();
        assert_eq!(rx.recv().await.unwrap(), vec![7]);

        cmd_tx.send(MuxCommand::Shutdown).await.unwrap();
        actor.await.unwrap();
    }

    #[tokio::test]
    async fn outage_holds_submissions_and_flushes_in_order() {
        let (cmd_tx, actor) = spawn_actor(MuxConfig::default());
        let _rx = register(&cmd_tx, 1).await;

        // No TransportUp yet: submissions are held
        for n in 0u8..3 {
            cmd_tx
                .send(MuxCommand::SubmitWrite {
                    id: SessionId(1),
                    data: vec![n],
                })
                .await
                .unwrap();
        }

        let (write_tx, mut write_rx) = mpsc::channel(8);
        cmd_tx
            .send(MuxCommand::TransportUp { write_tx })
            .await
            .unwrap();

        for n in 0u8..3 {
            assert_eq!(write_rx.recv().await.unwrap(), vec![n]);
        }

        cmd_tx.send(MuxCommand::Shutdown).await.unwrap();
        actor.await.unwrap();
    }

    #[tokio::test]
    async fn pending_buffer_drops_newest_when_full() {
        let config = MuxConfig {
            pending_limit: 2,
            ..MuxConfig::default()
        };
        let (cmd_tx, actor) = spawn_actor(config);

        for n in 0u8..4 {
            cmd_tx
                .send(MuxCommand::SubmitWrite {
                    id: SessionId(1),
                    data: vec![n],
                })
                .await
                .unwrap();
        }

        let (write_tx, mut write_rx) = mpsc::channel(8);
        cmd_tx
            .send(MuxCommand::TransportUp { write_tx })
            .await
            .unwrap();

        // Only the two oldest survive
        assert_eq!(write_rx.recv().await.unwrap(), vec![0]);
        assert_eq!(write_rx.recv().await.unwrap(), vec![1]);

        cmd_tx.send(MuxCommand::Shutdown).await.unwrap();
        actor.await.unwrap();
        assert!(write_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn reclaimed_submissions_flush_before_held_ones() {
        let (cmd_tx, actor) = spawn_actor(MuxConfig::default());

        // Link down: a fresh submission is held
        cmd_tx.send(MuxCommand::TransportDown).await.unwrap();
        cmd_tx
            .send(MuxCommand::SubmitWrite {
                id: SessionId(1),
                data: vec![9],
            })
            .await
            .unwrap();

        // The old writer hands back what it never sent; those are older
        cmd_tx
            .send(MuxCommand::ReclaimWrites {
                data: vec![vec![1], vec![2]],
            })
            .await
            .unwrap();

        let (write_tx, mut write_rx) = mpsc::channel(8);
        cmd_tx
            .send(MuxCommand::TransportUp { write_tx })
            .await
            .unwrap();

        assert_eq!(write_rx.recv().await.unwrap(), vec![1]);
        assert_eq!(write_rx.recv().await.unwrap(), vec![2]);
        assert_eq!(write_rx.recv().await.unwrap(), vec![9]);

        cmd_tx.send(MuxCommand::Shutdown).await.unwrap();
        actor.await.unwrap();
    }

    #[tokio::test]
    async fn link_loss_between_submissions() {
        let (cmd_tx, actor) = spawn_actor(MuxConfig::default());

        let (write_tx, mut write_rx) = mpsc::channel(8);
        cmd_tx
            .send(MuxCommand::TransportUp { write_tx })
            .await
            .unwrap();
        cmd_tx
            .send(MuxCommand::SubmitWrite {
                id: SessionId(1),
                data: vec![1],
            })
            .await
            .unwrap();
        cmd_tx.send(MuxCommand::TransportDown).await.unwrap();
        cmd_tx
            .send(MuxCommand::SubmitWrite {
                id: SessionId(1),
                data: vec![2],
            })
            .await
            .unwrap();

        let (write_tx2, mut write_rx2) = mpsc::channel(8);
        cmd_tx
            .send(MuxCommand::TransportUp { write_tx: write_tx2 })
            .await
            .unwrap();

        assert_eq!(write_rx.recv().await.unwrap(), vec![1]);
        assert_eq!(write_rx2.recv().await.unwrap(), vec![2]);

        cmd_tx.send(MuxCommand::Shutdown).await.unwrap();
        actor.await.unwrap();
    }
}
