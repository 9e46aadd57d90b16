//! Reconnect supervisor
//!
//! Owns the radio link lifecycle: connect, run the reader and writer tasks,
//! and on loss retry with jittered exponential backoff. Client sessions stay
//! up throughout; the multiplexer holds their submissions during the outage.
//!
//! The supervisor is generic over how a link is made, so tests can inject
//! virtual links and failure sequences without touching real hardware.

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

use crate::actor::MuxCommand;
use crate::config::ReconnectPolicy;
use crate::error::{MuxError, TransportError};
use crate::transport::{run_transport_reader, run_transport_writer, TransportLink};

/// Run the radio link under supervision until the retry budget is exhausted
/// or the multiplexer goes away
///
/// `connect` is called for each attempt and must produce a fresh link.
pub async fn run_reconnect_supervisor<C, F>(
    mut connect: C,
    policy: ReconnectPolicy,
    write_queue: usize,
    mux_tx: mpsc::Sender<MuxCommand>,
) -> Result<(), MuxError>
where
    C: FnMut() -> F,
    F: Future<Output = Result<TransportLink, TransportError>>,
{
    let mut failures: u32 = 0;
    let mut backoff = policy.floor;

    loop {
        let error = match timeout(policy.attempt_timeout, connect()).await {
            Ok(Ok(link)) => {
                info!("radio link up: {}", link.desc);
                failures = 0;
                let connected_at = Instant::now();

                let (write_tx, write_rx) = mpsc::channel(write_queue);
                if mux_tx
                    .send(MuxCommand::TransportUp { write_tx })
                    .await
                    .is_err()
                {
                    return Err(MuxError::ActorGone);
                }

                let writer = tokio::spawn(run_transport_writer(link.writer, write_rx));
                let error =
                    run_transport_reader(link.reader, mux_tx.clone(), policy.read_grace).await;

                // TransportDown drops the queue sender, which lets the
                // writer task finish; whatever it never sent goes back to
                // the actor's pending buffer.
                if mux_tx.send(MuxCommand::TransportDown).await.is_err() {
                    return Err(MuxError::ActorGone);
                }
                let unsent = writer.await.unwrap_or_default();
                if !unsent.is_empty() {
                    if mux_tx
                        .send(MuxCommand::ReclaimWrites { data: unsent })
                        .await
                        .is_err()
                    {
                        return Err(MuxError::ActorGone);
                    }
                }
                warn!("radio link lost: {error}");

                if connected_at.elapsed() >= policy.reset_after {
                    backoff = policy.floor;
                }
                error
            }
            Ok(Err(e)) => {
                warn!("connection attempt failed: {e}");
                e
            }
            Err(_) => {
                warn!(
                    "connection attempt timed out after {:?}",
                    policy.attempt_timeout
                );
                TransportError::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "connection attempt timed out",
                ))
            }
        };

        if mux_tx.is_closed() {
            return Err(MuxError::ActorGone);
        }

        failures += 1;
        if let Some(max) = policy.max_retries {
            if failures > max {
                return Err(MuxError::RetriesExhausted {
                    attempts: failures,
                    last: error,
                });
            }
        }

        let delay = jittered(backoff);
        debug!("retrying radio link in {:.1}s", delay.as_secs_f64());
        tokio::time::sleep(delay).await;
        backoff = (backoff * 2).min(policy.ceil);
    }
}

/// Spread retries over 0.5x to 1.5x of the nominal delay
fn jittered(delay: Duration) -> Duration {
    delay.mul_f64(0.5 + rand::random::<f64>())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_policy(max_retries: Option<u32>) -> ReconnectPolicy {
        ReconnectPolicy {
            floor: Duration::from_millis(1),
            ceil: Duration::from_millis(5),
            max_retries,
            attempt_timeout: Duration::from_millis(200),
            reset_after: Duration::from_millis(50),
            read_grace: None,
        }
    }

    #[tokio::test]
    async fn bounded_budget_yields_terminal_error() {
        let (mux_tx, mut mux_rx) = mpsc::channel(8);
        // Keep the actor side alive without consuming
        let drain = tokio::spawn(async move { while mux_rx.recv().await.is_some() {} });

        let result = run_reconnect_supervisor(
            || async {
                Err::<TransportLink, _>(TransportError::DeviceNotFound("test".into()))
            },
            fast_policy(Some(2)),
            8,
            mux_tx,
        )
        .await;

        match result {
            Err(MuxError::RetriesExhausted { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("expected exhausted budget, got {other:?}"),
        }
        drain.abort();
    }

    #[tokio::test]
    async fn supervisor_announces_link_transitions() {
        let (mux_tx, mut mux_rx) = mpsc::channel(8);

        let supervisor = tokio::spawn(run_reconnect_supervisor(
            move || async move {
                let (link, far) = TransportLink::virtual_pair(64);
                // Radio that immediately drops the link
                drop(far);
                Ok(link)
            },
            fast_policy(Some(0)),
            8,
            mux_tx,
        ));

        assert!(matches!(
            mux_rx.recv().await,
            Some(MuxCommand::TransportUp { .. })
        ));
        assert!(matches!(
            mux_rx.recv().await,
            Some(MuxCommand::TransportDown)
        ));
        assert!(matches!(
            supervisor.await.unwrap(),
            Err(MuxError::RetriesExhausted { .. })
        ));
    }

    #[tokio::test]
    async fn unsent_writes_return_to_the_actor() {
        let (mux_tx, mut mux_rx) = mpsc::channel(8);

        let supervisor = tokio::spawn(run_reconnect_supervisor(
            move || async move {
                let (link, far) = TransportLink::virtual_pair(64);
                // Dead peer: reads see EOF, writes fail
                drop(far);
                Ok(link)
            },
            fast_policy(Some(0)),
            8,
            mux_tx,
        ));

        let Some(MuxCommand::TransportUp { write_tx }) = mux_rx.recv().await else {
            panic!("expected the link to come up");
        };
        // Queue a submission the dead link can never take
        write_tx.send(vec![7u8, 7]).await.unwrap();
        drop(write_tx);

        assert!(matches!(
            mux_rx.recv().await,
            Some(MuxCommand::TransportDown)
        ));
        match mux_rx.recv().await {
            Some(MuxCommand::ReclaimWrites { data }) => {
                assert_eq!(data, vec![vec![7u8, 7]]);
            }
            other => panic!("expected reclaimed writes, got {other:?}"),
        }
        assert!(matches!(
            supervisor.await.unwrap(),
            Err(MuxError::RetriesExhausted { .. })
        ));
    }
}
