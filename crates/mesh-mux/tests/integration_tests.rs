//! End-to-end tests over real TCP sockets and a simulated radio
//!
//! The radio side is a virtual in-process link served by `mesh-sim`; the
//! client side uses real TCP connections through the proxy server, so these
//! tests exercise the full path: socket, session tasks, multiplexer actor,
//! supervisor, transport tasks.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use mesh_mux::{
    run_mux_actor, run_proxy_server, run_reconnect_supervisor, run_transport_writer,
    EventLogLevel, EventLogger, MuxCommand, MuxConfig, ReconnectPolicy, SessionId, TransportError,
    TransportLink,
};
use mesh_protocol::{encode_frame, Direction, FrameCodec, FrameEvent};
use mesh_sim::{run_sim_radio, FailurePlan, SimRadio};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};

mod helpers {
    use super::*;

    /// A running proxy wired to a link feed instead of real hardware
    pub struct TestProxy {
        pub addr: SocketAddr,
        pub link_tx: mpsc::Sender<TransportLink>,
        pub mux_tx: mpsc::Sender<MuxCommand>,
    }

    pub fn fast_policy() -> ReconnectPolicy {
        ReconnectPolicy {
            floor: Duration::from_millis(5),
            ceil: Duration::from_millis(20),
            max_retries: None,
            attempt_timeout: Duration::from_secs(5),
            reset_after: Duration::from_millis(100),
            read_grace: None,
        }
    }

    /// Start actor, TCP server, and supervisor; links are injected through
    /// the returned feed channel
    pub async fn start_proxy() -> TestProxy {
        let (mux_tx, mux_rx) = mpsc::channel(256);
        let logger = EventLogger::new(EventLogLevel::Off, false);
        tokio::spawn(run_mux_actor(mux_rx, logger, MuxConfig::default()));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(run_proxy_server(listener, mux_tx.clone()));

        let (link_tx, link_rx) = mpsc::channel::<TransportLink>(4);
        let links = Arc::new(Mutex::new(link_rx));
        tokio::spawn(run_reconnect_supervisor(
            move || {
                let links = links.clone();
                async move {
                    links
                        .lock()
                        .await
                        .recv()
                        .await
                        .ok_or(TransportError::Closed)
                }
            },
            fast_policy(),
            64,
            mux_tx.clone(),
        ));

        TestProxy {
            addr,
            link_tx,
            mux_tx,
        }
    }

    /// Feed the proxy a fresh virtual link served by a simulated radio
    pub async fn attach_sim_radio(proxy: &TestProxy, plan: FailurePlan) {
        let (link, far) = TransportLink::virtual_pair(4096);
        tokio::spawn(run_sim_radio(far, SimRadio::new("SimRadio"), plan));
        proxy.link_tx.send(link).await.unwrap();
    }

    pub fn appstart_cmd() -> Vec<u8> {
        let mut payload = vec![0x01, 0x03];
        payload.extend_from_slice(b"test_client");
        encode_frame(&payload).unwrap()
    }

    /// Read one framed payload from a client socket
    pub async fn read_frame(stream: &mut TcpStream) -> Vec<u8> {
        let mut header = [0u8; 3];
        stream.read_exact(&mut header).await.unwrap();
        assert_eq!(header[0], 0x3C, "response must start with the frame marker");
        let len = u16::from_le_bytes([header[1], header[2]]) as usize;
        let mut payload = vec![0u8; len];
        stream.read_exact(&mut payload).await.unwrap();
        payload
    }
}

use helpers::*;

#[tokio::test]
async fn appstart_round_trip_over_tcp() {
    let proxy = start_proxy().await;
    attach_sim_radio(&proxy, FailurePlan::default()).await;

    let mut client = TcpStream::connect(proxy.addr).await.unwrap();
    client.write_all(&appstart_cmd()).await.unwrap();

    let payload = read_frame(&mut client).await;
    assert_eq!(payload[0], 0x05, "expected SELF_INFO");
    let name = String::from_utf8_lossy(&payload[payload.len() - 8..]);
    assert_eq!(name, "SimRadio");
}

#[tokio::test]
async fn responses_fan_out_and_commands_never_echo() {
    let proxy = start_proxy().await;
    attach_sim_radio(&proxy, FailurePlan::default()).await;

    let mut sender = TcpStream::connect(proxy.addr).await.unwrap();
    let mut watcher = TcpStream::connect(proxy.addr).await.unwrap();
    // Let both sessions register before traffic flows
    tokio::time::sleep(Duration::from_millis(50)).await;

    sender
        .write_all(&encode_frame(&[0x05]).unwrap()) // CMD_GET_TIME
        .await
        .unwrap();

    // Both sessions see the radio's response
    let for_sender = read_frame(&mut sender).await;
    let for_watcher = read_frame(&mut watcher).await;
    assert_eq!(for_sender[0], 0x09, "expected CURRENT_TIME");
    assert_eq!(for_sender, for_watcher);

    // Neither session ever saw the command itself: the first byte either
    // received was the response frame marker, and nothing else is pending
    let mut probe = [0u8; 1];
    let pending = tokio::time::timeout(
        Duration::from_millis(100),
        watcher.read(&mut probe),
    )
    .await;
    assert!(pending.is_err(), "watcher should have no further traffic");
}

#[tokio::test]
async fn sessions_survive_radio_outage() {
    let proxy = start_proxy().await;
    // First link dies after answering one command
    attach_sim_radio(
        &proxy,
        FailurePlan {
            fail_after_frames: Some(1),
        },
    )
    .await;

    let mut client = TcpStream::connect(proxy.addr).await.unwrap();

    client
        .write_all(&encode_frame(&[0x05]).unwrap())
        .await
        .unwrap();
    let payload = read_frame(&mut client).await;
    assert_eq!(payload[0], 0x09);

    // The link is down now; this submission must be held, not lost
    tokio::time::sleep(Duration::from_millis(50)).await;
    client
        .write_all(&encode_frame(&[0x14]).unwrap()) // CMD_GET_BATTERY
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Replacement radio arrives; the held command is flushed to it
    attach_sim_radio(&proxy, FailurePlan::default()).await;

    let payload = read_frame(&mut client).await;
    assert_eq!(payload[0], 0x0C, "expected BATTERY after reconnect");
}

#[tokio::test]
async fn late_client_gets_no_backfill() {
    let proxy = start_proxy().await;
    attach_sim_radio(&proxy, FailurePlan::default()).await;

    let mut early = TcpStream::connect(proxy.addr).await.unwrap();
    early
        .write_all(&encode_frame(&[0x05]).unwrap())
        .await
        .unwrap();
    let payload = read_frame(&mut early).await;
    assert_eq!(payload[0], 0x09);

    // A client that connects after that exchange sees none of it
    let mut late = TcpStream::connect(proxy.addr).await.unwrap();
    let mut probe = [0u8; 1];
    let pending =
        tokio::time::timeout(Duration::from_millis(100), late.read(&mut probe)).await;
    assert!(pending.is_err(), "late client must not receive history");

    // Actor shutdown closes the fan-out, which ends both sessions
    proxy.mux_tx.send(MuxCommand::Shutdown).await.unwrap();
    assert_eq!(early.read(&mut probe).await.unwrap(), 0);
}

#[test]
fn appstart_exchange_renders_event_log() {
    // The same byte streams the actor taps: the client's framed command and
    // the radio's framed response, each through its direction's codec
    let mut radio = SimRadio::new("SimRadio");
    let mut cmd = vec![0x01, 0x03];
    cmd.extend_from_slice(b"test_client");
    let resp = radio.handle_command(&cmd).unwrap();

    let mut to_radio = FrameCodec::new(Direction::ToRadio);
    to_radio.push_bytes(&encode_frame(&cmd).unwrap());
    let Some(FrameEvent::Frame(cmd_frame)) = to_radio.next_event() else {
        panic!("command frame did not decode");
    };

    let mut from_radio = FrameCodec::new(Direction::FromRadio);
    from_radio.push_bytes(&encode_frame(&resp).unwrap());
    let Some(FrameEvent::Frame(resp_frame)) = from_radio.next_event() else {
        panic!("response frame did not decode");
    };

    // Summary mode: one line per frame, arrows matching direction
    let summary = EventLogger::new(EventLogLevel::Summary, false);
    let mut lines = summary.render(&cmd_frame);
    lines.extend(summary.render(&resp_frame));
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("-> CMD_APPSTART"), "got {:?}", lines[0]);
    assert!(lines[1].starts_with("<- SELF_INFO"), "got {:?}", lines[1]);
    assert!(lines[1].contains("name=SimRadio"));

    // Structured mode: one record per frame with direction and raw tag
    let json = EventLogger::new(EventLogLevel::Summary, true);
    let cmd_record: serde_json::Value =
        serde_json::from_str(&json.render(&cmd_frame)[0]).unwrap();
    let resp_record: serde_json::Value =
        serde_json::from_str(&json.render(&resp_frame)[0]).unwrap();
    assert_eq!(cmd_record["direction"], "TO_RADIO");
    assert_eq!(cmd_record["packet_type_raw"], 1);
    assert_eq!(resp_record["direction"], "FROM_RADIO");
    assert_eq!(resp_record["packet_type_raw"], 5);
    assert_eq!(resp_record["decoded"]["name"], "SimRadio");
}

#[tokio::test]
async fn concurrent_submissions_stay_contiguous() {
    // Drive the actor directly so each submission boundary is exact, with a
    // real writer task and virtual link carrying the bytes.
    const CLIENTS: usize = 4;
    const WRITES: usize = 25;
    const CHUNK: usize = 32;

    let (mux_tx, mux_rx) = mpsc::channel(512);
    let logger = EventLogger::new(EventLogLevel::Off, false);
    tokio::spawn(run_mux_actor(mux_rx, logger, MuxConfig::default()));

    let (link, mut far) = TransportLink::virtual_pair(16 * 1024);
    let (write_tx, write_rx) = mpsc::channel(64);
    tokio::spawn(run_transport_writer(link.writer, write_rx));
    mux_tx
        .send(MuxCommand::TransportUp { write_tx })
        .await
        .unwrap();

    let mut writers = Vec::new();
    for client in 0..CLIENTS {
        let mux_tx = mux_tx.clone();
        writers.push(tokio::spawn(async move {
            for _ in 0..WRITES {
                mux_tx
                    .send(MuxCommand::SubmitWrite {
                        id: SessionId(client as u64),
                        data: vec![client as u8; CHUNK],
                    })
                    .await
                    .unwrap();
                tokio::task::yield_now().await;
            }
        }));
    }
    for writer in writers {
        writer.await.unwrap();
    }

    let total = CLIENTS * WRITES * CHUNK;
    let mut wire = vec![0u8; total];
    far.read_exact(&mut wire).await.unwrap();

    // Every submission must appear as one unbroken run: with equal-sized
    // submissions the stream stays chunk-aligned, and each chunk is uniform
    let mut counts = [0usize; CLIENTS];
    for chunk in wire.chunks(CHUNK) {
        let first = chunk[0];
        assert!(
            chunk.iter().all(|&b| b == first),
            "interleaved submission detected: {chunk:02x?}"
        );
        counts[first as usize] += 1;
    }
    assert!(counts.iter().all(|&c| c == WRITES));
}
