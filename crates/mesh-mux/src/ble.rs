//! BLE companion radio transport
//!
//! Connects to a MeshCore companion radio over Bluetooth Low Energy via
//! BlueZ. The companion service exposes two characteristics: clients write
//! command payloads to one, the radio pushes response payloads through
//! notifications on the other. Payloads travel without the serial framing,
//! which is restored or stripped at this boundary so the rest of the proxy
//! sees one uniform framed byte stream.

use futures::{pin_mut, StreamExt};
use mesh_protocol::{Direction, FrameCodec, FrameEvent};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::TransportError;
use crate::transport::{TransportLink, TransportReader, TransportWriter};

/// MeshCore companion GATT service
pub const COMPANION_SERVICE_UUID: Uuid = Uuid::from_u128(0x6ba1b218_15a8_461f_9fa8_5dcae273eafd);

/// Characteristic clients write command payloads to
pub const COMPANION_RX_CHAR_UUID: Uuid = Uuid::from_u128(0x6ba1b218_15a8_461f_9fa8_5dcae273eafe);

/// Characteristic the radio notifies response payloads on
pub const COMPANION_TX_CHAR_UUID: Uuid = Uuid::from_u128(0x6ba1b218_15a8_461f_9fa8_5dcae273eaff);

/// Queue between the notification pump task and the transport reader
const NOTIFY_QUEUE: usize = 64;

/// Incoming notification payloads from the radio
///
/// Backed by a pump task that owns the GATT subscription; the channel
/// closing means the subscription (and so the link) is gone.
pub struct BleNotifications {
    payloads: mpsc::Receiver<Vec<u8>>,
    pump: tokio::task::JoinHandle<()>,
    _agent: bluer::agent::AgentHandle,
}

impl BleNotifications {
    /// Wait for the next notification payload; `None` when the link is lost
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.payloads.recv().await
    }
}

impl Drop for BleNotifications {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

/// Write side of a BLE link
///
/// Client submissions arrive as framed bytes and may split frames across
/// submissions, so a stateful deframer extracts complete payloads and each
/// payload becomes one characteristic write.
pub struct BleWriter {
    rx_char: bluer::gatt::remote::Characteristic,
    deframer: FrameCodec,
}

impl BleWriter {
    /// Write one submission's worth of framed bytes
    pub async fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.deframer.push_bytes(data);
        while let Some(event) = self.deframer.next_event() {
            match event {
                FrameEvent::Frame(frame) => {
                    debug!("ble write: {} byte payload", frame.payload.len());
                    self.rx_char.write(&frame.payload).await?;
                }
                FrameEvent::Desync { skipped } => {
                    warn!("unframed client bytes, skipped {skipped} byte(s) before ble write");
                }
            }
        }
        Ok(())
    }
}

/// Connect to a companion radio over BLE
///
/// Scans for any device advertising the companion service unless an address
/// is given. Pairs with the radio's PIN on first connection.
pub async fn connect_ble(
    address: Option<&str>,
    pin: &str,
) -> Result<TransportLink, TransportError> {
    let session = bluer::Session::new().await?;
    let agent = register_pin_agent(&session, pin).await?;

    let adapter = session.default_adapter().await?;
    adapter.set_powered(true).await?;

    let device = match address {
        Some(addr) => {
            let parsed: bluer::Address = addr
                .parse()
                .map_err(|_| TransportError::DeviceNotFound(addr.to_string()))?;
            adapter.device(parsed)?
        }
        None => discover_companion(&adapter).await?,
    };
    let addr = device.address();

    if !device.is_connected().await? {
        info!("connecting to {addr}");
        device.connect().await?;
    }
    if !device.is_paired().await? {
        info!("pairing with {addr}");
        device.pair().await?;
    }

    wait_services_resolved(&device).await?;
    let (rx_char, tx_char) = find_companion_characteristics(&device).await?;

    // The notification stream borrows the characteristic, so a pump task
    // owns both and forwards payloads through a channel.
    let (payload_tx, payload_rx) = mpsc::channel(NOTIFY_QUEUE);
    let pump = tokio::spawn(async move {
        let stream = match tx_char.notify().await {
            Ok(s) => s,
            Err(e) => {
                warn!("ble notify subscription failed: {e}");
                return;
            }
        };
        pin_mut!(stream);
        while let Some(payload) = stream.next().await {
            if payload_tx.send(payload).await.is_err() {
                break;
            }
        }
        debug!("ble notification stream ended");
    });

    Ok(TransportLink {
        reader: TransportReader::Ble(BleNotifications {
            payloads: payload_rx,
            pump,
            _agent: agent,
        }),
        writer: TransportWriter::Ble(BleWriter {
            rx_char,
            deframer: FrameCodec::new(Direction::ToRadio),
        }),
        desc: format!("ble {addr}"),
    })
}

/// Register a pairing agent that answers PIN and passkey requests
async fn register_pin_agent(
    session: &bluer::Session,
    pin: &str,
) -> Result<bluer::agent::AgentHandle, TransportError> {
    let pin_code = pin.to_string();
    let passkey = pin.parse::<u32>().ok();

    let agent = bluer::agent::Agent {
        request_default: true,
        request_pin_code: Some(Box::new(move |_req| {
            let pin = pin_code.clone();
            Box::pin(async move { Ok(pin) })
        })),
        request_passkey: Some(Box::new(move |_req| {
            Box::pin(async move {
                passkey.ok_or(bluer::agent::ReqError::Rejected)
            })
        })),
        ..Default::default()
    };

    Ok(session.register_agent(agent).await?)
}

/// Scan until a device advertising the companion service appears
async fn discover_companion(
    adapter: &bluer::Adapter,
) -> Result<bluer::Device, TransportError> {
    info!("scanning for a companion radio");
    let events = adapter.discover_devices().await?;
    pin_mut!(events);

    while let Some(event) = events.next().await {
        let bluer::AdapterEvent::DeviceAdded(addr) = event else {
            continue;
        };
        let device = adapter.device(addr)?;
        let Ok(Some(uuids)) = device.uuids().await else {
            continue;
        };
        if uuids.contains(&COMPANION_SERVICE_UUID) {
            info!("found companion radio at {addr}");
            return Ok(device);
        }
        debug!("ignoring {addr}, no companion service");
    }

    Err(TransportError::DeviceNotFound(
        COMPANION_SERVICE_UUID.to_string(),
    ))
}

async fn wait_services_resolved(device: &bluer::Device) -> Result<(), TransportError> {
    for _ in 0..40 {
        if device.is_services_resolved().await? {
            return Ok(());
        }
        tokio::time::sleep(std::time::Duration::from_millis(250)).await;
    }
    Err(TransportError::CharacteristicNotFound(COMPANION_SERVICE_UUID))
}

async fn find_companion_characteristics(
    device: &bluer::Device,
) -> Result<
    (
        bluer::gatt::remote::Characteristic,
        bluer::gatt::remote::Characteristic,
    ),
    TransportError,
> {
    let mut rx_char = None;
    let mut tx_char = None;

    for service in device.services().await? {
        if service.uuid().await? != COMPANION_SERVICE_UUID {
            continue;
        }
        for characteristic in service.characteristics().await? {
            match characteristic.uuid().await? {
                u if u == COMPANION_RX_CHAR_UUID => rx_char = Some(characteristic),
                u if u == COMPANION_TX_CHAR_UUID => tx_char = Some(characteristic),
                _ => {}
            }
        }
    }

    let rx_char =
        rx_char.ok_or(TransportError::CharacteristicNotFound(COMPANION_RX_CHAR_UUID))?;
    let tx_char =
        tx_char.ok_or(TransportError::CharacteristicNotFound(COMPANION_TX_CHAR_UUID))?;
    Ok((rx_char, tx_char))
}
