//! Radio transport I/O
//!
//! One transport link is open at a time. The link is split into a reader and
//! a writer; each runs in its own task and talks to the multiplexer actor
//! through channels, so serial, BLE, and virtual (in-process) links all share
//! one code path.
//!
//! Serial and virtual links carry the framed byte stream as-is. BLE carries
//! bare payloads per GATT message, so the reader re-frames notifications and
//! the writer extracts payloads from submitted bytes; see [`crate::ble`].

use std::time::Duration;

use mesh_protocol::encode_frame;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, info, warn};

use crate::actor::MuxCommand;
use crate::ble::{BleNotifications, BleWriter};
use crate::error::TransportError;

/// Read timeout used to keep the reader task responsive
const READ_TICK: Duration = Duration::from_millis(100);

/// An open radio link, split for independent read and write tasks
pub struct TransportLink {
    /// Read side
    pub reader: TransportReader,
    /// Write side
    pub writer: TransportWriter,
    /// Human-readable link description for logs
    pub desc: String,
}

impl TransportLink {
    /// Open a serial link
    pub async fn open_serial(port: &str, baud: u32) -> Result<Self, TransportError> {
        let stream = tokio_serial::new(port, baud)
            .timeout(READ_TICK)
            .open_native_async()?;
        let (reader, writer) = tokio::io::split(stream);
        Ok(Self {
            reader: TransportReader::Serial(reader),
            writer: TransportWriter::Serial(writer),
            desc: format!("serial {port} @ {baud}"),
        })
    }

    /// Create an in-process link, returning the peer end
    ///
    /// The peer end is what a simulated radio reads and writes.
    pub fn virtual_pair(capacity: usize) -> (Self, DuplexStream) {
        let (near, far) = tokio::io::duplex(capacity);
        let (reader, writer) = tokio::io::split(near);
        (
            Self {
                reader: TransportReader::Virtual(reader),
                writer: TransportWriter::Virtual(writer),
                desc: "virtual".to_string(),
            },
            far,
        )
    }
}

/// Read side of a transport link
pub enum TransportReader {
    /// Serial port
    Serial(ReadHalf<SerialStream>),
    /// BLE notification stream
    Ble(BleNotifications),
    /// In-process duplex stream
    Virtual(ReadHalf<DuplexStream>),
}

impl TransportReader {
    /// Wait for the next chunk of framed bytes from the radio
    ///
    /// Returns `Ok(None)` on a read tick with no data, `Err` when the link
    /// is lost.
    async fn next_chunk(&mut self, buf: &mut [u8]) -> Result<Option<Vec<u8>>, TransportError> {
        match self {
            TransportReader::Serial(io) => read_stream_chunk(io, buf).await,
            TransportReader::Virtual(io) => read_stream_chunk(io, buf).await,
            TransportReader::Ble(notifications) => match notifications.recv().await {
                // GATT notifications carry bare payloads; restore the wire
                // framing so downstream sees one uniform byte stream.
                Some(payload) => Ok(Some(encode_frame(&payload)?)),
                None => Err(TransportError::Closed),
            },
        }
    }
}

async fn read_stream_chunk<T>(
    io: &mut T,
    buf: &mut [u8],
) -> Result<Option<Vec<u8>>, TransportError>
where
    T: tokio::io::AsyncRead + Unpin,
{
    match tokio::time::timeout(READ_TICK, io.read(buf)).await {
        Ok(Ok(0)) => Err(TransportError::Closed),
        Ok(Ok(n)) => Ok(Some(buf[..n].to_vec())),
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
        Ok(Err(e)) => Err(e.into()),
        Err(_) => Ok(None),
    }
}

/// Write side of a transport link
pub enum TransportWriter {
    /// Serial port
    Serial(WriteHalf<SerialStream>),
    /// BLE command characteristic
    Ble(BleWriter),
    /// In-process duplex stream
    Virtual(WriteHalf<DuplexStream>),
}

impl TransportWriter {
    /// Write one client submission to the radio as a contiguous unit
    pub async fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        match self {
            TransportWriter::Serial(io) => {
                io.write_all(data).await?;
                io.flush().await?;
                Ok(())
            }
            TransportWriter::Virtual(io) => {
                io.write_all(data).await?;
                io.flush().await?;
                Ok(())
            }
            TransportWriter::Ble(writer) => writer.send(data).await,
        }
    }
}

/// Pump radio bytes into the multiplexer until the link is lost
///
/// An idle radio is only treated as lost when a `read_grace` threshold is
/// configured and exceeded. Returns the error that ended the link.
pub async fn run_transport_reader(
    mut reader: TransportReader,
    mux_tx: mpsc::Sender<MuxCommand>,
    read_grace: Option<Duration>,
) -> TransportError {
    let mut buf = vec![0u8; 4096];
    let mut last_data = tokio::time::Instant::now();
    loop {
        match reader.next_chunk(&mut buf).await {
            Ok(Some(data)) => {
                last_data = tokio::time::Instant::now();
                debug!("read {} bytes from radio", data.len());
                if mux_tx.send(MuxCommand::TransportBytes { data }).await.is_err() {
                    info!("multiplexer gone, stopping radio reader");
                    return TransportError::Closed;
                }
            }
            Ok(None) => {
                if let Some(grace) = read_grace {
                    if last_data.elapsed() >= grace {
                        return TransportError::Io(std::io::Error::new(
                            std::io::ErrorKind::TimedOut,
                            "radio silent past the read grace threshold",
                        ));
                    }
                }
            }
            Err(e) => return e,
        }
    }
}

/// Drain the write queue into the radio, one submission at a time
///
/// Serialized writes keep each submission contiguous on the wire. Ends when
/// the queue closes or a write fails; submissions still queued at that point
/// are returned so the caller can hand them back to the multiplexer.
pub async fn run_transport_writer(
    mut writer: TransportWriter,
    mut write_rx: mpsc::Receiver<Vec<u8>>,
) -> Vec<Vec<u8>> {
    while let Some(data) = write_rx.recv().await {
        debug!("writing {} bytes to radio", data.len());
        if let Err(e) = writer.send(&data).await {
            warn!("radio write failed: {e}");
            // The failed submission never reached the radio either;
            // reclaim it along with everything queued behind it
            let mut unsent = vec![data];
            write_rx.close();
            while let Ok(more) = write_rx.try_recv() {
                unsent.push(more);
            }
            return unsent;
        }
    }
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn virtual_reader_forwards_chunks() {
        let (link, mut far) = TransportLink::virtual_pair(256);
        let (mux_tx, mut mux_rx) = mpsc::channel(8);
        let reader = tokio::spawn(run_transport_reader(link.reader, mux_tx, None));

        far.write_all(&[1, 2, 3]).await.unwrap();
        match mux_rx.recv().await.unwrap() {
            MuxCommand::TransportBytes { data } => assert_eq!(data, vec![1, 2, 3]),
            other => panic!("unexpected command: {other:?}"),
        }

        // Dropping the far end ends the link
        drop(far);
        drop(link.writer);
        let err = reader.await.unwrap();
        assert!(matches!(err, TransportError::Closed));
    }

    #[tokio::test]
    async fn virtual_writer_drains_queue_in_order() {
        let (link, mut far) = TransportLink::virtual_pair(256);
        let (write_tx, write_rx) = mpsc::channel(8);
        let writer = tokio::spawn(run_transport_writer(link.writer, write_rx));

        write_tx.send(vec![1, 2]).await.unwrap();
        write_tx.send(vec![3]).await.unwrap();
        drop(write_tx);
        assert!(writer.await.unwrap().is_empty());

        let mut out = Vec::new();
        drop(link.reader);
        far.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn failed_writer_returns_unsent_submissions() {
        let (link, far) = TransportLink::virtual_pair(256);
        // A dead peer makes every write fail
        drop(far);
        drop(link.reader);

        let (write_tx, write_rx) = mpsc::channel(8);
        for n in 0u8..3 {
            write_tx.send(vec![n]).await.unwrap();
        }

        let unsent = run_transport_writer(link.writer, write_rx).await;
        assert_eq!(unsent, vec![vec![0], vec![1], vec![2]]);
    }
}
