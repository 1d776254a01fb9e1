//! Byte-stream transport framed with [`SysexCodec`].
//!
//! Works with anything that reads and writes raw MIDI bytes: a raw-MIDI
//! device node, a pipe, or an in-process duplex stream.
//!
//! ```text
//!  read half ──► reader task (SysexCodec) ──► mpsc ──► receive()
//!  send() ──► FramedWrite<write half, SysexCodec>
//! ```
//!
//! The read half is owned by its own task, so a read is always in flight
//! and never sits in front of a write. Device nodes must be opened as two
//! handles, one per direction (see [`super::open_port`]).

use async_trait::async_trait;
use bytes::BytesMut;
use futures::SinkExt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::codec::{Decoder, FramedWrite};

use super::MidiTransport;
use crate::error::{Error, Result, TransportError};
use crate::protocol::{SysexCodec, MAX_MESSAGE_SIZE};

/// Messages buffered between the reader task and `receive`.
const INCOMING_CAPACITY: usize = 64;

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Transport over an async byte stream.
pub struct StreamTransport {
    name: String,
    incoming: Mutex<mpsc::Receiver<Result<Vec<u8>>>>,
    writer: Mutex<FramedWrite<BoxedWriter, SysexCodec>>,
    reader: JoinHandle<()>,
}

impl StreamTransport {
    /// Wrap a bidirectional stream.
    pub fn new<S>(name: impl Into<String>, stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        Self::with_max_message(name, stream, MAX_MESSAGE_SIZE)
    }

    pub fn with_max_message<S>(name: impl Into<String>, stream: S, max_message_size: usize) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read, write) = tokio::io::split(stream);
        Self::from_halves(name, read, write, max_message_size)
    }

    /// Build from separate read and write handles.
    pub fn from_halves<R, W>(
        name: impl Into<String>,
        read: R,
        write: W,
        max_message_size: usize,
    ) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let name = name.into();
        let (tx, rx) = mpsc::channel(INCOMING_CAPACITY);
        let reader = tokio::spawn(read_messages(
            name.clone(),
            read,
            SysexCodec::with_max_message(max_message_size),
            tx,
        ));
        let write: BoxedWriter = Box::new(write);

        Self {
            name,
            incoming: Mutex::new(rx),
            writer: Mutex::new(FramedWrite::new(
                write,
                SysexCodec::with_max_message(max_message_size),
            )),
            reader,
        }
    }
}

/// Decode messages off `io` until it ends or the transport goes away.
///
/// A framing error is forwarded and decoding carries on with the next byte.
async fn read_messages<R>(
    port: String,
    mut io: R,
    mut codec: SysexCodec,
    tx: mpsc::Sender<Result<Vec<u8>>>,
) where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(MAX_MESSAGE_SIZE);
    loop {
        let decoded = match codec.decode(&mut buf) {
            Ok(Some(message)) => Ok(message),
            Ok(None) => match io.read_buf(&mut buf).await {
                Ok(0) => {
                    tracing::debug!(port = %port, "MIDI input closed");
                    return;
                }
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!(port = %port, error = %e, "MIDI read failed");
                    let _ = tx
                        .send(Err(TransportError::ReceiveFailed(e.to_string()).into()))
                        .await;
                    return;
                }
            },
            Err(e) => {
                tracing::debug!(port = %port, error = %e, "Dropping malformed message");
                Err(e)
            }
        };
        if tx.send(decoded).await.is_err() {
            return;
        }
    }
}

#[async_trait]
impl MidiTransport for StreamTransport {
    fn port_name(&self) -> &str {
        &self.name
    }

    async fn send(&self, message: &[u8]) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer.send(message.to_vec()).await.map_err(|e| match e {
            Error::Io(e) => TransportError::SendFailed(e.to_string()).into(),
            other => other,
        })
    }

    async fn receive(&self) -> Result<Vec<u8>> {
        let mut incoming = self.incoming.lock().await;
        incoming
            .recv()
            .await
            .unwrap_or_else(|| Err(TransportError::Closed.into()))
    }

    async fn close(&self) -> Result<()> {
        self.reader.abort();
        self.incoming.lock().await.close();
        let mut writer = self.writer.lock().await;
        writer.close().await
    }

    fn transport_type(&self) -> &'static str {
        "stream"
    }
}

impl Drop for StreamTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
