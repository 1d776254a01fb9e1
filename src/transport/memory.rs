//! In-process transport over tokio channels.

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use super::MidiTransport;
use crate::error::{Result, TransportError};

/// One end of an in-memory message pipe.
///
/// Used for tests and for embedding a device emulator in the same process.
pub struct MemoryTransport {
    name: String,
    tx: mpsc::UnboundedSender<Vec<u8>>,
    rx: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
}

impl MemoryTransport {
    /// Create two connected ends sharing a port name.
    pub fn pair(name: impl Into<String>) -> (Self, Self) {
        let name = name.into();
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();
        (
            Self {
                name: name.clone(),
                tx: a_tx,
                rx: Mutex::new(a_rx),
            },
            Self {
                name,
                tx: b_tx,
                rx: Mutex::new(b_rx),
            },
        )
    }
}

#[async_trait]
impl MidiTransport for MemoryTransport {
    fn port_name(&self) -> &str {
        &self.name
    }

    async fn send(&self, message: &[u8]) -> Result<()> {
        self.tx
            .send(message.to_vec())
            .map_err(|_| TransportError::Closed)?;
        Ok(())
    }

    async fn receive(&self) -> Result<Vec<u8>> {
        let mut rx = self.rx.lock().await;
        rx.recv().await.ok_or_else(|| TransportError::Closed.into())
    }

    async fn close(&self) -> Result<()> {
        self.rx.lock().await.close();
        Ok(())
    }

    fn transport_type(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[tokio::test]
    async fn test_pair_delivers_in_order() {
        let (a, b) = MemoryTransport::pair("Gemini");
        a.send(&[0xf0, 0x01, 0xf7]).await.unwrap();
        a.send(&[0xf0, 0x02, 0xf7]).await.unwrap();
        assert_eq!(b.receive().await.unwrap(), vec![0xf0, 0x01, 0xf7]);
        assert_eq!(b.receive().await.unwrap(), vec![0xf0, 0x02, 0xf7]);
        assert_eq!(a.port_name(), "Gemini");
    }

    #[tokio::test]
    async fn test_send_after_peer_dropped() {
        let (a, b) = MemoryTransport::pair("Gemini");
        drop(b);
        assert!(matches!(
            a.send(&[0xf0, 0xf7]).await,
            Err(Error::Transport(TransportError::Closed))
        ));
        assert!(a.receive().await.is_err());
    }
}
