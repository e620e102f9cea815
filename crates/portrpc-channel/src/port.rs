use std::fmt;

use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::{ChannelError, Result};

/// One end of an entangled duplex channel.
///
/// Messages written on one end are delivered, in write order, to the
/// other end. Writes never block and carry no backpressure signal; the
/// only failure is a peer end that has gone away.
pub struct MessagePort {
    writer: PortWriter,
    reader: PortReader,
}

/// Write half of a [`MessagePort`].
#[derive(Clone)]
pub struct PortWriter {
    tx: mpsc::UnboundedSender<Value>,
}

/// Read half of a [`MessagePort`].
pub struct PortReader {
    rx: mpsc::UnboundedReceiver<Value>,
}

impl MessagePort {
    /// Create two entangled ports.
    pub fn pair() -> (MessagePort, MessagePort) {
        let (to_left, left_rx) = mpsc::unbounded_channel();
        let (to_right, right_rx) = mpsc::unbounded_channel();

        let left = MessagePort {
            writer: PortWriter { tx: to_right },
            reader: PortReader { rx: left_rx },
        };
        let right = MessagePort {
            writer: PortWriter { tx: to_left },
            reader: PortReader { rx: right_rx },
        };
        (left, right)
    }

    /// Post a message to the other end.
    pub fn write(&self, message: Value) -> Result<()> {
        self.writer.write(message)
    }

    /// Wait for the next message from the other end.
    ///
    /// Returns `None` once the other end is dropped and all buffered
    /// messages have been drained.
    pub async fn recv(&mut self) -> Option<Value> {
        self.reader.recv().await
    }

    /// Take a buffered message without waiting.
    pub fn try_recv(&mut self) -> Option<Value> {
        self.reader.try_recv()
    }

    /// Returns true if the other end has been dropped.
    pub fn is_closed(&self) -> bool {
        self.writer.is_closed()
    }

    /// Split into independently owned write and read halves.
    pub fn into_split(self) -> (PortWriter, PortReader) {
        (self.writer, self.reader)
    }
}

impl PortWriter {
    /// Post a message to the other end.
    pub fn write(&self, message: Value) -> Result<()> {
        self.tx.send(message).map_err(|_| ChannelError::PortClosed)?;
        tracing::trace!("message posted to port");
        Ok(())
    }

    /// Returns true if the other end's reader has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl PortReader {
    /// Wait for the next message from the other end.
    pub async fn recv(&mut self) -> Option<Value> {
        self.rx.recv().await
    }

    /// Take a buffered message without waiting.
    pub fn try_recv(&mut self) -> Option<Value> {
        self.rx.try_recv().ok()
    }
}

impl fmt::Debug for MessagePort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessagePort")
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl fmt::Debug for PortWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortWriter")
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl fmt::Debug for PortReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortReader").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn messages_cross_to_the_other_end() {
        let (left, mut right) = MessagePort::pair();

        left.write(json!({"id": 1})).unwrap();
        left.write(json!({"id": 2})).unwrap();

        assert_eq!(right.recv().await, Some(json!({"id": 1})));
        assert_eq!(right.recv().await, Some(json!({"id": 2})));
    }

    #[tokio::test]
    async fn write_fails_after_peer_dropped() {
        let (left, right) = MessagePort::pair();
        drop(right);

        assert!(left.is_closed());
        assert_eq!(left.write(json!(null)), Err(ChannelError::PortClosed));
    }

    #[tokio::test]
    async fn recv_drains_then_ends_when_peer_dropped() {
        let (left, mut right) = MessagePort::pair();
        left.write(json!("last")).unwrap();
        drop(left);

        assert_eq!(right.recv().await, Some(json!("last")));
        assert_eq!(right.recv().await, None);
    }

    #[test]
    fn split_halves_stay_entangled() {
        let (left, right) = MessagePort::pair();
        let (writer, _reader) = left.into_split();
        let (_other_writer, mut other_reader) = right.into_split();

        writer.write(json!([1, 2])).unwrap();
        assert_eq!(other_reader.try_recv(), Some(json!([1, 2])));
        assert_eq!(other_reader.try_recv(), None);
    }
}
