//! Message transport under the protocol server.

use thiserror::Error;
use zeromq::{RepSocket, Socket, SocketRecv, SocketSend, ZmqMessage};

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("zeromq: {0}")]
    Zmq(#[from] zeromq::ZmqError),
}

/// Request/reply message channel. Each received message is returned whole,
/// its parts concatenated in arrival order.
#[allow(async_fn_in_trait)]
pub trait Transport {
    async fn recv(&mut self) -> Result<Vec<u8>, TransportError>;
    async fn send(&mut self, message: Vec<u8>) -> Result<(), TransportError>;
}

/// Concatenate message parts in order.
pub fn reassemble<P: AsRef<[u8]>>(parts: impl IntoIterator<Item = P>) -> Vec<u8> {
    let mut full = Vec::new();
    for part in parts {
        full.extend_from_slice(part.as_ref());
    }
    full
}

/// ZeroMQ REP socket.
pub struct ZmqTransport {
    socket: RepSocket,
}

impl ZmqTransport {
    pub async fn bind(endpoint: &str) -> Result<Self, TransportError> {
        let mut socket = RepSocket::new();
        let bound = socket.bind(endpoint).await?;
        tracing::info!(endpoint = %bound, "REP socket bound");
        Ok(Self { socket })
    }
}

impl Transport for ZmqTransport {
    async fn recv(&mut self) -> Result<Vec<u8>, TransportError> {
        let message = self.socket.recv().await?;
        tracing::trace!(parts = message.len(), "message received");
        Ok(reassemble(message.iter()))
    }

    async fn send(&mut self, message: Vec<u8>) -> Result<(), TransportError> {
        self.socket.send(ZmqMessage::from(message)).await?;
        Ok(())
    }
}
