//! Command/response channel to a hardware signing device
//!
//! The TCP transport speaks the framing used by the Ledger device proxy and
//! emulator: each command is sent as a 4-byte big-endian length followed by
//! the APDU, and each reply is a 4-byte big-endian data length followed by
//! the data and a 2-byte status word.

use crate::error::{DeviceError, DeviceResult};

use async_trait::async_trait;
use std::io::ErrorKind;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

/// Length of the trailing status word
pub const STATUS_WORD_LEN: usize = 2;

/// Largest reply accepted from a device
const MAX_RESPONSE_LEN: usize = 4096;

/// Synchronous request/response exchange with a device
#[async_trait]
pub trait DeviceTransport: Send {
    /// Send one APDU and return the reply data followed by the status word
    async fn exchange(&mut self, apdu: &[u8]) -> DeviceResult<Vec<u8>>;
}

/// Length-prefixed APDU exchange over a byte stream
pub struct TcpTransport<S = TcpStream> {
    stream: S,
    peer: String,
}

impl TcpTransport<TcpStream> {
    /// Connect to a device proxy at `address`
    pub async fn connect(address: &str, connect_timeout: Duration) -> DeviceResult<Self> {
        let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(address))
            .await
            .map_err(|_| DeviceError::Unavailable(format!("{} did not answer", address)))?
            .map_err(|e| DeviceError::Unavailable(format!("{}: {}", address, e)))?;

        debug!("Connected to device at {}", address);
        Ok(Self::from_stream(stream, address))
    }
}

impl<S> TcpTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn from_stream(stream: S, peer: &str) -> Self {
        Self {
            stream,
            peer: peer.to_string(),
        }
    }
}

fn io_error(peer: &str, err: std::io::Error) -> DeviceError {
    match err.kind() {
        ErrorKind::UnexpectedEof | ErrorKind::ConnectionReset | ErrorKind::BrokenPipe => {
            DeviceError::Unavailable(format!("{} closed the connection", peer))
        }
        _ => DeviceError::Unavailable(format!("{}: {}", peer, err)),
    }
}

#[async_trait]
impl<S> DeviceTransport for TcpTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn exchange(&mut self, apdu: &[u8]) -> DeviceResult<Vec<u8>> {
        let mut frame = Vec::with_capacity(4 + apdu.len());
        frame.extend_from_slice(&(apdu.len() as u32).to_be_bytes());
        frame.extend_from_slice(apdu);

        self.stream
            .write_all(&frame)
            .await
            .map_err(|e| io_error(&self.peer, e))?;
        self.stream
            .flush()
            .await
            .map_err(|e| io_error(&self.peer, e))?;

        let data_len = self
            .stream
            .read_u32()
            .await
            .map_err(|e| io_error(&self.peer, e))? as usize;
        if data_len > MAX_RESPONSE_LEN {
            return Err(DeviceError::MalformedResponse(format!(
                "reply length {} exceeds {}",
                data_len, MAX_RESPONSE_LEN
            )));
        }

        let mut reply = vec![0u8; data_len + STATUS_WORD_LEN];
        self.stream
            .read_exact(&mut reply)
            .await
            .map_err(|e| io_error(&self.peer, e))?;

        debug!("Device exchange: {} bytes out, {} bytes in", apdu.len(), reply.len());
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_exchange_framing() {
        let apdu = [0xe0, 0x02, 0x00, 0x00, 0x01, 0x00];
        let mock = Builder::new()
            .write(&[0, 0, 0, 6, 0xe0, 0x02, 0x00, 0x00, 0x01, 0x00])
            .read(&[0, 0, 0, 3])
            .read(&[0xaa, 0xbb, 0xcc, 0x90, 0x00])
            .build();

        let mut transport = TcpTransport::from_stream(mock, "mock");
        let reply = transport.exchange(&apdu).await.unwrap();
        assert_eq!(reply, vec![0xaa, 0xbb, 0xcc, 0x90, 0x00]);
    }

    #[tokio::test]
    async fn test_truncated_reply_is_unavailable() {
        let mock = Builder::new()
            .write(&[0, 0, 0, 1, 0xe0])
            .read(&[0, 0, 0, 4, 0x01])
            .build();

        let mut transport = TcpTransport::from_stream(mock, "mock");
        assert!(matches!(
            transport.exchange(&[0xe0]).await,
            Err(DeviceError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_oversized_reply_rejected() {
        let mock = Builder::new()
            .write(&[0, 0, 0, 1, 0xe0])
            .read(&[0, 1, 0, 0])
            .build();

        let mut transport = TcpTransport::from_stream(mock, "mock");
        assert!(matches!(
            transport.exchange(&[0xe0]).await,
            Err(DeviceError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_connect_refused_is_unavailable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let result = TcpTransport::connect(&address, Duration::from_secs(5)).await;
        assert!(matches!(result, Err(DeviceError::Unavailable(_))));
    }
}
