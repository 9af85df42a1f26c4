//! TCP connection for the Parley client.

use std::net::{Ipv4Addr, SocketAddr};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use parley_core::{Envelope, ParleyError, ParleyResult};

/// Client connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Server address.
    pub server_addr: SocketAddr,
    /// Max frame size accepted from the server.
    pub max_message_size: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 9000)),
            max_message_size: 1024 * 1024,
        }
    }
}

impl ConnectionConfig {
    /// Create config for a server address.
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            server_addr: addr,
            ..Default::default()
        }
    }
}

/// Framed envelope stream to a Parley server.
pub struct Connection {
    stream: TcpStream,
    max_message_size: usize,
}

impl Connection {
    /// Connect to server.
    pub async fn connect(config: &ConnectionConfig) -> ParleyResult<Self> {
        let stream = TcpStream::connect(&config.server_addr)
            .await
            .map_err(|e| ParleyError::Transport(format!("Connection failed: {}", e)))?;
        tracing::debug!("Connected to {}", config.server_addr);

        Ok(Self {
            stream,
            max_message_size: config.max_message_size,
        })
    }

    /// Send one envelope.
    pub async fn send(&mut self, envelope: &Envelope) -> ParleyResult<()> {
        let bytes = envelope.to_bytes();
        let len = u32::try_from(bytes.len())
            .map_err(|_| ParleyError::Transport(format!("Message too large: {}", bytes.len())))?;

        // Send length prefix + message
        self.stream
            .write_all(&len.to_be_bytes())
            .await
            .map_err(|e| ParleyError::Transport(format!("Write error: {}", e)))?;
        self.stream
            .write_all(&bytes)
            .await
            .map_err(|e| ParleyError::Transport(format!("Write error: {}", e)))?;
        self.stream
            .flush()
            .await
            .map_err(|e| ParleyError::Transport(format!("Flush error: {}", e)))?;
        Ok(())
    }

    /// Receive the next envelope.
    pub async fn recv(&mut self) -> ParleyResult<Envelope> {
        let mut len_buf = [0u8; 4];
        self.stream
            .read_exact(&mut len_buf)
            .await
            .map_err(|e| ParleyError::Transport(format!("Read error: {}", e)))?;
        let len = u32::from_be_bytes(len_buf) as usize;
        if len > self.max_message_size {
            return Err(ParleyError::Transport(format!(
                "Message too large: {} > {}",
                len, self.max_message_size
            )));
        }

        let mut msg_buf = vec![0u8; len];
        self.stream
            .read_exact(&mut msg_buf)
            .await
            .map_err(|e| ParleyError::Transport(format!("Read error: {}", e)))?;

        Ok(Envelope::from_bytes(&msg_buf)?)
    }
}
