//! Server configuration for Parley.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use parley_core::Address;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Agent address the server's channels answer as.
    pub address: Address,
    /// Idle limit while waiting for the next frame.
    pub read_timeout: Duration,
    /// Write timeout for connections.
    pub write_timeout: Duration,
    /// Max frame size in bytes.
    pub max_message_size: usize,
    /// Overrides each protocol's retention default when set.
    pub keep_terminal_state_dialogues: Option<bool>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 9000)),
            address: "parley/server".to_string(),
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(30),
            max_message_size: 1024 * 1024, // 1MB
            keep_terminal_state_dialogues: None,
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address.
    pub fn with_addr(addr: impl Into<SocketAddr>) -> Self {
        Self {
            bind_addr: addr.into(),
            ..Default::default()
        }
    }

    /// Set the agent address replies are sent from.
    pub fn with_address(mut self, address: impl Into<Address>) -> Self {
        self.address = address.into();
        self
    }

    /// Set the read and write timeouts.
    pub fn with_timeouts(mut self, read: Duration, write: Duration) -> Self {
        self.read_timeout = read;
        self.write_timeout = write;
        self
    }

    pub fn with_max_message_size(mut self, max: usize) -> Self {
        self.max_message_size = max;
        self
    }

    /// Force terminal dialogues to be kept or purged for every protocol.
    pub fn with_keep_terminal_state_dialogues(mut self, keep: bool) -> Self {
        self.keep_terminal_state_dialogues = Some(keep);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.address, "parley/server");
        assert!(config.keep_terminal_state_dialogues.is_none());
    }

    #[test]
    fn custom_config() {
        let config = ServerConfig::with_addr("0.0.0.0:8080".parse::<SocketAddr>().unwrap())
            .with_address("chat/hub")
            .with_max_message_size(64)
            .with_keep_terminal_state_dialogues(true);

        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.address, "chat/hub");
        assert_eq!(config.max_message_size, 64);
        assert_eq!(config.keep_terminal_state_dialogues, Some(true));
    }
}
