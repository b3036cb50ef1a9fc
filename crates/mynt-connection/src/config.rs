use std::time::Duration;

use mynt_io::{BufferPool, DEFAULT_BUFFER_SIZE, MIN_BUFFER_SIZE};
use mynt_transport::ChannelConfig;

use crate::error::{ConnectionError, Result};

/// Connection and provider behavior.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Scratch buffer capacity per direction per connection.
    pub buffer_size: usize,
    /// Released scratch buffers kept for reuse by later connections.
    pub max_idle_buffers: usize,
    /// Socket options for accepted and connected streams.
    pub channel: ChannelConfig,
    /// Upper bound on a single dial. `None` waits for the OS.
    pub connect_timeout: Option<Duration>,
    /// Hand out the cached open connection on repeated `connect` calls.
    pub reuse_connections: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            max_idle_buffers: BufferPool::DEFAULT_MAX_IDLE,
            channel: ChannelConfig::default(),
            connect_timeout: None,
            reuse_connections: true,
        }
    }
}

impl ConnectionConfig {
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn with_max_idle_buffers(mut self, max_idle_buffers: usize) -> Self {
        self.max_idle_buffers = max_idle_buffers;
        self
    }

    pub fn with_channel(mut self, channel: ChannelConfig) -> Self {
        self.channel = channel;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn with_reuse_connections(mut self, reuse: bool) -> Self {
        self.reuse_connections = reuse;
        self
    }

    /// Reject settings no connection could run with.
    pub fn validate(&self) -> Result<()> {
        if self.buffer_size < MIN_BUFFER_SIZE {
            return Err(ConnectionError::InvalidConfig(format!(
                "buffer_size {} is below the minimum of {MIN_BUFFER_SIZE} bytes",
                self.buffer_size
            )));
        }
        if self.connect_timeout == Some(Duration::ZERO) {
            return Err(ConnectionError::InvalidConfig(
                "connect_timeout must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Build the buffer pool connections draw their scratch buffers from.
    pub(crate) fn buffer_pool(&self) -> Result<BufferPool> {
        self.validate()?;
        Ok(BufferPool::with_max_idle(
            self.buffer_size,
            self.max_idle_buffers,
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ConnectionConfig::default();
        assert_eq!(config.buffer_size, 8 * 1024);
        assert!(config.reuse_connections);
        assert!(config.connect_timeout.is_none());
        assert!(config.channel.nodelay);
        config.validate().unwrap();
    }

    #[test]
    fn builders_chain() {
        let config = ConnectionConfig::default()
            .with_buffer_size(64)
            .with_max_idle_buffers(2)
            .with_connect_timeout(Duration::from_millis(250))
            .with_reuse_connections(false)
            .with_channel(ChannelConfig { nodelay: false });

        assert_eq!(config.buffer_size, 64);
        assert_eq!(config.max_idle_buffers, 2);
        assert_eq!(config.connect_timeout, Some(Duration::from_millis(250)));
        assert!(!config.reuse_connections);
        assert!(!config.channel.nodelay);

        let pool = config.buffer_pool().unwrap();
        assert_eq!(pool.capacity(), 64);
    }

    #[test]
    fn rejects_tiny_buffers() {
        let err = ConnectionConfig::default()
            .with_buffer_size(4)
            .validate()
            .unwrap_err();
        assert!(matches!(err, ConnectionError::InvalidConfig(ref msg) if msg.contains("buffer_size")));
    }

    #[test]
    fn rejects_zero_timeout() {
        let err = ConnectionConfig::default()
            .with_connect_timeout(Duration::ZERO)
            .validate()
            .unwrap_err();
        assert!(matches!(err, ConnectionError::InvalidConfig(_)));
    }
}
