//! HTTP connection configuration

use super::MAX_CHUNK_SIZE;
use crate::net::MAX_CONNECTIONS;

/// Configuration for [`HttpConnection`](super::HttpConnection)
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    connection_list_capacity: usize,
    max_chunk_size: usize,
}

impl ConnectionConfig {
    /// Create a builder
    pub fn builder() -> ConnectionConfigBuilder {
        ConnectionConfigBuilder::default()
    }

    /// How many open connections are inspected when checking connectivity
    pub fn connection_list_capacity(&self) -> usize {
        self.connection_list_capacity
    }

    /// Chunk sizes at or above this abort the process
    pub fn max_chunk_size(&self) -> usize {
        self.max_chunk_size
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfigBuilder::default().build()
    }
}

/// Builder for [`ConnectionConfig`]
#[derive(Debug, Clone)]
pub struct ConnectionConfigBuilder {
    connection_list_capacity: usize,
    max_chunk_size: usize,
}

impl Default for ConnectionConfigBuilder {
    fn default() -> Self {
        ConnectionConfigBuilder {
            connection_list_capacity: MAX_CONNECTIONS,
            max_chunk_size: MAX_CHUNK_SIZE,
        }
    }
}

impl ConnectionConfigBuilder {
    pub fn connection_list_capacity(mut self, capacity: usize) -> Self {
        self.connection_list_capacity = capacity;
        self
    }

    pub fn max_chunk_size(mut self, size: usize) -> Self {
        self.max_chunk_size = size;
        self
    }

    pub fn build(self) -> ConnectionConfig {
        ConnectionConfig {
            connection_list_capacity: self.connection_list_capacity,
            max_chunk_size: self.max_chunk_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ConnectionConfig::default();
        assert_eq!(config.connection_list_capacity(), 64);
        assert_eq!(config.max_chunk_size(), 50_000);
    }

    #[test]
    fn test_builder() {
        let config = ConnectionConfig::builder()
            .connection_list_capacity(8)
            .max_chunk_size(1 << 20)
            .build();
        assert_eq!(config.connection_list_capacity(), 8);
        assert_eq!(config.max_chunk_size(), 1 << 20);
    }
}
