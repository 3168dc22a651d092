//! HTTP server configuration.

use std::net::SocketAddr;

/// Port used when none is configured.
pub const DEFAULT_PORT: u16 = 8080;

/// Configuration for the API server.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Address to bind the HTTP server to.
    pub bind_addr: SocketAddr,
    /// CORS allowed origins (empty means all).
    pub cors_origins: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
            cors_origins: Vec::new(),
        }
    }
}

impl ApiConfig {
    /// Create a configuration bound to `bind_addr`.
    #[must_use]
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Self::default()
        }
    }

    /// Add a CORS allowed origin.
    #[must_use]
    pub fn with_cors_origin(mut self, origin: impl Into<String>) -> Self {
        self.cors_origins.push(origin.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ApiConfig::default();
        assert_eq!(config.bind_addr.port(), DEFAULT_PORT);
        assert!(config.bind_addr.ip().is_loopback());
        assert!(config.cors_origins.is_empty());
    }

    #[test]
    fn test_builder() {
        let addr = SocketAddr::from(([0, 0, 0, 0], 9000));
        let config = ApiConfig::new(addr)
            .with_cors_origin("http://localhost:3000")
            .with_cors_origin("https://parkmesh.example");
        assert_eq!(config.bind_addr, addr);
        assert_eq!(config.cors_origins.len(), 2);
    }
}
