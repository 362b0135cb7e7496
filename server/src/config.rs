//! Runtime configuration for the game server

use std::time::Duration;

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the accept loop binds to
    pub bind_addr: String,
    /// Connections beyond this count are turned away
    pub max_clients: usize,
    /// How long a dropped connection may stay registered before its player is purged
    pub reconnect_window: Duration,
    /// How often the sweeper looks for expired connections
    pub sweep_interval: Duration,
    /// Per-turn clock; `None` disables it
    pub turn_timeout: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            max_clients: 64,
            reconnect_window: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(1),
            turn_timeout: None,
        }
    }
}

impl ServerConfig {
    pub fn with_bind_addr(mut self, addr: impl Into<String>) -> Self {
        self.bind_addr = addr.into();
        self
    }

    pub fn with_turn_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.turn_timeout = timeout;
        self
    }

    pub fn with_reconnect_window(mut self, window: Duration) -> Self {
        self.reconnect_window = window;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.max_clients, 64);
        assert_eq!(config.reconnect_window, Duration::from_secs(60));
        assert!(config.turn_timeout.is_none());
    }

    #[test]
    fn test_builder_overrides() {
        let config = ServerConfig::default()
            .with_bind_addr("0.0.0.0:9000")
            .with_turn_timeout(Some(Duration::from_secs(30)))
            .with_reconnect_window(Duration::from_secs(5));

        assert_eq!(config.bind_addr, "0.0.0.0:9000");
        assert_eq!(config.turn_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.reconnect_window, Duration::from_secs(5));
    }
}
