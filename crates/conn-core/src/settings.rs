//! Shape of the manager's configuration. Loading it from files/env is
//! `conn-config`'s job; this crate only defines what a valid value looks
//! like and what the defaults are.

use std::net::SocketAddr;
use std::time::Duration;

use crate::message::Credentials;

/// Enumerated configuration the manager needs to operate.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub address: SocketAddr,
    pub connection_timeout: Duration,
    /// `< 0` means retry forever; `0` means never retry past the first
    /// failure; otherwise the number of reconnect attempts budgeted.
    pub max_reconnections: i64,
    pub reconnection_delay_min: Duration,
    pub reconnection_delay_max: Duration,
    pub heartbeat_interval: Duration,
    pub heartbeat_timeout: Duration,
    pub default_credentials: Option<Credentials>,
}

impl Settings {
    pub fn new(address: SocketAddr) -> Self {
        Self {
            address,
            connection_timeout: Duration::from_secs(10),
            max_reconnections: 10,
            reconnection_delay_min: Duration::from_millis(250),
            reconnection_delay_max: Duration::from_secs(30),
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_timeout: Duration::from_secs(10),
            default_credentials: None,
        }
    }

    pub fn with_max_reconnections(mut self, max_reconnections: i64) -> Self {
        self.max_reconnections = max_reconnections;
        self
    }

    pub fn with_default_credentials(mut self, credentials: Credentials) -> Self {
        self.default_credentials = Some(credentials);
        self
    }

    pub fn with_heartbeat(mut self, interval: Duration, timeout: Duration) -> Self {
        self.heartbeat_interval = interval;
        self.heartbeat_timeout = timeout;
        self
    }

    pub fn with_reconnection_delay(mut self, min: Duration, max: Duration) -> Self {
        self.reconnection_delay_min = min;
        self.reconnection_delay_max = max;
        self
    }

    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_are_internally_consistent() {
        let settings = Settings::new("127.0.0.1:1113".parse().unwrap());
        assert!(settings.reconnection_delay_min <= settings.reconnection_delay_max);
        assert_eq!(settings.default_credentials, None);
    }

    #[test]
    fn builder_methods_override_only_their_own_fields() {
        let settings = Settings::new("127.0.0.1:1113".parse().unwrap())
            .with_heartbeat(Duration::from_millis(10), Duration::from_millis(20))
            .with_reconnection_delay(Duration::from_millis(1), Duration::from_millis(2))
            .with_connection_timeout(Duration::from_millis(3));
        assert_eq!(settings.heartbeat_interval, Duration::from_millis(10));
        assert_eq!(settings.heartbeat_timeout, Duration::from_millis(20));
        assert_eq!(settings.reconnection_delay_min, Duration::from_millis(1));
        assert_eq!(settings.reconnection_delay_max, Duration::from_millis(2));
        assert_eq!(settings.connection_timeout, Duration::from_millis(3));
        assert_eq!(settings.max_reconnections, Settings::new(settings.address).max_reconnections);
    }
}
