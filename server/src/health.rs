//! Connection-health samples and classification
//!
//! Clients report latency and packet-loss samples; the latest sample per
//! player wins. The classifier turns a sample into one of three fixed
//! strings that are shown verbatim to the player.

use shared::PlayerId;
use std::collections::HashMap;

pub const UNKNOWN_PLAYER: &str = "Player ID doesn't exist";
pub const UNSTABLE: &str = "WARNING: Network connection is unstable!";
pub const STRONG: &str = "Connection is strong!";

/// Latency at or above this is considered unstable
pub const LATENCY_THRESHOLD_MS: u64 = 300;
/// Packet loss at or above this is considered unstable
pub const PACKET_LOSS_THRESHOLD_PCT: f64 = 5.0;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HealthSample {
    pub latency_ms: u64,
    pub packet_loss: f64,
}

impl HealthSample {
    pub fn is_unstable(&self) -> bool {
        self.latency_ms >= LATENCY_THRESHOLD_MS || self.packet_loss >= PACKET_LOSS_THRESHOLD_PCT
    }
}

#[derive(Debug, Default)]
pub struct ConnectionHealth {
    samples: HashMap<PlayerId, HealthSample>,
}

impl ConnectionHealth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_latency(&mut self, player_id: &str, latency_ms: u64) {
        self.samples
            .entry(player_id.to_string())
            .or_default()
            .latency_ms = latency_ms;
    }

    pub fn record_packet_loss(&mut self, player_id: &str, packet_loss: f64) {
        self.samples
            .entry(player_id.to_string())
            .or_default()
            .packet_loss = packet_loss;
    }

    pub fn sample(&self, player_id: &str) -> Option<HealthSample> {
        self.samples.get(player_id).copied()
    }

    pub fn check_connection_health(&self, player_id: &str) -> &'static str {
        match self.samples.get(player_id) {
            None => UNKNOWN_PLAYER,
            Some(sample) if sample.is_unstable() => UNSTABLE,
            Some(_) => STRONG,
        }
    }

    pub fn forget(&mut self, player_id: &str) {
        self.samples.remove(player_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unstable_connection() {
        let mut health = ConnectionHealth::new();
        health.record_latency("x", 500);
        health.record_packet_loss("x", 9.0);
        assert_eq!(health.check_connection_health("x"), UNSTABLE);
    }

    #[test]
    fn test_strong_connection() {
        let mut health = ConnectionHealth::new();
        health.record_latency("x", 43);
        health.record_packet_loss("x", 1.0);
        assert_eq!(health.check_connection_health("x"), STRONG);
    }

    #[test]
    fn test_unknown_player() {
        let health = ConnectionHealth::new();
        assert_eq!(health.check_connection_health("nobody"), UNKNOWN_PLAYER);
    }

    #[test]
    fn test_either_threshold_triggers_warning() {
        let mut health = ConnectionHealth::new();
        health.record_latency("slow", 300);
        health.record_packet_loss("slow", 0.0);
        health.record_latency("lossy", 20);
        health.record_packet_loss("lossy", 5.0);

        assert_eq!(health.check_connection_health("slow"), UNSTABLE);
        assert_eq!(health.check_connection_health("lossy"), UNSTABLE);
    }

    #[test]
    fn test_last_write_wins() {
        let mut health = ConnectionHealth::new();
        health.record_latency("x", 900);
        health.record_latency("x", 40);
        assert_eq!(health.sample("x").unwrap().latency_ms, 40);
        assert_eq!(health.check_connection_health("x"), STRONG);

        health.forget("x");
        assert_eq!(health.check_connection_health("x"), UNKNOWN_PLAYER);
    }
}
