//! Resource-usage metrics for a running sandbox.
//!
//! The orchestrator's metrics schema varies between versions, so every field
//! is resolved through an ordered alias table. A missing or renamed field
//! reads as zero instead of failing the snapshot.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::fields::Aliases;
use crate::session::Sandbox;

pub const CPU_PERCENT: Aliases = Aliases(&["cpu", "cpuPercent", "cpu_usage"]);
pub const MEMORY_MB: Aliases = Aliases(&["memory", "memoryMb", "memoryMiB", "memory_usage"]);
pub const DISK_BYTES: Aliases = Aliases(&["disk", "diskBytes", "disk_usage"]);
pub const NETWORK_BYTES_SENT: Aliases = Aliases(&["networkBytesSent", "network_bytes_sent"]);
pub const NETWORK_BYTES_RECEIVED: Aliases =
    Aliases(&["networkBytesReceived", "network_bytes_received"]);
pub const UPTIME_SECONDS: Aliases = Aliases(&["uptime", "uptimeSeconds", "uptime_seconds"]);
pub const RUNNING: Aliases = Aliases(&["running", "isRunning"]);

/// Normalized resource-usage reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// CPU utilisation, 0.0 to 100.0.
    pub cpu_percent: f64,
    pub memory_usage_mb: u64,
    pub disk_usage_bytes: u64,
    pub network_bytes_sent: u64,
    pub network_bytes_received: u64,
    pub uptime_seconds: u64,
    /// Whether the server reports the sandbox as running, if it says.
    pub running: Option<bool>,
    #[serde(skip)]
    raw: Value,
}

impl MetricsSnapshot {
    /// Resolve every field from a raw metrics payload.
    pub fn from_value(payload: Value) -> Self {
        let cpu_percent = CPU_PERCENT
            .number(&payload)
            .filter(|v| v.is_finite())
            .map_or(0.0, |v| v.clamp(0.0, 100.0));

        MetricsSnapshot {
            cpu_percent,
            memory_usage_mb: MEMORY_MB.count(&payload),
            disk_usage_bytes: DISK_BYTES.count(&payload),
            network_bytes_sent: NETWORK_BYTES_SENT.count(&payload),
            network_bytes_received: NETWORK_BYTES_RECEIVED.count(&payload),
            uptime_seconds: UPTIME_SECONDS.count(&payload),
            running: RUNNING.flag(&payload),
            raw: payload,
        }
    }

    /// The payload exactly as received.
    pub fn raw(&self) -> &Value {
        &self.raw
    }
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "cpu={:.2}% memory={}MiB disk={}B net_tx={}B net_rx={}B uptime={}s",
            self.cpu_percent,
            self.memory_usage_mb,
            self.disk_usage_bytes,
            self.network_bytes_sent,
            self.network_bytes_received,
            self.uptime_seconds
        )
    }
}

/// Metrics reader borrowing a session for addressing and authentication.
///
/// Holds no state of its own; every getter is a fresh round trip.
#[derive(Debug, Clone, Copy)]
pub struct Metrics<'a> {
    sandbox: &'a Sandbox,
}

impl<'a> Metrics<'a> {
    pub(crate) fn new(sandbox: &'a Sandbox) -> Self {
        Metrics { sandbox }
    }

    /// Fetch a full snapshot.
    pub async fn all(&self) -> Result<MetricsSnapshot> {
        self.sandbox.metrics().await
    }

    pub async fn cpu(&self) -> Result<f64> {
        Ok(self.all().await?.cpu_percent)
    }

    pub async fn memory_mb(&self) -> Result<u64> {
        Ok(self.all().await?.memory_usage_mb)
    }

    pub async fn disk_bytes(&self) -> Result<u64> {
        Ok(self.all().await?.disk_usage_bytes)
    }

    pub async fn network_bytes_sent(&self) -> Result<u64> {
        Ok(self.all().await?.network_bytes_sent)
    }

    pub async fn network_bytes_received(&self) -> Result<u64> {
        Ok(self.all().await?.network_bytes_received)
    }

    pub async fn uptime_seconds(&self) -> Result<u64> {
        Ok(self.all().await?.uptime_seconds)
    }

    /// `false` when the server does not report a running flag.
    pub async fn is_running(&self) -> Result<bool> {
        Ok(self.all().await?.running.unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cpu_percent_alias() {
        let snap = MetricsSnapshot::from_value(json!({"cpuPercent": 12.5}));
        assert_eq!(snap.cpu_percent, 12.5);
    }

    #[test]
    fn test_missing_fields_default_to_zero() {
        let snap = MetricsSnapshot::from_value(json!({}));
        assert_eq!(snap.cpu_percent, 0.0);
        assert_eq!(snap.memory_usage_mb, 0);
        assert_eq!(snap.disk_usage_bytes, 0);
        assert_eq!(snap.network_bytes_sent, 0);
        assert_eq!(snap.network_bytes_received, 0);
        assert_eq!(snap.uptime_seconds, 0);
        assert_eq!(snap.running, None);
    }

    #[test]
    fn test_all_alias_spellings() {
        let snap = MetricsSnapshot::from_value(json!({
            "cpu": 3.5,
            "memoryMiB": 256,
            "diskBytes": 4096,
            "networkBytesSent": 10,
            "networkBytesReceived": 20,
            "uptimeSeconds": 30,
            "isRunning": true
        }));
        assert_eq!(snap.cpu_percent, 3.5);
        assert_eq!(snap.memory_usage_mb, 256);
        assert_eq!(snap.disk_usage_bytes, 4096);
        assert_eq!(snap.network_bytes_sent, 10);
        assert_eq!(snap.network_bytes_received, 20);
        assert_eq!(snap.uptime_seconds, 30);
        assert_eq!(snap.running, Some(true));
    }

    #[test]
    fn test_snake_case_server_keys() {
        let snap = MetricsSnapshot::from_value(json!({
            "cpu_usage": 0.5,
            "memory_usage": 128,
            "disk_usage": 1024,
            "running": true
        }));
        assert_eq!(snap.cpu_percent, 0.5);
        assert_eq!(snap.memory_usage_mb, 128);
        assert_eq!(snap.disk_usage_bytes, 1024);
    }

    #[test]
    fn test_non_numeric_values_fall_through() {
        let snap = MetricsSnapshot::from_value(json!({"cpu": null, "cpuPercent": "7", "memory": "lots"}));
        assert_eq!(snap.cpu_percent, 0.0);
        assert_eq!(snap.memory_usage_mb, 0);
    }

    #[test]
    fn test_out_of_range_values_are_clamped() {
        let snap = MetricsSnapshot::from_value(json!({"cpu": 250.0, "disk": -5, "uptime": 12.7}));
        assert_eq!(snap.cpu_percent, 100.0);
        assert_eq!(snap.disk_usage_bytes, 0);
        assert_eq!(snap.uptime_seconds, 12);

        let negative = MetricsSnapshot::from_value(json!({"cpu": -1.0}));
        assert_eq!(negative.cpu_percent, 0.0);
    }

    #[test]
    fn test_display() {
        let snap = MetricsSnapshot::from_value(json!({"cpu": 1.0, "memory": 64, "uptime": 5}));
        assert_eq!(
            snap.to_string(),
            "cpu=1.00% memory=64MiB disk=0B net_tx=0B net_rx=0B uptime=5s"
        );
    }
}
