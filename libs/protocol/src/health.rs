//! Host telemetry payload carried by health-report frames.

use serde::{Deserialize, Serialize};

/// One point-in-time reading of a worker host's vital signs.
///
/// The field set is exactly what the master's healthcheck endpoint stores;
/// memory and disk figures are in bytes, `load` is the 1/5/15 minute load
/// average triple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSample {
    pub cpu_count: u32,
    pub load: [f64; 3],
    pub total_memory: u64,
    pub available_memory: u64,
    pub total_disk: u64,
    pub used_disk: u64,
    pub free_disk: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_sample_serialization() {
        let sample = HealthSample {
            cpu_count: 8,
            load: [0.5, 0.25, 0.1],
            total_memory: 16 * 1024 * 1024 * 1024,
            available_memory: 9 * 1024 * 1024 * 1024,
            total_disk: 500_000_000_000,
            used_disk: 320_000_000_000,
            free_disk: 180_000_000_000,
        };

        let json = serde_json::to_string(&sample).unwrap();
        assert!(json.contains("\"cpu_count\":8"));
        assert!(json.contains("\"load\":[0.5,0.25,0.1]"));
        assert!(json.contains("\"free_disk\":180000000000"));

        let back: HealthSample = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sample);
    }
}
