//! PDP-wide configuration (ambient, not in spec.md's algorithmic core):
//! the top-level combining algorithm, default broker linger interval, and
//! default attribute timing parameters.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-invocation timing parameters for an attribute subscription
/// (spec §4.3/§5): `{ initialTimeout, pollInterval, backoff, retries }`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributeTiming {
    /// Time to wait for a first value before emitting `Error("attribute timeout")`.
    #[serde(with = "humantime_serde_millis")]
    pub initial_timeout: Duration,
    /// Re-poll cadence for non-push-driven finders.
    #[serde(with = "humantime_serde_millis")]
    pub poll_interval: Duration,
    /// Initial retry delay on upstream failure; doubles per retry, capped
    /// at one `poll_interval` (spec §5).
    #[serde(with = "humantime_serde_millis")]
    pub backoff: Duration,
    /// Number of retries before the station terminates with a final error.
    pub retries: u32,
}

impl Default for AttributeTiming {
    fn default() -> Self {
        Self {
            initial_timeout: Duration::from_secs(2),
            poll_interval: Duration::from_secs(5),
            backoff: Duration::from_millis(200),
            retries: 3,
        }
    }
}

impl AttributeTiming {
    /// The effective backoff cap for a given station: one `poll_interval`
    /// (spec §5: "backoff doubles after each failure and is capped at 1x
    /// pollInterval of the owning station").
    pub fn backoff_cap(&self) -> Duration {
        self.poll_interval
    }
}

/// PDP-wide configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PdpConfig {
    /// Identifies this PDP instance in attribute subscription keys, so two
    /// differently-configured PDPs never share stations.
    pub pdp_configuration_id: String,
    /// The top-level combining algorithm folding across all top-level
    /// documents (spec §4.8 step 3). Stored as a string here to avoid a
    /// dependency cycle with `pdp-policy`; parsed there.
    pub top_level_algorithm: String,
    /// Default linger interval before an orphaned station's last-value
    /// cache is evicted (spec §4.3: "default: 0 — eviction immediate").
    #[serde(with = "humantime_serde_millis")]
    pub default_linger: Duration,
    /// Default timing parameters used when a finder invocation doesn't
    /// override them.
    pub default_timing: AttributeTiming,
}

impl Default for PdpConfig {
    fn default() -> Self {
        Self {
            pdp_configuration_id: "default".to_string(),
            top_level_algorithm: "deny-overrides".to_string(),
            default_linger: Duration::ZERO,
            default_timing: AttributeTiming::default(),
        }
    }
}

/// Serializes a `Duration` as whole milliseconds; avoids pulling in a
/// full humantime dependency for a single field shape.
mod humantime_serde_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        (d.as_millis() as u64).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(d)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_backoff_cap_matches_poll_interval() {
        let t = AttributeTiming::default();
        assert_eq!(t.backoff_cap(), t.poll_interval);
    }

    #[test]
    fn config_round_trips_through_json() {
        let cfg = PdpConfig::default();
        let j = serde_json::to_value(&cfg).unwrap();
        let back: PdpConfig = serde_json::from_value(j).unwrap();
        assert_eq!(back.pdp_configuration_id, cfg.pdp_configuration_id);
    }
}
