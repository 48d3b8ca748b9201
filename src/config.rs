use std::time::Duration;

use serde::Deserialize;

/// Weighting and normalization constants for the quality score.
///
/// The score is `100 * (availability*w + (1 - jitter/jitter_scale)*w +
/// (1 - rtt/rtt_scale)*w)`, clamped to `[0, 100]`. Scales saturate at 1.0
/// so a pathological target cannot push the score negative on one axis.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub availability: f64,
    pub jitter: f64,
    pub rtt: f64,
    /// RTT at or above which the latency term bottoms out, in milliseconds.
    pub rtt_scale_ms: f64,
    /// Jitter at or above which the jitter term bottoms out, in milliseconds.
    pub jitter_scale_ms: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        ScoreWeights {
            availability: 0.5,
            jitter: 0.3,
            rtt: 0.2,
            rtt_scale_ms: 250.0,
            jitter_scale_ms: 50.0,
        }
    }
}

/// Construction-time configuration for the core. Never mutated after start.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// UDP port the responder listens on.
    pub listen_port: u16,
    /// Seconds between probe cycles.
    pub poll_interval_secs: u64,
    /// Per-probe reply timeout, milliseconds.
    pub probe_timeout_ms: u64,
    /// Per-target history capacity, in samples.
    pub history_capacity: usize,
    /// GPS fix age beyond which the responder degrades to stratum 16, seconds.
    pub staleness_secs: u64,
    /// Advertised root delay, seconds.
    pub root_delay: f64,
    /// Advertised root dispersion, seconds.
    pub root_dispersion: f64,
    /// Grace period for in-flight probes during shutdown, seconds.
    pub shutdown_grace_secs: u64,
    pub weights: ScoreWeights,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listen_port: 123,
            poll_interval_secs: 30,
            probe_timeout_ms: 1000,
            history_capacity: 3600,
            staleness_secs: 60,
            root_delay: 0.0,
            root_dispersion: 0.001,
            shutdown_grace_secs: 5,
            weights: ScoreWeights::default(),
        }
    }
}

impl Config {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn staleness(&self) -> Duration {
        Duration::from_secs(self.staleness_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}
