use chrono::{DateTime, Utc};
use serde::Serialize;

use super::target::{Target, TargetId};

/// One four-timestamp exchange against a monitored server.
///
/// Timestamps are integer nanoseconds since the NTP prime epoch and are
/// populated only as far as the exchange actually progressed. `rtt_ns` and
/// `offset_ns` are defined only on valid samples.
#[derive(Clone, Debug, Serialize)]
pub struct TimeSample {
    pub target: TargetId,
    pub at: DateTime<Utc>,
    /// Local transmit time (originate).
    pub t1: Option<i64>,
    /// Remote receive time.
    pub t2: Option<i64>,
    /// Remote transmit time.
    pub t3: Option<i64>,
    /// Local receive time.
    pub t4: Option<i64>,
    pub rtt_ns: Option<i64>,
    pub offset_ns: Option<i64>,
    pub valid: bool,
    /// Stratum reported by the remote server on a successful reply.
    pub stratum: Option<u8>,
    pub ref_id: Option<String>,
}

impl TimeSample {
    /// Build a valid sample from a complete exchange, or an invalid one
    /// when the timestamps are not monotonic (t1 <= t2 <= t3 <= t4).
    pub fn from_exchange(
        target: TargetId,
        at: DateTime<Utc>,
        t1: i64,
        t2: i64,
        t3: i64,
        t4: i64,
        stratum: u8,
        ref_id: String,
    ) -> TimeSample {
        let ordered = t1 <= t2 && t2 <= t3 && t3 <= t4;
        if !ordered {
            return TimeSample {
                target,
                at,
                t1: Some(t1),
                t2: Some(t2),
                t3: Some(t3),
                t4: Some(t4),
                rtt_ns: None,
                offset_ns: None,
                valid: false,
                stratum: Some(stratum),
                ref_id: Some(ref_id),
            };
        }
        let rtt = (t4 - t1) - (t3 - t2);
        let offset = ((t2 - t1) + (t3 - t4)) / 2;
        TimeSample {
            target,
            at,
            t1: Some(t1),
            t2: Some(t2),
            t3: Some(t3),
            t4: Some(t4),
            rtt_ns: Some(rtt),
            offset_ns: Some(offset),
            valid: true,
            stratum: Some(stratum),
            ref_id: Some(ref_id),
        }
    }

    /// An exchange that failed before completing: timeout, unreachable
    /// host, or a malformed reply. Counts toward unavailability.
    pub fn failed(target: TargetId, at: DateTime<Utc>, t1: Option<i64>) -> TimeSample {
        TimeSample {
            target,
            at,
            t1,
            t2: None,
            t3: None,
            t4: None,
            rtt_ns: None,
            offset_ns: None,
            valid: false,
            stratum: None,
            ref_id: None,
        }
    }

    pub fn rtt_ms(&self) -> Option<f64> {
        self.rtt_ns.map(|ns| ns as f64 / 1e6)
    }

    pub fn offset_ms(&self) -> Option<f64> {
        self.offset_ns.map(|ns| ns as f64 / 1e6)
    }
}

/// Derived per-target quality over the current history window.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct QualityScore {
    /// Valid samples over total samples, in `[0, 1]`.
    pub availability: f64,
    /// Mean RTT over valid samples, milliseconds.
    pub avg_rtt_ms: f64,
    /// Standard deviation of RTT over valid samples, milliseconds.
    pub jitter_ms: f64,
    /// Composite score in `[0, 100]`.
    pub score: f64,
}

/// Query-surface view of one target: identity, latest sample, quality,
/// and window counters.
#[derive(Clone, Debug, Serialize)]
pub struct TargetReport {
    pub target: Target,
    pub latest: Option<TimeSample>,
    pub quality: Option<QualityScore>,
    pub min_rtt_ms: Option<f64>,
    pub max_rtt_ms: Option<f64>,
    pub total_samples: usize,
    pub valid_samples: usize,
}

/// Aggregate view across all monitored targets, from each target's
/// latest sample.
#[derive(Clone, Debug, Serialize)]
pub struct FleetStats {
    pub total_targets: usize,
    pub reachable_targets: usize,
    pub avg_rtt_ms: f64,
    pub avg_offset_ms: f64,
    pub best_target: Option<String>,
    pub worst_target: Option<String>,
}

/// Current GPS fix state as seen by the presentation layer.
#[derive(Clone, Debug, Serialize)]
pub struct FixStatus {
    pub utc: DateTime<Utc>,
    pub fix_valid: bool,
    /// 1 when serving GPS time, 16 when unsynchronized.
    pub stratum_hint: u8,
    pub satellites: u8,
    pub fix_age_secs: Option<f64>,
}
