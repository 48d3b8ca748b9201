//! Bounded per-target sample history and derived quality metrics.
//!
//! One store-wide lock guards every buffer. Readers copy snapshots out;
//! rendering and serialization happen outside the lock, and no caller
//! holds it across network I/O.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use crate::config::ScoreWeights;
use crate::domain::{FleetStats, QualityScore, Target, TargetId, TargetReport, TimeSample};

/// Fixed-capacity FIFO of samples. Insertion beyond capacity evicts the
/// oldest sample.
#[derive(Debug)]
pub struct HistoryBuffer {
    samples: VecDeque<TimeSample>,
    capacity: usize,
}

impl HistoryBuffer {
    pub fn new(capacity: usize) -> HistoryBuffer {
        HistoryBuffer {
            samples: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, sample: TimeSample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn latest(&self) -> Option<&TimeSample> {
        self.samples.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TimeSample> {
        self.samples.iter()
    }

    fn to_vec(&self) -> Vec<TimeSample> {
        self.samples.iter().cloned().collect()
    }
}

/// Quality over a buffer window. Availability counts every sample;
/// latency and jitter are computed strictly over valid samples' RTT.
fn quality_of(buffer: &HistoryBuffer, weights: &ScoreWeights) -> Option<QualityScore> {
    let total = buffer.len();
    if total == 0 {
        return None;
    }
    let rtts: Vec<f64> = buffer.iter().filter_map(|s| s.rtt_ms()).collect();
    let availability = rtts.len() as f64 / total as f64;
    let (avg_rtt_ms, jitter_ms) = if rtts.is_empty() {
        (0.0, 0.0)
    } else {
        let mean = rtts.iter().sum::<f64>() / rtts.len() as f64;
        let variance = rtts.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / rtts.len() as f64;
        (mean, variance.sqrt())
    };
    let norm_rtt = (avg_rtt_ms / weights.rtt_scale_ms).min(1.0);
    let norm_jitter = (jitter_ms / weights.jitter_scale_ms).min(1.0);
    let score = 100.0
        * (weights.availability * availability
            + weights.jitter * (1.0 - norm_jitter)
            + weights.rtt * (1.0 - norm_rtt));
    Some(QualityScore {
        availability,
        avg_rtt_ms,
        jitter_ms,
        score: score.clamp(0.0, 100.0),
    })
}

/// Shared store of per-target history.
#[derive(Debug)]
pub struct StatsStore {
    capacity: usize,
    weights: ScoreWeights,
    buffers: Mutex<HashMap<TargetId, HistoryBuffer>>,
}

impl StatsStore {
    pub fn new(capacity: usize, weights: ScoreWeights) -> StatsStore {
        StatsStore {
            capacity,
            weights,
            buffers: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<TargetId, HistoryBuffer>> {
        self.buffers.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn record(&self, sample: TimeSample) {
        let mut buffers = self.lock();
        buffers
            .entry(sample.target)
            .or_insert_with(|| HistoryBuffer::new(self.capacity))
            .push(sample);
    }

    /// Quality recomputed on demand from the current window.
    pub fn quality(&self, id: TargetId) -> Option<QualityScore> {
        self.lock()
            .get(&id)
            .and_then(|b| quality_of(b, &self.weights))
    }

    pub fn latest(&self, id: TargetId) -> Option<TimeSample> {
        self.lock().get(&id).and_then(|b| b.latest().cloned())
    }

    /// Copy a target's window out under the lock.
    pub fn snapshot(&self, id: TargetId) -> Option<Vec<TimeSample>> {
        self.lock().get(&id).map(HistoryBuffer::to_vec)
    }

    /// Drop a target's history entirely (registry removal).
    pub fn purge(&self, id: TargetId) {
        self.lock().remove(&id);
    }

    pub fn history_len(&self, id: TargetId) -> usize {
        self.lock().get(&id).map_or(0, HistoryBuffer::len)
    }

    /// Query-surface view for one target.
    pub fn report(&self, target: &Target) -> TargetReport {
        let buffers = self.lock();
        let buffer = buffers.get(&target.id);
        let (latest, quality, min_rtt_ms, max_rtt_ms, total, valid) = match buffer {
            Some(b) => {
                let rtts: Vec<f64> = b.iter().filter_map(|s| s.rtt_ms()).collect();
                let (min, max) = if rtts.is_empty() {
                    (None, None)
                } else {
                    (
                        Some(rtts.iter().copied().fold(f64::INFINITY, f64::min)),
                        Some(rtts.iter().copied().fold(f64::NEG_INFINITY, f64::max)),
                    )
                };
                (
                    b.latest().cloned(),
                    quality_of(b, &self.weights),
                    min,
                    max,
                    b.len(),
                    rtts.len(),
                )
            }
            None => (None, None, None, None, 0, 0),
        };
        TargetReport {
            target: target.clone(),
            latest,
            quality,
            min_rtt_ms,
            max_rtt_ms,
            total_samples: total,
            valid_samples: valid,
        }
    }

    /// Aggregate across targets from each one's latest sample.
    pub fn fleet(&self, targets: &[Target]) -> Option<FleetStats> {
        let buffers = self.lock();
        let mut reachable: Vec<(&Target, f64, f64)> = Vec::new();
        for target in targets {
            if let Some(sample) = buffers.get(&target.id).and_then(|b| b.latest()) {
                if let (Some(rtt), Some(offset)) = (sample.rtt_ms(), sample.offset_ms()) {
                    reachable.push((target, rtt, offset));
                }
            }
        }
        if reachable.is_empty() {
            return None;
        }
        let count = reachable.len() as f64;
        let avg_rtt_ms = reachable.iter().map(|(_, r, _)| r).sum::<f64>() / count;
        let avg_offset_ms = reachable.iter().map(|(_, _, o)| o).sum::<f64>() / count;
        let best = reachable
            .iter()
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(t, _, _)| t.name.clone());
        let worst = reachable
            .iter()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(t, _, _)| t.name.clone());
        Some(FleetStats {
            total_targets: targets.len(),
            reachable_targets: reachable.len(),
            avg_rtt_ms,
            avg_offset_ms,
            best_target: best,
            worst_target: worst,
        })
    }
}
