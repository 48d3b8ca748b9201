//! History bounds and quality-score behavior.

use chrono::Utc;
use stratumd::{HistoryBuffer, ScoreWeights, StatsStore, TimeSample};

const MS: i64 = 1_000_000;

/// Valid sample with a chosen RTT and zero offset.
fn valid_sample(target: u64, rtt_ms: i64) -> TimeSample {
    let t1 = 0;
    let t2 = rtt_ms * MS / 2;
    let t3 = t2;
    let t4 = rtt_ms * MS;
    TimeSample::from_exchange(target, Utc::now(), t1, t2, t3, t4, 2, "10.0.0.1".into())
}

fn failed_sample(target: u64) -> TimeSample {
    TimeSample::failed(target, Utc::now(), Some(0))
}

#[test]
fn exchange_formulas() {
    let s = TimeSample::from_exchange(1, Utc::now(), 100, 250, 300, 400, 2, "x".into());
    assert!(s.valid);
    // rtt = (t4-t1)-(t3-t2), offset = ((t2-t1)+(t3-t4))/2
    assert_eq!(s.rtt_ns, Some(250));
    assert_eq!(s.offset_ns, Some(25));
    // Recomputing from the stored timestamps reproduces the stored values.
    let (t1, t2, t3, t4) = (
        s.t1.unwrap(),
        s.t2.unwrap(),
        s.t3.unwrap(),
        s.t4.unwrap(),
    );
    assert_eq!(s.rtt_ns.unwrap(), (t4 - t1) - (t3 - t2));
    assert_eq!(s.offset_ns.unwrap(), ((t2 - t1) + (t3 - t4)) / 2);
}

#[test]
fn exchange_rejects_non_monotonic_timestamps() {
    // t3 before t2: remote clock claims to transmit before receiving.
    let s = TimeSample::from_exchange(1, Utc::now(), 100, 300, 250, 400, 2, "x".into());
    assert!(!s.valid);
    assert_eq!(s.rtt_ns, None);
    assert_eq!(s.offset_ns, None);
}

#[test]
fn history_buffer_evicts_oldest_at_capacity() {
    let mut buffer = HistoryBuffer::new(5);
    for rtt in 1..=6 {
        buffer.push(valid_sample(1, rtt));
    }
    assert_eq!(buffer.len(), 5);
    // Oldest (rtt=1ms) evicted; window now starts at 2ms.
    let first = buffer.iter().next().unwrap();
    assert_eq!(first.rtt_ns, Some(2 * MS));
    assert_eq!(buffer.latest().unwrap().rtt_ns, Some(6 * MS));
}

#[test]
fn store_respects_capacity() {
    let store = StatsStore::new(3, ScoreWeights::default());
    for rtt in 1..=10 {
        store.record(valid_sample(7, rtt));
    }
    assert_eq!(store.history_len(7), 3);
    let snapshot = store.snapshot(7).unwrap();
    assert_eq!(snapshot[0].rtt_ns, Some(8 * MS));
}

#[test]
fn quality_formula_pinned() {
    let w = ScoreWeights::default();
    let store = StatsStore::new(100, w);
    // Four identical 100ms samples: availability 1, jitter 0.
    for _ in 0..4 {
        store.record(valid_sample(1, 100));
    }
    let q = store.quality(1).unwrap();
    assert!((q.availability - 1.0).abs() < 1e-12);
    assert!((q.avg_rtt_ms - 100.0).abs() < 1e-9);
    assert!(q.jitter_ms.abs() < 1e-9);
    let expected = 100.0
        * (w.availability * 1.0
            + w.jitter * 1.0
            + w.rtt * (1.0 - 100.0 / w.rtt_scale_ms));
    assert!((q.score - expected).abs() < 1e-9, "{} vs {}", q.score, expected);
}

#[test]
fn quality_always_within_bounds() {
    let store = StatsStore::new(100, ScoreWeights::default());
    // Absurd RTTs and heavy packet loss still clamp into [0, 100].
    for _ in 0..3 {
        store.record(valid_sample(1, 10_000));
    }
    for _ in 0..17 {
        store.record(failed_sample(1));
    }
    let q = store.quality(1).unwrap();
    assert!((0.0..=100.0).contains(&q.score));

    let store = StatsStore::new(100, ScoreWeights::default());
    store.record(valid_sample(2, 1));
    let q = store.quality(2).unwrap();
    assert!((0.0..=100.0).contains(&q.score));
}

#[test]
fn quality_non_increasing_in_availability_loss() {
    // Same RTT profile, growing share of failures.
    let mut last = f64::INFINITY;
    for failures in 0..=5 {
        let store = StatsStore::new(100, ScoreWeights::default());
        for _ in 0..10 {
            store.record(valid_sample(1, 20));
        }
        for _ in 0..failures {
            store.record(failed_sample(1));
        }
        let score = store.quality(1).unwrap().score;
        assert!(score <= last, "failures {}: {} > {}", failures, score, last);
        last = score;
    }
}

#[test]
fn scenario_eight_successes_two_timeouts() {
    let store = StatsStore::new(100, ScoreWeights::default());
    let rtts = [10, 12, 14, 15, 16, 17, 18, 20];
    for rtt in rtts {
        store.record(valid_sample(9, rtt));
    }
    for _ in 0..2 {
        store.record(failed_sample(9));
    }
    assert_eq!(store.history_len(9), 10);
    let snapshot = store.snapshot(9).unwrap();
    assert_eq!(snapshot.iter().filter(|s| !s.valid).count(), 2);

    let q = store.quality(9).unwrap();
    assert!((q.availability - 0.8).abs() < 1e-12);

    // Baseline: the same eight successes with no timeouts.
    let baseline = StatsStore::new(100, ScoreWeights::default());
    for rtt in rtts {
        baseline.record(valid_sample(10, rtt));
    }
    let b = baseline.quality(10).unwrap();
    assert!(q.score < b.score);
    assert!((q.avg_rtt_ms - b.avg_rtt_ms).abs() < 1e-9);
}

#[test]
fn quality_empty_window_is_none() {
    let store = StatsStore::new(100, ScoreWeights::default());
    assert!(store.quality(1).is_none());
    store.record(failed_sample(1));
    // All-failure window scores on availability alone.
    let q = store.quality(1).unwrap();
    assert!((q.availability - 0.0).abs() < 1e-12);
    assert_eq!(q.avg_rtt_ms, 0.0);
}

#[test]
fn purge_discards_history() {
    let store = StatsStore::new(100, ScoreWeights::default());
    store.record(valid_sample(1, 10));
    assert_eq!(store.history_len(1), 1);
    store.purge(1);
    assert_eq!(store.history_len(1), 0);
    assert!(store.quality(1).is_none());
}
