//! Fix cell freshness semantics and the feed task.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{mpsc, watch};

use stratumd::timesource::measure_precision;
use stratumd::{run_feed, GpsFix, TimeSource};

const STALENESS: Duration = Duration::from_secs(60);

#[test]
fn empty_cell_is_unsynchronized() {
    let time = TimeSource::new();
    assert!(time.current().is_none());
    assert!(!time.is_synchronized(STALENESS));
    assert_eq!(time.stratum_hint(STALENESS), 16);
}

#[test]
fn fresh_fix_is_synchronized() {
    let time = TimeSource::new();
    time.update(GpsFix {
        utc: Utc::now(),
        received: Instant::now(),
        quality: 2,
        satellites: 11,
    });
    assert!(time.is_synchronized(STALENESS));
    assert_eq!(time.stratum_hint(STALENESS), 1);
}

#[test]
fn old_fix_goes_stale() {
    let time = TimeSource::new();
    let received = Instant::now()
        .checked_sub(Duration::from_secs(120))
        .expect("monotonic clock too young");
    time.update(GpsFix {
        utc: Utc::now() - chrono::Duration::seconds(120),
        received,
        quality: 1,
        satellites: 6,
    });
    assert!(!time.is_synchronized(STALENESS));
    assert_eq!(time.stratum_hint(STALENESS), 16);
}

#[test]
fn now_extrapolates_fix_by_its_age() {
    let time = TimeSource::new();
    let received = Instant::now()
        .checked_sub(Duration::from_secs(10))
        .expect("monotonic clock too young");
    // Fix pinned 10s ago at T-10: extrapolated now should be ~T.
    time.update(GpsFix {
        utc: Utc::now() - chrono::Duration::seconds(10),
        received,
        quality: 1,
        satellites: 6,
    });
    let delta = (time.now(STALENESS) - Utc::now()).num_milliseconds().abs();
    assert!(delta < 500, "extrapolated clock off by {} ms", delta);
}

#[test]
fn now_falls_back_to_system_clock_without_fix() {
    let time = TimeSource::new();
    let delta = (time.now(STALENESS) - Utc::now()).num_milliseconds().abs();
    assert!(delta < 500);
}

#[test]
fn precision_is_a_sane_exponent() {
    let p = measure_precision();
    assert!((-30..=0).contains(&p), "precision {}", p);
}

#[tokio::test]
async fn feed_task_updates_cell_and_stops_on_shutdown() {
    let time = Arc::new(TimeSource::new());
    let (fix_tx, fix_rx) = mpsc::channel(4);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(run_feed(Arc::clone(&time), fix_rx, shutdown_rx));

    fix_tx
        .send(GpsFix {
            utc: Utc::now(),
            received: Instant::now(),
            quality: 1,
            satellites: 9,
        })
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let fix = time.current().expect("feed should have stored the fix");
    assert_eq!(fix.satellites, 9);

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("feed task must stop on shutdown")
        .unwrap();
}
