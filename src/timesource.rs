//! GPS-derived time reference.
//!
//! The external GPS collaborator (serial/NMEA ingestion lives outside this
//! crate) pushes calibrated fixes through an mpsc channel; a feed task is
//! the single writer of the current-fix cell, and the responder reads
//! consistent snapshots through a watch channel.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::proto::STRATUM_UNSYNCHRONIZED;

/// One calibrated fix event from the GPS collaborator.
#[derive(Clone, Copy, Debug)]
pub struct GpsFix {
    /// UTC instant the fix was valid for.
    pub utc: DateTime<Utc>,
    /// Local monotonic instant the fix was received, used to extrapolate
    /// and to age the fix.
    pub received: Instant,
    /// NMEA GGA fix quality (0 = none, 1 = GPS, 2 = DGPS, ...).
    pub quality: u8,
    pub satellites: u8,
}

impl GpsFix {
    pub fn age(&self) -> Duration {
        self.received.elapsed()
    }
}

/// Single-writer, multi-reader cell holding the latest fix.
#[derive(Debug)]
pub struct TimeSource {
    cell: watch::Sender<Option<GpsFix>>,
}

impl TimeSource {
    pub fn new() -> TimeSource {
        let (cell, _) = watch::channel(None);
        TimeSource { cell }
    }

    /// Replace the current fix. Called only by the feed task.
    pub fn update(&self, fix: GpsFix) {
        self.cell.send_replace(Some(fix));
    }

    pub fn current(&self) -> Option<GpsFix> {
        *self.cell.borrow()
    }

    /// True when a fix exists, reports at least a basic GPS solution, and
    /// is younger than the staleness threshold.
    pub fn is_synchronized(&self, staleness: Duration) -> bool {
        match self.current() {
            Some(fix) => fix.quality > 0 && fix.age() <= staleness,
            None => false,
        }
    }

    pub fn stratum_hint(&self, staleness: Duration) -> u8 {
        if self.is_synchronized(staleness) {
            1
        } else {
            STRATUM_UNSYNCHRONIZED
        }
    }

    /// Current UTC: the fix extrapolated by its age while synchronized,
    /// the system clock otherwise.
    pub fn now(&self, staleness: Duration) -> DateTime<Utc> {
        match self.current() {
            Some(fix) if fix.quality > 0 && fix.age() <= staleness => {
                match chrono::Duration::from_std(fix.age()) {
                    Ok(elapsed) => fix.utc + elapsed,
                    Err(_) => Utc::now(),
                }
            }
            _ => Utc::now(),
        }
    }
}

impl Default for TimeSource {
    fn default() -> Self {
        TimeSource::new()
    }
}

/// Feed task: drains fix events into the cell until the channel closes or
/// shutdown is signalled.
pub async fn run_feed(
    time: std::sync::Arc<TimeSource>,
    mut events: mpsc::Receiver<GpsFix>,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("time source feed started");
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            event = events.recv() => match event {
                Some(fix) => {
                    debug!(utc = %fix.utc, quality = fix.quality, satellites = fix.satellites, "fix updated");
                    time.update(fix);
                }
                None => {
                    warn!("fix event channel closed");
                    break;
                }
            },
        }
    }
    info!("time source feed stopped");
}

/// Estimate local clock resolution as a power of two, for the responder's
/// precision field. Samples the shortest observable monotonic increment.
pub fn measure_precision() -> i8 {
    let mut shortest = Duration::from_secs(1);
    for _ in 0..8 {
        let start = Instant::now();
        let mut next = Instant::now();
        while next == start {
            next = Instant::now();
        }
        shortest = shortest.min(next - start);
    }
    let secs = shortest.as_secs_f64().max(1e-9);
    secs.log2().round().clamp(-30.0, 0.0) as i8
}
