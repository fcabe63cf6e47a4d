//! Live "time until reset" countdowns, one per meter.

use crate::types::MeterKind;
use crate::view::MeterView;
use chrono::{DateTime, Utc};
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

const TICK: Duration = Duration::from_secs(1);

/// Format seconds as `HH:MM:SS`: floored, clamped at zero, two digits per
/// field (hours grow past two digits if they have to).
pub fn format_hms(secs: f64) -> String {
    let total = if secs.is_finite() && secs > 0.0 {
        secs.floor() as u64
    } else {
        0
    };
    format!(
        "{:02}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}

pub fn countdown_text(secs: f64) -> String {
    format!("Resets in {}", format_hms(secs))
}

/// Seconds from `now` until the RFC 3339 timestamp `reset_at`.
pub fn seconds_until(reset_at: &str, now: DateTime<Utc>) -> Option<f64> {
    let target = DateTime::parse_from_rfc3339(reset_at).ok()?;
    let delta = target.with_timezone(&Utc) - now;
    Some(delta.num_milliseconds() as f64 / 1000.0)
}

/// Keyed countdown registry. Starting a countdown for a meter aborts the
/// previous one for that meter only. When a countdown reaches zero its meter
/// is sent once on the expiry channel.
pub struct Countdowns {
    view: Arc<dyn MeterView>,
    timers: HashMap<MeterKind, JoinHandle<()>>,
    expired_tx: mpsc::UnboundedSender<MeterKind>,
}

impl Countdowns {
    pub fn new(view: Arc<dyn MeterView>) -> (Self, mpsc::UnboundedReceiver<MeterKind>) {
        let (expired_tx, expired_rx) = mpsc::unbounded_channel();
        let me = Self {
            view,
            timers: HashMap::new(),
            expired_tx,
        };
        (me, expired_rx)
    }

    /// Count down to `reset_at`. Returns false when the timestamp does not
    /// parse; the meter's previous countdown is stopped either way.
    pub fn start_at(&mut self, kind: MeterKind, reset_at: &str) -> bool {
        match seconds_until(reset_at, Utc::now()) {
            Some(secs) => {
                self.start_in(kind, secs);
                true
            }
            None => {
                debug!("{} countdown: unparsable reset_at {:?}", kind, reset_at);
                self.cancel(kind);
                false
            }
        }
    }

    /// Count down `secs` seconds from now. The first value is rendered
    /// before this returns. Under one second the display already reads
    /// zero: nothing is armed and no expiry is sent, so a reset time the
    /// server has not yet rolled over cannot loop refreshes.
    pub fn start_in(&mut self, kind: MeterKind, secs: f64) {
        self.cancel(kind);
        self.view.set_countdown(kind, &countdown_text(secs));
        if !(secs.is_finite() && secs >= 1.0) {
            return;
        }

        let deadline = Instant::now() + Duration::from_secs_f64(secs);
        let view = Arc::clone(&self.view);
        let tx = self.expired_tx.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + TICK, TICK);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let expiry = time::sleep_until(deadline);
            tokio::pin!(expiry);
            loop {
                tokio::select! {
                    biased;
                    _ = &mut expiry => {
                        view.set_countdown(kind, &countdown_text(0.0));
                        let _ = tx.send(kind);
                        break;
                    }
                    _ = ticker.tick() => {
                        let left = deadline.saturating_duration_since(Instant::now());
                        view.set_countdown(kind, &countdown_text(left.as_secs_f64()));
                    }
                }
            }
        });
        self.timers.insert(kind, handle);
    }

    pub fn cancel(&mut self, kind: MeterKind) -> bool {
        match self.timers.remove(&kind) {
            Some(h) => {
                h.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self, kind: MeterKind) -> bool {
        self.timers.get(&kind).is_some_and(|h| !h.is_finished())
    }

    pub fn active_count(&self) -> usize {
        MeterKind::ALL
            .iter()
            .filter(|k| self.is_active(**k))
            .count()
    }
}

impl Drop for Countdowns {
    fn drop(&mut self) {
        for (_, h) in self.timers.drain() {
            h.abort();
        }
    }
}
