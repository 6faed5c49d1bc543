//! Recurring status broadcasts.
//!
//! One repeating timer runs the batch query over the saved server list and
//! posts the result to every target channel while the local time of day is
//! inside the configured window. Stopping or replacing the timer only takes
//! effect between ticks, so a broadcast that has started reaches every target.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{Local, NaiveTime, Timelike};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use crate::broadcast::{Broadcaster, Payload};
use crate::format::format_batch;
use crate::query::{MAX_BATCH, QueryService, ServerQuery};
use crate::render::{Renderer, SurfaceFactory};

/// Daily time-of-day window, inclusive at minute resolution.
///
/// A window whose start is after its end spans midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeWindow {
    pub fn contains(&self, now: NaiveTime) -> bool {
        let minute = minute_of_day(now);
        let start = minute_of_day(self.start);
        let end = minute_of_day(self.end);
        if start <= end {
            (start..=end).contains(&minute)
        } else {
            minute >= start || minute <= end
        }
    }
}

impl std::fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.start.format("%H:%M"), self.end.format("%H:%M"))
    }
}

fn minute_of_day(time: NaiveTime) -> u32 {
    time.hour() * 60 + time.minute()
}

/// Live schedule configuration.
#[derive(Debug, Clone)]
pub struct ScheduleSettings {
    pub enabled: bool,
    pub interval: Duration,
    pub window: TimeWindow,
    /// Channel IDs receiving broadcasts
    pub targets: Vec<u64>,
    /// Server addresses queried each tick
    pub addresses: Vec<String>,
    /// Broadcast a banner instead of a text table
    pub image: bool,
}

/// Why a tick did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    NoTargets,
    NoAddresses,
    OutsideWindow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Skipped(SkipReason),
    Broadcast { delivered: usize, failed: usize },
}

struct Pipeline<Q, F, B> {
    settings: Mutex<ScheduleSettings>,
    queries: Arc<QueryService<Q>>,
    renderer: Arc<Renderer<F>>,
    broadcaster: B,
}

impl<Q: ServerQuery, F: SurfaceFactory, B: Broadcaster> Pipeline<Q, F, B> {
    fn settings(&self) -> ScheduleSettings {
        lock(&self.settings).clone()
    }

    async fn tick_at(&self, now: NaiveTime) -> TickOutcome {
        let settings = self.settings();
        if !settings.enabled {
            return TickOutcome::Skipped(SkipReason::Disabled);
        }
        if !settings.window.contains(now) {
            debug!(window = %settings.window, now = %now.format("%H:%M"), "outside broadcast window");
            return TickOutcome::Skipped(SkipReason::OutsideWindow);
        }
        self.broadcast(settings).await
    }

    async fn broadcast(&self, settings: ScheduleSettings) -> TickOutcome {
        if settings.targets.is_empty() {
            return TickOutcome::Skipped(SkipReason::NoTargets);
        }
        if settings.addresses.is_empty() {
            return TickOutcome::Skipped(SkipReason::NoAddresses);
        }

        let payload = self.payload(&settings.addresses, settings.image).await;

        let mut delivered = 0;
        let mut failed = 0;
        for target in &settings.targets {
            match self.broadcaster.deliver(*target, &payload).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    error!(target, error = %e, "scheduled broadcast failed");
                    failed += 1;
                }
            }
        }

        info!(delivered, failed, "scheduled broadcast sent");
        TickOutcome::Broadcast { delivered, failed }
    }

    async fn payload(&self, addresses: &[String], image: bool) -> Payload {
        let queried = &addresses[..addresses.len().min(MAX_BATCH)];
        if queried.len() < addresses.len() {
            warn!(saved = addresses.len(), queried = queried.len(), "scheduled report truncated");
        }
        let report = self.queries.query_batch(queried).await;
        if image {
            match self.renderer.render_batch(&report) {
                Ok(png) => return Payload::Image(png),
                Err(e) => {
                    warn!(error = %e, "scheduled banner failed, sending text");
                    return Payload::Text(format!(
                        "⚠️ Could not render the status image ({}), showing text instead.\n\n{}",
                        e,
                        format_batch(&report)
                    ));
                }
            }
        }
        Payload::Text(format_batch(&report))
    }
}

/// A spawned timer loop and the signal that ends it.
struct Timer {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl Timer {
    /// Let the loop exit the next time it waits for a tick.
    fn finish(self) {
        // Err only when the loop has already exited
        let _ = self.stop.send(());
    }
}

/// Owns the schedule settings and the single live timer.
pub struct Scheduler<Q, F, B> {
    pipeline: Arc<Pipeline<Q, F, B>>,
    timer: Mutex<Option<Timer>>,
}

impl<Q: ServerQuery, F: SurfaceFactory, B: Broadcaster> Scheduler<Q, F, B> {
    pub fn new(
        settings: ScheduleSettings,
        queries: Arc<QueryService<Q>>,
        renderer: Arc<Renderer<F>>,
        broadcaster: B,
    ) -> Self {
        Self {
            pipeline: Arc::new(Pipeline {
                settings: Mutex::new(settings),
                queries,
                renderer,
                broadcaster,
            }),
            timer: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> ScheduleSettings {
        self.pipeline.settings()
    }

    /// Modify the settings. A running timer keeps its interval until restarted.
    pub fn update(&self, change: impl FnOnce(&mut ScheduleSettings)) {
        change(&mut lock(&self.pipeline.settings));
    }

    /// Start (or restart) the repeating timer.
    ///
    /// Any existing timer is told to stop; a tick it is running still
    /// finishes. The first tick runs immediately. Returns false when disabled
    /// or the interval is zero.
    pub fn start(&self) -> bool {
        let settings = self.settings();
        if !settings.enabled || settings.interval.is_zero() {
            debug!(enabled = settings.enabled, "schedule not started");
            return false;
        }

        let mut timer = lock(&self.timer);
        if let Some(previous) = timer.take() {
            previous.finish();
            debug!("replaced running schedule timer");
        }

        let pipeline = Arc::clone(&self.pipeline);
        let period = settings.interval;
        let (stop, mut stopped) = oneshot::channel();
        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = &mut stopped => break,
                    _ = ticker.tick() => {}
                }
                let outcome = pipeline.tick_at(Local::now().time()).await;
                debug!(?outcome, "schedule tick");
            }
            debug!("schedule timer exited");
        });
        *timer = Some(Timer { stop, handle });

        info!(
            interval_secs = period.as_secs(),
            window = %settings.window,
            "schedule started"
        );
        true
    }

    /// Cancel future ticks. A tick already in progress finishes.
    /// Returns false if the timer was not running.
    pub fn stop(&self) -> bool {
        match lock(&self.timer).take() {
            Some(timer) => {
                timer.finish();
                info!("schedule stopped");
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.timer)
            .as_ref()
            .is_some_and(|timer| !timer.handle.is_finished())
    }

    /// Run one tick as if the local time were `now`.
    pub async fn tick_at(&self, now: NaiveTime) -> TickOutcome {
        self.pipeline.tick_at(now).await
    }

    /// Broadcast immediately, ignoring the enabled flag and the time window.
    pub async fn run_now(&self) -> TickOutcome {
        let settings = self.settings();
        self.pipeline.broadcast(settings).await
    }

    /// Build the scheduled message without sending it.
    /// Returns None when no servers are configured.
    pub async fn preview(&self) -> Option<Payload> {
        let settings = self.settings();
        if settings.addresses.is_empty() {
            return None;
        }
        Some(self.pipeline.payload(&settings.addresses, settings.image).await)
    }
}

impl<Q, F, B> Drop for Scheduler<Q, F, B> {
    fn drop(&mut self) {
        if let Some(timer) = lock(&self.timer).take() {
            timer.finish();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_window_inclusive_bounds() {
        let window = TimeWindow {
            start: time(8, 0),
            end: time(23, 0),
        };
        assert!(window.contains(time(8, 0)));
        assert!(window.contains(NaiveTime::from_hms_opt(23, 0, 59).unwrap()));
        assert!(window.contains(time(12, 30)));
        assert!(!window.contains(time(7, 59)));
        assert!(!window.contains(time(23, 1)));
    }

    #[test]
    fn test_window_across_midnight() {
        let window = TimeWindow {
            start: time(22, 0),
            end: time(2, 0),
        };
        assert!(window.contains(time(23, 30)));
        assert!(window.contains(time(0, 15)));
        assert!(window.contains(time(2, 0)));
        assert!(!window.contains(time(12, 0)));
    }

    #[test]
    fn test_window_display() {
        let window = TimeWindow {
            start: time(8, 5),
            end: time(23, 0),
        };
        assert_eq!(window.to_string(), "08:05-23:00");
    }
}
