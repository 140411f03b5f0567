//! When pull cycles run.

use attsync_core::{ConfigError, ScheduleSettings};
use chrono::{Duration as ChronoDuration, Local, NaiveDateTime, NaiveTime, Timelike};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const SLEEP_STEP: Duration = Duration::from_millis(250);

/// Decides how long to wait before the next cycle.
pub trait Trigger: Send {
    /// Returns the delay from `now` until the next cycle. The slot returned
    /// is considered taken.
    fn next_delay(&mut self, now: NaiveDateTime) -> Duration;
}

/// Builds the trigger for a schedule.
pub fn trigger_from_settings(schedule: &ScheduleSettings) -> Result<Box<dyn Trigger>, ConfigError> {
    let trigger: Box<dyn Trigger> = match schedule {
        ScheduleSettings::Interval { every_secs } => {
            Box::new(IntervalTrigger::new(Duration::from_secs((*every_secs).max(1))))
        }
        ScheduleSettings::Daily { times } => {
            Box::new(DailyTrigger::new(ScheduleSettings::daily_times(times)?))
        }
    };
    Ok(trigger)
}

/// Fires immediately, then every `every`, anchored on the first tick.
///
/// Ticks that passed while a cycle was still running are skipped rather than
/// run back to back.
#[derive(Debug, Clone)]
pub struct IntervalTrigger {
    every: ChronoDuration,
    next: Option<NaiveDateTime>,
}

impl IntervalTrigger {
    /// Creates an interval trigger.
    pub fn new(every: Duration) -> Self {
        Self {
            every: ChronoDuration::from_std(every).unwrap_or(ChronoDuration::seconds(1)),
            next: None,
        }
    }
}

impl Trigger for IntervalTrigger {
    fn next_delay(&mut self, now: NaiveDateTime) -> Duration {
        let Some(mut slot) = self.next else {
            self.next = Some(now + self.every);
            return Duration::ZERO;
        };

        while slot < now {
            slot += self.every;
        }
        self.next = Some(slot + self.every);
        (slot - now).to_std().unwrap_or(Duration::ZERO)
    }
}

/// Fires at listed wall-clock minutes, at most once per minute.
#[derive(Debug, Clone)]
pub struct DailyTrigger {
    times: Vec<NaiveTime>,
    last_run: Option<NaiveDateTime>,
}

impl DailyTrigger {
    /// Creates a trigger for the given times of day.
    pub fn new(mut times: Vec<NaiveTime>) -> Self {
        for t in &mut times {
            *t = t.with_second(0).unwrap_or(*t).with_nanosecond(0).unwrap_or(*t);
        }
        times.sort();
        times.dedup();
        Self {
            times,
            last_run: None,
        }
    }

    /// Times of day, ascending.
    pub fn times(&self) -> &[NaiveTime] {
        &self.times
    }

    fn next_slot(&self, now: NaiveDateTime) -> Option<NaiveDateTime> {
        let minute = now.with_second(0)?.with_nanosecond(0)?;
        let today = now.date();
        let tomorrow = today.succ_opt()?;

        [today, tomorrow]
            .into_iter()
            .flat_map(|day| self.times.iter().map(move |t| day.and_time(*t)))
            .find(|slot| *slot >= minute && Some(*slot) != self.last_run)
    }
}

impl Trigger for DailyTrigger {
    fn next_delay(&mut self, now: NaiveDateTime) -> Duration {
        match self.next_slot(now) {
            Some(slot) => {
                self.last_run = Some(slot);
                (slot - now).to_std().unwrap_or(Duration::ZERO)
            }
            None => Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Stops a running [`TickLoop`].
#[derive(Debug, Clone)]
pub struct TickHandle(Arc<AtomicBool>);

impl TickHandle {
    /// Asks the loop to return after the current cycle.
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns true once [`stop`](Self::stop) was called.
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Sleeps until each tick and runs the callback on the calling thread.
///
/// Cycles never overlap: the next delay is computed only after the callback
/// returns.
#[derive(Debug, Default)]
pub struct TickLoop {
    stop: Arc<AtomicBool>,
}

impl TickLoop {
    /// Creates a loop.
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for stopping the loop from another thread.
    pub fn handle(&self) -> TickHandle {
        TickHandle(Arc::clone(&self.stop))
    }

    /// Runs until stopped and returns the number of ticks.
    pub fn run(&self, trigger: &mut dyn Trigger, mut on_tick: impl FnMut()) -> u64 {
        let mut ticks = 0;
        loop {
            let delay = trigger.next_delay(Local::now().naive_local());
            if !delay.is_zero() {
                tracing::debug!(delay_secs = delay.as_secs(), "waiting for next tick");
            }
            if !self.sleep(delay) {
                break;
            }
            ticks += 1;
            on_tick();
        }
        tracing::info!(ticks, "tick loop stopped");
        ticks
    }

    /// Sleeps in short steps. Returns false when stopped.
    fn sleep(&self, delay: Duration) -> bool {
        let deadline = Instant::now() + delay;
        loop {
            if self.stop.load(Ordering::SeqCst) {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep((deadline - now).min(SLEEP_STEP));
        }
    }
}
