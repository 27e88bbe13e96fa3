//! Daily trigger time arithmetic.

use chrono::{Duration as ChronoDuration, Local, NaiveDateTime, NaiveTime};
use std::time::Duration;

/// Interval between scheduled runs once the first one has fired.
pub const DAILY_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Local time of day at which the automatic backup runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailySchedule {
    time: NaiveTime,
}

impl DailySchedule {
    /// `None` if `hour`/`minute` are out of range.
    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0).map(|time| Self { time })
    }

    /// Next occurrence of the configured time at or after `now`.
    ///
    /// If today's slot has already passed, the next run is tomorrow.
    pub fn next_fire_after(&self, now: NaiveDateTime) -> NaiveDateTime {
        let today = now.date().and_time(self.time);
        if now.time() > self.time {
            today + ChronoDuration::days(1)
        } else {
            today
        }
    }

    /// Delay from `now` until the next run, truncated to whole seconds.
    ///
    /// Computed on naive local wall-clock time. On a day with a DST
    /// transition the real elapsed time differs by the offset change, so
    /// the run fires an hour early or late. The following 24h ticks keep
    /// that shift until the daemon restarts.
    pub fn delay_from(&self, now: NaiveDateTime) -> Duration {
        let secs = (self.next_fire_after(now) - now).num_seconds().max(0);
        Duration::from_secs(secs as u64)
    }

    pub fn delay_until_next(&self) -> Duration {
        self.delay_from(Local::now().naive_local())
    }

    /// Next run as `YYYY-MM-DD HH:MM:SS` local time.
    pub fn next_fire_time(&self) -> String {
        self.next_fire_after(Local::now().naive_local())
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
    }
}
