//! Weekday alert schedule and the background loop that follows it.

use std::future::Future;

use chrono::{Datelike, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime, Weekday};

use super::environment::AlertScheduleConfig;

/// Fires Monday to Friday at a fixed local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertSchedule {
    at: NaiveTime,
}

impl AlertSchedule {
    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0).map(|at| Self { at })
    }

    pub fn from_config(config: &AlertScheduleConfig) -> Option<Self> {
        if !config.enabled {
            return None;
        }
        Self::new(config.hour, config.minute)
    }

    fn is_workday(date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
    }

    /// First occurrence strictly after `now`.
    pub fn next_after(&self, now: NaiveDateTime) -> NaiveDateTime {
        let mut date = now.date();
        if now.time() >= self.at {
            date += Duration::days(1);
        }
        while !Self::is_workday(date) {
            date += Duration::days(1);
        }
        date.and_time(self.at)
    }

    pub fn describe(&self) -> String {
        format!("Mon-Fri {}", self.at.format("%H:%M"))
    }
}

/// Run `job` at every occurrence of `schedule`, forever.
pub fn spawn<F, Fut>(schedule: AlertSchedule, job: F) -> tokio::task::JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    log::info!("Alert email check scheduled: {}", schedule.describe());
    tokio::spawn(async move {
        loop {
            let now = Local::now().naive_local();
            let next = schedule.next_after(now);
            let wait = (next - now).to_std().unwrap_or_default();
            log::debug!("Next alert check at {}", next);
            tokio::time::sleep(wait).await;
            log::info!("Running scheduled alert check");
            job().await;
        }
    })
}
