//! Job schedules.

use std::fmt;
use std::str::FromStr;

use chrono::DateTime;
use chrono_tz::Tz;

use crate::error::JobError;

/// Literal schedule that runs a job once at startup.
pub const NOW: &str = "now";

/// When a job is triggered.
#[derive(Debug, Clone)]
pub enum Schedule {
    /// No timer. Runs only through a declared worker.
    Manual,
    /// Runs exactly once when the scheduler starts.
    Now,
    /// Repeats on a cron expression.
    Cron(CronSchedule),
}

impl Schedule {
    /// Parse an optional schedule expression.
    ///
    /// `None` is [`Schedule::Manual`] and `"now"` is [`Schedule::Now`].
    /// Anything else must be a cron expression with five, six or seven fields.
    pub fn parse(expr: Option<&str>) -> Result<Self, JobError> {
        match expr {
            None => Ok(Schedule::Manual),
            Some(NOW) => Ok(Schedule::Now),
            Some(expr) => CronSchedule::parse(expr).map(Schedule::Cron),
        }
    }

    /// True when the job gets an auto worker.
    pub fn is_scheduled(&self) -> bool {
        !matches!(self, Schedule::Manual)
    }

    pub fn as_cron(&self) -> Option<&CronSchedule> {
        match self {
            Schedule::Cron(cron) => Some(cron),
            _ => None,
        }
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Schedule::Manual => f.write_str("manual"),
            Schedule::Now => f.write_str(NOW),
            Schedule::Cron(cron) => f.write_str(cron.expr()),
        }
    }
}

/// A parsed cron expression.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    expr: String,
    schedule: cron::Schedule,
}

impl CronSchedule {
    /// Parse a cron expression.
    ///
    /// Five-field expressions (`minute hour day month weekday`) get a
    /// leading `0` seconds field.
    pub fn parse(expr: &str) -> Result<Self, JobError> {
        let trimmed = expr.trim();
        let normalized = match trimmed.split_whitespace().count() {
            0 => {
                return Err(JobError::InvalidSchedule {
                    expr: expr.to_string(),
                    message: "empty expression".to_string(),
                });
            }
            5 => format!("0 {trimmed}"),
            _ => trimmed.to_string(),
        };

        let schedule =
            cron::Schedule::from_str(&normalized).map_err(|e| JobError::InvalidSchedule {
                expr: expr.to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            expr: trimmed.to_string(),
            schedule,
        })
    }

    /// The expression as written at registration.
    pub fn expr(&self) -> &str {
        &self.expr
    }

    /// Next fire time strictly after now in the given zone.
    pub fn next_fire(&self, tz: Tz) -> Option<DateTime<Tz>> {
        self.schedule.upcoming(tz).next()
    }

    /// Next fire time strictly after `after`.
    pub fn next_after(&self, after: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        self.schedule.after(after).next()
    }
}
