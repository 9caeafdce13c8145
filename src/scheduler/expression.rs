//! Schedule expression parsing
//!
//! Accepted forms:
//!
//! - empty or `manual`: no automatic runs
//! - five-field cron (`minute hour day-of-month month day-of-week`) with
//!   ranges, steps, lists and month/weekday names
//! - descriptors such as `@hourly` or `@daily`
//!
//! Fields are matched against the host's local time, like cron does.

use std::fmt;

use chrono::{DateTime, Local, TimeZone, Utc};
use croner::Cron;

use super::error::ScheduleError;
use crate::storage::schema::is_manual_schedule;

const CRON_FIELDS: usize = 5;

/// A parsed, non-manual schedule
#[derive(Clone)]
pub struct CronSchedule {
    expression: String,
    cron: Cron,
}

impl CronSchedule {
    pub fn parse(expression: &str) -> Result<Self, ScheduleError> {
        let expression = expression.trim();
        let invalid = |reason: String| ScheduleError::InvalidExpression {
            expression: expression.to_string(),
            reason,
        };

        if !expression.starts_with('@') {
            let fields = expression.split_whitespace().count();
            if fields != CRON_FIELDS {
                return Err(invalid(format!(
                    "expected {CRON_FIELDS} fields, found {fields}"
                )));
            }
        }

        let cron = Cron::new(expression)
            .parse()
            .map_err(|e| invalid(e.to_string()))?;

        Ok(Self {
            expression: expression.to_string(),
            cron,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// First occurrence strictly after `after`, fields matched in local time
    pub fn next_after(&self, after: &DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.next_in(&after.with_timezone(&Local))
            .map(|next| next.with_timezone(&Utc))
    }

    /// First occurrence strictly after `after`, fields matched in `after`'s zone
    pub fn next_in<Tz: TimeZone>(&self, after: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        self.cron.find_next_occurrence(after, false).ok()
    }
}

impl fmt::Debug for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CronSchedule").field(&self.expression).finish()
    }
}

/// Check an expression before it is persisted
///
/// The scheduler copes with bad stored values on its own, but callers
/// editing the configuration should reject them up front.
pub fn validate_schedule(expression: &str) -> Result<(), ScheduleError> {
    if is_manual_schedule(expression) {
        return Ok(());
    }
    CronSchedule::parse(expression).map(|_| ())
}
