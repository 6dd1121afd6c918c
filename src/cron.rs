//! Narrow two-field cron grammar: `hour weekday`. Each field supports `*`,
//! comma lists, and dash ranges. Deliberately not full cron — do not extend.

use crate::errors::{AutospottingError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleState {
    /// Act only inside the schedule.
    On,
    /// Act only outside the schedule.
    Off,
}

impl ScheduleState {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw {
            "on" => Ok(Self::On),
            "off" => Ok(Self::Off),
            other => Err(AutospottingError::config(format!(
                "invalid cron_schedule_state '{other}', expected 'on' or 'off'"
            ))),
        }
    }
}

/// A parsed `hour weekday` cron expression.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    hours: FieldMatcher,
    weekdays: FieldMatcher,
}

#[derive(Debug, Clone)]
enum FieldMatcher {
    Any,
    Values(Vec<u32>),
}

impl FieldMatcher {
    fn parse(field: &str, max: u32) -> Result<Self> {
        let field = field.trim();
        if field == "*" {
            return Ok(Self::Any);
        }
        let mut values = Vec::new();
        for part in field.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            if let Some((lo, hi)) = part.split_once('-') {
                let lo: u32 = lo.trim().parse().map_err(|_| invalid_field(field))?;
                let hi: u32 = hi.trim().parse().map_err(|_| invalid_field(field))?;
                if lo > hi || hi > max {
                    return Err(invalid_field(field));
                }
                values.extend(lo..=hi);
            } else {
                let v: u32 = part.parse().map_err(|_| invalid_field(field))?;
                if v > max {
                    return Err(invalid_field(field));
                }
                values.push(v);
            }
        }
        if values.is_empty() {
            return Err(invalid_field(field));
        }
        Ok(Self::Values(values))
    }

    fn matches(&self, value: u32) -> bool {
        match self {
            Self::Any => true,
            Self::Values(vs) => vs.contains(&value),
        }
    }
}

fn invalid_field(field: &str) -> AutospottingError {
    AutospottingError::config(format!("invalid cron field '{field}'"))
}

impl CronSchedule {
    /// Parse `"H D"`, hour `0-23`, weekday `0-6` (0 = Sunday).
    pub fn parse(raw: &str) -> Result<Self> {
        let mut fields = raw.split_whitespace();
        let hour = fields.next().ok_or_else(|| {
            AutospottingError::config(format!("cron_schedule '{raw}' is missing the hour field"))
        })?;
        let weekday = fields.next().ok_or_else(|| {
            AutospottingError::config(format!("cron_schedule '{raw}' is missing the weekday field"))
        })?;
        if fields.next().is_some() {
            return Err(AutospottingError::config(format!(
                "cron_schedule '{raw}' has more than two fields"
            )));
        }
        Ok(Self {
            hours: FieldMatcher::parse(hour, 23)?,
            weekdays: FieldMatcher::parse(weekday, 6)?,
        })
    }

    /// Whether `(hour, weekday)` falls inside the schedule window.
    pub fn contains(&self, hour: u32, weekday: u32) -> bool {
        self.hours.matches(hour) && self.weekdays.matches(weekday)
    }

    /// Whether the Planner should act, given the configured direction.
    pub fn gates_action(&self, hour: u32, weekday: u32, state: ScheduleState) -> bool {
        let inside = self.contains(hour, weekday);
        match state {
            ScheduleState::On => inside,
            ScheduleState::Off => !inside,
        }
    }
}
