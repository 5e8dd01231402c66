use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    error::RecurrenceError,
    model::Task,
    ports::{Clock, RepeatHandler, TaskStore},
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RecurrenceUnit {
    Day,
    Week,
    Month,
    Year,
}

/// Parsed form of `+3d` (from the due date) or `.+1w` (from completion).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Recurrence {
    pub amount: u32,
    pub unit: RecurrenceUnit,
    pub from_completion: bool,
}

impl Recurrence {
    pub fn parse(rule: &str) -> Result<Self, RecurrenceError> {
        let invalid = || RecurrenceError::InvalidRule(rule.to_string());
        let trimmed = rule.trim();
        let (from_completion, rest) = match trimmed.strip_prefix(".+") {
            Some(rest) => (true, rest),
            None => (false, trimmed.strip_prefix('+').ok_or_else(invalid)?),
        };
        let unit = match rest.chars().last().ok_or_else(invalid)? {
            'd' | 'D' => RecurrenceUnit::Day,
            'w' | 'W' => RecurrenceUnit::Week,
            'm' | 'M' => RecurrenceUnit::Month,
            'y' | 'Y' => RecurrenceUnit::Year,
            _ => return Err(invalid()),
        };
        let digits = &rest[..rest.len() - 1];
        if digits.is_empty() || !digits.bytes().all(|byte| byte.is_ascii_digit()) {
            return Err(invalid());
        }
        let amount: u32 = digits.parse().map_err(|_| invalid())?;
        if amount == 0 {
            return Err(invalid());
        }
        Ok(Self {
            amount,
            unit,
            from_completion,
        })
    }

    /// The next occurrence one interval after `base` (epoch millis).
    pub fn advance(&self, base: i64) -> Option<i64> {
        let date = DateTime::<Utc>::from_timestamp_millis(base)?;
        let next = match self.unit {
            RecurrenceUnit::Day => date.checked_add_signed(Duration::days(self.amount.into()))?,
            RecurrenceUnit::Week => date.checked_add_signed(Duration::weeks(self.amount.into()))?,
            RecurrenceUnit::Month => date.checked_add_months(Months::new(self.amount))?,
            RecurrenceUnit::Year => {
                date.checked_add_months(Months::new(self.amount.checked_mul(12)?))?
            }
        };
        Some(next.timestamp_millis())
    }
}

/// Reopens a completed repeating task with its due date moved forward.
pub struct RecurringTaskRepeater {
    tasks: Arc<dyn TaskStore>,
    clock: Arc<dyn Clock>,
}

impl RecurringTaskRepeater {
    pub fn new(tasks: Arc<dyn TaskStore>, clock: Arc<dyn Clock>) -> Self {
        Self { tasks, clock }
    }

    /// The successor state of `task`, or `None` when it does not repeat.
    pub fn next_instance(&self, task: &Task) -> Result<Option<Task>, RecurrenceError> {
        let Some(rule) = task.recurrence.as_deref().filter(|rule| !rule.trim().is_empty()) else {
            return Ok(None);
        };
        let recurrence = Recurrence::parse(rule)?;
        let base = if recurrence.from_completion || !task.has_due_date() {
            task.completion_date
        } else {
            task.due_date
        };
        let due_date = recurrence
            .advance(base)
            .ok_or_else(|| RecurrenceError::OutOfRange {
                rule: rule.to_string(),
                base,
            })?;

        let mut next = task.clone();
        next.due_date = due_date;
        next.completion_date = 0;
        next.modified = self.clock.now_millis();
        next.transitory = Default::default();
        Ok(Some(next))
    }
}

impl RepeatHandler for RecurringTaskRepeater {
    fn handle_repeat(&self, task: &Task) -> Result<()> {
        let Some(next) = self.next_instance(task)? else {
            debug!(task_id = task.id, "task does not repeat");
            return Ok(());
        };
        info!(task_id = task.id, due_date = next.due_date, "rescheduling repeating task");
        self.tasks.save(&next)
    }
}
