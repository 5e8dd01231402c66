use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::model::TaskId;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Due,
    Overdue,
    Random,
    Snooze,
    Alarm,
    GeofenceEnter,
    GeofenceExit,
}

impl NotificationKind {
    pub fn for_transition(arrival: bool) -> Self {
        if arrival {
            Self::GeofenceEnter
        } else {
            Self::GeofenceExit
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationRequest {
    pub task_id: TaskId,
    pub kind: NotificationKind,
    pub timestamp: i64,
    pub location: Option<i64>,
}

/// Platform-specific notification adapters will implement this trait.
pub trait NotificationSink: Send + Sync {
    /// Hands a whole batch over so the platform can coalesce it.
    fn deliver(&self, batch: &[NotificationRequest]) -> Result<()>;
    /// Dismisses whatever is showing for `task_id`. A no-op when nothing is.
    fn cancel(&self, task_id: TaskId) -> Result<()>;
}
