use serde::{Deserialize, Serialize};

pub type TaskId = i64;

/// Flags set on an in-memory task by the code that saves it. They are never
/// persisted and only survive until the save hook has captured them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransitoryFlags {
    pub suppress_sync: bool,
    pub force_caldav_sync: bool,
    pub suppress_refresh: bool,
}

/// A to-do row. Timestamps are epoch milliseconds, `0` means unset.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub notes: Option<String>,
    pub priority: i32,
    pub due_date: i64,
    pub hide_until: i64,
    pub completion_date: i64,
    pub deletion_date: i64,
    pub timer_start: i64,
    pub elapsed_seconds: i64,
    pub calendar_uri: Option<String>,
    pub recurrence: Option<String>,
    pub parent: TaskId,
    pub order: Option<i64>,
    pub modified: i64,
    #[serde(skip)]
    pub transitory: TransitoryFlags,
}

impl Task {
    pub fn new(id: TaskId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn is_completed(&self) -> bool {
        self.completion_date > 0
    }

    pub fn is_deleted(&self) -> bool {
        self.deletion_date > 0
    }

    pub fn has_due_date(&self) -> bool {
        self.due_date > 0
    }

    pub fn timer_running(&self) -> bool {
        self.timer_start > 0
    }

    /// Whether the fields mirrored to Google Tasks are unchanged since `original`.
    pub fn google_task_up_to_date(&self, original: Option<&Task>) -> bool {
        let Some(original) = original else {
            return false;
        };
        self.title == original.title
            && self.due_date == original.due_date
            && self.completion_date == original.completion_date
            && self.deletion_date == original.deletion_date
            && self.parent == original.parent
            && self.notes == original.notes
            && self.order == original.order
    }

    /// Whether the fields mirrored to CalDAV are unchanged since `original`.
    pub fn caldav_up_to_date(&self, original: Option<&Task>) -> bool {
        let Some(original) = original else {
            return false;
        };
        self.title == original.title
            && self.priority == original.priority
            && self.hide_until == original.hide_until
            && self.due_date == original.due_date
            && self.completion_date == original.completion_date
            && self.deletion_date == original.deletion_date
            && self.notes == original.notes
            && self.recurrence == original.recurrence
            && self.parent == original.parent
            && self.order == original.order
    }

    /// Whether a geofence trigger on this task may fire at `as_of`.
    pub fn is_active_at(&self, as_of: i64) -> bool {
        !self.is_completed() && !self.is_deleted() && self.hide_until <= as_of
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Place {
    pub id: i64,
    /// Request identifier registered with the geofencing subsystem.
    pub uid: String,
    pub name: String,
    pub address: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub radius: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GeofenceTrigger {
    pub id: i64,
    pub task_id: TaskId,
    pub place_uid: String,
    pub arrival: bool,
    pub departure: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SyncAccount {
    pub uuid: String,
    pub name: String,
    pub suppress_repeating_tasks: bool,
}
