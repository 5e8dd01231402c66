use anyhow::Result;
use chrono::Utc;

use crate::model::{GeofenceTrigger, Place, SyncAccount, Task, TaskId};

pub trait TaskStore: Send + Sync {
    fn fetch(&self, id: TaskId) -> Result<Option<Task>>;
    fn save(&self, task: &Task) -> Result<()>;
}

pub trait LocationStore: Send + Sync {
    fn place(&self, uid: &str) -> Result<Option<Place>>;
    /// Arrival triggers on `place_uid` whose task is active as of `as_of`.
    fn arrival_triggers(&self, place_uid: &str, as_of: i64) -> Result<Vec<GeofenceTrigger>>;
    /// Departure triggers on `place_uid` whose task is active as of `as_of`.
    fn departure_triggers(&self, place_uid: &str, as_of: i64) -> Result<Vec<GeofenceTrigger>>;
}

pub trait AccountStore: Send + Sync {
    fn account_for_task(&self, task_id: TaskId) -> Result<Option<SyncAccount>>;
}

pub trait CalendarStore: Send + Sync {
    fn update_event_title(&self, event_uri: &str, title: &str) -> Result<()>;
}

pub trait RepeatHandler: Send + Sync {
    /// May save a successor state for `task`.
    fn handle_repeat(&self, task: &Task) -> Result<()>;
}

pub trait TimerControl: Send + Sync {
    fn stop_timer(&self, task: &Task) -> Result<()>;
}

pub trait SyncAdapters: Send + Sync {
    fn is_google_task_sync_enabled(&self) -> bool;
    fn is_caldav_sync_enabled(&self) -> bool;
    fn enqueue_sync(&self, force: bool) -> Result<()>;
}

pub trait ReminderScheduler: Send + Sync {
    fn schedule_alarm(&self, task: &Task) -> Result<()>;
}

/// Debounced "refresh due" checks; the implementation owns the debouncing.
pub trait RefreshScheduler: Send + Sync {
    fn schedule_refresh(&self, task: &Task) -> Result<()>;
}

pub trait ChangeBroadcaster: Send + Sync {
    fn broadcast_refresh(&self) -> Result<()>;
}

pub trait GeofenceRegistry: Send + Sync {
    /// Re-evaluates which places must be watched on behalf of `task_id`.
    fn update(&self, task_id: TaskId) -> Result<()>;
}

pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Clock pinned to one instant, for replays and tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub i64);

impl Clock for FixedClock {
    fn now_millis(&self) -> i64 {
        self.0
    }
}
