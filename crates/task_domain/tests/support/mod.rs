#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{bail, Result};
use parking_lot::Mutex;
use task_domain::{
    after_save::AfterSaveCollaborators,
    model::{Task, TaskId},
    notifications::{NotificationRequest, NotificationSink},
    ports::{
        CalendarStore, ChangeBroadcaster, GeofenceRegistry, RefreshScheduler, ReminderScheduler,
        RepeatHandler, SyncAdapters, TimerControl,
    },
    MemoryStore,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Deliver(Vec<NotificationRequest>),
    Cancel(TaskId),
    GeofenceUpdate(TaskId),
    CalendarTitle(String, String),
    Repeat(TaskId),
    StopTimer(TaskId),
    Sync(bool),
    Alarm(TaskId),
    Refresh(TaskId),
    Broadcast,
}

impl Call {
    fn name(&self) -> &'static str {
        match self {
            Call::Deliver(_) => "deliver",
            Call::Cancel(_) => "cancel",
            Call::GeofenceUpdate(_) => "geofence",
            Call::CalendarTitle(..) => "calendar",
            Call::Repeat(_) => "repeat",
            Call::StopTimer(_) => "timer",
            Call::Sync(_) => "sync",
            Call::Alarm(_) => "alarm",
            Call::Refresh(_) => "refresh",
            Call::Broadcast => "broadcast",
        }
    }
}

/// Records every collaborator call; calls named in `failing` return errors.
#[derive(Default)]
pub struct Recorder {
    calls: Mutex<Vec<Call>>,
    failing: Mutex<HashSet<&'static str>>,
    google_tasks_enabled: Mutex<bool>,
    caldav_enabled: Mutex<bool>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail(&self, name: &'static str) {
        self.failing.lock().insert(name);
    }

    pub fn enable_sync(&self, google_tasks: bool, caldav: bool) {
        *self.google_tasks_enabled.lock() = google_tasks;
        *self.caldav_enabled.lock() = caldav;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.calls.lock().iter().filter(|call| call.name() == name).count()
    }

    fn record(&self, call: Call) -> Result<()> {
        let name = call.name();
        self.calls.lock().push(call);
        if self.failing.lock().contains(name) {
            bail!("{name} unavailable");
        }
        Ok(())
    }
}

impl NotificationSink for Recorder {
    fn deliver(&self, batch: &[NotificationRequest]) -> Result<()> {
        self.record(Call::Deliver(batch.to_vec()))
    }

    fn cancel(&self, task_id: TaskId) -> Result<()> {
        self.record(Call::Cancel(task_id))
    }
}

impl GeofenceRegistry for Recorder {
    fn update(&self, task_id: TaskId) -> Result<()> {
        self.record(Call::GeofenceUpdate(task_id))
    }
}

impl CalendarStore for Recorder {
    fn update_event_title(&self, event_uri: &str, title: &str) -> Result<()> {
        self.record(Call::CalendarTitle(event_uri.into(), title.into()))
    }
}

impl RepeatHandler for Recorder {
    fn handle_repeat(&self, task: &Task) -> Result<()> {
        self.record(Call::Repeat(task.id))
    }
}

impl TimerControl for Recorder {
    fn stop_timer(&self, task: &Task) -> Result<()> {
        self.record(Call::StopTimer(task.id))
    }
}

impl SyncAdapters for Recorder {
    fn is_google_task_sync_enabled(&self) -> bool {
        *self.google_tasks_enabled.lock()
    }

    fn is_caldav_sync_enabled(&self) -> bool {
        *self.caldav_enabled.lock()
    }

    fn enqueue_sync(&self, force: bool) -> Result<()> {
        self.record(Call::Sync(force))
    }
}

impl ReminderScheduler for Recorder {
    fn schedule_alarm(&self, task: &Task) -> Result<()> {
        self.record(Call::Alarm(task.id))
    }
}

impl RefreshScheduler for Recorder {
    fn schedule_refresh(&self, task: &Task) -> Result<()> {
        self.record(Call::Refresh(task.id))
    }
}

impl ChangeBroadcaster for Recorder {
    fn broadcast_refresh(&self) -> Result<()> {
        self.record(Call::Broadcast)
    }
}

pub fn collaborators(store: &Arc<MemoryStore>, recorder: &Arc<Recorder>) -> AfterSaveCollaborators {
    AfterSaveCollaborators {
        tasks: store.clone(),
        accounts: store.clone(),
        notifier: recorder.clone(),
        geofences: recorder.clone(),
        calendar: recorder.clone(),
        repeater: recorder.clone(),
        timers: recorder.clone(),
        sync: recorder.clone(),
        reminders: recorder.clone(),
        refresh: recorder.clone(),
        broadcaster: recorder.clone(),
    }
}
