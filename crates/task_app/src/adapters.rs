use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tracing::{debug, info};

use task_domain::{
    model::{Task, TaskId},
    notifications::{NotificationRequest, NotificationSink},
    ports::{
        CalendarStore, ChangeBroadcaster, Clock, GeofenceRegistry, RefreshScheduler,
        ReminderScheduler, TaskStore, TimerControl,
    },
    MemoryStore,
};

/// Keeps the notifications currently on screen, one per task.
#[derive(Debug, Default)]
pub struct Notifier {
    shown: Mutex<HashMap<TaskId, NotificationRequest>>,
    delivered: Mutex<usize>,
}

impl Notifier {
    pub fn shown(&self) -> Vec<NotificationRequest> {
        let mut shown: Vec<_> = self.shown.lock().values().cloned().collect();
        shown.sort_by_key(|request| request.task_id);
        shown
    }

    pub fn delivered(&self) -> usize {
        *self.delivered.lock()
    }
}

impl NotificationSink for Notifier {
    fn deliver(&self, batch: &[NotificationRequest]) -> Result<()> {
        let mut shown = self.shown.lock();
        for request in batch {
            info!(task_id = request.task_id, kind = ?request.kind, "showing notification");
            shown.insert(request.task_id, request.clone());
        }
        *self.delivered.lock() += batch.len();
        Ok(())
    }

    fn cancel(&self, task_id: TaskId) -> Result<()> {
        if self.shown.lock().remove(&task_id).is_some() {
            info!(task_id, "cancelled notification");
        }
        Ok(())
    }
}

/// Registers a place with the geofencing service while any active task
/// still triggers on it.
pub struct PlaceWatcher {
    store: Arc<MemoryStore>,
    clock: Arc<dyn Clock>,
    watched: Mutex<BTreeSet<String>>,
}

impl PlaceWatcher {
    pub fn new(store: Arc<MemoryStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            watched: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn watched(&self) -> Vec<String> {
        self.watched.lock().iter().cloned().collect()
    }

    fn place_needed(&self, place_uid: &str, now: i64) -> bool {
        self.store
            .tasks()
            .iter()
            .filter(|task| task.is_active_at(now))
            .any(|task| {
                self.store
                    .geofences_for_task(task.id)
                    .iter()
                    .any(|trigger| trigger.place_uid == place_uid)
            })
    }
}

impl GeofenceRegistry for PlaceWatcher {
    fn update(&self, task_id: TaskId) -> Result<()> {
        let now = self.clock.now_millis();
        for trigger in self.store.geofences_for_task(task_id) {
            let needed = self.place_needed(&trigger.place_uid, now);
            let mut watched = self.watched.lock();
            if needed && watched.insert(trigger.place_uid.clone()) {
                info!(place = %trigger.place_uid, "watching place");
            } else if !needed && watched.remove(&trigger.place_uid) {
                info!(place = %trigger.place_uid, "stopped watching place");
            }
        }
        Ok(())
    }
}

/// Folds a running timer into the task's elapsed time.
pub struct TaskTimer {
    store: Arc<MemoryStore>,
    clock: Arc<dyn Clock>,
}

impl TaskTimer {
    pub fn new(store: Arc<MemoryStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }
}

impl TimerControl for TaskTimer {
    fn stop_timer(&self, task: &Task) -> Result<()> {
        let mut current = self
            .store
            .fetch(task.id)?
            .with_context(|| format!("task {} vanished before its timer stopped", task.id))?;
        if !current.timer_running() {
            return Ok(());
        }
        let now = self.clock.now_millis();
        current.elapsed_seconds += (now - current.timer_start).max(0) / 1000;
        current.timer_start = 0;
        current.modified = now;
        info!(task_id = task.id, elapsed = current.elapsed_seconds, "stopped timer");
        self.store.save(&current)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PlatformActivity {
    pub calendar_titles: HashMap<String, String>,
    pub alarms: Vec<TaskId>,
    pub refreshes: Vec<TaskId>,
    pub broadcasts: usize,
}

/// Calendar, reminder, refresh and broadcast side of the platform.
#[derive(Debug, Default)]
pub struct Platform {
    activity: Mutex<PlatformActivity>,
}

impl Platform {
    pub fn activity(&self) -> PlatformActivity {
        self.activity.lock().clone()
    }
}

impl CalendarStore for Platform {
    fn update_event_title(&self, event_uri: &str, title: &str) -> Result<()> {
        info!(%event_uri, %title, "updating calendar event");
        self.activity
            .lock()
            .calendar_titles
            .insert(event_uri.to_string(), title.to_string());
        Ok(())
    }
}

impl ReminderScheduler for Platform {
    fn schedule_alarm(&self, task: &Task) -> Result<()> {
        debug!(task_id = task.id, due_date = task.due_date, "scheduling reminder");
        self.activity.lock().alarms.push(task.id);
        Ok(())
    }
}

impl RefreshScheduler for Platform {
    fn schedule_refresh(&self, task: &Task) -> Result<()> {
        let mut activity = self.activity.lock();
        if !activity.refreshes.contains(&task.id) {
            debug!(task_id = task.id, "scheduling refresh");
            activity.refreshes.push(task.id);
        }
        Ok(())
    }
}

impl ChangeBroadcaster for Platform {
    fn broadcast_refresh(&self) -> Result<()> {
        debug!("broadcasting refresh");
        self.activity.lock().broadcasts += 1;
        Ok(())
    }
}
