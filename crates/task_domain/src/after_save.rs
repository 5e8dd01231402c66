use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, error, instrument, warn};

use crate::{
    error::AfterSaveError,
    model::{Task, TaskId},
    notifications::NotificationSink,
    ports::{
        AccountStore, CalendarStore, ChangeBroadcaster, GeofenceRegistry, RefreshScheduler,
        ReminderScheduler, RepeatHandler, SyncAdapters, TaskStore, TimerControl,
    },
};

pub const DEFAULT_COMPLETED_TITLE_FORMAT: &str = "{title} (\u{2713})";

/// Decision inputs recorded at save time, in their wire form.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AfterSaveInput {
    #[serde(rename = "extra_id")]
    pub task_id: TaskId,
    #[serde(rename = "extra_was_completed", default)]
    pub original_completed: i64,
    #[serde(rename = "extra_was_deleted", default)]
    pub original_deleted: i64,
    #[serde(rename = "extra_push_gtasks", default)]
    pub push_gtasks: bool,
    #[serde(rename = "extra_push_caldav", default)]
    pub push_caldav: bool,
    #[serde(rename = "extra_suppress_refresh", default)]
    pub suppress_refresh: bool,
}

impl AfterSaveInput {
    pub fn capture(current: &Task, original: Option<&Task>) -> Self {
        let flags = current.transitory;
        let suppress = flags.suppress_sync;
        Self {
            task_id: current.id,
            original_completed: original.map_or(0, |task| task.completion_date),
            original_deleted: original.map_or(0, |task| task.deletion_date),
            push_gtasks: !suppress && !current.google_task_up_to_date(original),
            push_caldav: !suppress
                && (!current.caldav_up_to_date(original) || flags.force_caldav_sync),
            suppress_refresh: flags.suppress_refresh,
        }
    }

    pub fn to_bundle(&self) -> Map<String, Value> {
        let mut bundle = Map::new();
        bundle.insert("extra_id".into(), Value::from(self.task_id));
        bundle.insert("extra_was_completed".into(), Value::from(self.original_completed));
        bundle.insert("extra_was_deleted".into(), Value::from(self.original_deleted));
        bundle.insert("extra_push_gtasks".into(), Value::from(self.push_gtasks));
        bundle.insert("extra_push_caldav".into(), Value::from(self.push_caldav));
        bundle.insert("extra_suppress_refresh".into(), Value::from(self.suppress_refresh));
        bundle
    }

    pub fn from_bundle(bundle: &Map<String, Value>) -> Result<Self, AfterSaveError> {
        Ok(serde_json::from_value(Value::Object(bundle.clone()))?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterSaveStep {
    ScheduleAlarm,
    CancelNotification,
    UpdateGeofences,
    UpdateCalendar,
    LookupAccount,
    Repeat,
    StopTimer,
    Sync,
    ScheduleRefresh,
    Broadcast,
}

impl fmt::Display for AfterSaveStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::ScheduleAlarm => "schedule alarm",
            Self::CancelNotification => "cancel notification",
            Self::UpdateGeofences => "update geofences",
            Self::UpdateCalendar => "update calendar",
            Self::LookupAccount => "lookup account",
            Self::Repeat => "repeat",
            Self::StopTimer => "stop timer",
            Self::Sync => "sync",
            Self::ScheduleRefresh => "schedule refresh",
            Self::Broadcast => "broadcast",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AfterSaveOutcome {
    pub task_id: TaskId,
    pub completion_modified: bool,
    pub deletion_modified: bool,
    pub just_completed: bool,
    pub just_deleted: bool,
    pub sync_enqueued: bool,
    pub broadcast: bool,
    pub failures: Vec<(AfterSaveStep, String)>,
}

impl AfterSaveOutcome {
    pub fn failed(&self, step: AfterSaveStep) -> bool {
        self.failures.iter().any(|(failed, _)| *failed == step)
    }
}

/// Everything [`AfterSaveWork`] calls out to.
#[derive(Clone)]
pub struct AfterSaveCollaborators {
    pub tasks: Arc<dyn TaskStore>,
    pub accounts: Arc<dyn AccountStore>,
    pub notifier: Arc<dyn NotificationSink>,
    pub geofences: Arc<dyn GeofenceRegistry>,
    pub calendar: Arc<dyn CalendarStore>,
    pub repeater: Arc<dyn RepeatHandler>,
    pub timers: Arc<dyn TimerControl>,
    pub sync: Arc<dyn SyncAdapters>,
    pub reminders: Arc<dyn ReminderScheduler>,
    pub refresh: Arc<dyn RefreshScheduler>,
    pub broadcaster: Arc<dyn ChangeBroadcaster>,
}

/// Replays an [`AfterSaveInput`] against the persisted task. Only the initial
/// lookup may fail the run; every later step is attempted regardless.
pub struct AfterSaveWork {
    deps: AfterSaveCollaborators,
    completed_title_format: String,
}

impl AfterSaveWork {
    pub fn new(deps: AfterSaveCollaborators) -> Self {
        Self {
            deps,
            completed_title_format: DEFAULT_COMPLETED_TITLE_FORMAT.to_string(),
        }
    }

    /// `format` must contain `{title}`; otherwise the title is appended.
    pub fn with_completed_title_format(mut self, format: impl Into<String>) -> Self {
        self.completed_title_format = format.into();
        self
    }

    pub fn completed_title(&self, title: &str) -> String {
        if self.completed_title_format.contains("{title}") {
            self.completed_title_format.replace("{title}", title)
        } else {
            format!("{} {}", title, self.completed_title_format)
        }
    }

    pub fn run_bundle(
        &self,
        bundle: &Map<String, Value>,
    ) -> Result<AfterSaveOutcome, AfterSaveError> {
        let input = AfterSaveInput::from_bundle(bundle)?;
        self.run(&input)
    }

    #[instrument(skip(self), fields(task_id = input.task_id))]
    pub fn run(&self, input: &AfterSaveInput) -> Result<AfterSaveOutcome, AfterSaveError> {
        let task_id = input.task_id;
        let Some(task) = self
            .deps
            .tasks
            .fetch(task_id)
            .map_err(AfterSaveError::Store)?
        else {
            error!(task_id, "missing saved task");
            return Err(AfterSaveError::TaskNotFound(task_id));
        };

        let mut outcome = AfterSaveOutcome {
            task_id,
            ..AfterSaveOutcome::default()
        };

        attempt(&mut outcome, AfterSaveStep::ScheduleAlarm, || {
            self.deps.reminders.schedule_alarm(&task)
        });

        outcome.completion_modified = task.completion_date != input.original_completed;
        outcome.deletion_modified = task.deletion_date != input.original_deleted;
        outcome.just_completed = outcome.completion_modified && task.is_completed();
        outcome.just_deleted = outcome.deletion_modified && task.is_deleted();
        debug!(
            completion_modified = outcome.completion_modified,
            deletion_modified = outcome.deletion_modified,
            just_completed = outcome.just_completed,
            just_deleted = outcome.just_deleted,
            "reconciling saved task"
        );

        if outcome.just_completed || outcome.just_deleted {
            attempt(&mut outcome, AfterSaveStep::CancelNotification, || {
                self.deps.notifier.cancel(task_id)
            });
        }
        if outcome.completion_modified || outcome.deletion_modified {
            attempt(&mut outcome, AfterSaveStep::UpdateGeofences, || {
                self.deps.geofences.update(task_id)
            });
        }

        if outcome.just_completed {
            self.update_calendar_title(&task, &mut outcome);
            if self.repeats_allowed(task_id, &mut outcome) {
                attempt(&mut outcome, AfterSaveStep::Repeat, || {
                    self.deps.repeater.handle_repeat(&task)
                });
            }
            if task.timer_running() {
                attempt(&mut outcome, AfterSaveStep::StopTimer, || {
                    self.deps.timers.stop_timer(&task)
                });
            }
        }

        let push_gtasks = input.push_gtasks && self.deps.sync.is_google_task_sync_enabled();
        let push_caldav = input.push_caldav && self.deps.sync.is_caldav_sync_enabled();
        if push_gtasks || push_caldav {
            outcome.sync_enqueued = attempt(&mut outcome, AfterSaveStep::Sync, || {
                self.deps.sync.enqueue_sync(false)
            });
        }

        attempt(&mut outcome, AfterSaveStep::ScheduleRefresh, || {
            self.deps.refresh.schedule_refresh(&task)
        });
        if !input.suppress_refresh {
            outcome.broadcast = attempt(&mut outcome, AfterSaveStep::Broadcast, || {
                self.deps.broadcaster.broadcast_refresh()
            });
        }

        Ok(outcome)
    }

    fn update_calendar_title(&self, task: &Task, outcome: &mut AfterSaveOutcome) {
        let Some(uri) = task.calendar_uri.as_deref().filter(|uri| !uri.is_empty()) else {
            return;
        };
        let title = self.completed_title(&task.title);
        attempt(outcome, AfterSaveStep::UpdateCalendar, || {
            self.deps.calendar.update_event_title(uri, &title)
        });
    }

    fn repeats_allowed(&self, task_id: TaskId, outcome: &mut AfterSaveOutcome) -> bool {
        match self.deps.accounts.account_for_task(task_id) {
            Ok(account) => account.map_or(true, |account| !account.suppress_repeating_tasks),
            Err(err) => {
                warn!(task_id, %err, "skipping repeat, account lookup failed");
                outcome
                    .failures
                    .push((AfterSaveStep::LookupAccount, err.to_string()));
                false
            }
        }
    }
}

/// Runs one best-effort step, recording instead of propagating its failure.
fn attempt(
    outcome: &mut AfterSaveOutcome,
    step: AfterSaveStep,
    action: impl FnOnce() -> Result<()>,
) -> bool {
    match action() {
        Ok(()) => true,
        Err(err) => {
            error!(task_id = outcome.task_id, %step, %err, "after-save step failed");
            outcome.failures.push((step, format!("{err:#}")));
            false
        }
    }
}
