use std::fs;
use std::io::{self, BufRead, BufReader};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{error, info, warn};

use task_domain::{
    after_save::AfterSaveCollaborators,
    geofence::GeofencingEvent,
    memory::StoreFixture,
    model::{Task, TaskId},
    ports::{Clock, SystemClock, TaskStore},
    repeat::RecurringTaskRepeater,
    AfterSaveInput, AfterSaveWork, GeofenceTransitionHandler, MemoryStore,
};
use task_sync::{SyncBackend, SyncService, WorkQueue};

use crate::{
    adapters::{Notifier, PlaceWatcher, Platform, TaskTimer},
    config::AppConfig,
};

/// Units of work carried by the queue.
#[derive(Debug, Clone, PartialEq)]
pub enum Job {
    AfterSave(Map<String, Value>),
    Geofence(GeofencingEvent),
}

/// One line of a worker script.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    Save { task: Task },
    Complete { id: TaskId, at: i64 },
    MarkDeleted { ids: Vec<TaskId>, at: i64 },
    Purge,
    Geofence { event: GeofencingEvent },
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DrainReport {
    pub after_save_runs: usize,
    pub after_save_failures: usize,
    pub step_failures: usize,
    pub geofence_events: usize,
    pub notifications: usize,
    pub sync_passes: usize,
}

impl DrainReport {
    fn absorb(&mut self, other: DrainReport) {
        self.after_save_runs += other.after_save_runs;
        self.after_save_failures += other.after_save_failures;
        self.step_failures += other.step_failures;
        self.geofence_events += other.geofence_events;
        self.notifications += other.notifications;
        self.sync_passes += other.sync_passes;
    }
}

pub struct Worker {
    store: Arc<MemoryStore>,
    queue: Arc<WorkQueue<Job>>,
    sync: Arc<SyncService>,
    notifier: Arc<Notifier>,
    watcher: Arc<PlaceWatcher>,
    platform: Arc<Platform>,
    after_save: AfterSaveWork,
    geofences: GeofenceTransitionHandler,
}

impl Worker {
    pub fn new(config: &AppConfig, fixture: StoreFixture, clock: Arc<dyn Clock>) -> Self {
        let queue: Arc<WorkQueue<Job>> = Arc::new(WorkQueue::new());
        let hook_queue = queue.clone();
        let store = Arc::new(MemoryStore::from_fixture(fixture).with_save_hook(Box::new(
            move |input: AfterSaveInput| {
                hook_queue.enqueue(Some(input.task_id), Job::AfterSave(input.to_bundle()));
            },
        )));

        let sync = Arc::new(SyncService::new());
        sync.set_enabled(SyncBackend::GoogleTasks, config.google_tasks_sync);
        sync.set_enabled(SyncBackend::Caldav, config.caldav_sync);

        let notifier = Arc::new(Notifier::default());
        let watcher = Arc::new(PlaceWatcher::new(store.clone(), clock.clone()));
        let platform = Arc::new(Platform::default());

        let after_save = AfterSaveWork::new(AfterSaveCollaborators {
            tasks: store.clone(),
            accounts: store.clone(),
            notifier: notifier.clone(),
            geofences: watcher.clone(),
            calendar: platform.clone(),
            repeater: Arc::new(RecurringTaskRepeater::new(store.clone(), clock.clone())),
            timers: Arc::new(TaskTimer::new(store.clone(), clock.clone())),
            sync: sync.clone(),
            reminders: platform.clone(),
            refresh: platform.clone(),
            broadcaster: platform.clone(),
        })
        .with_completed_title_format(config.completed_title_format.clone());
        let geofences = GeofenceTransitionHandler::new(store.clone(), notifier.clone(), clock);

        Self {
            store,
            queue,
            sync,
            notifier,
            watcher,
            platform,
            after_save,
            geofences,
        }
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn watcher(&self) -> &PlaceWatcher {
        &self.watcher
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    pub fn pending_jobs(&self) -> usize {
        self.queue.len()
    }

    pub fn apply(&self, command: Command) -> Result<()> {
        match command {
            Command::Save { task } => self.store.save(&task)?,
            Command::Complete { id, at } => {
                let mut task = self
                    .store
                    .fetch(id)?
                    .ok_or_else(|| anyhow!("cannot complete unknown task {id}"))?;
                task.completion_date = at;
                task.modified = at;
                self.store.save(&task)?;
            }
            Command::MarkDeleted { ids, at } => {
                let marked = self.store.mark_deleted(&ids, at)?;
                info!(?marked, "marked tasks deleted");
            }
            Command::Purge => {
                self.store.purge_deleted();
            }
            Command::Geofence { event } => self.queue.enqueue(None, Job::Geofence(event)),
        }
        Ok(())
    }

    /// Runs queued jobs until none remain, then hands pending sync passes off.
    pub fn drain(&self) -> DrainReport {
        let mut report = DrainReport::default();
        while let Some(claim) = self.queue.claim_next() {
            match &claim.job {
                Job::AfterSave(bundle) => {
                    report.after_save_runs += 1;
                    match self.after_save.run_bundle(bundle) {
                        Ok(outcome) => report.step_failures += outcome.failures.len(),
                        Err(err) => {
                            error!(key = ?claim.key, %err, "after-save work failed");
                            report.after_save_failures += 1;
                        }
                    }
                }
                Job::Geofence(event) => {
                    report.geofence_events += 1;
                    let outcome = self.geofences.handle(event);
                    report.notifications += outcome.delivered().len();
                }
            }
            if let Err(err) = self.queue.complete(claim.ticket) {
                warn!(%err, "queue lost track of a claim");
            }
        }
        while let Some(job) = self.sync.dequeue_job() {
            info!(force = job.force, backends = ?job.backends, "dispatching sync pass");
            report.sync_passes += 1;
        }
        report
    }
}

pub fn load_fixture(config: &AppConfig) -> Result<StoreFixture> {
    let Some(path) = &config.fixture else {
        return Ok(StoreFixture::default());
    };
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read fixture {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid fixture {}", path.display()))
}

/// Applies every command from `reader`, draining the queue after each one.
pub fn run_script(worker: &Worker, reader: impl BufRead) -> Result<DrainReport> {
    let mut report = DrainReport::default();
    for (index, line) in reader.lines().enumerate() {
        let line = line.context("failed to read script")?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let command: Command = serde_json::from_str(trimmed)
            .with_context(|| format!("invalid command on line {}", index + 1))?;
        if let Err(err) = worker.apply(command) {
            warn!(line = index + 1, %err, "command rejected");
            continue;
        }
        report.absorb(worker.drain());
    }
    Ok(report)
}

pub fn run(config: AppConfig) -> Result<()> {
    let fixture = load_fixture(&config)?;
    let worker = Worker::new(&config, fixture, Arc::new(SystemClock));
    let report = match &config.script {
        Some(path) => {
            let file = fs::File::open(path)
                .with_context(|| format!("failed to open script {}", path.display()))?;
            run_script(&worker, BufReader::new(file))?
        }
        None => run_script(&worker, io::stdin().lock())?,
    };
    info!(
        after_save_runs = report.after_save_runs,
        after_save_failures = report.after_save_failures,
        step_failures = report.step_failures,
        geofence_events = report.geofence_events,
        notifications = report.notifications,
        sync_passes = report.sync_passes,
        watched = ?worker.watcher().watched(),
        "worker finished"
    );
    Ok(())
}
