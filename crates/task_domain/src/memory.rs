use std::collections::{BTreeMap, HashMap};

use anyhow::{Context, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    after_save::AfterSaveInput,
    model::{GeofenceTrigger, Place, SyncAccount, Task, TaskId},
    ports::{AccountStore, LocationStore, TaskStore},
};

/// Receives the decision inputs captured by every save.
pub type SaveHook = Box<dyn Fn(AfterSaveInput) + Send + Sync>;

/// Seed data accepted by [`MemoryStore::from_fixture`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreFixture {
    pub tasks: Vec<Task>,
    pub places: Vec<Place>,
    pub geofences: Vec<GeofenceTrigger>,
    pub accounts: Vec<SyncAccount>,
    /// Task id to account uuid.
    pub task_accounts: HashMap<TaskId, String>,
}

#[derive(Default)]
struct Tables {
    tasks: BTreeMap<TaskId, Task>,
    places: HashMap<String, Place>,
    geofences: Vec<GeofenceTrigger>,
    accounts: HashMap<String, SyncAccount>,
    task_accounts: HashMap<TaskId, String>,
}

/// Process-local data layer backing the reconciliation ports.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    save_hook: Option<SaveHook>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fixture(fixture: StoreFixture) -> Self {
        let store = Self::new();
        store.load_fixture(fixture);
        store
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let fixture: StoreFixture =
            serde_json::from_str(raw).context("failed to parse store fixture")?;
        Ok(Self::from_fixture(fixture))
    }

    pub fn with_save_hook(mut self, hook: SaveHook) -> Self {
        self.save_hook = Some(hook);
        self
    }

    pub fn load_fixture(&self, fixture: StoreFixture) {
        let mut tables = self.tables.write();
        for task in fixture.tasks {
            tables.tasks.insert(task.id, task);
        }
        for place in fixture.places {
            tables.places.insert(place.uid.clone(), place);
        }
        tables.geofences.extend(fixture.geofences);
        for account in fixture.accounts {
            tables.accounts.insert(account.uuid.clone(), account);
        }
        tables.task_accounts.extend(fixture.task_accounts);
        info!(
            tasks = tables.tasks.len(),
            places = tables.places.len(),
            geofences = tables.geofences.len(),
            "loaded store fixture"
        );
    }

    /// Writes a row without running the save hook.
    pub fn insert_task(&self, mut task: Task) {
        task.transitory = Default::default();
        self.tables.write().tasks.insert(task.id, task);
    }

    pub fn insert_place(&self, place: Place) {
        self.tables.write().places.insert(place.uid.clone(), place);
    }

    pub fn insert_geofence(&self, trigger: GeofenceTrigger) {
        self.tables.write().geofences.push(trigger);
    }

    pub fn insert_account(&self, account: SyncAccount) {
        self.tables
            .write()
            .accounts
            .insert(account.uuid.clone(), account);
    }

    pub fn link_account(&self, task_id: TaskId, account_uuid: impl Into<String>) {
        self.tables
            .write()
            .task_accounts
            .insert(task_id, account_uuid.into());
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.tables.read().tasks.values().cloned().collect()
    }

    pub fn geofences_for_task(&self, task_id: TaskId) -> Vec<GeofenceTrigger> {
        self.tables
            .read()
            .geofences
            .iter()
            .filter(|trigger| trigger.task_id == task_id)
            .cloned()
            .collect()
    }

    /// Stamps `deletion_date` on each task and saves it through the hook.
    pub fn mark_deleted(&self, ids: &[TaskId], now: i64) -> Result<Vec<TaskId>> {
        let mut marked = Vec::new();
        for &id in ids {
            let Some(mut task) = self.fetch(id)? else {
                debug!(task_id = id, "skipping delete of unknown task");
                continue;
            };
            task.deletion_date = now;
            task.modified = now;
            self.save(&task)?;
            marked.push(id);
        }
        Ok(marked)
    }

    /// Drops every deleted task along with its geofences and account link.
    pub fn purge_deleted(&self) -> Vec<TaskId> {
        let mut tables = self.tables.write();
        let purged: Vec<TaskId> = tables
            .tasks
            .values()
            .filter(|task| task.is_deleted())
            .map(|task| task.id)
            .collect();
        for id in &purged {
            tables.tasks.remove(id);
            tables.task_accounts.remove(id);
        }
        tables
            .geofences
            .retain(|trigger| !purged.contains(&trigger.task_id));
        if !purged.is_empty() {
            info!(count = purged.len(), "purged deleted tasks");
        }
        purged
    }

    fn triggers(
        &self,
        place_uid: &str,
        as_of: i64,
        direction: impl Fn(&GeofenceTrigger) -> bool,
    ) -> Vec<GeofenceTrigger> {
        let tables = self.tables.read();
        tables
            .geofences
            .iter()
            .filter(|trigger| trigger.place_uid == place_uid && direction(trigger))
            .filter(|trigger| {
                tables
                    .tasks
                    .get(&trigger.task_id)
                    .is_some_and(|task| task.is_active_at(as_of))
            })
            .cloned()
            .collect()
    }
}

impl TaskStore for MemoryStore {
    fn fetch(&self, id: TaskId) -> Result<Option<Task>> {
        Ok(self.tables.read().tasks.get(&id).cloned())
    }

    fn save(&self, task: &Task) -> Result<()> {
        let input = {
            let mut tables = self.tables.write();
            let mut stored = task.clone();
            stored.transitory = Default::default();
            let original = tables.tasks.insert(task.id, stored);
            AfterSaveInput::capture(task, original.as_ref())
        };
        if let Some(hook) = &self.save_hook {
            hook(input);
        }
        Ok(())
    }
}

impl LocationStore for MemoryStore {
    fn place(&self, uid: &str) -> Result<Option<Place>> {
        Ok(self.tables.read().places.get(uid).cloned())
    }

    fn arrival_triggers(&self, place_uid: &str, as_of: i64) -> Result<Vec<GeofenceTrigger>> {
        Ok(self.triggers(place_uid, as_of, |trigger| trigger.arrival))
    }

    fn departure_triggers(&self, place_uid: &str, as_of: i64) -> Result<Vec<GeofenceTrigger>> {
        Ok(self.triggers(place_uid, as_of, |trigger| trigger.departure))
    }
}

impl AccountStore for MemoryStore {
    fn account_for_task(&self, task_id: TaskId) -> Result<Option<SyncAccount>> {
        let tables = self.tables.read();
        Ok(tables
            .task_accounts
            .get(&task_id)
            .and_then(|uuid| tables.accounts.get(uuid))
            .cloned())
    }
}
