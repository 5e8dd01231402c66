pub mod queue;

use std::collections::VecDeque;

use anyhow::Result;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use task_domain::ports::SyncAdapters;

pub use crate::queue::{Claim, QueueError, WorkQueue};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SyncBackend {
    GoogleTasks,
    Caldav,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncJob {
    pub force: bool,
    pub backends: Vec<SyncBackend>,
}

#[derive(Debug, Default)]
struct SyncState {
    enabled: Vec<SyncBackend>,
    pending_jobs: VecDeque<SyncJob>,
}

/// Tracks which sync back-ends are enabled and coalesces sync requests.
#[derive(Debug, Default)]
pub struct SyncService {
    state: Mutex<SyncState>,
}

impl SyncService {
    pub fn new() -> Self {
        Self::default()
    }

    #[instrument(skip(self))]
    pub fn set_enabled(&self, backend: SyncBackend, enabled: bool) {
        let mut state = self.state.lock();
        let present = state.enabled.contains(&backend);
        if enabled && !present {
            state.enabled.push(backend);
        } else if !enabled && present {
            state.enabled.retain(|existing| *existing != backend);
        }
    }

    pub fn is_enabled(&self, backend: SyncBackend) -> bool {
        self.state.lock().enabled.contains(&backend)
    }

    pub fn enabled_backends(&self) -> Vec<SyncBackend> {
        self.state.lock().enabled.clone()
    }

    /// Queues a sync pass unless one is already pending; a forced request
    /// upgrades the pending pass.
    #[instrument(skip(self))]
    pub fn request_sync(&self, force: bool) -> bool {
        let mut state = self.state.lock();
        if let Some(pending) = state.pending_jobs.back_mut() {
            pending.force |= force;
            debug!(force = pending.force, "sync already pending");
            return false;
        }
        if state.enabled.is_empty() {
            debug!("no sync backend enabled");
            return false;
        }
        let job = SyncJob {
            force,
            backends: state.enabled.clone(),
        };
        info!(?job, "queued sync");
        state.pending_jobs.push_back(job);
        true
    }

    pub fn dequeue_job(&self) -> Option<SyncJob> {
        self.state.lock().pending_jobs.pop_front()
    }

    pub fn pending(&self) -> usize {
        self.state.lock().pending_jobs.len()
    }
}

impl SyncAdapters for SyncService {
    fn is_google_task_sync_enabled(&self) -> bool {
        self.is_enabled(SyncBackend::GoogleTasks)
    }

    fn is_caldav_sync_enabled(&self) -> bool {
        self.is_enabled(SyncBackend::Caldav)
    }

    fn enqueue_sync(&self, force: bool) -> Result<()> {
        self.request_sync(force);
        Ok(())
    }
}
