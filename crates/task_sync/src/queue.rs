use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, warn};

use task_domain::model::TaskId;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("no claim in flight for ticket {0}")]
    UnknownTicket(u64),
}

#[derive(Debug)]
struct Entry<J> {
    key: Option<TaskId>,
    job: J,
}

#[derive(Debug)]
struct QueueState<J> {
    pending: VecDeque<Entry<J>>,
    in_flight: HashMap<u64, Option<TaskId>>,
    next_ticket: u64,
}

impl<J> Default for QueueState<J> {
    fn default() -> Self {
        Self {
            pending: VecDeque::new(),
            in_flight: HashMap::new(),
            next_ticket: 0,
        }
    }
}

/// A job handed out by [`WorkQueue::claim_next`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim<J> {
    pub ticket: u64,
    pub key: Option<TaskId>,
    pub job: J,
}

/// Jobs sharing a key are handed out one at a time in enqueue order; unkeyed
/// jobs are independent of each other.
#[derive(Debug)]
pub struct WorkQueue<J> {
    state: Mutex<QueueState<J>>,
}

impl<J> Default for WorkQueue<J> {
    fn default() -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
        }
    }
}

impl<J> WorkQueue<J> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, key: Option<TaskId>, job: J) {
        let mut state = self.state.lock();
        state.pending.push_back(Entry { key, job });
        debug!(?key, pending = state.pending.len(), "enqueued work");
    }

    /// The oldest job whose key has nothing in flight.
    pub fn claim_next(&self) -> Option<Claim<J>> {
        let mut state = self.state.lock();
        let index = state.pending.iter().position(|entry| match entry.key {
            Some(key) => !state.in_flight.values().any(|busy| *busy == Some(key)),
            None => true,
        })?;
        let entry = state.pending.remove(index)?;
        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.in_flight.insert(ticket, entry.key);
        Some(Claim {
            ticket,
            key: entry.key,
            job: entry.job,
        })
    }

    pub fn complete(&self, ticket: u64) -> Result<(), QueueError> {
        self.state
            .lock()
            .in_flight
            .remove(&ticket)
            .map(|_| ())
            .ok_or(QueueError::UnknownTicket(ticket))
    }

    /// Hands the claimed job back so it runs again before anything queued
    /// behind it.
    pub fn retry(&self, claim: Claim<J>) -> Result<(), QueueError> {
        let mut state = self.state.lock();
        if state.in_flight.remove(&claim.ticket).is_none() {
            warn!(ticket = claim.ticket, "retry for unknown claim");
            return Err(QueueError::UnknownTicket(claim.ticket));
        }
        state.pending.push_front(Entry {
            key: claim.key,
            job: claim.job,
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn in_flight(&self) -> usize {
        self.state.lock().in_flight.len()
    }
}
