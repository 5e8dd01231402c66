use thiserror::Error;

use crate::model::TaskId;

#[derive(Debug, Error)]
pub enum AfterSaveError {
    #[error("saved task {0} no longer exists")]
    TaskNotFound(TaskId),
    #[error("malformed after-save input: {0}")]
    InvalidInput(#[from] serde_json::Error),
    #[error("failed to load saved task: {0}")]
    Store(#[source] anyhow::Error),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecurrenceError {
    #[error("unrecognised recurrence rule `{0}`")]
    InvalidRule(String),
    #[error("recurrence `{rule}` overflows from {base}")]
    OutOfRange { rule: String, base: i64 },
}
