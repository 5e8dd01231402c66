pub mod after_save;
pub mod error;
pub mod geofence;
pub mod memory;
pub mod model;
pub mod notifications;
pub mod ports;
pub mod repeat;

pub use crate::after_save::{
    AfterSaveCollaborators, AfterSaveInput, AfterSaveOutcome, AfterSaveWork,
};
pub use crate::geofence::{GeofenceOutcome, GeofenceTransitionHandler, GeofencingEvent};
pub use crate::memory::MemoryStore;
pub use crate::model::{GeofenceTrigger, Place, SyncAccount, Task, TaskId};
