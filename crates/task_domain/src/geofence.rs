use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use crate::{
    model::{GeofenceTrigger, Place},
    notifications::{NotificationKind, NotificationRequest, NotificationSink},
    ports::{Clock, LocationStore},
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GeofenceTransition {
    Enter,
    Exit,
    Dwell,
    #[serde(other)]
    Unknown,
}

impl GeofenceTransition {
    fn arrival(self) -> Option<bool> {
        match self {
            Self::Enter => Some(true),
            Self::Exit => Some(false),
            Self::Dwell | Self::Unknown => None,
        }
    }
}

/// A transition as delivered by the platform geofencing service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GeofencingEvent {
    #[serde(default)]
    pub error_code: Option<i32>,
    pub transition: GeofenceTransition,
    #[serde(default)]
    pub triggering_request_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeofenceOutcome {
    Rejected { error_code: i32 },
    Ignored { transition: GeofenceTransition },
    Delivered {
        requests: Vec<NotificationRequest>,
        failed_request_ids: Vec<String>,
        delivery_error: Option<String>,
    },
}

impl GeofenceOutcome {
    /// Requests the notification sink accepted.
    pub fn delivered(&self) -> &[NotificationRequest] {
        match self {
            Self::Delivered {
                requests,
                delivery_error: None,
                ..
            } => requests.as_slice(),
            _ => &[],
        }
    }
}

pub struct GeofenceTransitionHandler {
    locations: Arc<dyn LocationStore>,
    notifier: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
}

impl GeofenceTransitionHandler {
    pub fn new(
        locations: Arc<dyn LocationStore>,
        notifier: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            locations,
            notifier,
            clock,
        }
    }

    #[instrument(skip(self), fields(transition = ?event.transition))]
    pub fn handle(&self, event: &GeofencingEvent) -> GeofenceOutcome {
        if let Some(error_code) = event.error_code {
            warn!(error_code, "geofence error");
            return GeofenceOutcome::Rejected { error_code };
        }

        info!(
            ids = ?event.triggering_request_ids,
            "received geofence transition"
        );
        let Some(arrival) = event.transition.arrival() else {
            warn!(transition = ?event.transition, "invalid geofence transition type");
            return GeofenceOutcome::Ignored {
                transition: event.transition,
            };
        };

        let now = self.clock.now_millis();
        let mut requests = Vec::new();
        let mut failed_request_ids = Vec::new();
        for request_id in &event.triggering_request_ids {
            match self.resolve(request_id, arrival, now) {
                Ok(batch) => requests.extend(batch),
                Err(err) => {
                    error!(%request_id, %err, "error triggering geofence");
                    failed_request_ids.push(request_id.clone());
                }
            }
        }

        let mut delivery_error = None;
        if !requests.is_empty() {
            if let Err(err) = self.notifier.deliver(&requests) {
                error!(%err, count = requests.len(), "failed to deliver geofence notifications");
                delivery_error = Some(format!("{err:#}"));
            }
        }

        GeofenceOutcome::Delivered {
            requests,
            failed_request_ids,
            delivery_error,
        }
    }

    fn resolve(
        &self,
        request_id: &str,
        arrival: bool,
        now: i64,
    ) -> Result<Vec<NotificationRequest>> {
        let Some(place) = self.locations.place(request_id)? else {
            error!(%request_id, "can't find place for request id");
            return Ok(Vec::new());
        };
        let triggers = if arrival {
            self.locations.arrival_triggers(&place.uid, now)?
        } else {
            self.locations.departure_triggers(&place.uid, now)?
        };
        debug!(
            place = %place.name,
            count = triggers.len(),
            arrival,
            "matched geofence triggers"
        );
        let mut requests = Vec::with_capacity(triggers.len());
        for trigger in &triggers {
            requests.push(to_notification(&place, trigger, arrival, now));
        }
        Ok(requests)
    }
}

fn to_notification(
    place: &Place,
    trigger: &GeofenceTrigger,
    arrival: bool,
    now: i64,
) -> NotificationRequest {
    NotificationRequest {
        task_id: trigger.task_id,
        kind: NotificationKind::for_transition(arrival),
        timestamp: now,
        location: Some(place.id),
    }
}
