use chrono::{DateTime, Utc};

use crate::models::{ActionType, Actor, NewAuditEntry, ReservationRequest};

/// Builds audit entries on behalf of one signed-in actor and session
#[derive(Debug, Clone)]
pub struct AuditRecorder {
    actor: Actor,
    ip_address: String,
    device_info: String,
}

impl AuditRecorder {
    pub fn new(actor: Actor, ip_address: &str, device_info: &str) -> Self {
        Self {
            actor,
            ip_address: ip_address.to_string(),
            device_info: device_info.to_string(),
        }
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    pub fn entry(
        &self,
        action_type: ActionType,
        details: String,
        target_id: Option<i64>,
        timestamp: DateTime<Utc>,
    ) -> NewAuditEntry {
        NewAuditEntry {
            timestamp,
            actor: self.actor.clone(),
            action_type,
            details,
            ip_address: self.ip_address.clone(),
            device_info: self.device_info.clone(),
            target_id,
        }
    }

    /// Entry describing a status change or creation of a reservation
    pub fn reservation_entry(
        &self,
        action_type: ActionType,
        request: &ReservationRequest,
        notes: Option<&str>,
        timestamp: DateTime<Utc>,
    ) -> NewAuditEntry {
        let verb = match action_type {
            ActionType::ReservationCreated => "Requested",
            ActionType::ReservationApproved => "Approved",
            ActionType::ReservationRejected => "Rejected",
            ActionType::ReservationCancelled => "Cancelled",
            _ => "Updated",
        };
        let mut details = format!(
            "{} reservation #{} for {} on {} {} ({})",
            verb,
            request.id,
            request.lab_name,
            request.date,
            request.time_slot,
            request.requester_name
        );
        if let Some(notes) = notes.filter(|n| !n.trim().is_empty()) {
            details.push_str(": ");
            details.push_str(notes.trim());
        }
        self.entry(action_type, details, Some(request.id), timestamp)
    }
}
