use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::audit::AuditRecorder;
use crate::error::{ReservationError, Result};
use crate::models::{
    ActionType, AuditLogEntry, Lab, LabStatus, NewAuditEntry, NewLab, NewReservation, RequestStatus,
    ReservationRequest, StatusChange,
};
use crate::traits::{AuditSink, LabCatalog, ReservationStore};

#[derive(Debug, Default)]
struct MemoryState {
    labs: Vec<Lab>,
    requests: Vec<ReservationRequest>,
    audit: Vec<AuditLogEntry>,
    next_lab_id: i64,
    next_request_id: i64,
    next_audit_id: i64,
}

/// In-process store; every operation runs under one lock, so each
/// mutation is serialized and compare-and-set is exact.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn approval_conflict(requests: &[ReservationRequest], target: &ReservationRequest) -> bool {
    requests.iter().any(|r| {
        r.id != target.id
            && r.status == RequestStatus::Approved
            && r.lab_id == target.lab_id
            && r.date == target.date
            && r.time_slot == target.time_slot
    })
}

impl MemoryState {
    fn push_entry(&mut self, entry: NewAuditEntry) -> AuditLogEntry {
        self.next_audit_id += 1;
        let entry = entry.into_entry(self.next_audit_id);
        self.audit.push(entry.clone());
        entry
    }
}

#[async_trait]
impl ReservationStore for MemoryStore {
    async fn create_requests(
        &self,
        requests: Vec<NewReservation>,
        requested_on: DateTime<Utc>,
        recorder: &AuditRecorder,
    ) -> Result<Vec<ReservationRequest>> {
        let mut state = self.state.lock().await;
        for new_request in &requests {
            let lab = state
                .labs
                .iter()
                .find(|l| l.id == new_request.lab_id)
                .ok_or(ReservationError::NotFound(new_request.lab_id))?;
            new_request.check_against(lab).into_result()?;
        }

        let mut created = Vec::with_capacity(requests.len());
        for new_request in requests {
            state.next_request_id += 1;
            let request = new_request.into_request(state.next_request_id, requested_on);
            state.push_entry(recorder.reservation_entry(
                ActionType::ReservationCreated,
                &request,
                None,
                requested_on,
            ));
            state.requests.push(request.clone());
            created.push(request);
        }
        debug!("Stored {} new requests", created.len());
        Ok(created)
    }

    async fn get_request(&self, id: i64) -> Result<Option<ReservationRequest>> {
        let state = self.state.lock().await;
        Ok(state.requests.iter().find(|r| r.id == id).cloned())
    }

    async fn list_requests(&self) -> Result<Vec<ReservationRequest>> {
        Ok(self.state.lock().await.requests.clone())
    }

    async fn update_status(
        &self,
        change: StatusChange,
        entry: NewAuditEntry,
    ) -> Result<Option<ReservationRequest>> {
        let mut state = self.state.lock().await;
        let index = state
            .requests
            .iter()
            .position(|r| r.id == change.id)
            .ok_or(ReservationError::NotFound(change.id))?;

        if state.requests[index].status != change.expected {
            return Ok(None);
        }

        if change.new_status == RequestStatus::Approved
            && approval_conflict(&state.requests, &state.requests[index])
        {
            let target = &state.requests[index];
            return Err(ReservationError::SlotTaken {
                lab_id: target.lab_id,
                date: target.date,
                time_slot: target.time_slot.to_string(),
            });
        }

        let request = &mut state.requests[index];
        request.status = change.new_status;
        request.decision_notes = change.decision_notes;
        request.rejection_reason = change.rejection_reason;
        request.decided_by = Some(change.decided_by);
        request.decided_at = Some(change.decided_at);
        let updated = request.clone();
        state.push_entry(entry);
        Ok(Some(updated))
    }
}

#[async_trait]
impl AuditSink for MemoryStore {
    async fn append(&self, entry: NewAuditEntry) -> Result<AuditLogEntry> {
        let mut state = self.state.lock().await;
        Ok(state.push_entry(entry))
    }

    async fn list_entries(&self) -> Result<Vec<AuditLogEntry>> {
        Ok(self.state.lock().await.audit.clone())
    }
}

#[async_trait]
impl LabCatalog for MemoryStore {
    async fn create_lab(&self, lab: NewLab) -> Result<Lab> {
        lab.calendar.validate()?;
        let mut state = self.state.lock().await;
        state.next_lab_id += 1;
        let lab = lab.into_lab(state.next_lab_id);
        state.labs.push(lab.clone());
        Ok(lab)
    }

    async fn get_lab(&self, id: i64) -> Result<Option<Lab>> {
        let state = self.state.lock().await;
        Ok(state.labs.iter().find(|l| l.id == id).cloned())
    }

    async fn list_labs(&self) -> Result<Vec<Lab>> {
        Ok(self.state.lock().await.labs.clone())
    }

    async fn set_lab_status(&self, id: i64, status: LabStatus) -> Result<bool> {
        let mut state = self.state.lock().await;
        match state.labs.iter_mut().find(|l| l.id == id) {
            Some(lab) => {
                lab.status = status;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
