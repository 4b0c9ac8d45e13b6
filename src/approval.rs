use std::collections::BTreeSet;
use std::sync::Arc;

use chrono_tz::Tz;
use tracing::{info, warn};

use crate::audit::AuditRecorder;
use crate::constants::Constants;
use crate::error::{ReservationError, Result, ValidationErrors};
use crate::models::{ActionType, RequestStatus, ReservationRequest, StatusChange};
use crate::traits::{Clock, ReservationStore};

impl RequestStatus {
    /// Legal moves: Pending to Approved, Rejected or Cancelled, and Approved to Cancelled
    pub fn can_transition_to(&self, target: RequestStatus) -> bool {
        matches!(
            (self, target),
            (RequestStatus::Pending, RequestStatus::Approved)
                | (RequestStatus::Pending, RequestStatus::Rejected)
                | (RequestStatus::Pending, RequestStatus::Cancelled)
                | (RequestStatus::Approved, RequestStatus::Cancelled)
        )
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }

    pub fn is_cancellable(&self) -> bool {
        self.can_transition_to(RequestStatus::Cancelled)
    }
}

/// Checks a single status move against the transition table
pub fn check_transition(from: RequestStatus, to: RequestStatus) -> Result<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(ReservationError::InvalidTransition { from, to })
    }
}

/// Blank notes count as none; overlong notes are a validation error
fn normalize_notes(notes: Option<String>) -> Result<Option<String>> {
    let notes = notes
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());
    if let Some(n) = &notes {
        if n.chars().count() > Constants::MAX_DECISION_NOTES_LENGTH {
            let mut errors = ValidationErrors::new();
            errors.add(
                "notes",
                format!(
                    "Notes must be at most {} characters",
                    Constants::MAX_DECISION_NOTES_LENGTH
                ),
            );
            return Err(ReservationError::Validation(errors));
        }
    }
    Ok(notes)
}

/// Ids ticked in the current list page.
///
/// "Select all" covers only the ids rendered on the visible page, never the
/// rest of the filtered result set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageSelection {
    selected: BTreeSet<i64>,
}

impl PageSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn toggle(&mut self, id: i64) {
        if !self.selected.remove(&id) {
            self.selected.insert(id);
        }
    }

    pub fn is_selected(&self, id: i64) -> bool {
        self.selected.contains(&id)
    }

    /// Header checkbox: selects exactly the visible ids, or clears when unchecked
    pub fn set_all(&mut self, visible_ids: &[i64], checked: bool) {
        self.selected.clear();
        if checked {
            self.selected.extend(visible_ids.iter().copied());
        }
    }

    pub fn all_selected(&self, visible_ids: &[i64]) -> bool {
        !visible_ids.is_empty() && visible_ids.iter().all(|id| self.selected.contains(id))
    }

    pub fn ids(&self) -> Vec<i64> {
        self.selected.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn clear(&mut self) {
        self.selected.clear();
    }
}

#[derive(Debug)]
pub enum BulkItemOutcome {
    Applied(ReservationRequest),
    /// The request was no longer pending
    Skipped { status: RequestStatus },
    Failed(ReservationError),
}

#[derive(Debug, Default)]
pub struct BulkOutcome {
    pub results: Vec<(i64, BulkItemOutcome)>,
}

impl BulkOutcome {
    fn ids_where(&self, pred: impl Fn(&BulkItemOutcome) -> bool) -> Vec<i64> {
        self.results
            .iter()
            .filter(|(_, outcome)| pred(outcome))
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn applied_ids(&self) -> Vec<i64> {
        self.ids_where(|o| matches!(o, BulkItemOutcome::Applied(_)))
    }

    pub fn skipped_ids(&self) -> Vec<i64> {
        self.ids_where(|o| matches!(o, BulkItemOutcome::Skipped { .. }))
    }

    pub fn failed_ids(&self) -> Vec<i64> {
        self.ids_where(|o| matches!(o, BulkItemOutcome::Failed(_)))
    }
}

/// Applies approve, reject and cancel commands to the request store
#[derive(Clone)]
pub struct ApprovalService {
    store: Arc<dyn ReservationStore>,
    clock: Arc<dyn Clock>,
    tz: Tz,
}

impl ApprovalService {
    pub fn new(store: Arc<dyn ReservationStore>, clock: Arc<dyn Clock>, tz: Tz) -> Self {
        Self { store, clock, tz }
    }

    async fn load(&self, id: i64) -> Result<ReservationRequest> {
        self.store
            .get_request(id)
            .await?
            .ok_or(ReservationError::NotFound(id))
    }

    /// Approve or reject one pending request.
    ///
    /// Retrying with the same target on a request that already has that status
    /// succeeds without side effects; any other non-pending status is
    /// `AlreadyDecided`.
    pub async fn decide(
        &self,
        recorder: &AuditRecorder,
        id: i64,
        target: RequestStatus,
        notes: Option<String>,
    ) -> Result<ReservationRequest> {
        let notes = normalize_notes(notes)?;
        let request = self.load(id).await?;
        if !matches!(target, RequestStatus::Approved | RequestStatus::Rejected) {
            return Err(ReservationError::InvalidTransition {
                from: request.status,
                to: target,
            });
        }
        if request.status == target {
            return Ok(request);
        }
        if request.status != RequestStatus::Pending {
            return Err(ReservationError::AlreadyDecided {
                id,
                status: request.status,
            });
        }
        match self.apply_decision(recorder, request, target, notes).await {
            Err(ReservationError::AlreadyDecided { status, .. }) if status == target => {
                self.load(id).await
            }
            other => other,
        }
    }

    async fn apply_decision(
        &self,
        recorder: &AuditRecorder,
        request: ReservationRequest,
        target: RequestStatus,
        notes: Option<String>,
    ) -> Result<ReservationRequest> {
        check_transition(request.status, target)?;
        let now = self.clock.now_utc();
        let change = StatusChange {
            id: request.id,
            expected: request.status,
            new_status: target,
            decision_notes: notes.clone(),
            rejection_reason: if target == RequestStatus::Rejected {
                notes.clone()
            } else {
                None
            },
            decided_by: recorder.actor().name.clone(),
            decided_at: now,
        };

        let action = match target {
            RequestStatus::Approved => ActionType::ReservationApproved,
            RequestStatus::Rejected => ActionType::ReservationRejected,
            _ => ActionType::ReservationCancelled,
        };
        let entry = recorder.reservation_entry(action, &request, notes.as_deref(), now);

        let Some(updated) = self.store.update_status(change, entry).await? else {
            // Lost a race with another decider; report what is actually stored
            let current = self.load(request.id).await?;
            warn!(
                "Request {} changed concurrently (now {})",
                request.id, current.status
            );
            return Err(ReservationError::AlreadyDecided {
                id: request.id,
                status: current.status,
            });
        };

        info!(
            "Request {} moved {} -> {} by {}",
            updated.id,
            request.status,
            updated.status,
            recorder.actor().name
        );
        Ok(updated)
    }

    /// Applies one decision to every selected id independently.
    /// Non-pending ids are skipped; the selection is cleared afterwards.
    pub async fn bulk_decide(
        &self,
        recorder: &AuditRecorder,
        selection: &mut PageSelection,
        target: RequestStatus,
        notes: Option<String>,
    ) -> Result<BulkOutcome> {
        let outcome = self.decide_each(recorder, selection.ids(), target, notes).await?;
        selection.clear();
        Ok(outcome)
    }

    /// Bulk decision over explicit ids
    pub async fn decide_each(
        &self,
        recorder: &AuditRecorder,
        ids: Vec<i64>,
        target: RequestStatus,
        notes: Option<String>,
    ) -> Result<BulkOutcome> {
        if !matches!(target, RequestStatus::Approved | RequestStatus::Rejected) {
            return Err(ReservationError::InvalidTransition {
                from: RequestStatus::Pending,
                to: target,
            });
        }
        let notes = normalize_notes(notes)?;

        let mut outcome = BulkOutcome::default();
        for id in ids {
            let item = match self.store.get_request(id).await {
                Ok(Some(request)) if request.status != RequestStatus::Pending => {
                    BulkItemOutcome::Skipped {
                        status: request.status,
                    }
                }
                Ok(Some(request)) => {
                    match self
                        .apply_decision(recorder, request, target, notes.clone())
                        .await
                    {
                        Ok(updated) => BulkItemOutcome::Applied(updated),
                        Err(ReservationError::AlreadyDecided { status, .. }) => {
                            BulkItemOutcome::Skipped { status }
                        }
                        Err(e) => BulkItemOutcome::Failed(e),
                    }
                }
                Ok(None) => BulkItemOutcome::Failed(ReservationError::NotFound(id)),
                Err(e) => BulkItemOutcome::Failed(e),
            };
            outcome.results.push((id, item));
        }

        info!(
            "Bulk {}: {} applied, {} skipped, {} failed",
            target,
            outcome.applied_ids().len(),
            outcome.skipped_ids().len(),
            outcome.failed_ids().len()
        );
        Ok(outcome)
    }

    /// Cancel a pending or approved request whose date is today or later
    pub async fn cancel(
        &self,
        recorder: &AuditRecorder,
        id: i64,
        reason: Option<String>,
    ) -> Result<ReservationRequest> {
        let reason = normalize_notes(reason)?;
        let request = self.load(id).await?;
        check_transition(request.status, RequestStatus::Cancelled)?;

        let today = self.clock.today(self.tz);
        if request.date < today {
            return Err(ReservationError::PastDate);
        }

        let now = self.clock.now_utc();
        let change = StatusChange {
            id,
            expected: request.status,
            new_status: RequestStatus::Cancelled,
            decision_notes: reason.clone(),
            rejection_reason: None,
            decided_by: recorder.actor().name.clone(),
            decided_at: now,
        };

        let entry = recorder.reservation_entry(
            ActionType::ReservationCancelled,
            &request,
            reason.as_deref(),
            now,
        );

        let Some(updated) = self.store.update_status(change, entry).await? else {
            // Decided or cancelled by someone else since it was loaded
            let current = self.load(id).await?;
            warn!("Request {} changed concurrently (now {})", id, current.status);
            return Err(ReservationError::AlreadyDecided {
                id,
                status: current.status,
            });
        };

        info!("Request {} cancelled by {}", id, recorder.actor().name);
        Ok(updated)
    }
}
