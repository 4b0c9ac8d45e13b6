use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use std::sync::{Arc, RwLock};

use crate::audit::AuditRecorder;
use crate::error::Result;
use crate::models::{
    AuditLogEntry, Lab, LabStatus, NewAuditEntry, NewLab, NewReservation, ReservationRequest,
    StatusChange,
};
use crate::time::local_date;

/// Source of truth for reservation requests.
///
/// Every mutation records its audit entries in the same write, so a request
/// never changes without a matching entry in the trail.
#[async_trait]
pub trait ReservationStore: Send + Sync {
    /// Insert new requests as `Pending`, assigning ids. Each record is
    /// re-checked against its lab first; one failure rejects the batch.
    async fn create_requests(
        &self,
        requests: Vec<NewReservation>,
        requested_on: DateTime<Utc>,
        recorder: &AuditRecorder,
    ) -> Result<Vec<ReservationRequest>>;

    async fn get_request(&self, id: i64) -> Result<Option<ReservationRequest>>;

    async fn list_requests(&self) -> Result<Vec<ReservationRequest>>;

    /// Compare-and-set on status, appending `entry` when the change applies.
    /// Returns the updated request, or `None` without writing anything when
    /// the stored status no longer matches `change.expected`.
    async fn update_status(
        &self,
        change: StatusChange,
        entry: NewAuditEntry,
    ) -> Result<Option<ReservationRequest>>;
}

/// Append-only audit trail
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, entry: NewAuditEntry) -> Result<AuditLogEntry>;

    async fn list_entries(&self) -> Result<Vec<AuditLogEntry>>;
}

#[async_trait]
pub trait LabCatalog: Send + Sync {
    async fn create_lab(&self, lab: NewLab) -> Result<Lab>;

    async fn get_lab(&self, id: i64) -> Result<Option<Lab>>;

    async fn list_labs(&self) -> Result<Vec<Lab>>;

    async fn set_lab_status(&self, id: i64, status: LabStatus) -> Result<bool>;
}

/// Trait for clock operations to enable deterministic testing
pub trait Clock: Send + Sync {
    /// Get current UTC time
    fn now_utc(&self) -> DateTime<Utc>;

    /// Today's date in the given timezone
    fn today(&self, tz: Tz) -> NaiveDate {
        local_date(tz, self.now_utc())
    }
}

/// Production implementation using system clock
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Test clock implementation for deterministic time control
#[derive(Debug, Clone)]
pub struct TestClock {
    current_time: Arc<RwLock<DateTime<Utc>>>,
}

impl TestClock {
    pub fn new(initial_time: DateTime<Utc>) -> Self {
        Self {
            current_time: Arc::new(RwLock::new(initial_time)),
        }
    }

    /// Advance the clock by a specific duration
    pub fn advance(&self, duration: chrono::Duration) {
        if let Ok(mut time) = self.current_time.write() {
            *time = *time + duration;
        }
    }

    /// Set the clock to a specific time
    pub fn set_time(&self, new_time: DateTime<Utc>) {
        if let Ok(mut time) = self.current_time.write() {
            *time = new_time;
        }
    }
}

impl Clock for TestClock {
    fn now_utc(&self) -> DateTime<Utc> {
        match self.current_time.read() {
            Ok(time) => *time,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}
