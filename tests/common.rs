#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use lab_reservation::approval::ApprovalService;
use lab_reservation::audit::AuditRecorder;
use lab_reservation::calendar::{CalendarAvailability, MonthAvailability, MonthKey};
use lab_reservation::database::{self, SqliteStore};
use lab_reservation::error::ReservationError;
use lab_reservation::models::*;
use lab_reservation::store::MemoryStore;
use lab_reservation::traits::*;
use sqlx::SqlitePool;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

pub const TZ: Tz = chrono_tz::Asia::Tokyo;

/// 2025-06-10 12:00 JST
pub fn default_now() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2025-06-10T03:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Test helper for setting up a file-backed database with migrations.
/// The returned directory must outlive the pool.
pub async fn setup_test_db() -> Result<(SqlitePool, TempDir)> {
    let dir = tempfile::tempdir()?;
    let db_path = dir.path().join("test.db");
    let database_url = format!("sqlite:{}", db_path.display());

    let pool = database::init(&database_url).await?;
    database::migrate(&pool).await?;

    Ok((pool, dir))
}

/// Test helper for setting up an in-memory database
pub async fn setup_memory_db() -> Result<SqlitePool> {
    let pool = database::init("sqlite::memory:").await?;
    database::migrate(&pool).await?;
    Ok(pool)
}

/// In-memory SQLite store for tests that exercise the SQL paths
pub async fn setup_sqlite_store() -> Result<Arc<SqliteStore>> {
    let pool = setup_memory_db().await?;
    Ok(Arc::new(SqliteStore::new(pool)))
}

pub fn admin_recorder() -> AuditRecorder {
    AuditRecorder::new(
        Actor::new("Dr. Yamada", UserRole::Admin),
        "192.168.1.10",
        "Chrome on macOS",
    )
}

/// Recorder used by builders, so fixture setup is told apart from the
/// actions under test
pub fn fixture_recorder() -> AuditRecorder {
    AuditRecorder::new(
        Actor::new("Lab Office", UserRole::Admin),
        "127.0.0.1",
        "fixture",
    )
}

/// Audit entries written through `admin_recorder`
pub async fn admin_entries(sink: &dyn AuditSink) -> Result<Vec<AuditLogEntry>> {
    Ok(sink
        .list_entries()
        .await?
        .into_iter()
        .filter(|e| e.actor.name == "Dr. Yamada")
        .collect())
}

pub fn student() -> Requester {
    Requester::new("Aiko Tanaka", RequesterRole::Student)
}

pub fn lecturer() -> Requester {
    Requester::new("Prof. Kato", RequesterRole::Lecturer)
}

/// Builder for creating test labs
pub struct LabBuilder {
    lab: NewLab,
}

impl LabBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            lab: NewLab {
                name: name.to_string(),
                capacity: 30,
                location: "Engineering Building".to_string(),
                description: format!("{} for practical classes", name),
                equipment: vec!["Projector".to_string(), "Oscilloscope".to_string()],
                status: LabStatus::Available,
                available_times: Vec::new(),
                calendar: CalendarAvailability::new(),
            },
        }
    }

    pub fn with_capacity(mut self, capacity: u32) -> Self {
        self.lab.capacity = capacity;
        self
    }

    pub fn with_status(mut self, status: LabStatus) -> Self {
        self.lab.status = status;
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.lab.description = description.to_string();
        self
    }

    pub fn with_available_time(mut self, date: NaiveDate, slots: &[TimeSlot]) -> Self {
        self.lab.available_times.push(AvailableTime {
            date,
            slots: slots.to_vec(),
        });
        self
    }

    pub fn with_month(
        mut self,
        month: &str,
        available: &[u32],
        booked: &[u32],
        unavailable: &[u32],
    ) -> Self {
        let key: MonthKey = month.parse().unwrap();
        self.lab.calendar.set_month(
            key,
            MonthAvailability::new(
                available.iter().copied(),
                booked.iter().copied(),
                unavailable.iter().copied(),
            ),
        );
        self
    }

    pub fn new_lab(self) -> NewLab {
        self.lab
    }

    pub async fn build(self, catalog: &dyn LabCatalog) -> Result<Lab> {
        Ok(catalog.create_lab(self.lab).await?)
    }
}

/// Builder for creating test reservation requests
pub struct RequestBuilder {
    request: NewReservation,
    status: RequestStatus,
    requested_on: DateTime<Utc>,
}

impl RequestBuilder {
    pub fn new(lab: &Lab, requester: &Requester, date: NaiveDate) -> Self {
        Self {
            request: NewReservation {
                submission_id: uuid::Uuid::new_v4(),
                requester_name: requester.name.clone(),
                requester_role: requester.role,
                lab_id: lab.id,
                lab_name: lab.name.clone(),
                date,
                time_slot: TimeSlot::Morning,
                course: "CS201 - Data Structures".to_string(),
                purpose: "Hands-on session on linked lists".to_string(),
                student_count: 20,
                equipment: BTreeSet::new(),
                additional_info: None,
            },
            status: RequestStatus::Pending,
            requested_on: default_now(),
        }
    }

    pub fn with_slot(mut self, slot: TimeSlot) -> Self {
        self.request.time_slot = slot;
        self
    }

    pub fn with_purpose(mut self, purpose: &str) -> Self {
        self.request.purpose = purpose.to_string();
        self
    }

    pub fn with_status(mut self, status: RequestStatus) -> Self {
        self.status = status;
        self
    }

    pub fn requested_on(mut self, when: DateTime<Utc>) -> Self {
        self.requested_on = when;
        self
    }

    pub fn new_reservation(self) -> NewReservation {
        self.request
    }

    pub async fn build(self, store: &dyn ReservationStore) -> Result<ReservationRequest> {
        let recorder = fixture_recorder();
        let mut created = store
            .create_requests(vec![self.request], self.requested_on, &recorder)
            .await?;
        let request = created.remove(0);

        if self.status != RequestStatus::Pending {
            let action = match self.status {
                RequestStatus::Approved => ActionType::ReservationApproved,
                RequestStatus::Rejected => ActionType::ReservationRejected,
                _ => ActionType::ReservationCancelled,
            };
            let entry = recorder.reservation_entry(action, &request, None, self.requested_on);
            let updated = store
                .update_status(
                    StatusChange {
                        id: request.id,
                        expected: RequestStatus::Pending,
                        new_status: self.status,
                        decision_notes: None,
                        rejection_reason: None,
                        decided_by: recorder.actor().name.clone(),
                        decided_at: self.requested_on,
                    },
                    entry,
                )
                .await?;
            return Ok(updated.expect("fixture status change applies"));
        }
        Ok(request)
    }
}

/// Test application context backed by the in-memory store
pub struct TestContext {
    pub store: Arc<MemoryStore>,
    pub clock: Arc<TestClock>,
    pub approvals: ApprovalService,
}

impl TestContext {
    pub fn new() -> Self {
        Self::new_with_time(default_now())
    }

    pub fn new_with_time(initial_time: DateTime<Utc>) -> Self {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(TestClock::new(initial_time));
        let approvals = ApprovalService::new(store.clone(), clock.clone(), TZ);
        Self {
            store,
            clock,
            approvals,
        }
    }

    pub fn advance(&self, duration: Duration) {
        self.clock.advance(duration);
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today(TZ)
    }
}

/// Store wrapper that fails the first N reads with a transport error
pub struct FlakyStore {
    pub inner: MemoryStore,
    pub failing_reads: AtomicU32,
    pub fail_updates: bool,
    pub read_calls: AtomicU32,
    pub update_calls: AtomicU32,
}

impl FlakyStore {
    pub fn new(inner: MemoryStore, failing_reads: u32) -> Self {
        Self {
            inner,
            failing_reads: AtomicU32::new(failing_reads),
            fail_updates: false,
            read_calls: AtomicU32::new(0),
            update_calls: AtomicU32::new(0),
        }
    }

    pub fn failing_updates(mut self) -> Self {
        self.fail_updates = true;
        self
    }

    fn read_attempt(&self) -> Result<(), ReservationError> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failing_reads.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_reads.store(remaining - 1, Ordering::SeqCst);
            return Err(ReservationError::Transport("connection reset".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ReservationStore for FlakyStore {
    async fn create_requests(
        &self,
        requests: Vec<NewReservation>,
        requested_on: DateTime<Utc>,
        recorder: &AuditRecorder,
    ) -> Result<Vec<ReservationRequest>, ReservationError> {
        self.inner.create_requests(requests, requested_on, recorder).await
    }

    async fn get_request(&self, id: i64) -> Result<Option<ReservationRequest>, ReservationError> {
        self.inner.get_request(id).await
    }

    async fn list_requests(&self) -> Result<Vec<ReservationRequest>, ReservationError> {
        self.read_attempt()?;
        self.inner.list_requests().await
    }

    async fn update_status(
        &self,
        change: StatusChange,
        entry: NewAuditEntry,
    ) -> Result<Option<ReservationRequest>, ReservationError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_updates {
            return Err(ReservationError::Transport("connection reset".to_string()));
        }
        self.inner.update_status(change, entry).await
    }
}

/// Store wrapper whose writes take `delay` to complete
pub struct SlowWriteStore {
    pub inner: MemoryStore,
    pub delay: std::time::Duration,
}

#[async_trait]
impl ReservationStore for SlowWriteStore {
    async fn create_requests(
        &self,
        requests: Vec<NewReservation>,
        requested_on: DateTime<Utc>,
        recorder: &AuditRecorder,
    ) -> Result<Vec<ReservationRequest>, ReservationError> {
        tokio::time::sleep(self.delay).await;
        self.inner.create_requests(requests, requested_on, recorder).await
    }

    async fn get_request(&self, id: i64) -> Result<Option<ReservationRequest>, ReservationError> {
        self.inner.get_request(id).await
    }

    async fn list_requests(&self) -> Result<Vec<ReservationRequest>, ReservationError> {
        self.inner.list_requests().await
    }

    async fn update_status(
        &self,
        change: StatusChange,
        entry: NewAuditEntry,
    ) -> Result<Option<ReservationRequest>, ReservationError> {
        tokio::time::sleep(self.delay).await;
        self.inner.update_status(change, entry).await
    }
}
