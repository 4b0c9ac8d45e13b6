use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::collections::HashMap;
use std::str::FromStr;
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::AuditRecorder;
use crate::error::ReservationError;
use crate::models::{
    ActionType, Actor, AuditLogEntry, Lab, LabStatus, NewAuditEntry, NewLab, NewReservation,
    ReservationRequest, StatusChange,
};
use crate::traits::{AuditSink, LabCatalog, ReservationStore};

pub async fn init(database_url: &str) -> Result<SqlitePool> {
    info!("Connecting to database: {}", database_url);

    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal);

    // Each connection to an in-memory database is a separate database,
    // so keep exactly one alive for the pool's lifetime.
    let pool_options = if database_url.contains(":memory:") {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(10)
    };

    let pool = pool_options.connect_with(options).await?;
    Ok(pool)
}

pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    info!("Database migrations completed");
    Ok(())
}

/// SQLite-backed store implementing the request, audit and lab traits
#[derive(Debug, Clone)]
pub struct SqliteStore {
    db: SqlitePool,
}

type StoreResult<T> = crate::error::Result<T>;

impl SqliteStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.db
    }

    fn parse_column<T: FromStr<Err = ReservationError>>(
        row: &SqliteRow,
        column: &str,
    ) -> StoreResult<T> {
        let raw: String = row.try_get(column)?;
        raw.parse()
    }

    fn row_to_request(row: &SqliteRow) -> StoreResult<ReservationRequest> {
        let submission_id: String = row.try_get("submission_id")?;
        let submission_id = Uuid::parse_str(&submission_id)
            .map_err(|e| ReservationError::InvalidValue(format!("submission id: {}", e)))?;
        let equipment: String = row.try_get("equipment")?;
        let student_count: i64 = row.try_get("student_count")?;

        Ok(ReservationRequest {
            id: row.try_get("id")?,
            submission_id,
            requester_name: row.try_get("requester_name")?,
            requester_role: Self::parse_column(row, "requester_role")?,
            lab_id: row.try_get("lab_id")?,
            lab_name: row.try_get("lab_name")?,
            date: row.try_get("date")?,
            time_slot: Self::parse_column(row, "time_slot")?,
            course: row.try_get("course")?,
            purpose: row.try_get("purpose")?,
            student_count: u32::try_from(student_count).map_err(|_| {
                ReservationError::InvalidValue(format!("student count {}", student_count))
            })?,
            equipment: serde_json::from_str(&equipment)?,
            additional_info: row.try_get("additional_info")?,
            status: Self::parse_column(row, "status")?,
            requested_on: row.try_get("requested_on")?,
            decision_notes: row.try_get("decision_notes")?,
            rejection_reason: row.try_get("rejection_reason")?,
            decided_by: row.try_get("decided_by")?,
            decided_at: row.try_get("decided_at")?,
        })
    }

    fn row_to_lab(row: &SqliteRow) -> StoreResult<Lab> {
        let capacity: i64 = row.try_get("capacity")?;
        let equipment: String = row.try_get("equipment")?;
        let available_times: String = row.try_get("available_times")?;
        let calendar: String = row.try_get("calendar")?;

        Ok(Lab {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            capacity: u32::try_from(capacity)
                .map_err(|_| ReservationError::InvalidValue(format!("capacity {}", capacity)))?,
            location: row.try_get("location")?,
            description: row.try_get("description")?,
            equipment: serde_json::from_str(&equipment)?,
            status: Self::parse_column(row, "status")?,
            available_times: serde_json::from_str(&available_times)?,
            calendar: serde_json::from_str(&calendar)?,
        })
    }

    fn row_to_audit(row: &SqliteRow) -> StoreResult<AuditLogEntry> {
        Ok(AuditLogEntry {
            id: row.try_get("id")?,
            timestamp: row.try_get("timestamp")?,
            actor: Actor {
                name: row.try_get("actor_name")?,
                role: Self::parse_column(row, "actor_role")?,
            },
            action_type: Self::parse_column(row, "action_type")?,
            details: row.try_get("details")?,
            severity: Self::parse_column(row, "severity")?,
            ip_address: row.try_get("ip_address")?,
            device_info: row.try_get("device_info")?,
            target_id: row.try_get("target_id")?,
        })
    }

    const REQUEST_COLUMNS: &'static str =
        "id, submission_id, requester_name, requester_role, lab_id, lab_name,
         date, time_slot, course, purpose, student_count, equipment, additional_info,
         status, requested_on, decision_notes, rejection_reason, decided_by, decided_at";
}

/// Inserts one audit row on `conn`, inside whatever transaction it carries
async fn insert_audit(
    conn: &mut SqliteConnection,
    entry: NewAuditEntry,
) -> StoreResult<AuditLogEntry> {
    let id = sqlx::query(
        "INSERT INTO audit_log
         (timestamp, actor_name, actor_role, action_type, details, severity,
          ip_address, device_info, target_id)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(entry.timestamp)
    .bind(&entry.actor.name)
    .bind(entry.actor.role.as_str())
    .bind(entry.action_type.as_str())
    .bind(&entry.details)
    .bind(entry.action_type.severity().as_str())
    .bind(&entry.ip_address)
    .bind(&entry.device_info)
    .bind(entry.target_id)
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();

    Ok(entry.into_entry(id))
}

#[async_trait]
impl ReservationStore for SqliteStore {
    async fn create_requests(
        &self,
        requests: Vec<NewReservation>,
        requested_on: DateTime<Utc>,
        recorder: &AuditRecorder,
    ) -> StoreResult<Vec<ReservationRequest>> {
        let mut labs: HashMap<i64, Lab> = HashMap::new();
        for new_request in &requests {
            if !labs.contains_key(&new_request.lab_id) {
                let lab = self
                    .get_lab(new_request.lab_id)
                    .await?
                    .ok_or(ReservationError::NotFound(new_request.lab_id))?;
                labs.insert(lab.id, lab);
            }
            if let Some(lab) = labs.get(&new_request.lab_id) {
                new_request.check_against(lab).into_result()?;
            }
        }

        let mut tx = self.db.begin().await?;
        let mut created = Vec::with_capacity(requests.len());

        for new_request in requests {
            let equipment = serde_json::to_string(&new_request.equipment)?;
            let id = sqlx::query(
                "INSERT INTO reservation_requests
                 (submission_id, requester_name, requester_role, lab_id, lab_name, date, time_slot,
                  course, purpose, student_count, equipment, additional_info, status, requested_on)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'Pending', ?)",
            )
            .bind(new_request.submission_id.to_string())
            .bind(&new_request.requester_name)
            .bind(new_request.requester_role.as_str())
            .bind(new_request.lab_id)
            .bind(&new_request.lab_name)
            .bind(new_request.date)
            .bind(new_request.time_slot.as_str())
            .bind(&new_request.course)
            .bind(&new_request.purpose)
            .bind(i64::from(new_request.student_count))
            .bind(equipment)
            .bind(&new_request.additional_info)
            .bind(requested_on)
            .execute(&mut *tx)
            .await?
            .last_insert_rowid();

            let request = new_request.into_request(id, requested_on);
            let entry = recorder.reservation_entry(
                ActionType::ReservationCreated,
                &request,
                None,
                requested_on,
            );
            insert_audit(&mut tx, entry).await?;
            created.push(request);
        }

        tx.commit().await?;
        info!("Inserted {} reservation requests", created.len());
        Ok(created)
    }

    async fn get_request(&self, id: i64) -> StoreResult<Option<ReservationRequest>> {
        let sql = format!(
            "SELECT {} FROM reservation_requests WHERE id = ?",
            Self::REQUEST_COLUMNS
        );
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.db).await?;
        row.as_ref().map(Self::row_to_request).transpose()
    }

    async fn list_requests(&self) -> StoreResult<Vec<ReservationRequest>> {
        let sql = format!(
            "SELECT {} FROM reservation_requests ORDER BY id ASC",
            Self::REQUEST_COLUMNS
        );
        let rows = sqlx::query(&sql).fetch_all(&self.db).await?;
        rows.iter().map(Self::row_to_request).collect()
    }

    async fn update_status(
        &self,
        change: StatusChange,
        entry: NewAuditEntry,
    ) -> StoreResult<Option<ReservationRequest>> {
        let mut tx = self.db.begin().await?;
        let result = sqlx::query(
            "UPDATE reservation_requests
             SET status = ?, decision_notes = ?, rejection_reason = ?,
                 decided_by = ?, decided_at = ?
             WHERE id = ? AND status = ?",
        )
        .bind(change.new_status.as_str())
        .bind(&change.decision_notes)
        .bind(&change.rejection_reason)
        .bind(&change.decided_by)
        .bind(change.decided_at)
        .bind(change.id)
        .bind(change.expected.as_str())
        .execute(&mut *tx)
        .await;

        match result {
            Ok(done) if done.rows_affected() > 0 => {
                let sql = format!(
                    "SELECT {} FROM reservation_requests WHERE id = ?",
                    Self::REQUEST_COLUMNS
                );
                let row = sqlx::query(&sql)
                    .bind(change.id)
                    .fetch_one(&mut *tx)
                    .await?;
                let updated = Self::row_to_request(&row)?;
                insert_audit(&mut tx, entry).await?;
                tx.commit().await?;
                Ok(Some(updated))
            }
            Ok(_) => {
                tx.rollback().await?;
                match self.get_request(change.id).await? {
                    Some(_) => Ok(None),
                    None => Err(ReservationError::NotFound(change.id)),
                }
            }
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                tx.rollback().await?;
                let request = self
                    .get_request(change.id)
                    .await?
                    .ok_or(ReservationError::NotFound(change.id))?;
                warn!(
                    "Approval of request {} rejected: slot already approved",
                    change.id
                );
                Err(ReservationError::SlotTaken {
                    lab_id: request.lab_id,
                    date: request.date,
                    time_slot: request.time_slot.to_string(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl AuditSink for SqliteStore {
    async fn append(&self, entry: NewAuditEntry) -> StoreResult<AuditLogEntry> {
        let mut conn = self.db.acquire().await?;
        insert_audit(&mut conn, entry).await
    }

    async fn list_entries(&self) -> StoreResult<Vec<AuditLogEntry>> {
        let rows = sqlx::query(
            "SELECT id, timestamp, actor_name, actor_role, action_type, details, severity,
                    ip_address, device_info, target_id
             FROM audit_log ORDER BY id ASC",
        )
        .fetch_all(&self.db)
        .await?;
        rows.iter().map(Self::row_to_audit).collect()
    }
}

#[async_trait]
impl LabCatalog for SqliteStore {
    async fn create_lab(&self, lab: NewLab) -> StoreResult<Lab> {
        lab.calendar.validate()?;
        let id = sqlx::query(
            "INSERT INTO labs
             (name, capacity, location, description, equipment, status, available_times, calendar)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&lab.name)
        .bind(i64::from(lab.capacity))
        .bind(&lab.location)
        .bind(&lab.description)
        .bind(serde_json::to_string(&lab.equipment)?)
        .bind(lab.status.as_str())
        .bind(serde_json::to_string(&lab.available_times)?)
        .bind(serde_json::to_string(&lab.calendar)?)
        .execute(&self.db)
        .await?
        .last_insert_rowid();

        info!("Created lab {} ({})", lab.name, id);
        Ok(lab.into_lab(id))
    }

    async fn get_lab(&self, id: i64) -> StoreResult<Option<Lab>> {
        let row = sqlx::query(
            "SELECT id, name, capacity, location, description, equipment, status,
                    available_times, calendar
             FROM labs WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        row.as_ref().map(Self::row_to_lab).transpose()
    }

    async fn list_labs(&self) -> StoreResult<Vec<Lab>> {
        let rows = sqlx::query(
            "SELECT id, name, capacity, location, description, equipment, status,
                    available_times, calendar
             FROM labs ORDER BY id ASC",
        )
        .fetch_all(&self.db)
        .await?;
        rows.iter().map(Self::row_to_lab).collect()
    }

    async fn set_lab_status(&self, id: i64, status: LabStatus) -> StoreResult<bool> {
        let rows_affected = sqlx::query(
            "UPDATE labs SET status = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(id)
        .execute(&self.db)
        .await?
        .rows_affected();

        Ok(rows_affected > 0)
    }
}
