use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use crate::models::RequestStatus;

/// Field-level validation failures, collected all at once
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    fields: BTreeMap<String, String>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.fields.insert(field.to_string(), message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// `Ok(())` when nothing failed, otherwise the whole set as an error
    pub fn into_result(self) -> Result<(), ReservationError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ReservationError::Validation(self))
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .fields
            .iter()
            .map(|(field, message)| format!("{}: {}", field, message))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

#[derive(Debug, Error)]
pub enum ReservationError {
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("cannot change status from {from} to {to}")]
    InvalidTransition {
        from: RequestStatus,
        to: RequestStatus,
    },

    #[error("the reservation date has already passed")]
    PastDate,

    #[error("request {id} was already decided ({status})")]
    AlreadyDecided { id: i64, status: RequestStatus },

    #[error("lab {lab_id} is already booked on {date} at {time_slot}")]
    SlotTaken {
        lab_id: i64,
        date: chrono::NaiveDate,
        time_slot: String,
    },

    #[error("record {0} not found")]
    NotFound(i64),

    #[error("a submission is already in flight")]
    SubmissionInFlight,

    #[error("operation aborted")]
    Aborted,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ReservationError {
    /// Whether the caller should refresh the record from the source of truth
    pub fn requires_resync(&self) -> bool {
        matches!(
            self,
            Self::InvalidTransition { .. } | Self::AlreadyDecided { .. } | Self::SlotTaken { .. }
        )
    }

    /// Transport failures are the only retryable category, and only for reads
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

pub type Result<T, E = ReservationError> = std::result::Result<T, E>;
