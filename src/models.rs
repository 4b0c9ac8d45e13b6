use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::calendar::CalendarAvailability;
use crate::constants::Constants;
use crate::error::{ReservationError, ValidationErrors};

/// Declares a closed string-backed enum with `as_str`, `Display` and `FromStr`
macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident { $($variant:ident => $text:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ReservationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(ReservationError::InvalidValue(format!(
                        "unknown {} '{}'",
                        stringify!($name),
                        other
                    ))),
                }
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.as_str().to_string()
            }
        }
    };
}

string_enum! {
    /// Who submitted a reservation request
    pub enum RequesterRole {
        Student => "Student",
        Lecturer => "Lecturer",
    }
}

string_enum! {
    /// Role of a signed-in user performing an action
    pub enum UserRole {
        Admin => "Admin",
        Lecturer => "Lecturer",
        Student => "Student",
    }
}

string_enum! {
    pub enum RequestStatus {
        Pending => "Pending",
        Approved => "Approved",
        Rejected => "Rejected",
        Cancelled => "Cancelled",
    }
}

string_enum! {
    pub enum LabStatus {
        Available => "Available",
        UnderMaintenance => "UnderMaintenance",
        Closed => "Closed",
    }
}

string_enum! {
    /// Fixed bookable time slots
    pub enum TimeSlot {
        Morning => "09:00-11:00",
        LateMorning => "11:00-13:00",
        Afternoon => "13:00-15:00",
        LateAfternoon => "15:00-17:00",
    }
}

string_enum! {
    pub enum ActionType {
        Login => "login",
        Logout => "logout",
        ReservationCreated => "reservation_created",
        ReservationApproved => "reservation_approved",
        ReservationRejected => "reservation_rejected",
        ReservationCancelled => "reservation_cancelled",
        LabCreated => "lab_created",
        LabUpdated => "lab_updated",
        LabStatusChanged => "lab_status_changed",
        UserCreated => "user_created",
        UserRoleChanged => "user_role_changed",
        SettingsChanged => "settings_changed",
    }
}

string_enum! {
    pub enum Severity {
        Low => "low",
        Medium => "medium",
        High => "high",
    }
}

impl From<RequesterRole> for UserRole {
    fn from(role: RequesterRole) -> Self {
        match role {
            RequesterRole::Student => UserRole::Student,
            RequesterRole::Lecturer => UserRole::Lecturer,
        }
    }
}

impl ActionType {
    /// Severity is a fixed function of the action
    pub fn severity(&self) -> Severity {
        match self {
            ActionType::Login | ActionType::Logout | ActionType::ReservationCreated => {
                Severity::Low
            }
            ActionType::ReservationApproved
            | ActionType::ReservationRejected
            | ActionType::ReservationCancelled
            | ActionType::LabCreated
            | ActionType::LabUpdated
            | ActionType::UserCreated => Severity::Medium,
            ActionType::LabStatusChanged
            | ActionType::UserRoleChanged
            | ActionType::SettingsChanged => Severity::High,
        }
    }
}

impl TimeSlot {
    /// Start hour of the slot, used for chronological ordering
    pub fn start_hour(&self) -> u32 {
        match self {
            TimeSlot::Morning => 9,
            TimeSlot::LateMorning => 11,
            TimeSlot::Afternoon => 13,
            TimeSlot::LateAfternoon => 15,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    pub name: String,
    pub role: RequesterRole,
}

impl Requester {
    pub fn new(name: &str, role: RequesterRole) -> Self {
        Self {
            name: name.to_string(),
            role,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub name: String,
    pub role: UserRole,
}

impl Actor {
    pub fn new(name: &str, role: UserRole) -> Self {
        Self {
            name: name.to_string(),
            role,
        }
    }
}

impl From<&Requester> for Actor {
    fn from(requester: &Requester) -> Self {
        Self {
            name: requester.name.clone(),
            role: requester.role.into(),
        }
    }
}

/// A single date offered in single-day mode, with its open slots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableTime {
    pub date: NaiveDate,
    pub slots: Vec<TimeSlot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lab {
    pub id: i64,
    pub name: String,
    pub capacity: u32,
    pub location: String,
    pub description: String,
    pub equipment: Vec<String>,
    pub status: LabStatus,
    pub available_times: Vec<AvailableTime>,
    pub calendar: CalendarAvailability,
}

impl Lab {
    /// Only labs in `Available` status can be booked
    pub fn is_available(&self) -> bool {
        self.status == LabStatus::Available
    }

    pub fn slots_on(&self, date: NaiveDate) -> Option<&[TimeSlot]> {
        self.available_times
            .iter()
            .find(|t| t.date == date)
            .map(|t| t.slots.as_slice())
    }

    pub fn has_equipment(&self, tag: &str) -> bool {
        self.equipment.iter().any(|e| e == tag)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLab {
    pub name: String,
    pub capacity: u32,
    pub location: String,
    pub description: String,
    pub equipment: Vec<String>,
    pub status: LabStatus,
    pub available_times: Vec<AvailableTime>,
    pub calendar: CalendarAvailability,
}

impl NewLab {
    pub fn into_lab(self, id: i64) -> Lab {
        Lab {
            id,
            name: self.name,
            capacity: self.capacity,
            location: self.location,
            description: self.description,
            equipment: self.equipment,
            status: self.status,
            available_times: self.available_times,
            calendar: self.calendar,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationRequest {
    pub id: i64,
    /// Shared by every record expanded from one wizard submission
    pub submission_id: Uuid,
    pub requester_name: String,
    pub requester_role: RequesterRole,
    pub lab_id: i64,
    pub lab_name: String,
    pub date: NaiveDate,
    pub time_slot: TimeSlot,
    pub course: String,
    pub purpose: String,
    pub student_count: u32,
    pub equipment: BTreeSet<String>,
    pub additional_info: Option<String>,
    pub status: RequestStatus,
    pub requested_on: DateTime<Utc>,
    pub decision_notes: Option<String>,
    /// Only set while `status` is `Rejected`
    pub rejection_reason: Option<String>,
    pub decided_by: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
}

/// Reservation data as produced by the wizard, before an id is assigned
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewReservation {
    pub submission_id: Uuid,
    pub requester_name: String,
    pub requester_role: RequesterRole,
    pub lab_id: i64,
    pub lab_name: String,
    pub date: NaiveDate,
    pub time_slot: TimeSlot,
    pub course: String,
    pub purpose: String,
    pub student_count: u32,
    pub equipment: BTreeSet<String>,
    pub additional_info: Option<String>,
}

impl NewReservation {
    /// Re-checks the record against the lab it books
    pub fn check_against(&self, lab: &Lab) -> ValidationErrors {
        let mut errors = ValidationErrors::new();

        if self.lab_id != lab.id {
            errors.add("lab", format!("Request targets lab {}, not {}", self.lab_id, lab.id));
        }
        if self.student_count == 0 {
            errors.add("student_count", "Number of students must be positive");
        } else if self.student_count > lab.capacity {
            errors.add(
                "student_count",
                format!("Number of students exceeds lab capacity ({})", lab.capacity),
            );
        }
        let purpose = self.purpose.trim().chars().count();
        if purpose < Constants::MIN_PURPOSE_LENGTH {
            errors.add(
                "purpose",
                format!(
                    "Purpose must be at least {} characters",
                    Constants::MIN_PURPOSE_LENGTH
                ),
            );
        } else if purpose > Constants::MAX_PURPOSE_LENGTH {
            errors.add("purpose", "Purpose is too long");
        }
        if let Some(unknown) = self.equipment.iter().find(|e| !lab.has_equipment(e)) {
            errors.add(
                "equipment",
                format!("{} is not available in {}", unknown, lab.name),
            );
        }

        errors
    }

    pub fn into_request(self, id: i64, requested_on: DateTime<Utc>) -> ReservationRequest {
        ReservationRequest {
            id,
            submission_id: self.submission_id,
            requester_name: self.requester_name,
            requester_role: self.requester_role,
            lab_id: self.lab_id,
            lab_name: self.lab_name,
            date: self.date,
            time_slot: self.time_slot,
            course: self.course,
            purpose: self.purpose,
            student_count: self.student_count,
            equipment: self.equipment,
            additional_info: self.additional_info,
            status: RequestStatus::Pending,
            requested_on,
            decision_notes: None,
            rejection_reason: None,
            decided_by: None,
            decided_at: None,
        }
    }
}

/// Conditional status update; applied only if the stored status equals `expected`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub id: i64,
    pub expected: RequestStatus,
    pub new_status: RequestStatus,
    pub decision_notes: Option<String>,
    pub rejection_reason: Option<String>,
    pub decided_by: String,
    pub decided_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub actor: Actor,
    pub action_type: ActionType,
    pub details: String,
    pub severity: Severity,
    pub ip_address: String,
    pub device_info: String,
    pub target_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAuditEntry {
    pub timestamp: DateTime<Utc>,
    pub actor: Actor,
    pub action_type: ActionType,
    pub details: String,
    pub ip_address: String,
    pub device_info: String,
    pub target_id: Option<i64>,
}

impl NewAuditEntry {
    pub fn into_entry(self, id: i64) -> AuditLogEntry {
        AuditLogEntry {
            id,
            timestamp: self.timestamp,
            severity: self.action_type.severity(),
            actor: self.actor,
            action_type: self.action_type,
            details: self.details,
            ip_address: self.ip_address,
            device_info: self.device_info,
            target_id: self.target_id,
        }
    }
}
