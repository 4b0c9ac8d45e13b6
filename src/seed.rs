use chrono::{Datelike, Duration, NaiveDate, Weekday};
use tracing::info;

use crate::audit::AuditRecorder;
use crate::calendar::{CalendarAvailability, MonthAvailability, MonthKey};
use crate::error::Result;
use crate::models::{
    ActionType, AvailableTime, Lab, LabStatus, NewLab, NewReservation, RequesterRole, TimeSlot,
};
use crate::traits::{AuditSink, Clock, LabCatalog, ReservationStore};

/// Month calendar starting at `today`: every weekday from today on is
/// available except every fifth day, which is booked; weekends are absent.
fn rolling_calendar(today: NaiveDate, months: u32) -> CalendarAvailability {
    let mut calendar = CalendarAvailability::new();
    let mut month = MonthKey::from_date(today);
    for _ in 0..months {
        let mut availability = MonthAvailability::default();
        for day in 1..=month.days() {
            let Some(date) = month.date(day) else {
                continue;
            };
            if date < today {
                availability.unavailable.insert(day);
            } else if matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
                continue;
            } else if day % 5 == 0 {
                availability.booked.insert(day);
            } else {
                availability.available.insert(day);
            }
        }
        calendar.set_month(month, availability);
        month = month.next();
    }
    calendar
}

fn offered_times(today: NaiveDate, days: i64) -> Vec<AvailableTime> {
    (1..=days)
        .map(|offset| AvailableTime {
            date: today + Duration::days(offset),
            slots: if offset % 2 == 0 {
                TimeSlot::ALL.to_vec()
            } else {
                vec![TimeSlot::Morning, TimeSlot::Afternoon]
            },
        })
        .collect()
}

pub fn sample_labs(today: NaiveDate) -> Vec<NewLab> {
    vec![
        NewLab {
            name: "Computer Lab A".to_string(),
            capacity: 40,
            location: "Engineering Building, Room 101".to_string(),
            description: "General purpose computing lab with workstations".to_string(),
            equipment: vec![
                "Projector".to_string(),
                "Whiteboard".to_string(),
                "Workstations".to_string(),
            ],
            status: LabStatus::Available,
            available_times: offered_times(today, 5),
            calendar: rolling_calendar(today, 2),
        },
        NewLab {
            name: "Electronics Lab".to_string(),
            capacity: 24,
            location: "Engineering Building, Room 214".to_string(),
            description: "Oscilloscopes, signal generators and soldering stations".to_string(),
            equipment: vec![
                "Oscilloscope".to_string(),
                "Signal Generator".to_string(),
                "Soldering Station".to_string(),
            ],
            status: LabStatus::Available,
            available_times: offered_times(today, 3),
            calendar: rolling_calendar(today, 2),
        },
        NewLab {
            name: "Chemistry Lab".to_string(),
            capacity: 30,
            location: "Science Building, Room 310".to_string(),
            description: "Wet lab with fume hoods".to_string(),
            equipment: vec!["Fume Hood".to_string(), "Centrifuge".to_string()],
            status: LabStatus::UnderMaintenance,
            available_times: Vec::new(),
            calendar: CalendarAvailability::new(),
        },
    ]
}

fn sample_request(
    lab: &Lab,
    requester: &str,
    role: RequesterRole,
    date: NaiveDate,
    slot: TimeSlot,
) -> NewReservation {
    NewReservation {
        submission_id: uuid::Uuid::new_v4(),
        requester_name: requester.to_string(),
        requester_role: role,
        lab_id: lab.id,
        lab_name: lab.name.clone(),
        date,
        time_slot: slot,
        course: "CS201 - Data Structures".to_string(),
        purpose: "Weekly practical session for the course".to_string(),
        student_count: lab.capacity.min(20),
        equipment: lab.equipment.iter().take(1).cloned().collect(),
        additional_info: None,
    }
}

/// Seeds sample labs and requests into empty stores
pub async fn seed_if_empty(
    labs: &dyn LabCatalog,
    store: &dyn ReservationStore,
    audit: &dyn AuditSink,
    clock: &dyn Clock,
    recorder: &AuditRecorder,
    today: NaiveDate,
) -> Result<bool> {
    if !labs.list_labs().await?.is_empty() {
        return Ok(false);
    }

    let mut created = Vec::new();
    for new_lab in sample_labs(today) {
        let lab = labs.create_lab(new_lab).await?;
        audit
            .append(recorder.entry(
                ActionType::LabCreated,
                format!("Created lab {}", lab.name),
                Some(lab.id),
                clock.now_utc(),
            ))
            .await?;
        created.push(lab);
    }

    let requests: Vec<NewReservation> = created
        .iter()
        .filter(|lab| lab.is_available())
        .flat_map(|lab| {
            lab.available_times.iter().take(2).filter_map(move |t| {
                t.slots.first().map(|slot| {
                    sample_request(lab, "Aiko Tanaka", RequesterRole::Student, t.date, *slot)
                })
            })
        })
        .collect();
    let count = requests.len();
    store
        .create_requests(requests, clock.now_utc(), recorder)
        .await?;

    info!("Seeded {} labs and {} requests", created.len(), count);
    Ok(true)
}
