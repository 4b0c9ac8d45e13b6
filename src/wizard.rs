//! Three-step reservation flow: pick a lab, pick dates and a slot, fill in details.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use tracing::debug;
use uuid::Uuid;

use crate::calendar::{month_grid, CalendarWeek, DayStatus, MonthKey};
use crate::constants::{is_known_course, Constants};
use crate::error::{ReservationError, Result, ValidationErrors};
use crate::labs::search_labs;
use crate::models::{Lab, NewReservation, Requester, TimeSlot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WizardStep {
    SelectLab,
    SelectDateTime,
    Details,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeSelectionMode {
    /// One date from the lab's offered dates, then one of its slots
    SingleDay,
    /// Several available calendar days sharing one slot
    Calendar,
}

/// Raw detail form input, validated as a whole on submit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetailForm {
    pub course: String,
    pub student_count: String,
    pub purpose: String,
    pub equipment: BTreeSet<String>,
    pub additional_info: String,
}

impl DetailForm {
    /// Every failing field is reported, not only the first
    pub fn validate(&self, lab: &Lab) -> ValidationErrors {
        let mut errors = ValidationErrors::new();

        let course = self.course.trim();
        if course.is_empty() {
            errors.add("course", "Course is required");
        } else if !is_known_course(course) {
            errors.add("course", "Unknown course");
        }

        match self.student_count.trim() {
            "" => errors.add("student_count", "Number of students is required"),
            raw => match raw.parse::<i64>() {
                Err(_) => errors.add(
                    "student_count",
                    "Number of students must be a whole number",
                ),
                Ok(n) if n <= 0 => {
                    errors.add("student_count", "Number of students must be positive")
                }
                Ok(n) if n > i64::from(lab.capacity) => errors.add(
                    "student_count",
                    format!("Number of students exceeds lab capacity ({})", lab.capacity),
                ),
                Ok(_) => {}
            },
        }

        let purpose = self.purpose.trim();
        if purpose.is_empty() {
            errors.add("purpose", "Purpose is required");
        } else if purpose.chars().count() < Constants::MIN_PURPOSE_LENGTH {
            errors.add(
                "purpose",
                format!(
                    "Purpose must be at least {} characters",
                    Constants::MIN_PURPOSE_LENGTH
                ),
            );
        } else if purpose.chars().count() > Constants::MAX_PURPOSE_LENGTH {
            errors.add("purpose", "Purpose is too long");
        }

        if let Some(unknown) = self.equipment.iter().find(|e| !lab.has_equipment(e)) {
            errors.add(
                "equipment",
                format!("{} is not available in {}", unknown, lab.name),
            );
        }

        if self.additional_info.chars().count() > Constants::MAX_ADDITIONAL_INFO_LENGTH {
            errors.add("additional_info", "Additional information is too long");
        }

        errors
    }
}

#[derive(Debug, Clone)]
pub struct ReservationWizard {
    requester: Requester,
    step: WizardStep,
    lab_search: String,
    lab: Option<Lab>,
    mode: TimeSelectionMode,
    single_date: Option<NaiveDate>,
    single_slot: Option<TimeSlot>,
    calendar_month: MonthKey,
    calendar_dates: BTreeSet<NaiveDate>,
    calendar_slot: Option<TimeSlot>,
    details: DetailForm,
    errors: ValidationErrors,
    in_flight: bool,
    today: NaiveDate,
}

impl ReservationWizard {
    pub fn new(requester: Requester, today: NaiveDate) -> Self {
        let month = MonthKey::from_date(today);
        Self {
            requester,
            step: WizardStep::SelectLab,
            lab_search: String::new(),
            lab: None,
            mode: TimeSelectionMode::SingleDay,
            single_date: None,
            single_slot: None,
            calendar_month: month,
            calendar_dates: BTreeSet::new(),
            calendar_slot: None,
            details: DetailForm::default(),
            errors: ValidationErrors::new(),
            in_flight: false,
            today,
        }
    }

    pub fn step(&self) -> WizardStep {
        self.step
    }

    pub fn requester(&self) -> &Requester {
        &self.requester
    }

    pub fn lab(&self) -> Option<&Lab> {
        self.lab.as_ref()
    }

    pub fn mode(&self) -> TimeSelectionMode {
        self.mode
    }

    pub fn errors(&self) -> &ValidationErrors {
        &self.errors
    }

    pub fn is_submitting(&self) -> bool {
        self.in_flight
    }

    pub fn set_lab_search(&mut self, term: &str) {
        self.lab_search = term.to_string();
    }

    /// Labs whose name or description contains the search term, ignoring case
    pub fn filter_labs<'a>(&self, labs: &'a [Lab]) -> Vec<&'a Lab> {
        search_labs(labs, &self.lab_search)
    }

    /// Selecting a lab that is not available leaves the wizard unchanged
    pub fn select_lab(&mut self, lab: &Lab) -> bool {
        if self.step != WizardStep::SelectLab || !lab.is_available() {
            return false;
        }
        if self.lab.as_ref().map(|l| l.id) != Some(lab.id) {
            self.clear_date_time();
        }
        self.lab = Some(lab.clone());
        true
    }

    /// Advance one step if the current step is complete
    pub fn next(&mut self) -> Result<WizardStep> {
        let mut errors = ValidationErrors::new();
        match self.step {
            WizardStep::SelectLab => {
                if self.lab.is_none() {
                    errors.add("lab", "Select an available lab");
                }
                errors.into_result()?;
                self.step = WizardStep::SelectDateTime;
            }
            WizardStep::SelectDateTime => {
                match self.mode {
                    TimeSelectionMode::SingleDay => {
                        if self.single_date.is_none() {
                            errors.add("date", "Select a date");
                        }
                        if self.single_slot.is_none() {
                            errors.add("time_slot", "Select a time slot");
                        }
                    }
                    TimeSelectionMode::Calendar => {
                        if self.calendar_dates.is_empty() {
                            errors.add("dates", "Select at least one date");
                        }
                        if self.calendar_slot.is_none() {
                            errors.add("time_slot", "Select a time slot");
                        }
                    }
                }
                errors.into_result()?;
                self.step = WizardStep::Details;
            }
            WizardStep::Details => {}
        }
        Ok(self.step)
    }

    /// Going back to lab selection drops the lab and every date/time choice;
    /// going back from details keeps the lab but drops date/time choices.
    pub fn back(&mut self) -> WizardStep {
        match self.step {
            WizardStep::SelectLab => {}
            WizardStep::SelectDateTime => {
                self.lab = None;
                self.clear_date_time();
                self.step = WizardStep::SelectLab;
            }
            WizardStep::Details => {
                self.clear_date_time();
                self.step = WizardStep::SelectDateTime;
            }
        }
        self.errors = ValidationErrors::new();
        self.step
    }

    fn clear_date_time(&mut self) {
        self.single_date = None;
        self.single_slot = None;
        self.calendar_dates.clear();
        self.calendar_slot = None;
    }

    /// Switching modes discards every selection made in either mode
    pub fn set_mode(&mut self, mode: TimeSelectionMode) {
        if self.mode != mode {
            self.clear_date_time();
            self.mode = mode;
        }
    }

    fn require_lab(&self) -> Result<&Lab> {
        self.lab.as_ref().ok_or_else(|| {
            let mut errors = ValidationErrors::new();
            errors.add("lab", "Select an available lab");
            ReservationError::Validation(errors)
        })
    }

    fn field_error(field: &str, message: &str) -> ReservationError {
        let mut errors = ValidationErrors::new();
        errors.add(field, message);
        ReservationError::Validation(errors)
    }

    /// Dates offered by the lab in single-day mode
    pub fn offered_dates(&self) -> Vec<NaiveDate> {
        self.lab
            .as_ref()
            .map(|lab| lab.available_times.iter().map(|t| t.date).collect())
            .unwrap_or_default()
    }

    pub fn choose_date(&mut self, date: NaiveDate) -> Result<()> {
        if self.mode != TimeSelectionMode::SingleDay {
            return Err(Self::field_error("date", "Single-day mode is not active"));
        }
        let lab = self.require_lab()?;
        if lab.slots_on(date).is_none() {
            return Err(Self::field_error("date", "The lab is not offered on this date"));
        }
        if self.single_date != Some(date) {
            self.single_slot = None;
        }
        self.single_date = Some(date);
        Ok(())
    }

    /// Slots open on the chosen single-day date
    pub fn offered_slots(&self) -> Vec<TimeSlot> {
        match (&self.lab, self.single_date) {
            (Some(lab), Some(date)) => lab
                .slots_on(date)
                .map(<[TimeSlot]>::to_vec)
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    pub fn choose_slot(&mut self, slot: TimeSlot) -> Result<()> {
        if self.mode != TimeSelectionMode::SingleDay {
            return Err(Self::field_error("time_slot", "Single-day mode is not active"));
        }
        if self.single_date.is_none() {
            return Err(Self::field_error("date", "Select a date first"));
        }
        if !self.offered_slots().contains(&slot) {
            return Err(Self::field_error(
                "time_slot",
                "This slot is not offered on the chosen date",
            ));
        }
        self.single_slot = Some(slot);
        Ok(())
    }

    pub fn calendar_month(&self) -> MonthKey {
        self.calendar_month
    }

    pub fn next_month(&mut self) -> MonthKey {
        self.calendar_month = self.calendar_month.next();
        self.calendar_month
    }

    pub fn prev_month(&mut self) -> MonthKey {
        self.calendar_month = self.calendar_month.prev();
        self.calendar_month
    }

    pub fn calendar_grid(&self) -> Vec<CalendarWeek> {
        match &self.lab {
            Some(lab) => month_grid(lab, self.calendar_month, &self.calendar_dates),
            None => Vec::new(),
        }
    }

    /// Adds or removes a day from the multi-date selection; only available days toggle
    pub fn toggle_calendar_date(&mut self, date: NaiveDate) -> bool {
        if self.mode != TimeSelectionMode::Calendar {
            return false;
        }
        let Some(lab) = &self.lab else {
            return false;
        };
        if lab.calendar.classify_date(date) != DayStatus::Available {
            return false;
        }
        if !self.calendar_dates.remove(&date) {
            self.calendar_dates.insert(date);
        }
        true
    }

    pub fn choose_calendar_slot(&mut self, slot: TimeSlot) -> Result<()> {
        if self.mode != TimeSelectionMode::Calendar {
            return Err(Self::field_error("time_slot", "Calendar mode is not active"));
        }
        self.calendar_slot = Some(slot);
        Ok(())
    }

    /// Dates the submission will cover, in order
    pub fn selected_dates(&self) -> Vec<NaiveDate> {
        match self.mode {
            TimeSelectionMode::SingleDay => self.single_date.into_iter().collect(),
            TimeSelectionMode::Calendar => self.calendar_dates.iter().copied().collect(),
        }
    }

    pub fn selected_slot(&self) -> Option<TimeSlot> {
        match self.mode {
            TimeSelectionMode::SingleDay => self.single_slot,
            TimeSelectionMode::Calendar => self.calendar_slot,
        }
    }

    pub fn details(&self) -> &DetailForm {
        &self.details
    }

    pub fn details_mut(&mut self) -> &mut DetailForm {
        &mut self.details
    }

    /// Validates the form and marks the wizard as submitting.
    /// Returns one record per selected date; fails while a submission is in flight.
    pub fn begin_submission(&mut self) -> Result<Vec<NewReservation>> {
        if self.in_flight {
            return Err(ReservationError::SubmissionInFlight);
        }
        if self.step != WizardStep::Details {
            return Err(Self::field_error("step", "Complete the previous steps first"));
        }

        let lab = self.require_lab()?.clone();
        let errors = self.details.validate(&lab);
        self.errors = errors.clone();
        errors.into_result()?;

        let slot = self
            .selected_slot()
            .ok_or_else(|| Self::field_error("time_slot", "Select a time slot"))?;
        let dates = self.selected_dates();
        if dates.is_empty() {
            return Err(Self::field_error("dates", "Select at least one date"));
        }

        let student_count: u32 = self
            .details
            .student_count
            .trim()
            .parse()
            .map_err(|_| Self::field_error("student_count", "Invalid number of students"))?;
        let additional_info = Some(self.details.additional_info.trim().to_string())
            .filter(|s| !s.is_empty());
        let submission_id = Uuid::new_v4();

        let records = dates
            .into_iter()
            .map(|date| NewReservation {
                submission_id,
                requester_name: self.requester.name.clone(),
                requester_role: self.requester.role,
                lab_id: lab.id,
                lab_name: lab.name.clone(),
                date,
                time_slot: slot,
                course: self.details.course.trim().to_string(),
                purpose: self.details.purpose.trim().to_string(),
                student_count,
                equipment: self.details.equipment.clone(),
                additional_info: additional_info.clone(),
            })
            .collect::<Vec<_>>();

        self.in_flight = true;
        debug!(
            "Submission {} prepared with {} record(s)",
            submission_id,
            records.len()
        );
        Ok(records)
    }

    /// Ends an in-flight submission; on success the wizard starts over
    pub fn finish_submission(&mut self, succeeded: bool) {
        self.in_flight = false;
        if succeeded {
            *self = Self::new(self.requester.clone(), self.today);
        }
    }
}
