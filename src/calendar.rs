use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{ReservationError, Result};
use crate::models::Lab;
use crate::time::{days_in_month, first_weekday_offset};

/// A `YYYY-MM` calendar month
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MonthKey {
    year: i32,
    month: u32,
}

impl MonthKey {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        if (1..=12).contains(&month) {
            Some(Self { year, month })
        } else {
            None
        }
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// Following month, rolling December over into January of the next year
    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// Preceding month, rolling January back into December of the previous year
    pub fn prev(&self) -> Self {
        if self.month == 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
    }

    pub fn days(&self) -> u32 {
        days_in_month(self.year, self.month)
    }

    pub fn date(&self, day: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, day)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for MonthKey {
    type Err = ReservationError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || ReservationError::InvalidValue(format!("invalid month key '{}'", s));
        let (year, month) = s.split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(invalid());
        }
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;
        MonthKey::new(year, month).ok_or_else(invalid)
    }
}

impl TryFrom<String> for MonthKey {
    type Error = ReservationError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<MonthKey> for String {
    fn from(key: MonthKey) -> Self {
        key.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DayStatus {
    Available,
    Booked,
    Unavailable,
    /// Caller-tracked overlay on top of an available day
    Selected,
}

/// Day numbers of one month split into the three availability classes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthAvailability {
    #[serde(default)]
    pub available: BTreeSet<u32>,
    #[serde(default)]
    pub booked: BTreeSet<u32>,
    #[serde(default)]
    pub unavailable: BTreeSet<u32>,
}

impl MonthAvailability {
    pub fn new(
        available: impl IntoIterator<Item = u32>,
        booked: impl IntoIterator<Item = u32>,
        unavailable: impl IntoIterator<Item = u32>,
    ) -> Self {
        Self {
            available: available.into_iter().collect(),
            booked: booked.into_iter().collect(),
            unavailable: unavailable.into_iter().collect(),
        }
    }

    /// Precedence when sets overlap: unavailable, then booked, then available
    pub fn classify(&self, day: u32) -> DayStatus {
        if self.unavailable.contains(&day) {
            DayStatus::Unavailable
        } else if self.booked.contains(&day) {
            DayStatus::Booked
        } else if self.available.contains(&day) {
            DayStatus::Available
        } else {
            DayStatus::Unavailable
        }
    }

    /// Checks that every day is within the month and no day sits in two sets
    pub fn validate(&self, month: MonthKey) -> Result<()> {
        let last = month.days();
        let all = self
            .available
            .iter()
            .chain(self.booked.iter())
            .chain(self.unavailable.iter());
        for day in all.clone() {
            if *day < 1 || *day > last {
                return Err(ReservationError::InvalidValue(format!(
                    "day {} is outside {}",
                    day, month
                )));
            }
        }

        let overlapping = self.available.intersection(&self.booked).next().is_some()
            || self.available.intersection(&self.unavailable).next().is_some()
            || self.booked.intersection(&self.unavailable).next().is_some();
        if overlapping {
            return Err(ReservationError::InvalidValue(format!(
                "availability sets overlap in {}",
                month
            )));
        }
        Ok(())
    }
}

/// Per-month availability of a lab
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CalendarAvailability {
    months: BTreeMap<MonthKey, MonthAvailability>,
}

impl CalendarAvailability {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_month(mut self, month: MonthKey, availability: MonthAvailability) -> Self {
        self.months.insert(month, availability);
        self
    }

    pub fn set_month(&mut self, month: MonthKey, availability: MonthAvailability) {
        self.months.insert(month, availability);
    }

    pub fn month(&self, month: MonthKey) -> Option<&MonthAvailability> {
        self.months.get(&month)
    }

    pub fn months(&self) -> impl Iterator<Item = (&MonthKey, &MonthAvailability)> {
        self.months.iter()
    }

    /// Days of a month absent from every set are unavailable
    pub fn classify(&self, month: MonthKey, day: u32) -> DayStatus {
        match self.months.get(&month) {
            Some(availability) => availability.classify(day),
            None => DayStatus::Unavailable,
        }
    }

    pub fn classify_date(&self, date: NaiveDate) -> DayStatus {
        self.classify(MonthKey::from_date(date), date.day())
    }

    pub fn validate(&self) -> Result<()> {
        for (month, availability) in &self.months {
            availability.validate(*month)?;
        }
        Ok(())
    }
}

pub fn classify(lab: &Lab, month: MonthKey, day: u32) -> DayStatus {
    lab.calendar.classify(month, day)
}

/// Classification with the caller's current selection layered over available days
pub fn classify_with_selection(
    lab: &Lab,
    month: MonthKey,
    day: u32,
    selected: &BTreeSet<NaiveDate>,
) -> DayStatus {
    let base = classify(lab, month, day);
    match (base, month.date(day)) {
        (DayStatus::Available, Some(date)) if selected.contains(&date) => DayStatus::Selected,
        _ => base,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarDay {
    pub date: NaiveDate,
    pub status: DayStatus,
}

impl CalendarDay {
    pub fn is_selectable(&self) -> bool {
        matches!(self.status, DayStatus::Available | DayStatus::Selected)
    }
}

/// One week row, Sunday first; `None` pads days outside the month
pub type CalendarWeek = [Option<CalendarDay>; 7];

/// Month grid for a lab with leading and trailing padding
pub fn month_grid(
    lab: &Lab,
    month: MonthKey,
    selected: &BTreeSet<NaiveDate>,
) -> Vec<CalendarWeek> {
    let offset = first_weekday_offset(month.year(), month.month()) as usize;
    let mut weeks = Vec::new();
    let mut week: CalendarWeek = [None; 7];
    let mut column = offset;

    for day in 1..=month.days() {
        if let Some(date) = month.date(day) {
            week[column] = Some(CalendarDay {
                date,
                status: classify_with_selection(lab, month, day, selected),
            });
        }
        column += 1;
        if column == 7 {
            weeks.push(week);
            week = [None; 7];
            column = 0;
        }
    }
    if column != 0 {
        weeks.push(week);
    }
    weeks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_month_key_parse_and_display() {
        let key: MonthKey = "2025-06".parse().unwrap();
        assert_eq!(key.year(), 2025);
        assert_eq!(key.month(), 6);
        assert_eq!(key.to_string(), "2025-06");
        assert!("2025-13".parse::<MonthKey>().is_err());
        assert!("2025-6".parse::<MonthKey>().is_err());
        assert!("june".parse::<MonthKey>().is_err());
    }

    #[test]
    fn test_month_navigation_wraps_years() {
        let december = MonthKey::new(2024, 12).unwrap();
        assert_eq!(december.next(), MonthKey::new(2025, 1).unwrap());

        let january = MonthKey::new(2025, 1).unwrap();
        assert_eq!(january.prev(), MonthKey::new(2024, 12).unwrap());
        assert_eq!(january.next().prev(), january);
    }

    #[test]
    fn test_overlap_precedence() {
        let month = MonthAvailability::new([1, 2, 3], [2, 3], [3]);
        assert_eq!(month.classify(1), DayStatus::Available);
        assert_eq!(month.classify(2), DayStatus::Booked);
        assert_eq!(month.classify(3), DayStatus::Unavailable);
        assert!(month.validate(MonthKey::new(2025, 6).unwrap()).is_err());
    }

    #[test]
    fn test_validate_rejects_days_outside_month() {
        let february = MonthKey::new(2025, 2).unwrap();
        assert!(MonthAvailability::new([28], [], []).validate(february).is_ok());
        assert!(MonthAvailability::new([29], [], []).validate(february).is_err());
        assert!(MonthAvailability::new([0], [], []).validate(february).is_err());
    }

    #[test]
    fn test_calendar_serializes_month_keys_as_strings() {
        let calendar = CalendarAvailability::new().with_month(
            MonthKey::new(2025, 6).unwrap(),
            MonthAvailability::new([1, 2], [3], [4]),
        );
        let json = serde_json::to_string(&calendar).unwrap();
        assert!(json.contains("\"2025-06\""));

        let parsed: CalendarAvailability = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, calendar);
    }
}
