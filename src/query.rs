//! Filter, sort and paginate pipeline shared by every list view.
//!
//! `query` is a pure function of its inputs. "Now" enters only through the
//! [`QueryContext`], so identical inputs always yield identical pages.

use std::cmp::Ordering;

use chrono::NaiveDate;
use chrono_tz::Tz;

use crate::constants::Constants;
use crate::error::{ReservationError, Result};
use crate::models::{
    ActionType, AuditLogEntry, RequestStatus, RequesterRole, ReservationRequest, Severity,
    UserRole,
};
use crate::time::{days_ago, local_date, months_ago, parse_date};
use crate::traits::Clock;

/// Evaluation-time inputs for relative date presets
#[derive(Debug, Clone, Copy)]
pub struct QueryContext {
    pub tz: Tz,
    pub today: NaiveDate,
}

impl QueryContext {
    pub fn new(tz: Tz, today: NaiveDate) -> Self {
        Self { tz, today }
    }

    pub fn from_clock(clock: &dyn Clock, tz: Tz) -> Self {
        Self {
            tz,
            today: clock.today(tz),
        }
    }
}

/// A record type the engine can filter, sort and page
pub trait Queryable: Clone {
    type Facet;
    type SortField: Copy + PartialEq;

    /// Tie-break key; ascending id keeps pages stable across re-queries
    fn record_id(&self) -> i64;

    /// Date used by date-range criteria
    fn record_date(&self, tz: Tz) -> NaiveDate;

    /// Fields searched by the free-text term
    fn search_fields(&self) -> Vec<&str>;

    fn matches_facet(&self, facet: &Self::Facet) -> bool;

    fn compare_by(&self, other: &Self, field: Self::SortField) -> Ordering;
}

/// Either no constraint, or exactly one value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector<T> {
    All,
    Only(T),
}

impl<T> Default for Selector<T> {
    fn default() -> Self {
        Selector::All
    }
}

impl<T: std::str::FromStr<Err = ReservationError>> Selector<T> {
    /// `"all"` and the empty string are inactive
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        if value.is_empty() || value.eq_ignore_ascii_case(Constants::FILTER_ALL) {
            Ok(Selector::All)
        } else {
            value.parse().map(Selector::Only)
        }
    }
}

impl<T> Selector<T> {
    pub fn into_option(self) -> Option<T> {
        match self {
            Selector::All => None,
            Selector::Only(value) => Some(value),
        }
    }
}

/// Inclusive date bounds; a missing side is open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateRange {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from.map_or(true, |from| date >= from) && self.to.map_or(true, |to| date <= to)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DatePreset {
    #[default]
    All,
    Today,
    Yesterday,
    /// The last seven days up to and including today
    Week,
    /// One calendar month back up to and including today
    Month,
    Custom(DateRange),
}

impl DatePreset {
    /// Parse a preset name; `custom` takes its bounds from `from` / `to`
    pub fn parse(name: &str, from: &str, to: &str) -> Result<Self> {
        let preset = match name.trim() {
            "" | "all" => DatePreset::All,
            "today" => DatePreset::Today,
            "yesterday" => DatePreset::Yesterday,
            "week" => DatePreset::Week,
            "month" => DatePreset::Month,
            "custom" => DatePreset::Custom(DateRange {
                from: parse_optional_date(from)?,
                to: parse_optional_date(to)?,
            }),
            other => {
                return Err(ReservationError::InvalidValue(format!(
                    "unknown date preset '{}'",
                    other
                )))
            }
        };
        Ok(preset)
    }

    /// Concrete range relative to `today`; `None` means inactive
    pub fn resolve(&self, today: NaiveDate) -> Option<DateRange> {
        match *self {
            DatePreset::All => None,
            DatePreset::Today => Some(DateRange {
                from: Some(today),
                to: Some(today),
            }),
            DatePreset::Yesterday => {
                let yesterday = days_ago(today, 1);
                Some(DateRange {
                    from: Some(yesterday),
                    to: Some(yesterday),
                })
            }
            DatePreset::Week => Some(DateRange {
                from: Some(days_ago(today, 7)),
                to: Some(today),
            }),
            DatePreset::Month => Some(DateRange {
                from: Some(months_ago(today, 1)),
                to: Some(today),
            }),
            DatePreset::Custom(range) if range.from.is_none() && range.to.is_none() => None,
            DatePreset::Custom(range) => Some(range),
        }
    }
}

fn parse_optional_date(value: &str) -> Result<Option<NaiveDate>> {
    if value.trim().is_empty() {
        return Ok(None);
    }
    parse_date(value)
        .map(Some)
        .ok_or_else(|| ReservationError::InvalidValue(format!("invalid date '{}'", value)))
}

/// Filter criteria; every active part must hold for a record to pass
#[derive(Debug, Clone, PartialEq)]
pub struct QueryCriteria<F> {
    pub search: String,
    pub facets: Vec<F>,
    pub dates: DatePreset,
}

impl<F> Default for QueryCriteria<F> {
    fn default() -> Self {
        Self {
            search: String::new(),
            facets: Vec::new(),
            dates: DatePreset::All,
        }
    }
}

impl<F> QueryCriteria<F> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn search(mut self, term: &str) -> Self {
        self.search = term.to_string();
        self
    }

    pub fn facet(mut self, facet: F) -> Self {
        self.facets.push(facet);
        self
    }

    /// Adds a facet only when the selector is active
    pub fn select<T>(mut self, selector: Selector<T>, to_facet: impl FnOnce(T) -> F) -> Self {
        if let Selector::Only(value) = selector {
            self.facets.push(to_facet(value));
        }
        self
    }

    pub fn dates(mut self, preset: DatePreset) -> Self {
        self.dates = preset;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn flipped(&self) -> Self {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec<S> {
    pub field: S,
    pub direction: SortDirection,
}

impl<S> SortSpec<S> {
    pub fn asc(field: S) -> Self {
        Self {
            field,
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: S) -> Self {
        Self {
            field,
            direction: SortDirection::Desc,
        }
    }
}

/// 1-based page request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: usize,
    pub page_size: usize,
}

impl PageRequest {
    pub fn new(page: usize, page_size: usize) -> Self {
        Self { page, page_size }
    }

    pub fn first(page_size: usize) -> Self {
        Self { page: 1, page_size }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryPage<T> {
    pub visible: Vec<T>,
    pub total_count: usize,
    pub total_pages: usize,
    /// Page actually served, after clamping
    pub page: usize,
}

impl<T> QueryPage<T> {
    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }
}

pub fn total_pages(total_count: usize, page_size: usize) -> usize {
    let page_size = page_size.max(1);
    ((total_count + page_size - 1) / page_size).max(1)
}

pub fn matches<T: Queryable>(
    record: &T,
    criteria: &QueryCriteria<T::Facet>,
    ctx: &QueryContext,
) -> bool {
    let term = criteria.search.trim().to_lowercase();
    if !term.is_empty()
        && !record
            .search_fields()
            .iter()
            .any(|field| field.to_lowercase().contains(&term))
    {
        return false;
    }

    if !criteria.facets.iter().all(|facet| record.matches_facet(facet)) {
        return false;
    }

    match criteria.dates.resolve(ctx.today) {
        Some(range) => range.contains(record.record_date(ctx.tz)),
        None => true,
    }
}

pub fn filter_records<T: Queryable>(
    records: &[T],
    criteria: &QueryCriteria<T::Facet>,
    ctx: &QueryContext,
) -> Vec<T> {
    records
        .iter()
        .filter(|r| matches(*r, criteria, ctx))
        .cloned()
        .collect()
}

/// Sorts in place; ties always fall back to ascending id regardless of direction
pub fn sort_records<T: Queryable>(records: &mut [T], sort: SortSpec<T::SortField>) {
    records.sort_by(|a, b| {
        let primary = match sort.direction {
            SortDirection::Asc => a.compare_by(b, sort.field),
            SortDirection::Desc => b.compare_by(a, sort.field),
        };
        primary.then_with(|| a.record_id().cmp(&b.record_id()))
    });
}

/// Slices one page, clamping the requested page into `1..=total_pages`
pub fn paginate<T: Clone>(records: &[T], page: PageRequest) -> QueryPage<T> {
    let page_size = page.page_size.max(1);
    let total_count = records.len();
    let total_pages = total_pages(total_count, page_size);
    let current = page.page.clamp(1, total_pages);
    let start = (current - 1) * page_size;
    let end = (start + page_size).min(total_count);
    let visible = if start < end {
        records[start..end].to_vec()
    } else {
        Vec::new()
    };

    QueryPage {
        visible,
        total_count,
        total_pages,
        page: current,
    }
}

pub fn query<T: Queryable>(
    records: &[T],
    criteria: &QueryCriteria<T::Facet>,
    sort: SortSpec<T::SortField>,
    page: PageRequest,
    ctx: &QueryContext,
) -> QueryPage<T> {
    let mut filtered = filter_records(records, criteria, ctx);
    sort_records(&mut filtered, sort);
    paginate(&filtered, page)
}

/// List view state: criteria, sort and current page.
/// Any change to criteria or sort puts the view back on page 1.
pub struct ListView<T: Queryable> {
    criteria: QueryCriteria<T::Facet>,
    sort: SortSpec<T::SortField>,
    page: usize,
    page_size: usize,
}

impl<T: Queryable> ListView<T> {
    pub fn new(default_sort: SortSpec<T::SortField>, page_size: usize) -> Self {
        Self {
            criteria: QueryCriteria::default(),
            sort: default_sort,
            page: 1,
            page_size: page_size.max(1),
        }
    }

    pub fn criteria(&self) -> &QueryCriteria<T::Facet> {
        &self.criteria
    }

    pub fn sort(&self) -> SortSpec<T::SortField> {
        self.sort
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn set_criteria(&mut self, criteria: QueryCriteria<T::Facet>) {
        self.criteria = criteria;
        self.page = 1;
    }

    pub fn set_search(&mut self, term: &str) {
        self.criteria.search = term.to_string();
        self.page = 1;
    }

    pub fn set_facets(&mut self, facets: Vec<T::Facet>) {
        self.criteria.facets = facets;
        self.page = 1;
    }

    pub fn set_dates(&mut self, preset: DatePreset) {
        self.criteria.dates = preset;
        self.page = 1;
    }

    pub fn set_sort(&mut self, sort: SortSpec<T::SortField>) {
        self.sort = sort;
        self.page = 1;
    }

    /// Column-header behaviour: same field flips direction, a new field starts ascending
    pub fn toggle_sort(&mut self, field: T::SortField) {
        self.sort = if self.sort.field == field {
            SortSpec {
                field,
                direction: self.sort.direction.flipped(),
            }
        } else {
            SortSpec::asc(field)
        };
        self.page = 1;
    }

    pub fn go_to(&mut self, page: usize) {
        self.page = page.max(1);
    }

    pub fn next_page(&mut self) {
        self.page += 1;
    }

    pub fn prev_page(&mut self) {
        self.page = self.page.saturating_sub(1).max(1);
    }

    /// Runs the pipeline and adopts the clamped page number
    pub fn run(&mut self, records: &[T], ctx: &QueryContext) -> QueryPage<T> {
        let result = query(
            records,
            &self.criteria,
            self.sort,
            PageRequest::new(self.page, self.page_size),
            ctx,
        );
        self.page = result.page;
        result
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestFacet {
    Status(RequestStatus),
    Role(RequesterRole),
    Lab(i64),
    Requester(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestSortField {
    RequestedOn,
    Date,
    RequesterName,
    LabName,
    Status,
}

impl Queryable for ReservationRequest {
    type Facet = RequestFacet;
    type SortField = RequestSortField;

    fn record_id(&self) -> i64 {
        self.id
    }

    fn record_date(&self, _tz: Tz) -> NaiveDate {
        self.date
    }

    fn search_fields(&self) -> Vec<&str> {
        vec![
            self.requester_name.as_str(),
            self.lab_name.as_str(),
            self.course.as_str(),
            self.purpose.as_str(),
        ]
    }

    fn matches_facet(&self, facet: &RequestFacet) -> bool {
        match facet {
            RequestFacet::Status(status) => self.status == *status,
            RequestFacet::Role(role) => self.requester_role == *role,
            RequestFacet::Lab(lab_id) => self.lab_id == *lab_id,
            RequestFacet::Requester(name) => self.requester_name == *name,
        }
    }

    fn compare_by(&self, other: &Self, field: RequestSortField) -> Ordering {
        match field {
            RequestSortField::RequestedOn => self.requested_on.cmp(&other.requested_on),
            RequestSortField::Date => (self.date, self.time_slot.start_hour())
                .cmp(&(other.date, other.time_slot.start_hour())),
            RequestSortField::RequesterName => self
                .requester_name
                .to_lowercase()
                .cmp(&other.requester_name.to_lowercase()),
            RequestSortField::LabName => self
                .lab_name
                .to_lowercase()
                .cmp(&other.lab_name.to_lowercase()),
            RequestSortField::Status => self.status.cmp(&other.status),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditFacet {
    Action(ActionType),
    Severity(Severity),
    ActorRole(UserRole),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditSortField {
    Timestamp,
    Severity,
    ActionType,
    Actor,
}

impl Queryable for AuditLogEntry {
    type Facet = AuditFacet;
    type SortField = AuditSortField;

    fn record_id(&self) -> i64 {
        self.id
    }

    fn record_date(&self, tz: Tz) -> NaiveDate {
        local_date(tz, self.timestamp)
    }

    fn search_fields(&self) -> Vec<&str> {
        vec![
            self.actor.name.as_str(),
            self.details.as_str(),
            self.ip_address.as_str(),
            self.device_info.as_str(),
        ]
    }

    fn matches_facet(&self, facet: &AuditFacet) -> bool {
        match facet {
            AuditFacet::Action(action) => self.action_type == *action,
            AuditFacet::Severity(severity) => self.severity == *severity,
            AuditFacet::ActorRole(role) => self.actor.role == *role,
        }
    }

    fn compare_by(&self, other: &Self, field: AuditSortField) -> Ordering {
        match field {
            AuditSortField::Timestamp => self.timestamp.cmp(&other.timestamp),
            AuditSortField::Severity => self.severity.cmp(&other.severity),
            AuditSortField::ActionType => {
                self.action_type.as_str().cmp(other.action_type.as_str())
            }
            AuditSortField::Actor => self
                .actor
                .name
                .to_lowercase()
                .cmp(&other.actor.name.to_lowercase()),
        }
    }
}

pub type RequestView = ListView<ReservationRequest>;
pub type AuditView = ListView<AuditLogEntry>;

impl RequestView {
    /// Newest requests first
    pub fn for_requests(page_size: usize) -> Self {
        ListView::new(SortSpec::desc(RequestSortField::RequestedOn), page_size)
    }
}

impl AuditView {
    pub fn for_audit_log(page_size: usize) -> Self {
        ListView::new(SortSpec::desc(AuditSortField::Timestamp), page_size)
    }
}
