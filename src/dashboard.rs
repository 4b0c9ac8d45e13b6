use crate::models::{AuditLogEntry, Lab, RequestStatus, ReservationRequest, Requester};
use crate::query::{
    query, sort_records, AuditSortField, PageRequest, QueryContext, QueryCriteria, QueryPage,
    RequestFacet, RequestSortField, SortSpec,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
    pub cancelled: usize,
}

impl StatusCounts {
    pub fn tally<'a>(requests: impl IntoIterator<Item = &'a ReservationRequest>) -> Self {
        let mut counts = Self::default();
        for request in requests {
            match request.status {
                RequestStatus::Pending => counts.pending += 1,
                RequestStatus::Approved => counts.approved += 1,
                RequestStatus::Rejected => counts.rejected += 1,
                RequestStatus::Cancelled => counts.cancelled += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.pending + self.approved + self.rejected + self.cancelled
    }
}

#[derive(Debug, Clone)]
pub struct AdminDashboard {
    pub counts: StatusCounts,
    pub labs_total: usize,
    pub labs_available: usize,
    pub todays_sessions: Vec<ReservationRequest>,
    pub recent_activity: Vec<AuditLogEntry>,
}

#[derive(Debug, Clone)]
pub struct RequesterDashboard {
    pub counts: StatusCounts,
    pub upcoming_sessions: Vec<ReservationRequest>,
    pub pending_requests: Vec<ReservationRequest>,
}

/// Approved sessions from today onwards, earliest first
pub fn approved_sessions(
    requests: &[ReservationRequest],
    ctx: &QueryContext,
) -> Vec<ReservationRequest> {
    let mut sessions: Vec<ReservationRequest> = requests
        .iter()
        .filter(|r| r.status == RequestStatus::Approved && r.date >= ctx.today)
        .cloned()
        .collect();
    sort_records(&mut sessions, SortSpec::asc(RequestSortField::Date));
    sessions
}

pub fn admin_dashboard(
    requests: &[ReservationRequest],
    labs: &[Lab],
    audit: &[AuditLogEntry],
    ctx: &QueryContext,
    recent_limit: usize,
) -> AdminDashboard {
    let todays_sessions = approved_sessions(requests, ctx)
        .into_iter()
        .filter(|r| r.date == ctx.today)
        .collect();

    let mut recent_activity = audit.to_vec();
    sort_records(&mut recent_activity, SortSpec::desc(AuditSortField::Timestamp));
    recent_activity.truncate(recent_limit);

    AdminDashboard {
        counts: StatusCounts::tally(requests),
        labs_total: labs.len(),
        labs_available: labs.iter().filter(|l| l.is_available()).count(),
        todays_sessions,
        recent_activity,
    }
}

pub fn requester_dashboard(
    requests: &[ReservationRequest],
    requester: &Requester,
    ctx: &QueryContext,
) -> RequesterDashboard {
    let own: Vec<ReservationRequest> = requests
        .iter()
        .filter(|r| r.requester_name == requester.name)
        .cloned()
        .collect();

    let mut pending_requests: Vec<ReservationRequest> = own
        .iter()
        .filter(|r| r.status == RequestStatus::Pending)
        .cloned()
        .collect();
    sort_records(&mut pending_requests, SortSpec::desc(RequestSortField::RequestedOn));

    RequesterDashboard {
        counts: StatusCounts::tally(&own),
        upcoming_sessions: approved_sessions(&own, ctx),
        pending_requests,
    }
}

/// The requester's own reservations through the shared query pipeline
pub fn my_reservations(
    requests: &[ReservationRequest],
    requester: &Requester,
    criteria: QueryCriteria<RequestFacet>,
    sort: SortSpec<RequestSortField>,
    page: PageRequest,
    ctx: &QueryContext,
) -> QueryPage<ReservationRequest> {
    let criteria = criteria.facet(RequestFacet::Requester(requester.name.clone()));
    query(requests, &criteria, sort, page, ctx)
}
