use anyhow::Result;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use lab_reservation::models::*;
use lab_reservation::query::*;
use lab_reservation::traits::{AuditSink, ReservationStore};

mod common;
use common::*;

/// Twelve requests across two labs, two requesters and all statuses
async fn seeded_requests(ctx: &TestContext) -> Result<Vec<ReservationRequest>> {
    let chem = LabBuilder::new("Chemistry Lab").build(&*ctx.store).await?;
    let comp = LabBuilder::new("Computer Lab A").build(&*ctx.store).await?;
    let statuses = [
        RequestStatus::Pending,
        RequestStatus::Approved,
        RequestStatus::Rejected,
        RequestStatus::Cancelled,
    ];

    for i in 0..12i64 {
        let lab = if i % 2 == 0 { &chem } else { &comp };
        let requester = if i % 3 == 0 { lecturer() } else { student() };
        let slot = TimeSlot::ALL[(i as usize) % TimeSlot::ALL.len()];
        RequestBuilder::new(lab, &requester, date(2025, 6, 1 + (i as u32 % 5)))
            .with_slot(slot)
            .with_status(statuses[(i as usize) % statuses.len()])
            .with_purpose(if i == 7 { "Titration practical" } else { "Routine session" })
            // Pairs share a timestamp to exercise the id tie-break
            .requested_on(default_now() - Duration::hours(i / 2))
            .build(&*ctx.store)
            .await?;
    }

    Ok(ctx.store.list_requests().await?)
}

fn query_ctx() -> QueryContext {
    QueryContext::new(TZ, date(2025, 6, 10))
}

#[tokio::test]
async fn test_filter_returns_exact_matching_subset() -> Result<()> {
    let ctx = TestContext::new();
    let records = seeded_requests(&ctx).await?;
    let qctx = query_ctx();

    let criteria = QueryCriteria::new()
        .facet(RequestFacet::Status(RequestStatus::Pending))
        .facet(RequestFacet::Role(RequesterRole::Student));
    let filtered = filter_records(&records, &criteria, &qctx);

    let expected: Vec<i64> = records
        .iter()
        .filter(|r| {
            r.status == RequestStatus::Pending && r.requester_role == RequesterRole::Student
        })
        .map(|r| r.id)
        .collect();
    let mut got: Vec<i64> = filtered.iter().map(|r| r.id).collect();
    got.sort();
    assert_eq!(got, expected);
    assert!(filtered.iter().all(|r| records.contains(r)));

    Ok(())
}

#[tokio::test]
async fn test_search_is_case_insensitive_across_fields() -> Result<()> {
    let ctx = TestContext::new();
    let records = seeded_requests(&ctx).await?;
    let qctx = query_ctx();

    let by_purpose = filter_records(&records, &QueryCriteria::new().search("TITRATION"), &qctx);
    assert_eq!(by_purpose.len(), 1);
    assert_eq!(by_purpose[0].purpose, "Titration practical");

    let by_lab = filter_records(&records, &QueryCriteria::new().search("computer"), &qctx);
    assert_eq!(by_lab.len(), 6);

    let by_requester = filter_records(&records, &QueryCriteria::new().search("kato"), &qctx);
    assert_eq!(by_requester.len(), 4);

    let none = filter_records(&records, &QueryCriteria::new().search("astronomy"), &qctx);
    assert!(none.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_sort_is_total_with_id_tie_break() -> Result<()> {
    let ctx = TestContext::new();
    let records = seeded_requests(&ctx).await?;

    for direction in [SortDirection::Asc, SortDirection::Desc] {
        let spec = SortSpec {
            field: RequestSortField::RequestedOn,
            direction,
        };
        let mut first = records.clone();
        sort_records(&mut first, spec);
        let mut reversed_input: Vec<_> = records.iter().rev().cloned().collect();
        sort_records(&mut reversed_input, spec);

        // Input order never leaks into the result
        assert_eq!(first, reversed_input);

        for pair in first.windows(2) {
            if pair[0].requested_on == pair[1].requested_on {
                assert!(pair[0].id < pair[1].id);
            }
        }
    }

    Ok(())
}

#[tokio::test]
async fn test_pages_partition_the_result() -> Result<()> {
    let ctx = TestContext::new();
    let records = seeded_requests(&ctx).await?;
    let qctx = query_ctx();
    let criteria = QueryCriteria::new();
    let sort = SortSpec::desc(RequestSortField::RequestedOn);

    let first = query(&records, &criteria, sort, PageRequest::first(5), &qctx);
    assert_eq!(first.total_count, 12);
    assert_eq!(first.total_pages, 3);

    let mut seen = Vec::new();
    for page in 1..=first.total_pages {
        let result = query(&records, &criteria, sort, PageRequest::new(page, 5), &qctx);
        assert_eq!(result.page, page);
        seen.extend(result.visible.iter().map(|r| r.id));
    }
    assert_eq!(seen.len(), 12);

    let mut all = records.clone();
    sort_records(&mut all, sort);
    assert_eq!(seen, all.iter().map(|r| r.id).collect::<Vec<_>>());

    Ok(())
}

#[tokio::test]
async fn test_date_filter_uses_reservation_date() -> Result<()> {
    let ctx = TestContext::new();
    let records = seeded_requests(&ctx).await?;
    let qctx = query_ctx();

    let custom = DatePreset::parse("custom", "2025-06-02", "2025-06-03")?;
    let filtered = filter_records(&records, &QueryCriteria::new().dates(custom), &qctx);
    assert!(!filtered.is_empty());
    assert!(filtered
        .iter()
        .all(|r| r.date >= date(2025, 6, 2) && r.date <= date(2025, 6, 3)));

    // Only reservations on or after 2025-06-03 fall within the last week
    let week = filter_records(&records, &QueryCriteria::new().dates(DatePreset::Week), &qctx);
    assert!(week.iter().all(|r| r.date >= date(2025, 6, 3)));

    assert!(DatePreset::parse("custom", "not-a-date", "").is_err());
    assert!(DatePreset::parse("decade", "", "").is_err());

    Ok(())
}

#[tokio::test]
async fn test_list_view_resets_page_on_change() -> Result<()> {
    let ctx = TestContext::new();
    let records = seeded_requests(&ctx).await?;
    let qctx = query_ctx();

    let mut view = RequestView::for_requests(5);
    view.go_to(3);
    assert_eq!(view.run(&records, &qctx).page, 3);

    view.set_search("lab");
    assert_eq!(view.page(), 1);

    view.go_to(2);
    view.toggle_sort(RequestSortField::RequestedOn);
    assert_eq!(view.page(), 1);
    assert_eq!(view.sort().direction, SortDirection::Asc);

    view.toggle_sort(RequestSortField::LabName);
    assert_eq!(view.sort(), SortSpec::asc(RequestSortField::LabName));

    // Past the end clamps to the last page
    view.go_to(99);
    let page = view.run(&records, &qctx);
    assert_eq!(page.page, 3);
    assert_eq!(view.page(), 3);
    assert_eq!(page.visible.len(), 2);

    view.set_facets(vec![RequestFacet::Status(RequestStatus::Approved)]);
    let page = view.run(&records, &qctx);
    assert_eq!(page.page, 1);
    assert_eq!(page.total_count, 3);

    Ok(())
}

#[tokio::test]
async fn test_selector_builds_facets() -> Result<()> {
    let ctx = TestContext::new();
    let records = seeded_requests(&ctx).await?;
    let qctx = query_ctx();

    let criteria = QueryCriteria::new()
        .select(Selector::<RequestStatus>::parse("all")?, RequestFacet::Status)
        .select(Selector::<RequesterRole>::parse("Lecturer")?, RequestFacet::Role);
    assert_eq!(criteria.facets.len(), 1);

    let page = query(
        &records,
        &criteria,
        SortSpec::asc(RequestSortField::Date),
        PageRequest::first(20),
        &qctx,
    );
    assert_eq!(page.total_count, 4);
    assert!(page
        .visible
        .iter()
        .all(|r| r.requester_role == RequesterRole::Lecturer));

    Ok(())
}

#[tokio::test]
async fn test_audit_log_query() -> Result<()> {
    let ctx = TestContext::new();
    let lab = LabBuilder::new("Computer Lab A").build(&*ctx.store).await?;
    let recorder = admin_recorder();
    let base: DateTime<Utc> = default_now();

    let actions = [
        ActionType::Login,
        ActionType::ReservationApproved,
        ActionType::LabStatusChanged,
        ActionType::Logout,
    ];
    for (i, action) in actions.iter().enumerate() {
        ctx.store
            .append(recorder.entry(
                *action,
                format!("Entry {}", i),
                Some(lab.id),
                base - Duration::days(i as i64 * 3),
            ))
            .await?;
    }
    let entries = ctx.store.list_entries().await?;
    let qctx = query_ctx();

    let high = query(
        &entries,
        &QueryCriteria::new().facet(AuditFacet::Severity(Severity::High)),
        SortSpec::desc(AuditSortField::Timestamp),
        PageRequest::first(15),
        &qctx,
    );
    assert_eq!(high.total_count, 1);
    assert_eq!(high.visible[0].action_type, ActionType::LabStatusChanged);

    let mut view = AuditView::for_audit_log(2);
    view.set_dates(DatePreset::Week);
    let page = view.run(&entries, &qctx);
    // Entries 0, 3 and 6 days old fall in the last week
    assert_eq!(page.total_count, 3);
    assert_eq!(page.total_pages, 2);
    assert_eq!(page.visible[0].details, "Entry 0");

    let by_ip = filter_records(&entries, &QueryCriteria::new().search("192.168"), &qctx);
    assert_eq!(by_ip.len(), 4);

    Ok(())
}

/// Date presets paired with the inclusive window each covers on 2025-06-10
fn preset_windows() -> Vec<(DatePreset, Option<NaiveDate>, Option<NaiveDate>)> {
    let custom = |from: Option<NaiveDate>, to: Option<NaiveDate>| {
        DatePreset::Custom(DateRange { from, to })
    };
    vec![
        (DatePreset::All, None, None),
        (DatePreset::Today, Some(date(2025, 6, 10)), Some(date(2025, 6, 10))),
        (DatePreset::Yesterday, Some(date(2025, 6, 9)), Some(date(2025, 6, 9))),
        (DatePreset::Week, Some(date(2025, 6, 3)), Some(date(2025, 6, 10))),
        (DatePreset::Month, Some(date(2025, 5, 10)), Some(date(2025, 6, 10))),
        (
            custom(Some(date(2025, 5, 20)), Some(date(2025, 5, 31))),
            Some(date(2025, 5, 20)),
            Some(date(2025, 5, 31)),
        ),
        (custom(Some(date(2025, 6, 8)), None), Some(date(2025, 6, 8)), None),
        (custom(None, Some(date(2025, 5, 3))), None, Some(date(2025, 5, 3))),
        (custom(None, None), None, None),
    ]
}

fn within(day: NaiveDate, from: Option<NaiveDate>, to: Option<NaiveDate>) -> bool {
    from.map_or(true, |f| f <= day) && to.map_or(true, |t| day <= t)
}

fn contains_term(fields: &[&str], term: &str) -> bool {
    let needle = term.trim().to_lowercase();
    needle.is_empty() || fields.iter().any(|f| f.to_lowercase().contains(&needle))
}

fn selectors<T: Copy>(values: &[T]) -> Vec<Selector<T>> {
    let mut all = vec![Selector::All];
    all.extend(values.iter().copied().map(Selector::Only));
    all
}

/// Requests spread over statuses, roles, two labs and May-June 2025
fn request_grid() -> Vec<ReservationRequest> {
    let labs = [
        LabBuilder::new("Chemistry Lab").new_lab().into_lab(1),
        LabBuilder::new("Computer Lab A").new_lab().into_lab(2),
    ];
    let requesters = [
        Requester::new("Aiko Tanaka", RequesterRole::Student),
        Requester::new("Prof. Kato", RequesterRole::Lecturer),
        Requester::new("Ren Suzuki", RequesterRole::Student),
    ];
    let purposes = ["Titration practical", "Routine session", "Soldering workshop"];

    (0..60i64)
        .map(|i| {
            let n = i as usize;
            let day = date(2025, 5, 1) + Duration::days(i * 7 % 45);
            let mut request = RequestBuilder::new(&labs[n / 3 % 2], &requesters[n % 3], day)
                .with_purpose(purposes[n / 2 % 3])
                .new_reservation()
                .into_request(i + 1, default_now() - Duration::hours(i));
            request.status = RequestStatus::ALL[n / 5 % RequestStatus::ALL.len()];
            request
        })
        .collect()
}

#[test]
fn test_request_filters_agree_with_reference() {
    let records = request_grid();
    let qctx = query_ctx();
    let terms = ["", "chem", "COMPUTER", "  titration ", "kato", "no such thing"];
    let lab_ids = [1i64, 2, 99];
    let mut non_empty = 0;
    let mut combinations = 0;

    for status in selectors(RequestStatus::ALL) {
        for role in selectors(RequesterRole::ALL) {
            for lab in selectors(&lab_ids) {
                for (preset, from, to) in preset_windows() {
                    for term in terms {
                        let criteria = QueryCriteria::new()
                            .select(status.clone(), RequestFacet::Status)
                            .select(role.clone(), RequestFacet::Role)
                            .select(lab.clone(), RequestFacet::Lab)
                            .dates(preset)
                            .search(term);

                        let expected: Vec<i64> = records
                            .iter()
                            .filter(|r| match &status {
                                Selector::All => true,
                                Selector::Only(s) => r.status == *s,
                            })
                            .filter(|r| match &role {
                                Selector::All => true,
                                Selector::Only(role) => r.requester_role == *role,
                            })
                            .filter(|r| match &lab {
                                Selector::All => true,
                                Selector::Only(id) => r.lab_id == *id,
                            })
                            .filter(|r| within(r.date, from, to))
                            .filter(|r| {
                                let fields =
                                    [&*r.requester_name, &*r.lab_name, &*r.course, &*r.purpose];
                                contains_term(&fields, term)
                            })
                            .map(|r| r.id)
                            .collect();

                        let got: Vec<i64> = filter_records(&records, &criteria, &qctx)
                            .iter()
                            .map(|r| r.id)
                            .collect();
                        assert_eq!(
                            got, expected,
                            "status {:?} role {:?} lab {:?} dates {:?} search {:?}",
                            status, role, lab, preset, term
                        );

                        let page = query(
                            &records,
                            &criteria,
                            SortSpec::asc(RequestSortField::Date),
                            PageRequest::first(7),
                            &qctx,
                        );
                        assert_eq!(page.total_count, expected.len());

                        combinations += 1;
                        if !expected.is_empty() {
                            non_empty += 1;
                        }
                    }
                }
            }
        }
    }

    assert_eq!(combinations, 5 * 3 * 4 * 9 * 6);
    assert!(non_empty > 0 && non_empty < combinations);
}

/// Entries every 17 hours from 2025-05-01, plus two around local midnight
fn audit_grid() -> Vec<AuditLogEntry> {
    let actors = [
        Actor::new("Dr. Yamada", UserRole::Admin),
        Actor::new("Prof. Kato", UserRole::Lecturer),
        Actor::new("Aiko Tanaka", UserRole::Student),
        Actor::new("Lab Office", UserRole::Admin),
    ];
    let base: DateTime<Utc> = DateTime::parse_from_rfc3339("2025-05-01T00:00:00Z")
        .unwrap()
        .with_timezone(&Utc);
    let mut timestamps: Vec<DateTime<Utc>> =
        (0..60i64).map(|i| base + Duration::hours(i * 17)).collect();
    // 23:59:59 on 06-09 and 00:00 on 06-10 in Tokyo
    for edge in ["2025-06-09T14:59:59Z", "2025-06-09T15:00:00Z"] {
        timestamps.push(DateTime::parse_from_rfc3339(edge).unwrap().with_timezone(&Utc));
    }

    timestamps
        .into_iter()
        .enumerate()
        .map(|(n, timestamp)| {
            let action = ActionType::ALL[n % ActionType::ALL.len()];
            let recorder = lab_reservation::audit::AuditRecorder::new(
                actors[n / 2 % actors.len()].clone(),
                if n % 2 == 0 { "192.168.1.10" } else { "10.0.0.7" },
                if n % 3 == 0 { "Firefox on Linux" } else { "Chrome on macOS" },
            );
            recorder
                .entry(action, format!("{} #{}", action, n), Some(n as i64), timestamp)
                .into_entry(n as i64 + 1)
        })
        .collect()
}

#[test]
fn test_audit_filters_agree_with_reference() {
    let entries = audit_grid();
    let qctx = query_ctx();
    let terms = ["", "YAMADA", " 10.0.0 ", "approved", "firefox", "no such thing"];
    let mut non_empty = 0;

    for action in selectors(ActionType::ALL) {
        for severity in selectors(Severity::ALL) {
            for role in selectors(UserRole::ALL) {
                for (preset, from, to) in preset_windows() {
                    for term in terms {
                        let criteria = QueryCriteria::new()
                            .select(action.clone(), AuditFacet::Action)
                            .select(severity.clone(), AuditFacet::Severity)
                            .select(role.clone(), AuditFacet::ActorRole)
                            .dates(preset)
                            .search(term);

                        let expected: Vec<i64> = entries
                            .iter()
                            .filter(|e| match &action {
                                Selector::All => true,
                                Selector::Only(a) => e.action_type == *a,
                            })
                            .filter(|e| match &severity {
                                Selector::All => true,
                                Selector::Only(s) => e.severity == *s,
                            })
                            .filter(|e| match &role {
                                Selector::All => true,
                                Selector::Only(r) => e.actor.role == *r,
                            })
                            .filter(|e| {
                                within(e.timestamp.with_timezone(&TZ).date_naive(), from, to)
                            })
                            .filter(|e| {
                                let fields =
                                    [&*e.actor.name, &*e.details, &*e.ip_address, &*e.device_info];
                                contains_term(&fields, term)
                            })
                            .map(|e| e.id)
                            .collect();

                        let got: Vec<i64> = filter_records(&entries, &criteria, &qctx)
                            .iter()
                            .map(|e| e.id)
                            .collect();
                        assert_eq!(
                            got, expected,
                            "action {:?} severity {:?} role {:?} dates {:?} search {:?}",
                            action, severity, role, preset, term
                        );
                        if !expected.is_empty() {
                            non_empty += 1;
                        }
                    }
                }
            }
        }
    }

    assert!(non_empty > 0);

    // Local midnight decides the day an entry belongs to
    let today = filter_records(
        &entries,
        &QueryCriteria::new().dates(DatePreset::Today),
        &qctx,
    );
    assert!(today.iter().any(|e| e.timestamp.to_rfc3339().starts_with("2025-06-09T15:00")));
    assert!(today.iter().all(|e| e.id != 61));
}
