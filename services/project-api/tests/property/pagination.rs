//! Pages tile the deterministically sorted match set.

use proptest::prelude::*;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::Arc;

use project_api::project::{
    DocumentStore, FilterSpec, MemoryDocumentStore, PaginationSpec, Project, QueryPlan,
    SortField, SortOrder,
};

use super::generators::{arb_projects, arb_status};
use crate::support;

const SORT_FIELDS: &[&str] = &[
    "createdAt",
    "updatedAt",
    "name",
    "status",
    "priority",
    "riskLevel",
    "estimatedCompletion",
    "budget",
];

fn request(limit: i64, offset: i64, sort_by: &str, sort_order: &str) -> PaginationSpec {
    PaginationSpec {
        limit,
        offset,
        sort_by: sort_by.to_string(),
        sort_order: sort_order.to_string(),
    }
}

fn in_order(field: SortField, order: SortOrder, a: &Project, b: &Project) -> bool {
    let primary = match order {
        SortOrder::Asc => field.compare(a, b),
        SortOrder::Desc => field.compare(a, b).reverse(),
    };
    match primary {
        Ordering::Less => true,
        Ordering::Equal => a.id < b.id,
        Ordering::Greater => false,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Walking every page yields each match exactly once, in sorted order
    #[test]
    fn pages_cover_matches_exactly_once(
        projects in arb_projects(40),
        limit in 1i64..12,
        sort_by in prop::sample::select(SORT_FIELDS.to_vec()),
        descending in any::<bool>(),
    ) {
        let sort_order = if descending { "desc" } else { "asc" };
        let expected = projects.len();

        let mut walked = Vec::new();
        let mut offset = 0;
        loop {
            let page = request(limit, offset, sort_by, sort_order).validate().unwrap();
            let window = page.apply(projects.clone());
            prop_assert!(window.len() <= page.limit);
            if window.is_empty() {
                break;
            }
            walked.extend(window);
            offset += limit;
        }

        prop_assert_eq!(walked.len(), expected);
        let ids: BTreeSet<_> = walked.iter().map(|p| p.id.clone()).collect();
        prop_assert_eq!(ids.len(), expected);

        let page = request(limit, 0, sort_by, sort_order).validate().unwrap();
        for pair in walked.windows(2) {
            prop_assert!(
                in_order(page.sort_by, page.sort_order, &pair[0], &pair[1]),
                "{} before {}", pair[0].id, pair[1].id
            );
        }
    }

    /// The same request against the same data always returns the same page
    #[test]
    fn sorting_is_deterministic(
        projects in arb_projects(30),
        sort_by in prop::sample::select(SORT_FIELDS.to_vec()),
    ) {
        let page = request(100, 0, sort_by, "desc").validate().unwrap();
        let mut reversed = projects.clone();
        reversed.reverse();
        prop_assert_eq!(page.apply(projects), page.apply(reversed));
    }

    /// Out-of-range windows are rejected rather than clamped
    #[test]
    fn out_of_range_windows_rejected(limit in prop_oneof![-50i64..1, 101i64..1000]) {
        let err = PaginationSpec::window(limit, 0).validate().unwrap_err();
        prop_assert_eq!(err.field(), Some("limit"));
    }

    /// Through the repository, total count ignores the window
    #[test]
    fn total_count_is_window_independent(
        projects in arb_projects(25),
        status in arb_status(),
        limit in 1i64..10,
        offset in 0i64..30,
    ) {
        let store = Arc::new(MemoryDocumentStore::new());
        tokio_test::block_on(async {
            for project in &projects {
                let document = serde_json::to_value(project).unwrap();
                let serde_json::Value::Object(document) = document else {
                    unreachable!("projects serialize to objects");
                };
                store.create(document).await.unwrap();
            }
        });
        let repository = project_api::project::Repository::new(
            store,
            std::time::Duration::from_secs(1),
            support::metrics(),
        );

        let filter = FilterSpec { status: Some(status), ..FilterSpec::default() };
        let expected = projects.iter().filter(|p| p.status == status).count();
        let plan = QueryPlan::build(filter, &PaginationSpec::window(limit, offset)).unwrap();
        let page = tokio_test::block_on(repository.query(&plan)).unwrap();

        prop_assert_eq!(page.total_count, expected);
        let window = expected.saturating_sub(offset as usize).min(limit as usize);
        prop_assert_eq!(page.items.len(), window);
        prop_assert!(page.items.iter().all(|p| p.status == status));
    }
}
