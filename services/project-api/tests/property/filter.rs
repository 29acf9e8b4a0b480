//! Filter predicates combine with AND.

use proptest::prelude::*;
use std::collections::BTreeSet;

use project_api::project::FilterSpec;

use super::generators::{arb_priority, arb_project, arb_status, arb_tags, TEAMS};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// A project matches a tag filter only if it carries every listed tag
    #[test]
    fn tag_filter_requires_all_tags(project in arb_project(), tags in arb_tags()) {
        let filter = FilterSpec { tags: tags.clone(), ..FilterSpec::default() };
        prop_assert_eq!(filter.matches(&project), tags.is_subset(&project.tags));
    }

    /// A combined filter matches exactly when each single predicate does
    #[test]
    fn predicates_are_conjunctive(
        project in arb_project(),
        status in prop::option::of(arb_status()),
        priority in prop::option::of(arb_priority()),
        team in prop::option::of(prop::sample::select(TEAMS.to_vec())),
        tags in arb_tags(),
    ) {
        let single = [
            FilterSpec { status, ..FilterSpec::default() },
            FilterSpec { priority, ..FilterSpec::default() },
            FilterSpec { team: team.map(str::to_string), ..FilterSpec::default() },
            FilterSpec { tags: tags.clone(), ..FilterSpec::default() },
        ];
        let combined = FilterSpec {
            status,
            priority,
            team: team.map(str::to_string),
            tags,
            ..FilterSpec::default()
        };
        prop_assert_eq!(
            combined.matches(&project),
            single.iter().all(|f| f.matches(&project))
        );
    }

    /// The empty filter matches everything and renders without a WHERE clause
    #[test]
    fn empty_filter_matches_all(project in arb_project()) {
        let filter = FilterSpec::default();
        prop_assert!(filter.matches(&project));
        prop_assert_eq!(filter.to_sql().text, "SELECT * FROM c");
    }

    /// Every tag in the filter gets its own bound parameter
    #[test]
    fn rendered_sql_binds_each_tag(tags in arb_tags()) {
        let filter = FilterSpec { tags: tags.clone(), ..FilterSpec::default() };
        let sql = filter.to_sql();
        prop_assert_eq!(sql.text.matches("ARRAY_CONTAINS").count(), tags.len());
        let bound: BTreeSet<String> = sql
            .parameters
            .iter()
            .filter_map(|(_, value)| value.as_str().map(str::to_string))
            .collect();
        prop_assert_eq!(bound, tags);
    }
}
