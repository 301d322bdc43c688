use grid_cache::{grid_prefix, QueryKey};

use crate::params::ServerParams;

/// Canonical identity of one grid query; doubles as the cache key.
pub type RequestKey = QueryKey;

/// Derives [`RequestKey`]s from grid state.
///
/// Layout: `grid / <id> / <page> / <per_page> / <sort json> / <filters json> / <extra>`.
/// Each input occupies its own segment, so values cannot bleed into each
/// other, and filters serialize from an ordered map.
pub struct RequestKeyBuilder;

impl RequestKeyBuilder {
    pub fn build(grid_id: &str, params: &ServerParams, extra_params: Option<&str>) -> RequestKey {
        grid_prefix(grid_id)
            .with(params.page.to_string())
            .with(params.per_page.to_string())
            .with(canonical_json(&params.sort))
            .with(canonical_json(&params.column_filters))
            .with(extra_params.unwrap_or_default())
    }
}

fn canonical_json<T: serde::Serialize>(value: &T) -> String {
    // Plain data types with string keys; serialization cannot fail.
    serde_json::to_string(value).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{ColumnFilters, SortDirection, SortSpec};
    use proptest::prelude::*;

    fn params_with(filters: &[(&str, &str)]) -> ServerParams {
        let mut params = ServerParams::with_per_page(10);
        for (k, v) in filters {
            params.column_filters.insert((*k).into(), (*v).into());
        }
        params
    }

    #[test]
    fn filter_insertion_order_is_irrelevant() {
        let a = params_with(&[("status", "active"), ("name", "bo")]);
        let b = params_with(&[("name", "bo"), ("status", "active")]);
        assert_eq!(
            RequestKeyBuilder::build("users", &a, None),
            RequestKeyBuilder::build("users", &b, None)
        );
    }

    #[test]
    fn every_input_participates() {
        let base = params_with(&[]);
        let key = RequestKeyBuilder::build("users", &base, None);

        let mut paged = base.clone();
        paged.page = 2;
        let mut sorted = base.clone();
        sorted.sort = vec![SortSpec::new("id", SortDirection::Asc)];

        assert_ne!(key, RequestKeyBuilder::build("orders", &base, None));
        assert_ne!(key, RequestKeyBuilder::build("users", &paged, None));
        assert_ne!(key, RequestKeyBuilder::build("users", &sorted, None));
        assert_ne!(key, RequestKeyBuilder::build("users", &base, Some("&x=1")));
        assert!(key.starts_with(&grid_prefix("users")));
    }

    #[test]
    fn separators_inside_values_do_not_collide() {
        let a = params_with(&[("a", "b\",\"c")]);
        let b = params_with(&[("a", "b"), ("c", "")]);
        assert_ne!(
            RequestKeyBuilder::build("g", &a, None),
            RequestKeyBuilder::build("g", &b, None)
        );
    }

    proptest! {
        #[test]
        fn equal_states_build_equal_keys(
            entries in proptest::collection::vec(("[a-z]{1,6}", "[a-z0-9 ]{0,6}"), 0..6),
            page in 1u32..50,
            per_page in 1u32..100,
        ) {
            let forward: ColumnFilters = entries.iter().cloned().collect();
            let reversed: ColumnFilters = entries.iter().rev().cloned().collect();
            // Later duplicates win in `collect`, so only compare when keys are unique.
            prop_assume!(forward == reversed);

            let mut a = ServerParams::with_per_page(per_page);
            a.page = page;
            a.column_filters = forward;
            let mut b = a.clone();
            b.column_filters = reversed;

            prop_assert_eq!(
                RequestKeyBuilder::build("grid", &a, None),
                RequestKeyBuilder::build("grid", &b, None)
            );
        }

        #[test]
        fn different_pages_never_collide(p1 in 1u32..1000, p2 in 1u32..1000) {
            prop_assume!(p1 != p2);
            let mut a = ServerParams::default();
            a.page = p1;
            let mut b = a.clone();
            b.page = p2;
            prop_assert_ne!(
                RequestKeyBuilder::build("grid", &a, None),
                RequestKeyBuilder::build("grid", &b, None)
            );
        }
    }
}
