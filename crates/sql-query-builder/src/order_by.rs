use sql_fragment::Fragment;

use crate::args::OrderByEntry;
use crate::context::QueryContext;
use crate::error::BuildResult;
use crate::where_builder::column;

/// Renders an `ORDER BY` clause from normalized entries, or `Fragment::empty()`
/// when there are none (§4.6). Relation-path ordering is out of scope.
pub fn build_order_by(ctx: &QueryContext, entries: &[OrderByEntry]) -> BuildResult<Fragment> {
    if entries.is_empty() {
        return Ok(Fragment::empty());
    }
    let mut parts = Vec::with_capacity(entries.len());
    for entry in entries {
        let col = column(ctx, &entry.field)?;
        parts.push(ctx.dialect.order_by(col, entry.direction, entry.nulls));
    }
    Ok(Fragment::raw("ORDER BY ").append(Fragment::join(parts, ", ")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use sql_dialect::{PlaceholderStyle, SortDirection};

    #[test]
    fn empty_entries_yield_empty_fragment() {
        let ctx = post_context();
        assert!(build_order_by(&ctx, &[]).unwrap().is_empty());
    }

    #[test]
    fn renders_multiple_entries_in_order() {
        let ctx = post_context();
        let entries = vec![
            OrderByEntry { field: "published".into(), direction: SortDirection::Desc, nulls: None },
            OrderByEntry { field: "title".into(), direction: SortDirection::Asc, nulls: None },
        ];
        let (sql, _) = build_order_by(&ctx, &entries).unwrap().render(PlaceholderStyle::Dollar);
        assert_eq!(sql, "ORDER BY \"t0\".\"published\" DESC, \"t0\".\"title\" ASC");
    }
}
