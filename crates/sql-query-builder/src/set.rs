use sql_fragment::Fragment;

use crate::args::ScalarWrite;
use crate::context::QueryContext;
use crate::error::BuildResult;
use crate::where_builder::column;

/// Renders one `data` entry's scalar writes into `col = expr` assignments
/// (§4.9). Relation keys are not handled here — they're re-interpreted by
/// the nested-write planner.
pub fn build_set_assignments(ctx: &QueryContext, writes: &indexmap::IndexMap<String, ScalarWrite>) -> BuildResult<Vec<Fragment>> {
    let mut assignments = Vec::with_capacity(writes.len());
    for (field, write) in writes {
        let col = column(ctx, field)?;
        assignments.push(build_assignment(ctx, col, write));
    }
    Ok(assignments)
}

fn build_assignment(ctx: &QueryContext, col: Fragment, write: &ScalarWrite) -> Fragment {
    let d = &ctx.dialect;
    let assign = |rhs: Fragment| col.clone().append(Fragment::raw(" = ")).append(rhs);
    match write {
        ScalarWrite::Set(v) => assign(Fragment::param(v.clone())),
        ScalarWrite::Increment(v) => assign(col.clone().append(Fragment::raw(" + ")).append(Fragment::param(v.clone()))),
        ScalarWrite::Decrement(v) => assign(col.clone().append(Fragment::raw(" - ")).append(Fragment::param(v.clone()))),
        ScalarWrite::Multiply(v) => assign(col.clone().append(Fragment::raw(" * ")).append(Fragment::param(v.clone()))),
        ScalarWrite::Divide(v) => assign(col.clone().append(Fragment::raw(" / ")).append(Fragment::param(v.clone()))),
        ScalarWrite::Push(v) => assign(d.array_append(col.clone(), Fragment::param(v.clone()))),
        ScalarWrite::Unshift(v) => assign(d.array_prepend(col.clone(), Fragment::param(v.clone()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use indexmap::IndexMap;
    use sql_dialect::PlaceholderStyle;
    use sql_fragment::Value;

    #[test]
    fn set_is_a_direct_assignment() {
        let ctx = post_context();
        let mut writes = IndexMap::new();
        writes.insert("title".to_string(), ScalarWrite::Set(Value::text("New")));
        let assignments = build_set_assignments(&ctx, &writes).unwrap();
        let (sql, _) = assignments[0].clone().render(PlaceholderStyle::Dollar);
        assert_eq!(sql, "\"t0\".\"title\" = $1");
    }

    #[test]
    fn increment_reads_and_writes_the_same_column() {
        let ctx = post_context();
        let mut writes = IndexMap::new();
        writes.insert("title".to_string(), ScalarWrite::Increment(Value::Int32(1)));
        let assignments = build_set_assignments(&ctx, &writes).unwrap();
        let (sql, _) = assignments[0].clone().render(PlaceholderStyle::Dollar);
        assert_eq!(sql, "\"t0\".\"title\" = \"t0\".\"title\" + $1");
    }
}
