//! Top-level statement assemblers (§4.10): each function takes normalized
//! args and returns one rendered `Fragment` — a full standalone statement.

use indexmap::IndexMap;
use sql_fragment::{Fragment, Value};

use crate::args::{Cursor, OrderByEntry, Projection, ScalarFilter, Take, WhereNode, WhereUnique};
use crate::context::QueryContext;
use crate::error::{BuildError, BuildResult};
use crate::order_by::build_order_by;
use crate::select_include::build_select_plan;
use crate::set::build_set_assignments;
use crate::values::{build_insert, build_insert_rows};
use crate::where_builder::{build_where, build_where_unique, column, render_comparison};

/// `findFirst`/`findMany`/`findUnique` — column list, FROM, WHERE (with an
/// optional cursor condition), ORDER BY, LIMIT/OFFSET, DISTINCT.
pub struct FindArgs<'a> {
    pub where_: &'a WhereNode,
    pub where_unique: Option<&'a WhereUnique>,
    pub order_by: &'a [OrderByEntry],
    pub cursor: Option<&'a Cursor>,
    pub take: Option<Take>,
    pub skip: Option<i64>,
    pub distinct: bool,
    pub projection: &'a Projection,
    /// Forces `LIMIT 1` and requires `where_unique` (`findUnique`), or just
    /// forces `LIMIT 1` (`findFirst`).
    pub force_single: bool,
}

#[tracing::instrument(skip_all, fields(model = %ctx.model.name))]
pub fn build_find(ctx: &QueryContext, args: &FindArgs) -> BuildResult<Fragment> {
    let plan = build_select_plan(ctx, args.projection, false)?;
    let select_list = if plan.columns.is_empty() {
        Fragment::raw("*")
    } else {
        plan.render_select_list(ctx)
    };

    let table = ctx.dialect.aliased_table(ctx.model.table_name(), &ctx.root_alias);

    let mut where_parts = Vec::new();
    if let Some(unique) = args.where_unique {
        where_parts.push(build_where_unique(ctx, unique)?);
    }
    let base_where = build_where(ctx, args.where_)?;
    if !base_where.is_empty() {
        where_parts.push(base_where);
    }
    if let Some(cursor) = args.cursor {
        where_parts.push(build_cursor_condition(ctx, cursor)?);
    }
    let where_ = ctx.dialect.and(where_parts);

    let mut stmt = Fragment::raw("SELECT ");
    if args.distinct {
        stmt = stmt.append(Fragment::raw("DISTINCT "));
    }
    stmt = stmt.append(select_list).append(Fragment::raw(" FROM ")).append(table);
    for join in plan.lateral_joins {
        stmt = stmt.append(Fragment::raw(" ")).append(join);
    }
    if !where_.is_empty() {
        stmt = stmt.append(Fragment::raw(" WHERE ")).append(where_);
    }

    let order_by = build_order_by(ctx, args.order_by)?;
    if !order_by.is_empty() {
        stmt = stmt.append(Fragment::raw(" ")).append(order_by);
    }

    let limit = if args.force_single { Some(1) } else { match args.take { Some(Take::First(n)) => Some(n), _ => None } };
    if let Some(n) = limit {
        stmt = stmt.append(Fragment::raw(format!(" LIMIT {n}")));
    }
    if let Some(skip) = args.skip {
        stmt = stmt.append(Fragment::raw(format!(" OFFSET {skip}")));
    }

    Ok(stmt)
}

/// Ascending ⇒ `col >= value`; descending ⇒ `col <= value`, so the cursor
/// row itself is included (callers add `skip: 1` to exclude it). Compound
/// cursors must share one direction.
fn build_cursor_condition(ctx: &QueryContext, cursor: &Cursor) -> BuildResult<Fragment> {
    let mut parts = Vec::with_capacity(cursor.fields.len());
    for (field, value) in &cursor.fields {
        let col = column(ctx, field)?;
        let cmp = match cursor.direction {
            sql_dialect::SortDirection::Asc => ctx.dialect.gte(col, Fragment::param(value.clone())),
            sql_dialect::SortDirection::Desc => ctx.dialect.lte(col, Fragment::param(value.clone())),
        };
        parts.push(cmp);
    }
    Ok(ctx.dialect.and(parts))
}

/// `create`/`createMany` — INSERT with RETURNING when supported;
/// `skip_duplicates` appends `ON CONFLICT DO NOTHING`.
#[tracing::instrument(skip_all, fields(model = %ctx.model.name))]
pub fn build_create(ctx: &QueryContext, records: &[IndexMap<String, Value>], skip_duplicates: bool, returning: &Projection) -> BuildResult<Fragment> {
    let rows = build_insert_rows(ctx, records)?;
    let mut stmt = build_insert(ctx, rows);

    if skip_duplicates {
        let conflict_cols: Vec<String> = ctx.model.id_fields();
        stmt = stmt.append(ctx.dialect.on_conflict_do_nothing(&conflict_cols));
    }

    let plan = build_select_plan(ctx, returning, false)?;
    if !plan.columns.is_empty() {
        stmt = stmt.append(ctx.dialect.returning(plan.render_select_list(ctx)));
    }
    Ok(stmt)
}

/// `update`/`updateMany` — SET + WHERE; RETURNING when supported.
#[tracing::instrument(skip_all, fields(model = %ctx.model.name))]
pub fn build_update(ctx: &QueryContext, assignments: &IndexMap<String, crate::args::ScalarWrite>, where_: &WhereNode, returning: &Projection) -> BuildResult<Fragment> {
    if assignments.is_empty() {
        return Err(BuildError::Compile("update with no scalar assignments".to_owned()));
    }
    let set_parts = build_set_assignments(ctx, assignments)?;
    let where_frag = build_where(ctx, where_)?;
    let table = Fragment::raw(ctx.dialect.escape_identifier(ctx.model.table_name()));
    let mut stmt = ctx.dialect.update(table, set_parts, where_frag);

    let plan = build_select_plan(ctx, returning, false)?;
    if !plan.columns.is_empty() {
        stmt = stmt.append(ctx.dialect.returning(plan.render_select_list(ctx)));
    }
    Ok(stmt)
}

/// `delete`/`deleteMany` — DELETE with WHERE (required for `delete`,
/// optional for `deleteMany`); RETURNING when supported.
#[tracing::instrument(skip_all, fields(model = %ctx.model.name))]
pub fn build_delete(ctx: &QueryContext, where_: &WhereNode, require_where: bool, returning: &Projection) -> BuildResult<Fragment> {
    let where_frag = build_where(ctx, where_)?;
    if require_where && where_frag.is_empty() {
        return Err(BuildError::Compile("delete requires a where-unique condition".to_owned()));
    }
    let table = Fragment::raw(ctx.dialect.escape_identifier(ctx.model.table_name()));
    let mut stmt = ctx.dialect.delete(table, where_frag);

    let plan = build_select_plan(ctx, returning, false)?;
    if !plan.columns.is_empty() {
        stmt = stmt.append(ctx.dialect.returning(plan.render_select_list(ctx)));
    }
    Ok(stmt)
}

/// `upsert` — `INSERT ... ON CONFLICT (keys) DO UPDATE SET ...`; the
/// conflict target is derived from the unique `where` shape.
#[tracing::instrument(skip_all, fields(model = %ctx.model.name))]
pub fn build_upsert(
    ctx: &QueryContext,
    unique: &WhereUnique,
    create: &IndexMap<String, Value>,
    update: &IndexMap<String, crate::args::ScalarWrite>,
) -> BuildResult<Fragment> {
    let conflict_fields: Vec<String> = match unique {
        WhereUnique::Single { field, .. } => vec![field.clone()],
        WhereUnique::Compound { fields } => fields.iter().map(|(f, _)| f.clone()).collect(),
    };
    let conflict_columns: Vec<String> =
        conflict_fields.iter().map(|f| ctx.model.scalar(f).map(|s| s.column_name().to_owned()).unwrap_or_else(|| f.clone())).collect();

    let rows = build_insert_rows(ctx, std::slice::from_ref(create))?;
    let insert = build_insert(ctx, rows);

    let set_parts = build_set_assignments(ctx, update)?;
    let on_conflict = ctx.dialect.on_conflict_do_update(&conflict_columns, set_parts);
    Ok(insert.append(on_conflict))
}

/// `count` — `COUNT(*)`, or per-column counts keyed by a `select` list.
#[tracing::instrument(skip_all, fields(model = %ctx.model.name))]
pub fn build_count(ctx: &QueryContext, where_: &WhereNode, select: Option<&[String]>) -> BuildResult<Fragment> {
    let table = ctx.dialect.aliased_table(ctx.model.table_name(), &ctx.root_alias);
    let where_frag = build_where(ctx, where_)?;

    let select_list = match select {
        None => ctx.dialect.count_star().append(Fragment::raw(" AS \"_all\"")),
        Some(fields) => {
            let mut parts = Vec::with_capacity(fields.len());
            for field in fields {
                let col = column(ctx, field)?;
                parts.push(ctx.dialect.count(col).append(Fragment::raw(format!(" AS {}", ctx.dialect.escape_identifier(field)))));
            }
            Fragment::join(parts, ", ")
        }
    };

    let mut stmt = Fragment::raw("SELECT ").append(select_list).append(Fragment::raw(" FROM ")).append(table);
    if !where_frag.is_empty() {
        stmt = stmt.append(Fragment::raw(" WHERE ")).append(where_frag);
    }
    Ok(stmt)
}

/// One aggregate request: the kind plus the field it applies to (absent
/// for `_count`, which always counts rows).
#[derive(Debug, Clone, PartialEq)]
pub enum AggregateKind {
    Count,
    CountField(String),
    Avg(String),
    Sum(String),
    Min(String),
    Max(String),
}

/// `aggregate` — one row; `_count`/`_avg`/`_sum`/`_min`/`_max` rendered as
/// nested JSON objects in the select list.
#[tracing::instrument(skip_all, fields(model = %ctx.model.name))]
pub fn build_aggregate(ctx: &QueryContext, where_: &WhereNode, requests: &[(String, AggregateKind)]) -> BuildResult<Fragment> {
    let table = ctx.dialect.aliased_table(ctx.model.table_name(), &ctx.root_alias);
    let where_frag = build_where(ctx, where_)?;

    let mut parts = Vec::with_capacity(requests.len());
    for (output_name, kind) in requests {
        let expr = aggregate_expr(ctx, kind)?;
        parts.push(expr.append(Fragment::raw(format!(" AS {}", ctx.dialect.escape_identifier(output_name)))));
    }

    let mut stmt = Fragment::raw("SELECT ").append(Fragment::join(parts, ", ")).append(Fragment::raw(" FROM ")).append(table);
    if !where_frag.is_empty() {
        stmt = stmt.append(Fragment::raw(" WHERE ")).append(where_frag);
    }
    Ok(stmt)
}

fn aggregate_expr(ctx: &QueryContext, kind: &AggregateKind) -> BuildResult<Fragment> {
    Ok(match kind {
        AggregateKind::Count => ctx.dialect.count_star(),
        AggregateKind::CountField(field) => ctx.dialect.count(column(ctx, field)?),
        AggregateKind::Avg(field) => ctx.dialect.avg(column(ctx, field)?),
        AggregateKind::Sum(field) => ctx.dialect.sum(column(ctx, field)?),
        AggregateKind::Min(field) => ctx.dialect.min(column(ctx, field)?),
        AggregateKind::Max(field) => ctx.dialect.max(column(ctx, field)?),
    })
}

/// One `HAVING` term: a plain comparison against a grouped-by column, or a
/// comparison against one of the requested aggregate expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum HavingTerm {
    Scalar { field: String, filter: ScalarFilter },
    Aggregate { kind: AggregateKind, filter: ScalarFilter },
}

/// `groupBy` — as `aggregate`, plus `GROUP BY`, optional `HAVING` (only
/// fields named in `by` or the aggregate keys may appear), optional
/// `ORDER BY`/`LIMIT`/`OFFSET`.
pub struct GroupByArgs<'a> {
    pub by: &'a [String],
    pub where_: &'a WhereNode,
    pub aggregates: &'a [(String, AggregateKind)],
    pub having: &'a [HavingTerm],
    pub order_by: &'a [OrderByEntry],
    pub take: Option<i64>,
    pub skip: Option<i64>,
}

#[tracing::instrument(skip_all, fields(model = %ctx.model.name))]
pub fn build_group_by(ctx: &QueryContext, args: &GroupByArgs) -> BuildResult<Fragment> {
    if args.by.is_empty() {
        return Err(BuildError::Compile("groupBy requires at least one field in `by`".to_owned()));
    }

    for term in args.having {
        match term {
            HavingTerm::Scalar { field, .. } => {
                if !args.by.contains(field) {
                    return Err(BuildError::Compile(format!("`{field}` cannot appear in HAVING: not in `by` or an aggregate key")));
                }
            }
            HavingTerm::Aggregate { kind, .. } => {
                if !args.aggregates.iter().any(|(_, k)| k == kind) {
                    return Err(BuildError::Compile("HAVING references an aggregate that was not requested".to_owned()));
                }
            }
        }
    }

    let table = ctx.dialect.aliased_table(ctx.model.table_name(), &ctx.root_alias);
    let where_frag = build_where(ctx, args.where_)?;

    let mut group_cols = Vec::with_capacity(args.by.len());
    for field in args.by {
        group_cols.push(column(ctx, field)?);
    }

    let mut select_parts = group_cols.clone();
    for (output_name, kind) in args.aggregates {
        let expr = aggregate_expr(ctx, kind)?;
        select_parts.push(expr.append(Fragment::raw(format!(" AS {}", ctx.dialect.escape_identifier(output_name)))));
    }

    let mut stmt = Fragment::raw("SELECT ").append(Fragment::join(select_parts, ", ")).append(Fragment::raw(" FROM ")).append(table);
    if !where_frag.is_empty() {
        stmt = stmt.append(Fragment::raw(" WHERE ")).append(where_frag);
    }
    stmt = stmt.append(Fragment::raw(" GROUP BY ")).append(Fragment::join(group_cols, ", "));

    let mut having_parts = Vec::with_capacity(args.having.len());
    for term in args.having {
        match term {
            HavingTerm::Scalar { field, filter } => having_parts.push(render_comparison(ctx, column(ctx, field)?, filter)?),
            HavingTerm::Aggregate { kind, filter } => having_parts.push(render_comparison(ctx, aggregate_expr(ctx, kind)?, filter)?),
        }
    }
    let having_frag = Fragment::join(having_parts, " AND ");
    if !having_frag.is_empty() {
        stmt = stmt.append(Fragment::raw(" HAVING ")).append(having_frag);
    }

    let order_by = build_order_by(ctx, args.order_by)?;
    if !order_by.is_empty() {
        stmt = stmt.append(Fragment::raw(" ")).append(order_by);
    }
    if let Some(n) = args.take {
        stmt = stmt.append(Fragment::raw(format!(" LIMIT {n}")));
    }
    if let Some(n) = args.skip {
        stmt = stmt.append(Fragment::raw(format!(" OFFSET {n}")));
    }

    Ok(stmt)
}

/// `exist` — `SELECT EXISTS(SELECT 1 FROM table WHERE ...)`, the facade's
/// cheap membership check (§10.5 supplement).
#[tracing::instrument(skip_all, fields(model = %ctx.model.name))]
pub fn build_exist(ctx: &QueryContext, where_: &WhereNode) -> BuildResult<Fragment> {
    let table = ctx.dialect.aliased_table(ctx.model.table_name(), &ctx.root_alias);
    let where_frag = build_where(ctx, where_)?;
    let mut inner = Fragment::raw("SELECT 1 FROM ").append(table);
    if !where_frag.is_empty() {
        inner = inner.append(Fragment::raw(" WHERE ")).append(where_frag);
    }
    Ok(Fragment::raw("SELECT ").append(ctx.dialect.exists(inner)).append(Fragment::raw(" AS \"exists\"")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use sql_dialect::PlaceholderStyle;

    #[test]
    fn find_many_with_no_filters_selects_everything() {
        let ctx = post_context();
        let args = FindArgs {
            where_: &WhereNode::empty(),
            where_unique: None,
            order_by: &[],
            cursor: None,
            take: None,
            skip: None,
            distinct: false,
            projection: &Projection::Include(vec![]),
            force_single: false,
        };
        let (sql, _) = build_find(&ctx, &args).unwrap().render(PlaceholderStyle::Dollar);
        assert_eq!(sql, "SELECT \"t0\".\"id\" AS \"id\", \"t0\".\"title\" AS \"title\", \"t0\".\"published\" AS \"published\", \"t0\".\"authorId\" AS \"authorId\" FROM \"posts\" \"t0\"");
    }

    #[test]
    fn find_unique_forces_limit_one() {
        let ctx = post_context();
        let unique = WhereUnique::Single { field: "id".into(), value: Value::text("P1") };
        let args = FindArgs {
            where_: &WhereNode::empty(),
            where_unique: Some(&unique),
            order_by: &[],
            cursor: None,
            take: None,
            skip: None,
            distinct: false,
            projection: &Projection::Include(vec![]),
            force_single: true,
        };
        let (sql, _) = build_find(&ctx, &args).unwrap().render(PlaceholderStyle::Dollar);
        assert!(sql.ends_with("LIMIT 1"));
        assert!(sql.contains("WHERE \"t0\".\"id\" = $1"));
    }

    #[test]
    fn delete_many_allows_empty_where_but_delete_does_not() {
        let ctx = post_context();
        let empty = Projection::Include(vec![]);
        assert!(build_delete(&ctx, &WhereNode::empty(), false, &empty).is_ok());
        assert!(build_delete(&ctx, &WhereNode::empty(), true, &empty).is_err());
    }

    #[test]
    fn group_by_rejects_having_on_ungrouped_field() {
        let ctx = post_context();
        let having = vec![HavingTerm::Scalar { field: "title".to_string(), filter: ScalarFilter::Equals(Value::text("x")) }];
        let args = GroupByArgs {
            by: &["published".to_string()],
            where_: &WhereNode::empty(),
            aggregates: &[],
            having: &having,
            order_by: &[],
            take: None,
            skip: None,
        };
        assert!(build_group_by(&ctx, &args).is_err());
    }

    #[test]
    fn group_by_having_over_aggregate_renders_aggregate_expression() {
        let ctx = post_context();
        let aggregates = vec![("_count.id".to_string(), AggregateKind::CountField("id".to_string()))];
        let having = vec![HavingTerm::Aggregate { kind: AggregateKind::CountField("id".to_string()), filter: ScalarFilter::Gt(Value::Int64(5)) }];
        let args = GroupByArgs {
            by: &["authorId".to_string()],
            where_: &WhereNode::empty(),
            aggregates: &aggregates,
            having: &having,
            order_by: &[],
            take: None,
            skip: None,
        };
        let (sql, _) = build_group_by(&ctx, &args).unwrap().render(PlaceholderStyle::Dollar);
        assert!(sql.contains("HAVING COUNT(\"t0\".\"id\") > $1"));
    }

    #[test]
    fn exist_wraps_a_select_one_in_exists() {
        let ctx = post_context();
        let (sql, _) = build_exist(&ctx, &WhereNode::empty()).unwrap().render(PlaceholderStyle::Dollar);
        assert_eq!(sql, "SELECT EXISTS (SELECT 1 FROM \"posts\" \"t0\") AS \"exists\"");
    }
}
