use sql_fragment::Fragment;

use crate::args::{Projected, Projection, RelationQueryArgs};
use crate::context::QueryContext;
use crate::error::BuildResult;
use crate::many_to_many;
use crate::order_by::build_order_by;
use crate::where_builder::{build_where, column};
use query_structure::{RelationInfo, RelationKind};

/// The output of walking a `select`/`include` tree: an ordered list of
/// `(outputName, expr)` pairs, plus any `LEFT JOIN LATERAL` clauses those
/// pairs depend on (§4.5).
#[derive(Default)]
pub struct SelectPlan {
    pub columns: Vec<(String, Fragment)>,
    pub lateral_joins: Vec<Fragment>,
}

impl SelectPlan {
    /// Top-level SELECT list: `expr AS "name"`, comma-joined.
    pub fn render_select_list(&self, ctx: &QueryContext) -> Fragment {
        Fragment::join(
            self.columns
                .iter()
                .map(|(name, expr)| expr.clone().append(Fragment::raw(format!(" AS {}", ctx.dialect.escape_identifier(name))))),
            ", ",
        )
    }
}

/// Walks `select`/`include` in one pass. `use_lateral` selects between the
/// always-valid correlated-subquery plan and the `LEFT JOIN LATERAL` plan;
/// callers check `capabilities().contains(Capability::LateralJoins)` first.
pub fn build_select_plan(ctx: &QueryContext, projection: &Projection, use_lateral: bool) -> BuildResult<SelectPlan> {
    let mut plan = SelectPlan::default();

    if let Projection::Include(_) = projection {
        for field in ctx.model.scalars.values() {
            plan.columns.push((field.name.clone(), column(ctx, &field.name)?));
        }
    }

    for entry in projection.entries() {
        match entry {
            Projected::Scalar(field) => plan.columns.push((field.clone(), column(ctx, field)?)),
            Projected::Relation { name, args } => {
                let (expr, join) = build_relation_projection(ctx, name, args, use_lateral)?;
                if let Some(join) = join {
                    plan.lateral_joins.push(join);
                }
                plan.columns.push((name.clone(), expr));
            }
            Projected::Count { entries } => {
                for (rel_name, filter) in entries {
                    let expr = build_count_projection(ctx, rel_name, filter.as_ref())?;
                    plan.columns.push((format!("_count_{rel_name}"), expr));
                }
            }
        }
    }

    Ok(plan)
}

/// The JSON-object form of a projection, for reconstructing a nested
/// relation's row inside its parent's result (§4.5 "inside a relation").
pub fn build_projection_as_json(ctx: &QueryContext, projection: &Projection) -> BuildResult<Fragment> {
    let plan = build_select_plan(ctx, projection, false)?;
    let pairs: Vec<(String, Fragment)> = plan.columns;
    Ok(ctx.dialect.json_object_from_columns(&pairs))
}

fn build_count_projection(ctx: &QueryContext, relation_name: &str, filter: Option<&crate::args::WhereNode>) -> BuildResult<Fragment> {
    let info = RelationInfo::resolve(&ctx.registry, &ctx.model, relation_name)?;
    let target_ctx = ctx.descend(info.target_model.clone());

    let (from_clause, correlation) = if info.kind == RelationKind::ManyToMany {
        let relation = ctx.model.relation_named(relation_name).expect("resolved above");
        let junction = query_structure::JunctionInfo::resolve(&ctx.model, &info.target_model, relation);
        let junction_alias = ctx.aliases.next();
        let parts = many_to_many::build(ctx, &junction_alias, &target_ctx, &junction);
        (parts.from_clause, ctx.dialect.and(vec![parts.correlation, parts.join_condition]))
    } else {
        (
            target_ctx.dialect.aliased_table(target_ctx.model.table_name(), &target_ctx.root_alias),
            direct_correlation(ctx, &target_ctx, &info)?,
        )
    };

    let mut where_parts = vec![correlation];
    if let Some(filter) = filter {
        where_parts.push(build_where(&target_ctx, filter)?);
    }
    let where_ = ctx.dialect.and(where_parts);

    Ok(Fragment::raw("(SELECT ")
        .append(ctx.dialect.count_star())
        .append(Fragment::raw(" FROM "))
        .append(from_clause)
        .append(Fragment::raw(" WHERE "))
        .append(where_)
        .append(Fragment::raw(")")))
}

fn direct_correlation(parent_ctx: &QueryContext, target_ctx: &QueryContext, info: &RelationInfo) -> BuildResult<Fragment> {
    let mut pairs = Vec::with_capacity(info.self_fields.len());
    for (self_field, target_field) in info.self_fields.iter().zip(info.target_fields.iter()) {
        let self_col = column(parent_ctx, self_field)?;
        let target_col = target_ctx.dialect.qualified_column(&target_ctx.root_alias, target_field);
        pairs.push(parent_ctx.dialect.eq(self_col, target_col));
    }
    Ok(parent_ctx.dialect.and(pairs))
}

/// Builds the inner query (the one producing `_json` rows), its `FROM`
/// clause, and the correlation tying it to the parent — shared by to-one,
/// to-many, and many-to-many shapes.
fn inner_query_parts(ctx: &QueryContext, relation_name: &str, info: &RelationInfo) -> BuildResult<(QueryContext, Fragment, Fragment)> {
    let target_ctx = ctx.descend(info.target_model.clone());

    if info.kind == RelationKind::ManyToMany {
        let relation = ctx.model.relation_named(relation_name).expect("resolved above");
        let junction = query_structure::JunctionInfo::resolve(&ctx.model, &info.target_model, relation);
        let junction_alias = ctx.aliases.next();
        let parts = many_to_many::build(ctx, &junction_alias, &target_ctx, &junction);
        let correlation = ctx.dialect.and(vec![parts.correlation, parts.join_condition]);
        return Ok((target_ctx, parts.from_clause, correlation));
    }

    let from_clause = target_ctx.dialect.aliased_table(target_ctx.model.table_name(), &target_ctx.root_alias);
    let correlation = direct_correlation(ctx, &target_ctx, info)?;
    Ok((target_ctx, from_clause, correlation))
}

fn build_relation_projection(
    ctx: &QueryContext,
    relation_name: &str,
    args: &RelationQueryArgs,
    use_lateral: bool,
) -> BuildResult<(Fragment, Option<Fragment>)> {
    let info = RelationInfo::resolve(&ctx.registry, &ctx.model, relation_name)?;
    let (target_ctx, from_clause, correlation) = inner_query_parts(ctx, relation_name, &info)?;

    let inner_where = build_where(&target_ctx, &args.where_)?;
    let where_ = ctx.dialect.and(vec![correlation, inner_where]);
    let order_by = build_order_by(&target_ctx, &args.order_by)?;
    let json_obj = build_projection_as_json(&target_ctx, &args.projection)?;

    let mut inner = Fragment::raw("SELECT ")
        .append(json_obj)
        .append(Fragment::raw(" AS _json FROM "))
        .append(from_clause)
        .append(Fragment::raw(" WHERE "))
        .append(where_);

    if info.is_to_many() {
        if !order_by.is_empty() {
            inner = inner.append(Fragment::raw(" ")).append(order_by);
        }
        if let Some(take) = args.take {
            inner = inner.append(Fragment::raw(format!(" LIMIT {take}")));
        }
        if let Some(skip) = args.skip {
            inner = inner.append(Fragment::raw(format!(" OFFSET {skip}")));
        }
    } else {
        inner = inner.append(Fragment::raw(" LIMIT 1"));
    }

    if use_lateral && ctx.dialect.has(sql_dialect::Capability::LateralJoins) {
        let lateral_alias = ctx.aliases.next();
        let join = ctx.dialect.join_lateral_left(&lateral_alias, inner)?;
        let aliased_json = ctx.dialect.qualified_column(&lateral_alias, "_json");
        let outer = if info.is_to_many() {
            ctx.dialect.json_agg(aliased_json)
        } else {
            aliased_json
        };
        return Ok((outer, Some(join)));
    }

    let alias = ctx.aliases.next();
    let sub_json = Fragment::raw(format!("{}._json", ctx.dialect.escape_identifier(&alias)));
    let outer = if info.is_to_many() {
        Fragment::raw("(SELECT ")
            .append(ctx.dialect.json_agg(sub_json))
            .append(Fragment::raw(" FROM "))
            .append(inner.parenthesized())
            .append(Fragment::raw(format!(" {}", ctx.dialect.escape_identifier(&alias))))
            .append(Fragment::raw(")"))
    } else {
        Fragment::raw("(SELECT ")
            .append(sub_json)
            .append(Fragment::raw(" FROM "))
            .append(inner.parenthesized())
            .append(Fragment::raw(format!(" {}", ctx.dialect.escape_identifier(&alias))))
            .append(Fragment::raw(")"))
    };

    Ok((outer, None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use sql_dialect::PlaceholderStyle;

    #[test]
    fn select_present_emits_only_listed_scalars() {
        let ctx = post_context();
        let projection = Projection::Select(vec![Projected::Scalar("title".into())]);
        let plan = build_select_plan(&ctx, &projection, false).unwrap();
        assert_eq!(plan.columns.len(), 1);
        assert_eq!(plan.columns[0].0, "title");
    }

    #[test]
    fn include_emits_all_scalars_plus_relation() {
        let ctx = author_context();
        let projection = Projection::Include(vec![Projected::Relation {
            name: "posts".into(),
            args: Box::new(RelationQueryArgs::default()),
        }]);
        let plan = build_select_plan(&ctx, &projection, false).unwrap();
        // id, name, email scalars + the `posts` relation column.
        assert_eq!(plan.columns.len(), 4);
        assert_eq!(plan.columns.last().unwrap().0, "posts");
        assert!(plan.lateral_joins.is_empty());
        let (sql, _) = plan.columns.last().unwrap().1.clone().render(PlaceholderStyle::Dollar);
        assert!(sql.contains("json_agg"), "to-many relation should aggregate: {sql}");
        assert!(sql.contains("COALESCE"), "to-many aggregate must coalesce to empty array: {sql}");
    }

    #[test]
    fn count_projection_is_named_and_scoped_to_relation() {
        let ctx = author_context();
        let expr = build_count_projection(&ctx, "posts", None).unwrap();
        let (sql, _) = expr.render(PlaceholderStyle::Dollar);
        assert!(sql.starts_with("(SELECT COUNT(*) FROM"));
        assert!(sql.contains("\"t0\".\"id\""));
    }
}
