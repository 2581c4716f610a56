use query_structure::{JunctionInfo, RelationInfo, RelationKind};
use sql_fragment::Fragment;

use crate::args::{RelationFilter, WhereNode};
use crate::context::QueryContext;
use crate::error::BuildResult;
use crate::many_to_many::{self, ManyToManyJoinParts};
use crate::where_builder::{build_where, column};

/// Compiles a relation filter (`some|every|none|is|isNot`) into an
/// EXISTS/NOT-EXISTS fragment, or the FK-null shortcut for a to-one filter
/// against an optional FK-holding relation (§4.4).
pub fn build_relation_filter(ctx: &QueryContext, relation_name: &str, filter: &RelationFilter) -> BuildResult<Option<Fragment>> {
    let info = RelationInfo::resolve(&ctx.registry, &ctx.model, relation_name)?;
    let target_ctx = ctx.descend(info.target_model.clone());

    if info.kind == RelationKind::ManyToMany {
        return build_many_to_many_filter(ctx, &target_ctx, &info, filter).map(Some);
    }

    let correlation = direct_correlation(ctx, &target_ctx, &info)?;

    Ok(Some(match filter {
        RelationFilter::Some(inner) => ctx.dialect.filter_some(subquery(&target_ctx, correlation, inner)?),
        RelationFilter::None(inner) => ctx.dialect.filter_none(subquery(&target_ctx, correlation, inner)?),
        RelationFilter::Every(inner) => {
            let inner_where = build_where(&target_ctx, inner)?;
            let negated_inner = if inner_where.is_empty() { Fragment::raw("FALSE") } else { ctx.dialect.not(inner_where) };
            let where_ = ctx.dialect.and(vec![correlation, negated_inner]);
            ctx.dialect.filter_every(select_one_from(&target_ctx, where_))
        }
        RelationFilter::Is(None) => to_one_null_shortcut_or_subquery(ctx, &target_ctx, &info, correlation, true)?,
        RelationFilter::IsNot(None) => to_one_null_shortcut_or_subquery(ctx, &target_ctx, &info, correlation, false)?,
        RelationFilter::Is(Some(inner)) => ctx.dialect.filter_some(subquery(&target_ctx, correlation, inner)?),
        RelationFilter::IsNot(Some(inner)) => ctx.dialect.filter_none(subquery(&target_ctx, correlation, inner)?),
    }))
}

fn select_one_from(target_ctx: &QueryContext, where_: Fragment) -> Fragment {
    Fragment::raw("SELECT 1 FROM ")
        .append(target_ctx.dialect.aliased_table(target_ctx.model.table_name(), &target_ctx.root_alias))
        .append(Fragment::raw(" WHERE "))
        .append(where_)
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

fn subquery(target_ctx: &QueryContext, correlation: Fragment, inner: &WhereNode) -> BuildResult<Fragment> {
    let inner_where = build_where(target_ctx, inner)?;
    let where_ = target_ctx.dialect.and(vec![correlation, inner_where]);
    Ok(select_one_from(target_ctx, where_))
}

fn to_one_null_shortcut_or_subquery(
    ctx: &QueryContext,
    target_ctx: &QueryContext,
    info: &RelationInfo,
    correlation: Fragment,
    is_null_check: bool,
) -> BuildResult<Fragment> {
    if info.holds_fk {
        let mut parts = Vec::with_capacity(info.self_fields.len());
        for field in &info.self_fields {
            let col = column(ctx, field)?;
            parts.push(if is_null_check { ctx.dialect.is_null(col) } else { ctx.dialect.is_not_null(col) });
        }
        return Ok(ctx.dialect.and(parts));
    }
    let sub = select_one_from(target_ctx, correlation);
    Ok(if is_null_check { ctx.dialect.filter_none(sub) } else { ctx.dialect.filter_some(sub) })
}

fn build_many_to_many_filter(ctx: &QueryContext, target_ctx: &QueryContext, info: &RelationInfo, filter: &RelationFilter) -> BuildResult<Fragment> {
    let relation = ctx.model.relation_named(&info.name).expect("relation resolved above");
    let junction = JunctionInfo::resolve(&ctx.model, &info.target_model, relation);
    let junction_alias = ctx.aliases.next();
    let parts: ManyToManyJoinParts = many_to_many::build(ctx, &junction_alias, target_ctx, &junction);
    let correlation = ctx.dialect.and(vec![parts.correlation, parts.join_condition]);

    let (inner, negate_outer, negate_inner) = match filter {
        RelationFilter::Some(inner) | RelationFilter::Is(Some(inner)) => (Some(inner.as_ref()), false, false),
        RelationFilter::None(inner) | RelationFilter::IsNot(Some(inner)) => (Some(inner.as_ref()), true, false),
        RelationFilter::Every(inner) => (Some(inner.as_ref()), true, true),
        RelationFilter::Is(None) => (None, false, false),
        RelationFilter::IsNot(None) => (None, true, false),
    };

    let where_ = match inner {
        Some(inner) => {
            let inner_where = build_where(target_ctx, inner)?;
            if negate_inner {
                let negated = if inner_where.is_empty() { Fragment::raw("FALSE") } else { ctx.dialect.not(inner_where) };
                ctx.dialect.and(vec![correlation, negated])
            } else {
                ctx.dialect.and(vec![correlation, inner_where])
            }
        }
        None => correlation,
    };

    let sub = Fragment::raw("SELECT 1 FROM ").append(parts.from_clause).append(Fragment::raw(" WHERE ")).append(where_);

    Ok(if negate_outer { ctx.dialect.not_exists(sub) } else { ctx.dialect.exists(sub) })
}
