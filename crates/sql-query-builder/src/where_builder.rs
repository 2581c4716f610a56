use sql_fragment::Fragment;

use crate::args::{ScalarFilter, WhereNode, WhereUnique};
use crate::context::QueryContext;
use crate::error::{BuildError, BuildResult};
use crate::relation_filter;

/// The qualified column reference for a scalar field on the context's
/// current model and alias, honoring a `.map()` column-name override.
pub fn column(ctx: &QueryContext, field: &str) -> BuildResult<Fragment> {
    let scalar = ctx.model.scalar(field).ok_or_else(|| {
        BuildError::Schema(query_structure::SchemaError::UnknownField { model: ctx.model.name.clone(), field: field.to_owned() })
    })?;
    Ok(ctx.dialect.qualified_column(&ctx.root_alias, scalar.column_name()))
}

/// Builds a boolean fragment for a `where` tree, or `Fragment::empty()` if
/// the tree has nothing to say (§4.3). Empty logical groups are elided
/// rather than rendered as `AND ()`/`OR ()`.
pub fn build_where(ctx: &QueryContext, node: &WhereNode) -> BuildResult<Fragment> {
    let mut parts = Vec::new();

    for child in &node.and {
        let f = build_where(ctx, child)?;
        if !f.is_empty() {
            parts.push(f);
        }
    }
    for child in &node.not {
        let f = build_where(ctx, child)?;
        if !f.is_empty() {
            parts.push(ctx.dialect.not(f));
        }
    }
    if !node.or.is_empty() {
        let or_parts: Vec<Fragment> = node
            .or
            .iter()
            .map(|child| build_where(ctx, child))
            .collect::<BuildResult<Vec<_>>>()?
            .into_iter()
            .filter(|f| !f.is_empty())
            .collect();
        if !or_parts.is_empty() {
            parts.push(ctx.dialect.or(or_parts));
        }
    }
    for (field, filter) in &node.scalars {
        parts.push(build_scalar_filter(ctx, field, filter)?);
    }
    for (name, filter) in &node.relations {
        if let Some(f) = relation_filter::build_relation_filter(ctx, name, filter)? {
            parts.push(f);
        }
    }

    Ok(ctx.dialect.and(parts))
}

fn build_scalar_filter(ctx: &QueryContext, field: &str, filter: &ScalarFilter) -> BuildResult<Fragment> {
    let col = column(ctx, field)?;
    render_comparison(ctx, col, filter)
}

/// Renders a single comparison against an already-computed LHS fragment,
/// shared between plain column filters and aggregate-expression HAVING
/// terms (§4.10) that have no column to look up.
pub(crate) fn render_comparison(ctx: &QueryContext, col: Fragment, filter: &ScalarFilter) -> BuildResult<Fragment> {
    let d = &ctx.dialect;
    Ok(match filter {
        ScalarFilter::Equals(v) => {
            if v.is_null() {
                d.is_null(col)
            } else {
                d.eq(col, Fragment::param(v.clone()))
            }
        }
        ScalarFilter::Not(inner) => {
            let inner_f = render_comparison(ctx, col.clone(), inner)?;
            d.not(inner_f)
        }
        ScalarFilter::Lt(v) => d.lt(col, Fragment::param(v.clone())),
        ScalarFilter::Lte(v) => d.lte(col, Fragment::param(v.clone())),
        ScalarFilter::Gt(v) => d.gt(col, Fragment::param(v.clone())),
        ScalarFilter::Gte(v) => d.gte(col, Fragment::param(v.clone())),
        ScalarFilter::In(values) => {
            if values.is_empty() {
                // An empty IN-list can never match; elide per §4.3 rather
                // than emit `IN ()`, which most dialects reject outright.
                return Ok(Fragment::raw("1 = 0"));
            }
            let list = Fragment::join(values.iter().cloned().map(Fragment::param), ", ").parenthesized();
            d.in_list(col, list)
        }
        ScalarFilter::NotIn(values) => {
            if values.is_empty() {
                return Ok(Fragment::empty());
            }
            let list = Fragment::join(values.iter().cloned().map(Fragment::param), ", ").parenthesized();
            d.not_in_list(col, list)
        }
        ScalarFilter::Contains { value, insensitive } => {
            let pattern = Fragment::param(format!("%{}%", escape_like(value)));
            if *insensitive {
                d.ilike(col, pattern)
            } else {
                d.like(col, pattern)
            }
        }
        ScalarFilter::StartsWith { value, insensitive } => {
            let pattern = Fragment::param(format!("{}%", escape_like(value)));
            if *insensitive {
                d.ilike(col, pattern)
            } else {
                d.like(col, pattern)
            }
        }
        ScalarFilter::EndsWith { value, insensitive } => {
            let pattern = Fragment::param(format!("%{}", escape_like(value)));
            if *insensitive {
                d.ilike(col, pattern)
            } else {
                d.like(col, pattern)
            }
        }
        ScalarFilter::Has(v) => d.array_has(col, Fragment::param(v.clone())),
        ScalarFilter::HasEvery(values) => {
            d.array_has_every(col, Fragment::param(sql_fragment::Value::Array(values.clone())))
        }
        ScalarFilter::HasSome(values) => {
            d.array_has_some(col, Fragment::param(sql_fragment::Value::Array(values.clone())))
        }
        ScalarFilter::IsEmpty(expect_empty) => {
            let empty = d.array_is_empty(col);
            if *expect_empty {
                empty
            } else {
                d.not(empty)
            }
        }
    })
}

fn escape_like(value: &str) -> String {
    value.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

/// Validates and compiles a `where`-unique shape into an equality
/// conjunction, rejecting anything that doesn't match a declared unique
/// index (§4.3).
pub fn build_where_unique(ctx: &QueryContext, unique: &WhereUnique) -> BuildResult<Fragment> {
    let pairs: Vec<(String, sql_fragment::Value)> = match unique {
        WhereUnique::Single { field, value } => vec![(field.clone(), value.clone())],
        WhereUnique::Compound { fields } => fields.clone(),
    };

    let field_names: Vec<&str> = pairs.iter().map(|(f, _)| f.as_str()).collect();
    let matches_declared_unique = ctx
        .model
        .unique_field_sets()
        .iter()
        .any(|set| set.len() == field_names.len() && set.iter().all(|f| field_names.contains(&f.as_str())));

    if !matches_declared_unique {
        return Err(BuildError::Compile(format!(
            "where-unique on `{}` does not match any declared unique key: {:?}",
            ctx.model.name, field_names
        )));
    }

    let mut parts = Vec::with_capacity(pairs.len());
    for (field, value) in pairs {
        let col = column(ctx, &field)?;
        parts.push(ctx.dialect.eq(col, Fragment::param(value)));
    }
    Ok(ctx.dialect.and(parts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use sql_dialect::{Dialect, PlaceholderStyle};

    #[test]
    fn equals_and_null_shortcut() {
        let ctx = post_context();
        let node = WhereNode::scalar("title", ScalarFilter::Equals(sql_fragment::Value::text("Hi")));
        let (sql, params) = build_where(&ctx, &node).unwrap().render(PlaceholderStyle::Dollar);
        assert_eq!(sql, "\"t0\".\"title\" = $1");
        assert_eq!(params.len(), 1);

        let node = WhereNode::scalar("title", ScalarFilter::Equals(sql_fragment::Value::Null));
        let (sql, params) = build_where(&ctx, &node).unwrap().render(PlaceholderStyle::Dollar);
        assert_eq!(sql, "\"t0\".\"title\" IS NULL");
        assert!(params.is_empty());
    }

    #[test]
    fn empty_in_list_is_unsatisfiable_not_a_comparison_error() {
        let ctx = post_context();
        let node = WhereNode::scalar("title", ScalarFilter::In(vec![]));
        let (sql, _) = build_where(&ctx, &node).unwrap().render(PlaceholderStyle::Dollar);
        assert_eq!(sql, "1 = 0");
    }

    #[test]
    fn empty_not_in_list_is_elided() {
        let ctx = post_context();
        let node = WhereNode::scalar("title", ScalarFilter::NotIn(vec![]));
        let f = build_where(&ctx, &node).unwrap();
        assert!(f.is_empty());
    }

    #[test]
    fn empty_logical_groups_are_elided() {
        let ctx = post_context();
        let node = WhereNode::all(vec![]);
        assert!(build_where(&ctx, &node).unwrap().is_empty());
    }

    #[test]
    fn where_unique_rejects_non_unique_shape() {
        let ctx = post_context();
        let unique = WhereUnique::Single { field: "title".into(), value: sql_fragment::Value::text("x") };
        assert!(build_where_unique(&ctx, &unique).is_err());
    }

    #[test]
    fn where_unique_accepts_declared_unique() {
        let ctx = post_context();
        let unique = WhereUnique::Single { field: "id".into(), value: sql_fragment::Value::text("P1") };
        let (sql, _) = build_where_unique(&ctx, &unique).unwrap().render(PlaceholderStyle::Dollar);
        assert_eq!(sql, "\"t0\".\"id\" = $1");
    }
}
