use query_structure::JunctionInfo;
use sql_fragment::Fragment;

use crate::context::QueryContext;

/// The three fragments every many-to-many consumer (include, relation
/// filter, `_count`) needs, resolved once per junction lookup (§4.7).
pub struct ManyToManyJoinParts {
    /// `jt.sourceField = parent.sourcePK`
    pub correlation: Fragment,
    /// `target.targetPK = jt.targetField`
    pub join_condition: Fragment,
    /// `junction jt, target t` — comma-joined aliased tables.
    pub from_clause: Fragment,
}

/// `parent_ctx` is the scope the junction correlates against (the parent
/// row); `junction_alias`/`target_ctx` are the aliases assigned to the
/// junction table and the target model respectively.
pub fn build(parent_ctx: &QueryContext, junction_alias: &str, target_ctx: &QueryContext, junction: &JunctionInfo) -> ManyToManyJoinParts {
    let d = &parent_ctx.dialect;

    let junction_table = d.aliased_table(&junction.table_name, junction_alias);
    let target_table = d.aliased_table(target_ctx.model.table_name(), &target_ctx.root_alias);
    let from_clause = Fragment::join([junction_table, target_table], ", ");

    let correlation = d.eq(
        d.qualified_column(junction_alias, &junction.source_column),
        d.qualified_column(&parent_ctx.root_alias, &junction.source_pk),
    );

    let join_condition = d.eq(
        d.qualified_column(&target_ctx.root_alias, &junction.target_pk),
        d.qualified_column(junction_alias, &junction.target_column),
    );

    ManyToManyJoinParts { correlation, join_condition, from_clause }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use sql_dialect::{Dialect, PlaceholderStyle};

    #[test]
    fn builds_junction_and_target_from_clause() {
        let post_ctx = post_context();
        let tag_model = post_ctx.registry.resolve("Tag").unwrap();
        let tag_ctx = post_ctx.descend(tag_model.clone());
        let relation = post_ctx.model.relation_named("tags").unwrap();
        let junction = JunctionInfo::resolve(&post_ctx.model, &tag_model, relation);

        let parts = build(&post_ctx, "t2", &tag_ctx, &junction);
        let (from_sql, _) = parts.from_clause.render(PlaceholderStyle::Dollar);
        assert_eq!(from_sql, "\"_PostToTag\" \"t2\", \"tags\" \"t1\"");

        let (corr_sql, _) = parts.correlation.render(PlaceholderStyle::Dollar);
        assert_eq!(corr_sql, "\"t2\".\"A\" = \"t0\".\"id\"");

        let (join_sql, _) = parts.join_condition.render(PlaceholderStyle::Dollar);
        assert_eq!(join_sql, "\"t1\".\"id\" = \"t2\".\"B\"");
    }
}
