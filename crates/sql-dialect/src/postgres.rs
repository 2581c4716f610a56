use sql_fragment::{Fragment, PlaceholderStyle};

use crate::capability::{Capabilities, Capability};
use crate::dialect::Dialect;

/// PostgreSQL adapter: `$n` placeholders, `RETURNING`, lateral joins,
/// native arrays, `json_build_object`/`json_agg`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgresql"
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::Dollar
    }

    fn capabilities(&self) -> Capabilities {
        Capability::Returning
            | Capability::CteWithMutations
            | Capability::FullOuterJoin
            | Capability::LateralJoins
            | Capability::Transactions
            | Capability::InsensitiveLike
            | Capability::NullsOrdering
            | Capability::ArrayType
    }

    fn escape_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn ilike(&self, lhs: Fragment, pattern: Fragment) -> Fragment {
        lhs.append(Fragment::raw(" ILIKE ")).append(pattern)
    }

    fn not_ilike(&self, lhs: Fragment, pattern: Fragment) -> Fragment {
        lhs.append(Fragment::raw(" NOT ILIKE ")).append(pattern)
    }

    fn json_object(&self, pairs: &[(String, Fragment)]) -> Fragment {
        let mut inner = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            inner.push(Fragment::raw(format!("'{}', ", key.replace('\'', "''"))).append(value.clone()));
        }
        Fragment::raw("json_build_object(").append(Fragment::join(inner, ", ")).append(Fragment::raw(")"))
    }

    fn json_empty_array(&self) -> Fragment {
        Fragment::raw("'[]'")
    }

    fn json_agg(&self, expr: Fragment) -> Fragment {
        Fragment::raw("COALESCE(json_agg(")
            .append(expr)
            .append(Fragment::raw("), "))
            .append(self.json_empty_array())
            .append(Fragment::raw(")"))
    }

    fn json_extract(&self, expr: Fragment, path: &str) -> Fragment {
        expr.append(Fragment::raw(format!("->'{}'", path.replace('\'', "''"))))
    }

    fn json_extract_text(&self, expr: Fragment, path: &str) -> Fragment {
        expr.append(Fragment::raw(format!("->>'{}'", path.replace('\'', "''"))))
    }

    fn array_has(&self, col: Fragment, value: Fragment) -> Fragment {
        value.append(Fragment::raw(" = ANY(")).append(col).append(Fragment::raw(")"))
    }

    fn array_has_every(&self, col: Fragment, values: Fragment) -> Fragment {
        col.append(Fragment::raw(" @> ")).append(values)
    }

    fn array_has_some(&self, col: Fragment, values: Fragment) -> Fragment {
        col.append(Fragment::raw(" && ")).append(values)
    }

    fn array_is_empty(&self, col: Fragment) -> Fragment {
        Fragment::raw("cardinality(").append(col).append(Fragment::raw(") = 0"))
    }

    fn array_append(&self, col: Fragment, value: Fragment) -> Fragment {
        Fragment::raw("array_append(").append(col).append(Fragment::raw(", ")).append(value).append(Fragment::raw(")"))
    }

    fn array_prepend(&self, col: Fragment, value: Fragment) -> Fragment {
        Fragment::raw("array_prepend(").append(value).append(Fragment::raw(", ")).append(col).append(Fragment::raw(")"))
    }

    fn on_conflict_do_nothing(&self, conflict_columns: &[String]) -> Fragment {
        if conflict_columns.is_empty() {
            return Fragment::raw(" ON CONFLICT DO NOTHING");
        }
        let cols = conflict_columns.iter().map(|c| self.escape_identifier(c)).collect::<Vec<_>>().join(", ");
        Fragment::raw(format!(" ON CONFLICT ({}) DO NOTHING", cols))
    }

    fn on_conflict_do_update(&self, conflict_columns: &[String], assignments: Vec<Fragment>) -> Fragment {
        let cols = conflict_columns.iter().map(|c| self.escape_identifier(c)).collect::<Vec<_>>().join(", ");
        Fragment::raw(format!(" ON CONFLICT ({}) DO UPDATE SET ", cols)).append(Fragment::join(assignments, ", "))
    }

    fn last_insert_id_query(&self, _table: &str, _pk_column: &str) -> Fragment {
        Fragment::raw("SELECT lastval() AS id")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_embedded_quotes() {
        let d = PostgresDialect;
        assert_eq!(d.escape_identifier(r#"weird"name"#), "\"weird\"\"name\"");
    }

    #[test]
    fn json_agg_never_nulls() {
        let d = PostgresDialect;
        let (sql, _) = d.json_agg(Fragment::raw("t._json")).render(d.placeholder_style());
        assert_eq!(sql, "COALESCE(json_agg(t._json), '[]')");
    }
}
