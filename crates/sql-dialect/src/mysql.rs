use sql_fragment::{Fragment, PlaceholderStyle};

use crate::capability::{Capabilities, Capability};
use crate::dialect::Dialect;

/// MySQL adapter: unnumbered `?` placeholders, no `RETURNING`, no lateral
/// joins; arrays are emulated over a JSON column; `ON DUPLICATE KEY UPDATE`
/// stands in for `ON CONFLICT`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MysqlDialect;

impl Dialect for MysqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::Question
    }

    fn capabilities(&self) -> Capabilities {
        Capability::Transactions | Capability::CteWithMutations
    }

    fn escape_identifier(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    /// MySQL has no native `ILIKE`; degrade to a `LOWER()`-wrapped `LIKE`
    /// so results don't depend on the column's collation.
    fn ilike(&self, lhs: Fragment, pattern: Fragment) -> Fragment {
        Fragment::raw("LOWER(")
            .append(lhs)
            .append(Fragment::raw(") LIKE LOWER("))
            .append(pattern)
            .append(Fragment::raw(")"))
    }

    fn not_ilike(&self, lhs: Fragment, pattern: Fragment) -> Fragment {
        Fragment::raw("LOWER(")
            .append(lhs)
            .append(Fragment::raw(") NOT LIKE LOWER("))
            .append(pattern)
            .append(Fragment::raw(")"))
    }

    fn json_object(&self, pairs: &[(String, Fragment)]) -> Fragment {
        let mut inner = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            inner.push(Fragment::raw(format!("'{}', ", key.replace('\'', "''"))).append(value.clone()));
        }
        Fragment::raw("JSON_OBJECT(").append(Fragment::join(inner, ", ")).append(Fragment::raw(")"))
    }

    fn json_empty_array(&self) -> Fragment {
        Fragment::raw("JSON_ARRAY()")
    }

    fn json_agg(&self, expr: Fragment) -> Fragment {
        Fragment::raw("COALESCE(JSON_ARRAYAGG(")
            .append(expr)
            .append(Fragment::raw("), "))
            .append(self.json_empty_array())
            .append(Fragment::raw(")"))
    }

    fn json_extract(&self, expr: Fragment, path: &str) -> Fragment {
        Fragment::raw("JSON_EXTRACT(").append(expr).append(Fragment::raw(format!(", '$.{}')", path)))
    }

    fn json_extract_text(&self, expr: Fragment, path: &str) -> Fragment {
        Fragment::raw("JSON_UNQUOTE(JSON_EXTRACT(")
            .append(expr)
            .append(Fragment::raw(format!(", '$.{}')", path)))
            .append(Fragment::raw(")"))
    }

    fn array_has(&self, col: Fragment, value: Fragment) -> Fragment {
        Fragment::raw("JSON_CONTAINS(").append(col).append(Fragment::raw(", ")).append(value).append(Fragment::raw(")"))
    }

    fn array_has_every(&self, col: Fragment, values: Fragment) -> Fragment {
        Fragment::raw("JSON_CONTAINS(").append(col).append(Fragment::raw(", ")).append(values).append(Fragment::raw(")"))
    }

    fn array_has_some(&self, col: Fragment, values: Fragment) -> Fragment {
        Fragment::raw("JSON_OVERLAPS(").append(col).append(Fragment::raw(", ")).append(values).append(Fragment::raw(")"))
    }

    fn array_is_empty(&self, col: Fragment) -> Fragment {
        Fragment::raw("JSON_LENGTH(").append(col).append(Fragment::raw(") = 0"))
    }

    fn array_append(&self, col: Fragment, value: Fragment) -> Fragment {
        Fragment::raw("JSON_ARRAY_APPEND(").append(col).append(Fragment::raw(", '$', ")).append(value).append(Fragment::raw(")"))
    }

    fn array_prepend(&self, col: Fragment, value: Fragment) -> Fragment {
        Fragment::raw("JSON_ARRAY_INSERT(").append(col).append(Fragment::raw(", '$[0]', ")).append(value).append(Fragment::raw(")"))
    }

    /// MySQL has no `DO NOTHING` shape; the row's own conflicting column is
    /// reassigned to itself, leaving it unchanged while swallowing the
    /// duplicate-key error.
    fn on_conflict_do_nothing(&self, conflict_columns: &[String]) -> Fragment {
        let col = conflict_columns.first().map(|s| s.as_str()).unwrap_or("id");
        let escaped = self.escape_identifier(col);
        Fragment::raw(format!(" ON DUPLICATE KEY UPDATE {} = {}", escaped, escaped))
    }

    fn on_conflict_do_update(&self, _conflict_columns: &[String], assignments: Vec<Fragment>) -> Fragment {
        Fragment::raw(" ON DUPLICATE KEY UPDATE ").append(Fragment::join(assignments, ", "))
    }

    fn last_insert_id_query(&self, _table: &str, _pk_column: &str) -> Fragment {
        Fragment::raw("SELECT LAST_INSERT_ID() AS id")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_returning_capability() {
        let d = MysqlDialect;
        assert!(!d.has(Capability::Returning));
        assert!(d.returning(Fragment::raw("id")).is_empty());
    }

    #[test]
    fn ilike_degrades_to_lower_like() {
        let d = MysqlDialect;
        let (sql, _) = d.ilike(Fragment::raw("name"), Fragment::param("%a%")).render(d.placeholder_style());
        assert_eq!(sql, "LOWER(name) LIKE LOWER(?)");
    }
}
