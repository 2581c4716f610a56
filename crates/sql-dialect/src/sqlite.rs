use sql_fragment::{Fragment, PlaceholderStyle};

use crate::capability::{Capabilities, Capability};
use crate::dialect::Dialect;

/// SQLite adapter: positional `?N` placeholders. Treated as lacking
/// `RETURNING` (the planner falls back to `last_insert_rowid()`) and
/// lateral joins; list-typed scalars are emulated through the `json1`
/// extension (`json_each`, `json_extract`).
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::QuestionIndexed
    }

    fn capabilities(&self) -> Capabilities {
        Capability::Transactions | Capability::NullsOrdering
    }

    fn escape_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

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
        Fragment::raw("json_object(").append(Fragment::join(inner, ", ")).append(Fragment::raw(")"))
    }

    fn json_empty_array(&self) -> Fragment {
        Fragment::raw("json_array()")
    }

    fn json_agg(&self, expr: Fragment) -> Fragment {
        Fragment::raw("COALESCE(json_group_array(")
            .append(expr)
            .append(Fragment::raw("), "))
            .append(self.json_empty_array())
            .append(Fragment::raw(")"))
    }

    fn json_extract(&self, expr: Fragment, path: &str) -> Fragment {
        Fragment::raw("json_extract(").append(expr).append(Fragment::raw(format!(", '$.{}')", path)))
    }

    fn json_extract_text(&self, expr: Fragment, path: &str) -> Fragment {
        Fragment::raw("CAST(json_extract(")
            .append(expr)
            .append(Fragment::raw(format!(", '$.{}')", path)))
            .append(Fragment::raw(" AS TEXT)"))
    }

    fn array_has(&self, col: Fragment, value: Fragment) -> Fragment {
        Fragment::raw("EXISTS (SELECT 1 FROM json_each(")
            .append(col)
            .append(Fragment::raw(") WHERE json_each.value = "))
            .append(value)
            .append(Fragment::raw(")"))
    }

    fn array_has_every(&self, col: Fragment, values: Fragment) -> Fragment {
        Fragment::raw("NOT EXISTS (SELECT 1 FROM json_each(")
            .append(values)
            .append(Fragment::raw(") AS needle WHERE needle.value NOT IN (SELECT value FROM json_each("))
            .append(col)
            .append(Fragment::raw(")))"))
    }

    fn array_has_some(&self, col: Fragment, values: Fragment) -> Fragment {
        Fragment::raw("EXISTS (SELECT 1 FROM json_each(")
            .append(values)
            .append(Fragment::raw(") AS needle WHERE needle.value IN (SELECT value FROM json_each("))
            .append(col)
            .append(Fragment::raw(")))"))
    }

    fn array_is_empty(&self, col: Fragment) -> Fragment {
        Fragment::raw("json_array_length(").append(col).append(Fragment::raw(") = 0"))
    }

    fn array_append(&self, col: Fragment, value: Fragment) -> Fragment {
        Fragment::raw("json_insert(").append(col).append(Fragment::raw(", '$[#]', ")).append(value).append(Fragment::raw(")"))
    }

    fn array_prepend(&self, col: Fragment, value: Fragment) -> Fragment {
        Fragment::raw("json_insert(").append(col).append(Fragment::raw(", '$[0]', ")).append(value).append(Fragment::raw(")"))
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
        Fragment::raw("SELECT last_insert_rowid() AS id")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positional_placeholders_are_numbered() {
        let d = SqliteDialect;
        let f = Fragment::param(1i32).append(Fragment::raw(",")).append(Fragment::param(2i32));
        let (sql, _) = f.render(d.placeholder_style());
        assert_eq!(sql, "?1,?2");
    }
}
