use sql_fragment::{Fragment, PlaceholderStyle, Value};

use crate::capability::Capabilities;
use crate::error::DialectError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullsOrder {
    First,
    Last,
}

/// The capability-rich bundle of pure functions every fragment builder
/// composes through.
///
/// Every dialect-specific decision in the compiler is expressed as a call
/// into one of these methods, or a check against [`Dialect::capabilities`].
/// Nothing above this crate is allowed to match on a dialect name: if a
/// builder needs to do something differently per dialect, that difference
/// belongs here as a new method or a new capability flag.
pub trait Dialect: Send + Sync {
    fn name(&self) -> &'static str;
    fn placeholder_style(&self) -> PlaceholderStyle;
    fn capabilities(&self) -> Capabilities;

    fn has(&self, capability: crate::capability::Capability) -> bool {
        self.capabilities().contains(capability)
    }

    // -- identifiers ---------------------------------------------------
    fn escape_identifier(&self, name: &str) -> String;

    fn qualified_column(&self, alias: &str, field: &str) -> Fragment {
        Fragment::raw(format!(
            "{}.{}",
            self.escape_identifier(alias),
            self.escape_identifier(field)
        ))
    }

    fn aliased_table(&self, table: &str, alias: &str) -> Fragment {
        Fragment::raw(format!(
            "{} {}",
            self.escape_identifier(table),
            self.escape_identifier(alias)
        ))
    }

    // -- literals --------------------------------------------------------
    /// Dialect-correct encoding of a JSON-typed scalar value for use in an
    /// INSERT/UPDATE values list. All dialects parameterize the JSON text
    /// itself; this only matters for `NULL` vs the JSON `null` literal.
    fn json_literal(&self, value: &serde_json::Value) -> Fragment {
        Fragment::param(Value::Json(value.clone()))
    }

    // -- operators ---------------------------------------------------------
    fn eq(&self, lhs: Fragment, rhs: Fragment) -> Fragment {
        lhs.append(Fragment::raw(" = ")).append(rhs)
    }
    fn neq(&self, lhs: Fragment, rhs: Fragment) -> Fragment {
        lhs.append(Fragment::raw(" <> ")).append(rhs)
    }
    fn lt(&self, lhs: Fragment, rhs: Fragment) -> Fragment {
        lhs.append(Fragment::raw(" < ")).append(rhs)
    }
    fn lte(&self, lhs: Fragment, rhs: Fragment) -> Fragment {
        lhs.append(Fragment::raw(" <= ")).append(rhs)
    }
    fn gt(&self, lhs: Fragment, rhs: Fragment) -> Fragment {
        lhs.append(Fragment::raw(" > ")).append(rhs)
    }
    fn gte(&self, lhs: Fragment, rhs: Fragment) -> Fragment {
        lhs.append(Fragment::raw(" >= ")).append(rhs)
    }
    fn like(&self, lhs: Fragment, pattern: Fragment) -> Fragment {
        lhs.append(Fragment::raw(" LIKE ")).append(pattern)
    }
    fn not_like(&self, lhs: Fragment, pattern: Fragment) -> Fragment {
        lhs.append(Fragment::raw(" NOT LIKE ")).append(pattern)
    }
    /// Case-insensitive LIKE. Dialects without native support (MySQL's
    /// default collation already is, SQLite is not) degrade to a portable
    /// `LOWER(lhs) LIKE LOWER(pattern)` rewrite rather than erroring.
    fn ilike(&self, lhs: Fragment, pattern: Fragment) -> Fragment;
    fn not_ilike(&self, lhs: Fragment, pattern: Fragment) -> Fragment;
    fn in_list(&self, lhs: Fragment, rhs: Fragment) -> Fragment {
        lhs.append(Fragment::raw(" IN ")).append(rhs)
    }
    fn not_in_list(&self, lhs: Fragment, rhs: Fragment) -> Fragment {
        lhs.append(Fragment::raw(" NOT IN ")).append(rhs)
    }
    fn is_null(&self, lhs: Fragment) -> Fragment {
        lhs.append(Fragment::raw(" IS NULL"))
    }
    fn is_not_null(&self, lhs: Fragment) -> Fragment {
        lhs.append(Fragment::raw(" IS NOT NULL"))
    }
    fn between(&self, lhs: Fragment, low: Fragment, high: Fragment) -> Fragment {
        lhs.append(Fragment::raw(" BETWEEN ")).append(low).append(Fragment::raw(" AND ")).append(high)
    }
    fn not_between(&self, lhs: Fragment, low: Fragment, high: Fragment) -> Fragment {
        lhs.append(Fragment::raw(" NOT BETWEEN ")).append(low).append(Fragment::raw(" AND ")).append(high)
    }
    fn and(&self, parts: Vec<Fragment>) -> Fragment {
        Fragment::join(parts.into_iter().map(|p| p.parenthesized()), " AND ")
    }
    fn or(&self, parts: Vec<Fragment>) -> Fragment {
        Fragment::join(parts.into_iter().map(|p| p.parenthesized()), " OR ")
    }
    fn not(&self, inner: Fragment) -> Fragment {
        Fragment::raw("NOT ").append(inner.parenthesized())
    }
    fn exists(&self, subquery: Fragment) -> Fragment {
        Fragment::raw("EXISTS ").append(subquery.parenthesized())
    }
    fn not_exists(&self, subquery: Fragment) -> Fragment {
        Fragment::raw("NOT EXISTS ").append(subquery.parenthesized())
    }

    // -- relation filter shapes (4.4) --------------------------------------
    fn filter_some(&self, subquery: Fragment) -> Fragment {
        self.exists(subquery)
    }
    fn filter_none(&self, subquery: Fragment) -> Fragment {
        self.not_exists(subquery)
    }
    /// `every` is "no counter-example exists": the caller must already have
    /// negated the inner predicate before handing the subquery here.
    fn filter_every(&self, subquery_with_negated_inner: Fragment) -> Fragment {
        self.not_exists(subquery_with_negated_inner)
    }

    // -- JSON (every JSON construction goes through here) ------------------
    fn json_object(&self, pairs: &[(String, Fragment)]) -> Fragment;
    fn json_object_from_columns(&self, pairs: &[(String, Fragment)]) -> Fragment {
        self.json_object(pairs)
    }
    fn json_empty_array(&self) -> Fragment;
    /// `COALESCE(<dialect aggregate>(expr), <empty array literal>)` — never
    /// produces SQL NULL for a to-many relation.
    fn json_agg(&self, expr: Fragment) -> Fragment;
    fn json_extract(&self, expr: Fragment, path: &str) -> Fragment;
    fn json_extract_text(&self, expr: Fragment, path: &str) -> Fragment;

    // -- arrays / lists (has, hasEvery, hasSome, isEmpty) ------------------
    fn array_has(&self, col: Fragment, value: Fragment) -> Fragment;
    fn array_has_every(&self, col: Fragment, values: Fragment) -> Fragment;
    fn array_has_some(&self, col: Fragment, values: Fragment) -> Fragment;
    fn array_is_empty(&self, col: Fragment) -> Fragment;
    fn array_append(&self, col: Fragment, value: Fragment) -> Fragment;
    fn array_prepend(&self, col: Fragment, value: Fragment) -> Fragment;

    // -- ordering ------------------------------------------------------
    fn order_by(&self, expr: Fragment, direction: SortDirection, nulls: Option<NullsOrder>) -> Fragment {
        let dir = match direction {
            SortDirection::Asc => " ASC",
            SortDirection::Desc => " DESC",
        };
        let mut out = expr.append(Fragment::raw(dir));
        if let Some(n) = nulls {
            if self.has(crate::capability::Capability::NullsOrdering) {
                out = out.append(Fragment::raw(match n {
                    NullsOrder::First => " NULLS FIRST",
                    NullsOrder::Last => " NULLS LAST",
                }));
            }
            // degrades to a no-op where NULLS FIRST/LAST isn't supported.
        }
        out
    }

    // -- aggregates ------------------------------------------------------
    fn count_star(&self) -> Fragment {
        Fragment::raw("COUNT(*)")
    }
    fn count(&self, expr: Fragment) -> Fragment {
        Fragment::raw("COUNT(").append(expr).append(Fragment::raw(")"))
    }
    fn avg(&self, expr: Fragment) -> Fragment {
        Fragment::raw("AVG(").append(expr).append(Fragment::raw(")"))
    }
    fn sum(&self, expr: Fragment) -> Fragment {
        Fragment::raw("SUM(").append(expr).append(Fragment::raw(")"))
    }
    fn min(&self, expr: Fragment) -> Fragment {
        Fragment::raw("MIN(").append(expr).append(Fragment::raw(")"))
    }
    fn max(&self, expr: Fragment) -> Fragment {
        Fragment::raw("MAX(").append(expr).append(Fragment::raw(")"))
    }

    // -- joins -----------------------------------------------------------
    fn join_inner(&self, target: Fragment, on: Fragment) -> Fragment {
        Fragment::raw("INNER JOIN ").append(target).append(Fragment::raw(" ON ")).append(on)
    }
    fn join_left(&self, target: Fragment, on: Fragment) -> Fragment {
        Fragment::raw("LEFT JOIN ").append(target).append(Fragment::raw(" ON ")).append(on)
    }
    fn join_right(&self, target: Fragment, on: Fragment) -> Fragment {
        Fragment::raw("RIGHT JOIN ").append(target).append(Fragment::raw(" ON ")).append(on)
    }
    fn join_full(&self, target: Fragment, on: Fragment) -> Result<Fragment, DialectError> {
        if !self.has(crate::capability::Capability::FullOuterJoin) {
            return Err(DialectError::FeatureNotSupported { dialect: self.name(), feature: "FULL OUTER JOIN" });
        }
        Ok(Fragment::raw("FULL OUTER JOIN ").append(target).append(Fragment::raw(" ON ")).append(on))
    }
    fn join_cross(&self, target: Fragment) -> Fragment {
        Fragment::raw("CROSS JOIN ").append(target)
    }
    /// `LEFT JOIN LATERAL (subquery) alias ON TRUE`. Callers must check
    /// `capabilities().contains(Capability::LateralJoins)` first and fall
    /// back to the correlated-subquery plan otherwise.
    fn join_lateral_left(&self, alias: &str, subquery: Fragment) -> Result<Fragment, DialectError> {
        if !self.has(crate::capability::Capability::LateralJoins) {
            return Err(DialectError::FeatureNotSupported { dialect: self.name(), feature: "LATERAL join" });
        }
        Ok(Fragment::raw("LEFT JOIN LATERAL ")
            .append(subquery.parenthesized())
            .append(Fragment::raw(format!(" {} ON TRUE", self.escape_identifier(alias)))))
    }

    // -- mutations ---------------------------------------------------------
    fn insert(&self, table: Fragment, columns: &[String], rows: Vec<Vec<Fragment>>) -> Fragment {
        let cols = columns.iter().map(|c| self.escape_identifier(c)).collect::<Vec<_>>().join(", ");
        let rows_sql = Fragment::join(
            rows.into_iter().map(|row| Fragment::join(row, ", ").parenthesized()),
            ", ",
        );
        Fragment::raw("INSERT INTO ")
            .append(table)
            .append(Fragment::raw(format!(" ({}) VALUES ", cols)))
            .append(rows_sql)
    }

    fn update(&self, table: Fragment, assignments: Vec<Fragment>, where_: Fragment) -> Fragment {
        let mut out = Fragment::raw("UPDATE ").append(table).append(Fragment::raw(" SET ")).append(Fragment::join(assignments, ", "));
        if !where_.is_empty() {
            out = out.append(Fragment::raw(" WHERE ")).append(where_);
        }
        out
    }

    fn delete(&self, table: Fragment, where_: Fragment) -> Fragment {
        let mut out = Fragment::raw("DELETE FROM ").append(table);
        if !where_.is_empty() {
            out = out.append(Fragment::raw(" WHERE ")).append(where_);
        }
        out
    }

    /// Empty fragment on dialects without `RETURNING`.
    fn returning(&self, columns: Fragment) -> Fragment {
        if !self.has(crate::capability::Capability::Returning) || columns.is_empty() {
            return Fragment::empty();
        }
        Fragment::raw(" RETURNING ").append(columns)
    }

    fn on_conflict_do_nothing(&self, conflict_columns: &[String]) -> Fragment;
    fn on_conflict_do_update(&self, conflict_columns: &[String], assignments: Vec<Fragment>) -> Fragment;

    fn last_insert_id_query(&self, table: &str, pk_column: &str) -> Fragment;
}
