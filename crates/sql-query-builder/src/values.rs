use sql_fragment::{Fragment, Value};

use crate::context::QueryContext;
use crate::error::{BuildError, BuildResult};

/// Resolved INSERT shape: column list plus one `Fragment` row per record,
/// already dialect-escaped in column order (§4.8).
pub struct InsertRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Fragment>>,
}

/// Builds the column/row shape for an INSERT from one record's worth of
/// scalar assignments per row. Relation keys have already been stripped by
/// the nested-write planner by the time this runs.
pub fn build_insert_rows(ctx: &QueryContext, records: &[indexmap::IndexMap<String, Value>]) -> BuildResult<InsertRows> {
    let mut columns: Vec<String> = Vec::new();
    for record in records {
        for key in record.keys() {
            if !columns.contains(key) {
                columns.push(key.clone());
            }
        }
    }
    if columns.is_empty() {
        return Err(BuildError::Compile("insert with no columns".to_owned()));
    }

    let mut rows = Vec::with_capacity(records.len());
    for record in records {
        let mut row = Vec::with_capacity(columns.len());
        for field in &columns {
            let value = match record.get(field) {
                Some(v) => v.clone(),
                None => Value::Null,
            };
            row.push(literal_for_field(ctx, field, value)?);
        }
        rows.push(row);
    }

    let column_names: Vec<String> = columns
        .iter()
        .map(|field| ctx.model.scalar(field).map(|f| f.column_name().to_owned()).unwrap_or_else(|| field.clone()))
        .collect();

    Ok(InsertRows { columns: column_names, rows })
}

fn literal_for_field(ctx: &QueryContext, field: &str, value: Value) -> BuildResult<Fragment> {
    let is_json = ctx.model.scalar(field).map(|f| matches!(f.r#type, query_structure::ScalarType::Json)).unwrap_or(false);
    if is_json {
        if let Value::Json(json) = &value {
            return Ok(ctx.dialect.json_literal(json));
        }
    }
    Ok(Fragment::param(value))
}

/// Renders a full `INSERT INTO table (cols) VALUES (...), (...)` statement.
pub fn build_insert(ctx: &QueryContext, rows: InsertRows) -> Fragment {
    let table = Fragment::raw(ctx.dialect.escape_identifier(ctx.model.table_name()));
    ctx.dialect.insert(table, &rows.columns, rows.rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use indexmap::IndexMap;
    use sql_dialect::PlaceholderStyle;

    #[test]
    fn missing_field_in_a_row_emits_null() {
        let ctx = post_context();
        let mut r1 = IndexMap::new();
        r1.insert("title".to_string(), Value::text("A"));
        r1.insert("published".to_string(), Value::Boolean(true));
        let mut r2 = IndexMap::new();
        r2.insert("title".to_string(), Value::text("B"));

        let rows = build_insert_rows(&ctx, &[r1, r2]).unwrap();
        assert_eq!(rows.columns, vec!["title".to_string(), "published".to_string()]);
        let insert = build_insert(&ctx, rows);
        let (sql, params) = insert.render(PlaceholderStyle::Dollar);
        assert_eq!(sql, "INSERT INTO \"posts\" (\"title\", \"published\") VALUES ($1, $2), ($3, $4)");
        assert_eq!(params.len(), 4);
        assert!(matches!(params[3], Value::Null));
    }

    #[test]
    fn empty_records_is_an_error() {
        let ctx = post_context();
        let err = build_insert_rows(&ctx, &[]).unwrap_err();
        assert!(matches!(err, BuildError::Compile(_)));
    }
}
