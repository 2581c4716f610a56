//! Result Parser (C9, §4.12): reconstructs schema-typed records from driver
//! rows, walking relation trees the same way the builder walked `select`/
//! `include`, and collapsing `count`/`aggregate`/`groupBy`/batch results
//! into their lighter shapes.
//!
//! `aggregate`/`groupBy` don't render `_avg`/`_sum`/… as nested JSON objects
//! at the SQL level — `sql_query_builder::build_aggregate` emits one flat
//! aliased column per request. The facade names those columns
//! `"<group>.<field>"` (a bare name, no dot, for the rowcount `_count`); the
//! regrouping back into nested objects happens here instead, by splitting
//! on the first `.`. Recorded as a deliberate split of responsibility in
//! DESIGN.md.

use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
use indexmap::IndexMap;
use query_structure::{Model, ModelRegistry, RelationInfo, ScalarType};
use serde_json::Value as Json;
use sql_fragment::Value;

use crate::connector::{ExecuteResult, Row};
use crate::error::QueryError;
use crate::validator::json_to_value;

/// A schema-typed result value: a leaf [`Value`] for scalars, a nested
/// record/list for relations. The read-side mirror of
/// [`sql_query_builder::args::DataRecord`] on the write side.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedValue {
    Scalar(Value),
    Record(IndexMap<String, ParsedValue>),
    List(Vec<ParsedValue>),
    Null,
}

impl ParsedValue {
    pub fn as_record(&self) -> Option<&IndexMap<String, ParsedValue>> {
        match self {
            ParsedValue::Record(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            ParsedValue::Scalar(v) => Some(v),
            _ => None,
        }
    }
}

fn relation_lookup_err(e: query_structure::SchemaError) -> QueryError {
    QueryError::ConnectorError(format!("relation lookup failed while parsing result row: {e}"))
}

/// Parses one `find`/`create`/`update`/`upsert` row for `model` into a typed
/// record (§4.12).
pub fn parse_record(model: &Model, registry: &ModelRegistry, row: &Row) -> Result<ParsedValue, QueryError> {
    let mut out = IndexMap::new();
    let mut counts = IndexMap::new();

    for (key, value) in row {
        if let Some(rel_name) = key.strip_prefix("_count_") {
            counts.insert(rel_name.to_owned(), ParsedValue::Scalar(value.clone()));
            continue;
        }
        if let Some(field) = model.scalar(key) {
            out.insert(key.clone(), parse_scalar_value(field.r#type, value.clone()));
            continue;
        }
        if model.relation_named(key).is_some() {
            let info = RelationInfo::resolve(registry, model, key).map_err(relation_lookup_err)?;
            out.insert(key.clone(), parse_relation_value(&info, registry, value)?);
            continue;
        }
        out.insert(key.clone(), parse_generic_value(value.clone()));
    }

    if !counts.is_empty() {
        out.insert("_count".to_owned(), ParsedValue::Record(counts));
    }

    Ok(ParsedValue::Record(out))
}

/// Parses every row in a `findMany`-style result set.
pub fn parse_records(model: &Model, registry: &ModelRegistry, rows: &[Row]) -> Result<Vec<ParsedValue>, QueryError> {
    rows.iter().map(|row| parse_record(model, registry, row)).collect()
}

fn parse_scalar_value(ty: ScalarType, value: Value) -> ParsedValue {
    if value.is_null() {
        return ParsedValue::Null;
    }
    match ty {
        ScalarType::DateTime => ParsedValue::Scalar(coerce_datetime(value)),
        ScalarType::Date => ParsedValue::Scalar(coerce_date(value)),
        ScalarType::Time => ParsedValue::Scalar(coerce_time(value)),
        ScalarType::BigInt => ParsedValue::Scalar(coerce_bigint(value)),
        ScalarType::Json => ParsedValue::Scalar(coerce_json(value)),
        _ => ParsedValue::Scalar(value),
    }
}

fn coerce_datetime(value: Value) -> Value {
    match value {
        Value::DateTime(_) => value,
        Value::Text(ref s) => {
            chrono::DateTime::parse_from_rfc3339(s).map(|dt| Value::DateTime(dt.with_timezone(&Utc))).unwrap_or_else(|_| value.clone())
        }
        Value::Int64(ms) => Utc.timestamp_millis_opt(ms).single().map(Value::DateTime).unwrap_or(Value::Int64(ms)),
        Value::Int32(ms) => Utc.timestamp_millis_opt(ms as i64).single().map(Value::DateTime).unwrap_or(Value::Int32(ms)),
        other => other,
    }
}

fn coerce_date(value: Value) -> Value {
    match value {
        Value::Date(_) => value,
        Value::Text(ref s) => NaiveDate::parse_from_str(s, "%Y-%m-%d").map(Value::Date).unwrap_or_else(|_| value.clone()),
        other => other,
    }
}

fn coerce_time(value: Value) -> Value {
    match value {
        Value::Time(_) => value,
        Value::Text(ref s) => NaiveTime::parse_from_str(s, "%H:%M:%S%.f")
            .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
            .map(Value::Time)
            .unwrap_or_else(|_| value.clone()),
        other => other,
    }
}

fn coerce_bigint(value: Value) -> Value {
    match value {
        Value::BigInt(_) => value,
        Value::Int64(i) => Value::BigInt(i as i128),
        Value::Int32(i) => Value::BigInt(i as i128),
        Value::Text(ref s) => s.trim().parse::<i128>().map(Value::BigInt).unwrap_or_else(|_| value.clone()),
        other => other,
    }
}

fn coerce_json(value: Value) -> Value {
    match value {
        Value::Json(_) => value,
        Value::Text(ref s) => serde_json::from_str::<Json>(s).map(Value::Json).unwrap_or_else(|_| value.clone()),
        other => other,
    }
}

/// Generic parse for a column that matches neither a scalar nor a relation
/// on the model — a string-heuristic JSON parse, dates/buffers preserved
/// as-is.
fn parse_generic_value(value: Value) -> ParsedValue {
    match value {
        Value::Null => ParsedValue::Null,
        Value::Text(s) => match serde_json::from_str::<Json>(&s) {
            Ok(j @ (Json::Object(_) | Json::Array(_))) => ParsedValue::Scalar(Value::Json(j)),
            _ => ParsedValue::Scalar(Value::Text(s)),
        },
        other => ParsedValue::Scalar(other),
    }
}

fn parse_relation_value(info: &RelationInfo, registry: &ModelRegistry, value: &Value) -> Result<ParsedValue, QueryError> {
    match value {
        Value::Null => Ok(if info.is_to_many() { ParsedValue::List(Vec::new()) } else { ParsedValue::Null }),
        Value::Json(json) => parse_relation_json(info, registry, json),
        other => Err(QueryError::ConnectorError(format!("relation `{}` column arrived as `{other:?}`, expected JSON", info.name))),
    }
}

fn parse_relation_json(info: &RelationInfo, registry: &ModelRegistry, json: &Json) -> Result<ParsedValue, QueryError> {
    if info.is_to_many() {
        let items: &Vec<Json> = match json {
            Json::Array(items) => items,
            Json::Null => return Ok(ParsedValue::List(Vec::new())),
            other => return Err(QueryError::ConnectorError(format!("expected a JSON array for relation `{}`, found `{other}`", info.name))),
        };
        let parsed = items.iter().map(|item| parse_json_record(&info.target_model, registry, item)).collect::<Result<Vec<_>, _>>()?;
        Ok(ParsedValue::List(parsed))
    } else {
        parse_json_record(&info.target_model, registry, json)
    }
}

fn parse_json_record(model: &Model, registry: &ModelRegistry, json: &Json) -> Result<ParsedValue, QueryError> {
    let obj = match json {
        Json::Null => return Ok(ParsedValue::Null),
        Json::Object(obj) => obj,
        other => return Err(QueryError::ConnectorError(format!("expected a JSON object for `{}`, found `{other}`", model.name))),
    };

    let mut out = IndexMap::new();
    for (key, value) in obj {
        if let Some(field) = model.scalar(key) {
            out.insert(key.clone(), parse_scalar_json(field.r#type, value));
            continue;
        }
        if model.relation_named(key).is_some() {
            let info = RelationInfo::resolve(registry, model, key).map_err(relation_lookup_err)?;
            out.insert(key.clone(), parse_relation_json(&info, registry, value)?);
            continue;
        }
        out.insert(key.clone(), ParsedValue::Scalar(json_to_value(value)));
    }
    Ok(ParsedValue::Record(out))
}

fn parse_scalar_json(ty: ScalarType, json: &Json) -> ParsedValue {
    if json.is_null() {
        return ParsedValue::Null;
    }
    match ty {
        ScalarType::DateTime => ParsedValue::Scalar(coerce_datetime(json_to_value(json))),
        ScalarType::Date => ParsedValue::Scalar(coerce_date(json_to_value(json))),
        ScalarType::Time => ParsedValue::Scalar(coerce_time(json_to_value(json))),
        ScalarType::BigInt => ParsedValue::Scalar(coerce_bigint(json_to_value(json))),
        ScalarType::Json => ParsedValue::Scalar(match json {
            Json::String(s) => serde_json::from_str(s).map(Value::Json).unwrap_or_else(|_| Value::Text(s.clone())),
            other => Value::Json(other.clone()),
        }),
        _ => ParsedValue::Scalar(json_to_value(json)),
    }
}

/// `exist` — collapses the single `"exists"` column to a plain bool.
pub fn parse_exist_result(row: &Row) -> bool {
    matches!(row.get("exists"), Some(Value::Boolean(true)))
}

/// `count` — a bare number with no `select`, a `{field: count}` map when one
/// was given (§4.12 "Count operations collapse").
pub fn parse_count_result(row: &Row, select: Option<&[String]>) -> ParsedValue {
    match select {
        None => row.get("_all").cloned().map(ParsedValue::Scalar).unwrap_or(ParsedValue::Scalar(Value::Int64(0))),
        Some(fields) => {
            let mut out = IndexMap::new();
            for field in fields {
                if let Some(v) = row.get(field) {
                    out.insert(field.clone(), ParsedValue::Scalar(v.clone()));
                }
            }
            ParsedValue::Record(out)
        }
    }
}

/// `aggregate` — regroups the flat `"<group>.<field>"`/bare-group aliased
/// columns `build_aggregate` emits back into nested `_avg`/`_sum`/… objects.
pub fn parse_aggregate_row(row: &Row) -> ParsedValue {
    regroup(row)
}

/// `groupBy` — like [`parse_aggregate_row`], but columns matching a scalar
/// field on `model` (the `by` columns) get type-aware conversion too.
pub fn parse_group_by_row(model: &Model, row: &Row) -> ParsedValue {
    let mut out: IndexMap<String, ParsedValue> = IndexMap::new();
    for (key, value) in row {
        if let Some((group, field)) = key.split_once('.') {
            insert_grouped(&mut out, group, field, value.clone());
            continue;
        }
        if let Some(field) = model.scalar(key) {
            out.insert(key.clone(), parse_scalar_value(field.r#type, value.clone()));
        } else {
            out.insert(key.clone(), ParsedValue::Scalar(value.clone()));
        }
    }
    ParsedValue::Record(out)
}

pub fn parse_group_by_rows(model: &Model, rows: &[Row]) -> Vec<ParsedValue> {
    rows.iter().map(|row| parse_group_by_row(model, row)).collect()
}

fn regroup(row: &Row) -> ParsedValue {
    let mut out: IndexMap<String, ParsedValue> = IndexMap::new();
    for (key, value) in row {
        match key.split_once('.') {
            Some((group, field)) => insert_grouped(&mut out, group, field, value.clone()),
            None => {
                out.insert(key.clone(), ParsedValue::Scalar(value.clone()));
            }
        }
    }
    ParsedValue::Record(out)
}

fn insert_grouped(out: &mut IndexMap<String, ParsedValue>, group: &str, field: &str, value: Value) {
    let entry = out.entry(group.to_owned()).or_insert_with(|| ParsedValue::Record(IndexMap::new()));
    if let ParsedValue::Record(map) = entry {
        map.insert(field.to_owned(), ParsedValue::Scalar(value));
    }
}

/// `createMany`/`updateMany`/`deleteMany` — `{count}` from the driver's
/// reported affected-rows (§4.12 "Batch operations").
pub fn parse_batch_result(result: &ExecuteResult) -> ParsedValue {
    let mut out = IndexMap::new();
    out.insert("count".to_owned(), ParsedValue::Scalar(Value::Int64(result.row_count as i64)));
    ParsedValue::Record(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use query_structure::{Field, Relation, RelationKind};
    use std::collections::HashMap;

    fn schema() -> ModelRegistry {
        let author = Model::new("Author")
            .mapped_to("authors")
            .field(Field::new("id", ScalarType::String).id())
            .field(Field::new("name", ScalarType::String))
            .relation(Relation::new("posts", RelationKind::OneToMany, "Post"));
        let post = Model::new("Post")
            .mapped_to("posts")
            .field(Field::new("id", ScalarType::String).id())
            .field(Field::new("title", ScalarType::String))
            .field(Field::new("publishedAt", ScalarType::DateTime).nullable())
            .field(Field::new("views", ScalarType::BigInt))
            .field(Field::new("authorId", ScalarType::String))
            .relation(Relation::new("author", RelationKind::ManyToOne, "Author").with_fk(vec!["authorId".into()], vec!["id".into()]));
        ModelRegistry::new([author, post]).unwrap()
    }

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect::<HashMap<_, _>>()
    }

    #[test]
    fn scalar_fields_pass_through_and_datetime_string_parses() {
        let registry = schema();
        let post = registry.resolve("Post").unwrap();
        let r = row(&[
            ("id", Value::text("P1")),
            ("title", Value::text("Hello")),
            ("publishedAt", Value::Text("2024-01-02T03:04:05Z".to_string())),
            ("views", Value::Int64(42)),
            ("authorId", Value::text("A1")),
        ]);
        let parsed = parse_record(&post, &registry, &r).unwrap();
        let record = parsed.as_record().unwrap();
        assert!(matches!(record.get("publishedAt"), Some(ParsedValue::Scalar(Value::DateTime(_)))));
        assert_eq!(record.get("views"), Some(&ParsedValue::Scalar(Value::BigInt(42))));
    }

    #[test]
    fn null_scalar_becomes_parsed_null_regardless_of_type() {
        let registry = schema();
        let post = registry.resolve("Post").unwrap();
        let r = row(&[
            ("id", Value::text("P1")),
            ("title", Value::text("Hello")),
            ("publishedAt", Value::Null),
            ("views", Value::Int64(0)),
            ("authorId", Value::text("A1")),
        ]);
        let parsed = parse_record(&post, &registry, &r).unwrap();
        assert_eq!(parsed.as_record().unwrap().get("publishedAt"), Some(&ParsedValue::Null));
    }

    #[test]
    fn to_many_relation_json_array_recurses_per_item() {
        let registry = schema();
        let author = registry.resolve("Author").unwrap();
        let posts_json = serde_json::json!([
            {"id": "P1", "title": "A", "publishedAt": null, "views": 3, "authorId": "A1"},
            {"id": "P2", "title": "B", "publishedAt": "2024-06-01T00:00:00Z", "views": 7, "authorId": "A1"},
        ]);
        let r = row(&[("id", Value::text("A1")), ("name", Value::text("Ada")), ("posts", Value::Json(posts_json))]);
        let parsed = parse_record(&author, &registry, &r).unwrap();
        let ParsedValue::List(items) = parsed.as_record().unwrap().get("posts").unwrap() else { panic!("expected a list") };
        assert_eq!(items.len(), 2);
        let first = items[0].as_record().unwrap();
        assert_eq!(first.get("views"), Some(&ParsedValue::Scalar(Value::BigInt(3))));
        let second = items[1].as_record().unwrap();
        assert!(matches!(second.get("publishedAt"), Some(ParsedValue::Scalar(Value::DateTime(_)))));
    }

    #[test]
    fn to_many_relation_empty_array_stays_an_empty_list() {
        let registry = schema();
        let author = registry.resolve("Author").unwrap();
        let r = row(&[("id", Value::text("A1")), ("name", Value::text("Ada")), ("posts", Value::Json(serde_json::json!([])))]);
        let parsed = parse_record(&author, &registry, &r).unwrap();
        assert_eq!(parsed.as_record().unwrap().get("posts"), Some(&ParsedValue::List(Vec::new())));
    }

    #[test]
    fn to_one_relation_null_stays_null() {
        let registry = schema();
        let post = registry.resolve("Post").unwrap();
        let r = row(&[
            ("id", Value::text("P1")),
            ("title", Value::text("Hello")),
            ("publishedAt", Value::Null),
            ("views", Value::Int64(0)),
            ("authorId", Value::text("A1")),
            ("author", Value::Null),
        ]);
        let parsed = parse_record(&post, &registry, &r).unwrap();
        assert_eq!(parsed.as_record().unwrap().get("author"), Some(&ParsedValue::Null));
    }

    #[test]
    fn relation_include_count_collapses_to_nested_count_map() {
        let registry = schema();
        let author = registry.resolve("Author").unwrap();
        let r = row(&[("id", Value::text("A1")), ("name", Value::text("Ada")), ("_count_posts", Value::Int64(5))]);
        let parsed = parse_record(&author, &registry, &r).unwrap();
        let counts = parsed.as_record().unwrap().get("_count").unwrap().as_record().unwrap();
        assert_eq!(counts.get("posts"), Some(&ParsedValue::Scalar(Value::Int64(5))));
    }

    #[test]
    fn count_without_select_collapses_to_bare_number() {
        let r = row(&[("_all", Value::Int64(12))]);
        let parsed = parse_count_result(&r, None);
        assert_eq!(parsed, ParsedValue::Scalar(Value::Int64(12)));
    }

    #[test]
    fn count_with_select_collapses_to_field_keyed_map() {
        let r = row(&[("title", Value::Int64(3)), ("authorId", Value::Int64(2))]);
        let parsed = parse_count_result(&r, Some(&["title".to_string(), "authorId".to_string()]));
        let map = parsed.as_record().unwrap();
        assert_eq!(map.get("title"), Some(&ParsedValue::Scalar(Value::Int64(3))));
    }

    #[test]
    fn aggregate_row_regroups_dotted_columns_into_nested_objects() {
        let r = row(&[("_count", Value::Int64(10)), ("_avg.views", Value::Double(4.5))]);
        let parsed = parse_aggregate_row(&r);
        let map = parsed.as_record().unwrap();
        assert_eq!(map.get("_count"), Some(&ParsedValue::Scalar(Value::Int64(10))));
        let avg = map.get("_avg").unwrap().as_record().unwrap();
        assert_eq!(avg.get("views"), Some(&ParsedValue::Scalar(Value::Double(4.5))));
    }

    #[test]
    fn group_by_row_type_converts_the_by_column() {
        let registry = schema();
        let post = registry.resolve("Post").unwrap();
        let r = row(&[("authorId", Value::text("A1")), ("_count.id", Value::Int64(6))]);
        let parsed = parse_group_by_row(&post, &r);
        let map = parsed.as_record().unwrap();
        assert_eq!(map.get("authorId"), Some(&ParsedValue::Scalar(Value::text("A1"))));
        let count = map.get("_count").unwrap().as_record().unwrap();
        assert_eq!(count.get("id"), Some(&ParsedValue::Scalar(Value::Int64(6))));
    }

    #[test]
    fn batch_result_reports_driver_row_count() {
        let result = ExecuteResult { rows: Vec::new(), row_count: 4 };
        let parsed = parse_batch_result(&result);
        assert_eq!(parsed.as_record().unwrap().get("count"), Some(&ParsedValue::Scalar(Value::Int64(4))));
    }

    #[test]
    fn exist_result_reads_the_boolean_column() {
        let r = row(&[("exists", Value::Boolean(true))]);
        assert!(parse_exist_result(&r));
        let r2 = row(&[("exists", Value::Boolean(false))]);
        assert!(!parse_exist_result(&r2));
    }
}
