//! Input Validator (C5, §4.2): normalizes raw JSON operation arguments
//! against a model's schema into the [`sql_query_builder::args`] vocabulary
//! the builders consume. Offline and pure — not a SQL-safety boundary,
//! which is fragment parameterization's job.

use indexmap::IndexMap;
use query_structure::{Model, ModelRegistry, RelationInfo, RelationKind};
use serde_json::Value as Json;
use sql_dialect::{NullsOrder, SortDirection};
use sql_fragment::Value;
use sql_query_builder::args::{
    Cursor, DataRecord, ManyTarget, OrderByEntry, Projected, Projection, RelationFilter, RelationMutation, RelationQueryArgs, ScalarFilter,
    ScalarWrite, WhereNode, WhereUnique,
};

use crate::error::QueryError;

fn invalid(operation: &str, model: &str, path: &str, message: impl Into<String>) -> QueryError {
    QueryError::InvalidInput { operation: operation.to_owned(), model: model.to_owned(), path: path.to_owned(), message: message.into() }
}

/// Normalizes a raw `where` object into a [`WhereNode`] (§4.2, §4.3).
/// Bare scalar values become `{equals: v}`; bare relation objects on a
/// to-one become `{is: payload}`; to-many relation keys must already use
/// `some`/`every`/`none` (there's no bare shorthand for them).
pub fn normalize_where(registry: &ModelRegistry, model: &Model, operation: &str, raw: &Json) -> Result<WhereNode, QueryError> {
    normalize_where_at(registry, model, operation, raw, "where")
}

fn normalize_where_at(registry: &ModelRegistry, model: &Model, operation: &str, raw: &Json, path: &str) -> Result<WhereNode, QueryError> {
    let obj = match raw {
        Json::Object(obj) => obj,
        Json::Null => return Ok(WhereNode::empty()),
        _ => return Err(invalid(operation, &model.name, path, "`where` must be an object")),
    };

    let mut node = WhereNode::empty();

    for (key, value) in obj {
        match key.as_str() {
            "AND" => node.and = normalize_group(registry, model, operation, value, &format!("{path}.AND"), true)?,
            "NOT" => {
                let children = normalize_group(registry, model, operation, value, &format!("{path}.NOT"), true)?;
                node.not.extend(children);
            }
            "OR" => node.or = normalize_group(registry, model, operation, value, &format!("{path}.OR"), false)?,
            _ if model.scalar(key).is_some() => {
                node.scalars.push((key.clone(), normalize_scalar_filter(operation, model, key, value, &format!("{path}.{key}"))?));
            }
            _ if model.relation_named(key).is_some() => {
                node.relations.push((key.clone(), normalize_relation_filter(registry, model, operation, key, value, &format!("{path}.{key}"))?));
            }
            _ => return Err(invalid(operation, &model.name, &format!("{path}.{key}"), format!("unknown key `{key}`"))),
        }
    }

    Ok(node)
}

fn normalize_group(
    registry: &ModelRegistry,
    model: &Model,
    operation: &str,
    raw: &Json,
    path: &str,
    accept_object: bool,
) -> Result<Vec<WhereNode>, QueryError> {
    match raw {
        Json::Array(items) => items.iter().map(|item| normalize_where_at(registry, model, operation, item, path)).collect(),
        Json::Object(_) if accept_object => Ok(vec![normalize_where_at(registry, model, operation, raw, path)?]),
        _ => Err(invalid(operation, &model.name, path, "must be an object or array")),
    }
}

fn normalize_scalar_filter(operation: &str, model: &Model, field: &str, raw: &Json, path: &str) -> Result<ScalarFilter, QueryError> {
    let obj = match raw {
        Json::Object(obj) => obj.clone(),
        Json::Null => return Ok(ScalarFilter::Equals(Value::Null)),
        other => return Ok(ScalarFilter::Equals(json_to_value(other))),
    };

    let insensitive = matches!(obj.get("mode"), Some(Json::String(m)) if m == "insensitive");

    if let Some(v) = obj.get("equals") {
        return Ok(ScalarFilter::Equals(json_to_value(v)));
    }
    if let Some(v) = obj.get("not") {
        let inner = normalize_scalar_filter(operation, model, field, v, path)?;
        return Ok(ScalarFilter::Not(Box::new(inner)));
    }
    if let Some(v) = obj.get("lt") {
        return Ok(ScalarFilter::Lt(json_to_value(v)));
    }
    if let Some(v) = obj.get("lte") {
        return Ok(ScalarFilter::Lte(json_to_value(v)));
    }
    if let Some(v) = obj.get("gt") {
        return Ok(ScalarFilter::Gt(json_to_value(v)));
    }
    if let Some(v) = obj.get("gte") {
        return Ok(ScalarFilter::Gte(json_to_value(v)));
    }
    if let Some(Json::Array(items)) = obj.get("in") {
        return Ok(ScalarFilter::In(items.iter().map(json_to_value).collect()));
    }
    if let Some(Json::Array(items)) = obj.get("notIn") {
        return Ok(ScalarFilter::NotIn(items.iter().map(json_to_value).collect()));
    }
    if let Some(Json::String(s)) = obj.get("contains") {
        return Ok(ScalarFilter::Contains { value: s.clone(), insensitive });
    }
    if let Some(Json::String(s)) = obj.get("startsWith") {
        return Ok(ScalarFilter::StartsWith { value: s.clone(), insensitive });
    }
    if let Some(Json::String(s)) = obj.get("endsWith") {
        return Ok(ScalarFilter::EndsWith { value: s.clone(), insensitive });
    }
    if let Some(v) = obj.get("has") {
        return Ok(ScalarFilter::Has(json_to_value(v)));
    }
    if let Some(Json::Array(items)) = obj.get("hasEvery") {
        return Ok(ScalarFilter::HasEvery(items.iter().map(json_to_value).collect()));
    }
    if let Some(Json::Array(items)) = obj.get("hasSome") {
        return Ok(ScalarFilter::HasSome(items.iter().map(json_to_value).collect()));
    }
    if let Some(Json::Bool(b)) = obj.get("isEmpty") {
        return Ok(ScalarFilter::IsEmpty(*b));
    }

    Err(invalid(operation, &model.name, path, format!("`{field}` filter has no recognized operator key")))
}

fn normalize_relation_filter(
    registry: &ModelRegistry,
    model: &Model,
    operation: &str,
    relation_name: &str,
    raw: &Json,
    path: &str,
) -> Result<RelationFilter, QueryError> {
    let info = RelationInfo::resolve(registry, model, relation_name).map_err(|e| invalid(operation, &model.name, path, e.to_string()))?;

    if raw.is_null() {
        if info.is_to_many() {
            return Err(invalid(operation, &model.name, path, "`null` is not valid for a to-many relation filter"));
        }
        return Ok(RelationFilter::Is(None));
    }

    let obj = match raw {
        Json::Object(obj) => obj,
        _ => return Err(invalid(operation, &model.name, path, "relation filter must be an object")),
    };

    if info.is_to_many() {
        if let Some(v) = obj.get("some") {
            return Ok(RelationFilter::Some(Box::new(normalize_where_at(registry, &info.target_model, operation, v, &format!("{path}.some"))?)));
        }
        if let Some(v) = obj.get("every") {
            return Ok(RelationFilter::Every(Box::new(normalize_where_at(registry, &info.target_model, operation, v, &format!("{path}.every"))?)));
        }
        if let Some(v) = obj.get("none") {
            return Ok(RelationFilter::None(Box::new(normalize_where_at(registry, &info.target_model, operation, v, &format!("{path}.none"))?)));
        }
        return Err(invalid(operation, &model.name, path, "to-many relation filter must use `some`/`every`/`none`"));
    }

    // Bare object on a to-one becomes `{is: payload}` (§4.2).
    let inner = normalize_where_at(registry, &info.target_model, operation, raw, &format!("{path}.is"))?;
    Ok(RelationFilter::Is(Some(Box::new(inner))))
}

/// Normalizes a `where`-unique shape: `{field: v}` for a single-field key,
/// `{compoundName: {f1: v1, ...}}` for a compound key.
pub fn normalize_where_unique(model: &Model, operation: &str, raw: &Json) -> Result<WhereUnique, QueryError> {
    let obj = match raw {
        Json::Object(obj) if !obj.is_empty() => obj,
        _ => return Err(invalid(operation, &model.name, "where", "a unique `where` must name at least one key")),
    };

    if obj.len() == 1 {
        let (key, value) = obj.iter().next().unwrap();
        if model.scalar(key).is_some() {
            return Ok(WhereUnique::Single { field: key.clone(), value: json_to_value(value) });
        }
        if let Json::Object(compound) = value {
            let fields: Vec<(String, Value)> = compound.iter().map(|(f, v)| (f.clone(), json_to_value(v))).collect();
            let names: Vec<&str> = fields.iter().map(|(f, _)| f.as_str()).collect();
            if model.unique_field_sets().iter().any(|set| set.len() == names.len() && set.iter().all(|f| names.contains(&f.as_str()))) {
                return Ok(WhereUnique::Compound { fields });
            }
        }
    }

    let fields: Vec<(String, Value)> = obj.iter().map(|(f, v)| (f.clone(), json_to_value(v))).collect();
    let names: Vec<&str> = fields.iter().map(|(f, _)| f.as_str()).collect();
    if model.unique_field_sets().iter().any(|set| set.len() == names.len() && set.iter().all(|f| names.contains(&f.as_str()))) {
        return Ok(WhereUnique::Compound { fields });
    }

    Err(invalid(operation, &model.name, "where", "does not resolve to a declared unique key (id, compound id, or unique field)"))
}

/// Normalizes `orderBy`: accepts a single object or an array of objects.
pub fn normalize_order_by(model: &Model, operation: &str, raw: &Json) -> Result<Vec<OrderByEntry>, QueryError> {
    let items: Vec<&Json> = match raw {
        Json::Null => return Ok(Vec::new()),
        Json::Array(items) => items.iter().collect(),
        obj @ Json::Object(_) => vec![obj],
        _ => return Err(invalid(operation, &model.name, "orderBy", "must be an object or array")),
    };

    let mut entries = Vec::new();
    for item in items {
        let Json::Object(obj) = item else {
            return Err(invalid(operation, &model.name, "orderBy", "each entry must be an object"));
        };
        for (field, spec) in obj {
            let (direction, nulls) = match spec {
                Json::String(s) => (parse_direction(operation, model, s)?, None),
                Json::Object(inner) => {
                    let sort = inner.get("sort").and_then(Json::as_str).ok_or_else(|| invalid(operation, &model.name, "orderBy", "missing `sort`"))?;
                    let nulls = match inner.get("nulls").and_then(Json::as_str) {
                        Some("first") => Some(NullsOrder::First),
                        Some("last") => Some(NullsOrder::Last),
                        _ => None,
                    };
                    (parse_direction(operation, model, sort)?, nulls)
                }
                _ => return Err(invalid(operation, &model.name, "orderBy", "must be `\"asc\"`/`\"desc\"` or `{sort, nulls?}`")),
            };
            entries.push(OrderByEntry { field: field.clone(), direction, nulls });
        }
    }
    Ok(entries)
}

fn parse_direction(operation: &str, model: &Model, s: &str) -> Result<SortDirection, QueryError> {
    match s {
        "asc" => Ok(SortDirection::Asc),
        "desc" => Ok(SortDirection::Desc),
        other => Err(invalid(operation, &model.name, "orderBy", format!("unknown sort direction `{other}`"))),
    }
}

/// Normalizes a cursor object (single scalar field map) plus the direction
/// the matching `orderBy` establishes. Mixed-direction compound cursors are
/// rejected by the caller before this is invoked.
pub fn normalize_cursor(raw: &Json, direction: SortDirection) -> Option<Cursor> {
    let Json::Object(obj) = raw else { return None };
    if obj.is_empty() {
        return None;
    }
    let fields = obj.iter().map(|(f, v)| (f.clone(), json_to_value(v))).collect();
    Some(Cursor { fields, direction })
}

/// Normalizes `select`/`include` into a [`Projection`] (§4.5). `select`
/// present means only listed entries are emitted; `include` means every
/// scalar plus the listed relations.
pub fn normalize_projection(
    registry: &ModelRegistry,
    model: &Model,
    operation: &str,
    select: Option<&Json>,
    include: Option<&Json>,
) -> Result<Projection, QueryError> {
    if let Some(select) = select {
        let entries = normalize_projection_entries(registry, model, operation, select, "select")?;
        return Ok(Projection::Select(entries));
    }
    if let Some(include) = include {
        let entries = normalize_projection_entries(registry, model, operation, include, "include")?;
        return Ok(Projection::Include(entries));
    }
    Ok(Projection::Include(Vec::new()))
}

fn normalize_projection_entries(registry: &ModelRegistry, model: &Model, operation: &str, raw: &Json, path: &str) -> Result<Vec<Projected>, QueryError> {
    let Json::Object(obj) = raw else {
        return Err(invalid(operation, &model.name, path, "must be an object"));
    };

    let mut entries = Vec::new();
    for (key, value) in obj {
        if key == "_count" {
            let Json::Object(count_select) = value.get("select").unwrap_or(value) else {
                return Err(invalid(operation, &model.name, path, "`_count` must carry a `select` object"));
            };
            let mut count_entries = Vec::new();
            for (rel_name, spec) in count_select {
                let filter = match spec {
                    Json::Object(inner) if inner.get("where").is_some() => {
                        Some(normalize_where_at(registry, model, operation, &inner["where"], &format!("{path}._count.{rel_name}"))?)
                    }
                    _ => None,
                };
                count_entries.push((rel_name.clone(), filter));
            }
            entries.push(Projected::Count { entries: count_entries });
            continue;
        }

        if model.scalar(key).is_some() {
            if matches!(value, Json::Bool(false)) {
                continue;
            }
            entries.push(Projected::Scalar(key.clone()));
            continue;
        }

        if let Some(relation) = model.relation_named(key) {
            if matches!(value, Json::Bool(false)) {
                continue;
            }
            let target = registry.resolve(&relation.target).map_err(|e| invalid(operation, &model.name, path, e.to_string()))?;
            let args = match value {
                Json::Bool(true) => RelationQueryArgs::default(),
                Json::Object(spec) => normalize_relation_query_args(registry, &target, operation, spec)?,
                _ => return Err(invalid(operation, &model.name, path, format!("`{key}` must be `true` or an object"))),
            };
            entries.push(Projected::Relation { name: key.clone(), args: Box::new(args) });
            continue;
        }

        return Err(invalid(operation, &model.name, &format!("{path}.{key}"), format!("unknown key `{key}`")));
    }
    Ok(entries)
}

fn normalize_relation_query_args(
    registry: &ModelRegistry,
    target: &Model,
    operation: &str,
    spec: &serde_json::Map<String, Json>,
) -> Result<RelationQueryArgs, QueryError> {
    let where_ = match spec.get("where") {
        Some(w) => normalize_where_at(registry, target, operation, w, "where")?,
        None => WhereNode::empty(),
    };
    let order_by = match spec.get("orderBy") {
        Some(o) => normalize_order_by(target, operation, o)?,
        None => Vec::new(),
    };
    let take = spec.get("take").and_then(Json::as_i64);
    let skip = spec.get("skip").and_then(Json::as_i64);
    let projection = normalize_projection(registry, target, operation, spec.get("select"), spec.get("include"))?;
    Ok(RelationQueryArgs { where_, order_by, take, skip, projection })
}

/// Normalizes one record's `data` object into scalar writes and relation
/// mutations, the split the nested-write planner consumes (§4.9, §4.11).
pub fn normalize_data_record(model: &Model, operation: &str, raw: &Json, is_update: bool) -> Result<DataRecord, QueryError> {
    let Json::Object(obj) = raw else {
        return Err(invalid(operation, &model.name, "data", "must be an object"));
    };

    let mut record = DataRecord::default();
    for (key, value) in obj {
        if model.scalar(key).is_some() {
            record.scalars.insert(key.clone(), normalize_scalar_write(operation, model, key, value, is_update)?);
            continue;
        }
        if model.relation_named(key).is_some() {
            record.relations.push(normalize_relation_mutation(model, operation, key, value)?);
            continue;
        }
        return Err(invalid(operation, &model.name, &format!("data.{key}"), format!("unknown key `{key}`")));
    }
    Ok(record)
}

fn normalize_scalar_write(operation: &str, model: &Model, field: &str, raw: &Json, is_update: bool) -> Result<ScalarWrite, QueryError> {
    if !is_update {
        return Ok(ScalarWrite::Set(json_to_value(raw)));
    }
    match raw {
        Json::Null => Ok(ScalarWrite::Set(Value::Null)),
        Json::Object(obj) => {
            if let Some(v) = obj.get("set") {
                return Ok(ScalarWrite::Set(json_to_value(v)));
            }
            if let Some(v) = obj.get("increment") {
                return Ok(ScalarWrite::Increment(json_to_value(v)));
            }
            if let Some(v) = obj.get("decrement") {
                return Ok(ScalarWrite::Decrement(json_to_value(v)));
            }
            if let Some(v) = obj.get("multiply") {
                return Ok(ScalarWrite::Multiply(json_to_value(v)));
            }
            if let Some(v) = obj.get("divide") {
                return Ok(ScalarWrite::Divide(json_to_value(v)));
            }
            if let Some(v) = obj.get("push") {
                return Ok(ScalarWrite::Push(json_to_value(v)));
            }
            if let Some(v) = obj.get("unshift") {
                return Ok(ScalarWrite::Unshift(json_to_value(v)));
            }
            Err(invalid(operation, &model.name, &format!("data.{field}"), "update write has no recognized operator key"))
        }
        other => Ok(ScalarWrite::Set(json_to_value(other))),
    }
}

fn normalize_relation_mutation(model: &Model, operation: &str, relation_name: &str, raw: &Json) -> Result<RelationMutation, QueryError> {
    let Json::Object(obj) = raw else {
        return Err(invalid(operation, &model.name, &format!("data.{relation_name}"), "relation mutation must be an object"));
    };

    let mut mutation = RelationMutation::new(relation_name);

    if let Some(v) = obj.get("connect") {
        mutation.connect = normalize_where_unique_list(model, operation, relation_name, v)?;
    }
    if let Some(v) = obj.get("disconnect") {
        mutation.disconnect = normalize_many_target(model, operation, relation_name, v)?;
    }
    if let Some(v) = obj.get("create") {
        mutation.create = normalize_data_record_list(model, operation, relation_name, v)?;
    }
    if let Some(Json::Array(items)) = obj.get("connectOrCreate") {
        for item in items {
            let Json::Object(pair) = item else {
                return Err(invalid(operation, &model.name, &format!("data.{relation_name}.connectOrCreate"), "must be an object"));
            };
            let where_ = pair.get("where").ok_or_else(|| invalid(operation, &model.name, &format!("data.{relation_name}.connectOrCreate"), "missing `where`"))?;
            let create = pair.get("create").ok_or_else(|| invalid(operation, &model.name, &format!("data.{relation_name}.connectOrCreate"), "missing `create`"))?;
            mutation.connect_or_create.push((normalize_where_unique(model, operation, where_)?, normalize_data_record(model, operation, create, false)?));
        }
    }
    if let Some(v) = obj.get("delete") {
        mutation.delete = normalize_many_target(model, operation, relation_name, v)?;
    }
    if let Some(Json::Array(items)) = obj.get("set") {
        mutation.set = Some(items.iter().map(|w| normalize_where_unique(model, operation, w)).collect::<Result<_, _>>()?);
    }

    Ok(mutation)
}

fn normalize_where_unique_list(model: &Model, operation: &str, relation_name: &str, raw: &Json) -> Result<Vec<WhereUnique>, QueryError> {
    match raw {
        Json::Array(items) => items.iter().map(|w| normalize_where_unique(model, operation, w)).collect(),
        Json::Object(_) => Ok(vec![normalize_where_unique(model, operation, raw)?]),
        _ => Err(invalid(operation, &model.name, &format!("data.{relation_name}"), "must be an object or array")),
    }
}

fn normalize_data_record_list(model: &Model, operation: &str, relation_name: &str, raw: &Json) -> Result<Vec<DataRecord>, QueryError> {
    match raw {
        Json::Array(items) => items.iter().map(|r| normalize_data_record(model, operation, r, false)).collect(),
        Json::Object(_) => Ok(vec![normalize_data_record(model, operation, raw, false)?]),
        _ => Err(invalid(operation, &model.name, &format!("data.{relation_name}.create"), "must be an object or array")),
    }
}

fn normalize_many_target(model: &Model, operation: &str, relation_name: &str, raw: &Json) -> Result<ManyTarget, QueryError> {
    match raw {
        Json::Bool(true) => Ok(ManyTarget::All),
        Json::Bool(false) => Ok(ManyTarget::None),
        Json::Array(items) => Ok(ManyTarget::Where(items.iter().map(|w| normalize_where_unique(model, operation, w)).collect::<Result<_, _>>()?)),
        Json::Object(_) => Ok(ManyTarget::Where(vec![normalize_where_unique(model, operation, raw)?])),
        _ => Err(invalid(operation, &model.name, &format!("data.{relation_name}"), "must be `true`/`false`, an object, or an array")),
    }
}

/// Converts a JSON scalar into the `Value` the builders parameterize.
/// Structural typing is all validation can offer here — the database
/// ultimately enforces the declared column type.
pub(crate) fn json_to_value(json: &Json) -> Value {
    match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Boolean(*b),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int64(i)
            } else {
                Value::Double(n.as_f64().unwrap_or_default())
            }
        }
        Json::String(s) => Value::Text(s.clone()),
        Json::Array(items) => Value::Array(items.iter().map(json_to_value).collect()),
        Json::Object(_) => Value::Json(json.clone()),
    }
}

/// Classifies a `data` record's relation kind so the planner can split
/// `IndexMap`-preserving scalar writes from FK-direction-sensitive
/// mutations without re-deriving the registry lookup itself.
pub fn relation_kind(registry: &ModelRegistry, model: &Model, relation_name: &str) -> Result<RelationKind, QueryError> {
    RelationInfo::resolve(registry, model, relation_name).map(|i| i.kind).map_err(|e| invalid("write", &model.name, relation_name, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use query_structure::{Field, Relation, ScalarType};
    use serde_json::json;
    use std::sync::Arc;

    fn schema() -> ModelRegistry {
        let post = Model::new("Post")
            .mapped_to("posts")
            .field(Field::new("id", ScalarType::String).id())
            .field(Field::new("title", ScalarType::String))
            .field(Field::new("authorId", ScalarType::String).nullable())
            .relation(Relation::new("author", RelationKind::ManyToOne, "Author").with_fk(vec!["authorId".into()], vec!["id".into()]).optional());
        let author = Model::new("Author")
            .mapped_to("authors")
            .field(Field::new("id", ScalarType::String).id())
            .relation(Relation::new("posts", RelationKind::OneToMany, "Post"));
        ModelRegistry::new([post, author]).unwrap()
    }

    #[test]
    fn bare_scalar_value_normalizes_to_equals() {
        let registry = schema();
        let post = registry.resolve("Post").unwrap();
        let node = normalize_where(&registry, &post, "findMany", &json!({"title": "Hi"})).unwrap();
        assert_eq!(node.scalars, vec![("title".to_string(), ScalarFilter::Equals(Value::Text("Hi".to_string())))]);
    }

    #[test]
    fn unknown_key_is_invalid_input() {
        let registry = schema();
        let post = registry.resolve("Post").unwrap();
        let err = normalize_where(&registry, &post, "findMany", &json!({"bogus": 1})).unwrap_err();
        assert!(matches!(err, QueryError::InvalidInput { .. }));
    }

    #[test]
    fn bare_relation_object_on_to_one_becomes_is() {
        let registry = schema();
        let post = registry.resolve("Post").unwrap();
        let node = normalize_where(&registry, &post, "findMany", &json!({"author": {"id": "A1"}})).unwrap();
        assert_eq!(node.relations.len(), 1);
        assert!(matches!(node.relations[0].1, RelationFilter::Is(Some(_))));
    }

    #[test]
    fn to_many_without_some_every_none_is_rejected() {
        let registry = schema();
        let author = registry.resolve("Author").unwrap();
        let err = normalize_where(&registry, &author, "findMany", &json!({"posts": {"title": "x"}})).unwrap_err();
        assert!(matches!(err, QueryError::InvalidInput { .. }));
    }

    #[test]
    fn is_idempotent_under_renormalization() {
        let registry = schema();
        let post = registry.resolve("Post").unwrap();
        let raw = json!({"title": {"equals": "Hi"}, "AND": [{"title": "A"}]});
        let first = normalize_where(&registry, &post, "findMany", &raw).unwrap();
        // Renormalizing an already-normalized filter value is a no-op: the
        // `{equals: v}` shape round-trips through `equals` unchanged.
        let reraw = json!({"title": {"equals": "Hi"}, "AND": [{"title": {"equals": "A"}}]});
        let second = normalize_where(&registry, &post, "findMany", &reraw).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn where_unique_rejects_non_unique_field() {
        let registry = schema();
        let post = registry.resolve("Post").unwrap();
        let err = normalize_where_unique(&post, "findUnique", &json!({"title": "x"})).unwrap_err();
        assert!(matches!(err, QueryError::InvalidInput { .. }));
    }

    #[test]
    fn update_bare_value_becomes_set() {
        let registry = schema();
        let post = registry.resolve("Post").unwrap();
        let record = normalize_data_record(&post, "update", &json!({"title": "New"}), true).unwrap();
        assert_eq!(record.scalars.get("title"), Some(&ScalarWrite::Set(Value::text("New"))));
    }

    #[test]
    fn update_null_becomes_set_null() {
        let registry = schema();
        let post = registry.resolve("Post").unwrap();
        let record = normalize_data_record(&post, "update", &json!({"authorId": null}), true).unwrap();
        assert_eq!(record.scalars.get("authorId"), Some(&ScalarWrite::Set(Value::Null)));
    }

    #[test]
    fn relation_create_is_captured_as_a_mutation() {
        let registry = schema();
        let author = registry.resolve("Author").unwrap();
        let record = normalize_data_record(&author, "create", &json!({"posts": {"create": [{"title": "A"}]}}), false).unwrap();
        assert_eq!(record.relations.len(), 1);
        assert_eq!(record.relations[0].create.len(), 1);
    }

    #[test]
    fn order_by_accepts_single_object_and_array() {
        let registry = schema();
        let post = registry.resolve("Post").unwrap();
        let single = normalize_order_by(&post, "findMany", &json!({"title": "asc"})).unwrap();
        assert_eq!(single.len(), 1);
        let multi = normalize_order_by(&post, "findMany", &json!([{"title": "asc"}, {"id": "desc"}])).unwrap();
        assert_eq!(multi.len(), 2);
        let _ = Arc::new(registry);
    }
}
