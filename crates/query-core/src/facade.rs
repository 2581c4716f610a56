//! Query Engine Facade (C10, §6): the one entry point applications call.
//! `build` compiles normalized args into a single `{sqlText, params}` pair
//! with no I/O; `execute` does the same plus runs it, routing nested writes
//! through the transactional planner and driver rows through the result
//! parser.
//!
//! `build` rejects create/update/upsert payloads that carry nested relation
//! mutations — those need the enclosing transaction `execute` opens, and
//! can't be expressed as one statement. `createMany`/`updateMany`/
//! `deleteMany` are `execute`-only outright: a batch write's rows aren't
//! individually addressable, so nested mutations never make sense there and
//! there's no single-statement shape worth exposing through `build` either.
//!
//! `take` follows the common negative-count convention for "last N": a
//! negative value flips every `orderBy` direction, compiles as
//! `Take::First(|n|)` (`sql_query_builder::build_find` has no LIMIT-from-
//! the-end of its own), and `execute` reverses the fetched rows back to the
//! requested order before parsing. A `build`-only caller asking for the last
//! N rows gets the flipped statement and owns that reversal itself.
//!
//! `aggregate`/`groupBy` read `_avg`/`_sum`/`_min`/`_max` field maps and
//! `_count` from the caller, but `build_aggregate`/`build_group_by` only
//! render flat aliased columns — one per request, named `"_avg.field"` (or
//! the bare `"_count"` for the row count). [`crate::result_parser`] regroups
//! those dotted names back into nested objects after the row comes back.

use std::sync::Arc;

use query_structure::{Model, ModelRegistry};
use serde_json::Value as Json;
use sql_dialect::{Capability, NullsOrder, SortDirection};
use sql_fragment::Fragment;
use sql_query_builder::args::{Cursor, OrderByEntry, Projection, ScalarFilter, Take, WhereNode, WhereUnique};
use sql_query_builder::{
    build_aggregate, build_count, build_create, build_delete, build_exist, build_find, build_group_by, build_select_plan, build_update,
    build_upsert, AggregateKind, FindArgs, GroupByArgs, HavingTerm, QueryContext,
};

use crate::connector::Connector;
use crate::error::{QueryError, QueryResult};
use crate::planner;
use crate::result_parser::{self, ParsedValue};
use crate::validator;

/// The fourteen operations the facade understands, named the way the
/// caller's API surface names them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    FindFirst,
    FindMany,
    FindUnique,
    Create,
    CreateMany,
    Update,
    UpdateMany,
    Delete,
    DeleteMany,
    Upsert,
    Count,
    Aggregate,
    GroupBy,
    Exist,
}

impl Operation {
    pub fn parse(name: &str) -> Option<Operation> {
        Some(match name {
            "findFirst" => Operation::FindFirst,
            "findMany" => Operation::FindMany,
            "findUnique" => Operation::FindUnique,
            "create" => Operation::Create,
            "createMany" => Operation::CreateMany,
            "update" => Operation::Update,
            "updateMany" => Operation::UpdateMany,
            "delete" => Operation::Delete,
            "deleteMany" => Operation::DeleteMany,
            "upsert" => Operation::Upsert,
            "count" => Operation::Count,
            "aggregate" => Operation::Aggregate,
            "groupBy" => Operation::GroupBy,
            "exist" => Operation::Exist,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Operation::FindFirst => "findFirst",
            Operation::FindMany => "findMany",
            Operation::FindUnique => "findUnique",
            Operation::Create => "create",
            Operation::CreateMany => "createMany",
            Operation::Update => "update",
            Operation::UpdateMany => "updateMany",
            Operation::Delete => "delete",
            Operation::DeleteMany => "deleteMany",
            Operation::Upsert => "upsert",
            Operation::Count => "count",
            Operation::Aggregate => "aggregate",
            Operation::GroupBy => "groupBy",
            Operation::Exist => "exist",
        }
    }
}

/// The pure-compile result of [`QueryEngine::build`]: SQL text rendered for
/// the engine's dialect, plus the parameters to bind alongside it.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltStatement {
    pub sql_text: String,
    pub params: Vec<sql_fragment::Value>,
}

/// The shape of a successful [`QueryEngine::execute`] call; which variant
/// comes back is determined entirely by the [`Operation`] requested.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineResult {
    Record(Option<ParsedValue>),
    Records(Vec<ParsedValue>),
    Count(ParsedValue),
    Aggregate(ParsedValue),
    GroupBy(Vec<ParsedValue>),
    Batch(ParsedValue),
    Exists(bool),
}

/// Wraps a driver [`Connector`] and a resolved [`ModelRegistry`]; this is
/// the whole engine surface applications touch.
pub struct QueryEngine {
    connector: Arc<dyn Connector>,
    registry: Arc<ModelRegistry>,
}

impl QueryEngine {
    pub fn new(connector: Arc<dyn Connector>, registry: Arc<ModelRegistry>) -> Self {
        QueryEngine { connector, registry }
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    fn resolve_model(&self, name: &str) -> QueryResult<Arc<Model>> {
        self.registry.resolve(name).map_err(|e| invalid("resolveModel", name, "model", e.to_string()))
    }

    fn root_ctx(&self, model: &Arc<Model>) -> QueryContext {
        QueryContext::new_root(self.connector.dialect(), self.registry.clone(), model.clone())
    }

    /// Compiles `args` into one statement with no I/O (§6). Supports every
    /// read operation, plus `create`/`update`/`delete`/`upsert` whose `data`
    /// carries no nested relation mutations.
    #[tracing::instrument(skip(self, args), fields(model = model_name, operation = operation.name()))]
    pub fn build(&self, model_name: &str, operation: Operation, args: &Json) -> QueryResult<BuiltStatement> {
        let model = self.resolve_model(model_name)?;
        let ctx = self.root_ctx(&model);
        let op = operation.name();

        let fragment = match operation {
            Operation::FindUnique => self.prepare_find(&ctx, &model, op, args, FindMode::Unique)?.fragment,
            Operation::FindFirst => self.prepare_find(&ctx, &model, op, args, FindMode::First)?.fragment,
            Operation::FindMany => self.prepare_find(&ctx, &model, op, args, FindMode::Many)?.fragment,
            Operation::Count => self.build_count_fragment(&ctx, &model, op, args)?.0,
            Operation::Aggregate => self.build_aggregate_fragment(&ctx, &model, op, args)?,
            Operation::GroupBy => self.build_group_by_fragment(&ctx, &model, op, args)?,
            Operation::Exist => self.build_exist_fragment(&ctx, &model, op, args)?,

            Operation::Create => {
                let obj = require_object(op, &model, args)?;
                let data = require_field(op, &model, obj, "data")?;
                let record = validator::normalize_data_record(&model, op, data, false)?;
                if !record.relations.is_empty() {
                    return Err(nested_writes_need_execute(op, &model));
                }
                let projection = self.projection_of(&model, op, obj)?;
                let row = planner::build_insert_row(&ctx, &record.scalars)?;
                build_create(&ctx, std::slice::from_ref(&row), false, &projection)?
            }

            Operation::Update => {
                let obj = require_object(op, &model, args)?;
                let unique = self.unique_where_of(&model, op, obj)?;
                let data = require_field(op, &model, obj, "data")?;
                let record = validator::normalize_data_record(&model, op, data, true)?;
                if !record.relations.is_empty() {
                    return Err(nested_writes_need_execute(op, &model));
                }
                let projection = self.projection_of(&model, op, obj)?;
                let where_ = planner::where_unique_to_node(&unique);
                build_update(&ctx, &record.scalars, &where_, &projection)?
            }

            Operation::Delete => {
                let obj = require_object(op, &model, args)?;
                let unique = self.unique_where_of(&model, op, obj)?;
                let projection = self.projection_of(&model, op, obj)?;
                let where_ = planner::where_unique_to_node(&unique);
                build_delete(&ctx, &where_, true, &projection)?
            }

            Operation::Upsert => {
                let obj = require_object(op, &model, args)?;
                let unique = self.unique_where_of(&model, op, obj)?;
                let create_raw = require_field(op, &model, obj, "create")?;
                let update_raw = require_field(op, &model, obj, "update")?;
                let create = validator::normalize_data_record(&model, op, create_raw, false)?;
                let update = validator::normalize_data_record(&model, op, update_raw, true)?;
                if !create.relations.is_empty() || !update.relations.is_empty() {
                    return Err(nested_writes_need_execute(op, &model));
                }
                let projection = self.projection_of(&model, op, obj)?;
                self.render_upsert_with_returning(&ctx, &unique, &create, &update, &projection)?
            }

            Operation::CreateMany | Operation::UpdateMany | Operation::DeleteMany => {
                return Err(invalid(op, &model.name, "operation", "batch operations are only available through `execute`"));
            }
        };

        let (sql_text, params) = fragment.render(ctx.dialect.placeholder_style());
        Ok(BuiltStatement { sql_text, params })
    }

    /// Validates, compiles, and runs `args` against the connector (§6).
    #[tracing::instrument(skip(self, args), fields(model = model_name, operation = operation.name()))]
    pub async fn execute(&self, model_name: &str, operation: Operation, args: &Json) -> QueryResult<EngineResult> {
        let model = self.resolve_model(model_name)?;
        let ctx = self.root_ctx(&model);
        let op = operation.name();

        match operation {
            Operation::FindUnique | Operation::FindFirst => {
                let mode = if matches!(operation, Operation::FindUnique) { FindMode::Unique } else { FindMode::First };
                let prepared = self.prepare_find(&ctx, &model, op, args, mode)?;
                let (sql, params) = prepared.fragment.render(ctx.dialect.placeholder_style());
                let mut rows = self.connector.query(&sql, &params).await?;
                if prepared.reversed {
                    rows.reverse();
                }
                match rows.into_iter().next() {
                    Some(row) => Ok(EngineResult::Record(Some(result_parser::parse_record(&model, &self.registry, &row)?))),
                    None => Ok(EngineResult::Record(None)),
                }
            }

            Operation::FindMany => {
                let prepared = self.prepare_find(&ctx, &model, op, args, FindMode::Many)?;
                let (sql, params) = prepared.fragment.render(ctx.dialect.placeholder_style());
                let mut rows = self.connector.query(&sql, &params).await?;
                if prepared.reversed {
                    rows.reverse();
                }
                Ok(EngineResult::Records(result_parser::parse_records(&model, &self.registry, &rows)?))
            }

            Operation::Count => {
                let (fragment, select) = self.build_count_fragment(&ctx, &model, op, args)?;
                let row = self.query_one(&ctx, fragment).await?;
                Ok(EngineResult::Count(result_parser::parse_count_result(&row, select.as_deref())))
            }

            Operation::Aggregate => {
                let fragment = self.build_aggregate_fragment(&ctx, &model, op, args)?;
                let row = self.query_one(&ctx, fragment).await?;
                Ok(EngineResult::Aggregate(result_parser::parse_aggregate_row(&row)))
            }

            Operation::GroupBy => {
                let fragment = self.build_group_by_fragment(&ctx, &model, op, args)?;
                let (sql, params) = fragment.render(ctx.dialect.placeholder_style());
                let rows = self.connector.query(&sql, &params).await?;
                Ok(EngineResult::GroupBy(result_parser::parse_group_by_rows(&model, &rows)))
            }

            Operation::Exist => {
                let fragment = self.build_exist_fragment(&ctx, &model, op, args)?;
                let row = self.query_one(&ctx, fragment).await?;
                Ok(EngineResult::Exists(result_parser::parse_exist_result(&row)))
            }

            Operation::Create => {
                let obj = require_object(op, &model, args)?;
                let data = require_field(op, &model, obj, "data")?;
                let record = validator::normalize_data_record(&model, op, data, false)?;
                let row = planner::create_transactional(self.connector.as_ref(), &ctx, record).await?;
                Ok(EngineResult::Record(Some(result_parser::parse_record(&model, &self.registry, &row)?)))
            }

            Operation::Update => {
                let obj = require_object(op, &model, args)?;
                let unique = self.unique_where_of(&model, op, obj)?;
                let data = require_field(op, &model, obj, "data")?;
                let record = validator::normalize_data_record(&model, op, data, true)?;
                let row = planner::update_transactional(self.connector.as_ref(), &ctx, &unique, record).await?;
                Ok(EngineResult::Record(Some(result_parser::parse_record(&model, &self.registry, &row)?)))
            }

            Operation::Delete => self.execute_delete(&ctx, &model, op, args).await,
            Operation::Upsert => self.execute_upsert(&ctx, &model, op, args).await,
            Operation::CreateMany => self.execute_create_many(&ctx, &model, op, args).await,
            Operation::UpdateMany => self.execute_update_many(&ctx, &model, op, args).await,
            Operation::DeleteMany => self.execute_delete_many(&ctx, &model, op, args).await,
        }
    }

    async fn query_one(&self, ctx: &QueryContext, fragment: Fragment) -> QueryResult<crate::connector::Row> {
        let (sql, params) = fragment.render(ctx.dialect.placeholder_style());
        Ok(self.connector.query(&sql, &params).await?.into_iter().next().unwrap_or_default())
    }

    fn projection_of(&self, model: &Model, operation: &str, obj: &serde_json::Map<String, Json>) -> QueryResult<Projection> {
        validator::normalize_projection(&self.registry, model, operation, obj.get("select"), obj.get("include"))
    }

    fn unique_where_of(&self, model: &Model, operation: &str, obj: &serde_json::Map<String, Json>) -> QueryResult<WhereUnique> {
        let raw = require_field(operation, model, obj, "where")?;
        validator::normalize_where_unique(model, operation, raw)
    }

    fn where_of(&self, model: &Model, operation: &str, obj: Option<&serde_json::Map<String, Json>>) -> QueryResult<WhereNode> {
        match obj.and_then(|o| o.get("where")) {
            Some(w) => validator::normalize_where(&self.registry, model, operation, w),
            None => Ok(WhereNode::empty()),
        }
    }

    fn render_upsert_with_returning(
        &self,
        ctx: &QueryContext,
        unique: &WhereUnique,
        create: &sql_query_builder::args::DataRecord,
        update: &sql_query_builder::args::DataRecord,
        projection: &Projection,
    ) -> QueryResult<Fragment> {
        let create_row = planner::build_insert_row(ctx, &create.scalars)?;
        let mut stmt = build_upsert(ctx, unique, &create_row, &update.scalars)?;
        let plan = build_select_plan(ctx, projection, false)?;
        if !plan.columns.is_empty() {
            stmt = stmt.append(ctx.dialect.returning(plan.render_select_list(ctx)));
        }
        Ok(stmt)
    }

    async fn execute_delete(&self, ctx: &QueryContext, model: &Model, operation: &str, args: &Json) -> QueryResult<EngineResult> {
        let obj = require_object(operation, model, args)?;
        let unique = self.unique_where_of(model, operation, obj)?;
        let projection = self.projection_of(model, operation, obj)?;
        let where_ = planner::where_unique_to_node(&unique);

        if ctx.dialect.has(Capability::Returning) {
            let stmt = build_delete(ctx, &where_, true, &projection)?;
            let (sql, params) = stmt.render(ctx.dialect.placeholder_style());
            let result = self.connector.execute(&sql, &params).await?;
            return match result.rows.into_iter().next() {
                Some(row) => Ok(EngineResult::Record(Some(result_parser::parse_record(model, &self.registry, &row)?))),
                None => Ok(EngineResult::Record(None)),
            };
        }

        // No RETURNING: the row has to be read before the DELETE removes it.
        let find_args = FindArgs {
            where_: &where_,
            where_unique: None,
            order_by: &[],
            cursor: None,
            take: None,
            skip: None,
            distinct: false,
            projection: &projection,
            force_single: true,
        };
        let find_stmt = build_find(ctx, &find_args)?;
        let existing = self.query_one(ctx, find_stmt).await?;
        if existing.is_empty() {
            return Ok(EngineResult::Record(None));
        }

        let delete_stmt = build_delete(ctx, &where_, true, &Projection::Select(Vec::new()))?;
        let (sql, params) = delete_stmt.render(ctx.dialect.placeholder_style());
        self.connector.execute(&sql, &params).await?;
        Ok(EngineResult::Record(Some(result_parser::parse_record(model, &self.registry, &existing)?)))
    }

    async fn execute_upsert(&self, ctx: &QueryContext, model: &Model, operation: &str, args: &Json) -> QueryResult<EngineResult> {
        let obj = require_object(operation, model, args)?;
        let unique = self.unique_where_of(model, operation, obj)?;
        let create_raw = require_field(operation, model, obj, "create")?;
        let update_raw = require_field(operation, model, obj, "update")?;
        let create = validator::normalize_data_record(model, operation, create_raw, false)?;
        let update = validator::normalize_data_record(model, operation, update_raw, true)?;
        let projection = self.projection_of(model, operation, obj)?;

        if !create.relations.is_empty() || !update.relations.is_empty() {
            let row = planner::upsert_transactional(self.connector.as_ref(), ctx, &unique, create, update).await?;
            return Ok(EngineResult::Record(Some(result_parser::parse_record(model, &self.registry, &row)?)));
        }

        let stmt = self.render_upsert_with_returning(ctx, &unique, &create, &update, &projection)?;
        let (sql, params) = stmt.render(ctx.dialect.placeholder_style());
        let result = self.connector.execute(&sql, &params).await?;

        let row = match result.rows.into_iter().next() {
            Some(row) => row,
            None => {
                let find_args = FindArgs {
                    where_: &WhereNode::empty(),
                    where_unique: Some(&unique),
                    order_by: &[],
                    cursor: None,
                    take: None,
                    skip: None,
                    distinct: false,
                    projection: &Projection::Include(Vec::new()),
                    force_single: true,
                };
                let find_stmt = build_find(ctx, &find_args)?;
                self.query_one(ctx, find_stmt).await?
            }
        };
        Ok(EngineResult::Record(Some(result_parser::parse_record(model, &self.registry, &row)?)))
    }

    async fn execute_create_many(&self, ctx: &QueryContext, model: &Model, operation: &str, args: &Json) -> QueryResult<EngineResult> {
        let obj = require_object(operation, model, args)?;
        let data = require_field(operation, model, obj, "data")?;
        let items: Vec<&Json> = match data {
            Json::Array(items) => items.iter().collect(),
            Json::Object(_) => vec![data],
            _ => return Err(invalid(operation, &model.name, "data", "must be an object or array")),
        };
        let skip_duplicates = obj.get("skipDuplicates").and_then(Json::as_bool).unwrap_or(false);

        let mut rows = Vec::with_capacity(items.len());
        for item in items {
            let record = validator::normalize_data_record(model, operation, item, false)?;
            if !record.relations.is_empty() {
                return Err(invalid(operation, &model.name, "data", "nested relation mutations are not supported in a batch create"));
            }
            rows.push(planner::build_insert_row(ctx, &record.scalars)?);
        }

        let stmt = build_create(ctx, &rows, skip_duplicates, &Projection::Select(Vec::new()))?;
        let (sql, params) = stmt.render(ctx.dialect.placeholder_style());
        let result = self.connector.execute(&sql, &params).await?;
        Ok(EngineResult::Batch(result_parser::parse_batch_result(&result)))
    }

    async fn execute_update_many(&self, ctx: &QueryContext, model: &Model, operation: &str, args: &Json) -> QueryResult<EngineResult> {
        let obj = require_object(operation, model, args)?;
        let where_ = self.where_of(model, operation, Some(obj))?;
        let data = require_field(operation, model, obj, "data")?;
        let record = validator::normalize_data_record(model, operation, data, true)?;
        if !record.relations.is_empty() {
            return Err(invalid(operation, &model.name, "data", "nested relation mutations are not supported in a batch update"));
        }
        let stmt = build_update(ctx, &record.scalars, &where_, &Projection::Select(Vec::new()))?;
        let (sql, params) = stmt.render(ctx.dialect.placeholder_style());
        let result = self.connector.execute(&sql, &params).await?;
        Ok(EngineResult::Batch(result_parser::parse_batch_result(&result)))
    }

    async fn execute_delete_many(&self, ctx: &QueryContext, model: &Model, operation: &str, args: &Json) -> QueryResult<EngineResult> {
        let obj = args.as_object();
        let where_ = self.where_of(model, operation, obj)?;
        let stmt = build_delete(ctx, &where_, false, &Projection::Select(Vec::new()))?;
        let (sql, params) = stmt.render(ctx.dialect.placeholder_style());
        let result = self.connector.execute(&sql, &params).await?;
        Ok(EngineResult::Batch(result_parser::parse_batch_result(&result)))
    }

    fn prepare_find(&self, ctx: &QueryContext, model: &Model, operation: &str, args: &Json, mode: FindMode) -> QueryResult<PreparedFind> {
        let obj = args.as_object();

        let where_unique = if matches!(mode, FindMode::Unique) {
            Some(self.unique_where_of(model, operation, obj.ok_or_else(|| invalid(operation, &model.name, "args", "must be an object"))?)?)
        } else {
            None
        };
        let where_ = if matches!(mode, FindMode::Unique) { WhereNode::empty() } else { self.where_of(model, operation, obj)? };

        let mut order_by: Vec<OrderByEntry> = match obj.and_then(|o| o.get("orderBy")) {
            Some(o) => validator::normalize_order_by(model, operation, o)?,
            None => Vec::new(),
        };

        let take_raw = obj.and_then(|o| o.get("take")).and_then(Json::as_i64);
        let (take, reversed) = match take_raw {
            None => (None, false),
            Some(n) if n >= 0 => (Some(Take::First(n)), false),
            Some(n) => (Some(Take::First(-n)), true),
        };
        if reversed {
            for entry in &mut order_by {
                entry.direction = flip_direction(entry.direction);
                entry.nulls = flip_nulls(entry.nulls);
            }
        }

        let skip = obj.and_then(|o| o.get("skip")).and_then(Json::as_i64);
        let distinct = obj.and_then(|o| o.get("distinct")).and_then(Json::as_bool).unwrap_or(false);

        let cursor = match obj.and_then(|o| o.get("cursor")) {
            Some(c) if !c.is_null() => {
                let direction = order_by.first().map(|e| e.direction).unwrap_or(SortDirection::Asc);
                if order_by.iter().any(|e| e.direction != direction) {
                    return Err(invalid(operation, &model.name, "cursor", "compound cursors require every `orderBy` entry to share one direction"));
                }
                validator::normalize_cursor(c, direction)
            }
            _ => None,
        };

        let projection = self.projection_of(model, operation, obj.unwrap_or(&serde_json::Map::new()))?;
        let force_single = matches!(mode, FindMode::Unique | FindMode::First);

        let find_args = FindArgs {
            where_: &where_,
            where_unique: where_unique.as_ref(),
            order_by: &order_by,
            cursor: cursor.as_ref(),
            take,
            skip,
            distinct,
            projection: &projection,
            force_single,
        };
        let fragment = build_find(ctx, &find_args)?;
        Ok(PreparedFind { fragment, reversed })
    }

    fn build_count_fragment(&self, ctx: &QueryContext, model: &Model, operation: &str, args: &Json) -> QueryResult<(Fragment, Option<Vec<String>>)> {
        let obj = args.as_object();
        let where_ = self.where_of(model, operation, obj)?;
        let select = match obj.and_then(|o| o.get("select")) {
            Some(Json::Object(sel)) => {
                let mut fields = Vec::with_capacity(sel.len());
                for (field, flag) in sel {
                    if matches!(flag, Json::Bool(true)) {
                        if model.scalar(field).is_none() {
                            return Err(invalid(operation, &model.name, &format!("select.{field}"), "not a scalar field"));
                        }
                        fields.push(field.clone());
                    }
                }
                Some(fields)
            }
            _ => None,
        };
        let stmt = build_count(ctx, &where_, select.as_deref())?;
        Ok((stmt, select))
    }

    fn build_aggregate_fragment(&self, ctx: &QueryContext, model: &Model, operation: &str, args: &Json) -> QueryResult<Fragment> {
        let obj = require_object(operation, model, args)?;
        let where_ = self.where_of(model, operation, Some(obj))?;
        let requests = normalize_aggregate_requests(model, operation, obj)?;
        if requests.is_empty() {
            return Err(invalid(operation, &model.name, "args", "must request at least one of `_count`/`_avg`/`_sum`/`_min`/`_max`"));
        }
        build_aggregate(ctx, &where_, &requests).map_err(Into::into)
    }

    fn build_group_by_fragment(&self, ctx: &QueryContext, model: &Model, operation: &str, args: &Json) -> QueryResult<Fragment> {
        let obj = require_object(operation, model, args)?;
        let by = normalize_group_by_keys(model, operation, obj)?;

        let where_ = self.where_of(model, operation, Some(obj))?;
        let aggregates = normalize_aggregate_requests(model, operation, obj)?;

        let having = match obj.get("having") {
            Some(h) => normalize_having(h, &by, &aggregates, operation, model)?,
            None => Vec::new(),
        };
        let order_by = match obj.get("orderBy") {
            Some(o) => validator::normalize_order_by(model, operation, o)?,
            None => Vec::new(),
        };
        let take = obj.get("take").and_then(Json::as_i64);
        let skip = obj.get("skip").and_then(Json::as_i64);

        let group_args = GroupByArgs { by: &by, where_: &where_, aggregates: &aggregates, having: &having, order_by: &order_by, take, skip };
        build_group_by(ctx, &group_args).map_err(Into::into)
    }

    fn build_exist_fragment(&self, ctx: &QueryContext, model: &Model, operation: &str, args: &Json) -> QueryResult<Fragment> {
        let where_ = self.where_of(model, operation, args.as_object())?;
        build_exist(ctx, &where_).map_err(Into::into)
    }
}

enum FindMode {
    Unique,
    First,
    Many,
}

struct PreparedFind {
    fragment: Fragment,
    reversed: bool,
}

fn flip_direction(direction: SortDirection) -> SortDirection {
    match direction {
        SortDirection::Asc => SortDirection::Desc,
        SortDirection::Desc => SortDirection::Asc,
    }
}

fn flip_nulls(nulls: Option<NullsOrder>) -> Option<NullsOrder> {
    match nulls {
        Some(NullsOrder::First) => Some(NullsOrder::Last),
        Some(NullsOrder::Last) => Some(NullsOrder::First),
        None => None,
    }
}

fn normalize_aggregate_requests(model: &Model, operation: &str, obj: &serde_json::Map<String, Json>) -> QueryResult<Vec<(String, AggregateKind)>> {
    let mut out = Vec::new();
    match obj.get("_count") {
        Some(Json::Bool(true)) => out.push(("_count".to_owned(), AggregateKind::Count)),
        Some(Json::Object(fields)) => {
            for (field, flag) in fields {
                if !matches!(flag, Json::Bool(true)) {
                    continue;
                }
                if model.scalar(field).is_none() {
                    return Err(invalid(operation, &model.name, &format!("_count.{field}"), "not a scalar field"));
                }
                out.push((format!("_count.{field}"), AggregateKind::CountField(field.clone())));
            }
        }
        _ => {}
    }

    let groups: [(&str, fn(String) -> AggregateKind); 4] = [
        ("_avg", AggregateKind::Avg as fn(String) -> AggregateKind),
        ("_sum", AggregateKind::Sum as fn(String) -> AggregateKind),
        ("_min", AggregateKind::Min as fn(String) -> AggregateKind),
        ("_max", AggregateKind::Max as fn(String) -> AggregateKind),
    ];
    for (key, ctor) in groups {
        if let Some(Json::Object(fields)) = obj.get(key) {
            for (field, flag) in fields {
                if !matches!(flag, Json::Bool(true)) {
                    continue;
                }
                if model.scalar(field).is_none() {
                    return Err(invalid(operation, &model.name, &format!("{key}.{field}"), "not a scalar field"));
                }
                out.push((format!("{key}.{field}"), ctor(field.clone())));
            }
        }
    }
    Ok(out)
}

fn normalize_group_by_keys(model: &Model, operation: &str, obj: &serde_json::Map<String, Json>) -> QueryResult<Vec<String>> {
    let raw = require_field(operation, model, obj, "by")?;
    let fields: Vec<String> = match raw {
        Json::String(s) => vec![s.clone()],
        Json::Array(items) => items
            .iter()
            .map(|v| v.as_str().map(str::to_owned).ok_or_else(|| invalid(operation, &model.name, "by", "each entry must be a field name")))
            .collect::<QueryResult<_>>()?,
        _ => return Err(invalid(operation, &model.name, "by", "must be a field name or an array of field names")),
    };
    for field in &fields {
        if model.scalar(field).is_none() {
            return Err(invalid(operation, &model.name, "by", format!("`{field}` is not a scalar field")));
        }
    }
    Ok(fields)
}

const AGGREGATE_MARKERS: [&str; 5] = ["_count", "_avg", "_sum", "_min", "_max"];

/// A minimal HAVING-filter parser: `having` references either a `by` column
/// directly (`{ authorId: { equals: "A1" } }`) or an aggregate key wrapped in
/// its marker (`{ id: { _count: { gt: 5 } } }`), neither of which resolve
/// through [`validator::normalize_where`]'s model-scalar lookup, so it gets
/// its own narrow operator set instead of reusing that path.
fn normalize_having(
    raw: &Json,
    by: &[String],
    aggregates: &[(String, AggregateKind)],
    operation: &str,
    model: &Model,
) -> QueryResult<Vec<HavingTerm>> {
    let obj = match raw {
        Json::Object(obj) => obj,
        Json::Null => return Ok(Vec::new()),
        _ => return Err(invalid(operation, &model.name, "having", "must be an object")),
    };

    let mut terms = Vec::with_capacity(obj.len());
    for (key, value) in obj {
        let marker: Option<&str> = value.as_object().and_then(|v| AGGREGATE_MARKERS.into_iter().find(|m| v.contains_key(*m)).copied());
        match marker {
            Some(marker) => {
                let dotted = format!("{marker}.{key}");
                let kind = aggregates
                    .iter()
                    .find(|(name, _)| name == &dotted)
                    .map(|(_, kind)| kind.clone())
                    .ok_or_else(|| {
                        invalid(operation, &model.name, &format!("having.{key}"), format!("`{key}` cannot appear in HAVING: `{marker}` was not requested for this field"))
                    })?;
                let filter = having_scalar_filter(&value[marker]);
                terms.push(HavingTerm::Aggregate { kind, filter });
            }
            None => {
                if !by.contains(key) {
                    return Err(invalid(operation, &model.name, &format!("having.{key}"), format!("`{key}` cannot appear in HAVING: not in `by` or an aggregate key")));
                }
                terms.push(HavingTerm::Scalar { field: key.clone(), filter: having_scalar_filter(value) });
            }
        }
    }
    Ok(terms)
}

fn having_scalar_filter(value: &Json) -> ScalarFilter {
    let Json::Object(obj) = value else {
        return ScalarFilter::Equals(validator::json_to_value(value));
    };
    if let Some(v) = obj.get("equals") {
        return ScalarFilter::Equals(validator::json_to_value(v));
    }
    if let Some(v) = obj.get("lt") {
        return ScalarFilter::Lt(validator::json_to_value(v));
    }
    if let Some(v) = obj.get("lte") {
        return ScalarFilter::Lte(validator::json_to_value(v));
    }
    if let Some(v) = obj.get("gt") {
        return ScalarFilter::Gt(validator::json_to_value(v));
    }
    if let Some(v) = obj.get("gte") {
        return ScalarFilter::Gte(validator::json_to_value(v));
    }
    ScalarFilter::Equals(validator::json_to_value(value))
}

fn require_object<'a>(operation: &str, model: &Model, args: &'a Json) -> QueryResult<&'a serde_json::Map<String, Json>> {
    args.as_object().ok_or_else(|| invalid(operation, &model.name, "args", "must be an object"))
}

fn require_field<'a>(operation: &str, model: &Model, obj: &'a serde_json::Map<String, Json>, field: &str) -> QueryResult<&'a Json> {
    obj.get(field).ok_or_else(|| invalid(operation, &model.name, field, format!("missing `{field}`")))
}

fn invalid(operation: &str, model: &str, path: &str, message: impl Into<String>) -> QueryError {
    QueryError::InvalidInput { operation: operation.to_owned(), model: model.to_owned(), path: path.to_owned(), message: message.into() }
}

fn nested_writes_need_execute(operation: &str, model: &Model) -> QueryError {
    invalid(operation, &model.name, "data", "contains nested relation mutations; use `execute` instead of `build`")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::mock::MockConnector;
    use query_structure::{Field, Relation, RelationKind, ScalarType};
    use serde_json::json;
    use std::collections::HashMap;

    fn schema() -> Arc<ModelRegistry> {
        let author = Model::new("Author")
            .mapped_to("authors")
            .field(Field::new("id", ScalarType::String).id())
            .field(Field::new("name", ScalarType::String))
            .relation(Relation::new("posts", RelationKind::OneToMany, "Post"));
        let post = Model::new("Post")
            .mapped_to("posts")
            .field(Field::new("id", ScalarType::String).id())
            .field(Field::new("title", ScalarType::String))
            .field(Field::new("views", ScalarType::Int))
            .field(Field::new("authorId", ScalarType::String))
            .relation(Relation::new("author", RelationKind::ManyToOne, "Author").with_fk(vec!["authorId".into()], vec!["id".into()]));
        Arc::new(ModelRegistry::new([author, post]).unwrap())
    }

    fn engine() -> (QueryEngine, Arc<MockConnector>) {
        let registry = schema();
        let connector = MockConnector::new();
        (QueryEngine::new(connector.clone(), registry), connector)
    }

    fn row(pairs: &[(&str, sql_fragment::Value)]) -> crate::connector::Row {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect::<HashMap<_, _>>()
    }

    #[test]
    fn build_find_many_never_touches_the_connector() {
        let (engine, connector) = engine();
        let stmt = engine.build("Post", Operation::FindMany, &json!({})).unwrap();
        assert!(stmt.sql_text.starts_with("SELECT"));
        assert!(connector.statements().is_empty());
    }

    #[test]
    fn build_rejects_create_with_nested_relations() {
        let (engine, _connector) = engine();
        let args = json!({"data": {"name": "Ada", "posts": {"create": [{"id": "P1", "title": "Hi", "views": 0}]}}});
        let err = engine.build("Author", Operation::Create, &args).unwrap_err();
        assert!(matches!(err, QueryError::InvalidInput { .. }));
    }

    #[test]
    fn negative_take_flips_order_by_and_limits_to_first() {
        let (engine, _connector) = engine();
        let args = json!({"orderBy": {"title": "asc"}, "take": -3});
        let stmt = engine.build("Post", Operation::FindMany, &args).unwrap();
        assert!(stmt.sql_text.contains("DESC"));
        assert!(stmt.sql_text.ends_with("LIMIT 3"));
    }

    #[tokio::test]
    async fn find_many_parses_rows_into_records() {
        let (engine, connector) = engine();
        connector.push_response(vec![row(&[("id", sql_fragment::Value::text("P1")), ("title", sql_fragment::Value::text("Hi")), ("views", sql_fragment::Value::Int32(3)), ("authorId", sql_fragment::Value::text("A1"))])]);

        let result = engine.execute("Post", Operation::FindMany, &json!({})).await.unwrap();
        let EngineResult::Records(records) = result else { panic!("expected Records") };
        assert_eq!(records.len(), 1);
        let record = records[0].as_record().unwrap();
        assert_eq!(record.get("title").and_then(ParsedValue::as_scalar), Some(&sql_fragment::Value::text("Hi")));
    }

    #[tokio::test]
    async fn find_many_with_negative_take_reverses_fetched_rows() {
        let (engine, connector) = engine();
        connector.push_response(vec![
            row(&[("id", sql_fragment::Value::text("P2")), ("title", sql_fragment::Value::text("Second")), ("views", sql_fragment::Value::Int32(2)), ("authorId", sql_fragment::Value::text("A1"))]),
            row(&[("id", sql_fragment::Value::text("P1")), ("title", sql_fragment::Value::text("First")), ("views", sql_fragment::Value::Int32(1)), ("authorId", sql_fragment::Value::text("A1"))]),
        ]);

        let args = json!({"orderBy": {"id": "asc"}, "take": -2});
        let result = engine.execute("Post", Operation::FindMany, &args).await.unwrap();
        let EngineResult::Records(records) = result else { panic!("expected Records") };
        let ids: Vec<_> = records.iter().map(|r| r.as_record().unwrap().get("id").and_then(ParsedValue::as_scalar).cloned()).collect();
        assert_eq!(ids, vec![Some(sql_fragment::Value::text("P1")), Some(sql_fragment::Value::text("P2"))]);
    }

    #[tokio::test]
    async fn count_without_select_collapses_to_a_bare_number() {
        let (engine, connector) = engine();
        connector.push_response(vec![row(&[("_all", sql_fragment::Value::Int64(7))])]);

        let result = engine.execute("Post", Operation::Count, &json!({})).await.unwrap();
        let EngineResult::Count(value) = result else { panic!("expected Count") };
        assert_eq!(value, ParsedValue::Scalar(sql_fragment::Value::Int64(7)));
    }

    #[tokio::test]
    async fn aggregate_regroups_dotted_columns_into_nested_objects() {
        let (engine, connector) = engine();
        connector.push_response(vec![row(&[("_avg.views", sql_fragment::Value::Double(2.5)), ("_count", sql_fragment::Value::Int64(4))])]);

        let args = json!({"_avg": {"views": true}, "_count": true});
        let result = engine.execute("Post", Operation::Aggregate, &args).await.unwrap();
        let EngineResult::Aggregate(ParsedValue::Record(fields)) = result else { panic!("expected Aggregate record") };
        assert!(matches!(fields.get("_avg").and_then(ParsedValue::as_record).and_then(|r| r.get("views")), Some(ParsedValue::Scalar(_))));
        assert_eq!(fields.get("_count"), Some(&ParsedValue::Scalar(sql_fragment::Value::Int64(4))));
    }

    #[test]
    fn group_by_having_combines_a_plain_field_and_a_count_aggregate() {
        let (engine, _connector) = engine();
        let args = json!({
            "by": "authorId",
            "_count": {"id": true},
            "having": {"authorId": {"equals": "A1"}, "id": {"_count": {"gt": 5}}},
        });
        let stmt = engine.build("Post", Operation::GroupBy, &args).unwrap();
        assert!(stmt.sql_text.contains("HAVING \"t0\".\"authorId\" = $1 AND COUNT(\"t0\".\"id\") > $2"));
    }

    #[test]
    fn group_by_having_rejects_an_aggregate_that_was_not_requested() {
        let (engine, _connector) = engine();
        let args = json!({
            "by": "authorId",
            "having": {"id": {"_count": {"gt": 5}}},
        });
        let err = engine.build("Post", Operation::GroupBy, &args).unwrap_err();
        assert!(matches!(err, QueryError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn create_goes_through_the_transactional_planner() {
        let (engine, connector) = engine();
        // `create_transactional` opens a transaction, inserts, and (since the
        // mock reports no RETURNING rows) refetches by id.
        connector.push_response(vec![row(&[("id", sql_fragment::Value::text("A1")), ("name", sql_fragment::Value::text("Ada"))])]);

        let args = json!({"data": {"id": "A1", "name": "Ada"}});
        let result = engine.execute("Author", Operation::Create, &args).await.unwrap();
        let EngineResult::Record(Some(record)) = result else { panic!("expected a created record") };
        assert_eq!(record.as_record().unwrap().get("name").and_then(ParsedValue::as_scalar), Some(&sql_fragment::Value::text("Ada")));
    }

    #[tokio::test]
    async fn create_many_reports_a_batch_count() {
        let (engine, _connector) = engine();
        let args = json!({"data": [{"id": "P1", "title": "A", "views": 0, "authorId": "A1"}, {"id": "P2", "title": "B", "views": 0, "authorId": "A1"}]});
        let result = engine.execute("Post", Operation::CreateMany, &args).await.unwrap();
        let EngineResult::Batch(ParsedValue::Record(fields)) = result else { panic!("expected Batch record") };
        assert!(fields.contains_key("count"));
    }

    #[tokio::test]
    async fn exist_reads_the_boolean_column() {
        let (engine, connector) = engine();
        connector.push_response(vec![row(&[("exists", sql_fragment::Value::Boolean(true))])]);
        let result = engine.execute("Post", Operation::Exist, &json!({"where": {"id": "P1"}})).await.unwrap();
        assert_eq!(result, EngineResult::Exists(true));
    }
}
