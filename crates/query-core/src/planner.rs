//! Nested-Write Planner (C8, §4.11): splits `data` into scalar and relation
//! mutations, classifies FK direction per relation, and executes the
//! transactional step sequence so that parent-before-child and
//! child-before-parent ordering always holds.
//!
//! The single-statement-with-subqueries fast path §4.11 describes for a
//! pure-connect payload is not implemented — it would require the INSERT
//! builder to splice an arbitrary scalar-subquery expression into a value
//! slot instead of a parameterized [`Value`], which
//! [`sql_query_builder::build_insert_rows`] doesn't support. The
//! transactional plan below is always correct, just one round trip chattier
//! for that one shape; recorded as a deliberate simplification in DESIGN.md.

use std::sync::Arc;

use indexmap::IndexMap;
use query_structure::{AutoGenerate, Model, RelationInfo, RelationKind};
use sql_fragment::Value;
use sql_query_builder::args::{DataRecord, ManyTarget, Projection, RelationMutation, ScalarFilter, ScalarWrite, WhereNode, WhereUnique};
use sql_query_builder::{build_create, build_delete, build_find, build_update, FindArgs, QueryContext};

use crate::connector::{Connector, Row, Transaction};
use crate::error::{QueryError, QueryResult};

enum Exec<'a> {
    Connector(&'a dyn Connector),
    Transaction(&'a dyn Transaction),
}

impl Exec<'_> {
    async fn execute(&self, sql: &str, params: &[Value]) -> QueryResult<crate::connector::ExecuteResult> {
        tracing::debug!(sql, param_count = params.len(), "executing planner step");
        match self {
            Exec::Connector(c) => c.execute(sql, params).await,
            Exec::Transaction(t) => t.execute(sql, params).await,
        }
    }

    async fn query(&self, sql: &str, params: &[Value]) -> QueryResult<Vec<Row>> {
        tracing::debug!(sql, param_count = params.len(), "querying planner step");
        match self {
            Exec::Connector(c) => c.query(sql, params).await,
            Exec::Transaction(t) => t.query(sql, params).await,
        }
    }
}

fn render(ctx: &QueryContext, fragment: sql_fragment::Fragment) -> (String, Vec<Value>) {
    fragment.render(ctx.dialect.placeholder_style())
}

fn nested_err(model: &str, relation: &str, source: QueryError) -> QueryError {
    QueryError::NestedWriteError { model: model.to_owned(), relation: relation.to_owned(), source: Box::new(source) }
}

pub(crate) fn where_unique_to_node(unique: &WhereUnique) -> WhereNode {
    match unique {
        WhereUnique::Single { field, value } => WhereNode::scalar(field.clone(), ScalarFilter::Equals(value.clone())),
        WhereUnique::Compound { fields } => {
            WhereNode::all(fields.iter().map(|(f, v)| WhereNode::scalar(f.clone(), ScalarFilter::Equals(v.clone()))).collect())
        }
    }
}

fn fk_equals_node(fields: &[String], values: &[Value]) -> WhereNode {
    WhereNode::all(fields.iter().zip(values).map(|(f, v)| WhereNode::scalar(f.clone(), ScalarFilter::Equals(v.clone()))).collect())
}

fn full_projection() -> Projection {
    Projection::Include(Vec::new())
}

/// Runs `create` for one model, recursing into nested relation payloads.
/// Returns the created row, with every scalar column populated (regardless
/// of the caller's requested `returning` shape) so ancestors can read
/// freshly-generated FK values back out of it.
pub async fn create_one(exec_connector: Option<&dyn Connector>, exec_tx: Option<&dyn Transaction>, ctx: &QueryContext, data: DataRecord) -> QueryResult<Row> {
    let exec = match (exec_connector, exec_tx) {
        (_, Some(t)) => Exec::Transaction(t),
        (Some(c), _) => Exec::Connector(c),
        _ => unreachable!("create_one needs either a connector or a transaction"),
    };
    create_one_inner(&exec, ctx, data).await
}

async fn create_one_inner(exec: &Exec<'_>, ctx: &QueryContext, mut data: DataRecord) -> QueryResult<Row> {
    let (fk_holding, target_holding, many_to_many) = partition_relations(ctx, &data.relations)?;

    for (info, mutation) in &fk_holding {
        resolve_fk_holding_into_scalars(exec, ctx, info, mutation, &mut data.scalars).await?;
    }

    let row = build_insert_row(ctx, &data.scalars)?;
    let created = insert_and_capture(exec, ctx, row).await?;
    let parent_values = pk_values(ctx, &info_self_fields_for_model(ctx), &created)?;

    for (info, mutation) in &target_holding {
        apply_target_holding(exec, ctx, info, mutation, &parent_values).await.map_err(|e| nested_err(&ctx.model.name, &info.name, e))?;
    }
    for (info, mutation) in &many_to_many {
        apply_many_to_many(exec, ctx, info, mutation, &parent_values).await.map_err(|e| nested_err(&ctx.model.name, &info.name, e))?;
    }

    Ok(created)
}

/// `update` for one uniquely-identified row, recursing into nested relation
/// payloads the same way `create_one` does.
pub async fn update_one(exec_connector: Option<&dyn Connector>, exec_tx: Option<&dyn Transaction>, ctx: &QueryContext, unique: &WhereUnique, data: DataRecord) -> QueryResult<Row> {
    let exec = match (exec_connector, exec_tx) {
        (_, Some(t)) => Exec::Transaction(t),
        (Some(c), _) => Exec::Connector(c),
        _ => unreachable!("update_one needs either a connector or a transaction"),
    };
    update_one_inner(&exec, ctx, unique, data).await
}

async fn update_one_inner(exec: &Exec<'_>, ctx: &QueryContext, unique: &WhereUnique, mut data: DataRecord) -> QueryResult<Row> {
    let (fk_holding, target_holding, many_to_many) = partition_relations(ctx, &data.relations)?;

    for (info, mutation) in &fk_holding {
        resolve_fk_holding_into_scalars(exec, ctx, info, mutation, &mut data.scalars).await?;
    }

    let where_ = where_unique_to_node(unique);
    let updated = if data.scalars.is_empty() {
        find_one(exec, ctx, &where_).await?
    } else {
        let stmt = build_update(ctx, &data.scalars, &where_, &full_projection())?;
        let (sql, params) = render(ctx, stmt);
        let result = exec.execute(&sql, &params).await?;
        match result.rows.into_iter().next() {
            Some(row) => row,
            None => find_one(exec, ctx, &where_).await?,
        }
    };

    let parent_values = pk_values(ctx, &info_self_fields_for_model(ctx), &updated)?;

    for (info, mutation) in &target_holding {
        apply_target_holding(exec, ctx, info, mutation, &parent_values).await.map_err(|e| nested_err(&ctx.model.name, &info.name, e))?;
    }
    for (info, mutation) in &many_to_many {
        apply_many_to_many(exec, ctx, info, mutation, &parent_values).await.map_err(|e| nested_err(&ctx.model.name, &info.name, e))?;
    }

    Ok(updated)
}

fn info_self_fields_for_model(ctx: &QueryContext) -> Vec<String> {
    ctx.model.id_fields()
}

/// Reads the current model's id-field values out of a captured row, in the
/// order the schema declares them. Used both as "the parent PK" passed down
/// to children and as the lookup key for a relation's `self_fields`.
fn pk_values(ctx: &QueryContext, fields: &[String], row: &Row) -> QueryResult<Vec<Value>> {
    fields
        .iter()
        .map(|f| {
            row.get(f).cloned().ok_or_else(|| QueryError::ConnectorError(format!("row for `{}` is missing id field `{f}` after write", ctx.model.name)))
        })
        .collect()
}

type RelationMutations<'a> = Vec<(RelationInfo, &'a RelationMutation)>;

fn partition_relations<'a>(ctx: &QueryContext, relations: &'a [RelationMutation]) -> QueryResult<(RelationMutations<'a>, RelationMutations<'a>, RelationMutations<'a>)> {
    let mut fk_holding = Vec::new();
    let mut target_holding = Vec::new();
    let mut many_to_many = Vec::new();

    for mutation in relations {
        let info = RelationInfo::resolve(&ctx.registry, &ctx.model, &mutation.relation)?;
        match info.kind {
            RelationKind::ManyToMany => many_to_many.push((info, mutation)),
            _ if info.holds_fk => fk_holding.push((info, mutation)),
            _ => target_holding.push((info, mutation)),
        }
    }
    Ok((fk_holding, target_holding, many_to_many))
}

/// `create`/`connect`/`connectOrCreate` on a relation the *current* model's
/// FK points out of: resolves (or creates) the target row and copies its
/// `target_fields` values into the corresponding `self_fields` scalar write
/// before the parent itself is inserted/updated.
async fn resolve_fk_holding_into_scalars(
    exec: &Exec<'_>,
    ctx: &QueryContext,
    info: &RelationInfo,
    mutation: &RelationMutation,
    scalars: &mut IndexMap<String, ScalarWrite>,
) -> QueryResult<()> {
    let target_ctx = ctx.descend(info.target_model.clone());

    if matches!(mutation.disconnect, ManyTarget::All) {
        for field in &info.self_fields {
            scalars.insert(field.clone(), ScalarWrite::Set(Value::Null));
        }
        return Ok(());
    }

    let target_values = if let Some(child_data) = mutation.create.first() {
        let created = Box::pin(create_one_inner(exec, &target_ctx, child_data.clone())).await.map_err(|e| nested_err(&ctx.model.name, &info.name, e))?;
        pk_values(&target_ctx, &info.target_fields, &created).map_err(|e| nested_err(&ctx.model.name, &info.name, e))?
    } else if let Some(unique) = mutation.connect.first() {
        lookup_target_fields(exec, &target_ctx, &info.target_fields, unique).await.map_err(|e| nested_err(&ctx.model.name, &info.name, e))?
    } else if let Some((unique, child_data)) = mutation.connect_or_create.first() {
        match try_lookup_target_fields(exec, &target_ctx, &info.target_fields, unique).await? {
            Some(values) => values,
            None => {
                let created =
                    Box::pin(create_one_inner(exec, &target_ctx, child_data.clone())).await.map_err(|e| nested_err(&ctx.model.name, &info.name, e))?;
                pk_values(&target_ctx, &info.target_fields, &created).map_err(|e| nested_err(&ctx.model.name, &info.name, e))?
            }
        }
    } else {
        return Ok(());
    };

    for (field, value) in info.self_fields.iter().zip(target_values) {
        scalars.insert(field.clone(), ScalarWrite::Set(value));
    }
    Ok(())
}

async fn lookup_target_fields(exec: &Exec<'_>, target_ctx: &QueryContext, target_fields: &[String], unique: &WhereUnique) -> QueryResult<Vec<Value>> {
    try_lookup_target_fields(exec, target_ctx, target_fields, unique)
        .await?
        .ok_or_else(|| QueryError::InvalidInput {
            operation: "connect".to_owned(),
            model: target_ctx.model.name.clone(),
            path: "where".to_owned(),
            message: "no row matches the given unique filter".to_owned(),
        })
}

async fn try_lookup_target_fields(exec: &Exec<'_>, target_ctx: &QueryContext, target_fields: &[String], unique: &WhereUnique) -> QueryResult<Option<Vec<Value>>> {
    let row = find_one_by_unique(exec, target_ctx, unique).await?;
    match row {
        None => Ok(None),
        Some(row) => Ok(Some(pk_values(target_ctx, target_fields, &row)?)),
    }
}

async fn find_one_by_unique(exec: &Exec<'_>, ctx: &QueryContext, unique: &WhereUnique) -> QueryResult<Option<Row>> {
    let args = FindArgs {
        where_: &WhereNode::empty(),
        where_unique: Some(unique),
        order_by: &[],
        cursor: None,
        take: None,
        skip: None,
        distinct: false,
        projection: &full_projection(),
        force_single: true,
    };
    let stmt = build_find(ctx, &args)?;
    let (sql, params) = render(ctx, stmt);
    Ok(exec.query(&sql, &params).await?.into_iter().next())
}

async fn find_one(exec: &Exec<'_>, ctx: &QueryContext, where_: &WhereNode) -> QueryResult<Row> {
    let args = FindArgs {
        where_,
        where_unique: None,
        order_by: &[],
        cursor: None,
        take: None,
        skip: None,
        distinct: false,
        projection: &full_projection(),
        force_single: true,
    };
    let stmt = build_find(ctx, &args)?;
    let (sql, params) = render(ctx, stmt);
    exec.query(&sql, &params)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| QueryError::ConnectorError(format!("expected exactly one `{}` row after write, found none", ctx.model.name)))
}

pub(crate) fn build_insert_row(ctx: &QueryContext, scalars: &IndexMap<String, ScalarWrite>) -> QueryResult<IndexMap<String, Value>> {
    let mut row = IndexMap::new();
    for (field, write) in scalars {
        match write {
            ScalarWrite::Set(v) => {
                row.insert(field.clone(), v.clone());
            }
            other => {
                return Err(QueryError::InvalidInput {
                    operation: "create".to_owned(),
                    model: ctx.model.name.clone(),
                    path: format!("data.{field}"),
                    message: format!("`{other:?}` is not a valid create write; only a direct value is"),
                });
            }
        }
    }

    for field in ctx.model.scalars.values() {
        if row.contains_key(&field.name) {
            continue;
        }
        if matches!(field.auto_generate, Some(AutoGenerate::Uuid)) {
            row.insert(field.name.clone(), Value::Text(uuid::Uuid::new_v4().to_string()));
        }
    }

    Ok(row)
}

/// INSERTs one row and returns it with every scalar column populated. On
/// dialects with `RETURNING` this is free; otherwise the generated PK is
/// recovered via `Dialect::last_insert_id_query` (or used directly, if the
/// caller already supplied it) and the row is refetched.
async fn insert_and_capture(exec: &Exec<'_>, ctx: &QueryContext, row: IndexMap<String, Value>) -> QueryResult<Row> {
    let stmt = build_create(ctx, std::slice::from_ref(&row), false, &full_projection())?;
    let (sql, params) = render(ctx, stmt);
    let result = exec.execute(&sql, &params).await?;

    if ctx.dialect.has(sql_dialect::Capability::Returning) {
        if let Some(returned) = result.rows.into_iter().next() {
            return Ok(returned);
        }
    }

    let id_fields = ctx.model.id_fields();
    let pk_field = id_fields.first().ok_or_else(|| QueryError::ConnectorError(format!("`{}` has no id field to refetch by", ctx.model.name)))?;

    let pk_value = match row.get(pk_field) {
        Some(v) if !v.is_null() => v.clone(),
        _ => {
            let auto_increment = ctx.model.scalar(pk_field).is_some_and(|f| matches!(f.auto_generate, Some(AutoGenerate::DbAutoIncrement)));
            if !auto_increment {
                return Err(QueryError::ConnectorError(format!("`{}.{pk_field}` has no value to refetch the inserted row by", ctx.model.name)));
            }
            let table = ctx.model.table_name();
            let column = ctx.model.scalar(pk_field).map(|f| f.column_name()).unwrap_or(pk_field.as_str());
            let (sql, params) = render(ctx, ctx.dialect.last_insert_id_query(table, column));
            let rows = exec.query(&sql, &params).await?;
            let lookup_row = rows.into_iter().next().ok_or_else(|| QueryError::ConnectorError("last-insert-id query returned no row".to_owned()))?;
            lookup_row
                .values()
                .next()
                .cloned()
                .ok_or_else(|| QueryError::ConnectorError("last-insert-id query returned no column".to_owned()))?
        }
    };

    let unique = WhereUnique::Single { field: pk_field.clone(), value: pk_value };
    find_one_by_unique(exec, ctx, &unique)
        .await?
        .ok_or_else(|| QueryError::ConnectorError(format!("could not refetch `{}` after insert", ctx.model.name)))
}

/// `create`/`connect`/`connectOrCreate`/`disconnect`/`delete`/`set` on a
/// relation where the *target* model holds the FK (`OneToMany`, or a
/// `OneToOne` declared from the non-owning side).
async fn apply_target_holding(exec: &Exec<'_>, ctx: &QueryContext, info: &RelationInfo, mutation: &RelationMutation, parent_values: &[Value]) -> QueryResult<()> {
    let target_ctx = ctx.descend(info.target_model.clone());
    let fk_here_equals_parent = fk_equals_node(&info.target_fields, parent_values);

    for child_data in &mutation.create {
        let mut child_data = child_data.clone();
        for (field, value) in info.target_fields.iter().zip(parent_values) {
            child_data.scalars.insert(field.clone(), ScalarWrite::Set(value.clone()));
        }
        Box::pin(create_one_inner(exec, &target_ctx, child_data)).await?;
    }

    for unique in &mutation.connect {
        connect_child(exec, &target_ctx, &info.target_fields, parent_values, unique).await?;
    }

    for (unique, child_data) in &mutation.connect_or_create {
        match try_lookup_target_fields(exec, &target_ctx, &info.target_fields, unique).await? {
            Some(_) => connect_child(exec, &target_ctx, &info.target_fields, parent_values, unique).await?,
            None => {
                let mut child_data = child_data.clone();
                for (field, value) in info.target_fields.iter().zip(parent_values) {
                    child_data.scalars.insert(field.clone(), ScalarWrite::Set(value.clone()));
                }
                Box::pin(create_one_inner(exec, &target_ctx, child_data)).await?;
            }
        }
    }

    match &mutation.disconnect {
        ManyTarget::None => {}
        ManyTarget::All => set_fk_null(exec, &target_ctx, &info.target_fields, &fk_here_equals_parent).await?,
        ManyTarget::Where(uniques) => {
            for unique in uniques {
                let where_ = WhereNode::all(vec![fk_here_equals_parent.clone(), where_unique_to_node(unique)]);
                set_fk_null(exec, &target_ctx, &info.target_fields, &where_).await?;
            }
        }
    }

    match &mutation.delete {
        ManyTarget::None => {}
        ManyTarget::All => delete_matching(exec, &target_ctx, &fk_here_equals_parent).await?,
        ManyTarget::Where(uniques) => {
            for unique in uniques {
                let where_ = WhereNode::all(vec![fk_here_equals_parent.clone(), where_unique_to_node(unique)]);
                delete_matching(exec, &target_ctx, &where_).await?;
            }
        }
    }

    if let Some(set_list) = &mutation.set {
        set_fk_null(exec, &target_ctx, &info.target_fields, &fk_here_equals_parent).await?;
        for unique in set_list {
            connect_child(exec, &target_ctx, &info.target_fields, parent_values, unique).await?;
        }
    }

    Ok(())
}

async fn connect_child(exec: &Exec<'_>, target_ctx: &QueryContext, target_fields: &[String], parent_values: &[Value], unique: &WhereUnique) -> QueryResult<()> {
    let mut assignments = IndexMap::new();
    for (field, value) in target_fields.iter().zip(parent_values) {
        assignments.insert(field.clone(), ScalarWrite::Set(value.clone()));
    }
    let where_ = where_unique_to_node(unique);
    let stmt = build_update(target_ctx, &assignments, &where_, &full_projection())?;
    let (sql, params) = render(target_ctx, stmt);
    exec.execute(&sql, &params).await?;
    Ok(())
}

async fn set_fk_null(exec: &Exec<'_>, target_ctx: &QueryContext, target_fields: &[String], where_: &WhereNode) -> QueryResult<()> {
    let mut assignments = IndexMap::new();
    for field in target_fields {
        assignments.insert(field.clone(), ScalarWrite::Set(Value::Null));
    }
    let stmt = build_update(target_ctx, &assignments, where_, &full_projection())?;
    let (sql, params) = render(target_ctx, stmt);
    exec.execute(&sql, &params).await?;
    Ok(())
}

async fn delete_matching(exec: &Exec<'_>, target_ctx: &QueryContext, where_: &WhereNode) -> QueryResult<()> {
    let stmt = build_delete(target_ctx, where_, false, &full_projection())?;
    let (sql, params) = render(target_ctx, stmt);
    exec.execute(&sql, &params).await?;
    Ok(())
}

/// `manyToMany` mutations only ever touch the junction table (§4.11 step 4
/// "never touches target PKs" — `delete` degrades to a junction-row removal
/// like `disconnect`, since deleting the target row itself isn't this
/// relation's business).
async fn apply_many_to_many(exec: &Exec<'_>, ctx: &QueryContext, info: &RelationInfo, mutation: &RelationMutation, parent_values: &[Value]) -> QueryResult<()> {
    let target_ctx = ctx.descend(info.target_model.clone());
    let junction = query_structure::JunctionInfo::resolve(&ctx.model, &target_ctx.model, ctx.model.relation_named(&info.name).unwrap());
    let parent_pk = parent_values.first().cloned().unwrap_or(Value::Null);

    for child_data in &mutation.create {
        let created = Box::pin(create_one_inner(exec, &target_ctx, child_data.clone())).await?;
        let child_pk = created.get(&junction.target_pk).cloned().unwrap_or(Value::Null);
        insert_junction_row(exec, ctx, &junction, parent_pk.clone(), child_pk).await?;
    }

    for unique in &mutation.connect {
        let child_pk = lookup_pk(exec, &target_ctx, &junction.target_pk, unique).await?;
        insert_junction_row(exec, ctx, &junction, parent_pk.clone(), child_pk).await?;
    }

    for (unique, child_data) in &mutation.connect_or_create {
        let child_pk = match try_lookup_target_fields(exec, &target_ctx, std::slice::from_ref(&junction.target_pk), unique).await? {
            Some(mut values) => values.pop().unwrap_or(Value::Null),
            None => {
                let created = Box::pin(create_one_inner(exec, &target_ctx, child_data.clone())).await?;
                created.get(&junction.target_pk).cloned().unwrap_or(Value::Null)
            }
        };
        insert_junction_row(exec, ctx, &junction, parent_pk.clone(), child_pk).await?;
    }

    match &mutation.disconnect {
        ManyTarget::None => {}
        ManyTarget::All => delete_junction_rows(exec, ctx, &junction, parent_pk.clone(), None).await?,
        ManyTarget::Where(uniques) => {
            for unique in uniques {
                let child_pk = lookup_pk(exec, &target_ctx, &junction.target_pk, unique).await?;
                delete_junction_rows(exec, ctx, &junction, parent_pk.clone(), Some(child_pk)).await?;
            }
        }
    }

    match &mutation.delete {
        ManyTarget::None => {}
        ManyTarget::All => delete_junction_rows(exec, ctx, &junction, parent_pk.clone(), None).await?,
        ManyTarget::Where(uniques) => {
            for unique in uniques {
                let child_pk = lookup_pk(exec, &target_ctx, &junction.target_pk, unique).await?;
                delete_junction_rows(exec, ctx, &junction, parent_pk.clone(), Some(child_pk)).await?;
            }
        }
    }

    if let Some(set_list) = &mutation.set {
        delete_junction_rows(exec, ctx, &junction, parent_pk.clone(), None).await?;
        for unique in set_list {
            let child_pk = lookup_pk(exec, &target_ctx, &junction.target_pk, unique).await?;
            insert_junction_row(exec, ctx, &junction, parent_pk.clone(), child_pk).await?;
        }
    }

    Ok(())
}

async fn lookup_pk(exec: &Exec<'_>, target_ctx: &QueryContext, pk_field: &str, unique: &WhereUnique) -> QueryResult<Value> {
    try_lookup_target_fields(exec, target_ctx, std::slice::from_ref(&pk_field.to_owned()), unique)
        .await?
        .and_then(|mut v| v.pop())
        .ok_or_else(|| QueryError::InvalidInput {
            operation: "connect".to_owned(),
            model: target_ctx.model.name.clone(),
            path: "where".to_owned(),
            message: "no row matches the given unique filter".to_owned(),
        })
}

async fn insert_junction_row(exec: &Exec<'_>, ctx: &QueryContext, junction: &query_structure::JunctionInfo, source_pk: Value, target_pk: Value) -> QueryResult<()> {
    let table = sql_fragment::Fragment::raw(ctx.dialect.escape_identifier(&junction.table_name));
    let columns = vec![junction.source_column.clone(), junction.target_column.clone()];
    let row = vec![vec![sql_fragment::Fragment::param(source_pk), sql_fragment::Fragment::param(target_pk)]];
    let stmt = ctx.dialect.insert(table, &columns, row);
    let (sql, params) = render(ctx, stmt);
    exec.execute(&sql, &params).await?;
    Ok(())
}

async fn delete_junction_rows(exec: &Exec<'_>, ctx: &QueryContext, junction: &query_structure::JunctionInfo, source_pk: Value, target_pk: Option<Value>) -> QueryResult<()> {
    let table = sql_fragment::Fragment::raw(ctx.dialect.escape_identifier(&junction.table_name));
    let source_col = sql_fragment::Fragment::raw(ctx.dialect.escape_identifier(&junction.source_column));
    let mut where_ = ctx.dialect.eq(source_col, sql_fragment::Fragment::param(source_pk));
    if let Some(target_pk) = target_pk {
        let target_col = sql_fragment::Fragment::raw(ctx.dialect.escape_identifier(&junction.target_column));
        where_ = ctx.dialect.and(vec![where_, ctx.dialect.eq(target_col, sql_fragment::Fragment::param(target_pk))]);
    }
    let stmt = ctx.dialect.delete(table, where_);
    let (sql, params) = render(ctx, stmt);
    exec.execute(&sql, &params).await?;
    Ok(())
}

/// Entry point the facade calls for a top-level `create`: opens a
/// transaction when the dialect supports one, runs the whole nested-write
/// step sequence inside it, and commits or rolls back as one unit. Falls
/// back to running directly against the connector — no rollback safety net
/// — when the dialect declares `Capability::Transactions` absent (§4.11
/// "Failure semantics", §5).
#[tracing::instrument(skip_all, fields(model = %ctx.model.name))]
pub async fn create_transactional(connector: &dyn Connector, ctx: &QueryContext, data: DataRecord) -> QueryResult<Row> {
    if !ctx.dialect.has(sql_dialect::Capability::Transactions) {
        return create_one_inner(&Exec::Connector(connector), ctx, data).await;
    }

    let tx = connector.begin().await?;
    tracing::info!(model = %ctx.model.name, "transaction started");
    match create_one_inner(&Exec::Transaction(tx.as_ref()), ctx, data).await {
        Ok(row) => {
            tx.commit().await?;
            tracing::info!(model = %ctx.model.name, "transaction committed");
            Ok(row)
        }
        Err(err) => {
            let _ = tx.rollback().await;
            tracing::info!(model = %ctx.model.name, "transaction rolled back");
            Err(err)
        }
    }
}

/// Same wrapping as [`create_transactional`], for a top-level `update`.
#[tracing::instrument(skip_all, fields(model = %ctx.model.name))]
pub async fn update_transactional(connector: &dyn Connector, ctx: &QueryContext, unique: &WhereUnique, data: DataRecord) -> QueryResult<Row> {
    if !ctx.dialect.has(sql_dialect::Capability::Transactions) {
        return update_one_inner(&Exec::Connector(connector), ctx, unique, data).await;
    }

    let tx = connector.begin().await?;
    tracing::info!(model = %ctx.model.name, "transaction started");
    match update_one_inner(&Exec::Transaction(tx.as_ref()), ctx, unique, data).await {
        Ok(row) => {
            tx.commit().await?;
            tracing::info!(model = %ctx.model.name, "transaction committed");
            Ok(row)
        }
        Err(err) => {
            let _ = tx.rollback().await;
            tracing::info!(model = %ctx.model.name, "transaction rolled back");
            Err(err)
        }
    }
}

/// `upsert`: looks the row up by its unique key inside the transaction,
/// then runs `update_one_inner`/`create_one_inner` depending on whether it
/// exists (§5 "Read-then-write sequences ... rely on the enclosing
/// transaction"). Only worth the round trip when either branch carries
/// nested relation mutations — the facade prefers the single
/// `INSERT ... ON CONFLICT` statement from `build_upsert` otherwise.
#[tracing::instrument(skip_all, fields(model = %ctx.model.name))]
pub async fn upsert_transactional(connector: &dyn Connector, ctx: &QueryContext, unique: &WhereUnique, create: DataRecord, update: DataRecord) -> QueryResult<Row> {
    if !ctx.dialect.has(sql_dialect::Capability::Transactions) {
        return upsert_inner(&Exec::Connector(connector), ctx, unique, create, update).await;
    }

    let tx = connector.begin().await?;
    tracing::info!(model = %ctx.model.name, "transaction started");
    match upsert_inner(&Exec::Transaction(tx.as_ref()), ctx, unique, create, update).await {
        Ok(row) => {
            tx.commit().await?;
            tracing::info!(model = %ctx.model.name, "transaction committed");
            Ok(row)
        }
        Err(err) => {
            let _ = tx.rollback().await;
            tracing::info!(model = %ctx.model.name, "transaction rolled back");
            Err(err)
        }
    }
}

async fn upsert_inner(exec: &Exec<'_>, ctx: &QueryContext, unique: &WhereUnique, create: DataRecord, update: DataRecord) -> QueryResult<Row> {
    match find_one_by_unique(exec, ctx, unique).await? {
        Some(_) => update_one_inner(exec, ctx, unique, update).await,
        None => create_one_inner(exec, ctx, create).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::mock::MockConnector;
    use query_structure::{Field, ModelRegistry, Relation, ScalarType};
    use sql_query_builder::QueryContext;
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
            .field(Field::new("authorId", ScalarType::String))
            .relation(Relation::new("author", RelationKind::ManyToOne, "Author").with_fk(vec!["authorId".into()], vec!["id".into()]));
        Arc::new(ModelRegistry::new([author, post]).unwrap())
    }

    fn ctx_for(registry: &Arc<ModelRegistry>, model: &str) -> QueryContext {
        QueryContext::new_root(Arc::new(sql_dialect::PostgresDialect), registry.clone(), registry.resolve(model).unwrap())
    }

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect::<HashMap<_, _>>()
    }

    #[tokio::test]
    async fn create_with_no_relations_inserts_and_returns_with_returning() {
        let registry = schema();
        let ctx = ctx_for(&registry, "Author");
        let connector = MockConnector::new();

        let mut data = DataRecord::default();
        data.scalars.insert("id".to_string(), ScalarWrite::Set(Value::text("A1")));
        data.scalars.insert("name".to_string(), ScalarWrite::Set(Value::text("Ada")));

        let result = create_one(Some(connector.as_ref()), None, &ctx, data).await.unwrap();
        assert_eq!(connector.statements().len(), 1);
        assert!(connector.statements()[0].starts_with("INSERT INTO \"authors\""));
        let _ = result;
    }

    #[tokio::test]
    async fn nested_create_on_one_to_many_inserts_child_with_parent_fk() {
        let registry = schema();
        let ctx = ctx_for(&registry, "Author");
        let connector = MockConnector::new();

        let mut child = DataRecord::default();
        child.scalars.insert("id".to_string(), ScalarWrite::Set(Value::text("P1")));
        child.scalars.insert("title".to_string(), ScalarWrite::Set(Value::text("Hello")));

        let mut posts_mutation = RelationMutation::new("posts");
        posts_mutation.create.push(child);

        let mut data = DataRecord::default();
        data.scalars.insert("id".to_string(), ScalarWrite::Set(Value::text("A1")));
        data.scalars.insert("name".to_string(), ScalarWrite::Set(Value::text("Ada")));
        data.relations.push(posts_mutation);

        create_one(Some(connector.as_ref()), None, &ctx, data).await.unwrap();

        let statements = connector.statements();
        assert_eq!(statements.len(), 2);
        assert!(statements[0].starts_with("INSERT INTO \"authors\""));
        assert!(statements[1].starts_with("INSERT INTO \"posts\""));
    }

    #[tokio::test]
    async fn connect_on_fk_holding_relation_looks_up_target_first() {
        let registry = schema();
        let ctx = ctx_for(&registry, "Post");
        let connector = MockConnector::new();
        connector.push_response(vec![row(&[("id", Value::text("A1"))])]);

        let mut author_mutation = RelationMutation::new("author");
        author_mutation.connect.push(WhereUnique::Single { field: "id".to_string(), value: Value::text("A1") });

        let mut data = DataRecord::default();
        data.scalars.insert("id".to_string(), ScalarWrite::Set(Value::text("P1")));
        data.scalars.insert("title".to_string(), ScalarWrite::Set(Value::text("Hello")));
        data.relations.push(author_mutation);

        create_one(Some(connector.as_ref()), None, &ctx, data).await.unwrap();

        let statements = connector.statements();
        assert_eq!(statements[0].contains("FROM \"authors\""), true);
        assert!(statements[1].starts_with("INSERT INTO \"posts\""));
        assert!(statements[1].contains("\"authorId\""));
    }

    #[test]
    fn build_insert_row_fills_in_an_absent_uuid_default() {
        let author = Model::new("Author")
            .mapped_to("authors")
            .field(Field::new("id", ScalarType::String).id().auto_generate(AutoGenerate::Uuid))
            .field(Field::new("name", ScalarType::String));
        let registry = Arc::new(ModelRegistry::new([author]).unwrap());
        let ctx = ctx_for(&registry, "Author");

        let mut scalars = IndexMap::new();
        scalars.insert("name".to_string(), ScalarWrite::Set(Value::text("Ada")));

        let row = build_insert_row(&ctx, &scalars).unwrap();
        let id = row.get("id").expect("uuid default should be filled in");
        let Value::Text(id) = id else { panic!("expected a text uuid") };
        assert!(uuid::Uuid::parse_str(id).is_ok());
    }
}
