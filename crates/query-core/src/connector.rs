use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use sql_dialect::Dialect;
use sql_fragment::Value;

use crate::error::QueryError;

/// One row as the driver hands it back: column-name-keyed, matching the
/// emitted `AS` aliases or raw RETURNING column names (§6).
pub type Row = HashMap<String, Value>;

#[derive(Debug, Clone, Default)]
pub struct ExecuteResult {
    pub rows: Vec<Row>,
    pub row_count: u64,
}

/// The minimal surface the engine needs from a driver: `execute`/`query`
/// plus a transaction boundary. Everything above this trait (validation,
/// building, planning, parsing) is driver-agnostic; this is the only seam
/// where I/O happens (§5 "Suspension points"). There's no dedicated
/// last-insert-id method — `Dialect::last_insert_id_query` already renders
/// the right statement text, so the planner just runs it through `query`
/// like anything else (§4.11 "Dialect specifics").
#[async_trait]
pub trait Connector: Send + Sync {
    fn dialect(&self) -> Arc<dyn Dialect>;

    /// Runs a DML statement (INSERT/UPDATE/DELETE, optionally RETURNING).
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<ExecuteResult, QueryError>;

    /// Runs a SELECT; only `rows` is meaningful on the result.
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, QueryError>;

    /// Opens a transaction scope honored when `supportsTransactions`;
    /// drivers that declare the capability absent run the nested-write
    /// planner's steps sequentially without rollback instead (§4.11, §5).
    async fn begin(&self) -> Result<Box<dyn Transaction>, QueryError>;
}

#[async_trait]
pub trait Transaction: Send + Sync {
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<ExecuteResult, QueryError>;
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, QueryError>;
    async fn commit(self: Box<Self>) -> Result<(), QueryError>;
    async fn rollback(self: Box<Self>) -> Result<(), QueryError>;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use sql_dialect::PostgresDialect;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Records every statement it's handed and lets tests queue canned
    /// `query()` responses (for `connectOrCreate`-style existence checks).
    /// Enough to exercise the planner's statement ordering without a real
    /// driver. Every field is itself an `Arc`, so a transaction handle is
    /// just another view onto the same state.
    #[derive(Clone)]
    pub struct MockConnector {
        log: Arc<Mutex<Vec<String>>>,
        query_responses: Arc<Mutex<VecDeque<Vec<Row>>>>,
    }

    impl MockConnector {
        pub fn new() -> Arc<Self> {
            Arc::new(MockConnector { log: Arc::new(Mutex::new(Vec::new())), query_responses: Arc::new(Mutex::new(VecDeque::new())) })
        }

        pub fn push_response(&self, rows: Vec<Row>) {
            self.query_responses.lock().unwrap().push_back(rows);
        }

        pub fn statements(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Connector for MockConnector {
        fn dialect(&self) -> Arc<dyn Dialect> {
            Arc::new(PostgresDialect)
        }

        async fn execute(&self, sql: &str, _params: &[Value]) -> Result<ExecuteResult, QueryError> {
            self.log.lock().unwrap().push(sql.to_owned());
            Ok(ExecuteResult { rows: Vec::new(), row_count: 1 })
        }

        async fn query(&self, sql: &str, _params: &[Value]) -> Result<Vec<Row>, QueryError> {
            self.log.lock().unwrap().push(sql.to_owned());
            Ok(self.query_responses.lock().unwrap().pop_front().unwrap_or_default())
        }

        async fn begin(&self) -> Result<Box<dyn Transaction>, QueryError> {
            Ok(Box::new(self.clone()))
        }
    }

    #[async_trait]
    impl Transaction for MockConnector {
        async fn execute(&self, sql: &str, params: &[Value]) -> Result<ExecuteResult, QueryError> {
            Connector::execute(self, sql, params).await
        }
        async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, QueryError> {
            Connector::query(self, sql, params).await
        }
        async fn commit(self: Box<Self>) -> Result<(), QueryError> {
            Ok(())
        }
        async fn rollback(self: Box<Self>) -> Result<(), QueryError> {
            Ok(())
        }
    }
}
