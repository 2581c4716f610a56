//! Per-dialect SQL fragment construction.
//!
//! [`Dialect`] is the single trait every fragment builder composes through;
//! [`PostgresDialect`], [`MysqlDialect`] and [`SqliteDialect`] are its three
//! implementations. Capability flags ([`Capability`]) gate optional
//! behaviour (`RETURNING`, lateral joins, full outer joins, ...) — this is
//! the only place dialect-specific behaviour is switched on.

mod capability;
mod dialect;
mod error;
mod mysql;
mod postgres;
mod sqlite;

pub use capability::{Capabilities, Capability};
pub use dialect::{Dialect, NullsOrder, SortDirection};
pub use error::DialectError;
pub use mysql::MysqlDialect;
pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;
