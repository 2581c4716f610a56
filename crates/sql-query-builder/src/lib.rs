//! Compiles normalized query args into SQL [`Fragment`](sql_fragment::Fragment)
//! trees, dialect-agnostic until the final [`render`](sql_fragment::Fragment::render)
//! call.
//!
//! [`args`] is the normalized vocabulary every builder here consumes — the
//! input validator upstream is responsible for producing it from raw user
//! input. Everything else in this crate is a pure function from that
//! vocabulary plus a [`QueryContext`] to a `Fragment`.

pub mod args;
mod context;
mod error;
mod many_to_many;
mod operations;
mod order_by;
mod relation_filter;
mod select_include;
mod set;
#[cfg(test)]
mod test_support;
mod values;
mod where_builder;

pub use context::{AliasGenerator, QueryContext};
pub use error::{BuildError, BuildResult};
pub use many_to_many::{build as build_many_to_many_join_parts, ManyToManyJoinParts};
pub use operations::{
    build_aggregate, build_count, build_create, build_delete, build_exist, build_find, build_group_by, build_update, build_upsert,
    AggregateKind, FindArgs, GroupByArgs, HavingTerm,
};
pub use order_by::build_order_by;
pub use relation_filter::build_relation_filter;
pub use select_include::{build_projection_as_json, build_select_plan, SelectPlan};
pub use set::build_set_assignments;
pub use values::{build_insert, build_insert_rows, InsertRows};
pub use where_builder::{build_where, build_where_unique, column};
