//! An immutable tree of literal SQL text interleaved with parameter values,
//! rendered to `(sql_text, params)` in a dialect's placeholder style.
//!
//! This crate has no notion of dialects, models, or operations — it is the
//! single leaf every higher layer composes through, kept deliberately thin
//! so that parameterization is enforced in one place.

mod fragment;
mod value;

pub use fragment::{Fragment, PlaceholderStyle};
pub use value::Value;
