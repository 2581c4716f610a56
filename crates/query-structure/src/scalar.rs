/// A scalar field's logical type. Drives both SQL literal encoding
/// (`sql-query-builder`) and result-row type restoration (`query-core`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    String,
    Int,
    Float,
    Decimal,
    Boolean,
    BigInt,
    DateTime,
    Date,
    Time,
    Json,
    Blob,
    Enum,
    Vector,
}

/// How an id/default value is produced when the caller omits it.
#[derive(Debug, Clone, PartialEq)]
pub enum AutoGenerate {
    /// The database assigns it (`SERIAL`/`AUTO_INCREMENT`/`ROWID`); the
    /// compiler never supplies a value and the planner recovers it via
    /// `RETURNING` or a last-insert-id lookup.
    DbAutoIncrement,
    Uuid,
    Cuid,
    Ulid,
    Now,
}

/// A static default, used when the caller omits the field entirely (as
/// opposed to `AutoGenerate`, which also covers db-side generation).
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    Literal(sql_fragment::Value),
    Generated(AutoGenerate),
}
