use enumflags2::{bitflags, BitFlags};

/// Optional behaviour a dialect may or may not support.
///
/// Consulted by higher layers (the builders and operation assemblers) to
/// pick an alternate plan — this is the *sole* place dialect-specific
/// behaviour is switched on outside of the adapter itself. Nothing above
/// `sql-dialect` should match on a dialect name/enum directly.
#[bitflags]
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Returning,
    CteWithMutations,
    FullOuterJoin,
    LateralJoins,
    Transactions,
    InsensitiveLike,
    NullsOrdering,
    ArrayType,
}

pub type Capabilities = BitFlags<Capability>;
