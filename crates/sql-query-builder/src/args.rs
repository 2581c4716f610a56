use indexmap::IndexMap;
use sql_dialect::{NullsOrder, SortDirection};
use sql_fragment::Value;

/// The shapes a scalar `where` filter normalizes to (§4.2, §4.3). Every
/// bare value the validator sees becomes `Equals`; every `null` becomes
/// `Equals(Value::Null)`.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarFilter {
    Equals(Value),
    Not(Box<ScalarFilter>),
    Lt(Value),
    Lte(Value),
    Gt(Value),
    Gte(Value),
    In(Vec<Value>),
    NotIn(Vec<Value>),
    Contains { value: String, insensitive: bool },
    StartsWith { value: String, insensitive: bool },
    EndsWith { value: String, insensitive: bool },
    Has(Value),
    HasEvery(Vec<Value>),
    HasSome(Vec<Value>),
    IsEmpty(bool),
}

/// A normalized `where` tree: logical combinators, scalar field filters,
/// and relation filters, all flattened into one recursive shape so the
/// where-builder (§4.3) can walk it uniformly.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WhereNode {
    pub and: Vec<WhereNode>,
    pub or: Vec<WhereNode>,
    pub not: Vec<WhereNode>,
    pub scalars: Vec<(String, ScalarFilter)>,
    pub relations: Vec<(String, RelationFilter)>,
}

impl WhereNode {
    pub fn empty() -> Self {
        WhereNode::default()
    }

    pub fn is_empty(&self) -> bool {
        self.and.is_empty() && self.or.is_empty() && self.not.is_empty() && self.scalars.is_empty() && self.relations.is_empty()
    }

    pub fn scalar(field: impl Into<String>, filter: ScalarFilter) -> Self {
        WhereNode { scalars: vec![(field.into(), filter)], ..Default::default() }
    }

    pub fn relation(name: impl Into<String>, filter: RelationFilter) -> Self {
        WhereNode { relations: vec![(name.into(), filter)], ..Default::default() }
    }

    pub fn all(nodes: Vec<WhereNode>) -> Self {
        WhereNode { and: nodes, ..Default::default() }
    }
}

/// `some|every|none` for to-many relations, `is|isNot` for to-one (§4.4).
/// `Is(None)`/`IsNot(None)` are the `null`-on-optional-to-one shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum RelationFilter {
    Some(Box<WhereNode>),
    Every(Box<WhereNode>),
    None(Box<WhereNode>),
    Is(Option<Box<WhereNode>>),
    IsNot(Option<Box<WhereNode>>),
}

/// A `where`-unique shape: either one scalar field or a named compound key
/// with every component present (§4.3 "Where-unique").
#[derive(Debug, Clone, PartialEq)]
pub enum WhereUnique {
    Single { field: String, value: Value },
    Compound { fields: Vec<(String, Value)> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Take {
    First(i64),
    Last(i64),
}

/// One `orderBy` entry (§4.6). Relation-path ordering is out of scope.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderByEntry {
    pub field: String,
    pub direction: SortDirection,
    pub nulls: Option<NullsOrder>,
}

/// A cursor condition: ascending cursors are `>=`, descending are `<=`,
/// and the cursor row itself is included (§4.10).
#[derive(Debug, Clone, PartialEq)]
pub struct Cursor {
    pub fields: Vec<(String, Value)>,
    pub direction: SortDirection,
}

/// One projected output column: a bare scalar, a nested relation (with its
/// own recursive query args), or a `_count` aggregate over relations
/// (§4.5).
#[derive(Debug, Clone, PartialEq)]
pub enum Projected {
    Scalar(String),
    Relation { name: String, args: Box<RelationQueryArgs> },
    Count { entries: Vec<(String, Option<WhereNode>)> },
}

/// `select`/`include` normalized into one ordered list plus the
/// select-vs-include mode (§4.5): `Select` emits only the listed columns;
/// `Include` emits every scalar plus the listed relations.
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    Select(Vec<Projected>),
    Include(Vec<Projected>),
}

impl Projection {
    pub fn entries(&self) -> &[Projected] {
        match self {
            Projection::Select(v) => v,
            Projection::Include(v) => v,
        }
    }
}

/// The query shape applied to a relation fetched alongside its parent:
/// `where`, `orderBy`, `take`/`skip`, and the nested projection.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationQueryArgs {
    pub where_: WhereNode,
    pub order_by: Vec<OrderByEntry>,
    pub take: Option<i64>,
    pub skip: Option<i64>,
    pub projection: Projection,
}

impl Default for RelationQueryArgs {
    fn default() -> Self {
        RelationQueryArgs { where_: WhereNode::empty(), order_by: Vec::new(), take: None, skip: None, projection: Projection::Include(Vec::new()) }
    }
}

/// A scalar write in `data` (§4.9): `set` for a direct assignment, the
/// arithmetic variants for `increment`/`decrement`/`multiply`/`divide`,
/// and `push`/`unshift` for list append.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarWrite {
    Set(Value),
    Increment(Value),
    Decrement(Value),
    Multiply(Value),
    Divide(Value),
    Push(Value),
    Unshift(Value),
}

/// `disconnect: true` / `delete: true` act on every matching child;
/// `Where(_)` bounds the mutation to specific children (§3.6).
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ManyTarget {
    #[default]
    None,
    All,
    Where(Vec<WhereUnique>),
}

/// One relation's mutation payload inside `data` (§3.6, §4.11). Each field
/// is independently populated because a caller may combine, e.g.,
/// `connect` and `create` across different array entries of the same kind.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RelationMutation {
    pub relation: String,
    pub connect: Vec<WhereUnique>,
    pub disconnect: ManyTarget,
    pub create: Vec<DataRecord>,
    pub connect_or_create: Vec<(WhereUnique, DataRecord)>,
    pub delete: ManyTarget,
    pub set: Option<Vec<WhereUnique>>,
}

impl RelationMutation {
    pub fn new(relation: impl Into<String>) -> Self {
        RelationMutation { relation: relation.into(), ..Default::default() }
    }

    pub fn is_empty(&self) -> bool {
        self.connect.is_empty()
            && matches!(self.disconnect, ManyTarget::None)
            && self.create.is_empty()
            && self.connect_or_create.is_empty()
            && matches!(self.delete, ManyTarget::None)
            && self.set.is_none()
    }
}

/// One record's worth of `data`: scalar assignments plus relation
/// mutations, the split the nested-write planner (§4.11) consumes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataRecord {
    pub scalars: IndexMap<String, ScalarWrite>,
    pub relations: Vec<RelationMutation>,
}
