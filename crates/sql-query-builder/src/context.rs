use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;

use query_structure::{Model, ModelRegistry};
use sql_dialect::Dialect;

/// Monotonic source of `t0, t1, ...` table aliases, unique across the
/// compilation of one operation. Shared by reference (not cloned) between
/// a [`QueryContext`] and every child scope it produces, so aliases never
/// collide no matter how deep the builder recurses.
#[derive(Debug, Default)]
pub struct AliasGenerator {
    next: Cell<u32>,
}

impl AliasGenerator {
    pub fn new() -> Rc<Self> {
        Rc::new(AliasGenerator { next: Cell::new(0) })
    }

    pub fn next(&self) -> String {
        let n = self.next.get();
        self.next.set(n + 1);
        format!("t{n}")
    }
}

/// The immutable bundle threaded through every fragment builder: the
/// dialect, the current model, the registry to resolve relations against,
/// the shared alias generator, and this scope's root alias.
///
/// Builders never hold any other mutable state — the alias generator is
/// the *only* mutating collaborator (§5), and it's shared through `Rc`
/// rather than passed by value so a child context's `next()` call is
/// visible to every sibling and ancestor scope in the same operation.
#[derive(Clone)]
pub struct QueryContext {
    pub dialect: Arc<dyn Dialect>,
    pub model: Arc<Model>,
    pub registry: Arc<ModelRegistry>,
    pub aliases: Rc<AliasGenerator>,
    pub root_alias: String,
}

impl QueryContext {
    pub fn new_root(dialect: Arc<dyn Dialect>, registry: Arc<ModelRegistry>, model: Arc<Model>) -> Self {
        let aliases = AliasGenerator::new();
        let root_alias = aliases.next();
        QueryContext { dialect, model, registry, aliases, root_alias }
    }

    /// A child scope for a related model: same adapter, same registry,
    /// same alias generator, a fresh alias, and the target as the new
    /// "current" model.
    pub fn descend(&self, model: Arc<Model>) -> Self {
        let alias = self.aliases.next();
        QueryContext { dialect: self.dialect.clone(), model, registry: self.registry.clone(), aliases: self.aliases.clone(), root_alias: alias }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use query_structure::{Field, ScalarType};
    use sql_dialect::PostgresDialect;

    #[test]
    fn aliases_are_monotonic_and_shared_with_children() {
        let model = Model::new("Post").field(Field::new("id", ScalarType::String).id());
        let registry = Arc::new(ModelRegistry::new([model.clone()]).unwrap());
        let ctx = QueryContext::new_root(Arc::new(PostgresDialect), registry.clone(), Arc::new(model.clone()));
        assert_eq!(ctx.root_alias, "t0");
        let child = ctx.descend(Arc::new(model.clone()));
        assert_eq!(child.root_alias, "t1");
        let grandchild = child.descend(Arc::new(model));
        assert_eq!(grandchild.root_alias, "t2");
    }
}
