use crate::value::Value;

/// The placeholder style a dialect renders parameters with.
///
/// Chosen by the caller at render time — the fragment tree itself never
/// hardcodes a style, so the same tree can in principle be rendered for more
/// than one dialect (used in tests to assert dialect-specific output from a
/// single builder call).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// PostgreSQL: `$1, $2, ...`
    Dollar,
    /// MySQL: a single unnumbered `?` per parameter.
    Question,
    /// SQLite: positional `?1, ?2, ...`
    QuestionIndexed,
}

#[derive(Debug, Clone, PartialEq)]
enum Entry {
    Raw(String),
    Param(Value),
    Nested(Fragment),
}

/// An immutable tree of literal SQL text interleaved with parameter values
/// and nested fragments.
///
/// Construction never mutates an existing fragment: every combinator
/// (`append`, `join`, the `+` operator) consumes `self` and returns a new
/// value. Rendering is the only place the tree is walked, and it is walked
/// exactly once, left to right, depth first — that walk order is what makes
/// parameter numbering deterministic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fragment {
    entries: Vec<Entry>,
}

impl Fragment {
    pub fn empty() -> Self {
        Fragment { entries: Vec::new() }
    }

    /// A verbatim string, never parameterized. Callers must only use this
    /// for SQL syntax under the adapter's control (keywords, already-quoted
    /// identifiers) — never for user-supplied data.
    pub fn raw(sql: impl Into<String>) -> Self {
        Fragment { entries: vec![Entry::Raw(sql.into())] }
    }

    /// A single value that will be bound to a placeholder at render time.
    pub fn param(value: impl Into<Value>) -> Self {
        Fragment { entries: vec![Entry::Param(value.into())] }
    }

    /// Splices another fragment's entries into this one without
    /// re-parameterizing it; placeholder numbering remains global to the
    /// final rendered statement.
    pub fn append(mut self, other: Fragment) -> Self {
        if other.entries.len() == 1 {
            if let Some(Entry::Raw(_)) | Some(Entry::Param(_)) = other.entries.first() {
                self.entries.extend(other.entries);
                return self;
            }
        }
        self.entries.push(Entry::Nested(other));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Joins fragments with a raw separator, eliding empty ones. Returns
    /// `Fragment::empty()` when there is nothing to join, so callers can
    /// test `is_empty()` to decide whether a clause should be elided
    /// entirely (e.g. an empty `WHERE`).
    pub fn join(parts: impl IntoIterator<Item = Fragment>, sep: &str) -> Fragment {
        let mut out = Fragment::empty();
        let mut first = true;
        for part in parts {
            if part.is_empty() {
                continue;
            }
            if !first {
                out = out.append(Fragment::raw(sep));
            }
            first = false;
            out = out.append(part);
        }
        out
    }

    /// Wraps the fragment in parentheses, unless it is empty.
    pub fn parenthesized(self) -> Fragment {
        if self.is_empty() {
            return self;
        }
        Fragment::raw("(").append(self).append(Fragment::raw(")"))
    }

    /// Renders the tree to `(sql_text, params)` using the given placeholder
    /// style. This is the only place the tree is traversed.
    pub fn render(&self, style: PlaceholderStyle) -> (String, Vec<Value>) {
        let mut sql = String::new();
        let mut params = Vec::new();
        let mut counter = 0usize;
        Self::render_entries(&self.entries, style, &mut sql, &mut params, &mut counter);
        (sql, params)
    }

    fn render_entries(
        entries: &[Entry],
        style: PlaceholderStyle,
        sql: &mut String,
        params: &mut Vec<Value>,
        counter: &mut usize,
    ) {
        for entry in entries {
            match entry {
                Entry::Raw(s) => sql.push_str(s),
                Entry::Param(v) => {
                    *counter += 1;
                    match style {
                        PlaceholderStyle::Dollar => sql.push_str(&format!("${}", counter)),
                        PlaceholderStyle::Question => sql.push('?'),
                        PlaceholderStyle::QuestionIndexed => sql.push_str(&format!("?{}", counter)),
                    }
                    params.push(v.clone());
                }
                Entry::Nested(f) => Self::render_entries(&f.entries, style, sql, params, counter),
            }
        }
    }
}

impl std::ops::Add for Fragment {
    type Output = Fragment;

    fn add(self, rhs: Fragment) -> Fragment {
        self.append(rhs)
    }
}

impl FromIterator<Fragment> for Fragment {
    fn from_iter<I: IntoIterator<Item = Fragment>>(iter: I) -> Self {
        Fragment::join(iter, "")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_count_matches_param_count_dollar() {
        let f = Fragment::raw("SELECT * FROM t WHERE a = ")
            .append(Fragment::param(1i32))
            .append(Fragment::raw(" AND b = "))
            .append(Fragment::param("x"));
        let (sql, params) = f.render(PlaceholderStyle::Dollar);
        assert_eq!(sql, "SELECT * FROM t WHERE a = $1 AND b = $2");
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn question_style_never_numbers() {
        let f = Fragment::param(1i32).append(Fragment::raw(",")).append(Fragment::param(2i32));
        let (sql, _) = f.render(PlaceholderStyle::Question);
        assert_eq!(sql, "?,?");
    }

    #[test]
    fn question_indexed_numbers_positionally() {
        let f = Fragment::param(1i32).append(Fragment::raw(",")).append(Fragment::param(2i32));
        let (sql, _) = f.render(PlaceholderStyle::QuestionIndexed);
        assert_eq!(sql, "?1,?2");
    }

    #[test]
    fn nesting_does_not_reparameterize() {
        let inner = Fragment::raw("(SELECT 1 WHERE x = ").append(Fragment::param("y")).append(Fragment::raw(")"));
        let outer = Fragment::raw("SELECT * WHERE a = ").append(Fragment::param("z")).append(Fragment::raw(" AND b IN ")).append(inner);
        let (sql, params) = outer.render(PlaceholderStyle::Dollar);
        assert_eq!(sql, "SELECT * WHERE a = $1 AND b IN (SELECT 1 WHERE x = $2)");
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn join_elides_empty_fragments() {
        let joined = Fragment::join([Fragment::raw("a"), Fragment::empty(), Fragment::raw("b")], " AND ");
        let (sql, _) = joined.render(PlaceholderStyle::Dollar);
        assert_eq!(sql, "a AND b");
    }

    #[test]
    fn join_of_all_empty_is_empty() {
        let joined = Fragment::join([Fragment::empty(), Fragment::empty()], " AND ");
        assert!(joined.is_empty());
    }

    #[test]
    fn parenthesized_elides_when_empty() {
        assert!(Fragment::empty().parenthesized().is_empty());
        let (sql, _) = Fragment::raw("a").parenthesized().render(PlaceholderStyle::Dollar);
        assert_eq!(sql, "(a)");
    }
}
