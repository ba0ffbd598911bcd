//! Store-native filters, patches, sorts and projections.
//!
//! These are the structures the translator produces and the document stores
//! consume. Stores without a query engine of their own evaluate them in
//! process through [`Filter::matches`] and [`Update::apply`].

use std::cmp::Ordering;
use std::fmt;

use regex::{Regex, RegexBuilder};

use crate::error::QueryError;
use crate::value::{get_path, lookup, remove_path, set_path, Document, Value};

/// A compiled regular expression that remembers its source text and flags.
#[derive(Clone)]
pub struct Pattern {
    source: String,
    flags: String,
    regex: Regex,
}

impl Pattern {
    /// Compile `source` with flags drawn from `i`, `m`, `s`, `x`.
    pub fn new(source: &str, flags: &str) -> Result<Self, QueryError> {
        let mut builder = RegexBuilder::new(source);
        for flag in flags.chars() {
            match flag {
                'i' => builder.case_insensitive(true),
                'm' => builder.multi_line(true),
                's' => builder.dot_matches_new_line(true),
                'x' => builder.ignore_whitespace(true),
                other => {
                    return Err(QueryError::InvalidRegex {
                        pattern: source.to_string(),
                        reason: format!("unsupported flag '{}'", other),
                    })
                }
            };
        }
        let regex = builder.build().map_err(|e| QueryError::InvalidRegex {
            pattern: source.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            source: source.to_string(),
            flags: flags.to_string(),
            regex,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn flags(&self) -> &str {
        &self.flags
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source && self.flags == other.flags
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}", self.source, self.flags)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}", self.source, self.flags)
    }
}

/// A condition on the values found at one field path.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    Exists(bool),
    Regex(Pattern),
    /// Some element of an array field matches the nested filter.
    ElemMatch(Box<Filter>),
    /// Every listed zero-based bit is set in an integer or binary field.
    BitsAllSet(Vec<u32>),
}

/// A store-native filter.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Matches every document.
    All,
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Nor(Vec<Filter>),
    Field { path: String, predicate: Predicate },
}

impl Filter {
    pub fn field(path: impl Into<String>, predicate: Predicate) -> Self {
        Filter::Field {
            path: path.into(),
            predicate,
        }
    }

    pub fn eq(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::field(path, Predicate::Eq(value.into()))
    }

    /// Conjunction that drops `All` terms and unwraps a single survivor.
    pub fn and(filters: Vec<Filter>) -> Self {
        let mut terms: Vec<Filter> = filters
            .into_iter()
            .filter(|f| !matches!(f, Filter::All))
            .collect();
        match terms.len() {
            0 => Filter::All,
            1 => terms.remove(0),
            _ => Filter::And(terms),
        }
    }

    /// Disjunction that unwraps a single term.
    pub fn or(mut filters: Vec<Filter>) -> Self {
        if filters.len() == 1 {
            return filters.remove(0);
        }
        if filters.iter().any(|f| matches!(f, Filter::All)) {
            return Filter::All;
        }
        Filter::Or(filters)
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Filter::All)
    }

    /// Evaluate against a document.
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Filter::All => true,
            Filter::And(terms) => terms.iter().all(|f| f.matches(doc)),
            Filter::Or(terms) => terms.iter().any(|f| f.matches(doc)),
            Filter::Nor(terms) => !terms.iter().any(|f| f.matches(doc)),
            Filter::Field { path, predicate } => predicate.matches(&lookup(doc, path)),
        }
    }
}

impl Predicate {
    /// Evaluate against the values a path resolved to.
    pub fn matches(&self, values: &[&Value]) -> bool {
        match self {
            Predicate::Eq(target) => equals_any(values, target),
            Predicate::Ne(target) => !equals_any(values, target),
            Predicate::Gt(target) => compares(values, target, |o| o == Ordering::Greater),
            Predicate::Gte(target) => compares(values, target, |o| o != Ordering::Less),
            Predicate::Lt(target) => compares(values, target, |o| o == Ordering::Less),
            Predicate::Lte(target) => compares(values, target, |o| o != Ordering::Greater),
            Predicate::In(targets) => targets.iter().any(|t| equals_any(values, t)),
            Predicate::Nin(targets) => !targets.iter().any(|t| equals_any(values, t)),
            Predicate::Exists(expected) => !values.is_empty() == *expected,
            Predicate::Regex(pattern) => flatten(values)
                .iter()
                .filter_map(|v| v.as_str())
                .any(|s| pattern.is_match(s)),
            Predicate::ElemMatch(filter) => values.iter().any(|v| match v {
                Value::Array(items) => items
                    .iter()
                    .filter_map(Value::as_document)
                    .any(|doc| filter.matches(doc)),
                _ => false,
            }),
            Predicate::BitsAllSet(bits) => values.iter().any(|v| has_bits(v, bits)),
        }
    }
}

/// Values plus the elements of any array among them.
fn flatten<'a>(values: &[&'a Value]) -> Vec<&'a Value> {
    let mut out = Vec::with_capacity(values.len());
    for value in values {
        out.push(*value);
        if let Value::Array(items) = value {
            out.extend(items.iter());
        }
    }
    out
}

fn equals_any(values: &[&Value], target: &Value) -> bool {
    if target.is_null() && values.is_empty() {
        return true;
    }
    flatten(values).iter().any(|v| v.loose_eq(target))
}

fn compares(values: &[&Value], target: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    flatten(values)
        .iter()
        .filter_map(|v| v.compare(target))
        .any(accept)
}

fn has_bits(value: &Value, bits: &[u32]) -> bool {
    match value {
        Value::Int(_) | Value::Double(_) => match value.as_i64() {
            // Integers are sign-extended: bits past 63 follow the sign.
            Some(n) => bits.iter().all(|&b| {
                if b < 64 {
                    (n as u64) & (1u64 << b) != 0
                } else {
                    n < 0
                }
            }),
            None => false,
        },
        Value::Binary(bytes) => bits.iter().all(|&b| {
            bytes
                .get((b / 8) as usize)
                .map_or(false, |byte| byte & (1u8 << (b % 8)) != 0)
        }),
        _ => false,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Patches
// ─────────────────────────────────────────────────────────────────────────────

/// A patch expression. Keys are dotted paths.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    pub set: Document,
    pub unset: Vec<String>,
    pub inc: Document,
    pub push: Document,
}

impl Update {
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.unset.is_empty() && self.inc.is_empty() && self.push.is_empty()
    }

    /// Apply to a document. Returns whether anything changed.
    ///
    /// The document is left untouched when any component fails.
    pub fn apply(&self, doc: &mut Document) -> Result<bool, QueryError> {
        let mut next = doc.clone();

        for (path, value) in &self.set {
            set_path(&mut next, path, value.clone())?;
        }
        for path in &self.unset {
            remove_path(&mut next, path);
        }
        for (path, delta) in &self.inc {
            let current = get_path(&next, path).cloned().unwrap_or(Value::Int(0));
            let sum = add_numbers(&current, delta).ok_or_else(|| {
                QueryError::InvalidUpdate(format!(
                    "cannot $inc {} field '{}' by {}",
                    current.type_name(),
                    path,
                    delta.type_name()
                ))
            })?;
            set_path(&mut next, path, sum)?;
        }
        for (path, value) in &self.push {
            match get_path(&next, path).cloned() {
                None | Some(Value::Null) => {
                    set_path(&mut next, path, Value::Array(vec![value.clone()]))?
                }
                Some(Value::Array(mut items)) => {
                    items.push(value.clone());
                    set_path(&mut next, path, Value::Array(items))?;
                }
                Some(other) => {
                    return Err(QueryError::InvalidUpdate(format!(
                        "cannot $push onto {} field '{}'",
                        other.type_name(),
                        path
                    )))
                }
            }
        }

        let changed = next != *doc;
        *doc = next;
        Ok(changed)
    }

    /// Render back into operator form, omitting empty components.
    pub fn to_document(&self) -> Document {
        let mut out = Document::new();
        if !self.set.is_empty() {
            out.insert("$set".into(), Value::Document(self.set.clone()));
        }
        if !self.unset.is_empty() {
            let fields = self
                .unset
                .iter()
                .map(|path| (path.clone(), Value::String(String::new())))
                .collect();
            out.insert("$unset".into(), Value::Document(fields));
        }
        if !self.inc.is_empty() {
            out.insert("$inc".into(), Value::Document(self.inc.clone()));
        }
        if !self.push.is_empty() {
            out.insert("$push".into(), Value::Document(self.push.clone()));
        }
        out
    }
}

fn add_numbers(a: &Value, b: &Value) -> Option<Value> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Some(
            x.checked_add(*y)
                .map(Value::Int)
                .unwrap_or(Value::Double(*x as f64 + *y as f64)),
        ),
        _ => Some(Value::Double(a.as_f64()? + b.as_f64()?)),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sort and projection
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub path: String,
    pub descending: bool,
}

impl SortKey {
    pub fn ascending(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            descending: false,
        }
    }

    pub fn descending(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            descending: true,
        }
    }
}

/// Stable sort by the given keys. Missing fields sort first.
pub fn sort_documents(docs: &mut [Document], keys: &[SortKey]) {
    if keys.is_empty() {
        return;
    }
    docs.sort_by(|a, b| {
        for key in keys {
            let left = lookup(a, &key.path).into_iter().next();
            let right = lookup(b, &key.path).into_iter().next();
            let ord = match (left, right) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (Some(l), Some(r)) => l.compare(r).unwrap_or(Ordering::Equal),
            };
            let ord = if key.descending { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

/// Which fields a read returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    /// Only the listed paths, plus `_id` when `id` is set.
    Include { fields: Vec<String>, id: bool },
    /// Everything except the listed paths.
    Exclude(Vec<String>),
}

impl Projection {
    pub fn apply(&self, doc: &Document) -> Document {
        match self {
            Projection::Include { fields, id } => {
                let mut out = Document::new();
                if *id {
                    if let Some(value) = doc.get("_id") {
                        out.insert("_id".into(), value.clone());
                    }
                }
                for path in fields {
                    if let Some(value) = get_path(doc, path) {
                        // Paths that already resolved through a document cannot collide.
                        let _ = set_path(&mut out, path, value.clone());
                    }
                }
                out
            }
            Projection::Exclude(fields) => {
                let mut out = doc.clone();
                for path in fields {
                    remove_path(&mut out, path);
                }
                out
            }
        }
    }
}
