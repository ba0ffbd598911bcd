//! Structural diff between document snapshots.
//!
//! Array elements are paired by an identity key (`name`, then `id`, then
//! `_id`) when they carry one, and by position otherwise. Keyed elements
//! that change position are recorded as moves; unkeyed elements never move,
//! so reordering them shows up as content changes.

use std::collections::{BTreeMap, HashMap};

use crate::error::{CoreError, Result};
use crate::value::{Document, Value};

/// Fields consulted, in order, to identify array elements.
pub const ARRAY_IDENTITY_KEYS: [&str; 3] = ["name", "id", "_id"];

/// A structural change from one value to another.
#[derive(Debug, Clone, PartialEq)]
pub enum Delta {
    /// Field present only in the new snapshot.
    Added(Value),
    /// Field present only in the old snapshot.
    Removed(Value),
    Replaced { old: Value, new: Value },
    Object(BTreeMap<String, Delta>),
    Array(ArrayDelta),
}

/// Element-level changes to an array. `len` is the new length.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayDelta {
    pub len: usize,
    pub changes: Vec<ArrayChange>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArrayChange {
    /// New element at `index` in the new array.
    Inserted { index: usize, value: Value },
    /// Old element at `index` in the old array was dropped.
    Removed { index: usize, value: Value },
    /// Unchanged element moved between positions.
    Moved { from: usize, to: usize },
    /// Element paired across positions whose content changed.
    Modified { from: usize, to: usize, delta: Box<Delta> },
}

/// Diff two values. `None` when they are equal.
pub fn diff(old: &Value, new: &Value) -> Option<Delta> {
    if old == new {
        return None;
    }
    match (old, new) {
        (Value::Document(a), Value::Document(b)) => diff_documents(a, b),
        (Value::Array(a), Value::Array(b)) => diff_arrays(a, b),
        _ => Some(Delta::Replaced {
            old: old.clone(),
            new: new.clone(),
        }),
    }
}

/// Diff two documents field by field. `None` when they are equal.
pub fn diff_documents(old: &Document, new: &Document) -> Option<Delta> {
    let mut fields = BTreeMap::new();
    for (key, before) in old {
        match new.get(key) {
            None => {
                fields.insert(key.clone(), Delta::Removed(before.clone()));
            }
            Some(after) => {
                if let Some(delta) = diff(before, after) {
                    fields.insert(key.clone(), delta);
                }
            }
        }
    }
    for (key, after) in new {
        if !old.contains_key(key) {
            fields.insert(key.clone(), Delta::Added(after.clone()));
        }
    }
    if fields.is_empty() {
        None
    } else {
        Some(Delta::Object(fields))
    }
}

fn identity(value: &Value) -> Option<String> {
    let doc = value.as_document()?;
    ARRAY_IDENTITY_KEYS.iter().find_map(|key| {
        let id = doc.get(*key)?.id_string()?;
        Some(format!("{}:{}", key, id))
    })
}

fn diff_arrays(old: &[Value], new: &[Value]) -> Option<Delta> {
    let old_keys: Vec<Option<String>> = old.iter().map(identity).collect();
    let new_keys: Vec<Option<String>> = new.iter().map(identity).collect();

    let mut by_key: HashMap<&str, usize> = HashMap::new();
    for (i, key) in old_keys.iter().enumerate() {
        if let Some(key) = key {
            by_key.entry(key.as_str()).or_insert(i);
        }
    }

    let mut old_matched = vec![false; old.len()];
    let mut pairs: Vec<(usize, usize)> = Vec::new();
    let mut new_matched = vec![false; new.len()];

    for (j, key) in new_keys.iter().enumerate() {
        if let Some(key) = key {
            if let Some(&i) = by_key.get(key.as_str()) {
                if !old_matched[i] {
                    old_matched[i] = true;
                    new_matched[j] = true;
                    pairs.push((i, j));
                }
            }
        }
    }
    for j in 0..new.len() {
        if new_matched[j] || new_keys[j].is_some() {
            continue;
        }
        if j < old.len() && !old_matched[j] && old_keys[j].is_none() {
            old_matched[j] = true;
            new_matched[j] = true;
            pairs.push((j, j));
        }
    }

    let mut changes = Vec::new();
    for (i, matched) in old_matched.iter().enumerate() {
        if !matched {
            changes.push(ArrayChange::Removed {
                index: i,
                value: old[i].clone(),
            });
        }
    }
    pairs.sort_by_key(|&(_, j)| j);
    for (i, j) in pairs {
        match diff(&old[i], &new[j]) {
            Some(delta) => changes.push(ArrayChange::Modified {
                from: i,
                to: j,
                delta: Box::new(delta),
            }),
            None if i != j => changes.push(ArrayChange::Moved { from: i, to: j }),
            None => {}
        }
    }
    for (j, matched) in new_matched.iter().enumerate() {
        if !matched {
            changes.push(ArrayChange::Inserted {
                index: j,
                value: new[j].clone(),
            });
        }
    }

    if changes.is_empty() {
        None
    } else {
        Some(Delta::Array(ArrayDelta {
            len: new.len(),
            changes,
        }))
    }
}

impl Delta {
    /// Apply to the value this delta was computed from.
    pub fn apply(&self, base: &Value) -> Result<Value> {
        match self {
            Delta::Replaced { new, .. } => Ok(new.clone()),
            Delta::Object(fields) => {
                let doc = base
                    .as_document()
                    .ok_or_else(|| mismatch("object delta", base))?;
                Ok(Value::Document(apply_fields(fields, doc)?))
            }
            Delta::Array(delta) => {
                let items = base
                    .as_array()
                    .ok_or_else(|| mismatch("array delta", base))?;
                Ok(Value::Array(delta.apply(items)?))
            }
            Delta::Added(_) | Delta::Removed(_) => Err(CoreError::MalformedDelta(
                "field addition or removal outside an object".to_string(),
            )),
        }
    }

    /// Apply an object delta to a document.
    pub fn apply_to_document(&self, base: &Document) -> Result<Document> {
        match self {
            Delta::Object(fields) => apply_fields(fields, base),
            _ => Err(CoreError::MalformedDelta(
                "document deltas must be object deltas".to_string(),
            )),
        }
    }
}

fn apply_fields(fields: &BTreeMap<String, Delta>, base: &Document) -> Result<Document> {
    let mut out = base.clone();
    for (key, delta) in fields {
        match delta {
            Delta::Added(value) => {
                out.insert(key.clone(), value.clone());
            }
            Delta::Removed(_) => {
                out.remove(key);
            }
            other => {
                let current = base.get(key).ok_or_else(|| {
                    CoreError::DeltaMismatch(format!("field '{}' missing from base", key))
                })?;
                out.insert(key.clone(), other.apply(current)?);
            }
        }
    }
    Ok(out)
}

impl ArrayDelta {
    fn apply(&self, old: &[Value]) -> Result<Vec<Value>> {
        let mut slots: Vec<Option<Value>> = vec![None; self.len];
        let mut consumed = vec![false; old.len()];

        for change in &self.changes {
            match change {
                ArrayChange::Inserted { index, value } => fill(&mut slots, *index, value.clone())?,
                ArrayChange::Removed { index, .. } => {
                    element(old, *index)?;
                    consumed[*index] = true;
                }
                ArrayChange::Moved { from, to } => {
                    fill(&mut slots, *to, element(old, *from)?.clone())?;
                    consumed[*from] = true;
                }
                ArrayChange::Modified { from, to, delta } => {
                    fill(&mut slots, *to, delta.apply(element(old, *from)?)?)?;
                    consumed[*from] = true;
                }
            }
        }

        // Untouched elements kept their positions; fill the gaps in order.
        let mut untouched = old
            .iter()
            .zip(consumed.iter())
            .filter(|(_, used)| !**used)
            .map(|(value, _)| value);
        slots
            .into_iter()
            .map(|slot| match slot {
                Some(value) => Ok(value),
                None => untouched.next().cloned().ok_or_else(|| {
                    CoreError::DeltaMismatch("array delta leaves an unfilled slot".to_string())
                }),
            })
            .collect()
    }
}

fn fill(slots: &mut [Option<Value>], index: usize, value: Value) -> Result<()> {
    let target = slots
        .get_mut(index)
        .ok_or_else(|| CoreError::DeltaMismatch(format!("array slot {} out of range", index)))?;
    *target = Some(value);
    Ok(())
}

fn element(old: &[Value], index: usize) -> Result<&Value> {
    old.get(index).ok_or_else(|| {
        CoreError::DeltaMismatch(format!("array element {} missing from base", index))
    })
}

fn mismatch(what: &str, base: &Value) -> CoreError {
    CoreError::DeltaMismatch(format!("{} applied to {}", what, base.type_name()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Stored form
// ─────────────────────────────────────────────────────────────────────────────

impl Delta {
    /// Encode as a document so it can be stored in a history record.
    pub fn to_value(&self) -> Value {
        let mut doc = Document::new();
        match self {
            Delta::Added(value) => {
                doc.insert("op".into(), "add".into());
                doc.insert("value".into(), value.clone());
            }
            Delta::Removed(value) => {
                doc.insert("op".into(), "remove".into());
                doc.insert("value".into(), value.clone());
            }
            Delta::Replaced { old, new } => {
                doc.insert("op".into(), "replace".into());
                doc.insert("old".into(), old.clone());
                doc.insert("new".into(), new.clone());
            }
            Delta::Object(fields) => {
                doc.insert("op".into(), "object".into());
                let fields = fields.iter().map(|(k, d)| (k.clone(), d.to_value())).collect();
                doc.insert("fields".into(), Value::Document(fields));
            }
            Delta::Array(array) => {
                doc.insert("op".into(), "array".into());
                doc.insert("len".into(), Value::Int(array.len as i64));
                let changes = array.changes.iter().map(ArrayChange::to_value).collect();
                doc.insert("changes".into(), Value::Array(changes));
            }
        }
        Value::Document(doc)
    }

    /// Decode the form written by [`Delta::to_value`].
    pub fn from_value(value: &Value) -> Result<Self> {
        let doc = value
            .as_document()
            .ok_or_else(|| malformed("delta must be a document"))?;
        match op(doc)? {
            "add" => Ok(Delta::Added(field(doc, "value")?.clone())),
            "remove" => Ok(Delta::Removed(field(doc, "value")?.clone())),
            "replace" => Ok(Delta::Replaced {
                old: field(doc, "old")?.clone(),
                new: field(doc, "new")?.clone(),
            }),
            "object" => {
                let fields = field(doc, "fields")?
                    .as_document()
                    .ok_or_else(|| malformed("object delta fields must be a document"))?;
                let fields = fields
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), Delta::from_value(v)?)))
                    .collect::<Result<_>>()?;
                Ok(Delta::Object(fields))
            }
            "array" => {
                let len = index(doc, "len")?;
                let changes = field(doc, "changes")?
                    .as_array()
                    .ok_or_else(|| malformed("array delta changes must be an array"))?
                    .iter()
                    .map(ArrayChange::from_value)
                    .collect::<Result<_>>()?;
                Ok(Delta::Array(ArrayDelta { len, changes }))
            }
            other => Err(malformed(&format!("unknown delta op '{}'", other))),
        }
    }
}

impl ArrayChange {
    fn to_value(&self) -> Value {
        let mut doc = Document::new();
        match self {
            ArrayChange::Inserted { index, value } => {
                doc.insert("op".into(), "insert".into());
                doc.insert("index".into(), Value::Int(*index as i64));
                doc.insert("value".into(), value.clone());
            }
            ArrayChange::Removed { index, value } => {
                doc.insert("op".into(), "remove".into());
                doc.insert("index".into(), Value::Int(*index as i64));
                doc.insert("value".into(), value.clone());
            }
            ArrayChange::Moved { from, to } => {
                doc.insert("op".into(), "move".into());
                doc.insert("from".into(), Value::Int(*from as i64));
                doc.insert("to".into(), Value::Int(*to as i64));
            }
            ArrayChange::Modified { from, to, delta } => {
                doc.insert("op".into(), "modify".into());
                doc.insert("from".into(), Value::Int(*from as i64));
                doc.insert("to".into(), Value::Int(*to as i64));
                doc.insert("delta".into(), delta.to_value());
            }
        }
        Value::Document(doc)
    }

    fn from_value(value: &Value) -> Result<Self> {
        let doc = value
            .as_document()
            .ok_or_else(|| malformed("array change must be a document"))?;
        match op(doc)? {
            "insert" => Ok(ArrayChange::Inserted {
                index: index(doc, "index")?,
                value: field(doc, "value")?.clone(),
            }),
            "remove" => Ok(ArrayChange::Removed {
                index: index(doc, "index")?,
                value: field(doc, "value")?.clone(),
            }),
            "move" => Ok(ArrayChange::Moved {
                from: index(doc, "from")?,
                to: index(doc, "to")?,
            }),
            "modify" => Ok(ArrayChange::Modified {
                from: index(doc, "from")?,
                to: index(doc, "to")?,
                delta: Box::new(Delta::from_value(field(doc, "delta")?)?),
            }),
            other => Err(malformed(&format!("unknown array change op '{}'", other))),
        }
    }
}

fn op(doc: &Document) -> Result<&str> {
    field(doc, "op")?
        .as_str()
        .ok_or_else(|| malformed("op must be a string"))
}

fn field<'a>(doc: &'a Document, name: &str) -> Result<&'a Value> {
    doc.get(name)
        .ok_or_else(|| malformed(&format!("missing '{}'", name)))
}

fn index(doc: &Document, name: &str) -> Result<usize> {
    field(doc, name)?
        .as_i64()
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| malformed(&format!("'{}' must be a non-negative integer", name)))
}

fn malformed(reason: &str) -> CoreError {
    CoreError::MalformedDelta(reason.to_string())
}
