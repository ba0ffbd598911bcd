//! Query translation between caller JSON and store-native structures.
//!
//! Filters arrive either as parsed JSON or as a serialized string; both go
//! through the same path. Within filters, ISO-8601 strings become native
//! dates and regex sentinels (`__REGEXP /pattern/flags`) become compiled
//! patterns. The identifier field expands to match both its string form and
//! its native [`ObjectId`] form.
//!
//! Documents written to the store have `.` in keys replaced by
//! [`KEY_SUBSTITUTE`]; reading undoes it. A key that already contains the
//! substitute will not round-trip.

use std::borrow::Cow;

use serde_json::{Map, Value as Json};

use crate::error::QueryError;
use crate::query::{Filter, Pattern, Predicate, Projection, SortKey, Update};
use crate::value::{
    document_from_json, is_canonical_date, parse_iso_date, Document, ObjectId, Value,
};

/// Prefix marking a string as a serialized regular expression.
pub const REGEX_MARKER: &str = "__REGEXP ";

/// Stand-in for `.` in stored keys.
pub const KEY_SUBSTITUTE: &str = "____";

/// The identifier field.
pub const ID_FIELD: &str = "_id";

type Result<T> = std::result::Result<T, QueryError>;

/// Caller-supplied JSON, parsed or not.
#[derive(Debug, Clone, Copy)]
pub enum JsonInput<'a> {
    Structured(&'a Json),
    Serialized(&'a str),
}

impl<'a> JsonInput<'a> {
    fn parse(self) -> Result<Cow<'a, Json>> {
        match self {
            JsonInput::Structured(json) => Ok(Cow::Borrowed(json)),
            JsonInput::Serialized(text) if text.trim().is_empty() => Ok(Cow::Owned(Json::Null)),
            JsonInput::Serialized(text) => Ok(Cow::Owned(serde_json::from_str(text)?)),
        }
    }
}

impl<'a> From<&'a Json> for JsonInput<'a> {
    fn from(json: &'a Json) -> Self {
        JsonInput::Structured(json)
    }
}

impl<'a> From<&'a str> for JsonInput<'a> {
    fn from(text: &'a str) -> Self {
        JsonInput::Serialized(text)
    }
}

impl<'a> From<&'a String> for JsonInput<'a> {
    fn from(text: &'a String) -> Self {
        JsonInput::Serialized(text)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Filters
// ─────────────────────────────────────────────────────────────────────────────

/// Translate a caller filter. `null` and `{}` match everything.
pub fn translate_filter<'a>(input: impl Into<JsonInput<'a>>) -> Result<Filter> {
    let json = input.into().parse()?;
    match json.as_ref() {
        Json::Null => Ok(Filter::All),
        Json::Object(map) => filter_object(map, true),
        other => Err(QueryError::NotADocument(json_type(other).to_string())),
    }
}

/// Match an identifier in either of its stored representations.
pub fn id_filter(id: &str) -> Filter {
    id_filter_on(ID_FIELD, id)
}

/// Like [`id_filter`], for an identifier held in another field.
pub fn id_filter_on(path: &str, id: &str) -> Filter {
    Filter::field(path, id_predicate(id))
}

/// Parse a caller document. `null` (or blank text) yields `None`.
///
/// Values are taken as given; see [`encode_document`] for storage encoding.
pub fn translate_document<'a>(input: impl Into<JsonInput<'a>>) -> Result<Option<Document>> {
    let json = input.into().parse()?;
    match json.as_ref() {
        Json::Null => Ok(None),
        Json::Object(_) => document_from_json(json.as_ref()).map(Some),
        other => Err(QueryError::NotADocument(json_type(other).to_string())),
    }
}

fn id_predicate(id: &str) -> Predicate {
    match ObjectId::parse_str(id) {
        Some(oid) => Predicate::In(vec![Value::String(id.to_string()), Value::ObjectId(oid)]),
        None => Predicate::Eq(Value::String(id.to_string())),
    }
}

/// Both representations of every string id in `values`.
fn expand_ids(values: Vec<Value>) -> Vec<Value> {
    let mut out = Vec::with_capacity(values.len() * 2);
    for value in values {
        if let Value::String(s) = &value {
            if let Some(oid) = ObjectId::parse_str(s) {
                out.push(value.clone());
                out.push(Value::ObjectId(oid));
                continue;
            }
        }
        out.push(value);
    }
    out
}

fn filter_object(map: &Map<String, Json>, expand: bool) -> Result<Filter> {
    let mut terms = Vec::with_capacity(map.len());
    for (key, value) in map {
        let term = match key.as_str() {
            "$and" => Filter::And(subfilters("$and", value, expand)?),
            "$or" => Filter::Or(subfilters("$or", value, expand)?),
            "$nor" => Filter::Nor(subfilters("$nor", value, expand)?),
            op if op.starts_with('$') => return Err(QueryError::UnknownOperator(op.to_string())),
            path => field_filter(path, value, expand && path == ID_FIELD)?,
        };
        terms.push(term);
    }
    Ok(Filter::and(terms))
}

fn subfilters(op: &str, value: &Json, expand: bool) -> Result<Vec<Filter>> {
    let items = match value {
        Json::Array(items) if !items.is_empty() => items,
        _ => return Err(invalid(op, "expected a non-empty array")),
    };
    items
        .iter()
        .map(|item| match item {
            Json::Object(map) => filter_object(map, expand),
            _ => Err(invalid(op, "expected an array of documents")),
        })
        .collect()
}

fn field_filter(path: &str, value: &Json, is_id: bool) -> Result<Filter> {
    if let Json::Object(map) = value {
        let operators = map.keys().filter(|k| k.starts_with('$')).count();
        if operators == map.len() && operators > 0 {
            return operator_filter(path, map, is_id);
        }
        if operators > 0 {
            return Err(invalid(path, "cannot mix operators and fields"));
        }
    }

    if let Json::String(s) = value {
        if let Some(pattern) = parse_regex_sentinel(s) {
            return Ok(Filter::field(path, Predicate::Regex(pattern?)));
        }
        if is_id {
            return Ok(Filter::field(path, id_predicate(s)));
        }
    }
    Ok(Filter::field(path, Predicate::Eq(revive(value))))
}

fn operator_filter(path: &str, ops: &Map<String, Json>, is_id: bool) -> Result<Filter> {
    let mut terms = Vec::with_capacity(ops.len());

    if ops.contains_key("$options") && !ops.contains_key("$regex") {
        return Err(invalid("$options", "requires $regex"));
    }

    for (op, operand) in ops {
        let predicate = match op.as_str() {
            "$eq" => match operand {
                Json::String(s) if is_id => id_predicate(s),
                _ => Predicate::Eq(revive(operand)),
            },
            "$ne" => match operand {
                Json::String(s) if is_id => Predicate::Nin(expand_ids(vec![Value::from(s.as_str())])),
                _ => Predicate::Ne(revive(operand)),
            },
            "$gt" => Predicate::Gt(revive(operand)),
            "$gte" => Predicate::Gte(revive(operand)),
            "$lt" => Predicate::Lt(revive(operand)),
            "$lte" => Predicate::Lte(revive(operand)),
            "$in" | "$nin" => {
                terms.push(membership(path, op, operand, is_id)?);
                continue;
            }
            "$exists" => Predicate::Exists(truthy(operand)),
            "$regex" => {
                let flags = match ops.get("$options") {
                    None => "",
                    Some(Json::String(flags)) => flags.as_str(),
                    Some(_) => return Err(invalid("$options", "expected a string")),
                };
                Predicate::Regex(regex_operand(operand, flags)?)
            }
            "$options" => continue,
            "$elemMatch" => match operand {
                Json::Object(map) => Predicate::ElemMatch(Box::new(filter_object(map, false)?)),
                _ => return Err(invalid(op, "expected a document")),
            },
            "$bitsAllSet" => Predicate::BitsAllSet(bit_positions(operand)?),
            other => return Err(QueryError::UnknownOperator(other.to_string())),
        };
        terms.push(Filter::field(path, predicate));
    }
    Ok(Filter::and(terms))
}

fn membership(path: &str, op: &str, operand: &Json, is_id: bool) -> Result<Filter> {
    let items = operand
        .as_array()
        .ok_or_else(|| invalid(op, "expected an array"))?;

    let mut values = Vec::with_capacity(items.len());
    let mut patterns = Vec::new();
    for item in items {
        match item {
            Json::String(s) => match parse_regex_sentinel(s) {
                Some(pattern) => patterns.push(pattern?),
                None => values.push(revive(item)),
            },
            _ => values.push(revive(item)),
        }
    }
    if is_id {
        values = expand_ids(values);
    }

    let include = op == "$in";
    if patterns.is_empty() {
        let predicate = if include {
            Predicate::In(values)
        } else {
            Predicate::Nin(values)
        };
        return Ok(Filter::field(path, predicate));
    }

    let mut alternatives = Vec::with_capacity(patterns.len() + 1);
    if !values.is_empty() {
        alternatives.push(Filter::field(path, Predicate::In(values)));
    }
    alternatives.extend(
        patterns
            .into_iter()
            .map(|p| Filter::field(path, Predicate::Regex(p))),
    );
    Ok(if include {
        Filter::Or(alternatives)
    } else {
        Filter::Nor(alternatives)
    })
}

fn regex_operand(operand: &Json, flags: &str) -> Result<Pattern> {
    let text = operand
        .as_str()
        .ok_or_else(|| invalid("$regex", "expected a string"))?;
    match parse_regex_sentinel(text) {
        Some(pattern) if flags.is_empty() => pattern,
        Some(pattern) => {
            let pattern = pattern?;
            Pattern::new(pattern.source(), &format!("{}{}", pattern.flags(), flags))
        }
        None => Pattern::new(text, flags),
    }
}

fn bit_positions(operand: &Json) -> Result<Vec<u32>> {
    match operand {
        Json::Array(items) => items
            .iter()
            .map(|item| {
                item.as_u64()
                    .and_then(|b| u32::try_from(b).ok())
                    .ok_or_else(|| invalid("$bitsAllSet", "bit positions must be non-negative integers"))
            })
            .collect(),
        Json::Number(n) => {
            let mask = n
                .as_i64()
                .ok_or_else(|| invalid("$bitsAllSet", "mask must be an integer"))?;
            Ok((0..64).filter(|b| (mask as u64) & (1u64 << b) != 0).collect())
        }
        _ => Err(invalid("$bitsAllSet", "expected an array or an integer mask")),
    }
}

/// Parse `__REGEXP /pattern/flags`. `None` when the marker is absent.
pub fn parse_regex_sentinel(text: &str) -> Option<Result<Pattern>> {
    let body = text.strip_prefix(REGEX_MARKER)?;
    Some(parse_slashed(body))
}

fn parse_slashed(body: &str) -> Result<Pattern> {
    let malformed = || QueryError::InvalidRegex {
        pattern: body.to_string(),
        reason: "expected /pattern/flags".to_string(),
    };
    let inner = body.strip_prefix('/').ok_or_else(malformed)?;
    let end = inner.rfind('/').ok_or_else(malformed)?;
    Pattern::new(&inner[..end], &inner[end + 1..])
}

/// Serialize a pattern into its sentinel string form.
pub fn regex_sentinel(pattern: &Pattern) -> String {
    format!("{}{}", REGEX_MARKER, pattern)
}

/// JSON to value with ISO-8601 strings revived as dates, at any depth.
fn revive(json: &Json) -> Value {
    match json {
        Json::String(s) => parse_iso_date(s)
            .map(Value::Date)
            .unwrap_or_else(|| Value::String(s.clone())),
        Json::Array(items) => Value::Array(items.iter().map(revive).collect()),
        Json::Object(map) => Value::Document(map.iter().map(|(k, v)| (k.clone(), revive(v))).collect()),
        other => Value::from_json(other),
    }
}

fn truthy(json: &Json) -> bool {
    match json {
        Json::Null => false,
        Json::Bool(b) => *b,
        Json::Number(n) => n.as_f64().map_or(false, |f| f != 0.0),
        _ => true,
    }
}

fn json_type(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "bool",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

fn invalid(op: &str, reason: &str) -> QueryError {
    QueryError::InvalidOperand {
        op: op.to_string(),
        reason: reason.to_string(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Patches, sorts, projections
// ─────────────────────────────────────────────────────────────────────────────

/// Translate a patch expression. Every top-level key must be an operator.
///
/// Field values are left as the caller wrote them so declared fields can be
/// sealed first; run [`encode_update`] before handing the patch to a store.
pub fn translate_update<'a>(input: impl Into<JsonInput<'a>>) -> Result<Update> {
    let json = input.into().parse()?;
    let map = match json.as_ref() {
        Json::Object(map) => map,
        other => return Err(QueryError::NotADocument(json_type(other).to_string())),
    };
    if map.is_empty() || map.keys().any(|k| !k.starts_with('$')) {
        return Err(QueryError::InvalidUpdate(
            "patch must consist of update operators".to_string(),
        ));
    }

    let mut update = Update::default();
    for (op, operand) in map {
        let fields = operand
            .as_object()
            .ok_or_else(|| invalid(op, "expected a document"))?;
        match op.as_str() {
            "$set" => update.set = patch_fields(fields),
            "$push" => update.push = patch_fields(fields),
            "$unset" => update.unset = fields.keys().cloned().collect(),
            "$inc" => {
                for (path, delta) in fields {
                    if !delta.is_number() {
                        return Err(invalid("$inc", "increments must be numbers"));
                    }
                    update.inc.insert(path.clone(), Value::from_json(delta));
                }
            }
            other => return Err(QueryError::UnknownOperator(other.to_string())),
        }
    }
    Ok(update)
}

/// Patch paths stay dotted.
fn patch_fields(fields: &Map<String, Json>) -> Document {
    fields
        .iter()
        .filter(|(k, _)| !k.starts_with("$$"))
        .map(|(k, v)| (k.clone(), Value::from_json(v)))
        .collect()
}

/// Encode the `$set` and `$push` values of a patch for storage, the same way
/// [`encode_document`] encodes field values. Paths are not escaped.
pub fn encode_update(mut update: Update) -> Update {
    update.set = encode_fields(update.set);
    update.push = encode_fields(update.push);
    update
}

fn encode_fields(fields: Document) -> Document {
    fields
        .into_iter()
        .map(|(path, value)| (path, encode_value(value)))
        .collect()
}

/// Translate a sort. Accepts `"name -age"` or `{"name": 1, "age": -1}`.
pub fn translate_sort<'a>(input: impl Into<JsonInput<'a>>) -> Result<Vec<SortKey>> {
    let json = input.into().parse()?;
    match json.as_ref() {
        Json::Null => Ok(Vec::new()),
        Json::String(spec) => Ok(spec
            .split_whitespace()
            .map(|field| match field.strip_prefix('-') {
                Some(path) => SortKey::descending(path),
                None => SortKey::ascending(field),
            })
            .collect()),
        Json::Object(map) => map
            .iter()
            .map(|(path, direction)| {
                let descending = match direction {
                    Json::Number(n) => n.as_f64().map_or(false, |f| f < 0.0),
                    Json::String(s) => matches!(s.to_ascii_lowercase().as_str(), "desc" | "descending" | "-1"),
                    _ => return Err(invalid("sort", "direction must be 1, -1, \"asc\" or \"desc\"")),
                };
                Ok(SortKey {
                    path: path.clone(),
                    descending,
                })
            })
            .collect(),
        other => Err(QueryError::NotADocument(json_type(other).to_string())),
    }
}

/// Translate a projection. `None` returns whole documents.
pub fn translate_projection<'a>(input: impl Into<JsonInput<'a>>) -> Result<Option<Projection>> {
    let json = input.into().parse()?;
    let map = match json.as_ref() {
        Json::Null => return Ok(None),
        Json::Object(map) if map.is_empty() => return Ok(None),
        Json::Object(map) => map,
        other => return Err(QueryError::NotADocument(json_type(other).to_string())),
    };

    let mut included = Vec::new();
    let mut excluded = Vec::new();
    let mut id = true;
    for (path, flag) in map {
        match (path.as_str(), truthy(flag)) {
            (ID_FIELD, keep) => id = keep,
            (_, true) => included.push(path.clone()),
            (_, false) => excluded.push(path.clone()),
        }
    }

    match (included.is_empty(), excluded.is_empty()) {
        (false, false) => Err(invalid(
            "projection",
            "cannot mix inclusion and exclusion",
        )),
        (false, true) => Ok(Some(Projection::Include {
            fields: included,
            id,
        })),
        (true, _) if excluded.is_empty() && id => Ok(Some(Projection::Include {
            fields: Vec::new(),
            id: true,
        })),
        (true, _) => {
            if !id {
                excluded.push(ID_FIELD.to_string());
            }
            Ok(Some(Projection::Exclude(excluded)))
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Document encoding
// ─────────────────────────────────────────────────────────────────────────────

/// Prepare a document for the store.
///
/// Dots in keys become [`KEY_SUBSTITUTE`], keys starting with `$$` are
/// dropped, and strings in the exact form `YYYY-MM-DDTHH:MM:SS.sssZ` become
/// native dates.
pub fn encode_document(doc: Document) -> Document {
    doc.into_iter()
        .filter(|(key, _)| !key.starts_with("$$"))
        .map(|(key, value)| (escape_key(key), encode_value(value)))
        .collect()
}

fn encode_value(value: Value) -> Value {
    match value {
        Value::String(s) if is_canonical_date(&s) => parse_iso_date(&s)
            .map(Value::Date)
            .unwrap_or(Value::String(s)),
        Value::Array(items) => Value::Array(items.into_iter().map(encode_value).collect()),
        Value::Document(doc) => Value::Document(encode_document(doc)),
        other => other,
    }
}

fn escape_key(key: String) -> String {
    if key.contains('.') {
        key.replace('.', KEY_SUBSTITUTE)
    } else {
        key
    }
}

/// Undo [`encode_document`]'s key substitution, recursively.
pub fn decode_document(doc: Document) -> Document {
    doc.into_iter()
        .map(|(key, value)| (unescape_key(key), decode_value(value)))
        .collect()
}

fn decode_value(value: Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.into_iter().map(decode_value).collect()),
        Value::Document(doc) => Value::Document(decode_document(doc)),
        other => other,
    }
}

fn unescape_key(key: String) -> String {
    if key.contains(KEY_SUBSTITUTE) {
        key.replace(KEY_SUBSTITUTE, ".")
    } else {
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::document_from_json;
    use serde_json::json;

    #[test]
    fn test_structured_and_serialized_agree() {
        let json = json!({
            "name": "__REGEXP /^al/i",
            "_created": {"$gte": "2020-01-01T00:00:00.000Z"},
            "$or": [{"_id": "5a17f157c4815318c8536c21"}, {"kind": {"$in": ["a", "b"]}}]
        });
        let text = json.to_string();
        assert_eq!(
            translate_filter(&json).unwrap(),
            translate_filter(text.as_str()).unwrap()
        );
    }

    #[test]
    fn test_id_expansion() {
        let oid = ObjectId::parse_str("5a17f157c4815318c8536c21").unwrap();
        let filter = translate_filter(&json!({"_id": "5a17f157c4815318c8536c21"})).unwrap();
        assert_eq!(
            filter,
            Filter::field(
                "_id",
                Predicate::In(vec![Value::from("5a17f157c4815318c8536c21"), Value::ObjectId(oid)])
            )
        );

        let plain = translate_filter(&json!({"_id": "custom"})).unwrap();
        assert_eq!(plain, Filter::eq("_id", "custom"));

        // Matches a document stored with the native form.
        let mut doc = Document::new();
        doc.insert("_id".into(), Value::ObjectId(oid));
        assert!(filter.matches(&doc));
    }

    #[test]
    fn test_id_not_expanded_inside_elem_match() {
        let filter =
            translate_filter(&json!({"_acl": {"$elemMatch": {"_id": "5a17f157c4815318c8536c21"}}}))
                .unwrap();
        assert_eq!(
            filter,
            Filter::field(
                "_acl",
                Predicate::ElemMatch(Box::new(Filter::eq("_id", "5a17f157c4815318c8536c21")))
            )
        );
    }

    #[test]
    fn test_dates_revived_at_depth() {
        let filter = translate_filter(&json!({
            "$and": [{"$or": [{"at": {"$lt": "2021-06-01T12:00:00.000+02:00"}}]}]
        }))
        .unwrap();
        let Filter::And(outer) = filter else { panic!("expected $and") };
        let Filter::Or(inner) = &outer[0] else { panic!("expected $or") };
        let Filter::Field { predicate: Predicate::Lt(Value::Date(d)), .. } = &inner[0] else {
            panic!("expected a date comparison")
        };
        assert_eq!(crate::value::format_date(d), "2021-06-01T10:00:00.000Z");
    }

    #[test]
    fn test_regex_in_membership() {
        let filter = translate_filter(&json!({"name": {"$in": ["x", "__REGEXP /^y/"]}})).unwrap();
        let doc = document_from_json(&json!({"name": "yes"})).unwrap();
        assert!(filter.matches(&doc));
        assert!(matches!(filter, Filter::Or(_)));
    }

    #[test]
    fn test_rejects_malformed_filters() {
        assert!(matches!(
            translate_filter(&json!({"a": {"$near": 1}})),
            Err(QueryError::UnknownOperator(_))
        ));
        assert!(translate_filter(&json!([1, 2])).is_err());
        assert!(translate_filter("{not json").is_err());
        assert!(translate_filter(&json!({"a": "__REGEXP nope"})).is_err());
        assert!(translate_filter(&json!({"$or": []})).is_err());
        assert_eq!(translate_filter(&json!({})).unwrap(), Filter::All);
    }

    #[test]
    fn test_bits_operand_forms() {
        let a = translate_filter(&json!({"r": {"$bitsAllSet": [0, 2]}})).unwrap();
        let b = translate_filter(&json!({"r": {"$bitsAllSet": 5}})).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_update_translation() {
        let update = translate_update(&json!({
            "$set": {"a.b": "2020-01-01T00:00:00.000Z", "$$skip": 1},
            "$inc": {"_version": 1},
            "$unset": {"gone": ""}
        }))
        .unwrap();
        assert_eq!(
            update.set.get("a.b"),
            Some(&Value::String("2020-01-01T00:00:00.000Z".into()))
        );
        assert!(!update.set.contains_key("$$skip"));
        assert_eq!(update.inc.get("_version"), Some(&Value::Int(1)));
        assert_eq!(update.unset, vec!["gone".to_string()]);

        assert!(translate_update(&json!({"name": "x"})).is_err());
        assert!(translate_update(&json!({"$inc": {"n": "one"}})).is_err());
        assert!(translate_update(&json!({"$rename": {"a": "b"}})).is_err());
    }

    #[test]
    fn test_encode_update_keeps_paths() {
        let update = translate_update(&json!({
            "$set": {"a.b": "2020-01-01T00:00:00.000Z", "n": {"c.d": 1}},
            "$push": {"at": "2021-06-01T12:00:00.000Z"}
        }))
        .unwrap();
        let encoded = encode_update(update);
        assert!(matches!(encoded.set.get("a.b"), Some(Value::Date(_))));
        assert!(matches!(encoded.push.get("at"), Some(Value::Date(_))));
        let nested = encoded.set.get("n").and_then(Value::as_document).unwrap();
        assert!(nested.contains_key("c____d"));
    }

    #[test]
    fn test_sort_and_projection() {
        assert_eq!(
            translate_sort("name -_created").unwrap(),
            vec![SortKey::ascending("name"), SortKey::descending("_created")]
        );
        assert_eq!(
            translate_sort(&json!({"n": -1})).unwrap(),
            vec![SortKey::descending("n")]
        );
        assert_eq!(
            translate_projection(&json!({"name": 1, "_id": 0})).unwrap(),
            Some(Projection::Include { fields: vec!["name".into()], id: false })
        );
        assert_eq!(
            translate_projection(&json!({"secret": 0})).unwrap(),
            Some(Projection::Exclude(vec!["secret".into()]))
        );
        assert!(translate_projection(&json!({"a": 1, "b": 0})).is_err());
        assert_eq!(translate_projection(&Json::Null).unwrap(), None);
    }

    #[test]
    fn test_translate_document() {
        assert_eq!(translate_document(&json!(null)).unwrap(), None);
        assert_eq!(translate_document("  ").unwrap(), None);
        let doc = translate_document(r#"{"name": "a"}"#).unwrap().unwrap();
        assert_eq!(doc.get("name"), Some(&Value::from("a")));
        assert!(translate_document(&json!([1, 2])).is_err());
    }

    #[test]
    fn test_dotted_keys_round_trip() {
        let original = document_from_json(&json!({
            "a.b": 1,
            "nested": {"x.y": [{"p.q": true}]},
            "$$transient": 1,
            "when": "2020-01-01T00:00:00.000Z",
            "loose": "2020-01-01T00:00:00.000+00:00"
        }))
        .unwrap();

        let stored = encode_document(original.clone());
        assert!(stored.contains_key("a____b"));
        assert!(!stored.contains_key("$$transient"));
        assert!(matches!(stored.get("when"), Some(Value::Date(_))));
        assert!(matches!(stored.get("loose"), Some(Value::String(_))));

        let restored = crate::value::document_to_json(&decode_document(stored));
        assert_eq!(restored["a.b"], json!(1));
        assert_eq!(restored["nested"]["x.y"][0]["p.q"], json!(true));
        assert_eq!(restored["when"], json!("2020-01-01T00:00:00.000Z"));
        assert!(restored.get("$$transient").is_none());
    }
}
