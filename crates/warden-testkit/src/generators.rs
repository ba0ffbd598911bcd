//! Proptest generators for property-based testing.

use chrono::{DateTime, Utc};
use proptest::prelude::*;

use warden_core::{Document, ObjectId, Value};

/// Generate a scalar value. Doubles are finite so values compare equal to
/// themselves.
pub fn scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        (-1000i64..1000).prop_map(Value::Int),
        (-1.0e6f64..1.0e6).prop_map(Value::Double),
        "[a-z]{0,8}".prop_map(Value::String),
        any::<[u8; 12]>().prop_map(|bytes| Value::ObjectId(ObjectId::from_bytes(bytes))),
        (0i64..4_102_444_800_000)
            .prop_filter_map("representable date", DateTime::<Utc>::from_timestamp_millis)
            .prop_map(Value::Date),
    ]
}

/// Generate a field name from a small alphabet, so two generated documents
/// share fields often.
pub fn field_name() -> impl Strategy<Value = String> {
    "[a-e]".prop_map(String::from)
}

/// Generate an array element that carries a `name` identity key.
pub fn keyed_element() -> impl Strategy<Value = Value> {
    ("[a-c]", scalar()).prop_map(|(name, value)| {
        let mut doc = Document::new();
        doc.insert("name".into(), Value::String(name));
        doc.insert("value".into(), value);
        Value::Document(doc)
    })
}

/// Generate a value nested up to a few levels deep.
pub fn value() -> impl Strategy<Value = Value> {
    scalar().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(prop_oneof![inner.clone(), keyed_element()], 0..4)
                .prop_map(Value::Array),
            prop::collection::btree_map(field_name(), inner, 0..4).prop_map(Value::Document),
        ]
    })
}

/// Generate a document.
pub fn document() -> impl Strategy<Value = Document> {
    prop::collection::btree_map(field_name(), value(), 0..5)
}

/// Generate a pair where the second document is an edit of the first.
pub fn edited_documents() -> impl Strategy<Value = (Document, Document)> {
    (document(), document(), any::<bool>()).prop_map(|(old, edits, merge)| {
        if !merge {
            return (old, edits);
        }
        let mut new = old.clone();
        new.extend(edits);
        (old, new)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::{diff_documents, Delta};

    proptest! {
        #[test]
        fn prop_delta_rebuilds_new_snapshot((old, new) in edited_documents()) {
            match diff_documents(&old, &new) {
                None => prop_assert_eq!(old, new),
                Some(delta) => {
                    prop_assert_eq!(delta.apply_to_document(&old).unwrap(), new);
                }
            }
        }

        #[test]
        fn prop_stored_delta_decodes((old, new) in edited_documents()) {
            if let Some(delta) = diff_documents(&old, &new) {
                let stored = Delta::from_value(&delta.to_value()).unwrap();
                prop_assert_eq!(stored.apply_to_document(&old).unwrap(), new);
            }
        }
    }
}
