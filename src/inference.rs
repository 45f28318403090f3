use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;

/// Type label inferred for one property column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InferredType {
    String,
    Number,
    Boolean,
    Object,
    Array,
    Mixed,
    Null,
    Unknown,
}

impl InferredType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InferredType::String => "string",
            InferredType::Number => "number",
            InferredType::Boolean => "boolean",
            InferredType::Object => "object",
            InferredType::Array => "array",
            InferredType::Mixed => "mixed",
            InferredType::Null => "null",
            InferredType::Unknown => "unknown",
        }
    }

    /// Classifies a single JSON value. Arrays are told apart from objects.
    pub fn of(value: &Value) -> InferredType {
        match value {
            Value::Null => InferredType::Null,
            Value::Array(_) => InferredType::Array,
            Value::Object(_) => InferredType::Object,
            Value::Bool(_) => InferredType::Boolean,
            Value::Number(_) => InferredType::Number,
            Value::String(_) => InferredType::String,
        }
    }
}

impl fmt::Display for InferredType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Infers the type of a column from the values present under its key.
///
/// Missing keys must be filtered out by the caller; explicit `null`s are
/// expected here. Nulls never make a column `mixed`: a single non-null kind
/// alongside nulls collapses to that kind.
pub fn infer_type<'a, I>(values: I) -> InferredType
where
    I: IntoIterator<Item = &'a Value>,
{
    let mut seen_null = false;
    let mut kinds = BTreeSet::new();

    for value in values {
        match InferredType::of(value) {
            InferredType::Null => seen_null = true,
            kind => {
                kinds.insert(kind);
            }
        }
    }

    match kinds.len() {
        0 if seen_null => InferredType::Null,
        0 => InferredType::Unknown,
        1 => kinds.into_iter().next().unwrap_or(InferredType::Unknown),
        _ => InferredType::Mixed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn infer(values: &[Value]) -> InferredType {
        infer_type(values)
    }

    #[test]
    fn single_kind_columns() {
        assert_eq!(infer(&[json!(1), json!(2), json!(3)]), InferredType::Number);
        assert_eq!(infer(&[json!(true), json!(false)]), InferredType::Boolean);
        assert_eq!(infer(&[json!({"a": 1})]), InferredType::Object);
        assert_eq!(infer(&[json!([1, 2]), json!([])]), InferredType::Array);
    }

    #[test]
    fn nulls_do_not_count_towards_mixed() {
        assert_eq!(infer(&[json!("a"), Value::Null, json!("b")]), InferredType::String);
        assert_eq!(infer(&[Value::Null, Value::Null]), InferredType::Null);
    }

    #[test]
    fn distinct_kinds_are_mixed() {
        assert_eq!(infer(&[json!(1), json!("a")]), InferredType::Mixed);
        assert_eq!(infer(&[json!([1]), json!({"a": 1})]), InferredType::Mixed);
    }

    #[test]
    fn empty_column_is_unknown() {
        assert_eq!(infer(&[]), InferredType::Unknown);
    }

    #[test]
    fn labels_serialize_lowercase() {
        assert_eq!(serde_json::to_string(&InferredType::Mixed).unwrap(), "\"mixed\"");
        assert_eq!(InferredType::Boolean.to_string(), "boolean");
    }

    fn scalar() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i32>().prop_map(|n| json!(n)),
            "[a-z]{0,4}".prop_map(Value::String),
            Just(json!([1])),
            Just(json!({"k": "v"})),
        ]
    }

    proptest! {
        #[test]
        fn inference_ignores_order(values in prop::collection::vec(scalar(), 0..12), seed in any::<u64>()) {
            let expected = infer(&values);
            let mut shuffled = values.clone();
            let len = shuffled.len();
            if len > 1 {
                shuffled.rotate_left((seed as usize) % len);
                shuffled.reverse();
            }
            prop_assert_eq!(infer(&shuffled), expected);
        }
    }
}
