//! Cache key definitions.
//!
//! A [`QueryKey`] is an ordered list of [`KeySegment`]s. Segments are kept in
//! canonical form so that structurally equal inputs produce equal keys:
//! object keys are sorted, integral floats collapse to integers and
//! non-finite floats are rejected.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Number, Value};

use super::error::QueryError;

/// One canonical segment of a [`QueryKey`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeySegment {
    Null,
    Bool(bool),
    Int(i64),
    /// Unsigned integer above `i64::MAX`.
    UInt(u64),
    /// Finite float outside the `i64` integers, stored by bit pattern.
    Float(u64),
    Str(String),
    List(Vec<KeySegment>),
    Map(BTreeMap<String, KeySegment>),
}

impl KeySegment {
    /// Canonicalizes a float segment.
    pub fn float(value: f64) -> Result<Self, QueryError> {
        if !value.is_finite() {
            return Err(QueryError::InvalidKeySegment(format!(
                "non-finite number {value}"
            )));
        }
        if value.fract() == 0.0 && value >= i64::MIN as f64 && value < i64::MAX as f64 {
            // Also folds -0.0 into 0.
            return Ok(Self::Int(value as i64));
        }
        Ok(Self::Float(value.to_bits()))
    }

    /// Canonicalizes any serializable value, e.g. a filter struct.
    pub fn structured<T: Serialize + ?Sized>(value: &T) -> Result<Self, QueryError> {
        let value = serde_json::to_value(value)
            .map_err(|err| QueryError::InvalidKeySegment(err.to_string()))?;
        Self::try_from(value)
    }

    fn to_value(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(i) => Value::Number((*i).into()),
            Self::UInt(u) => Value::Number((*u).into()),
            Self::Float(bits) => {
                Number::from_f64(f64::from_bits(*bits)).map_or(Value::Null, Value::Number)
            }
            Self::Str(s) => Value::String(s.clone()),
            Self::List(items) => Value::Array(items.iter().map(Self::to_value).collect()),
            Self::Map(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_value()))
                    .collect(),
            ),
        }
    }
}

impl TryFrom<Value> for KeySegment {
    type Error = QueryError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Ok(match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Self::UInt(u)
                } else {
                    let f = n.as_f64().ok_or_else(|| {
                        QueryError::InvalidKeySegment(format!("unrepresentable number {n}"))
                    })?;
                    Self::float(f)?
                }
            }
            Value::String(s) => Self::Str(s),
            Value::Array(items) => Self::List(
                items
                    .into_iter()
                    .map(Self::try_from)
                    .collect::<Result<_, _>>()?,
            ),
            Value::Object(map) => Self::Map(
                map.into_iter()
                    .map(|(k, v)| Ok((k, Self::try_from(v)?)))
                    .collect::<Result<_, QueryError>>()?,
            ),
        })
    }
}

impl From<&str> for KeySegment {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for KeySegment {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<&String> for KeySegment {
    fn from(value: &String) -> Self {
        Self::Str(value.clone())
    }
}

impl From<bool> for KeySegment {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for KeySegment {
    fn from(value: i32) -> Self {
        Self::Int(value.into())
    }
}

impl From<i64> for KeySegment {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u32> for KeySegment {
    fn from(value: u32) -> Self {
        Self::Int(value.into())
    }
}

impl From<u64> for KeySegment {
    fn from(value: u64) -> Self {
        i64::try_from(value).map_or(Self::UInt(value), Self::Int)
    }
}

impl From<usize> for KeySegment {
    fn from(value: usize) -> Self {
        Self::from(value as u64)
    }
}

impl<T: Into<KeySegment>> From<Option<T>> for KeySegment {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Canonical, comparable identity of one logical query.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct QueryKey(Arc<[KeySegment]>);

impl QueryKey {
    pub fn new(segments: impl IntoIterator<Item = KeySegment>) -> Self {
        Self(segments.into_iter().collect())
    }

    pub fn segments(&self) -> &[KeySegment] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether `prefix` matches the leading segments of this key.
    ///
    /// The empty key is a prefix of every key.
    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// First segment when it is a string, used as the key's namespace.
    pub fn namespace(&self) -> Option<&str> {
        match self.0.first() {
            Some(KeySegment::Str(name)) => Some(name),
            _ => None,
        }
    }

    /// Returns a new key with `segment` appended.
    pub fn child(&self, segment: impl Into<KeySegment>) -> Self {
        Self::new(self.0.iter().cloned().chain([segment.into()]))
    }
}

/// Builds a key from JSON-shaped segments.
pub fn encode(segments: &[Value]) -> Result<QueryKey, QueryError> {
    let segments = segments
        .iter()
        .cloned()
        .map(KeySegment::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(QueryKey::new(segments))
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let canonical = Value::Array(self.0.iter().map(KeySegment::to_value).collect());
        write!(f, "{canonical}")
    }
}

impl fmt::Debug for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QueryKey({self})")
    }
}

/// Builds a [`QueryKey`] from values convertible into [`KeySegment`].
///
/// ```
/// use callboard::query_key;
///
/// let key = query_key!["managers", 1, 10, ""];
/// assert_eq!(key.to_string(), r#"["managers",1,10,""]"#);
/// ```
#[macro_export]
macro_rules! query_key {
    ($($segment:expr),* $(,)?) => {
        $crate::query::QueryKey::new([$($crate::query::KeySegment::from($segment)),*])
    };
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[derive(Serialize)]
    struct Filter {
        search: &'static str,
        page: u32,
    }

    #[test]
    fn structurally_equal_inputs_produce_equal_keys() {
        let a = encode(&[json!("calls"), json!({ "page": 1, "search": "x" })])
            .expect("key should encode");
        let b = QueryKey::new([
            KeySegment::from("calls"),
            KeySegment::structured(&Filter {
                search: "x",
                page: 1,
            })
            .expect("filter should encode"),
        ]);
        assert_eq!(a, b);
        assert_eq!(a.to_string(), b.to_string());
    }

    #[test]
    fn integral_floats_collapse_to_integers() {
        let float = encode(&[json!(1.0), json!(-0.0)]).expect("key should encode");
        let int = encode(&[json!(1), json!(0)]).expect("key should encode");
        assert_eq!(float, int);
        assert_ne!(
            encode(&[json!(1.5)]).expect("key should encode"),
            encode(&[json!(1)]).expect("key should encode")
        );
    }

    #[test]
    fn floats_past_i64_range_stay_distinct() {
        let two_pow_63 = KeySegment::float(9_223_372_036_854_775_808.0).expect("finite");
        assert!(matches!(two_pow_63, KeySegment::Float(_)));
        assert_ne!(two_pow_63, KeySegment::Int(i64::MAX));
        assert_eq!(
            KeySegment::float(i64::MIN as f64).expect("finite"),
            KeySegment::Int(i64::MIN)
        );
    }

    #[test]
    fn non_finite_numbers_are_rejected() {
        assert!(matches!(
            KeySegment::float(f64::NAN),
            Err(QueryError::InvalidKeySegment(_))
        ));
        assert!(KeySegment::float(f64::INFINITY).is_err());
    }

    #[test]
    fn maps_with_non_string_keys_are_rejected() {
        let mut map = std::collections::HashMap::new();
        map.insert((1, 2), "tuple key");
        assert!(matches!(
            KeySegment::structured(&map),
            Err(QueryError::InvalidKeySegment(_))
        ));
    }

    #[test]
    fn prefix_matching() {
        let key = crate::query_key!["managers", "view", 7, "all"];
        assert!(key.starts_with(&crate::query_key!["managers"]));
        assert!(key.starts_with(&crate::query_key!["managers", "view"]));
        assert!(key.starts_with(&QueryKey::new([])));
        assert!(!key.starts_with(&crate::query_key!["calls"]));
        assert!(!crate::query_key!["managers"].starts_with(&key));
        assert_eq!(key.namespace(), Some("managers"));
    }

    #[test]
    fn optional_segments_encode_as_null() {
        let key = crate::query_key!["calls", None::<u64>, Some(3_u64)];
        insta::assert_snapshot!(key.to_string(), @r#"["calls",null,3]"#);
    }

    #[test]
    fn canonical_text_sorts_object_keys() {
        let key = encode(&[json!({ "b": 1, "a": [true, "s"] })]).expect("key should encode");
        insta::assert_snapshot!(key.to_string(), @r#"[{"a":[true,"s"],"b":1}]"#);
    }

    #[test]
    fn child_appends_segment() {
        let key = crate::query_key!["call", "view"].child(12_u64);
        assert_eq!(key, crate::query_key!["call", "view", 12_u64]);
        assert_eq!(key.len(), 3);
    }
}
