//! Tagged representation of the loosely typed values kept in the option and
//! user-meta tables.

use indexmap::IndexMap;

/// A decoded option or meta value.
///
/// Arrays whose keys are exactly `0..n` in order decode to [`Value::List`];
/// every other array becomes a [`Value::Map`] with stringified keys, in the
/// order they were stored.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
}

impl Value {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(value) => Some(value),
            _ => None,
        }
    }

    /// Integer view of the value: integers, integral floats and numeric
    /// strings. Booleans and containers have no integer view.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            Self::Float(value) if value.is_finite() && value.fract() == 0.0 => {
                #[allow(clippy::cast_possible_truncation)]
                Some(*value as i64)
            }
            Self::Str(value) => {
                let trimmed = value.trim();
                trimmed.parse::<i64>().ok().or_else(|| {
                    trimmed
                        .parse::<f64>()
                        .ok()
                        .filter(|parsed| parsed.is_finite() && parsed.fract() == 0.0)
                        .map(|parsed| {
                            #[allow(clippy::cast_possible_truncation)]
                            let whole = parsed as i64;
                            whole
                        })
                })
            }
            _ => None,
        }
    }

    /// Truthiness as the host platform evaluates it.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(value) => *value,
            Self::Int(value) => *value != 0,
            Self::Float(value) => *value != 0.0,
            Self::Str(value) => !(value.is_empty() || value == "0"),
            Self::List(items) => !items.is_empty(),
            Self::Map(entries) => !entries.is_empty(),
        }
    }

    #[must_use]
    pub fn as_map(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Self::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// Map entries, treating an empty array of either shape as an empty map.
    ///
    /// Non-empty lists and scalars yield `None`.
    #[must_use]
    pub fn to_map(&self) -> Option<IndexMap<String, Value>> {
        match self {
            Self::Map(entries) => Some(entries.clone()),
            Self::List(items) if items.is_empty() => Some(IndexMap::new()),
            _ => None,
        }
    }

    /// Look up a key when the value is a map.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map().and_then(|entries| entries.get(key))
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::List(items)
    }
}

impl From<IndexMap<String, Value>> for Value {
    fn from(entries: IndexMap<String, Value>) -> Self {
        Self::Map(entries)
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Value {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self::Map(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}
