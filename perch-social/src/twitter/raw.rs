//! Path-addressed access to raw timeline items.
//!
//! Every other module reads raw input through these helpers. A lookup never
//! fails: an absent segment, a `null`, or a value of the wrong shape all
//! resolve to the caller's default.
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One element of a timeline page, kept in its raw JSON form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawItem(Value);

impl RawItem {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn lookup(&self, path: &str) -> Option<&Value> {
        lookup(&self.0, path)
    }

    pub fn get<T: FromRaw>(&self, path: &str, default: T) -> T {
        get(&self.0, path, default)
    }

    pub fn get_str(&self, path: &str, default: &str) -> String {
        get(&self.0, path, default.to_owned())
    }

    pub fn get_u64(&self, path: &str, default: u64) -> u64 {
        get(&self.0, path, default)
    }

    pub fn get_bool(&self, path: &str, default: bool) -> bool {
        get(&self.0, path, default)
    }

    /// Array at `path`, or an empty slice.
    pub fn get_array(&self, path: &str) -> &[Value] {
        get_array(&self.0, path)
    }

    /// External identifier at `path`. Ids arrive as decimal strings
    /// (`idStr`, `restId`) or plain numbers; anything else is `None`.
    pub fn get_id(&self, path: &str) -> Option<u64> {
        self.lookup(path).and_then(u64::from_raw)
    }
}

impl From<Value> for RawItem {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Conversion from a resolved JSON value; `None` means "wrong shape".
pub trait FromRaw: Sized {
    fn from_raw(value: &Value) -> Option<Self>;
}

impl FromRaw for String {
    fn from_raw(value: &Value) -> Option<Self> {
        value.as_str().map(str::to_owned)
    }
}

impl FromRaw for bool {
    fn from_raw(value: &Value) -> Option<Self> {
        value.as_bool()
    }
}

// Counters such as `views.count` are serialized as strings by the API.
impl FromRaw for u64 {
    fn from_raw(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| f.is_finite() && *f >= 0.0).map(|f| f as u64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl FromRaw for i64 {
    fn from_raw(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl FromRaw for Vec<Value> {
    fn from_raw(value: &Value) -> Option<Self> {
        value.as_array().cloned()
    }
}

/// Resolve a dot-separated path. Numeric segments index into arrays.
pub fn lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for segment in path.split('.').filter(|s| !s.is_empty()) {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    if current.is_null() {
        None
    } else {
        Some(current)
    }
}

pub fn get<T: FromRaw>(root: &Value, path: &str, default: T) -> T {
    lookup(root, path)
        .and_then(T::from_raw)
        .unwrap_or(default)
}

pub fn get_array<'a>(root: &'a Value, path: &str) -> &'a [Value] {
    lookup(root, path)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}
