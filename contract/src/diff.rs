//! Structural comparison of JSON payloads returned by the golden and candidate targets.
//!
//! Two entry points share one recursive walk:
//!
//! - [`assert_same_shape`] requires type tags, object key sets and scalar values to agree,
//!   except at paths listed in a [`ToleranceSet`]. A tolerated path still has to carry the
//!   same type tag on both sides; below it nothing else is checked.
//! - [`assert_same_schema`] requires type tags and key sets to agree at every level but
//!   never compares scalar values.
//!
//! Arrays are sampled, not walked: if either side is empty the arrays match, otherwise only
//! element `[0]` of each side is compared. Elements after the first are never inspected.

use serde_json::{Map, Number, Value};
use std::collections::BTreeSet;
use std::fmt;

/// Type tag of a JSON value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonType {
    Null,
    Boolean,
    Number,
    String,
    Array,
    Object,
}

impl JsonType {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => JsonType::Null,
            Value::Bool(_) => JsonType::Boolean,
            Value::Number(_) => JsonType::Number,
            Value::String(_) => JsonType::String,
            Value::Array(_) => JsonType::Array,
            Value::Object(_) => JsonType::Object,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JsonType::Null => "null",
            JsonType::Boolean => "boolean",
            JsonType::Number => "number",
            JsonType::String => "string",
            JsonType::Array => "array",
            JsonType::Object => "object",
        }
    }
}

impl fmt::Display for JsonType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Location of a check inside a payload: `$`, `$.user.id`, `$.results[0].fund_code`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JsonPath(String);

impl JsonPath {
    pub fn root() -> Self {
        Self("$".to_string())
    }

    /// Path of member `key` of the object at this path.
    pub fn key(&self, key: &str) -> Self {
        Self(format!("{}.{}", self.0, key))
    }

    /// Path of the first element of the array at this path.
    pub fn first_element(&self) -> Self {
        Self(format!("{}[0]", self.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JsonPath {
    fn default() -> Self {
        Self::root()
    }
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Paths at which golden and candidate may carry different scalar values.
///
/// Built once per comparison call and passed down unchanged through the recursion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToleranceSet {
    paths: BTreeSet<String>,
}

impl ToleranceSet {
    /// Tolerate nothing: every scalar must match.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn of<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, path: &JsonPath) -> bool {
        self.paths.contains(path.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// First divergence found between the two payloads.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Mismatch {
    #[error("type mismatch @ {path}: golden={golden}, candidate={candidate}")]
    Type {
        path: JsonPath,
        golden: JsonType,
        candidate: JsonType,
    },
    #[error(
        "object key sets differ @ {path}: golden=[{}] candidate=[{}]",
        .golden.join(","),
        .candidate.join(",")
    )]
    KeySet {
        path: JsonPath,
        golden: Vec<String>,
        candidate: Vec<String>,
    },
    #[error("value mismatch @ {path}: golden={golden} candidate={candidate}")]
    Value {
        path: JsonPath,
        golden: String,
        candidate: String,
    },
}

impl Mismatch {
    /// Path at which the payloads diverged.
    pub fn path(&self) -> &JsonPath {
        match self {
            Mismatch::Type { path, .. }
            | Mismatch::KeySet { path, .. }
            | Mismatch::Value { path, .. } => path,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum ValuePolicy<'a> {
    /// Scalars must be equal unless their path is tolerated.
    Strict(&'a ToleranceSet),
    /// Scalars are never compared.
    SchemaOnly,
}

/// Compare type, key sets and (outside `tolerance`) scalar values.
pub fn assert_same_shape(
    golden: &Value,
    candidate: &Value,
    path: &JsonPath,
    tolerance: &ToleranceSet,
) -> Result<(), Mismatch> {
    walk(golden, candidate, path, ValuePolicy::Strict(tolerance))
}

/// Compare type and key sets only; scalar leaf values may differ anywhere.
pub fn assert_same_schema(golden: &Value, candidate: &Value, path: &JsonPath) -> Result<(), Mismatch> {
    walk(golden, candidate, path, ValuePolicy::SchemaOnly)
}

fn walk(golden: &Value, candidate: &Value, path: &JsonPath, policy: ValuePolicy<'_>) -> Result<(), Mismatch> {
    let golden_type = JsonType::of(golden);
    let candidate_type = JsonType::of(candidate);
    if golden_type != candidate_type {
        return Err(Mismatch::Type {
            path: path.clone(),
            golden: golden_type,
            candidate: candidate_type,
        });
    }

    if let ValuePolicy::Strict(tolerance) = policy {
        if tolerance.contains(path) {
            return Ok(());
        }
    }

    match (golden, candidate) {
        (Value::Object(g), Value::Object(c)) => walk_object(g, c, path, policy),
        (Value::Array(g), Value::Array(c)) => match (g.first(), c.first()) {
            (Some(g0), Some(c0)) => walk(g0, c0, &path.first_element(), policy),
            _ => Ok(()),
        },
        _ => match policy {
            ValuePolicy::SchemaOnly => Ok(()),
            ValuePolicy::Strict(_) => {
                if scalars_equal(golden, candidate) {
                    Ok(())
                } else {
                    Err(Mismatch::Value {
                        path: path.clone(),
                        golden: display_scalar(golden),
                        candidate: display_scalar(candidate),
                    })
                }
            }
        },
    }
}

fn walk_object(
    golden: &Map<String, Value>,
    candidate: &Map<String, Value>,
    path: &JsonPath,
    policy: ValuePolicy<'_>,
) -> Result<(), Mismatch> {
    let golden_keys = sorted_keys(golden);
    let candidate_keys = sorted_keys(candidate);
    if golden_keys != candidate_keys {
        return Err(Mismatch::KeySet {
            path: path.clone(),
            golden: golden_keys,
            candidate: candidate_keys,
        });
    }

    for key in &golden_keys {
        walk(&golden[key], &candidate[key], &path.key(key), policy)?;
    }
    Ok(())
}

fn sorted_keys(map: &Map<String, Value>) -> Vec<String> {
    let mut keys: Vec<String> = map.keys().cloned().collect();
    keys.sort();
    keys
}

fn scalars_equal(golden: &Value, candidate: &Value) -> bool {
    match (golden, candidate) {
        (Value::Number(g), Value::Number(c)) => numbers_equal(g, c),
        _ => golden == candidate,
    }
}

/// `1` and `1.0` are the same JSON number even though serde_json stores them differently.
fn numbers_equal(golden: &Number, candidate: &Number) -> bool {
    if golden == candidate {
        return true;
    }
    match (golden.as_f64(), candidate.as_f64()) {
        (Some(g), Some(c)) => g == c,
        _ => false,
    }
}

fn display_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
