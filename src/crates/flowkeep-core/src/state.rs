//! Thread state and per-field merge policies
//!
//! A thread's data is a flat JSON object, [`WorkflowState`]. Nodes never
//! mutate it; they return a [`StateUpdate`] naming only the fields they
//! changed, and the engine folds that update into the state using the
//! [`MergePolicy`] the [`StateSchema`] declares for each field.
//!
//! # Merge policies
//!
//! | Policy | Behaviour |
//! |--------|-----------|
//! | `Replace` (default) | New value overwrites the old one, `null` included |
//! | `Append` | New elements are concatenated after existing ones |
//!
//! For `Append`, an absent or `null` value on either side counts as an empty
//! list, and a non-array update is appended as a single element. Fields the
//! update does not mention keep their prior value.
//!
//! ```rust
//! use flowkeep_core::state::{MergePolicy, StateSchema, StateUpdate, WorkflowState};
//! use serde_json::json;
//!
//! let schema = StateSchema::new()
//!     .field("evaluator_feedback", MergePolicy::Append);
//!
//! let state = WorkflowState::new().with("grade", json!("bad"));
//! let update = StateUpdate::new()
//!     .with("evaluator_feedback", json!(["intro is vague"]))
//!     .with("grade", json!("good"));
//!
//! let next = schema.apply(&state, &update);
//! assert_eq!(next.get("evaluator_feedback"), Some(&json!(["intro is vague"])));
//! assert_eq!(next.get_str("grade"), Some("good"));
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::error::{GraphError, Result};

/// Complete data of one thread
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowState(Map<String, Value>);

impl WorkflowState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, for assembling an initial state
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.0.insert(key.into(), value);
        self
    }

    /// Convert a JSON object; anything else is rejected
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(GraphError::InvalidState(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(Value::as_bool)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.0.get(key).and_then(Value::as_i64)
    }

    /// Elements of an array field; absent or `null` reads as empty
    pub fn get_list(&self, key: &str) -> &[Value] {
        match self.0.get(key) {
            Some(Value::Array(items)) => items,
            _ => &[],
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for WorkflowState {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<Value> for WorkflowState {
    type Error = GraphError;

    fn try_from(value: Value) -> Result<Self> {
        Self::from_value(value)
    }
}

/// Partial update returned by a node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateUpdate(Map<String, Value>);

impl StateUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.0.insert(key.into(), value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) -> &mut Self {
        self.0.insert(key.into(), value);
        self
    }

    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(GraphError::InvalidState(format!(
                "update must be a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

impl From<Map<String, Value>> for StateUpdate {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<Value> for StateUpdate {
    type Error = GraphError;

    fn try_from(value: Value) -> Result<Self> {
        Self::from_value(value)
    }
}

/// How a field combines its old value with an update
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergePolicy {
    #[default]
    Replace,
    Append,
}

impl MergePolicy {
    /// Combine `current` (absent when the field was never set) with `update`
    pub fn merge(&self, current: Option<&Value>, update: &Value) -> Value {
        match self {
            MergePolicy::Replace => update.clone(),
            MergePolicy::Append => {
                let mut items = match current {
                    None | Some(Value::Null) => Vec::new(),
                    Some(Value::Array(existing)) => existing.clone(),
                    Some(single) => vec![single.clone()],
                };
                match update {
                    Value::Null => {}
                    Value::Array(more) => items.extend(more.iter().cloned()),
                    single => items.push(single.clone()),
                }
                Value::Array(items)
            }
        }
    }
}

/// Declared merge policy per field; undeclared fields use `Replace`
#[derive(Debug, Clone, Default)]
pub struct StateSchema {
    fields: HashMap<String, MergePolicy>,
}

impl StateSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field declaration
    pub fn field(mut self, name: impl Into<String>, policy: MergePolicy) -> Self {
        self.fields.insert(name.into(), policy);
        self
    }

    pub fn add_field(&mut self, name: impl Into<String>, policy: MergePolicy) -> &mut Self {
        self.fields.insert(name.into(), policy);
        self
    }

    pub fn policy(&self, name: &str) -> MergePolicy {
        self.fields.get(name).copied().unwrap_or_default()
    }

    /// Fold `update` into a copy of `state`. The input state is left untouched.
    pub fn apply(&self, state: &WorkflowState, update: &StateUpdate) -> WorkflowState {
        let mut next = state.0.clone();
        for (key, value) in update.iter() {
            let merged = self.policy(key).merge(next.get(key), value);
            next.insert(key.clone(), merged);
        }
        WorkflowState(next)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
