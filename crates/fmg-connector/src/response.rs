//! Action responses.

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;

use crate::action::Action;
use crate::task::TaskOutcome;

/// Result of one connector action.
///
/// Serializes to an object keyed by `<action>_response`, plus
/// `task_response` and `special_case_response` when present, and `status`.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionResponse {
    action: Action,
    result: Value,
    dispatch_code: i64,
    task: Option<TaskOutcome>,
    special_case: Option<Value>,
}

impl ActionResponse {
    /// Creates a response from the dispatch reply.
    pub fn new(action: Action, result: Value, code: i64) -> Self {
        Self {
            action,
            result,
            dispatch_code: code,
            task: None,
            special_case: None,
        }
    }

    /// Attaches the outcome of task tracking.
    pub fn with_task(mut self, outcome: TaskOutcome) -> Self {
        self.task = Some(outcome);
        self
    }

    /// Attaches the special-case follow-up data.
    pub fn with_special_case(mut self, data: Value) -> Self {
        self.special_case = Some(data);
        self
    }

    /// Returns the action.
    pub fn action(&self) -> Action {
        self.action
    }

    /// Returns the primary dispatch result.
    pub fn result(&self) -> &Value {
        &self.result
    }

    /// Returns the tracked task outcome.
    pub fn task(&self) -> Option<&TaskOutcome> {
        self.task.as_ref()
    }

    /// Returns the special-case follow-up data.
    pub fn special_case(&self) -> Option<&Value> {
        self.special_case.as_ref()
    }

    /// Returns the reported status: the final task poll code when a task
    /// was tracked, the dispatch code otherwise.
    pub fn status(&self) -> i64 {
        self.task
            .as_ref()
            .map(|outcome| outcome.code)
            .unwrap_or(self.dispatch_code)
    }

    /// Returns the dispatch status code.
    pub fn dispatch_code(&self) -> i64 {
        self.dispatch_code
    }

    /// Converts into a JSON value.
    pub fn to_json(&self) -> Value {
        let mut map = serde_json::Map::new();
        map.insert(self.action.response_key(), self.result.clone());
        if let Some(outcome) = &self.task {
            map.insert("task_response".to_string(), outcome.payload.clone());
        }
        if let Some(data) = &self.special_case {
            map.insert("special_case_response".to_string(), data.clone());
        }
        map.insert("status".to_string(), Value::from(self.status()));
        Value::Object(map)
    }
}

impl Serialize for ActionResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = 2 + usize::from(self.task.is_some()) + usize::from(self.special_case.is_some());
        let mut map = serializer.serialize_map(Some(len))?;
        map.serialize_entry(&self.action.response_key(), &self.result)?;
        if let Some(outcome) = &self.task {
            map.serialize_entry("task_response", &outcome.payload)?;
        }
        if let Some(data) = &self.special_case {
            map.serialize_entry("special_case_response", data)?;
        }
        map.serialize_entry("status", &self.status())?;
        map.end()
    }
}
