//! Request construction from caller parameters.

use fmg_rpc_common::{normalize_payload, ConnectorError, ConnectorResult, Payload};
use serde_json::{Map, Value};

use crate::action::Action;
use crate::dispatch::{batch_items, batch_url};
use crate::task::{parse_flag, TimeoutPolicy};

/// One validated connector request.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Requested action.
    pub action: Action,
    /// Target URL. For free-form batches, the first sub-request's URL.
    pub url: String,
    /// Normalized request body.
    pub payload: Payload,
    /// Free-form method name.
    pub method: Option<String>,
    /// Poll the task started by an `execute`.
    pub track_task: bool,
    /// Task tracking limits.
    pub timeouts: TimeoutPolicy,
}

impl Request {
    /// Builds a request from the caller's parameter mapping.
    ///
    /// Validation happens here so that malformed requests fail before
    /// anything is sent to the controller.
    pub fn from_params(action: Action, params: &Map<String, Value>) -> ConnectorResult<Self> {
        let payload = normalize_payload(params.get("data").cloned().unwrap_or(Value::Null))?;
        let method = non_empty_str(params.get("method")).map(str::to_string);
        let param_url = non_empty_str(params.get("url"));

        let url = match action {
            Action::FreeForm => {
                if method.is_none() {
                    return Err(ConnectorError::missing_parameter("method"));
                }
                batch_items(&payload)?;
                batch_url(&payload)
                    .or(param_url)
                    .ok_or_else(|| ConnectorError::missing_parameter("url"))?
            }
            _ => param_url.ok_or_else(|| ConnectorError::missing_parameter("url"))?,
        }
        .to_string();

        Ok(Self {
            action,
            url,
            payload,
            method,
            track_task: parse_flag(params.get("track_task"), false),
            timeouts: TimeoutPolicy::from_params(params),
        })
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str).filter(|s| !s.is_empty())
}
