//! Follow-up calls for URLs whose result lives elsewhere.
//!
//! Some commands only start work; their useful output must be fetched with
//! a second call once they finish. Install preview is the known case: the
//! preview text is read from `/securityconsole/preview/result`.

use fmg_rpc_common::{ConnectorResult, RpcClient, RpcMethod};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::request::Request;

/// A URL that needs a follow-up call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecialCase {
    /// Request URL that triggers the follow-up.
    pub url: &'static str,
    /// URL of the follow-up call.
    pub follow_up: &'static str,
    /// Verb of the follow-up call.
    pub method: RpcMethod,
}

/// Known follow-ups.
pub const SPECIAL_CASES: &[SpecialCase] = &[SpecialCase {
    url: "/securityconsole/install/preview",
    follow_up: "/securityconsole/preview/result",
    method: RpcMethod::Exec,
}];

/// Looks up the follow-up for `url`, ignoring trailing slashes.
pub fn lookup(url: &str) -> Option<&'static SpecialCase> {
    let url = url.trim_end_matches('/');
    SPECIAL_CASES.iter().find(|case| case.url == url)
}

/// Runs the follow-up for `request`, returning its result data.
///
/// The follow-up reuses the request payload. Returns `None` when the URL
/// has no follow-up or the follow-up produced nothing.
#[instrument(skip(client, request), fields(url = %request.url))]
pub async fn augment<C>(client: &C, request: &Request) -> ConnectorResult<Option<Value>>
where
    C: RpcClient + ?Sized,
{
    let Some(case) = lookup(&request.url) else {
        return Ok(None);
    };

    let reply = client
        .call(case.method, case.follow_up, &request.payload)
        .await?;
    debug!(follow_up = case.follow_up, code = reply.code, "Special case follow-up");
    Ok((!is_empty_result(&reply.data)).then_some(reply.data))
}

fn is_empty_result(data: &Value) -> bool {
    match data {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}
