//! ADOM resolution.
//!
//! Works out which administrative domain a request targets. The URL is
//! checked first; if it carries no `/adom/<name>/` segment the payload is
//! searched depth-first.
//!
//! # Traversal order
//!
//! Objects are visited in insertion order (`serde_json` is built with
//! `preserve_order`), arrays in index order. Within one object the `url`
//! field is inspected first, then the `adom` field, then every value in
//! order. The first hit wins, so identical input always resolves to the
//! same ADOM.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::payload::Payload;

/// Fallback ADOM when neither the URL nor the payload names one.
pub const GLOBAL_ADOM: &str = "global";

/// Payload field holding a nested request URL.
pub const URL_FIELD: &str = "url";

/// Payload field naming an ADOM directly.
pub const ADOM_FIELD: &str = "adom";

static ADOM_SEGMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/adom/([^/]+)/").expect("Invalid regex pattern"));

/// Extracts the ADOM name from a `/adom/<name>/` URL segment.
///
/// ```
/// use fmg_rpc_common::adom::adom_from_url;
///
/// assert_eq!(adom_from_url("/pm/config/adom/root/obj/firewall/address/"), Some("root"));
/// assert_eq!(adom_from_url("/dvmdb/device"), None);
/// ```
pub fn adom_from_url(url: &str) -> Option<&str> {
    ADOM_SEGMENT_RE
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Resolves the ADOM a request targets.
///
/// Returns [`GLOBAL_ADOM`] when nothing more specific is found.
pub fn resolve_adom(url: &str, payload: &Payload) -> String {
    if let Some(adom) = adom_from_url(url) {
        return adom.to_string();
    }

    find_in_object(payload).unwrap_or_else(|| GLOBAL_ADOM.to_string())
}

/// Searches a JSON value for an ADOM reference.
pub fn find_adom(value: &Value) -> Option<String> {
    match value {
        Value::Object(map) => find_in_object(map),
        Value::Array(items) => items.iter().find_map(find_adom),
        _ => None,
    }
}

fn find_in_object(map: &Payload) -> Option<String> {
    if let Some(adom) = map
        .get(URL_FIELD)
        .and_then(Value::as_str)
        .and_then(adom_from_url)
    {
        return Some(adom.to_string());
    }

    // An explicit adom field settles this object, even when it is unusable.
    if let Some(adom) = map.get(ADOM_FIELD) {
        return adom_field_value(adom);
    }

    map.values().find_map(find_adom)
}

fn adom_field_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
