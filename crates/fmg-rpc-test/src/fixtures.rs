//! Test fixtures for common connector requests
//!
//! Provides reusable request parameters and controller payloads

use serde_json::{json, Map, Value};

/// Firewall address table in the `root` ADOM.
pub const ADDRESS_URL: &str = "/pm/config/adom/root/obj/firewall/address/";

/// Device registration command.
pub const ADD_DEVICE_URL: &str = "/dvm/cmd/add/device";

/// Install preview command.
pub const INSTALL_PREVIEW_URL: &str = "/securityconsole/install/preview";

/// Install preview result command.
pub const PREVIEW_RESULT_URL: &str = "/securityconsole/preview/result";

/// Converts a JSON object literal into a parameter map.
///
/// Panics if `value` is not an object.
pub fn params(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("parameters must be a JSON object, got {}", other),
    }
}

/// Firewall address fixtures
pub mod address_fixtures {
    use super::*;

    /// Host address object with a /32 mask
    pub fn host_object(name: &str, ip: &str) -> Value {
        json!({
            "name": name,
            "subnet": [ip, "255.255.255.255"],
            "type": "ipmask"
        })
    }

    /// Parameters adding one host object
    pub fn add_host_params(name: &str, ip: &str) -> Map<String, Value> {
        params(json!({
            "url": ADDRESS_URL,
            "data": [host_object(name, ip)]
        }))
    }

    /// Parameters addressing one host object by URL
    pub fn host_url_params(name: &str) -> Map<String, Value> {
        params(json!({ "url": format!("{}{}", ADDRESS_URL, name) }))
    }

    /// Free-form parameters adding several hosts in one batch
    pub fn batch_add_params(hosts: &[(&str, &str)]) -> Map<String, Value> {
        let data: Vec<Value> = hosts
            .iter()
            .map(|(name, ip)| json!({"url": ADDRESS_URL, "data": host_object(name, ip)}))
            .collect();
        params(json!({ "method": "add", "data": data }))
    }
}

/// Task and exec fixtures
pub mod task_fixtures {
    use super::*;

    /// Task status payload at a given completion percentage
    pub fn progress(task: u64, percent: u64) -> Value {
        let state = if percent >= 100 { "done" } else { "running" };
        json!({
            "id": task,
            "percent": percent,
            "state": state,
            "num_err": 0
        })
    }

    /// Task status payload reporting an error
    pub fn failed(task: u64, percent: u64) -> Value {
        json!({
            "id": task,
            "percent": percent,
            "state": "error",
            "num_err": 1
        })
    }

    /// Parameters registering a device with task tracking
    pub fn add_device_params() -> Map<String, Value> {
        params(json!({
            "url": ADD_DEVICE_URL,
            "data": {
                "adom": "root",
                "flags": ["create_task", "nonblocking"],
                "device": {
                    "sn": "FGT60F0123456789",
                    "os_type": "fos",
                    "mgmt_mode": "fmg",
                    "device action": "add_model"
                }
            },
            "track_task": true
        }))
    }

    /// Parameters previewing an install with task tracking
    pub fn install_preview_params() -> Map<String, Value> {
        params(json!({
            "url": INSTALL_PREVIEW_URL,
            "data": {
                "adom": "root",
                "scope": [{"name": "FGT2", "vdom": "root"}]
            },
            "track_task": true,
            "task_timeout": 120
        }))
    }
}
