//! Common building blocks for the FortiManager JSON-RPC connector.
//!
//! This crate holds everything the request pipeline shares:
//!
//! - [`payload`]: Normalization of caller `data` into a JSON object
//! - [`adom`]: ADOM resolution from the request URL and payload
//! - [`client`]: The [`RpcClient`] trait the pipeline calls through
//! - [`jsonrpc`]: `reqwest` implementation of [`RpcClient`]
//! - [`config`]: Connection configuration
//! - [`error`]: Error types shared by all connector crates
//!
//! # Example
//!
//! ```
//! use fmg_rpc_common::{normalize_payload, resolve_adom};
//! use serde_json::json;
//!
//! let payload = normalize_payload(json!({"adom": "root"})).unwrap();
//! assert_eq!(resolve_adom("/dvm/cmd/add/device", &payload), "root");
//! ```

pub mod adom;
pub mod client;
pub mod config;
pub mod error;
pub mod jsonrpc;
pub mod payload;

// Re-export commonly used items at crate root
pub use adom::{resolve_adom, GLOBAL_ADOM};
pub use client::{codes, RpcClient, RpcMethod, RpcReply, TaskId};
pub use config::{AuthMethod, ConnectorConfig, Credentials};
pub use error::{ConnectorError, ConnectorResult, LockFailureReason};
pub use jsonrpc::JsonRpcClient;
pub use payload::{normalize_payload, Payload};
