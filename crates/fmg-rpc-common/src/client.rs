//! RPC client abstraction.
//!
//! The connector core talks to FortiManager only through [`RpcClient`].
//! Implementations supply the raw `call`/`free_form` primitives and report
//! whether the session runs in workspace mode; the per-verb helpers and the
//! workspace/task endpoints are provided on top of those.

use async_trait::async_trait;
use serde_json::Value;

use crate::adom::GLOBAL_ADOM;
use crate::error::ConnectorResult;
use crate::payload::Payload;

/// FortiManager JSON-RPC status codes the connector interprets.
pub mod codes {
    /// Request succeeded.
    pub const OK: i64 = 0;

    /// The URL is invalid; returned when locking an ADOM that does not exist.
    pub const INVALID_URL: i64 = -6;

    /// The command is not valid in this context; returned when locking an
    /// ADOM while workspace mode is disabled.
    pub const INVALID_COMMAND: i64 = -9;

    /// HTTP status reported for successful batched calls.
    pub const HTTP_OK: i64 = 200;
}

/// JSON-RPC method verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcMethod {
    /// Read objects.
    Get,
    /// Create objects.
    Add,
    /// Create or replace objects.
    Set,
    /// Remove objects.
    Delete,
    /// Run a command.
    Exec,
}

impl RpcMethod {
    /// Returns the method name as sent on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            RpcMethod::Get => "get",
            RpcMethod::Add => "add",
            RpcMethod::Set => "set",
            RpcMethod::Delete => "delete",
            RpcMethod::Exec => "exec",
        }
    }
}

/// Status code plus result data returned by a remote call.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcReply {
    /// Status code (`0` for single calls, HTTP status for batched calls).
    pub code: i64,
    /// Result data.
    pub data: Value,
}

impl RpcReply {
    /// Creates a reply.
    pub fn new(code: i64, data: Value) -> Self {
        Self { code, data }
    }

    /// Creates a successful reply.
    pub fn ok(data: Value) -> Self {
        Self::new(codes::OK, data)
    }

    /// Returns true if the code is [`codes::OK`].
    pub fn is_ok(&self) -> bool {
        self.code == codes::OK
    }
}

/// Server-side task identifier.
pub type TaskId = u64;

/// Workspace operations on an ADOM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkspaceOp {
    /// Acquire the exclusive lock.
    Lock,
    /// Persist staged changes.
    Commit,
    /// Release the lock.
    Unlock,
}

impl WorkspaceOp {
    /// Returns the URL suffix for this operation.
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkspaceOp::Lock => "lock",
            WorkspaceOp::Commit => "commit",
            WorkspaceOp::Unlock => "unlock",
        }
    }
}

/// Builds the workspace endpoint for an ADOM.
///
/// ```
/// use fmg_rpc_common::client::{workspace_url, WorkspaceOp};
///
/// assert_eq!(workspace_url("root", WorkspaceOp::Lock), "/dvmdb/adom/root/workspace/lock");
/// assert_eq!(workspace_url("global", WorkspaceOp::Commit), "/dvmdb/global/workspace/commit");
/// ```
pub fn workspace_url(adom: &str, op: WorkspaceOp) -> String {
    if adom == GLOBAL_ADOM {
        format!("/dvmdb/global/workspace/{}", op.as_str())
    } else {
        format!("/dvmdb/adom/{}/workspace/{}", adom, op.as_str())
    }
}

/// Builds the status endpoint for a task.
pub fn task_url(task: TaskId) -> String {
    format!("/task/task/{}", task)
}

/// Client for one authenticated FortiManager session.
///
/// Implementations must be safe to share across tasks; the connector never
/// wraps a client in a lock.
#[async_trait]
pub trait RpcClient: Send + Sync {
    /// Issues a single JSON-RPC request. `payload` fields are merged into
    /// the params object next to `url`.
    async fn call(&self, method: RpcMethod, url: &str, payload: &Payload)
        -> ConnectorResult<RpcReply>;

    /// Issues a batched request: `payload["data"]` holds the list of params
    /// objects, all sent with the same `method`.
    async fn free_form(&self, method: &str, payload: &Payload) -> ConnectorResult<RpcReply>;

    /// Returns true if the session must lock and commit ADOMs around
    /// mutations.
    fn uses_workspace(&self) -> bool;

    /// Reads objects.
    async fn get(&self, url: &str, payload: &Payload) -> ConnectorResult<RpcReply> {
        self.call(RpcMethod::Get, url, payload).await
    }

    /// Creates objects.
    async fn add(&self, url: &str, payload: &Payload) -> ConnectorResult<RpcReply> {
        self.call(RpcMethod::Add, url, payload).await
    }

    /// Creates or replaces objects.
    async fn set(&self, url: &str, payload: &Payload) -> ConnectorResult<RpcReply> {
        self.call(RpcMethod::Set, url, payload).await
    }

    /// Removes objects.
    async fn delete(&self, url: &str, payload: &Payload) -> ConnectorResult<RpcReply> {
        self.call(RpcMethod::Delete, url, payload).await
    }

    /// Runs a command.
    async fn execute(&self, url: &str, payload: &Payload) -> ConnectorResult<RpcReply> {
        self.call(RpcMethod::Exec, url, payload).await
    }

    /// Attempts to lock an ADOM once.
    async fn lock_adom(&self, adom: &str) -> ConnectorResult<RpcReply> {
        self.execute(&workspace_url(adom, WorkspaceOp::Lock), &Payload::new())
            .await
    }

    /// Commits staged changes in an ADOM.
    async fn commit_changes(&self, adom: &str) -> ConnectorResult<RpcReply> {
        self.execute(&workspace_url(adom, WorkspaceOp::Commit), &Payload::new())
            .await
    }

    /// Releases an ADOM lock.
    async fn unlock_adom(&self, adom: &str) -> ConnectorResult<RpcReply> {
        self.execute(&workspace_url(adom, WorkspaceOp::Unlock), &Payload::new())
            .await
    }

    /// Fetches the current status of a task.
    async fn task_status(&self, task: TaskId) -> ConnectorResult<RpcReply> {
        self.get(&task_url(task), &Payload::new()).await
    }

    /// Deletes a task.
    async fn delete_task(&self, task: TaskId) -> ConnectorResult<RpcReply> {
        self.delete(&task_url(task), &Payload::new()).await
    }
}
