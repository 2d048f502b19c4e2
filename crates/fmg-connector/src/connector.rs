//! Request pipeline.
//!
//! [`Connector`] runs one request end to end:
//!
//! ```text
//! normalize → resolve ADOM → lock → dispatch → track task
//!           → special-case follow-up → commit / unlock
//! ```
//!
//! Locking only happens for mutating actions on workspace-mode sessions.
//! A tracked `execute` keeps its lock until tracking and the follow-up are
//! done, then commits and unlocks. Every other mutation commits right after
//! dispatch and leaves the lock with the session, which releases it on the
//! next request or at logout.

use fmg_rpc_common::{resolve_adom, ConnectorError, ConnectorResult, Payload, RpcClient};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::action::Action;
use crate::dispatch::dispatch;
use crate::lock::{LockCoordinator, LockOutcome, RetryPolicy};
use crate::request::Request;
use crate::response::ActionResponse;
use crate::special_case::augment;
use crate::task::{extract_task_id, TaskTracker, TrackerSettings};
use crate::workspace::Workspace;

/// URL used by [`Connector::check_health`].
pub const STATUS_URL: &str = "/sys/status";

/// Orchestrates requests over one [`RpcClient`] session.
#[derive(Debug)]
pub struct Connector<C> {
    client: C,
    locks: LockCoordinator,
    tracker: TaskTracker,
    cancel: CancellationToken,
}

impl<C: RpcClient> Connector<C> {
    /// Creates a connector with default retry and polling settings.
    pub fn new(client: C) -> Self {
        let cancel = CancellationToken::new();
        Self {
            client,
            locks: LockCoordinator::new(RetryPolicy::default(), cancel.clone()),
            tracker: TaskTracker::new(TrackerSettings::default(), cancel.clone()),
            cancel,
        }
    }

    /// Replaces the lock retry policy.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.locks = LockCoordinator::new(policy, self.cancel.clone());
        self
    }

    /// Replaces the task polling settings.
    pub fn with_tracker_settings(mut self, settings: TrackerSettings) -> Self {
        self.tracker = TaskTracker::new(settings, self.cancel.clone());
        self
    }

    /// Uses `cancel` to interrupt lock backoff and task polling.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.locks = LockCoordinator::new(*self.locks.policy(), cancel.clone());
        self.tracker = TaskTracker::new(*self.tracker.settings(), cancel.clone());
        self.cancel = cancel;
        self
    }

    /// Returns the underlying client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Consumes the connector, returning the client.
    pub fn into_client(self) -> C {
        self.client
    }

    /// Returns the cancellation token.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Performs `action` with the caller's parameters.
    pub async fn perform(
        &self,
        action: Action,
        params: &Map<String, Value>,
    ) -> ConnectorResult<ActionResponse> {
        let request = Request::from_params(action, params)?;
        self.execute(&request).await
    }

    /// Runs a validated request through the pipeline.
    #[instrument(skip(self, request), fields(action = %request.action, url = %request.url))]
    pub async fn execute(&self, request: &Request) -> ConnectorResult<ActionResponse> {
        let adom = resolve_adom(&request.url, &request.payload);
        debug!(adom = %adom, "Resolved ADOM");

        let workspace = if !request.action.is_read() && self.client.uses_workspace() {
            match self.locks.acquire(&self.client, &adom).await? {
                LockOutcome::Acquired => Some(Workspace::new(&self.client, adom.as_str())),
                LockOutcome::NotRequired => None,
            }
        } else {
            None
        };

        let reply = dispatch(&self.client, request).await?;

        let task_id = if request.action == Action::Execute && request.track_task {
            extract_task_id(&reply.data)
        } else {
            None
        };

        if let (Some(workspace), None) = (&workspace, task_id) {
            workspace.commit().await?;
        }

        let mut response = ActionResponse::new(request.action, reply.data, reply.code);

        if let Some(task) = task_id {
            info!(task, "Tracking task");
            let outcome = self.tracker.track(&self.client, task, &request.timeouts).await?;
            response = response.with_task(outcome);
        }

        if let Some(data) = augment(&self.client, request).await? {
            response = response.with_special_case(data);
        }

        if let (Some(workspace), Some(_)) = (&workspace, task_id) {
            workspace.commit_and_unlock().await?;
        }

        Ok(response)
    }

    /// Checks that the controller answers a status request.
    #[instrument(skip(self))]
    pub async fn check_health(&self) -> ConnectorResult<Value> {
        let reply = self.client.get(STATUS_URL, &Payload::new()).await?;
        if !reply.is_ok() {
            return Err(ConnectorError::remote(
                "health check",
                format!("{} returned code {}", STATUS_URL, reply.code),
            ));
        }
        info!("Controller is reachable");
        Ok(reply.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fmg_rpc_common::RpcReply;
    use fmg_rpc_test::address_fixtures::{add_host_params, host_url_params};
    use fmg_rpc_test::task_fixtures::{add_device_params, progress};
    use fmg_rpc_test::{FakeFmg, WorkspaceMode, ADD_DEVICE_URL, ADDRESS_URL};
    use serde_json::json;

    #[tokio::test]
    async fn test_get_never_locks() {
        let fmg = FakeFmg::new();
        fmg.insert_object(&format!("{}host-1", ADDRESS_URL), json!({"name": "host-1"}));
        let connector = Connector::new(fmg.session());

        let response = connector
            .perform(Action::Get, &host_url_params("host-1"))
            .await
            .unwrap();

        assert_eq!(response.status(), 0);
        assert_eq!(response.result()["name"], json!("host-1"));
        assert_eq!(fmg.journal().len(), 1);
    }

    #[tokio::test]
    async fn test_disabled_workspace_skips_lock_and_commit() {
        let fmg = FakeFmg::new().with_mode(WorkspaceMode::Disabled);
        let connector = Connector::new(fmg.session());

        connector
            .perform(Action::Add, &add_host_params("host-1", "1.2.3.4"))
            .await
            .unwrap();

        assert_eq!(
            fmg.session_calls(connector.client().id()),
            vec![format!("add {}", ADDRESS_URL)]
        );
    }

    #[tokio::test]
    async fn test_bypass_skips_commit() {
        let fmg = FakeFmg::new().with_mode(WorkspaceMode::Misreported);
        let connector = Connector::new(fmg.session());

        connector
            .perform(Action::Add, &add_host_params("host-1", "1.2.3.4"))
            .await
            .unwrap();

        assert_eq!(
            fmg.session_calls(connector.client().id()),
            vec![
                "exec /dvmdb/adom/root/workspace/lock".to_string(),
                format!("add {}", ADDRESS_URL),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_untracked_execute_commits_without_unlock() {
        let fmg = FakeFmg::new();
        fmg.script_exec(ADD_DEVICE_URL, RpcReply::ok(json!({"task": 7})));
        let connector = Connector::new(fmg.session());
        let mut params = add_device_params();
        params.remove("track_task");

        let response = connector.perform(Action::Execute, &params).await.unwrap();

        assert!(response.task().is_none());
        assert_eq!(fmg.count("get", "/task/task/7"), 0);
        assert_eq!(fmg.lock_holder("root"), Some(connector.client().id()));
        assert_eq!(fmg.count("exec", "/dvmdb/adom/root/workspace/commit"), 1);
        assert_eq!(fmg.count("exec", "/dvmdb/adom/root/workspace/unlock"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tracked_execute_without_task_id() {
        let fmg = FakeFmg::new();
        fmg.script_exec(ADD_DEVICE_URL, RpcReply::ok(json!({"device": "FGT"})));
        let connector = Connector::new(fmg.session());

        let response = connector
            .perform(Action::Execute, &add_device_params())
            .await
            .unwrap();

        assert!(response.task().is_none());
        assert_eq!(response.status(), 0);
        assert_eq!(fmg.count("exec", "/dvmdb/adom/root/workspace/commit"), 1);
        assert_eq!(fmg.lock_holder("root"), Some(connector.client().id()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tracked_execute_unlocks() {
        let fmg = FakeFmg::new();
        fmg.script_exec(ADD_DEVICE_URL, RpcReply::ok(json!({"taskid": "7"})));
        fmg.script_task(7, vec![progress(7, 30), progress(7, 100)]);
        let connector = Connector::new(fmg.session());

        let response = connector
            .perform(Action::Execute, &add_device_params())
            .await
            .unwrap();

        assert!(response.task().unwrap().is_completed());
        assert_eq!(fmg.lock_holder("root"), None);
    }

    #[tokio::test]
    async fn test_input_errors_send_nothing() {
        let fmg = FakeFmg::new();
        let connector = Connector::new(fmg.session());

        let err = connector
            .perform(Action::Add, &fmg_rpc_test::params(json!({"url": ADDRESS_URL, "data": true})))
            .await
            .unwrap_err();

        assert!(err.is_input_error());
        assert!(fmg.journal().is_empty());
    }

    #[tokio::test]
    async fn test_check_health() {
        let fmg = FakeFmg::new();
        let connector = Connector::new(fmg.session());

        let status = connector.check_health().await.unwrap();

        assert_eq!(status["Hostname"], json!("fmg-fake"));
        assert_eq!(fmg.count("get", STATUS_URL), 1);
    }

    #[tokio::test]
    async fn test_check_health_failure() {
        let fmg = FakeFmg::new();
        fmg.fail_url(STATUS_URL);
        let connector = Connector::new(fmg.session());

        let err = connector.check_health().await.unwrap_err();

        assert!(matches!(err, ConnectorError::RemoteCallFailed { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_cancellation_reaches_lock_backoff() {
        let fmg = FakeFmg::new();
        let holder = fmg.session();
        holder.lock_adom("root").await.unwrap();

        let cancel = CancellationToken::new();
        let connector = Connector::new(fmg.session()).with_cancellation(cancel.clone());
        cancel.cancel();

        let err = connector
            .perform(Action::Add, &add_host_params("host-1", "1.2.3.4"))
            .await
            .unwrap_err();

        assert!(matches!(err, ConnectorError::Cancelled { .. }));
        assert_eq!(fmg.count("add", ADDRESS_URL), 0);
    }
}
