//! In-memory FortiManager.
//!
//! [`FakeFmg`] models the controller state the connector relies on: ADOM
//! workspace locks owned by sessions, stored objects, scripted exec replies,
//! and task progress. Each [`FakeSession`] is one authenticated session and
//! implements [`RpcClient`], so concurrent requests can contend for the same
//! ADOM lock exactly as they would against a real controller.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use fmg_rpc_common::client::task_url;
use fmg_rpc_common::payload::DATA_KEY;
use fmg_rpc_common::{
    codes, ConnectorError, ConnectorResult, Payload, RpcClient, RpcMethod, RpcReply, TaskId,
    GLOBAL_ADOM,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tracing::debug;

/// Lock refused because another session holds it.
pub const LOCKED_BY_OTHER: i64 = -10;

/// Commit or unlock attempted without holding the lock.
pub const NOT_LOCKED: i64 = -11;

/// Object does not exist.
pub const OBJECT_NOT_FOUND: i64 = -3;

/// Workspace behavior of the fake controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkspaceMode {
    /// Sessions report no workspace; the connector never locks.
    Disabled,
    /// ADOMs must be locked, committed, and unlocked.
    Enabled,
    /// Sessions report workspace mode but workspace commands answer
    /// "invalid command", as when verbose responses confuse mode detection.
    Misreported,
}

/// One call observed by the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    /// Session that issued the call.
    pub session: u64,
    /// JSON-RPC method (or "logout").
    pub method: String,
    /// Target URL.
    pub url: String,
}

impl JournalEntry {
    /// Returns `"<method> <url>"`, handy for order assertions.
    pub fn describe(&self) -> String {
        format!("{} {}", self.method, self.url)
    }
}

#[derive(Debug)]
struct ControllerState {
    mode: WorkspaceMode,
    adoms: HashSet<String>,
    locks: HashMap<String, u64>,
    objects: BTreeMap<String, Value>,
    exec_replies: HashMap<String, RpcReply>,
    tasks: HashMap<TaskId, VecDeque<Value>>,
    lock_script: HashMap<String, VecDeque<i64>>,
    failing_urls: HashSet<String>,
    journal: Vec<JournalEntry>,
    next_session: u64,
}

/// Shared in-memory controller.
#[derive(Debug, Clone)]
pub struct FakeFmg {
    state: Arc<Mutex<ControllerState>>,
}

impl Default for FakeFmg {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeFmg {
    /// Creates a workspace-enabled controller with the `root` ADOM.
    pub fn new() -> Self {
        let state = ControllerState {
            mode: WorkspaceMode::Enabled,
            adoms: HashSet::from(["root".to_string()]),
            locks: HashMap::new(),
            objects: BTreeMap::new(),
            exec_replies: HashMap::new(),
            tasks: HashMap::new(),
            lock_script: HashMap::new(),
            failing_urls: HashSet::new(),
            journal: Vec::new(),
            next_session: 1,
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Sets the workspace mode.
    pub fn with_mode(self, mode: WorkspaceMode) -> Self {
        self.state.lock().mode = mode;
        self
    }

    /// Adds an ADOM.
    pub fn with_adom(self, adom: &str) -> Self {
        self.state.lock().adoms.insert(adom.to_string());
        self
    }

    /// Scripts the reply to an exec on `url`.
    pub fn script_exec(&self, url: &str, reply: RpcReply) {
        self.state
            .lock()
            .exec_replies
            .insert(url.to_string(), reply);
    }

    /// Scripts the successive status payloads of a task. The last payload
    /// repeats once the script is exhausted.
    pub fn script_task(&self, task: TaskId, progress: Vec<Value>) {
        self.state.lock().tasks.insert(task, progress.into());
    }

    /// Scripts the codes returned by the next lock attempts on `adom`. A
    /// scripted `0` takes the lock; any other code is returned as-is.
    pub fn script_lock_codes(&self, adom: &str, lock_codes: Vec<i64>) {
        self.state
            .lock()
            .lock_script
            .insert(adom.to_string(), lock_codes.into());
    }

    /// Makes every call to `url` fail at the transport level.
    pub fn fail_url(&self, url: &str) {
        self.state.lock().failing_urls.insert(url.to_string());
    }

    /// Stores an object directly.
    pub fn insert_object(&self, url: &str, object: Value) {
        self.state
            .lock()
            .objects
            .insert(url.trim_end_matches('/').to_string(), object);
    }

    /// Opens a new session.
    pub fn session(&self) -> FakeSession {
        let id = {
            let mut state = self.state.lock();
            let id = state.next_session;
            state.next_session += 1;
            id
        };
        FakeSession {
            id,
            controller: self.clone(),
        }
    }

    /// Returns every call observed so far.
    pub fn journal(&self) -> Vec<JournalEntry> {
        self.state.lock().journal.clone()
    }

    /// Returns the calls of one session as `"<method> <url>"` strings.
    pub fn session_calls(&self, session: u64) -> Vec<String> {
        self.state
            .lock()
            .journal
            .iter()
            .filter(|e| e.session == session)
            .map(JournalEntry::describe)
            .collect()
    }

    /// Counts the calls matching a method and URL.
    pub fn count(&self, method: &str, url: &str) -> usize {
        self.state
            .lock()
            .journal
            .iter()
            .filter(|e| e.method == method && e.url == url)
            .count()
    }

    /// Returns the session holding the lock on `adom`.
    pub fn lock_holder(&self, adom: &str) -> Option<u64> {
        self.state.lock().locks.get(adom).copied()
    }

    /// Returns a stored object.
    pub fn object(&self, url: &str) -> Option<Value> {
        self.state
            .lock()
            .objects
            .get(url.trim_end_matches('/'))
            .cloned()
    }

    /// Returns true if the task still exists.
    pub fn has_task(&self, task: TaskId) -> bool {
        self.state.lock().tasks.contains_key(&task)
    }

    fn uses_workspace(&self) -> bool {
        self.state.lock().mode != WorkspaceMode::Disabled
    }

    fn handle(
        &self,
        session: u64,
        method: RpcMethod,
        url: &str,
        payload: &Payload,
    ) -> ConnectorResult<RpcReply> {
        let mut state = self.state.lock();
        state.journal.push(JournalEntry {
            session,
            method: method.as_str().to_string(),
            url: url.to_string(),
        });

        if state.failing_urls.contains(url) {
            return Err(ConnectorError::remote(
                method.as_str(),
                format!("connection reset while calling {}", url),
            ));
        }

        if let Some((adom, op)) = parse_workspace_url(url) {
            return Ok(state.workspace(session, &adom, &op, url));
        }

        if let Some(task) = parse_task_url(url) {
            return Ok(state.task(method, task, url));
        }

        let reply = match method {
            RpcMethod::Get => state.get(url),
            RpcMethod::Add | RpcMethod::Set => state.store(url, payload),
            RpcMethod::Delete => state.remove(url),
            RpcMethod::Exec => state.exec(url),
        };
        debug!(session, method = method.as_str(), url, code = reply.code, "Fake FMG call");
        Ok(reply)
    }

    fn end_session(&self, session: u64) {
        let mut state = self.state.lock();
        state.locks.retain(|_, holder| *holder != session);
        state.journal.push(JournalEntry {
            session,
            method: "logout".to_string(),
            url: "/sys/logout".to_string(),
        });
    }
}

impl ControllerState {
    fn workspace(&mut self, session: u64, adom: &str, op: &str, url: &str) -> RpcReply {
        if self.mode != WorkspaceMode::Enabled {
            return status_reply(codes::INVALID_COMMAND, "Command invalid", url);
        }
        if adom != GLOBAL_ADOM && !self.adoms.contains(adom) {
            return status_reply(codes::INVALID_URL, "Invalid url", url);
        }

        let holder = self.locks.get(adom).copied();
        match op {
            "lock" => {
                let scripted = self.lock_script.get_mut(adom).and_then(VecDeque::pop_front);
                if let Some(code) = scripted.filter(|c| *c != codes::OK) {
                    return status_reply(code, "Scripted lock reply", url);
                }
                match holder {
                    Some(other) if other != session => {
                        status_reply(LOCKED_BY_OTHER, "Workspace is locked by another session", url)
                    }
                    _ => {
                        self.locks.insert(adom.to_string(), session);
                        status_reply(codes::OK, "OK", url)
                    }
                }
            }
            "commit" if holder == Some(session) => status_reply(codes::OK, "OK", url),
            "unlock" if holder == Some(session) => {
                self.locks.remove(adom);
                status_reply(codes::OK, "OK", url)
            }
            "commit" | "unlock" => status_reply(NOT_LOCKED, "Workspace is not locked", url),
            _ => status_reply(codes::INVALID_URL, "Invalid url", url),
        }
    }

    fn task(&mut self, method: RpcMethod, task: TaskId, url: &str) -> RpcReply {
        match method {
            RpcMethod::Delete => match self.tasks.remove(&task) {
                Some(_) => status_reply(codes::OK, "OK", url),
                None => status_reply(OBJECT_NOT_FOUND, "Object does not exist", url),
            },
            _ => {
                let Some(progress) = self.tasks.get_mut(&task) else {
                    return status_reply(OBJECT_NOT_FOUND, "Object does not exist", url);
                };
                let current = if progress.len() > 1 {
                    progress.pop_front()
                } else {
                    progress.front().cloned()
                };
                RpcReply::ok(current.unwrap_or(Value::Null))
            }
        }
    }

    fn get(&self, url: &str) -> RpcReply {
        let key = url.trim_end_matches('/');
        if let Some(object) = self.objects.get(key) {
            return RpcReply::ok(object.clone());
        }
        if key == "/sys/status" {
            return RpcReply::ok(json!({"Hostname": "fmg-fake", "Version": "v7.4.3"}));
        }

        let prefix = format!("{}/", key);
        let children: Vec<Value> = self
            .objects
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .map(|(_, v)| v.clone())
            .collect();
        if children.is_empty() {
            status_reply(OBJECT_NOT_FOUND, "Object does not exist", url)
        } else {
            RpcReply::ok(Value::Array(children))
        }
    }

    fn store(&mut self, url: &str, payload: &Payload) -> RpcReply {
        let items: Vec<Value> = match payload.get(DATA_KEY) {
            Some(Value::Array(items)) => items.clone(),
            Some(item @ Value::Object(_)) => vec![item.clone()],
            _ => Vec::new(),
        };

        let base = url.trim_end_matches('/');
        let mut first_name = None;
        for item in items {
            let Some(name) = item.get("name").and_then(Value::as_str).map(str::to_string) else {
                continue;
            };
            first_name.get_or_insert_with(|| name.clone());
            self.objects.insert(format!("{}/{}", base, name), item);
        }

        match first_name {
            Some(name) => RpcReply::ok(json!({ "name": name })),
            None => RpcReply::ok(json!({})),
        }
    }

    fn remove(&mut self, url: &str) -> RpcReply {
        match self.objects.remove(url.trim_end_matches('/')) {
            Some(_) => status_reply(codes::OK, "OK", url),
            None => status_reply(OBJECT_NOT_FOUND, "Object does not exist", url),
        }
    }

    fn exec(&self, url: &str) -> RpcReply {
        self.exec_replies
            .get(url)
            .cloned()
            .unwrap_or_else(|| RpcReply::ok(json!({})))
    }
}

/// One session on a [`FakeFmg`].
#[derive(Debug, Clone)]
pub struct FakeSession {
    id: u64,
    controller: FakeFmg,
}

impl FakeSession {
    /// Returns the session id used in the journal.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Logs the session out, releasing every lock it holds.
    pub fn end(&self) {
        self.controller.end_session(self.id);
    }
}

#[async_trait]
impl RpcClient for FakeSession {
    async fn call(
        &self,
        method: RpcMethod,
        url: &str,
        payload: &Payload,
    ) -> ConnectorResult<RpcReply> {
        self.controller.handle(self.id, method, url, payload)
    }

    async fn free_form(&self, method: &str, payload: &Payload) -> ConnectorResult<RpcReply> {
        let items = match payload.get(DATA_KEY) {
            Some(Value::Array(items)) => items.clone(),
            _ => return Err(ConnectorError::invalid_shape("Payload must be a list")),
        };

        let mut results = Vec::with_capacity(items.len());
        for item in items {
            let mut params = match item {
                Value::Object(map) => map,
                other => return Err(ConnectorError::invalid_shape(format!(
                    "sub-request must be an object, got {}",
                    other
                ))),
            };
            let url = params
                .remove("url")
                .and_then(|u| u.as_str().map(str::to_string))
                .unwrap_or_default();

            let reply = match parse_method(method) {
                Some(verb) => self.controller.handle(self.id, verb, &url, &params)?,
                None => status_reply(codes::INVALID_COMMAND, "Unknown method", &url),
            };
            results.push(json!({
                "status": {"code": reply.code},
                "url": url,
                "data": reply.data,
            }));
        }

        Ok(RpcReply::new(codes::HTTP_OK, Value::Array(results)))
    }

    fn uses_workspace(&self) -> bool {
        self.controller.uses_workspace()
    }
}

fn parse_method(method: &str) -> Option<RpcMethod> {
    match method {
        "get" => Some(RpcMethod::Get),
        "add" => Some(RpcMethod::Add),
        "set" | "update" => Some(RpcMethod::Set),
        "delete" => Some(RpcMethod::Delete),
        "exec" | "execute" => Some(RpcMethod::Exec),
        _ => None,
    }
}

fn parse_workspace_url(url: &str) -> Option<(String, String)> {
    let url = url.trim_end_matches('/');
    if let Some(op) = url.strip_prefix("/dvmdb/global/workspace/") {
        return Some((GLOBAL_ADOM.to_string(), op.to_string()));
    }
    let rest = url.strip_prefix("/dvmdb/adom/")?;
    let (adom, op) = rest.split_once("/workspace/")?;
    Some((adom.to_string(), op.to_string()))
}

fn parse_task_url(url: &str) -> Option<TaskId> {
    let id = url.trim_end_matches('/').strip_prefix("/task/task/")?;
    let task: TaskId = id.parse().ok()?;
    (task_url(task) == url.trim_end_matches('/')).then_some(task)
}

fn status_reply(code: i64, message: &str, url: &str) -> RpcReply {
    RpcReply::new(
        code,
        json!({"status": {"code": code, "message": message}, "url": url}),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_workspace_url() {
        assert_eq!(
            parse_workspace_url("/dvmdb/adom/root/workspace/lock"),
            Some(("root".to_string(), "lock".to_string()))
        );
        assert_eq!(
            parse_workspace_url("/dvmdb/global/workspace/commit/"),
            Some(("global".to_string(), "commit".to_string()))
        );
        assert_eq!(parse_workspace_url("/dvmdb/adom/root"), None);
    }

    #[test]
    fn test_parse_task_url() {
        assert_eq!(parse_task_url("/task/task/7"), Some(7));
        assert_eq!(parse_task_url("/task/task/7/line"), None);
        assert_eq!(parse_task_url("/task/task/abc"), None);
    }

    #[tokio::test]
    async fn test_lock_contention_between_sessions() {
        let fmg = FakeFmg::new();
        let a = fmg.session();
        let b = fmg.session();

        assert_eq!(a.lock_adom("root").await.unwrap().code, codes::OK);
        assert_eq!(b.lock_adom("root").await.unwrap().code, LOCKED_BY_OTHER);

        a.end();
        assert_eq!(fmg.lock_holder("root"), None);
        assert_eq!(b.lock_adom("root").await.unwrap().code, codes::OK);
        assert_eq!(fmg.lock_holder("root"), Some(b.id()));
    }

    #[tokio::test]
    async fn test_unknown_adom_lock() {
        let fmg = FakeFmg::new();
        let reply = fmg.session().lock_adom("missing").await.unwrap();
        assert_eq!(reply.code, codes::INVALID_URL);
    }

    #[tokio::test]
    async fn test_misreported_workspace() {
        let fmg = FakeFmg::new().with_mode(WorkspaceMode::Misreported);
        let session = fmg.session();
        assert!(session.uses_workspace());
        assert_eq!(
            session.lock_adom("root").await.unwrap().code,
            codes::INVALID_COMMAND
        );
    }

    #[tokio::test]
    async fn test_store_and_get() {
        let fmg = FakeFmg::new();
        let session = fmg.session();
        let mut payload = Payload::new();
        payload.insert(
            DATA_KEY.to_string(),
            json!([{"name": "host-1", "type": "ipmask"}]),
        );

        let reply = session
            .add("/pm/config/adom/root/obj/firewall/address/", &payload)
            .await
            .unwrap();
        assert_eq!(reply.data, json!({"name": "host-1"}));

        let reply = session
            .get("/pm/config/adom/root/obj/firewall/address/host-1", &Payload::new())
            .await
            .unwrap();
        assert_eq!(reply.data["type"], json!("ipmask"));
    }

    #[tokio::test]
    async fn test_task_script_repeats_last() {
        let fmg = FakeFmg::new();
        fmg.script_task(7, vec![json!({"percent": 10}), json!({"percent": 100})]);
        let session = fmg.session();

        assert_eq!(session.task_status(7).await.unwrap().data["percent"], json!(10));
        assert_eq!(session.task_status(7).await.unwrap().data["percent"], json!(100));
        assert_eq!(session.task_status(7).await.unwrap().data["percent"], json!(100));
    }
}
