//! HTTPS JSON-RPC transport for FortiManager.
//!
//! [`JsonRpcClient`] implements [`RpcClient`] over `reqwest`. One client is
//! one authenticated session: [`JsonRpcClient::connect`] logs in (or
//! configures the API key) and probes the workspace mode once, and
//! [`JsonRpcClient::logout`] ends the session. Server-side ADOM locks held by
//! the session are released by the controller on logout.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::{debug, info, instrument, warn};

use crate::client::{codes, RpcClient, RpcMethod, RpcReply};
use crate::config::{ConnectorConfig, Credentials};
use crate::error::{ConnectorError, ConnectorResult};
use crate::payload::{Payload, DATA_KEY};

/// Path of the JSON-RPC endpoint.
pub const JSONRPC_PATH: &str = "/jsonrpc";

/// Login URL.
pub const LOGIN_URL: &str = "/sys/login/user";

/// Logout URL.
pub const LOGOUT_URL: &str = "/sys/logout";

/// URL holding the system-wide workspace mode.
pub const SYSTEM_GLOBAL_URL: &str = "/cli/global/system/global";

/// Workspace mode field.
pub const WORKSPACE_MODE_FIELD: &str = "workspace-mode";

/// HTTP request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
enum Auth {
    Session(String),
    ApiKey(String),
}

/// JSON-RPC client for a single FortiManager session.
#[derive(Debug)]
pub struct JsonRpcClient {
    http: reqwest::Client,
    endpoint: String,
    auth: Auth,
    verbose: bool,
    debug: bool,
    workspace: bool,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    /// Opens a session against the configured controller.
    #[instrument(skip(config), fields(host = %config.server_host()))]
    pub async fn connect(config: &ConnectorConfig) -> ConnectorResult<Self> {
        config.validate()?;

        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(!config.verify_ssl)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ConnectorError::remote("connect", e.to_string()))?;

        let mut client = Self {
            http,
            endpoint: format!("https://{}{}", config.server_host(), JSONRPC_PATH),
            auth: Auth::ApiKey(String::new()),
            verbose: config.verbose_json,
            debug: config.debug_connection,
            workspace: false,
            next_id: AtomicU64::new(1),
        };

        client.auth = match config.credentials()? {
            Credentials::ApiKey(key) => Auth::ApiKey(key.to_string()),
            Credentials::UserPassword { username, password } => {
                Auth::Session(client.login(username, password).await?)
            }
        };

        client.workspace = client.detect_workspace_mode().await?;
        info!(
            endpoint = %client.endpoint,
            workspace = client.workspace,
            "Connected to FortiManager"
        );

        Ok(client)
    }

    /// Ends the session. API-key clients have no session to end.
    pub async fn logout(&self) -> ConnectorResult<()> {
        if let Auth::Session(_) = self.auth {
            let reply = self.execute(LOGOUT_URL, &Payload::new()).await?;
            if !reply.is_ok() {
                warn!(code = reply.code, "Logout returned non-zero status");
            }
        }
        Ok(())
    }

    async fn login(&self, username: &str, password: &str) -> ConnectorResult<String> {
        let params = json!([{
            "url": LOGIN_URL,
            "data": {"user": username, "passwd": password},
        }]);
        let body = self.post("exec", params, None).await?;

        let (code, message) = status_of(first_result(&body));
        if code != codes::OK {
            return Err(ConnectorError::remote(
                "login",
                format!("login rejected (code {}): {}", code, message),
            ));
        }

        body.get("session")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ConnectorError::remote("login", "response carried no session"))
    }

    async fn detect_workspace_mode(&self) -> ConnectorResult<bool> {
        let mut payload = Payload::new();
        payload.insert("fields".to_string(), json!([WORKSPACE_MODE_FIELD]));
        let reply = self.get(SYSTEM_GLOBAL_URL, &payload).await?;

        let enabled = match reply.data.get(WORKSPACE_MODE_FIELD) {
            Some(Value::Number(n)) => n.as_i64() != Some(0),
            Some(Value::String(s)) => s != "disabled",
            _ => false,
        };
        debug!(enabled, "Detected workspace mode");
        Ok(enabled)
    }

    async fn post(
        &self,
        method: &str,
        params: Value,
        session: Option<&str>,
    ) -> ConnectorResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut body = Map::new();
        body.insert("id".to_string(), json!(id));
        body.insert("method".to_string(), json!(method));
        body.insert("params".to_string(), params);
        if self.verbose {
            body.insert("verbose".to_string(), json!(1));
        }
        if let Some(session) = session {
            body.insert("session".to_string(), json!(session));
        }

        if self.debug {
            debug!(id, method, request = %redact(&body), "JSON-RPC request");
        }

        let mut request = self.http.post(&self.endpoint).json(&body);
        if let Auth::ApiKey(key) = &self.auth {
            if !key.is_empty() {
                request = request.bearer_auth(key);
            }
        }

        let response = request
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ConnectorError::remote(method, e.to_string()))?;

        let reply: Value = response
            .json()
            .await
            .map_err(|e| ConnectorError::remote(method, e.to_string()))?;

        if self.debug {
            debug!(id, method, response = %reply, "JSON-RPC response");
        }

        Ok(reply)
    }

    fn session(&self) -> Option<&str> {
        match &self.auth {
            Auth::Session(s) => Some(s.as_str()),
            Auth::ApiKey(_) => None,
        }
    }
}

#[async_trait]
impl RpcClient for JsonRpcClient {
    async fn call(
        &self,
        method: RpcMethod,
        url: &str,
        payload: &Payload,
    ) -> ConnectorResult<RpcReply> {
        let mut params = payload.clone();
        params.insert("url".to_string(), json!(url));

        let body = self
            .post(method.as_str(), json!([params]), self.session())
            .await?;

        let result = first_result(&body)
            .ok_or_else(|| ConnectorError::remote(method.as_str(), "response carried no result"))?;
        let (code, _) = status_of(Some(result));

        // Calls without a data section (e.g. delete) return the result itself.
        let data = match result.get(DATA_KEY) {
            Some(data) => data.clone(),
            None => result.clone(),
        };

        Ok(RpcReply::new(code, data))
    }

    async fn free_form(&self, method: &str, payload: &Payload) -> ConnectorResult<RpcReply> {
        let params = payload
            .get(DATA_KEY)
            .filter(|d| d.is_array())
            .cloned()
            .ok_or_else(|| ConnectorError::invalid_shape("Payload must be a list"))?;

        let body = self.post(method, params, self.session()).await?;
        let results = body.get("result").cloned().unwrap_or(Value::Array(vec![]));

        Ok(RpcReply::new(codes::HTTP_OK, results))
    }

    fn uses_workspace(&self) -> bool {
        self.workspace
    }
}

fn first_result(body: &Value) -> Option<&Value> {
    body.get("result").and_then(|r| r.get(0))
}

fn status_of(result: Option<&Value>) -> (i64, String) {
    let status = result.and_then(|r| r.get("status"));
    let code = status
        .and_then(|s| s.get("code"))
        .and_then(Value::as_i64)
        .unwrap_or(-1);
    let message = status
        .and_then(|s| s.get("message"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    (code, message)
}

/// Masks login passwords and session tokens for debug logging.
fn redact(body: &Map<String, Value>) -> Value {
    let mut copy = Value::Object(body.clone());
    if let Some(session) = copy.get_mut("session") {
        *session = json!("***");
    }
    if let Some(params) = copy.get_mut("params").and_then(Value::as_array_mut) {
        for param in params {
            if let Some(passwd) = param.pointer_mut("/data/passwd") {
                *passwd = json!("***");
            }
        }
    }
    copy
}
