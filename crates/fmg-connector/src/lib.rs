//! FortiManager JSON-RPC connector.
//!
//! Turns an abstract request ("add these objects", "run this command and
//! wait for its task") into the sequence of calls a workspace-mode
//! FortiManager expects:
//!
//! - [`lock`]: ADOM lock acquisition with randomized backoff
//! - [`dispatch`]: One collaborator call per request
//! - [`task`]: Task polling under layered timeouts
//! - [`special_case`]: Follow-up calls for URLs whose result lives elsewhere
//! - [`workspace`]: Commit and unlock
//! - [`connector`]: The pipeline tying the above together
//! - [`settings`]: TOML configuration
//!
//! # Example
//!
//! ```no_run
//! use fmg_connector::{Action, Connector};
//! use fmg_rpc_common::{ConnectorConfig, JsonRpcClient};
//! use serde_json::json;
//!
//! # async fn run(config: ConnectorConfig) -> fmg_rpc_common::ConnectorResult<()> {
//! let client = JsonRpcClient::connect(&config).await?;
//! let connector = Connector::new(client);
//!
//! let params = json!({
//!     "url": "/pm/config/adom/root/obj/firewall/address",
//!     "data": [{"name": "host-1", "subnet": ["10.0.0.1", "255.255.255.255"]}]
//! });
//! let response = connector
//!     .perform(Action::Add, params.as_object().expect("object"))
//!     .await?;
//! println!("{}", response.to_json());
//!
//! connector.client().logout().await?;
//! # Ok(())
//! # }
//! ```

pub mod action;
pub mod connector;
pub mod dispatch;
pub mod lock;
pub mod request;
pub mod response;
pub mod settings;
pub mod shutdown;
pub mod special_case;
pub mod task;
pub mod workspace;

// Re-export commonly used items at crate root
pub use action::Action;
pub use connector::Connector;
pub use lock::{LockCoordinator, LockOutcome, RetryPolicy};
pub use request::Request;
pub use response::ActionResponse;
pub use settings::{Settings, TuningConfig};
pub use task::{TaskOutcome, TaskState, TaskTracker, TimeoutKind, TimeoutPolicy, TrackerSettings};
