//! Connector actions.

use std::fmt;
use std::str::FromStr;

use fmg_rpc_common::{ConnectorError, RpcMethod};

/// Action requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Read objects.
    Get,
    /// Create objects.
    Add,
    /// Create or replace objects.
    Set,
    /// Remove objects.
    Delete,
    /// Run a command, optionally tracking the task it starts.
    Execute,
    /// Batch of sub-requests sharing one method.
    FreeForm,
}

impl Action {
    /// All actions, in catalog order.
    pub const ALL: [Action; 6] = [
        Action::Get,
        Action::Add,
        Action::Set,
        Action::Delete,
        Action::Execute,
        Action::FreeForm,
    ];

    /// Returns the action name used in response keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Get => "get",
            Action::Add => "add",
            Action::Set => "set",
            Action::Delete => "delete",
            Action::Execute => "execute",
            Action::FreeForm => "free_form",
        }
    }

    /// Returns true for actions that never lock or commit.
    pub fn is_read(&self) -> bool {
        matches!(self, Action::Get)
    }

    /// Returns the JSON-RPC verb for single-call actions.
    ///
    /// Free-form requests carry their own method and return `None`.
    pub fn rpc_method(&self) -> Option<RpcMethod> {
        match self {
            Action::Get => Some(RpcMethod::Get),
            Action::Add => Some(RpcMethod::Add),
            Action::Set => Some(RpcMethod::Set),
            Action::Delete => Some(RpcMethod::Delete),
            Action::Execute => Some(RpcMethod::Exec),
            Action::FreeForm => None,
        }
    }

    /// Returns the key holding the primary result in a response.
    pub fn response_key(&self) -> String {
        format!("{}_response", self.as_str())
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = ConnectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| ConnectorError::invalid_config("action", format!("unknown action '{}'", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_names_round_trip() {
        for action in Action::ALL {
            assert_eq!(action.as_str().parse::<Action>().unwrap(), action);
        }
    }

    #[test]
    fn test_unknown_action() {
        assert!("update".parse::<Action>().is_err());
    }

    #[test]
    fn test_only_get_is_read() {
        assert!(Action::Get.is_read());
        assert!(!Action::Execute.is_read());
        assert!(!Action::FreeForm.is_read());
    }

    #[test]
    fn test_rpc_method_table() {
        assert_eq!(Action::Execute.rpc_method(), Some(RpcMethod::Exec));
        assert_eq!(Action::Set.rpc_method(), Some(RpcMethod::Set));
        assert_eq!(Action::FreeForm.rpc_method(), None);
    }

    #[test]
    fn test_response_key() {
        assert_eq!(Action::Add.response_key(), "add_response");
        assert_eq!(Action::FreeForm.response_key(), "free_form_response");
    }
}
