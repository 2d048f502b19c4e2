//! Workspace commit and release.
//!
//! A [`Workspace`] exists only while the request holds an ADOM lock. It
//! issues the commit and unlock calls that close the transaction. Non-zero
//! codes are logged and reported back, never raised.

use fmg_rpc_common::{ConnectorResult, RpcClient};
use tracing::{info, instrument, warn};

/// An ADOM locked by the current request.
#[derive(Debug)]
pub struct Workspace<'a, C: ?Sized> {
    client: &'a C,
    adom: &'a str,
}

impl<'a, C> Workspace<'a, C>
where
    C: RpcClient + ?Sized,
{
    /// Wraps an ADOM whose lock was just acquired.
    pub fn new(client: &'a C, adom: &'a str) -> Self {
        Self { client, adom }
    }

    /// Returns the locked ADOM.
    pub fn adom(&self) -> &str {
        self.adom
    }

    /// Commits staged changes. Returns the controller's status code.
    #[instrument(skip(self), fields(adom = %self.adom))]
    pub async fn commit(&self) -> ConnectorResult<i64> {
        let reply = self.client.commit_changes(self.adom).await?;
        if reply.is_ok() {
            info!(adom = self.adom, "Committed ADOM changes");
        } else {
            warn!(adom = self.adom, code = reply.code, data = %reply.data, "Commit returned non-zero code");
        }
        Ok(reply.code)
    }

    /// Releases the lock. Returns the controller's status code.
    #[instrument(skip(self), fields(adom = %self.adom))]
    pub async fn unlock(&self) -> ConnectorResult<i64> {
        let reply = self.client.unlock_adom(self.adom).await?;
        if reply.is_ok() {
            info!(adom = self.adom, "Released ADOM lock");
        } else {
            warn!(adom = self.adom, code = reply.code, data = %reply.data, "Unlock returned non-zero code");
        }
        Ok(reply.code)
    }

    /// Commits, then releases the lock.
    pub async fn commit_and_unlock(&self) -> ConnectorResult<()> {
        self.commit().await?;
        self.unlock().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fmg_rpc_common::codes;
    use fmg_rpc_test::{FakeFmg, NOT_LOCKED};

    #[tokio::test]
    async fn test_commit_and_unlock() {
        let fmg = FakeFmg::new();
        let session = fmg.session();
        session.lock_adom("root").await.unwrap();

        Workspace::new(&session, "root").commit_and_unlock().await.unwrap();

        assert_eq!(fmg.lock_holder("root"), None);
        assert_eq!(
            fmg.session_calls(session.id()),
            vec![
                "exec /dvmdb/adom/root/workspace/lock",
                "exec /dvmdb/adom/root/workspace/commit",
                "exec /dvmdb/adom/root/workspace/unlock",
            ]
        );
    }

    #[tokio::test]
    async fn test_non_zero_codes_are_not_errors() {
        let fmg = FakeFmg::new();
        let session = fmg.session();
        let workspace = Workspace::new(&session, "root");

        assert_eq!(workspace.commit().await.unwrap(), NOT_LOCKED);
        assert_eq!(workspace.unlock().await.unwrap(), NOT_LOCKED);
    }

    #[tokio::test]
    async fn test_global_workspace() {
        let fmg = FakeFmg::new();
        let session = fmg.session();
        assert_eq!(session.lock_adom("global").await.unwrap().code, codes::OK);

        let workspace = Workspace::new(&session, "global");
        assert_eq!(workspace.adom(), "global");
        assert_eq!(workspace.commit().await.unwrap(), codes::OK);
        assert_eq!(fmg.count("exec", "/dvmdb/global/workspace/commit"), 1);
    }
}
