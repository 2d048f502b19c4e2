//! ADOM lock coordination.
//!
//! Before a mutation in workspace mode the target ADOM must be locked. The
//! controller answers each lock attempt with a status code:
//!
//! | Code | Meaning | Action |
//! |------|---------|--------|
//! | `0` | lock acquired | done |
//! | `-9` | workspace commands invalid here | treat as acquired |
//! | `-6` | ADOM does not exist | fail, no retry |
//! | other | held elsewhere / transient | random backoff, retry |
//!
//! The randomized backoff spreads out retries when many workers contend
//! for the same ADOM.

use std::time::Duration;

use fmg_rpc_common::{codes, ConnectorError, ConnectorResult, LockFailureReason, RpcClient};
use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use crate::shutdown::sleep_or_cancel;

/// Default number of lock attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 1500;

/// Default lower bound of the backoff between attempts.
pub const DEFAULT_MIN_BACKOFF: Duration = Duration::from_secs(1);

/// Default upper bound of the backoff between attempts.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(10);

/// Retry budget for lock acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of lock attempts (at least 1).
    pub max_attempts: u32,
    /// Shortest backoff between attempts.
    pub min_backoff: Duration,
    /// Longest backoff between attempts.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            min_backoff: DEFAULT_MIN_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy. Zero attempts become one; inverted bounds are
    /// swapped.
    pub fn new(max_attempts: u32, min_backoff: Duration, max_backoff: Duration) -> Self {
        let (min_backoff, max_backoff) = if min_backoff <= max_backoff {
            (min_backoff, max_backoff)
        } else {
            (max_backoff, min_backoff)
        };
        Self {
            max_attempts: max_attempts.max(1),
            min_backoff,
            max_backoff,
        }
    }

    /// Draws a backoff uniformly from `[min_backoff, max_backoff]`.
    pub fn backoff<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let min = self.min_backoff.as_millis() as u64;
        let max = self.max_backoff.as_millis() as u64;
        Duration::from_millis(rng.gen_range(min..=max))
    }
}

/// Successful lock acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOutcome {
    /// The session now holds the ADOM lock.
    Acquired,
    /// Locking does not apply to this deployment.
    NotRequired,
}

/// Acquires ADOM locks under a [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct LockCoordinator {
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl LockCoordinator {
    /// Creates a coordinator.
    pub fn new(policy: RetryPolicy, cancel: CancellationToken) -> Self {
        Self { policy, cancel }
    }

    /// Returns the retry policy.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Locks `adom`, retrying until the policy is exhausted.
    ///
    /// Transport failures are returned immediately without retry.
    #[instrument(skip(self, client))]
    pub async fn acquire<C>(&self, client: &C, adom: &str) -> ConnectorResult<LockOutcome>
    where
        C: RpcClient + ?Sized,
    {
        let attempts = self.policy.max_attempts;

        for attempt in 1..=attempts {
            let reply = client.lock_adom(adom).await?;

            match reply.code {
                codes::OK => {
                    info!(adom, attempt, "Acquired ADOM lock");
                    return Ok(LockOutcome::Acquired);
                }
                codes::INVALID_COMMAND => {
                    debug!(adom, "Workspaces not enabled, locking ADOM not required");
                    return Ok(LockOutcome::NotRequired);
                }
                codes::INVALID_URL => {
                    error!(adom, "URL is invalid, ADOM does not exist");
                    return Err(ConnectorError::lock_failed(
                        adom,
                        LockFailureReason::AdomNotFound,
                    ));
                }
                code if attempt < attempts => {
                    let delay = self.policy.backoff(&mut rand::thread_rng());
                    debug!(
                        adom,
                        attempt,
                        code,
                        delay_ms = delay.as_millis() as u64,
                        "Failed to acquire ADOM lock, retrying"
                    );
                    sleep_or_cancel(&self.cancel, delay, "ADOM lock backoff").await?;
                }
                code => {
                    error!(adom, attempts, code, "Max retry limit reached, could not acquire ADOM lock");
                }
            }
        }

        Err(ConnectorError::lock_failed(
            adom,
            LockFailureReason::RetriesExhausted { attempts },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fmg_rpc_test::{FakeFmg, WorkspaceMode, LOCKED_BY_OTHER};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tokio::time::Instant;

    const ROOT_LOCK_URL: &str = "/dvmdb/adom/root/workspace/lock";

    fn coordinator(max_attempts: u32) -> LockCoordinator {
        LockCoordinator::new(
            RetryPolicy::new(max_attempts, Duration::from_secs(1), Duration::from_secs(10)),
            CancellationToken::new(),
        )
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 1500);
        assert_eq!(policy.min_backoff, Duration::from_secs(1));
        assert_eq!(policy.max_backoff, Duration::from_secs(10));
    }

    #[test]
    fn test_policy_normalization() {
        let policy = RetryPolicy::new(0, Duration::from_secs(5), Duration::from_secs(2));
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.min_backoff, Duration::from_secs(2));
        assert_eq!(policy.max_backoff, Duration::from_secs(5));
    }

    #[test]
    fn test_backoff_within_bounds() {
        let policy = RetryPolicy::default();
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..1000 {
            let delay = policy.backoff(&mut rng);
            assert!(delay >= policy.min_backoff && delay <= policy.max_backoff);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_first_attempt() {
        let fmg = FakeFmg::new();
        let session = fmg.session();
        let start = Instant::now();

        let outcome = coordinator(5).acquire(&session, "root").await.unwrap();

        assert_eq!(outcome, LockOutcome::Acquired);
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(fmg.lock_holder("root"), Some(session.id()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_command_bypasses_without_sleeping() {
        let fmg = FakeFmg::new().with_mode(WorkspaceMode::Misreported);
        let session = fmg.session();
        let start = Instant::now();

        let outcome = coordinator(1500).acquire(&session, "root").await.unwrap();

        assert_eq!(outcome, LockOutcome::NotRequired);
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(fmg.count("exec", ROOT_LOCK_URL), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_adom_fails_immediately() {
        let fmg = FakeFmg::new();
        let session = fmg.session();
        let start = Instant::now();

        let err = coordinator(1500).acquire(&session, "nope").await.unwrap_err();

        assert!(matches!(
            err,
            ConnectorError::LockAcquisitionFailed {
                ref adom,
                reason: LockFailureReason::AdomNotFound,
            } if adom == "nope"
        ));
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(fmg.count("exec", "/dvmdb/adom/nope/workspace/lock"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_after_busy_replies() {
        let fmg = FakeFmg::new();
        fmg.script_lock_codes("root", vec![LOCKED_BY_OTHER, -20055]);
        let session = fmg.session();
        let start = Instant::now();

        let outcome = coordinator(5).acquire(&session, "root").await.unwrap();

        assert_eq!(outcome, LockOutcome::Acquired);
        assert_eq!(fmg.count("exec", ROOT_LOCK_URL), 3);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(2), "slept {:?}", elapsed);
        assert!(elapsed <= Duration::from_secs(20), "slept {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_budget_exhausted() {
        let fmg = FakeFmg::new();
        let holder = fmg.session();
        coordinator(1).acquire(&holder, "root").await.unwrap();

        let waiter = fmg.session();
        let err = coordinator(3).acquire(&waiter, "root").await.unwrap_err();

        assert!(matches!(
            err,
            ConnectorError::LockAcquisitionFailed {
                reason: LockFailureReason::RetriesExhausted { attempts: 3 },
                ..
            }
        ));
        assert_eq!(fmg.count("exec", ROOT_LOCK_URL), 4);
        assert_eq!(fmg.lock_holder("root"), Some(holder.id()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lock_released_by_other_session() {
        let fmg = FakeFmg::new();
        let holder = fmg.session();
        coordinator(1).acquire(&holder, "root").await.unwrap();

        let waiter = fmg.session();
        let release = {
            let holder = holder.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(30)).await;
                holder.end();
            })
        };

        let outcome = coordinator(1500).acquire(&waiter, "root").await.unwrap();
        release.await.unwrap();

        assert_eq!(outcome, LockOutcome::Acquired);
        assert_eq!(fmg.lock_holder("root"), Some(waiter.id()));
    }

    #[tokio::test]
    async fn test_transport_failure_is_not_retried() {
        let fmg = FakeFmg::new();
        fmg.fail_url(ROOT_LOCK_URL);
        let session = fmg.session();

        let err = coordinator(1500).acquire(&session, "root").await.unwrap_err();

        assert!(matches!(err, ConnectorError::RemoteCallFailed { .. }));
        assert_eq!(fmg.count("exec", ROOT_LOCK_URL), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_during_backoff() {
        let fmg = FakeFmg::new();
        fmg.script_lock_codes("root", vec![LOCKED_BY_OTHER]);
        let session = fmg.session();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let coordinator = LockCoordinator::new(RetryPolicy::default(), cancel);

        let err = coordinator.acquire(&session, "root").await.unwrap_err();

        assert!(matches!(err, ConnectorError::Cancelled { .. }));
    }
}
