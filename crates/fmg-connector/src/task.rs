//! Task tracking.
//!
//! Long-running commands return a task id. [`TaskTracker`] polls the task
//! until it completes, fails, or one of the [`TimeoutPolicy`] limits is
//! reached. A timeout is a terminal state, not an error: the last task
//! payload is returned either way.

use std::fmt;
use std::time::Duration;

use fmg_rpc_common::{ConnectorResult, RpcClient, RpcReply, TaskId};
use serde_json::{Map, Value};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::shutdown::sleep_or_cancel;

/// Default limit on total tracking time (6 hours).
pub const DEFAULT_OVERALL_TIMEOUT: Duration = Duration::from_secs(21600);

/// Default limit on a task staying at 0%.
pub const DEFAULT_ZERO_PERCENT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default limit on a task making no progress.
pub const DEFAULT_STALE_TIMEOUT: Duration = Duration::from_secs(120);

/// Default delay between polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default number of consecutive failed polls before giving up.
pub const DEFAULT_RETRIEVAL_FAIL_GATE: u32 = 10;

/// Caller-supplied tracking limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutPolicy {
    /// Limit on total tracking time.
    pub overall_timeout: Duration,
    /// Limit on the task staying at 0% since tracking started.
    pub zero_percent_timeout: Duration,
    /// Limit on the percentage staying unchanged.
    pub stale_timeout: Duration,
    /// Delete the task on the controller when a limit is hit.
    pub delete_on_timeout: bool,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            overall_timeout: DEFAULT_OVERALL_TIMEOUT,
            zero_percent_timeout: DEFAULT_ZERO_PERCENT_TIMEOUT,
            stale_timeout: DEFAULT_STALE_TIMEOUT,
            delete_on_timeout: true,
        }
    }
}

impl TimeoutPolicy {
    /// Reads the policy from request parameters.
    ///
    /// Recognized keys are `task_timeout`, `zero_percent_timeout`,
    /// `task_stale_timeout`, and `delete_task_on_timeout`. Each falls back
    /// to its default independently.
    pub fn from_params(params: &Map<String, Value>) -> Self {
        Self {
            overall_timeout: parse_timeout(params.get("task_timeout"), DEFAULT_OVERALL_TIMEOUT),
            zero_percent_timeout: parse_timeout(
                params.get("zero_percent_timeout"),
                DEFAULT_ZERO_PERCENT_TIMEOUT,
            ),
            stale_timeout: parse_timeout(params.get("task_stale_timeout"), DEFAULT_STALE_TIMEOUT),
            delete_on_timeout: parse_flag(params.get("delete_task_on_timeout"), true),
        }
    }
}

/// Parses a timeout in seconds.
///
/// Positive numbers and numeric strings are accepted (fractions are
/// truncated). Anything else, including zero, yields `default`.
pub fn parse_timeout(value: Option<&Value>, default: Duration) -> Duration {
    let secs = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match secs {
        Some(secs) if secs.is_finite() && secs >= 1.0 => Duration::from_secs(secs as u64),
        _ => default,
    }
}

/// Parses a boolean flag given as a bool, `"true"`/`"false"`, or `1`/`0`.
pub fn parse_flag(value: Option<&Value>, default: bool) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|v| v != 0.0).unwrap_or(default),
        Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => true,
            "false" | "no" | "0" => false,
            _ => default,
        },
        _ => default,
    }
}

/// Polling cadence, independent of any one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerSettings {
    /// Delay between polls.
    pub poll_interval: Duration,
    /// Consecutive failed polls tolerated before giving up.
    pub retrieval_fail_gate: u32,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            retrieval_fail_gate: DEFAULT_RETRIEVAL_FAIL_GATE,
        }
    }
}

/// Which limit ended tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutKind {
    /// Total tracking time exceeded.
    Overall,
    /// The task never left 0%.
    ZeroPercent,
    /// The percentage stopped changing.
    Stale,
}

impl fmt::Display for TimeoutKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeoutKind::Overall => write!(f, "overall"),
            TimeoutKind::ZeroPercent => write!(f, "zero percent"),
            TimeoutKind::Stale => write!(f, "stale"),
        }
    }
}

/// Terminal state of a tracked task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Reached 100% or reported done.
    Completed,
    /// Reported an error, cancellation, or abort.
    Failed,
    /// A timeout limit was hit.
    TimedOut(TimeoutKind),
    /// Too many consecutive polls failed.
    RetrievalFailed,
}

/// Result of tracking one task.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutcome {
    /// The tracked task.
    pub task: TaskId,
    /// How tracking ended.
    pub state: TaskState,
    /// Status code of the last poll.
    pub code: i64,
    /// Data of the last poll.
    pub payload: Value,
}

impl TaskOutcome {
    /// Returns true if the task completed.
    pub fn is_completed(&self) -> bool {
        self.state == TaskState::Completed
    }
}

/// Extracts a task id from dispatch result data.
///
/// The id is read from `task` or `taskid`, as a number or numeric string.
/// Only object data can carry a task id.
pub fn extract_task_id(data: &Value) -> Option<TaskId> {
    let object = data.as_object()?;
    ["task", "taskid"]
        .iter()
        .filter_map(|key| object.get(*key))
        .find_map(|value| match value {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
}

/// Progress reported by one poll.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Progress {
    percent: f64,
    done: bool,
    failed: bool,
}

impl Progress {
    fn from_data(data: &Value) -> Self {
        let percent = match data.get("percent") {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
            _ => 0.0,
        };

        // Verbose replies name the state; terse replies use the enum value.
        let (done, failed) = match data.get("state") {
            Some(Value::String(s)) => {
                let s = s.to_ascii_lowercase();
                (s == "done", matches!(s.as_str(), "error" | "cancelled" | "aborted"))
            }
            Some(Value::Number(n)) => {
                let state = n.as_i64().unwrap_or(-1);
                (state == 4, matches!(state, 3 | 5 | 7))
            }
            _ => (false, false),
        };

        Self {
            percent,
            done,
            failed,
        }
    }
}

/// Polls tasks until they reach a terminal state.
#[derive(Debug, Clone)]
pub struct TaskTracker {
    settings: TrackerSettings,
    cancel: CancellationToken,
}

impl TaskTracker {
    /// Creates a tracker.
    pub fn new(settings: TrackerSettings, cancel: CancellationToken) -> Self {
        Self { settings, cancel }
    }

    /// Returns the polling settings.
    pub fn settings(&self) -> &TrackerSettings {
        &self.settings
    }

    /// Tracks `task` under `policy`.
    ///
    /// Transport failures abort tracking; non-zero poll codes count toward
    /// the retrieval fail gate.
    #[instrument(skip(self, client, policy))]
    pub async fn track<C>(
        &self,
        client: &C,
        task: TaskId,
        policy: &TimeoutPolicy,
    ) -> ConnectorResult<TaskOutcome>
    where
        C: RpcClient + ?Sized,
    {
        let start = Instant::now();
        let mut last_percent: Option<f64> = None;
        let mut last_change = start;
        let mut failed_polls = 0u32;

        loop {
            let reply = client.task_status(task).await?;
            let now = Instant::now();
            let elapsed = now - start;

            let state = if reply.is_ok() {
                failed_polls = 0;
                let progress = Progress::from_data(&reply.data);
                debug!(task, percent = progress.percent, "Task progress");

                if last_percent != Some(progress.percent) {
                    last_percent = Some(progress.percent);
                    last_change = now;
                }

                // Failed tasks also report 100%, so the state is checked first.
                if progress.failed {
                    Some(TaskState::Failed)
                } else if progress.done || progress.percent >= 100.0 {
                    Some(TaskState::Completed)
                } else if progress.percent == 0.0 && elapsed >= policy.zero_percent_timeout {
                    Some(TaskState::TimedOut(TimeoutKind::ZeroPercent))
                } else if now - last_change >= policy.stale_timeout {
                    Some(TaskState::TimedOut(TimeoutKind::Stale))
                } else {
                    None
                }
            } else {
                failed_polls += 1;
                warn!(task, code = reply.code, failed_polls, "Failed to retrieve task status");
                (failed_polls >= self.settings.retrieval_fail_gate)
                    .then_some(TaskState::RetrievalFailed)
            };

            let state = state.or_else(|| {
                (elapsed >= policy.overall_timeout)
                    .then_some(TaskState::TimedOut(TimeoutKind::Overall))
            });

            if let Some(state) = state {
                return Ok(self.finish(client, task, state, reply, policy).await);
            }

            sleep_or_cancel(&self.cancel, self.settings.poll_interval, "task polling").await?;
        }
    }

    async fn finish<C>(
        &self,
        client: &C,
        task: TaskId,
        state: TaskState,
        reply: RpcReply,
        policy: &TimeoutPolicy,
    ) -> TaskOutcome
    where
        C: RpcClient + ?Sized,
    {
        match state {
            TaskState::Completed => info!(task, "Task completed"),
            TaskState::Failed => warn!(task, "Task failed"),
            TaskState::RetrievalFailed => warn!(task, code = reply.code, "Gave up retrieving task status"),
            TaskState::TimedOut(kind) => {
                warn!(task, %kind, "Task timed out");
                if policy.delete_on_timeout {
                    match client.delete_task(task).await {
                        Ok(deleted) if deleted.is_ok() => info!(task, "Deleted timed out task"),
                        Ok(deleted) => warn!(task, code = deleted.code, "Failed to delete timed out task"),
                        Err(e) => warn!(task, error = %e, "Failed to delete timed out task"),
                    }
                }
            }
        }

        TaskOutcome {
            task,
            state,
            code: reply.code,
            payload: reply.data,
        }
    }
}
