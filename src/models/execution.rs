use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{AssertionReport, ExchangeResponse, PreparedRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionKind {
    Single,
    Batch,
    Suite,
}

impl ExecutionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Batch => "batch",
            Self::Suite => "suite",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "single" => Some(Self::Single),
            "batch" => Some(Self::Batch),
            "suite" => Some(Self::Suite),
            _ => None,
        }
    }
}

/// Execution lifecycle. Forward-only; terminal states never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Submitted, waiting for a worker
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn can_transition_to(&self, next: ExecutionStatus) -> bool {
        use ExecutionStatus::*;

        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Failed)
                | (Pending, Cancelled)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
        )
    }

    /// States from which `next` can be reached
    pub fn sources_of(next: ExecutionStatus) -> Vec<ExecutionStatus> {
        [Self::Pending, Self::Running]
            .into_iter()
            .filter(|s| s.can_transition_to(next))
            .collect()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an execution runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum ExecutionTarget {
    TestCase(Uuid),
    TestCases(Vec<Uuid>),
    Suite(Uuid),
}

/// Configuration snapshot taken at submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    pub environment_id: Uuid,
    #[serde(default)]
    pub variables: Map<String, Value>,
    #[serde(default)]
    pub parallel: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub total: usize,
    pub completed: usize,
    pub success: usize,
    pub failed: usize,
}

/// Batch aggregate, recorded when an execution finishes its cases
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub total: usize,
    pub success_count: usize,
    pub failed_count: usize,
    pub execution_mode: String, // "sequential" or "parallel"
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub id: Uuid,
    pub kind: ExecutionKind,
    pub status: ExecutionStatus,
    pub target: ExecutionTarget,
    pub config: ExecutionConfig,
    pub user_id: Uuid,
    pub session_id: Option<String>,
    pub progress: Progress,
    pub cancel_requested: bool,
    pub summary: Option<ExecutionSummary>,
    pub error_message: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub started_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub finished_at: Option<OffsetDateTime>,
}

/// Input for creating a pending execution
#[derive(Debug, Clone)]
pub struct NewExecution {
    pub kind: ExecutionKind,
    pub target: ExecutionTarget,
    pub config: ExecutionConfig,
    pub user_id: Uuid,
}

impl Execution {
    pub fn pending(input: NewExecution) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: input.kind,
            status: ExecutionStatus::Pending,
            target: input.target,
            config: input.config,
            user_id: input.user_id,
            session_id: None,
            progress: Progress::default(),
            cancel_requested: false,
            summary: None,
            error_message: None,
            created_at: OffsetDateTime::now_utc(),
            started_at: None,
            finished_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Pass,
    Fail,
    Error,
    Skip,
}

impl ResultStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::Error => "error",
            Self::Skip => "skip",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pass" => Some(Self::Pass),
            "fail" => Some(Self::Fail),
            "error" => Some(Self::Error),
            "skip" => Some(Self::Skip),
            _ => None,
        }
    }
}

/// Outcome of one test case within one execution. Write-once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub id: Uuid,
    pub execution_id: Uuid,
    pub test_case_id: Uuid,
    pub status: ResultStatus,
    pub request: Option<PreparedRequest>,
    pub response: Option<ExchangeResponse>,
    pub assertions: AssertionReport,
    pub duration_ms: f64,
    pub error_message: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl TestResult {
    pub fn new(execution_id: Uuid, test_case_id: Uuid, status: ResultStatus) -> Self {
        Self {
            id: Uuid::new_v4(),
            execution_id,
            test_case_id,
            status,
            request: None,
            response: None,
            assertions: AssertionReport::default(),
            duration_ms: 0.0,
            error_message: None,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    pub fn error(execution_id: Uuid, test_case_id: Uuid, message: impl Into<String>) -> Self {
        let mut result = Self::new(execution_id, test_case_id, ResultStatus::Error);
        result.error_message = Some(message.into());
        result
    }

    pub fn skipped(execution_id: Uuid, test_case_id: Uuid) -> Self {
        let mut result = Self::new(execution_id, test_case_id, ResultStatus::Skip);
        result.error_message = Some("Execution cancelled before this test case started".to_string());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions_are_forward_only() {
        use ExecutionStatus::*;

        assert!(Pending.can_transition_to(Running));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Running.can_transition_to(Completed));
        assert!(Running.can_transition_to(Cancelled));
        assert!(!Running.can_transition_to(Pending));
        assert!(!Pending.can_transition_to(Completed));

        for terminal in [Completed, Failed, Cancelled] {
            assert!(terminal.is_terminal());
            for next in [Pending, Running, Completed, Failed, Cancelled] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_sources_of_completed() {
        assert_eq!(
            ExecutionStatus::sources_of(ExecutionStatus::Completed),
            vec![ExecutionStatus::Running]
        );
        assert_eq!(
            ExecutionStatus::sources_of(ExecutionStatus::Cancelled),
            vec![ExecutionStatus::Pending, ExecutionStatus::Running]
        );
    }

    #[test]
    fn test_target_serialization() {
        let target = ExecutionTarget::Suite(Uuid::nil());
        let json = serde_json::to_value(&target).unwrap();
        assert_eq!(json["type"], "suite");
    }
}
