pub mod common;
pub mod execution;
pub mod test_case;

pub use common::ListParams;
pub use execution::{
    cancel_execution, get_execution, get_execution_results, get_queue_stats, list_executions,
    submit_batch, submit_single, submit_suite, CancelResponse, ExecutionListResponse,
    ExecutionResponse, ExecutionResultsResponse, ProgressResponse, QueueStatsResponse,
    ResultResponse, ResultSummaryResponse, SubmitBatchRequest, SubmitResponse,
    SubmitSingleRequest, SubmitSuiteRequest, SummaryResponse,
};
pub use test_case::{
    dry_run_test_case, validate_test_case, DryRunRequest, DryRunResponse,
    EnvironmentStatusResponse, ValidateRequest, ValidateResponse, VariablePreviewResponse,
    VariableValidationResponse,
};
