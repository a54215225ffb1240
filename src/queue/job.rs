use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::models::ExecutionKind;

/// Queue entry pointing at a pending execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionJob {
    pub execution_id: Uuid,
    pub kind: ExecutionKind,
    #[serde(with = "time::serde::rfc3339")]
    pub enqueued_at: OffsetDateTime,
}

impl ExecutionJob {
    pub fn new(execution_id: Uuid, kind: ExecutionKind) -> Self {
        Self {
            execution_id,
            kind,
            enqueued_at: OffsetDateTime::now_utc(),
        }
    }
}
