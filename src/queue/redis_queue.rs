use async_trait::async_trait;
use redis::aio::ConnectionManager as RedisConnectionManager;
use redis::AsyncCommands;

use crate::error::{AppError, AppResult};
use crate::queue::{ExecutionJob, JobQueue};

/// FIFO list of serialized jobs; executions themselves live in the execution store
const QUEUE_KEY: &str = "apirun:executions:queue";

/// Redis-backed job queue implementation
#[derive(Clone)]
pub struct RedisQueue {
    conn: RedisConnectionManager,
}

impl RedisQueue {
    pub fn new(conn: RedisConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl JobQueue for RedisQueue {
    async fn enqueue(&self, job: ExecutionJob) -> AppResult<()> {
        let mut conn = self.conn.clone();
        let job_json = serde_json::to_string(&job)?;

        let _: () = conn.rpush(QUEUE_KEY, job_json).await?;

        tracing::info!(execution_id = %job.execution_id, "Execution enqueued");

        Ok(())
    }

    async fn dequeue(&self, timeout_seconds: u64) -> AppResult<Option<ExecutionJob>> {
        let mut conn = self.conn.clone();

        // Blocking pop from queue
        let result: Option<(String, String)> =
            conn.blpop(QUEUE_KEY, timeout_seconds as f64).await?;

        match result {
            Some((_, job_json)) => {
                let job: ExecutionJob = serde_json::from_str(&job_json)
                    .map_err(|e| AppError::Queue(format!("Malformed job payload: {}", e)))?;
                tracing::debug!(execution_id = %job.execution_id, "Execution dequeued");
                Ok(Some(job))
            }
            None => Ok(None),
        }
    }

    async fn queue_length(&self) -> AppResult<u64> {
        let mut conn = self.conn.clone();
        let len: u64 = conn.llen(QUEUE_KEY).await?;
        Ok(len)
    }
}
