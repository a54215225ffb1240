pub mod job;
pub mod memory_queue;
pub mod redis_queue;

pub use job::ExecutionJob;
pub use memory_queue::InMemoryQueue;
pub use redis_queue::RedisQueue;

use async_trait::async_trait;

use crate::error::AppResult;

/// Dispatch queue between submission and workers
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Push a job onto the queue
    async fn enqueue(&self, job: ExecutionJob) -> AppResult<()>;

    /// Pop the next job from the queue (blocking with timeout)
    async fn dequeue(&self, timeout_seconds: u64) -> AppResult<Option<ExecutionJob>>;

    /// Get queue length
    async fn queue_length(&self) -> AppResult<u64>;
}
