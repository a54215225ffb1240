use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};

use crate::error::AppResult;
use crate::queue::{ExecutionJob, JobQueue};

/// In-memory FIFO queue for tests and single-process deployments
#[derive(Clone)]
pub struct InMemoryQueue {
    queue: Arc<Mutex<VecDeque<ExecutionJob>>>,
    notify: Arc<Notify>,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self {
            queue: Arc::new(Mutex::new(VecDeque::new())),
            notify: Arc::new(Notify::new()),
        }
    }
}

impl Default for InMemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobQueue for InMemoryQueue {
    async fn enqueue(&self, job: ExecutionJob) -> AppResult<()> {
        self.queue.lock().await.push_back(job);
        self.notify.notify_one();
        Ok(())
    }

    async fn dequeue(&self, timeout_seconds: u64) -> AppResult<Option<ExecutionJob>> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(timeout_seconds);

        loop {
            // Register interest before checking so a concurrent enqueue is not missed
            let notified = self.notify.notified();

            if let Some(job) = self.queue.lock().await.pop_front() {
                return Ok(Some(job));
            }

            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => return Ok(None),
                _ = notified => {}
            }
        }
    }

    async fn queue_length(&self) -> AppResult<u64> {
        Ok(self.queue.lock().await.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExecutionKind;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_enqueue_dequeue_fifo() {
        let queue = InMemoryQueue::new();
        let first = ExecutionJob::new(Uuid::new_v4(), ExecutionKind::Single);
        let second = ExecutionJob::new(Uuid::new_v4(), ExecutionKind::Batch);

        queue.enqueue(first.clone()).await.unwrap();
        queue.enqueue(second.clone()).await.unwrap();

        assert_eq!(queue.dequeue(1).await.unwrap(), Some(first));
        assert_eq!(queue.dequeue(1).await.unwrap(), Some(second));
    }

    #[tokio::test]
    async fn test_dequeue_times_out_when_empty() {
        let queue = InMemoryQueue::new();
        assert_eq!(queue.dequeue(0).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_dequeue_wakes_on_enqueue() {
        let queue = InMemoryQueue::new();
        let producer = queue.clone();
        let job = ExecutionJob::new(Uuid::new_v4(), ExecutionKind::Suite);
        let expected = job.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            producer.enqueue(job).await.unwrap();
        });

        assert_eq!(queue.dequeue(5).await.unwrap(), Some(expected));
    }

    #[tokio::test]
    async fn test_queue_length() {
        let queue = InMemoryQueue::new();

        assert_eq!(queue.queue_length().await.unwrap(), 0);

        for _ in 0..3 {
            queue
                .enqueue(ExecutionJob::new(Uuid::new_v4(), ExecutionKind::Single))
                .await
                .unwrap();
        }

        assert_eq!(queue.queue_length().await.unwrap(), 3);

        // Dequeue one
        let _ = queue.dequeue(1).await.unwrap();
        assert_eq!(queue.queue_length().await.unwrap(), 2);
    }
}
