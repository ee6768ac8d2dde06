//! Pipeline Queues
//!
//! One bounded channel per job kind. Submitting waits for room instead of
//! dropping work; pollers of the same pool share the receiving end.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use crate::error::{AppError, AppResult};

use super::jobs::{FetchJob, GraphJob, PersistenceJob};

pub struct JobQueue<J> {
    name: &'static str,
    sender: mpsc::Sender<J>,
    receiver: Arc<Mutex<mpsc::Receiver<J>>>,
}

impl<J> JobQueue<J> {
    pub fn new(name: &'static str, capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        Self {
            name,
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Enqueue, waiting while the queue is full
    pub async fn submit(&self, job: J) -> AppResult<()> {
        self.sender
            .send(job)
            .await
            .map_err(|_| AppError::QueueClosed(self.name.to_string()))
    }

    pub fn receiver(&self) -> Arc<Mutex<mpsc::Receiver<J>>> {
        self.receiver.clone()
    }

    pub fn len(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct PipelineQueues {
    pub fetch: JobQueue<FetchJob>,
    pub graph: JobQueue<GraphJob>,
    pub persistence: JobQueue<PersistenceJob>,
}

impl PipelineQueues {
    pub fn new(capacity: usize) -> Self {
        Self {
            fetch: JobQueue::new("fetch", capacity),
            graph: JobQueue::new("graph", capacity),
            persistence: JobQueue::new("persistence", capacity),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_submit_waits_when_full() {
        let queue: JobQueue<u32> = JobQueue::new("numbers", 1);
        queue.submit(1).await.unwrap();
        assert_eq!(queue.len(), 1);

        let blocked = tokio::time::timeout(Duration::from_millis(50), queue.submit(2)).await;
        assert!(blocked.is_err());

        let receiver = queue.receiver();
        assert_eq!(receiver.lock().await.recv().await, Some(1));
        queue.submit(3).await.unwrap();
        assert_eq!(receiver.lock().await.recv().await, Some(3));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_submit_after_close_is_an_error() {
        let queue: JobQueue<u32> = JobQueue::new("numbers", 4);
        queue.receiver().lock().await.close();
        assert!(matches!(
            queue.submit(1).await,
            Err(AppError::QueueClosed(name)) if name == "numbers"
        ));
    }
}
