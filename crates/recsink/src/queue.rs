//! Closeable multi-producer/multi-consumer job queue.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::debug;

use crate::job::RetryableJob;

struct QueueState {
    items: VecDeque<RetryableJob>,
    closed: bool,
}

/// Unbounded FIFO queue of [`RetryableJob`]s shared by the orchestrator and
/// the download workers.
///
/// Capacity is unbounded on purpose: the producer in this system self-paces,
/// and concurrency is bounded at the worker pool rather than the queue.
/// [`close`](JobQueue::close) flips a one-way flag; a closed queue rejects
/// new items but keeps serving already-enqueued ones until it runs empty.
pub struct JobQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl JobQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                closed: false,
            }),
            notify: Notify::new(),
        }
    }

    /// Appends an item to the tail.
    ///
    /// Returns the item back as `Err` when the queue has been closed; the
    /// caller decides whether that means logging, rerouting, or dropping.
    pub fn push(&self, item: RetryableJob) -> Result<(), RetryableJob> {
        {
            let mut state = self.state.lock();
            if state.closed {
                return Err(item);
            }
            state.items.push_back(item);
        }
        self.notify.notify_one();
        Ok(())
    }

    /// Removes the head item, waiting for one to arrive if the queue is
    /// empty.
    ///
    /// Returns `None` only when the queue is closed *and* empty, which tells
    /// the worker the queue has fully drained. Waiting is event-driven; the
    /// `notified()` future is registered before the state check so a push or
    /// close between the check and the await cannot be missed.
    pub async fn pop(&self) -> Option<RetryableJob> {
        loop {
            let notified = self.notify.notified();
            {
                let mut state = self.state.lock();
                if let Some(item) = state.items.pop_front() {
                    return Some(item);
                }
                if state.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Closes the queue for new items. Idempotent; already-enqueued items
    /// remain poppable. Wakes every blocked `pop` so empty-queue waiters can
    /// observe the close.
    pub fn close(&self) {
        let newly_closed = {
            let mut state = self.state.lock();
            let was_open = !state.closed;
            state.closed = true;
            was_open
        };
        if newly_closed {
            debug!("Job queue closed for new items");
        }
        self.notify.notify_waiters();
    }

    /// Removes and returns everything still queued. Non-blocking; meant to
    /// be called once all workers have stopped pulling.
    pub fn drain(&self) -> Vec<RetryableJob> {
        let mut state = self.state.lock();
        state.items.drain(..).collect()
    }

    /// Current number of queued items.
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::RecordingJob;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn item(n: usize) -> RetryableJob {
        RetryableJob::new(RecordingJob::new(
            format!("job-{n}"),
            "/tmp/recordings",
            format!("job-{n}.wav"),
        ))
    }

    #[tokio::test]
    async fn test_push_pop_preserves_fifo_order() {
        let queue = JobQueue::new();
        queue.push(item(1)).unwrap();
        queue.push(item(2)).unwrap();
        queue.push(item(3)).unwrap();

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.pop().await.unwrap().job().name, "job-1");
        assert_eq!(queue.pop().await.unwrap().job().name, "job-2");
        assert_eq!(queue.pop().await.unwrap().job().name, "job-3");
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_pop_blocks_until_item_arrives() {
        let queue = Arc::new(JobQueue::new());
        let q = Arc::clone(&queue);
        let popper = tokio::spawn(async move { q.pop().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!popper.is_finished());

        queue.push(item(7)).unwrap();
        let popped = popper.await.unwrap();
        assert_eq!(popped.unwrap().job().name, "job-7");
    }

    #[tokio::test]
    async fn test_close_wakes_blocked_pop_with_none() {
        let queue = Arc::new(JobQueue::new());
        let q = Arc::clone(&queue);
        let popper = tokio::spawn(async move { q.pop().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.close();

        assert!(popper.await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_push_after_close_returns_item() {
        let queue = JobQueue::new();
        queue.close();

        let rejected = queue.push(item(1)).unwrap_err();
        assert_eq!(rejected.job().name, "job-1");
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_closed_queue_serves_remaining_items() {
        let queue = JobQueue::new();
        queue.push(item(1)).unwrap();
        queue.push(item(2)).unwrap();
        queue.close();
        queue.close(); // idempotent

        assert!(queue.pop().await.is_some());
        assert!(queue.pop().await.is_some());
        assert!(queue.pop().await.is_none());
    }

    #[tokio::test]
    async fn test_drain_removes_everything() {
        let queue = JobQueue::new();
        for n in 0..5 {
            queue.push(item(n)).unwrap();
        }

        let drained = queue.drain();
        assert_eq!(drained.len(), 5);
        assert!(queue.is_empty());
        assert!(queue.drain().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_producers_and_consumers() {
        let queue = Arc::new(JobQueue::new());
        let consumed = Arc::new(AtomicUsize::new(0));

        let mut consumers = Vec::new();
        for _ in 0..2 {
            let q = Arc::clone(&queue);
            let count = Arc::clone(&consumed);
            consumers.push(tokio::spawn(async move {
                while q.pop().await.is_some() {
                    count.fetch_add(1, Ordering::SeqCst);
                }
            }));
        }

        let mut producers = Vec::new();
        for p in 0..3 {
            let q = Arc::clone(&queue);
            producers.push(tokio::spawn(async move {
                for n in 0..20 {
                    q.push(item(p * 100 + n)).unwrap();
                    tokio::task::yield_now().await;
                }
            }));
        }

        for producer in producers {
            producer.await.unwrap();
        }
        queue.close();
        for consumer in consumers {
            consumer.await.unwrap();
        }

        assert_eq!(consumed.load(Ordering::SeqCst), 60);
    }
}
