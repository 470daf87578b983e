//! Bounded priority task queue

use crate::crawler::CrawlTask;
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Heap entry ordering tasks by priority, then by submission order
#[derive(Debug)]
struct QueuedTask(CrawlTask);

// Higher priority pops first; equal priorities pop in submission order
impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .priority
            .cmp(&other.0.priority)
            .then_with(|| other.0.id.cmp(&self.0.id))
    }
}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for QueuedTask {}

/// Priority queue shared by the submitters and the worker group
pub struct TaskQueue {
    heap: Mutex<BinaryHeap<QueuedTask>>,
    notify: Notify,
    capacity: usize,
}

impl TaskQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
            notify: Notify::new(),
            capacity: capacity.max(1),
        }
    }

    /// Enqueues a task, handing it back when the queue is full
    pub fn push(&self, task: CrawlTask) -> Result<(), CrawlTask> {
        {
            let mut heap = self.heap.lock();
            if heap.len() >= self.capacity {
                return Err(task);
            }
            heap.push(QueuedTask(task));
        }
        self.notify.notify_one();
        Ok(())
    }

    /// Claims the highest priority task, waiting until one arrives
    ///
    /// Returns `None` once `cancel` fires.
    pub async fn pop(&self, cancel: &CancellationToken) -> Option<CrawlTask> {
        loop {
            if cancel.is_cancelled() {
                return None;
            }
            if let Some(QueuedTask(task)) = self.heap.lock().pop() {
                return Some(task);
            }

            tokio::select! {
                _ = self.notify.notified() => {}
                _ = cancel.cancelled() => return None,
            }
        }
    }

    /// Removes every queued task
    pub fn drain(&self) -> Vec<CrawlTask> {
        self.heap
            .lock()
            .drain()
            .map(|QueuedTask(task)| task)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.heap.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
