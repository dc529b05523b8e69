//! Decode worker pool.
//!
//! A fixed set of worker threads pulls queued load tasks and runs them off
//! the UI thread. Workers poll the queue, sleeping briefly when idle, and
//! check a shared shutdown flag between tasks.

use std::collections::VecDeque;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// A queued unit of work: one image load from request to delivery.
pub type LoadTask = Box<dyn FnOnce() + Send>;

/// Configuration for the decode worker pool.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of worker threads to spawn.
    /// Default: number of logical CPU cores.
    pub num_workers: usize,

    /// Maximum time a worker will wait for a task before checking shutdown.
    /// Default: 50ms.
    pub poll_interval: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            num_workers: num_cpus(),
            poll_interval: Duration::from_millis(50),
        }
    }
}

impl WorkerPoolConfig {
    pub fn new(num_workers: usize) -> Self {
        Self {
            num_workers: num_workers.max(1),
            poll_interval: Duration::from_millis(50),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

struct TaskQueue {
    tasks: Mutex<VecDeque<LoadTask>>,
}

impl TaskQueue {
    fn new() -> Self {
        Self { tasks: Mutex::new(VecDeque::new()) }
    }

    fn push(&self, task: LoadTask) {
        self.tasks.lock().unwrap().push_back(task);
    }

    fn pop(&self) -> Option<LoadTask> {
        self.tasks.lock().unwrap().pop_front()
    }
}

/// Fixed-size pool of decode worker threads.
pub struct WorkerPool {
    queue: Arc<TaskQueue>,
    workers: Vec<Worker>,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    /// Create and start the pool.
    pub fn new(config: WorkerPoolConfig) -> Self {
        let queue = Arc::new(TaskQueue::new());
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut workers = Vec::with_capacity(config.num_workers);

        for id in 0..config.num_workers {
            workers.push(Worker::new(id, queue.clone(), shutdown.clone(), config.poll_interval));
        }

        Self { queue, workers, shutdown }
    }

    /// Queue a task for execution on some worker thread.
    pub fn submit(&self, task: LoadTask) {
        self.queue.push(task);
    }

    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Signal all workers to stop and wait for them to finish their
    /// current task and exit. Queued tasks that never started are dropped.
    pub fn shutdown(self) {
        self.shutdown.store(true, Ordering::Release);

        for worker in self.workers {
            worker.join();
        }
    }
}

struct Worker {
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    fn new(
        id: usize,
        queue: Arc<TaskQueue>,
        shutdown: Arc<AtomicBool>,
        poll_interval: Duration,
    ) -> Self {
        let thread = thread::Builder::new()
            .name(format!("picstory-load-worker-{}", id))
            .spawn(move || {
                Self::run(queue, shutdown, poll_interval);
            })
            .expect("Failed to spawn worker thread");

        Self { thread: Some(thread) }
    }

    fn run(queue: Arc<TaskQueue>, shutdown: Arc<AtomicBool>, poll_interval: Duration) {
        loop {
            if shutdown.load(Ordering::Acquire) {
                break;
            }

            if let Some(task) = queue.pop() {
                task();
            } else {
                thread::sleep(poll_interval);
            }
        }
    }

    fn join(mut self) {
        if let Some(thread) = self.thread.take() {
            thread.join().expect("Worker thread panicked");
        }
    }
}

/// Number of logical CPU cores, falling back to 2.
fn num_cpus() -> usize {
    thread::available_parallelism().map(|n| n.get()).unwrap_or(2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;
    use std::time::Instant;

    fn fast_config(workers: usize) -> WorkerPoolConfig {
        WorkerPoolConfig::new(workers).with_poll_interval(Duration::from_millis(5))
    }

    #[test]
    fn executes_submitted_tasks() {
        let pool = WorkerPool::new(fast_config(2));
        let (sender, receiver) = mpsc::channel();

        for value in 0..8 {
            let sender = sender.clone();
            pool.submit(Box::new(move || {
                sender.send(value).unwrap();
            }));
        }

        let mut seen: Vec<i32> = (0..8)
            .map(|_| receiver.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..8).collect::<Vec<_>>());

        pool.shutdown();
    }

    #[test]
    fn shutdown_waits_for_running_task() {
        let pool = WorkerPool::new(fast_config(1));
        let counter = Arc::new(AtomicUsize::new(0));

        let task_counter = counter.clone();
        pool.submit(Box::new(move || {
            thread::sleep(Duration::from_millis(50));
            task_counter.fetch_add(1, Ordering::SeqCst);
        }));

        // Give the worker time to pick the task up before signalling.
        thread::sleep(Duration::from_millis(20));
        let started = Instant::now();
        pool.shutdown();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() >= Duration::from_millis(10));
    }

    #[test]
    fn pool_size_clamps_to_one() {
        let pool = WorkerPool::new(fast_config(0));
        assert_eq!(pool.num_workers(), 1);
        pool.shutdown();
    }
}
