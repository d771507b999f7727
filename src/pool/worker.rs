//! # Pool de Workers
//! src/pool/worker.rs
//!
//! Conjunto fijo de threads que sacan tareas de una `TaskQueue` y las
//! ejecutan con el handler del pool, fuera del lock de la cola.

use super::queue::TaskQueue;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error};

/// Pool de workers con cola acotada
pub struct ThreadPool<T: Send + 'static> {
    queue: TaskQueue<T>,
    workers: Vec<JoinHandle<()>>,
}

impl<T: Send + 'static> ThreadPool<T> {
    /// Lanza `workers` threads sobre una cola de `max_requests` tareas
    pub fn new<F>(workers: usize, max_requests: usize, handler: F) -> Result<Self, String>
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        if workers == 0 {
            return Err("Thread pool needs at least one worker".to_string());
        }
        if max_requests == 0 {
            return Err("Task queue capacity must be >= 1".to_string());
        }

        let queue = TaskQueue::new(max_requests);
        let handler = Arc::new(handler);
        let mut pool = Self {
            queue,
            workers: Vec::with_capacity(workers),
        };

        for i in 0..workers {
            let queue = pool.queue.clone();
            let handler = Arc::clone(&handler);
            let name = format!("worker-{}", i);

            let handle = thread::Builder::new()
                .name(name.clone())
                .spawn(move || Self::worker_loop(name, queue, handler))
                .map_err(|e| format!("Failed to spawn worker {}: {}", i, e))?;

            pool.workers.push(handle);
        }

        Ok(pool)
    }

    /// Loop principal de cada worker
    fn worker_loop<F>(name: String, queue: TaskQueue<T>, handler: Arc<F>)
    where
        F: Fn(T),
    {
        debug!(worker = %name, "worker started");

        while let Some(task) = queue.dequeue() {
            (*handler)(task);
        }

        debug!(worker = %name, "worker stopped");
    }

    /// Encola una tarea; falla de inmediato si la cola está llena
    pub fn submit(&self, task: T) -> Result<(), String> {
        self.queue.enqueue(task)
    }

    /// Detiene los workers cuando terminan su tarea actual
    pub fn shutdown(&self) {
        self.queue.close();
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn max_requests(&self) -> usize {
        self.queue.max_capacity()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

impl<T: Send + 'static> Drop for ThreadPool<T> {
    fn drop(&mut self) {
        self.shutdown();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                error!("worker thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::sync::{Condvar, Mutex};
    use std::time::Duration;

    /// Compuerta que los handlers esperan hasta que el test la abra
    struct Gate {
        open: Mutex<bool>,
        condvar: Condvar,
    }

    impl Gate {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                open: Mutex::new(false),
                condvar: Condvar::new(),
            })
        }

        fn wait(&self) {
            let mut open = self.open.lock().unwrap();
            while !*open {
                open = self.condvar.wait(open).unwrap();
            }
        }

        fn release(&self) {
            *self.open.lock().unwrap() = true;
            self.condvar.notify_all();
        }
    }

    #[test]
    fn test_zero_sizes_are_rejected() {
        assert!(ThreadPool::<u32>::new(0, 10, |_| {}).is_err());
        assert!(ThreadPool::<u32>::new(2, 0, |_| {}).is_err());
    }

    #[test]
    fn test_tasks_are_processed() {
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        let pool = ThreadPool::new(4, 100, move |n: u32| {
            tx.lock().unwrap().send(n * 2).unwrap();
        })
        .unwrap();

        for n in 0..20 {
            pool.submit(n).unwrap();
        }

        let mut results: Vec<u32> = (0..20)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        results.sort();
        assert_eq!(results, (0..20).map(|n| n * 2).collect::<Vec<_>>());
    }

    #[test]
    fn test_submit_fails_fast_when_full() {
        let gate = Gate::new();
        let (started_tx, started_rx) = mpsc::channel();
        let started_tx = Mutex::new(started_tx);
        let handler_gate = Arc::clone(&gate);
        let done = Arc::new(AtomicUsize::new(0));
        let handler_done = Arc::clone(&done);

        let pool = ThreadPool::new(1, 2, move |_: u32| {
            started_tx.lock().unwrap().send(()).unwrap();
            handler_gate.wait();
            handler_done.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        // el único worker queda ocupado con la primera tarea
        pool.submit(0).unwrap();
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        pool.submit(1).unwrap();
        pool.submit(2).unwrap();
        assert!(pool.submit(3).is_err());
        assert_eq!(pool.queued(), 2);

        gate.release();
        for _ in 0..2 {
            started_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        }
        drop(pool);
        assert_eq!(done.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_drop_joins_workers() {
        let pool = ThreadPool::new(3, 10, |_: u32| {}).unwrap();
        assert_eq!(pool.worker_count(), 3);
        assert_eq!(pool.max_requests(), 10);
        drop(pool);
    }
}
