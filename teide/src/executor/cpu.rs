//! CPU task executor: a fixed worker pool plus dependency-gated
//! continuations dispatched by a polling scheduler thread.

use std::cell::Cell;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::task::{make_promise, Promise, Task};

const POLL_INTERVAL: Duration = Duration::from_millis(2);

type Job = Box<dyn FnOnce(u32) + Send + 'static>;

thread_local! {
    static WORKER_INDEX: Cell<Option<u32>> = const { Cell::new(None) };
}

/// The worker index of the calling thread, if it belongs to a
/// [`CpuExecutor`] pool.
pub fn current_worker_index() -> Option<u32> {
    WORKER_INDEX.with(|w| w.get())
}

struct PoolState {
    queue: VecDeque<Job>,
    pending: usize,
    stopping: bool,
}

struct Pool {
    state: Mutex<PoolState>,
    work_available: Condvar,
    all_done: Condvar,
}

impl Pool {
    fn enqueue(&self, job: Job) {
        let mut state = self.state.lock().unwrap();
        state.queue.push_back(job);
        state.pending += 1;
        self.work_available.notify_one();
    }

    fn worker_loop(&self, worker_index: u32) {
        WORKER_INDEX.with(|w| w.set(Some(worker_index)));
        loop {
            let job = {
                let mut state = self.state.lock().unwrap();
                loop {
                    if let Some(job) = state.queue.pop_front() {
                        break job;
                    }
                    if state.stopping {
                        return;
                    }
                    state = self.work_available.wait(state).unwrap();
                }
            };
            job(worker_index);
            let mut state = self.state.lock().unwrap();
            state.pending -= 1;
            if state.pending == 0 {
                self.all_done.notify_all();
            }
        }
    }
}

trait ScheduledTask: Send {
    fn is_ready(&self) -> bool;
    fn execute(self: Box<Self>, pool: &Arc<Pool>);
}

struct ContinuationTask<In, Out> {
    dependency: Task<In>,
    callback: Box<dyn FnOnce(In) -> Out + Send>,
    promise: Promise<Out>,
}

impl<In, Out> ScheduledTask for ContinuationTask<In, Out>
where
    In: Clone + Send + 'static,
    Out: Send + 'static,
{
    fn is_ready(&self) -> bool {
        self.dependency.is_ready()
    }

    fn execute(self: Box<Self>, pool: &Arc<Pool>) {
        let task = *self;
        pool.enqueue(Box::new(move |_| {
            let value = task.dependency.get();
            task.promise.set((task.callback)(value));
        }));
    }
}

/// A fixed-size worker thread pool with two task kinds: free tasks submitted
/// directly, and scheduled tasks gated on a dependency future. A dedicated
/// scheduler thread polls scheduled tasks for readiness and dispatches them
/// to the pool.
pub struct CpuExecutor {
    pool: Arc<Pool>,
    scheduled: Arc<Mutex<Vec<Box<dyn ScheduledTask>>>>,
    workers: Vec<JoinHandle<()>>,
    scheduler_thread: Option<JoinHandle<()>>,
    scheduler_stop: Arc<AtomicBool>,
    thread_count: u32,
}

impl CpuExecutor {
    pub fn new(num_threads: u32) -> Self {
        let num_threads = num_threads.max(1);
        let pool = Arc::new(Pool {
            state: Mutex::new(PoolState { queue: VecDeque::new(), pending: 0, stopping: false }),
            work_available: Condvar::new(),
            all_done: Condvar::new(),
        });

        let workers = (0..num_threads)
            .map(|index| {
                let pool = Arc::clone(&pool);
                std::thread::Builder::new()
                    .name(format!("teide-worker-{index}"))
                    .spawn(move || pool.worker_loop(index))
                    .expect("failed to spawn worker thread")
            })
            .collect();

        let scheduled: Arc<Mutex<Vec<Box<dyn ScheduledTask>>>> = Arc::default();
        let scheduler_stop = Arc::new(AtomicBool::new(false));
        let scheduler_thread = {
            let scheduled = Arc::clone(&scheduled);
            let pool = Arc::clone(&pool);
            let stop = Arc::clone(&scheduler_stop);
            std::thread::Builder::new()
                .name("teide-cpu-scheduler".into())
                .spawn(move || {
                    while !stop.load(Ordering::Acquire) {
                        std::thread::sleep(POLL_INTERVAL);
                        let mut tasks = scheduled.lock().unwrap();
                        let mut i = 0;
                        while i < tasks.len() {
                            if tasks[i].is_ready() {
                                tasks.swap_remove(i).execute(&pool);
                            } else {
                                i += 1;
                            }
                        }
                    }
                })
                .expect("failed to spawn scheduler thread")
        };

        Self {
            pool,
            scheduled,
            workers,
            scheduler_thread: Some(scheduler_thread),
            scheduler_stop,
            thread_count: num_threads,
        }
    }

    pub fn thread_count(&self) -> u32 {
        self.thread_count
    }

    /// Submits a free task; the callable receives the worker index it runs
    /// on so callers can key thread-local state.
    pub fn launch_task<T, F>(&self, f: F) -> Task<T>
    where
        T: Send + 'static,
        F: FnOnce(u32) -> T + Send + 'static,
    {
        let (promise, task) = make_promise();
        self.pool.enqueue(Box::new(move |worker| promise.set(f(worker))));
        task
    }

    /// Submits a task that runs only once `dependency` has a value; the
    /// value is passed as the callable's argument.
    pub fn launch_task_after<In, Out, F>(&self, dependency: Task<In>, f: F) -> Task<Out>
    where
        In: Clone + Send + 'static,
        Out: Send + 'static,
        F: FnOnce(In) -> Out + Send + 'static,
    {
        let (promise, task) = make_promise();
        let continuation = Box::new(ContinuationTask { dependency, callback: Box::new(f), promise });
        self.scheduled.lock().unwrap().push(continuation);
        task
    }

    /// Blocks until every submitted task, including scheduled continuations,
    /// has run to completion. Ready continuations are dispatched here as
    /// well so the drain completes even once the scheduler thread has
    /// stopped.
    pub fn wait_for_tasks(&self) {
        loop {
            {
                let mut state = self.pool.state.lock().unwrap();
                while state.pending > 0 {
                    state = self.pool.all_done.wait(state).unwrap();
                }
            }
            let mut dispatched = false;
            {
                let mut tasks = self.scheduled.lock().unwrap();
                let mut i = 0;
                while i < tasks.len() {
                    if tasks[i].is_ready() {
                        tasks.swap_remove(i).execute(&self.pool);
                        dispatched = true;
                    } else {
                        i += 1;
                    }
                }
                if tasks.is_empty() && !dispatched && self.pool.state.lock().unwrap().pending == 0 {
                    return;
                }
            }
            if !dispatched {
                std::thread::sleep(POLL_INTERVAL);
            }
        }
    }
}

impl Drop for CpuExecutor {
    fn drop(&mut self) {
        self.scheduler_stop.store(true, Ordering::Release);
        if let Some(thread) = self.scheduler_thread.take() {
            let _ = thread.join();
        }
        self.wait_for_tasks();
        self.pool.state.lock().unwrap().stopping = true;
        self.pool.work_available.notify_all();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn free_task_returns_result() {
        let executor = CpuExecutor::new(2);
        let task = executor.launch_task(|_| 2 + 2);
        assert_eq!(task.get(), 4);
    }

    #[test]
    fn worker_index_is_within_pool_bounds() {
        let executor = CpuExecutor::new(3);
        for _ in 0..16 {
            let index = executor.launch_task(|worker| worker).get();
            assert!(index < 3);
        }
    }

    #[test]
    fn dependent_task_runs_after_producer() {
        let executor = CpuExecutor::new(2);
        let (promise, dependency) = make_promise();
        let chained = executor.launch_task_after(dependency, |value: u32| value * 10);
        assert!(!chained.is_ready());
        promise.set(7);
        assert_eq!(chained.get(), 70);
    }

    #[test]
    fn chains_propagate_values() {
        let executor = CpuExecutor::new(2);
        let first = executor.launch_task(|_| 1u32);
        let second = executor.launch_task_after(first, |v| v + 1);
        let third = executor.launch_task_after(second, |v| v + 1);
        assert_eq!(third.get(), 3);
    }

    #[test]
    fn wait_for_tasks_drains_everything() {
        let executor = CpuExecutor::new(4);
        let counter = Arc::new(AtomicU32::new(0));
        for _ in 0..32 {
            let counter = Arc::clone(&counter);
            executor.launch_task(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        executor.wait_for_tasks();
        assert_eq!(counter.load(Ordering::SeqCst), 32);
    }

    #[test]
    fn shutdown_waits_for_outstanding_tasks() {
        let counter = Arc::new(AtomicU32::new(0));
        {
            let executor = CpuExecutor::new(2);
            for _ in 0..8 {
                let counter = Arc::clone(&counter);
                executor.launch_task(move |_| {
                    std::thread::sleep(Duration::from_millis(1));
                    counter.fetch_add(1, Ordering::SeqCst);
                });
            }
        }
        assert_eq!(counter.load(Ordering::SeqCst), 8);
    }
}
