//! Shareable one-shot futures connecting the executors.

use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

struct TaskState<T> {
    value: Mutex<Option<T>>,
    ready: Condvar,
}

/// The writing end of a [`Task`]. Consumed by fulfilment; dropping it
/// without a value leaves waiters blocked, so every execution path that owns
/// a promise must resolve it.
pub struct Promise<T> {
    state: Arc<TaskState<T>>,
}

impl<T> Promise<T> {
    pub fn set(self, value: T) {
        let mut slot = self.state.value.lock().unwrap();
        debug_assert!(slot.is_none(), "promise fulfilled twice");
        *slot = Some(value);
        self.state.ready.notify_all();
    }
}

/// A shareable future. Clones observe the same result; the value is produced
/// once by the matching [`Promise`].
pub struct Task<T> {
    state: Arc<TaskState<T>>,
}

impl<T> Clone for Task<T> {
    fn clone(&self) -> Self {
        Self { state: Arc::clone(&self.state) }
    }
}

impl<T> Task<T> {
    /// Non-blocking readiness poll, the `wait_for(0)` used by the CPU
    /// executor's scheduler thread.
    pub fn is_ready(&self) -> bool {
        self.state.value.lock().unwrap().is_some()
    }

    /// Blocks until the task has a value.
    pub fn wait(&self) {
        let mut slot = self.state.value.lock().unwrap();
        while slot.is_none() {
            slot = self.state.ready.wait(slot).unwrap();
        }
    }

    /// Blocks until the task has a value or the timeout elapses. Returns
    /// whether the task completed.
    pub fn wait_for(&self, timeout: Duration) -> bool {
        let mut slot = self.state.value.lock().unwrap();
        let deadline = std::time::Instant::now() + timeout;
        while slot.is_none() {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            if remaining.is_zero() {
                return false;
            }
            let (guard, result) = self.state.ready.wait_timeout(slot, remaining).unwrap();
            slot = guard;
            if result.timed_out() && slot.is_none() {
                return false;
            }
        }
        true
    }
}

impl<T: Clone> Task<T> {
    /// Blocks until the value is available and returns a copy of it.
    pub fn get(&self) -> T {
        self.wait();
        self.state.value.lock().unwrap().as_ref().unwrap().clone()
    }
}

/// Creates a connected promise/task pair.
pub fn make_promise<T>() -> (Promise<T>, Task<T>) {
    let state = Arc::new(TaskState { value: Mutex::new(None), ready: Condvar::new() });
    (Promise { state: Arc::clone(&state) }, Task { state })
}

/// A task that is already complete.
pub fn ready_task<T>(value: T) -> Task<T> {
    let (promise, task) = make_promise();
    promise.set(value);
    task
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get() {
        let (promise, task) = make_promise();
        assert!(!task.is_ready());
        promise.set(17);
        assert!(task.is_ready());
        assert_eq!(task.get(), 17);
    }

    #[test]
    fn clones_share_the_result() {
        let (promise, task) = make_promise();
        let other = task.clone();
        promise.set("done".to_string());
        assert_eq!(task.get(), "done");
        assert_eq!(other.get(), "done");
    }

    #[test]
    fn wait_blocks_until_fulfilment() {
        let (promise, task) = make_promise();
        let waiter = {
            let task = task.clone();
            std::thread::spawn(move || task.get())
        };
        std::thread::sleep(Duration::from_millis(10));
        promise.set(5u32);
        assert_eq!(waiter.join().unwrap(), 5);
    }

    #[test]
    fn wait_for_times_out() {
        let (_promise, task) = make_promise::<u32>();
        assert!(!task.wait_for(Duration::from_millis(5)));
    }
}
