//! Synchronized containers used throughout the runtime.

use std::sync::Mutex;
use std::thread::ThreadId;

/// Owns a `T` and a mutex; the value is only reachable through
/// [`Synchronized::lock`], which applies a callable while the mutex is held.
pub struct Synchronized<T> {
    object: Mutex<T>,
}

impl<T> Synchronized<T> {
    pub fn new(object: T) -> Self {
        Self { object: Mutex::new(object) }
    }

    pub fn lock<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.object.lock().unwrap();
        f(&mut guard)
    }
}

impl<T: Default> Default for Synchronized<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

struct ThreadMapEntry<T> {
    thread_id: Option<ThreadId>,
    object: T,
}

/// A fixed-capacity set of per-thread values, seeded at construction.
///
/// Each OS thread claims a slot on first access; exceeding the capacity is a
/// programming error and aborts. Entries are owned by thread identity, so
/// [`ThreadMap::lock_current`] needs no locking beyond the claim itself.
pub struct ThreadMap<T> {
    entries: Vec<Mutex<ThreadMapEntry<T>>>,
    claimed: Mutex<Vec<(ThreadId, usize)>>,
}

impl<T> ThreadMap<T> {
    pub fn new(thread_count: usize, mut init: impl FnMut() -> T) -> Self {
        let entries = (0..thread_count)
            .map(|_| Mutex::new(ThreadMapEntry { thread_id: None, object: init() }))
            .collect();
        Self { entries, claimed: Mutex::new(Vec::with_capacity(thread_count)) }
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Applies `f` to the calling thread's slot, claiming one on first use.
    pub fn lock_current<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let thread_id = std::thread::current().id();
        let index = self.find_or_claim(thread_id);
        let mut entry = self.entries[index].lock().unwrap();
        f(&mut entry.object)
    }

    /// Applies `f` to every slot in construction order. Exclusive access is
    /// enforced through `&mut self`, so no thread can be inside
    /// [`ThreadMap::lock_current`] at the same time.
    pub fn lock_all(&mut self, mut f: impl FnMut(&mut T)) {
        for entry in &mut self.entries {
            f(&mut entry.get_mut().unwrap().object)
        }
    }

    fn find_or_claim(&self, thread_id: ThreadId) -> usize {
        let mut claimed = self.claimed.lock().unwrap();
        if let Some(&(_, index)) = claimed.iter().find(|(id, _)| *id == thread_id) {
            return index;
        }
        let index = claimed.len();
        assert!(index < self.entries.len(), "exceeded capacity of ThreadMap ({})", self.entries.len());
        claimed.push((thread_id, index));
        self.entries[index].lock().unwrap().thread_id = Some(thread_id);
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synchronized_passes_values_through() {
        let counter = Synchronized::new(0);
        counter.lock(|c| *c += 3);
        assert_eq!(counter.lock(|c| *c), 3);
    }

    #[test]
    fn thread_map_keeps_per_thread_state() {
        let map = ThreadMap::new(4, || 0u32);
        map.lock_current(|v| *v += 1);
        map.lock_current(|v| *v += 1);
        assert_eq!(map.lock_current(|v| *v), 2);

        let handle = {
            let map = &map;
            std::thread::scope(|scope| scope.spawn(move || map.lock_current(|v| *v)).join().unwrap())
        };
        assert_eq!(handle, 0);
    }

    #[test]
    fn lock_all_visits_every_slot() {
        let mut map = ThreadMap::new(3, || 1u32);
        map.lock_current(|v| *v = 5);
        let mut total = 0;
        map.lock_all(|v| total += *v);
        assert_eq!(total, 7);
    }

    #[test]
    #[should_panic(expected = "exceeded capacity")]
    fn exceeding_capacity_is_fatal() {
        let map = ThreadMap::new(1, || ());
        map.lock_current(|()| ());
        std::thread::scope(|scope| {
            let map = &map;
            scope
                .spawn(move || map.lock_current(|()| ()))
                .join()
                // Re-raise the worker panic on the test thread.
                .map_err(std::panic::resume_unwind)
                .ok();
        });
    }
}
