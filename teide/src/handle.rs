//! Reference-counted, index-based ownership for GPU resources.

use std::fmt;
use std::sync::{Arc, Mutex};

use log::debug;

struct Slot<T> {
    ref_count: u32,
    resource: Option<T>,
}

struct RegistryInner<T> {
    resource_type: &'static str,
    slots: Mutex<Vec<Slot<T>>>,
}

impl<T> RegistryInner<T> {
    fn add_ref(&self, index: u64) {
        let mut slots = self.slots.lock().unwrap();
        let slot = &mut slots[index as usize];
        assert!(slot.resource.is_some(), "add_ref on destroyed {} {}", self.resource_type, index);
        slot.ref_count += 1;
        debug!("Adding ref to {} {} (now {})", self.resource_type, index, slot.ref_count);
    }

    fn dec_ref(&self, index: u64) {
        // The resource destructor runs while the registry lock is held, so a
        // concurrent access can never observe a half-destroyed slot.
        let mut slots = self.slots.lock().unwrap();
        let slot = &mut slots[index as usize];
        assert!(slot.ref_count > 0, "ref count underflow on {} {}", self.resource_type, index);
        slot.ref_count -= 1;
        debug!("Decrementing ref from {} {} (now {})", self.resource_type, index, slot.ref_count);
        if slot.ref_count == 0 {
            debug!("Destroying {} {}", self.resource_type, index);
            slot.resource = None;
        }
    }
}

/// An opaque, reference-counted handle to a resource stored in a
/// [`ResourceRegistry`]. Cloning increments the slot's reference count and
/// dropping decrements it; when the last handle drops, the slot is cleared
/// and the resource is destroyed.
pub struct Handle<T> {
    index: u64,
    owner: Arc<RegistryInner<T>>,
}

impl<T> Handle<T> {
    /// The slot index. Stable for the lifetime of the handle; never reused
    /// by the registry.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Accesses the resource while holding the registry lock.
    ///
    /// Panics if the slot has been cleared, which cannot happen while this
    /// handle exists unless the ref count was corrupted.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let slots = self.owner.slots.lock().unwrap();
        let slot = &slots[self.index as usize];
        let resource = slot
            .resource
            .as_ref()
            .unwrap_or_else(|| panic!("access to destroyed {} {}", self.owner.resource_type, self.index));
        f(resource)
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        self.owner.add_ref(self.index);
        Self { index: self.index, owner: Arc::clone(&self.owner) }
    }
}

impl<T> Drop for Handle<T> {
    fn drop(&mut self) {
        self.owner.dec_ref(self.index);
    }
}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && Arc::ptr_eq(&self.owner, &other.owner)
    }
}

impl<T> Eq for Handle<T> {}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle<{}>({})", self.owner.resource_type, self.index)
    }
}

/// Indexed storage of reference-counted resource slots.
///
/// Slots are never reused: the slot vector grows monotonically, so handle
/// indices stay unique for the registry's lifetime. All slot mutations are
/// serialized by one internal mutex.
pub struct ResourceRegistry<T> {
    inner: Arc<RegistryInner<T>>,
}

impl<T> Clone for ResourceRegistry<T> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<T> ResourceRegistry<T> {
    pub fn new(resource_type: &'static str) -> Self {
        Self {
            inner: Arc::new(RegistryInner { resource_type, slots: Mutex::new(Vec::new()) }),
        }
    }

    /// Takes ownership of a resource and returns a handle with ref count 1.
    pub fn insert(&self, resource: T) -> Handle<T> {
        let mut slots = self.inner.slots.lock().unwrap();
        let index = slots.len() as u64;
        debug!("Creating {} {}", self.inner.resource_type, index);
        slots.push(Slot { ref_count: 1, resource: Some(resource) });
        Handle { index, owner: Arc::clone(&self.inner) }
    }

    /// Number of slots ever created, including cleared ones.
    pub fn slot_count(&self) -> usize {
        self.inner.slots.lock().unwrap().len()
    }

    /// Number of slots still holding a live resource.
    pub fn live_count(&self) -> usize {
        self.inner.slots.lock().unwrap().iter().filter(|s| s.resource.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Probe(Arc<AtomicU32>);

    impl Drop for Probe {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn insert_returns_distinct_handles() {
        let registry = ResourceRegistry::new("int");
        let a = registry.insert(1);
        let b = registry.insert(2);
        assert_ne!(a, b);
        assert_eq!(a.with(|v| *v), 1);
        assert_eq!(b.with(|v| *v), 2);
    }

    #[test]
    fn clone_is_identity_equal() {
        let registry = ResourceRegistry::new("int");
        let a = registry.insert(7);
        let b = a.clone();
        assert_eq!(a, b);
        assert_eq!(b.with(|v| *v), 7);
    }

    #[test]
    fn resource_destroyed_when_last_handle_drops() {
        let drops = Arc::new(AtomicU32::new(0));
        let registry = ResourceRegistry::new("probe");
        let a = registry.insert(Probe(drops.clone()));
        let b = a.clone();
        drop(a);
        assert_eq!(drops.load(Ordering::SeqCst), 0);
        assert_eq!(registry.live_count(), 1);
        drop(b);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert_eq!(registry.live_count(), 0);
    }

    #[test]
    fn indices_are_not_reused() {
        let registry = ResourceRegistry::new("int");
        let a = registry.insert(1);
        let first_index = a.index();
        drop(a);
        let b = registry.insert(2);
        assert_ne!(b.index(), first_index);
        assert_eq!(registry.slot_count(), 2);
    }

    #[test]
    fn handles_are_usable_across_threads() {
        let registry = ResourceRegistry::new("int");
        let handle = registry.insert(42);
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let h = handle.clone();
                std::thread::spawn(move || h.with(|v| *v))
            })
            .collect();
        for t in threads {
            assert_eq!(t.join().unwrap(), 42);
        }
        assert_eq!(handle.with(|v| *v), 42);
    }
}
