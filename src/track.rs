use parking_lot::Mutex;
use slab::Slab;
use std::{
    fmt::{self, Debug},
    sync::{Arc, Weak},
};

/// Resource whose destruction must precede that of the device it was
/// created from. Implementations must tolerate `destroy` being called
/// more than once.
pub trait DeviceDependent: Send + Sync + 'static {
    fn destroy(&self);
}

/// Token returned by [`DependencyTracker::register`]; releases the entry
/// when the dependent goes away before the device does.
#[derive(Clone, Copy, Debug)]
pub struct DependencyToken(usize);

/// Registry of non-owning back-references from a device to the resources
/// built on top of it.
///
/// Entries never extend a dependent's lifetime; a dependent dropped early
/// simply leaves a dead entry behind. Slots are tombstoned rather than
/// reused, so walking them in slot order is walking them in registration
/// order.
pub struct DependencyTracker {
    entries: Mutex<Slab<Option<Weak<dyn DeviceDependent>>>>,
}

impl Debug for DependencyTracker {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("DependencyTracker")
            .field("entries", &self.entries.lock().len())
            .finish()
    }
}

impl DependencyTracker {
    pub fn new() -> Self {
        DependencyTracker {
            entries: Mutex::new(Slab::new()),
        }
    }

    pub fn register<T>(&self, dependent: &Arc<T>) -> DependencyToken
    where
        T: DeviceDependent,
    {
        let weak = Arc::downgrade(dependent);
        let weak: Weak<dyn DeviceDependent> = weak;
        DependencyToken(self.entries.lock().insert(Some(weak)))
    }

    /// Forgets an entry without destroying anything.
    pub fn release(&self, token: DependencyToken) {
        if let Some(slot) = self.entries.lock().get_mut(token.0) {
            *slot = None;
        }
    }

    /// Destroys every still-live dependent, in registration order.
    /// The caller is responsible for waiting on device idle first.
    pub fn teardown(&self) {
        let mut entries = self.entries.lock();
        let mut destroyed = 0usize;
        for (_, slot) in entries.iter_mut() {
            if let Some(weak) = slot.take() {
                if let Some(dependent) = weak.upgrade() {
                    dependent.destroy();
                    destroyed += 1;
                }
            }
        }
        entries.clear();
        tracing::debug!(destroyed, "device dependents destroyed");
    }

    #[cfg(test)]
    pub(crate) fn live(&self) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|(_, slot)| {
                slot.as_ref().map_or(false, |weak| weak.upgrade().is_some())
            })
            .count()
    }
}

impl Default for DependencyTracker {
    fn default() -> Self {
        DependencyTracker::new()
    }
}
