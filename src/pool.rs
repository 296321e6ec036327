use crate::{
    assert_object,
    device::DeviceId,
    queue::QueueId,
    track::{DependencyTracker, DeviceDependent},
    OutOfMemory,
};
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    fmt::Debug,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, ThreadId},
};

bitflags::bitflags! {
    /// Command pool creation behavior.
    #[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
    pub struct PoolFlags: u32 {
        /// Buffers from the pool are short-lived.
        const TRANSIENT             = 0b01;
        /// Buffers from the pool may be individually reset and reused.
        const RESET_COMMAND_BUFFER  = 0b10;
    }
}

pub trait CommandPoolTrait: Debug + Send + Sync + 'static {
    fn reset(&self);

    fn destroy(&self);
}

/// Command pool created for one (thread, queue, flags) key.
///
/// Pools are handed out by the owning device's cache and never migrate
/// between threads; a thread asking for the same key again gets the same
/// pool back.
#[derive(Debug)]
pub struct CommandPool {
    inner: Box<dyn CommandPoolTrait>,
    queue: QueueId,
    flags: PoolFlags,
    thread: ThreadId,
    device: DeviceId,
    destroyed: AtomicBool,
}

impl CommandPool {
    pub fn queue(&self) -> QueueId {
        self.queue
    }

    pub fn flags(&self) -> PoolFlags {
        self.flags
    }

    /// Thread the pool was created for.
    pub fn thread(&self) -> ThreadId {
        self.thread
    }

    pub fn device(&self) -> DeviceId {
        self.device
    }

    /// Recycles all buffers allocated from the pool.
    pub fn reset(&self) {
        assert!(
            !self.destroyed.load(Ordering::Acquire),
            "command pool used after device teardown"
        );
        self.inner.reset();
    }

    fn destroy_once(&self) {
        if !self.destroyed.swap(true, Ordering::AcqRel) {
            self.inner.destroy();
        }
    }
}

impl DeviceDependent for CommandPool {
    fn destroy(&self) {
        self.destroy_once();
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        self.destroy_once();
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct PoolKey {
    thread: ThreadId,
    queue: QueueId,
    flags: PoolFlags,
}

/// Per-device cache of command pools.
#[derive(Debug, Default)]
pub(crate) struct PoolCache {
    pools: Mutex<HashMap<PoolKey, Arc<CommandPool>>>,
}

impl PoolCache {
    pub fn new() -> Self {
        PoolCache {
            pools: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the pool for (current thread, `queue`, `flags`), creating it
    /// on first access. The lock is held across creation, so concurrent
    /// first access from several threads still creates one pool per key.
    pub fn get_or_create(
        &self,
        device: DeviceId,
        queue: QueueId,
        flags: PoolFlags,
        tracker: &DependencyTracker,
        create: impl FnOnce() -> Result<Box<dyn CommandPoolTrait>, OutOfMemory>,
    ) -> Result<Arc<CommandPool>, OutOfMemory> {
        let key = PoolKey {
            thread: thread::current().id(),
            queue,
            flags,
        };

        let mut pools = self.pools.lock();
        if let Some(pool) = pools.get(&key) {
            return Ok(pool.clone());
        }

        let pool = Arc::new(CommandPool {
            inner: create()?,
            queue,
            flags,
            thread: key.thread,
            device,
            destroyed: AtomicBool::new(false),
        });
        tracker.register(&pool);
        tracing::trace!(?queue, ?flags, "command pool created");
        pools.insert(key, pool.clone());
        Ok(pool)
    }

    /// Drops the cache's strong references. Called during device teardown
    /// after the tracker has destroyed the pools.
    pub fn clear(&self) {
        self.pools.lock().clear();
    }
}

#[allow(dead_code)]
fn check() {
    assert_object::<CommandPool>();
    assert_object::<PoolCache>();
}
