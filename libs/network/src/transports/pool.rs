//! Buffer Pools for Connection Reuse
//!
//! Connections borrow an inbound read buffer and an outbound message builder
//! instead of allocating per request. Pools are unbounded and grow lazily:
//! checkout never blocks, it allocates when the idle set is empty.
//!
//! A checked-out object is wrapped in [`Pooled`], which resets the object
//! and puts it back when dropped, so every exit path of a handler returns
//! what it borrowed. Objects whose capacity grew past
//! [`MAX_RETAINED_CAPACITY`] are replaced with fresh ones on return instead
//! of being kept, so one large request cannot pin memory forever.

use bytes::BytesMut;
use codec::MessageBuilder;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};

/// Initial capacity for new inbound buffers (4KB)
pub const DEFAULT_BUFFER_CAPACITY: usize = 4 * 1024;

/// Objects above this capacity are dropped on return (64KB)
pub const MAX_RETAINED_CAPACITY: usize = 64 * 1024;

/// Something a pool can hand out repeatedly
pub trait Reusable: Send {
    /// Construct a fresh object
    fn fresh() -> Self;

    /// Clear contents so the next borrower sees nothing of the previous one
    fn reset(&mut self);

    /// Currently held capacity in bytes
    fn retained_capacity(&self) -> usize;
}

impl Reusable for BytesMut {
    fn fresh() -> Self {
        BytesMut::with_capacity(DEFAULT_BUFFER_CAPACITY)
    }

    fn reset(&mut self) {
        self.clear();
    }

    fn retained_capacity(&self) -> usize {
        self.capacity()
    }
}

impl Reusable for MessageBuilder {
    fn fresh() -> Self {
        MessageBuilder::new()
    }

    fn reset(&mut self) {
        MessageBuilder::reset(self);
    }

    fn retained_capacity(&self) -> usize {
        self.capacity()
    }
}

/// Pool usage counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Objects allocated because the idle set was empty
    pub created: u64,
    /// Total checkouts served
    pub checkouts: u64,
    /// Objects currently idle in the pool
    pub idle: usize,
}

/// Unbounded pool of reusable objects
pub struct ObjectPool<T: Reusable> {
    idle: Mutex<Vec<T>>,
    created: AtomicU64,
    checkouts: AtomicU64,
}

impl<T: Reusable> Default for ObjectPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Reusable> ObjectPool<T> {
    pub fn new() -> Self {
        Self {
            idle: Mutex::new(Vec::new()),
            created: AtomicU64::new(0),
            checkouts: AtomicU64::new(0),
        }
    }

    /// Take an idle object, or allocate one; never blocks on pool state
    pub fn checkout(&self) -> Pooled<'_, T> {
        self.checkouts.fetch_add(1, Ordering::Relaxed);
        // Pop under the lock, construct outside it
        let reused = self.idle.lock().pop();
        let object = reused.unwrap_or_else(|| {
            self.created.fetch_add(1, Ordering::Relaxed);
            T::fresh()
        });
        Pooled {
            object: Some(object),
            pool: self,
        }
    }

    fn give_back(&self, mut object: T) {
        if object.retained_capacity() > MAX_RETAINED_CAPACITY {
            object = T::fresh();
        } else {
            object.reset();
        }
        self.idle.lock().push(object);
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            created: self.created.load(Ordering::Relaxed),
            checkouts: self.checkouts.load(Ordering::Relaxed),
            idle: self.idle.lock().len(),
        }
    }
}

/// Exclusive handle to a pooled object; returns it on drop
pub struct Pooled<'a, T: Reusable> {
    object: Option<T>,
    pool: &'a ObjectPool<T>,
}

impl<T: Reusable> Deref for Pooled<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Only None after drop has taken the object
        self.object.as_ref().unwrap_or_else(|| unreachable!())
    }
}

impl<T: Reusable> DerefMut for Pooled<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.object.as_mut().unwrap_or_else(|| unreachable!())
    }
}

impl<T: Reusable> Drop for Pooled<'_, T> {
    fn drop(&mut self) {
        if let Some(object) = self.object.take() {
            self.pool.give_back(object);
        }
    }
}

/// The two pools a connection handler draws from
#[derive(Default)]
pub struct BufferPools {
    inbound: ObjectPool<BytesMut>,
    outbound: ObjectPool<MessageBuilder>,
}

impl BufferPools {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn checkout_inbound_buffer(&self) -> Pooled<'_, BytesMut> {
        self.inbound.checkout()
    }

    /// Reset and return a buffer; equivalent to dropping the handle
    pub fn return_inbound_buffer(&self, buffer: Pooled<'_, BytesMut>) {
        drop(buffer);
    }

    pub fn checkout_outbound_builder(&self) -> Pooled<'_, MessageBuilder> {
        self.outbound.checkout()
    }

    /// Reset and return a builder; equivalent to dropping the handle
    pub fn return_outbound_builder(&self, builder: Pooled<'_, MessageBuilder>) {
        drop(builder);
    }

    pub fn inbound_stats(&self) -> PoolStats {
        self.inbound.stats()
    }

    pub fn outbound_stats(&self) -> PoolStats {
        self.outbound.stats()
    }
}
