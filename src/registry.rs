//! Fixed-capacity table of live buffer pools.
//!
//! The registry is the accounting side of pool ownership: every pool created
//! through it occupies one slot until it is destroyed, and
//! [`PoolRegistry::destroy_all`] guarantees no hardware buffer outlives the
//! session. Callers keep the returned `Arc<BufferPool>` for direct use and can
//! also look pools up again by [`PoolId`].

use crate::component::Component;
use crate::error::{Error, Result};
use crate::invariant_ppt::{
    assert_invariant, REGISTRY_RESERVATION_HELD, REGISTRY_SLOT_EXCLUSIVE,
    TEARDOWN_INVALIDATES_POOLS,
};
use crate::pool::{BufferPool, BufferRequest};
use crate::reporter::ErrorReporter;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Default number of registry slots.
pub const DEFAULT_REGISTRY_CAPACITY: usize = 256;

/// Generation-checked reference to a registry slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PoolId {
    slot: usize,
    generation: u64,
}

impl PoolId {
    pub fn slot(&self) -> usize {
        self.slot
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pool{}v{}", self.slot, self.generation)
    }
}

#[derive(Default)]
struct Slot {
    generation: u64,
    /// A create is allocating buffers for this slot.
    reserved: bool,
    pool: Option<Arc<BufferPool>>,
}

impl Slot {
    fn is_free(&self) -> bool {
        !self.reserved && self.pool.is_none()
    }
}

/// Owner of every pool created in a session.
pub struct PoolRegistry {
    slots: Mutex<Vec<Slot>>,
    reporter: Arc<ErrorReporter>,
}

impl PoolRegistry {
    pub fn new(capacity: usize, reporter: Arc<ErrorReporter>) -> Self {
        let slots = (0..capacity).map(|_| Slot::default()).collect();
        Self {
            slots: Mutex::new(slots),
            reporter,
        }
    }

    /// Build a pool in the first free slot.
    ///
    /// Fails with `ResourceExhausted` before touching the component when the
    /// table is full. The slot is reserved while buffers are allocated and
    /// the registry lock is not held across component calls, so the error
    /// callback may query the registry.
    pub fn create(
        &self,
        component: Arc<dyn Component>,
        request: BufferRequest,
    ) -> Result<Arc<BufferPool>> {
        let id = {
            let mut slots = self.slots.lock();
            let Some(index) = slots.iter().position(Slot::is_free) else {
                tracing::warn!(capacity = slots.len(), "pool registry full");
                return Err(Error::ResourceExhausted(format!(
                    "all {} registry slots are in use",
                    slots.len()
                )));
            };
            let slot = &mut slots[index];
            slot.reserved = true;
            PoolId {
                slot: index,
                generation: slot.generation,
            }
        };

        let built = BufferPool::create(component, request, self.reporter.clone());

        let mut slots = self.slots.lock();
        let slot = &mut slots[id.slot];
        assert_invariant(
            REGISTRY_RESERVATION_HELD,
            slot.reserved && slot.pool.is_none() && slot.generation == id.generation,
            "reserved slot changed while its pool was built",
            None,
        );
        slot.reserved = false;
        let pool = Arc::new(built?.with_id(id));
        slot.pool = Some(pool.clone());

        assert_invariant(
            REGISTRY_SLOT_EXCLUSIVE,
            slots.iter().filter(|s| s.pool.as_ref().is_some_and(|p| Arc::ptr_eq(p, &pool))).count() == 1,
            "pool registered in more than one slot",
            None,
        );
        tracing::debug!(%id, component = pool.component_name(), "pool registered");
        Ok(pool)
    }

    /// Look up a live pool.
    pub fn get(&self, id: PoolId) -> Result<Arc<BufferPool>> {
        let slots = self.slots.lock();
        slots
            .get(id.slot)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.pool.clone())
            .ok_or_else(|| Error::InvalidHandle(format!("{} is not registered", id)))
    }

    /// Ids of every registered pool, in slot order.
    pub fn ids(&self) -> Vec<PoolId> {
        self.slots
            .lock()
            .iter()
            .enumerate()
            .filter(|(_, s)| s.pool.is_some())
            .map(|(slot, s)| PoolId {
                slot,
                generation: s.generation,
            })
            .collect()
    }

    /// Destroy one pool and free its slot.
    ///
    /// The slot is freed even when the component fails to take every buffer
    /// back; that failure is still returned.
    pub fn destroy(&self, id: PoolId) -> Result<()> {
        let pool = {
            let mut slots = self.slots.lock();
            let slot = slots
                .get_mut(id.slot)
                .filter(|s| s.generation == id.generation && s.pool.is_some())
                .ok_or_else(|| Error::InvalidHandle(format!("{} is not registered", id)))?;
            slot.generation += 1;
            slot.pool.take()
        };
        match pool {
            Some(pool) => pool.destroy(),
            None => Ok(()),
        }
    }

    /// Destroy every registered pool. Returns how many were torn down.
    ///
    /// Failures are reported and logged; teardown always continues. A pool
    /// still being created is not part of the teardown.
    pub fn destroy_all(&self) -> usize {
        let pools: Vec<Arc<BufferPool>> = {
            let mut slots = self.slots.lock();
            slots
                .iter_mut()
                .filter_map(|s| {
                    let pool = s.pool.take()?;
                    s.generation += 1;
                    Some(pool)
                })
                .collect()
        };

        let mut destroyed = 0;
        for pool in &pools {
            match pool.destroy() {
                Ok(()) => {}
                // Someone destroyed it directly; its buffers are already back.
                Err(Error::InvalidHandle(_)) => {}
                Err(err) => tracing::error!(pool = ?pool.id(), "teardown failed: {}", err),
            }
            destroyed += 1;
        }

        assert_invariant(
            TEARDOWN_INVALIDATES_POOLS,
            pools.iter().all(|pool| !pool.is_valid()),
            "pool still valid after teardown",
            None,
        );
        if destroyed > 0 {
            tracing::info!(destroyed, "pool registry torn down");
        }
        destroyed
    }

    /// Number of registered pools.
    pub fn len(&self) -> usize {
        self.slots.lock().iter().filter(|s| s.pool.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of slots.
    pub fn capacity(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn reporter(&self) -> &Arc<ErrorReporter> {
        &self.reporter
    }
}

impl fmt::Debug for PoolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolRegistry")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}
