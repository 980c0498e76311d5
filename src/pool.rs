//! Circular pool of hardware buffers for one component port.
//!
//! The pool allocates a fixed set of buffers from the component at creation
//! and hands them out in ring order. Buffers are checked out with
//! [`BufferPool::acquire`] and must come back through
//! [`BufferPool::release`] in the order they were issued.
//!
//! # Concurrency
//!
//! `acquire` and `release` serialize on the pool's mutex and never wait for
//! availability: an exhausted pool yields `Ok(None)` and retry policy is the
//! caller's business. Concurrent acquirers get consecutive ring positions in
//! lock order.
//!
//! [`BufferPool::peek_current`] does not take the mutex. It reads the cursor
//! snapshot and is only meaningful when a single thread fills or drains
//! buffers while bookkeeping happens elsewhere under the lock.

use crate::component::{BufferDescriptor, ClientContext, Component, PortIndex};
use crate::error::{Error, ReleaseError, Result};
use crate::invariant_ppt::{
    assert_invariant, ALLOCATION_ROLLBACK, DESTROY_RELEASES_ALL, RELEASE_IN_ISSUE_ORDER,
    RING_CURSOR_BOUNDED, RING_REMAINING_BOUNDED,
};
use crate::registry::PoolId;
use crate::reporter::ErrorReporter;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

/// How the pool's buffers were obtained.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignMode {
    /// Buffers are allocated by the component itself.
    Allocate,
}

/// Parameters for building a pool on one port.
///
/// A zero size or count means "use what the port currently reports".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferRequest {
    pub port: PortIndex,
    pub context: ClientContext,
    pub size: usize,
    pub count: usize,
}

impl BufferRequest {
    /// Request the port's default buffer size and count.
    pub fn new(port: PortIndex) -> Self {
        Self {
            port,
            context: ClientContext::default(),
            size: 0,
            count: 0,
        }
    }

    pub fn size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    pub fn count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    pub fn context(mut self, context: ClientContext) -> Self {
        self.context = context;
        self
    }
}

/// A buffer checked out of a pool.
///
/// Not `Clone`: the only way back into the pool is by value through
/// [`BufferPool::release`].
#[derive(Debug, PartialEq, Eq)]
pub struct Buffer {
    pool: u64,
    slot: usize,
    descriptor: BufferDescriptor,
}

impl Buffer {
    /// Ring position this buffer was issued from.
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Hardware descriptor of the buffer.
    pub fn descriptor(&self) -> &BufferDescriptor {
        &self.descriptor
    }
}

/// Snapshot of the buffer at the pool's cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeekedBuffer {
    pub slot: usize,
    pub descriptor: BufferDescriptor,
}

#[derive(Debug)]
struct Ring {
    remaining: usize,
}

/// Fixed-capacity ring of hardware buffers for one component port.
pub struct BufferPool {
    id: Option<PoolId>,
    serial: u64,
    component: Arc<dyn Component>,
    port: PortIndex,
    mode: AssignMode,
    buffer_size: usize,
    slots: Box<[BufferDescriptor]>,
    /// Written only while `ring` is locked.
    cursor: AtomicUsize,
    valid: AtomicBool,
    ring: Mutex<Ring>,
    reporter: Arc<ErrorReporter>,
}

impl BufferPool {
    /// Allocate a pool of buffers on `request.port` of `component`.
    ///
    /// Every component call goes through `reporter`. If an allocation fails,
    /// the buffers obtained so far are released again before the error is
    /// returned.
    pub fn create(
        component: Arc<dyn Component>,
        request: BufferRequest,
        reporter: Arc<ErrorReporter>,
    ) -> Result<Self> {
        let name = component.name().to_string();
        let port = request.port;
        let (mut size, mut count) = (request.size, request.count);

        if size == 0 || count == 0 {
            let defaults = reporter
                .report(component.port_requirements(port))
                .map_err(|e| Error::hardware(&name, "port_requirements", e))?;
            if size == 0 {
                size = defaults.buffer_size;
            }
            if count == 0 {
                count = defaults.buffer_count;
            }
        }
        if size == 0 || count == 0 {
            return Err(Error::InvalidArgument(format!(
                "{} port {} reports {} buffers of {} bytes",
                name, port, count, size
            )));
        }

        tracing::info!(component = %name, %port, size, count, "allocating buffer pool");
        let mut slots = Vec::with_capacity(count);
        for i in 0..count {
            match reporter.report(component.allocate_buffer(port, request.context, size)) {
                Ok(descriptor) => {
                    tracing::debug!(component = %name, %port, index = i, id = descriptor.id, "new buffer");
                    slots.push(descriptor);
                }
                Err(err) => {
                    let (returned, failed) = roll_back(component.as_ref(), port, &slots, &reporter);
                    assert_invariant(
                        ALLOCATION_ROLLBACK,
                        returned + failed == slots.len(),
                        "rollback skipped allocated buffers",
                        Some(name.as_str()),
                    );
                    tracing::warn!(
                        component = %name, %port, index = i, rolled_back = returned,
                        "buffer allocation failed: {}", err
                    );
                    return Err(Error::hardware(&name, "allocate_buffer", err));
                }
            }
        }

        assert_invariant(
            RING_REMAINING_BOUNDED,
            slots.len() == count,
            "pool starts with every buffer available",
            Some(name.as_str()),
        );

        Ok(Self {
            id: None,
            serial: NEXT_SERIAL.fetch_add(1, Ordering::Relaxed),
            component,
            port,
            mode: AssignMode::Allocate,
            buffer_size: size,
            slots: slots.into_boxed_slice(),
            cursor: AtomicUsize::new(0),
            valid: AtomicBool::new(true),
            ring: Mutex::new(Ring { remaining: count }),
            reporter,
        })
    }

    pub(crate) fn with_id(mut self, id: PoolId) -> Self {
        self.id = Some(id);
        self
    }

    /// Check out the buffer at the cursor.
    ///
    /// Returns `Ok(None)` without side effects when every buffer is out.
    pub fn acquire(&self) -> Result<Option<Buffer>> {
        let mut ring = self.ring.lock();
        if !self.valid.load(Ordering::Acquire) {
            return Err(self.invalid("acquire"));
        }
        if ring.remaining == 0 {
            return Ok(None);
        }

        let slot = self.cursor.load(Ordering::Relaxed);
        let next = if slot + 1 == self.slots.len() { 0 } else { slot + 1 };
        self.cursor.store(next, Ordering::Release);
        ring.remaining -= 1;

        Ok(Some(Buffer {
            pool: self.serial,
            slot,
            descriptor: self.slots[slot],
        }))
    }

    /// Return a buffer to the pool.
    ///
    /// The buffer must be the oldest one still checked out; releases follow
    /// issue order. Anything else (out of order, foreign pool, nothing
    /// outstanding) is rejected and the buffer is handed back in the error.
    pub fn release(&self, buffer: Buffer) -> std::result::Result<(), ReleaseError> {
        let mut ring = self.ring.lock();
        if !self.valid.load(Ordering::Acquire) {
            return Err(ReleaseError::new(buffer, self.invalid("release")));
        }
        if buffer.pool != self.serial {
            return Err(ReleaseError::new(
                buffer,
                Error::InvalidArgument(format!("buffer does not belong to {}", self.label())),
            ));
        }

        let capacity = self.slots.len();
        if ring.remaining == capacity {
            return Err(ReleaseError::new(
                buffer,
                Error::InvalidArgument(format!("{} has no buffer outstanding", self.label())),
            ));
        }

        let expected = (self.cursor.load(Ordering::Relaxed) + ring.remaining) % capacity;
        if buffer.slot != expected || self.slots[expected] != buffer.descriptor {
            tracing::warn!(pool = %self.label(), expected, got = buffer.slot, "out-of-order release rejected");
            let msg = format!(
                "{} expects slot {} back first, got slot {}",
                self.label(),
                expected,
                buffer.slot
            );
            return Err(ReleaseError::new(buffer, Error::InvalidArgument(msg)));
        }

        let before = ring.remaining;
        ring.remaining += 1;
        assert_invariant(
            RING_REMAINING_BOUNDED,
            ring.remaining == before + 1 && ring.remaining <= capacity,
            "release must return exactly one buffer",
            None,
        );
        assert_invariant(
            RELEASE_IN_ISSUE_ORDER,
            ring.remaining == capacity
                || (self.cursor.load(Ordering::Relaxed) + ring.remaining) % capacity
                    == (buffer.slot + 1) % capacity,
            "next expected release does not follow the released slot",
            None,
        );
        Ok(())
    }

    /// The buffer at the cursor, read without taking the pool mutex.
    ///
    /// Intended for the single thread that fills or drains buffers; with
    /// concurrent acquirers the result may already be stale on return.
    pub fn peek_current(&self) -> Result<PeekedBuffer> {
        if !self.valid.load(Ordering::Acquire) {
            return Err(self.invalid("peek_current"));
        }
        let slot = self.cursor.load(Ordering::Acquire);
        Ok(PeekedBuffer {
            slot,
            descriptor: self.slots[slot],
        })
    }

    /// Hand every buffer back to the component and invalidate the pool.
    ///
    /// Buffers are released in index order regardless of which are checked
    /// out. A failed release does not stop the others; the first failure is
    /// returned. Calling this twice yields `InvalidHandle`.
    pub fn destroy(&self) -> Result<()> {
        {
            let mut ring = self.ring.lock();
            if !self.valid.swap(false, Ordering::AcqRel) {
                return Err(self.invalid("destroy"));
            }
            ring.remaining = 0;
            self.cursor.store(0, Ordering::Release);
        }

        let name = self.component.name();
        let mut released = 0;
        let mut failed = 0;
        let mut first_err = None;
        for descriptor in self.slots.iter() {
            match self
                .reporter
                .report(self.component.release_buffer(self.port, descriptor))
            {
                Ok(()) => released += 1,
                Err(err) => {
                    failed += 1;
                    first_err.get_or_insert(err);
                }
            }
        }

        assert_invariant(
            DESTROY_RELEASES_ALL,
            released + failed == self.slots.len(),
            "destroy skipped buffers",
            Some(name),
        );
        tracing::info!(pool = %self.label(), released, failed, "buffer pool destroyed");

        match first_err {
            Some(err) => Err(Error::hardware(name, "release_buffer", err)),
            None => Ok(()),
        }
    }

    /// Number of buffers in the ring.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Buffers currently available to `acquire`.
    pub fn remaining(&self) -> usize {
        self.ring.lock().remaining
    }

    /// Buffers currently checked out.
    pub fn outstanding(&self) -> usize {
        let ring = self.ring.lock();
        if self.valid.load(Ordering::Acquire) {
            self.slots.len() - ring.remaining
        } else {
            0
        }
    }

    /// Current cursor position.
    pub fn cursor(&self) -> usize {
        let cursor = self.cursor.load(Ordering::Acquire);
        debug_assert!(cursor < self.slots.len().max(1));
        cursor
    }

    pub fn id(&self) -> Option<PoolId> {
        self.id
    }

    pub fn port(&self) -> PortIndex {
        self.port
    }

    pub fn mode(&self) -> AssignMode {
        self.mode
    }

    /// Size in bytes of each buffer.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Name of the component owning the buffers.
    pub fn component_name(&self) -> &str {
        self.component.name()
    }

    /// False once [`BufferPool::destroy`] has run.
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    /// Verify the ring bookkeeping. Cheap, but takes the pool mutex.
    pub fn check_invariants(&self) {
        let ring = self.ring.lock();
        let label = self.label();
        assert_invariant(
            RING_REMAINING_BOUNDED,
            ring.remaining <= self.slots.len(),
            "remaining exceeds capacity",
            Some(label.as_str()),
        );
        assert_invariant(
            RING_CURSOR_BOUNDED,
            self.cursor.load(Ordering::Relaxed) < self.slots.len(),
            "cursor outside the ring",
            Some(label.as_str()),
        );
    }

    fn label(&self) -> String {
        format!("{}:{}", self.component.name(), self.port)
    }

    fn invalid(&self, operation: &str) -> Error {
        Error::InvalidHandle(format!("{} on destroyed pool {}", operation, self.label()))
    }
}

impl fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferPool")
            .field("id", &self.id)
            .field("component", &self.component.name())
            .field("port", &self.port)
            .field("capacity", &self.slots.len())
            .field("cursor", &self.cursor.load(Ordering::Relaxed))
            .field("valid", &self.is_valid())
            .finish()
    }
}

impl Drop for BufferPool {
    fn drop(&mut self) {
        if self.is_valid() {
            if let Err(err) = self.destroy() {
                tracing::error!("destroying pool on drop failed: {}", err);
            }
        }
    }
}

/// Release already allocated buffers after a failed create. Returns how many
/// the component accepted back and how many releases failed.
fn roll_back(
    component: &dyn Component,
    port: PortIndex,
    allocated: &[BufferDescriptor],
    reporter: &ErrorReporter,
) -> (usize, usize) {
    let mut returned = 0;
    let mut failed = 0;
    for descriptor in allocated {
        match reporter.report(component.release_buffer(port, descriptor)) {
            Ok(()) => returned += 1,
            Err(_) => failed += 1,
        }
    }
    (returned, failed)
}
