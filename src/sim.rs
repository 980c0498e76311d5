//! In-memory component for tests, benches and demos.
//!
//! `SimComponent` follows the lifecycle rules a real component enforces:
//! `Loaded -> Idle` completes only once every configured port has its full
//! buffer count allocated, and `Idle -> Loaded` only once every buffer has
//! been released. Failures can be injected per call.

use crate::component::{
    BufferDescriptor, ClientContext, Component, ComponentEvent, ComponentState, PortIndex,
    PortRequirements,
};
use crate::error::{HardwareError, HardwareErrorKind};
use crate::sync::StateNotifier;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

pub const ERROR_INSUFFICIENT_RESOURCES: u32 = 0x8000_1000;
pub const ERROR_BAD_PORT_INDEX: u32 = 0x8000_101b;
pub const ERROR_INCORRECT_STATE_TRANSITION: u32 = 0x8000_1017;
pub const ERROR_HARDWARE: u32 = 0x8000_1009;

#[derive(Debug)]
struct Lifecycle {
    current: ComponentState,
    pending: Option<(ComponentState, Instant)>,
}

/// Simulated hardware component.
#[derive(Debug)]
pub struct SimComponent {
    name: String,
    ports: HashMap<PortIndex, PortRequirements>,
    transition_delay: Duration,
    stuck: AtomicBool,
    fail_allocation_at: Option<usize>,
    fail_release: AtomicBool,
    notifier: Option<Arc<StateNotifier>>,
    next_id: AtomicU64,
    allocation_calls: AtomicUsize,
    allocated: AtomicUsize,
    released: AtomicUsize,
    live: Mutex<HashMap<u64, PortIndex>>,
    lifecycle: Mutex<Lifecycle>,
}

impl SimComponent {
    /// A component in `Loaded` with no ports.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ports: HashMap::new(),
            transition_delay: Duration::ZERO,
            stuck: AtomicBool::new(false),
            fail_allocation_at: None,
            fail_release: AtomicBool::new(false),
            notifier: None,
            next_id: AtomicU64::new(0x1000),
            allocation_calls: AtomicUsize::new(0),
            allocated: AtomicUsize::new(0),
            released: AtomicUsize::new(0),
            live: Mutex::new(HashMap::new()),
            lifecycle: Mutex::new(Lifecycle {
                current: ComponentState::Loaded,
                pending: None,
            }),
        }
    }

    /// Add a port with its default buffer requirements.
    pub fn with_port(mut self, port: PortIndex, buffer_size: usize, buffer_count: usize) -> Self {
        self.ports.insert(
            port,
            PortRequirements {
                buffer_size,
                buffer_count,
            },
        );
        self
    }

    /// Requested transitions take at least this long to complete.
    pub fn with_transition_delay(mut self, delay: Duration) -> Self {
        self.transition_delay = delay;
        self
    }

    /// The `n`-th allocation call (1-based) fails.
    pub fn fail_allocation_at(mut self, n: usize) -> Self {
        self.fail_allocation_at = Some(n);
        self
    }

    /// Deliver a `CmdComplete` event to `notifier` when a transition lands.
    pub fn with_notifier(mut self, notifier: Arc<StateNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Accept state requests but never complete them.
    pub fn set_stuck(&self, stuck: bool) {
        self.stuck.store(stuck, Ordering::SeqCst);
    }

    /// Make every release call fail.
    pub fn set_fail_release(&self, fail: bool) {
        self.fail_release.store(fail, Ordering::SeqCst);
    }

    /// Force the current state, dropping any pending transition.
    pub fn force_state(&self, state: ComponentState) {
        let mut lc = self.lifecycle.lock();
        lc.current = state;
        lc.pending = None;
    }

    /// Successful allocations so far.
    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::SeqCst)
    }

    /// Successful releases so far.
    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    /// Buffers currently held by clients.
    pub fn live_buffers(&self) -> usize {
        self.live.lock().len()
    }

    fn ports_populated(&self) -> bool {
        let live = self.live.lock();
        self.ports.iter().all(|(port, req)| {
            live.values().filter(|p| *p == port).count() >= req.buffer_count
        })
    }

    /// Whether the pending transition's resource precondition holds.
    fn ready_for(&self, from: ComponentState, to: ComponentState) -> bool {
        match (from, to) {
            (ComponentState::Loaded, ComponentState::Idle) => self.ports_populated(),
            (ComponentState::Idle, ComponentState::Loaded) => self.live_buffers() == 0,
            _ => true,
        }
    }

    fn legal(from: ComponentState, to: ComponentState) -> bool {
        use ComponentState::*;
        matches!(
            (from, to),
            (Loaded, Idle)
                | (Loaded, WaitForResources)
                | (WaitForResources, Loaded)
                | (Idle, Loaded)
                | (Idle, Executing)
                | (Idle, Pause)
                | (Executing, Idle)
                | (Executing, Pause)
                | (Pause, Idle)
                | (Pause, Executing)
                | (_, Invalid)
        )
    }

    fn settle(&self, lc: &mut Lifecycle) {
        if self.stuck.load(Ordering::SeqCst) {
            return;
        }
        if let Some((target, requested)) = lc.pending {
            if requested.elapsed() >= self.transition_delay && self.ready_for(lc.current, target) {
                lc.current = target;
                lc.pending = None;
            }
        }
    }
}

impl Component for SimComponent {
    fn name(&self) -> &str {
        &self.name
    }

    fn port_requirements(&self, port: PortIndex) -> Result<PortRequirements, HardwareError> {
        self.ports
            .get(&port)
            .copied()
            .ok_or(HardwareError::new(HardwareErrorKind::BadPortIndex, ERROR_BAD_PORT_INDEX))
    }

    fn allocate_buffer(
        &self,
        port: PortIndex,
        _context: ClientContext,
        size: usize,
    ) -> Result<BufferDescriptor, HardwareError> {
        let call = self.allocation_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.ports.contains_key(&port) {
            return Err(HardwareError::new(HardwareErrorKind::BadPortIndex, ERROR_BAD_PORT_INDEX));
        }
        if self.fail_allocation_at == Some(call) {
            return Err(HardwareError::new(
                HardwareErrorKind::InsufficientResources,
                ERROR_INSUFFICIENT_RESOURCES,
            ));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.live.lock().insert(id, port);
        self.allocated.fetch_add(1, Ordering::SeqCst);
        Ok(BufferDescriptor { id, port, size })
    }

    fn release_buffer(
        &self,
        port: PortIndex,
        descriptor: &BufferDescriptor,
    ) -> Result<(), HardwareError> {
        if self.fail_release.load(Ordering::SeqCst) {
            return Err(HardwareError::new(HardwareErrorKind::Hardware, ERROR_HARDWARE));
        }
        let mut live = self.live.lock();
        match live.get(&descriptor.id).copied() {
            Some(p) if p == port => {
                live.remove(&descriptor.id);
                self.released.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            Some(_) => Err(HardwareError::new(HardwareErrorKind::BadPortIndex, ERROR_BAD_PORT_INDEX)),
            None => Err(HardwareError::new(HardwareErrorKind::BadParameter, 0x8000_1005)),
        }
    }

    fn state(&self) -> Result<ComponentState, HardwareError> {
        let mut lc = self.lifecycle.lock();
        self.settle(&mut lc);
        Ok(lc.current)
    }

    fn request_state(&self, target: ComponentState) -> Result<(), HardwareError> {
        let mut lc = self.lifecycle.lock();
        self.settle(&mut lc);
        if lc.current == target {
            return Ok(());
        }
        if !Self::legal(lc.current, target) {
            return Err(HardwareError::new(
                HardwareErrorKind::IncorrectStateTransition,
                ERROR_INCORRECT_STATE_TRANSITION,
            ));
        }
        lc.pending = Some((target, Instant::now()));

        // Mimic the component runtime's event thread.
        if let Some(notifier) = self.notifier.clone() {
            let delay = self.transition_delay;
            let name = self.name.clone();
            thread::spawn(move || {
                thread::sleep(delay);
                notifier.on_event(&name, &ComponentEvent::CmdComplete { data1: 0, data2: 0 });
            });
        }
        Ok(())
    }
}
