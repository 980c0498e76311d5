//! Bounded waiting for asynchronous component state transitions.
//!
//! State changes are requested fire-and-forget and complete on the
//! component's own schedule. [`StateSynchronizer`] turns "poll until it
//! happens" into a wait that always ends: either every component reached the
//! target, or the first one that did not is named in a `Timeout` error.
//!
//! When the host runtime delivers component events, attach a
//! [`StateNotifier`] and forward events to it; polls then wake as soon as an
//! event arrives instead of sleeping out the full interval. Without one the
//! synchronizer falls back to plain bounded polling.

use crate::component::{Component, ComponentEvent, ComponentState};
use crate::error::{Error, Result};
use crate::reporter::ErrorReporter;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Default pause between two state queries.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_micros(100);

/// Budget for a single component transition.
pub const TRANSITION_BUDGET: Duration = Duration::from_millis(500);

/// Budget for transitions several components make together.
pub const JOINT_TRANSITION_BUDGET: Duration = Duration::from_secs(2);

/// Polling parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    /// Pause between two queries of the same component.
    pub poll_interval: Duration,
    /// How long each component may take to reach the target.
    pub budget: Duration,
}

impl SyncConfig {
    /// Short budget for simple per-component transitions.
    pub fn transition() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            budget: TRANSITION_BUDGET,
        }
    }

    /// Longer budget for multi-component joint transitions.
    pub fn joint() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            budget: JOINT_TRANSITION_BUDGET,
        }
    }

    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::transition()
    }
}

#[derive(Debug, Default)]
struct NotifierState {
    events: u64,
    cancelled: bool,
}

/// Wakes state waits from the component event callback.
#[derive(Debug, Default)]
pub struct StateNotifier {
    state: Mutex<NotifierState>,
    condvar: Condvar,
}

impl StateNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wake every waiter so it re-queries component state.
    pub fn notify(&self) {
        self.state.lock().events += 1;
        self.condvar.notify_all();
    }

    /// Event callback entry point: logs the event and wakes waiters when it
    /// may have changed a component's state.
    pub fn on_event(&self, component: &str, event: &ComponentEvent) {
        tracing::debug!(component, event = event.description(), detail = ?event, "component event");
        if event.may_change_state() {
            self.notify();
        }
    }

    /// Make current and future waits return `Error::Cancelled`.
    pub fn cancel(&self) {
        self.state.lock().cancelled = true;
        self.condvar.notify_all();
    }

    /// Clear a previous cancellation.
    pub fn reset(&self) {
        self.state.lock().cancelled = false;
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.lock().cancelled
    }

    fn events(&self) -> u64 {
        self.state.lock().events
    }

    /// Sleep up to `timeout` unless an event newer than `seen` arrives.
    /// Returns true when cancelled.
    fn pause(&self, seen: u64, timeout: Duration) -> bool {
        let mut state = self.state.lock();
        if !state.cancelled && state.events == seen {
            self.condvar.wait_for(&mut state, timeout);
        }
        state.cancelled
    }
}

/// Waits for components to reach a lifecycle state within a budget.
#[derive(Debug, Clone, Default)]
pub struct StateSynchronizer {
    config: SyncConfig,
    notifier: Option<Arc<StateNotifier>>,
    reporter: Arc<ErrorReporter>,
}

impl StateSynchronizer {
    pub fn new(config: SyncConfig) -> Self {
        Self {
            config,
            notifier: None,
            reporter: Arc::new(ErrorReporter::new()),
        }
    }

    /// Back the polling with an event notifier.
    pub fn with_notifier(mut self, notifier: Arc<StateNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Report failed state requests through `reporter`.
    pub fn with_reporter(mut self, reporter: Arc<ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn config(&self) -> SyncConfig {
        self.config
    }

    pub fn notifier(&self) -> Option<&Arc<StateNotifier>> {
        self.notifier.as_ref()
    }

    /// Single non-blocking check. An absent component or a failed query is
    /// simply "not in that state".
    pub fn is_state(component: Option<&dyn Component>, state: ComponentState) -> bool {
        match component {
            Some(c) => matches!(c.state(), Ok(current) if current == state),
            None => false,
        }
    }

    /// Wait for each component, in order, to reach `target` within the
    /// configured budget.
    pub fn wait_all(&self, target: ComponentState, components: &[&dyn Component]) -> Result<()> {
        self.wait_all_within(target, components, self.config.budget)
    }

    /// Like [`wait_all`](Self::wait_all) with an explicit per-component budget.
    ///
    /// Stops at the first component that misses the budget; the ones after
    /// it are not checked.
    pub fn wait_all_within(
        &self,
        target: ComponentState,
        components: &[&dyn Component],
        budget: Duration,
    ) -> Result<()> {
        for (index, component) in components.iter().enumerate() {
            self.wait_one(target, index, *component, budget)?;
        }
        Ok(())
    }

    /// Request `target` on every component, then wait for all of them.
    pub fn request_all(&self, target: ComponentState, components: &[&dyn Component]) -> Result<()> {
        for component in components {
            tracing::debug!(component = component.name(), ?target, "state requested");
            self.reporter
                .report(component.request_state(target))
                .map_err(|e| Error::hardware(component.name(), "request_state", e))?;
        }
        self.wait_all(target, components)
    }

    fn wait_one(
        &self,
        target: ComponentState,
        index: usize,
        component: &dyn Component,
        budget: Duration,
    ) -> Result<()> {
        let start = Instant::now();
        let mut last_observed = None;
        tracing::debug!(component = component.name(), ?target, "waiting for state");

        loop {
            let seen = self.notifier.as_ref().map(|n| n.events());
            match component.state() {
                Ok(state) if state == target => {
                    tracing::debug!(component = component.name(), ?target, elapsed = ?start.elapsed(), "state reached");
                    return Ok(());
                }
                Ok(state) => last_observed = Some(state),
                Err(err) => tracing::debug!(component = component.name(), "state query failed: {}", err),
            }

            let waited = start.elapsed();
            if waited >= budget {
                let name = component.name().to_string();
                tracing::warn!(component = %name, index, ?target, ?last_observed, ?waited, "state wait timed out");
                return Err(Error::Timeout {
                    component: name,
                    index,
                    target,
                    last_observed,
                    waited,
                });
            }

            let pause = self.config.poll_interval.min(budget - waited);
            let cancelled = match (&self.notifier, seen) {
                (Some(notifier), Some(seen)) => notifier.pause(seen, pause),
                _ => {
                    thread::sleep(pause);
                    false
                }
            };
            if cancelled {
                tracing::debug!(component = component.name(), ?target, "state wait cancelled");
                return Err(Error::Cancelled { target });
            }
        }
    }
}
