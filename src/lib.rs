//! Buffer ring pools and bounded state synchronization for asynchronous
//! hardware media components.
//!
//! A hardware component (camera, video renderer) exchanges a fixed set of
//! buffers per port and changes lifecycle state asynchronously. This crate
//! provides the two pieces every client of such a component needs:
//!
//! - [`pool::BufferPool`]: a thread-safe ring over one port's buffers,
//!   registered in a [`registry::PoolRegistry`] for bulk teardown.
//! - [`sync::StateSynchronizer`]: waits, with a bounded budget, for one or
//!   more components to reach a target state.
//!
//! Hardware failures are returned as [`Error`] values and additionally
//! observed through the [`reporter::ErrorReporter`].

pub mod component;
pub mod error;
#[doc(hidden)]
pub mod invariant_ppt;
pub mod pool;
pub mod registry;
pub mod reporter;
pub mod session;
#[doc(hidden)]
pub mod sim;
pub mod sync;

pub use component::{
    BufferDescriptor, ClientContext, Component, ComponentEvent, ComponentState, PortIndex,
    PortRequirements,
};
pub use error::{Error, HardwareError, HardwareErrorKind, ReleaseError, Result};
pub use pool::{AssignMode, Buffer, BufferPool, BufferRequest, PeekedBuffer};
pub use registry::{PoolId, PoolRegistry};
pub use reporter::ErrorReporter;
pub use session::Session;
pub use sync::{StateNotifier, StateSynchronizer, SyncConfig};

use std::time::Duration;

/// Session-wide settings.
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum number of pools alive at once.
    pub registry_capacity: usize,
    /// Pause between state queries.
    pub poll_interval: Duration,
    /// Per-component budget for state waits.
    pub state_budget: Duration,
}

impl Config {
    /// Polling parameters derived from this config.
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            poll_interval: self.poll_interval,
            budget: self.state_budget,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            registry_capacity: registry::DEFAULT_REGISTRY_CAPACITY,
            poll_interval: sync::DEFAULT_POLL_INTERVAL,
            state_budget: sync::TRANSITION_BUDGET,
        }
    }
}
