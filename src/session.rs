//! Explicit owner of the shared per-process state.
//!
//! A `Session` holds the error reporter and the pool registry for one
//! init/shutdown cycle. Shutting down (or dropping) it destroys every pool
//! still registered, so repeated cycles never leak hardware buffers.

use crate::component::Component;
use crate::error::{HardwareError, Result};
use crate::pool::{BufferPool, BufferRequest};
use crate::registry::PoolRegistry;
use crate::reporter::ErrorReporter;
use crate::sync::{StateSynchronizer, SyncConfig};
use crate::Config;
use std::sync::Arc;

#[derive(Debug)]
pub struct Session {
    config: Config,
    reporter: Arc<ErrorReporter>,
    registry: PoolRegistry,
}

impl Session {
    /// Start a session with the default logging error callback.
    pub fn new(config: Config) -> Self {
        let reporter = Arc::new(ErrorReporter::new());
        let registry = PoolRegistry::new(config.registry_capacity, reporter.clone());
        tracing::debug!(capacity = config.registry_capacity, "session started");
        Self {
            config,
            reporter,
            registry,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn reporter(&self) -> &Arc<ErrorReporter> {
        &self.reporter
    }

    pub fn registry(&self) -> &PoolRegistry {
        &self.registry
    }

    /// Replace the hardware failure callback for this session.
    pub fn set_error_callback<F>(&self, callback: F)
    where
        F: Fn(&HardwareError) + Send + Sync + 'static,
    {
        self.reporter.set_callback(callback);
    }

    /// Create and register a pool.
    pub fn create_pool(
        &self,
        component: Arc<dyn Component>,
        request: BufferRequest,
    ) -> Result<Arc<BufferPool>> {
        self.registry.create(component, request)
    }

    /// Synchronizer using the session's poll interval, budget and reporter.
    pub fn synchronizer(&self) -> StateSynchronizer {
        StateSynchronizer::new(self.config.sync_config()).with_reporter(self.reporter.clone())
    }

    /// Synchronizer with the longer budget for joint transitions.
    pub fn joint_synchronizer(&self) -> StateSynchronizer {
        StateSynchronizer::new(SyncConfig::joint().with_poll_interval(self.config.poll_interval))
            .with_reporter(self.reporter.clone())
    }

    /// Destroy every registered pool and restore the default callback.
    /// Returns how many pools were torn down.
    pub fn shutdown(self) -> usize {
        let destroyed = self.registry.destroy_all();
        self.reporter.reset();
        tracing::debug!(destroyed, "session shut down");
        destroyed
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.registry.destroy_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::PortIndex;
    use crate::sim::SimComponent;

    #[test]
    fn shutdown_returns_every_buffer() {
        let sim = Arc::new(
            SimComponent::new("render")
                .with_port(PortIndex(90), 32, 3)
                .with_port(PortIndex(91), 32, 2),
        );
        let session = Session::new(Config::default());
        let a = session.create_pool(sim.clone(), BufferRequest::new(PortIndex(90))).unwrap();
        session.create_pool(sim.clone(), BufferRequest::new(PortIndex(91))).unwrap();
        let _held = a.acquire().unwrap().unwrap();

        assert_eq!(sim.live_buffers(), 5);
        assert_eq!(session.shutdown(), 2);
        assert_eq!(sim.live_buffers(), 0);
        assert!(!a.is_valid());
    }

    #[test]
    fn drop_tears_down() {
        let sim = Arc::new(SimComponent::new("camera").with_port(PortIndex(71), 32, 2));
        {
            let session = Session::new(Config::default());
            session.create_pool(sim.clone(), BufferRequest::new(PortIndex(71))).unwrap();
        }
        assert_eq!(sim.live_buffers(), 0);
    }

    #[test]
    fn fresh_session_has_default_callback() {
        let first = Session::new(Config::default());
        first.set_error_callback(|_| {});
        assert!(first.reporter().has_custom_callback());
        first.shutdown();

        let second = Session::new(Config::default());
        assert!(!second.reporter().has_custom_callback());
    }
}
