//! Contract between the core and an asynchronous hardware component.
//!
//! A component (camera, video renderer, ...) owns a small lifecycle state
//! machine and a set of numbered ports that exchange fixed-size buffers.
//! State changes are requested fire-and-forget and complete asynchronously;
//! the only portable way to observe completion is to poll [`Component::state`].

use crate::error::HardwareError;
use std::fmt;

/// Index of a component port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortIndex(pub u32);

impl fmt::Display for PortIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Opaque value handed to the component with every allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ClientContext(pub u64);

/// Lifecycle states of a component.
///
/// Owned by the component. `Loaded -> Idle` needs the port buffers allocated
/// first and `Idle -> Loaded` needs them freed first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentState {
    Loaded,
    Idle,
    Executing,
    Pause,
    WaitForResources,
    Invalid,
}

/// Buffer requirements a component reports for one of its ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRequirements {
    /// Size of each buffer in bytes.
    pub buffer_size: usize,
    /// Number of buffers the port is configured for.
    pub buffer_count: usize,
}

/// Hardware description of one allocated buffer.
///
/// Issued by [`Component::allocate_buffer`] and handed back unchanged to
/// [`Component::release_buffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferDescriptor {
    /// Component-assigned identity of the buffer.
    pub id: u64,
    /// Port the buffer belongs to.
    pub port: PortIndex,
    /// Allocated size in bytes.
    pub size: usize,
}

/// Calls the core makes into a hardware component.
///
/// Implementations must be callable from several threads; the component's
/// own runtime usually runs its event callbacks on a separate thread.
pub trait Component: Send + Sync {
    /// Human-readable name used in errors and logs.
    fn name(&self) -> &str;

    /// Current buffer requirements of `port`.
    fn port_requirements(&self, port: PortIndex) -> Result<PortRequirements, HardwareError>;

    /// Allocate one buffer of `size` bytes on `port`.
    fn allocate_buffer(
        &self,
        port: PortIndex,
        context: ClientContext,
        size: usize,
    ) -> Result<BufferDescriptor, HardwareError>;

    /// Hand a previously allocated buffer back to the component.
    fn release_buffer(
        &self,
        port: PortIndex,
        descriptor: &BufferDescriptor,
    ) -> Result<(), HardwareError>;

    /// Query the current lifecycle state. Never blocks.
    fn state(&self) -> Result<ComponentState, HardwareError>;

    /// Ask the component to move to `target`. Completion is observed by
    /// polling [`Component::state`] or through an event callback.
    fn request_state(&self, target: ComponentState) -> Result<(), HardwareError>;
}

/// Events a component delivers through its event callback.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentEvent {
    /// A previously requested command finished.
    CmdComplete {
        /// Command-specific payload (for state changes: the new state).
        data1: u32,
        data2: u32,
    },
    /// The component hit an asynchronous error.
    Error {
        /// Vendor error code.
        code: u32,
    },
    Mark,
    /// Port configuration changed and may need to be re-read.
    PortSettingsChanged {
        port: PortIndex,
    },
    /// A buffer carried a flag such as end-of-stream.
    BufferFlag {
        port: PortIndex,
        flags: u32,
    },
    ResourcesAcquired,
    ComponentResumed,
    DynamicResourcesAvailable,
    /// A parameter or config the client subscribed to changed.
    ParamOrConfigChanged {
        index: u32,
    },
    /// Vendor specific event.
    Other {
        code: u32,
    },
}

impl ComponentEvent {
    /// Returns a human-readable description (for logging).
    pub fn description(&self) -> &'static str {
        match self {
            ComponentEvent::CmdComplete { .. } => "CmdComplete",
            ComponentEvent::Error { .. } => "Error",
            ComponentEvent::Mark => "Mark",
            ComponentEvent::PortSettingsChanged { .. } => "PortSettingsChanged",
            ComponentEvent::BufferFlag { .. } => "BufferFlag",
            ComponentEvent::ResourcesAcquired => "ResourcesAcquired",
            ComponentEvent::ComponentResumed => "ComponentResumed",
            ComponentEvent::DynamicResourcesAvailable => "DynamicResourcesAvailable",
            ComponentEvent::ParamOrConfigChanged { .. } => "ParamOrConfigChanged",
            ComponentEvent::Other { .. } => "Others",
        }
    }

    /// Whether this event can signal a completed state transition.
    pub fn may_change_state(&self) -> bool {
        matches!(
            self,
            ComponentEvent::CmdComplete { .. }
                | ComponentEvent::Error { .. }
                | ComponentEvent::ResourcesAcquired
                | ComponentEvent::ComponentResumed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_description() {
        assert_eq!(
            ComponentEvent::CmdComplete { data1: 0, data2: 2 }.description(),
            "CmdComplete"
        );
        assert_eq!(ComponentEvent::Other { code: 7 }.description(), "Others");
    }

    #[test]
    fn test_state_relevant_events() {
        assert!(ComponentEvent::CmdComplete { data1: 0, data2: 0 }.may_change_state());
        assert!(!ComponentEvent::Mark.may_change_state());
        assert!(!ComponentEvent::BufferFlag {
            port: PortIndex(71),
            flags: 1
        }
        .may_change_state());
    }

    #[test]
    fn test_port_display() {
        assert_eq!(PortIndex(90).to_string(), "#90");
    }
}
