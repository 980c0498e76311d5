//! Error types shared by pools, the registry and the synchronizer.

use crate::component::ComponentState;
use crate::pool::Buffer;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Classification of a failed hardware call.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HardwareErrorKind {
    /// A parameter passed to the component was rejected.
    BadParameter,
    /// The call is not allowed in the component's current state.
    IncorrectStateOperation,
    /// The requested state transition is not allowed.
    IncorrectStateTransition,
    /// The component ran out of memory or other resources.
    InsufficientResources,
    /// The port index does not exist on the component.
    BadPortIndex,
    /// Generic device failure.
    Hardware,
    /// Anything the table above does not name.
    Other,
}

impl HardwareErrorKind {
    /// Short name used in diagnostics.
    pub const fn name(&self) -> &'static str {
        match self {
            HardwareErrorKind::BadParameter => "BadParameter",
            HardwareErrorKind::IncorrectStateOperation => "IncorrectStateOperation",
            HardwareErrorKind::IncorrectStateTransition => "IncorrectStateTransition",
            HardwareErrorKind::InsufficientResources => "InsufficientResources",
            HardwareErrorKind::BadPortIndex => "BadPortIndex",
            HardwareErrorKind::Hardware => "Hardware",
            HardwareErrorKind::Other => "Others",
        }
    }
}

impl fmt::Display for HardwareErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A failure returned by the hardware component collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("[0x{code:08x}] ({kind})")]
pub struct HardwareError {
    /// What went wrong, as far as the core cares.
    pub kind: HardwareErrorKind,
    /// Raw vendor error code.
    pub code: u32,
}

impl HardwareError {
    /// Build an error from its kind and the vendor code.
    pub const fn new(kind: HardwareErrorKind, code: u32) -> Self {
        Self { kind, code }
    }
}

/// Errors surfaced by every fallible operation of the crate.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum Error {
    /// An underlying component call failed.
    #[error("{operation} on {component} failed: {source}")]
    Hardware {
        /// Name of the component that failed.
        component: String,
        /// The component call that failed.
        operation: &'static str,
        /// Failure detail from the component.
        #[source]
        source: HardwareError,
    },

    /// The registry has no free slot.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// A component did not reach the target state within its budget.
    #[error("component {index} ({component:?}) did not reach {target:?} within {waited:?} (last observed: {last_observed:?})")]
    Timeout {
        /// Name of the first component that missed the target.
        component: String,
        /// Its position in the list passed to the wait.
        index: usize,
        /// The state that was waited for.
        target: ComponentState,
        /// The last state the component reported, if any query succeeded.
        last_observed: Option<ComponentState>,
        /// How long the component was polled.
        waited: Duration,
    },

    /// The pool was destroyed or the registry id is stale.
    #[error("invalid handle: {0}")]
    InvalidHandle(String),

    /// The caller broke an argument contract.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A state wait was cancelled through its notifier.
    #[error("wait for {target:?} cancelled")]
    Cancelled {
        /// The state that was waited for.
        target: ComponentState,
    },
}

impl Error {
    /// Wrap a failed component call.
    pub fn hardware(component: &str, operation: &'static str, source: HardwareError) -> Self {
        Error::Hardware {
            component: component.to_string(),
            operation,
            source,
        }
    }
}

/// Crate result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// A rejected [`BufferPool::release`](crate::pool::BufferPool::release).
///
/// The buffer comes back to the caller so it is never lost.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct ReleaseError {
    buffer: Buffer,
    #[source]
    error: Error,
}

impl ReleaseError {
    pub(crate) fn new(buffer: Buffer, error: Error) -> Self {
        Self { buffer, error }
    }

    /// The reason the release was rejected.
    pub fn error(&self) -> &Error {
        &self.error
    }

    /// Take the buffer back.
    pub fn into_buffer(self) -> Buffer {
        self.buffer
    }

    /// Split into buffer and reason.
    pub fn into_parts(self) -> (Buffer, Error) {
        (self.buffer, self.error)
    }
}

impl From<ReleaseError> for Error {
    fn from(err: ReleaseError) -> Self {
        err.error
    }
}
