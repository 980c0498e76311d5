//! Single choke point for hardware failure notifications.
//!
//! Every pool and registry call into a component passes its outcome through
//! [`ErrorReporter::report`] in addition to returning it. The reporter is an
//! observer only; nothing in the crate depends on a callback being installed.

use crate::error::HardwareError;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Callback invoked for every failed hardware call.
pub type ErrorCallback = Arc<dyn Fn(&HardwareError) + Send + Sync>;

fn log_error(err: &HardwareError) {
    tracing::error!(code = err.code, kind = %err.kind, "hardware call failed: {}", err);
}

/// Holds exactly one active failure callback.
pub struct ErrorReporter {
    callback: RwLock<Option<ErrorCallback>>,
}

impl ErrorReporter {
    /// Reporter with the default logging callback active.
    pub fn new() -> Self {
        Self {
            callback: RwLock::new(None),
        }
    }

    /// Replace the active callback.
    pub fn set_callback<F>(&self, callback: F)
    where
        F: Fn(&HardwareError) + Send + Sync + 'static,
    {
        *self.callback.write() = Some(Arc::new(callback));
    }

    /// Restore the default logging callback.
    pub fn reset(&self) {
        *self.callback.write() = None;
    }

    /// Whether a caller-supplied callback replaced the default one.
    pub fn has_custom_callback(&self) -> bool {
        self.callback.read().is_some()
    }

    /// Pass `result` through, notifying the active callback on failure.
    pub fn report<T>(&self, result: Result<T, HardwareError>) -> Result<T, HardwareError> {
        if let Err(err) = &result {
            // Clone out so a callback may itself call set_callback.
            let callback = self.callback.read().clone();
            match callback {
                Some(cb) => cb(err),
                None => log_error(err),
            }
        }
        result
    }
}

impl Default for ErrorReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ErrorReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorReporter")
            .field("custom_callback", &self.has_custom_callback())
            .finish()
    }
}
