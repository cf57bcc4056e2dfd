//! Cancellation signals and signal composition.
//!
//! This module provides abort-signal primitives modeled on the familiar
//! controller/signal split, with one deliberate change: instead of
//! event-emitter style `add/removeEventListener`, observer registration
//! returns an [`AbortRegistration`] handle whose
//! [`unregister`](AbortRegistration::unregister) tears the listener down.
//! Composition folds any number of handles into one cleanup function, so
//! listeners cannot leak.
//!
//! [`compose_signals`] merges several source signals and an optional timeout
//! into a single derived signal with exactly-once cleanup.
//!
//! # Example
//!
//! ```
//! use byteflow::signal::{AbortController, AbortReason};
//!
//! let controller = AbortController::new();
//! let signal = controller.signal();
//!
//! let registration = signal.on_abort(|reason| {
//!     eprintln!("aborted: {reason}");
//! });
//!
//! controller.abort(AbortReason::canceled("user pressed stop"));
//! assert!(signal.is_aborted());
//! registration.unregister(); // no-op after delivery, never an error
//! ```

mod compose;

pub use compose::{ComposedSignal, compose_signals};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, instrument};

/// Why an operation was aborted.
///
/// Carried by the signal and delivered to every listener. A timeout is kept
/// distinct from an explicit cancellation so callers can tell a transport
/// deadline from a user action.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AbortReason {
    /// Explicit cancellation, optionally with a caller-supplied message.
    #[error("canceled{}", .0.as_ref().map(|m| format!(": {m}")).unwrap_or_default())]
    Canceled(Option<String>),

    /// A composed timeout elapsed.
    #[error("timeout of {}ms exceeded", .0.as_millis())]
    Timeout(Duration),
}

impl AbortReason {
    /// Creates an explicit cancellation reason with a message.
    #[must_use]
    pub fn canceled(message: impl Into<String>) -> Self {
        Self::Canceled(Some(message.into()))
    }
}

type Listener = Box<dyn FnMut(&AbortReason) + Send>;

struct ListenerEntry {
    id: u64,
    listener: Listener,
}

#[derive(Default)]
struct SignalState {
    reason: Option<AbortReason>,
    listeners: Vec<ListenerEntry>,
    next_id: u64,
}

#[derive(Default)]
struct SignalInner {
    state: Mutex<SignalState>,
}

impl SignalInner {
    fn lock(&self) -> MutexGuard<'_, SignalState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Owner side of a cancellation signal.
///
/// Cloning yields another handle to the same signal; the first
/// [`abort`](AbortController::abort) wins and later aborts are no-ops.
#[derive(Clone, Default)]
pub struct AbortController {
    inner: Arc<SignalInner>,
}

impl std::fmt::Debug for AbortController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AbortController")
            .field("aborted", &self.signal().is_aborted())
            .finish()
    }
}

impl AbortController {
    /// Creates a controller with a fresh, un-aborted signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the observer side of this controller's signal.
    #[must_use]
    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Aborts the signal with `reason`.
    ///
    /// Listeners fire synchronously, in registration order, outside the
    /// internal lock. Aborting an already-aborted signal is a no-op; the
    /// original reason is kept.
    #[instrument(skip(self), fields(reason = %reason))]
    pub fn abort(&self, reason: AbortReason) {
        let listeners = {
            let mut state = self.inner.lock();
            if state.reason.is_some() {
                debug!("signal already aborted, keeping original reason");
                return;
            }
            state.reason = Some(reason.clone());
            std::mem::take(&mut state.listeners)
        };

        debug!(listeners = listeners.len(), "delivering abort");
        for mut entry in listeners {
            (entry.listener)(&reason);
        }
    }
}

/// Observer side of a cancellation signal.
#[derive(Clone)]
pub struct AbortSignal {
    inner: Arc<SignalInner>,
}

impl std::fmt::Debug for AbortSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AbortSignal")
            .field("aborted", &self.is_aborted())
            .finish()
    }
}

impl AbortSignal {
    /// Whether the signal has been aborted.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.inner.lock().reason.is_some()
    }

    /// The abort reason, once aborted.
    #[must_use]
    pub fn reason(&self) -> Option<AbortReason> {
        self.inner.lock().reason.clone()
    }

    /// Registers `listener` to run when the signal aborts.
    ///
    /// If the signal is already aborted the listener fires immediately, on
    /// the calling thread, and the returned registration is inert. Listeners
    /// are one-shot: delivery consumes the registration list.
    pub fn on_abort(
        &self,
        mut listener: impl FnMut(&AbortReason) + Send + 'static,
    ) -> AbortRegistration {
        let fired_reason = {
            let mut state = self.inner.lock();
            if let Some(reason) = state.reason.clone() {
                Some(reason)
            } else {
                let id = state.next_id;
                state.next_id += 1;
                state.listeners.push(ListenerEntry {
                    id,
                    listener: Box::new(listener),
                });
                return AbortRegistration {
                    inner: Arc::downgrade(&self.inner),
                    id: Some(id),
                };
            }
        };

        // Already aborted: fire outside the lock.
        if let Some(reason) = fired_reason {
            listener(&reason);
        }
        AbortRegistration {
            inner: Weak::new(),
            id: None,
        }
    }

    #[cfg(test)]
    pub(crate) fn listener_count(&self) -> usize {
        self.inner.lock().listeners.len()
    }
}

/// Handle for a registered abort listener.
///
/// Dropping the handle does NOT unregister the listener; teardown is
/// explicit via [`unregister`](AbortRegistration::unregister) so handles can
/// be collected into a single cleanup function.
#[derive(Debug)]
pub struct AbortRegistration {
    inner: Weak<SignalInner>,
    id: Option<u64>,
}

impl AbortRegistration {
    /// Removes the listener from its signal.
    ///
    /// Idempotent by construction: a listener already consumed by delivery,
    /// or a signal that no longer exists, makes this a no-op.
    pub fn unregister(self) {
        let (Some(inner), Some(id)) = (self.inner.upgrade(), self.id) else {
            return;
        };
        inner.lock().listeners.retain(|entry| entry.id != id);
    }
}
