//! Merging multiple abort signals and an optional timeout into one.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, instrument};

use super::{AbortController, AbortReason, AbortRegistration, AbortSignal};

/// A derived signal merging several sources and an optional timeout.
///
/// The derived signal aborts with the first source's reason, or with
/// [`AbortReason::Timeout`] when the timeout fires first. Whatever happens
/// first also tears everything down: every source listener is unregistered
/// and the timeout task is aborted, exactly once.
///
/// [`unsubscribe`](ComposedSignal::unsubscribe) runs the same teardown early
/// without aborting the derived signal, for consumers that completed on
/// their own.
#[derive(Debug)]
pub struct ComposedSignal {
    signal: AbortSignal,
    cleanup: Arc<CleanupState>,
}

#[derive(Debug, Default)]
struct CleanupState {
    inner: Mutex<Option<Cleanup>>,
}

struct Cleanup {
    registrations: Vec<AbortRegistration>,
    timer: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cleanup")
            .field("registrations", &self.registrations.len())
            .field("armed_timer", &self.timer.is_some())
            .finish()
    }
}

impl ComposedSignal {
    /// The derived signal.
    #[must_use]
    pub fn signal(&self) -> AbortSignal {
        self.signal.clone()
    }

    /// Tears down source listeners and the timeout timer.
    ///
    /// Idempotent: teardown runs at most once per composition, whether
    /// triggered here, by a source abort, or by the timeout.
    pub fn unsubscribe(&self) {
        run_cleanup(&self.cleanup);
    }
}

/// Merges `signals` plus an optional `timeout` into one derived signal.
///
/// Returns `None` when there is nothing to compose: no source signals and no
/// timeout. A timeout alone is a valid composition (a pure deadline signal).
///
/// The timeout timer runs on a spawned Tokio task, so composing with a
/// timeout must happen inside a runtime.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use byteflow::signal::{AbortController, compose_signals};
///
/// # #[tokio::main(flavor = "current_thread")] async fn main() {
/// let user = AbortController::new();
/// let shutdown = AbortController::new();
///
/// let composed = compose_signals(
///     &[user.signal(), shutdown.signal()],
///     Some(Duration::from_secs(30)),
/// )
/// .expect("non-empty composition");
///
/// let derived = composed.signal();
/// user.abort(byteflow::signal::AbortReason::canceled("stop"));
/// assert!(derived.is_aborted());
/// # }
/// ```
#[must_use]
#[instrument(skip(signals), fields(sources = signals.len(), timeout_ms = timeout.map(|t| t.as_millis())))]
pub fn compose_signals(
    signals: &[AbortSignal],
    timeout: Option<Duration>,
) -> Option<ComposedSignal> {
    if signals.is_empty() && timeout.is_none() {
        return None;
    }

    let controller = AbortController::new();
    let cleanup = Arc::new(CleanupState::default());

    let registrations: Vec<AbortRegistration> = signals
        .iter()
        .map(|source| {
            let controller = controller.clone();
            let cleanup = Arc::clone(&cleanup);
            source.on_abort(move |reason| {
                run_cleanup(&cleanup);
                controller.abort(reason.clone());
            })
        })
        .collect();

    let timer = timeout.map(|timeout| {
        let controller = controller.clone();
        let cleanup = Arc::clone(&cleanup);
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            debug!(timeout_ms = timeout.as_millis(), "composed timeout elapsed");
            run_cleanup(&cleanup);
            controller.abort(AbortReason::Timeout(timeout));
        })
    });

    *cleanup
        .inner
        .lock()
        .unwrap_or_else(PoisonError::into_inner) = Some(Cleanup {
        registrations,
        timer,
    });

    // A source already aborted during registration fired before the cleanup
    // state was populated; settle the teardown now.
    if controller.signal().is_aborted() {
        run_cleanup(&cleanup);
    }

    Some(ComposedSignal {
        signal: controller.signal(),
        cleanup,
    })
}

fn run_cleanup(state: &CleanupState) {
    let taken = state
        .inner
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take();
    let Some(cleanup) = taken else {
        return;
    };

    debug!(
        registrations = cleanup.registrations.len(),
        "tearing down composed signal"
    );
    for registration in cleanup.registrations {
        registration.unregister();
    }
    if let Some(timer) = cleanup.timer {
        timer.abort();
    }
}
