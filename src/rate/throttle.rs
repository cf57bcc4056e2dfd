//! Trailing-edge call throttling.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, instrument};

type Callback<T> = Box<dyn FnMut(T) + Send>;

/// Invokes a callback at most once per time budget.
///
/// The first call in any window fires the callback immediately. Calls landing
/// inside the window overwrite the pending argument (last-write-wins) and
/// schedule a single trailing timer that delivers the latest argument at
/// window end. [`flush`](Throttle::flush) delivers the pending argument
/// early and cancels the timer.
///
/// A frequency of [`Duration::ZERO`] disables throttling entirely: every
/// call fires immediately.
///
/// # Concurrency
///
/// The wrapper is `Clone` (handles share one state) and the callback is never
/// invoked re-entrantly: delivery happens under the internal lock, so the
/// trailing timer can never race a direct call. The callback must not call
/// back into its own `Throttle`.
///
/// Deferred delivery runs on a spawned Tokio task, so calls that defer must
/// happen inside a runtime.
///
/// # Example
///
/// ```
/// use std::sync::{Arc, Mutex};
/// use std::time::Duration;
/// use byteflow::rate::Throttle;
///
/// # #[tokio::main(flavor = "current_thread")] async fn main() {
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let sink = Arc::clone(&seen);
/// let throttle = Throttle::new(Duration::from_millis(200), move |v: u32| {
///     sink.lock().unwrap().push(v);
/// });
///
/// throttle.call(1); // fires immediately
/// throttle.call(2); // deferred
/// throttle.call(3); // overwrites the pending argument
/// throttle.flush(); // delivers 3 now
/// assert_eq!(*seen.lock().unwrap(), vec![1, 3]);
/// # }
/// ```
pub struct Throttle<T> {
    shared: Arc<Shared<T>>,
}

struct Shared<T> {
    freq: Duration,
    state: Mutex<State<T>>,
}

struct State<T> {
    callback: Callback<T>,
    last_fired: Option<Instant>,
    pending: Option<T>,
    timer: Option<JoinHandle<()>>,
}

impl<T> Clone for Throttle<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> std::fmt::Debug for Throttle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Throttle")
            .field("freq", &self.shared.freq)
            .finish_non_exhaustive()
    }
}

impl<T: Send + 'static> Throttle<T> {
    /// Creates a throttled wrapper around `callback` with the given minimum
    /// spacing between invocations.
    #[must_use]
    #[instrument(skip(callback), fields(freq_ms = freq.as_millis()))]
    pub fn new(freq: Duration, callback: impl FnMut(T) + Send + 'static) -> Self {
        Self {
            shared: Arc::new(Shared {
                freq,
                state: Mutex::new(State {
                    callback: Box::new(callback),
                    last_fired: None,
                    pending: None,
                    timer: None,
                }),
            }),
        }
    }

    /// Invokes the callback with `arg`, or defers it to the end of the
    /// current window.
    ///
    /// Deferred arguments are last-write-wins; at most one trailing timer is
    /// scheduled per window.
    pub fn call(&self, arg: T) {
        let mut state = lock(&self.shared.state);
        let now = Instant::now();

        let in_window = !self.shared.freq.is_zero()
            && state
                .last_fired
                .is_some_and(|last| now.duration_since(last) < self.shared.freq);

        if !in_window {
            Shared::fire(&mut state, arg, now);
            return;
        }

        state.pending = Some(arg);
        if state.timer.is_none() {
            // last_fired is Some here, otherwise we would have fired above.
            let elapsed = state
                .last_fired
                .map_or(Duration::ZERO, |last| now.duration_since(last));
            let wait = self.shared.freq.saturating_sub(elapsed);
            let shared = Arc::clone(&self.shared);

            debug!(wait_ms = wait.as_millis(), "deferring throttled call");
            state.timer = Some(tokio::spawn(async move {
                tokio::time::sleep(wait).await;
                let mut state = lock(&shared.state);
                state.timer = None;
                if let Some(arg) = state.pending.take() {
                    Shared::fire(&mut state, arg, Instant::now());
                }
            }));
        }
    }

    /// Delivers the pending argument immediately, if any, cancelling the
    /// trailing timer. No-op when nothing is pending.
    pub fn flush(&self) {
        let mut state = lock(&self.shared.state);
        if let Some(arg) = state.pending.take() {
            Shared::fire(&mut state, arg, Instant::now());
        }
    }

    /// Returns the configured window.
    #[must_use]
    pub fn freq(&self) -> Duration {
        self.shared.freq
    }
}

impl<T> Shared<T> {
    fn fire(state: &mut State<T>, arg: T, now: Instant) {
        state.last_fired = Some(now);
        state.pending = None;
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        (state.callback)(arg);
    }
}

fn lock<T>(mutex: &Mutex<State<T>>) -> std::sync::MutexGuard<'_, State<T>> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
