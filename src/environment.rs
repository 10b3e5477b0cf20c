//! The scheduling and listening seam the host platform implements.
//!
//! All provider work happens on one host-owned thread. Implementations must
//! post callbacks to that thread rather than invoking them from inside the
//! scheduling call itself, and a callback that races a cancellation may
//! still be delivered; the provider drops stale deliveries by token, so
//! cancellation only has to be best-effort.

/// Handle to an outstanding callback. Cancelling an already-cancelled or
/// already-fired handle is a no-op.
pub trait Cancellable: Send {
    fn cancel(&self);
}

/// Keeps the device awake while held; released on drop.
pub trait WakeLock: Send {}

/// What a round of location listening produced.
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum ListenOutcome {
    LocationKnown { latitude: f64, longitude: f64 },
    LocationNotKnown,
}

pub type TimeoutCallback = Box<dyn FnOnce() + Send>;
pub type OutcomeCallback = Box<dyn FnMut(ListenOutcome) + Send>;
/// Receives the duration actually spent listening, in milliseconds.
pub type ListenEndedCallback = Box<dyn FnOnce(i64) + Send>;

pub trait Environment: Send + Sync {
    /// Monotonic milliseconds since boot. Wall-clock jumps must not affect
    /// this value.
    fn elapsed_realtime_millis(&self) -> i64;

    /// Runs `callback` once, `delay_millis` from now.
    fn schedule_timeout(&self, delay_millis: i64, callback: TimeoutCallback)
        -> Box<dyn Cancellable>;

    /// Power-expensive location listening. Outcomes arrive until the
    /// duration expires (reported as [`ListenOutcome::LocationNotKnown`]) or
    /// the handle is cancelled.
    fn listen_active(
        &self,
        duration_millis: i64,
        on_outcome: OutcomeCallback,
    ) -> Box<dyn Cancellable>;

    /// Power-cheap listening: fixes other subsystems happen to produce.
    /// `on_ended` fires when the listening window closes without being
    /// cancelled.
    fn listen_passive(
        &self,
        duration_millis: i64,
        on_outcome: OutcomeCallback,
        on_ended: ListenEndedCallback,
    ) -> Box<dyn Cancellable>;

    fn acquire_wake_lock(&self) -> Box<dyn WakeLock>;
}
