//! The location-time-zone provider state machine.
//!
//! Lifecycle, as the host drives it:
//!
//! ```text
//! Stopped --start--> Started(Active|Passive) --stop--> Stopped
//!                        |            \
//!                 lookup failure       destroy
//!                        v                v
//!                     Failed          Destroyed
//! ```
//!
//! While started, the provider alternates listening rounds chosen by the
//! [`ListeningBudget`]: an incoming fix is looked up and delivered as a
//! `Suggestion`, a failed round is delivered as `Uncertain`, and every round
//! ends with a re-plan. Two rules keep the host traffic quiet: a result is
//! suppressed when it says nothing new (same location cell, or uncertain
//! after uncertain), and early failures stay silent while the start-up
//! timeout is still pending, since a slow first fix is expected.
//!
//! Everything runs under one mutex, entered either by the host or by
//! environment callbacks posted to the provider thread. Callbacks carry the
//! token of the round that scheduled them; a callback whose token no longer
//! matches the current round is stale and ignored, which is what makes
//! cancellation races harmless.

use std::sync::{Arc, Mutex, Weak};

use crate::budget::{LastOutcome, ListenMode, ListeningBudget};
use crate::environment::{Cancellable, Environment, ListenOutcome};
use crate::geo::{GeoLookupError, LocationToken, ZoneFinder};

/// What the provider reports to its host.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum ProviderResult {
    /// The zone ids for the device's location, known with certainty.
    Suggestion {
        zone_ids: Vec<String>,
        elapsed_realtime_millis: i64,
    },
    /// The provider cannot currently tell which zones apply.
    Uncertain,
    /// The lookup backend is broken; nothing further will be delivered.
    PermanentFailure { cause: String },
}

/// Receives provider results on the provider thread.
pub trait ResultSink: Send + Sync {
    fn deliver(&self, result: ProviderResult);
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ProviderPhase {
    Stopped,
    Started(ListenMode),
    Failed,
    Destroyed,
}

struct PendingTimeout {
    token: u64,
    handle: Box<dyn Cancellable>,
}

struct ListenRound {
    token: u64,
    mode: ListenMode,
    handle: Box<dyn Cancellable>,
    started_at: i64,
    planned_millis: i64,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Delivered {
    Suggestion(LocationToken),
    Uncertain,
}

struct ProviderInner {
    phase: ProviderPhase,
    next_token: u64,
    init_timeout: Option<PendingTimeout>,
    listen: Option<ListenRound>,
    budget: ListeningBudget,
    /// Freshness input for planning. Cleared on stop.
    last_outcome: Option<LastOutcome>,
    /// Duplicate-suppression state for the current run. Cleared on stop.
    last_delivery: Option<Delivered>,
    /// Whether any suggestion went out in the current run.
    suggestion_sent: bool,
}

impl ProviderInner {
    fn take_token(&mut self) -> u64 {
        self.next_token += 1;
        self.next_token
    }
}

pub struct LocationTimeZoneProvider {
    env: Arc<dyn Environment>,
    finder: Arc<dyn ZoneFinder>,
    sink: Arc<dyn ResultSink>,
    /// Handed to scheduled callbacks; a callback that outlives the provider
    /// simply fails to upgrade.
    weak_self: Weak<LocationTimeZoneProvider>,
    inner: Mutex<ProviderInner>,
}

impl LocationTimeZoneProvider {
    pub fn new(
        env: Arc<dyn Environment>,
        finder: Arc<dyn ZoneFinder>,
        sink: Arc<dyn ResultSink>,
    ) -> Arc<LocationTimeZoneProvider> {
        Arc::new_cyclic(|weak_self| LocationTimeZoneProvider {
            env,
            finder,
            sink,
            weak_self: weak_self.clone(),
            inner: Mutex::new(ProviderInner {
                phase: ProviderPhase::Stopped,
                next_token: 0,
                init_timeout: None,
                listen: None,
                budget: ListeningBudget::new(),
                last_outcome: None,
                last_delivery: None,
                suggestion_sent: false,
            }),
        })
    }

    pub fn phase(&self) -> ProviderPhase {
        self.inner.lock().unwrap().phase
    }

    /// Begins a run. If nothing has been delivered once
    /// `initialization_timeout_millis` elapses, an `Uncertain` goes out so
    /// the host is not left waiting on a slow first fix.
    ///
    /// # Panics
    ///
    /// Panics if the provider is not `Stopped`; calling out of order is a
    /// host bug, and a loud one beats a wedged detector.
    pub fn start(&self, initialization_timeout_millis: i64) {
        let mut inner = self.inner.lock().unwrap();
        assert!(
            inner.phase == ProviderPhase::Stopped,
            "start() while {:?}",
            inner.phase
        );
        inner.suggestion_sent = false;
        inner.last_delivery = None;

        let token = inner.take_token();
        let weak = self.weak_self.clone();
        let handle = self.env.schedule_timeout(
            initialization_timeout_millis,
            Box::new(move || {
                if let Some(provider) = weak.upgrade() {
                    provider.on_initialization_timeout(token);
                }
            }),
        );
        inner.init_timeout = Some(PendingTimeout { token, handle });

        self.replan(&mut inner);
    }

    /// Ends the run: outstanding callbacks are cancelled and the per-run
    /// caches are discarded. The budget survives; power accounting does not
    /// reset just because the host flipped the detector off and on.
    ///
    /// # Panics
    ///
    /// Panics unless the provider is `Started`.
    pub fn stop(&self) {
        let mut inner = self.inner.lock().unwrap();
        assert!(
            matches!(inner.phase, ProviderPhase::Started(_)),
            "stop() while {:?}",
            inner.phase
        );
        Self::cancel_outstanding(&mut inner);
        inner.last_outcome = None;
        inner.last_delivery = None;
        inner.suggestion_sent = false;
        inner.phase = ProviderPhase::Stopped;
    }

    /// Tears the provider down from any state. A started provider delivers
    /// a final `Uncertain` so the host does not trust a stale suggestion.
    /// Destroying twice is a no-op.
    pub fn destroy(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.phase == ProviderPhase::Destroyed {
            return;
        }
        Self::cancel_outstanding(&mut inner);
        if matches!(inner.phase, ProviderPhase::Started(_)) {
            self.deliver_uncertain(&mut inner);
        }
        inner.phase = ProviderPhase::Destroyed;
    }

    fn cancel_outstanding(inner: &mut ProviderInner) {
        if let Some(timeout) = inner.init_timeout.take() {
            timeout.handle.cancel();
        }
        if let Some(listen) = inner.listen.take() {
            listen.handle.cancel();
        }
    }

    /// Chooses and starts the next listening round. The wake lock covers the
    /// whole planning section so the device cannot doze off between
    /// cancelling one round and starting the next.
    fn replan(&self, inner: &mut ProviderInner) {
        let _wake = self.env.acquire_wake_lock();
        if let Some(listen) = inner.listen.take() {
            listen.handle.cancel();
        }

        let now = self.env.elapsed_realtime_millis();
        let plan = inner.budget.plan(now, inner.last_outcome);
        let token = inner.take_token();
        tracing::debug!(
            "listening {:?} for {}ms (budget {}ms)",
            plan.mode,
            plan.duration_millis,
            inner.budget.balance_millis()
        );

        let handle = match plan.mode {
            ListenMode::Active => {
                let weak = self.weak_self.clone();
                self.env.listen_active(
                    plan.duration_millis,
                    Box::new(move |outcome| {
                        if let Some(provider) = weak.upgrade() {
                            provider.on_listen_outcome(token, outcome);
                        }
                    }),
                )
            }
            ListenMode::Passive => {
                let weak = self.weak_self.clone();
                let weak_ended = self.weak_self.clone();
                self.env.listen_passive(
                    plan.duration_millis,
                    Box::new(move |outcome| {
                        if let Some(provider) = weak.upgrade() {
                            provider.on_listen_outcome(token, outcome);
                        }
                    }),
                    Box::new(move |actual_millis| {
                        if let Some(provider) = weak_ended.upgrade() {
                            provider.on_passive_ended(token, actual_millis);
                        }
                    }),
                )
            }
        };

        inner.listen = Some(ListenRound {
            token,
            mode: plan.mode,
            handle,
            started_at: now,
            planned_millis: plan.duration_millis,
        });
        inner.phase = ProviderPhase::Started(plan.mode);
    }

    fn on_listen_outcome(&self, token: u64, outcome: ListenOutcome) {
        let mut inner = self.inner.lock().unwrap();
        if !matches!(inner.phase, ProviderPhase::Started(_)) {
            return;
        }
        if inner.listen.as_ref().map(|l| l.token) != Some(token) {
            // A round that was cancelled after the callback was posted.
            return;
        }
        match outcome {
            ListenOutcome::LocationKnown {
                latitude,
                longitude,
            } => self.location_known(&mut inner, latitude, longitude),
            ListenOutcome::LocationNotKnown => self.location_not_known(&mut inner),
        }
    }

    fn location_known(&self, inner: &mut ProviderInner, latitude: f64, longitude: f64) {
        let now = self.env.elapsed_realtime_millis();
        let round = inner.listen.take().expect("checked by caller");
        round.handle.cancel();
        if round.mode == ListenMode::Active {
            let used = (now - round.started_at).clamp(0, round.planned_millis);
            inner.budget.deposit(round.planned_millis - used);
        }

        // The session lives exactly as long as this lookup.
        let matched = self
            .finder
            .open()
            .and_then(|mut session| session.lookup(latitude, longitude));
        let matched = match matched {
            Ok(matched) => matched,
            Err(err) => {
                self.fail(inner, err);
                return;
            }
        };

        let fresh = !matches!(
            inner.last_delivery,
            Some(Delivered::Suggestion(previous)) if previous == matched.token
        );
        if fresh {
            inner.last_delivery = Some(Delivered::Suggestion(matched.token));
            inner.suggestion_sent = true;
            self.sink.deliver(ProviderResult::Suggestion {
                zone_ids: matched.zone_ids,
                elapsed_realtime_millis: now,
            });
        }

        if let Some(timeout) = inner.init_timeout.take() {
            timeout.handle.cancel();
        }
        inner.last_outcome = Some(LastOutcome {
            location_known: true,
            at_elapsed_millis: now,
        });
        self.replan(inner);
    }

    fn location_not_known(&self, inner: &mut ProviderInner) {
        let now = self.env.elapsed_realtime_millis();
        let round = inner.listen.take().expect("checked by caller");
        round.handle.cancel();

        // Stay silent while the start-up timeout covers for us and nothing
        // has been suggested yet; the timeout will speak if needed.
        let starting_up = !inner.suggestion_sent && inner.init_timeout.is_some();
        if !starting_up {
            self.deliver_uncertain(inner);
        }

        inner.last_outcome = Some(LastOutcome {
            location_known: false,
            at_elapsed_millis: now,
        });
        self.replan(inner);
    }

    fn on_passive_ended(&self, token: u64, actual_millis: i64) {
        let mut inner = self.inner.lock().unwrap();
        if !matches!(inner.phase, ProviderPhase::Started(_)) {
            return;
        }
        let current = inner
            .listen
            .as_ref()
            .is_some_and(|l| l.token == token && l.mode == ListenMode::Passive);
        if !current {
            return;
        }
        inner.listen = None;
        inner.budget.accrue(actual_millis);
        self.replan(&mut inner);
    }

    fn on_initialization_timeout(&self, token: u64) {
        let mut inner = self.inner.lock().unwrap();
        match inner.init_timeout.take() {
            Some(timeout) if timeout.token == token => {}
            other => {
                inner.init_timeout = other;
                return;
            }
        }
        if inner.last_delivery.is_none() {
            self.deliver_uncertain(&mut inner);
        }
    }

    fn deliver_uncertain(&self, inner: &mut ProviderInner) {
        if inner.last_delivery == Some(Delivered::Uncertain) {
            return;
        }
        inner.last_delivery = Some(Delivered::Uncertain);
        self.sink.deliver(ProviderResult::Uncertain);
    }

    fn fail(&self, inner: &mut ProviderInner, err: GeoLookupError) {
        tracing::warn!("zone lookup failed permanently: {err}");
        Self::cancel_outstanding(inner);
        inner.phase = ProviderPhase::Failed;
        self.sink.deliver(ProviderResult::PermanentFailure {
            cause: err.to_string(),
        });
    }
}
