//! Metering of active-listening time.
//!
//! Active location listening costs real power, so the provider earns it:
//! ninety milliseconds spent listening passively buy one millisecond of
//! active listening, an active request that returns early refunds its
//! unused remainder, and the balance is capped so a long quiet stretch
//! cannot bankroll a burst of expensive requests later.

/// Passive listening time needed to earn one unit of active listening.
pub const PASSIVE_TO_ACTIVE_RATIO: i64 = 90;

/// A fix younger than this still answers "where are we" well enough that
/// active listening would be wasted.
pub const LOCATION_KNOWN_AGE_THRESHOLD_MILLIS: i64 = 15 * 60 * 1000;

/// How long to sit out after a failed attempt before spending again.
pub const LOCATION_NOT_KNOWN_AGE_THRESHOLD_MILLIS: i64 = 60 * 1000;

/// The shortest passive window worth scheduling.
pub const MINIMUM_PASSIVE_LISTENING_DURATION_MILLIS: i64 = 2 * 60 * 1000;

/// Below this an active request is unlikely to get a fix at all.
pub const MINIMUM_ACTIVE_LISTENING_DURATION_MILLIS: i64 = 5 * 1000;

/// The longest single active request.
pub const MAXIMUM_ACTIVE_LISTENING_DURATION_MILLIS: i64 = 10 * 1000;

/// At most four maximum-length active requests can ever be banked.
pub const MAX_ACTIVE_LISTENING_BUDGET_MILLIS: i64 = 4 * MAXIMUM_ACTIVE_LISTENING_DURATION_MILLIS;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ListenMode {
    Active,
    Passive,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ListenPlan {
    pub mode: ListenMode,
    pub duration_millis: i64,
}

/// The most recent listening outcome, used to age-gate active spending.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct LastOutcome {
    pub location_known: bool,
    pub at_elapsed_millis: i64,
}

/// The accountant. Starts with exactly one minimum active grant so the
/// first plan after boot can listen actively.
#[derive(Debug)]
pub struct ListeningBudget {
    balance_millis: i64,
}

impl Default for ListeningBudget {
    fn default() -> Self {
        Self::new()
    }
}

impl ListeningBudget {
    pub fn new() -> ListeningBudget {
        ListeningBudget {
            balance_millis: MINIMUM_ACTIVE_LISTENING_DURATION_MILLIS,
        }
    }

    pub fn balance_millis(&self) -> i64 {
        self.balance_millis
    }

    /// Credits a completed passive listening window.
    pub fn accrue(&mut self, passive_duration_millis: i64) {
        self.credit(passive_duration_millis.max(0) / PASSIVE_TO_ACTIVE_RATIO);
    }

    /// Refunds the unused tail of an active request that returned early.
    pub fn deposit(&mut self, unused_active_millis: i64) {
        self.credit(unused_active_millis.max(0));
    }

    fn credit(&mut self, amount_millis: i64) {
        self.balance_millis =
            (self.balance_millis + amount_millis).min(MAX_ACTIVE_LISTENING_BUDGET_MILLIS);
    }

    /// Decides the next listening round and, for an active round, debits
    /// its full duration up front.
    pub fn plan(&mut self, now_elapsed_millis: i64, last: Option<LastOutcome>) -> ListenPlan {
        if let Some(last) = last {
            let age = now_elapsed_millis.saturating_sub(last.at_elapsed_millis);
            let threshold = if last.location_known {
                LOCATION_KNOWN_AGE_THRESHOLD_MILLIS
            } else {
                LOCATION_NOT_KNOWN_AGE_THRESHOLD_MILLIS
            };
            if age < threshold {
                return ListenPlan {
                    mode: ListenMode::Passive,
                    duration_millis: MINIMUM_PASSIVE_LISTENING_DURATION_MILLIS,
                };
            }
        }

        if self.balance_millis >= MINIMUM_ACTIVE_LISTENING_DURATION_MILLIS {
            let duration = self
                .balance_millis
                .min(MAXIMUM_ACTIVE_LISTENING_DURATION_MILLIS);
            self.balance_millis -= duration;
            return ListenPlan {
                mode: ListenMode::Active,
                duration_millis: duration,
            };
        }

        ListenPlan {
            mode: ListenMode::Passive,
            duration_millis: MINIMUM_PASSIVE_LISTENING_DURATION_MILLIS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_first_plan_is_active() {
        let mut budget = ListeningBudget::new();
        let plan = budget.plan(0, None);
        assert_eq!(plan.mode, ListenMode::Active);
        assert_eq!(plan.duration_millis, MINIMUM_ACTIVE_LISTENING_DURATION_MILLIS);
        assert_eq!(budget.balance_millis(), 0);
    }

    #[test]
    fn fresh_fixes_suppress_active_listening() {
        let mut budget = ListeningBudget::new();
        let last = LastOutcome {
            location_known: true,
            at_elapsed_millis: 1_000_000,
        };

        let plan = budget.plan(1_000_000 + LOCATION_KNOWN_AGE_THRESHOLD_MILLIS - 1, Some(last));
        assert_eq!(plan.mode, ListenMode::Passive);
        assert_eq!(
            plan.duration_millis,
            MINIMUM_PASSIVE_LISTENING_DURATION_MILLIS
        );
        // Nothing was debited.
        assert_eq!(
            budget.balance_millis(),
            MINIMUM_ACTIVE_LISTENING_DURATION_MILLIS
        );

        let plan = budget.plan(1_000_000 + LOCATION_KNOWN_AGE_THRESHOLD_MILLIS, Some(last));
        assert_eq!(plan.mode, ListenMode::Active);
    }

    #[test]
    fn failed_fixes_back_off_for_a_minute() {
        let mut budget = ListeningBudget::new();
        let last = LastOutcome {
            location_known: false,
            at_elapsed_millis: 500_000,
        };

        let plan = budget.plan(500_000 + 59_999, Some(last));
        assert_eq!(plan.mode, ListenMode::Passive);
        let plan = budget.plan(500_000 + 60_000, Some(last));
        assert_eq!(plan.mode, ListenMode::Active);
    }

    #[test]
    fn active_plans_respect_the_duration_bounds() {
        // Whatever the balance, an active plan never falls below the minimum
        // or exceeds the maximum, and a passive plan never shrinks either.
        let mut budget = ListeningBudget::new();
        for round in 0..1000 {
            let plan = budget.plan(round * 10_000, None);
            match plan.mode {
                ListenMode::Active => {
                    assert!(plan.duration_millis >= MINIMUM_ACTIVE_LISTENING_DURATION_MILLIS);
                    assert!(plan.duration_millis <= MAXIMUM_ACTIVE_LISTENING_DURATION_MILLIS);
                }
                ListenMode::Passive => {
                    assert!(plan.duration_millis >= MINIMUM_PASSIVE_LISTENING_DURATION_MILLIS);
                }
            }
            budget.accrue(MINIMUM_PASSIVE_LISTENING_DURATION_MILLIS);
        }
    }

    #[test]
    fn the_balance_never_leaves_its_bounds() {
        let mut budget = ListeningBudget::new();
        budget.accrue(i64::MAX / 2);
        assert_eq!(budget.balance_millis(), MAX_ACTIVE_LISTENING_BUDGET_MILLIS);

        budget.deposit(i64::MAX / 2);
        assert_eq!(budget.balance_millis(), MAX_ACTIVE_LISTENING_BUDGET_MILLIS);

        // Draining: each plan debits what it grants, never more.
        loop {
            let before = budget.balance_millis();
            let plan = budget.plan(i64::MAX / 2, None);
            if plan.mode == ListenMode::Passive {
                break;
            }
            assert_eq!(budget.balance_millis(), before - plan.duration_millis);
            assert!(budget.balance_millis() >= 0);
        }
        assert!(budget.balance_millis() < MINIMUM_ACTIVE_LISTENING_DURATION_MILLIS);
    }

    #[test]
    fn refunds_and_accruals_are_never_negative() {
        let mut budget = ListeningBudget::new();
        budget.deposit(-5_000);
        budget.accrue(-90_000);
        assert_eq!(
            budget.balance_millis(),
            MINIMUM_ACTIVE_LISTENING_DURATION_MILLIS
        );
    }

    #[test]
    fn passive_time_converts_at_the_ratio() {
        let mut budget = ListeningBudget::new();
        let _ = budget.plan(0, None); // drain the initial grant
        budget.accrue(90_000);
        assert_eq!(budget.balance_millis(), 1_000);
    }
}
