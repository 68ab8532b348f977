//! Given/When/Then harness for reducers.
//!
//! ```ignore
//! ReducerTest::new(LifecycleReducer::new())
//!     .with_env(env)
//!     .given_state(LifecycleState::new(pending))
//!     .when_action(LifecycleAction::Withdraw)
//!     .then_state(|s| assert_eq!(s.reservation.status, ReservationStatus::Cancelled))
//!     .then_effects(assertions::assert_no_effects)
//!     .run();
//! ```

#![allow(clippy::module_name_repetitions)] // ReducerTest is the natural name

use adslot_core::{effect::Effect, reducer::Reducer};

type StateCheck<S> = Box<dyn FnOnce(&S)>;
type EffectCheck<A> = Box<dyn FnOnce(&[Effect<A>])>;

/// Builder that reduces a queue of actions against a starting state and
/// then runs the registered checks.
///
/// Actions are reduced in order. Effect checks only see the effects returned
/// by the final action; earlier ones are dropped unexecuted.
pub struct ReducerTest<R, S, A, E>
where
    R: Reducer<State = S, Action = A, Environment = E>,
{
    reducer: R,
    env: Option<E>,
    given: Option<S>,
    actions: Vec<A>,
    state_checks: Vec<StateCheck<S>>,
    effect_checks: Vec<EffectCheck<A>>,
}

impl<R, S, A, E> ReducerTest<R, S, A, E>
where
    R: Reducer<State = S, Action = A, Environment = E>,
{
    /// Start a test around `reducer`
    #[must_use]
    pub const fn new(reducer: R) -> Self {
        Self {
            reducer,
            env: None,
            given: None,
            actions: Vec::new(),
            state_checks: Vec::new(),
            effect_checks: Vec::new(),
        }
    }

    /// Environment handed to every `reduce` call
    #[must_use]
    pub fn with_env(mut self, env: E) -> Self {
        self.env = Some(env);
        self
    }

    /// Given
    #[must_use]
    pub fn given_state(mut self, state: S) -> Self {
        self.given = Some(state);
        self
    }

    /// When; may be called repeatedly
    #[must_use]
    pub fn when_action(mut self, action: A) -> Self {
        self.actions.push(action);
        self
    }

    /// Then, on the final state
    #[must_use]
    pub fn then_state<F>(mut self, check: F) -> Self
    where
        F: FnOnce(&S) + 'static,
    {
        self.state_checks.push(Box::new(check));
        self
    }

    /// Then, comparing the final state to `expected`
    #[must_use]
    pub fn then_state_eq(self, expected: S) -> Self
    where
        S: PartialEq + std::fmt::Debug + 'static,
    {
        self.then_state(move |state| assert_eq!(state, &expected))
    }

    /// Then, on the effects of the last action
    #[must_use]
    pub fn then_effects<F>(mut self, check: F) -> Self
    where
        F: FnOnce(&[Effect<A>]) + 'static,
    {
        self.effect_checks.push(Box::new(check));
        self
    }

    /// Reduce every queued action and run the checks.
    ///
    /// # Panics
    ///
    /// Panics when the state, environment or actions were never supplied,
    /// and whenever a check fails.
    #[allow(clippy::panic)] // Test code can panic
    #[allow(clippy::expect_used)] // Test code can use expect
    pub fn run(self) {
        let mut state = self.given.expect("given_state() was never called");
        let env = self.env.expect("with_env() was never called");
        assert!(!self.actions.is_empty(), "when_action() was never called");

        let mut last = Vec::new();
        for action in self.actions {
            last = self.reducer.reduce(&mut state, action, &env).into_vec();
        }

        self.state_checks.into_iter().for_each(|check| check(&state));
        self.effect_checks.into_iter().for_each(|check| check(&last));
    }
}

/// Reusable effect checks for [`ReducerTest::then_effects`].
pub mod assertions {
    use adslot_core::effect::Effect;

    fn futures<A>(effects: &[Effect<A>]) -> usize {
        effects.iter().filter(|e| matches!(e, Effect::Future(_))).count()
    }

    /// Nothing to execute (an empty list or only `Effect::None`).
    ///
    /// # Panics
    ///
    /// Panics if any effect does work.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_no_effects<A: std::fmt::Debug>(effects: &[Effect<A>]) {
        assert!(
            effects.iter().all(Effect::is_none),
            "expected no work, got {effects:?}"
        );
    }

    /// Exactly `expected` effects, of any kind.
    ///
    /// # Panics
    ///
    /// Panics on a different count.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_effects_count<A>(effects: &[Effect<A>], expected: usize) {
        assert_eq!(effects.len(), expected, "effect count");
    }

    /// At least one future to spawn.
    ///
    /// # Panics
    ///
    /// Panics if no effect is a future.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_has_future_effect<A>(effects: &[Effect<A>]) {
        assert!(futures(effects) > 0, "expected a future effect, got none");
    }

    /// Exactly `expected` futures; other effect kinds are ignored.
    ///
    /// # Panics
    ///
    /// Panics on a different number of futures.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_future_effects<A>(effects: &[Effect<A>], expected: usize) {
        assert_eq!(futures(effects), expected, "future effect count");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adslot_core::{smallvec, SmallVec};

    #[derive(Clone, Debug, PartialEq, Eq)]
    struct Slots {
        free: u32,
    }

    #[derive(Clone, Debug)]
    enum SlotAction {
        Take,
        Release,
    }

    struct SlotReducer;

    impl Reducer for SlotReducer {
        type State = Slots;
        type Action = SlotAction;
        type Environment = ();

        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            _env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]> {
            match action {
                SlotAction::Take if state.free > 0 => {
                    state.free -= 1;
                    smallvec![Effect::None]
                },
                SlotAction::Take => SmallVec::new(),
                SlotAction::Release => {
                    state.free += 1;
                    smallvec![Effect::fire_and_forget(async {}), Effect::None]
                },
            }
        }
    }

    #[test]
    fn test_single_action() {
        ReducerTest::new(SlotReducer)
            .with_env(())
            .given_state(Slots { free: 1 })
            .when_action(SlotAction::Take)
            .then_state_eq(Slots { free: 0 })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn test_action_sequence_reports_last_effects() {
        ReducerTest::new(SlotReducer)
            .with_env(())
            .given_state(Slots { free: 0 })
            .when_action(SlotAction::Take)
            .when_action(SlotAction::Release)
            .then_state(|state| assert_eq!(state.free, 1))
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 2);
                assertions::assert_has_future_effect(effects);
                assertions::assert_future_effects(effects, 1);
            })
            .run();
    }

    #[test]
    #[should_panic(expected = "when_action() was never called")]
    fn test_missing_action_panics() {
        ReducerTest::new(SlotReducer)
            .with_env(())
            .given_state(Slots { free: 1 })
            .run();
    }
}
