//! # Adslot Core
//!
//! Core traits and types shared by every adslot crate.
//!
//! Business rules are written as reducers: pure functions of
//! `(State, Action, Environment) → (State, Effects)`. A reducer never performs
//! I/O itself. It mutates the state it is handed and returns [`Effect`]
//! descriptions (send a notification, issue a refund) that the runtime executes
//! once the new state has been durably committed.
//!
//! - **State**: the record a reducer owns (for example one reservation)
//! - **Action**: every input to a reducer (commands and the events they produce)
//! - **Reducer**: validates an action, updates state, describes effects
//! - **Effect**: a side effect as a value, executed later by the runtime
//! - **Environment**: injected dependencies (clock, gateways) behind traits
//!
//! ## Example
//!
//! ```
//! use adslot_core::{effect::Effect, reducer::Reducer, SmallVec};
//!
//! #[derive(Clone, Debug, Default)]
//! struct Counter {
//!     value: u32,
//! }
//!
//! #[derive(Clone, Debug)]
//! enum CounterAction {
//!     Increment,
//! }
//!
//! struct CounterReducer;
//!
//! impl Reducer for CounterReducer {
//!     type State = Counter;
//!     type Action = CounterAction;
//!     type Environment = ();
//!
//!     fn reduce(
//!         &self,
//!         state: &mut Counter,
//!         action: CounterAction,
//!         _env: &(),
//!     ) -> SmallVec<[Effect<CounterAction>; 4]> {
//!         match action {
//!             CounterAction::Increment => state.value += 1,
//!         }
//!         SmallVec::new()
//!     }
//! }
//!
//! let mut state = Counter::default();
//! let effects = CounterReducer.reduce(&mut state, CounterAction::Increment, &());
//! assert_eq!(state.value, 1);
//! assert!(effects.is_empty());
//! ```

pub use chrono::{DateTime, Utc};
pub use smallvec::{smallvec, SmallVec};

/// The [`Reducer`](reducer::Reducer) trait
pub mod reducer {
    use super::effect::Effect;
    use smallvec::SmallVec;

    /// Business logic over one piece of state.
    ///
    /// `reduce` checks the action against the current state, mutates the
    /// state if the action is accepted and returns what should happen
    /// afterwards. It must not block or perform I/O. A rejected action leaves
    /// the state as it was; how the rejection is reported is up to the
    /// state type.
    pub trait Reducer {
        /// Record being reduced
        type State;

        /// Commands and events accepted by the reducer
        type Action;

        /// Injected collaborators (clock, gateways)
        type Environment;

        /// Apply `action` to `state`.
        ///
        /// Up to four effects stay on the stack; transitions in practice
        /// produce at most two.
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

/// Side effects as values
pub mod effect {
    use std::future::Future;
    use std::pin::Pin;

    /// Work a reducer asks for, executed by the runtime after the state
    /// change it belongs to has been committed.
    ///
    /// A future may resolve to a follow-up `Action`.
    pub enum Effect<Action> {
        /// Nothing to do
        None,

        /// Children run concurrently
        Parallel(Vec<Effect<Action>>),

        /// Any async work, optionally yielding a follow-up action
        Future(Pin<Box<dyn Future<Output = Option<Action>> + Send>>),
    }

    impl<Action> std::fmt::Debug for Effect<Action>
    where
        Action: std::fmt::Debug,
    {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Effect::None => f.write_str("Effect::None"),
                Effect::Parallel(children) => f.debug_tuple("Effect::Parallel").field(children).finish(),
                Effect::Future(_) => f.write_str("Effect::Future(<future>)"),
            }
        }
    }

    impl<Action> Effect<Action> {
        /// Group `effects` so they run side by side
        #[must_use]
        pub const fn merge(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Parallel(effects)
        }

        /// Wrap a fire-and-forget future that produces no follow-up action.
        #[must_use]
        pub fn fire_and_forget<F>(future: F) -> Effect<Action>
        where
            F: Future<Output = ()> + Send + 'static,
        {
            Effect::Future(Box::pin(async move {
                future.await;
                None
            }))
        }

        /// Returns `true` for [`Effect::None`].
        #[must_use]
        pub const fn is_none(&self) -> bool {
            matches!(self, Effect::None)
        }
    }
}

/// Collaborators reducers receive through their environment
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Source of the current time.
    ///
    /// Grace periods, window completion and `createdAt` stamps all read the
    /// injected clock, never `Utc::now()` directly.
    pub trait Clock: Send + Sync {
        /// Current instant
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
