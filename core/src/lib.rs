//! # Chagua Core
//!
//! Core traits and types shared by the Chagua marketplace engines.
//!
//! Every engine in the marketplace (reservations, reputation, trust, agreements,
//! moderation) is written as a reducer over one aggregate's state:
//!
//! - **State**: the aggregate owned by one lock (a listing, a review target, a user)
//! - **Action**: the commands the aggregate accepts
//! - **Reducer**: `(State, Action, Environment) → Result<(Output, Effects), Error>`
//! - **Effect**: descriptions of outbound notifications (not their delivery)
//! - **Environment**: injected dependencies such as the [`environment::Clock`]
//!
//! ## Architecture Principles
//!
//! - Functional Core, Imperative Shell
//! - Validate first, then mutate: a reducer that returns `Err` leaves state untouched
//! - Explicit Effects (no hidden I/O inside reducers)
//! - Dependency Injection via Environment
//!
//! ## Example
//!
//! ```ignore
//! use chagua_core::{effect::Effect, reducer::{Reduced, Reducer}};
//!
//! impl Reducer for CounterReducer {
//!     type State = CounterState;
//!     type Action = CounterAction;
//!     type Environment = CounterEnvironment;
//!     type Output = u32;
//!     type Error = CounterError;
//!     type Notification = String;
//!
//!     fn reduce(
//!         &self,
//!         state: &mut CounterState,
//!         action: CounterAction,
//!         _env: &CounterEnvironment,
//!     ) -> Result<Reduced<u32, String>, CounterError> {
//!         state.count += 1;
//!         Ok(Reduced::new(state.count))
//!     }
//! }
//! ```

pub use chrono::{DateTime, Utc};
pub use smallvec::{smallvec, SmallVec};

pub mod notify;

/// Reducer module - The core trait for business logic
///
/// Reducers are functions `(State, Action, Environment) → Result<(Output, Effects), Error>`.
///
/// They contain all business logic and are deterministic and testable.
pub mod reducer {
    use super::effect::Effect;
    use smallvec::SmallVec;

    /// Effects returned alongside a reducer output.
    pub type Effects<N> = SmallVec<[Effect<N>; 4]>;

    /// Successful result of a reduction: a value for the caller plus the
    /// effects the runtime must execute once the state lock is released.
    #[derive(Debug)]
    pub struct Reduced<T, N> {
        /// Value handed back to the caller of the store
        pub output: T,
        /// Side effects to run after the state change is committed
        pub effects: Effects<N>,
    }

    impl<T, N> Reduced<T, N> {
        /// Wrap an output with no effects
        #[must_use]
        pub fn new(output: T) -> Self {
            Self {
                output,
                effects: SmallVec::new(),
            }
        }

        /// Attach one more effect
        #[must_use]
        pub fn with_effect(mut self, effect: Effect<N>) -> Self {
            self.effects.push(effect);
            self
        }

        /// Attach a notification to publish
        #[must_use]
        pub fn publish(self, notification: N) -> Self {
            self.with_effect(Effect::Publish(notification))
        }

        /// Transform the output, keeping the effects
        pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Reduced<U, N> {
            Reduced {
                output: f(self.output),
                effects: self.effects,
            }
        }
    }

    /// The Reducer trait - core abstraction for business logic
    ///
    /// # Contract
    ///
    /// A reducer validates the action against the current state before it
    /// mutates anything. When it returns `Err`, the state must be exactly as it
    /// was before the call; this is what lets a store treat one `reduce` call as
    /// an all-or-nothing transaction.
    ///
    /// # Type Parameters
    ///
    /// - `State`: The aggregate this reducer operates on
    /// - `Action`: The commands this reducer accepts
    /// - `Environment`: The injected dependencies this reducer needs
    /// - `Output`: The value handed back to the caller on success
    /// - `Error`: The typed failure handed back to the caller
    /// - `Notification`: The payload type of published notifications
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// The success value returned to the caller
        type Output;

        /// The failure returned to the caller
        type Error;

        /// The notification payload carried by `Effect::Publish`
        type Notification;

        /// Reduce an action into state changes and effects
        ///
        /// # Errors
        ///
        /// Returns the reducer's error type when the action is rejected. State is
        /// left unmodified in that case.
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> Result<Reduced<Self::Output, Self::Notification>, Self::Error>;
    }
}

/// Effect module - Side effect descriptions
///
/// Effects describe side effects to be performed by the runtime after the
/// reducer has committed its state change. The only outbound side effect the
/// marketplace engines have is publishing notifications.
pub mod effect {
    /// Effect type - describes a side effect to be executed
    ///
    /// # Type Parameters
    ///
    /// - `N`: The notification payload type
    #[derive(Debug, Clone, PartialEq)]
    pub enum Effect<N> {
        /// No-op effect
        None,

        /// Publish a notification to the outbound notifier
        Publish(N),

        /// Run effects in parallel
        Parallel(Vec<Effect<N>>),
    }

    impl<N> Effect<N> {
        /// Combine effects to run in parallel
        #[must_use]
        pub const fn merge(effects: Vec<Effect<N>>) -> Effect<N> {
            Effect::Parallel(effects)
        }

        /// Flatten this effect into the notifications it publishes
        pub fn into_notifications(self) -> Vec<N> {
            match self {
                Effect::None => Vec::new(),
                Effect::Publish(notification) => vec![notification],
                Effect::Parallel(effects) => effects
                    .into_iter()
                    .flat_map(Effect::into_notifications)
                    .collect(),
            }
        }

        /// Borrowing variant of [`Effect::into_notifications`]
        pub fn notifications(&self) -> Vec<&N> {
            match self {
                Effect::None => Vec::new(),
                Effect::Publish(notification) => vec![notification],
                Effect::Parallel(effects) => {
                    effects.iter().flat_map(Effect::notifications).collect()
                },
            }
        }
    }
}

/// Environment module - Dependency injection traits
///
/// All external dependencies are abstracted behind traits and injected
/// via the Environment parameter.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// Booking validation ("not in the past"), badge eligibility ("one year of
    /// clean activity") and every created timestamp read time through this
    /// trait so tests can pin or advance it.
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::effect::Effect;
    use super::reducer::Reduced;

    #[test]
    fn parallel_effects_flatten_in_order() {
        let effect = Effect::merge(vec![
            Effect::Publish("a"),
            Effect::None,
            Effect::Parallel(vec![Effect::Publish("b"), Effect::Publish("c")]),
        ]);

        assert_eq!(effect.notifications(), vec![&"a", &"b", &"c"]);
        assert_eq!(effect.into_notifications(), vec!["a", "b", "c"]);
    }

    #[test]
    fn reduced_map_keeps_effects() {
        let reduced: Reduced<u32, &str> = Reduced::new(1).publish("done");
        let mapped = reduced.map(|n| n + 1);

        assert_eq!(mapped.output, 2);
        assert_eq!(mapped.effects.len(), 1);
    }
}
