//! Ergonomic testing utilities for reducers
//!
//! This module provides a fluent API for testing reducers with readable Given-When-Then syntax.

#![allow(clippy::module_name_repetitions)] // ReducerTest is the natural name

use chagua_core::{effect::Effect, reducer::Reducer};
use std::fmt::Debug;

type StateAssertion<S> = Box<dyn FnOnce(&S)>;
type OutputAssertion<O> = Box<dyn FnOnce(&O)>;
type ErrorAssertion<E> = Box<dyn FnOnce(&E)>;
type EffectAssertion<N> = Box<dyn FnOnce(&[Effect<N>])>;

/// Fluent API for testing reducers with Given-When-Then syntax
///
/// Output and effect assertions imply the action must succeed; error
/// assertions imply it must fail. State assertions run either way.
///
/// # Example
///
/// ```ignore
/// use chagua_testing::ReducerTest;
///
/// ReducerTest::new(BookingReducer::new())
///     .with_env(test_environment())
///     .given_state(listing_state())
///     .when_action(BookingAction::ConfirmPayment { .. })
///     .then_error(|err| assert_eq!(err.kind(), ErrorKind::InvalidState))
///     .then_state_unchanged()
///     .run();
/// ```
pub struct ReducerTest<R>
where
    R: Reducer,
{
    reducer: R,
    environment: Option<R::Environment>,
    initial_state: Option<R::State>,
    action: Option<R::Action>,
    state_assertions: Vec<StateAssertion<R::State>>,
    output_assertions: Vec<OutputAssertion<R::Output>>,
    error_assertions: Vec<ErrorAssertion<R::Error>>,
    effect_assertions: Vec<EffectAssertion<R::Notification>>,
}

impl<R> ReducerTest<R>
where
    R: Reducer,
    R::Output: Debug,
    R::Error: Debug,
{
    /// Create a new reducer test with the given reducer
    #[must_use]
    pub const fn new(reducer: R) -> Self {
        Self {
            reducer,
            environment: None,
            initial_state: None,
            action: None,
            state_assertions: Vec::new(),
            output_assertions: Vec::new(),
            error_assertions: Vec::new(),
            effect_assertions: Vec::new(),
        }
    }

    /// Set the environment for the test
    #[must_use]
    pub fn with_env(mut self, env: R::Environment) -> Self {
        self.environment = Some(env);
        self
    }

    /// Set the initial state (Given)
    #[must_use]
    pub fn given_state(mut self, state: R::State) -> Self {
        self.initial_state = Some(state);
        self
    }

    /// Set the action to test (When)
    #[must_use]
    pub fn when_action(mut self, action: R::Action) -> Self {
        self.action = Some(action);
        self
    }

    /// Add an assertion about the resulting state (Then)
    #[must_use]
    pub fn then_state<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&R::State) + 'static,
    {
        self.state_assertions.push(Box::new(assertion));
        self
    }

    /// Expect success and assert on the output (Then)
    #[must_use]
    pub fn then_output<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&R::Output) + 'static,
    {
        self.output_assertions.push(Box::new(assertion));
        self
    }

    /// Expect failure and assert on the error (Then)
    #[must_use]
    pub fn then_error<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&R::Error) + 'static,
    {
        self.error_assertions.push(Box::new(assertion));
        self
    }

    /// Expect success and assert on the effects (Then)
    #[must_use]
    pub fn then_effects<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&[Effect<R::Notification>]) + 'static,
    {
        self.effect_assertions.push(Box::new(assertion));
        self
    }

    /// Run the test and execute all assertions
    ///
    /// # Panics
    ///
    /// Panics if initial state, action, or environment is not set, if the
    /// action succeeds where failure was expected (or the reverse), or if any
    /// assertion fails.
    #[allow(clippy::panic)] // Test code can panic
    #[allow(clippy::expect_used)] // Test code can use expect
    pub fn run(self) {
        let mut state = self
            .initial_state
            .expect("Initial state must be set with given_state()");

        let action = self.action.expect("Action must be set with when_action()");

        let env = self
            .environment
            .expect("Environment must be set with with_env()");

        match self.reducer.reduce(&mut state, action, &env) {
            Ok(reduced) => {
                assert!(
                    self.error_assertions.is_empty(),
                    "Expected the action to fail, but it succeeded with {:?}",
                    reduced.output
                );
                for assertion in self.output_assertions {
                    assertion(&reduced.output);
                }
                for assertion in self.effect_assertions {
                    assertion(&reduced.effects);
                }
            },
            Err(error) => {
                assert!(
                    self.output_assertions.is_empty() && self.effect_assertions.is_empty(),
                    "Expected the action to succeed, but it failed with {error:?}"
                );
                for assertion in self.error_assertions {
                    assertion(&error);
                }
            },
        }

        for assertion in self.state_assertions {
            assertion(&state);
        }
    }
}

impl<R> ReducerTest<R>
where
    R: Reducer,
    R::State: Clone + PartialEq + Debug + 'static,
    R::Output: Debug,
    R::Error: Debug,
{
    /// Assert the state after the action equals the given state (Then)
    ///
    /// Pairs with [`ReducerTest::then_error`] to check that a rejected action
    /// left no partial changes behind. Must be called after `given_state`.
    ///
    /// # Panics
    ///
    /// Panics if `given_state` has not been called yet.
    #[must_use]
    #[allow(clippy::expect_used)] // Test code can use expect
    pub fn then_state_unchanged(self) -> Self {
        let snapshot = self
            .initial_state
            .clone()
            .expect("then_state_unchanged() must follow given_state()");
        self.then_state(move |state| {
            assert_eq!(state, &snapshot, "State changed although it should not have");
        })
    }
}

/// Helper assertions for effects
pub mod assertions {
    use chagua_core::effect::Effect;

    /// Notifications published by a list of effects, in order
    pub fn published<N>(effects: &[Effect<N>]) -> Vec<&N> {
        effects.iter().flat_map(Effect::notifications).collect()
    }

    /// Assert that there are no effects
    ///
    /// # Panics
    ///
    /// Panics if any effect publishes something.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_no_effects<N: std::fmt::Debug>(effects: &[Effect<N>]) {
        assert!(
            published(effects).is_empty(),
            "Expected no effects, but found {}: {:?}",
            effects.len(),
            effects
        );
    }

    /// Assert the number of published notifications
    ///
    /// # Panics
    ///
    /// Panics if the number of notifications doesn't match expected.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_published_count<N>(effects: &[Effect<N>], expected: usize) {
        let found = published(effects).len();
        assert_eq!(
            found, expected,
            "Expected {expected} published notifications, but found {found}"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chagua_core::reducer::Reduced;

    #[derive(Clone, Debug, PartialEq)]
    struct TestState {
        count: i32,
    }

    #[derive(Clone, Debug)]
    enum TestAction {
        Increment,
        Decrement,
    }

    #[derive(Debug, PartialEq)]
    struct Underflow;

    struct TestReducer;

    impl Reducer for TestReducer {
        type State = TestState;
        type Action = TestAction;
        type Environment = ();
        type Output = i32;
        type Error = Underflow;
        type Notification = &'static str;

        fn reduce(
            &self,
            state: &mut TestState,
            action: TestAction,
            _env: &(),
        ) -> Result<Reduced<i32, &'static str>, Underflow> {
            match action {
                TestAction::Increment => {
                    state.count += 1;
                    Ok(Reduced::new(state.count).publish("incremented"))
                },
                TestAction::Decrement => {
                    if state.count == 0 {
                        return Err(Underflow);
                    }
                    state.count -= 1;
                    Ok(Reduced::new(state.count))
                },
            }
        }
    }

    #[test]
    fn test_reducer_test_increment() {
        ReducerTest::new(TestReducer)
            .with_env(())
            .given_state(TestState { count: 0 })
            .when_action(TestAction::Increment)
            .then_output(|count| assert_eq!(*count, 1))
            .then_state(|state| assert_eq!(state.count, 1))
            .then_effects(|effects| assertions::assert_published_count(effects, 1))
            .run();
    }

    #[test]
    fn test_reducer_test_error_leaves_state() {
        ReducerTest::new(TestReducer)
            .with_env(())
            .given_state(TestState { count: 0 })
            .when_action(TestAction::Decrement)
            .then_error(|err| assert_eq!(err, &Underflow))
            .then_state_unchanged()
            .run();
    }

    #[test]
    #[should_panic(expected = "Expected the action to fail")]
    fn test_reducer_test_detects_unexpected_success() {
        ReducerTest::new(TestReducer)
            .with_env(())
            .given_state(TestState { count: 3 })
            .when_action(TestAction::Decrement)
            .then_error(|_| {})
            .run();
    }

    #[test]
    fn test_assertions_no_effects() {
        assertions::assert_no_effects::<&str>(&[Effect::None]);
        assertions::assert_no_effects::<&str>(&[]);
    }
}
