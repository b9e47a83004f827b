//! # Kinship Core
//!
//! Core traits and types shared by the Kinship booking crates.
//!
//! Business rules are written as reducers: pure functions that take the
//! current state, an action and injected dependencies, update the state in
//! place and return descriptions of the side effects to perform. The caller
//! (an imperative shell such as the booking manager) decides when those
//! effects run, typically after the new state has been persisted.
//!
//! ## Core Concepts
//!
//! - **State**: Domain state for a feature
//! - **Action**: All possible inputs to a reducer (commands and events)
//! - **Reducer**: `(State, Action, Environment) → (State, Effects)`
//! - **Effect**: Side effect descriptions (not execution)
//! - **Environment**: Injected dependencies via traits
//!
//! Everything here is synchronous. An effect runs to completion on the thread
//! that executes it.
//!
//! ## Example
//!
//! ```
//! use kinship_core::{effect::Effect, reducer::Reducer, SmallVec};
//!
//! struct Counter;
//!
//! enum CounterAction {
//!     Increment,
//! }
//!
//! impl Reducer for Counter {
//!     type State = u32;
//!     type Action = CounterAction;
//!     type Environment = ();
//!
//!     fn reduce(
//!         &self,
//!         state: &mut u32,
//!         action: CounterAction,
//!         _env: &(),
//!     ) -> SmallVec<[Effect<CounterAction>; 4]> {
//!         match action {
//!             CounterAction::Increment => *state += 1,
//!         }
//!         SmallVec::new()
//!     }
//! }
//!
//! let mut count = 0;
//! let effects = Counter.reduce(&mut count, CounterAction::Increment, &());
//! assert_eq!(count, 1);
//! assert!(effects.is_empty());
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};
pub use smallvec::{SmallVec, smallvec};

/// Reducer module - The core trait for business logic
///
/// Reducers are pure functions: `(State, Action, Environment) → (State, Effects)`.
/// They contain all business logic and are deterministic and testable.
pub mod reducer {
    use super::effect::Effect;
    use smallvec::SmallVec;

    /// The Reducer trait - core abstraction for business logic
    ///
    /// # Type Parameters
    ///
    /// - `State`: The domain state this reducer operates on
    /// - `Action`: The action type this reducer processes
    /// - `Environment`: The injected dependencies this reducer needs
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// Reduce an action into state changes and effects
        ///
        /// 1. Validates the action
        /// 2. Updates state in place
        /// 3. Returns effect descriptions to be executed by the caller
        ///
        /// Most actions produce zero to a handful of effects, so the return
        /// buffer stays on the stack for the common case.
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

/// Effect module - Side effect descriptions
///
/// Effects are values returned from reducers. Nothing happens until the
/// owner of the state calls [`Effect::execute`](effect::Effect::execute).
pub mod effect {
    /// Boxed side-effecting closure. May produce a follow-up action.
    pub type Task<Action> = Box<dyn FnOnce() -> Option<Action> + Send>;

    /// Effect type - describes a side effect to be executed
    ///
    /// # Type Parameters
    ///
    /// - `Action`: The action type that effects can produce (feedback loop)
    pub enum Effect<Action> {
        /// No-op effect
        None,

        /// Run effects one after another, in order
        Sequential(Vec<Effect<Action>>),

        /// Arbitrary synchronous computation
        ///
        /// Returns `Option<Action>` - if Some, the action is handed back to the
        /// caller so it can be fed into the reducer again.
        Run(Task<Action>),
    }

    // Manual Debug implementation since closures don't implement Debug
    impl<Action> std::fmt::Debug for Effect<Action> {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Effect::None => write!(f, "Effect::None"),
                Effect::Sequential(effects) => {
                    f.debug_tuple("Effect::Sequential").field(effects).finish()
                },
                Effect::Run(_) => write!(f, "Effect::Run(<task>)"),
            }
        }
    }

    impl<Action> Effect<Action> {
        /// Wrap a closure that performs a side effect and produces no action
        #[must_use]
        pub fn run<F>(task: F) -> Self
        where
            F: FnOnce() + Send + 'static,
        {
            Effect::Run(Box::new(move || {
                task();
                None
            }))
        }

        /// Chain effects to run sequentially
        #[must_use]
        pub const fn chain(effects: Vec<Effect<Action>>) -> Self {
            Effect::Sequential(effects)
        }

        /// Returns true if executing this effect would do nothing
        #[must_use]
        pub fn is_none(&self) -> bool {
            match self {
                Effect::None => true,
                Effect::Sequential(effects) => effects.iter().all(Effect::is_none),
                Effect::Run(_) => false,
            }
        }

        /// Number of [`Effect::Run`] tasks contained in this effect, recursively
        #[must_use]
        pub fn task_count(&self) -> usize {
            match self {
                Effect::None => 0,
                Effect::Sequential(effects) => effects.iter().map(Effect::task_count).sum(),
                Effect::Run(_) => 1,
            }
        }

        /// Execute the effect on the current thread
        ///
        /// Every action produced by a task is passed to `feedback` in the order
        /// the tasks ran.
        pub fn execute(self, feedback: &mut dyn FnMut(Action)) {
            match self {
                Effect::None => {},
                Effect::Sequential(effects) => {
                    for effect in effects {
                        effect.execute(feedback);
                    }
                },
                Effect::Run(task) => {
                    if let Some(action) = task() {
                        feedback(action);
                    }
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
    use chrono::{DateTime, NaiveDate, Utc};

    /// Clock trait - abstracts time operations for testability
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;

        /// Current calendar date in UTC
        fn today(&self) -> NaiveDate {
            self.now().date_naive()
        }
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
