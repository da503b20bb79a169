//! State identity and the behaviour capability invoked by the engine.
//!
//! The engine never looks inside a state. It only knows an opaque,
//! hashable identifier and a behaviour object exposing the three
//! lifecycle callbacks.

use std::error::Error;
use std::fmt::Debug;
use std::hash::Hash;
use std::rc::Rc;

/// Identifier of a state in the hierarchy.
///
/// Any cloneable, hashable, debuggable value qualifies: `&'static str`,
/// `String`, integers, or a dedicated enum.
///
/// # Example
///
/// ```rust
/// use hierarch::core::StateId;
///
/// #[derive(Clone, PartialEq, Eq, Hash, Debug)]
/// enum Door {
///     Open,
///     Closed,
/// }
///
/// fn accepts<S: StateId>(_id: S) {}
///
/// accepts(Door::Open);
/// accepts("locked");
/// ```
pub trait StateId: Clone + Eq + Hash + Debug + 'static {}

impl<T> StateId for T where T: Clone + Eq + Hash + Debug + 'static {}

/// Identifier of a trigger that may fire a transition.
pub trait TriggerId: Clone + Eq + Hash + Debug + 'static {}

impl<T> TriggerId for T where T: Clone + Eq + Hash + Debug + 'static {}

/// Error returned by a failing lifecycle callback.
pub type BehaviourError = Box<dyn Error + Send + Sync>;

/// Result of a lifecycle callback.
pub type BehaviourResult = Result<(), BehaviourError>;

/// Lifecycle callbacks of a state.
///
/// Callbacks take `&self`: the engine shares behaviours between the
/// hierarchy and the active path, so implementations that need to mutate
/// use interior mutability. A callback may call back into the machine
/// through a [`WeakStateMachine`](crate::machine::WeakStateMachine).
///
/// All methods default to doing nothing.
///
/// # Example
///
/// ```rust
/// use hierarch::core::{BehaviourResult, StateBehaviour};
/// use std::cell::Cell;
///
/// #[derive(Default)]
/// struct Counter {
///     ticks: Cell<u32>,
/// }
///
/// impl StateBehaviour for Counter {
///     fn update(&self) -> BehaviourResult {
///         self.ticks.set(self.ticks.get() + 1);
///         Ok(())
///     }
/// }
///
/// let counter = Counter::default();
/// counter.update().unwrap();
/// assert_eq!(counter.ticks.get(), 1);
/// ```
pub trait StateBehaviour {
    /// Called when the state joins the active hierarchy path.
    fn enter(&self) -> BehaviourResult {
        Ok(())
    }

    /// Called on every machine update while the state is active.
    fn update(&self) -> BehaviourResult {
        Ok(())
    }

    /// Called when the state leaves the active hierarchy path.
    fn exit(&self) -> BehaviourResult {
        Ok(())
    }
}

impl<B: StateBehaviour + ?Sized> StateBehaviour for Rc<B> {
    fn enter(&self) -> BehaviourResult {
        (**self).enter()
    }

    fn update(&self) -> BehaviourResult {
        (**self).update()
    }

    fn exit(&self) -> BehaviourResult {
        (**self).exit()
    }
}

/// Behaviour for purely structural states, such as composite parents.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NoopBehaviour;

impl StateBehaviour for NoopBehaviour {}

type Callback = Box<dyn Fn() -> BehaviourResult>;

/// Behaviour assembled from closures.
///
/// # Example
///
/// ```rust
/// use hierarch::core::{FnBehaviour, StateBehaviour};
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let entered = Rc::new(Cell::new(false));
/// let flag = Rc::clone(&entered);
/// let behaviour = FnBehaviour::new().on_enter(move || {
///     flag.set(true);
///     Ok(())
/// });
///
/// behaviour.enter().unwrap();
/// behaviour.exit().unwrap();
/// assert!(entered.get());
/// ```
#[derive(Default)]
pub struct FnBehaviour {
    on_enter: Option<Callback>,
    on_update: Option<Callback>,
    on_exit: Option<Callback>,
}

impl FnBehaviour {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_enter<F>(mut self, callback: F) -> Self
    where
        F: Fn() -> BehaviourResult + 'static,
    {
        self.on_enter = Some(Box::new(callback));
        self
    }

    pub fn on_update<F>(mut self, callback: F) -> Self
    where
        F: Fn() -> BehaviourResult + 'static,
    {
        self.on_update = Some(Box::new(callback));
        self
    }

    pub fn on_exit<F>(mut self, callback: F) -> Self
    where
        F: Fn() -> BehaviourResult + 'static,
    {
        self.on_exit = Some(Box::new(callback));
        self
    }
}

impl StateBehaviour for FnBehaviour {
    fn enter(&self) -> BehaviourResult {
        self.on_enter.as_ref().map_or(Ok(()), |callback| callback())
    }

    fn update(&self) -> BehaviourResult {
        self.on_update.as_ref().map_or(Ok(()), |callback| callback())
    }

    fn exit(&self) -> BehaviourResult {
        self.on_exit.as_ref().map_or(Ok(()), |callback| callback())
    }
}
