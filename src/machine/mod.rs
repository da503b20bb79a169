//! The state machine facade.
//!
//! [`StateMachine`] wires the hierarchy, the scheduler and the transition
//! manager together and adds the checks that span more than one of them:
//! lifecycle state, protection of active states, and rejection of
//! mutations while guards are being evaluated.
//!
//! The machine is a cheap, single-threaded handle. Callbacks that need to
//! call back into the machine should hold a [`WeakStateMachine`] to avoid
//! a reference cycle through the machine's own states.

mod history;
mod validation;

pub use history::{TransitionHistory, TransitionRecord};
pub use validation::ValidationReport;

use crate::config::MachineConfig;
use crate::core::{EventHandler, Guard, StateBehaviour, StateId, Transition, TriggerId};
use crate::error::MachineError;
use crate::hierarchy::StateHierarchy;
use crate::scheduler::{HierarchyScheduler, PathChange, PathObserver};
use crate::transitions::TransitionManager;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};
use uuid::Uuid;

/// Unique identity of a machine instance, attached to its log events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MachineId(Uuid);

impl MachineId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for MachineId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MachineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

struct Inner<S: StateId, T: TriggerId, E> {
    id: MachineId,
    config: MachineConfig,
    hierarchy: RefCell<StateHierarchy<S>>,
    scheduler: HierarchyScheduler<S>,
    transitions: TransitionManager<S, T>,
    handlers: RefCell<HashMap<S, Vec<EventHandler<E>>>>,
    history: RefCell<TransitionHistory<S, T>>,
}

/// Hierarchical state machine.
///
/// `S` identifies states, `T` identifies triggers and `E` is the event
/// type delivered to subscribed handlers.
///
/// # Example
///
/// ```rust
/// use hierarch::core::{NoopBehaviour, Transition};
/// use hierarch::StateMachine;
///
/// let machine: StateMachine<&str, &str> = StateMachine::new();
/// machine.add_state("player", NoopBehaviour).unwrap();
/// machine.add_state("idle", NoopBehaviour).unwrap();
/// machine.add_state("walking", NoopBehaviour).unwrap();
/// machine.add_child(&"player", &"idle").unwrap();
/// machine.add_child(&"player", &"walking").unwrap();
/// machine
///     .add_transition(Transition::new("idle", "move", "walking"))
///     .unwrap();
///
/// machine.start().unwrap();
/// assert_eq!(machine.active_path(), vec!["player", "idle"]);
///
/// machine.trigger("move").unwrap();
/// assert_eq!(machine.active_path(), vec!["player", "walking"]);
/// ```
pub struct StateMachine<S: StateId, T: TriggerId, E: 'static = ()> {
    inner: Rc<Inner<S, T, E>>,
}

impl<S: StateId, T: TriggerId, E: 'static> Clone for StateMachine<S, T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<S: StateId, T: TriggerId, E: 'static> Default for StateMachine<S, T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: StateId, T: TriggerId, E: 'static> fmt::Debug for StateMachine<S, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateMachine")
            .field("id", &self.inner.id)
            .field("name", &self.inner.config.name)
            .field("started", &self.is_started())
            .field("active_path", &self.active_path())
            .finish_non_exhaustive()
    }
}

/// Non-owning handle to a [`StateMachine`].
pub struct WeakStateMachine<S: StateId, T: TriggerId, E: 'static = ()> {
    inner: Weak<Inner<S, T, E>>,
}

impl<S: StateId, T: TriggerId, E: 'static> Clone for WeakStateMachine<S, T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<S: StateId, T: TriggerId, E: 'static> WeakStateMachine<S, T, E> {
    /// The machine, if it is still alive.
    pub fn upgrade(&self) -> Option<StateMachine<S, T, E>> {
        self.inner.upgrade().map(|inner| StateMachine { inner })
    }
}

impl<S: StateId, T: TriggerId, E: 'static> StateMachine<S, T, E> {
    pub fn new() -> Self {
        Self::with_config(MachineConfig::default())
    }

    pub fn with_config(config: MachineConfig) -> Self {
        let inner = Inner {
            id: MachineId::new(),
            hierarchy: RefCell::new(StateHierarchy::new()),
            scheduler: HierarchyScheduler::new(config.switch_policy),
            transitions: TransitionManager::new(),
            handlers: RefCell::new(HashMap::new()),
            history: RefCell::new(TransitionHistory::new(config.history_limit)),
            config,
        };
        Self {
            inner: Rc::new(inner),
        }
    }

    pub fn id(&self) -> MachineId {
        self.inner.id
    }

    pub fn config(&self) -> &MachineConfig {
        &self.inner.config
    }

    pub fn downgrade(&self) -> WeakStateMachine<S, T, E> {
        WeakStateMachine {
            inner: Rc::downgrade(&self.inner),
        }
    }

    // ----- structure -----

    /// Add a new root state.
    ///
    /// The first state added (or the first one added after the initial
    /// state was removed) becomes the initial state.
    pub fn add_state<B>(&self, id: S, behaviour: B) -> Result<(), MachineError>
    where
        B: StateBehaviour + 'static,
    {
        self.ensure_not_evaluating()?;
        tracing::debug!(machine = %self.inner.id, state = ?id, "Adding state");
        self.inner
            .hierarchy
            .borrow_mut()
            .add_state(id, Rc::new(behaviour))
    }

    /// Remove a state, promoting its children to roots.
    ///
    /// Transitions into or out of the state are removed with their
    /// guards, and its event handlers are dropped. Returns `Ok(false)` for
    /// an unknown id.
    pub fn remove_state(&self, id: &S) -> Result<bool, MachineError> {
        self.ensure_not_evaluating()?;
        if self.inner.scheduler.is_protected(id) {
            return Err(MachineError::protected(id, "removed"));
        }

        let removed = self.inner.hierarchy.borrow_mut().remove_state(id);
        if removed.is_none() {
            return Ok(false);
        }
        let purged = self.inner.transitions.remove_transitions_of(id);
        self.inner.handlers.borrow_mut().remove(id);
        tracing::debug!(machine = %self.inner.id, state = ?id, purged, "Removed state");
        Ok(true)
    }

    /// Make `child` a child of `parent`.
    ///
    /// Returns `Ok(false)` if the edge already exists. An active state
    /// cannot be moved under a new parent.
    pub fn add_child(&self, parent: &S, child: &S) -> Result<bool, MachineError> {
        self.ensure_not_evaluating()?;
        let mut hierarchy = self.inner.hierarchy.borrow_mut();
        let moves_active = parent != child
            && hierarchy.contains_state(parent)
            && !hierarchy.is_child_of(child, parent)
            && self.inner.scheduler.is_protected(child);
        if moves_active {
            return Err(MachineError::protected(child, "re-parented"));
        }
        hierarchy.add_child(parent, child)
    }

    /// Detach `child` from `parent`, making it a root.
    ///
    /// Returns `Ok(false)` if the edge does not exist. An active child of
    /// an active parent cannot be detached.
    pub fn remove_child(&self, parent: &S, child: &S) -> Result<bool, MachineError> {
        self.ensure_not_evaluating()?;
        let mut hierarchy = self.inner.hierarchy.borrow_mut();
        if !hierarchy.is_child_of(child, parent) {
            return Ok(false);
        }
        let scheduler = &self.inner.scheduler;
        if scheduler.is_protected(parent) && scheduler.is_protected(child) {
            return Err(MachineError::protected(child, "detached"));
        }
        Ok(hierarchy.remove_child(parent, child))
    }

    pub fn set_initial_child(&self, parent: &S, child: &S) -> Result<(), MachineError> {
        self.ensure_not_evaluating()?;
        self.inner
            .hierarchy
            .borrow_mut()
            .set_initial_child(parent, child)
    }

    /// Choose the root entered by [`start`](Self::start).
    pub fn set_initial_state(&self, id: &S) -> Result<(), MachineError> {
        self.ensure_not_evaluating()?;
        self.inner.hierarchy.borrow_mut().set_initial_state(id)
    }

    pub fn initial_state(&self) -> Option<S> {
        self.inner.hierarchy.borrow().initial_state().cloned()
    }

    pub fn initial_child_of(&self, parent: &S) -> Result<Option<S>, MachineError> {
        Ok(self
            .inner
            .hierarchy
            .borrow()
            .initial_child_of(parent)?
            .cloned())
    }

    pub fn contains_state(&self, id: &S) -> bool {
        self.inner.hierarchy.borrow().contains_state(id)
    }

    pub fn state_count(&self) -> usize {
        self.inner.hierarchy.borrow().state_count()
    }

    /// All states in insertion order.
    pub fn states(&self) -> Vec<S> {
        self.inner.hierarchy.borrow().states().cloned().collect()
    }

    /// Parent of `id`, or `id` itself for a root.
    pub fn parent_of(&self, id: &S) -> Result<S, MachineError> {
        self.inner.hierarchy.borrow().parent_of(id).cloned()
    }

    pub fn children_of(&self, id: &S) -> Result<Vec<S>, MachineError> {
        Ok(self.inner.hierarchy.borrow().children_of(id)?.to_vec())
    }

    pub fn roots(&self) -> Vec<S> {
        self.inner.hierarchy.borrow().roots().to_vec()
    }

    /// Accumulate every structural problem of the machine.
    pub fn validate(&self) -> ValidationReport {
        let hierarchy = self.inner.hierarchy.borrow();
        let transitions = self.inner.transitions.transitions();
        self.inner.transitions.with_guards(|guards| {
            validation::validate_structure(&hierarchy, &transitions, guards)
        })
    }

    // ----- transitions and guards -----

    /// Register a transition. Returns `Ok(false)` if it already exists.
    pub fn add_transition(&self, transition: Transition<S, T>) -> Result<bool, MachineError> {
        self.ensure_not_evaluating()?;
        {
            let hierarchy = self.inner.hierarchy.borrow();
            for endpoint in [&transition.from, &transition.to] {
                if !hierarchy.contains_state(endpoint) {
                    return Err(MachineError::not_found(endpoint));
                }
            }
        }
        Ok(self.inner.transitions.add_transition(transition))
    }

    /// Remove a transition together with its guards.
    pub fn remove_transition(&self, transition: &Transition<S, T>) -> Result<bool, MachineError> {
        self.ensure_not_evaluating()?;
        Ok(self.inner.transitions.remove_transition(transition))
    }

    pub fn contains_transition(&self, transition: &Transition<S, T>) -> bool {
        self.inner.transitions.contains_transition(transition)
    }

    pub fn transitions(&self) -> Vec<Transition<S, T>> {
        self.inner.transitions.transitions()
    }

    pub fn transitions_from(&self, state: &S) -> Vec<Transition<S, T>> {
        self.inner.transitions.transitions_from(state)
    }

    /// Append a guard to a registered transition.
    ///
    /// Returns the guard handle used to remove it again.
    pub fn add_guard<F>(&self, transition: &Transition<S, T>, predicate: F) -> Result<Guard, MachineError>
    where
        F: Fn() -> bool + 'static,
    {
        self.ensure_not_evaluating()?;
        let guard = Guard::new(predicate);
        self.inner.transitions.add_guard(transition, guard.clone())?;
        Ok(guard)
    }

    pub fn remove_guard(&self, transition: &Transition<S, T>, guard: &Guard) -> Result<bool, MachineError> {
        self.ensure_not_evaluating()?;
        Ok(self.inner.transitions.remove_guard(transition, guard))
    }

    pub fn guards_of(&self, transition: &Transition<S, T>) -> Vec<Guard> {
        self.inner.transitions.guards_of(transition)
    }

    pub fn contains_guard(&self, transition: &Transition<S, T>, guard: &Guard) -> bool {
        self.inner.transitions.contains_guard(transition, guard)
    }

    // ----- lifecycle -----

    /// Enter the initial state's chain, root to leaf.
    ///
    /// Triggers fired from `enter` callbacks are resolved once every state
    /// has been entered.
    pub fn start(&self) -> Result<(), MachineError> {
        self.ensure_not_evaluating()?;
        let scheduler = &self.inner.scheduler;
        if scheduler.is_changing() {
            return Err(MachineError::PathChangeInProgress);
        }
        if scheduler.is_started() {
            return Err(MachineError::MachineStarted);
        }
        if self.inner.hierarchy.borrow().is_empty() {
            return Err(MachineError::EmptyMachine);
        }

        let span = self.span();
        let _entered = span.enter();
        tracing::debug!("Starting machine");
        if let Err(err) = scheduler.enter(&self.inner.hierarchy) {
            self.discard_pending();
            return Err(err);
        }
        self.drain()
    }

    /// Exit every active state, leaf to root.
    ///
    /// Does nothing when stopped. Pending triggers are discarded.
    pub fn stop(&self) -> Result<(), MachineError> {
        self.ensure_not_evaluating()?;
        let span = self.span();
        let _entered = span.enter();
        if self.is_started() {
            tracing::debug!("Stopping machine");
        }
        let result = self.inner.scheduler.exit();
        if !matches!(result, Err(MachineError::PathChangeInProgress)) {
            self.discard_pending();
        }
        result
    }

    /// Run `update` on every active state, root to leaf.
    pub fn update(&self) -> Result<(), MachineError> {
        self.ensure_not_evaluating()?;
        self.inner.scheduler.update()
    }

    /// Fire a trigger.
    ///
    /// Fired while another trigger is being resolved or while the active
    /// path is changing, the trigger is queued and resolved after the
    /// current work completes, in FIFO order.
    pub fn trigger(&self, value: T) -> Result<(), MachineError> {
        let inner = &self.inner;
        inner
            .transitions
            .trigger(value, &inner.scheduler, &inner.hierarchy, |transition, change| {
                self.record(transition, change)
            })
    }

    pub fn is_started(&self) -> bool {
        self.inner.scheduler.is_started()
    }

    /// Whether guard predicates are currently being evaluated.
    pub fn is_evaluating(&self) -> bool {
        self.inner.transitions.is_evaluating()
    }

    pub fn pending_triggers(&self) -> usize {
        self.inner.transitions.pending_triggers()
    }

    /// Active states, root first.
    pub fn active_path(&self) -> Vec<S> {
        self.inner.scheduler.active_path()
    }

    /// The active leaf.
    pub fn active_state(&self) -> Option<S> {
        self.inner.scheduler.active_leaf()
    }

    pub fn is_in_state(&self, id: &S) -> bool {
        self.inner.scheduler.is_active(id)
    }

    /// Register an observer notified around every active path change.
    pub fn observe_path<O>(&self, observer: O)
    where
        O: PathObserver<S> + 'static,
    {
        self.inner.scheduler.observe(Rc::new(observer));
    }

    /// Applied transitions, oldest first.
    pub fn history(&self) -> TransitionHistory<S, T> {
        self.inner.history.borrow().clone()
    }

    pub fn clear_history(&self) {
        self.inner.history.borrow_mut().clear();
    }

    // ----- events -----

    /// Subscribe `handler` to events while `state` is active.
    pub fn subscribe<F>(&self, state: &S, handler: F) -> Result<EventHandler<E>, MachineError>
    where
        F: Fn(&E) -> bool + 'static,
    {
        if !self.contains_state(state) {
            return Err(MachineError::not_found(state));
        }
        let handler = EventHandler::new(handler);
        self.inner
            .handlers
            .borrow_mut()
            .entry(state.clone())
            .or_default()
            .push(handler.clone());
        Ok(handler)
    }

    pub fn unsubscribe(&self, state: &S, handler: &EventHandler<E>) -> bool {
        let mut handlers = self.inner.handlers.borrow_mut();
        let Some(list) = handlers.get_mut(state) else {
            return false;
        };
        let Some(position) = list.iter().position(|h| h == handler) else {
            return false;
        };
        list.remove(position);
        if list.is_empty() {
            handlers.remove(state);
        }
        true
    }

    /// Offer `event` to the handlers of active states, leaf to root.
    ///
    /// Returns `true` as soon as a handler consumes the event.
    pub fn handle_event(&self, event: &E) -> bool {
        for state in self.active_path().iter().rev() {
            if !self.is_in_state(state) {
                continue;
            }
            let handlers = self
                .inner
                .handlers
                .borrow()
                .get(state)
                .cloned()
                .unwrap_or_default();
            if handlers.iter().any(|handler| handler.handle(event)) {
                tracing::trace!(state = ?state, "Event handled");
                return true;
            }
        }
        false
    }

    // ----- internals -----

    fn ensure_not_evaluating(&self) -> Result<(), MachineError> {
        if self.inner.transitions.is_evaluating() {
            return Err(MachineError::MachineEvaluatingTransitions);
        }
        Ok(())
    }

    fn drain(&self) -> Result<(), MachineError> {
        let inner = &self.inner;
        inner
            .transitions
            .drain(&inner.scheduler, &inner.hierarchy, |transition, change| {
                self.record(transition, change)
            })
    }

    fn discard_pending(&self) {
        let dropped = self.inner.transitions.clear_pending();
        if dropped > 0 {
            tracing::warn!(dropped, "Discarded pending triggers");
        }
    }

    fn record(&self, transition: &Transition<S, T>, change: PathChange<S>) {
        self.inner.history.borrow_mut().record(TransitionRecord {
            transition: transition.clone(),
            exited: change.exited,
            entered: change.entered,
            timestamp: Utc::now(),
        });
    }

    fn span(&self) -> tracing::Span {
        tracing::debug_span!(
            "machine",
            id = %self.inner.id,
            name = ?self.inner.config.name
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SwitchPolicy;
    use crate::core::NoopBehaviour;
    use std::cell::Cell;

    type Machine = StateMachine<&'static str, &'static str, u32>;

    /// a -> {b -> c, d}
    fn nested() -> Machine {
        let machine = Machine::new();
        for name in ["a", "b", "c", "d"] {
            machine.add_state(name, NoopBehaviour).unwrap();
        }
        machine.add_child(&"a", &"b").unwrap();
        machine.add_child(&"b", &"c").unwrap();
        machine.add_child(&"a", &"d").unwrap();
        machine
    }

    #[test]
    fn new_machine_is_stopped_and_empty() {
        let machine = Machine::new();
        assert!(!machine.is_started());
        assert_eq!(machine.state_count(), 0);
        assert!(machine.roots().is_empty());
        assert!(machine.active_path().is_empty());
        assert!(matches!(machine.start(), Err(MachineError::EmptyMachine)));
    }

    #[test]
    fn start_twice_is_rejected() {
        let machine = nested();
        machine.start().unwrap();
        assert!(matches!(machine.start(), Err(MachineError::MachineStarted)));
    }

    #[test]
    fn update_and_trigger_require_started_machine() {
        let machine = nested();
        assert!(matches!(
            machine.update(),
            Err(MachineError::MachineNotStarted)
        ));
        assert!(matches!(
            machine.trigger("go"),
            Err(MachineError::MachineNotStarted)
        ));
    }

    #[test]
    fn stop_when_stopped_is_a_no_op() {
        let machine = nested();
        assert!(machine.stop().is_ok());
        assert!(!machine.is_started());
    }

    #[test]
    fn structure_queries_reflect_hierarchy() {
        let machine = nested();
        assert_eq!(machine.roots(), vec!["a"]);
        assert_eq!(machine.children_of(&"a").unwrap(), vec!["b", "d"]);
        assert_eq!(machine.parent_of(&"c").unwrap(), "b");
        assert_eq!(machine.parent_of(&"a").unwrap(), "a");
        assert_eq!(machine.initial_child_of(&"a").unwrap(), Some("b"));
        assert_eq!(machine.initial_state(), Some("a"));
        assert_eq!(machine.states(), vec!["a", "b", "c", "d"]);
        assert!(matches!(
            machine.children_of(&"z"),
            Err(MachineError::NotFound { .. })
        ));
    }

    #[test]
    fn active_states_are_protected() {
        let machine = nested();
        machine.add_state("e", NoopBehaviour).unwrap();
        machine.start().unwrap();

        assert!(matches!(
            machine.remove_state(&"c"),
            Err(MachineError::Protected { .. })
        ));
        assert!(matches!(
            machine.remove_child(&"b", &"c"),
            Err(MachineError::Protected { .. })
        ));
        assert!(matches!(
            machine.add_child(&"e", &"a"),
            Err(MachineError::Protected { .. })
        ));

        assert!(machine.remove_child(&"a", &"d").unwrap());
        assert!(machine.remove_state(&"d").unwrap());
        assert!(machine.add_child(&"c", &"e").unwrap());
        assert_eq!(machine.active_path(), vec!["a", "b", "c"]);
    }

    #[test]
    fn add_transition_requires_known_endpoints() {
        let machine = nested();
        assert!(matches!(
            machine.add_transition(Transition::new("c", "go", "z")),
            Err(MachineError::NotFound { .. })
        ));
        assert!(machine
            .add_transition(Transition::new("c", "go", "d"))
            .unwrap());
        assert!(!machine
            .add_transition(Transition::new("c", "go", "d"))
            .unwrap());
    }

    #[test]
    fn removing_state_purges_its_transitions() {
        let machine = nested();
        let into = Transition::new("c", "go", "d");
        let out = Transition::new("d", "back", "c");
        machine.add_transition(into.clone()).unwrap();
        machine.add_transition(out.clone()).unwrap();
        machine.add_guard(&into, || true).unwrap();

        assert!(machine.remove_state(&"d").unwrap());
        assert!(!machine.contains_transition(&into));
        assert!(!machine.contains_transition(&out));
        assert!(machine.guards_of(&into).is_empty());
        assert!(!machine.remove_state(&"d").unwrap());
    }

    #[test]
    fn trigger_switches_and_records_history() {
        let machine = nested();
        machine
            .add_transition(Transition::new("c", "go", "d"))
            .unwrap();
        machine.start().unwrap();
        machine.trigger("go").unwrap();

        assert_eq!(machine.active_path(), vec!["a", "d"]);
        assert_eq!(machine.active_state(), Some("d"));

        let history = machine.history();
        let record = history.last().unwrap();
        assert_eq!(record.exited, vec!["c", "b"]);
        assert_eq!(record.entered, vec!["d"]);

        machine.clear_history();
        assert!(machine.history().is_empty());
    }

    #[test]
    fn unmatched_trigger_is_consumed() {
        let machine = nested();
        machine.start().unwrap();
        machine.trigger("nothing").unwrap();
        assert_eq!(machine.active_path(), vec!["a", "b", "c"]);
        assert_eq!(machine.pending_triggers(), 0);
        assert!(machine.history().is_empty());
    }

    #[test]
    fn guard_handle_removes_guard() {
        let machine = nested();
        let edge = Transition::new("c", "go", "d");
        machine.add_transition(edge.clone()).unwrap();
        let guard = machine.add_guard(&edge, || false).unwrap();
        assert!(machine.contains_guard(&edge, &guard));

        machine.start().unwrap();
        machine.trigger("go").unwrap();
        assert!(machine.is_in_state(&"c"));

        assert!(machine.remove_guard(&edge, &guard).unwrap());
        machine.trigger("go").unwrap();
        assert!(machine.is_in_state(&"d"));
    }

    #[test]
    fn sibling_policy_ignores_distant_targets() {
        let config = MachineConfig::new().with_switch_policy(SwitchPolicy::Sibling);
        let machine: Machine = StateMachine::with_config(config);
        for name in ["a", "b", "c", "d"] {
            machine.add_state(name, NoopBehaviour).unwrap();
        }
        machine.add_child(&"a", &"b").unwrap();
        machine.add_child(&"b", &"c").unwrap();
        machine.add_state("x", NoopBehaviour).unwrap();
        machine.add_state("y", NoopBehaviour).unwrap();
        machine.add_child(&"x", &"y").unwrap();
        machine
            .add_transition(Transition::new("c", "far", "y"))
            .unwrap();
        machine.start().unwrap();

        machine.trigger("far").unwrap();
        assert_eq!(machine.active_path(), vec!["a", "b", "c"]);
    }

    #[test]
    fn event_bubbles_from_leaf_to_root() {
        let machine = nested();
        let seen = Rc::new(RefCell::new(Vec::new()));

        for (state, consumes) in [("a", true), ("b", false), ("c", false), ("d", true)] {
            let seen = Rc::clone(&seen);
            machine
                .subscribe(&state, move |event: &u32| {
                    seen.borrow_mut().push((state, *event));
                    consumes
                })
                .unwrap();
        }

        assert!(!machine.handle_event(&1));
        machine.start().unwrap();
        assert!(machine.handle_event(&7));
        assert_eq!(*seen.borrow(), vec![("c", 7), ("b", 7), ("a", 7)]);
    }

    #[test]
    fn unsubscribed_handler_is_not_called() {
        let machine = nested();
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let handler = machine
            .subscribe(&"c", move |_| {
                counter.set(counter.get() + 1);
                true
            })
            .unwrap();
        machine.start().unwrap();

        assert!(machine.unsubscribe(&"c", &handler));
        assert!(!machine.unsubscribe(&"c", &handler));
        assert!(!machine.handle_event(&0));
        assert_eq!(calls.get(), 0);
        assert!(matches!(
            machine.subscribe(&"z", |_| true),
            Err(MachineError::NotFound { .. })
        ));
    }

    #[test]
    fn weak_handle_does_not_keep_machine_alive() {
        let machine = nested();
        let weak = machine.downgrade();
        assert!(weak.upgrade().is_some());
        drop(machine);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn configured_history_limit_is_applied() {
        let machine: Machine = StateMachine::with_config(MachineConfig::new().with_history_limit(1));
        machine.add_state("on", NoopBehaviour).unwrap();
        machine.add_state("off", NoopBehaviour).unwrap();
        machine
            .add_transition(Transition::new("on", "toggle", "off"))
            .unwrap();
        machine
            .add_transition(Transition::new("off", "toggle", "on"))
            .unwrap();
        machine.start().unwrap();

        machine.trigger("toggle").unwrap();
        machine.trigger("toggle").unwrap();
        let history = machine.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history.last().unwrap().transition.to, "on");
    }

    #[test]
    fn machine_ids_are_unique() {
        assert_ne!(Machine::new().id(), Machine::new().id());
    }
}
