//! Transition edges, pending triggers and their resolution.
//!
//! Triggers are queued, never resolved recursively. The call that starts
//! draining the queue owns it until it is empty, so a trigger fired from a
//! callback during resolution runs after the current one has completed.

use crate::core::{Guard, StateId, Transition, TriggerId};
use crate::error::{render, MachineError};
use crate::guards::GuardValidator;
use crate::hierarchy::StateHierarchy;
use crate::scheduler::{HierarchyScheduler, PathChange, Raised};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};

/// Transition set, guard lists and trigger queue of a machine.
pub struct TransitionManager<S: StateId, T: TriggerId> {
    outgoing: RefCell<HashMap<S, Vec<Transition<S, T>>>>,
    /// Source states in the order their first transition was added.
    sources: RefCell<Vec<S>>,
    guards: RefCell<GuardValidator<S, T>>,
    queue: RefCell<VecDeque<T>>,
    draining: Cell<bool>,
    evaluating: Cell<bool>,
}

impl<S: StateId, T: TriggerId> Default for TransitionManager<S, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: StateId, T: TriggerId> TransitionManager<S, T> {
    pub fn new() -> Self {
        Self {
            outgoing: RefCell::new(HashMap::new()),
            sources: RefCell::new(Vec::new()),
            guards: RefCell::new(GuardValidator::new()),
            queue: RefCell::new(VecDeque::new()),
            draining: Cell::new(false),
            evaluating: Cell::new(false),
        }
    }

    /// Register a transition. Returns `false` if it was already present.
    pub fn add_transition(&self, transition: Transition<S, T>) -> bool {
        let mut outgoing = self.outgoing.borrow_mut();
        let edges = outgoing.entry(transition.from.clone()).or_default();
        if edges.contains(&transition) {
            return false;
        }
        if edges.is_empty() {
            self.sources.borrow_mut().push(transition.from.clone());
        }
        edges.push(transition);
        true
    }

    /// Unregister a transition and discard its guards.
    pub fn remove_transition(&self, transition: &Transition<S, T>) -> bool {
        let removed = {
            let mut outgoing = self.outgoing.borrow_mut();
            let Some(edges) = outgoing.get_mut(&transition.from) else {
                return false;
            };
            let before = edges.len();
            edges.retain(|edge| edge != transition);
            let removed = edges.len() != before;
            if edges.is_empty() {
                outgoing.remove(&transition.from);
                self.sources
                    .borrow_mut()
                    .retain(|source| source != &transition.from);
            }
            removed
        };
        if removed {
            self.guards.borrow_mut().clear(transition);
        }
        removed
    }

    /// Drop every transition leaving or entering `state`.
    pub fn remove_transitions_of(&self, state: &S) -> usize {
        let doomed: Vec<Transition<S, T>> = self
            .transitions()
            .into_iter()
            .filter(|edge| &edge.from == state || &edge.to == state)
            .collect();
        for transition in &doomed {
            self.remove_transition(transition);
        }
        doomed.len()
    }

    pub fn contains_transition(&self, transition: &Transition<S, T>) -> bool {
        self.outgoing
            .borrow()
            .get(&transition.from)
            .is_some_and(|edges| edges.contains(transition))
    }

    /// All transitions, grouped by source state.
    ///
    /// Sources come in the order their first transition was added, and
    /// each source's transitions in insertion order.
    pub fn transitions(&self) -> Vec<Transition<S, T>> {
        let outgoing = self.outgoing.borrow();
        self.sources
            .borrow()
            .iter()
            .filter_map(|source| outgoing.get(source))
            .flatten()
            .cloned()
            .collect()
    }

    /// Transitions leaving `state`, in insertion order.
    pub fn transitions_from(&self, state: &S) -> Vec<Transition<S, T>> {
        self.outgoing
            .borrow()
            .get(state)
            .cloned()
            .unwrap_or_default()
    }

    /// Append a guard to a registered transition.
    pub fn add_guard(&self, transition: &Transition<S, T>, guard: Guard) -> Result<(), MachineError> {
        if !self.contains_transition(transition) {
            return Err(MachineError::TransitionNotFound {
                transition: render(transition),
            });
        }
        self.guards
            .borrow_mut()
            .add_guard(transition.clone(), guard);
        Ok(())
    }

    pub fn remove_guard(&self, transition: &Transition<S, T>, guard: &Guard) -> bool {
        self.guards.borrow_mut().remove_guard(transition, guard)
    }

    pub fn guards_of(&self, transition: &Transition<S, T>) -> Vec<Guard> {
        self.guards.borrow().guards_of(transition).to_vec()
    }

    pub fn contains_guard(&self, transition: &Transition<S, T>, guard: &Guard) -> bool {
        self.guards.borrow().contains_guard(transition, guard)
    }

    pub(crate) fn with_guards<R>(&self, f: impl FnOnce(&GuardValidator<S, T>) -> R) -> R {
        f(&self.guards.borrow())
    }

    /// Whether guards are being evaluated right now.
    pub fn is_evaluating(&self) -> bool {
        self.evaluating.get()
    }

    /// Whether a call is draining the trigger queue.
    pub fn is_draining(&self) -> bool {
        self.draining.get()
    }

    pub fn pending_triggers(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Drop every queued trigger, returning how many were dropped.
    pub fn clear_pending(&self) -> usize {
        let mut queue = self.queue.borrow_mut();
        let dropped = queue.len();
        queue.clear();
        dropped
    }

    /// Queue `value` and, unless something else owns the queue, resolve
    /// every pending trigger in FIFO order.
    ///
    /// `on_applied` is called for each transition that changed the path.
    pub fn trigger<F>(
        &self,
        value: T,
        scheduler: &HierarchyScheduler<S>,
        hierarchy: &RefCell<StateHierarchy<S>>,
        on_applied: F,
    ) -> Result<(), MachineError>
    where
        F: FnMut(&Transition<S, T>, PathChange<S>),
    {
        if self.evaluating.get() {
            return Err(MachineError::MachineEvaluatingTransitions);
        }
        if !scheduler.is_started() {
            return Err(MachineError::MachineNotStarted);
        }

        self.queue.borrow_mut().push_back(value);
        if self.draining.get() || scheduler.is_changing() {
            tracing::trace!(pending = self.pending_triggers(), "Trigger deferred");
            return Ok(());
        }
        self.drain(scheduler, hierarchy, on_applied)
    }

    /// Resolve queued triggers until the queue is empty.
    ///
    /// Does nothing if another call already owns the queue. On error the
    /// remaining queue is discarded.
    pub fn drain<F>(
        &self,
        scheduler: &HierarchyScheduler<S>,
        hierarchy: &RefCell<StateHierarchy<S>>,
        mut on_applied: F,
    ) -> Result<(), MachineError>
    where
        F: FnMut(&Transition<S, T>, PathChange<S>),
    {
        if self.draining.get() {
            return Ok(());
        }
        let _owner = Raised::raise(&self.draining);

        loop {
            let next = self.queue.borrow_mut().pop_front();
            let Some(value) = next else {
                return Ok(());
            };
            if !scheduler.is_started() {
                let dropped = self.clear_pending() + 1;
                tracing::debug!(dropped, "Machine stopped, discarding pending triggers");
                return Ok(());
            }

            if let Err(err) = self.resolve(&value, scheduler, hierarchy, &mut on_applied) {
                let dropped = self.clear_pending();
                tracing::warn!(trigger = ?value, dropped, error = %err, "Trigger resolution aborted");
                return Err(err);
            }
        }
    }

    fn resolve<F>(
        &self,
        value: &T,
        scheduler: &HierarchyScheduler<S>,
        hierarchy: &RefCell<StateHierarchy<S>>,
        on_applied: &mut F,
    ) -> Result<(), MachineError>
    where
        F: FnMut(&Transition<S, T>, PathChange<S>),
    {
        let (candidates, guards) = self.candidates(value, &scheduler.active_path());

        let mut chosen: Option<Transition<S, T>> = None;
        {
            let _evaluating = Raised::raise(&self.evaluating);
            for transition in candidates {
                if !guards.is_valid(&transition) {
                    continue;
                }
                if let Some(first) = &chosen {
                    return Err(MachineError::MultipleValidTransitions {
                        trigger: render(value),
                        candidates: vec![render(first), render(&transition)],
                    });
                }
                chosen = Some(transition);
            }
        }

        let Some(transition) = chosen else {
            tracing::trace!(trigger = ?value, "No valid transition for trigger");
            return Ok(());
        };

        tracing::debug!(
            from = ?transition.from,
            trigger = ?transition.trigger,
            to = ?transition.to,
            "Transition fired"
        );
        if let Some(change) = scheduler.switch_from(hierarchy, &transition.from, &transition.to)? {
            on_applied(&transition, change);
        }
        Ok(())
    }

    /// Transitions matching `value` on the active path, leaf first, with
    /// a snapshot of their guards.
    fn candidates(
        &self,
        value: &T,
        path: &[S],
    ) -> (Vec<Transition<S, T>>, GuardValidator<S, T>) {
        let outgoing = self.outgoing.borrow();
        let candidates: Vec<Transition<S, T>> = path
            .iter()
            .rev()
            .filter_map(|state| outgoing.get(state))
            .flatten()
            .filter(|edge| &edge.trigger == value)
            .cloned()
            .collect();
        let guards = self.guards.borrow().snapshot(&candidates);
        (candidates, guards)
    }
}
