//! Active hierarchy path and lifecycle callback ordering.
//!
//! The scheduler owns the single mutable active path: the chain of states
//! from a root down to the active leaf. Entering runs root to leaf,
//! exiting runs leaf to root, and a switch exits below the pivot before
//! entering the new chain.
//!
//! No internal borrow is held while a state callback runs, so callbacks
//! are free to query the machine. Operations that would change the path
//! while another change is running fail with `PathChangeInProgress`.

use crate::config::SwitchPolicy;
use crate::core::{BehaviourResult, StateBehaviour, StateId};
use crate::error::{render, CallbackPhase, MachineError};
use crate::hierarchy::StateHierarchy;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Notified around every change of the active path.
///
/// `before_change` sees the path as it was, `after_change` sees the new
/// path after every exit has run and before any new state is entered.
pub trait PathObserver<S> {
    fn before_change(&self, _path: &[S]) {}

    fn after_change(&self, _path: &[S]) {}
}

impl<S, O: PathObserver<S> + ?Sized> PathObserver<S> for Rc<O> {
    fn before_change(&self, path: &[S]) {
        (**self).before_change(path)
    }

    fn after_change(&self, path: &[S]) {
        (**self).after_change(path)
    }
}

/// Lifecycle of a scheduler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    Stopped,
    Started,
}

/// States exited and entered by one switch, in callback order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathChange<S> {
    pub exited: Vec<S>,
    pub entered: Vec<S>,
}

#[derive(Clone)]
struct ActiveState<S> {
    id: S,
    behaviour: Rc<dyn StateBehaviour>,
    activation: u64,
}

struct SwitchPlan<S> {
    keep: usize,
    entering: Vec<(S, Rc<dyn StateBehaviour>)>,
}

#[derive(Clone, Copy)]
enum Stage {
    Before,
    After,
}

/// Sets a flag for the lifetime of the value.
pub(crate) struct Raised<'a> {
    flag: &'a Cell<bool>,
}

impl<'a> Raised<'a> {
    pub(crate) fn raise(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self { flag }
    }
}

impl Drop for Raised<'_> {
    fn drop(&mut self) {
        self.flag.set(false);
    }
}

/// Owner of the active hierarchy path.
pub struct HierarchyScheduler<S: StateId> {
    policy: SwitchPolicy,
    lifecycle: Cell<Lifecycle>,
    path: RefCell<Vec<ActiveState<S>>>,
    pending: RefCell<Vec<S>>,
    activations: Cell<u64>,
    changing: Cell<bool>,
    observers: RefCell<Vec<Rc<dyn PathObserver<S>>>>,
}

impl<S: StateId> Default for HierarchyScheduler<S> {
    fn default() -> Self {
        Self::new(SwitchPolicy::default())
    }
}

impl<S: StateId> HierarchyScheduler<S> {
    pub fn new(policy: SwitchPolicy) -> Self {
        Self {
            policy,
            lifecycle: Cell::new(Lifecycle::Stopped),
            path: RefCell::new(Vec::new()),
            pending: RefCell::new(Vec::new()),
            activations: Cell::new(0),
            changing: Cell::new(false),
            observers: RefCell::new(Vec::new()),
        }
    }

    pub fn policy(&self) -> SwitchPolicy {
        self.policy
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle.get()
    }

    pub fn is_started(&self) -> bool {
        self.lifecycle.get() == Lifecycle::Started
    }

    /// Whether an enter, exit or switch pass is running.
    pub fn is_changing(&self) -> bool {
        self.changing.get()
    }

    /// Snapshot of the active path, root first.
    pub fn active_path(&self) -> Vec<S> {
        self.path.borrow().iter().map(|state| state.id.clone()).collect()
    }

    pub fn active_leaf(&self) -> Option<S> {
        self.path.borrow().last().map(|state| state.id.clone())
    }

    pub fn is_active(&self, id: &S) -> bool {
        self.path.borrow().iter().any(|state| &state.id == id)
    }

    /// Active, or about to be entered by the running switch.
    pub fn is_protected(&self, id: &S) -> bool {
        self.is_active(id) || self.pending.borrow().contains(id)
    }

    pub fn observe(&self, observer: Rc<dyn PathObserver<S>>) {
        self.observers.borrow_mut().push(observer);
    }

    /// Enter the initial chain of the hierarchy's initial state.
    ///
    /// The whole chain is validated before the first `enter` callback, so
    /// a structural failure has no side effects.
    pub fn enter(&self, hierarchy: &RefCell<StateHierarchy<S>>) -> Result<(), MachineError> {
        if self.changing.get() {
            return Err(MachineError::PathChangeInProgress);
        }
        if self.is_started() {
            return Err(MachineError::MachineStarted);
        }

        let entering = {
            let hierarchy = hierarchy.borrow();
            let initial = hierarchy.initial_state().ok_or_else(|| {
                MachineError::InvalidInitialState {
                    reason: "no initial state is set".to_string(),
                }
            })?;
            if !hierarchy.is_root(initial) {
                return Err(MachineError::InvalidInitialState {
                    reason: format!("{} is not a root", render(initial)),
                });
            }
            let chain = hierarchy.initial_chain(initial)?;
            resolve_behaviours(&hierarchy, chain)?
        };

        let _changing = Raised::raise(&self.changing);
        self.lifecycle.set(Lifecycle::Started);
        self.notify(Stage::Before);
        self.append(entering);
        self.notify(Stage::After);
        self.enter_from(0)
    }

    /// Exit every active state, leaf first, and stop.
    ///
    /// Does nothing when already stopped. If an `exit` callback fails, the
    /// failing state and its ancestors stay on the path and the scheduler
    /// stays started.
    pub fn exit(&self) -> Result<(), MachineError> {
        if !self.is_started() {
            return Ok(());
        }
        if self.changing.get() {
            return Err(MachineError::PathChangeInProgress);
        }

        let _changing = Raised::raise(&self.changing);
        self.notify(Stage::Before);
        self.exit_down_to(0)?;
        self.lifecycle.set(Lifecycle::Stopped);
        self.notify(Stage::After);
        Ok(())
    }

    /// Run `update` on every active state, root first.
    ///
    /// Works on a snapshot of the path: a state that stops being active
    /// during the pass is skipped, states entered during the pass are not
    /// updated until the next call. Rejected while the path is changing,
    /// since the path may then hold states that were not entered yet.
    pub fn update(&self) -> Result<(), MachineError> {
        if !self.is_started() {
            return Err(MachineError::MachineNotStarted);
        }
        if self.changing.get() {
            return Err(MachineError::PathChangeInProgress);
        }

        let snapshot = self.path.borrow().clone();
        for state in &snapshot {
            if !self.is_current(state.activation) {
                continue;
            }
            invoke(&state.id, CallbackPhase::Update, state.behaviour.update())?;
        }
        Ok(())
    }

    /// Switch the active path so that it runs through `target`.
    ///
    /// Exits below the pivot leaf first, then enters from the pivot's child
    /// down through `target` and its initial chain. A target that is
    /// already active is exited and re-entered. Returns `Ok(None)`,
    /// without running any callback, when the target does not exist or is
    /// not reachable under the configured [`SwitchPolicy`].
    pub fn switch_to(
        &self,
        hierarchy: &RefCell<StateHierarchy<S>>,
        target: &S,
    ) -> Result<Option<PathChange<S>>, MachineError> {
        self.switch(hierarchy, None, target)
    }

    /// Like [`switch_to`](Self::switch_to), for a transition leaving `source`.
    ///
    /// When `target` is an active ancestor of `source`, the branch being
    /// left is not entered again: the target is re-entered, and its initial
    /// chain is followed only if that chain does not lead back into the
    /// branch. The target can then stay active as the leaf.
    pub fn switch_from(
        &self,
        hierarchy: &RefCell<StateHierarchy<S>>,
        source: &S,
        target: &S,
    ) -> Result<Option<PathChange<S>>, MachineError> {
        self.switch(hierarchy, Some(source), target)
    }

    fn switch(
        &self,
        hierarchy: &RefCell<StateHierarchy<S>>,
        source: Option<&S>,
        target: &S,
    ) -> Result<Option<PathChange<S>>, MachineError> {
        if !self.is_started() {
            return Err(MachineError::MachineNotStarted);
        }
        if self.changing.get() {
            return Err(MachineError::PathChangeInProgress);
        }

        let plan = {
            let hierarchy = hierarchy.borrow();
            let path = self.path.borrow();
            self.plan_switch(&hierarchy, &path, source, target)?
        };
        let Some(plan) = plan else {
            tracing::debug!(state = ?target, "Switch target not reachable from active path");
            return Ok(None);
        };

        let _changing = Raised::raise(&self.changing);
        let entered: Vec<S> = plan.entering.iter().map(|(id, _)| id.clone()).collect();
        self.notify(Stage::Before);

        *self.pending.borrow_mut() = entered.clone();
        let exited = self.exit_down_to(plan.keep);
        self.pending.borrow_mut().clear();
        let exited = exited?;

        self.append(plan.entering);
        self.notify(Stage::After);
        self.enter_from(plan.keep)?;

        Ok(Some(PathChange { exited, entered }))
    }

    fn plan_switch(
        &self,
        hierarchy: &StateHierarchy<S>,
        path: &[ActiveState<S>],
        source: Option<&S>,
        target: &S,
    ) -> Result<Option<SwitchPlan<S>>, MachineError> {
        let Some(lineage) = hierarchy.lineage(target) else {
            return Ok(None);
        };

        let shared = path
            .iter()
            .zip(&lineage)
            .take_while(|(active, id)| active.id == **id)
            .count();
        // An active target is exited and re-entered, so keep at most its parent.
        let keep = shared.min(lineage.len() - 1);
        if self.policy == SwitchPolicy::Sibling && keep + 1 < lineage.len() {
            return Ok(None);
        }

        // Returning to an active ancestor does not lead back into the branch being left.
        let mut chain = hierarchy.initial_chain(target)?;
        let below: &[ActiveState<S>] = if shared == lineage.len() {
            &path[shared..]
        } else {
            &[]
        };
        let leaving_below = source.is_some_and(|source| below.iter().any(|s| &s.id == source));
        if leaving_below && chain.get(1) == below.first().map(|s| &s.id) {
            chain.truncate(1);
        }

        let mut ids = lineage[keep..].to_vec();
        ids.extend(chain.into_iter().skip(1));
        let entering = resolve_behaviours(hierarchy, ids)?;
        Ok(Some(SwitchPlan { keep, entering }))
    }

    fn append(&self, entering: Vec<(S, Rc<dyn StateBehaviour>)>) {
        let mut path = self.path.borrow_mut();
        for (id, behaviour) in entering {
            let activation = self.activations.get() + 1;
            self.activations.set(activation);
            path.push(ActiveState {
                id,
                behaviour,
                activation,
            });
        }
    }

    /// Run `enter` on path entries from index `from` onwards.
    ///
    /// On failure the path is cut after the failing state, so it only
    /// holds states whose `enter` was invoked.
    fn enter_from(&self, from: usize) -> Result<(), MachineError> {
        let states: Vec<ActiveState<S>> = self.path.borrow()[from..].to_vec();
        for (offset, state) in states.iter().enumerate() {
            tracing::debug!(state = ?state.id, "Entering state");
            if let Err(err) = invoke(&state.id, CallbackPhase::Enter, state.behaviour.enter()) {
                self.path.borrow_mut().truncate(from + offset + 1);
                return Err(err);
            }
        }
        Ok(())
    }

    /// Exit states until only `keep` remain, leaf first.
    ///
    /// A state is popped only after its `exit` callback succeeded.
    fn exit_down_to(&self, keep: usize) -> Result<Vec<S>, MachineError> {
        let mut exited = Vec::new();
        loop {
            let top = {
                let path = self.path.borrow();
                if path.len() <= keep {
                    break;
                }
                path.last().cloned()
            };
            let Some(state) = top else {
                break;
            };

            tracing::debug!(state = ?state.id, "Exiting state");
            invoke(&state.id, CallbackPhase::Exit, state.behaviour.exit())?;
            self.path.borrow_mut().pop();
            exited.push(state.id);
        }
        Ok(exited)
    }

    fn is_current(&self, activation: u64) -> bool {
        self.path
            .borrow()
            .iter()
            .any(|state| state.activation == activation)
    }

    fn notify(&self, stage: Stage) {
        let observers = self.observers.borrow().clone();
        if observers.is_empty() {
            return;
        }
        let path = self.active_path();
        for observer in &observers {
            match stage {
                Stage::Before => observer.before_change(&path),
                Stage::After => observer.after_change(&path),
            }
        }
    }
}

fn resolve_behaviours<S: StateId>(
    hierarchy: &StateHierarchy<S>,
    ids: Vec<S>,
) -> Result<Vec<(S, Rc<dyn StateBehaviour>)>, MachineError> {
    ids.into_iter()
        .map(|id| {
            let behaviour = hierarchy
                .behaviour_of(&id)
                .ok_or_else(|| MachineError::not_found(&id))?;
            Ok((id, behaviour))
        })
        .collect()
}

fn invoke<S: StateId>(
    id: &S,
    phase: CallbackPhase,
    result: BehaviourResult,
) -> Result<(), MachineError> {
    result.map_err(|source| {
        tracing::warn!(state = ?id, %phase, error = %source, "State callback failed");
        MachineError::Behaviour {
            state: render(id),
            phase,
            source,
        }
    })
}
