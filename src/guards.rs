//! Per-transition guard lists.
//!
//! The validator owns an ordered guard list per transition. Whether the
//! transition itself is registered is the transition manager's concern;
//! the validator only stores and evaluates predicates.

use crate::core::guard::all_hold;
use crate::core::{Guard, StateId, Transition, TriggerId};
use std::collections::HashMap;

/// Ordered guard predicates keyed by transition.
pub struct GuardValidator<S: StateId, T: TriggerId> {
    guards: HashMap<Transition<S, T>, Vec<Guard>>,
}

impl<S: StateId, T: TriggerId> Default for GuardValidator<S, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: StateId, T: TriggerId> GuardValidator<S, T> {
    pub fn new() -> Self {
        Self {
            guards: HashMap::new(),
        }
    }

    /// Append `guard` to the transition's list.
    pub fn add_guard(&mut self, transition: Transition<S, T>, guard: Guard) {
        self.guards.entry(transition).or_default().push(guard);
    }

    /// Remove `guard` from the transition's list.
    ///
    /// Removing the last guard frees the transition's entry.
    pub fn remove_guard(&mut self, transition: &Transition<S, T>, guard: &Guard) -> bool {
        let Some(list) = self.guards.get_mut(transition) else {
            return false;
        };
        let Some(position) = list.iter().position(|g| g == guard) else {
            return false;
        };

        list.remove(position);
        if list.is_empty() {
            self.guards.remove(transition);
        }
        true
    }

    /// Drop every guard of `transition`.
    pub fn clear(&mut self, transition: &Transition<S, T>) {
        self.guards.remove(transition);
    }

    pub fn guards_of(&self, transition: &Transition<S, T>) -> &[Guard] {
        self.guards
            .get(transition)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn contains_guard(&self, transition: &Transition<S, T>, guard: &Guard) -> bool {
        self.guards_of(transition).contains(guard)
    }

    pub fn has_guards(&self, transition: &Transition<S, T>) -> bool {
        self.guards.contains_key(transition)
    }

    /// Copy of the guard lists of `transitions`.
    ///
    /// Guards run while the validator is borrowed, so a machine evaluates
    /// a snapshot and leaves the live lists free for guards that call back
    /// into it.
    pub fn snapshot<'a>(&self, transitions: impl IntoIterator<Item = &'a Transition<S, T>>) -> Self
    where
        S: 'a,
        T: 'a,
    {
        let guards = transitions
            .into_iter()
            .filter_map(|transition| {
                self.guards
                    .get(transition)
                    .map(|list| (transition.clone(), list.clone()))
            })
            .collect();
        Self { guards }
    }

    /// Evaluate the transition's guards left to right.
    ///
    /// Stops at the first guard returning `false`. A transition without
    /// guards is valid and no predicate runs.
    pub fn is_valid(&self, transition: &Transition<S, T>) -> bool {
        all_hold(self.guards_of(transition))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    fn edge() -> Transition<&'static str, &'static str> {
        Transition::new("idle", "go", "busy")
    }

    fn counting(result: bool, calls: &Rc<Cell<u32>>) -> Guard {
        let calls = Rc::clone(calls);
        Guard::new(move || {
            calls.set(calls.get() + 1);
            result
        })
    }

    #[test]
    fn transition_without_guards_is_valid() {
        let validator: GuardValidator<&str, &str> = GuardValidator::new();
        assert!(validator.is_valid(&edge()));
        assert!(validator.guards_of(&edge()).is_empty());
    }

    #[test]
    fn failing_guard_short_circuits() {
        let mut validator = GuardValidator::new();
        let g1_calls = Rc::new(Cell::new(0));
        let g2_calls = Rc::new(Cell::new(0));
        validator.add_guard(edge(), counting(false, &g1_calls));
        validator.add_guard(edge(), counting(true, &g2_calls));

        assert!(!validator.is_valid(&edge()));
        assert_eq!(g1_calls.get(), 1);
        assert_eq!(g2_calls.get(), 0);
    }

    #[test]
    fn guards_are_scoped_per_transition() {
        let mut validator = GuardValidator::new();
        let guard = Guard::new(|| false);
        validator.add_guard(edge(), guard.clone());

        let other = Transition::new("idle", "stop", "busy");
        assert!(validator.contains_guard(&edge(), &guard));
        assert!(!validator.contains_guard(&other, &guard));
        assert!(validator.is_valid(&other));
    }

    #[test]
    fn removing_last_guard_frees_entry() {
        let mut validator = GuardValidator::new();
        let guard = Guard::new(|| false);
        validator.add_guard(edge(), guard.clone());

        assert!(validator.remove_guard(&edge(), &guard));
        assert!(!validator.has_guards(&edge()));
        assert!(validator.is_valid(&edge()));
        assert!(!validator.remove_guard(&edge(), &guard));
    }

    #[test]
    fn remove_guard_keeps_remaining_order() {
        let mut validator = GuardValidator::new();
        let a = Guard::new(|| true);
        let b = Guard::new(|| true);
        let c = Guard::new(|| true);
        validator.add_guard(edge(), a.clone());
        validator.add_guard(edge(), b.clone());
        validator.add_guard(edge(), c.clone());

        validator.remove_guard(&edge(), &b);
        assert_eq!(validator.guards_of(&edge()), &[a, c]);
    }

    #[test]
    fn snapshot_copies_only_requested_lists() {
        let mut validator = GuardValidator::new();
        let other = Transition::new("idle", "stop", "busy");
        let guard = Guard::new(|| false);
        validator.add_guard(edge(), guard.clone());
        validator.add_guard(other.clone(), Guard::new(|| false));

        let snapshot = validator.snapshot([&edge()]);
        validator.clear(&edge());

        assert!(snapshot.contains_guard(&edge(), &guard));
        assert!(!snapshot.is_valid(&edge()));
        assert!(!snapshot.has_guards(&other));
        assert!(validator.is_valid(&edge()));
    }

    #[test]
    fn clear_drops_all_guards() {
        let mut validator = GuardValidator::new();
        validator.add_guard(edge(), Guard::new(|| false));
        validator.clear(&edge());
        assert!(validator.is_valid(&edge()));
    }
}
