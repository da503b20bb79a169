//! Structural validation report.
//!
//! Unlike the operations that reject a bad edit on the spot, validation
//! inspects a finished machine and accumulates every problem it finds
//! using Stillwater's `Validation`, so all of them can be fixed in one
//! pass.

use crate::core::{StateId, Transition, TriggerId};
use crate::error::{render, StructureViolation};
use crate::guards::GuardValidator;
use crate::hierarchy::StateHierarchy;
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;

/// Outcome of [`StateMachine::validate`](super::StateMachine::validate).
pub type ValidationReport = Validation<(), NonEmptyVec<StructureViolation>>;

pub(crate) fn validate_structure<S: StateId, T: TriggerId>(
    hierarchy: &StateHierarchy<S>,
    transitions: &[Transition<S, T>],
    guards: &GuardValidator<S, T>,
) -> ValidationReport {
    let mut checks: Vec<ValidationReport> = Vec::new();

    if !hierarchy.is_empty() {
        checks.push(check_initial_state(hierarchy));
    }

    for state in hierarchy.states() {
        let children = hierarchy.children_of(state).unwrap_or_default();
        if children.is_empty() {
            continue;
        }
        let initial = hierarchy.initial_child_of(state).ok().flatten();
        let check = match initial {
            Some(child) if children.contains(child) => Validation::success(()),
            _ => Validation::fail(StructureViolation::DanglingInitialChild {
                parent: render(state),
                child: initial.map(render),
            }),
        };
        checks.push(check);
    }

    let unguarded: Vec<&Transition<S, T>> = transitions
        .iter()
        .filter(|transition| !guards.has_guards(transition))
        .collect();
    for (i, first) in unguarded.iter().enumerate() {
        for second in &unguarded[i + 1..] {
            if let Some(violation) = overlap(hierarchy, first, second) {
                checks.push(Validation::fail(violation));
            }
        }
    }

    Validation::all_vec(checks).map(|_| ())
}

fn check_initial_state<S: StateId>(hierarchy: &StateHierarchy<S>) -> ValidationReport {
    match hierarchy.initial_state() {
        None => Validation::fail(StructureViolation::MissingInitialState),
        Some(id) if !hierarchy.is_root(id) => {
            Validation::fail(StructureViolation::InitialStateNotRoot { id: render(id) })
        }
        Some(_) => Validation::success(()),
    }
}

/// Two unguarded transitions that would both be valid for one trigger.
fn overlap<S: StateId, T: TriggerId>(
    hierarchy: &StateHierarchy<S>,
    first: &Transition<S, T>,
    second: &Transition<S, T>,
) -> Option<StructureViolation> {
    if first.trigger != second.trigger {
        return None;
    }
    if first.from == second.from {
        return Some(StructureViolation::AmbiguousTransitions {
            first: render(first),
            second: render(second),
        });
    }

    let (ancestor, descendant) = if hierarchy.is_ancestor(&first.from, &second.from) {
        (first, second)
    } else if hierarchy.is_ancestor(&second.from, &first.from) {
        (second, first)
    } else {
        return None;
    };
    Some(StructureViolation::ShadowedTransitions {
        ancestor: render(ancestor),
        descendant: render(descendant),
    })
}
