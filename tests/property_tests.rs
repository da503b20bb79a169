//! Property-based tests for the state machine engine.
//!
//! These tests use proptest to verify ordering and structure properties
//! across many randomly generated hierarchies.

use hierarch::core::{FnBehaviour, NoopBehaviour, Transition};
use hierarch::StateMachine;
use proptest::prelude::*;
use proptest::sample::Index;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

type Machine = StateMachine<usize, &'static str>;
type Log = Rc<RefCell<Vec<(&'static str, usize)>>>;

prop_compose! {
    /// Parent of every state after the first; `None` makes it a root.
    fn arbitrary_forest()(
        links in prop::collection::vec(any::<Option<Index>>(), 0..12)
    ) -> Vec<Option<usize>> {
        links
            .iter()
            .enumerate()
            .map(|(i, link)| link.as_ref().map(|index| index.index(i + 1)))
            .collect()
    }
}

fn recording(id: usize, log: &Log) -> FnBehaviour {
    let (enter, exit) = (Rc::clone(log), Rc::clone(log));
    FnBehaviour::new()
        .on_enter(move || {
            enter.borrow_mut().push(("enter", id));
            Ok(())
        })
        .on_exit(move || {
            exit.borrow_mut().push(("exit", id));
            Ok(())
        })
}

fn build(parents: &[Option<usize>], log: &Log) -> Machine {
    let machine = Machine::new();
    for id in 0..=parents.len() {
        machine.add_state(id, recording(id, log)).unwrap();
    }
    for (i, parent) in parents.iter().enumerate() {
        if let Some(parent) = parent {
            machine.add_child(parent, &(i + 1)).unwrap();
        }
    }
    machine
}

/// State 0 followed by the first-added child at every level.
fn expected_path(parents: &[Option<usize>]) -> Vec<usize> {
    let mut path = vec![0];
    loop {
        let current = path[path.len() - 1];
        let first_child = parents
            .iter()
            .position(|parent| *parent == Some(current))
            .map(|i| i + 1);
        match first_child {
            Some(child) => path.push(child),
            None => return path,
        }
    }
}

proptest! {
    #[test]
    fn start_enters_root_to_leaf_and_stop_exits_leaf_to_root(parents in arbitrary_forest()) {
        let log: Log = Rc::new(RefCell::new(Vec::new()));
        let machine = build(&parents, &log);
        let expected = expected_path(&parents);

        machine.start().unwrap();
        prop_assert_eq!(machine.active_path(), expected.clone());
        let entered: Vec<_> = log.borrow().iter().map(|(_, id)| *id).collect();
        prop_assert_eq!(entered, expected.clone());
        prop_assert!(log.borrow().iter().all(|(phase, _)| *phase == "enter"));

        log.borrow_mut().clear();
        machine.stop().unwrap();
        let exited: Vec<_> = log.borrow().iter().map(|(_, id)| *id).collect();
        let mut reversed = expected;
        reversed.reverse();
        prop_assert_eq!(exited, reversed);
        prop_assert!(log.borrow().iter().all(|(phase, _)| *phase == "exit"));
    }

    #[test]
    fn lifecycle_is_structure_neutral(parents in arbitrary_forest()) {
        let log: Log = Rc::new(RefCell::new(Vec::new()));
        let machine = build(&parents, &log);
        let edge = Transition::new(0, "loop", 0);
        machine.add_transition(edge.clone()).unwrap();
        let guard = machine.add_guard(&edge, || true).unwrap();

        let states = machine.states();
        let roots = machine.roots();
        let children: Vec<Vec<usize>> = states
            .iter()
            .map(|id| machine.children_of(id).unwrap())
            .collect();

        machine.start().unwrap();
        machine.stop().unwrap();

        prop_assert_eq!(machine.states(), states.clone());
        prop_assert_eq!(machine.roots(), roots);
        for (id, before) in states.iter().zip(children) {
            prop_assert_eq!(machine.children_of(id).unwrap(), before);
        }
        prop_assert!(machine.contains_transition(&edge));
        prop_assert!(machine.contains_guard(&edge, &guard));
    }

    #[test]
    fn guards_short_circuit_on_first_false(results in prop::collection::vec(any::<bool>(), 0..8)) {
        let machine = Machine::new();
        machine.add_state(0, NoopBehaviour).unwrap();
        machine.add_state(1, NoopBehaviour).unwrap();
        let edge = Transition::new(0, "go", 1);
        machine.add_transition(edge.clone()).unwrap();

        let calls: Vec<Rc<Cell<u32>>> = results.iter().map(|_| Rc::new(Cell::new(0))).collect();
        for (result, counter) in results.iter().copied().zip(&calls) {
            let counter = Rc::clone(counter);
            machine
                .add_guard(&edge, move || {
                    counter.set(counter.get() + 1);
                    result
                })
                .unwrap();
        }
        machine.start().unwrap();
        machine.trigger("go").unwrap();

        let evaluated = results
            .iter()
            .position(|result| !result)
            .map_or(results.len(), |i| i + 1);
        for (i, counter) in calls.iter().enumerate() {
            prop_assert_eq!(counter.get(), u32::from(i < evaluated));
        }
        let fires = results.iter().all(|result| *result);
        prop_assert_eq!(machine.is_in_state(&1), fires);
    }

    #[test]
    fn triggers_are_resolved_in_order(ring in 2..6usize, count in 0..20usize) {
        let machine = Machine::new();
        for id in 0..ring {
            machine.add_state(id, NoopBehaviour).unwrap();
            machine.add_state(ring + id, NoopBehaviour).unwrap();
            machine.add_child(&id, &(ring + id)).unwrap();
        }
        for id in 0..ring {
            machine
                .add_transition(Transition::new(ring + id, "next", (id + 1) % ring))
                .unwrap();
        }
        machine.start().unwrap();

        for _ in 0..count {
            machine.trigger("next").unwrap();
        }

        let position = count % ring;
        prop_assert_eq!(machine.active_path(), vec![position, ring + position]);
        let history = machine.history();
        prop_assert_eq!(history.len(), count);
        let path: Vec<usize> = history.get_path().into_iter().copied().collect();
        if count > 0 {
            prop_assert_eq!(path.len(), count + 1);
            prop_assert_eq!(path[count], position);
        }
    }
}
