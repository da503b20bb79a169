//! Hierarch: a hierarchical state machine engine
//!
//! States form a forest. While the machine runs, exactly one chain of
//! states from a root down to a leaf is active, and every change of that
//! chain invokes the states' `enter` and `exit` callbacks in a strict
//! order: exits leaf to root, enters root to leaf.
//!
//! # Core Concepts
//!
//! - **Hierarchy**: states, parent/child links and each parent's initial child
//! - **Scheduler**: the active path and the callback ordering around it
//! - **Transitions**: `(from, trigger, to)` edges gated by ordered guards
//! - **Triggers**: queued and resolved one at a time, so a trigger fired
//!   from inside a callback never interleaves with the current transition
//!
//! # Example
//!
//! ```rust
//! use hierarch::core::{FnBehaviour, NoopBehaviour, Transition};
//! use hierarch::StateMachine;
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let log = Rc::new(RefCell::new(Vec::new()));
//! let entered = Rc::clone(&log);
//!
//! let machine: StateMachine<&str, &str> = StateMachine::new();
//! machine.add_state("door", NoopBehaviour).unwrap();
//! machine.add_state("closed", NoopBehaviour).unwrap();
//! machine
//!     .add_state(
//!         "open",
//!         FnBehaviour::new().on_enter(move || {
//!             entered.borrow_mut().push("open");
//!             Ok(())
//!         }),
//!     )
//!     .unwrap();
//! machine.add_child(&"door", &"closed").unwrap();
//! machine.add_child(&"door", &"open").unwrap();
//! machine
//!     .add_transition(Transition::new("closed", "push", "open"))
//!     .unwrap();
//!
//! machine.start().unwrap();
//! assert_eq!(machine.active_path(), vec!["door", "closed"]);
//!
//! machine.trigger("push").unwrap();
//! assert!(machine.is_in_state(&"open"));
//! assert_eq!(*log.borrow(), vec!["open"]);
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod guards;
pub mod hierarchy;
pub mod machine;
pub mod scheduler;
pub mod transitions;

// Re-export commonly used types
pub use config::{MachineConfig, SwitchPolicy};
pub use core::{FnBehaviour, Guard, NoopBehaviour, StateBehaviour, Transition};
pub use error::{ErrorKind, MachineError, StructureViolation};
pub use machine::{StateMachine, WeakStateMachine};
pub use scheduler::PathObserver;
