//! Guard predicates for controlling transitions.
//!
//! A guard is a zero-argument predicate attached to a transition. Guards
//! may have side effects, so the order in which they run and the point at
//! which evaluation stops are observable.

use std::fmt;
use std::rc::Rc;

/// Predicate that decides whether a matched transition may fire.
///
/// Guards compare by identity: two clones of the same guard are equal,
/// two guards built from identical closures are not. Keep the handle
/// returned by [`Guard::new`] to remove the guard later.
///
/// # Example
///
/// ```rust
/// use hierarch::core::Guard;
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let armed = Rc::new(Cell::new(false));
/// let flag = Rc::clone(&armed);
/// let guard = Guard::new(move || flag.get());
///
/// assert!(!guard.check());
/// armed.set(true);
/// assert!(guard.check());
/// ```
#[derive(Clone)]
pub struct Guard {
    predicate: Rc<dyn Fn() -> bool>,
}

impl Guard {
    /// Create a guard from a predicate.
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn() -> bool + 'static,
    {
        Guard {
            predicate: Rc::new(predicate),
        }
    }

    /// Evaluate the predicate.
    pub fn check(&self) -> bool {
        (self.predicate)()
    }
}

impl PartialEq for Guard {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.predicate, &other.predicate)
    }
}

impl Eq for Guard {}

impl fmt::Debug for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Guard").finish_non_exhaustive()
    }
}

/// Strict left-to-right AND over `guards`.
///
/// Stops at the first guard returning `false`; an empty slice holds.
pub fn all_hold(guards: &[Guard]) -> bool {
    guards.iter().all(Guard::check)
}
