//! Transition edges.

use serde::{Deserialize, Serialize};

/// Edge `(from, trigger, to)` between two states.
///
/// Transitions are plain values: two edges with the same triple are the
/// same transition.
///
/// # Example
///
/// ```rust
/// use hierarch::core::Transition;
///
/// let open = Transition::new("closed", "push", "open");
/// assert_eq!(open, Transition::new("closed", "push", "open"));
/// assert!(!open.is_self_transition());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Transition<S, T> {
    /// State that must be active for the transition to match
    pub from: S,
    /// Trigger value that fires the transition
    pub trigger: T,
    /// State switched to when the transition fires
    pub to: S,
}

impl<S, T> Transition<S, T> {
    pub fn new(from: S, trigger: T, to: S) -> Self {
        Self { from, trigger, to }
    }

    pub fn is_self_transition(&self) -> bool
    where
        S: PartialEq,
    {
        self.from == self.to
    }
}
