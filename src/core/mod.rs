//! Core engine vocabulary.
//!
//! This module contains the capability layer shared by every engine
//! component:
//! - State and trigger identifiers via the `StateId` / `TriggerId` traits
//! - The `StateBehaviour` lifecycle capability
//! - Guard predicates and event handlers
//! - Transition edges

pub mod guard;
mod handler;
mod state;
mod transition;

pub use guard::Guard;
pub use handler::EventHandler;
pub use state::{
    BehaviourError, BehaviourResult, FnBehaviour, NoopBehaviour, StateBehaviour, StateId,
    TriggerId,
};
pub use transition::Transition;
