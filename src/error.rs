//! Errors reported by the engine.

use crate::core::BehaviourError;
use std::fmt::{self, Debug};
use thiserror::Error;

/// Lifecycle callback that produced a [`MachineError::Behaviour`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallbackPhase {
    Enter,
    Update,
    Exit,
}

impl fmt::Display for CallbackPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enter => write!(f, "enter"),
            Self::Update => write!(f, "update"),
            Self::Exit => write!(f, "exit"),
        }
    }
}

/// Broad category of a [`MachineError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Duplicate or unknown ids, illegal parent/child edges
    Structural,
    /// Wrong start/stop state, or mutation of an active element
    Lifecycle,
    /// More than one transition valid for a single trigger
    Resolution,
    /// Mutation attempted while transitions are being evaluated
    Reentrancy,
    /// A state callback failed
    Behaviour,
}

/// Why a parent/child edge was rejected.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum EdgeViolation {
    #[error("a state cannot be its own child")]
    SelfLoop,

    #[error("child already has parent {parent}")]
    AlreadyParented { parent: String },

    #[error("child is an ancestor of the parent")]
    Cycle,
}

/// Errors returned by machine operations.
#[derive(Debug, Error)]
pub enum MachineError {
    #[error("State {id} already exists")]
    DuplicateId { id: String },

    #[error("State {id} does not exist")]
    NotFound { id: String },

    #[error("Cannot make {child} a child of {parent}: {reason}")]
    InvalidEdge {
        parent: String,
        child: String,
        reason: EdgeViolation,
    },

    #[error("Invalid initial state: {reason}")]
    InvalidInitialState { reason: String },

    #[error("State {id} is active and cannot be {action}")]
    Protected { id: String, action: &'static str },

    #[error("Transition {transition} is not registered")]
    TransitionNotFound { transition: String },

    #[error("Trigger {trigger} matched more than one valid transition: {candidates:?}")]
    MultipleValidTransitions {
        trigger: String,
        candidates: Vec<String>,
    },

    #[error("Machine is evaluating transitions")]
    MachineEvaluatingTransitions,

    #[error("Machine is already started")]
    MachineStarted,

    #[error("Machine is not started")]
    MachineNotStarted,

    #[error("Machine has no states")]
    EmptyMachine,

    #[error("Active hierarchy path is being changed")]
    PathChangeInProgress,

    #[error("State {state} failed during {phase}: {source}")]
    Behaviour {
        state: String,
        phase: CallbackPhase,
        #[source]
        source: BehaviourError,
    },
}

impl MachineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DuplicateId { .. }
            | Self::NotFound { .. }
            | Self::InvalidEdge { .. }
            | Self::InvalidInitialState { .. }
            | Self::TransitionNotFound { .. } => ErrorKind::Structural,
            Self::Protected { .. }
            | Self::MachineStarted
            | Self::MachineNotStarted
            | Self::EmptyMachine
            | Self::PathChangeInProgress => ErrorKind::Lifecycle,
            Self::MultipleValidTransitions { .. } => ErrorKind::Resolution,
            Self::MachineEvaluatingTransitions => ErrorKind::Reentrancy,
            Self::Behaviour { .. } => ErrorKind::Behaviour,
        }
    }

    pub(crate) fn not_found<S: Debug>(id: &S) -> Self {
        Self::NotFound { id: render(id) }
    }

    pub(crate) fn protected<S: Debug>(id: &S, action: &'static str) -> Self {
        Self::Protected {
            id: render(id),
            action,
        }
    }
}

/// Problems found by [`StateMachine::validate`](crate::machine::StateMachine::validate).
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum StructureViolation {
    #[error("No initial state is set")]
    MissingInitialState,

    #[error("Initial state {id} is not a root")]
    InitialStateNotRoot { id: String },

    #[error("State {parent} has children but its initial child {child:?} is not one of them")]
    DanglingInitialChild {
        parent: String,
        child: Option<String>,
    },

    #[error("Unguarded transitions {first} and {second} share a source and trigger")]
    AmbiguousTransitions { first: String, second: String },

    #[error("Unguarded transitions {ancestor} and {descendant} fire on the same trigger")]
    ShadowedTransitions { ancestor: String, descendant: String },
}

/// Errors raised while loading a [`MachineConfig`](crate::config::MachineConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid machine configuration: {0}")]
    Invalid(#[from] serde_json::Error),
}

pub(crate) fn render<D: Debug + ?Sized>(value: &D) -> String {
    format!("{value:?}")
}
