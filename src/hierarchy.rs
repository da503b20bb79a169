//! Forest of states with parent/child links.
//!
//! `StateHierarchy` is pure structure: it knows which states exist, how
//! they nest, and which child each parent enters first. It has no notion
//! of which states are currently active; the scheduler owns that.
//!
//! Nodes are stored in a map keyed by state id and refer to each other by
//! id, so there are no shared mutable references between nodes.

use crate::core::{StateBehaviour, StateId};
use crate::error::{render, EdgeViolation, MachineError};
use std::collections::HashMap;
use std::rc::Rc;

struct Node<S> {
    behaviour: Rc<dyn StateBehaviour>,
    parent: Option<S>,
    children: Vec<S>,
    initial_child: Option<S>,
}

/// Parent/child structure of a machine's states.
///
/// # Example
///
/// ```rust
/// use hierarch::core::NoopBehaviour;
/// use hierarch::hierarchy::StateHierarchy;
/// use std::rc::Rc;
///
/// let mut hierarchy = StateHierarchy::new();
/// hierarchy.add_state("door", Rc::new(NoopBehaviour)).unwrap();
/// hierarchy.add_state("open", Rc::new(NoopBehaviour)).unwrap();
/// hierarchy.add_state("closed", Rc::new(NoopBehaviour)).unwrap();
/// hierarchy.add_child(&"door", &"open").unwrap();
/// hierarchy.add_child(&"door", &"closed").unwrap();
///
/// assert_eq!(hierarchy.initial_state(), Some(&"door"));
/// assert_eq!(hierarchy.initial_child_of(&"door").unwrap(), Some(&"open"));
/// assert_eq!(hierarchy.initial_chain(&"door").unwrap(), vec!["door", "open"]);
/// ```
pub struct StateHierarchy<S: StateId> {
    nodes: HashMap<S, Node<S>>,
    order: Vec<S>,
    roots: Vec<S>,
    initial_state: Option<S>,
}

impl<S: StateId> Default for StateHierarchy<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: StateId> StateHierarchy<S> {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            order: Vec::new(),
            roots: Vec::new(),
            initial_state: None,
        }
    }

    /// Add a new root state.
    ///
    /// The first state added to a hierarchy without an initial state
    /// becomes the initial state.
    pub fn add_state(
        &mut self,
        id: S,
        behaviour: Rc<dyn StateBehaviour>,
    ) -> Result<(), MachineError> {
        if self.nodes.contains_key(&id) {
            return Err(MachineError::DuplicateId { id: render(&id) });
        }

        self.nodes.insert(
            id.clone(),
            Node {
                behaviour,
                parent: None,
                children: Vec::new(),
                initial_child: None,
            },
        );
        self.order.push(id.clone());
        self.roots.push(id.clone());
        if self.initial_state.is_none() {
            self.initial_state = Some(id);
        }
        Ok(())
    }

    /// Remove a state, promoting its children to roots.
    ///
    /// Unknown ids are ignored. Returns the removed state's behaviour.
    pub fn remove_state(&mut self, id: &S) -> Option<Rc<dyn StateBehaviour>> {
        let node = self.nodes.remove(id)?;

        match &node.parent {
            Some(parent) => self.detach(parent, id),
            None => self.roots.retain(|root| root != id),
        }
        for child in &node.children {
            if let Some(child_node) = self.nodes.get_mut(child) {
                child_node.parent = None;
            }
            self.roots.push(child.clone());
        }

        self.order.retain(|state| state != id);
        if self.initial_state.as_ref() == Some(id) {
            self.initial_state = None;
        }
        Some(node.behaviour)
    }

    /// Link `child` under `parent`.
    ///
    /// Returns `Ok(false)` if the edge already exists. The first child of
    /// a parent becomes its initial child.
    pub fn add_child(&mut self, parent: &S, child: &S) -> Result<bool, MachineError> {
        self.ensure_exists(parent)?;
        let current_parent = self
            .nodes
            .get(child)
            .ok_or_else(|| MachineError::not_found(child))?
            .parent
            .as_ref();

        let violation = if parent == child {
            Some(EdgeViolation::SelfLoop)
        } else {
            match current_parent {
                Some(existing) if existing == parent => return Ok(false),
                Some(existing) => Some(EdgeViolation::AlreadyParented {
                    parent: render(existing),
                }),
                None if self.is_ancestor(child, parent) => Some(EdgeViolation::Cycle),
                None => None,
            }
        };
        if let Some(reason) = violation {
            return Err(MachineError::InvalidEdge {
                parent: render(parent),
                child: render(child),
                reason,
            });
        }

        if let Some(child_node) = self.nodes.get_mut(child) {
            child_node.parent = Some(parent.clone());
        }
        self.roots.retain(|root| root != child);
        if let Some(parent_node) = self.nodes.get_mut(parent) {
            parent_node.children.push(child.clone());
            if parent_node.children.len() == 1 {
                parent_node.initial_child = Some(child.clone());
            }
        }
        Ok(true)
    }

    /// Unlink `child` from `parent`, making the child a root.
    ///
    /// Returns `false` if the edge does not exist.
    pub fn remove_child(&mut self, parent: &S, child: &S) -> bool {
        if !self.is_child_of(child, parent) {
            return false;
        }

        self.detach(parent, child);
        if let Some(child_node) = self.nodes.get_mut(child) {
            child_node.parent = None;
        }
        self.roots.push(child.clone());
        true
    }

    pub fn set_initial_child(&mut self, parent: &S, child: &S) -> Result<(), MachineError> {
        self.ensure_exists(parent)?;
        if !self.is_child_of(child, parent) {
            return Err(MachineError::InvalidInitialState {
                reason: format!("{} is not a child of {}", render(child), render(parent)),
            });
        }

        if let Some(parent_node) = self.nodes.get_mut(parent) {
            parent_node.initial_child = Some(child.clone());
        }
        Ok(())
    }

    /// Initial child configured for `parent`.
    ///
    /// The id is reported as configured, even if that child has since
    /// been removed while siblings remain.
    pub fn initial_child_of(&self, parent: &S) -> Result<Option<&S>, MachineError> {
        self.nodes
            .get(parent)
            .map(|node| node.initial_child.as_ref())
            .ok_or_else(|| MachineError::not_found(parent))
    }

    /// Choose the root the machine enters first.
    pub fn set_initial_state(&mut self, id: &S) -> Result<(), MachineError> {
        self.ensure_exists(id)?;
        if !self.is_root(id) {
            return Err(MachineError::InvalidInitialState {
                reason: format!("{} is not a root", render(id)),
            });
        }

        self.initial_state = Some(id.clone());
        Ok(())
    }

    pub fn initial_state(&self) -> Option<&S> {
        self.initial_state.as_ref()
    }

    pub fn contains_state(&self, id: &S) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn state_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All states in insertion order.
    pub fn states(&self) -> impl Iterator<Item = &S> {
        self.order.iter()
    }

    /// Parent of `id`, or `id` itself when it is a root.
    pub fn parent_of(&self, id: &S) -> Result<&S, MachineError> {
        let (key, node) = self
            .nodes
            .get_key_value(id)
            .ok_or_else(|| MachineError::not_found(id))?;
        Ok(node.parent.as_ref().unwrap_or(key))
    }

    /// Immediate children of `id` in insertion order.
    pub fn children_of(&self, id: &S) -> Result<&[S], MachineError> {
        self.nodes
            .get(id)
            .map(|node| node.children.as_slice())
            .ok_or_else(|| MachineError::not_found(id))
    }

    pub fn roots(&self) -> &[S] {
        &self.roots
    }

    pub fn is_root(&self, id: &S) -> bool {
        self.nodes.get(id).is_some_and(|node| node.parent.is_none())
    }

    pub fn is_child_of(&self, child: &S, parent: &S) -> bool {
        self.nodes
            .get(child)
            .is_some_and(|node| node.parent.as_ref() == Some(parent))
    }

    /// Whether `ancestor` is a strict ancestor of `descendant`.
    pub fn is_ancestor(&self, ancestor: &S, descendant: &S) -> bool {
        let mut cursor = self.nodes.get(descendant).and_then(|n| n.parent.as_ref());
        while let Some(parent) = cursor {
            if parent == ancestor {
                return true;
            }
            cursor = self.nodes.get(parent).and_then(|n| n.parent.as_ref());
        }
        false
    }

    pub fn behaviour_of(&self, id: &S) -> Option<Rc<dyn StateBehaviour>> {
        self.nodes.get(id).map(|node| Rc::clone(&node.behaviour))
    }

    /// Chain from the root of `id`'s tree down to `id`, inclusive.
    pub fn lineage(&self, id: &S) -> Option<Vec<S>> {
        let mut chain = vec![id.clone()];
        let mut cursor = self.nodes.get(id)?.parent.as_ref();
        while let Some(parent) = cursor {
            chain.push(parent.clone());
            cursor = self.nodes.get(parent).and_then(|n| n.parent.as_ref());
        }
        chain.reverse();
        Some(chain)
    }

    /// `from` followed by its chain of initial children.
    ///
    /// Fails with `InvalidInitialState` if any state on the chain has
    /// children but no initial child among them.
    pub fn initial_chain(&self, from: &S) -> Result<Vec<S>, MachineError> {
        let mut node = self
            .nodes
            .get(from)
            .ok_or_else(|| MachineError::not_found(from))?;
        let mut chain = vec![from.clone()];
        let mut current = from;

        while !node.children.is_empty() {
            let next = node
                .initial_child
                .as_ref()
                .filter(|child| node.children.contains(child))
                .ok_or_else(|| MachineError::InvalidInitialState {
                    reason: format!(
                        "{} has children but no valid initial child",
                        render(current)
                    ),
                })?;
            node = self
                .nodes
                .get(next)
                .ok_or_else(|| MachineError::not_found(next))?;
            chain.push(next.clone());
            current = next;
        }
        Ok(chain)
    }

    fn ensure_exists(&self, id: &S) -> Result<(), MachineError> {
        if self.nodes.contains_key(id) {
            Ok(())
        } else {
            Err(MachineError::not_found(id))
        }
    }

    fn detach(&mut self, parent: &S, child: &S) {
        if let Some(parent_node) = self.nodes.get_mut(parent) {
            parent_node.children.retain(|c| c != child);
            if parent_node.children.is_empty() {
                parent_node.initial_child = None;
            }
        }
    }
}
