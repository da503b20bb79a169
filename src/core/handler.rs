//! Per-state event handlers.

use std::fmt;
use std::rc::Rc;

/// Handler subscribed to events while its state is active.
///
/// Returns `true` when it consumed the event, which stops bubbling
/// towards the root. Like [`Guard`](super::Guard), handlers compare by
/// identity.
pub struct EventHandler<E> {
    handler: Rc<dyn Fn(&E) -> bool>,
}

impl<E> EventHandler<E> {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&E) -> bool + 'static,
    {
        EventHandler {
            handler: Rc::new(handler),
        }
    }

    pub fn handle(&self, event: &E) -> bool {
        (self.handler)(event)
    }
}

impl<E> Clone for EventHandler<E> {
    fn clone(&self) -> Self {
        Self {
            handler: Rc::clone(&self.handler),
        }
    }
}

impl<E> PartialEq for EventHandler<E> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.handler, &other.handler)
    }
}

impl<E> Eq for EventHandler<E> {}

impl<E> fmt::Debug for EventHandler<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandler").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handler_reports_consumption() {
        let handler = EventHandler::new(|event: &u32| *event > 10);
        assert!(handler.handle(&11));
        assert!(!handler.handle(&3));
    }

    #[test]
    fn handlers_compare_by_identity() {
        let handler = EventHandler::new(|_: &()| true);
        assert_eq!(handler, handler.clone());
        assert_ne!(handler, EventHandler::new(|_: &()| true));
    }
}
