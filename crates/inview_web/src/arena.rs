//! Element arena
//!
//! Maps host nodes to stable [`ElementId`]s so the engines never hold DOM
//! references themselves. Each registered node carries its own id as a tag, so
//! mapping a reported node back to its id does not scan the arena.

use slotmap::SlotMap;

use inview_core::ElementId;

/// A host node that can carry the id it was registered under
///
/// Clones must share the tag, the way clones of a DOM element share the
/// underlying JS object.
pub trait TaggedNode: PartialEq {
    fn tag(&self) -> Option<ElementId>;
    fn set_tag(&self, id: Option<ElementId>);
}

/// Registry of host nodes keyed by [`ElementId`]
///
/// Registering the same node twice yields the same id. Released ids go stale
/// and never resolve again.
#[derive(Debug)]
pub struct ElementArena<N> {
    nodes: SlotMap<ElementId, N>,
}

impl<N> Default for ElementArena<N> {
    fn default() -> Self {
        Self {
            nodes: SlotMap::with_key(),
        }
    }
}

impl<N: TaggedNode> ElementArena<N> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id for `node`, registering it if needed
    pub fn register(&mut self, node: N) -> ElementId {
        if let Some(id) = self.find(&node) {
            return id;
        }
        self.nodes.insert_with_key(|id| {
            node.set_tag(Some(id));
            node
        })
    }

    /// Reverse lookup used when the host reports a node
    ///
    /// A tag left by another arena, or by a released id, resolves to `None`.
    pub fn find(&self, node: &N) -> Option<ElementId> {
        let id = node.tag()?;
        self.nodes
            .get(id)
            .is_some_and(|registered| registered == node)
            .then_some(id)
    }

    pub fn get(&self, id: ElementId) -> Option<&N> {
        self.nodes.get(id)
    }

    /// Forget `id`, returning its node
    pub fn release(&mut self, id: ElementId) -> Option<N> {
        let node = self.nodes.remove(id)?;
        if node.tag() == Some(id) {
            node.set_tag(None);
        }
        Some(node)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    /// Node with reference identity, like a DOM element handle
    #[derive(Clone, Debug, Default)]
    struct Node(Rc<Cell<Option<ElementId>>>);

    impl PartialEq for Node {
        fn eq(&self, other: &Self) -> bool {
            Rc::ptr_eq(&self.0, &other.0)
        }
    }

    impl TaggedNode for Node {
        fn tag(&self) -> Option<ElementId> {
            self.0.get()
        }

        fn set_tag(&self, id: Option<ElementId>) {
            self.0.set(id);
        }
    }

    #[test]
    fn test_register_is_idempotent() {
        let mut arena = ElementArena::new();
        let hero = Node::default();
        let a = arena.register(hero.clone());
        let b = arena.register(Node::default());

        assert_ne!(a, b);
        assert_eq!(arena.register(hero), a);
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn test_find_uses_the_node_tag() {
        let mut arena = ElementArena::new();
        let card = Node::default();
        let id = arena.register(card.clone());

        assert_eq!(card.tag(), Some(id));
        assert_eq!(arena.find(&card), Some(id));
        assert_eq!(arena.find(&Node::default()), None);
        assert!(arena.get(id).is_some_and(|node| *node == card));
    }

    #[test]
    fn test_foreign_tag_does_not_resolve() {
        let mut first = ElementArena::new();
        let mut second = ElementArena::new();
        let shared = Node::default();
        first.register(Node::default());
        let id = first.register(shared.clone());

        // Same slot in another arena holds a different node
        second.register(Node::default());
        second.register(Node::default());
        assert_eq!(shared.tag(), Some(id));
        assert_eq!(second.find(&shared), None);
    }

    #[test]
    fn test_released_id_goes_stale() {
        let mut arena = ElementArena::new();
        let node = Node::default();
        let id = arena.register(node.clone());

        assert!(arena.release(id).is_some());
        assert!(arena.get(id).is_none());
        assert_eq!(node.tag(), None);
        assert_eq!(arena.find(&node), None);
        assert!(arena.is_empty());

        // Re-registering hands out a fresh id
        let again = arena.register(node);
        assert_ne!(again, id);
        assert!(arena.release(id).is_none());
    }
}
