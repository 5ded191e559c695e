//! Arena-based node storage
//!
//! Every node of every page lives in one `Vec<Node>`; links between nodes
//! are `ObjectId` indices. Slots are never reused, so a disposed node keeps
//! its slot and its id keeps answering `is_disposed`.
//!
//! ```text
//! Arena: Vec<Node>
//!        [Document][Page][Step][Line]...
//!                    ↑ parent index, not pointer
//! ```

use crate::error::{DomError, Result};
use crate::node::{Node, NodeData};
use crate::types::{NodeState, ObjectId};

#[derive(Debug, Default)]
pub struct DomArena {
    nodes: Vec<Node>,
}

impl DomArena {
    pub fn new() -> Self {
        Self {
            nodes: Vec::with_capacity(256),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(capacity),
        }
    }

    /// Add a detached node, returns its id
    pub fn add_node(&mut self, data: NodeData) -> ObjectId {
        let id = self.nodes.len() as ObjectId;
        self.nodes.push(Node::new(id, data));
        id
    }

    /// Any node, disposed or not. Only lifecycle queries should use this.
    pub fn slot(&self, id: ObjectId) -> Result<&Node> {
        self.nodes
            .get(id as usize)
            .ok_or(DomError::NodeNotFound(id))
    }

    pub(crate) fn slot_mut(&mut self, id: ObjectId) -> Result<&mut Node> {
        self.nodes
            .get_mut(id as usize)
            .ok_or(DomError::NodeNotFound(id))
    }

    /// Live node by id
    pub fn get(&self, id: ObjectId) -> Result<&Node> {
        let node = self.slot(id)?;
        if node.state == NodeState::Disposed {
            return Err(DomError::Disposed(id));
        }
        Ok(node)
    }

    /// Live node by id (mutable)
    pub fn get_mut(&mut self, id: ObjectId) -> Result<&mut Node> {
        let node = self.slot_mut(id)?;
        if node.state == NodeState::Disposed {
            return Err(DomError::Disposed(id));
        }
        Ok(node)
    }

    /// Ids from `id`'s parent up to the top of its tree
    pub fn ancestors(&self, id: ObjectId) -> Ancestors<'_> {
        let next = self.nodes.get(id as usize).and_then(|n| n.parent);
        Ancestors { arena: self, next }
    }

    /// Topmost node reachable through parent links
    pub fn root_of(&self, id: ObjectId) -> ObjectId {
        self.ancestors(id).last().unwrap_or(id)
    }

    /// `candidate` is `id` itself or one of its ancestors
    pub fn is_self_or_ancestor(&self, candidate: ObjectId, id: ObjectId) -> bool {
        candidate == id || self.ancestors(id).any(|a| a == candidate)
    }

    /// Total number of slots, disposed included
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterator over live nodes
    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.state != NodeState::Disposed)
    }

    /// Pre-order ids of the subtree rooted at `start` (iterative, no recursion)
    pub fn subtree(&self, start: ObjectId) -> Result<Vec<ObjectId>> {
        let mut out = Vec::new();
        self.traverse_df(start, |node| {
            out.push(node.id);
            Ok(())
        })?;
        Ok(out)
    }

    /// Traverse tree depth-first, parents before children
    pub fn traverse_df<F>(&self, start: ObjectId, mut visit: F) -> Result<()>
    where
        F: FnMut(&Node) -> Result<()>,
    {
        let mut stack = vec![start];

        while let Some(id) = stack.pop() {
            let node = self.get(id)?;
            visit(node)?;

            // Push children in reverse order (so they're visited left-to-right)
            for &child in node.children.iter().rev() {
                stack.push(child);
            }
        }

        Ok(())
    }

    /// Find live nodes matching predicate
    pub fn find<F>(&self, predicate: F) -> Vec<ObjectId>
    where
        F: Fn(&Node) -> bool,
    {
        self.iter()
            .filter(|node| predicate(node))
            .map(|node| node.id)
            .collect()
    }
}

/// Upward walk over parent links.
pub struct Ancestors<'a> {
    arena: &'a DomArena,
    next: Option<ObjectId>,
}

impl Iterator for Ancestors<'_> {
    type Item = ObjectId;

    fn next(&mut self) -> Option<ObjectId> {
        let current = self.next?;
        self.next = self
            .arena
            .nodes
            .get(current as usize)
            .and_then(|n| n.parent);
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::CommentData;

    fn comment(arena: &mut DomArena, text: &str) -> ObjectId {
        arena.add_node(NodeData::Comment(CommentData {
            text: text.to_string(),
        }))
    }

    #[test]
    fn test_arena_basic() {
        let mut arena = DomArena::new();
        let id = comment(&mut arena, "hello");
        assert_eq!(id, 0);

        let node = arena.get(id).unwrap();
        assert_eq!(node.as_comment().unwrap().text, "hello");
        assert!(matches!(arena.get(7), Err(DomError::NodeNotFound(7))));
    }

    #[test]
    fn test_disposed_slot_stays() {
        let mut arena = DomArena::new();
        let id = comment(&mut arena, "gone");
        arena.slot_mut(id).unwrap().state = NodeState::Disposed;

        assert!(matches!(arena.get(id), Err(DomError::Disposed(_))));
        assert!(arena.slot(id).is_ok());
        assert_eq!(arena.iter().count(), 0);
    }

    #[test]
    fn test_traverse_and_ancestors() {
        let mut arena = DomArena::new();

        // step -> [a, b]
        let step = arena.add_node(NodeData::Step);
        let a = comment(&mut arena, "a");
        let b = comment(&mut arena, "b");
        arena.get_mut(step).unwrap().children = vec![a, b];
        arena.get_mut(a).unwrap().parent = Some(step);
        arena.get_mut(b).unwrap().parent = Some(step);

        assert_eq!(arena.subtree(step).unwrap(), vec![step, a, b]);
        assert_eq!(arena.ancestors(b).collect::<Vec<_>>(), vec![step]);
        assert_eq!(arena.root_of(a), step);
        assert!(arena.is_self_or_ancestor(step, b));
        assert!(!arena.is_self_or_ancestor(a, b));
    }
}
