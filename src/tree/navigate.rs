use std::cmp::Ordering;
use std::ops::ControlFlow;

use super::{DocumentTree, NodeId, Tag};

impl DocumentTree {
    /// Ancestors of `id`, nearest first, excluding `id` itself.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |node| self.parent(*node))
    }

    /// Whether `ancestor` is `node` or lies above it.
    pub fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        node == ancestor || self.ancestors(node).any(|candidate| candidate == ancestor)
    }

    /// Lowest node containing both `a` and `b` (possibly one of them).
    pub fn common_ancestor(&self, a: NodeId, b: NodeId) -> NodeId {
        let chain: Vec<NodeId> = std::iter::once(a).chain(self.ancestors(a)).collect();
        std::iter::once(b)
            .chain(self.ancestors(b))
            .find(|candidate| chain.contains(candidate))
            .unwrap_or(self.root)
    }

    /// The direct child of the root that contains `id`.
    pub fn top_level_of(&self, id: NodeId) -> Option<NodeId> {
        if id == self.root {
            return None;
        }
        std::iter::once(id)
            .chain(self.ancestors(id))
            .find(|node| self.parent(*node) == Some(self.root))
    }

    /// Child indices leading from the root down to `id`.
    pub fn path_from_root(&self, id: NodeId) -> Vec<usize> {
        let mut path: Vec<usize> = std::iter::once(id)
            .chain(self.ancestors(id))
            .filter_map(|node| self.index_in_parent(node))
            .collect();
        path.reverse();
        path
    }

    /// Pre-order position of `a` relative to `b`. Ancestors come before
    /// their descendants.
    pub fn tree_order(&self, a: NodeId, b: NodeId) -> Ordering {
        if a == b {
            return Ordering::Equal;
        }
        self.path_from_root(a).cmp(&self.path_from_root(b))
    }

    pub fn first_leaf(&self, node: NodeId) -> Option<NodeId> {
        self.walk(node, true, true, Some(node), |id| {
            if self.is_leaf(id) {
                ControlFlow::Break(id)
            } else {
                ControlFlow::Continue(())
            }
        })
    }

    pub fn last_leaf(&self, node: NodeId) -> Option<NodeId> {
        let mut current = node;
        loop {
            if self.is_leaf(current) {
                return Some(current);
            }
            // Containers without leaves are skipped from the right.
            let children = self.children(current);
            let next = children
                .iter()
                .rev()
                .copied()
                .find(|child| self.is_leaf(*child) || self.first_leaf(*child).is_some())?;
            current = next;
        }
    }

    /// The first leaf following `node` and its subtree, staying below `limit`.
    pub fn next_leaf(&self, node: NodeId, limit: Option<NodeId>) -> Option<NodeId> {
        let limit = limit.unwrap_or(self.root);
        if !self.check_bounds(node, limit) {
            return None;
        }
        let start = self.next_skipping_subtree(node, limit)?;
        self.walk(start, true, true, Some(limit), |id| {
            if self.is_leaf(id) {
                ControlFlow::Break(id)
            } else {
                ControlFlow::Continue(())
            }
        })
    }

    /// The last leaf preceding `node`, staying below `limit`.
    pub fn prev_leaf(&self, node: NodeId, limit: Option<NodeId>) -> Option<NodeId> {
        let limit = limit.unwrap_or(self.root);
        if !self.check_bounds(node, limit) {
            return None;
        }
        self.walk(node, false, false, Some(limit), |id| {
            if self.is_leaf(id) {
                ControlFlow::Break(id)
            } else {
                ControlFlow::Continue(())
            }
        })
    }

    pub fn next_content_leaf(&self, node: NodeId, limit: Option<NodeId>) -> Option<NodeId> {
        let mut current = self.next_leaf(node, limit)?;
        while !self.is_content_leaf(current) {
            current = self.next_leaf(current, limit)?;
        }
        Some(current)
    }

    pub fn prev_content_leaf(&self, node: NodeId, limit: Option<NodeId>) -> Option<NodeId> {
        let mut current = self.prev_leaf(node, limit)?;
        while !self.is_content_leaf(current) {
            current = self.prev_leaf(current, limit)?;
        }
        Some(current)
    }

    pub fn first_content_leaf(&self, node: NodeId) -> Option<NodeId> {
        let first = self.first_leaf(node)?;
        if self.is_content_leaf(first) {
            return Some(first);
        }
        self.next_content_leaf(first, Some(node))
    }

    pub fn last_content_leaf(&self, node: NodeId) -> Option<NodeId> {
        let last = self.last_leaf(node)?;
        if self.is_content_leaf(last) {
            return Some(last);
        }
        self.prev_content_leaf(last, Some(node))
    }

    /// Nearest node, starting at `node` itself, matching `predicate`.
    /// The search stops below `limit`.
    pub fn find_ancestor(
        &self,
        node: NodeId,
        limit: Option<NodeId>,
        predicate: impl Fn(&DocumentTree, NodeId) -> bool,
    ) -> Option<NodeId> {
        let limit = limit.unwrap_or(self.root);
        if !self.check_bounds(node, limit) {
            return None;
        }
        let mut current = node;
        while current != limit {
            if predicate(self, current) {
                return Some(current);
            }
            current = self.parent(current)?;
        }
        None
    }

    /// Pre-order traversal from `start`, forward or backward, never leaving
    /// `limit`. Returns the first value the visitor breaks with.
    pub fn walk<R>(
        &self,
        start: NodeId,
        forward: bool,
        include_start: bool,
        limit: Option<NodeId>,
        mut visit: impl FnMut(NodeId) -> ControlFlow<R>,
    ) -> Option<R> {
        let limit = limit.unwrap_or(self.root);
        if !self.check_bounds(start, limit) {
            return None;
        }
        let step = |node: NodeId| {
            if forward {
                self.next_in_preorder(node, limit)
            } else {
                self.prev_in_preorder(node, limit)
            }
        };
        let mut current = if include_start {
            Some(start)
        } else {
            step(start)
        };
        while let Some(node) = current {
            if let ControlFlow::Break(value) = visit(node) {
                return Some(value);
            }
            current = step(node);
        }
        None
    }

    fn check_bounds(&self, node: NodeId, limit: NodeId) -> bool {
        let inside = node.index() < self.nodes.len() && self.is_ancestor(limit, node);
        debug_assert!(inside, "node {node} is outside of {limit}");
        inside
    }

    fn next_in_preorder(&self, node: NodeId, limit: NodeId) -> Option<NodeId> {
        if let Some(first) = self.children(node).first() {
            return Some(*first);
        }
        self.next_skipping_subtree(node, limit)
    }

    fn next_skipping_subtree(&self, node: NodeId, limit: NodeId) -> Option<NodeId> {
        let mut current = node;
        while current != limit {
            if let Some(sibling) = self.next_sibling(current) {
                return Some(sibling);
            }
            current = self.parent(current)?;
        }
        None
    }

    fn prev_in_preorder(&self, node: NodeId, limit: NodeId) -> Option<NodeId> {
        if node == limit {
            return None;
        }
        match self.previous_sibling(node) {
            Some(mut sibling) => {
                while let Some(last) = self.children(sibling).last() {
                    sibling = *last;
                }
                Some(sibling)
            }
            None => self.parent(node).filter(|parent| *parent != limit),
        }
    }

    // ------------------------------------------------------------------
    // Lines
    // ------------------------------------------------------------------

    /// Whether `id` is a line: a non-list top-level block, or a list item
    /// whose list nests directly under the root (possibly via more lists).
    pub fn is_line(&self, id: NodeId) -> bool {
        let Some(tag) = self.tag(id) else {
            return false;
        };
        let Some(parent) = self.parent(id) else {
            return false;
        };
        if parent == self.root {
            return tag.is_top_level() && !tag.is_list();
        }
        if tag != Tag::ListItem {
            return false;
        }
        let mut current = parent;
        loop {
            if !self.tag(current).is_some_and(Tag::is_list) {
                return false;
            }
            match self.parent(current) {
                Some(up) if up == self.root => return true,
                Some(up) => current = up,
                None => return false,
            }
        }
    }

    /// All lines in document order, with lists flattened into their items.
    pub fn lines(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(self.root).iter().rev().copied().collect();
        while let Some(node) = stack.pop() {
            if self.tag(node).is_some_and(Tag::is_list) {
                stack.extend(self.children(node).iter().rev().copied());
            } else if self.is_line(node) {
                out.push(node);
            }
        }
        out
    }

    /// The line containing `id`.
    pub fn line_of(&self, id: NodeId) -> Option<NodeId> {
        std::iter::once(id)
            .chain(self.ancestors(id))
            .find(|node| self.is_line(*node))
    }

    /// The nearest block element containing `id`.
    pub fn block_of(&self, id: NodeId) -> Option<NodeId> {
        self.ancestors(id)
            .find(|node| self.tag(*node).is_some_and(|tag| tag.is_block() && tag != Tag::Root))
    }
}
