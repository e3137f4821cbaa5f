use super::{Atomic, DocumentTree, NodeId, NodeKind, Tag};

impl DocumentTree {
    /// Drops empty text runs and empty inline containers below `node`,
    /// coalesces adjacent text runs and adjacent inline containers with the
    /// same tag and attributes, and gives blocks that lost all content a
    /// line-break placeholder. `node` itself is never removed.
    pub fn normalize(&mut self, node: NodeId) {
        self.prune(node);
        self.merge_children(node);
        if node == self.root {
            self.merge_adjacent_lists();
            self.ensure_initialized();
        }
    }

    fn prune(&mut self, node: NodeId) {
        let mut idx = 0;
        while idx < self.children(node).len() {
            let child = self.children(node)[idx];
            self.prune(child);
            if self.is_removable(child) {
                self.detach(child);
            } else {
                idx += 1;
            }
        }
        if self.needs_placeholder(node) {
            self.append_atomic(node, Atomic::LineBreak);
        }
    }

    fn is_removable(&self, id: NodeId) -> bool {
        match self.kind(id) {
            NodeKind::Text(text) => text.is_empty(),
            NodeKind::Atomic(_) => false,
            NodeKind::Element(element) => {
                self.children(id).is_empty() && (element.tag.is_inline() || element.tag.is_list())
            }
        }
    }

    fn needs_placeholder(&self, id: NodeId) -> bool {
        let holds_lines = self.tag(id).is_some_and(|tag| {
            tag != Tag::Root && tag.is_block() && !tag.is_list()
        });
        holds_lines && self.first_leaf(id).is_none()
    }

    fn merge_children(&mut self, node: NodeId) {
        let children = self.children(node).to_vec();
        for child in children {
            if self.is_element(child) {
                self.merge_children(child);
            }
        }

        let mut i = 0;
        while i + 1 < self.children(node).len() {
            let left = self.children(node)[i];
            let right = self.children(node)[i + 1];
            if self.is_text(left) && self.is_text(right) {
                let moved = self.text(right).map(str::to_owned).unwrap_or_default();
                if let Some(text) = self.text_mut(left) {
                    text.push_str(&moved);
                }
                self.detach(right);
            } else if self.can_merge_elements(left, right) {
                self.move_children_from(right, 0, left);
                self.detach(right);
                self.merge_children(left);
            } else {
                i += 1;
            }
        }
    }

    fn can_merge_elements(&self, left: NodeId, right: NodeId) -> bool {
        match (self.element(left), self.element(right)) {
            (Some(a), Some(b)) => a.tag.is_inline() && a == b,
            _ => false,
        }
    }

    fn merge_adjacent_lists(&mut self) {
        let root = self.root;
        let mut i = 0;
        while i + 1 < self.children(root).len() {
            let left = self.children(root)[i];
            let right = self.children(root)[i + 1];
            let same_list = match (self.element(left), self.element(right)) {
                (Some(a), Some(b)) => a.tag.is_list() && a == b,
                _ => false,
            };
            if same_list {
                self.move_children_from(right, 0, left);
                self.detach(right);
            } else {
                i += 1;
            }
        }
    }

    /// Whether the block holding `id` has no content besides `id`, which
    /// makes `id` a placeholder line break.
    pub fn is_placeholder(&self, id: NodeId) -> bool {
        if !matches!(self.atomic(id), Some(Atomic::LineBreak)) {
            return false;
        }
        let Some(block) = self.block_of(id) else {
            return false;
        };
        self.first_content_leaf(block) == Some(id) && self.last_content_leaf(block) == Some(id)
    }
}
