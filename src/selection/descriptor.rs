use serde::{Deserialize, Serialize};

use super::codec::Boundary;
use crate::tree::{DocumentTree, NodeId};

/// How a descriptor resolves once its target leaf has been found.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BoundaryKind {
    /// Inside a text run.
    Inside,
    /// Right after an atomic, i.e. at the start of whatever follows it.
    NextNode,
    /// Right before an atomic.
    BeforeAtomic,
}

/// A boundary expressed in characters, independent of tree shape.
///
/// `index` counts characters from the start of the document. Positions that
/// share an index (around atomics, or at the seam of two text runs) are told
/// apart by `empty_run`: the number of leaves stepped over, starting at the
/// text run that ends at `index`. When `index` is 0 there is no such run and
/// the count is one less.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PositionDescriptor {
    pub index: usize,
    pub empty_run: usize,
    pub kind: BoundaryKind,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpanDescriptor {
    pub start: PositionDescriptor,
    pub end: PositionDescriptor,
}

impl PositionDescriptor {
    pub fn inside(index: usize) -> Self {
        Self {
            index,
            empty_run: 0,
            kind: BoundaryKind::Inside,
        }
    }

    pub fn encode(tree: &DocumentTree, boundary: Boundary) -> Option<Self> {
        let boundary = canonical(tree, boundary)?;
        let descriptor = match boundary {
            Boundary::Text { leaf, offset } if offset > 0 => {
                Self::inside(char_position(tree, leaf) + offset)
            }
            Boundary::Text { leaf, .. } => {
                let index = char_position(tree, leaf);
                Self {
                    index,
                    empty_run: empty_run(tree, leaf, index),
                    kind: BoundaryKind::Inside,
                }
            }
            Boundary::Before(atomic) => {
                let index = char_position(tree, atomic);
                Self {
                    index,
                    empty_run: empty_run(tree, atomic, index),
                    kind: BoundaryKind::BeforeAtomic,
                }
            }
            Boundary::After(atomic) => {
                let index = char_position(tree, atomic);
                Self {
                    index,
                    empty_run: empty_run(tree, atomic, index),
                    kind: BoundaryKind::NextNode,
                }
            }
        };
        Some(descriptor)
    }

    /// Resolves the descriptor against the current tree. Out-of-range values
    /// clamp to the end of the document; `None` only for a tree without
    /// leaves.
    pub fn decode(&self, tree: &DocumentTree) -> Option<Boundary> {
        let first = tree.first_content_leaf(tree.root())?;
        if self.index == 0 {
            return Some(self.step_and_resolve(tree, first, 0, self.empty_run));
        }

        let mut pos = 0;
        let mut last = first;
        let mut current = Some(first);
        while let Some(leaf) = current {
            let len = tree.text_len(leaf);
            let end = pos + len;
            if len > 0 && pos < self.index {
                if self.index < end || (self.index == end && self.empty_run == 0) {
                    return Some(Boundary::Text {
                        leaf,
                        offset: self.index - pos,
                    });
                }
                if self.index == end {
                    return Some(self.step_and_resolve(tree, leaf, pos, self.empty_run));
                }
            }
            pos = end;
            last = leaf;
            current = tree.next_content_leaf(leaf, None);
        }
        log::warn!("descriptor {self:?} points past the end of the document");
        Some(Boundary::end_of(tree, last))
    }

    /// Steps `steps` content leaves forward from `leaf` (which starts at char
    /// `pos`) and resolves the kind on the leaf reached.
    fn step_and_resolve(&self, tree: &DocumentTree, leaf: NodeId, pos: usize, steps: usize) -> Boundary {
        let mut leaf = leaf;
        let mut pos = pos;
        for _ in 0..steps {
            match tree.next_content_leaf(leaf, None) {
                Some(next) => {
                    pos += tree.text_len(leaf);
                    leaf = next;
                }
                None => return Boundary::end_of(tree, leaf),
            }
        }
        if tree.is_text(leaf) {
            let offset = self.index.saturating_sub(pos).min(tree.text_len(leaf));
            return Boundary::Text { leaf, offset };
        }
        match self.kind {
            BoundaryKind::NextNode => Boundary::After(leaf),
            BoundaryKind::Inside | BoundaryKind::BeforeAtomic => Boundary::Before(leaf),
        }
    }
}

impl SpanDescriptor {
    pub fn caret(position: PositionDescriptor) -> Self {
        Self {
            start: position,
            end: position,
        }
    }

    pub fn is_collapsed(&self) -> bool {
        self.start == self.end
    }
}

/// Characters before `leaf`: the text of all top-level blocks ahead of the
/// one holding it, plus the text between that block's start and the leaf.
pub fn char_position(tree: &DocumentTree, leaf: NodeId) -> usize {
    let Some(top) = tree.top_level_of(leaf) else {
        return 0;
    };
    let root = tree.root();
    let mut pos: usize = tree
        .children(root)
        .iter()
        .take_while(|block| **block != top)
        .map(|block| tree.text_len(*block))
        .sum();
    let mut current = tree.first_leaf(top);
    while let Some(id) = current {
        if id == leaf {
            break;
        }
        pos += tree.text_len(id);
        current = tree.next_leaf(id, Some(top));
    }
    pos
}

/// Leaves stepped over from the text run ending right before `target`.
fn empty_run(tree: &DocumentTree, target: NodeId, index: usize) -> usize {
    let mut count = 1;
    let mut current = target;
    while let Some(prev) = tree.prev_content_leaf(current, None) {
        if tree.is_text(prev) {
            break;
        }
        count += 1;
        current = prev;
    }
    if index == 0 { count - 1 } else { count }
}

/// Moves boundaries off empty text runs, which take no part in addressing.
fn canonical(tree: &DocumentTree, boundary: Boundary) -> Option<Boundary> {
    let Boundary::Text { leaf, .. } = boundary else {
        return Some(boundary);
    };
    if tree.is_content_leaf(leaf) {
        return Some(boundary);
    }
    if let Some(prev) = tree.prev_content_leaf(leaf, None) {
        return Some(Boundary::end_of(tree, prev));
    }
    tree.next_content_leaf(leaf, None)
        .map(|next| Boundary::start_of(tree, next))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::parse_markup;
    use pretty_assertions::assert_eq;

    fn leaves(tree: &DocumentTree) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut leaf = tree.first_content_leaf(tree.root());
        while let Some(id) = leaf {
            out.push(id);
            leaf = tree.next_content_leaf(id, None);
        }
        out
    }

    #[test]
    fn text_offsets_encode_as_char_indices() {
        let tree = parse_markup("<p>ab</p><p>c<b>de</b></p>").unwrap();
        let all = leaves(&tree);
        let descriptor = PositionDescriptor::encode(&tree, Boundary::Text { leaf: all[2], offset: 1 });
        assert_eq!(descriptor, Some(PositionDescriptor::inside(4)));
    }

    #[test]
    fn start_of_a_run_steps_off_the_previous_run() {
        let tree = parse_markup("<p>ab</p><p>cd</p>").unwrap();
        let all = leaves(&tree);
        let start = Boundary::Text { leaf: all[1], offset: 0 };
        let descriptor = PositionDescriptor::encode(&tree, start).unwrap();
        assert_eq!(
            descriptor,
            PositionDescriptor {
                index: 2,
                empty_run: 1,
                kind: BoundaryKind::Inside
            }
        );
        assert_eq!(descriptor.decode(&tree), Some(start));
        assert_eq!(
            PositionDescriptor::inside(2).decode(&tree),
            Some(Boundary::Text { leaf: all[0], offset: 2 })
        );
    }

    #[test]
    fn atomic_runs_are_counted_from_the_anchor() {
        let tree = parse_markup("<p>ab<br/><br/>c</p>").unwrap();
        let all = leaves(&tree);
        let second_br = all[2];
        let before = PositionDescriptor::encode(&tree, Boundary::Before(second_br)).unwrap();
        assert_eq!(
            before,
            PositionDescriptor {
                index: 2,
                empty_run: 2,
                kind: BoundaryKind::BeforeAtomic
            }
        );
        let after = PositionDescriptor::encode(&tree, Boundary::After(second_br)).unwrap();
        assert_eq!(after.kind, BoundaryKind::NextNode);
        assert_eq!(after.decode(&tree), Some(Boundary::After(second_br)));
        assert_eq!(before.decode(&tree), Some(Boundary::Before(second_br)));
    }

    #[test]
    fn runs_at_the_document_start_are_one_shorter() {
        let tree = parse_markup("<p><br/><br/>x</p>").unwrap();
        let all = leaves(&tree);
        let first = PositionDescriptor::encode(&tree, Boundary::Before(all[0])).unwrap();
        assert_eq!(first.empty_run, 0);
        let second = PositionDescriptor::encode(&tree, Boundary::Before(all[1])).unwrap();
        assert_eq!(second.empty_run, 1);
        let text = PositionDescriptor::encode(&tree, Boundary::Text { leaf: all[2], offset: 0 }).unwrap();
        assert_eq!(text.empty_run, 2);
        assert_eq!(text.decode(&tree), Some(Boundary::Text { leaf: all[2], offset: 0 }));
        assert_eq!(second.decode(&tree), Some(Boundary::Before(all[1])));
    }

    #[test]
    fn decoding_survives_text_runs_being_merged() {
        let mut tree = parse_markup("<p>ab<b>cd</b></p>").unwrap();
        let all = leaves(&tree);
        let descriptor =
            PositionDescriptor::encode(&tree, Boundary::Text { leaf: all[1], offset: 0 }).unwrap();
        let bold = tree.parent(all[1]).unwrap();
        tree.unwrap(bold);
        tree.normalize(tree.root());
        let merged = tree.first_leaf(tree.root()).unwrap();
        assert_eq!(tree.text(merged), Some("abcd"));
        assert_eq!(
            descriptor.decode(&tree),
            Some(Boundary::Text { leaf: merged, offset: 2 })
        );
    }

    #[test]
    fn out_of_range_descriptors_clamp_to_the_end() {
        let tree = parse_markup("<p>ab</p><p>cd<br/></p>").unwrap();
        let all = leaves(&tree);
        assert_eq!(
            PositionDescriptor::inside(99).decode(&tree),
            Some(Boundary::After(all[2]))
        );
        let runaway = PositionDescriptor {
            index: 4,
            empty_run: 7,
            kind: BoundaryKind::BeforeAtomic,
        };
        assert_eq!(runaway.decode(&tree), Some(Boundary::After(all[2])));
    }

    #[test]
    fn empty_text_runs_are_transparent() {
        let mut tree = parse_markup("<p>ab</p>").unwrap();
        let block = tree.children(tree.root())[0];
        let ab = tree.first_leaf(block).unwrap();
        let empty = tree.append_text(block, "");
        let descriptor =
            PositionDescriptor::encode(&tree, Boundary::Text { leaf: empty, offset: 0 }).unwrap();
        assert_eq!(descriptor, PositionDescriptor::inside(2));
        assert_eq!(descriptor.decode(&tree), Some(Boundary::Text { leaf: ab, offset: 2 }));
    }
}
