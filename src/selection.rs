use std::cmp::Ordering;
use std::ops::Range;

pub mod codec;
pub mod descriptor;
pub mod split;

pub use codec::{Boundary, LivePoint, LiveSelection};
pub use descriptor::{BoundaryKind, PositionDescriptor, SpanDescriptor};

use crate::tree::{DocumentTree, NodeId, Tag};

/// An ordered pair of boundaries. Live ids inside it are only valid until
/// the tree changes; use [`SelectionSpan::serialize`] to carry a selection
/// across an edit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SelectionSpan {
    start: Boundary,
    end: Boundary,
}

impl SelectionSpan {
    /// Builds a span from two boundaries in any order. Distinct boundaries
    /// at the same position (after one atomic and before the next) are
    /// ordered by their leaves, so the start never follows the end.
    pub fn new(tree: &DocumentTree, a: Boundary, b: Boundary) -> Self {
        let order = match codec::compare_boundaries(tree, a, b) {
            Ordering::Equal if a != b => tree.tree_order(a.node(), b.node()),
            order => order,
        };
        if order == Ordering::Greater {
            Self { start: b, end: a }
        } else {
            Self { start: a, end: b }
        }
    }

    pub fn caret(boundary: Boundary) -> Self {
        Self {
            start: boundary,
            end: boundary,
        }
    }

    /// Span from the first to the last content leaf below `node`.
    pub fn covering(tree: &DocumentTree, node: NodeId) -> Option<Self> {
        let first = tree.first_content_leaf(node)?;
        let last = tree.last_content_leaf(node)?;
        Some(Self {
            start: Boundary::start_of(tree, first),
            end: Boundary::end_of(tree, last),
        })
    }

    pub fn start(&self) -> Boundary {
        self.start
    }

    pub fn end(&self) -> Boundary {
        self.end
    }

    /// A span covering no characters: a caret, or a span resting on a
    /// single atomic (see [`SelectionSpan::empty_body`]).
    pub fn is_collapsed(&self) -> bool {
        self.is_caret() || self.empty_body().is_some()
    }

    /// Both ends at the same boundary.
    pub fn is_caret(&self) -> bool {
        self.start == self.end
    }

    /// Collapsed span on `atomic`. It keeps the boundaries on both sides so
    /// commands can still remove or replace the atomic.
    pub fn on_atomic(atomic: NodeId) -> Self {
        Self {
            start: Boundary::Before(atomic),
            end: Boundary::After(atomic),
        }
    }

    /// The atomic this span rests on, if any.
    pub fn empty_body(&self) -> Option<NodeId> {
        match (self.start, self.end) {
            (Boundary::Before(a), Boundary::After(b)) if a == b => Some(a),
            _ => None,
        }
    }

    /// Whether the start leaf comes after the end leaf. Spans built through
    /// [`SelectionSpan::new`] never are; forward leaf walks check it so a
    /// hand-built span cannot send them to the end of the document.
    pub fn is_reversed(&self, tree: &DocumentTree) -> bool {
        tree.tree_order(self.start.node(), self.end.node()) == Ordering::Greater
    }

    pub fn from_live_selection(tree: &DocumentTree, live: &LiveSelection) -> Option<Self> {
        if live.is_collapsed() {
            return codec::normalize(tree, live.anchor, false).map(Self::caret);
        }
        let (first, second) =
            if codec::compare_points(tree, live.anchor, live.focus) == Ordering::Greater {
                (live.focus, live.anchor)
            } else {
                (live.anchor, live.focus)
            };
        let start = codec::normalize(tree, first, false)?;
        let end = codec::normalize(tree, second, true)?;
        Some(Self::new(tree, start, end))
    }

    pub fn to_live_selection(&self, tree: &DocumentTree) -> Option<LiveSelection> {
        let anchor = codec::denormalize(tree, self.start)?;
        if self.is_caret() {
            return Some(LiveSelection::caret(anchor));
        }
        let focus = codec::denormalize(tree, self.end)?;
        Some(LiveSelection { anchor, focus })
    }

    /// Installs the span as the live selection. Returns `false` when it was
    /// already active or cannot be expressed as live points.
    pub fn activate(&self, tree: &DocumentTree, live: &mut Option<LiveSelection>) -> bool {
        if let Some(current) = live {
            if Self::from_live_selection(tree, current) == Some(*self) {
                return false;
            }
        }
        match self.to_live_selection(tree) {
            Some(selection) => {
                *live = Some(selection);
                true
            }
            None => false,
        }
    }

    pub fn serialize(&self, tree: &DocumentTree) -> Option<SpanDescriptor> {
        let start = PositionDescriptor::encode(tree, self.start)?;
        if self.is_caret() {
            return Some(SpanDescriptor::caret(start));
        }
        let end = PositionDescriptor::encode(tree, self.end)?;
        Some(SpanDescriptor { start, end })
    }

    pub fn deserialize(tree: &DocumentTree, descriptor: &SpanDescriptor) -> Option<Self> {
        let start = descriptor.start.decode(tree)?;
        if descriptor.is_collapsed() {
            return Some(Self::caret(start));
        }
        let end = descriptor.end.decode(tree)?;
        Some(Self::new(tree, start, end))
    }

    /// One sub-span per line the span touches, in document order.
    pub fn split_line(&self, tree: &DocumentTree) -> Vec<SelectionSpan> {
        let lines = tree.lines();
        let first = tree.line_of(self.start.node());
        let last = tree.line_of(self.end.node());
        let (Some(first), Some(last)) = (
            first.and_then(|line| lines.iter().position(|l| *l == line)),
            last.and_then(|line| lines.iter().position(|l| *l == line)),
        ) else {
            return vec![*self];
        };
        if first >= last {
            return vec![*self];
        }

        let mut spans = Vec::with_capacity(last - first + 1);
        for (idx, line) in lines[first..=last].iter().enumerate() {
            let start = if idx == 0 {
                self.start
            } else {
                let Some(leaf) = tree.first_content_leaf(*line) else {
                    continue;
                };
                Boundary::start_of(tree, leaf)
            };
            let end = if first + idx == last {
                self.end
            } else {
                let Some(leaf) = tree.last_content_leaf(*line) else {
                    continue;
                };
                Boundary::end_of(tree, leaf)
            };
            spans.push(SelectionSpan { start, end });
        }
        if spans.is_empty() {
            spans.push(*self);
        }
        spans
    }

    /// Top-level blocks the span touches. Inside a single list item, the
    /// item's own children are returned instead.
    pub fn get_all_top_elements(&self, tree: &DocumentTree) -> Vec<NodeId> {
        let common = tree.common_ancestor(self.start.node(), self.end.node());
        let scope = tree
            .find_ancestor(common, None, |tree, id| tree.tag(id) == Some(Tag::ListItem))
            .unwrap_or(tree.root());
        let child_of_scope = |node: NodeId| {
            std::iter::once(node)
                .chain(tree.ancestors(node))
                .find(|candidate| tree.parent(*candidate) == Some(scope))
        };
        let (Some(first), Some(last)) = (
            child_of_scope(self.start.node()),
            child_of_scope(self.end.node()),
        ) else {
            return Vec::new();
        };
        let children = tree.children(scope);
        let (Some(from), Some(to)) = (
            children.iter().position(|child| *child == first),
            children.iter().position(|child| *child == last),
        ) else {
            return Vec::new();
        };
        children[from..=to].to_vec()
    }

    /// Splits the tree along both boundaries up to `limit` (default: the
    /// lowest common element) and returns that ancestor with the range of
    /// its children that lie inside the span.
    pub fn extract_contents(
        &self,
        tree: &mut DocumentTree,
        limit: Option<NodeId>,
    ) -> Option<(NodeId, Range<usize>)> {
        let ancestor = match limit {
            Some(limit) => limit,
            None => self.split_ancestor(tree)?,
        };
        let (from, to) = split::isolate(tree, self.start, self.end, ancestor)?;
        Some((ancestor, from..to))
    }

    /// Moves the span's content into `container`, which must be a detached
    /// element of the same tree. Returns the span covering the wrapped
    /// content after normalization.
    pub fn surround_contents(
        &self,
        tree: &mut DocumentTree,
        container: NodeId,
        limit: Option<NodeId>,
    ) -> Option<SelectionSpan> {
        if self.is_caret() || self.is_reversed(tree) {
            return None;
        }
        if let Some(leaf) = self.exact_text_leaf(tree) {
            tree.insert_before(leaf, container);
            tree.append_child(container, leaf);
            return Some(SelectionSpan {
                start: Boundary::Text { leaf, offset: 0 },
                end: Boundary::end_of(tree, leaf),
            });
        }

        let (ancestor, range) = self.extract_contents(tree, limit)?;
        if range.is_empty() {
            tree.normalize(ancestor);
            return None;
        }
        let moved = tree.children(ancestor)[range.clone()].to_vec();
        tree.insert_child(ancestor, range.start, container);
        for node in moved {
            tree.append_child(container, node);
        }

        let wrapped = SelectionSpan::covering(tree, container)?.serialize(tree)?;
        tree.normalize(ancestor);
        SelectionSpan::deserialize(tree, &wrapped)
    }

    /// Plain text covered by the span.
    pub fn text(&self, tree: &DocumentTree) -> String {
        let mut out = String::new();
        if self.is_reversed(tree) {
            return out;
        }
        let mut leaf = Some(self.start.node());
        while let Some(id) = leaf {
            if let Some(text) = tree.text(id) {
                let from = match self.start {
                    Boundary::Text { leaf, offset } if leaf == id => offset,
                    _ => 0,
                };
                let to = match self.end {
                    Boundary::Text { leaf, offset } if leaf == id => offset,
                    _ => usize::MAX,
                };
                out.extend(text.chars().skip(from).take(to.saturating_sub(from)));
            }
            if id == self.end.node() {
                break;
            }
            leaf = tree.next_leaf(id, None);
        }
        out
    }

    fn exact_text_leaf(&self, tree: &DocumentTree) -> Option<NodeId> {
        match (self.start, self.end) {
            (Boundary::Text { leaf: a, offset: 0 }, Boundary::Text { leaf: b, offset })
                if a == b && offset > 0 && offset == tree.text_len(a) =>
            {
                Some(a)
            }
            _ => None,
        }
    }

    fn split_ancestor(&self, tree: &DocumentTree) -> Option<NodeId> {
        let common = tree.common_ancestor(self.start.node(), self.end.node());
        let common = if tree.is_leaf(common) {
            tree.parent(common)?
        } else {
            common
        };
        if common == tree.root() {
            log::warn!("refusing to split the tree at the document root");
            return None;
        }
        Some(common)
    }
}

#[cfg(test)]
#[path = "selection_tests.rs"]
mod selection_tests;
