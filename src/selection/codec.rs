use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::tree::{DocumentTree, NodeId, NodeKind};

/// A position as the host sees it: a node plus either a char offset (text)
/// or a child index (elements).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LivePoint {
    pub node: NodeId,
    pub offset: usize,
}

impl LivePoint {
    pub fn new(node: NodeId, offset: usize) -> Self {
        Self { node, offset }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LiveSelection {
    pub anchor: LivePoint,
    pub focus: LivePoint,
}

impl LiveSelection {
    pub fn caret(point: LivePoint) -> Self {
        Self {
            anchor: point,
            focus: point,
        }
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }
}

/// A normalized selection endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Boundary {
    Text { leaf: NodeId, offset: usize },
    Before(NodeId),
    After(NodeId),
}

impl Boundary {
    pub fn node(&self) -> NodeId {
        match self {
            Boundary::Text { leaf, .. } => *leaf,
            Boundary::Before(node) | Boundary::After(node) => *node,
        }
    }

    pub fn is_after(&self) -> bool {
        matches!(self, Boundary::After(_))
    }

    /// Start of a leaf: offset 0 of a text run or before an atomic.
    pub fn start_of(tree: &DocumentTree, leaf: NodeId) -> Self {
        if tree.is_text(leaf) {
            Boundary::Text { leaf, offset: 0 }
        } else {
            Boundary::Before(leaf)
        }
    }

    /// End of a leaf: after its last char, or after an atomic.
    pub fn end_of(tree: &DocumentTree, leaf: NodeId) -> Self {
        if tree.is_text(leaf) {
            Boundary::Text {
                leaf,
                offset: tree.text_len(leaf),
            }
        } else {
            Boundary::After(leaf)
        }
    }
}

/// Resolves a live point to a boundary. `inclusive` points resolve
/// backwards, to the end of the node before the point. A point on an atomic
/// itself is before it at offset 0 and after it otherwise.
pub fn normalize(tree: &DocumentTree, point: LivePoint, inclusive: bool) -> Option<Boundary> {
    let LivePoint { node, offset } = point;
    if !tree.contains(node) {
        debug_assert!(false, "live point {node} is not attached");
        return None;
    }
    match tree.kind(node) {
        NodeKind::Text(_) => Some(Boundary::Text {
            leaf: node,
            offset: offset.min(tree.text_len(node)),
        }),
        NodeKind::Atomic(_) => Some(if offset > 0 {
            Boundary::After(node)
        } else {
            Boundary::Before(node)
        }),
        NodeKind::Element(_) => {
            let children = tree.children(node);
            if children.is_empty() {
                return resolve_empty(tree, node);
            }
            let backward = if inclusive {
                offset > 0
            } else {
                offset >= children.len()
            };
            if backward {
                let target = children[offset.min(children.len()) - 1];
                resolve_backward(tree, target)
            } else {
                resolve_forward(tree, children[offset])
            }
        }
    }
}

fn resolve_forward(tree: &DocumentTree, target: NodeId) -> Option<Boundary> {
    if let Some(leaf) = tree.first_leaf(target) {
        return Some(Boundary::start_of(tree, leaf));
    }
    resolve_empty(tree, target)
}

fn resolve_backward(tree: &DocumentTree, target: NodeId) -> Option<Boundary> {
    if let Some(leaf) = tree.last_leaf(target) {
        return Some(Boundary::end_of(tree, leaf));
    }
    if let Some(leaf) = tree.prev_leaf(target, None) {
        return Some(Boundary::end_of(tree, leaf));
    }
    tree.next_leaf(target, None)
        .map(|leaf| Boundary::start_of(tree, leaf))
}

fn resolve_empty(tree: &DocumentTree, node: NodeId) -> Option<Boundary> {
    if node == tree.root() {
        return None;
    }
    if let Some(leaf) = tree.next_leaf(node, None) {
        return Some(Boundary::start_of(tree, leaf));
    }
    tree.prev_leaf(node, None)
        .map(|leaf| Boundary::end_of(tree, leaf))
}

/// Turns a boundary back into a live point. `normalize` of the result with
/// `inclusive = boundary.is_after()` yields the boundary again.
pub fn denormalize(tree: &DocumentTree, boundary: Boundary) -> Option<LivePoint> {
    match boundary {
        Boundary::Text { leaf, offset } => Some(LivePoint::new(leaf, offset)),
        Boundary::Before(node) => {
            let parent = tree.parent(node)?;
            Some(LivePoint::new(parent, tree.index_in_parent(node)?))
        }
        Boundary::After(node) => {
            let parent = tree.parent(node)?;
            Some(LivePoint::new(parent, tree.index_in_parent(node)? + 1))
        }
    }
}

/// Document order of two live points.
pub fn compare_points(tree: &DocumentTree, a: LivePoint, b: LivePoint) -> Ordering {
    point_key(tree, a).cmp(&point_key(tree, b))
}

/// Document order of two boundaries; boundaries at the same spot compare
/// equal even if they name different nodes.
pub fn compare_boundaries(tree: &DocumentTree, a: Boundary, b: Boundary) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }
    match (denormalize(tree, a), denormalize(tree, b)) {
        (Some(a), Some(b)) => compare_points(tree, a, b),
        _ => Ordering::Equal,
    }
}

fn point_key(tree: &DocumentTree, point: LivePoint) -> Vec<usize> {
    let mut key = tree.path_from_root(point.node);
    key.push(point.offset);
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::parse_markup;
    use pretty_assertions::assert_eq;

    fn block(tree: &DocumentTree, idx: usize) -> NodeId {
        tree.children(tree.root())[idx]
    }

    #[test]
    fn text_points_pass_through() {
        let tree = parse_markup("<p>hello</p>").unwrap();
        let leaf = tree.first_leaf(block(&tree, 0)).unwrap();
        assert_eq!(
            normalize(&tree, LivePoint::new(leaf, 3), false),
            Some(Boundary::Text { leaf, offset: 3 })
        );
        assert_eq!(
            normalize(&tree, LivePoint::new(leaf, 30), true),
            Some(Boundary::Text { leaf, offset: 5 })
        );
    }

    #[test]
    fn element_points_resolve_to_atomics_and_leaves() {
        let tree = parse_markup("<p>ab<br/><b>cd</b></p>").unwrap();
        let p = block(&tree, 0);
        let text = tree.children(p)[0];
        let br = tree.children(p)[1];
        let bold_text = tree.first_leaf(tree.children(p)[2]).unwrap();

        assert_eq!(
            normalize(&tree, LivePoint::new(p, 1), false),
            Some(Boundary::Before(br))
        );
        assert_eq!(
            normalize(&tree, LivePoint::new(p, 2), true),
            Some(Boundary::After(br))
        );
        assert_eq!(
            normalize(&tree, LivePoint::new(p, 1), true),
            Some(Boundary::Text { leaf: text, offset: 2 })
        );
        assert_eq!(
            normalize(&tree, LivePoint::new(p, 2), false),
            Some(Boundary::Text { leaf: bold_text, offset: 0 })
        );
    }

    #[test]
    fn inclusive_point_past_the_end_lands_after_the_last_leaf() {
        let tree = parse_markup("<p>ab<b>cd</b></p>").unwrap();
        let p = block(&tree, 0);
        let last = tree.last_leaf(p).unwrap();
        assert_eq!(
            normalize(&tree, LivePoint::new(p, 99), true),
            Some(Boundary::Text { leaf: last, offset: 2 })
        );
        assert_eq!(
            normalize(&tree, LivePoint::new(p, 2), false),
            Some(Boundary::Text { leaf: last, offset: 2 })
        );
    }

    #[test]
    fn live_selections_serialize() {
        let tree = parse_markup("<p>abc</p>").unwrap();
        let leaf = tree.first_leaf(block(&tree, 0)).unwrap();
        let live = LiveSelection {
            anchor: LivePoint::new(leaf, 1),
            focus: LivePoint::new(leaf, 3),
        };
        let stored = toml::to_string(&live).unwrap();
        let restored: LiveSelection = toml::from_str(&stored).unwrap();
        assert_eq!(restored, live);
    }

    #[test]
    fn points_on_an_atomic_use_their_offset() {
        let tree = parse_markup("<p>a<br/>b</p>").unwrap();
        let br = tree.children(block(&tree, 0))[1];
        for inclusive in [false, true] {
            assert_eq!(
                normalize(&tree, LivePoint::new(br, 0), inclusive),
                Some(Boundary::Before(br))
            );
            assert_eq!(
                normalize(&tree, LivePoint::new(br, 1), inclusive),
                Some(Boundary::After(br))
            );
        }
    }

    #[test]
    fn zero_offset_inclusive_falls_back_to_forward() {
        let tree = parse_markup("<p><br/>x</p>").unwrap();
        let p = block(&tree, 0);
        let br = tree.children(p)[0];
        assert_eq!(
            normalize(&tree, LivePoint::new(p, 0), true),
            Some(Boundary::Before(br))
        );
    }

    #[test]
    fn denormalize_is_a_left_inverse() {
        let tree = parse_markup("<p>a<br/><img src=\"x\"/><i>b</i></p><p><br/></p>").unwrap();
        let mut boundaries = Vec::new();
        let mut leaf = tree.first_leaf(tree.root());
        while let Some(id) = leaf {
            if tree.is_text(id) {
                for offset in 0..=tree.text_len(id) {
                    boundaries.push(Boundary::Text { leaf: id, offset });
                }
            } else {
                boundaries.push(Boundary::Before(id));
                boundaries.push(Boundary::After(id));
            }
            leaf = tree.next_leaf(id, None);
        }
        for boundary in boundaries {
            let point = denormalize(&tree, boundary).unwrap();
            assert_eq!(
                normalize(&tree, point, boundary.is_after()),
                Some(boundary),
                "{boundary:?}"
            );
        }
    }

    #[test]
    fn points_compare_in_document_order() {
        let tree = parse_markup("<p>ab<b>cd</b></p><p>ef</p>").unwrap();
        let p = block(&tree, 0);
        let ab = tree.children(p)[0];
        let cd = tree.first_leaf(tree.children(p)[1]).unwrap();
        let ef = tree.first_leaf(block(&tree, 1)).unwrap();

        assert_eq!(
            compare_points(&tree, LivePoint::new(ab, 2), LivePoint::new(cd, 0)),
            Ordering::Less
        );
        assert_eq!(
            compare_points(&tree, LivePoint::new(p, 1), LivePoint::new(cd, 0)),
            Ordering::Less
        );
        assert_eq!(
            compare_points(&tree, LivePoint::new(p, 2), LivePoint::new(cd, 2)),
            Ordering::Greater
        );
        assert_eq!(
            compare_points(&tree, LivePoint::new(ef, 0), LivePoint::new(ab, 1)),
            Ordering::Greater
        );
    }
}
