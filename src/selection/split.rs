use super::codec::Boundary;
use crate::tree::{DocumentTree, NodeId};

/// A position between two children of `parent`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cut {
    pub parent: NodeId,
    pub index: usize,
}

/// Outcome of splitting the tree along a boundary up to an ancestor.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SplitPath {
    /// Child index in the ancestor where the cut ended up.
    pub index: usize,
    /// Right-hand clones, innermost first. The last one, if any, is a
    /// direct child of the ancestor.
    pub clones: Vec<NodeId>,
}

/// Turns a boundary into a cut between siblings, splitting a text run when
/// the boundary falls strictly inside it.
pub fn cut_at(tree: &mut DocumentTree, boundary: Boundary) -> Option<Cut> {
    let node = boundary.node();
    let parent = tree.parent(node)?;
    let idx = tree.index_in_parent(node)?;
    let index = match boundary {
        Boundary::Text { leaf, offset } => {
            let len = tree.text_len(leaf);
            if offset == 0 {
                idx
            } else if offset >= len {
                idx + 1
            } else {
                tree.split_text(leaf, offset)?;
                idx + 1
            }
        }
        Boundary::Before(_) => idx,
        Boundary::After(_) => idx + 1,
    };
    Some(Cut { parent, index })
}

/// Splits every element between the boundary and `ancestor` in two, so
/// that the boundary becomes a cut between two children of `ancestor`.
///
/// The path is planned first without touching the tree; the clones are
/// created afterwards, innermost first.
pub fn split_to_ancestor(
    tree: &mut DocumentTree,
    boundary: Boundary,
    ancestor: NodeId,
) -> Option<SplitPath> {
    let cut = cut_at(tree, boundary)?;
    if !tree.is_ancestor(ancestor, cut.parent) {
        debug_assert!(false, "{} is not below {ancestor}", cut.parent);
        return None;
    }

    let mut plan: Vec<(NodeId, usize)> = Vec::new();
    let mut node = cut.parent;
    let mut index = cut.index;
    let mut split_below = false;
    while node != ancestor {
        let parent = tree.parent(node)?;
        let position = tree.index_in_parent(node)?;
        let len = tree.children(node).len() + usize::from(split_below);
        split_below = index > 0 && index < len;
        if split_below {
            plan.push((node, index));
            index = position + 1;
        } else if index == 0 {
            index = position;
        } else {
            index = position + 1;
        }
        node = parent;
    }

    let mut clones = Vec::with_capacity(plan.len());
    for (node, index) in plan {
        let clone = tree.clone_shallow(node);
        tree.move_children_from(node, index, clone);
        tree.insert_after(node, clone);
        clones.push(clone);
    }
    Some(SplitPath { index, clones })
}

/// Splits along both boundaries and returns the child range of `ancestor`
/// lying between them.
pub fn isolate(
    tree: &mut DocumentTree,
    start: Boundary,
    end: Boundary,
    ancestor: NodeId,
) -> Option<(usize, usize)> {
    let end_path = split_to_ancestor(tree, end, ancestor)?;
    let right = tree.children(ancestor).get(end_path.index).copied();
    let start_path = split_to_ancestor(tree, start, ancestor)?;
    let end_index = match right {
        Some(node) => tree.index_in_parent(node)?,
        None => tree.children(ancestor).len(),
    };
    Some((start_path.index, end_index.max(start_path.index)))
}
