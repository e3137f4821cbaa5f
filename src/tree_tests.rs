use std::ops::ControlFlow;

use pretty_assertions::assert_eq;

use super::*;
use crate::markup::{parse_markup, to_markup};

fn tree(markup: &str) -> DocumentTree {
    parse_markup(markup).expect("valid markup")
}

fn leaves(tree: &DocumentTree) -> Vec<NodeId> {
    let mut out = Vec::new();
    tree.walk(tree.root(), true, true, None, |id| {
        if tree.is_leaf(id) {
            out.push(id);
        }
        ControlFlow::<()>::Continue(())
    });
    out
}

#[test]
fn first_and_last_leaf_descend_into_containers() {
    let tree = tree("<p><b><i>a</i>b</b><br/>c</p>");
    let block = tree.children(tree.root())[0];
    let first = tree.first_leaf(block).unwrap();
    let last = tree.last_leaf(block).unwrap();
    assert_eq!(tree.text(first), Some("a"));
    assert_eq!(tree.text(last), Some("c"));
}

#[test]
fn last_leaf_skips_empty_trailing_containers() {
    let mut tree = tree("<p>a</p>");
    let block = tree.children(tree.root())[0];
    tree.append_element(block, Element::new(Tag::Bold));
    let last = tree.last_leaf(block).unwrap();
    assert_eq!(tree.text(last), Some("a"));
}

#[test]
fn next_and_prev_leaf_cross_block_boundaries() {
    let tree = tree("<p>one</p><p><br/></p><p>two</p>");
    let all = leaves(&tree);
    assert_eq!(all.len(), 3);
    assert_eq!(tree.next_leaf(all[0], None), Some(all[1]));
    assert_eq!(tree.next_leaf(all[1], None), Some(all[2]));
    assert_eq!(tree.next_leaf(all[2], None), None);
    assert_eq!(tree.prev_leaf(all[2], None), Some(all[1]));
    assert_eq!(tree.prev_leaf(all[0], None), None);
}

#[test]
fn leaf_search_respects_limit() {
    let tree = tree("<p>one</p><p>two</p>");
    let first_block = tree.children(tree.root())[0];
    let leaf = tree.first_leaf(first_block).unwrap();
    assert_eq!(tree.next_leaf(leaf, Some(first_block)), None);
    assert!(tree.next_leaf(leaf, None).is_some());
}

#[test]
fn next_leaf_of_container_skips_its_own_subtree() {
    let tree = tree("<p><b>x</b>y</p>");
    let block = tree.children(tree.root())[0];
    let bold = tree.children(block)[0];
    let next = tree.next_leaf(bold, None).unwrap();
    assert_eq!(tree.text(next), Some("y"));
}

#[test]
fn walk_backward_visits_in_reverse_preorder() {
    let tree = tree("<p>a<b>b</b></p><p>c</p>");
    let all = leaves(&tree);
    let mut seen = Vec::new();
    tree.walk(all[2], false, true, None, |id| {
        if let Some(text) = tree.text(id) {
            seen.push(text.to_string());
        }
        ControlFlow::<()>::Continue(())
    });
    assert_eq!(seen, vec!["c", "b", "a"]);
}

#[test]
fn walk_returns_the_first_break_value() {
    let tree = tree("<p>ab</p><p>cde</p>");
    let mut total = 0;
    let found = tree.walk(tree.root(), true, false, None, |id| {
        total += tree.text(id).map(|t| t.len()).unwrap_or(0);
        if total >= 5 {
            ControlFlow::Break(id)
        } else {
            ControlFlow::Continue(())
        }
    });
    let found = found.expect("enough text");
    assert_eq!(tree.text(found), Some("cde"));
    assert_eq!(total, 5);
}

#[test]
fn find_ancestor_includes_the_start_and_stops_at_the_limit() {
    let tree = tree("<p><b><i>x</i></b></p>");
    let leaf = leaves(&tree)[0];
    let bold = tree.find_ancestor(leaf, None, |t, id| t.tag(id) == Some(Tag::Bold));
    assert!(bold.is_some());
    let italic = tree.parent(leaf).unwrap();
    assert_eq!(
        tree.find_ancestor(italic, None, |t, id| t.tag(id) == Some(Tag::Italic)),
        Some(italic)
    );
    assert_eq!(
        tree.find_ancestor(leaf, bold, |t, id| t.tag(id) == Some(Tag::Bold)),
        None
    );
}

#[test]
fn common_ancestor_of_siblings_is_their_parent() {
    let tree = tree("<p><b>x</b><i>y</i></p><p>z</p>");
    let all = leaves(&tree);
    let block = tree.children(tree.root())[0];
    assert_eq!(tree.common_ancestor(all[0], all[1]), block);
    assert_eq!(tree.common_ancestor(all[0], all[2]), tree.root());
    assert_eq!(tree.common_ancestor(all[0], all[0]), all[0]);
}

#[test]
fn lines_flatten_lists_into_items() {
    let tree = tree("<p>a</p><ul><li>b</li><li>c</li></ul><ol><li>d</li></ol>");
    let lines: Vec<String> = tree
        .lines()
        .into_iter()
        .map(|line| tree.text_content(line))
        .collect();
    assert_eq!(lines, vec!["a", "b", "c", "d"]);
}

#[test]
fn line_of_finds_the_list_item() {
    let tree = tree("<ul><li><b>x</b></li></ul>");
    let leaf = leaves(&tree)[0];
    let line = tree.line_of(leaf).unwrap();
    assert_eq!(tree.tag(line), Some(Tag::ListItem));
}

#[test]
fn detached_nodes_are_not_contained() {
    let mut tree = tree("<p>a</p><p>b</p>");
    let second = tree.children(tree.root())[1];
    let leaf = tree.first_leaf(second).unwrap();
    assert!(tree.contains(leaf));
    tree.detach(second);
    assert!(!tree.contains(leaf));
    assert!(!tree.contains(second));
}

#[test]
fn split_text_counts_chars() {
    let mut tree = tree("<p>héllo</p>");
    let leaf = leaves(&tree)[0];
    let right = tree.split_text(leaf, 2).unwrap();
    assert_eq!(tree.text(leaf), Some("hé"));
    assert_eq!(tree.text(right), Some("llo"));
    assert_eq!(tree.next_sibling(leaf), Some(right));
}

#[test]
fn unwrap_splices_children_in_place() {
    let mut tree = tree("<p>a<b>b<i>c</i></b>d</p>");
    let block = tree.children(tree.root())[0];
    let bold = tree.children(block)[1];
    assert!(tree.unwrap(bold));
    assert_eq!(to_markup(&tree), "<p>ab<i>c</i>d</p>");
}

#[test]
fn normalize_prunes_and_merges() {
    let mut tree = tree("<p>a<b>b</b><b>c</b><i></i>d</p>");
    let block = tree.children(tree.root())[0];
    tree.append_text(block, "");
    tree.append_text(block, "e");
    tree.normalize(tree.root());
    assert_eq!(to_markup(&tree), "<p>a<b>bc</b>de</p>");
}

#[test]
fn normalize_keeps_styles_with_different_attributes_apart() {
    let mut tree = tree(
        "<p><span color=\"red\">a</span><span color=\"blue\">b</span><span color=\"blue\">c</span></p>",
    );
    tree.normalize(tree.root());
    assert_eq!(
        to_markup(&tree),
        "<p><span color=\"red\">a</span><span color=\"blue\">bc</span></p>"
    );
}

#[test]
fn normalize_gives_emptied_blocks_a_placeholder() {
    let mut tree = tree("<p><b>x</b></p><ul><li>y</li></ul>");
    let leaf = leaves(&tree)[0];
    tree.text_mut(leaf).unwrap().clear();
    let item = tree.lines()[1];
    tree.detach(item);
    tree.normalize(tree.root());
    assert_eq!(to_markup(&tree), "<p><br/></p>");
}

#[test]
fn normalize_joins_adjacent_lists_of_the_same_kind() {
    let mut tree = tree("<ul><li>a</li></ul><ul><li>b</li></ul><ol><li>c</li></ol>");
    tree.normalize(tree.root());
    assert_eq!(
        to_markup(&tree),
        "<ul><li>a</li><li>b</li></ul><ol><li>c</li></ol>"
    );
}

#[test]
fn empty_tree_is_initialized_with_a_paragraph() {
    let mut tree = DocumentTree::new();
    tree.ensure_initialized();
    assert_eq!(to_markup(&tree), "<p><br/></p>");
    let br = tree.first_leaf(tree.root()).unwrap();
    assert!(tree.is_placeholder(br));
}
