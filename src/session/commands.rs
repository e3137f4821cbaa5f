//! Editing commands. Every mutating command runs inside
//! [`EditorSession::record`] and leaves a caret or selection behind.

use std::ops::ControlFlow;

use crate::error::EditError;
use crate::format::{BlockStyle, InlineStyle, StyleDescriptor};
use crate::markup::parse_fragment;
use crate::selection::codec::{self, LiveSelection};
use crate::selection::split;
use crate::selection::{Boundary, PositionDescriptor, SelectionSpan};
use crate::tree::{Atomic, CHECKED_ATTR, DocumentTree, Element, NodeId, Tag};

use super::EditorSession;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Left,
    Right,
    Up,
    Down,
    LineStart,
    LineEnd,
}

impl EditorSession {
    // ------------------------------------------------------------------
    // Text
    // ------------------------------------------------------------------

    /// Replaces the selection with `text`.
    pub fn insert_text(&mut self, text: &str) -> Result<bool, EditError> {
        if text.is_empty() {
            return Ok(false);
        }
        self.record(|session| {
            let caret = session.collapse_selection()?;
            let (leaf, offset) = session.text_target(caret);
            session.tree.insert_text_at(leaf, offset, text);
            session.set_caret(Boundary::Text {
                leaf,
                offset: offset + text.chars().count(),
            });
            Ok(true)
        })
    }

    /// Inserts a soft line break inside the current line.
    pub fn insert_line_break(&mut self) -> Result<bool, EditError> {
        self.record(|session| {
            let caret = session.collapse_selection()?;
            let cut = split::cut_at(&mut session.tree, caret).ok_or(EditError::NoSelection)?;
            let br = session.tree.create_atomic(Atomic::LineBreak);
            session.tree.insert_child(cut.parent, cut.index, br);
            session.set_caret(Boundary::After(br));
            Ok(true)
        })
    }

    /// Splits the current line in two at the caret. Code blocks get a
    /// newline instead; an empty list item leaves its list.
    pub fn split_block(&mut self) -> Result<bool, EditError> {
        self.record(|session| {
            let caret = session.collapse_selection()?;
            let Some(line) = session.tree.line_of(caret.node()) else {
                return Ok(false);
            };
            let tag = session.tree.tag(line);
            if tag == Some(Tag::CodeBlock) {
                let (leaf, offset) = session.text_target(caret);
                session.tree.insert_text_at(leaf, offset, "\n");
                session.set_caret(Boundary::Text {
                    leaf,
                    offset: offset + 1,
                });
                return Ok(true);
            }
            if tag == Some(Tag::ListItem) && is_empty_line(&session.tree, line) {
                lift_list_item(&mut session.tree, line, Tag::Paragraph);
                let start = line_start(&session.tree, line).ok_or(EditError::NoSelection)?;
                session.set_caret(start);
                return Ok(true);
            }

            let container = session.tree.parent(line).ok_or(EditError::NoSelection)?;
            let line_index = session.tree.index_in_parent(line).ok_or(EditError::NoSelection)?;
            let path = split::split_to_ancestor(&mut session.tree, caret, container)
                .ok_or(EditError::NoSelection)?;
            let clone = path
                .clones
                .last()
                .copied()
                .filter(|clone| session.tree.parent(*clone) == Some(container));

            let next_line = match clone {
                Some(clone) => clone,
                None if path.index <= line_index => {
                    // Caret at the very start: open an empty line above.
                    let element = fresh_line_element(&session.tree, line);
                    let fresh = session.tree.create_element(element);
                    session.tree.insert_child(container, path.index, fresh);
                    session.tree.append_atomic(fresh, Atomic::LineBreak);
                    return Ok(true);
                }
                None => {
                    let fresh = session.continuation_of(line);
                    session.tree.insert_child(container, path.index, fresh);
                    fresh
                }
            };
            let start = ensure_line_content(&mut session.tree, next_line);
            ensure_line_content(&mut session.tree, line);
            session.set_caret(start);
            Ok(true)
        })
    }

    /// Removes the selection, or the character before the caret. At the
    /// start of a line the line is joined onto the previous one.
    pub fn delete_backward(&mut self) -> Result<bool, EditError> {
        self.record(|session| {
            let span = session.selection().ok_or(EditError::NoSelection)?;
            if !span.is_caret() {
                let caret = session.delete_span(span).ok_or(EditError::NoSelection)?;
                session.set_caret(caret);
                return Ok(true);
            }
            Ok(session.delete_before(span.start()))
        })
    }

    pub fn delete_selection(&mut self) -> Result<bool, EditError> {
        self.record(|session| {
            let span = session.selection().ok_or(EditError::NoSelection)?;
            if span.is_caret() {
                return Ok(false);
            }
            let caret = session.delete_span(span).ok_or(EditError::NoSelection)?;
            session.set_caret(caret);
            Ok(true)
        })
    }

    /// Inserts serialized markup at the caret. Block content splits the
    /// current top-level block; inline content is spliced into the line.
    pub fn insert_fragment(&mut self, markup: &str) -> Result<bool, EditError> {
        let fragment = parse_fragment(markup)?;
        let roots = fragment.children(fragment.root()).to_vec();
        if roots.is_empty() {
            return Ok(false);
        }
        let block_level = roots
            .iter()
            .any(|node| fragment.tag(*node).is_some_and(Tag::is_top_level));

        self.record(|session| {
            let caret = session.collapse_selection()?;
            let empty_line = session
                .tree
                .is_placeholder(caret.node())
                .then(|| session.tree.line_of(caret.node()))
                .flatten();
            let tree = &mut session.tree;

            let mut inserted = Vec::new();
            if block_level {
                let root = tree.root();
                let path = split::split_to_ancestor(tree, caret, root).ok_or(EditError::NoSelection)?;
                let mut at = path.index;
                let mut pending_inline: Option<NodeId> = None;
                for node in roots {
                    if fragment.tag(node).is_some_and(Tag::is_top_level) {
                        pending_inline = None;
                        let copy = tree.import_subtree(&fragment, node);
                        tree.insert_child(root, at, copy);
                        at += 1;
                        inserted.push(copy);
                    } else {
                        let paragraph = match pending_inline {
                            Some(paragraph) => paragraph,
                            None => {
                                let paragraph = tree.create_element(Element::new(Tag::Paragraph));
                                tree.insert_child(root, at, paragraph);
                                at += 1;
                                inserted.push(paragraph);
                                pending_inline = Some(paragraph);
                                paragraph
                            }
                        };
                        let copy = tree.import_subtree(&fragment, node);
                        tree.append_child(paragraph, copy);
                    }
                }
            } else {
                let cut = split::cut_at(tree, caret).ok_or(EditError::NoSelection)?;
                for (offset, node) in roots.into_iter().enumerate() {
                    let copy = tree.import_subtree(&fragment, node);
                    tree.insert_child(cut.parent, cut.index + offset, copy);
                    inserted.push(copy);
                }
            }

            if let Some(line) = empty_line {
                if block_level {
                    tree.detach(line);
                } else {
                    tree.detach(caret.node());
                }
            }
            let caret = inserted
                .iter()
                .rev()
                .find_map(|node| tree.last_content_leaf(*node))
                .map(|leaf| Boundary::end_of(tree, leaf));
            if let Some(caret) = caret {
                session.set_caret(caret);
            }
            Ok(true)
        })
    }

    // ------------------------------------------------------------------
    // Styles
    // ------------------------------------------------------------------

    /// Removes `style` if the whole selection carries it, applies it
    /// otherwise.
    pub fn toggle_inline_style(&mut self, style: InlineStyle) -> Result<bool, EditError> {
        let Some(descriptor) = self.formats.descriptor(&style.clone().into()) else {
            log::warn!("no format registered for {style}");
            return Ok(false);
        };
        let span = self.selection().ok_or(EditError::NoSelection)?;
        if span.is_collapsed() {
            return Ok(false);
        }
        if self.is_styled(&span, &descriptor) {
            self.remove_inline_style(style)
        } else {
            self.apply_inline_style(style)
        }
    }

    pub fn apply_inline_style(&mut self, style: InlineStyle) -> Result<bool, EditError> {
        self.restyle(style, true)
    }

    pub fn remove_inline_style(&mut self, style: InlineStyle) -> Result<bool, EditError> {
        self.restyle(style, false)
    }

    /// Whether every character in `span` carries `style`.
    pub fn has_inline_style(&self, style: &InlineStyle) -> bool {
        let (Some(span), Some(descriptor)) = (
            self.selection(),
            self.formats.descriptor(&style.clone().into()),
        ) else {
            return false;
        };
        self.is_styled(&span, &descriptor)
    }

    fn restyle(&mut self, style: InlineStyle, apply: bool) -> Result<bool, EditError> {
        let Some(descriptor) = self.formats.descriptor(&style.clone().into()) else {
            log::warn!("no format registered for {style}");
            return Ok(false);
        };
        self.record(|session| {
            let span = session.selection().ok_or(EditError::NoSelection)?;
            if span.is_collapsed() {
                return Ok(false);
            }
            let saved = span.serialize(&session.tree);
            let before = session.content();

            for part in span.split_line(&session.tree) {
                if part.is_collapsed() {
                    continue;
                }
                let Some(part) = session.strip_style(part, &descriptor) else {
                    continue;
                };
                if apply {
                    let container = descriptor.build(&mut session.tree);
                    part.surround_contents(&mut session.tree, container, None);
                }
            }

            session.restore_selection(saved.as_ref());
            Ok(session.content() != before)
        })
    }

    /// Unwraps every element carrying `descriptor`'s style inside `part`,
    /// splitting styled ancestors so content outside `part` keeps them.
    fn strip_style(
        &mut self,
        part: SelectionSpan,
        descriptor: &StyleDescriptor,
    ) -> Option<SelectionSpan> {
        let tree = &mut self.tree;
        let saved = part.serialize(tree)?;
        let line = tree.line_of(part.start().node())?;
        let common = tree.common_ancestor(part.start().node(), part.end().node());
        let highest = {
            let tree: &DocumentTree = tree;
            std::iter::once(common)
                .chain(tree.ancestors(common))
                .take_while(|node| *node != line)
                .filter(|node| descriptor.matches(tree, *node))
                .last()
        };
        let limit = match highest {
            Some(styled) => tree.parent(styled)?,
            None if tree.is_leaf(common) => tree.parent(common)?,
            None => common,
        };

        let (ancestor, range) = part.extract_contents(tree, Some(limit))?;
        let isolated = tree.children(ancestor)[range].to_vec();
        for node in isolated {
            let mut subtree = Vec::new();
            tree.walk(node, true, true, Some(node), |id| {
                subtree.push(id);
                ControlFlow::<()>::Continue(())
            });
            for id in subtree {
                if descriptor.matches(tree, id) {
                    tree.unwrap(id);
                }
            }
        }
        tree.normalize(ancestor);
        SelectionSpan::deserialize(tree, &saved)
    }

    fn is_styled(&self, span: &SelectionSpan, descriptor: &StyleDescriptor) -> bool {
        let tree = &self.tree;
        if span.is_reversed(tree) {
            return false;
        }
        let mut covered_any = false;
        let mut leaf = Some(span.start().node());
        while let Some(id) = leaf {
            let len = tree.text_len(id);
            if tree.is_text(id) && len > 0 {
                let from = match span.start() {
                    Boundary::Text { leaf, offset } if leaf == id => offset,
                    _ => 0,
                };
                let to = match span.end() {
                    Boundary::Text { leaf, offset } if leaf == id => offset,
                    _ => len,
                };
                if from < to {
                    covered_any = true;
                    let styled = tree
                        .find_ancestor(id, None, |tree, node| descriptor.matches(tree, node))
                        .is_some();
                    if !styled {
                        return false;
                    }
                }
            }
            if id == span.end().node() {
                break;
            }
            leaf = tree.next_leaf(id, None);
        }
        covered_any
    }

    /// Retags every line the selection touches. List items leave their
    /// list.
    pub fn set_block_style(&mut self, style: BlockStyle) -> Result<bool, EditError> {
        let tag = style.tag();
        self.record(|session| {
            let span = session.selection().ok_or(EditError::NoSelection)?;
            let saved = span.serialize(&session.tree);
            let mut changed = false;
            for part in span.split_line(&session.tree) {
                let Some(line) = session.tree.line_of(part.start().node()) else {
                    continue;
                };
                match session.tree.tag(line) {
                    Some(Tag::ListItem) => {
                        lift_list_item(&mut session.tree, line, tag);
                        changed = true;
                    }
                    Some(current) if current != tag => {
                        session.tree.set_tag(line, tag);
                        changed = true;
                    }
                    _ => {}
                }
            }
            session.restore_selection(saved.as_ref());
            Ok(changed)
        })
    }

    /// Block style of the line holding the selection start.
    pub fn current_block_style(&self) -> Option<BlockStyle> {
        let span = self.selection()?;
        let line = self.tree.line_of(span.start().node())?;
        BlockStyle::from_tag(self.tree.tag(line)?)
    }

    /// Wraps the touched blocks in a list, or takes the touched items out
    /// of one when they already form a list of that kind.
    pub fn toggle_list(&mut self, ordered: bool) -> Result<bool, EditError> {
        let list_tag = if ordered {
            Tag::OrderedList
        } else {
            Tag::UnorderedList
        };
        self.record(|session| {
            let span = session.selection().ok_or(EditError::NoSelection)?;
            let saved = span.serialize(&session.tree);
            let root = session.tree.root();
            let mut tops = span.get_all_top_elements(&session.tree);
            if tops.first().and_then(|node| session.tree.parent(*node)) != Some(root) {
                tops = session
                    .tree
                    .top_level_of(span.start().node())
                    .into_iter()
                    .collect();
            }
            if tops.is_empty() {
                return Ok(false);
            }

            let tree = &mut session.tree;
            if tops.iter().all(|node| tree.tag(*node) == Some(list_tag)) {
                let items: Vec<NodeId> = span
                    .split_line(tree)
                    .iter()
                    .filter_map(|part| tree.line_of(part.start().node()))
                    .filter(|line| tree.tag(*line) == Some(Tag::ListItem))
                    .collect();
                for item in items {
                    lift_list_item(tree, item, Tag::Paragraph);
                }
            } else {
                let list = tree.create_element(Element::new(list_tag));
                tree.insert_before(tops[0], list);
                for top in tops {
                    if tree.tag(top).is_some_and(Tag::is_list) {
                        tree.move_children_from(top, 0, list);
                        tree.detach(top);
                    } else {
                        let item = tree.append_element(list, Element::new(Tag::ListItem));
                        tree.move_children_from(top, 0, item);
                        tree.detach(top);
                    }
                }
            }
            session.restore_selection(saved.as_ref());
            Ok(true)
        })
    }

    // ------------------------------------------------------------------
    // Selection and caret movement
    // ------------------------------------------------------------------

    pub fn select_all(&mut self) -> bool {
        let Some(span) = SelectionSpan::covering(&self.tree, self.tree.root()) else {
            return false;
        };
        self.set_selection(span)
    }

    /// Moves the selection focus. With `extend` the anchor stays put.
    pub fn move_caret(&mut self, direction: Direction, extend: bool) -> bool {
        let Some(live) = self.live else {
            return false;
        };
        if !self.tree.contains(live.anchor.node) || !self.tree.contains(live.focus.node) {
            return false;
        }
        let tree = &self.tree;
        let Some(focus) = codec::normalize(tree, live.focus, false) else {
            return false;
        };
        let target = match direction {
            Direction::Left => step_left(tree, focus),
            Direction::Right => step_right(tree, focus),
            Direction::Up => step_vertical(tree, focus, false),
            Direction::Down => step_vertical(tree, focus, true),
            Direction::LineStart => tree.line_of(focus.node()).and_then(|l| line_start(tree, l)),
            Direction::LineEnd => tree.line_of(focus.node()).and_then(|l| line_end(tree, l)),
        };
        let Some(point) = target.and_then(|target| codec::denormalize(tree, target)) else {
            return false;
        };
        let moved = if extend {
            LiveSelection {
                anchor: live.anchor,
                focus: point,
            }
        } else {
            LiveSelection::caret(point)
        };
        let changed = self.live != Some(moved);
        self.live = Some(moved);
        changed
    }

    /// The boundary the selection focus sits at.
    pub fn focus(&self) -> Option<Boundary> {
        let live = self.live?;
        if !self.tree.contains(live.focus.node) {
            return None;
        }
        codec::normalize(&self.tree, live.focus, false)
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn set_caret(&mut self, caret: Boundary) {
        self.live = SelectionSpan::caret(caret).to_live_selection(&self.tree);
    }

    /// Deletes a ranged selection, or the atomic it rests on, and returns
    /// the caret where it was.
    fn collapse_selection(&mut self) -> Result<Boundary, EditError> {
        let span = self.selection().ok_or(EditError::NoSelection)?;
        if span.is_caret() {
            return Ok(span.start());
        }
        self.delete_span(span).ok_or(EditError::NoSelection)
    }

    /// A text leaf and offset to type at for `caret`, creating an empty
    /// text leaf next to atomics. A placeholder break is replaced.
    fn text_target(&mut self, caret: Boundary) -> (NodeId, usize) {
        let tree = &mut self.tree;
        match caret {
            Boundary::Text { leaf, offset } => (leaf, offset),
            Boundary::Before(atomic) => {
                let placeholder = tree.is_placeholder(atomic);
                let target = match tree.previous_sibling(atomic) {
                    Some(prev) if tree.is_text(prev) => (prev, tree.text_len(prev)),
                    _ => {
                        let text = tree.create_text("");
                        tree.insert_before(atomic, text);
                        (text, 0)
                    }
                };
                if placeholder {
                    tree.detach(atomic);
                }
                target
            }
            Boundary::After(atomic) => {
                if let Some(next) = tree.next_sibling(atomic) {
                    if tree.is_text(next) {
                        return (next, 0);
                    }
                }
                let text = tree.create_text("");
                tree.insert_after(atomic, text);
                (text, 0)
            }
        }
    }

    fn delete_span(&mut self, span: SelectionSpan) -> Option<Boundary> {
        let tree = &mut self.tree;
        let start_line = tree.line_of(span.start().node())?;
        let end_line = tree.line_of(span.end().node())?;
        let anchor = PositionDescriptor::encode(tree, span.start())?;

        if start_line == end_line {
            let (ancestor, range) = span.extract_contents(tree, Some(start_line))?;
            let doomed = tree.children(ancestor)[range].to_vec();
            for node in doomed {
                tree.detach(node);
            }
        } else {
            let root = tree.root();
            let end_path = split::split_to_ancestor(tree, span.end(), root)?;
            let right = tree.children(root).get(end_path.index).copied();
            let right_line = end_path
                .clones
                .last()
                .filter(|clone| tree.parent(**clone) == Some(root))
                .and_then(|clone| tree.first_leaf(*clone))
                .and_then(|leaf| tree.line_of(leaf));
            let start_path = split::split_to_ancestor(tree, span.start(), root)?;
            let end_index = right
                .and_then(|node| tree.index_in_parent(node))
                .unwrap_or(tree.children(root).len());
            let doomed = tree.children(root)[start_path.index..end_index].to_vec();
            for node in doomed {
                tree.detach(node);
            }
            if let Some(right_line) = right_line {
                if tree.contains(start_line) {
                    join_lines(tree, start_line, right_line);
                }
            }
        }

        tree.normalize(tree.root());
        anchor.decode(tree)
    }

    fn delete_before(&mut self, caret: Boundary) -> bool {
        if let Boundary::Text { leaf, offset } = caret {
            if offset > 0 {
                self.tree.remove_text_at(leaf, offset - 1, 1);
                self.set_caret(Boundary::Text {
                    leaf,
                    offset: offset - 1,
                });
                return true;
            }
        }
        if let Boundary::After(atomic) = caret {
            return self.remove_atomic(atomic);
        }
        let Some(line) = self.tree.line_of(caret.node()) else {
            return false;
        };
        match self.tree.prev_content_leaf(caret.node(), Some(line)) {
            Some(prev) if self.tree.is_text(prev) => {
                let len = self.tree.text_len(prev);
                self.tree.remove_text_at(prev, len - 1, 1);
                self.set_caret(Boundary::Text {
                    leaf: prev,
                    offset: len - 1,
                });
                true
            }
            Some(prev) => self.remove_atomic(prev),
            None => self.merge_with_previous_line(line),
        }
    }

    fn remove_atomic(&mut self, atomic: NodeId) -> bool {
        let tree = &self.tree;
        let Some(line) = tree.line_of(atomic) else {
            return false;
        };
        if tree.is_placeholder(atomic) {
            return self.merge_with_previous_line(line);
        }
        let caret = match tree.prev_content_leaf(atomic, Some(line)) {
            Some(prev) => Some(Boundary::end_of(tree, prev)),
            None => tree
                .next_content_leaf(atomic, Some(line))
                .map(|next| Boundary::start_of(tree, next)),
        };
        self.tree.detach(atomic);
        match caret {
            Some(caret) => self.set_caret(caret),
            None => {
                let start = ensure_line_content(&mut self.tree, line);
                self.set_caret(start);
            }
        }
        true
    }

    fn merge_with_previous_line(&mut self, line: NodeId) -> bool {
        let tree = &mut self.tree;
        let lines = tree.lines();
        let Some(idx) = lines.iter().position(|candidate| *candidate == line) else {
            return false;
        };
        if idx == 0 {
            return false;
        }
        let previous = lines[idx - 1];

        if is_empty_line(tree, line) {
            tree.detach(line);
            let Some(end) = line_end(tree, previous) else {
                return false;
            };
            self.set_caret(end);
            return true;
        }
        if is_empty_line(tree, previous) {
            tree.detach(previous);
            return true;
        }
        let Some(end) = line_end(tree, previous) else {
            return false;
        };
        join_lines(tree, previous, line);
        self.set_caret(end);
        true
    }

    /// A fresh element for the line after `line`.
    fn continuation_of(&mut self, line: NodeId) -> NodeId {
        let descriptor = self
            .tree
            .tag(line)
            .and_then(BlockStyle::from_tag)
            .and_then(|style| self.formats.descriptor(&style.into()));
        if let Some(wrapper) =
            descriptor.and_then(|descriptor| descriptor.new_line_wrapper(&mut self.tree))
        {
            return wrapper;
        }
        let element = fresh_line_element(&self.tree, line);
        self.tree.create_element(element)
    }
}

fn fresh_line_element(tree: &DocumentTree, line: NodeId) -> Element {
    let mut element = tree
        .element(line)
        .cloned()
        .unwrap_or_else(|| Element::new(Tag::Paragraph));
    if element.attrs.contains_key(CHECKED_ATTR) {
        element.attrs.insert(CHECKED_ATTR.into(), "false".into());
    }
    element
}

/// Whether `line` holds nothing but its placeholder break.
fn is_empty_line(tree: &DocumentTree, line: NodeId) -> bool {
    match tree.first_content_leaf(line) {
        Some(leaf) => tree.is_placeholder(leaf),
        None => true,
    }
}

fn line_start(tree: &DocumentTree, line: NodeId) -> Option<Boundary> {
    tree.first_content_leaf(line)
        .map(|leaf| Boundary::start_of(tree, leaf))
}

fn line_end(tree: &DocumentTree, line: NodeId) -> Option<Boundary> {
    let leaf = tree.last_content_leaf(line)?;
    if tree.is_placeholder(leaf) {
        return Some(Boundary::Before(leaf));
    }
    Some(Boundary::end_of(tree, leaf))
}

/// Start boundary of `line`, giving it a placeholder break first if it has
/// no content.
fn ensure_line_content(tree: &mut DocumentTree, line: NodeId) -> Boundary {
    match tree.first_content_leaf(line) {
        Some(leaf) => Boundary::start_of(tree, leaf),
        None => Boundary::Before(tree.append_atomic(line, Atomic::LineBreak)),
    }
}

/// Moves the content of `right` to the end of `left` and drops `right`.
fn join_lines(tree: &mut DocumentTree, left: NodeId, right: NodeId) {
    for line in [left, right] {
        if let Some(leaf) = tree.first_content_leaf(line) {
            if tree.is_placeholder(leaf) {
                tree.detach(leaf);
            }
        }
    }
    tree.move_children_from(right, 0, left);
    tree.detach(right);
}

/// Takes `item` out of every list above it, turning it into a `tag` block
/// right after the outermost list. Items after it stay in split-off lists.
fn lift_list_item(tree: &mut DocumentTree, item: NodeId, tag: Tag) {
    let root = tree.root();
    let mut node = item;
    while let Some(parent) = tree.parent(node) {
        if parent == root {
            break;
        }
        if let Some(idx) = tree.index_in_parent(node) {
            if idx + 1 < tree.children(parent).len() {
                let rest = tree.clone_shallow(parent);
                tree.move_children_from(parent, idx + 1, rest);
                tree.insert_after(parent, rest);
            }
        }
        node = parent;
    }
    if node == item {
        return;
    }
    if let Some(element) = tree.element_mut(item) {
        *element = Element::new(tag);
    }
    tree.insert_after(node, item);
}

fn step_right(tree: &DocumentTree, boundary: Boundary) -> Option<Boundary> {
    let line = tree.line_of(boundary.node())?;
    match boundary {
        Boundary::Text { leaf, offset } if offset < tree.text_len(leaf) => {
            return Some(Boundary::Text {
                leaf,
                offset: offset + 1,
            });
        }
        Boundary::Before(atomic) if !tree.is_placeholder(atomic) => {
            return Some(Boundary::After(atomic));
        }
        Boundary::Before(_) => return next_line_start(tree, line),
        _ => {}
    }
    match tree.next_content_leaf(boundary.node(), Some(line)) {
        Some(next) if tree.is_text(next) => Some(Boundary::Text {
            leaf: next,
            offset: 1,
        }),
        Some(next) => Some(Boundary::After(next)),
        None => next_line_start(tree, line),
    }
}

fn step_left(tree: &DocumentTree, boundary: Boundary) -> Option<Boundary> {
    let line = tree.line_of(boundary.node())?;
    match boundary {
        Boundary::Text { leaf, offset } if offset > 0 => {
            return Some(Boundary::Text {
                leaf,
                offset: offset - 1,
            });
        }
        Boundary::After(atomic) => return Some(Boundary::Before(atomic)),
        _ => {}
    }
    match tree.prev_content_leaf(boundary.node(), Some(line)) {
        Some(prev) if tree.is_text(prev) => Some(Boundary::Text {
            leaf: prev,
            offset: tree.text_len(prev) - 1,
        }),
        Some(prev) => Some(Boundary::Before(prev)),
        None => {
            let lines = tree.lines();
            let idx = lines.iter().position(|candidate| *candidate == line)?;
            line_end(tree, *lines.get(idx.checked_sub(1)?)?)
        }
    }
}

fn next_line_start(tree: &DocumentTree, line: NodeId) -> Option<Boundary> {
    let lines = tree.lines();
    let idx = lines.iter().position(|candidate| *candidate == line)?;
    line_start(tree, *lines.get(idx + 1)?)
}

/// Same column on the line above or below, clamped to its length.
fn step_vertical(tree: &DocumentTree, boundary: Boundary, down: bool) -> Option<Boundary> {
    let line = tree.line_of(boundary.node())?;
    let lines = tree.lines();
    let idx = lines.iter().position(|candidate| *candidate == line)?;
    let target = if down {
        *lines.get(idx + 1)?
    } else {
        *lines.get(idx.checked_sub(1)?)?
    };

    let line_index = |line: NodeId| {
        line_start(tree, line)
            .and_then(|start| PositionDescriptor::encode(tree, start))
            .map(|descriptor| descriptor.index)
    };
    let column = PositionDescriptor::encode(tree, boundary)?.index - line_index(line)?;
    let width = if is_empty_line(tree, target) {
        0
    } else {
        tree.text_len(target)
    };
    let column = column.min(width);
    if column == 0 {
        return line_start(tree, target);
    }
    PositionDescriptor::inside(line_index(target)? + column).decode(tree)
}
