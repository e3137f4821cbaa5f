use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub mod navigate;
mod normalize;

/// Handle of a node inside a [`DocumentTree`] arena.
///
/// Ids are only meaningful for the tree that produced them. Once the tree is
/// rebuilt (e.g. by undo) every previously handed out id is stale.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Tag {
    Root,
    Paragraph,
    Heading(u8),
    Quote,
    CodeBlock,
    UnorderedList,
    OrderedList,
    ListItem,
    Bold,
    Italic,
    Underline,
    Strike,
    Code,
    Highlight,
    Link,
    Styled,
}

impl Tag {
    pub fn heading(level: u8) -> Self {
        Tag::Heading(level.clamp(1, 6))
    }

    /// Block kinds allowed as direct children of the editable region.
    pub fn is_top_level(self) -> bool {
        matches!(
            self,
            Tag::Paragraph
                | Tag::Heading(_)
                | Tag::Quote
                | Tag::CodeBlock
                | Tag::UnorderedList
                | Tag::OrderedList
        )
    }

    pub fn is_block(self) -> bool {
        self.is_top_level() || matches!(self, Tag::ListItem | Tag::Root)
    }

    pub fn is_inline(self) -> bool {
        !self.is_block()
    }

    pub fn is_list(self) -> bool {
        matches!(self, Tag::UnorderedList | Tag::OrderedList)
    }

    pub fn markup_name(self) -> &'static str {
        match self {
            Tag::Root => "root",
            Tag::Paragraph => "p",
            Tag::Heading(1) => "h1",
            Tag::Heading(2) => "h2",
            Tag::Heading(3) => "h3",
            Tag::Heading(4) => "h4",
            Tag::Heading(5) => "h5",
            Tag::Heading(_) => "h6",
            Tag::Quote => "blockquote",
            Tag::CodeBlock => "pre",
            Tag::UnorderedList => "ul",
            Tag::OrderedList => "ol",
            Tag::ListItem => "li",
            Tag::Bold => "b",
            Tag::Italic => "i",
            Tag::Underline => "u",
            Tag::Strike => "s",
            Tag::Code => "code",
            Tag::Highlight => "mark",
            Tag::Link => "a",
            Tag::Styled => "span",
        }
    }

    pub fn from_markup_name(name: &str) -> Option<Self> {
        let tag = match name {
            "p" => Tag::Paragraph,
            "h1" => Tag::Heading(1),
            "h2" => Tag::Heading(2),
            "h3" => Tag::Heading(3),
            "h4" => Tag::Heading(4),
            "h5" => Tag::Heading(5),
            "h6" => Tag::Heading(6),
            "blockquote" => Tag::Quote,
            "pre" => Tag::CodeBlock,
            "ul" => Tag::UnorderedList,
            "ol" => Tag::OrderedList,
            "li" => Tag::ListItem,
            "b" => Tag::Bold,
            "i" => Tag::Italic,
            "u" => Tag::Underline,
            "s" => Tag::Strike,
            "code" => Tag::Code,
            "mark" => Tag::Highlight,
            "a" => Tag::Link,
            "span" => Tag::Styled,
            _ => return None,
        };
        Some(tag)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Tag::Root => "Document",
            Tag::Paragraph => "Text",
            Tag::Heading(level) => return write!(f, "Heading {level}"),
            Tag::Quote => "Quote",
            Tag::CodeBlock => "Code",
            Tag::UnorderedList => "Bullet List",
            Tag::OrderedList => "Numbered List",
            Tag::ListItem => "Item",
            Tag::Bold => "Bold",
            Tag::Italic => "Italic",
            Tag::Underline => "Underline",
            Tag::Strike => "Strikethrough",
            Tag::Code => "Inline Code",
            Tag::Highlight => "Highlight",
            Tag::Link => "Link",
            Tag::Styled => "Styled",
        };
        f.write_str(label)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Element {
    pub tag: Tag,
    pub attrs: BTreeMap<String, String>,
}

impl Element {
    pub fn new(tag: Tag) -> Self {
        Self {
            tag,
            attrs: BTreeMap::new(),
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(String::as_str)
    }
}

/// List item attribute marking a checklist entry, `"true"` or `"false"`.
pub const CHECKED_ATTR: &str = "data-checked";

/// Leaf-like nodes addressed as a unit: a boundary may sit before or after
/// them, never inside.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Atomic {
    LineBreak,
    Rule,
    Image { src: String },
    Marker,
}

impl Atomic {
    pub fn markup_name(&self) -> &'static str {
        match self {
            Atomic::LineBreak => "br",
            Atomic::Rule => "hr",
            Atomic::Image { .. } => "img",
            Atomic::Marker => "marker",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Text(String),
    Element(Element),
    Atomic(Atomic),
}

#[derive(Clone, Debug)]
pub struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl Node {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

/// Arena holding the editable region and everything below it.
///
/// Detached nodes stay in the arena but are unreachable from the root.
#[derive(Clone, Debug)]
pub struct DocumentTree {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Default for DocumentTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentTree {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new(NodeKind::Element(Element::new(Tag::Root)))],
            root: NodeId(0),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.0].kind
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn is_text(&self, id: NodeId) -> bool {
        matches!(self.kind(id), NodeKind::Text(_))
    }

    pub fn is_atomic(&self, id: NodeId) -> bool {
        matches!(self.kind(id), NodeKind::Atomic(_))
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.kind(id), NodeKind::Element(_))
    }

    pub fn is_leaf(&self, id: NodeId) -> bool {
        !self.is_element(id)
    }

    /// Leaves that take part in addressing: atomics and non-empty text runs.
    pub fn is_content_leaf(&self, id: NodeId) -> bool {
        match self.kind(id) {
            NodeKind::Text(text) => !text.is_empty(),
            NodeKind::Atomic(_) => true,
            NodeKind::Element(_) => false,
        }
    }

    pub fn tag(&self, id: NodeId) -> Option<Tag> {
        self.element(id).map(|element| element.tag)
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match self.kind(id) {
            NodeKind::Element(element) => Some(element),
            _ => None,
        }
    }

    pub fn element_mut(&mut self, id: NodeId) -> Option<&mut Element> {
        match &mut self.nodes[id.0].kind {
            NodeKind::Element(element) => Some(element),
            _ => None,
        }
    }

    pub fn atomic(&self, id: NodeId) -> Option<&Atomic> {
        match self.kind(id) {
            NodeKind::Atomic(atomic) => Some(atomic),
            _ => None,
        }
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        match self.kind(id) {
            NodeKind::Text(text) => Some(text.as_str()),
            _ => None,
        }
    }

    pub fn text_mut(&mut self, id: NodeId) -> Option<&mut String> {
        match &mut self.nodes[id.0].kind {
            NodeKind::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn set_tag(&mut self, id: NodeId, tag: Tag) -> bool {
        match self.element_mut(id) {
            Some(element) => {
                element.tag = tag;
                true
            }
            None => false,
        }
    }

    /// Number of characters in the subtree rooted at `id`.
    pub fn text_len(&self, id: NodeId) -> usize {
        match self.kind(id) {
            NodeKind::Text(text) => text.chars().count(),
            NodeKind::Atomic(_) => 0,
            NodeKind::Element(_) => self
                .children(id)
                .iter()
                .map(|child| self.text_len(*child))
                .sum(),
        }
    }

    /// Concatenated text of the subtree rooted at `id`.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        match self.kind(id) {
            NodeKind::Text(text) => out.push_str(text),
            NodeKind::Atomic(_) => {}
            NodeKind::Element(_) => {
                for child in self.children(id) {
                    self.collect_text(*child, out);
                }
            }
        }
    }

    /// Whether `id` is still attached below the root.
    pub fn contains(&self, id: NodeId) -> bool {
        if id.0 >= self.nodes.len() {
            return false;
        }
        let mut current = id;
        loop {
            if current == self.root {
                return true;
            }
            match self.parent(current) {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    pub fn index_in_parent(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent).iter().position(|child| *child == id)
    }

    pub fn previous_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let idx = self.index_in_parent(id)?;
        if idx == 0 {
            return None;
        }
        self.children(parent).get(idx - 1).copied()
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let idx = self.index_in_parent(id)?;
        self.children(parent).get(idx + 1).copied()
    }

    // ------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------

    pub fn create(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node::new(kind));
        id
    }

    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.create(NodeKind::Text(text.into()))
    }

    pub fn create_element(&mut self, element: Element) -> NodeId {
        self.create(NodeKind::Element(element))
    }

    pub fn create_atomic(&mut self, atomic: Atomic) -> NodeId {
        self.create(NodeKind::Atomic(atomic))
    }

    pub fn append_text(&mut self, parent: NodeId, text: impl Into<String>) -> NodeId {
        let id = self.create_text(text);
        self.append_child(parent, id);
        id
    }

    pub fn append_element(&mut self, parent: NodeId, element: Element) -> NodeId {
        let id = self.create_element(element);
        self.append_child(parent, id);
        id
    }

    pub fn append_atomic(&mut self, parent: NodeId, atomic: Atomic) -> NodeId {
        let id = self.create_atomic(atomic);
        self.append_child(parent, id);
        id
    }

    /// Appends a block of the given tag holding a single text run.
    pub fn append_block(&mut self, tag: Tag, text: &str) -> NodeId {
        let root = self.root;
        let block = self.append_element(root, Element::new(tag));
        if text.is_empty() {
            self.append_atomic(block, Atomic::LineBreak);
        } else {
            self.append_text(block, text);
        }
        block
    }

    // ------------------------------------------------------------------
    // Mutation primitives
    // ------------------------------------------------------------------

    /// Removes `id` from its parent. The node keeps its own children.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.0].parent.take() {
            self.nodes[parent.0].children.retain(|child| *child != id);
        }
    }

    pub fn insert_child(&mut self, parent: NodeId, index: usize, child: NodeId) {
        debug_assert!(child != parent, "node cannot contain itself");
        self.detach(child);
        let children = &mut self.nodes[parent.0].children;
        let index = index.min(children.len());
        children.insert(index, child);
        self.nodes[child.0].parent = Some(parent);
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        let len = self.children(parent).len();
        self.insert_child(parent, len, child);
    }

    pub fn insert_before(&mut self, reference: NodeId, node: NodeId) -> bool {
        let (Some(parent), Some(idx)) = (self.parent(reference), self.index_in_parent(reference))
        else {
            return false;
        };
        self.insert_child(parent, idx, node);
        true
    }

    pub fn insert_after(&mut self, reference: NodeId, node: NodeId) -> bool {
        let (Some(parent), Some(idx)) = (self.parent(reference), self.index_in_parent(reference))
        else {
            return false;
        };
        self.insert_child(parent, idx + 1, node);
        true
    }

    /// Moves `children[from..]` of `source` to the end of `target`.
    pub fn move_children_from(&mut self, source: NodeId, from: usize, target: NodeId) {
        let moved: Vec<NodeId> = self.children(source).iter().skip(from).copied().collect();
        for child in moved {
            self.append_child(target, child);
        }
    }

    /// Replaces `id` by its children.
    pub fn unwrap(&mut self, id: NodeId) -> bool {
        let (Some(parent), Some(idx)) = (self.parent(id), self.index_in_parent(id)) else {
            return false;
        };
        let children: Vec<NodeId> = self.children(id).to_vec();
        for (offset, child) in children.into_iter().enumerate() {
            self.insert_child(parent, idx + offset, child);
        }
        self.detach(id);
        true
    }

    /// Creates a detached copy of `id` without its children.
    pub fn clone_shallow(&mut self, id: NodeId) -> NodeId {
        let kind = match self.kind(id) {
            NodeKind::Text(_) => NodeKind::Text(String::new()),
            other => other.clone(),
        };
        self.create(kind)
    }

    /// Splits a text leaf at a char offset, inserting the right-hand part as
    /// a new sibling. Returns the new node.
    pub fn split_text(&mut self, leaf: NodeId, offset: usize) -> Option<NodeId> {
        let text = self.text_mut(leaf)?;
        let byte_idx = char_to_byte_idx(text, offset);
        let right = text.split_off(byte_idx);
        let new_leaf = self.create_text(right);
        if !self.insert_after(leaf, new_leaf) {
            debug_assert!(false, "split_text on a detached leaf");
            return None;
        }
        Some(new_leaf)
    }

    pub fn insert_text_at(&mut self, leaf: NodeId, offset: usize, insert: &str) -> bool {
        let Some(text) = self.text_mut(leaf) else {
            return false;
        };
        let byte_idx = char_to_byte_idx(text, offset);
        text.insert_str(byte_idx, insert);
        true
    }

    /// Removes `count` chars starting at `offset`; returns how many were removed.
    pub fn remove_text_at(&mut self, leaf: NodeId, offset: usize, count: usize) -> usize {
        let Some(text) = self.text_mut(leaf) else {
            return 0;
        };
        let start = char_to_byte_idx(text, offset);
        let end = char_to_byte_idx(text, offset + count);
        if start >= end {
            return 0;
        }
        let removed = text[start..end].chars().count();
        text.drain(start..end);
        removed
    }

    /// Copies the subtree `id` of `other` into this arena, detached.
    pub fn import_subtree(&mut self, other: &DocumentTree, id: NodeId) -> NodeId {
        let copy = self.create(other.kind(id).clone());
        for child in other.children(id) {
            let child_copy = self.import_subtree(other, *child);
            self.append_child(copy, child_copy);
        }
        copy
    }

    /// Guarantees at least one block so a caret always has somewhere to go.
    pub fn ensure_initialized(&mut self) {
        if self.children(self.root).is_empty() {
            self.append_block(Tag::Paragraph, "");
        }
    }
}

pub fn char_to_byte_idx(text: &str, char_idx: usize) -> usize {
    if char_idx == 0 {
        return 0;
    }
    for (count, (byte_idx, _)) in text.char_indices().enumerate() {
        if count == char_idx {
            return byte_idx;
        }
    }
    text.len()
}

#[cfg(test)]
#[path = "tree_tests.rs"]
mod tree_tests;
