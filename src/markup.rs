//! Snapshot format for document trees.
//!
//! The history stores character diffs between two snapshots, so writing must
//! be deterministic: attributes are emitted in key order and text is escaped
//! the same way every time.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::tree::{Atomic, DocumentTree, Element, NodeId, NodeKind, Tag};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid markup at char {position}: {kind}")]
pub struct MarkupError {
    pub position: usize,
    pub kind: MarkupErrorKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarkupErrorKind {
    #[error("unknown tag <{0}>")]
    UnknownTag(String),
    #[error("unexpected closing tag </{0}>")]
    UnexpectedClose(String),
    #[error("unclosed tag <{0}>")]
    Unclosed(String),
    #[error("unknown entity &{0};")]
    BadEntity(String),
    #[error("malformed tag")]
    MalformedTag,
    #[error("<{0}> is not allowed at the top level")]
    NotTopLevel(String),
    #[error("text is not allowed at the top level")]
    TopLevelText,
}

pub fn to_markup(tree: &DocumentTree) -> String {
    let mut out = String::new();
    for child in tree.children(tree.root()) {
        write_node(tree, *child, &mut out);
    }
    out
}

/// Markup of a single subtree, including the node itself.
pub fn node_markup(tree: &DocumentTree, node: NodeId) -> String {
    let mut out = String::new();
    write_node(tree, node, &mut out);
    out
}

fn write_node(tree: &DocumentTree, node: NodeId, out: &mut String) {
    match tree.kind(node) {
        NodeKind::Text(text) => escape_into(text, out),
        NodeKind::Atomic(atomic) => {
            out.push('<');
            out.push_str(atomic.markup_name());
            if let Atomic::Image { src } = atomic {
                out.push_str(" src=\"");
                escape_into(src, out);
                out.push('"');
            }
            out.push_str("/>");
        }
        NodeKind::Element(element) => {
            if element.tag == Tag::Root {
                for child in tree.children(node) {
                    write_node(tree, *child, out);
                }
                return;
            }
            let name = element.tag.markup_name();
            out.push('<');
            out.push_str(name);
            for (key, value) in &element.attrs {
                out.push(' ');
                out.push_str(key);
                out.push_str("=\"");
                escape_into(value, out);
                out.push('"');
            }
            out.push('>');
            for child in tree.children(node) {
                write_node(tree, *child, out);
            }
            out.push_str("</");
            out.push_str(name);
            out.push('>');
        }
    }
}

fn escape_into(text: &str, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            other => out.push(other),
        }
    }
}

/// Parses a document snapshot. Only top-level block kinds may appear at the
/// outermost level.
pub fn parse_markup(input: &str) -> Result<DocumentTree, MarkupError> {
    Parser::new(input, true).parse()
}

/// Parses a pasted fragment, which may consist of inline content only.
pub fn parse_fragment(input: &str) -> Result<DocumentTree, MarkupError> {
    Parser::new(input, false).parse()
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
    top_level_only: bool,
}

enum TagToken {
    Open { name: String, attrs: BTreeMap<String, String>, self_closing: bool },
    Close(String),
}

impl Parser {
    fn new(input: &str, top_level_only: bool) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
            top_level_only,
        }
    }

    fn error(&self, position: usize, kind: MarkupErrorKind) -> MarkupError {
        MarkupError { position, kind }
    }

    fn parse(mut self) -> Result<DocumentTree, MarkupError> {
        let mut tree = DocumentTree::new();
        // (node, name, position of the opening tag)
        let mut stack: Vec<(NodeId, String, usize)> = Vec::new();

        while self.pos < self.chars.len() {
            let parent = stack.last().map(|(node, _, _)| *node).unwrap_or(tree.root());
            let at_top = stack.is_empty();
            if self.chars[self.pos] != '<' {
                let start = self.pos;
                let text = self.read_text()?;
                if at_top && self.top_level_only {
                    if text.trim().is_empty() {
                        continue;
                    }
                    return Err(self.error(start, MarkupErrorKind::TopLevelText));
                }
                tree.append_text(parent, text);
                continue;
            }

            let start = self.pos;
            match self.read_tag()? {
                TagToken::Close(name) => match stack.pop() {
                    Some((_, open, _)) if open == name => {}
                    _ => return Err(self.error(start, MarkupErrorKind::UnexpectedClose(name))),
                },
                TagToken::Open {
                    name,
                    attrs,
                    self_closing,
                } => {
                    if let Some(atomic) = atomic_from(&name, &attrs) {
                        if at_top && self.top_level_only {
                            return Err(self.error(start, MarkupErrorKind::NotTopLevel(name)));
                        }
                        tree.append_atomic(parent, atomic);
                        continue;
                    }
                    let Some(tag) = Tag::from_markup_name(&name) else {
                        return Err(self.error(start, MarkupErrorKind::UnknownTag(name)));
                    };
                    if at_top && self.top_level_only && !tag.is_top_level() {
                        return Err(self.error(start, MarkupErrorKind::NotTopLevel(name)));
                    }
                    let node = tree.append_element(parent, Element { tag, attrs });
                    if !self_closing {
                        stack.push((node, name, start));
                    }
                }
            }
        }

        if let Some((_, name, position)) = stack.pop() {
            return Err(self.error(position, MarkupErrorKind::Unclosed(name)));
        }
        Ok(tree)
    }

    fn read_text(&mut self) -> Result<String, MarkupError> {
        let mut text = String::new();
        while self.pos < self.chars.len() && self.chars[self.pos] != '<' {
            let ch = self.chars[self.pos];
            if ch == '&' {
                text.push(self.read_entity()?);
            } else {
                text.push(ch);
                self.pos += 1;
            }
        }
        Ok(text)
    }

    fn read_entity(&mut self) -> Result<char, MarkupError> {
        let start = self.pos;
        self.pos += 1;
        let mut name = String::new();
        while self.pos < self.chars.len() && self.chars[self.pos] != ';' {
            name.push(self.chars[self.pos]);
            self.pos += 1;
            if name.len() > 8 {
                break;
            }
        }
        if self.chars.get(self.pos) != Some(&';') {
            return Err(self.error(start, MarkupErrorKind::BadEntity(name)));
        }
        self.pos += 1;
        match name.as_str() {
            "amp" => Ok('&'),
            "lt" => Ok('<'),
            "gt" => Ok('>'),
            "quot" => Ok('"'),
            _ => Err(self.error(start, MarkupErrorKind::BadEntity(name))),
        }
    }

    fn read_tag(&mut self) -> Result<TagToken, MarkupError> {
        let start = self.pos;
        self.pos += 1;
        let closing = self.eat('/');
        let name = self.read_name();
        if name.is_empty() {
            return Err(self.error(start, MarkupErrorKind::MalformedTag));
        }
        if closing {
            self.skip_whitespace();
            if !self.eat('>') {
                return Err(self.error(start, MarkupErrorKind::MalformedTag));
            }
            return Ok(TagToken::Close(name));
        }

        let mut attrs = BTreeMap::new();
        loop {
            self.skip_whitespace();
            if self.eat('>') {
                return Ok(TagToken::Open {
                    name,
                    attrs,
                    self_closing: false,
                });
            }
            if self.eat('/') {
                if !self.eat('>') {
                    return Err(self.error(start, MarkupErrorKind::MalformedTag));
                }
                return Ok(TagToken::Open {
                    name,
                    attrs,
                    self_closing: true,
                });
            }
            let key = self.read_name();
            if key.is_empty() || !self.eat('=') || !self.eat('"') {
                return Err(self.error(start, MarkupErrorKind::MalformedTag));
            }
            let mut value = String::new();
            loop {
                match self.chars.get(self.pos) {
                    None => return Err(self.error(start, MarkupErrorKind::MalformedTag)),
                    Some('"') => {
                        self.pos += 1;
                        break;
                    }
                    Some('&') => value.push(self.read_entity()?),
                    Some(ch) => {
                        value.push(*ch);
                        self.pos += 1;
                    }
                }
            }
            attrs.insert(key, value);
        }
    }

    fn read_name(&mut self) -> String {
        let mut name = String::new();
        while let Some(ch) = self.chars.get(self.pos) {
            if ch.is_ascii_alphanumeric() || *ch == '-' || *ch == '_' {
                name.push(*ch);
                self.pos += 1;
            } else {
                break;
            }
        }
        name
    }

    fn skip_whitespace(&mut self) {
        while self.chars.get(self.pos).is_some_and(|ch| ch.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.chars.get(self.pos) == Some(&expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }
}

fn atomic_from(name: &str, attrs: &BTreeMap<String, String>) -> Option<Atomic> {
    match name {
        "br" => Some(Atomic::LineBreak),
        "hr" => Some(Atomic::Rule),
        "marker" => Some(Atomic::Marker),
        "img" => Some(Atomic::Image {
            src: attrs.get("src").cloned().unwrap_or_default(),
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("<p>hello</p>")]
    #[case("<p>a<b>b<i>c</i></b>d</p><h2>title</h2>")]
    #[case("<ul><li>one</li><li>two<br/>three</li></ul>")]
    #[case("<p>x &amp; y &lt;z&gt; &quot;q&quot;</p>")]
    #[case("<p><a href=\"https://example.com/?a=1&amp;b=2\">link</a><img src=\"cat.png\"/></p>")]
    #[case("<p><span class=\"kw\" color=\"red\">fn</span></p><p><hr/></p>")]
    fn writes_back_what_it_parsed(#[case] markup: &str) {
        let tree = parse_markup(markup).expect("valid markup");
        assert_eq!(to_markup(&tree), markup);
    }

    #[test]
    fn attributes_are_written_in_key_order() {
        let mut tree = DocumentTree::new();
        let block = tree.append_element(tree.root(), Element::new(Tag::Paragraph));
        let span = tree.append_element(
            block,
            Element::new(Tag::Styled)
                .with_attr("z", "1")
                .with_attr("a", "2"),
        );
        tree.append_text(span, "x");
        assert_eq!(to_markup(&tree), "<p><span a=\"2\" z=\"1\">x</span></p>");
    }

    #[test]
    fn reports_positions_of_errors() {
        let err = parse_markup("<p>ok</p><p>bad &nbsp;</p>").unwrap_err();
        assert_eq!(err.position, 16);
        assert_eq!(err.kind, MarkupErrorKind::BadEntity("nbsp".into()));

        let err = parse_markup("<p>open").unwrap_err();
        assert_eq!(err.kind, MarkupErrorKind::Unclosed("p".into()));
        assert_eq!(err.position, 0);

        let err = parse_markup("<p>x</b>").unwrap_err();
        assert_eq!(err.kind, MarkupErrorKind::UnexpectedClose("b".into()));

        let err = parse_markup("<blink>x</blink>").unwrap_err();
        assert_eq!(err.kind, MarkupErrorKind::UnknownTag("blink".into()));
    }

    #[test]
    fn snapshots_only_accept_top_level_blocks() {
        let err = parse_markup("<b>x</b>").unwrap_err();
        assert_eq!(err.kind, MarkupErrorKind::NotTopLevel("b".into()));
        let err = parse_markup("loose").unwrap_err();
        assert_eq!(err.kind, MarkupErrorKind::TopLevelText);
    }

    #[test]
    fn fragments_may_be_inline() {
        let tree = parse_fragment("plain <b>bold</b>").expect("valid fragment");
        let root = tree.root();
        assert_eq!(tree.children(root).len(), 2);
        assert_eq!(tree.text(tree.children(root)[0]), Some("plain "));
        assert_eq!(tree.tag(tree.children(root)[1]), Some(Tag::Bold));
    }
}
