use std::collections::HashMap;
use std::fmt;

use crate::tree::{DocumentTree, Element, NodeId, Tag};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum InlineStyle {
    Bold,
    Italic,
    Underline,
    Strike,
    Code,
    Highlight,
    Color(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlockStyle {
    Paragraph,
    Heading(u8),
    Quote,
    CodeBlock,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum StyleKey {
    Inline(InlineStyle),
    Block(BlockStyle),
}

impl From<InlineStyle> for StyleKey {
    fn from(style: InlineStyle) -> Self {
        StyleKey::Inline(style)
    }
}

impl From<BlockStyle> for StyleKey {
    fn from(style: BlockStyle) -> Self {
        StyleKey::Block(style)
    }
}

impl fmt::Display for InlineStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InlineStyle::Color(color) => write!(f, "Color {color}"),
            other => write!(f, "{}", other.template().tag),
        }
    }
}

impl InlineStyle {
    fn template(&self) -> Element {
        match self {
            InlineStyle::Bold => Element::new(Tag::Bold),
            InlineStyle::Italic => Element::new(Tag::Italic),
            InlineStyle::Underline => Element::new(Tag::Underline),
            InlineStyle::Strike => Element::new(Tag::Strike),
            InlineStyle::Code => Element::new(Tag::Code),
            InlineStyle::Highlight => Element::new(Tag::Highlight),
            InlineStyle::Color(color) => Element::new(Tag::Styled).with_attr("color", color.clone()),
        }
    }
}

impl BlockStyle {
    pub fn tag(self) -> Tag {
        match self {
            BlockStyle::Paragraph => Tag::Paragraph,
            BlockStyle::Heading(level) => Tag::heading(level),
            BlockStyle::Quote => Tag::Quote,
            BlockStyle::CodeBlock => Tag::CodeBlock,
        }
    }

    pub fn from_tag(tag: Tag) -> Option<Self> {
        match tag {
            Tag::Paragraph => Some(BlockStyle::Paragraph),
            Tag::Heading(level) => Some(BlockStyle::Heading(level)),
            Tag::Quote => Some(BlockStyle::Quote),
            Tag::CodeBlock => Some(BlockStyle::CodeBlock),
            _ => None,
        }
    }
}

/// How a style shows up in the tree: the element that carries it, and for
/// blocks the element a new line continues with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StyleDescriptor {
    template: Element,
    new_line: Option<Tag>,
}

impl StyleDescriptor {
    pub fn new(template: Element) -> Self {
        Self {
            template,
            new_line: None,
        }
    }

    pub fn with_new_line(mut self, tag: Tag) -> Self {
        self.new_line = Some(tag);
        self
    }

    pub fn tag(&self) -> Tag {
        self.template.tag
    }

    /// Whether `node` carries this style. Extra attributes on the node do
    /// not prevent a match.
    pub fn matches(&self, tree: &DocumentTree, node: NodeId) -> bool {
        let Some(element) = tree.element(node) else {
            return false;
        };
        element.tag == self.template.tag
            && self
                .template
                .attrs
                .iter()
                .all(|(key, value)| element.attr(key) == Some(value.as_str()))
    }

    /// Creates a detached element carrying this style.
    pub fn build(&self, tree: &mut DocumentTree) -> NodeId {
        tree.create_element(self.template.clone())
    }

    /// Element a line continues with when split at its end, if it should
    /// not simply repeat this style.
    pub fn new_line_wrapper(&self, tree: &mut DocumentTree) -> Option<NodeId> {
        self.new_line
            .map(|tag| tree.create_element(Element::new(tag)))
    }
}

/// Lookup from style identity to descriptor.
#[derive(Clone, Debug)]
pub struct FormatTable {
    entries: HashMap<StyleKey, StyleDescriptor>,
}

impl Default for FormatTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl FormatTable {
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn standard() -> Self {
        let mut table = Self::empty();
        for style in [
            InlineStyle::Bold,
            InlineStyle::Italic,
            InlineStyle::Underline,
            InlineStyle::Strike,
            InlineStyle::Code,
            InlineStyle::Highlight,
        ] {
            let descriptor = StyleDescriptor::new(style.template());
            table.register(style, descriptor);
        }
        table.register(
            BlockStyle::Paragraph,
            StyleDescriptor::new(Element::new(Tag::Paragraph)),
        );
        for level in 1..=6 {
            table.register(
                BlockStyle::Heading(level),
                StyleDescriptor::new(Element::new(Tag::Heading(level)))
                    .with_new_line(Tag::Paragraph),
            );
        }
        table.register(BlockStyle::Quote, StyleDescriptor::new(Element::new(Tag::Quote)));
        table.register(
            BlockStyle::CodeBlock,
            StyleDescriptor::new(Element::new(Tag::CodeBlock)).with_new_line(Tag::Paragraph),
        );
        table
    }

    pub fn register(&mut self, key: impl Into<StyleKey>, descriptor: StyleDescriptor) {
        self.entries.insert(key.into(), descriptor);
    }

    /// Descriptor for `key`. Colors need no registration.
    pub fn descriptor(&self, key: &StyleKey) -> Option<StyleDescriptor> {
        if let Some(descriptor) = self.entries.get(key) {
            return Some(descriptor.clone());
        }
        match key {
            StyleKey::Inline(style @ InlineStyle::Color(_)) => {
                Some(StyleDescriptor::new(style.template()))
            }
            _ => None,
        }
    }

    /// Inline styles carried by `node`, in table order.
    pub fn inline_styles_of(&self, tree: &DocumentTree, node: NodeId) -> Vec<InlineStyle> {
        let mut styles: Vec<InlineStyle> = self
            .entries
            .iter()
            .filter_map(|(key, descriptor)| match key {
                StyleKey::Inline(style) if descriptor.matches(tree, node) => Some(style.clone()),
                _ => None,
            })
            .collect();
        if let Some(color) = tree.element(node).and_then(|element| {
            (element.tag == Tag::Styled).then(|| element.attr("color")).flatten()
        }) {
            let style = InlineStyle::Color(color.to_string());
            if !styles.contains(&style) {
                styles.push(style);
            }
        }
        styles.sort_by_key(|style| style.to_string());
        styles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::parse_markup;

    #[test]
    fn descriptors_match_by_tag_and_attributes() {
        let tree = parse_markup(
            "<p><b>x</b><span color=\"red\" class=\"kw\">y</span><span>z</span></p>",
        )
        .unwrap();
        let p = tree.children(tree.root())[0];
        let [bold, red, plain] = [tree.children(p)[0], tree.children(p)[1], tree.children(p)[2]];
        let table = FormatTable::standard();

        let bold_style = table.descriptor(&InlineStyle::Bold.into()).unwrap();
        assert!(bold_style.matches(&tree, bold));
        assert!(!bold_style.matches(&tree, red));

        let red_style = table
            .descriptor(&InlineStyle::Color("red".into()).into())
            .unwrap();
        assert!(red_style.matches(&tree, red));
        assert!(!red_style.matches(&tree, plain));
    }

    #[test]
    fn headings_continue_with_paragraphs() {
        let mut tree = DocumentTree::new();
        let table = FormatTable::standard();
        let heading = table.descriptor(&BlockStyle::Heading(2).into()).unwrap();
        let next = heading.new_line_wrapper(&mut tree).unwrap();
        assert_eq!(tree.tag(next), Some(Tag::Paragraph));

        let quote = table.descriptor(&BlockStyle::Quote.into()).unwrap();
        assert_eq!(quote.new_line_wrapper(&mut tree), None);
    }

    #[test]
    fn empty_table_knows_only_colors() {
        let table = FormatTable::empty();
        assert!(table.descriptor(&InlineStyle::Bold.into()).is_none());
        assert!(
            table
                .descriptor(&InlineStyle::Color("blue".into()).into())
                .is_some()
        );
    }

    #[test]
    fn inline_styles_of_lists_matching_entries() {
        let tree = parse_markup("<p><span color=\"red\">y</span><i>z</i></p>").unwrap();
        let p = tree.children(tree.root())[0];
        let table = FormatTable::standard();
        assert_eq!(
            table.inline_styles_of(&tree, tree.children(p)[0]),
            vec![InlineStyle::Color("red".into())]
        );
        assert_eq!(
            table.inline_styles_of(&tree, tree.children(p)[1]),
            vec![InlineStyle::Italic]
        );
    }
}
