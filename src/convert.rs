//! Conversion between [`tdoc`] documents and [`DocumentTree`]s, used to load
//! and save FTML and Markdown files.
//!
//! Checklists become unordered lists whose items carry a `data-checked`
//! attribute. Colors, rules and images have no tdoc counterpart and are
//! dropped on export.

use tdoc::{ChecklistItem, Document, InlineStyle as DocStyle, Paragraph, Span as DocSpan};

use crate::tree::{Atomic, CHECKED_ATTR, DocumentTree, Element, NodeId, NodeKind, Tag};

pub fn from_tdoc(document: &Document) -> DocumentTree {
    let mut tree = DocumentTree::new();
    let root = tree.root();
    for paragraph in &document.paragraphs {
        import_paragraph(&mut tree, root, paragraph);
    }
    tree.normalize(root);
    tree
}

pub fn to_tdoc(tree: &DocumentTree) -> Document {
    let paragraphs = tree
        .children(tree.root())
        .iter()
        .filter_map(|block| export_block(tree, *block))
        .collect();
    Document::new().with_paragraphs(paragraphs)
}

fn paragraph_spans(paragraph: &Paragraph) -> Option<&Vec<DocSpan>> {
    match paragraph {
        Paragraph::Text { content }
        | Paragraph::Header1 { content }
        | Paragraph::Header2 { content }
        | Paragraph::Header3 { content }
        | Paragraph::CodeBlock { content } => Some(content),
        _ => None,
    }
}

fn import_paragraph(tree: &mut DocumentTree, parent: NodeId, paragraph: &Paragraph) {
    let tag = match paragraph {
        Paragraph::Text { .. } => Tag::Paragraph,
        Paragraph::Header1 { .. } => Tag::Heading(1),
        Paragraph::Header2 { .. } => Tag::Heading(2),
        Paragraph::Header3 { .. } => Tag::Heading(3),
        Paragraph::CodeBlock { .. } => Tag::CodeBlock,
        Paragraph::Quote { children } => {
            for child in children {
                match paragraph_spans(child) {
                    Some(content) => {
                        let quote = tree.append_element(parent, Element::new(Tag::Quote));
                        import_spans(tree, quote, content, false);
                    }
                    None => import_paragraph(tree, parent, child),
                }
            }
            return;
        }
        Paragraph::OrderedList { entries } => {
            import_list(tree, parent, Tag::OrderedList, entries);
            return;
        }
        Paragraph::UnorderedList { entries } => {
            import_list(tree, parent, Tag::UnorderedList, entries);
            return;
        }
        Paragraph::Checklist { items } => {
            import_checklist(tree, parent, items);
            return;
        }
    };
    let block = tree.append_element(parent, Element::new(tag));
    if let Some(content) = paragraph_spans(paragraph) {
        import_spans(tree, block, content, tag == Tag::CodeBlock);
    }
}

/// Nested lists land in the enclosing list, right after the item they
/// belong to.
fn import_list(tree: &mut DocumentTree, parent: NodeId, tag: Tag, entries: &[Vec<Paragraph>]) {
    let list = tree.append_element(parent, Element::new(tag));
    for entry in entries {
        let item = tree.append_element(list, Element::new(Tag::ListItem));
        for paragraph in entry {
            match paragraph {
                Paragraph::OrderedList { entries } => {
                    import_list(tree, list, Tag::OrderedList, entries)
                }
                Paragraph::UnorderedList { entries } => {
                    import_list(tree, list, Tag::UnorderedList, entries)
                }
                Paragraph::Checklist { items } => import_checklist(tree, list, items),
                Paragraph::Quote { children } => {
                    for child in children.iter().filter_map(paragraph_spans) {
                        append_to_item(tree, item, child);
                    }
                }
                other => {
                    if let Some(content) = paragraph_spans(other) {
                        append_to_item(tree, item, content);
                    }
                }
            }
        }
    }
}

fn append_to_item(tree: &mut DocumentTree, item: NodeId, content: &[DocSpan]) {
    if !tree.children(item).is_empty() {
        tree.append_atomic(item, Atomic::LineBreak);
    }
    import_spans(tree, item, content, false);
}

fn import_checklist(tree: &mut DocumentTree, parent: NodeId, items: &[ChecklistItem]) {
    let list = tree.append_element(parent, Element::new(Tag::UnorderedList));
    for item in items {
        let element =
            Element::new(Tag::ListItem).with_attr(CHECKED_ATTR, item.checked.to_string());
        let node = tree.append_element(list, element);
        import_spans(tree, node, &item.content, false);
        if !item.children.is_empty() {
            import_checklist(tree, list, &item.children);
        }
    }
}

fn import_spans(tree: &mut DocumentTree, parent: NodeId, spans: &[DocSpan], code: bool) {
    for span in spans {
        let target = match inline_element(span) {
            Some(element) => tree.append_element(parent, element),
            None => parent,
        };
        import_text(tree, target, &span.text, code);
        import_spans(tree, target, &span.children, code);
    }
}

fn import_text(tree: &mut DocumentTree, parent: NodeId, text: &str, code: bool) {
    if code {
        if !text.is_empty() {
            tree.append_text(parent, text);
        }
        return;
    }
    for (idx, piece) in text.split('\n').enumerate() {
        if idx > 0 {
            tree.append_atomic(parent, Atomic::LineBreak);
        }
        if !piece.is_empty() {
            tree.append_text(parent, piece);
        }
    }
}

fn inline_element(span: &DocSpan) -> Option<Element> {
    let tag = match span.style {
        DocStyle::None => return None,
        DocStyle::Bold => Tag::Bold,
        DocStyle::Italic => Tag::Italic,
        DocStyle::Highlight => Tag::Highlight,
        DocStyle::Underline => Tag::Underline,
        DocStyle::Strike => Tag::Strike,
        DocStyle::Code => Tag::Code,
        DocStyle::Link => {
            let element = Element::new(Tag::Link);
            return Some(match &span.link_target {
                Some(target) => element.with_attr("href", target.clone()),
                None => element,
            });
        }
    };
    Some(Element::new(tag))
}

fn export_block(tree: &DocumentTree, block: NodeId) -> Option<Paragraph> {
    let paragraph = match tree.tag(block)? {
        Tag::Paragraph => Paragraph::Text {
            content: export_spans(tree, block),
        },
        Tag::Heading(1) => Paragraph::Header1 {
            content: export_spans(tree, block),
        },
        Tag::Heading(2) => Paragraph::Header2 {
            content: export_spans(tree, block),
        },
        Tag::Heading(_) => Paragraph::Header3 {
            content: export_spans(tree, block),
        },
        Tag::CodeBlock => Paragraph::CodeBlock {
            content: export_spans(tree, block),
        },
        Tag::Quote => Paragraph::Quote {
            children: vec![Paragraph::Text {
                content: export_spans(tree, block),
            }],
        },
        Tag::UnorderedList if is_checklist(tree, block) => Paragraph::Checklist {
            items: export_checklist(tree, block),
        },
        Tag::UnorderedList => Paragraph::UnorderedList {
            entries: export_entries(tree, block),
        },
        Tag::OrderedList => Paragraph::OrderedList {
            entries: export_entries(tree, block),
        },
        other => {
            log::debug!("not exporting stray {other} block");
            return None;
        }
    };
    Some(paragraph)
}

fn is_checklist(tree: &DocumentTree, list: NodeId) -> bool {
    let items: Vec<NodeId> = tree
        .children(list)
        .iter()
        .copied()
        .filter(|child| tree.tag(*child) == Some(Tag::ListItem))
        .collect();
    !items.is_empty()
        && items.iter().all(|item| {
            tree.element(*item)
                .and_then(|element| element.attr(CHECKED_ATTR))
                .is_some()
        })
}

fn export_entries(tree: &DocumentTree, list: NodeId) -> Vec<Vec<Paragraph>> {
    let mut entries: Vec<Vec<Paragraph>> = Vec::new();
    for child in tree.children(list) {
        match tree.tag(*child) {
            Some(Tag::ListItem) => entries.push(vec![Paragraph::Text {
                content: export_spans(tree, *child),
            }]),
            Some(tag) if tag.is_list() => {
                let nested = export_block(tree, *child);
                match entries.last_mut() {
                    Some(entry) => entry.extend(nested),
                    None => entries.push(nested.into_iter().collect()),
                }
            }
            _ => {}
        }
    }
    entries
}

fn export_checklist(tree: &DocumentTree, list: NodeId) -> Vec<ChecklistItem> {
    let mut items: Vec<ChecklistItem> = Vec::new();
    for child in tree.children(list) {
        match tree.tag(*child) {
            Some(Tag::ListItem) => {
                let checked = tree
                    .element(*child)
                    .and_then(|element| element.attr(CHECKED_ATTR))
                    == Some("true");
                items.push(ChecklistItem::new(checked).with_content(export_spans(tree, *child)));
            }
            Some(tag) if tag.is_list() => {
                let nested = export_checklist(tree, *child);
                match items.last_mut() {
                    Some(item) => item.children.extend(nested),
                    None => items.extend(nested),
                }
            }
            _ => {}
        }
    }
    items
}

fn export_spans(tree: &DocumentTree, node: NodeId) -> Vec<DocSpan> {
    let mut spans = Vec::new();
    for child in tree.children(node) {
        match tree.kind(*child) {
            NodeKind::Text(text) => spans.push(DocSpan::new_text(text.clone())),
            NodeKind::Atomic(Atomic::LineBreak) => spans.push(DocSpan::new_text("\n")),
            NodeKind::Atomic(_) => {}
            NodeKind::Element(element) => {
                if element.tag.is_block() {
                    continue;
                }
                let mut span = DocSpan::new_text("");
                span.style = match element.tag {
                    Tag::Bold => DocStyle::Bold,
                    Tag::Italic => DocStyle::Italic,
                    Tag::Underline => DocStyle::Underline,
                    Tag::Strike => DocStyle::Strike,
                    Tag::Code => DocStyle::Code,
                    Tag::Highlight => DocStyle::Highlight,
                    Tag::Link => DocStyle::Link,
                    _ => DocStyle::None,
                };
                span.link_target = element.attr("href").map(str::to_string);
                span.children = export_spans(tree, *child);
                spans.push(span);
            }
        }
    }
    spans
}
