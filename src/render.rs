use std::collections::HashMap;
use std::str::FromStr;

use ratatui::{
    style::{Color, Modifier, Style},
    text::{Line, Span},
};
use unicode_width::UnicodeWidthChar;

use crate::selection::{Boundary, SelectionSpan};
use crate::session::EditorSession;
use crate::theme::Theme;
use crate::tree::{Atomic, CHECKED_ATTR, DocumentTree, Element, NodeId, NodeKind, Tag};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CursorVisualPosition {
    pub line: usize,
    pub column: u16,
}

#[derive(Debug)]
pub struct RenderResult {
    pub lines: Vec<Line<'static>>,
    pub cursor: Option<CursorVisualPosition>,
    pub total_lines: usize,
}

pub fn render_session(session: &EditorSession, width: usize, theme: &Theme) -> RenderResult {
    render_document(
        session.tree(),
        session.selection(),
        session.focus(),
        width,
        session.config().tab_width,
        theme,
    )
}

/// Lays the document out as terminal lines of at most `width` columns.
///
/// `selection` is painted with the theme's selection colors and `focus`
/// determines where the cursor ends up.
pub fn render_document(
    tree: &DocumentTree,
    selection: Option<SelectionSpan>,
    focus: Option<Boundary>,
    width: usize,
    tab_width: usize,
    theme: &Theme,
) -> RenderResult {
    let mut renderer = Renderer::new(tree, theme, width.max(1), tab_width);
    renderer.focus = focus;
    if let Some(span) = selection.filter(|span| !span.is_caret()) {
        renderer.select(span);
    }
    renderer.render_lines();
    renderer.finish()
}

/// Position in document order: content leaf rank plus char offset.
type OrderedPosition = (usize, usize);

struct Renderer<'a> {
    tree: &'a DocumentTree,
    theme: &'a Theme,
    wrap_width: usize,
    tab_width: usize,
    focus: Option<Boundary>,
    leaf_order: HashMap<NodeId, usize>,
    selected: Option<(OrderedPosition, OrderedPosition)>,
    cursor: Option<CursorVisualPosition>,
    lines: Vec<Line<'static>>,
}

impl<'a> Renderer<'a> {
    fn new(tree: &'a DocumentTree, theme: &'a Theme, wrap_width: usize, tab_width: usize) -> Self {
        Self {
            tree,
            theme,
            wrap_width,
            tab_width,
            focus: None,
            leaf_order: HashMap::new(),
            selected: None,
            cursor: None,
            lines: Vec::new(),
        }
    }

    fn select(&mut self, span: SelectionSpan) {
        let mut rank = 0;
        let mut current = self.tree.first_content_leaf(self.tree.root());
        while let Some(leaf) = current {
            self.leaf_order.insert(leaf, rank);
            rank += 1;
            current = self.tree.next_content_leaf(leaf, None);
        }
        self.selected = self
            .ordered(span.start())
            .zip(self.ordered(span.end()));
    }

    fn ordered(&self, boundary: Boundary) -> Option<OrderedPosition> {
        let rank = *self.leaf_order.get(&boundary.node())?;
        Some(match boundary {
            Boundary::Text { offset, .. } => (rank, offset),
            Boundary::Before(_) => (rank, 0),
            Boundary::After(_) => (rank, 1),
        })
    }

    fn is_selected(&self, leaf: NodeId, offset: usize) -> bool {
        let Some((start, end)) = self.selected else {
            return false;
        };
        self.leaf_order
            .get(&leaf)
            .is_some_and(|rank| start <= (*rank, offset) && (*rank, offset) < end)
    }

    fn render_lines(&mut self) {
        for (idx, line) in self.tree.lines().into_iter().enumerate() {
            if idx > 0 {
                self.push_blank_line();
            }
            self.render_line(line);
        }
    }

    fn render_line(&mut self, line: NodeId) {
        let Some(tag) = self.tree.tag(line) else {
            return;
        };
        let base = if tag == Tag::CodeBlock {
            self.theme.code_style()
        } else {
            Style::default()
        };
        let mut tokenizer = Tokenizer::new(self.tab_width);
        self.collect_fragments(line, base, &mut tokenizer);
        let fragments = tokenizer.finish();

        match tag {
            Tag::Heading(level) => self.render_heading(&fragments, level),
            Tag::CodeBlock => self.render_code_block(&fragments),
            Tag::Quote => {
                let lines = wrap_fragments(&fragments, "| ", "| ", self.marker_style(), self.wrap_width);
                self.consume_lines(lines);
            }
            Tag::ListItem => {
                let (first_prefix, continuation_prefix) = self.list_prefixes(line);
                let lines = wrap_fragments(
                    &fragments,
                    &first_prefix,
                    &continuation_prefix,
                    self.marker_style(),
                    self.wrap_width,
                );
                self.consume_lines(lines);
            }
            _ => {
                let lines = wrap_fragments(&fragments, "", "", Style::default(), self.wrap_width);
                self.consume_lines(lines);
            }
        }
    }

    fn marker_style(&self) -> Style {
        self.theme.marker_style()
    }

    fn render_heading(&mut self, fragments: &[FragmentItem], level: u8) {
        let mut lines = wrap_fragments(fragments, "", "", Style::default(), self.wrap_width);
        for line in &mut lines {
            for segment in &mut line.spans {
                segment.style = segment.style.add_modifier(Modifier::BOLD);
            }
        }
        self.consume_lines(lines);

        let underline_char = match level {
            1 => return,
            2 => '=',
            _ => '-',
        };
        let width = self.lines.last().map(line_width).unwrap_or(0);
        self.push_plain_line(&underline_string(width, underline_char));
    }

    fn render_code_block(&mut self, fragments: &[FragmentItem]) {
        let fence = self.code_block_fence();
        self.push_plain_line(&fence);
        let lines = wrap_fragments(fragments, "", "", Style::default(), usize::MAX / 4);
        self.consume_lines(lines);
        self.push_plain_line(&fence);
    }

    /// Bullet, number or checkbox of a list item, indented by nesting depth.
    fn list_prefixes(&self, item: NodeId) -> (String, String) {
        let depth = self
            .tree
            .ancestors(item)
            .filter(|ancestor| self.tree.tag(*ancestor).is_some_and(Tag::is_list))
            .count();
        let indent = "  ".repeat(depth.saturating_sub(1));
        let checked = self
            .tree
            .element(item)
            .and_then(|element| element.attr(CHECKED_ATTR));
        let parent = self.tree.parent(item);
        let marker = match checked {
            Some("true") => "[✓] ".to_string(),
            Some(_) => "[ ] ".to_string(),
            None if parent.and_then(|list| self.tree.tag(list)) == Some(Tag::OrderedList) => {
                let ordinal = parent
                    .map(|list| {
                        self.tree
                            .children(list)
                            .iter()
                            .take_while(|sibling| **sibling != item)
                            .filter(|sibling| self.tree.tag(**sibling) == Some(Tag::ListItem))
                            .count()
                    })
                    .unwrap_or(0);
                format!("{}. ", ordinal + 1)
            }
            None => "• ".to_string(),
        };
        let continuation = " ".repeat(visible_width(&marker));
        (format!("{indent}{marker}"), format!("{indent}{continuation}"))
    }

    fn collect_fragments(&self, node: NodeId, style: Style, tokenizer: &mut Tokenizer) {
        for child in self.tree.children(node) {
            let child = *child;
            match self.tree.kind(child) {
                NodeKind::Text(text) => self.collect_text(child, text, style, tokenizer),
                NodeKind::Atomic(atomic) => self.collect_atomic(child, atomic, style, tokenizer),
                NodeKind::Element(element) if element.tag.is_block() => {}
                NodeKind::Element(element) => {
                    let style = self.merge_style(style, element);
                    self.collect_fragments(child, style, tokenizer);
                }
            }
        }
    }

    fn collect_text(&self, leaf: NodeId, text: &str, style: Style, tokenizer: &mut Tokenizer) {
        let mut len = 0;
        for (offset, ch) in text.chars().enumerate() {
            if self.focus == Some(Boundary::Text { leaf, offset }) {
                tokenizer.cursor();
            }
            tokenizer.push_char(ch, self.selection_aware(style, leaf, offset));
            len = offset + 1;
        }
        if self.focus == Some(Boundary::Text { leaf, offset: len }) {
            tokenizer.cursor();
        }
    }

    fn collect_atomic(&self, node: NodeId, atomic: &Atomic, style: Style, tokenizer: &mut Tokenizer) {
        if self.focus == Some(Boundary::Before(node)) {
            tokenizer.cursor();
        }
        let style = self.selection_aware(style, node, 0);
        match atomic {
            Atomic::LineBreak if !self.tree.is_placeholder(node) => tokenizer.line_break(),
            Atomic::LineBreak | Atomic::Marker => {}
            Atomic::Rule => tokenizer.push_str("───", style),
            Atomic::Image { .. } => tokenizer.push_str("[image]", style),
        }
        if self.focus == Some(Boundary::After(node)) {
            tokenizer.cursor();
        }
    }

    fn selection_aware(&self, style: Style, leaf: NodeId, offset: usize) -> Style {
        if self.is_selected(leaf, offset) {
            style.patch(self.theme.selection_style())
        } else {
            style
        }
    }

    fn merge_style(&self, base: Style, element: &Element) -> Style {
        match element.tag {
            Tag::Bold => base.add_modifier(Modifier::BOLD),
            Tag::Italic => base.add_modifier(Modifier::ITALIC),
            Tag::Underline => base.add_modifier(Modifier::UNDERLINED),
            Tag::Strike => base.add_modifier(Modifier::CROSSED_OUT),
            Tag::Code => base.patch(self.theme.code_style()),
            Tag::Highlight => base.patch(self.theme.highlight_style()),
            Tag::Link => base.patch(self.theme.link_style()),
            Tag::Styled => match element.attr("color").map(Color::from_str) {
                Some(Ok(color)) => base.fg(color),
                _ => base,
            },
            _ => base,
        }
    }

    fn push_blank_line(&mut self) {
        self.lines.push(Line::from(""));
    }

    fn push_plain_line(&mut self, content: &str) {
        let span = Span::styled(content.to_string(), self.marker_style());
        self.lines.push(Line::from(vec![span]));
    }

    fn code_block_fence(&self) -> String {
        const MIN_FENCE_WIDTH: usize = 4;
        "-".repeat(self.wrap_width.max(MIN_FENCE_WIDTH))
    }

    fn consume_lines(&mut self, outputs: Vec<LineOutput>) {
        for output in outputs {
            let spans: Vec<Span<'static>> = output
                .spans
                .into_iter()
                .map(|segment| Span::styled(segment.text, segment.style))
                .collect();
            if let Some(column) = output.cursor {
                self.cursor = Some(CursorVisualPosition {
                    line: self.lines.len(),
                    column,
                });
            }
            self.lines.push(Line::from(spans));
        }
    }

    fn finish(mut self) -> RenderResult {
        if self.lines.is_empty() {
            self.lines.push(Line::from(""));
        }
        let total_lines = self.lines.len();
        RenderResult {
            lines: self.lines,
            cursor: self.cursor,
            total_lines,
        }
    }
}

#[derive(Clone)]
struct LineSegment {
    text: String,
    style: Style,
}

struct LineOutput {
    spans: Vec<LineSegment>,
    cursor: Option<u16>,
}

#[derive(Clone)]
struct Fragment {
    segments: Vec<LineSegment>,
    kind: FragmentKind,
    width: usize,
    cursor: Option<usize>,
}

#[derive(Clone, Copy)]
enum FragmentKind {
    Word,
    Whitespace,
}

#[derive(Clone)]
enum FragmentItem {
    Token(Fragment),
    LineBreak,
}

/// Splits a line's characters into words and whitespace runs. Tokens run
/// across leaf boundaries so styled parts of a word wrap together.
struct Tokenizer {
    tab_width: usize,
    builder: Option<TokenBuilder>,
    pending_cursor: bool,
    fragments: Vec<FragmentItem>,
}

impl Tokenizer {
    fn new(tab_width: usize) -> Self {
        Self {
            tab_width: tab_width.max(1),
            builder: None,
            pending_cursor: false,
            fragments: Vec::new(),
        }
    }

    fn cursor(&mut self) {
        self.pending_cursor = true;
    }

    fn push_str(&mut self, text: &str, style: Style) {
        for ch in text.chars() {
            self.push_char(ch, style);
        }
    }

    fn push_char(&mut self, ch: char, style: Style) {
        match ch {
            '\r' => {}
            '\n' => self.line_break(),
            '\t' => {
                for _ in 0..self.tab_width {
                    self.push_visible(' ', style);
                }
            }
            _ => self.push_visible(ch, style),
        }
    }

    fn push_visible(&mut self, ch: char, style: Style) {
        let is_whitespace = ch.is_whitespace();
        let continues = self
            .builder
            .as_ref()
            .is_some_and(|builder| builder.kind_matches(is_whitespace));
        if !continues {
            self.flush();
        }
        let builder = self
            .builder
            .get_or_insert_with(|| TokenBuilder::new(is_whitespace));
        if std::mem::take(&mut self.pending_cursor) {
            builder.mark_cursor();
        }
        builder.push_char(ch, style);
    }

    fn line_break(&mut self) {
        self.flush_with_cursor();
        self.fragments.push(FragmentItem::LineBreak);
    }

    fn flush(&mut self) {
        if let Some(builder) = self.builder.take() {
            self.fragments.push(FragmentItem::Token(builder.finish()));
        }
    }

    fn flush_with_cursor(&mut self) {
        if let Some(builder) = self.builder.as_mut() {
            if std::mem::take(&mut self.pending_cursor) {
                builder.mark_cursor();
            }
        }
        self.flush();
        if std::mem::take(&mut self.pending_cursor) {
            self.fragments.push(FragmentItem::Token(Fragment {
                segments: Vec::new(),
                kind: FragmentKind::Word,
                width: 0,
                cursor: Some(0),
            }));
        }
    }

    fn finish(mut self) -> Vec<FragmentItem> {
        self.flush_with_cursor();
        self.fragments
    }
}

struct TokenBuilder {
    segments: Vec<LineSegment>,
    kind: FragmentKind,
    width: usize,
    cursor: Option<usize>,
}

impl TokenBuilder {
    fn new(is_whitespace: bool) -> Self {
        Self {
            segments: Vec::new(),
            kind: if is_whitespace {
                FragmentKind::Whitespace
            } else {
                FragmentKind::Word
            },
            width: 0,
            cursor: None,
        }
    }

    fn kind_matches(&self, is_whitespace: bool) -> bool {
        matches!(
            (self.kind, is_whitespace),
            (FragmentKind::Whitespace, true) | (FragmentKind::Word, false)
        )
    }

    fn mark_cursor(&mut self) {
        self.cursor = Some(self.width);
    }

    fn push_char(&mut self, ch: char, style: Style) {
        match self.segments.last_mut() {
            Some(segment) if segment.style == style => segment.text.push(ch),
            _ => self.segments.push(LineSegment {
                text: ch.to_string(),
                style,
            }),
        }
        self.width += UnicodeWidthChar::width(ch).unwrap_or(0);
    }

    fn finish(self) -> Fragment {
        Fragment {
            segments: self.segments,
            kind: self.kind,
            width: self.width,
            cursor: self.cursor,
        }
    }
}

fn wrap_fragments(
    fragments: &[FragmentItem],
    first_prefix: &str,
    continuation_prefix: &str,
    prefix_style: Style,
    width: usize,
) -> Vec<LineOutput> {
    let mut outputs = Vec::new();
    let mut builder = LineBuilder::new(first_prefix, prefix_style);
    let mut pending_whitespace: Vec<Fragment> = Vec::new();

    for fragment in fragments {
        match fragment {
            FragmentItem::LineBreak => {
                builder.consume_pending(&mut pending_whitespace);
                outputs.push(builder.build_line());
                builder = LineBuilder::new(continuation_prefix, prefix_style);
            }
            FragmentItem::Token(token) => match token.kind {
                FragmentKind::Whitespace => {
                    pending_whitespace.push(token.clone());
                }
                FragmentKind::Word => {
                    let whitespace_width: usize =
                        pending_whitespace.iter().map(|item| item.width).sum();
                    if builder.width > builder.prefix_width
                        && builder.width + whitespace_width + token.width > width
                    {
                        builder.consume_pending(&mut pending_whitespace);
                        outputs.push(builder.build_line());
                        builder = LineBuilder::new(continuation_prefix, prefix_style);
                    }
                    builder.consume_pending(&mut pending_whitespace);
                    builder.append_token(token.clone());
                }
            },
        }
    }

    builder.consume_pending(&mut pending_whitespace);
    outputs.push(builder.build_line());
    outputs
}

struct LineBuilder {
    segments: Vec<LineSegment>,
    cursor: Option<u16>,
    width: usize,
    prefix_width: usize,
}

impl LineBuilder {
    fn new(prefix: &str, prefix_style: Style) -> Self {
        let prefix_width = visible_width(prefix);
        let mut segments = Vec::new();
        if !prefix.is_empty() {
            segments.push(LineSegment {
                text: prefix.to_string(),
                style: prefix_style,
            });
        }
        Self {
            segments,
            cursor: None,
            width: prefix_width,
            prefix_width,
        }
    }

    fn consume_pending(&mut self, pending_whitespace: &mut Vec<Fragment>) {
        for fragment in pending_whitespace.drain(..) {
            self.append_token(fragment);
        }
    }

    fn append_token(&mut self, fragment: Fragment) {
        let start = self.width;
        if let Some(offset) = fragment.cursor {
            self.cursor = Some((start + offset).min(u16::MAX as usize) as u16);
        }
        self.segments.extend(fragment.segments);
        self.width += fragment.width;
    }

    fn build_line(mut self) -> LineOutput {
        if self.segments.is_empty() {
            self.segments.push(LineSegment {
                text: String::new(),
                style: Style::default(),
            });
        }
        LineOutput {
            spans: self.segments,
            cursor: self.cursor,
        }
    }
}

fn visible_width(text: &str) -> usize {
    text.chars()
        .map(|ch| UnicodeWidthChar::width(ch).unwrap_or(0))
        .sum()
}

fn line_width(line: &Line<'_>) -> usize {
    line.spans
        .iter()
        .map(|span| visible_width(span.content.as_ref()))
        .sum()
}

fn underline_string(width: usize, ch: char) -> String {
    std::iter::repeat_n(ch, width.max(1)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::parse_markup;
    use pretty_assertions::assert_eq;

    fn plain(result: &RenderResult) -> Vec<String> {
        result
            .lines
            .iter()
            .map(|line| {
                line.spans
                    .iter()
                    .map(|span| span.content.as_ref())
                    .collect::<String>()
                    .trim_end()
                    .to_string()
            })
            .collect()
    }

    fn render(markup: &str, width: usize) -> RenderResult {
        let tree = parse_markup(markup).unwrap();
        render_document(&tree, None, None, width, 4, &Theme::default())
    }

    fn leaf_of_line(tree: &DocumentTree, line: usize) -> NodeId {
        tree.first_content_leaf(tree.lines()[line]).unwrap()
    }

    #[test]
    fn lines_are_separated_by_blank_lines() {
        assert_eq!(plain(&render("<p>hello</p><p>world</p>", 40)), ["hello", "", "world"]);
    }

    #[test]
    fn long_lines_wrap_at_word_boundaries() {
        assert_eq!(plain(&render("<p>aaa bbb ccc</p>", 7)), ["aaa bbb", "ccc"]);
    }

    #[test]
    fn line_breaks_start_new_rows() {
        assert_eq!(plain(&render("<p>a<br/>b</p>", 40)), ["a", "b"]);
    }

    #[test]
    fn list_items_get_markers() {
        let result = render(
            "<ol><li>one</li><li>two</li></ol><ul><li data-checked=\"true\">done</li></ul>",
            40,
        );
        assert_eq!(plain(&result), ["1. one", "", "2. two", "", "[✓] done"]);
    }

    #[test]
    fn nested_lists_are_indented() {
        let result = render("<ul><li>a</li><ul><li>b</li></ul></ul>", 40);
        assert_eq!(plain(&result), ["• a", "", "  • b"]);
    }

    #[test]
    fn headings_are_underlined_below_the_first_level() {
        assert_eq!(plain(&render("<h2>Title</h2>", 40)), ["Title", "====="]);
        assert_eq!(plain(&render("<h1>Title</h1>", 40)), ["Title"]);
    }

    #[test]
    fn code_blocks_are_fenced_and_not_wrapped() {
        let result = render("<pre>a b c</pre>", 4);
        assert_eq!(plain(&result), ["----", "a b c", "----"]);
    }

    #[test]
    fn cursor_follows_the_focus() {
        let tree = parse_markup("<p>ab</p><p>cd</p>").unwrap();
        let focus = Boundary::Text {
            leaf: leaf_of_line(&tree, 1),
            offset: 1,
        };
        let result = render_document(&tree, None, Some(focus), 40, 4, &Theme::default());
        assert_eq!(result.cursor, Some(CursorVisualPosition { line: 2, column: 1 }));
    }

    #[test]
    fn cursor_sits_on_an_empty_line() {
        let tree = parse_markup("<p><br/></p>").unwrap();
        let br = leaf_of_line(&tree, 0);
        let result =
            render_document(&tree, None, Some(Boundary::Before(br)), 40, 4, &Theme::default());
        assert_eq!(plain(&result), [""]);
        assert_eq!(result.cursor, Some(CursorVisualPosition { line: 0, column: 0 }));
    }

    #[test]
    fn cursor_after_list_marker() {
        let tree = parse_markup("<ul><li>x</li></ul>").unwrap();
        let leaf = leaf_of_line(&tree, 0);
        let focus = Boundary::Text { leaf, offset: 1 };
        let result = render_document(&tree, None, Some(focus), 40, 4, &Theme::default());
        assert_eq!(result.cursor, Some(CursorVisualPosition { line: 0, column: 3 }));
    }

    #[test]
    fn selection_is_painted() {
        let tree = parse_markup("<p>abc</p>").unwrap();
        let leaf = leaf_of_line(&tree, 0);
        let theme = Theme::default();
        let span = SelectionSpan::new(
            &tree,
            Boundary::Text { leaf, offset: 1 },
            Boundary::Text { leaf, offset: 2 },
        );
        let result = render_document(&tree, Some(span), None, 40, 4, &theme);
        let spans = &result.lines[0].spans;
        assert_eq!(spans.len(), 3);
        assert_eq!(spans[1].content, "b");
        assert_eq!(spans[1].style.bg, Some(theme.selection_bg));
        assert_eq!(spans[0].style.bg, None);
    }

    #[test]
    fn inline_styles_map_to_modifiers() {
        let result = render("<p><b>x</b><span color=\"red\">y</span></p>", 40);
        let spans = &result.lines[0].spans;
        assert!(spans[0].style.add_modifier.contains(Modifier::BOLD));
        assert_eq!(spans[1].style.fg, Some(Color::Red));
    }

    #[test]
    fn tabs_expand_to_the_configured_width() {
        let tree = parse_markup("<pre>\tx</pre>").unwrap();
        let result = render_document(&tree, None, None, 40, 2, &Theme::default());
        assert_eq!(plain(&result)[1], "  x");
    }
}
