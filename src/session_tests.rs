use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;

use super::*;
use crate::format::{BlockStyle, InlineStyle};
use crate::selection::LivePoint;
use crate::tree::{Element, NodeId};

fn open(markup: &str) -> EditorSession {
    EditorSession::from_markup(markup, EditorConfig::default()).expect("valid markup")
}

fn leaf(session: &EditorSession, block_idx: usize) -> NodeId {
    let tree = session.tree();
    tree.first_leaf(tree.children(tree.root())[block_idx])
        .expect("block has a leaf")
}

fn caret_at(session: &mut EditorSession, leaf: NodeId, offset: usize) {
    session.set_selection(SelectionSpan::caret(Boundary::Text { leaf, offset }));
}

fn select(session: &mut EditorSession, start: (NodeId, usize), end: (NodeId, usize)) {
    let span = SelectionSpan::new(
        session.tree(),
        Boundary::Text {
            leaf: start.0,
            offset: start.1,
        },
        Boundary::Text {
            leaf: end.0,
            offset: end.1,
        },
    );
    session.set_selection(span);
}

fn focus_text(session: &EditorSession) -> (String, usize) {
    match session.focus().expect("focus") {
        Boundary::Text { leaf, offset } => {
            (session.tree().text(leaf).unwrap_or_default().to_string(), offset)
        }
        other => panic!("focus is not in text: {other:?}"),
    }
}

struct WrapFirstWord;

impl Highlighter for WrapFirstWord {
    fn highlight(
        &mut self,
        tree: &mut DocumentTree,
        code_block: NodeId,
    ) -> Result<(), HighlightError> {
        let Some(leaf) = tree.first_content_leaf(code_block) else {
            return Ok(());
        };
        let Some(word_len) = tree.text(leaf).and_then(|text| text.find(' ')) else {
            return Ok(());
        };
        tree.split_text(leaf, word_len);
        let span = tree.create_element(Element::new(Tag::Styled).with_attr("color", "blue"));
        tree.insert_before(leaf, span);
        tree.append_child(span, leaf);
        Ok(())
    }
}

struct Untouched;

impl Highlighter for Untouched {
    fn highlight(&mut self, _: &mut DocumentTree, _: NodeId) -> Result<(), HighlightError> {
        Ok(())
    }
}

struct Failing;

impl Highlighter for Failing {
    fn highlight(&mut self, _: &mut DocumentTree, _: NodeId) -> Result<(), HighlightError> {
        Err(HighlightError::new("lexer exploded"))
    }
}

#[test]
fn new_sessions_place_the_caret_at_the_start() {
    let session = EditorSession::new(DocumentTree::new(), EditorConfig::default());
    assert_eq!(session.content(), "<p><br/></p>");
    let br = session.tree().first_content_leaf(session.tree().root()).unwrap();
    assert_eq!(session.focus(), Some(Boundary::Before(br)));
}

#[test]
fn typing_undo_and_redo_restore_text_and_caret() {
    let mut session = open("<p>ab</p>");
    let ab = leaf(&session, 0);
    caret_at(&mut session, ab, 1);

    assert!(session.insert_text("X").unwrap());
    assert_eq!(session.content(), "<p>aXb</p>");
    assert_eq!(focus_text(&session), ("aXb".to_string(), 2));

    assert!(session.undo().unwrap());
    assert_eq!(session.content(), "<p>ab</p>");
    assert_eq!(focus_text(&session), ("ab".to_string(), 1));

    assert!(session.redo().unwrap());
    assert_eq!(session.content(), "<p>aXb</p>");
    assert_eq!(focus_text(&session), ("aXb".to_string(), 2));

    assert!(!session.redo().unwrap());
}

#[test]
fn typing_into_an_empty_line_replaces_its_placeholder() {
    let mut session = EditorSession::new(DocumentTree::new(), EditorConfig::default());
    session.insert_text("hi").unwrap();
    assert_eq!(session.content(), "<p>hi</p>");

    session.undo().unwrap();
    assert_eq!(session.content(), "<p><br/></p>");
    let br = session.tree().first_content_leaf(session.tree().root()).unwrap();
    assert_eq!(session.focus(), Some(Boundary::Before(br)));
}

#[test]
fn nested_records_form_a_single_step() {
    let mut session = open("<p>ab</p>");
    let ab = leaf(&session, 0);
    caret_at(&mut session, ab, 2);

    session
        .record(|session| {
            session.insert_text("c")?;
            session.insert_text("d")
        })
        .unwrap();
    assert_eq!(session.content(), "<p>abcd</p>");
    assert_eq!(session.history().undo_depth(), 1);

    session.undo().unwrap();
    assert_eq!(session.content(), "<p>ab</p>");
}

#[test]
fn failed_or_empty_edits_record_nothing() {
    let mut session = open("<p>ab</p>");
    assert!(!session.insert_text("").unwrap());
    session.set_live_selection(None);
    assert!(matches!(session.insert_text("x"), Err(EditError::NoSelection)));
    assert!(!session.can_undo());
}

#[test]
fn history_is_bounded_by_the_configured_capacity() {
    let config = EditorConfig {
        history_capacity: 2,
        ..EditorConfig::default()
    };
    let mut session = EditorSession::from_markup("<p>a</p>", config).unwrap();
    let a = leaf(&session, 0);
    caret_at(&mut session, a, 1);
    for ch in ["b", "c", "d"] {
        session.insert_text(ch).unwrap();
    }
    assert_eq!(session.history().undo_depth(), 2);
    while session.undo().unwrap() {}
    assert_eq!(session.content(), "<p>ab</p>");
}

#[test]
fn split_block_in_the_middle_of_a_line() {
    let mut session = open("<p>abcd</p>");
    let text = leaf(&session, 0);
    caret_at(&mut session, text, 2);

    session.split_block().unwrap();
    assert_eq!(session.content(), "<p>ab</p><p>cd</p>");
    assert_eq!(focus_text(&session), ("cd".to_string(), 0));
}

#[test]
fn split_block_after_a_heading_continues_with_a_paragraph() {
    let mut session = open("<h1>Title</h1>");
    let text = leaf(&session, 0);
    caret_at(&mut session, text, 5);

    session.split_block().unwrap();
    assert_eq!(session.content(), "<h1>Title</h1><p><br/></p>");
    let br = leaf(&session, 1);
    assert_eq!(session.focus(), Some(Boundary::Before(br)));
}

#[test]
fn split_block_in_code_inserts_a_newline() {
    let mut session = open("<pre>ab</pre>");
    let text = leaf(&session, 0);
    caret_at(&mut session, text, 1);

    session.split_block().unwrap();
    assert_eq!(session.content(), "<pre>a\nb</pre>");
}

#[test]
fn enter_on_an_empty_list_item_leaves_the_list() {
    let mut session = open("<ul><li>a</li><li><br/></li></ul>");
    let tree = session.tree();
    let list = tree.children(tree.root())[0];
    let br = tree.first_leaf(tree.children(list)[1]).unwrap();
    session.set_selection(SelectionSpan::caret(Boundary::Before(br)));

    session.split_block().unwrap();
    assert_eq!(session.content(), "<ul><li>a</li></ul><p><br/></p>");
}

#[test]
fn backspace_joins_lines() {
    let mut session = open("<p>ab</p><p>cd</p>");
    let cd = leaf(&session, 1);
    caret_at(&mut session, cd, 0);

    session.delete_backward().unwrap();
    assert_eq!(session.content(), "<p>abcd</p>");
    assert_eq!(focus_text(&session), ("abcd".to_string(), 2));

    session.delete_backward().unwrap();
    assert_eq!(session.content(), "<p>acd</p>");
}

#[test]
fn deleting_across_lines_merges_the_remainders() {
    let mut session = open("<p>abc</p><p>def</p>");
    let (abc, def) = (leaf(&session, 0), leaf(&session, 1));
    select(&mut session, (abc, 1), (def, 2));

    session.delete_selection().unwrap();
    assert_eq!(session.content(), "<p>af</p>");
    assert_eq!(focus_text(&session), ("af".to_string(), 1));
}

fn select_atomic(session: &mut EditorSession, block_idx: usize, child_idx: usize) -> NodeId {
    let block = session.tree().children(session.tree().root())[block_idx];
    let atomic = session.tree().children(block)[child_idx];
    session.set_live_selection(Some(LiveSelection {
        anchor: LivePoint::new(block, child_idx),
        focus: LivePoint::new(block, child_idx + 1),
    }));
    atomic
}

#[test]
fn backspace_removes_the_selected_atomic() {
    let mut session = open("<p>a<img src=\"x.png\"/>b</p>");
    let image = select_atomic(&mut session, 0, 1);
    let selection = session.selection().unwrap();
    assert!(selection.is_collapsed());
    assert_eq!(selection.empty_body(), Some(image));

    assert!(session.delete_backward().unwrap());
    assert_eq!(session.content(), "<p>ab</p>");
    assert_eq!(focus_text(&session), ("ab".to_string(), 1));
}

#[test]
fn typing_replaces_the_selected_atomic() {
    let mut session = open("<p>a<img src=\"x.png\"/>b</p>");
    select_atomic(&mut session, 0, 1);

    session.insert_text("X").unwrap();
    assert_eq!(session.content(), "<p>aXb</p>");

    session.undo().unwrap();
    assert_eq!(session.content(), "<p>a<img src=\"x.png\"/>b</p>");
}

#[test]
fn typing_over_everything_leaves_a_single_line() {
    let mut session = open("<p>ab</p><p>cd</p>");
    assert!(session.select_all());
    session.insert_text("z").unwrap();
    assert_eq!(session.content(), "<p>z</p>");

    session.undo().unwrap();
    assert_eq!(session.content(), "<p>ab</p><p>cd</p>");
}

#[test]
fn toggling_bold_wraps_and_unwraps() {
    let mut session = open("<p>abc</p>");
    let text = leaf(&session, 0);
    select(&mut session, (text, 1), (text, 3));

    assert!(session.toggle_inline_style(InlineStyle::Bold).unwrap());
    assert_eq!(session.content(), "<p>a<b>bc</b></p>");
    assert!(session.has_inline_style(&InlineStyle::Bold));

    assert!(session.toggle_inline_style(InlineStyle::Bold).unwrap());
    assert_eq!(session.content(), "<p>abc</p>");

    session.undo().unwrap();
    assert_eq!(session.content(), "<p>a<b>bc</b></p>");
}

#[test]
fn styles_apply_per_line() {
    let mut session = open("<p>ab</p><p>cd</p>");
    let (ab, cd) = (leaf(&session, 0), leaf(&session, 1));
    select(&mut session, (ab, 1), (cd, 1));

    session.apply_inline_style(InlineStyle::Italic).unwrap();
    assert_eq!(session.content(), "<p>a<i>b</i></p><p><i>c</i>d</p>");
}

#[test]
fn block_styles_retag_lines() {
    let mut session = open("<p>abc</p>");
    assert!(session.set_block_style(BlockStyle::Heading(2)).unwrap());
    assert_eq!(session.content(), "<h2>abc</h2>");
    assert_eq!(session.current_block_style(), Some(BlockStyle::Heading(2)));
    assert!(!session.set_block_style(BlockStyle::Heading(2)).unwrap());
}

#[test]
fn toggling_a_list_wraps_and_lifts_lines() {
    let mut session = open("<p>a</p><p>b</p>");
    session.select_all();

    session.toggle_list(false).unwrap();
    assert_eq!(session.content(), "<ul><li>a</li><li>b</li></ul>");

    session.toggle_list(false).unwrap();
    assert_eq!(session.content(), "<p>a</p><p>b</p>");
}

#[test]
fn fragments_insert_inline_or_as_blocks() {
    let mut session = open("<p>ad</p>");
    let text = leaf(&session, 0);
    caret_at(&mut session, text, 1);
    session.insert_fragment("<b>b</b>c").unwrap();
    assert_eq!(session.content(), "<p>a<b>b</b>cd</p>");

    let mut session = session_with_caret_at_end("<p>ab</p>");
    session.insert_fragment("<h1>T</h1>").unwrap();
    assert_eq!(session.content(), "<p>ab</p><h1>T</h1>");
}

fn session_with_caret_at_end(markup: &str) -> EditorSession {
    let mut session = open(markup);
    let text = leaf(&session, 0);
    let len = session.tree().text_len(text);
    caret_at(&mut session, text, len);
    session
}

#[test]
fn caret_moves_across_lines() {
    let mut session = open("<p>ab</p><p>cd</p>");
    let ab = leaf(&session, 0);
    caret_at(&mut session, ab, 2);

    assert!(session.move_caret(Direction::Right, false));
    assert_eq!(focus_text(&session), ("cd".to_string(), 0));
    assert!(session.move_caret(Direction::Left, false));
    assert_eq!(focus_text(&session), ("ab".to_string(), 2));

    caret_at(&mut session, ab, 1);
    assert!(session.move_caret(Direction::Down, false));
    assert_eq!(focus_text(&session), ("cd".to_string(), 1));
    assert!(session.move_caret(Direction::LineEnd, false));
    assert_eq!(focus_text(&session), ("cd".to_string(), 2));
}

#[test]
fn extending_the_selection_keeps_the_anchor() {
    let mut session = open("<p>abc</p>");
    assert!(session.move_caret(Direction::Right, true));
    assert!(session.move_caret(Direction::Right, true));
    let span = session.selection().unwrap();
    assert_eq!(span.text(session.tree()), "ab");
}

#[test]
fn highlighting_folds_into_the_latest_step() {
    let mut session = open("<pre>fn</pre>");
    let text = leaf(&session, 0);
    caret_at(&mut session, text, 2);
    session.insert_text(" x").unwrap();

    let block = session.code_block_at_caret().unwrap();
    assert!(session.highlight_code_block(block, &mut WrapFirstWord).unwrap());
    assert_eq!(session.content(), "<pre><span color=\"blue\">fn</span> x</pre>");
    assert_eq!(focus_text(&session), (" x".to_string(), 2));
    assert_eq!(session.history().undo_depth(), 1);

    session.undo().unwrap();
    assert_eq!(session.content(), "<pre>fn</pre>");
    session.redo().unwrap();
    assert_eq!(session.content(), "<pre><span color=\"blue\">fn</span> x</pre>");
}

#[test]
fn highlighting_without_changes_is_a_no_op() {
    let mut session = open("<pre>fn x</pre>");
    let block = session.tree().children(session.tree().root())[0];
    assert!(!session.highlight_code_block(block, &mut Untouched).unwrap());
    assert!(!session.can_undo());

    let mut paragraph = open("<p>x</p>");
    let block = paragraph.tree().children(paragraph.tree().root())[0];
    assert!(!paragraph.highlight_code_block(block, &mut WrapFirstWord).unwrap());
}

#[test]
fn highlighter_errors_are_reported() {
    let mut session = open("<pre>fn x</pre>");
    let block = session.tree().children(session.tree().root())[0];
    let err = session.highlight_code_block(block, &mut Failing).unwrap_err();
    assert!(matches!(err, EditError::Highlight(_)));
    assert!(err.to_string().contains("lexer exploded"));
}

#[test]
fn scheduled_highlights_run_once_due() {
    let mut session = open("<pre>fn x</pre>");
    let block = session.tree().children(session.tree().root())[0];
    let start = Instant::now();

    assert!(!session.schedule_highlight(block, start));
    assert!(session.schedule_highlight(block, start + Duration::from_millis(100)));
    assert_eq!(session.run_due_tasks(start + Duration::from_millis(300), &mut WrapFirstWord).unwrap(), 0);
    assert_eq!(session.run_due_tasks(start + Duration::from_millis(400), &mut WrapFirstWord).unwrap(), 1);
    assert!(!session.has_pending_tasks());
    assert_eq!(session.content(), "<pre><span color=\"blue\">fn</span> x</pre>");
}

#[test]
fn undo_drops_pending_highlights() {
    let mut session = open("<pre>fn</pre>");
    let text = leaf(&session, 0);
    caret_at(&mut session, text, 2);
    session.insert_text(" x").unwrap();
    let block = session.code_block_at_caret().unwrap();
    session.schedule_highlight(block, Instant::now());

    session.undo().unwrap();
    assert!(!session.has_pending_tasks());
}
