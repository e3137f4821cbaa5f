use std::time::Instant;

mod commands;

pub use commands::Direction;

use crate::config::EditorConfig;
use crate::error::{EditError, HighlightError};
use crate::format::FormatTable;
use crate::history::{History, HistoryEntry, diff};
use crate::markup::{parse_markup, to_markup};
use crate::scheduler::TaskScheduler;
use crate::selection::{Boundary, LiveSelection, SelectionSpan, SpanDescriptor};
use crate::tree::{DocumentTree, NodeId, Tag};

/// Colours code blocks. Implementations may restructure the block's inline
/// content but must not change its text.
pub trait Highlighter {
    fn highlight(&mut self, tree: &mut DocumentTree, code_block: NodeId)
    -> Result<(), HighlightError>;
}

/// One editable document with its selection and undo history.
#[derive(Debug)]
pub struct EditorSession {
    tree: DocumentTree,
    live: Option<LiveSelection>,
    history: History,
    formats: FormatTable,
    scheduler: TaskScheduler<NodeId>,
    config: EditorConfig,
    recording: bool,
}

impl EditorSession {
    pub fn new(mut tree: DocumentTree, config: EditorConfig) -> Self {
        tree.normalize(tree.root());
        let mut session = Self {
            tree,
            live: None,
            history: History::new(config.history_capacity),
            formats: FormatTable::standard(),
            scheduler: TaskScheduler::new(config.highlight_delay()),
            config,
            recording: false,
        };
        session.restore_selection(None);
        session
    }

    pub fn from_markup(markup: &str, config: EditorConfig) -> Result<Self, EditError> {
        Ok(Self::new(parse_markup(markup)?, config))
    }

    pub fn with_formats(mut self, formats: FormatTable) -> Self {
        self.formats = formats;
        self
    }

    pub fn tree(&self) -> &DocumentTree {
        &self.tree
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn formats(&self) -> &FormatTable {
        &self.formats
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Serialized snapshot of the document, as stored by the history.
    pub fn content(&self) -> String {
        to_markup(&self.tree)
    }

    pub fn live_selection(&self) -> Option<LiveSelection> {
        self.live
    }

    pub fn set_live_selection(&mut self, live: Option<LiveSelection>) {
        self.live = live;
    }

    /// The live selection as a span, or `None` if there is none or it
    /// points at nodes that are no longer in the document.
    pub fn selection(&self) -> Option<SelectionSpan> {
        let live = self.live?;
        if !self.tree.contains(live.anchor.node) || !self.tree.contains(live.focus.node) {
            return None;
        }
        SelectionSpan::from_live_selection(&self.tree, &live)
    }

    /// Makes `span` the live selection. Returns `false` if it already was.
    pub fn set_selection(&mut self, span: SelectionSpan) -> bool {
        if self.selection() == Some(span) {
            return false;
        }
        match span.to_live_selection(&self.tree) {
            Some(live) => {
                self.live = Some(live);
                true
            }
            None => false,
        }
    }

    pub fn selection_descriptor(&self) -> Option<SpanDescriptor> {
        self.selection()?.serialize(&self.tree)
    }

    /// Restores a serialized selection, falling back to the document start.
    pub fn restore_selection(&mut self, descriptor: Option<&SpanDescriptor>) {
        let span = descriptor
            .and_then(|descriptor| SelectionSpan::deserialize(&self.tree, descriptor))
            .or_else(|| {
                self.tree
                    .first_content_leaf(self.tree.root())
                    .map(|leaf| SelectionSpan::caret(Boundary::start_of(&self.tree, leaf)))
            });
        self.live = span.and_then(|span| span.to_live_selection(&self.tree));
    }

    /// Runs `mutate` as one undoable step.
    ///
    /// The document and selection are snapshotted before and after; the
    /// difference is pushed onto the history. Nothing is pushed when
    /// `mutate` fails or leaves the document unchanged, and a failed
    /// mutation is not rolled back. Calls nested inside `mutate` become part
    /// of the same step.
    pub fn record<T, E>(
        &mut self,
        mutate: impl FnOnce(&mut Self) -> Result<T, E>,
    ) -> Result<T, E> {
        if self.recording {
            return mutate(self);
        }
        let before = self.content();
        let before_selection = self.selection_descriptor();

        self.recording = true;
        let result = mutate(self);
        self.recording = false;
        let value = result?;

        self.normalize_preserving_selection();
        let after = self.content();
        if after == before {
            log::debug!("edit left the document unchanged, nothing recorded");
            return Ok(value);
        }
        let segments = diff(&before, &after);
        log::debug!("recording edit with {} diff segment(s)", segments.len());
        self.history.push(HistoryEntry {
            segments,
            before: before_selection,
            after: self.selection_descriptor(),
        });
        Ok(value)
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Steps back one entry. `Ok(false)` when there is nothing to undo.
    pub fn undo(&mut self) -> Result<bool, EditError> {
        let current = self.content();
        let Some((content, selection)) = self.history.undo(&current) else {
            return Ok(false);
        };
        log::debug!("undo, {} step(s) left", self.history.undo_depth());
        self.replace_content(&content, selection.as_ref())?;
        Ok(true)
    }

    /// Reapplies the last undone entry. `Ok(false)` when there is none.
    pub fn redo(&mut self) -> Result<bool, EditError> {
        let current = self.content();
        let Some((content, selection)) = self.history.redo(&current) else {
            return Ok(false);
        };
        log::debug!("redo, {} step(s) left", self.history.redo_depth());
        self.replace_content(&content, selection.as_ref())?;
        Ok(true)
    }

    fn replace_content(
        &mut self,
        content: &str,
        selection: Option<&SpanDescriptor>,
    ) -> Result<(), EditError> {
        let mut tree = parse_markup(content)?;
        tree.ensure_initialized();
        self.tree = tree;
        // Node ids of the previous tree are meaningless now.
        self.scheduler.cancel_all();
        self.restore_selection(selection);
        Ok(())
    }

    fn normalize_preserving_selection(&mut self) {
        let selection = self.selection_descriptor();
        self.tree.normalize(self.tree.root());
        self.restore_selection(selection.as_ref());
    }

    /// The code block holding the selection focus, if any.
    pub fn code_block_at_caret(&self) -> Option<NodeId> {
        let live = self.live?;
        if !self.tree.contains(live.focus.node) {
            return None;
        }
        std::iter::once(live.focus.node)
            .chain(self.tree.ancestors(live.focus.node))
            .find(|node| self.tree.tag(*node) == Some(Tag::CodeBlock))
    }

    /// Runs `highlighter` over a code block and restores the selection
    /// afterwards. The result is folded into the latest history entry so
    /// that undo does not stop at highlighting alone.
    ///
    /// A highlighter error is returned as is and the selection is left as
    /// the highlighter left it.
    pub fn highlight_code_block(
        &mut self,
        code_block: NodeId,
        highlighter: &mut dyn Highlighter,
    ) -> Result<bool, EditError> {
        if !self.tree.contains(code_block) || self.tree.tag(code_block) != Some(Tag::CodeBlock) {
            log::debug!("skipping highlight of {code_block}: not a code block in this document");
            return Ok(false);
        }
        let before = self.content();
        let selection = self.selection_descriptor();

        highlighter.highlight(&mut self.tree, code_block)?;

        self.tree.normalize(self.tree.root());
        self.restore_selection(selection.as_ref());
        let after = self.content();
        if after == before {
            return Ok(false);
        }
        if !self.recording {
            let after_selection = self.selection_descriptor();
            if !self.history.amend_last(&before, &after, after_selection) {
                self.history.push(HistoryEntry {
                    segments: diff(&before, &after),
                    before: selection,
                    after: after_selection,
                });
            }
        }
        Ok(true)
    }

    /// Queues a highlight pass for `code_block`, replacing a pending one.
    pub fn schedule_highlight(&mut self, code_block: NodeId, now: Instant) -> bool {
        log::debug!("highlight of {code_block} scheduled");
        self.scheduler.schedule(code_block, now)
    }

    pub fn cancel_highlight(&mut self, code_block: NodeId) -> bool {
        self.scheduler.cancel(&code_block)
    }

    pub fn has_pending_tasks(&self) -> bool {
        !self.scheduler.is_empty()
    }

    /// Runs every highlight pass that is due. Returns how many changed the
    /// document.
    pub fn run_due_tasks(
        &mut self,
        now: Instant,
        highlighter: &mut dyn Highlighter,
    ) -> Result<usize, EditError> {
        let mut changed = 0;
        for code_block in self.scheduler.take_due(now) {
            if self.highlight_code_block(code_block, highlighter)? {
                changed += 1;
            }
        }
        Ok(changed)
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod session_tests;
