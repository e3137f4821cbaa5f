use std::collections::VecDeque;

use similar::{ChangeTag, TextDiff};

use crate::selection::SpanDescriptor;
use crate::tree::char_to_byte_idx;

pub const DEFAULT_CAPACITY: usize = 100;

/// One inserted or removed run of characters. Indices are char offsets
/// into the old and the new content at the point the run occurs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiffSegment {
    pub added: bool,
    pub old_index: usize,
    pub new_index: usize,
    pub text: String,
}

impl DiffSegment {
    fn len(&self) -> usize {
        self.text.chars().count()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryEntry {
    pub segments: Vec<DiffSegment>,
    pub before: Option<SpanDescriptor>,
    pub after: Option<SpanDescriptor>,
}

/// Character-level delta between two snapshots. Unchanged runs are not
/// stored.
pub fn diff(old: &str, new: &str) -> Vec<DiffSegment> {
    let text_diff = TextDiff::from_chars(old, new);
    let mut segments: Vec<DiffSegment> = Vec::new();
    let mut old_index = 0;
    let mut new_index = 0;

    for change in text_diff.iter_all_changes() {
        let value = change.value();
        let len = value.chars().count();
        match change.tag() {
            ChangeTag::Equal => {
                old_index += len;
                new_index += len;
            }
            ChangeTag::Delete => {
                match segments.last_mut() {
                    Some(last)
                        if !last.added
                            && last.new_index == new_index
                            && last.old_index + last.len() == old_index =>
                    {
                        last.text.push_str(value);
                    }
                    _ => segments.push(DiffSegment {
                        added: false,
                        old_index,
                        new_index,
                        text: value.to_string(),
                    }),
                }
                old_index += len;
            }
            ChangeTag::Insert => {
                match segments.last_mut() {
                    Some(last)
                        if last.added
                            && last.old_index == old_index
                            && last.new_index + last.len() == new_index =>
                    {
                        last.text.push_str(value);
                    }
                    _ => segments.push(DiffSegment {
                        added: true,
                        old_index,
                        new_index,
                        text: value.to_string(),
                    }),
                }
                new_index += len;
            }
        }
    }
    segments
}

/// Undo and redo stacks of character diffs.
#[derive(Debug)]
pub struct History {
    undo: VecDeque<HistoryEntry>,
    redo: Vec<HistoryEntry>,
    capacity: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl History {
    pub fn new(capacity: usize) -> Self {
        Self {
            undo: VecDeque::new(),
            redo: Vec::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn push(&mut self, entry: HistoryEntry) {
        self.redo.clear();
        self.push_undo(entry);
    }

    fn push_undo(&mut self, entry: HistoryEntry) {
        self.undo.push_back(entry);
        while self.undo.len() > self.capacity {
            self.undo.pop_front();
            log::debug!("history full, dropped the oldest entry");
        }
    }

    /// Replays the most recent entry backwards against `current` and
    /// returns the previous content with the selection it had.
    pub fn undo(&mut self, current: &str) -> Option<(String, Option<SpanDescriptor>)> {
        let entry = self.undo.pop_back()?;
        let content = revert(current, &entry.segments);
        let selection = entry.before;
        self.redo.push(entry);
        Some((content, selection))
    }

    /// Reapplies the most recently undone entry.
    pub fn redo(&mut self, current: &str) -> Option<(String, Option<SpanDescriptor>)> {
        let entry = self.redo.pop()?;
        let mut content = current.to_string();
        for segment in entry.segments.iter().rev() {
            if segment.added {
                insert_chars(&mut content, segment.old_index, &segment.text);
            } else {
                remove_chars(&mut content, segment.old_index, segment.len());
            }
        }
        let selection = entry.after;
        self.push_undo(entry);
        Some((content, selection))
    }

    /// Folds a follow-up change into the latest entry instead of pushing a
    /// separate one. `current` must be the content the latest entry led to.
    /// Returns `false` when there is no entry to amend.
    pub fn amend_last(
        &mut self,
        current: &str,
        amended: &str,
        after: Option<SpanDescriptor>,
    ) -> bool {
        let Some(last) = self.undo.back_mut() else {
            return false;
        };
        let original = revert(current, &last.segments);
        last.segments = diff(&original, amended);
        last.after = after;
        self.redo.clear();
        true
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.redo.len()
    }

    pub fn latest(&self) -> Option<&HistoryEntry> {
        self.undo.back()
    }

    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.undo.iter()
    }
}

fn revert(current: &str, segments: &[DiffSegment]) -> String {
    let mut content = current.to_string();
    for segment in segments.iter().rev() {
        if segment.added {
            remove_chars(&mut content, segment.new_index, segment.len());
        } else {
            insert_chars(&mut content, segment.new_index, &segment.text);
        }
    }
    content
}

fn insert_chars(content: &mut String, at: usize, text: &str) {
    let byte_idx = char_to_byte_idx(content, at);
    content.insert_str(byte_idx, text);
}

fn remove_chars(content: &mut String, at: usize, count: usize) {
    let start = char_to_byte_idx(content, at);
    let end = char_to_byte_idx(content, at + count);
    content.drain(start..end);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::PositionDescriptor;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn entry(old: &str, new: &str) -> HistoryEntry {
        HistoryEntry {
            segments: diff(old, new),
            before: None,
            after: None,
        }
    }

    #[test]
    fn diff_keeps_only_changed_runs() {
        assert_eq!(
            diff("abc", "aXc"),
            vec![
                DiffSegment {
                    added: false,
                    old_index: 1,
                    new_index: 1,
                    text: "b".into(),
                },
                DiffSegment {
                    added: true,
                    old_index: 2,
                    new_index: 1,
                    text: "X".into(),
                },
            ]
        );
        assert!(diff("same", "same").is_empty());
    }

    #[test]
    fn diff_groups_consecutive_chars() {
        let segments = diff("<p>ab</p>", "<p>aXYZb</p>");
        assert_eq!(
            segments,
            vec![DiffSegment {
                added: true,
                old_index: 4,
                new_index: 4,
                text: "XYZ".into(),
            }]
        );
    }

    #[test]
    fn undo_and_redo_restore_the_caret_descriptors() {
        let mut history = History::new(10);
        let before = SpanDescriptor::caret(PositionDescriptor::inside(1));
        let after = SpanDescriptor::caret(PositionDescriptor::inside(2));
        history.push(HistoryEntry {
            segments: diff("ab", "aXb"),
            before: Some(before),
            after: Some(after),
        });

        assert_eq!(history.undo("aXb"), Some(("ab".to_string(), Some(before))));
        assert_eq!(history.redo("ab"), Some(("aXb".to_string(), Some(after))));
    }

    #[rstest]
    #[case("", "hello")]
    #[case("hello", "")]
    #[case("abc", "aXc")]
    #[case("<p>héllo wörld</p>", "<p>hello <b>world</b></p>")]
    #[case("one two three", "three two one")]
    fn replay_reconstructs_both_sides(#[case] old: &str, #[case] new: &str) {
        let mut history = History::default();
        history.push(entry(old, new));
        let (undone, _) = history.undo(new).unwrap();
        assert_eq!(undone, old);
        let (redone, _) = history.redo(old).unwrap();
        assert_eq!(redone, new);
    }

    #[test]
    fn empty_stacks_return_nothing() {
        let mut history = History::default();
        assert_eq!(history.undo("x"), None);
        assert_eq!(history.redo("x"), None);
    }

    #[test]
    fn capacity_evicts_the_oldest_entries() {
        let mut history = History::new(3);
        let contents = ["a", "ab", "abc", "abcd", "abcde"];
        for pair in contents.windows(2) {
            history.push(entry(pair[0], pair[1]));
        }
        assert_eq!(history.undo_depth(), 3);

        let mut current = "abcde".to_string();
        while let Some((previous, _)) = history.undo(&current) {
            current = previous;
        }
        assert_eq!(current, "ab");
        assert_eq!(history.redo_depth(), 3);
    }

    #[test]
    fn push_clears_the_redo_stack() {
        let mut history = History::default();
        history.push(entry("a", "ab"));
        history.undo("ab").unwrap();
        assert!(history.can_redo());
        history.push(entry("a", "ac"));
        assert!(!history.can_redo());
        assert_eq!(history.undo_depth(), 1);
    }

    #[test]
    fn amending_folds_a_change_into_the_latest_entry() {
        let mut history = History::default();
        history.push(entry("ab", "abc"));
        assert!(history.amend_last("abc", "aBc", None));
        assert_eq!(history.undo_depth(), 1);
        let (undone, _) = history.undo("aBc").unwrap();
        assert_eq!(undone, "ab");

        let mut empty = History::default();
        assert!(!empty.amend_last("x", "y", None));
    }
}
