//! Editing core for structured rich text.
//!
//! A document is a [`tree::DocumentTree`] of blocks and inline runs. Edits go
//! through an [`session::EditorSession`], which keeps the selection stable
//! across mutations by serializing it to [`selection::SpanDescriptor`]s and
//! records every edit as a character diff in a bounded [`history::History`].

pub mod config;
pub mod convert;
pub mod error;
pub mod format;
pub mod history;
pub mod markup;
pub mod render;
pub mod scheduler;
pub mod selection;
pub mod session;
pub mod theme;
pub mod tree;

pub use config::EditorConfig;
pub use error::{EditError, HighlightError};
pub use format::{BlockStyle, FormatTable, InlineStyle};
pub use selection::{Boundary, SelectionSpan, SpanDescriptor};
pub use session::{Direction, EditorSession, Highlighter};
pub use tree::{DocumentTree, NodeId, Tag};
