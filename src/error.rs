use thiserror::Error;

use crate::config::ConfigError;
use crate::markup::MarkupError;

/// Failure reported by a [`crate::session::Highlighter`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("highlighting failed: {message}")]
pub struct HighlightError {
    pub message: String,
}

impl HighlightError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum EditError {
    #[error(transparent)]
    Markup(#[from] MarkupError),
    #[error("there is no selection to edit")]
    NoSelection,
    #[error(transparent)]
    Highlight(#[from] HighlightError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
