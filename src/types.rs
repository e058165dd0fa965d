//! Result types produced by the language services.
//!
//! These are protocol-neutral: the server module converts them into
//! `lsp_types` values.

use serde::Serialize;
use tower_lsp::lsp_types::{Location, Range, TextEdit};

// ============================================================================
// Navigation
// ============================================================================

/// A named pattern in the document outline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Symbol {
    pub name: String,
    /// Qualified name of the pattern.
    pub detail: String,
    pub children: Vec<Symbol>,
    /// Whole pattern definition without surrounding trivia.
    pub location: Location,
    pub name_location: Location,
}

/// Reference counter shown above a named pattern.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CodeLensInfo {
    pub range: Range,
    /// Range of the pattern name; references are looked up from here.
    pub active_range: Range,
}

// ============================================================================
// Editing
// ============================================================================

/// A replacement of the text at `location`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceEdit {
    pub location: Location,
    pub new_text: String,
}

impl SourceEdit {
    pub fn new(location: Location, new_text: impl Into<String>) -> Self {
        Self {
            location,
            new_text: new_text.into(),
        }
    }
}

/// Current text and range of a renamable name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenameInfo {
    pub range: Range,
    pub text: String,
}

// ============================================================================
// Completion
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CompletionKind {
    Field,
    Pattern,
    Namespace,
    Keyword,
    FilePath,
    DirectoryPath,
    TextAttribute,
    Token,
}

impl CompletionKind {
    /// Sort bucket; lower buckets are listed first.
    pub fn sort_text(self) -> &'static str {
        match self {
            CompletionKind::Field
            | CompletionKind::Pattern
            | CompletionKind::FilePath
            | CompletionKind::DirectoryPath
            | CompletionKind::TextAttribute => "0",
            CompletionKind::Token => "1",
            CompletionKind::Namespace | CompletionKind::Keyword => "2",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Completion {
    pub kind: CompletionKind,
    pub text: String,
    pub filter_text: Option<String>,
    pub sort_text: &'static str,
    /// Qualifier shown next to the label, e.g. the namespace of a pattern.
    pub context: Option<String>,
    pub insert_text: Option<String>,
    pub text_edit: Option<TextEdit>,
}

impl Completion {
    pub fn new(kind: CompletionKind, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            kind,
            filter_text: Some(text.clone()),
            insert_text: Some(text.clone()),
            sort_text: kind.sort_text(),
            context: None,
            text_edit: None,
            text,
        }
    }

    /// A completion displayed as `text` that inserts `insert_text`.
    pub fn with_insert_text(
        kind: CompletionKind,
        text: impl Into<String>,
        context: Option<String>,
        insert_text: impl Into<String>,
    ) -> Self {
        let insert_text = insert_text.into();
        Self {
            filter_text: Some(insert_text.clone()),
            insert_text: Some(insert_text),
            context,
            ..Self::new(kind, text)
        }
    }

    /// A completion that replaces a range instead of inserting at the cursor.
    pub fn with_text_edit(
        kind: CompletionKind,
        text: impl Into<String>,
        text_edit: TextEdit,
        filter_text: impl Into<String>,
    ) -> Self {
        Self {
            filter_text: Some(filter_text.into()),
            insert_text: None,
            text_edit: Some(text_edit),
            ..Self::new(kind, text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tower_lsp::lsp_types::Position;

    #[test]
    fn test_completion_shapes() {
        let plain = Completion::new(CompletionKind::Pattern, "P");
        assert_eq!(plain.insert_text.as_deref(), Some("P"));
        assert_eq!(plain.sort_text, "0");

        let qualified = Completion::with_insert_text(CompletionKind::Pattern, "P", Some("N".into()), "N.P");
        assert_eq!(qualified.text, "P");
        assert_eq!(qualified.filter_text.as_deref(), Some("N.P"));

        let edit = TextEdit::new(Range::new(Position::new(0, 1), Position::new(0, 3)), "Lib.np".into());
        let path = Completion::with_text_edit(CompletionKind::FilePath, "Lib.np", edit, "Lib.np");
        assert_eq!(path.insert_text, None);
        assert!(path.text_edit.is_some());
    }

    #[test]
    fn test_sort_buckets() {
        assert_eq!(CompletionKind::Token.sort_text(), "1");
        assert_eq!(CompletionKind::Keyword.sort_text(), "2");
        assert_eq!(CompletionKind::Namespace.sort_text(), "2");
    }
}
