use tower_lsp::lsp_types::{Diagnostic, DiagnosticSeverity, Url};

use crate::document::Document;
use crate::error::Result;
use crate::info_table::LinkedPackage;

pub const DIAGNOSTIC_SOURCE: &str = "nevod";

/// Diagnostics of one document, replacing whatever was published for it
/// before.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishDiagnostics {
    pub uri: Url,
    pub diagnostics: Vec<Diagnostic>,
}

/// Receives a batch after every rebuild of the syntax info table.
pub type DiagnosticsPublisher = Box<dyn Fn(PublishDiagnostics) + Send + Sync>;

/// Parser and linker errors of `package` as error diagnostics.
pub fn package_diagnostics(document: &Document, package: &LinkedPackage) -> Result<PublishDiagnostics> {
    let diagnostics = package
        .errors
        .iter()
        .map(|error| {
            Ok(Diagnostic {
                range: document.range_of(error.range.start, error.range.end)?,
                severity: Some(DiagnosticSeverity::ERROR),
                source: Some(DIAGNOSTIC_SOURCE.to_string()),
                message: error.message.clone(),
                ..Default::default()
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(PublishDiagnostics {
        uri: document.uri.clone(),
        diagnostics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::info_table::SyntaxInfoTable;
    use std::collections::HashMap;
    use tower_lsp::lsp_types::Position;

    #[test]
    fn test_linker_errors_become_diagnostics() {
        let uri = Url::parse("file:///tmp/Main.np").unwrap();
        let mut documents = HashMap::new();
        documents.insert(uri.clone(), Document::new(uri.clone(), "P = Word;\nQ = Missing;".to_string(), true));
        let table = SyntaxInfoTable::build(&mut documents);

        let published = package_diagnostics(&documents[&uri], table.linked_package(&uri).unwrap()).unwrap();

        assert_eq!(published.uri, uri);
        assert_eq!(published.diagnostics.len(), 1);
        let diagnostic = &published.diagnostics[0];
        assert_eq!(diagnostic.severity, Some(DiagnosticSeverity::ERROR));
        assert_eq!(diagnostic.source.as_deref(), Some("nevod"));
        assert_eq!(diagnostic.range.start, Position::new(1, 4));
        assert!(diagnostic.message.contains("Missing"));
    }

    #[test]
    fn test_valid_package_has_no_diagnostics() {
        let uri = Url::parse("file:///tmp/Main.np").unwrap();
        let mut documents = HashMap::new();
        documents.insert(uri.clone(), Document::new(uri.clone(), "P = Word + Num;".to_string(), true));
        let table = SyntaxInfoTable::build(&mut documents);

        let published = package_diagnostics(&documents[&uri], table.linked_package(&uri).unwrap()).unwrap();

        assert!(published.diagnostics.is_empty());
    }
}
