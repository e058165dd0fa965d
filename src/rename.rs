//! Rename of patterns and fields.

use std::collections::HashMap;

use tower_lsp::lsp_types::{Position, Url};

use crate::analysis::{range_contains, Analysis, PointedLexeme};
use crate::error::Result;
use crate::finders::{pattern_references_in, visit_field_occurrences, FieldOccurrenceHandler};
use crate::syntax::{join_name, Child, NodeData, NodeId, NodeRef, SyntaxKind, TokenId};
use crate::types::{RenameInfo, SourceEdit};

/// The definition a rename applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RenameTarget {
    Pattern(NodeRef),
    Field(NodeRef),
}

/// Range and current text of the name under the cursor, if it can be renamed.
pub fn rename_info(analysis: &Analysis, uri: &Url, position: Position) -> Result<Option<RenameInfo>> {
    Ok(renamable_at(analysis, uri, position)?.map(|(info, _)| info))
}

/// Edits renaming the pattern or field under the cursor to `new_name`.
///
/// References come first, the edit of the definition is always last.
pub fn rename(analysis: &Analysis, uri: &Url, position: Position, new_name: &str) -> Result<Option<Vec<SourceEdit>>> {
    let Some((_, target)) = renamable_at(analysis, uri, position)? else {
        return Ok(None);
    };
    let edits = match target {
        RenameTarget::Pattern(pattern) => rename_pattern(analysis, pattern, new_name)?,
        RenameTarget::Field(field) => rename_field(analysis, field, new_name)?,
    };
    Ok(edits)
}

fn renamable_at(analysis: &Analysis, uri: &Url, position: Position) -> Result<Option<(RenameInfo, RenameTarget)>> {
    let Some(pointed) = analysis.pointed_lexeme(uri, position, true, true)? else {
        return Ok(None);
    };
    let lexeme_location = analysis.lexeme_location(pointed.file, pointed.lexeme)?;
    if !range_contains(&lexeme_location.range, position) {
        return Ok(None);
    }
    renamable(analysis, pointed)
}

fn renamable(analysis: &Analysis, pointed: PointedLexeme) -> Result<Option<(RenameInfo, RenameTarget)>> {
    let package = analysis.syntax(pointed.file);
    if package.lexeme(pointed.lexeme).token != TokenId::Identifier {
        return Ok(None);
    }
    let range = analysis.lexeme_location(pointed.file, pointed.lexeme)?.range;
    let parent = pointed.parent_ref();
    let info = |text: &str| RenameInfo {
        range,
        text: text.to_string(),
    };

    let result = match &package.node(pointed.parent).data {
        NodeData::Pattern(data) => data
            .name
            .as_ref()
            .map(|name| (info(name), RenameTarget::Pattern(parent))),
        NodeData::PatternReference { .. } => analysis.table.referenced_pattern(parent).and_then(|target| {
            let name = analysis.syntax(target.file).pattern(target.node)?.name.as_ref()?;
            Some((info(name), RenameTarget::Pattern(target)))
        }),
        NodeData::Field { name, .. } => Some((info(name), RenameTarget::Field(parent))),
        NodeData::Extraction { field_name: name } | NodeData::FieldReference { name } => analysis
            .info_pattern(parent)
            .and_then(|pattern| analysis.field_definition(pattern, name))
            .map(|field| (info(name), RenameTarget::Field(field))),
        NodeData::ExtractionFromField {
            field_name,
            from_field_name,
        } => {
            let is_field_name = package.children(pointed.parent).first() == Some(&Child::Lexeme(pointed.lexeme));
            let syntax_info = analysis.table.info(parent);
            if is_field_name {
                syntax_info
                    .and_then(|i| i.pattern)
                    .and_then(|pattern| analysis.field_definition(pattern, field_name))
                    .map(|field| (info(field_name), RenameTarget::Field(field)))
            } else {
                match (from_field_name, syntax_info.and_then(|i| i.pattern_reference)) {
                    (Some(from_field_name), Some(reference)) => analysis
                        .table
                        .referenced_pattern(reference)
                        .and_then(|target| analysis.field_definition(target, from_field_name))
                        .map(|field| (info(from_field_name), RenameTarget::Field(field))),
                    _ => None,
                }
            }
        }
        _ => None,
    };
    Ok(result)
}

fn rename_pattern(analysis: &Analysis, pattern: NodeRef, new_name: &str) -> Result<Option<Vec<SourceEdit>>> {
    let package = analysis.syntax(pattern.file);
    let Some(short_name) = package.pattern(pattern.node).and_then(|p| p.name.clone()) else {
        return Ok(None);
    };
    let Some(definition) = analysis.pattern_name_location(pattern)? else {
        return Ok(None);
    };

    // Names of nested patterns relative to the outer scope of the renamed one,
    // e.g. `P.Inner` for `Inner` nested in `P`.
    let mut relative_names = HashMap::new();
    let mut stack: Vec<(NodeId, String)> = package
        .pattern(pattern.node)
        .map(|p| p.nested.iter().map(|&n| (n, short_name.clone())).collect())
        .unwrap_or_default();
    while let Some((nested, prefix)) = stack.pop() {
        let Some(data) = package.pattern(nested) else { continue };
        let relative = join_name(&prefix, data.name.as_deref().unwrap_or(""));
        stack.extend(data.nested.iter().map(|&n| (n, relative.clone())));
        relative_names.insert(NodeRef::new(pattern.file, nested), relative);
    }

    let mut edits = Vec::new();
    for file in analysis.all_files() {
        let package = analysis.syntax(file);
        for reference in pattern_references_in(package, package.root()) {
            let reference = NodeRef::new(file, reference);
            let Some(target) = analysis.table.referenced_pattern(reference) else {
                continue;
            };
            let NodeData::PatternReference { name, .. } = &package.node(reference.node).data else {
                continue;
            };
            let new_long_name = if target == pattern {
                let start = name.rfind(short_name.as_str()).unwrap_or(0);
                format!("{}{}", &name[..start], new_name)
            } else if let Some(relative) = relative_names.get(&target) {
                // A nested pattern referenced by its short name from inside the
                // renamed pattern does not spell the renamed name.
                let Some(start) = name.rfind(relative.as_str()) else {
                    continue;
                };
                let nested_start = start + short_name.len();
                format!("{}{}{}", &name[..start], new_name, &name[nested_start..])
            } else {
                continue;
            };
            edits.push(SourceEdit::new(
                analysis.pattern_reference_name_location(reference)?,
                new_long_name,
            ));
        }
    }
    edits.push(SourceEdit::new(definition, new_name));
    Ok(Some(edits))
}

struct FieldNameEditor<'a> {
    analysis: &'a Analysis<'a>,
    new_name: &'a str,
    edits: Vec<SourceEdit>,
}

impl<'a> FieldOccurrenceHandler for FieldNameEditor<'a> {
    fn on_extraction(&mut self, extraction: NodeRef) -> Result<()> {
        let location = self.analysis.extraction_location(extraction)?;
        self.edits.push(SourceEdit::new(location, self.new_name));
        Ok(())
    }

    fn on_extraction_field(&mut self, extraction: NodeRef) -> Result<()> {
        let location = self.analysis.extraction_location(extraction)?;
        self.edits.push(SourceEdit::new(location, self.new_name));
        Ok(())
    }

    fn on_extracted_field(&mut self, extraction: NodeRef) -> Result<()> {
        if let Some(location) = self.analysis.from_field_location(extraction)? {
            self.edits.push(SourceEdit::new(location, self.new_name));
        }
        Ok(())
    }

    fn on_field_reference(&mut self, reference: NodeRef) -> Result<()> {
        let location = self.analysis.field_reference_location(reference)?;
        self.edits.push(SourceEdit::new(location, self.new_name));
        Ok(())
    }
}

fn rename_field(analysis: &Analysis, field: NodeRef, new_name: &str) -> Result<Option<Vec<SourceEdit>>> {
    if analysis.syntax(field.file).kind(field.node) != SyntaxKind::Field {
        return Ok(None);
    }
    let mut editor = FieldNameEditor {
        analysis,
        new_name,
        edits: Vec::new(),
    };
    visit_field_occurrences(analysis, field, &analysis.all_files(), &mut editor)?;
    let mut edits = editor.edits;
    edits.push(SourceEdit::new(analysis.field_location(field)?, new_name));
    Ok(Some(edits))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::info_table::SyntaxInfoTable;
    use tower_lsp::lsp_types::TextEdit;

    fn setup(files: &[(&str, &str)]) -> (HashMap<Url, Document>, SyntaxInfoTable) {
        let mut documents = HashMap::new();
        for (name, text) in files {
            let uri = uri(name);
            documents.insert(uri.clone(), Document::new(uri, text.to_string(), true));
        }
        let table = SyntaxInfoTable::build(&mut documents);
        (documents, table)
    }

    fn uri(name: &str) -> Url {
        Url::parse(&format!("file:///project/{}", name)).unwrap()
    }

    fn summary(edits: &[SourceEdit]) -> Vec<(String, (u32, u32), (u32, u32), String)> {
        let mut result: Vec<_> = edits
            .iter()
            .map(|e| {
                let r = e.location.range;
                (
                    e.location.uri.path().rsplit('/').next().unwrap_or("").to_string(),
                    (r.start.line, r.start.character),
                    (r.end.line, r.end.character),
                    e.new_text.clone(),
                )
            })
            .collect();
        result.sort();
        result
    }

    #[test]
    fn test_rename_pattern_from_definition() {
        let (documents, table) = setup(&[("Main.np", "P1 = Word;\nP2 = P1;")]);
        let analysis = Analysis::new(&table, &documents);
        let edits = rename(&analysis, &uri("Main.np"), Position::new(0, 1), "Q").unwrap().unwrap();
        assert_eq!(
            summary(&edits),
            vec![
                ("Main.np".to_string(), (0, 0), (0, 2), "Q".to_string()),
                ("Main.np".to_string(), (1, 5), (1, 7), "Q".to_string()),
            ]
        );
        // The definition edit is last.
        assert_eq!(edits.last().unwrap().location.range.start, Position::new(0, 0));
    }

    #[test]
    fn test_rename_pattern_from_reference_at_end_of_name() {
        let (documents, table) = setup(&[("Main.np", "P1 = Word;\nP2 = P1;")]);
        let analysis = Analysis::new(&table, &documents);
        let info = rename_info(&analysis, &uri("Main.np"), Position::new(1, 7)).unwrap().unwrap();
        assert_eq!(info.text, "P1");
        let edits = rename(&analysis, &uri("Main.np"), Position::new(1, 7), "Q").unwrap().unwrap();
        assert_eq!(edits.len(), 2);
    }

    #[test]
    fn test_rename_qualified_and_nested_references() {
        let (documents, table) = setup(&[
            ("Lib.np", "@namespace N { P = Inner @where { Inner = Word; }; }"),
            ("Main.np", "@require 'Lib.np';\nA = N.P + N.P.Inner;"),
        ]);
        let analysis = Analysis::new(&table, &documents);
        // Cursor on `P` of the definition.
        let edits = rename(&analysis, &uri("Lib.np"), Position::new(0, 15), "R").unwrap().unwrap();
        assert_eq!(
            summary(&edits),
            vec![
                ("Lib.np".to_string(), (0, 15), (0, 16), "R".to_string()),
                ("Main.np".to_string(), (1, 4), (1, 7), "N.R".to_string()),
                ("Main.np".to_string(), (1, 10), (1, 19), "N.R.Inner".to_string()),
            ]
        );
    }

    fn resolved_references(table: &SyntaxInfoTable) -> Vec<(Url, usize)> {
        let mut result: Vec<_> = table
            .packages()
            .iter()
            .map(|package| {
                assert!(package.errors.is_empty(), "{}: {:?}", package.uri, package.errors);
                (package.uri.clone(), package.references.len())
            })
            .collect();
        result.sort();
        result
    }

    #[test]
    fn test_applied_rename_resolves_like_before() {
        let (mut documents, table) = setup(&[
            (
                "Lib.np",
                "@namespace N { P = Inner @where { Inner = Deep @where { Deep = Word; }; }; }",
            ),
            (
                "Main.np",
                "@require 'Lib.np';\n@search N.P;\nA = N.P + N.P.Inner + N.P.Inner.Deep;",
            ),
        ]);
        let before = resolved_references(&table);
        assert_eq!(before, vec![(uri("Lib.np"), 2), (uri("Main.np"), 4)]);

        let edits = {
            let analysis = Analysis::new(&table, &documents);
            rename(&analysis, &uri("Lib.np"), Position::new(0, 15), "R").unwrap().unwrap()
        };
        assert_eq!(edits.len(), 5);
        for name in ["Lib.np", "Main.np"] {
            let text_edits: Vec<TextEdit> = edits
                .iter()
                .filter(|edit| edit.location.uri == uri(name))
                .map(|edit| TextEdit::new(edit.location.range, edit.new_text.clone()))
                .collect();
            documents.get_mut(&uri(name)).unwrap().apply_edits(&text_edits).unwrap();
        }
        assert_eq!(
            documents[&uri("Main.np")].text(),
            "@require 'Lib.np';\n@search N.R;\nA = N.R + N.R.Inner + N.R.Inner.Deep;"
        );
        assert_eq!(
            documents[&uri("Lib.np")].text(),
            "@namespace N { R = Inner @where { Inner = Deep @where { Deep = Word; }; }; }"
        );

        let table = SyntaxInfoTable::build(&mut documents);
        assert_eq!(resolved_references(&table), before);
        let main = table.linked_package(&uri("Main.np")).unwrap();
        let lib = table.file_id(&uri("Lib.np")).unwrap();
        assert!(main.references.values().all(|target| target.file == lib));
    }

    #[test]
    fn test_rename_field() {
        let (documents, table) = setup(&[("Main.np", "P(~X) = X: Word + X;\nQ(Y) = P(Y: X);")]);
        let analysis = Analysis::new(&table, &documents);
        let edits = rename(&analysis, &uri("Main.np"), Position::new(1, 12), "Z").unwrap().unwrap();
        assert_eq!(
            summary(&edits),
            vec![
                ("Main.np".to_string(), (0, 3), (0, 4), "Z".to_string()),
                ("Main.np".to_string(), (0, 8), (0, 9), "Z".to_string()),
                ("Main.np".to_string(), (0, 18), (0, 19), "Z".to_string()),
                ("Main.np".to_string(), (1, 12), (1, 13), "Z".to_string()),
            ]
        );
    }

    #[test]
    fn test_keywords_and_unresolved_references_are_not_renamable() {
        let (documents, table) = setup(&[("Main.np", "@search P = Missing;")]);
        let analysis = Analysis::new(&table, &documents);
        assert_eq!(rename_info(&analysis, &uri("Main.np"), Position::new(0, 2)).unwrap(), None);
        assert_eq!(rename_info(&analysis, &uri("Main.np"), Position::new(0, 14)).unwrap(), None);
        assert!(rename(&analysis, &uri("Main.np"), Position::new(0, 14), "X").unwrap().is_none());
    }
}
