use std::cell::OnceCell;
use std::sync::Arc;

use tower_lsp::lsp_types::*;

use crate::error::{Result, ServiceError};
use crate::syntax::{self, Package};

/// Sorted line start offsets of a text.
///
/// Offsets are byte offsets into the text; `Position::character` counts
/// UTF-16 code units as required by the protocol.
#[derive(Debug, Clone)]
pub struct LineMap {
    line_starts: Vec<usize>,
    len: usize,
}

impl LineMap {
    pub fn new(text: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, b) in text.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        Self {
            line_starts,
            len: text.len(),
        }
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    pub fn line_start(&self, line: u32) -> Result<usize> {
        self.line_starts
            .get(line as usize)
            .copied()
            .ok_or(ServiceError::PositionOutOfRange { line, character: 0 })
    }

    pub fn position_at(&self, text: &str, offset: usize) -> Result<Position> {
        if offset > self.len || !text.is_char_boundary(offset) {
            return Err(ServiceError::OffsetOutOfRange {
                offset,
                len: self.len,
            });
        }
        let line = match self.line_starts.binary_search(&offset) {
            Ok(index) => index,
            Err(index) => index - 1,
        };
        let line_start = self.line_starts[line];
        let character: usize = text[line_start..offset].chars().map(char::len_utf16).sum();
        Ok(Position::new(line as u32, character as u32))
    }

    pub fn offset_at(&self, text: &str, position: Position) -> Result<usize> {
        let out_of_range = ServiceError::PositionOutOfRange {
            line: position.line,
            character: position.character,
        };
        let line_start = match self.line_starts.get(position.line as usize) {
            Some(start) => *start,
            None => return Err(out_of_range),
        };
        // Characters may address up to, but not past, the line break.
        let line_end = match self.line_starts.get(position.line as usize + 1) {
            Some(next) => next - 1,
            None => self.len,
        };
        let mut offset = line_start;
        let mut character = 0u32;
        for ch in text[line_start..line_end].chars() {
            if character >= position.character {
                break;
            }
            character += ch.len_utf16() as u32;
            offset += ch.len_utf8();
        }
        if character == position.character {
            Ok(offset)
        } else {
            Err(out_of_range)
        }
    }
}

/// Source text of one `.np` file with lazily derived parse tree and line map.
#[derive(Debug)]
pub struct Document {
    pub uri: Url,
    text: String,
    /// Whether the client or workspace scan owns this document, as opposed to
    /// a required package loaded from disk during linking.
    pub is_tracked: bool,
    line_map: OnceCell<LineMap>,
    package: OnceCell<Arc<Package>>,
}

impl Document {
    pub fn new(uri: Url, text: String, is_tracked: bool) -> Self {
        Self {
            uri,
            text,
            is_tracked,
            line_map: OnceCell::new(),
            package: OnceCell::new(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn update(&mut self, text: String) {
        self.text = text;
        self.line_map = OnceCell::new();
        self.package = OnceCell::new();
    }

    /// Applies edits back to front so earlier offsets stay valid. Inserts at
    /// the same offset keep their order in `edits`.
    pub fn apply_edits(&mut self, edits: &[TextEdit]) -> Result<()> {
        let mut resolved = Vec::with_capacity(edits.len());
        for (index, edit) in edits.iter().enumerate() {
            let start = self.offset_at(edit.range.start)?;
            let end = self.offset_at(edit.range.end)?;
            if start > end {
                return Err(ServiceError::InvalidTextRange {
                    start,
                    end,
                    len: self.text.len(),
                });
            }
            resolved.push((start, end, index, edit.new_text.as_str()));
        }
        resolved.sort_by(|a, b| (b.0, b.1, b.2).cmp(&(a.0, a.1, a.2)));
        let mut text = self.text.clone();
        for (start, end, _, new_text) in resolved {
            text.replace_range(start..end, new_text);
        }
        self.update(text);
        Ok(())
    }

    /// Applies protocol content changes in the order they were sent.
    pub fn apply_content_changes(
        &mut self,
        changes: Vec<TextDocumentContentChangeEvent>,
    ) -> Result<()> {
        for change in changes {
            match change.range {
                Some(range) => self.apply_edits(&[TextEdit {
                    range,
                    new_text: change.text,
                }])?,
                None => self.update(change.text),
            }
        }
        Ok(())
    }

    pub fn line_map(&self) -> &LineMap {
        self.line_map.get_or_init(|| LineMap::new(&self.text))
    }

    pub fn package(&self) -> Arc<Package> {
        self.package
            .get_or_init(|| Arc::new(syntax::parse(&self.text)))
            .clone()
    }

    pub fn position_at(&self, offset: usize) -> Result<Position> {
        self.line_map().position_at(&self.text, offset)
    }

    pub fn offset_at(&self, position: Position) -> Result<usize> {
        self.line_map().offset_at(&self.text, position)
    }

    pub fn line_start(&self, line: u32) -> Result<usize> {
        self.line_map().line_start(line)
    }

    pub fn range_of(&self, start: usize, end: usize) -> Result<Range> {
        Ok(Range::new(self.position_at(start)?, self.position_at(end)?))
    }

    pub fn location_of(&self, start: usize, end: usize) -> Result<Location> {
        Ok(Location::new(self.uri.clone(), self.range_of(start, end)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uri() -> Url {
        Url::parse("file:///tmp/test.np").unwrap()
    }

    #[test]
    fn test_position_at_and_offset_at() {
        let text = "ab\ncd\nef";
        let map = LineMap::new(text);
        assert_eq!(map.position_at(text, 3).unwrap(), Position::new(1, 0));
        assert_eq!(map.position_at(text, 4).unwrap(), Position::new(1, 1));
        assert_eq!(map.offset_at(text, Position::new(2, 1)).unwrap(), 7);
    }

    #[test]
    fn test_offset_position_roundtrip() {
        let text = "P1 = Word;\r\n// comment\nP2 = 'тест' + P1;\n";
        let map = LineMap::new(text);
        for (offset, _) in text.char_indices().chain(std::iter::once((text.len(), ' '))) {
            let position = map.position_at(text, offset).unwrap();
            assert_eq!(map.offset_at(text, position).unwrap(), offset);
        }
    }

    #[test]
    fn test_utf16_characters() {
        let text = "'𝄞' + X";
        let map = LineMap::new(text);
        let x = text.find('X').unwrap();
        assert_eq!(map.position_at(text, x).unwrap(), Position::new(0, 7));
    }

    #[test]
    fn test_out_of_range_is_rejected() {
        let text = "ab\ncd";
        let map = LineMap::new(text);
        assert!(matches!(
            map.position_at(text, 6),
            Err(ServiceError::OffsetOutOfRange { .. })
        ));
        assert!(matches!(
            map.offset_at(text, Position::new(2, 0)),
            Err(ServiceError::PositionOutOfRange { .. })
        ));
        assert!(map.offset_at(text, Position::new(0, 3)).is_err());
        assert_eq!(map.offset_at(text, Position::new(0, 2)).unwrap(), 2);
    }

    #[test]
    fn test_update_invalidates_caches() {
        let mut document = Document::new(uri(), "A = Word;".to_string(), true);
        assert_eq!(document.package().patterns().len(), 1);
        assert_eq!(document.line_map().line_count(), 1);
        document.update("A = Word;\nB = Num;".to_string());
        assert_eq!(document.package().patterns().len(), 2);
        assert_eq!(document.line_map().line_count(), 2);
    }

    #[test]
    fn test_apply_edits_back_to_front() {
        let mut document = Document::new(uri(), "P1 = Word;\nP2 = P1;".to_string(), true);
        let edits = vec![
            TextEdit::new(Range::new(Position::new(0, 0), Position::new(0, 2)), "Q".to_string()),
            TextEdit::new(Range::new(Position::new(1, 5), Position::new(1, 7)), "Q".to_string()),
        ];
        document.apply_edits(&edits).unwrap();
        assert_eq!(document.text(), "Q = Word;\nP2 = Q;");
    }

    #[test]
    fn test_incremental_content_changes() {
        let mut document = Document::new(uri(), "A = Word;".to_string(), true);
        document
            .apply_content_changes(vec![
                TextDocumentContentChangeEvent {
                    range: Some(Range::new(Position::new(0, 4), Position::new(0, 8))),
                    range_length: None,
                    text: "Num".to_string(),
                },
                TextDocumentContentChangeEvent {
                    range: Some(Range::new(Position::new(0, 0), Position::new(0, 1))),
                    range_length: None,
                    text: "B".to_string(),
                },
            ])
            .unwrap();
        assert_eq!(document.text(), "B = Num;");
    }
}
