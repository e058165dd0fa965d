//! Text range helpers that skip comments, whitespace, string literals and
//! keywords. All functions work on byte offsets and reject ranges that do
//! not fit the text.

use crate::error::{Result, ServiceError};
use crate::syntax::TextRange;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriviaKind {
    Whitespaces,
    NewLine,
    SingleLineComment,
    MultiLineComment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trivia {
    pub kind: TriviaKind,
    pub range: TextRange,
}

/// A lexeme range split into the token part and the trivia following it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LexemeTriviaInfo {
    pub trimmed_range: TextRange,
    pub trivia: Vec<Trivia>,
}

fn validate(text: &str, range: TextRange) -> Result<()> {
    if range.start > range.end
        || range.end > text.len()
        || !text.is_char_boundary(range.start)
        || !text.is_char_boundary(range.end)
    {
        return Err(ServiceError::InvalidTextRange {
            start: range.start,
            end: range.end,
            len: text.len(),
        });
    }
    Ok(())
}

fn char_at(text: &str, offset: usize) -> Option<char> {
    text.get(offset..).and_then(|rest| rest.chars().next())
}

fn char_len_at(text: &str, offset: usize) -> usize {
    char_at(text, offset).map_or(1, char::len_utf8)
}

pub fn trim_start_single_line_comment(text: &str, mut range: TextRange) -> Result<TextRange> {
    validate(text, range)?;
    loop {
        let span = &text[range.start..range.end];
        if !span.starts_with("//") {
            break;
        }
        let skipped = match span.find(['\r', '\n']) {
            Some(i) if span[i..].starts_with("\r\n") => i + 2,
            Some(i) => i + 1,
            None => span.len(),
        };
        range.start += skipped;
    }
    Ok(range)
}

pub fn trim_start_multiline_comment(text: &str, mut range: TextRange) -> Result<TextRange> {
    validate(text, range)?;
    loop {
        let span = &text[range.start..range.end];
        if !span.starts_with("/*") {
            break;
        }
        range.start = match span.find("*/") {
            Some(i) => range.start + i + 2,
            None => range.end,
        };
    }
    Ok(range)
}

pub fn trim_start_trivia(text: &str, mut range: TextRange) -> Result<TextRange> {
    validate(text, range)?;
    loop {
        let previous = range;
        range = trim_start_single_line_comment(text, range)?;
        range = trim_start_multiline_comment(text, range)?;
        while let Some(ch) = char_at(text, range.start).filter(|_| !range.is_empty()) {
            if !ch.is_whitespace() {
                break;
            }
            range.start += ch.len_utf8();
        }
        if range == previous {
            return Ok(range);
        }
    }
}

pub fn trim_start_string(text: &str, range: TextRange) -> Result<TextRange> {
    validate(text, range)?;
    let bytes = text.as_bytes();
    let mut current = range.start;
    if current < range.end && matches!(bytes[current], b'"' | b'\'') {
        let quote = bytes[current];
        while current < range.end && bytes[current] == quote {
            current += 1;
            while current < range.end && bytes[current] != quote {
                current += 1;
            }
            if current < range.end && bytes[current] == quote {
                current += 1;
            }
        }
        if current < range.end && bytes[current] == b'!' {
            current += 1;
        }
        if current < range.end && bytes[current] == b'*' {
            current += 1;
        }
    }
    Ok(TextRange::new(current, range.end))
}

/// Cuts trailing comments and whitespace. Comment-like text inside string
/// literals is kept.
pub fn trim_end_trivia(text: &str, range: TextRange) -> Result<TextRange> {
    validate(text, range)?;
    let mut current = range.start;
    let mut end = range.start;
    while current < range.end {
        let with_string = TextRange::new(current, range.end);
        let without_string = trim_start_string(text, with_string)?;
        if without_string != with_string {
            end = without_string.start;
        }
        let without_trivia = trim_start_trivia(text, without_string)?;
        current = without_trivia.start;
        if !without_trivia.is_empty() && without_trivia == without_string {
            current += char_len_at(text, current);
            end = current;
        }
    }
    Ok(TextRange::new(range.start, end))
}

/// Skips leading `@keyword`s together with the trivia around them.
pub fn trim_start_keywords(text: &str, mut range: TextRange) -> Result<TextRange> {
    validate(text, range)?;
    loop {
        let previous = range;
        range = trim_start_trivia(text, range)?;
        if text[range.start..range.end].starts_with('@') {
            let mut i = range.start + 1;
            while let Some(ch) = char_at(text, i).filter(|_| i < range.end) {
                if !ch.is_alphabetic() {
                    break;
                }
                i += ch.len_utf8();
            }
            range.start = i;
        }
        if range == previous {
            return Ok(range);
        }
    }
}

/// Range of a dotted identifier such as `A.B.C` or `A.*` starting at
/// `range.start`. A dangling trailing period is included.
pub fn multipart_identifier_range(text: &str, range: TextRange) -> Result<TextRange> {
    validate(text, range)?;
    let mut current = range.start;
    while current < range.end {
        while let Some(ch) = char_at(text, current).filter(|_| current < range.end) {
            if !(ch.is_alphanumeric() || ch == '-') {
                break;
            }
            current += ch.len_utf8();
        }
        let after_identifier = trim_start_trivia(text, TextRange::new(current, range.end))?;
        if after_identifier.start >= range.end || text.as_bytes()[after_identifier.start] != b'.' {
            break;
        }
        current = after_identifier.start + 1;
        let after_period = trim_start_trivia(text, TextRange::new(current, range.end))?;
        if let Some(ch) = char_at(text, after_period.start).filter(|_| after_period.start < range.end) {
            if ch == '*' {
                current = after_period.start + 1;
                break;
            } else if ch == '.' {
                break;
            } else if ch.is_alphabetic() {
                current = after_period.start;
            }
        }
    }
    Ok(TextRange::new(range.start, current))
}

pub fn is_offset_in_comment(offset: usize, text: &str, mut range: TextRange) -> Result<bool> {
    validate(text, range)?;
    while !range.is_empty() && range.start < offset {
        let span = &text[range.start..range.end];
        if span.starts_with("//") {
            range = trim_start_single_line_comment(text, range)?;
            if range.start > offset {
                return Ok(true);
            }
        } else if span.starts_with("/*") {
            range = trim_start_multiline_comment(text, range)?;
            if range.start > offset {
                return Ok(true);
            }
        } else if span.starts_with(['\'', '"']) {
            range = trim_start_string(text, range)?;
        } else {
            range.start += char_len_at(text, range.start);
        }
    }
    Ok(false)
}

pub fn lexeme_trivia_info(text: &str, range: TextRange) -> Result<LexemeTriviaInfo> {
    let trimmed_range = trim_end_trivia(text, range)?;
    let mut trivia = Vec::new();
    let mut current = trimmed_range.end;
    while current < range.end {
        let span = &text[current..range.end];
        let (kind, len) = if span.starts_with("\r\n") {
            (TriviaKind::NewLine, 2)
        } else if span.starts_with(['\n', '\r']) {
            (TriviaKind::NewLine, 1)
        } else if span.starts_with("//") {
            let len = span.find(['\r', '\n']).unwrap_or(span.len());
            (TriviaKind::SingleLineComment, len)
        } else if span.starts_with("/*") {
            let len = span[2..].find("*/").map_or(span.len(), |i| i + 4);
            (TriviaKind::MultiLineComment, len)
        } else {
            let len = span
                .find(|ch: char| !ch.is_whitespace() || ch == '\n' || ch == '\r')
                .unwrap_or(span.len())
                .max(char_len_at(text, current));
            (TriviaKind::Whitespaces, len)
        };
        trivia.push(Trivia {
            kind,
            range: TextRange::new(current, current + len),
        });
        current += len;
    }
    Ok(LexemeTriviaInfo {
        trimmed_range,
        trivia,
    })
}
