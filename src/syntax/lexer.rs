use super::{SyntaxError, TextRange};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenId {
    Identifier,
    IntegerLiteral,
    StringLiteral,
    UnterminatedStringLiteral,
    Colon,
    Comma,
    Semicolon,
    Period,
    DoublePeriod,
    Ellipsis,
    Asterisk,
    Plus,
    Minus,
    Underscore,
    Ampersand,
    Question,
    Tilde,
    HashSign,
    Equal,
    OpenParenthesis,
    CloseParenthesis,
    OpenCurlyBrace,
    CloseCurlyBrace,
    OpenSquareBracket,
    CloseSquareBracket,
    RequireKeyword,
    NamespaceKeyword,
    PatternKeyword,
    SearchKeyword,
    WhereKeyword,
    InsideKeyword,
    OutsideKeyword,
    HavingKeyword,
    Unknown,
}

impl TokenId {
    pub fn is_keyword(self) -> bool {
        matches!(
            self,
            TokenId::RequireKeyword
                | TokenId::NamespaceKeyword
                | TokenId::PatternKeyword
                | TokenId::SearchKeyword
                | TokenId::WhereKeyword
                | TokenId::InsideKeyword
                | TokenId::OutsideKeyword
                | TokenId::HavingKeyword
        )
    }
}

/// A token together with the trivia that follows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lexeme {
    pub token: TokenId,
    /// Token text plus trailing whitespace and comments.
    pub range: TextRange,
    /// End of the token text itself.
    pub token_end: usize,
}

impl Lexeme {
    pub fn token_range(&self) -> TextRange {
        TextRange::new(self.range.start, self.token_end)
    }
}

fn keyword(name: &str) -> Option<TokenId> {
    let token = match name {
        "require" | "требуется" => TokenId::RequireKeyword,
        "namespace" | "пространство" => TokenId::NamespaceKeyword,
        "pattern" | "шаблон" => TokenId::PatternKeyword,
        "search" | "искать" => TokenId::SearchKeyword,
        "where" | "где" => TokenId::WhereKeyword,
        "inside" | "внутри" => TokenId::InsideKeyword,
        "outside" | "вне" => TokenId::OutsideKeyword,
        "having" | "имеющий" => TokenId::HavingKeyword,
        _ => return None,
    };
    Some(token)
}

pub fn is_identifier_start(ch: char) -> bool {
    ch.is_alphabetic()
}

pub fn is_identifier_part(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '-'
}

struct Lexer<'a> {
    text: &'a str,
    pos: usize,
    errors: Vec<SyntaxError>,
}

impl<'a> Lexer<'a> {
    fn peek(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn peek_at(&self, skip: usize) -> Option<char> {
        self.text[self.pos..].chars().nth(skip)
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn eat_while(&mut self, predicate: impl Fn(char) -> bool) {
        while let Some(ch) = self.peek() {
            if !predicate(ch) {
                break;
            }
            self.pos += ch.len_utf8();
        }
    }

    fn skip_trivia(&mut self) {
        loop {
            let rest = &self.text[self.pos..];
            if rest.starts_with("//") {
                self.eat_while(|ch| ch != '\n' && ch != '\r');
            } else if rest.starts_with("/*") {
                match rest[2..].find("*/") {
                    Some(end) => self.pos += end + 4,
                    None => self.pos = self.text.len(),
                }
            } else if self.peek().is_some_and(char::is_whitespace) {
                self.eat_while(char::is_whitespace);
            } else {
                break;
            }
        }
    }

    fn string(&mut self, quote: char) -> TokenId {
        let start = self.pos;
        while self.peek() == Some(quote) {
            self.bump();
            self.eat_while(|ch| ch != quote && ch != '\n' && ch != '\r');
            if self.peek() != Some(quote) {
                self.errors.push(SyntaxError::new(
                    TextRange::new(start, self.pos),
                    "Unterminated string literal",
                ));
                return TokenId::UnterminatedStringLiteral;
            }
            self.bump();
        }
        if self.peek() == Some('!') {
            self.bump();
        }
        if self.peek() == Some('*') {
            self.bump();
        }
        TokenId::StringLiteral
    }

    fn next_token(&mut self) -> Option<TokenId> {
        let ch = self.peek()?;
        let token = match ch {
            '"' | '\'' => return Some(self.string(ch)),
            '@' => {
                let start = self.pos;
                self.bump();
                self.eat_while(char::is_alphabetic);
                let name = &self.text[start + 1..self.pos];
                match keyword(name) {
                    Some(token) => return Some(token),
                    None => {
                        self.errors.push(SyntaxError::new(
                            TextRange::new(start, self.pos),
                            format!("Unknown keyword '@{}'", name),
                        ));
                        return Some(TokenId::Unknown);
                    }
                }
            }
            '.' => {
                if self.peek_at(1) == Some('.') {
                    if self.peek_at(2) == Some('.') {
                        self.pos += 3;
                        return Some(TokenId::Ellipsis);
                    }
                    self.pos += 2;
                    return Some(TokenId::DoublePeriod);
                }
                TokenId::Period
            }
            ':' => TokenId::Colon,
            ',' => TokenId::Comma,
            ';' => TokenId::Semicolon,
            '*' => TokenId::Asterisk,
            '+' => TokenId::Plus,
            '-' => TokenId::Minus,
            '_' => TokenId::Underscore,
            '&' => TokenId::Ampersand,
            '?' => TokenId::Question,
            '~' => TokenId::Tilde,
            '#' => TokenId::HashSign,
            '=' => TokenId::Equal,
            '(' => TokenId::OpenParenthesis,
            ')' => TokenId::CloseParenthesis,
            '{' => TokenId::OpenCurlyBrace,
            '}' => TokenId::CloseCurlyBrace,
            '[' => TokenId::OpenSquareBracket,
            ']' => TokenId::CloseSquareBracket,
            _ if ch.is_ascii_digit() => {
                self.eat_while(|ch| ch.is_ascii_digit());
                return Some(TokenId::IntegerLiteral);
            }
            _ if is_identifier_start(ch) => {
                self.eat_while(is_identifier_part);
                return Some(TokenId::Identifier);
            }
            _ => {
                let start = self.pos;
                self.bump();
                self.errors.push(SyntaxError::new(
                    TextRange::new(start, self.pos),
                    format!("Unexpected character '{}'", ch),
                ));
                return Some(TokenId::Unknown);
            }
        };
        self.bump();
        Some(token)
    }
}

/// Splits text into lexemes. Leading trivia of the text belongs to no lexeme;
/// all other trivia is attached to the preceding lexeme.
pub fn tokenize(text: &str) -> (Vec<Lexeme>, Vec<SyntaxError>) {
    let mut lexer = Lexer {
        text,
        pos: 0,
        errors: Vec::new(),
    };
    lexer.skip_trivia();
    let mut lexemes = Vec::new();
    while lexer.pos < text.len() {
        let start = lexer.pos;
        let Some(token) = lexer.next_token() else {
            break;
        };
        let token_end = lexer.pos;
        lexer.skip_trivia();
        lexemes.push(Lexeme {
            token,
            range: TextRange::new(start, lexer.pos),
            token_end,
        });
    }
    (lexemes, lexer.errors)
}
