mod token;

pub use token::{Token, TokenKind};

/// Text for in-band `Error` tokens. A `Token` stays `Copy` and source-free,
/// so instead of stashing the message string inside the
/// token, an `Error` token's `start` indexes into this table and `length`
/// is unused (0).
pub const ERROR_MESSAGES: [&str; 2] = ["Unexpected character.", "Unterminated string."];
const UNEXPECTED_CHARACTER: usize = 0;
const UNTERMINATED_STRING: usize = 1;

impl Token {
    /// Only meaningful when `self.kind == TokenKind::Error`.
    pub fn error_message(&self) -> &'static str {
        ERROR_MESSAGES[self.start]
    }
}

fn is_digit(c: u8) -> bool {
    c.is_ascii_digit()
}

fn is_alpha(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

/// Single-pass lexical analyzer. Scans raw source bytes into [`Token`]s
/// on demand; never allocates and never looks more than one character
/// past `current`.
pub struct Scanner<'s> {
    source: &'s [u8],
    start: usize,
    current: usize,
    line: usize,
    done: bool,
}

impl<'s> Scanner<'s> {
    pub fn new(source: &'s str) -> Self {
        Self {
            source: source.as_bytes(),
            start: 0,
            current: 0,
            line: 1,
            done: false,
        }
    }

    fn at_end(&self) -> bool {
        self.current >= self.source.len()
    }

    fn peek(&self) -> u8 {
        if self.at_end() {
            0
        } else {
            self.source[self.current]
        }
    }

    fn peek_next(&self) -> u8 {
        if self.current + 1 >= self.source.len() {
            0
        } else {
            self.source[self.current + 1]
        }
    }

    fn advance(&mut self) -> u8 {
        let c = self.source[self.current];
        self.current += 1;
        c
    }

    fn matches(&mut self, expected: u8) -> bool {
        if self.at_end() || self.source[self.current] != expected {
            false
        } else {
            self.current += 1;
            true
        }
    }

    fn skip_whitespace(&mut self) {
        loop {
            match self.peek() {
                b' ' | b'\r' | b'\t' => {
                    self.advance();
                }
                b'\n' => {
                    self.line += 1;
                    self.advance();
                }
                b'/' if self.peek_next() == b'/' => {
                    while self.peek() != b'\n' && !self.at_end() {
                        self.advance();
                    }
                }
                _ => return,
            }
        }
    }

    fn make(&self, kind: TokenKind) -> Token {
        Token::new(kind, self.start, self.current - self.start, self.line)
    }

    fn error(&self, message_idx: usize) -> Token {
        Token::new(TokenKind::Error, message_idx, 0, self.line)
    }

    fn string(&mut self) -> Token {
        while self.peek() != b'"' && !self.at_end() {
            if self.peek() == b'\n' {
                self.line += 1;
            }
            self.advance();
        }
        if self.at_end() {
            return self.error(UNTERMINATED_STRING);
        }
        self.advance();
        self.make(TokenKind::String)
    }

    fn number(&mut self) -> Token {
        while is_digit(self.peek()) {
            self.advance();
        }
        if self.peek() == b'.' && is_digit(self.peek_next()) {
            self.advance();
            while is_digit(self.peek()) {
                self.advance();
            }
        }
        self.make(TokenKind::Number)
    }

    fn identifier(&mut self) -> Token {
        while is_alpha(self.peek()) || is_digit(self.peek()) {
            self.advance();
        }
        let word = std::str::from_utf8(&self.source[self.start..self.current]).unwrap();
        self.make(TokenKind::keyword(word).unwrap_or(TokenKind::Identifier))
    }

    /// Produces the next token, skipping leading whitespace and
    /// `//` comments first.
    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace();
        self.start = self.current;

        if self.at_end() {
            return self.make(TokenKind::Eof);
        }

        let c = self.advance();
        if is_alpha(c) {
            return self.identifier();
        }
        if is_digit(c) {
            return self.number();
        }

        match c {
            b'(' => self.make(TokenKind::OParen),
            b')' => self.make(TokenKind::CParen),
            b'{' => self.make(TokenKind::OBrace),
            b'}' => self.make(TokenKind::CBrace),
            b';' => self.make(TokenKind::Semicolon),
            b',' => self.make(TokenKind::Comma),
            b'.' => self.make(TokenKind::Dot),
            b'-' => self.make(TokenKind::Minus),
            b'+' => self.make(TokenKind::Plus),
            b'/' => self.make(TokenKind::Slash),
            b'*' => self.make(TokenKind::Star),
            b'!' => {
                let kind = if self.matches(b'=') {
                    TokenKind::BangEqual
                } else {
                    TokenKind::Bang
                };
                self.make(kind)
            }
            b'=' => {
                let kind = if self.matches(b'=') {
                    TokenKind::EqualEqual
                } else {
                    TokenKind::Equal
                };
                self.make(kind)
            }
            b'<' => {
                let kind = if self.matches(b'=') {
                    TokenKind::LessEqual
                } else {
                    TokenKind::Less
                };
                self.make(kind)
            }
            b'>' => {
                let kind = if self.matches(b'=') {
                    TokenKind::GreaterEqual
                } else {
                    TokenKind::Greater
                };
                self.make(kind)
            }
            b'"' => self.string(),
            _ => self.error(UNEXPECTED_CHARACTER),
        }
    }
}

impl<'s> Iterator for Scanner<'s> {
    type Item = Token;

    /// Yields `Eof` exactly once, then stops.
    fn next(&mut self) -> Option<Token> {
        if self.done {
            return None;
        }
        let token = self.next_token();
        if token.kind == TokenKind::Eof {
            self.done = true;
        }
        Some(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Scanner::new(source).map(|t| t.kind).collect()
    }

    #[test]
    fn skips_whitespace_and_comments() {
        assert_eq!(
            kinds("  // a comment\n  1 + 2 "),
            vec![
                TokenKind::Number,
                TokenKind::Plus,
                TokenKind::Number,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn recognizes_keywords_vs_identifiers() {
        assert_eq!(
            kinds("var class classic"),
            vec![
                TokenKind::Var,
                TokenKind::Class,
                TokenKind::Identifier,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn strings_span_newlines() {
        let mut scanner = Scanner::new("\"a\nb\"");
        let tok = scanner.next_token();
        assert_eq!(tok.kind, TokenKind::String);
        assert_eq!(tok.lexeme("\"a\nb\""), "\"a\nb\"");
    }

    #[test]
    fn unterminated_string_is_an_error_token() {
        let mut scanner = Scanner::new("\"abc");
        let tok = scanner.next_token();
        assert_eq!(tok.kind, TokenKind::Error);
        assert_eq!(tok.error_message(), "Unterminated string.");
    }

    #[test]
    fn unexpected_character_is_an_error_token() {
        let mut scanner = Scanner::new("`");
        let tok = scanner.next_token();
        assert_eq!(tok.kind, TokenKind::Error);
        assert_eq!(tok.error_message(), "Unexpected character.");
    }

    #[test]
    fn variant_count_matches_the_enum_definition() {
        assert_eq!(TokenKind::VARIANT_COUNT, 40);
    }

    #[test]
    fn two_char_operators_are_greedy() {
        assert_eq!(
            kinds("!= == <= >="),
            vec![
                TokenKind::BangEqual,
                TokenKind::EqualEqual,
                TokenKind::LessEqual,
                TokenKind::GreaterEqual,
                TokenKind::Eof
            ]
        );
    }
}
