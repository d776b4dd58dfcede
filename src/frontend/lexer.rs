//! Lexer for Lona
//!
//! Converts source code into a stream of tokens.

use crate::frontend::token::{Token, TokenKind};
use crate::utils::Span;

/// The lexer state
pub struct Lexer {
    /// Source code as chars
    source: Vec<char>,
    /// Current position in source
    pos: usize,
    /// Start position of current token
    start: usize,
    /// File ID for span tracking
    file_id: usize,
}

impl Lexer {
    /// Create a new lexer for the given source code
    pub fn new(source: &str, file_id: usize) -> Self {
        Self {
            source: source.chars().collect(),
            pos: 0,
            start: 0,
            file_id,
        }
    }

    fn peek(&self) -> Option<char> {
        self.source.get(self.pos).copied()
    }

    fn peek_next(&self) -> Option<char> {
        self.source.get(self.pos + 1).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek();
        self.pos += 1;
        c
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.source.len()
    }

    fn make_span(&self) -> Span {
        Span::new(self.start, self.pos, self.file_id)
    }

    fn make_token(&self, kind: TokenKind) -> Token {
        Token::new(kind, self.make_span())
    }

    /// Advance past `next` if it is the upcoming char, yielding `long`; else `short`.
    fn either(&mut self, next: char, long: TokenKind, short: TokenKind) -> TokenKind {
        if self.peek() == Some(next) {
            self.advance();
            long
        } else {
            short
        }
    }

    /// Skip whitespace and comments
    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            match c {
                ' ' | '\t' | '\r' | '\n' => {
                    self.advance();
                }
                '/' if self.peek_next() == Some('/') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                '/' if self.peek_next() == Some('*') => {
                    self.advance();
                    self.advance();
                    while !self.is_at_end() {
                        if self.peek() == Some('*') && self.peek_next() == Some('/') {
                            self.advance();
                            self.advance();
                            break;
                        }
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    fn read_identifier(&mut self) -> Token {
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                self.advance();
            } else {
                break;
            }
        }

        let text: String = self.source[self.start..self.pos].iter().collect();
        let kind = TokenKind::keyword_from_str(&text).unwrap_or(TokenKind::Ident(text));
        self.make_token(kind)
    }

    /// Read a number literal; the text is kept verbatim and parsed later
    fn read_number(&mut self) -> Token {
        let mut is_float = false;

        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                self.advance();
            } else {
                break;
            }
        }

        if self.peek() == Some('.') && self.peek_next().map_or(false, |c| c.is_ascii_digit()) {
            is_float = true;
            self.advance();
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    self.advance();
                } else {
                    break;
                }
            }
        }

        let text: String = self.source[self.start..self.pos].iter().collect();
        if is_float {
            self.make_token(TokenKind::FloatLit(text))
        } else {
            self.make_token(TokenKind::IntLit(text))
        }
    }

    fn read_string(&mut self) -> Token {
        self.advance(); // opening quote

        let mut value = String::new();
        while let Some(c) = self.peek() {
            if c == '"' {
                self.advance();
                break;
            } else if c == '\\' {
                self.advance();
                match self.advance() {
                    Some('n') => value.push('\n'),
                    Some('r') => value.push('\r'),
                    Some('t') => value.push('\t'),
                    Some('0') => value.push('\0'),
                    Some(c) => value.push(c),
                    None => break,
                }
            } else if c == '\n' {
                // Unterminated string
                break;
            } else {
                value.push(c);
                self.advance();
            }
        }

        self.make_token(TokenKind::StringLit(value))
    }

    /// Get the next token
    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace();
        self.start = self.pos;

        let Some(c) = self.peek() else {
            return Token::eof(self.make_span());
        };

        if c.is_alphabetic() || c == '_' {
            return self.read_identifier();
        }
        if c.is_ascii_digit() {
            return self.read_number();
        }
        if c == '"' {
            return self.read_string();
        }

        self.advance();
        let kind = match c {
            '+' => TokenKind::Plus,
            '-' => self.either('>', TokenKind::Arrow, TokenKind::Minus),
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '=' => self.either('=', TokenKind::EqEq, TokenKind::Eq),
            '!' => self.either('=', TokenKind::Ne, TokenKind::Not),
            '<' => self.either('=', TokenKind::Le, TokenKind::Lt),
            '>' => self.either('=', TokenKind::Ge, TokenKind::Gt),
            '&' => self.either('&', TokenKind::AndAnd, TokenKind::And),
            '|' => self.either('|', TokenKind::OrOr, TokenKind::Unknown('|')),
            '~' => TokenKind::Tilde,
            '.' => TokenKind::Dot,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            ';' => TokenKind::Semicolon,
            _ => TokenKind::Unknown(c),
        };

        self.make_token(kind)
    }

    /// Tokenize the entire source and return all tokens
    pub fn tokenize(&mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token();
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                break;
            }
        }
        tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source, 0).tokenize().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_function_header() {
        let tokens = kinds("func add(a: i32) -> i32 {}");
        assert_eq!(
            tokens,
            vec![
                TokenKind::Func,
                TokenKind::Ident("add".to_string()),
                TokenKind::LParen,
                TokenKind::Ident("a".to_string()),
                TokenKind::Colon,
                TokenKind::Ident("i32".to_string()),
                TokenKind::RParen,
                TokenKind::Arrow,
                TokenKind::Ident("i32".to_string()),
                TokenKind::LBrace,
                TokenKind::RBrace,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_numbers() {
        let tokens = kinds("42 3.5 7.x");
        assert_eq!(tokens[0], TokenKind::IntLit("42".to_string()));
        assert_eq!(tokens[1], TokenKind::FloatLit("3.5".to_string()));
        assert_eq!(tokens[2], TokenKind::IntLit("7".to_string()));
        assert_eq!(tokens[3], TokenKind::Dot);
    }

    #[test]
    fn test_strings() {
        let tokens = kinds(r#""hello\nworld""#);
        assert_eq!(tokens[0], TokenKind::StringLit("hello\nworld".to_string()));
    }

    #[test]
    fn test_operators_and_comments() {
        let tokens = kinds("a && b || !c // trailing\n/* block */ x <= y != z");
        assert_eq!(
            tokens,
            vec![
                TokenKind::Ident("a".to_string()),
                TokenKind::AndAnd,
                TokenKind::Ident("b".to_string()),
                TokenKind::OrOr,
                TokenKind::Not,
                TokenKind::Ident("c".to_string()),
                TokenKind::Ident("x".to_string()),
                TokenKind::Le,
                TokenKind::Ident("y".to_string()),
                TokenKind::Ne,
                TokenKind::Ident("z".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_spans() {
        let tokens = Lexer::new("var  xy", 0).tokenize();
        assert_eq!(tokens[1].span, Span::new(5, 7, 0));
    }
}
