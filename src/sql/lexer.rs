//! SQL Lexer (Tokenizer)
//!
//! This module converts SQL strings into a stream of position-tagged tokens.
//! Positions are character offsets into the input.

use super::token::{Spanned, Token};
use crate::error::{Error, Result};

/// SQL Lexer
pub struct Lexer {
    /// Input characters
    input: Vec<char>,
    /// Current position in input
    position: usize,
}

impl Lexer {
    /// Create a new lexer for the given input
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            position: 0,
        }
    }

    /// Tokenize the entire input
    pub fn tokenize(&mut self) -> Result<Vec<Spanned>> {
        let mut tokens = Vec::new();

        loop {
            self.skip_trivia()?;
            let position = self.position;
            let token = self.next_token()?;
            let done = token == Token::Eof;
            tokens.push(Spanned { token, position });
            if done {
                break;
            }
        }

        Ok(tokens)
    }

    /// Get the next token from the input
    fn next_token(&mut self) -> Result<Token> {
        if self.is_at_end() {
            return Ok(Token::Eof);
        }

        let ch = self.current_char();
        let start = self.position;

        let single = match ch {
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            ',' => Some(Token::Comma),
            ';' => Some(Token::Semicolon),
            '+' => Some(Token::Plus),
            '-' => Some(Token::Minus),
            '*' => Some(Token::Asterisk),
            '/' => Some(Token::Slash),
            '%' => Some(Token::Percent),
            '?' => Some(Token::QuestionMark),
            _ => None,
        };
        if let Some(token) = single {
            self.advance();
            return Ok(token);
        }

        match ch {
            '.' => {
                if self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
                    return self.read_number();
                }
                self.advance();
                Ok(Token::Dot)
            }
            '=' => {
                self.advance();
                // `==` is an alias of `=`
                self.match_char('=');
                Ok(Token::Eq)
            }
            '<' => {
                self.advance();
                if self.match_char('=') {
                    return Ok(Token::Lte);
                }
                if self.match_char('>') {
                    return Ok(Token::Neq);
                }
                Ok(Token::Lt)
            }
            '>' => {
                self.advance();
                if self.match_char('=') {
                    return Ok(Token::Gte);
                }
                Ok(Token::Gt)
            }
            '!' => {
                self.advance();
                if self.match_char('=') {
                    return Ok(Token::Neq);
                }
                Err(Error::syntax(start, "unexpected character '!'"))
            }
            '|' => {
                self.advance();
                if self.match_char('|') {
                    return Ok(Token::Concat);
                }
                Err(Error::syntax(start, "unexpected character '|'"))
            }
            ':' => self.read_named_parameter(),
            '\'' => self.read_quoted('\'', '\'').map(Token::StringLiteral),
            '"' => self.read_quoted('"', '"').map(Token::Identifier),
            '`' => self.read_quoted('`', '`').map(Token::Identifier),
            '[' => self.read_quoted('[', ']').map(Token::Identifier),
            'x' | 'X' if self.peek_char() == Some('\'') => self.read_blob(),
            c if c.is_ascii_digit() => self.read_number(),
            c if c.is_alphabetic() || c == '_' => Ok(self.read_identifier()),
            c => Err(Error::syntax(start, format!("unexpected character '{}'", c))),
        }
    }

    /// Check if we've reached the end of input
    fn is_at_end(&self) -> bool {
        self.position >= self.input.len()
    }

    /// Get the current character
    fn current_char(&self) -> char {
        self.input[self.position]
    }

    /// Peek at the next character
    fn peek_char(&self) -> Option<char> {
        self.input.get(self.position + 1).copied()
    }

    /// Advance to the next character
    fn advance(&mut self) {
        self.position += 1;
    }

    /// Consume the current character if it matches
    fn match_char(&mut self, expected: char) -> bool {
        if !self.is_at_end() && self.current_char() == expected {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Skip whitespace and SQL comments (-- and /* */)
    fn skip_trivia(&mut self) -> Result<()> {
        loop {
            while !self.is_at_end() && self.current_char().is_whitespace() {
                self.advance();
            }
            if self.is_at_end() {
                return Ok(());
            }

            if self.current_char() == '-' && self.peek_char() == Some('-') {
                while !self.is_at_end() && self.current_char() != '\n' {
                    self.advance();
                }
            } else if self.current_char() == '/' && self.peek_char() == Some('*') {
                let start = self.position;
                self.advance();
                self.advance();
                loop {
                    if self.is_at_end() {
                        return Err(Error::syntax(start, "unterminated comment"));
                    }
                    if self.current_char() == '*' && self.peek_char() == Some('/') {
                        self.advance();
                        self.advance();
                        break;
                    }
                    self.advance();
                }
            } else {
                return Ok(());
            }
        }
    }

    /// Read a delimited literal; a doubled closing delimiter escapes itself
    fn read_quoted(&mut self, open: char, close: char) -> Result<String> {
        let start_pos = self.position;
        debug_assert_eq!(self.current_char(), open);
        self.advance(); // skip opening delimiter

        let mut value = String::new();

        while !self.is_at_end() {
            let ch = self.current_char();

            if ch == close {
                if close != ']' && self.peek_char() == Some(close) {
                    value.push(close);
                    self.advance();
                    self.advance();
                } else {
                    self.advance(); // skip closing delimiter
                    return Ok(value);
                }
            } else {
                value.push(ch);
                self.advance();
            }
        }

        let what = if open == '\'' { "string" } else { "identifier" };
        Err(Error::syntax(start_pos, format!("unterminated {}", what)))
    }

    /// Read a blob literal: X'48656C6C6F'
    fn read_blob(&mut self) -> Result<Token> {
        let start_pos = self.position;
        self.advance(); // skip X
        let digits = self.read_quoted('\'', '\'')?;

        if digits.len() % 2 != 0 {
            return Err(Error::syntax(start_pos, "malformed blob literal"));
        }
        let mut bytes = Vec::with_capacity(digits.len() / 2);
        let chars: Vec<char> = digits.chars().collect();
        for pair in chars.chunks(2) {
            let hi = pair[0].to_digit(16);
            let lo = pair[1].to_digit(16);
            match (hi, lo) {
                (Some(hi), Some(lo)) => bytes.push((hi * 16 + lo) as u8),
                _ => return Err(Error::syntax(start_pos, "malformed blob literal")),
            }
        }
        Ok(Token::BlobLiteral(bytes))
    }

    /// Read a named placeholder: :name
    fn read_named_parameter(&mut self) -> Result<Token> {
        let start_pos = self.position;
        self.advance(); // skip :

        let mut name = String::new();
        while !self.is_at_end() {
            let ch = self.current_char();
            if ch.is_alphanumeric() || ch == '_' {
                name.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        if name.is_empty() {
            return Err(Error::syntax(start_pos, "expected parameter name after ':'"));
        }
        Ok(Token::NamedParameter(name))
    }

    /// Read a number (integer or float)
    fn read_number(&mut self) -> Result<Token> {
        let start_pos = self.position;
        let mut value = String::new();
        let mut is_float = false;

        while !self.is_at_end() {
            let ch = self.current_char();

            if ch.is_ascii_digit() {
                value.push(ch);
                self.advance();
            } else if ch == '.' && !is_float {
                is_float = true;
                value.push(ch);
                self.advance();
            } else if ch == 'e' || ch == 'E' {
                // Scientific notation
                is_float = true;
                value.push(ch);
                self.advance();

                if !self.is_at_end() && (self.current_char() == '+' || self.current_char() == '-') {
                    value.push(self.current_char());
                    self.advance();
                }
                if self.is_at_end() || !self.current_char().is_ascii_digit() {
                    return Err(Error::syntax(start_pos, "malformed number"));
                }
                while !self.is_at_end() && self.current_char().is_ascii_digit() {
                    value.push(self.current_char());
                    self.advance();
                }
                break;
            } else {
                break;
            }
        }

        if !self.is_at_end() && (self.current_char().is_alphabetic() || self.current_char() == '_') {
            return Err(Error::syntax(start_pos, "malformed number"));
        }

        if !is_float {
            // Integers too large for i64 become reals
            if let Ok(n) = value.parse::<i64>() {
                return Ok(Token::IntegerLiteral(n));
            }
        }
        value
            .parse::<f64>()
            .map(Token::FloatLiteral)
            .map_err(|_| Error::syntax(start_pos, "malformed number"))
    }

    /// Read an identifier or keyword
    fn read_identifier(&mut self) -> Token {
        let mut value = String::new();

        while !self.is_at_end() {
            let ch = self.current_char();

            if ch.is_alphanumeric() || ch == '_' || ch == '$' {
                value.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        // Check if it's a keyword
        Token::from_keyword(&value).unwrap_or(Token::Identifier(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &str) -> Vec<Token> {
        Lexer::new(input)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|s| s.token)
            .collect()
    }

    #[test]
    fn test_simple_select() {
        assert_eq!(
            tokens("SELECT * FROM users"),
            vec![
                Token::Select,
                Token::Asterisk,
                Token::From,
                Token::Identifier("users".to_string()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_positions() {
        let spanned = Lexer::new("SELECT  a").tokenize().unwrap();
        assert_eq!(spanned[0].position, 0);
        assert_eq!(spanned[1].position, 8);
        assert_eq!(spanned[2].position, 9);
    }

    #[test]
    fn test_quoted_identifiers() {
        assert_eq!(
            tokens("\"my \"\"col\"\"\" `b` [c d]"),
            vec![
                Token::Identifier("my \"col\"".to_string()),
                Token::Identifier("b".to_string()),
                Token::Identifier("c d".to_string()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_escaped_string() {
        assert_eq!(
            tokens("SELECT 'it''s a test'")[1],
            Token::StringLiteral("it's a test".to_string())
        );
    }

    #[test]
    fn test_blob_literal() {
        assert_eq!(
            tokens("x'00ff10'")[0],
            Token::BlobLiteral(vec![0x00, 0xff, 0x10])
        );
        assert!(Lexer::new("X'0'").tokenize().is_err());
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(
            tokens("? :who_1"),
            vec![
                Token::QuestionMark,
                Token::NamedParameter("who_1".to_string()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_comparison_operators() {
        let toks = tokens("a < b <= c > d >= e <> f != g == h");
        assert!(toks.contains(&Token::Lt));
        assert!(toks.contains(&Token::Lte));
        assert!(toks.contains(&Token::Gt));
        assert!(toks.contains(&Token::Gte));
        assert!(toks.contains(&Token::Eq));
        assert_eq!(toks.iter().filter(|t| **t == Token::Neq).count(), 2);
    }

    #[test]
    fn test_numbers() {
        let toks = tokens("3.14 2.5e10 .5 9223372036854775808 x-1");
        assert_eq!(toks[0], Token::FloatLiteral(3.14));
        assert_eq!(toks[1], Token::FloatLiteral(2.5e10));
        assert_eq!(toks[2], Token::FloatLiteral(0.5));
        assert_eq!(toks[3], Token::FloatLiteral(9223372036854775808.0));
        assert_eq!(toks[5], Token::Minus);
        assert_eq!(toks[6], Token::IntegerLiteral(1));
    }

    #[test]
    fn test_comments() {
        assert_eq!(
            tokens("SELECT -- this is a comment\n* /* and\nthis */ FROM users"),
            vec![
                Token::Select,
                Token::Asterisk,
                Token::From,
                Token::Identifier("users".to_string()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_error_position() {
        match Lexer::new("SELECT @").tokenize() {
            Err(Error::Syntax { position, .. }) => assert_eq!(position, 7),
            other => panic!("expected syntax error, got {:?}", other),
        }
        assert!(Lexer::new("'open").tokenize().is_err());
    }
}
