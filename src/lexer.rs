//! Hand-written forward-scan lexer.
//!
//! Grounded in `LinhC/Parsing/Lexer/Lexer.cpp`: a single left-to-right pass
//! over the source bytes, switching on the current character, with
//! `TokenType::ERROR` tokens (here [`TokenKind::Error`]) emitted in place
//! rather than raised immediately, so the caller can keep scanning and
//! collect every lexical error in one pass.
//!
//! String interpolation (`&{ expr }`) re-enters the normal token-scanning
//! loop for the embedded expression instead of capturing it as raw text —
//! an idiomatic-Rust simplification of the original's "grab the substring
//! between braces and re-lex it as a single token" approach.

use std::collections::VecDeque;

use crate::token::{keyword_kind, Literal, Token, TokenKind};

pub struct Lexer<'a> {
    source: &'a [u8],
    start: usize,
    current: usize,
    line: usize,
    col: usize,
    start_line: usize,
    start_col: usize,
    /// Tokens already produced by a multi-token scan (interpolated strings)
    /// waiting to be drained before the main loop scans further input.
    pending: VecDeque<Token>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source: source.as_bytes(),
            start: 0,
            current: 0,
            line: 1,
            col: 1,
            start_line: 1,
            start_col: 1,
            pending: VecDeque::new(),
        }
    }

    pub fn scan_tokens(mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            if let Some(tok) = self.pending.pop_front() {
                tokens.push(tok);
                continue;
            }
            self.skip_trivia_between_tokens();
            if self.is_at_end() {
                break;
            }
            self.start = self.current;
            self.start_line = self.line;
            self.start_col = self.col;
            if let Some(tok) = self.scan_one() {
                tokens.push(tok);
            }
        }
        tokens.push(Token::new(TokenKind::Eof, "", Literal::None, self.line, self.col));
        tokens
    }

    /// Skips whitespace and `//` line comments that sit between tokens.
    fn skip_trivia_between_tokens(&mut self) {
        loop {
            match self.peek() {
                ' ' | '\r' | '\t' => {
                    self.advance();
                }
                '\n' => {
                    self.advance_newline();
                }
                '/' if self.peek_next() == '/' => {
                    while self.peek() != '\n' && !self.is_at_end() {
                        self.advance();
                    }
                }
                '/' if self.peek_next() == '*' => {
                    let (line, col) = (self.line, self.col);
                    self.advance();
                    self.advance();
                    if !self.skip_block_comment() {
                        self.pending.push_back(Token::new(
                            TokenKind::Error,
                            "",
                            Literal::Str("Unterminated block comment.".to_string()),
                            line,
                            col,
                        ));
                        return;
                    }
                }
                _ => return,
            }
        }
    }

    /// Non-nesting: the first `*/` encountered closes the comment, matching
    /// the "nested block comments are not supported" resolution.
    fn skip_block_comment(&mut self) -> bool {
        while !(self.peek() == '*' && self.peek_next() == '/') && !self.is_at_end() {
            if self.peek() == '\n' {
                self.advance_newline();
            } else {
                self.advance();
            }
        }
        if self.is_at_end() {
            return false;
        }
        self.advance();
        self.advance();
        true
    }

    fn scan_one(&mut self) -> Option<Token> {
        let c = self.advance();
        use TokenKind::*;
        let kind = match c {
            '(' => LParen,
            ')' => RParen,
            '{' => LBrace,
            '}' => RBrace,
            '[' => LBracket,
            ']' => RBracket,
            ',' => Comma,
            '.' => Dot,
            ';' => Semicolon,
            ':' => Colon,
            '~' => Tilde,
            '%' => if self.match_char('=') { PercentEq } else { Percent },
            '#' => if self.match_char('=') { HashEq } else { Hash },
            '!' => if self.match_char('=') { BangEq } else { Bang },
            '=' => if self.match_char('=') { EqEq } else { Assign },
            '&' => if self.match_char('&') { AmpAmp } else { Amp },
            '|' => if self.match_char('|') { PipePipe } else { Pipe },
            '^' => Caret,
            '<' => if self.match_char('<') { LtLt } else if self.match_char('=') { LtEq } else { Lt },
            '>' => if self.match_char('>') { GtGt } else if self.match_char('=') { GtEq } else { Gt },
            '-' => if self.match_char('-') { MinusMinus } else if self.match_char('=') { MinusEq } else { Minus },
            '+' => if self.match_char('+') { PlusPlus } else if self.match_char('=') { PlusEq } else { Plus },
            '*' => if self.match_char('*') { StarStar } else if self.match_char('=') { StarEq } else { Star },
            '/' => if self.match_char('=') { SlashEq } else { Slash },
            '"' | '\'' | '`' => return self.scan_string(c),
            c if c.is_ascii_digit() => return Some(self.scan_number()),
            c if c.is_alphabetic() || c == '_' => return Some(self.scan_identifier()),
            other => {
                return Some(self.error_token(format!("Unexpected character '{other}'.")));
            }
        };
        Some(self.make_token(kind, Literal::None))
    }

    fn scan_number(&mut self) -> Token {
        while self.peek().is_ascii_digit() {
            self.advance();
        }
        let mut is_float = false;
        if self.peek() == '.' && self.peek_next().is_ascii_digit() {
            is_float = true;
            self.advance();
            while self.peek().is_ascii_digit() {
                self.advance();
            }
        }
        let text = self.lexeme();
        let mut is_uint = false;
        if !is_float && (self.peek() == 'u' || self.peek() == 'U') {
            is_uint = true;
            self.advance();
        }
        if is_float {
            match text.parse::<f64>() {
                Ok(v) => self.make_token(TokenKind::Float, Literal::Float(v)),
                Err(_) => self.error_token(format!("Float literal '{text}' out of range.")),
            }
        } else if is_uint {
            match text.parse::<u64>() {
                Ok(v) => self.make_token(TokenKind::UInt, Literal::UInt(v)),
                Err(_) => self.error_token(format!("Uint literal '{text}' out of range.")),
            }
        } else {
            match text.parse::<i64>() {
                Ok(v) => self.make_token(TokenKind::Int, Literal::Int(v)),
                Err(_) => self.error_token(format!("Integer literal '{text}' out of range.")),
            }
        }
    }

    fn scan_identifier(&mut self) -> Token {
        while self.peek().is_alphanumeric() || self.peek() == '_' {
            self.advance();
        }
        let text = self.lexeme();
        match keyword_kind(&text) {
            Some(TokenKind::True) => self.make_token(TokenKind::True, Literal::Bool(true)),
            Some(TokenKind::False) => self.make_token(TokenKind::False, Literal::Bool(false)),
            Some(kind) => self.make_token(kind, Literal::None),
            None => self.make_token(TokenKind::Identifier, Literal::None),
        }
    }

    /// Scans a string literal, splicing in `InterpStart`/.../`InterpEnd`
    /// tokens for each `&{ expr }` run and a plain `Str` token for literal
    /// text in between. Any tokens beyond the first are queued in
    /// `self.pending`.
    fn scan_string(&mut self, quote: char) -> Option<Token> {
        let (start_line, start_col) = (self.start_line, self.start_col);
        let mut produced: Vec<Token> = Vec::new();
        let mut buf = String::new();
        loop {
            if self.is_at_end() {
                produced.push(Token::new(
                    TokenKind::Error,
                    self.lexeme(),
                    Literal::Str("Unterminated string.".to_string()),
                    start_line,
                    start_col,
                ));
                return self.queue_and_take_first(produced);
            }
            let c = self.peek();
            if c == quote {
                self.advance();
                break;
            }
            if c == '\n' {
                self.advance_newline();
                buf.push('\n');
                continue;
            }
            if c == '&' && self.peek_next() == '{' {
                if !buf.is_empty() {
                    produced.push(Token::new(TokenKind::Str, buf.clone(), Literal::Str(buf.clone()), start_line, start_col));
                    buf.clear();
                }
                self.advance(); // '&'
                self.advance(); // '{'
                produced.push(Token::new(TokenKind::InterpStart, "&{", Literal::None, self.line, self.col));
                if !self.scan_interpolated_expr(&mut produced) {
                    return self.queue_and_take_first(produced);
                }
                continue;
            }
            if quote != '`' && c == '\\' {
                let next = self.peek_next();
                if next == quote || next == '\\' {
                    self.advance();
                    buf.push(self.advance());
                    continue;
                }
            }
            buf.push(self.advance());
        }
        if !buf.is_empty() {
            produced.push(Token::new(TokenKind::Str, buf.clone(), Literal::Str(buf), start_line, start_col));
        }
        self.queue_and_take_first(produced)
    }

    /// Scans the `expr` portion of `&{ expr }`, tracking brace depth so a
    /// nested `{ }` inside the expression (e.g. a map literal) does not
    /// terminate the interpolation early.
    fn scan_interpolated_expr(&mut self, out: &mut Vec<Token>) -> bool {
        let mut depth: i32 = 1;
        loop {
            self.skip_trivia_between_tokens();
            if self.is_at_end() {
                out.push(Token::new(
                    TokenKind::Error,
                    "",
                    Literal::Str("Unterminated interpolation.".to_string()),
                    self.line,
                    self.col,
                ));
                return false;
            }
            if self.peek() == '}' {
                depth -= 1;
                if depth == 0 {
                    let (line, col) = (self.line, self.col);
                    self.advance();
                    out.push(Token::new(TokenKind::InterpEnd, "}", Literal::None, line, col));
                    return true;
                }
            }
            if self.peek() == '{' {
                depth += 1;
            }
            self.start = self.current;
            self.start_line = self.line;
            self.start_col = self.col;
            if let Some(tok) = self.scan_one() {
                out.push(tok);
            }
            while let Some(tok) = self.pending.pop_front() {
                out.push(tok);
            }
        }
    }

    fn queue_and_take_first(&mut self, mut produced: Vec<Token>) -> Option<Token> {
        if produced.is_empty() {
            return None;
        }
        let first = produced.remove(0);
        self.pending.extend(produced);
        Some(first)
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }

    fn advance(&mut self) -> char {
        let c = self.source[self.current] as char;
        self.current += 1;
        self.col += 1;
        c
    }

    fn advance_newline(&mut self) {
        self.current += 1;
        self.line += 1;
        self.col = 1;
    }

    fn peek(&self) -> char {
        if self.is_at_end() { '\0' } else { self.source[self.current] as char }
    }

    fn peek_next(&self) -> char {
        if self.current + 1 >= self.source.len() { '\0' } else { self.source[self.current + 1] as char }
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.peek() != expected {
            return false;
        }
        self.advance();
        true
    }

    fn lexeme(&self) -> String {
        String::from_utf8_lossy(&self.source[self.start..self.current]).into_owned()
    }

    fn make_token(&self, kind: TokenKind, literal: Literal) -> Token {
        Token::new(kind, self.lexeme(), literal, self.start_line, self.start_col)
    }

    fn error_token(&self, message: String) -> Token {
        Token::new(TokenKind::Error, self.lexeme(), Literal::Str(message), self.start_line, self.start_col)
    }
}

pub fn lex(source: &str) -> Vec<Token> {
    Lexer::new(source).scan_tokens()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        lex(src).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn scans_arithmetic_expression() {
        use TokenKind::*;
        assert_eq!(kinds("1 + 2 * 3"), vec![Int, Plus, Int, Star, Int, Eof]);
    }

    #[test]
    fn scans_keywords_not_prefixes() {
        use TokenKind::*;
        assert_eq!(kinds("var vas variable"), vec![Var, Vas, Identifier, Eof]);
    }

    #[test]
    fn scans_floor_div_and_compound_assign() {
        use TokenKind::*;
        assert_eq!(kinds("a #= 2"), vec![Identifier, HashEq, Int, Eof]);
    }

    #[test]
    fn scans_line_comment_to_eol() {
        use TokenKind::*;
        assert_eq!(kinds("1 // ignored\n2"), vec![Int, Int, Eof]);
    }

    #[test]
    fn block_comment_does_not_nest() {
        use TokenKind::*;
        // the first `*/` closes the comment, so the trailing `*/` becomes
        // two stray tokens rather than extending the comment.
        let ks = kinds("/* a /* b */ c */ 1");
        assert_eq!(ks.last().copied(), Some(Eof));
        assert!(ks.contains(&Star));
    }

    #[test]
    fn unterminated_string_is_an_error_token() {
        use TokenKind::*;
        assert_eq!(kinds("\"abc"), vec![Error, Eof]);
    }

    #[test]
    fn scans_simple_interpolated_string() {
        use TokenKind::*;
        assert_eq!(kinds("\"Hi, &{name}!\""), vec![Str, InterpStart, Identifier, InterpEnd, Str, Eof]);
    }

    #[test]
    fn scans_interpolation_with_nested_braces() {
        use TokenKind::*;
        let ks = kinds("\"&{m[\"k\"]}\"");
        assert_eq!(ks.first(), Some(&InterpStart));
        assert_eq!(ks.last(), Some(&Eof));
    }

    #[test]
    fn uint_and_float_suffixes() {
        use TokenKind::*;
        assert_eq!(kinds("5u 5.0 5"), vec![UInt, Float, Int, Eof]);
    }
}
