//! Turns source text into a stream of [Token]s.
//!
//! This is a direct descendant of the predecessor's single-character
//! lookahead `getToken`: whitespace (tracking newlines for line numbers) and
//! `//` comments are skipped inline, identifiers/keywords/numbers/strings
//! are each read greedily, and everything else falls through to a
//! single/double-character punctuation match.

use crate::error::LexicalError;
use crate::util::Position;
use std::rc::Rc;
use std::str::Chars;

#[derive(Clone, Debug, PartialEq)]
pub enum Token {
    // Keywords
    Var,
    Func,
    If,
    Else,
    While,
    For,
    Return,
    Struct,
    Cast,
    Asm,
    Include,
    True,
    False,

    // Literals and identifiers
    Ident(String),
    Int(i32),
    Str(Vec<u8>),
    Char(u8),

    // Punctuation
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Semi,
    Colon,
    Comma,
    Hash,
    Amp,
    Star,
    Plus,
    Minus,
    Slash,
    Percent,
    Bang,
    Assign,
    Eq,
    NotEq,
    Lt,
    Gt,
    Le,
    Ge,
    AndAnd,
    OrOr,
    Arrow,

    Eof,
}

impl Token {
    pub fn describe(&self) -> String {
        match self {
            Token::Ident(s) => format!("identifier `{}`", s),
            Token::Int(n) => format!("integer `{}`", n),
            Token::Str(_) => "string literal".to_string(),
            Token::Char(_) => "character literal".to_string(),
            Token::Eof => "end of file".to_string(),
            other => format!("`{:?}`", other),
        }
    }
}

pub struct SpannedToken {
    pub token: Token,
    pub pos: Position,
}

pub struct Lexer<'a> {
    chars: Chars<'a>,
    last: Option<char>,
    file: Rc<str>,
    line: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str, file: impl Into<Rc<str>>) -> Self {
        let mut chars = source.chars();
        let last = chars.next();
        Self {
            chars,
            last,
            file: file.into(),
            line: 1,
        }
    }

    fn pos(&self) -> Position {
        Position::new(self.file.clone(), self.line)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.last;
        self.last = self.chars.next();
        c
    }

    /// Peeks one character past `self.last` without consuming either,
    /// needed only to distinguish a `0x` prefix from a plain `0`.
    fn peek_after_zero(&self) -> Option<char> {
        self.chars.clone().next()
    }

    /// Tokenizes the entire source up front. `Token::Eof` terminates the
    /// stream and is always the last element.
    pub fn tokenize(mut self) -> Result<Vec<SpannedToken>, (LexicalError, Position)> {
        let mut tokens = Vec::new();
        loop {
            let spanned = self.next_token()?;
            let is_eof = spanned.token == Token::Eof;
            tokens.push(spanned);
            if is_eof {
                return Ok(tokens);
            }
        }
    }

    fn next_token(&mut self) -> Result<SpannedToken, (LexicalError, Position)> {
        loop {
            while let Some(c) = self.last {
                if !c.is_whitespace() {
                    break;
                }
                if c == '\n' {
                    self.line += 1;
                }
                self.bump();
            }

            let pos = self.pos();

            let c = match self.last {
                Some(c) => c,
                None => return Ok(SpannedToken { token: Token::Eof, pos }),
            };

            if c.is_alphabetic() || c == '_' {
                let mut s = String::new();
                while let Some(c) = self.last {
                    if c.is_alphanumeric() || c == '_' {
                        s.push(c);
                        self.bump();
                    } else {
                        break;
                    }
                }
                let token = match s.as_str() {
                    "var" => Token::Var,
                    "func" => Token::Func,
                    "if" => Token::If,
                    "else" => Token::Else,
                    "while" => Token::While,
                    "for" => Token::For,
                    "return" => Token::Return,
                    "struct" => Token::Struct,
                    "cast" => Token::Cast,
                    "asm" => Token::Asm,
                    "include" => Token::Include,
                    "true" => Token::True,
                    "false" => Token::False,
                    _ => Token::Ident(s),
                };
                return Ok(SpannedToken { token, pos });
            }

            if c.is_ascii_digit() {
                if c == '0' && matches!(self.peek_after_zero(), Some('x') | Some('X')) {
                    self.bump(); // '0'
                    self.bump(); // 'x'/'X'
                    let mut s = String::new();
                    while let Some(c) = self.last {
                        if c.is_ascii_hexdigit() {
                            s.push(c);
                            self.bump();
                        } else {
                            break;
                        }
                    }
                    let value = i64::from_str_radix(&s, 16).unwrap_or(0) as i32;
                    return Ok(SpannedToken { token: Token::Int(value), pos });
                }
                let mut s = String::new();
                while let Some(c) = self.last {
                    if c.is_ascii_digit() {
                        s.push(c);
                        self.bump();
                    } else {
                        break;
                    }
                }
                let value: i32 = s.parse().unwrap_or(0);
                return Ok(SpannedToken { token: Token::Int(value), pos });
            }

            if c == '"' {
                self.bump();
                let mut bytes = Vec::new();
                loop {
                    match self.last {
                        None | Some('\n') => {
                            return Err((LexicalError::UnterminatedString, pos))
                        }
                        Some('"') => {
                            self.bump();
                            break;
                        }
                        Some('\\') => {
                            self.bump();
                            bytes.push(self.read_escape(pos.clone())?);
                        }
                        Some(c) => {
                            bytes.push(c as u8);
                            self.bump();
                        }
                    }
                }
                return Ok(SpannedToken { token: Token::Str(bytes), pos });
            }

            if c == '\'' {
                self.bump();
                let byte = match self.last {
                    None | Some('\n') => return Err((LexicalError::UnterminatedChar, pos)),
                    Some('\\') => {
                        self.bump();
                        self.read_escape(pos.clone())?
                    }
                    Some('\'') => return Err((LexicalError::EmptyCharLiteral, pos)),
                    Some(c) => {
                        self.bump();
                        c as u8
                    }
                };
                if self.last != Some('\'') {
                    return Err((LexicalError::UnterminatedChar, pos));
                }
                self.bump();
                return Ok(SpannedToken { token: Token::Char(byte), pos });
            }

            let first = c;
            self.bump();

            if first == '/' && self.last == Some('/') {
                while let Some(c) = self.last {
                    if c == '\n' {
                        break;
                    }
                    self.bump();
                }
                continue;
            }

            macro_rules! two_char {
                ($second:expr, $then:expr, $else_:expr) => {{
                    if self.last == Some($second) {
                        self.bump();
                        $then
                    } else {
                        $else_
                    }
                }};
            }

            let token = match first {
                '(' => Token::LParen,
                ')' => Token::RParen,
                '{' => Token::LBrace,
                '}' => Token::RBrace,
                '[' => Token::LBracket,
                ']' => Token::RBracket,
                ';' => Token::Semi,
                ':' => Token::Colon,
                ',' => Token::Comma,
                '#' => Token::Hash,
                '&' => two_char!('&', Token::AndAnd, Token::Amp),
                '*' => Token::Star,
                '+' => Token::Plus,
                '-' => two_char!('>', Token::Arrow, Token::Minus),
                '/' => Token::Slash,
                '%' => Token::Percent,
                '!' => two_char!('=', Token::NotEq, Token::Bang),
                '=' => two_char!('=', Token::Eq, Token::Assign),
                '<' => two_char!('=', Token::Le, Token::Lt),
                '>' => two_char!('=', Token::Ge, Token::Gt),
                '|' => two_char!('|', Token::OrOr, return Err((LexicalError::UnexpectedChar('|'), pos))),
                other => return Err((LexicalError::UnexpectedChar(other), pos)),
            };
            return Ok(SpannedToken { token, pos });
        }
    }

    fn read_escape(&mut self, pos: Position) -> Result<u8, (LexicalError, Position)> {
        let c = self.last.ok_or((LexicalError::UnterminatedString, pos.clone()))?;
        self.bump();
        Ok(match c {
            'n' => b'\n',
            't' => b'\t',
            'r' => b'\r',
            '0' => 0,
            '\\' => b'\\',
            '"' => b'"',
            '\'' => b'\'',
            other => return Err((LexicalError::UnknownEscape(other), pos)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(src: &str) -> Vec<Token> {
        Lexer::new(src, "test.wat")
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|s| s.token)
            .collect()
    }

    #[test]
    fn keywords_and_idents() {
        assert_eq!(
            lex("var x func"),
            vec![Token::Var, Token::Ident("x".into()), Token::Func, Token::Eof]
        );
    }

    #[test]
    fn line_comments_are_skipped() {
        assert_eq!(
            lex("1 // two\n3"),
            vec![Token::Int(1), Token::Int(3), Token::Eof]
        );
    }

    #[test]
    fn two_char_operators() {
        assert_eq!(
            lex("<= >= == != && || ->"),
            vec![
                Token::Le,
                Token::Ge,
                Token::Eq,
                Token::NotEq,
                Token::AndAnd,
                Token::OrOr,
                Token::Arrow,
                Token::Eof
            ]
        );
    }

    #[test]
    fn string_with_escapes() {
        assert_eq!(
            lex(r#""a\nb""#),
            vec![Token::Str(vec![b'a', b'\n', b'b']), Token::Eof]
        );
    }

    #[test]
    fn hex_integer_literal() {
        assert_eq!(lex("0x1F 0"), vec![Token::Int(31), Token::Int(0), Token::Eof]);
    }

    #[test]
    fn char_literal() {
        assert_eq!(lex("'x'"), vec![Token::Char(b'x'), Token::Eof]);
    }

    #[test]
    fn tracks_line_numbers() {
        let tokens = Lexer::new("1\n2", "f.wat").tokenize().unwrap();
        assert_eq!(tokens[0].pos.line, 1);
        assert_eq!(tokens[1].pos.line, 2);
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let result = Lexer::new("\"abc", "f.wat").tokenize();
        assert!(result.is_err());
    }
}
