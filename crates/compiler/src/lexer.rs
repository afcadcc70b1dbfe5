//! Hand-rolled lexer. Parsing is plumbing outside the analyzer/codegen core,
//! so this stays small and direct rather than reaching for a grammar crate.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    IntLit(i64),
    FloatLit(f64),
    StringLit(String),
    CharLit(u8),
    BoolLit(bool),
    Ident(String),

    // Keywords
    Let,
    Var,
    Data,
    Fn,
    Inline,
    Generic,
    Template,
    Macro,
    If,
    Elif,
    Else,
    While,
    Return,
    End,
    From,
    Select,
    By,
    Where,
    Sort,
    Join,
    On,
    Asof,
    Strict,
    Backward,
    Forward,
    Nearest,
    Within,
    Print,
    Save,
    Exit,

    // Punctuation
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Colon,
    Semicolon,
    Dot,
    Bang,

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Eq,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,

    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(Debug, Clone)]
pub struct LexError {
    pub message: String,
    pub pos: usize,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lex error at byte {}: {}", self.pos, self.message)
    }
}

pub struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
}

fn keyword(word: &str) -> Option<Token> {
    Some(match word {
        "let" => Token::Let,
        "var" => Token::Var,
        "data" => Token::Data,
        "fn" => Token::Fn,
        "inline" => Token::Inline,
        "generic" => Token::Generic,
        "template" => Token::Template,
        "macro" => Token::Macro,
        "if" => Token::If,
        "elif" => Token::Elif,
        "else" => Token::Else,
        "while" => Token::While,
        "return" => Token::Return,
        "end" => Token::End,
        "from" => Token::From,
        "select" => Token::Select,
        "by" => Token::By,
        "where" => Token::Where,
        "sort" => Token::Sort,
        "join" => Token::Join,
        "on" => Token::On,
        "asof" => Token::Asof,
        "strict" => Token::Strict,
        "backward" => Token::Backward,
        "forward" => Token::Forward,
        "nearest" => Token::Nearest,
        "within" => Token::Within,
        "print" => Token::Print,
        "save" => Token::Save,
        "exit" => Token::Exit,
        "true" => Token::BoolLit(true),
        "false" => Token::BoolLit(false),
        _ => return None,
    })
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Lexer { src: src.as_bytes(), pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(b' ') | Some(b'\t') | Some(b'\r') | Some(b'\n') => {
                    self.pos += 1;
                }
                Some(b'#') => {
                    while let Some(c) = self.peek() {
                        if c == b'\n' {
                            break;
                        }
                        self.pos += 1;
                    }
                }
                _ => break,
            }
        }
    }

    /// Tokenises the whole source into a flat list, `Eof` terminated.
    pub fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
        let mut out = Vec::new();
        loop {
            self.skip_trivia();
            let Some(c) = self.peek() else {
                out.push(Token::Eof);
                return Ok(out);
            };
            let start = self.pos;
            let tok = match c {
                b'0'..=b'9' => self.lex_number()?,
                b'"' => self.lex_string()?,
                b'\'' => self.lex_char()?,
                b'a'..=b'z' | b'A'..=b'Z' | b'_' => self.lex_ident(),
                b'(' => { self.pos += 1; Token::LParen }
                b')' => { self.pos += 1; Token::RParen }
                b'{' => { self.pos += 1; Token::LBrace }
                b'}' => { self.pos += 1; Token::RBrace }
                b'[' => { self.pos += 1; Token::LBracket }
                b']' => { self.pos += 1; Token::RBracket }
                b',' => { self.pos += 1; Token::Comma }
                b':' => { self.pos += 1; Token::Colon }
                b';' => { self.pos += 1; Token::Semicolon }
                b'.' => { self.pos += 1; Token::Dot }
                b'+' => { self.pos += 1; Token::Plus }
                b'-' => { self.pos += 1; Token::Minus }
                b'*' => { self.pos += 1; Token::Star }
                b'/' => { self.pos += 1; Token::Slash }
                b'%' => { self.pos += 1; Token::Percent }
                b'!' => {
                    self.pos += 1;
                    if self.peek() == Some(b'=') {
                        self.pos += 1;
                        Token::NotEq
                    } else {
                        Token::Bang
                    }
                }
                b'=' => {
                    self.pos += 1;
                    if self.peek() == Some(b'=') {
                        self.pos += 1;
                        Token::EqEq
                    } else {
                        Token::Eq
                    }
                }
                b'<' => {
                    self.pos += 1;
                    if self.peek() == Some(b'=') {
                        self.pos += 1;
                        Token::Le
                    } else {
                        Token::Lt
                    }
                }
                b'>' => {
                    self.pos += 1;
                    if self.peek() == Some(b'=') {
                        self.pos += 1;
                        Token::Ge
                    } else {
                        Token::Gt
                    }
                }
                b'&' => {
                    self.pos += 1;
                    if self.peek() == Some(b'&') {
                        self.pos += 1;
                        Token::AndAnd
                    } else {
                        return Err(LexError { message: "expected '&&'".to_string(), pos: start });
                    }
                }
                b'|' => {
                    self.pos += 1;
                    if self.peek() == Some(b'|') {
                        self.pos += 1;
                        Token::OrOr
                    } else {
                        return Err(LexError { message: "expected '||'".to_string(), pos: start });
                    }
                }
                other => {
                    return Err(LexError { message: format!("unexpected byte {:?}", other as char), pos: start });
                }
            };
            out.push(tok);
        }
    }

    fn lex_ident(&mut self) -> Token {
        let start = self.pos;
        while matches!(self.peek(), Some(b'a'..=b'z') | Some(b'A'..=b'Z') | Some(b'0'..=b'9') | Some(b'_')) {
            self.pos += 1;
        }
        let word = std::str::from_utf8(&self.src[start..self.pos]).unwrap();
        keyword(word).unwrap_or_else(|| Token::Ident(word.to_string()))
    }

    fn lex_number(&mut self) -> Result<Token, LexError> {
        let start = self.pos;
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.pos += 1;
        }
        let mut is_float = false;
        if self.peek() == Some(b'.') && matches!(self.src.get(self.pos + 1), Some(b'0'..=b'9')) {
            is_float = true;
            self.pos += 1;
            while matches!(self.peek(), Some(b'0'..=b'9')) {
                self.pos += 1;
            }
        }
        let text = std::str::from_utf8(&self.src[start..self.pos]).unwrap();
        if is_float {
            text.parse::<f64>().map(Token::FloatLit).map_err(|e| LexError { message: e.to_string(), pos: start })
        } else {
            text.parse::<i64>().map(Token::IntLit).map_err(|e| LexError { message: e.to_string(), pos: start })
        }
    }

    fn lex_string(&mut self) -> Result<Token, LexError> {
        let start = self.pos;
        self.pos += 1; // opening quote
        let mut s = String::new();
        loop {
            match self.bump() {
                Some(b'"') => return Ok(Token::StringLit(s)),
                Some(b'\\') => match self.bump() {
                    Some(b'n') => s.push('\n'),
                    Some(b't') => s.push('\t'),
                    Some(b'"') => s.push('"'),
                    Some(b'\\') => s.push('\\'),
                    Some(other) => s.push(other as char),
                    None => return Err(LexError { message: "unterminated string".to_string(), pos: start }),
                },
                Some(c) => s.push(c as char),
                None => return Err(LexError { message: "unterminated string".to_string(), pos: start }),
            }
        }
    }

    fn lex_char(&mut self) -> Result<Token, LexError> {
        let start = self.pos;
        self.pos += 1; // opening quote
        let c = self.bump().ok_or_else(|| LexError { message: "unterminated char literal".to_string(), pos: start })?;
        if self.bump() != Some(b'\'') {
            return Err(LexError { message: "char literal must be one byte".to_string(), pos: start });
        }
        Ok(Token::CharLit(c))
    }
}
