use serde::Serialize;

use super::ast::Span;
use super::error::CompileError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TokenKind {
    // Literals
    Integer,
    Float,
    /// Fixed-precision decimal, `10.50d`
    Decimal,
    String,
    True,
    False,
    Null,

    // Identifiers
    Identifier,
    /// `@name`
    EntityRef,

    // Declaration keywords
    Component,
    Rule,
    On,
    When,
    Fn,
    Choice,
    Import,
    Module,
    Entity,
    Event,

    // Statement keywords
    Let,
    If,
    Else,
    For,
    In,
    While,
    Return,
    Schedule,
    Recurring,
    Cancel,
    Create,
    Delete,

    // Expression keywords
    New,
    Clone,
    Has,
    Entities,
    Having,

    // Type names
    TypeString,
    TypeBoolean,
    TypeInteger,
    TypeFloat,
    TypeDecimal,
    TypeId,
    TypeList,

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
    Question,
    Arrow, // ->

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Eq,      // =
    EqEq,    // ==
    NotEq,   // !=
    Lt,
    Le,      // <=
    Gt,
    Ge,      // >=
    AndAnd,  // &&
    OrOr,    // ||
    Bang,    // !
    Amp,     // &
    PlusEq,  // +=
    MinusEq, // -=
    StarEq,  // *=
    SlashEq, // /=

    Eof,
}

impl TokenKind {
    /// Human-readable name used in parser diagnostics.
    pub fn describe(self) -> &'static str {
        match self {
            TokenKind::Integer => "integer literal",
            TokenKind::Float => "float literal",
            TokenKind::Decimal => "decimal literal",
            TokenKind::String => "string literal",
            TokenKind::True => "'true'",
            TokenKind::False => "'false'",
            TokenKind::Null => "'null'",
            TokenKind::Identifier => "identifier",
            TokenKind::EntityRef => "entity reference",
            TokenKind::Component => "'component'",
            TokenKind::Rule => "'rule'",
            TokenKind::On => "'on'",
            TokenKind::When => "'when'",
            TokenKind::Fn => "'fn'",
            TokenKind::Choice => "'choice'",
            TokenKind::Import => "'import'",
            TokenKind::Module => "'module'",
            TokenKind::Entity => "'entity'",
            TokenKind::Event => "'event'",
            TokenKind::Let => "'let'",
            TokenKind::If => "'if'",
            TokenKind::Else => "'else'",
            TokenKind::For => "'for'",
            TokenKind::In => "'in'",
            TokenKind::While => "'while'",
            TokenKind::Return => "'return'",
            TokenKind::Schedule => "'schedule'",
            TokenKind::Recurring => "'recurring'",
            TokenKind::Cancel => "'cancel'",
            TokenKind::Create => "'create'",
            TokenKind::Delete => "'delete'",
            TokenKind::New => "'new'",
            TokenKind::Clone => "'clone'",
            TokenKind::Has => "'has'",
            TokenKind::Entities => "'entities'",
            TokenKind::Having => "'having'",
            TokenKind::TypeString => "'string'",
            TokenKind::TypeBoolean => "'boolean'",
            TokenKind::TypeInteger => "'integer'",
            TokenKind::TypeFloat => "'float'",
            TokenKind::TypeDecimal => "'decimal'",
            TokenKind::TypeId => "'id'",
            TokenKind::TypeList => "'list'",
            TokenKind::LParen => "'('",
            TokenKind::RParen => "')'",
            TokenKind::LBrace => "'{'",
            TokenKind::RBrace => "'}'",
            TokenKind::LBracket => "'['",
            TokenKind::RBracket => "']'",
            TokenKind::Comma => "','",
            TokenKind::Colon => "':'",
            TokenKind::Semicolon => "';'",
            TokenKind::Dot => "'.'",
            TokenKind::Question => "'?'",
            TokenKind::Arrow => "'->'",
            TokenKind::Plus => "'+'",
            TokenKind::Minus => "'-'",
            TokenKind::Star => "'*'",
            TokenKind::Slash => "'/'",
            TokenKind::Percent => "'%'",
            TokenKind::Eq => "'='",
            TokenKind::EqEq => "'=='",
            TokenKind::NotEq => "'!='",
            TokenKind::Lt => "'<'",
            TokenKind::Le => "'<='",
            TokenKind::Gt => "'>'",
            TokenKind::Ge => "'>='",
            TokenKind::AndAnd => "'&&'",
            TokenKind::OrOr => "'||'",
            TokenKind::Bang => "'!'",
            TokenKind::Amp => "'&'",
            TokenKind::PlusEq => "'+='",
            TokenKind::MinusEq => "'-='",
            TokenKind::StarEq => "'*='",
            TokenKind::SlashEq => "'/='",
            TokenKind::Eof => "end of input",
        }
    }
}

/// A token with its exact source text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub span: Span,
}

fn keyword(ident: &str) -> Option<TokenKind> {
    let kind = match ident {
        "component" => TokenKind::Component,
        "rule" => TokenKind::Rule,
        "on" => TokenKind::On,
        "when" => TokenKind::When,
        "fn" => TokenKind::Fn,
        "choice" => TokenKind::Choice,
        "import" => TokenKind::Import,
        "module" => TokenKind::Module,
        "entity" => TokenKind::Entity,
        "event" => TokenKind::Event,
        "let" => TokenKind::Let,
        "if" => TokenKind::If,
        "else" => TokenKind::Else,
        "for" => TokenKind::For,
        "in" => TokenKind::In,
        "while" => TokenKind::While,
        "return" => TokenKind::Return,
        "schedule" => TokenKind::Schedule,
        "recurring" => TokenKind::Recurring,
        "cancel" => TokenKind::Cancel,
        "create" => TokenKind::Create,
        "delete" => TokenKind::Delete,
        "new" => TokenKind::New,
        "clone" => TokenKind::Clone,
        "has" => TokenKind::Has,
        "entities" => TokenKind::Entities,
        "having" => TokenKind::Having,
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        "null" => TokenKind::Null,
        "string" => TokenKind::TypeString,
        "boolean" => TokenKind::TypeBoolean,
        "integer" => TokenKind::TypeInteger,
        "float" => TokenKind::TypeFloat,
        "decimal" => TokenKind::TypeDecimal,
        "id" => TokenKind::TypeId,
        "list" => TokenKind::TypeList,
        _ => return None,
    };
    Some(kind)
}

/// Tokenize a source file. The result always ends with one `Eof` token.
/// Stops at the first character that cannot start a token.
pub fn tokenize(source: &str) -> Result<Vec<Token>, CompileError> {
    Lexer::new(source).tokenize()
}

struct Lexer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            pos: 0,
            tokens: Vec::new(),
        }
    }

    fn tokenize(mut self) -> Result<Vec<Token>, CompileError> {
        loop {
            self.skip_whitespace_and_comments();
            if self.pos >= self.bytes.len() {
                break;
            }

            let start = self.pos;
            let ch = self.bytes[self.pos];

            match ch {
                b'(' => self.single(TokenKind::LParen),
                b')' => self.single(TokenKind::RParen),
                b'{' => self.single(TokenKind::LBrace),
                b'}' => self.single(TokenKind::RBrace),
                b'[' => self.single(TokenKind::LBracket),
                b']' => self.single(TokenKind::RBracket),
                b',' => self.single(TokenKind::Comma),
                b':' => self.single(TokenKind::Colon),
                b';' => self.single(TokenKind::Semicolon),
                b'.' => self.single(TokenKind::Dot),
                b'?' => self.single(TokenKind::Question),
                b'%' => self.single(TokenKind::Percent),
                b'+' => self.with_eq(TokenKind::Plus, TokenKind::PlusEq),
                b'*' => self.with_eq(TokenKind::Star, TokenKind::StarEq),
                b'/' => self.with_eq(TokenKind::Slash, TokenKind::SlashEq),
                b'=' => self.with_eq(TokenKind::Eq, TokenKind::EqEq),
                b'!' => self.with_eq(TokenKind::Bang, TokenKind::NotEq),
                b'<' => self.with_eq(TokenKind::Lt, TokenKind::Le),
                b'>' => self.with_eq(TokenKind::Gt, TokenKind::Ge),
                b'-' => match self.bytes.get(start + 1) {
                    Some(b'=') => self.emit(TokenKind::MinusEq, start, start + 2),
                    Some(b'>') => self.emit(TokenKind::Arrow, start, start + 2),
                    _ => self.single(TokenKind::Minus),
                },
                b'&' => {
                    if self.bytes.get(start + 1) == Some(&b'&') {
                        self.emit(TokenKind::AndAnd, start, start + 2);
                    } else {
                        self.single(TokenKind::Amp);
                    }
                }
                b'|' => {
                    if self.bytes.get(start + 1) == Some(&b'|') {
                        self.emit(TokenKind::OrOr, start, start + 2);
                    } else {
                        return Err(CompileError::lexer(
                            "Unexpected character '|' (did you mean '||'?)",
                            Span::new(start, start + 1),
                        ));
                    }
                }
                b'"' | b'\'' => self.lex_string(start, ch)?,
                b'@' => self.lex_entity_ref(start)?,
                b'0'..=b'9' => self.lex_number(start),
                b'a'..=b'z' | b'A'..=b'Z' | b'_' => self.lex_ident(start),
                _ => {
                    let bad = self.source[start..].chars().next().unwrap_or('\u{FFFD}');
                    return Err(CompileError::lexer(
                        format!("Unexpected character '{bad}'"),
                        Span::new(start, start + bad.len_utf8()),
                    ));
                }
            }
        }

        let end = self.bytes.len();
        self.tokens.push(Token {
            kind: TokenKind::Eof,
            text: String::new(),
            span: Span::new(end, end),
        });
        Ok(self.tokens)
    }

    fn emit(&mut self, kind: TokenKind, start: usize, end: usize) {
        self.tokens.push(Token {
            kind,
            text: self.source[start..end].to_string(),
            span: Span::new(start, end),
        });
        self.pos = end;
    }

    fn single(&mut self, kind: TokenKind) {
        self.emit(kind, self.pos, self.pos + 1);
    }

    /// `op` or `op=`
    fn with_eq(&mut self, plain: TokenKind, compound: TokenKind) {
        let start = self.pos;
        if self.bytes.get(start + 1) == Some(&b'=') {
            self.emit(compound, start, start + 2);
        } else {
            self.emit(plain, start, start + 1);
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        while self.pos < self.bytes.len() {
            match self.bytes[self.pos] {
                b' ' | b'\t' | b'\n' | b'\r' => self.pos += 1,
                b'/' if self.bytes.get(self.pos + 1) == Some(&b'/') => {
                    while self.pos < self.bytes.len() && self.bytes[self.pos] != b'\n' {
                        self.pos += 1;
                    }
                }
                b'/' if self.bytes.get(self.pos + 1) == Some(&b'*') => {
                    // An unterminated block comment swallows the rest of the file.
                    self.pos += 2;
                    while self.pos < self.bytes.len()
                        && !(self.bytes[self.pos] == b'*'
                            && self.bytes.get(self.pos + 1) == Some(&b'/'))
                    {
                        self.pos += 1;
                    }
                    self.pos = (self.pos + 2).min(self.bytes.len());
                }
                _ => break,
            }
        }
    }

    fn lex_string(&mut self, start: usize, quote: u8) -> Result<(), CompileError> {
        let mut pos = start + 1;
        loop {
            match self.bytes.get(pos) {
                None => {
                    return Err(CompileError::lexer(
                        "Unterminated string literal",
                        Span::new(start, self.bytes.len()),
                    ));
                }
                Some(b'\\') => pos = (pos + 2).min(self.bytes.len()),
                Some(&b) if b == quote => {
                    self.emit(TokenKind::String, start, pos + 1);
                    return Ok(());
                }
                Some(_) => pos += 1,
            }
        }
    }

    fn lex_entity_ref(&mut self, start: usize) -> Result<(), CompileError> {
        let mut pos = start + 1;
        if !self.bytes.get(pos).is_some_and(|b| b.is_ascii_alphabetic() || *b == b'_') {
            return Err(CompileError::lexer(
                "Expected an identifier after '@'",
                Span::new(start, start + 1),
            ));
        }
        while self.bytes.get(pos).is_some_and(|b| is_ident_byte(*b)) {
            pos += 1;
        }
        self.emit(TokenKind::EntityRef, start, pos);
        Ok(())
    }

    fn lex_number(&mut self, start: usize) {
        let mut pos = start;
        while self.bytes.get(pos).is_some_and(u8::is_ascii_digit) {
            pos += 1;
        }
        let mut kind = TokenKind::Integer;
        if self.bytes.get(pos) == Some(&b'.')
            && self.bytes.get(pos + 1).is_some_and(u8::is_ascii_digit)
        {
            kind = TokenKind::Float;
            pos += 1;
            while self.bytes.get(pos).is_some_and(u8::is_ascii_digit) {
                pos += 1;
            }
            if self.bytes.get(pos) == Some(&b'd')
                && !self.bytes.get(pos + 1).is_some_and(|b| is_ident_byte(*b))
            {
                kind = TokenKind::Decimal;
                pos += 1;
            }
        }
        self.emit(kind, start, pos);
    }

    fn lex_ident(&mut self, start: usize) {
        let mut pos = start;
        while self.bytes.get(pos).is_some_and(|b| is_ident_byte(*b)) {
            pos += 1;
        }
        let kind = keyword(&self.source[start..pos]).unwrap_or(TokenKind::Identifier);
        self.emit(kind, start, pos);
    }
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}
