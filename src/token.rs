/// Reserved keywords of the language
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum Keyword {
    Let,
    Mut,
    If,
    Else,
    Loop,
    Fun,
    Return,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TokenKind {
    Integer,
    Float,
    String,
    Identifier,
    Keyword(Keyword),

    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Semicolon,

    Plus,
    Minus,
    Star,
    Slash,
    Bang,
    Assign,
    Equal,
    NotEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,

    Eof,
    Error,
}

/// A token borrowed from the source text.
///
/// For string literals `lexeme` excludes the surrounding quotes. For `Error`
/// tokens it holds the offending text.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub lexeme: &'a str,
    pub line: u32,
}

impl<'a> Token<'a> {
    pub fn new(kind: TokenKind, lexeme: &'a str, line: u32) -> Self {
        Token { kind, lexeme, line }
    }

    /// Classify a word as a keyword or an identifier
    pub fn word(lexeme: &'a str, line: u32) -> Self {
        let kind = match lexeme {
            "let" => TokenKind::Keyword(Keyword::Let),
            "mut" => TokenKind::Keyword(Keyword::Mut),
            "if" => TokenKind::Keyword(Keyword::If),
            "else" => TokenKind::Keyword(Keyword::Else),
            "loop" => TokenKind::Keyword(Keyword::Loop),
            "fun" => TokenKind::Keyword(Keyword::Fun),
            "return" => TokenKind::Keyword(Keyword::Return),
            _ => TokenKind::Identifier,
        };
        Token { kind, lexeme, line }
    }

    pub fn len(&self) -> usize {
        self.lexeme.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lexeme.is_empty()
    }

    pub fn is_keyword(&self, keyword: Keyword) -> bool {
        self.kind == TokenKind::Keyword(keyword)
    }
}
