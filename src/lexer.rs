use super::token::{Token, TokenKind};

/// Anything that can hand out tokens one at a time.
///
/// Once the input is exhausted, implementations keep returning `Eof`.
pub trait TokenSource<'a> {
    fn next_token(&mut self) -> Token<'a>;
}

pub struct Lexer<'a> {
    program: &'a str,
    cursor: usize,
    line: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(program: &'a str) -> Self {
        Lexer {
            program,
            cursor: 0,
            line: 1,
        }
    }

    /// Get the next token. This consumes the tokens.
    pub fn next_token(&mut self) -> Token<'a> {
        self.trim();

        let start_pos = self.cursor;
        let ch = match self.next_char(false) {
            Some(ch) => ch,
            None => return Token::new(TokenKind::Eof, "", self.line),
        };

        let kind = match ch {
            b'"' => return self.read_str_literal(),
            b'(' => TokenKind::LParen,
            b')' => TokenKind::RParen,
            b'{' => TokenKind::LBrace,
            b'}' => TokenKind::RBrace,
            b',' => TokenKind::Comma,
            b';' => TokenKind::Semicolon,
            b'+' => TokenKind::Plus,
            b'-' => TokenKind::Minus,
            b'*' => TokenKind::Star,
            b'/' => TokenKind::Slash,
            b'=' => self.either(b'=', TokenKind::Equal, TokenKind::Assign),
            b'!' => self.either(b'=', TokenKind::NotEqual, TokenKind::Bang),
            b'>' => self.either(b'=', TokenKind::GreaterEqual, TokenKind::Greater),
            b'<' => self.either(b'=', TokenKind::LessEqual, TokenKind::Less),
            ch if ch.is_ascii_digit() => return self.read_number(start_pos),
            ch if ch.is_ascii_alphabetic() || ch == b'_' => return self.read_token(start_pos),
            _ => TokenKind::Error,
        };

        self.token(kind, start_pos)
    }

    /// Trim whitespaces, tabs, carriage returns, newlines and comments
    fn trim(&mut self) {
        while let Some(ch) = self.next_char(true) {
            match ch {
                b'\n' => self.line += 1,
                b'\t' | b'\r' | b'\x0C' | b' ' => {}
                b'/' if self.program.as_bytes().get(self.cursor + 1) == Some(&b'/') => {
                    while let Some(ch) = self.next_char(true) {
                        if ch == b'\n' {
                            break;
                        }
                        self.cursor += 1;
                    }
                    continue;
                }
                _ => break,
            }
            self.cursor += 1;
        }
    }

    /// Read a decimal number. A trailing '.' without digits is malformed.
    fn read_number(&mut self, start_pos: usize) -> Token<'a> {
        let mut is_float = false;
        while let Some(ch) = self.next_char(true) {
            if ch == b'.' && !is_float {
                is_float = true;
            } else if !ch.is_ascii_digit() {
                break;
            }
            self.cursor += 1;
        }

        if self.program.as_bytes()[self.cursor - 1] == b'.' {
            return self.token(TokenKind::Error, start_pos);
        }

        let kind = if is_float {
            TokenKind::Float
        } else {
            TokenKind::Integer
        };
        self.token(kind, start_pos)
    }

    /// Read a string literal that starts and ends with '"'
    fn read_str_literal(&mut self) -> Token<'a> {
        let start_pos = self.cursor;
        while let Some(ch) = self.next_char(true) {
            if ch == b'\n' {
                // Strings cannot continue from next line
                break;
            }
            self.cursor += 1;
            if ch == b'"' {
                let lexeme = &self.program[start_pos..self.cursor - 1];
                return Token::new(TokenKind::String, lexeme, self.line);
            }
        }

        self.token(TokenKind::Error, start_pos - 1)
    }

    /// Read an identifier or a keyword
    fn read_token(&mut self, start_pos: usize) -> Token<'a> {
        while let Some(ch) = self.next_char(true) {
            // Only alphanumberic characters and '_'
            if !ch.is_ascii_alphanumeric() && ch != b'_' {
                break;
            }
            self.cursor += 1;
        }

        Token::word(&self.program[start_pos..self.cursor], self.line)
    }

    /// Consume `expected` if it is the next char and pick the matching kind
    fn either(&mut self, expected: u8, matched: TokenKind, otherwise: TokenKind) -> TokenKind {
        if self.next_char(true) == Some(expected) {
            self.cursor += 1;
            matched
        } else {
            otherwise
        }
    }

    fn token(&self, kind: TokenKind, start_pos: usize) -> Token<'a> {
        // Error tokens may start in the middle of a multi-byte char.
        let lexeme = self
            .program
            .get(start_pos..self.cursor)
            .unwrap_or_default();
        Token::new(kind, lexeme, self.line)
    }

    /// Get the next char and increase the cursor if `peek` is false
    fn next_char(&mut self, peek: bool) -> Option<u8> {
        let ch = *self.program.as_bytes().get(self.cursor)?;
        if !peek {
            self.cursor += 1;
        }
        Some(ch)
    }
}

impl<'a> TokenSource<'a> for Lexer<'a> {
    fn next_token(&mut self) -> Token<'a> {
        Lexer::next_token(self)
    }
}

#[cfg(test)]
mod tests {
    use super::super::token::Keyword;
    use super::*;

    fn kinds(program: &str) -> Vec<TokenKind> {
        let mut lexer = Lexer::new(program);
        let mut kinds = Vec::new();
        loop {
            let token = lexer.next_token();
            kinds.push(token.kind);
            if token.kind == TokenKind::Eof {
                return kinds;
            }
        }
    }

    #[test]
    fn trim() {
        let program = "\t\r\x0C // comment\n  let";
        let mut lexer = Lexer::new(program);
        lexer.trim();
        assert_eq!(&lexer.program[lexer.cursor..], "let");
        assert_eq!(lexer.line, 2);
    }

    #[test]
    fn read_str_literal() {
        let mut lexer = Lexer::new("\"test_00_me\" \"open\nx");
        assert_eq!(
            Token::new(TokenKind::String, "test_00_me", 1),
            lexer.next_token()
        );
        assert_eq!(lexer.next_token().kind, TokenKind::Error);
    }

    #[test]
    fn read_number() {
        let mut lexer = Lexer::new("123 4.5 6.");
        assert_eq!(Token::new(TokenKind::Integer, "123", 1), lexer.next_token());
        assert_eq!(Token::new(TokenKind::Float, "4.5", 1), lexer.next_token());
        assert_eq!(Token::new(TokenKind::Error, "6.", 1), lexer.next_token());
    }

    #[test]
    fn operators() {
        assert_eq!(
            kinds("= == ! != > >= < <= + - * /"),
            vec![
                TokenKind::Assign,
                TokenKind::Equal,
                TokenKind::Bang,
                TokenKind::NotEqual,
                TokenKind::Greater,
                TokenKind::GreaterEqual,
                TokenKind::Less,
                TokenKind::LessEqual,
                TokenKind::Plus,
                TokenKind::Minus,
                TokenKind::Star,
                TokenKind::Slash,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn read_program() {
        let program = r"
            fun add(a, b) {
                return a + b;
            }
            let mut x = add(1, 2);
        ";

        let tokens = vec![
            Token::new(TokenKind::Keyword(Keyword::Fun), "fun", 2),
            Token::new(TokenKind::Identifier, "add", 2),
            Token::new(TokenKind::LParen, "(", 2),
            Token::new(TokenKind::Identifier, "a", 2),
            Token::new(TokenKind::Comma, ",", 2),
            Token::new(TokenKind::Identifier, "b", 2),
            Token::new(TokenKind::RParen, ")", 2),
            Token::new(TokenKind::LBrace, "{", 2),
            Token::new(TokenKind::Keyword(Keyword::Return), "return", 3),
            Token::new(TokenKind::Identifier, "a", 3),
            Token::new(TokenKind::Plus, "+", 3),
            Token::new(TokenKind::Identifier, "b", 3),
            Token::new(TokenKind::Semicolon, ";", 3),
            Token::new(TokenKind::RBrace, "}", 4),
            Token::new(TokenKind::Keyword(Keyword::Let), "let", 5),
            Token::new(TokenKind::Keyword(Keyword::Mut), "mut", 5),
            Token::new(TokenKind::Identifier, "x", 5),
            Token::new(TokenKind::Assign, "=", 5),
            Token::new(TokenKind::Identifier, "add", 5),
            Token::new(TokenKind::LParen, "(", 5),
            Token::new(TokenKind::Integer, "1", 5),
            Token::new(TokenKind::Comma, ",", 5),
            Token::new(TokenKind::Integer, "2", 5),
            Token::new(TokenKind::RParen, ")", 5),
            Token::new(TokenKind::Semicolon, ";", 5),
        ];

        let mut lexer = Lexer::new(program);
        for token in tokens {
            assert_eq!(token, lexer.next_token());
        }

        // No tokens left
        assert_eq!(lexer.next_token().kind, TokenKind::Eof);
        assert_eq!(lexer.next_token().kind, TokenKind::Eof);
    }
}
