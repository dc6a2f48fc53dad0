//! Token reader with a single slot of pushback

use crate::lexer::TokenSource;
use crate::token::Token;

pub struct TokenCursor<'a, S> {
    source: S,
    current: Token<'a>,
    stepped_back: bool,
}

impl<'a, S: TokenSource<'a>> TokenCursor<'a, S> {
    /// Wrap `source`. Nothing is consumed until the first `advance`.
    pub fn new(source: S) -> Self {
        TokenCursor {
            source,
            current: Token::new(crate::token::TokenKind::Eof, "", 1),
            stepped_back: false,
        }
    }

    /// Return the next token, or the pushed back one again if any.
    pub fn advance(&mut self) -> Token<'a> {
        if self.stepped_back {
            self.stepped_back = false;
        } else {
            self.current = self.source.next_token();
        }
        self.current
    }

    /// Mark the last token as unconsumed. Only one level is kept, calling
    /// this twice in a row still replays a single token.
    pub fn pushback(&mut self) {
        self.stepped_back = true;
    }

    /// The most recently returned token
    pub fn current(&self) -> Token<'a> {
        self.current
    }

    /// Look at the next token without consuming it
    pub fn peek(&mut self) -> Token<'a> {
        let token = self.advance();
        self.pushback();
        token
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::token::TokenKind;

    #[test]
    fn pushback_replays_once() {
        let mut cursor = TokenCursor::new(Lexer::new("a b"));
        assert_eq!(cursor.advance().lexeme, "a");
        cursor.pushback();
        cursor.pushback();
        assert_eq!(cursor.advance().lexeme, "a");
        assert_eq!(cursor.advance().lexeme, "b");
        assert_eq!(cursor.advance().kind, TokenKind::Eof);
    }

    #[test]
    fn peek_does_not_consume() {
        let mut cursor = TokenCursor::new(Lexer::new("x = 1"));
        assert_eq!(cursor.peek().lexeme, "x");
        assert_eq!(cursor.advance().lexeme, "x");
        assert_eq!(cursor.peek().kind, TokenKind::Assign);
        assert_eq!(cursor.current().kind, TokenKind::Assign);
    }
}
