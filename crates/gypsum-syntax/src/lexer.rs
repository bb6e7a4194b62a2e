use crate::scanner::{LexerErrorKind, Scanner};

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    Comma,
    Colon,
    String(String),
    /// Unvalidated numeric text; the parser decides whether it is a well-formed number.
    Number(String),
    Error(LexerErrorKind),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub column: usize,
}

fn is_number_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_')
}

pub struct LiteralLexer<'input> {
    scanner: Scanner<'input>,
    done: bool,
}

impl<'input> LiteralLexer<'input> {
    pub fn new(input: &'input str) -> Self {
        Self {
            scanner: Scanner::new(input),
            done: false,
        }
    }

    /// Position just past the last token, used to report end-of-input problems.
    pub fn location(&self) -> (usize, usize) {
        self.scanner.location()
    }
}

impl Iterator for LiteralLexer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        self.scanner.skip_trivia();
        let (line, column) = self.scanner.location();
        let c = self.scanner.peek()?;

        let kind = match c {
            '{' | '}' | '[' | ']' | ',' | ':' => {
                self.scanner.eat();
                match c {
                    '{' => TokenKind::LeftBrace,
                    '}' => TokenKind::RightBrace,
                    '[' => TokenKind::LeftBracket,
                    ']' => TokenKind::RightBracket,
                    ',' => TokenKind::Comma,
                    _ => TokenKind::Colon,
                }
            }
            '\'' | '"' => {
                self.scanner.eat();
                match self.scanner.scan_quoted(c) {
                    Ok(s) => TokenKind::String(s),
                    Err(e) => TokenKind::Error(e),
                }
            }
            c if c == '-' || c == '.' || c.is_ascii_digit() => {
                TokenKind::Number(self.scanner.eat_while(is_number_char))
            }
            other => TokenKind::Error(LexerErrorKind::UnexpectedChar(other)),
        };

        if matches!(kind, TokenKind::Error(_)) {
            self.done = true;
        }

        Some(Token { kind, line, column })
    }
}
