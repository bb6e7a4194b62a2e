use muncher::Muncher;
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexerErrorKind {
    #[error("unterminated string literal")]
    UnterminatedString,

    #[error("unexpected character {0:?}")]
    UnexpectedChar(char),
}

/// A character cursor over [`Muncher`] that keeps track of 1-based line and column numbers.
pub struct Scanner<'input> {
    muncher: Muncher<'input>,
    line: usize,
    column: usize,
}

impl<'input> Scanner<'input> {
    pub fn new(input: &'input str) -> Self {
        Self {
            muncher: Muncher::new(input),
            line: 1,
            column: 1,
        }
    }

    pub fn peek(&mut self) -> Option<char> {
        let c = self.muncher.peek().copied();
        self.muncher.reset_peek();
        c
    }

    pub fn eat(&mut self) -> Option<char> {
        let c = self.muncher.eat()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    /// Eat the next character if it is `expected`.
    pub fn eat_if(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.eat();
            true
        } else {
            false
        }
    }

    pub fn eat_while(&mut self, mut pred: impl FnMut(char) -> bool) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if !pred(c) {
                break;
            }
            out.push(c);
            self.eat();
        }
        out
    }

    pub fn location(&self) -> (usize, usize) {
        (self.line, self.column)
    }

    /// Skip whitespace and `#` comments running to the end of the line.
    pub fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.eat();
                }
                Some('#') => {
                    self.eat_while(|c| c != '\n');
                }
                _ => break,
            }
        }
    }

    /// Scan the body of a quoted string whose opening `quote` has already been eaten.
    pub fn scan_quoted(&mut self, quote: char) -> Result<String, LexerErrorKind> {
        let mut out = String::new();
        loop {
            match self.eat() {
                None | Some('\n') => return Err(LexerErrorKind::UnterminatedString),
                Some(c) if c == quote => return Ok(out),
                Some('\\') => match self.eat() {
                    None => return Err(LexerErrorKind::UnterminatedString),
                    Some('\n') => {}
                    Some('n') => out.push('\n'),
                    Some('r') => out.push('\r'),
                    Some('t') => out.push('\t'),
                    Some('b') => out.push('\x08'),
                    Some('f') => out.push('\x0c'),
                    Some('v') => out.push('\x0b'),
                    Some(c @ ('\\' | '\'' | '"')) => out.push(c),
                    Some(other) => {
                        out.push('\\');
                        out.push(other);
                    }
                },
                Some(c) => out.push(c),
            }
        }
    }
}
