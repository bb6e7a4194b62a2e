use std::sync::LazyLock;

use regex::Regex;

use crate::errors::SyntaxError;
use crate::lexer::{LiteralLexer, Token, TokenKind};
use crate::value::{Map, Value};

static NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^-?\d+(\.\d+)?$").unwrap());

/// Deepest `{}`/`[]` nesting accepted before the document is rejected.
pub const MAX_NESTING: usize = 256;

/// Parse a complete literal document.
///
/// ```
/// use gypsum_syntax::{parse, Value};
/// let v = parse("{'a': [1, 2,], 'b': 'x'}").unwrap();
/// assert_eq!(v.as_map().unwrap()["b"], Value::from("x"));
/// ```
pub fn parse(text: &str) -> Result<Value, SyntaxError> {
    let mut parser = Parser {
        lexer: LiteralLexer::new(text),
        peeked: None,
    };

    let value = parser.parse_value(1)?;
    match parser.next() {
        Some(token) => Err(unexpected(token, "after the top-level value")),
        None => Ok(value),
    }
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::LeftBrace => "'{'".into(),
        TokenKind::RightBrace => "'}'".into(),
        TokenKind::LeftBracket => "'['".into(),
        TokenKind::RightBracket => "']'".into(),
        TokenKind::Comma => "','".into(),
        TokenKind::Colon => "':'".into(),
        TokenKind::String(s) => format!("string {s:?}"),
        TokenKind::Number(n) => format!("number {n}"),
        TokenKind::Error(e) => e.to_string(),
    }
}

fn unexpected(token: Token, context: &str) -> SyntaxError {
    let message = match token.kind {
        TokenKind::Error(e) => e.to_string(),
        other => format!("unexpected {} {context}", describe(&other)),
    };
    SyntaxError::new(token.line, token.column, message)
}

struct Parser<'input> {
    lexer: LiteralLexer<'input>,
    peeked: Option<Token>,
}

impl Parser<'_> {
    fn next(&mut self) -> Option<Token> {
        self.peeked.take().or_else(|| self.lexer.next())
    }

    fn peek_kind(&mut self) -> Option<&TokenKind> {
        if self.peeked.is_none() {
            self.peeked = self.lexer.next();
        }
        self.peeked.as_ref().map(|t| &t.kind)
    }

    fn expect_next(&mut self) -> Result<Token, SyntaxError> {
        self.next().ok_or_else(|| {
            let (line, column) = self.lexer.location();
            SyntaxError::new(line, column, "unexpected end of input")
        })
    }

    fn parse_value(&mut self, level: usize) -> Result<Value, SyntaxError> {
        let token = self.expect_next()?;
        if level > MAX_NESTING
            && matches!(token.kind, TokenKind::LeftBrace | TokenKind::LeftBracket)
        {
            return Err(SyntaxError::new(
                token.line,
                token.column,
                format!("nesting deeper than {MAX_NESTING} levels"),
            ));
        }
        match token.kind {
            TokenKind::LeftBrace => self.parse_map(level).map(Value::Map),
            TokenKind::LeftBracket => self.parse_list(level).map(Value::List),
            TokenKind::String(s) => Ok(Value::Str(self.concatenate(s))),
            TokenKind::Number(ref text) => parse_number(text, &token),
            _ => Err(unexpected(token, "where a value was expected")),
        }
    }

    /// Adjacent string literals form one string.
    fn concatenate(&mut self, mut s: String) -> String {
        while let Some(TokenKind::String(_)) = self.peek_kind() {
            if let Some(Token {
                kind: TokenKind::String(next),
                ..
            }) = self.next()
            {
                s.push_str(&next);
            }
        }
        s
    }

    fn parse_list(&mut self, level: usize) -> Result<Vec<Value>, SyntaxError> {
        let mut items = vec![];
        loop {
            if let Some(TokenKind::RightBracket) = self.peek_kind() {
                self.next();
                return Ok(items);
            }

            items.push(self.parse_value(level + 1)?);

            let token = self.expect_next()?;
            match token.kind {
                TokenKind::Comma => {}
                TokenKind::RightBracket => return Ok(items),
                _ => return Err(unexpected(token, "in list; expected ',' or ']'")),
            }
        }
    }

    fn parse_map(&mut self, level: usize) -> Result<Map, SyntaxError> {
        let mut map = Map::new();
        loop {
            let token = self.expect_next()?;
            let (line, column) = (token.line, token.column);
            let key = match token.kind {
                TokenKind::RightBrace => return Ok(map),
                TokenKind::String(s) => self.concatenate(s),
                _ => return Err(unexpected(token, "where a dictionary key was expected")),
            };

            let token = self.expect_next()?;
            if token.kind != TokenKind::Colon {
                return Err(unexpected(token, "after dictionary key; expected ':'"));
            }

            let value = self.parse_value(level + 1)?;
            if map.contains_key(&key) {
                return Err(SyntaxError::new(
                    line,
                    column,
                    format!("Key '{key}' repeated at level {level}"),
                ));
            }
            map.insert(key, value);

            let token = self.expect_next()?;
            match token.kind {
                TokenKind::Comma => {}
                TokenKind::RightBrace => return Ok(map),
                _ => return Err(unexpected(token, "in dictionary; expected ',' or '}'")),
            }
        }
    }
}

fn parse_number(text: &str, token: &Token) -> Result<Value, SyntaxError> {
    let invalid = || {
        SyntaxError::new(
            token.line,
            token.column,
            format!("invalid number literal {text:?}"),
        )
    };

    if !NUMBER.is_match(text) {
        return Err(invalid());
    }

    if text.contains('.') {
        text.parse::<f64>().map(Value::Float).map_err(|_| invalid())
    } else {
        text.parse::<i64>().map(Value::Int).map_err(|_| invalid())
    }
}
