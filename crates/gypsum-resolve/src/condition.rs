//! The expression language used by `conditions` and `target_conditions`.
//!
//! Expressions are small: literals, variable names, tuples and lists, `.split()`, `not`,
//! comparison chains (`== != < <= > >= in` and `not in`) and short-circuiting `and`/`or` that
//! yield the deciding operand.

use std::cmp::Ordering;
use std::fmt;

use gypsum_syntax::scanner::Scanner;
use gypsum_syntax::Value;

use crate::variables::Scope;

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Str(String),
    Int(i64),
    Ident(String),
    Cmp(CmpOp),
    Minus,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
    And,
    Or,
    Not,
    True,
    False,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
}

impl CmpOp {
    fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
            CmpOp::In => "in",
            CmpOp::NotIn => "not in",
        }
    }
}

/// A compiled condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Str(String),
    Int(i64),
    Bool(bool),
    Name(String),
    Tuple(Vec<Expr>),
    List(Vec<Expr>),
    Split(Box<Expr>, Option<Box<Expr>>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare(Box<Expr>, Vec<(CmpOp, Expr)>),
}

fn tokenize(text: &str) -> Result<Vec<Tok>, String> {
    let mut scanner = Scanner::new(text);
    let mut tokens = vec![];

    loop {
        scanner.eat_while(char::is_whitespace);
        let (_, column) = scanner.location();
        let Some(c) = scanner.eat() else {
            break;
        };

        let tok = match c {
            '\'' | '"' => Tok::Str(
                scanner
                    .scan_quoted(c)
                    .map_err(|e| format!("{e} at column {column}"))?,
            ),
            '(' => Tok::LParen,
            ')' => Tok::RParen,
            '[' => Tok::LBracket,
            ']' => Tok::RBracket,
            ',' => Tok::Comma,
            '.' => Tok::Dot,
            '-' => Tok::Minus,
            '=' if scanner.eat_if('=') => Tok::Cmp(CmpOp::Eq),
            '!' if scanner.eat_if('=') => Tok::Cmp(CmpOp::Ne),
            '<' if scanner.eat_if('=') => Tok::Cmp(CmpOp::Le),
            '>' if scanner.eat_if('=') => Tok::Cmp(CmpOp::Ge),
            '<' => Tok::Cmp(CmpOp::Lt),
            '>' => Tok::Cmp(CmpOp::Gt),
            c if c.is_ascii_digit() => {
                let mut digits = c.to_string();
                digits.push_str(&scanner.eat_while(|c| c.is_ascii_digit()));
                Tok::Int(
                    digits
                        .parse()
                        .map_err(|_| format!("integer literal {digits} out of range"))?,
                )
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut ident = c.to_string();
                ident.push_str(&scanner.eat_while(|c| c.is_alphanumeric() || c == '_'));
                match ident.as_str() {
                    "and" => Tok::And,
                    "or" => Tok::Or,
                    "not" => Tok::Not,
                    "in" => Tok::Cmp(CmpOp::In),
                    "True" => Tok::True,
                    "False" => Tok::False,
                    _ => Tok::Ident(ident),
                }
            }
            other => return Err(format!("invalid syntax: unexpected {other:?} at column {column}")),
        };
        tokens.push(tok);
    }

    Ok(tokens)
}

struct ExprParser {
    tokens: Vec<Tok>,
    pos: usize,
}

impl ExprParser {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos)
    }

    fn peek_second(&self) -> Option<&Tok> {
        self.tokens.get(self.pos + 1)
    }

    fn next(&mut self) -> Option<Tok> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn expect(&mut self, expected: Tok) -> Result<(), String> {
        match self.next() {
            Some(tok) if tok == expected => Ok(()),
            Some(tok) => Err(format!("invalid syntax: expected {expected:?}, found {tok:?}")),
            None => Err(format!("invalid syntax: expected {expected:?} at end of expression")),
        }
    }

    fn parse_or(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_and()?;
        while self.peek() == Some(&Tok::Or) {
            self.next();
            lhs = Expr::Or(Box::new(lhs), Box::new(self.parse_and()?));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_not()?;
        while self.peek() == Some(&Tok::And) {
            self.next();
            lhs = Expr::And(Box::new(lhs), Box::new(self.parse_not()?));
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Expr, String> {
        if self.peek() == Some(&Tok::Not) {
            self.next();
            return Ok(Expr::Not(Box::new(self.parse_not()?)));
        }
        self.parse_comparison()
    }

    fn comparison_op(&mut self) -> Option<CmpOp> {
        match (self.peek(), self.peek_second()) {
            (Some(Tok::Cmp(op)), _) => {
                let op = *op;
                self.next();
                Some(op)
            }
            (Some(Tok::Not), Some(Tok::Cmp(CmpOp::In))) => {
                self.next();
                self.next();
                Some(CmpOp::NotIn)
            }
            _ => None,
        }
    }

    fn parse_comparison(&mut self) -> Result<Expr, String> {
        let lhs = self.parse_postfix()?;
        let mut rest = vec![];
        while let Some(op) = self.comparison_op() {
            rest.push((op, self.parse_postfix()?));
        }

        if rest.is_empty() {
            Ok(lhs)
        } else {
            Ok(Expr::Compare(Box::new(lhs), rest))
        }
    }

    fn parse_postfix(&mut self) -> Result<Expr, String> {
        let mut expr = self.parse_atom()?;
        while self.peek() == Some(&Tok::Dot) {
            self.next();
            match self.next() {
                Some(Tok::Ident(method)) if method == "split" => {}
                Some(Tok::Ident(method)) => return Err(format!("unsupported method '{method}'")),
                other => return Err(format!("invalid syntax: expected method name, found {other:?}")),
            }
            self.expect(Tok::LParen)?;
            let separator = if self.peek() == Some(&Tok::RParen) {
                None
            } else {
                Some(Box::new(self.parse_or()?))
            };
            self.expect(Tok::RParen)?;
            expr = Expr::Split(Box::new(expr), separator);
        }
        Ok(expr)
    }

    /// Comma-separated expressions up to `close`. Returns the items and whether a comma was seen.
    fn parse_sequence(&mut self, close: Tok) -> Result<(Vec<Expr>, bool), String> {
        let mut items = vec![];
        let mut saw_comma = false;
        loop {
            if self.peek() == Some(&close) {
                self.next();
                return Ok((items, saw_comma));
            }
            items.push(self.parse_or()?);
            match self.next() {
                Some(Tok::Comma) => saw_comma = true,
                Some(tok) if tok == close => return Ok((items, saw_comma)),
                Some(tok) => return Err(format!("invalid syntax: unexpected {tok:?}")),
                None => return Err("invalid syntax: unexpected end of expression".into()),
            }
        }
    }

    fn parse_atom(&mut self) -> Result<Expr, String> {
        match self.next() {
            Some(Tok::Str(mut s)) => {
                while let Some(Tok::Str(next)) = self.peek() {
                    s.push_str(next);
                    self.next();
                }
                Ok(Expr::Str(s))
            }
            Some(Tok::Int(i)) => Ok(Expr::Int(i)),
            Some(Tok::Minus) => match self.next() {
                Some(Tok::Int(i)) => Ok(Expr::Int(-i)),
                other => Err(format!("invalid syntax: unexpected {other:?} after '-'")),
            },
            Some(Tok::True) => Ok(Expr::Bool(true)),
            Some(Tok::False) => Ok(Expr::Bool(false)),
            Some(Tok::Ident(name)) => Ok(Expr::Name(name)),
            Some(Tok::LParen) => {
                let (mut items, saw_comma) = self.parse_sequence(Tok::RParen)?;
                if items.len() == 1 && !saw_comma {
                    Ok(items.remove(0))
                } else {
                    Ok(Expr::Tuple(items))
                }
            }
            Some(Tok::LBracket) => Ok(Expr::List(self.parse_sequence(Tok::RBracket)?.0)),
            Some(tok) => Err(format!("invalid syntax: unexpected {tok:?}")),
            None => Err("invalid syntax: unexpected end of expression".into()),
        }
    }
}

/// Parse `text` into an expression tree.
pub fn compile(text: &str) -> Result<Expr, String> {
    let mut parser = ExprParser {
        tokens: tokenize(text)?,
        pos: 0,
    };

    let expr = parser.parse_or()?;
    match parser.next() {
        None => Ok(expr),
        Some(tok) => Err(format!("invalid syntax: unexpected {tok:?}")),
    }
}

/// The runtime value of an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Seq(Vec<Operand>),
}

impl Operand {
    fn type_name(&self) -> &'static str {
        match self {
            Operand::Str(_) => "str",
            Operand::Int(_) => "int",
            Operand::Float(_) => "float",
            Operand::Bool(_) => "bool",
            Operand::Seq(_) => "list",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Operand::Str(s) => !s.is_empty(),
            Operand::Int(i) => *i != 0,
            Operand::Float(f) => *f != 0.0,
            Operand::Bool(b) => *b,
            Operand::Seq(items) => !items.is_empty(),
        }
    }

    fn number(&self) -> Option<f64> {
        match self {
            Operand::Int(i) => Some(*i as f64),
            Operand::Float(f) => Some(*f),
            Operand::Bool(b) => Some(*b as i64 as f64),
            _ => None,
        }
    }

    fn from_value(name: &str, value: &Value) -> Result<Operand, String> {
        Ok(match value {
            Value::Str(s) => Operand::Str(s.clone()),
            Value::Int(i) => Operand::Int(*i),
            Value::Float(f) => Operand::Float(*f),
            Value::List(items) => Operand::Seq(
                items
                    .iter()
                    .map(|item| Operand::from_value(name, item))
                    .collect::<Result<_, _>>()?,
            ),
            Value::Map(_) => return Err(format!("variable '{name}' is a dict")),
        })
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Str(s) => write!(f, "{s:?}"),
            Operand::Int(i) => write!(f, "{i}"),
            Operand::Float(x) => write!(f, "{x}"),
            Operand::Bool(true) => f.write_str("True"),
            Operand::Bool(false) => f.write_str("False"),
            Operand::Seq(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

fn equals(a: &Operand, b: &Operand) -> bool {
    match (a, b) {
        (Operand::Str(x), Operand::Str(y)) => x == y,
        (Operand::Seq(x), Operand::Seq(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| equals(a, b))
        }
        _ => match (a.number(), b.number()) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
    }
}

fn order(a: &Operand, b: &Operand, op: CmpOp) -> Result<Ordering, String> {
    let unsupported = || {
        format!(
            "'{}' not supported between instances of '{}' and '{}'",
            op.symbol(),
            a.type_name(),
            b.type_name()
        )
    };

    match (a, b) {
        (Operand::Str(x), Operand::Str(y)) => Ok(x.cmp(y)),
        (Operand::Seq(x), Operand::Seq(y)) => {
            for (l, r) in x.iter().zip(y) {
                if !equals(l, r) {
                    return order(l, r, op);
                }
            }
            Ok(x.len().cmp(&y.len()))
        }
        _ => match (a.number(), b.number()) {
            (Some(x), Some(y)) => x.partial_cmp(&y).ok_or_else(unsupported),
            _ => Err(unsupported()),
        },
    }
}

fn compare(lhs: &Operand, op: CmpOp, rhs: &Operand) -> Result<bool, String> {
    Ok(match op {
        CmpOp::Eq => equals(lhs, rhs),
        CmpOp::Ne => !equals(lhs, rhs),
        CmpOp::Lt => order(lhs, rhs, op)? == Ordering::Less,
        CmpOp::Le => order(lhs, rhs, op)? != Ordering::Greater,
        CmpOp::Gt => order(lhs, rhs, op)? == Ordering::Greater,
        CmpOp::Ge => order(lhs, rhs, op)? != Ordering::Less,
        CmpOp::In | CmpOp::NotIn => {
            let found = match (lhs, rhs) {
                (Operand::Str(needle), Operand::Str(haystack)) => haystack.contains(needle.as_str()),
                (_, Operand::Seq(items)) => items.iter().any(|item| equals(lhs, item)),
                (_, Operand::Str(_)) => {
                    return Err(format!(
                        "'in <string>' requires string as left operand, not {}",
                        lhs.type_name()
                    ))
                }
                _ => {
                    return Err(format!(
                        "argument of type '{}' is not iterable",
                        rhs.type_name()
                    ))
                }
            };
            found == (op == CmpOp::In)
        }
    })
}

/// Evaluate `expr` against `scope`.
pub fn evaluate(expr: &Expr, scope: &Scope) -> Result<Operand, String> {
    Ok(match expr {
        Expr::Str(s) => Operand::Str(s.clone()),
        Expr::Int(i) => Operand::Int(*i),
        Expr::Bool(b) => Operand::Bool(*b),
        Expr::Name(name) => match scope.get(name) {
            Some(value) => Operand::from_value(name, value)?,
            None => return Err(format!("name '{name}' is not defined")),
        },
        Expr::Tuple(items) | Expr::List(items) => Operand::Seq(
            items
                .iter()
                .map(|item| evaluate(item, scope))
                .collect::<Result<_, _>>()?,
        ),
        Expr::Split(target, separator) => {
            let Operand::Str(s) = evaluate(target, scope)? else {
                return Err("split() is only supported on strings".into());
            };
            let parts: Vec<Operand> = match separator {
                None => s.split_whitespace().map(|p| Operand::Str(p.into())).collect(),
                Some(separator) => match evaluate(separator, scope)? {
                    Operand::Str(sep) if !sep.is_empty() => {
                        s.split(sep.as_str()).map(|p| Operand::Str(p.into())).collect()
                    }
                    Operand::Str(_) => return Err("empty separator".into()),
                    other => {
                        return Err(format!(
                            "must be str or None, not {}",
                            other.type_name()
                        ))
                    }
                },
            };
            Operand::Seq(parts)
        }
        Expr::Not(inner) => Operand::Bool(!evaluate(inner, scope)?.is_truthy()),
        Expr::And(lhs, rhs) => {
            let lhs = evaluate(lhs, scope)?;
            if lhs.is_truthy() {
                evaluate(rhs, scope)?
            } else {
                lhs
            }
        }
        Expr::Or(lhs, rhs) => {
            let lhs = evaluate(lhs, scope)?;
            if lhs.is_truthy() {
                lhs
            } else {
                evaluate(rhs, scope)?
            }
        }
        Expr::Compare(first, rest) => {
            let mut lhs = evaluate(first, scope)?;
            for (op, rhs) in rest {
                let rhs = evaluate(rhs, scope)?;
                if !compare(&lhs, *op, &rhs)? {
                    return Ok(Operand::Bool(false));
                }
                lhs = rhs;
            }
            Operand::Bool(true)
        }
    })
}
