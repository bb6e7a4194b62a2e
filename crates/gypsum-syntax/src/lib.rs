//! The literal document format: nested `{}` dictionaries with string keys, `[]` lists, quoted
//! strings, integers, decimals and `#` comments.
//!
//! [`parse`] turns text into a [`Value`] tree and [`to_literal`]/[`to_literal_pretty`] turn a
//! tree back into text that parses to the same value.

pub mod errors;
pub mod lexer;
pub mod parser;
pub mod scanner;
pub mod value;
pub mod writer;

#[cfg(test)]
mod tests;

pub use errors::SyntaxError;
pub use parser::parse;
pub use value::{Map, Value};
pub use writer::{to_literal, to_literal_pretty};
