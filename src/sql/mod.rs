//! SQL front end: tokens, lexer, AST and parser

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod token;

pub use ast::{ParameterSpec, ParsedStatement, Statement};
pub use parser::{parse_script, Parser};

/// Quote an identifier with double quotes, doubling embedded quotes
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("people"), "\"people\"");
        assert_eq!(quote_identifier("a\"b"), "\"a\"\"b\"");
    }
}
