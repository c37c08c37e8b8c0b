//! Formula tokenizer and recursive-descent parser.
//!
//! Grammar:
//!
//! ```text
//! expression := term (('+' | '-') term)*
//! term       := unary (('*' | '/') unary)*
//! unary      := ('+' | '-') unary | primary
//! primary    := NUMBER | STRING | IDENTIFIER | '(' expression ')'
//! ```
//!
//! Runs of same-precedence operators are kept as one flat [`Expr::Chain`],
//! so tree depth only grows with parentheses and unary signs, and both are
//! bounded by [`MAX_NESTING`].

use crate::error::{FormulaError, FormulaResult};

/// Deepest parenthesis or unary-sign nesting a formula may use.
pub const MAX_NESTING: usize = 256;

/// Parsed formula.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Text(String),
    Identifier(String),
    Negate(Box<Expr>),
    /// Left-associative run: `first op1 e1 op2 e2 ...`.
    Chain {
        first: Box<Expr>,
        rest: Vec<(BinaryOp, Expr)>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
}

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Number(f64),
    Text(String),
    Identifier(String),
    LParen,
    RParen,
    Plus,
    Minus,
    Star,
    Slash,
    Eof,
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    pos: usize,
}

/// Whether `ch` may appear inside an identifier.
pub fn is_identifier_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
}

impl Lexer {
    fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
        }
    }

    fn next_token(&mut self) -> FormulaResult<Token> {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
        let start = self.pos;
        let Some(ch) = self.peek() else {
            return Ok(Token {
                kind: TokenKind::Eof,
                pos: start,
            });
        };

        let kind = match ch {
            '(' => self.simple(TokenKind::LParen),
            ')' => self.simple(TokenKind::RParen),
            '+' => self.simple(TokenKind::Plus),
            '-' => self.simple(TokenKind::Minus),
            '*' => self.simple(TokenKind::Star),
            '/' => self.simple(TokenKind::Slash),
            '"' | '\'' => self.text_token(ch)?,
            '.' | '0'..='9' => self.number_token()?,
            c if is_identifier_char(c) => self.identifier_token(),
            _ => {
                return Err(FormulaError::ParseError(format!(
                    "Unexpected character '{}' at {}",
                    ch, start
                )))
            }
        };

        Ok(Token { kind, pos: start })
    }

    fn simple(&mut self, kind: TokenKind) -> TokenKind {
        self.pos += 1;
        kind
    }

    fn text_token(&mut self, quote: char) -> FormulaResult<TokenKind> {
        let start = self.pos;
        self.pos += 1;
        let mut text = String::new();
        while let Some(ch) = self.peek() {
            self.pos += 1;
            if ch == quote {
                return Ok(TokenKind::Text(text));
            }
            text.push(ch);
        }
        Err(FormulaError::ParseError(format!(
            "Unterminated string starting at {}",
            start
        )))
    }

    fn number_token(&mut self) -> FormulaResult<TokenKind> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit() || c == '.') {
            self.pos += 1;
        }
        if self.peek().is_some_and(|c| c == 'e' || c == 'E') {
            let mark = self.pos;
            self.pos += 1;
            if self.peek().is_some_and(|c| c == '+' || c == '-') {
                self.pos += 1;
            }
            if !self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.pos = mark;
            }
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        let literal: String = self.chars[start..self.pos].iter().collect();
        literal
            .parse::<f64>()
            .map(TokenKind::Number)
            .map_err(|_| FormulaError::ParseError(format!("Invalid number '{}' at {}", literal, start)))
    }

    fn identifier_token(&mut self) -> TokenKind {
        let start = self.pos;
        while self.peek().is_some_and(is_identifier_char) {
            self.pos += 1;
        }
        TokenKind::Identifier(self.chars[start..self.pos].iter().collect())
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }
}

struct Parser {
    tokens: Vec<Token>,
    idx: usize,
    depth: usize,
}

fn chain(first: Expr, rest: Vec<(BinaryOp, Expr)>) -> Expr {
    if rest.is_empty() {
        first
    } else {
        Expr::Chain {
            first: Box::new(first),
            rest,
        }
    }
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            idx: 0,
            depth: 0,
        }
    }

    fn descend(&mut self) -> FormulaResult<()> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(FormulaError::ParseError(
                "Formula nested too deeply".to_string(),
            ));
        }
        Ok(())
    }

    fn ascend(&mut self) {
        self.depth -= 1;
    }

    fn parse_expression(&mut self) -> FormulaResult<Expr> {
        let first = self.parse_term()?;
        let mut rest = Vec::new();
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Subtract,
                _ => break,
            };
            self.advance();
            rest.push((op, self.parse_term()?));
        }
        Ok(chain(first, rest))
    }

    fn parse_term(&mut self) -> FormulaResult<Expr> {
        let first = self.parse_unary()?;
        let mut rest = Vec::new();
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => BinaryOp::Multiply,
                TokenKind::Slash => BinaryOp::Divide,
                _ => break,
            };
            self.advance();
            rest.push((op, self.parse_unary()?));
        }
        Ok(chain(first, rest))
    }

    fn parse_unary(&mut self) -> FormulaResult<Expr> {
        let negate = match self.peek_kind() {
            TokenKind::Plus => false,
            TokenKind::Minus => true,
            _ => return self.parse_primary(),
        };
        self.advance();
        self.descend()?;
        let inner = self.parse_unary()?;
        self.ascend();
        Ok(if negate {
            Expr::Negate(Box::new(inner))
        } else {
            inner
        })
    }

    fn parse_primary(&mut self) -> FormulaResult<Expr> {
        let token = self.advance().clone();
        match token.kind {
            TokenKind::Number(n) => Ok(Expr::Number(n)),
            TokenKind::Text(s) => Ok(Expr::Text(s)),
            TokenKind::Identifier(name) => Ok(Expr::Identifier(name)),
            TokenKind::LParen => {
                self.descend()?;
                let expr = self.parse_expression()?;
                self.ascend();
                match self.advance().kind {
                    TokenKind::RParen => Ok(expr),
                    _ => Err(FormulaError::ParseError(format!(
                        "Expected ')' to close '(' at {}",
                        token.pos
                    ))),
                }
            }
            TokenKind::Eof => Err(FormulaError::ParseError("Unexpected end of input".to_string())),
            _ => Err(FormulaError::ParseError(format!(
                "Unexpected token at {}",
                token.pos
            ))),
        }
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.tokens[self.idx].kind
    }

    fn advance(&mut self) -> &Token {
        let token = &self.tokens[self.idx];
        if !matches!(token.kind, TokenKind::Eof) {
            self.idx += 1;
        }
        token
    }
}

/// Parse a formula string into an expression tree.
///
/// A leading `=` is accepted and ignored.
pub fn parse_formula(formula: &str) -> FormulaResult<Expr> {
    let formula = formula.trim_start();
    let formula = formula.strip_prefix('=').unwrap_or(formula);
    if formula.trim().is_empty() {
        return Err(FormulaError::ParseError("Empty formula".to_string()));
    }

    let mut lexer = Lexer::new(formula);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let is_eof = matches!(token.kind, TokenKind::Eof);
        tokens.push(token);
        if is_eof {
            break;
        }
    }

    let mut parser = Parser::new(tokens);
    let expr = parser.parse_expression()?;
    if !matches!(parser.peek_kind(), TokenKind::Eof) {
        return Err(FormulaError::ParseError(
            "Unexpected trailing input".to_string(),
        ));
    }
    Ok(expr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty() {
        assert!(parse_formula("").is_err());
        assert!(parse_formula("=").is_err());
    }

    #[test]
    fn test_precedence() {
        let expr = parse_formula("1 + 2 * 3").unwrap();
        match expr {
            Expr::Chain { first, rest } => {
                assert_eq!(*first, Expr::Number(1.0));
                assert_eq!(rest.len(), 1);
                assert_eq!(rest[0].0, BinaryOp::Add);
                assert!(matches!(&rest[0].1, Expr::Chain { rest, .. } if rest[0].0 == BinaryOp::Multiply));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_left_associative_subtraction() {
        let expr = parse_formula("a - b - c").unwrap();
        assert_eq!(
            expr,
            Expr::Chain {
                first: Box::new(Expr::Identifier("a".into())),
                rest: vec![
                    (BinaryOp::Subtract, Expr::Identifier("b".into())),
                    (BinaryOp::Subtract, Expr::Identifier("c".into())),
                ],
            }
        );
    }

    #[test]
    fn test_parentheses_and_unary() {
        let expr = parse_formula("-(Price + 1)").unwrap();
        assert!(matches!(expr, Expr::Negate(_)));
        assert!(parse_formula("(Price + 1").is_err());
    }

    #[test]
    fn test_numbers_and_strings() {
        assert_eq!(parse_formula("=2.5e2").unwrap(), Expr::Number(250.0));
        assert_eq!(parse_formula("'ab'").unwrap(), Expr::Text("ab".into()));
        assert!(parse_formula("\"open").is_err());
    }

    #[test]
    fn test_rejects_unknown_syntax() {
        assert!(parse_formula("Price ; drop").is_err());
        assert!(parse_formula("Price Quantity").is_err());
        assert!(parse_formula("f(x)").is_err());
    }

    #[test]
    fn test_nesting_limit() {
        let ok = format!("{}a{}", "(".repeat(MAX_NESTING), ")".repeat(MAX_NESTING));
        assert!(parse_formula(&ok).is_ok());

        let deep = format!("{}a{}", "(".repeat(5_000), ")".repeat(5_000));
        assert_eq!(
            parse_formula(&deep),
            Err(FormulaError::ParseError("Formula nested too deeply".into()))
        );
        assert!(parse_formula(&format!("{}a", "-".repeat(5_000))).is_err());
    }

    #[test]
    fn test_long_sum_stays_flat() {
        let sum = vec!["a"; 100_000].join(" + ");
        match parse_formula(&sum).unwrap() {
            Expr::Chain { rest, .. } => assert_eq!(rest.len(), 99_999),
            other => panic!("unexpected {:?}", other),
        }
    }
}
