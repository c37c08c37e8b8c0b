//! Custom formula evaluation against one row.
//!
//! Field names may contain spaces or punctuation, so before parsing, every
//! whole-word occurrence of a field name in the expression is rewritten to a
//! generated identifier (`__f0`, `__f1`, ...) and the scope is built under
//! the same names. Longer names are rewritten first so that one field name
//! never partially matches inside another. A word left in the formula that
//! starts with the generated prefix is an undefined reference.
//!
//! The evaluator only sees that scope: there is no ambient state, no function
//! calls and no I/O.

pub mod parser;

use std::collections::HashMap;

use crate::error::{FormulaError, FormulaResult};
use crate::models::{parse_number, Cell, Row};

pub use parser::{parse_formula, BinaryOp, Expr};
use parser::is_identifier_char;

const BOUND_PREFIX: &str = "__f";

/// Variables visible to a formula, keyed by generated identifier.
#[derive(Debug, Default)]
pub struct Scope {
    bindings: HashMap<String, Cell>,
}

impl Scope {
    pub fn get(&self, name: &str) -> Option<&Cell> {
        self.bindings.get(name)
    }
}

/// A formula rewritten against one row's field names.
#[derive(Debug)]
pub struct BoundFormula {
    pub expression: String,
    pub scope: Scope,
}

/// Bind every field of `row` and rewrite `formula` to match.
///
/// Fields read as numbers when they look like one, otherwise keep their raw
/// value.
pub fn bind(formula: &str, row: &Row) -> FormulaResult<BoundFormula> {
    let mut names: Vec<(Vec<char>, String)> = Vec::with_capacity(row.len());
    let mut bindings = HashMap::with_capacity(row.len());

    for (idx, (field, value)) in row.iter().enumerate() {
        let safe = format!("{}{}", BOUND_PREFIX, idx);
        let bound = match value {
            Cell::Text(s) => parse_number(s).map(Cell::Number).unwrap_or_else(|| value.clone()),
            other => other.clone(),
        };
        bindings.insert(safe.clone(), bound);
        if !field.trim().is_empty() && parse_number(field).is_none() {
            names.push((field.chars().collect(), safe));
        }
    }

    names.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

    Ok(BoundFormula {
        expression: rewrite_identifiers(formula, &names)?,
        scope: Scope { bindings },
    })
}

/// Replace whole-word occurrences of each name, outside quoted text.
fn rewrite_identifiers(formula: &str, names: &[(Vec<char>, String)]) -> FormulaResult<String> {
    let chars: Vec<char> = formula.chars().collect();
    let mut out = String::with_capacity(formula.len());
    let mut quote: Option<char> = None;
    let mut i = 0;

    'scan: while i < chars.len() {
        let ch = chars[i];
        if let Some(q) = quote {
            out.push(ch);
            if ch == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        if ch == '"' || ch == '\'' {
            quote = Some(ch);
            out.push(ch);
            i += 1;
            continue;
        }

        let at_boundary = i == 0 || !is_identifier_char(chars[i - 1]);
        if at_boundary {
            for (name, safe) in names {
                let end = i + name.len();
                if end <= chars.len()
                    && chars[i..end] == name[..]
                    && (end == chars.len() || !is_identifier_char(chars[end]))
                {
                    out.push_str(safe);
                    i = end;
                    continue 'scan;
                }
            }

            if is_identifier_char(ch) {
                let end = chars[i..]
                    .iter()
                    .position(|c| !is_identifier_char(*c))
                    .map_or(chars.len(), |len| i + len);
                let word: String = chars[i..end].iter().collect();
                if word.starts_with(BOUND_PREFIX) {
                    return Err(FormulaError::UndefinedReference(word));
                }
                out.push_str(&word);
                i = end;
                continue;
            }
        }

        out.push(ch);
        i += 1;
    }

    Ok(out)
}

/// Evaluate a parsed expression in `scope`.
pub fn eval(expr: &Expr, scope: &Scope) -> FormulaResult<Cell> {
    match expr {
        Expr::Number(n) => Ok(Cell::Number(*n)),
        Expr::Text(s) => Ok(Cell::Text(s.clone())),
        Expr::Identifier(name) => scope
            .get(name)
            .cloned()
            .ok_or_else(|| FormulaError::UndefinedReference(name.clone())),
        Expr::Negate(inner) => Ok(Cell::Number(-operand(&eval(inner, scope)?))),
        Expr::Chain { first, rest } => {
            let mut acc = eval(first, scope)?;
            for (op, right) in rest {
                acc = apply_binary(*op, &acc, &eval(right, scope)?);
            }
            Ok(acc)
        }
    }
}

/// Arithmetic reading of a value; null counts as zero.
fn operand(cell: &Cell) -> f64 {
    match cell {
        Cell::Null => 0.0,
        other => other.as_number(),
    }
}

fn apply_binary(op: BinaryOp, left: &Cell, right: &Cell) -> Cell {
    match op {
        BinaryOp::Add if matches!(left, Cell::Text(_)) || matches!(right, Cell::Text(_)) => {
            Cell::Text(format!("{}{}", left, right))
        }
        BinaryOp::Add => Cell::Number(operand(left) + operand(right)),
        BinaryOp::Subtract => Cell::Number(operand(left) - operand(right)),
        BinaryOp::Multiply => Cell::Number(operand(left) * operand(right)),
        BinaryOp::Divide => Cell::Number(operand(left) / operand(right)),
    }
}

/// Bind, parse and evaluate `formula` against `row`.
pub fn evaluate(formula: &str, row: &Row) -> FormulaResult<Cell> {
    let bound = bind(formula, row)?;
    let expr = parse_formula(&bound.expression)?;
    eval(&expr, &bound.scope).map_err(|err| match err {
        FormulaError::UndefinedReference(name) => {
            FormulaError::UndefinedReference(original_name(&name, row))
        }
        other => other,
    })
}

/// Map a generated identifier back to the field it stands for.
fn original_name(name: &str, row: &Row) -> String {
    name.strip_prefix(BOUND_PREFIX)
        .and_then(|idx| idx.parse::<usize>().ok())
        .and_then(|idx| row.keys().nth(idx))
        .unwrap_or(name)
        .to_string()
}
