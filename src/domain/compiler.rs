//! Token forest to JSON logic compiler
//!
//! Compilation is bottom-up and total: a child that does not compile is
//! dropped before its parent is looked at, and a parent missing operands
//! does not compile either. Nothing here returns an error.

use serde_json::{json, Map, Value};
use tracing::{instrument, trace};

use crate::domain::literal::{parse_literal, Literal};
use crate::domain::token::{Token, TokenType};

const BINARY_OPERATORS: [&str; 8] = ["==", "!=", ">", "<", ">=", "<=", "in", "contains"];

/// Compiles token forests into logic objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AstCompiler {
    /// A lone scalar root result is emitted as `{"var": "<scalar>"}`.
    ///
    /// Kept for compatibility with rules exported by earlier versions.
    pub legacy_scalar_root_wrap: bool,
}

impl Default for AstCompiler {
    fn default() -> Self {
        Self {
            legacy_scalar_root_wrap: true,
        }
    }
}

impl AstCompiler {
    pub fn new(legacy_scalar_root_wrap: bool) -> Self {
        Self {
            legacy_scalar_root_wrap,
        }
    }

    /// Compile the whole forest. `{}` when nothing compiles.
    #[instrument(level = "debug", skip(self, forest), fields(roots = forest.len()))]
    pub fn compile(&self, forest: &[Token]) -> Value {
        let mut compiled: Vec<Value> = forest.iter().filter_map(compile_token).collect();
        match compiled.len() {
            0 => Value::Object(Map::new()),
            1 => {
                let only = compiled.remove(0);
                if self.legacy_scalar_root_wrap && is_scalar(&only) {
                    json!({ "var": scalar_to_string(&only) })
                } else {
                    only
                }
            }
            _ => json!({ "and": compiled }),
        }
    }
}

/// Compile with the default compiler.
pub fn compile(forest: &[Token]) -> Value {
    AstCompiler::default().compile(forest)
}

/// Compile one subtree. None means "incomplete, drop me".
pub fn compile_token(token: &Token) -> Option<Value> {
    let children: Vec<Value> = token.children.iter().filter_map(compile_token).collect();
    let compiled = match token.token_type {
        TokenType::If => Some(json!({ "if": children })),
        TokenType::Then => {
            if children.len() == 1 {
                children.into_iter().next()
            } else {
                Some(json!({ "then": children }))
            }
        }
        TokenType::And => non_empty("and", children),
        TokenType::Or => non_empty("or", children),
        TokenType::Any => non_empty("some", children),
        TokenType::All => non_empty("all", children),
        TokenType::Xor => compile_xor(children),
        TokenType::Not => children.into_iter().next().map(|c| json!({ "!": c })),
        TokenType::Operator => compile_operator(&token.value, children),
        TokenType::Field => Some(json!({ "var": token.value })),
        TokenType::Value => match parse_literal(&token.value) {
            Literal::Null => None,
            literal => Some(literal.to_json()),
        },
        _ => None,
    };
    trace!(id = %token.id, kind = %token.token_type, compiled = compiled.is_some(), "compiled token");
    compiled
}

fn non_empty(key: &str, children: Vec<Value>) -> Option<Value> {
    if children.is_empty() {
        return None;
    }
    let mut map = Map::new();
    map.insert(key.to_string(), Value::Array(children));
    Some(Value::Object(map))
}

/// `a xor b` as `(a or b) and not (a and b)`.
fn compile_xor(children: Vec<Value>) -> Option<Value> {
    let [a, b]: [Value; 2] = children.try_into().ok()?;
    Some(json!({
        "and": [
            { "or": [a.clone(), b.clone()] },
            { "!": { "and": [a, b] } }
        ]
    }))
}

fn compile_operator(label: &str, children: Vec<Value>) -> Option<Value> {
    let op = normalize_operator(label);
    if BINARY_OPERATORS.contains(&op.as_str()) {
        if children.len() < 2 {
            return None;
        }
        let mut operands = children.into_iter();
        let (left, right) = (operands.next()?, operands.next()?);
        let mut map = Map::new();
        map.insert(op, json!([left, right]));
        return Some(Value::Object(map));
    }
    if op == "between" {
        if children.len() < 3 {
            return None;
        }
        let mut operands = children.into_iter();
        let (subject, low, high) = (operands.next()?, operands.next()?, operands.next()?);
        return Some(json!({
            "and": [
                { ">=": [subject.clone(), low] },
                { "<=": [subject, high] }
            ]
        }));
    }
    None
}

/// `=` is an alias for `==`; word operators are case-insensitive.
pub fn normalize_operator(label: &str) -> String {
    let op = label.trim().to_ascii_lowercase();
    if op == "=" {
        "==".to_string()
    } else {
        op
    }
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Object(_) | Value::Array(_))
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
