//! String to typed-value coercion for `value` tokens

use std::fmt;

use serde_json::{Number, Value};

/// A parsed literal.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Bool(bool),
    Null,
    Number(Number),
    String(String),
}

impl Literal {
    pub fn to_json(&self) -> Value {
        match self {
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Null => Value::Null,
            Literal::Number(n) => Value::Number(n.clone()),
            Literal::String(s) => Value::String(s.clone()),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Bool(b) => write!(f, "{b}"),
            Literal::Null => f.write_str("null"),
            Literal::Number(n) => write!(f, "{n}"),
            Literal::String(s) => write!(f, "{s:?}"),
        }
    }
}

/// Parse user-entered text into a literal.
///
/// Order matters: booleans, then `null`, then numbers, then quoted strings,
/// then the raw trimmed text. Never fails.
pub fn parse_literal(text: &str) -> Literal {
    let trimmed = text.trim();
    match trimmed {
        "true" => return Literal::Bool(true),
        "false" => return Literal::Bool(false),
        "null" => return Literal::Null,
        _ => {}
    }
    if let Some(number) = parse_number(trimmed) {
        return Literal::Number(number);
    }
    if let Some(inner) = strip_matching_quotes(trimmed) {
        return Literal::String(inner.to_string());
    }
    Literal::String(trimmed.to_string())
}

/// Integral values that fit an i64 stay integers so `"42"` compiles to `42`.
fn parse_number(s: &str) -> Option<Number> {
    if s.is_empty() {
        return None;
    }
    if let Ok(i) = s.parse::<i64>() {
        return Some(Number::from(i));
    }
    let f = s.parse::<f64>().ok().filter(|f| f.is_finite())?;
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        return Some(Number::from(f as i64));
    }
    Number::from_f64(f)
}

fn strip_matching_quotes(s: &str) -> Option<&str> {
    if s.len() < 2 {
        return None;
    }
    let quoted = (s.starts_with('"') && s.ends_with('"')) || (s.starts_with('\'') && s.ends_with('\''));
    quoted.then(|| &s[1..s.len() - 1])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn given_padded_keyword_when_parsing_then_trims_first() {
        assert_eq!(parse_literal("  true "), Literal::Bool(true));
        assert_eq!(parse_literal(" null\n"), Literal::Null);
    }

    #[test]
    fn given_non_finite_text_when_parsing_then_stays_string() {
        assert_eq!(parse_literal("inf").to_json(), json!("inf"));
        assert_eq!(parse_literal("NaN").to_json(), json!("NaN"));
    }

    #[test]
    fn given_integral_text_past_i64_when_parsing_then_float_not_clamped() {
        let json = parse_literal("9223372036854775808").to_json();

        assert_ne!(json, json!(i64::MAX));
        assert_eq!(json.as_f64(), Some(9_223_372_036_854_775_808.0));
        assert_eq!(parse_literal("9223372036854775807").to_json(), json!(i64::MAX));
    }

    #[test]
    fn given_single_quote_char_when_parsing_then_not_dequoted() {
        assert_eq!(parse_literal("'"), Literal::String("'".into()));
        assert_eq!(parse_literal("''"), Literal::String(String::new()));
    }

    #[test]
    fn given_exponent_and_negative_numbers_when_parsing_then_numbers() {
        assert_eq!(parse_literal("-7").to_json(), json!(-7));
        assert_eq!(parse_literal("1e3").to_json(), json!(1000));
        assert_eq!(parse_literal("-0.25").to_json(), json!(-0.25));
    }
}
