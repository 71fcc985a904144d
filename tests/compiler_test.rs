//! AST compiler: per-type rules, arity, root combination, totality

use rstest::rstest;
use serde_json::{json, Value};

use ruleforge::domain::{compile, AstCompiler, Token, TokenType};

fn field(id: u64, path: &str, depth: usize) -> Token {
    Token::leaf(id, TokenType::Field, path, depth)
}

fn value(id: u64, text: &str, depth: usize) -> Token {
    Token::leaf(id, TokenType::Value, text, depth)
}

fn comparison(id: u64, op: &str, depth: usize) -> Token {
    Token::leaf(id, TokenType::Operator, op, depth).with_children(vec![
        field(id + 1, "Patient.Age", depth + 1),
        value(id + 2, "18", depth + 1),
    ])
}

// ============================================================
// operators
// ============================================================

#[rstest]
#[case("=", "==")]
#[case("==", "==")]
#[case("!=", "!=")]
#[case(">", ">")]
#[case("<=", "<=")]
#[case("IN", "in")]
#[case("contains", "contains")]
fn given_binary_operator_when_compiling_then_keyed_by_normalized_symbol(
    #[case] label: &str,
    #[case] key: &str,
) {
    let compiled = compile(&[comparison(1, label, 0)]);

    let mut expected = serde_json::Map::new();
    expected.insert(key.to_string(), json!([{ "var": "Patient.Age" }, 18]));
    assert_eq!(compiled, Value::Object(expected));
}

#[test]
fn given_operator_with_one_operand_when_compiling_then_dropped_by_parent() {
    // Arrange
    let forest = vec![Token::leaf(1, TokenType::If, "IF", 0).with_children(vec![
        Token::leaf(2, TokenType::Operator, ">", 1)
            .with_children(vec![field(3, "Patient.Age", 2)]),
    ])];

    // Act / Assert
    assert_eq!(compile(&forest), json!({ "if": [] }));
}

#[test]
fn given_null_operand_when_compiling_then_operator_incomplete() {
    // Arrange
    let forest = vec![Token::leaf(1, TokenType::Operator, "==", 0)
        .with_children(vec![field(2, "A.b", 1), value(3, "null", 1)])];

    // Act / Assert
    assert_eq!(compile(&forest), json!({}));
}

#[rstest]
#[case(true)]
#[case(false)]
fn given_lone_null_root_when_compiling_then_empty_object(#[case] legacy_wrap: bool) {
    let compiler = AstCompiler::new(legacy_wrap);

    assert_eq!(compiler.compile(&[value(1, "null", 0)]), json!({}));
    assert_eq!(
        compiler.compile(&[value(1, "null", 0), value(2, "7", 0)]),
        if legacy_wrap { json!({ "var": "7" }) } else { json!(7) }
    );
}

#[test]
fn given_between_with_two_operands_when_compiling_then_incomplete() {
    let forest = vec![Token::leaf(1, TokenType::Operator, "between", 0)
        .with_children(vec![field(2, "Patient.Age", 1), value(3, "18", 1)])];

    assert_eq!(compile(&forest), json!({}));
}

// ============================================================
// logic
// ============================================================

#[test]
fn given_and_of_comparisons_when_compiling_then_and_array() {
    let forest = vec![Token::leaf(1, TokenType::And, "AND", 0)
        .with_children(vec![comparison(2, ">", 1), comparison(5, "<", 1)])];

    assert_eq!(
        compile(&forest),
        json!({ "and": [
            { ">": [{ "var": "Patient.Age" }, 18] },
            { "<": [{ "var": "Patient.Age" }, 18] }
        ] })
    );
}

#[rstest]
#[case(TokenType::And)]
#[case(TokenType::Or)]
#[case(TokenType::Any)]
#[case(TokenType::All)]
fn given_empty_connective_when_compiling_then_dropped(#[case] kind: TokenType) {
    let forest = vec![Token::leaf(1, kind, "X", 0)];

    assert_eq!(compile(&forest), json!({}));
}

#[test]
fn given_any_with_child_when_compiling_then_some_key() {
    let forest = vec![Token::leaf(1, TokenType::Any, "ANY", 0)
        .with_children(vec![comparison(2, "==", 1)])];

    assert_eq!(
        compile(&forest),
        json!({ "some": [{ "==": [{ "var": "Patient.Age" }, 18] }] })
    );
}

#[test]
fn given_xor_with_two_children_when_compiling_then_expanded() {
    let forest = vec![Token::leaf(1, TokenType::Xor, "XOR", 0)
        .with_children(vec![value(2, "true", 1), value(3, "false", 1)])];

    assert_eq!(
        compile(&forest),
        json!({ "and": [
            { "or": [true, false] },
            { "!": { "and": [true, false] } }
        ] })
    );
}

#[rstest]
#[case(1)]
#[case(3)]
fn given_xor_with_wrong_arity_when_compiling_then_dropped(#[case] operands: u64) {
    let children = (0..operands).map(|i| value(10 + i, "true", 1)).collect();
    let forest = vec![Token::leaf(1, TokenType::Xor, "XOR", 0).with_children(children)];

    assert_eq!(compile(&forest), json!({}));
}

#[test]
fn given_not_when_compiling_then_bang_of_first_child() {
    let forest = vec![Token::leaf(1, TokenType::Not, "NOT", 0)
        .with_children(vec![comparison(2, ">", 1), comparison(5, "<", 1)])];

    assert_eq!(
        compile(&forest),
        json!({ "!": { ">": [{ "var": "Patient.Age" }, 18] } })
    );
}

#[test]
fn given_then_with_single_child_when_compiling_then_unwrapped() {
    let forest = vec![Token::leaf(1, TokenType::If, "IF", 0).with_children(vec![
        comparison(2, ">", 1),
        Token::leaf(5, TokenType::Then, "THEN", 1).with_children(vec![value(6, "'adult'", 2)]),
    ])];

    assert_eq!(
        compile(&forest),
        json!({ "if": [{ ">": [{ "var": "Patient.Age" }, 18] }, "adult"] })
    );
}

// ============================================================
// roots
// ============================================================

#[test]
fn given_empty_forest_when_compiling_then_empty_object() {
    assert_eq!(compile(&[]), json!({}));
}

#[test]
fn given_several_roots_when_compiling_then_and_combined() {
    let forest = vec![comparison(1, ">", 0), comparison(4, "!=", 0)];

    assert_eq!(
        compile(&forest),
        json!({ "and": [
            { ">": [{ "var": "Patient.Age" }, 18] },
            { "!=": [{ "var": "Patient.Age" }, 18] }
        ] })
    );
}

#[rstest]
#[case("42", json!({ "var": "42" }))]
#[case("true", json!({ "var": "true" }))]
#[case("hello", json!({ "var": "hello" }))]
fn given_lone_scalar_root_when_compiling_with_legacy_wrap_then_var(
    #[case] text: &str,
    #[case] expected: Value,
) {
    assert_eq!(compile(&[value(1, text, 0)]), expected);
}

#[test]
fn given_lone_scalar_root_when_legacy_wrap_disabled_then_bare_scalar() {
    let compiler = AstCompiler::new(false);

    assert_eq!(compiler.compile(&[value(1, "42", 0)]), json!(42));
    assert_eq!(compiler.compile(&[value(1, "null", 0)]), json!({}));
}

#[test]
fn given_unsupported_types_when_compiling_then_dropped() {
    let forest = vec![
        Token::leaf(1, TokenType::Else, "ELSE", 0),
        Token::leaf(2, TokenType::Where, "WHERE", 0),
        Token::leaf(3, TokenType::WithUnit, "WITH_UNIT", 0),
        Token::leaf(4, TokenType::IsBlank, "IS_BLANK", 0),
    ];

    assert_eq!(compile(&forest), json!({}));
}

// ============================================================
// totality and determinism
// ============================================================

#[test]
fn given_every_type_with_every_arity_when_compiling_then_never_panics() {
    for kind in TokenType::ALL {
        for arity in 0..4u64 {
            let children = (0..arity).map(|i| field(10 + i, "A.b", 1)).collect();
            let forest = vec![Token::leaf(1, kind, "?", 0).with_children(children)];
            let _ = compile(&forest);
        }
    }
}

#[test]
fn given_same_forest_when_compiling_twice_then_identical() {
    let forest = vec![Token::leaf(1, TokenType::If, "IF", 0).with_children(vec![
        comparison(2, ">", 1),
        comparison(5, "between", 1),
    ])];

    assert_eq!(compile(&forest), compile(&forest));
}
