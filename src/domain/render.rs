//! Display-only renderings of a token forest

use itertools::Itertools;
use termtree::Tree;

use crate::domain::arena::TokenForest;
use crate::domain::token::{Token, TokenId, TokenType};

/// Shown instead of an expression when the forest has no tokens.
pub const EMPTY_EXPRESSION: &str = "(empty expression)";

const INDENT: &str = "  ";

/// Human-readable, indented expression text.
pub fn render_expression(forest: &[Token]) -> String {
    if forest.is_empty() {
        return EMPTY_EXPRESSION.to_string();
    }
    forest.iter().map(|root| render_token(root, 0)).join("\n")
}

fn render_token(token: &Token, level: usize) -> String {
    let indent = INDENT.repeat(level);
    let keyword = token.token_type.as_str().to_ascii_uppercase();
    match token.token_type {
        TokenType::If | TokenType::And | TokenType::Or => {
            if token.children.is_empty() {
                return format!("{indent}{keyword} ()");
            }
            let body = token
                .children
                .iter()
                .map(|c| render_token(c, level + 1))
                .join("\n");
            format!("{indent}{keyword} (\n{body}\n{indent})")
        }
        TokenType::Operator if token.children.len() == 2 => format!(
            "{indent}{} {} {}",
            render_inline(&token.children[0]),
            token.value,
            render_inline(&token.children[1])
        ),
        TokenType::Field | TokenType::Value => format!("{indent}{}", token.value),
        _ if token.children.is_empty() => format!("{indent}{keyword}"),
        _ => format!(
            "{indent}{keyword} ({})",
            token.children.iter().map(render_inline).join(", ")
        ),
    }
}

/// A subtree on one line.
fn render_inline(token: &Token) -> String {
    render_token(token, 0).split_whitespace().join(" ")
}

/// Tree-shaped display of the forest, for terminals.
pub trait ToDisplayTree {
    fn to_display_tree(&self) -> Tree<String>;
}

impl ToDisplayTree for TokenForest {
    fn to_display_tree(&self) -> Tree<String> {
        let cursor = self.cursor();
        fn build(token: &Token, cursor: Option<TokenId>) -> Tree<String> {
            let marker = if Some(token.id) == cursor { " <" } else { "" };
            let label = format!("#{} {} {}{}", token.id, token.token_type, token.value, marker);
            Tree::new(label).with_leaves(token.children.iter().map(|c| build(c, cursor)))
        }
        let roots = self.to_tokens();
        Tree::new("rule".to_string()).with_leaves(roots.iter().map(|r| build(r, cursor)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comparison() -> Token {
        Token::leaf(2, TokenType::Operator, ">", 1).with_children(vec![
            Token::leaf(3, TokenType::Field, "Patient.Age", 2),
            Token::leaf(4, TokenType::Value, "18", 2),
        ])
    }

    #[test]
    fn given_empty_forest_when_rendering_then_placeholder() {
        assert_eq!(render_expression(&[]), EMPTY_EXPRESSION);
    }

    #[test]
    fn given_if_block_when_rendering_then_indented_children() {
        let forest = vec![Token::leaf(1, TokenType::If, "IF", 0).with_children(vec![comparison()])];

        assert_eq!(render_expression(&forest), "IF (\n  Patient.Age > 18\n)");
    }

    #[test]
    fn given_not_with_child_when_rendering_then_type_with_parenthesized_children() {
        let forest = vec![Token::leaf(1, TokenType::Not, "NOT", 0).with_children(vec![comparison()])];

        assert_eq!(render_expression(&forest), "NOT (Patient.Age > 18)");
    }

    #[test]
    fn given_incomplete_operator_when_rendering_then_bare_type() {
        let forest = vec![Token::leaf(1, TokenType::Operator, ">", 0)];

        assert_eq!(render_expression(&forest), "OPERATOR");
    }
}
