//! Token model: the nodes of a rule tree and the operator palette

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::error::DomainError;

/// Stable token identifier. Assigned once, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenId(pub u64);

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TokenId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().trim_start_matches('#').parse().map(TokenId)
    }
}

/// Closed set of token kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    // structural
    If,
    Then,
    Else,
    Where,
    // logical
    And,
    Or,
    Xor,
    Not,
    // relational
    Operator,
    // terminals
    Field,
    Value,
    // modifiers
    WithUnit,
    As,
    CodeSystem,
    Strength,
    In,
    Between,
    Contains,
    Is,
    IsBlank,
    Any,
    All,
}

impl TokenType {
    pub const ALL: [TokenType; 22] = [
        TokenType::If,
        TokenType::Then,
        TokenType::Else,
        TokenType::Where,
        TokenType::And,
        TokenType::Or,
        TokenType::Xor,
        TokenType::Not,
        TokenType::Operator,
        TokenType::Field,
        TokenType::Value,
        TokenType::WithUnit,
        TokenType::As,
        TokenType::CodeSystem,
        TokenType::Strength,
        TokenType::In,
        TokenType::Between,
        TokenType::Contains,
        TokenType::Is,
        TokenType::IsBlank,
        TokenType::Any,
        TokenType::All,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::If => "if",
            TokenType::Then => "then",
            TokenType::Else => "else",
            TokenType::Where => "where",
            TokenType::And => "and",
            TokenType::Or => "or",
            TokenType::Xor => "xor",
            TokenType::Not => "not",
            TokenType::Operator => "operator",
            TokenType::Field => "field",
            TokenType::Value => "value",
            TokenType::WithUnit => "with_unit",
            TokenType::As => "as",
            TokenType::CodeSystem => "code_system",
            TokenType::Strength => "strength",
            TokenType::In => "in",
            TokenType::Between => "between",
            TokenType::Contains => "contains",
            TokenType::Is => "is",
            TokenType::IsBlank => "is_blank",
            TokenType::Any => "any",
            TokenType::All => "all",
        }
    }

    /// `field`, `operator` and `value` form a complete terminal expression.
    pub fn is_terminal_expression(&self) -> bool {
        matches!(self, TokenType::Field | TokenType::Operator | TokenType::Value)
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        TokenType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| DomainError::UnknownTokenType(s.to_string()))
    }
}

/// Catalog metadata carried by `field` tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

/// A node of the rule tree, in its portable nested form.
///
/// This is the snapshot shape emitted after every mutation and accepted by
/// `load`. The editor itself mutates an arena ([`crate::domain::TokenForest`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub id: TokenId,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    pub value: String,
    pub depth: usize,
    #[serde(default)]
    pub children: Vec<Token>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<TokenMetadata>,
}

impl Token {
    /// Leaf token with no metadata.
    pub fn leaf(id: u64, token_type: TokenType, value: impl Into<String>, depth: usize) -> Self {
        Self {
            id: TokenId(id),
            token_type,
            value: value.into(),
            depth,
            children: Vec::new(),
            metadata: None,
        }
    }

    pub fn with_children(mut self, children: Vec<Token>) -> Self {
        self.children = children;
        self
    }

    /// Preorder `(type, value, depth)` signature of a forest.
    pub fn signature(forest: &[Token]) -> Vec<(TokenType, String, usize)> {
        let mut out = Vec::new();
        fn walk(token: &Token, out: &mut Vec<(TokenType, String, usize)>) {
            out.push((token.token_type, token.value.clone(), token.depth));
            for child in &token.children {
                walk(child, out);
            }
        }
        for root in forest {
            walk(root, &mut out);
        }
        out
    }

    /// True when every edge satisfies `child.depth == parent.depth + 1`
    /// and every root sits at depth 0.
    pub fn depths_consistent(forest: &[Token]) -> bool {
        fn check(token: &Token) -> bool {
            token
                .children
                .iter()
                .all(|c| c.depth == token.depth + 1 && check(c))
        }
        forest.iter().all(|root| root.depth == 0 && check(root))
    }
}

/// Palette category of an operator descriptor. Drives wrap-vs-nest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorCategory {
    Structural,
    Logic,
    Relational,
    Modifier,
}

/// What the user picked from the palette.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorDescriptor {
    pub kind: TokenType,
    pub label: String,
    pub category: OperatorCategory,
}

const RELATIONAL_SYMBOLS: [&str; 10] = ["=", "==", "!=", ">", "<", ">=", "<=", "in", "contains", "between"];

impl OperatorDescriptor {
    pub fn new(kind: TokenType, label: impl Into<String>, category: OperatorCategory) -> Self {
        Self {
            kind,
            label: label.into(),
            category,
        }
    }

    pub fn structural(kind: TokenType) -> Self {
        Self::new(kind, kind.as_str().to_ascii_uppercase(), OperatorCategory::Structural)
    }

    pub fn logic(kind: TokenType) -> Self {
        Self::new(kind, kind.as_str().to_ascii_uppercase(), OperatorCategory::Logic)
    }

    pub fn relational(symbol: impl Into<String>) -> Self {
        Self::new(TokenType::Operator, symbol, OperatorCategory::Relational)
    }

    pub fn modifier(kind: TokenType) -> Self {
        Self::new(kind, kind.as_str().to_ascii_uppercase(), OperatorCategory::Modifier)
    }

    /// Every descriptor the editor offers, in palette order.
    pub fn palette() -> Vec<OperatorDescriptor> {
        let mut palette = vec![
            Self::structural(TokenType::If),
            Self::structural(TokenType::Then),
            Self::structural(TokenType::Else),
            Self::structural(TokenType::Where),
            Self::logic(TokenType::And),
            Self::logic(TokenType::Or),
            Self::logic(TokenType::Xor),
            Self::logic(TokenType::Not),
        ];
        palette.extend(RELATIONAL_SYMBOLS.iter().map(|s| Self::relational(*s)));
        palette.extend(
            [
                TokenType::WithUnit,
                TokenType::As,
                TokenType::CodeSystem,
                TokenType::Strength,
                TokenType::In,
                TokenType::Between,
                TokenType::Contains,
                TokenType::Is,
                TokenType::IsBlank,
                TokenType::Any,
                TokenType::All,
            ]
            .into_iter()
            .map(Self::modifier),
        );
        palette
    }

    /// Resolve a palette entry by name.
    ///
    /// Relational symbols win over modifiers of the same name (`in`,
    /// `contains`, `between`); prefix a name with `mod:` to get the modifier.
    pub fn lookup(name: &str) -> Result<Self, DomainError> {
        let name = name.trim();
        if let Some(modifier) = name.strip_prefix("mod:") {
            let kind: TokenType = modifier.parse()?;
            return Ok(Self::modifier(kind));
        }
        let lowered = name.to_ascii_lowercase();
        if RELATIONAL_SYMBOLS.contains(&lowered.as_str()) {
            return Ok(Self::relational(lowered));
        }
        let kind: TokenType = lowered
            .parse()
            .map_err(|_| DomainError::UnknownOperator(name.to_string()))?;
        match kind {
            TokenType::If | TokenType::Then | TokenType::Else | TokenType::Where => {
                Ok(Self::structural(kind))
            }
            TokenType::And | TokenType::Or | TokenType::Xor | TokenType::Not => Ok(Self::logic(kind)),
            TokenType::Operator | TokenType::Field | TokenType::Value => {
                Err(DomainError::UnknownOperator(name.to_string()))
            }
            _ => Ok(Self::modifier(kind)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_snake_case_name_when_parsing_token_type_then_resolves() {
        assert_eq!("is_blank".parse::<TokenType>().unwrap(), TokenType::IsBlank);
        assert_eq!("AND".parse::<TokenType>().unwrap(), TokenType::And);
        assert!("nope".parse::<TokenType>().is_err());
    }

    #[test]
    fn given_relational_name_when_lookup_then_returns_operator_kind() {
        let op = OperatorDescriptor::lookup("between").unwrap();
        assert_eq!(op.kind, TokenType::Operator);
        assert_eq!(op.category, OperatorCategory::Relational);

        let modifier = OperatorDescriptor::lookup("mod:between").unwrap();
        assert_eq!(modifier.kind, TokenType::Between);
        assert_eq!(modifier.category, OperatorCategory::Modifier);
    }

    #[test]
    fn given_terminal_type_when_lookup_then_rejects() {
        assert!(OperatorDescriptor::lookup("field").is_err());
        assert!(OperatorDescriptor::lookup("value").is_err());
    }

    #[test]
    fn given_token_when_serialized_then_uses_type_key_and_camel_case_metadata() {
        let mut token = Token::leaf(7, TokenType::Field, "Patient.Age", 0);
        token.metadata = Some(TokenMetadata {
            field_type: Some("number".into()),
            data_path: Some("patient.age".into()),
            unit: None,
        });

        let json = serde_json::to_value(&token).unwrap();

        assert_eq!(json["type"], "field");
        assert_eq!(json["id"], 7);
        assert_eq!(json["metadata"]["fieldType"], "number");
        assert!(json["metadata"].get("unit").is_none());
    }
}
