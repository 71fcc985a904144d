//! Tree mutations: insert, wrap, nest, delete
//!
//! Every operation is total. A missing or stale target degrades to a
//! root-level append, and the forest is depth-consistent when control
//! returns.

use generational_arena::Index;
use tracing::{debug, instrument};

use crate::domain::arena::{TokenForest, TokenNode};
use crate::domain::catalog::FieldDescriptor;
use crate::domain::token::{OperatorCategory, OperatorDescriptor, TokenId, TokenType};

/// Label of the operator synthesized when a value is typed against a bare field.
pub const IMPLICIT_OPERATOR: &str = "=";

/// Wrap (replace the target and demote it) instead of nesting under it?
///
/// Relational operators wrap a bare field; logical and structural tokens
/// wrap any terminal expression. Everything else nests.
pub fn should_wrap(category: OperatorCategory, target: TokenType) -> bool {
    match category {
        OperatorCategory::Relational => target == TokenType::Field,
        OperatorCategory::Logic | OperatorCategory::Structural => target.is_terminal_expression(),
        OperatorCategory::Modifier => false,
    }
}

impl TokenForest {
    /// Insert a token from a palette descriptor.
    ///
    /// `target` defaults to the cursor. The new token becomes the cursor.
    #[instrument(level = "debug", skip(self), fields(kind = %operator.kind, label = %operator.label))]
    pub fn add_token(&mut self, operator: &OperatorDescriptor, target: Option<TokenId>) -> TokenId {
        let target_idx = match target {
            Some(id) => self.find(id),
            None => self.cursor_index(),
        };
        let id = self.allocate_id();
        let node = TokenNode::new(id, operator.kind, operator.label.clone());

        let target = target_idx.and_then(|t| self.get_node(t).map(|n| (t, n.token_type)));
        match target {
            None => {
                debug!(%id, "no target, appending root");
                self.insert_node(node, None);
            }
            Some((t, target_type)) if should_wrap(operator.category, target_type) => {
                debug!(%id, %target_type, "wrapping target");
                self.wrap_node(t, node);
            }
            Some((t, target_type)) => {
                debug!(%id, %target_type, "nesting under target");
                self.insert_node(node, Some(t));
            }
        }
        self.set_cursor(Some(id));
        id
    }

    /// Insert a `field` leaf under the cursor (or as a new root).
    #[instrument(level = "debug", skip(self, field), fields(path = %field.data_path))]
    pub fn select_field(&mut self, field: &FieldDescriptor) -> TokenId {
        let parent = self.cursor_index();
        let id = self.allocate_id();
        let mut node = TokenNode::new(id, TokenType::Field, field.data_path.clone());
        node.metadata = Some(field.metadata());
        self.insert_node(node, parent);
        self.set_cursor(Some(id));
        id
    }

    /// Insert a `value` literal, deciding where it belongs from the cursor.
    ///
    /// Returns None (and leaves the forest untouched) for blank input.
    /// After attaching to an operator the cursor stays on that operator so
    /// further operands (e.g. the upper bound of `between`) land there too.
    #[instrument(level = "debug", skip(self))]
    pub fn add_value(&mut self, text: &str) -> Option<TokenId> {
        let literal = text.trim();
        if literal.is_empty() {
            debug!("blank literal rejected");
            return None;
        }
        let cursor = self
            .cursor_index()
            .and_then(|c| self.get_node(c).map(|n| (c, n.token_type, n.children.len())));

        let Some((cursor_idx, cursor_type, cursor_children)) = cursor else {
            let id = self.allocate_id();
            self.insert_node(TokenNode::new(id, TokenType::Value, literal), None);
            self.set_cursor(Some(id));
            return Some(id);
        };

        let attach_to = if cursor_type == TokenType::Operator && cursor_children < 2 {
            cursor_idx
        } else if cursor_type == TokenType::Field {
            match self.waiting_operator_parent(cursor_idx) {
                Some(parent) => parent,
                None => {
                    let op_id = self.allocate_id();
                    let op = TokenNode::new(op_id, TokenType::Operator, IMPLICIT_OPERATOR);
                    debug!(%op_id, "synthesizing implicit operator");
                    self.wrap_node(cursor_idx, op).unwrap_or(cursor_idx)
                }
            }
        } else {
            cursor_idx
        };

        let id = self.allocate_id();
        self.insert_node(TokenNode::new(id, TokenType::Value, literal), Some(attach_to));
        let attach_id = self.get_node(attach_to).map(|n| n.id);
        self.set_cursor(attach_id);
        Some(id)
    }

    /// Parent of `idx` if it is an operator still missing an operand.
    fn waiting_operator_parent(&self, idx: Index) -> Option<Index> {
        let parent = self.get_node(idx)?.parent?;
        let node = self.get_node(parent)?;
        (node.token_type == TokenType::Operator && node.children.len() < 2).then_some(parent)
    }

    /// Remove a token and its whole subtree. Unknown ids are a no-op.
    #[instrument(level = "debug", skip(self))]
    pub fn delete_token(&mut self, id: TokenId) -> bool {
        let Some(idx) = self.find(id) else {
            debug!("delete target not found");
            return false;
        };
        let removed = self.remove_subtree(idx);
        if self.cursor().is_some_and(|c| removed.contains(&c)) {
            self.set_cursor(None);
        }
        debug!(removed = removed.len(), "subtree deleted");
        true
    }

    /// Edit a token's label or literal text in place; id and depth are kept.
    #[instrument(level = "debug", skip(self))]
    pub fn update_value(&mut self, id: TokenId, text: &str) -> bool {
        let text = text.trim();
        if text.is_empty() {
            return false;
        }
        match self.find(id).and_then(|idx| self.get_node_mut(idx)) {
            Some(node) => {
                node.value = text.to_string();
                true
            }
            None => false,
        }
    }

    /// Move the cursor. A stale id clears it. Returns whether a token is selected.
    pub fn select(&mut self, id: Option<TokenId>) -> bool {
        let resolved = id.filter(|id| self.find(*id).is_some());
        self.set_cursor(resolved);
        resolved.is_some()
    }
}
