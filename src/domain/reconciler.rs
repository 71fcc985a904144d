//! Tree <-> flat list reconciliation for drag-reordering
//!
//! The flat list is the preorder of the forest; each entry keeps the depth
//! it had in the tree. After a reorder the tree is rebuilt with a stack of
//! ancestor candidates, using those depths as structural hints.

use generational_arena::Index;
use tracing::{debug, instrument};

use crate::domain::arena::{TokenForest, TokenNode};
use crate::domain::token::Token;

/// Preorder flatten across all roots. Entries are childless clones.
pub fn flatten(forest: &[Token]) -> Vec<Token> {
    let mut flat = Vec::new();
    let mut stack: Vec<&Token> = forest.iter().rev().collect();
    while let Some(token) = stack.pop() {
        flat.push(Token {
            children: Vec::new(),
            ..token.clone()
        });
        stack.extend(token.children.iter().rev());
    }
    flat
}

/// Remove the entry at `from` and reinsert it at `to`.
///
/// Out-of-range indices leave the list unchanged.
pub fn move_entry<T>(mut list: Vec<T>, from: usize, to: usize) -> Vec<T> {
    if from >= list.len() || to >= list.len() || from == to {
        return list;
    }
    let item = list.remove(from);
    list.insert(to, item);
    list
}

/// Rebuild a forest from a (possibly reordered) flat list.
///
/// Before placing an entry, candidates whose hint depth is `>=` the
/// entry's are popped; an empty stack makes the entry a root, otherwise it
/// becomes the last child of the top candidate. Stored depths are then
/// derived from the rebuilt structure, so the depth invariant holds even
/// when an entry's effective parent changed.
#[instrument(level = "debug", skip(flat), fields(entries = flat.len()))]
pub fn rebuild(flat: &[Token]) -> TokenForest {
    let mut forest = TokenForest::new();
    let mut stack: Vec<(Index, usize)> = Vec::new();

    for entry in flat {
        while stack.last().is_some_and(|(_, hint)| *hint >= entry.depth) {
            stack.pop();
        }
        let parent = stack.last().map(|(idx, _)| *idx);
        let idx = match forest.find(entry.id) {
            // already placed by an earlier pass over the same list
            Some(existing) => existing,
            None => {
                let mut node = TokenNode::new(entry.id, entry.token_type, entry.value.clone());
                node.metadata = entry.metadata.clone();
                forest.insert_node(node, parent)
            }
        };
        stack.push((idx, entry.depth));
    }
    if let Some(max) = flat.iter().map(|t| t.id).max() {
        forest.reserve_ids_through(max);
    }
    debug!(roots = forest.roots().len(), "rebuilt forest");
    forest
}

impl TokenForest {
    /// Drag-reorder: flatten, move `from` to `to`, rebuild.
    ///
    /// Ids and the cursor survive; the id counter never moves backwards.
    #[instrument(level = "debug", skip(self))]
    pub fn move_token(&mut self, from: usize, to: usize) -> bool {
        let flat = flatten(&self.to_tokens());
        if from >= flat.len() || to >= flat.len() || from == to {
            return false;
        }
        let reordered = move_entry(flat, from, to);
        let mut rebuilt = rebuild(&reordered);
        rebuilt.inherit_counter(self);
        rebuilt.select(self.cursor());
        *self = rebuilt;
        true
    }

    /// Flat preorder view of this forest.
    pub fn flatten(&self) -> Vec<Token> {
        flatten(&self.to_tokens())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::token::TokenType;

    #[test]
    fn given_out_of_range_indices_when_moving_then_unchanged() {
        let list = vec![1, 2, 3];
        assert_eq!(move_entry(list.clone(), 5, 0), list);
        assert_eq!(move_entry(list.clone(), 0, 3), list);
        assert_eq!(move_entry(list, 2, 0), vec![3, 1, 2]);
    }

    #[test]
    fn given_duplicate_entries_when_rebuilding_then_appended_once() {
        let field = Token::leaf(2, TokenType::Field, "A.b", 1);
        let flat = vec![
            Token::leaf(1, TokenType::And, "AND", 0),
            field.clone(),
            field,
        ];

        let forest = rebuild(&flat);
        let tokens = forest.to_tokens();

        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].children.len(), 1);
    }
}
