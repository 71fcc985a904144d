//! Arena-backed token forest: the editor's mutable rule tree
//!
//! Nodes live in a generational arena and reference each other by arena
//! index; tokens are addressed from the outside by their stable [`TokenId`].

use std::collections::HashSet;

use generational_arena::{Arena, Index};
use tracing::{instrument, warn};

use crate::domain::token::{Token, TokenId, TokenMetadata, TokenType};

/// Tree node in the arena.
#[derive(Debug, Clone)]
pub struct TokenNode {
    pub id: TokenId,
    pub token_type: TokenType,
    pub value: String,
    pub depth: usize,
    pub metadata: Option<TokenMetadata>,
    /// Index of parent node in the arena, None for roots
    pub parent: Option<Index>,
    /// Indices of child nodes, in order
    pub children: Vec<Index>,
}

impl TokenNode {
    pub fn new(id: TokenId, token_type: TokenType, value: impl Into<String>) -> Self {
        Self {
            id,
            token_type,
            value: value.into(),
            depth: 0,
            metadata: None,
            parent: None,
            children: Vec::new(),
        }
    }
}

/// A forest of tokens plus the selection cursor.
///
/// Lookup by id is a linear scan; the forests an editor holds are small.
#[derive(Debug, Clone)]
pub struct TokenForest {
    arena: Arena<TokenNode>,
    roots: Vec<Index>,
    cursor: Option<TokenId>,
    next_id: u64,
}

impl Default for TokenForest {
    fn default() -> Self {
        Self::canonical()
    }
}

impl TokenForest {
    /// Empty forest, no roots, no cursor.
    pub fn new() -> Self {
        Self {
            arena: Arena::new(),
            roots: Vec::new(),
            cursor: None,
            next_id: 1,
        }
    }

    /// Initial and post-clear state: a single `if` root, selected.
    pub fn canonical() -> Self {
        let mut forest = Self::new();
        forest.reset();
        forest
    }

    /// Drop every token and reinstate the canonical `if` root.
    ///
    /// The id counter keeps running so ids are never reused.
    #[instrument(level = "debug", skip(self))]
    pub fn reset(&mut self) {
        self.arena.clear();
        self.roots.clear();
        let id = self.allocate_id();
        let root = self.insert_node(TokenNode::new(id, TokenType::If, "IF"), None);
        self.cursor = self.arena.get(root).map(|n| n.id);
    }

    pub(crate) fn allocate_id(&mut self) -> TokenId {
        let id = TokenId(self.next_id);
        self.next_id += 1;
        id
    }

    /// The id the next created token will get.
    pub fn next_id(&self) -> TokenId {
        TokenId(self.next_id)
    }

    /// Keep the id counter strictly past `id`.
    pub fn reserve_ids_through(&mut self, id: TokenId) {
        self.next_id = self.next_id.max(id.0 + 1);
    }

    /// Never hand out an id `other` might already have used.
    pub(crate) fn inherit_counter(&mut self, other: &TokenForest) {
        self.next_id = self.next_id.max(other.next_id);
    }

    /// Insert a node as last child of `parent`, or as a new last root.
    ///
    /// The node's depth is derived from its parent.
    #[instrument(level = "trace", skip(self, node))]
    pub(crate) fn insert_node(&mut self, mut node: TokenNode, parent: Option<Index>) -> Index {
        let parent = parent.filter(|p| self.arena.contains(*p));
        node.depth = parent
            .and_then(|p| self.arena.get(p))
            .map(|p| p.depth + 1)
            .unwrap_or(0);
        node.parent = parent;
        node.children.clear();
        let node_idx = self.arena.insert(node);

        match parent {
            Some(parent_idx) => {
                if let Some(parent) = self.arena.get_mut(parent_idx) {
                    parent.children.push(node_idx);
                }
            }
            None => self.roots.push(node_idx),
        }
        node_idx
    }

    pub fn get_node(&self, idx: Index) -> Option<&TokenNode> {
        self.arena.get(idx)
    }

    pub(crate) fn get_node_mut(&mut self, idx: Index) -> Option<&mut TokenNode> {
        self.arena.get_mut(idx)
    }

    /// Locate a token's arena index by id.
    pub fn find(&self, id: TokenId) -> Option<Index> {
        self.arena
            .iter()
            .find(|(_, node)| node.id == id)
            .map(|(idx, _)| idx)
    }

    pub fn token(&self, id: TokenId) -> Option<&TokenNode> {
        self.find(id).and_then(|idx| self.arena.get(idx))
    }

    pub fn roots(&self) -> &[Index] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub fn cursor(&self) -> Option<TokenId> {
        self.cursor
    }

    /// Cursor as an arena index; a stale cursor resolves to None.
    pub(crate) fn cursor_index(&self) -> Option<Index> {
        self.cursor.and_then(|id| self.find(id))
    }

    pub(crate) fn set_cursor(&mut self, cursor: Option<TokenId>) {
        self.cursor = cursor;
    }

    /// Preorder over all roots, left to right.
    pub fn iter(&self) -> PreOrderIterator<'_> {
        PreOrderIterator::new(self, self.roots.clone())
    }

    /// Preorder over the subtree rooted at `idx`.
    pub fn iter_subtree(&self, idx: Index) -> PreOrderIterator<'_> {
        PreOrderIterator::new(self, vec![idx])
    }

    /// Number of levels of the deepest root-to-leaf path.
    pub fn height(&self) -> usize {
        self.iter().map(|(_, node)| node.depth + 1).max().unwrap_or(0)
    }

    /// Add `delta` to the depth of every node in the subtree at `idx`.
    pub(crate) fn shift_depth(&mut self, idx: Index, delta: isize) {
        let subtree: Vec<Index> = self.iter_subtree(idx).map(|(i, _)| i).collect();
        for i in subtree {
            if let Some(node) = self.arena.get_mut(i) {
                node.depth = node.depth.saturating_add_signed(delta);
            }
        }
    }

    /// Put `replacement` into the slot `current` occupies (parent's child
    /// list or the root list). `current` is left detached.
    pub(crate) fn replace_slot(&mut self, current: Index, replacement: Index) {
        let parent = self.arena.get(current).and_then(|n| n.parent);
        match parent {
            Some(parent_idx) => {
                if let Some(parent) = self.arena.get_mut(parent_idx) {
                    if let Some(slot) = parent.children.iter_mut().find(|c| **c == current) {
                        *slot = replacement;
                    }
                }
            }
            None => {
                if let Some(slot) = self.roots.iter_mut().find(|r| **r == current) {
                    *slot = replacement;
                }
            }
        }
        if let Some(node) = self.arena.get_mut(replacement) {
            node.parent = parent;
        }
        if let Some(node) = self.arena.get_mut(current) {
            node.parent = None;
        }
    }

    /// Put `node` where `target` is and make `target` its sole child.
    ///
    /// The new node takes the target's depth; the target's whole subtree
    /// moves one level down.
    pub(crate) fn wrap_node(&mut self, target: Index, mut node: TokenNode) -> Option<Index> {
        let depth = self.arena.get(target)?.depth;
        node.depth = depth;
        node.parent = None;
        node.children = vec![target];
        let wrapper = self.arena.insert(node);
        self.replace_slot(target, wrapper);
        if let Some(target_node) = self.arena.get_mut(target) {
            target_node.parent = Some(wrapper);
        }
        self.shift_depth(target, 1);
        Some(wrapper)
    }

    /// Unlink `idx` from its parent (or the root list) and free its subtree.
    ///
    /// Returns the ids that were removed.
    pub(crate) fn remove_subtree(&mut self, idx: Index) -> Vec<TokenId> {
        let parent = self.arena.get(idx).and_then(|n| n.parent);
        match parent {
            Some(parent_idx) => {
                if let Some(parent) = self.arena.get_mut(parent_idx) {
                    parent.children.retain(|c| *c != idx);
                }
            }
            None => self.roots.retain(|r| *r != idx),
        }
        let doomed: Vec<Index> = self.iter_subtree(idx).map(|(i, _)| i).collect();
        doomed
            .into_iter()
            .filter_map(|i| self.arena.remove(i))
            .map(|node| node.id)
            .collect()
    }

    /// Every parent-child edge has `child.depth == parent.depth + 1` and
    /// every root sits at depth 0.
    pub fn depth_invariant_holds(&self) -> bool {
        let roots_ok = self
            .roots
            .iter()
            .all(|r| self.arena.get(*r).map(|n| n.depth == 0 && n.parent.is_none()).unwrap_or(false));
        roots_ok
            && self.iter().all(|(idx, node)| {
                node.children.iter().all(|c| {
                    self.arena
                        .get(*c)
                        .map(|child| child.depth == node.depth + 1 && child.parent == Some(idx))
                        .unwrap_or(false)
                })
            })
    }

    /// Nested snapshot of the whole forest.
    pub fn to_tokens(&self) -> Vec<Token> {
        self.roots.iter().filter_map(|r| self.subtree_token(*r)).collect()
    }

    pub fn subtree_token(&self, idx: Index) -> Option<Token> {
        let node = self.arena.get(idx)?;
        Some(Token {
            id: node.id,
            token_type: node.token_type,
            value: node.value.clone(),
            depth: node.depth,
            children: node
                .children
                .iter()
                .filter_map(|c| self.subtree_token(*c))
                .collect(),
            metadata: node.metadata.clone(),
        })
    }

    /// Build a forest from a nested snapshot (the `load` path).
    ///
    /// Ids are kept; a duplicate id gets a fresh one. Depths are re-derived
    /// from the structure so the depth invariant holds regardless of input.
    #[instrument(level = "debug", skip(tokens), fields(roots = tokens.len()))]
    pub fn from_tokens(tokens: &[Token]) -> Self {
        let mut forest = Self::new();
        let max_id = collect_ids(tokens).into_iter().max().unwrap_or(0);
        forest.next_id = max_id + 1;

        let mut seen = HashSet::new();
        let mut stack: Vec<(&Token, Option<Index>)> = tokens.iter().rev().map(|t| (t, None)).collect();
        while let Some((token, parent)) = stack.pop() {
            let id = if seen.insert(token.id) {
                token.id
            } else {
                let fresh = forest.allocate_id();
                warn!(duplicate = %token.id, fresh = %fresh, "duplicate token id on load");
                fresh
            };
            let mut node = TokenNode::new(id, token.token_type, token.value.clone());
            node.metadata = token.metadata.clone();
            let idx = forest.insert_node(node, parent);
            for child in token.children.iter().rev() {
                stack.push((child, Some(idx)));
            }
        }
        forest
    }
}

fn collect_ids(forest: &[Token]) -> Vec<u64> {
    let mut ids = Vec::new();
    let mut stack: Vec<&Token> = forest.iter().collect();
    while let Some(token) = stack.pop() {
        ids.push(token.id.0);
        stack.extend(token.children.iter());
    }
    ids
}

pub struct PreOrderIterator<'a> {
    forest: &'a TokenForest,
    stack: Vec<Index>,
}

impl<'a> PreOrderIterator<'a> {
    fn new(forest: &'a TokenForest, mut starts: Vec<Index>) -> Self {
        starts.reverse();
        Self {
            forest,
            stack: starts,
        }
    }
}

impl<'a> Iterator for PreOrderIterator<'a> {
    type Item = (Index, &'a TokenNode);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(current_idx) = self.stack.pop() {
            if let Some(node) = self.forest.get_node(current_idx) {
                // Push children in reverse order for left-to-right traversal
                for &child in node.children.iter().rev() {
                    self.stack.push(child);
                }
                return Some((current_idx, node));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_new_forest_when_canonical_then_single_if_root_selected() {
        let forest = TokenForest::canonical();
        let tokens = forest.to_tokens();

        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].token_type, TokenType::If);
        assert_eq!(tokens[0].depth, 0);
        assert_eq!(forest.cursor(), Some(tokens[0].id));
    }

    #[test]
    fn given_reset_when_called_twice_then_ids_not_reused() {
        let mut forest = TokenForest::canonical();
        let first = forest.to_tokens()[0].id;

        forest.reset();

        assert_ne!(forest.to_tokens()[0].id, first);
    }

    #[test]
    fn given_inconsistent_depths_when_loading_then_depths_rederived() {
        let tokens = vec![Token::leaf(4, TokenType::And, "AND", 3).with_children(vec![
            Token::leaf(5, TokenType::Field, "A.b", 0),
            Token::leaf(4, TokenType::Value, "1", 9),
        ])];

        let forest = TokenForest::from_tokens(&tokens);
        let snapshot = forest.to_tokens();

        assert!(forest.depth_invariant_holds());
        assert!(Token::depths_consistent(&snapshot));
        assert_eq!(snapshot[0].children[0].id, TokenId(5));
        // duplicate id 4 was reassigned past the max
        assert_eq!(snapshot[0].children[1].id, TokenId(6));
    }

    #[test]
    fn given_forest_when_iterating_then_preorder_across_roots() {
        let tokens = vec![
            Token::leaf(1, TokenType::Or, "OR", 0)
                .with_children(vec![Token::leaf(2, TokenType::Field, "A.a", 1)]),
            Token::leaf(3, TokenType::Field, "B.b", 0),
        ];
        let forest = TokenForest::from_tokens(&tokens);

        let ids: Vec<u64> = forest.iter().map(|(_, n)| n.id.0).collect();

        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(forest.height(), 2);
    }
}
