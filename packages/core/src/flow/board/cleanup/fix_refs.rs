use std::collections::{HashMap, HashSet};

use crate::{
    flow::{
        board::{
            Board,
            cleanup::{BoardCleanupLogic, PinLookup},
        },
        node::Node,
        pin::Pin,
    },
    utils::hash::hash_string_non_cryptographic,
};

/// Copy-on-write schema/description interner. Long strings are replaced by
/// their hash key; keys nothing references anymore are dropped from the
/// table at the end of the sweep.
#[derive(Default)]
pub struct FixRefsCleanup {
    pub refs: HashMap<String, String>,
    pub abandoned: HashSet<String>,
}

impl FixRefsCleanup {
    fn ensure_ref(&mut self, s: &mut String) {
        if self.refs.contains_key(s) {
            self.abandoned.remove(s);
            return;
        }
        if s.is_empty() {
            return;
        }
        let hash = hash_string_non_cryptographic(s).to_string();
        self.refs.insert(hash.clone(), std::mem::take(s));
        self.abandoned.remove(&hash);
        *s = hash;
    }

    fn ensure_ref_opt(&mut self, s: &mut Option<String>) {
        if let Some(inner) = s {
            self.ensure_ref(inner);
        }
    }
}

impl BoardCleanupLogic for FixRefsCleanup {
    fn init(board: &mut Board) -> Self
    where
        Self: Sized,
    {
        Self {
            refs: board.refs.clone(),
            abandoned: board.refs.keys().cloned().collect(),
        }
    }

    fn main_node_iteration(&mut self, node: &mut Node, _pin_lookup: &PinLookup) {
        self.ensure_ref(&mut node.description);
        self.ensure_ref_opt(&mut node.docs);
    }

    fn main_pin_iteration(&mut self, pin: &mut Pin, _pin_lookup: &PinLookup) {
        self.ensure_ref(&mut pin.description);
        self.ensure_ref_opt(&mut pin.schema);
    }

    fn post_process(&mut self, board: &mut Board, _pin_lookup: &PinLookup) {
        board.refs = std::mem::take(&mut self.refs);
        let abandoned = std::mem::take(&mut self.abandoned);
        board.refs.retain(|k, _| !abandoned.contains(k));
        board.refs.shrink_to_fit();
    }
}

#[cfg(test)]
mod tests {
    use crate::flow::node::Node;
    use crate::flow::variable::VariableType;
    use crate::utils::hash::resolve_ref;
    use object_store::path::Path;

    #[tokio::test]
    async fn descriptions_get_interned_and_resolved() {
        let state = crate::state::FlowboardState::in_memory();
        let mut board = crate::flow::board::Board::new(None, Path::from("boards"), state);

        let mut node = Node::new("test", "Test", "A long node description", "Utils");
        node.add_input_pin("text", "Text", "pin description", VariableType::String);
        board.nodes.insert(node.id.clone(), node.clone());

        board.cleanup();

        let interned = &board.nodes.get(&node.id).unwrap().description;
        assert_ne!(interned, "A long node description");
        assert_eq!(
            resolve_ref(interned, &board.refs),
            "A long node description"
        );
    }

    #[tokio::test]
    async fn abandoned_refs_are_dropped() {
        let state = crate::state::FlowboardState::in_memory();
        let mut board = crate::flow::board::Board::new(None, Path::from("boards"), state);
        board
            .refs
            .insert("1234".to_string(), "dead entry".to_string());

        board.cleanup();
        assert!(board.refs.is_empty());
    }
}
