use std::collections::{BTreeSet, HashMap};

use crate::flow::{
    board::{
        Board,
        cleanup::{BoardCleanupLogic, PinLookup},
    },
    pin::Pin,
};

/// Repairs the edge tables: entries pointing at pins that no longer exist
/// are dropped, and reciprocity is restored. `a.connected_to` holding `b`
/// implies `b.depends_on` holds `a`, and vice versa.
#[derive(Default)]
pub struct FixPinsCleanup {
    /// connected_to entries observed per target pin, keyed by target.
    upstream_of: HashMap<String, BTreeSet<String>>,
    /// depends_on entries observed per source pin, keyed by source.
    downstream_of: HashMap<String, BTreeSet<String>>,
}

impl BoardCleanupLogic for FixPinsCleanup {
    fn init(_board: &mut Board) -> Self
    where
        Self: Sized,
    {
        FixPinsCleanup::default()
    }

    fn initial_pin_iteration(&mut self, pin: &Pin, _parent: super::NodeOrLayerRef) {
        for target in &pin.connected_to {
            self.upstream_of
                .entry(target.clone())
                .or_default()
                .insert(pin.id.clone());
        }
        for source in &pin.depends_on {
            self.downstream_of
                .entry(source.clone())
                .or_default()
                .insert(pin.id.clone());
        }
    }

    fn main_pin_iteration(&mut self, pin: &mut Pin, pin_lookup: &PinLookup) {
        pin.connected_to.retain(|id| pin_lookup.contains_key(id));
        pin.depends_on.retain(|id| pin_lookup.contains_key(id));

        // Re-add the reciprocal half of every surviving edge.
        if let Some(upstream) = self.upstream_of.get(&pin.id) {
            for source in upstream {
                if pin_lookup.contains_key(source) {
                    pin.depends_on.insert(source.clone());
                }
            }
        }
        if let Some(downstream) = self.downstream_of.get(&pin.id) {
            for target in downstream {
                if pin_lookup.contains_key(target) {
                    pin.connected_to.insert(target.clone());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::flow::node::Node;
    use crate::flow::variable::VariableType;
    use object_store::path::Path;

    #[tokio::test]
    async fn dangling_edges_are_dropped() {
        let state = crate::state::FlowboardState::in_memory();
        let mut board = crate::flow::board::Board::new(None, Path::from("boards"), state);

        let mut node = Node::new("test", "Test", "", "Utils");
        let pin = node.add_output_pin("out", "Out", "", VariableType::String);
        pin.connected_to.insert("gone-pin".to_string());
        let pin_id = pin.id.clone();
        board.nodes.insert(node.id.clone(), node.clone());

        board.cleanup();

        let pin = board.get_pin_by_id(&pin_id).unwrap();
        assert!(pin.connected_to.is_empty());
    }

    #[tokio::test]
    async fn reciprocity_is_restored() {
        let state = crate::state::FlowboardState::in_memory();
        let mut board = crate::flow::board::Board::new(None, Path::from("boards"), state);

        let mut producer = Node::new("producer", "Producer", "", "Utils");
        let out_id = producer
            .add_output_pin("out", "Out", "", VariableType::String)
            .id
            .clone();

        let mut consumer = Node::new("consumer", "Consumer", "", "Utils");
        let in_id = consumer
            .add_input_pin("in", "In", "", VariableType::String)
            .id
            .clone();

        // Only one half of the edge is recorded.
        producer
            .pins
            .get_mut(&out_id)
            .unwrap()
            .connected_to
            .insert(in_id.clone());

        board.nodes.insert(producer.id.clone(), producer);
        board.nodes.insert(consumer.id.clone(), consumer);

        board.cleanup();

        let input = board.get_pin_by_id(&in_id).unwrap();
        assert!(input.depends_on.contains(&out_id));
    }
}
