//! The "LOL" (list-of-lists) graph: a compact, directed, weighted,
//! multi-layer graph with O(1) neighbor enumeration and integer node ids.
//!
//! Build phase uses a growable edge list (`GraphBuilder`); `build()`
//! finalizes into a read-only CSR-like `Graph` with precomputed per-class
//! dense value blocks for the matcher's hot read path.

mod persist;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::types::{Allele, Genotype, GENOTYPE_LEN};

pub type NodeId = u32;

/// The donor graph overloads one node space with four disjoint kinds of
/// node. Tagging the key itself (rather than tracking four separate id
/// spaces) makes layer membership a property of the key, not a side table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NodeKey {
    Donor(u64),
    Genotype(Genotype),
    Class(u128),
    Subclass(u128),
}

impl NodeKey {
    pub fn as_genotype(&self) -> Option<&Genotype> {
        match self {
            NodeKey::Genotype(g) => Some(g),
            _ => None,
        }
    }
}

/// One row of the dense per-class genotype block: `class_neighbors`
/// precomputes these at finalize time so query-time access is a slice,
/// not a traversal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassBlock {
    pub ids: Vec<NodeId>,
    pub values: Vec<Genotype>,
}

/// Growable edge list used only during the build phase.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    edges: Vec<(NodeKey, NodeKey, f32)>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_edge(&mut self, from: NodeKey, to: NodeKey, weight: f32) {
        self.edges.push((from, to, weight));
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Finalize into a read-only compact graph: assign compact ids in a
    /// deterministic (sorted-key) order, build CSR offsets/targets/weights,
    /// and precompute the per-class dense value blocks.
    pub fn build(self) -> Graph {
        let mut unique_keys: Vec<NodeKey> = {
            let mut set: hashbrown::HashSet<NodeKey> = hashbrown::HashSet::new();
            for (from, to, _) in &self.edges {
                set.insert(*from);
                set.insert(*to);
            }
            set.into_iter().collect()
        };
        // Deterministic id assignment independent of edge insertion order,
        // which is what lets two builds of the same donor directory produce
        // identical neighbor sets and weights.
        unique_keys.sort();

        let mut key_to_id: HashMap<NodeKey, NodeId> = HashMap::with_capacity(unique_keys.len());
        for (id, key) in unique_keys.iter().enumerate() {
            key_to_id.insert(*key, id as NodeId);
        }

        let num_nodes = unique_keys.len();
        let mut by_source: Vec<Vec<(NodeId, f32)>> = vec![Vec::new(); num_nodes];
        for (from, to, weight) in &self.edges {
            let from_id = key_to_id[from];
            let to_id = key_to_id[to];
            by_source[from_id as usize].push((to_id, *weight));
        }
        for neighbors in &mut by_source {
            neighbors.sort_by_key(|(id, _)| *id);
        }

        let mut offsets: Vec<u32> = Vec::with_capacity(num_nodes + 1);
        let mut targets: Vec<NodeId> = Vec::with_capacity(self.edges.len());
        let mut weights: Vec<f32> = Vec::with_capacity(self.edges.len());
        offsets.push(0);
        for neighbors in &by_source {
            for (id, weight) in neighbors {
                targets.push(*id);
                weights.push(*weight);
            }
            offsets.push(targets.len() as u32);
        }

        let mut graph = Graph {
            keys: unique_keys,
            key_to_id,
            offsets,
            targets,
            weights,
            class_blocks: HashMap::new(),
        };
        graph.precompute_class_blocks();
        graph
    }
}

/// The finalized, immutable donor (or patient-scale) graph.
///
/// `key_to_id` is rebuilt from `keys` on load rather than serialized:
/// `NodeKey` is an enum carrying data in every variant, and serde_json's
/// map-key serializer only accepts strings and primitive numbers, not
/// arbitrary enum values, so a serialized `HashMap<NodeKey, _>` would fail
/// at write time.
#[derive(Debug, Serialize, Deserialize)]
pub struct Graph {
    keys: Vec<NodeKey>,
    #[serde(skip)]
    key_to_id: HashMap<NodeKey, NodeId>,
    offsets: Vec<u32>,
    targets: Vec<NodeId>,
    weights: Vec<f32>,
    class_blocks: HashMap<u128, ClassBlock>,
}

impl Graph {
    /// Rebuild `key_to_id` from `keys` after deserialization, where the
    /// index was skipped rather than serialized.
    pub(crate) fn rebuild_index(&mut self) {
        self.key_to_id = self
            .keys
            .iter()
            .enumerate()
            .map(|(id, key)| (*key, id as NodeId))
            .collect();
    }

    fn precompute_class_blocks(&mut self) {
        let class_ids: Vec<(u128, NodeId)> = self
            .keys
            .iter()
            .enumerate()
            .filter_map(|(id, key)| match key {
                NodeKey::Class(c) => Some((*c, id as NodeId)),
                _ => None,
            })
            .collect();

        for (class_key, class_id) in class_ids {
            let mut ids = Vec::new();
            let mut values = Vec::new();
            for (neighbor_id, _) in self.neighbors_id_raw(class_id) {
                if let NodeKey::Genotype(g) = self.keys[neighbor_id as usize] {
                    ids.push(neighbor_id);
                    values.push(g);
                }
            }
            self.class_blocks.insert(class_key, ClassBlock { ids, values });
        }
    }

    fn neighbors_id_raw(&self, id: NodeId) -> impl Iterator<Item = (NodeId, f32)> + '_ {
        let start = self.offsets[id as usize] as usize;
        let end = self.offsets[id as usize + 1] as usize;
        self.targets[start..end]
            .iter()
            .copied()
            .zip(self.weights[start..end].iter().copied())
    }

    pub fn contains(&self, key: &NodeKey) -> bool {
        self.key_to_id.contains_key(key)
    }

    pub fn get_compact_id(&self, key: &NodeKey) -> Option<NodeId> {
        self.key_to_id.get(key).copied()
    }

    pub fn key_for_id(&self, id: NodeId) -> &NodeKey {
        &self.keys[id as usize]
    }

    pub fn num_nodes(&self) -> usize {
        self.keys.len()
    }

    pub fn num_edges(&self) -> usize {
        self.targets.len()
    }

    /// Successors of a node, as (node key, weight) pairs.
    pub fn neighbors<'a>(&'a self, key: &NodeKey) -> Box<dyn Iterator<Item = (NodeKey, f32)> + 'a> {
        match self.get_compact_id(key) {
            Some(id) => Box::new(self.neighbors_id_raw(id).map(move |(nid, w)| (self.keys[nid as usize], w))),
            None => Box::new(std::iter::empty()),
        }
    }

    /// Successors of a node by compact id, as (compact id, weight) pairs.
    pub fn neighbors_id(&self, id: NodeId) -> impl Iterator<Item = (NodeId, f32)> + '_ {
        self.neighbors_id_raw(id)
    }

    /// Dense arrays of every genotype reachable from a class node: ids and
    /// 10-allele rows packed for vectorized comparison.
    pub fn class_neighbors(&self, class_key: u128) -> Option<&ClassBlock> {
        self.class_blocks.get(&class_key)
    }

    /// Two-hop neighbors of a subclass node (SUBCLASS -> CLASS -> GENOTYPE):
    /// the concatenation of all class successors' dense blocks, ids and
    /// values both (the matcher needs the ids to identify donor genotypes —
    /// see DESIGN.md for the candidate-discovery shape this supports).
    pub fn neighbors_2nd(&self, subclass_key: u128) -> (Vec<NodeId>, Vec<Genotype>) {
        let mut ids = Vec::new();
        let mut values = Vec::new();
        let Some(subclass_id) = self.get_compact_id(&NodeKey::Subclass(subclass_key)) else {
            return (ids, values);
        };
        for (class_id, _) in self.neighbors_id_raw(subclass_id) {
            if let NodeKey::Class(class_key) = self.keys[class_id as usize] {
                if let Some(block) = self.class_blocks.get(&class_key) {
                    ids.extend_from_slice(&block.ids);
                    values.extend_from_slice(&block.values);
                }
            }
        }
        (ids, values)
    }

    /// Weight of the edge `from_id -> to_key`, or 0.0 if absent.
    pub fn edge_weight(&self, from_id: NodeId, to_key: &NodeKey) -> f32 {
        let Some(to_id) = self.get_compact_id(to_key) else {
            return 0.0;
        };
        self.neighbors_id_raw(from_id)
            .find(|(id, _)| *id == to_id)
            .map(|(_, w)| w)
            .unwrap_or(0.0)
    }

}

pub const GENOTYPE_ARRAY_LEN: usize = GENOTYPE_LEN;
pub type AlleleCode = Allele;

pub use persist::{load, save};

#[cfg(test)]
mod tests {
    use super::*;

    fn geno(vals: [u32; 10]) -> Genotype {
        vals
    }

    #[test]
    fn single_donor_single_genotype_round_trips() {
        let mut builder = GraphBuilder::new();
        let g = geno([101, 201, 702, 801, 701, 702, 201, 301, 301, 701]);
        builder.add_edge(NodeKey::Genotype(g), NodeKey::Donor(1001), 1.0);
        builder.add_edge(NodeKey::Donor(1001), NodeKey::Genotype(g), 1.0);
        let graph = builder.build();

        assert!(graph.contains(&NodeKey::Donor(1001)));
        let neighbors: Vec<_> = graph.neighbors(&NodeKey::Donor(1001)).collect();
        assert_eq!(neighbors, vec![(NodeKey::Genotype(g), 1.0)]);
    }

    #[test]
    fn class_neighbors_returns_dense_block() {
        let mut builder = GraphBuilder::new();
        let g1 = geno([101, 201, 702, 801, 701, 702, 201, 301, 301, 701]);
        let g2 = geno([101, 201, 702, 801, 701, 702, 201, 301, 301, 702]);
        let class1 = crate::encoding::encode_class(&crate::types::class_i(&g1));

        builder.add_edge(NodeKey::Class(class1), NodeKey::Genotype(g1), 0.0);
        builder.add_edge(NodeKey::Class(class1), NodeKey::Genotype(g2), 0.0);
        let graph = builder.build();

        let block = graph.class_neighbors(class1).unwrap();
        assert_eq!(block.ids.len(), 2);
        assert_eq!(block.values.len(), 2);
    }

    #[test]
    fn neighbors_2nd_concatenates_class_blocks() {
        let mut builder = GraphBuilder::new();
        let g1 = geno([101, 201, 702, 801, 701, 702, 201, 301, 301, 701]);
        let class1 = crate::encoding::encode_class(&crate::types::class_i(&g1));
        let subclass = 777u128;

        builder.add_edge(NodeKey::Subclass(subclass), NodeKey::Class(class1), 0.0);
        builder.add_edge(NodeKey::Class(class1), NodeKey::Genotype(g1), 0.0);
        let graph = builder.build();

        let (ids, values) = graph.neighbors_2nd(subclass);
        assert_eq!(ids.len(), 1);
        assert_eq!(values[0], g1);
    }

    #[test]
    fn missing_node_lookups_return_empty_not_error() {
        let graph = GraphBuilder::new().build();
        assert!(!graph.contains(&NodeKey::Donor(9999)));
        assert_eq!(graph.neighbors(&NodeKey::Donor(9999)).count(), 0);
        assert!(graph.class_neighbors(123).is_none());
    }
}
