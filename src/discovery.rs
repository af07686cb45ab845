//! Three-level candidate discovery: for a patient, finds every donor
//! genotype within 3 mismatches of any of the patient's candidate
//! genotypes, at the cheapest traversal level that can prove it.

use hashbrown::HashMap;

use crate::graph::{Graph, NodeId, NodeKey};
use crate::patient_graph::PatientGraph;
use crate::similarity::similarity_batch;

const MIN_SIMILARITY: u32 = 7;

/// `candidates[donor_geno_id][patient_geno_ordinal] = (patient_geno_prob, similarity)`.
///
/// Insertion always keeps the maximum similarity observed for a given
/// (donor genotype, patient genotype ordinal) pair, so the three discovery
/// levels can run in any order.
#[derive(Debug, Default)]
pub struct Candidates {
    entries: HashMap<NodeId, HashMap<u32, (f64, u32)>>,
}

impl Candidates {
    fn merge(&mut self, donor_geno_id: NodeId, ordinal: u32, prob: f64, similarity: u32) {
        let inner = self.entries.entry(donor_geno_id).or_default();
        let better = match inner.get(&ordinal) {
            Some((_, existing_sim)) => similarity > *existing_sim,
            None => true,
        };
        if better {
            inner.insert(ordinal, (prob, similarity));
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &HashMap<u32, (f64, u32)>)> + '_ {
        self.entries.iter().map(|(id, m)| (*id, m))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Run all three discovery levels against the donor graph for one patient.
pub fn discover_candidates(graph: &Graph, patient: &PatientGraph) -> Candidates {
    let mut candidates = Candidates::default();

    level_a_exact_genotype(graph, patient, &mut candidates);
    level_b_class(graph, patient, &mut candidates);
    level_c_subclass(graph, patient, &mut candidates);

    candidates
}

fn level_a_exact_genotype(graph: &Graph, patient: &PatientGraph, candidates: &mut Candidates) {
    for (ordinal, genotype, prob) in patient.genotypes() {
        let Some(genotype_id) = graph.get_compact_id(&NodeKey::Genotype(genotype)) else {
            continue;
        };
        let has_donor_neighbor = graph
            .neighbors_id(genotype_id)
            .any(|(id, _)| matches!(graph.key_for_id(id), NodeKey::Donor(_)));
        if has_donor_neighbor {
            candidates.merge(genotype_id, ordinal, prob, 10);
        }
    }
}

fn level_b_class(graph: &Graph, patient: &PatientGraph, candidates: &mut Candidates) {
    for (class_key, genotypes) in patient.class_keys() {
        let Some(class_num) = patient.class_num_of(class_key) else {
            continue;
        };
        let Some(block) = graph.class_neighbors(class_key) else {
            continue;
        };
        let baseline = class_num.len() as u32;
        let positions = class_num.uncertain_locus_starts();

        for genotype in genotypes {
            let prob = patient.probability_of(genotype);
            let Some(ordinal) = patient.ordinal_of(genotype) else {
                continue;
            };
            let sims = similarity_batch(genotype, &block.values, positions, baseline);
            for (donor_id, sim) in block.ids.iter().zip(sims) {
                if sim >= MIN_SIMILARITY {
                    candidates.merge(*donor_id, ordinal, prob, sim);
                }
            }
        }
    }
}

fn level_c_subclass(graph: &Graph, patient: &PatientGraph, candidates: &mut Candidates) {
    for sub in patient.subclass_refs() {
        let (ids, values) = graph.neighbors_2nd(sub.key);
        if ids.is_empty() {
            continue;
        }

        let baseline = sub.class_num.len() as u32 - 2;
        let mut positions: Vec<u8> = sub.class_num.uncertain_locus_starts().to_vec();
        positions.push(sub.missing_allele_position);

        for genotype in patient.genotypes_for_subclass(sub.key) {
            let prob = patient.probability_of(genotype);
            let Some(ordinal) = patient.ordinal_of(genotype) else {
                continue;
            };
            let sims = similarity_batch(genotype, &values, &positions, baseline);
            for (donor_id, sim) in ids.iter().zip(sims) {
                if sim >= MIN_SIMILARITY {
                    candidates.merge(*donor_id, ordinal, prob, sim);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;
    use crate::patient_graph::PatientBlock;
    use crate::types::ClassNum;

    const GENO_A: &str = "A*01:01+A*02:01^B*07:02+B*08:01^C*07:01+C*07:02^DQB1*02:01+DQB1*03:01^DRB1*03:01+DRB1*07:01";
    const GENO_B: &str = "A*01:01+A*02:01^B*07:02+B*08:01^C*07:01+C*07:02^DQB1*02:01+DQB1*03:01^DRB1*04:01+DRB1*07:01";

    fn build_donor_graph_for(genotypes: &[&str]) -> Graph {
        use crate::encoding::{encode_class, subclass_variants};
        use crate::types::{class_i, class_ii};

        let mut builder = GraphBuilder::new();
        for (i, gl) in genotypes.iter().enumerate() {
            let g = crate::types::gl_string_to_alleles(gl).unwrap();
            let donor_id = 1000 + i as u64;
            builder.add_edge(NodeKey::Genotype(g), NodeKey::Donor(donor_id), 1.0);
            builder.add_edge(NodeKey::Donor(donor_id), NodeKey::Genotype(g), 1.0);

            let c1 = class_i(&g);
            let c2 = class_ii(&g);
            let c1_key = encode_class(&c1);
            let c2_key = encode_class(&c2);
            builder.add_edge(NodeKey::Class(c1_key), NodeKey::Genotype(g), 0.0);
            builder.add_edge(NodeKey::Class(c2_key), NodeKey::Genotype(g), 0.0);
            for sub in subclass_variants(&c1, ClassNum::I) {
                builder.add_edge(NodeKey::Subclass(sub.key), NodeKey::Class(c1_key), 0.0);
            }
            for sub in subclass_variants(&c2, ClassNum::Ii) {
                builder.add_edge(NodeKey::Subclass(sub.key), NodeKey::Class(c2_key), 0.0);
            }
        }
        builder.build()
    }

    #[test]
    fn exact_match_found_at_level_a() {
        let graph = build_donor_graph_for(&[GENO_A]);
        let patient_geno = crate::types::gl_string_to_alleles(GENO_A).unwrap();
        let block = PatientBlock {
            patient_id: 1,
            genotype_probs: vec![(patient_geno, 1.0)],
            ordinal_zero_genotype: patient_geno,
        };
        let patient = PatientGraph::build(&block);

        let candidates = discover_candidates(&graph, &patient);
        let (_, inner) = candidates.iter().next().unwrap();
        let (_, sim) = inner.values().next().unwrap();
        assert_eq!(*sim, 10);
    }

    #[test]
    fn single_allele_mismatch_found_via_class_or_subclass() {
        let graph = build_donor_graph_for(&[GENO_A]);
        let patient_geno = crate::types::gl_string_to_alleles(GENO_B).unwrap();
        let block = PatientBlock {
            patient_id: 1,
            genotype_probs: vec![(patient_geno, 1.0)],
            ordinal_zero_genotype: patient_geno,
        };
        let patient = PatientGraph::build(&block);

        let candidates = discover_candidates(&graph, &patient);
        assert!(!candidates.is_empty());
        let (_, inner) = candidates.iter().next().unwrap();
        let (_, sim) = inner.values().next().unwrap();
        assert_eq!(*sim, 9);
    }

    #[test]
    fn four_mismatches_produce_no_candidate() {
        let graph = build_donor_graph_for(&[GENO_A]);
        let far = "A*03:01+A*04:01^B*09:01+B*09:02^C*07:01+C*07:02^DQB1*02:01+DQB1*03:01^DRB1*03:01+DRB1*07:01";
        let patient_geno = crate::types::gl_string_to_alleles(far).unwrap();
        let block = PatientBlock {
            patient_id: 1,
            genotype_probs: vec![(patient_geno, 1.0)],
            ordinal_zero_genotype: patient_geno,
        };
        let patient = PatientGraph::build(&block);

        let candidates = discover_candidates(&graph, &patient);
        assert!(candidates.is_empty());
    }
}
