//! Aggregates candidate similarities into joint match probabilities per
//! donor, ranks them, and builds the result rows for one patient.

use hashbrown::{HashMap, HashSet};

use crate::discovery::Candidates;
use crate::donor_db::DonorInfoTable;
use crate::graph::{Graph, NodeKey};
use crate::patient_graph::PatientGraph;
use crate::similarity::similarity_one;
use crate::types::{LOCUS_NAMES, NUM_LOCI};

/// Scoring knobs, all configurable (`Config`): how many results to return
/// per patient and the minimum joint probability to count as a match.
#[derive(Debug, Clone, Copy)]
pub struct ScoreParams {
    pub cutoff: usize,
    pub threshold: f64,
}

impl Default for ScoreParams {
    fn default() -> Self {
        ScoreParams {
            cutoff: 100,
            threshold: 0.1,
        }
    }
}

/// One emitted row of the result table for a single patient.
#[derive(Debug, Clone)]
pub struct ResultRow {
    pub patient_id: u64,
    pub donor_id: u64,
    pub number_of_mismatches: u32,
    pub matching_probability: f64,
    pub match_probability_per_allele: [f64; 10],
    pub permissive: &'static str,
    pub match_between_most_commons: [u32; NUM_LOCI],
    pub aux_columns: Vec<(String, String)>,
}

struct DonorScore {
    joint_prob: f64,
    best_geno_id: crate::graph::NodeId,
    best_donor_weight: f32,
}

/// Score and rank a patient's candidates against the donor graph, emitting
/// result rows for mismatch levels 0..=3 in ascending order, filtered and
/// cut off per `params`.
pub fn score_and_rank(
    graph: &Graph,
    patient: &PatientGraph,
    candidates: &Candidates,
    params: &ScoreParams,
    donor_info: Option<&DonorInfoTable>,
    aux_columns: &[String],
) -> Vec<ResultRow> {
    let mut results = Vec::new();
    let mut matched_donors: HashSet<u64> = HashSet::new();

    for mismatches in 0..=3u32 {
        if results.len() >= params.cutoff {
            break;
        }
        let target_similarity = 10 - mismatches;
        let mut donor_scores: HashMap<u64, DonorScore> = HashMap::new();

        for (donor_geno_id, ordinal_map) in candidates.iter() {
            for (_, (pat_prob, sim)) in ordinal_map.iter() {
                if *sim != target_similarity {
                    continue;
                }
                for (neighbor_key, weight) in graph.neighbors(&key_for(graph, donor_geno_id)) {
                    let NodeKey::Donor(donor_id) = neighbor_key else {
                        continue;
                    };
                    let add = pat_prob * weight as f64;
                    let entry = donor_scores.entry(donor_id).or_insert(DonorScore {
                        joint_prob: 0.0,
                        best_geno_id: donor_geno_id,
                        best_donor_weight: 0.0,
                    });
                    entry.joint_prob += add;
                    if weight > entry.best_donor_weight {
                        entry.best_donor_weight = weight;
                        entry.best_geno_id = donor_geno_id;
                    }
                }
            }
        }

        let mut ranked: Vec<(u64, DonorScore)> = donor_scores
            .into_iter()
            .filter(|(donor_id, score)| !matched_donors.contains(donor_id) && score.joint_prob >= params.threshold)
            .collect();
        ranked.sort_by(|a, b| {
            b.1.joint_prob
                .partial_cmp(&a.1.joint_prob)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });

        for (donor_id, score) in ranked {
            if results.len() >= params.cutoff {
                break;
            }
            matched_donors.insert(donor_id);
            results.push(build_row(graph, patient, donor_id, &score, mismatches, donor_info, aux_columns));
        }
    }

    results
}

fn key_for(graph: &Graph, id: crate::graph::NodeId) -> NodeKey {
    *graph.key_for_id(id)
}

fn build_row(
    graph: &Graph,
    patient: &PatientGraph,
    donor_id: u64,
    score: &DonorScore,
    mismatches: u32,
    donor_info: Option<&DonorInfoTable>,
    aux_columns: &[String],
) -> ResultRow {
    let representative_patient_genotype = patient.ordinal_zero_genotype();

    let mut match_probability_per_allele = [0.0f64; 10];
    for (position, slot) in match_probability_per_allele.iter_mut().enumerate() {
        let patient_allele = representative_patient_genotype[position];
        let mut prob = 0.0;
        for (neighbor_key, weight) in graph.neighbors(&NodeKey::Donor(donor_id)) {
            if let NodeKey::Genotype(g) = neighbor_key {
                if g.contains(&patient_allele) {
                    prob += weight as f64;
                }
            }
        }
        *slot = (prob * 100.0).round();
    }

    let best_genotype = graph
        .key_for_id(score.best_geno_id)
        .as_genotype()
        .copied()
        .unwrap_or([0; 10]);

    let mut match_between_most_commons = [0u32; NUM_LOCI];
    for locus in 0..NUM_LOCI {
        let k = (2 * locus) as u8;
        match_between_most_commons[locus] = similarity_one(&representative_patient_genotype, &best_genotype, &[k], 0);
    }

    let aux = aux_columns
        .iter()
        .map(|col| {
            let value = donor_info
                .and_then(|table| table.lookup(donor_id, col))
                .unwrap_or_default();
            (col.clone(), value)
        })
        .collect();

    ResultRow {
        patient_id: patient.patient_id(),
        donor_id,
        number_of_mismatches: mismatches,
        matching_probability: score.joint_prob * 100.0,
        match_probability_per_allele,
        permissive: "-",
        match_between_most_commons,
        aux_columns: aux,
    }
}

pub fn locus_column_name(locus: usize, pair: usize) -> String {
    format!("Match_Probability_{}_{}", LOCUS_NAMES[locus], pair + 1)
}
