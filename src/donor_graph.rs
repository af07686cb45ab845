//! Builds the donor index: streams a directory of donor imputation files
//! and turns them into the four-layer donor graph.

use std::collections::HashSet as StdHashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use hashbrown::HashMap;
use tracing::{debug, info};

use crate::encoding::{encode_class, subclass_variants};
use crate::error::{MatchError, Result};
use crate::graph::{Graph, GraphBuilder, NodeKey};
use crate::types::{class_i, class_ii, parse_imputation_line, ClassNum, Genotype};

/// Build a donor graph from every file in `dir`, processed in lexicographic
/// filename order so that repeated builds of the same directory are
/// byte-for-byte reproducible.
pub fn build_donor_graph(dir: &Path) -> Result<Graph> {
    let mut paths: Vec<_> = std::fs::read_dir(dir)
        .map_err(|source| MatchError::Io {
            path: dir.to_path_buf(),
            source,
        })?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .collect();
    paths.sort();

    let mut state = BuildState::default();
    for path in &paths {
        info!(file = %path.display(), "processing donor imputation file");
        process_file(path, &mut state)?;
    }
    state.flush_current_donor();

    info!(
        donors = state.finished_donors.len(),
        genotypes = state.seen_genotypes.len(),
        edges = state.builder.len(),
        "donor graph edge list complete"
    );
    Ok(state.builder.build())
}

#[derive(Default)]
struct BuildState {
    builder: GraphBuilder,
    seen_genotypes: StdHashSet<Genotype>,
    finished_donors: StdHashSet<u64>,
    current_donor: Option<u64>,
    genotype_probs: HashMap<Genotype, f64>,
    total_prob: f64,
    expected_index: u32,
}

impl BuildState {
    fn flush_current_donor(&mut self) {
        let Some(donor_id) = self.current_donor.take() else {
            return;
        };
        self.finished_donors.insert(donor_id);
        if self.total_prob > 0.0 {
            for (genotype, prob_sum) in self.genotype_probs.drain() {
                let weight = (prob_sum / self.total_prob) as f32;
                self.builder
                    .add_edge(NodeKey::Genotype(genotype), NodeKey::Donor(donor_id), weight);
                self.builder
                    .add_edge(NodeKey::Donor(donor_id), NodeKey::Genotype(genotype), weight);
            }
        }
        self.total_prob = 0.0;
        self.expected_index = 0;
    }

    fn register_genotype_if_new(&mut self, genotype: Genotype) {
        if !self.seen_genotypes.insert(genotype) {
            return;
        }

        let class1 = class_i(&genotype);
        let class2 = class_ii(&genotype);
        let class1_key = encode_class(&class1);
        let class2_key = encode_class(&class2);

        self.builder
            .add_edge(NodeKey::Class(class1_key), NodeKey::Genotype(genotype), 0.0);
        self.builder
            .add_edge(NodeKey::Class(class2_key), NodeKey::Genotype(genotype), 0.0);

        for sub in subclass_variants(&class1, ClassNum::I) {
            self.builder
                .add_edge(NodeKey::Subclass(sub.key), NodeKey::Class(class1_key), 0.0);
        }
        for sub in subclass_variants(&class2, ClassNum::Ii) {
            self.builder
                .add_edge(NodeKey::Subclass(sub.key), NodeKey::Class(class2_key), 0.0);
        }
    }
}

fn process_file(path: &Path, state: &mut BuildState) -> Result<()> {
    let file = File::open(path).map_err(|source| MatchError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let reader = BufReader::new(file);

    for (line_no, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| MatchError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if line.trim().is_empty() {
            continue;
        }

        let record = parse_imputation_line(&line).map_err(|reason| MatchError::Parse {
            file: path.to_path_buf(),
            line: line_no + 1,
            reason,
        })?;

        if record.index == 0 {
            state.flush_current_donor();
            if state.finished_donors.contains(&record.owner_id) {
                return Err(MatchError::Structural {
                    file: path.to_path_buf(),
                    line: line_no + 1,
                    reason: format!("donor {} appears in more than one block", record.owner_id),
                });
            }
            state.current_donor = Some(record.owner_id);
        } else {
            match state.current_donor {
                None => {
                    return Err(MatchError::Structural {
                        file: path.to_path_buf(),
                        line: line_no + 1,
                        reason: "donor block does not begin with index 0".to_string(),
                    });
                }
                Some(id) if id != record.owner_id => {
                    return Err(MatchError::Structural {
                        file: path.to_path_buf(),
                        line: line_no + 1,
                        reason: format!(
                            "owner id changed from {id} to {} without a new index-0 row",
                            record.owner_id
                        ),
                    });
                }
                Some(_) => {}
            }
        }

        if record.index != state.expected_index {
            return Err(MatchError::Structural {
                file: path.to_path_buf(),
                line: line_no + 1,
                reason: format!(
                    "expected index {} for donor {}, found {}",
                    state.expected_index, record.owner_id, record.index
                ),
            });
        }
        state.expected_index += 1;

        *state.genotype_probs.entry(record.genotype).or_insert(0.0) += record.probability;
        state.total_prob += record.probability;
        debug!(donor = record.owner_id, index = record.index, "ingested imputation row");

        state.register_genotype_if_new(record.genotype);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, contents: &str) {
        let mut f = File::create(dir.join(name)).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
    }

    const GENO_A: &str = "A*01:01+A*02:01^B*07:02+B*08:01^C*07:01+C*07:02^DQB1*02:01+DQB1*03:01^DRB1*03:01+DRB1*07:01";

    #[test]
    fn single_donor_single_genotype_weight_is_one() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "a.csv", &format!("1001,{GENO_A},1.0,0\n"));

        let graph = build_donor_graph(dir.path()).unwrap();
        let donor_neighbors: Vec<_> = graph.neighbors(&NodeKey::Donor(1001)).collect();
        assert_eq!(donor_neighbors.len(), 1);
        assert!((donor_neighbors[0].1 - 1.0).abs() < 1e-6);
    }

    #[test]
    fn two_genotypes_normalize_probabilities() {
        let dir = tempfile::tempdir().unwrap();
        let geno_b = "A*03:01+A*02:01^B*07:02+B*08:01^C*07:01+C*07:02^DQB1*02:01+DQB1*03:01^DRB1*03:01+DRB1*07:01";
        write_file(
            dir.path(),
            "a.csv",
            &format!("1001,{GENO_A},0.2,0\n1001,{geno_b},0.6,1\n"),
        );

        let graph = build_donor_graph(dir.path()).unwrap();
        let mut weights: Vec<f32> = graph.neighbors(&NodeKey::Donor(1001)).map(|(_, w)| w).collect();
        weights.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert!((weights[0] - 0.25).abs() < 1e-6);
        assert!((weights[1] - 0.75).abs() < 1e-6);
    }

    #[test]
    fn out_of_order_index_is_structural_error() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "a.csv", &format!("1001,{GENO_A},1.0,1\n"));
        let err = build_donor_graph(dir.path()).unwrap_err();
        assert!(matches!(err, MatchError::Structural { .. }));
    }

    #[test]
    fn duplicate_donor_block_is_structural_error() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "a.csv", &format!("1001,{GENO_A},1.0,0\n1001,{GENO_A},1.0,0\n"));
        let err = build_donor_graph(dir.path()).unwrap_err();
        assert!(matches!(err, MatchError::Structural { .. }));
    }

    #[test]
    fn genotype_registers_class_and_subclass_edges() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "a.csv", &format!("1001,{GENO_A},1.0,0\n"));
        let graph = build_donor_graph(dir.path()).unwrap();

        let geno = crate::types::gl_string_to_alleles(GENO_A).unwrap();
        let class1_key = encode_class(&class_i(&geno));
        assert!(graph.contains(&NodeKey::Class(class1_key)));
        let block = graph.class_neighbors(class1_key).unwrap();
        assert_eq!(block.ids.len(), 1);

        for sub in subclass_variants(&class_i(&geno), ClassNum::I) {
            assert!(graph.contains(&NodeKey::Subclass(sub.key)));
        }
    }
}
