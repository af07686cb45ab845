//! Builds the in-memory, single-patient mirror of the donor graph's
//! structure: just enough to drive candidate discovery, discarded once the
//! patient has been scored.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use hashbrown::HashMap;

use crate::encoding::{encode_class, subclass_variants};
use crate::error::{MatchError, Result};
use crate::types::{class_i, class_ii, parse_imputation_line, ClassNum, Genotype, SubclassRef};

/// One patient's parsed, not-yet-normalized imputation rows.
pub struct PatientBlock {
    pub patient_id: u64,
    pub genotype_probs: Vec<(Genotype, f64)>,
    /// The genotype parsed at `index == 0`, i.e. the first row of this
    /// patient's block. This is the genotype the original system reports
    /// results against — it never reassigns its representative genotype for
    /// later ordinals in the same block, regardless of their probability.
    pub ordinal_zero_genotype: Genotype,
}

/// Stream a directory of patient imputation files (same format as donor
/// files) into per-patient blocks, in lexicographic filename order.
pub fn load_patient_blocks(dir: &Path) -> Result<Vec<PatientBlock>> {
    let mut paths: Vec<_> = std::fs::read_dir(dir)
        .map_err(|source| MatchError::Io {
            path: dir.to_path_buf(),
            source,
        })?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .collect();
    paths.sort();

    let mut blocks = Vec::new();
    let mut current: Option<(u64, HashMap<Genotype, f64>, u32, Genotype)> = None;

    for path in &paths {
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
                if let Some((id, probs, _, ordinal_zero_genotype)) = current.take() {
                    blocks.push(PatientBlock {
                        patient_id: id,
                        genotype_probs: probs.into_iter().collect(),
                        ordinal_zero_genotype,
                    });
                }
                current = Some((record.owner_id, HashMap::new(), 0, record.genotype));
            }

            let Some((id, probs, expected_index, _)) = current.as_mut() else {
                return Err(MatchError::Structural {
                    file: path.to_path_buf(),
                    line: line_no + 1,
                    reason: "patient block does not begin with index 0".to_string(),
                });
            };
            if *id != record.owner_id {
                return Err(MatchError::Structural {
                    file: path.to_path_buf(),
                    line: line_no + 1,
                    reason: format!("owner id changed from {id} to {} without a new index-0 row", record.owner_id),
                });
            }
            if record.index != *expected_index {
                return Err(MatchError::Structural {
                    file: path.to_path_buf(),
                    line: line_no + 1,
                    reason: format!("expected index {expected_index} for patient {id}, found {}", record.index),
                });
            }
            *expected_index += 1;
            *probs.entry(record.genotype).or_insert(0.0) += record.probability;
        }
    }

    if let Some((id, probs, _, ordinal_zero_genotype)) = current.take() {
        blocks.push(PatientBlock {
            patient_id: id,
            genotype_probs: probs.into_iter().collect(),
            ordinal_zero_genotype,
        });
    }

    Ok(blocks)
}

/// The purpose-built maps candidate discovery needs for one patient: no
/// generic attributed multigraph, just genotype probabilities plus the
/// class/subclass keys the patient's genotypes touch.
pub struct PatientGraph {
    patient_id: u64,
    ordinal_zero_genotype: Genotype,
    genotype_prob: HashMap<Genotype, f64>,
    ordinal_of: HashMap<Genotype, u32>,
    genotypes_by_ordinal: Vec<Genotype>,
    class_to_genotypes: HashMap<u128, Vec<Genotype>>,
    class_num_of_key: HashMap<u128, ClassNum>,
    subclass_to_genotypes: HashMap<u128, Vec<Genotype>>,
    subclass_refs: HashMap<u128, SubclassRef>,
}

impl PatientGraph {
    pub fn build(block: &PatientBlock) -> Self {
        let total_prob: f64 = block.genotype_probs.iter().map(|(_, p)| p).sum();

        let mut genotype_prob = HashMap::new();
        let mut ordinal_of = HashMap::new();
        let mut genotypes_by_ordinal = Vec::new();
        let mut class_to_genotypes: HashMap<u128, Vec<Genotype>> = HashMap::new();
        let mut class_num_of_key: HashMap<u128, ClassNum> = HashMap::new();
        let mut subclass_to_genotypes: HashMap<u128, Vec<Genotype>> = HashMap::new();
        let mut subclass_refs: HashMap<u128, SubclassRef> = HashMap::new();

        for (ordinal, (genotype, raw_prob)) in block.genotype_probs.iter().enumerate() {
            let normalized = if total_prob > 0.0 { raw_prob / total_prob } else { 0.0 };
            genotype_prob.insert(*genotype, normalized);
            ordinal_of.insert(*genotype, ordinal as u32);
            genotypes_by_ordinal.push(*genotype);

            let class1 = class_i(genotype);
            let class2 = class_ii(genotype);
            let class1_key = encode_class(&class1);
            let class2_key = encode_class(&class2);
            class_to_genotypes.entry(class1_key).or_default().push(*genotype);
            class_to_genotypes.entry(class2_key).or_default().push(*genotype);
            class_num_of_key.insert(class1_key, ClassNum::I);
            class_num_of_key.insert(class2_key, ClassNum::Ii);

            for sub in subclass_variants(&class1, ClassNum::I) {
                subclass_to_genotypes.entry(sub.key).or_default().push(*genotype);
                subclass_refs.insert(sub.key, sub);
            }
            for sub in subclass_variants(&class2, ClassNum::Ii) {
                subclass_to_genotypes.entry(sub.key).or_default().push(*genotype);
                subclass_refs.insert(sub.key, sub);
            }
        }

        PatientGraph {
            patient_id: block.patient_id,
            ordinal_zero_genotype: block.ordinal_zero_genotype,
            genotype_prob,
            ordinal_of,
            genotypes_by_ordinal,
            class_to_genotypes,
            class_num_of_key,
            subclass_to_genotypes,
            subclass_refs,
        }
    }

    pub fn patient_id(&self) -> u64 {
        self.patient_id
    }

    /// The genotype reported against for `Match_Probability_*` and
    /// `Match_Between_Most_Commons_*` columns: the genotype parsed at
    /// `index == 0`, never reassigned based on probability.
    pub fn ordinal_zero_genotype(&self) -> Genotype {
        self.ordinal_zero_genotype
    }

    pub fn genotypes(&self) -> impl Iterator<Item = (u32, Genotype, f64)> + '_ {
        self.genotypes_by_ordinal.iter().map(move |g| {
            let ordinal = self.ordinal_of[g];
            (ordinal, *g, self.genotype_prob[g])
        })
    }

    pub fn probability_of(&self, genotype: &Genotype) -> f64 {
        self.genotype_prob.get(genotype).copied().unwrap_or(0.0)
    }

    pub fn ordinal_of(&self, genotype: &Genotype) -> Option<u32> {
        self.ordinal_of.get(genotype).copied()
    }

    pub fn class_keys(&self) -> impl Iterator<Item = (u128, &[Genotype])> + '_ {
        self.class_to_genotypes.iter().map(|(k, v)| (*k, v.as_slice()))
    }

    pub fn genotypes_for_class(&self, class_key: u128) -> &[Genotype] {
        self.class_to_genotypes.get(&class_key).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn class_num_of(&self, class_key: u128) -> Option<ClassNum> {
        self.class_num_of_key.get(&class_key).copied()
    }

    pub fn subclass_refs(&self) -> impl Iterator<Item = &SubclassRef> + '_ {
        self.subclass_refs.values()
    }

    pub fn genotypes_for_subclass(&self, subclass_key: u128) -> &[Genotype] {
        self.subclass_to_genotypes
            .get(&subclass_key)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }
}
