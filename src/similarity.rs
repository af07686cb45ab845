//! Counts matching alleles between a patient genotype and a block of
//! candidate donor genotypes, with per-locus pair-swap tolerance.

use rayon::prelude::*;

use crate::types::Genotype;

const MAX_SIMILARITY: u32 = 10;

/// `pair_match` for one locus start position `k`: try both the ordered and
/// swapped pairing of the locus's two alleles and keep the larger count.
/// The canonical ascending-per-locus sort makes the ordered pairing win
/// whenever both genotypes are already canonicalized; the swapped check is
/// purely defensive against inputs that were not canonicalized upstream.
#[inline]
fn pair_match(p: &Genotype, v: &Genotype, k: usize) -> u32 {
    let ordered = (p[k] == v[k]) as u32 + (p[k + 1] == v[k + 1]) as u32;
    let swapped = (p[k] == v[k + 1]) as u32 + (p[k + 1] == v[k]) as u32;
    ordered.max(swapped)
}

/// Similarity of one patient genotype against one candidate, restricted to
/// the given locus-start positions and added to `baseline`.
pub fn similarity_one(p: &Genotype, v: &Genotype, positions: &[u8], baseline: u32) -> u32 {
    let extra: u32 = positions.iter().map(|&k| pair_match(p, v, k as usize)).sum();
    (baseline + extra).min(MAX_SIMILARITY)
}

/// Similarity of `p` against every row of `candidates`, run in parallel —
/// this is the hot path for Level B/C candidate discovery where a class or
/// subclass block can hold thousands of donor genotypes.
pub fn similarity_batch(p: &Genotype, candidates: &[Genotype], positions: &[u8], baseline: u32) -> Vec<u32> {
    candidates
        .par_iter()
        .map(|v| similarity_one(p, v, positions, baseline))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geno(vals: [u32; 10]) -> Genotype {
        vals
    }

    #[test]
    fn identical_genotype_scores_ten() {
        let p = geno([101, 201, 702, 801, 701, 702, 201, 301, 301, 701]);
        let positions: Vec<u8> = (0..10).step_by(2).collect();
        assert_eq!(similarity_one(&p, &p, &positions, 0), 10);
    }

    #[test]
    fn swapped_pair_still_matches() {
        let p = geno([101, 201, 702, 801, 701, 702, 201, 301, 301, 701]);
        let mut v = p;
        v.swap(0, 1);
        assert_eq!(similarity_one(&p, &v, &[0], 0), 2);
    }

    #[test]
    fn mismatch_reduces_similarity() {
        let p = geno([101, 201, 702, 801, 701, 702, 201, 301, 301, 701]);
        let mut v = p;
        v[8] = 401; // DRB1 first allele differs
        assert_eq!(similarity_one(&p, &v, &[8], 0), 1);
    }

    #[test]
    fn batch_matches_scalar_per_row() {
        let p = geno([101, 201, 702, 801, 701, 702, 201, 301, 301, 701]);
        let mut v2 = p;
        v2[8] = 401;
        let rows = vec![p, v2];
        let positions: Vec<u8> = vec![8];
        let results = similarity_batch(&p, &rows, &positions, 9);
        assert_eq!(results, vec![10, 10]);
    }

    #[test]
    fn similarity_is_capped_at_ten() {
        let p = geno([101, 201, 702, 801, 701, 702, 201, 301, 301, 701]);
        let positions: Vec<u8> = (0..10).step_by(2).collect();
        assert_eq!(similarity_one(&p, &p, &positions, 6), 10);
    }
}
