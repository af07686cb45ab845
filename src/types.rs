//! Core genetic data types: alleles, genotypes, and the HLA class/subclass
//! vocabulary the donor index is built from.

use serde::{Deserialize, Serialize};

/// A single HLA allele code. Zero is reserved as the "missing allele"
/// sentinel used by subclass keys.
pub type Allele = u32;

/// Five HLA loci, two alleles each, in the fixed order A, B, C, DQB1, DRB1.
pub const NUM_LOCI: usize = 5;
pub const GENOTYPE_LEN: usize = 10;
pub const CLASS_I_LEN: usize = 6;
pub const CLASS_II_LEN: usize = 4;

/// Loci 0-2 (positions 0-5): Class I. Loci 3-4 (positions 6-9): Class II.
pub const CLASS_I_END: usize = CLASS_I_LEN;

pub const LOCUS_NAMES: [&str; NUM_LOCI] = ["A", "B", "C", "DQB1", "DRB1"];

/// A 10-allele genotype across the five loci, each locus pair sorted
/// ascending. All genotypes stored in the graph are kept in this canonical
/// form so identical genotypes always hash and compare equal.
pub type Genotype = [Allele; GENOTYPE_LEN];

/// Sort each locus's two alleles ascending in place.
pub fn canonicalize(genotype: &mut Genotype) {
    for locus in 0..NUM_LOCI {
        let (a, b) = (genotype[2 * locus], genotype[2 * locus + 1]);
        if a > b {
            genotype[2 * locus] = b;
            genotype[2 * locus + 1] = a;
        }
    }
}

pub fn class_i(genotype: &Genotype) -> [Allele; CLASS_I_LEN] {
    genotype[0..CLASS_I_END].try_into().unwrap()
}

pub fn class_ii(genotype: &Genotype) -> [Allele; CLASS_II_LEN] {
    genotype[CLASS_I_END..GENOTYPE_LEN].try_into().unwrap()
}

/// Which HLA class a class/subclass key belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ClassNum {
    I = 0,
    Ii = 1,
}

impl ClassNum {
    pub fn len(self) -> usize {
        match self {
            ClassNum::I => CLASS_I_LEN,
            ClassNum::Ii => CLASS_II_LEN,
        }
    }

    /// Offset of this class's first allele within a full 10-allele genotype.
    pub fn genotype_offset(self) -> usize {
        match self {
            ClassNum::I => 0,
            ClassNum::Ii => CLASS_I_END,
        }
    }

    /// Locus positions (global, within the 10-allele genotype) whose match
    /// is *not* guaranteed once this class matches — i.e. the other class's
    /// locus starts.
    pub fn uncertain_locus_starts(self) -> &'static [u8] {
        match self {
            ClassNum::I => &[6, 8],
            ClassNum::Ii => &[0, 2, 4],
        }
    }
}

/// A class tuple with one allele dropped, canonicalized so the zero sentinel
/// sits in the second position of its locus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubclassRef {
    pub key: u128,
    pub class_num: ClassNum,
    /// Genotype-global start position of the locus the zero replaced,
    /// one of {0, 2, 4, 6, 8}.
    pub missing_allele_position: u8,
}

/// One parsed line of an imputation file: an owner id (donor or patient), a
/// canonicalized genotype, a raw probability, and the 0-based ordinal of the
/// genotype within the owner's block.
#[derive(Debug, Clone, PartialEq)]
pub struct ImputationRecord {
    pub owner_id: u64,
    pub genotype: Genotype,
    pub probability: f64,
    pub index: u32,
}

/// Parse a GL string of the form
/// `A*01:01+A*02:01^B*07:02+B*08:01^C*...^DQB1*...^DRB1*...`
/// into ten integer allele codes, one pair per locus in fixed locus order.
///
/// Each allele token's numeric fields (after the locus name and `*`) are
/// packed into a single integer: `01:01` -> `101`, `01:01:01` -> `10101`,
/// so that two-field and three-field resolutions never collide as long as
/// each field stays below 100 (true of all current HLA nomenclature).
pub fn gl_string_to_alleles(gl: &str) -> Result<Genotype, String> {
    let loci: Vec<&str> = gl.split('^').collect();
    if loci.len() != NUM_LOCI {
        return Err(format!(
            "expected {} loci separated by '^', found {}",
            NUM_LOCI,
            loci.len()
        ));
    }

    let mut genotype: Genotype = [0; GENOTYPE_LEN];
    for (locus_idx, locus_str) in loci.iter().enumerate() {
        let alleles: Vec<&str> = locus_str.split('+').collect();
        if alleles.len() != 2 {
            return Err(format!(
                "locus '{locus_str}' does not have exactly two alleles joined by '+'"
            ));
        }
        for (pair_idx, allele_str) in alleles.iter().enumerate() {
            genotype[2 * locus_idx + pair_idx] = parse_allele_token(allele_str)?;
        }
    }

    Ok(genotype)
}

fn parse_allele_token(token: &str) -> Result<Allele, String> {
    let (_name, fields) = token
        .split_once('*')
        .ok_or_else(|| format!("allele token '{token}' missing '*'"))?;

    let mut packed: u64 = 0;
    for field in fields.split(':') {
        let value: u64 = field
            .parse()
            .map_err(|_| format!("allele field '{field}' in '{token}' is not numeric"))?;
        if value >= 100 {
            return Err(format!(
                "allele field '{field}' in '{token}' exceeds the two-digit packing width"
            ));
        }
        packed = packed * 100 + value;
    }

    Allele::try_from(packed).map_err(|_| format!("allele token '{token}' overflows u32"))
}

/// Parse one CSV line of an imputation file: `owner_id,genotype,probability,index`.
pub fn parse_imputation_line(line: &str) -> Result<ImputationRecord, String> {
    let fields: Vec<&str> = line.split(',').collect();
    if fields.len() != 4 {
        return Err(format!(
            "expected 4 comma-separated fields, found {}",
            fields.len()
        ));
    }

    let owner_id: u64 = fields[0]
        .trim()
        .parse()
        .map_err(|_| format!("invalid owner id '{}'", fields[0]))?;

    let mut genotype = gl_string_to_alleles(fields[1].trim())?;
    canonicalize(&mut genotype);

    let probability: f64 = fields[2]
        .trim()
        .parse()
        .map_err(|_| format!("invalid probability '{}'", fields[2]))?;
    if !(0.0..=1.0).contains(&probability) || probability <= 0.0 {
        return Err(format!("probability '{probability}' out of range (0, 1]"));
    }

    let index: u32 = fields[3]
        .trim()
        .parse()
        .map_err(|_| format!("invalid index '{}'", fields[3]))?;

    Ok(ImputationRecord {
        owner_id,
        genotype,
        probability,
        index,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_gl_string_in_locus_order() {
        let gl = "A*01:01+A*02:01^B*07:02+B*08:01^C*07:01+C*07:02^DQB1*02:01+DQB1*03:01^DRB1*03:01+DRB1*07:01";
        let geno = gl_string_to_alleles(gl).unwrap();
        assert_eq!(geno.len(), GENOTYPE_LEN);
        // A*01:01 -> 101, A*02:01 -> 201
        assert_eq!(geno[0], 101);
        assert_eq!(geno[1], 201);
    }

    #[test]
    fn canonicalize_sorts_each_locus_pair() {
        let mut geno = [201, 101, 0, 0, 0, 0, 0, 0, 0, 0];
        canonicalize(&mut geno);
        assert_eq!(geno[0], 101);
        assert_eq!(geno[1], 201);
    }

    #[test]
    fn rejects_wrong_locus_count() {
        assert!(gl_string_to_alleles("A*01:01+A*02:01").is_err());
    }

    #[test]
    fn parse_line_rejects_bad_probability() {
        let line = "1001,A*01:01+A*02:01^B*07:02+B*08:01^C*07:01+C*07:02^DQB1*02:01+DQB1*03:01^DRB1*03:01+DRB1*07:01,0,0";
        assert!(parse_imputation_line(line).is_err());
    }

    #[test]
    fn class_i_and_class_ii_split_at_six() {
        let geno: Genotype = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10];
        assert_eq!(class_i(&geno), [1, 2, 3, 4, 5, 6]);
        assert_eq!(class_ii(&geno), [7, 8, 9, 10]);
    }
}
