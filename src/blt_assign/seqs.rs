//! Primitive operations on raw base and quality byte slices.

const PHRED_OFFSET: u8 = 33;

/// Counts mismatching positions between `lhs[lhs_start..lhs_start+length]`
/// and `rhs[rhs_start..rhs_start+length]`, returning early once the count
/// reaches `max`. Panics when either range runs past its slice.
pub fn mismatches(
    lhs: &[u8],
    lhs_start: usize,
    rhs: &[u8],
    rhs_start: usize,
    length: usize,
    max: usize,
) -> usize {
    assert!(
        lhs_start + length <= lhs.len(),
        "mismatch range {}..{} outside left sequence of length {}",
        lhs_start,
        lhs_start + length,
        lhs.len()
    );
    assert!(
        rhs_start + length <= rhs.len(),
        "mismatch range {}..{} outside right sequence of length {}",
        rhs_start,
        rhs_start + length,
        rhs.len()
    );

    let mut count = 0;
    for i in 0..length {
        if lhs[lhs_start + i] != rhs[rhs_start + i] {
            count += 1;
            if count >= max {
                return count;
            }
        }
    }
    count
}

pub fn is_valid_base(base: u8, allow_ambiguity: bool) -> bool {
    if allow_ambiguity {
        b"ACGTRYSWKMBDHVN".contains(&base)
    } else {
        b"ACGT".contains(&base)
    }
}

pub fn are_valid_bases(bases: &[u8], allow_ambiguity: bool) -> bool {
    bases.iter().all(|&b| is_valid_base(b, allow_ambiguity))
}

/// Mean of the PHRED+33 decoded qualities, 0.0 for an empty slice.
pub fn mean_quality(quals: &[u8]) -> f64 {
    if quals.is_empty() {
        return 0.0;
    }
    let total: usize = quals.iter().map(|&q| (q - PHRED_OFFSET) as usize).sum();
    total as f64 / quals.len() as f64
}
