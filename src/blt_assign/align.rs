//! Global alignment of a guide against an observed target and the derived
//! mismatch/indel annotation.

use bio::alignment::pairwise::Aligner;
use bio::alignment::{AlignmentMode, AlignmentOperation};

// Scoring tuned so that equal-length alignments only rarely resolve into
// spurious indel pairs.
pub const MATCH_SCORE: i32 = 4;
pub const MISMATCH_SCORE: i32 = -2;
pub const GAP_OPEN: i32 = -5;
pub const GAP_EXTEND: i32 = -2;

/// Annotation of one guide/target pair derived from the alignment's
/// operation sequence. Mismatch positions are 1-based and counted from the
/// PAM-adjacent end for a 3'-PAM enzyme; they are dropped entirely when the
/// alignment contains any indel.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetAnnotation {
    cigar: String,
    pam_is_5prime_of_target: bool,
    mismatches: usize,
    indel_bases: usize,
    mismatch_positions: Vec<usize>,
    mismatch_tuples: Vec<(usize, u8, u8)>,
    mean_mismatch_position: Option<f64>,
    padded_guide: String,
    alignment: String,
    padded_target: String,
}

impl TargetAnnotation {
    pub fn new(guide: &[u8], target: &[u8], pam_is_5prime_of_target: bool) -> Self {
        let score = |a: u8, b: u8| {
            if a == b {
                MATCH_SCORE
            } else {
                MISMATCH_SCORE
            }
        };
        let mut aligner =
            Aligner::with_capacity(guide.len(), target.len(), GAP_OPEN, GAP_EXTEND, score);
        let mut alignment = aligner.global(guide, target);
        // Newer bio-types versions refuse to compute a CIGAR for `AlignmentMode::Global`
        // even though the underlying algorithm is mode-agnostic once clipping is absent
        // (which it always is here, since `global()` disables all clip penalties).
        // Relabel as Semiglobal so `cigar()` runs its normal (mode-independent) logic.
        alignment.mode = AlignmentMode::Semiglobal;

        let mut mismatches = 0;
        let mut indel_bases = 0;
        let mut raw_positions = Vec::new();
        let mut raw_tuples = Vec::new();
        let mut padded_guide = String::with_capacity(alignment.operations.len());
        let mut track = String::with_capacity(alignment.operations.len());
        let mut padded_target = String::with_capacity(alignment.operations.len());

        let mut guide_pos = 0;
        let mut target_pos = 0;
        for op in alignment.operations.iter() {
            match op {
                AlignmentOperation::Match => {
                    padded_guide.push(guide[guide_pos] as char);
                    track.push('|');
                    padded_target.push(target[target_pos] as char);
                    guide_pos += 1;
                    target_pos += 1;
                }
                AlignmentOperation::Subst => {
                    mismatches += 1;
                    raw_positions.push(guide_pos + 1);
                    raw_tuples.push((guide_pos + 1, guide[guide_pos], target[target_pos]));
                    padded_guide.push(guide[guide_pos] as char);
                    track.push('.');
                    padded_target.push(target[target_pos] as char);
                    guide_pos += 1;
                    target_pos += 1;
                }
                AlignmentOperation::Ins => {
                    indel_bases += 1;
                    padded_guide.push(guide[guide_pos] as char);
                    track.push(' ');
                    padded_target.push('-');
                    guide_pos += 1;
                }
                AlignmentOperation::Del => {
                    indel_bases += 1;
                    padded_guide.push('-');
                    track.push(' ');
                    padded_target.push(target[target_pos] as char);
                    target_pos += 1;
                }
                other => panic!("unexpected alignment operation {:?}", other),
            }
        }

        let (mismatch_positions, mismatch_tuples) = if indel_bases > 0 {
            (Vec::new(), Vec::new())
        } else if pam_is_5prime_of_target {
            (raw_positions, raw_tuples)
        } else {
            // Renumber from the PAM-adjacent end so position 1 abuts the PAM.
            let len = guide.len();
            let mut positions: Vec<usize> = raw_positions.iter().map(|p| len - p + 1).collect();
            positions.reverse();
            let mut tuples: Vec<(usize, u8, u8)> = raw_tuples
                .iter()
                .map(|&(p, g, t)| (len - p + 1, g, t))
                .collect();
            tuples.reverse();
            (positions, tuples)
        };

        let mean_mismatch_position = if mismatch_positions.is_empty() {
            None
        } else {
            let total: usize = mismatch_positions.iter().sum();
            Some(total as f64 / mismatch_positions.len() as f64)
        };

        TargetAnnotation {
            cigar: alignment.cigar(false),
            pam_is_5prime_of_target: pam_is_5prime_of_target,
            mismatches: mismatches,
            indel_bases: indel_bases,
            mismatch_positions: mismatch_positions,
            mismatch_tuples: mismatch_tuples,
            mean_mismatch_position: mean_mismatch_position,
            padded_guide: padded_guide,
            alignment: track,
            padded_target: padded_target,
        }
    }

    pub fn cigar(&self) -> &str {
        &self.cigar
    }

    pub fn pam_is_5prime_of_target(&self) -> bool {
        self.pam_is_5prime_of_target
    }

    pub fn mismatches(&self) -> usize {
        self.mismatches
    }

    pub fn indel_bases(&self) -> usize {
        self.indel_bases
    }

    pub fn mismatch_positions(&self) -> &[usize] {
        &self.mismatch_positions
    }

    pub fn mean_mismatch_position(&self) -> Option<f64> {
        self.mean_mismatch_position
    }

    /// Mismatches as `[pos:guide>target,...]`, `[]` when none survive.
    pub fn mismatch_tuples_string(&self) -> String {
        let fields: Vec<String> = self
            .mismatch_tuples
            .iter()
            .map(|&(pos, guide, target)| format!("{}:{}>{}", pos, guide as char, target as char))
            .collect();
        format!("[{}]", fields.join(","))
    }

    pub fn padded_guide(&self) -> &str {
        &self.padded_guide
    }

    pub fn alignment(&self) -> &str {
        &self.alignment
    }

    pub fn padded_target(&self) -> &str {
        &self.padded_target
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GUIDE: &[u8] = b"GGCCTCCCCAAAGCCTGGCCA";

    #[test]
    fn identical_target() {
        let ann = TargetAnnotation::new(GUIDE, GUIDE, false);
        assert_eq!(ann.cigar(), "21=");
        assert_eq!(ann.mismatches(), 0);
        assert_eq!(ann.indel_bases(), 0);
        assert!(ann.mismatch_positions().is_empty());
        assert_eq!(ann.mean_mismatch_position(), None);
        assert_eq!(ann.mismatch_tuples_string(), "[]");
        assert_eq!(ann.padded_guide(), ann.padded_target());
        assert_eq!(ann.alignment(), "|".repeat(21));
    }

    #[test]
    fn three_substitutions_pam_3prime() {
        let ann = TargetAnnotation::new(GUIDE, b"GGACTCCCCATAGCCTGGCCG", false);
        assert_eq!(ann.cigar(), "2=1X7=1X9=1X");
        assert_eq!(ann.mismatches(), 3);
        assert_eq!(ann.indel_bases(), 0);
        assert_eq!(ann.mismatch_positions(), &[1, 11, 19]);
        let mean = ann.mean_mismatch_position().unwrap();
        assert!((mean - 10.3333).abs() < 1e-4);
        assert_eq!(ann.mismatch_tuples_string(), "[1:A>G,11:A>T,19:C>A]");
    }

    #[test]
    fn three_substitutions_pam_5prime_keeps_order() {
        let ann = TargetAnnotation::new(GUIDE, b"GGACTCCCCATAGCCTGGCCG", true);
        assert_eq!(ann.mismatch_positions(), &[3, 11, 21]);
        assert_eq!(ann.mismatch_tuples_string(), "[3:C>A,11:A>T,21:A>G]");
    }

    #[test]
    fn indel_suppresses_positions() {
        let ann = TargetAnnotation::new(GUIDE, b"GGCACTCCCCAAAGCCTGCCCA", false);
        assert_eq!(ann.cigar(), "3=1D14=1X3=");
        assert_eq!(ann.indel_bases(), 1);
        assert_eq!(ann.mismatches(), 1);
        assert!(ann.mismatch_positions().is_empty());
        assert_eq!(ann.mean_mismatch_position(), None);
        assert_eq!(ann.mismatch_tuples_string(), "[]");
        assert_eq!(ann.padded_guide(), "GGC-CTCCCCAAAGCCTGGCCA");
        assert_eq!(ann.padded_target(), "GGCACTCCCCAAAGCCTGCCCA");
        assert_eq!(ann.alignment().len(), ann.padded_guide().len());
    }

    #[test]
    fn insertion_and_deletion_both_count() {
        // One base missing and one extra base elsewhere sum to two indel
        // bases, not zero.
        let ann = TargetAnnotation::new(b"AAAACCCCGGGGTTTT", b"AAACCCCGGGGTTTTA", false);
        assert_eq!(ann.indel_bases(), 2);
        assert_eq!(ann.mismatches(), 0);
        assert!(ann.mismatch_positions().is_empty());
        assert_eq!(ann.mean_mismatch_position(), None);
    }
}
