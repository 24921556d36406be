//! Assignment of reads to samples by their sample barcode.

use crate::manifest::SampleManifest;
use crate::seqs;

/// Matches a barcode window in a read against every sample barcode. A read
/// is assigned only when the best barcode is both close enough in absolute
/// terms (`max_mismatches`) and clear of the next-best by a relative margin
/// (`min_distance`), so ambiguous barcodes fall through even when more than
/// one candidate is within tolerance.
#[derive(Debug, Clone)]
pub struct SampleDemux {
    barcodes: Vec<Vec<u8>>,
    barcode_length: usize,
    max_mismatches: usize,
    min_distance: usize,
}

impl SampleDemux {
    pub fn new(manifest: &SampleManifest, max_mismatches: usize, min_distance: usize) -> Self {
        SampleDemux {
            barcodes: manifest
                .samples()
                .iter()
                .map(|s| s.barcode().to_vec())
                .collect(),
            barcode_length: manifest.barcode_length(),
            max_mismatches: max_mismatches,
            min_distance: min_distance,
        }
    }

    pub fn barcode_length(&self) -> usize {
        self.barcode_length
    }

    /// Returns the index of the uniquely-matching sample for the barcode
    /// window starting at `offset`, or `None` when the window runs off the
    /// read, no barcode is within `max_mismatches`, or the best match is
    /// not separated from the rest by `min_distance`.
    pub fn assign(&self, read: &[u8], offset: usize) -> Option<usize> {
        if offset + self.barcode_length > read.len() {
            return None;
        }

        // Counts at or above this bound can neither win nor crowd the
        // margin, so the early exit is safe to stop there.
        let bound = self.max_mismatches + self.min_distance + 1;

        let counts: Vec<usize> = self
            .barcodes
            .iter()
            .map(|bc| seqs::mismatches(read, offset, bc, 0, self.barcode_length, bound))
            .collect();

        let (best, &min) = counts
            .iter()
            .enumerate()
            .min_by_key(|&(_, count)| *count)?;

        if min > self.max_mismatches {
            return None;
        }

        let within_margin = counts
            .iter()
            .filter(|&&count| count < min + self.min_distance)
            .count();
        if within_margin == 1 {
            Some(best)
        } else {
            None
        }
    }
}
