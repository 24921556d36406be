//! Extraction of structured BLT reads from raw fixed-layout sequence reads.
//!
//! Every read starts with 1-8 stagger bases followed by a constant prefix
//! interleaving three anchor sequences with the random barcode and the
//! sample barcode, then an enzyme-specific tail holding the target, PAM,
//! and UMI. Reads that cannot be laid out are counted, never fatal.

use crate::demux::SampleDemux;
use crate::enzyme::Enzyme;
use crate::manifest::{Sample, SampleManifest};
use crate::seqs;

pub const MAX_STAGGER_LENGTH: usize = 8;

const LEFT_ANCHOR_1: &[u8] = b"CGATCT";
const LEFT_ANCHOR_2: &[u8] = b"TACGAC";
const LEFT_ANCHOR_3: &[u8] = b"TTACCGAAGATAGCAGCCTAGTGGAACC";
const RANDOM_BARCODE_LENGTH: usize = 6;
const MAX_ANCHOR_MISMATCHES: usize = 2;

const TARGET_LEAD: &[u8] = b"ATCTG";
const MAX_LEAD_MISMATCHES: usize = 1;
const PAM_SUFFIX: &[u8] = b"GC";
const UMI_TRAIL: &[u8] = b"TGAC";
const UMI_LENGTH: usize = 12;
const UMI_LENGTH_SLOP: usize = 1;
const MAX_CUT_TARGET_LENGTH: usize = 8;

/// One successfully extracted read.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct BltRead {
    sample_index: usize,
    stagger: usize,
    random_barcode: Vec<u8>,
    umi: Vec<u8>,
    target: Vec<u8>,
    cut: bool,
}

impl BltRead {
    pub fn new(
        sample_index: usize,
        stagger: usize,
        random_barcode: Vec<u8>,
        umi: Vec<u8>,
        target: Vec<u8>,
        cut: bool,
    ) -> Self {
        BltRead {
            sample_index: sample_index,
            stagger: stagger,
            random_barcode: random_barcode,
            umi: umi,
            target: target,
            cut: cut,
        }
    }

    pub fn sample_index(&self) -> usize {
        self.sample_index
    }
    pub fn stagger(&self) -> usize {
        self.stagger
    }
    pub fn random_barcode(&self) -> &[u8] {
        &self.random_barcode
    }
    pub fn umi(&self) -> &[u8] {
        &self.umi
    }
    pub fn target(&self) -> &[u8] {
        &self.target
    }
    pub fn cut(&self) -> bool {
        self.cut
    }
}

#[derive(Debug, Clone, Copy)]
struct TargetSpan {
    cut: bool,
    target_offset: usize,
    target_length: usize,
    umi_offset: usize,
    umi_length: usize,
}

#[derive(Debug, Clone, Default)]
struct SampleTally {
    failed_extract: usize,
    failed_quality: usize,
    extracted: usize,
}

impl SampleTally {
    fn assigned(&self) -> usize {
        self.failed_extract + self.failed_quality + self.extracted
    }
}

pub struct ReadExtractor<'a> {
    manifest: &'a SampleManifest,
    demux: SampleDemux,
    min_mean_quality: f64,
    fixed_guide_length: Option<usize>,
    pam_plus: Vec<Vec<u8>>,
    prefix_length: usize,
    total_reads: usize,
    failed_landmarks: usize,
    failed_sample: usize,
    tallies: Vec<SampleTally>,
}

impl<'a> ReadExtractor<'a> {
    pub fn new(
        manifest: &'a SampleManifest,
        max_mismatches: usize,
        min_distance: usize,
        min_mean_quality: f64,
        fixed_guide_length: Option<usize>,
    ) -> Self {
        let demux = SampleDemux::new(manifest, max_mismatches, min_distance);
        let pam_plus = manifest
            .samples()
            .iter()
            .map(|sample| {
                let mut seq = sample.pam().to_vec();
                seq.extend_from_slice(PAM_SUFFIX);
                seq
            })
            .collect();

        let prefix_length = LEFT_ANCHOR_1.len()
            + RANDOM_BARCODE_LENGTH
            + LEFT_ANCHOR_2.len()
            + manifest.barcode_length()
            + LEFT_ANCHOR_3.len();

        ReadExtractor {
            manifest: manifest,
            demux: demux,
            min_mean_quality: min_mean_quality,
            fixed_guide_length: fixed_guide_length,
            pam_plus: pam_plus,
            prefix_length: prefix_length,
            total_reads: 0,
            failed_landmarks: 0,
            failed_sample: 0,
            tallies: vec![SampleTally::default(); manifest.len()],
        }
    }

    pub fn total_reads(&self) -> usize {
        self.total_reads
    }

    /// Applies the read layout to one record. Returns the structured read,
    /// or `None` after counting the read's fate. Panics when the quality
    /// string does not match the bases, which indicates a malformed record
    /// upstream.
    pub fn extract(&mut self, bases: &[u8], quals: &[u8]) -> Option<BltRead> {
        assert_eq!(
            bases.len(),
            quals.len(),
            "quality length {} != base length {}",
            quals.len(),
            bases.len()
        );
        self.total_reads += 1;

        let stagger = match self.locate_stagger(bases) {
            Some(stagger) => stagger,
            None => {
                self.failed_landmarks += 1;
                return None;
            }
        };

        let barcode_offset = stagger + LEFT_ANCHOR_1.len() + RANDOM_BARCODE_LENGTH + LEFT_ANCHOR_2.len();
        let sample_index = match self.demux.assign(bases, barcode_offset) {
            Some(index) => index,
            None => {
                self.failed_sample += 1;
                return None;
            }
        };
        let sample = &self.manifest.samples()[sample_index];

        let tail_start = stagger + self.prefix_length;
        let span = match self.extract_target(bases, sample, sample_index, tail_start) {
            Some(span) => span,
            None => {
                self.tallies[sample_index].failed_extract += 1;
                return None;
            }
        };

        let rbc_offset = stagger + LEFT_ANCHOR_1.len();
        if self.mean_quality(quals, rbc_offset, &span) < self.min_mean_quality {
            self.tallies[sample_index].failed_quality += 1;
            return None;
        }

        self.tallies[sample_index].extracted += 1;
        Some(BltRead {
            sample_index: sample_index,
            stagger: stagger,
            random_barcode: bases[rbc_offset..rbc_offset + RANDOM_BARCODE_LENGTH].to_vec(),
            umi: bases[span.umi_offset..span.umi_offset + span.umi_length].to_vec(),
            target: bases[span.target_offset..span.target_offset + span.target_length].to_vec(),
            cut: span.cut,
        })
    }

    /// Finds the stagger length by scanning for the first anchor that can
    /// be located exactly within its stagger window, then verifies all
    /// three anchors at their post-stagger offsets.
    fn locate_stagger(&self, bases: &[u8]) -> Option<usize> {
        let anchors: [(&[u8], usize); 3] = [
            (LEFT_ANCHOR_1, 0),
            (LEFT_ANCHOR_2, LEFT_ANCHOR_1.len() + RANDOM_BARCODE_LENGTH),
            (
                LEFT_ANCHOR_3,
                LEFT_ANCHOR_1.len()
                    + RANDOM_BARCODE_LENGTH
                    + LEFT_ANCHOR_2.len()
                    + self.demux.barcode_length(),
            ),
        ];

        let mut stagger = None;
        for &(anchor, post_offset) in anchors.iter() {
            let window_start = post_offset + 1;
            let last_start = post_offset + MAX_STAGGER_LENGTH;
            if let Some(found) = find_exact_before(bases, anchor, window_start, last_start) {
                stagger = Some(found - post_offset);
                break;
            }
        }
        let stagger = stagger?;

        for &(anchor, post_offset) in anchors.iter() {
            let offset = stagger + post_offset;
            if offset + anchor.len() > bases.len() {
                return None;
            }
            let found = seqs::mismatches(
                bases,
                offset,
                anchor,
                0,
                anchor.len(),
                MAX_ANCHOR_MISMATCHES + 1,
            );
            if found > MAX_ANCHOR_MISMATCHES {
                return None;
            }
        }

        Some(stagger)
    }

    /// Tail layout dispatch. Supporting another enzyme means adding a
    /// variant arm with its own tail parser.
    fn extract_target(
        &self,
        bases: &[u8],
        sample: &Sample,
        sample_index: usize,
        tail_start: usize,
    ) -> Option<TargetSpan> {
        match sample.enzyme() {
            Enzyme::Cas9 => self.extract_target_cas9(bases, sample, sample_index, tail_start),
        }
    }

    /// Cas9 tail: `ATCTG . target . PAM . GC . umi[12 +/- 1] . TGAC`, where
    /// a cut molecule keeps at most 8 bases of target stub and loses the
    /// leading `ATCTG`.
    fn extract_target_cas9(
        &self,
        bases: &[u8],
        sample: &Sample,
        sample_index: usize,
        tail_start: usize,
    ) -> Option<TargetSpan> {
        let pam_plus = &self.pam_plus[sample_index];
        let pam_offset = find_exact(bases, pam_plus, tail_start)?;
        let pam_plus_end = pam_offset + pam_plus.len();

        let lead_mismatches = if tail_start + TARGET_LEAD.len() <= bases.len() {
            seqs::mismatches(
                bases,
                tail_start,
                TARGET_LEAD,
                0,
                TARGET_LEAD.len(),
                TARGET_LEAD.len(),
            )
        } else {
            TARGET_LEAD.len()
        };

        let trail_offset = find_exact(
            bases,
            UMI_TRAIL,
            pam_plus_end + UMI_LENGTH - UMI_LENGTH_SLOP,
        )?;
        let umi_length = trail_offset - pam_plus_end;
        if umi_length < UMI_LENGTH - UMI_LENGTH_SLOP || umi_length > UMI_LENGTH + UMI_LENGTH_SLOP {
            return None;
        }

        let expected_target_length = self.fixed_guide_length.unwrap_or(sample.guide().len());

        if lead_mismatches <= MAX_LEAD_MISMATCHES
            && pam_offset >= tail_start + TARGET_LEAD.len() + expected_target_length - 2
        {
            let padding = self
                .fixed_guide_length
                .map_or(0, |fixed| fixed - sample.guide().len());
            let target_offset = tail_start + TARGET_LEAD.len() + padding;
            Some(TargetSpan {
                cut: false,
                target_offset: target_offset,
                target_length: pam_offset - target_offset,
                umi_offset: pam_plus_end,
                umi_length: umi_length,
            })
        } else if pam_offset - tail_start <= MAX_CUT_TARGET_LENGTH {
            Some(TargetSpan {
                cut: true,
                target_offset: tail_start,
                target_length: pam_offset - tail_start,
                umi_offset: pam_plus_end,
                umi_length: umi_length,
            })
        } else {
            None
        }
    }

    /// Mean quality across the random barcode, target, and UMI regions.
    fn mean_quality(&self, quals: &[u8], rbc_offset: usize, span: &TargetSpan) -> f64 {
        let mut total = 0usize;
        let mut count = 0usize;
        let regions = [
            (rbc_offset, RANDOM_BARCODE_LENGTH),
            (span.target_offset, span.target_length),
            (span.umi_offset, span.umi_length),
        ];
        for &(offset, length) in regions.iter() {
            for &q in quals[offset..offset + length].iter() {
                total += (q - 33) as usize;
                count += 1;
            }
        }
        if count == 0 {
            0.0
        } else {
            total as f64 / count as f64
        }
    }

    pub fn summary_metric(&self) -> DemuxSummaryMetric {
        let failed_extraction = self.tallies.iter().map(|t| t.failed_extract).sum();
        let failed_quality = self.tallies.iter().map(|t| t.failed_quality).sum();
        let extracted: usize = self.tallies.iter().map(|t| t.extracted).sum();
        DemuxSummaryMetric {
            total_reads: self.total_reads,
            failed_landmarks: self.failed_landmarks,
            failed_sample_id: self.failed_sample,
            failed_extraction: failed_extraction,
            failed_quality: failed_quality,
            extracted: extracted,
            frac_extracted: if self.total_reads == 0 {
                0.0
            } else {
                extracted as f64 / self.total_reads as f64
            },
        }
    }

    pub fn detail_metrics(&self) -> Vec<DemuxSampleMetric> {
        self.manifest
            .samples()
            .iter()
            .zip(self.tallies.iter())
            .map(|(sample, tally)| DemuxSampleMetric {
                sample: sample.name().to_string(),
                barcode: String::from_utf8_lossy(sample.barcode()).to_string(),
                assigned: tally.assigned(),
                failed_extraction: tally.failed_extract,
                failed_quality: tally.failed_quality,
                extracted: tally.extracted,
                frac_extracted: if tally.assigned() == 0 {
                    0.0
                } else {
                    tally.extracted as f64 / tally.assigned() as f64
                },
            })
            .collect()
    }
}

/// First exact occurrence of `needle` at or after `from`.
fn find_exact(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|i| i + from)
}

/// First exact occurrence of `needle` starting in `from..=last_start`.
fn find_exact_before(
    haystack: &[u8],
    needle: &[u8],
    from: usize,
    last_start: usize,
) -> Option<usize> {
    let end = std::cmp::min(haystack.len(), last_start + needle.len());
    if from >= end {
        return None;
    }
    haystack[from..end]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|i| i + from)
}

/// Experiment-wide demultiplexing tally.
#[derive(Debug, Clone, PartialEq)]
pub struct DemuxSummaryMetric {
    pub total_reads: usize,
    pub failed_landmarks: usize,
    pub failed_sample_id: usize,
    pub failed_extraction: usize,
    pub failed_quality: usize,
    pub extracted: usize,
    pub frac_extracted: f64,
}

impl DemuxSummaryMetric {
    pub fn header() -> String {
        "total_reads\tfailed_landmarks\tfailed_sample_id\tfailed_extraction\tfailed_quality\textracted\tfrac_extracted".to_string()
    }

    pub fn line(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.total_reads,
            self.failed_landmarks,
            self.failed_sample_id,
            self.failed_extraction,
            self.failed_quality,
            self.extracted,
            self.frac_extracted
        )
    }
}

/// Per-sample demultiplexing tally.
#[derive(Debug, Clone, PartialEq)]
pub struct DemuxSampleMetric {
    pub sample: String,
    pub barcode: String,
    pub assigned: usize,
    pub failed_extraction: usize,
    pub failed_quality: usize,
    pub extracted: usize,
    pub frac_extracted: f64,
}

impl DemuxSampleMetric {
    pub fn header() -> String {
        "sample\tbarcode\tassigned\tfailed_extraction\tfailed_quality\textracted\tfrac_extracted"
            .to_string()
    }

    pub fn line(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.sample,
            self.barcode,
            self.assigned,
            self.failed_extraction,
            self.failed_quality,
            self.extracted,
            self.frac_extracted
        )
    }
}
