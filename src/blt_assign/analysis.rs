//! The analysis engine: collapses extracted reads into observations,
//! validates target/UMI pairings across samples, and rolls per-UMI evidence
//! up into per-target, per-mismatch, and per-sample specificity metrics.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use rayon::prelude::*;

use crate::align::TargetAnnotation;
use crate::extract::BltRead;
use crate::manifest::{Sample, SampleManifest};
use crate::metrics::{BltMetric, SampleMetric, SampleTargetMetric, TargetValidationMetric};
use crate::plot;
use crate::stats;

pub const DEFAULT_SCORE_MAX_MISMATCHES: usize = 4;

/// UMI column value for a per-target row fed by more than one UMI.
const MULTIPLE_UMIS: &str = "multiple";

#[derive(Debug, Clone)]
pub struct AnalysisOptions {
    pub min_uncut_reads: usize,
    pub min_identical_fraction: f64,
    pub use_cut_samples_in_validation: bool,
    pub score_max_mismatches: usize,
    pub threads: usize,
}

/// Reads sharing sample, UMI, stagger, random barcode, and cut status,
/// collapsed into a single sequencing observation of one molecule.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct BltObservation {
    sample_index: usize,
    umi: Vec<u8>,
    target_seqs: Vec<Vec<u8>>,
    cut: bool,
}

impl BltObservation {
    pub fn sample_index(&self) -> usize {
        self.sample_index
    }
    pub fn umi(&self) -> &[u8] {
        &self.umi
    }
    pub fn target_seqs(&self) -> &[Vec<u8>] {
        &self.target_seqs
    }
    pub fn cut(&self) -> bool {
        self.cut
    }
}

/// A validated target/UMI pairing, carrying every observation of the pair
/// across samples plus the guide alignment annotation.
#[derive(Debug, Clone)]
pub struct TargetInfo {
    guide: Vec<u8>,
    pam: Vec<u8>,
    target: Vec<u8>,
    umi: Vec<u8>,
    observations: Vec<BltObservation>,
    annotation: TargetAnnotation,
}

impl TargetInfo {
    pub fn guide(&self) -> &[u8] {
        &self.guide
    }
    pub fn target(&self) -> &[u8] {
        &self.target
    }
    pub fn umi(&self) -> &[u8] {
        &self.umi
    }
    pub fn observations(&self) -> &[BltObservation] {
        &self.observations
    }
    pub fn annotation(&self) -> &TargetAnnotation {
        &self.annotation
    }
}

fn seq_string(seq: &[u8]) -> String {
    String::from_utf8_lossy(seq).to_string()
}

/// Collapses PCR duplicates: reads sharing `(UMI, guide, PAM, sample,
/// stagger, random barcode, cut)` become one observation listing every
/// duplicate's target sequence. The read buffer is released before
/// returning.
pub fn build_observations(
    manifest: &SampleManifest,
    reads: &mut Vec<BltRead>,
) -> Vec<BltObservation> {
    type ObsKey = (Vec<u8>, Vec<u8>, Vec<u8>, usize, usize, Vec<u8>, bool);

    let mut groups: BTreeMap<ObsKey, Vec<usize>> = BTreeMap::new();
    for (i, read) in reads.iter().enumerate() {
        let sample = &manifest.samples()[read.sample_index()];
        let key = (
            read.umi().to_vec(),
            sample.guide().to_vec(),
            sample.pam().to_vec(),
            read.sample_index(),
            read.stagger(),
            read.random_barcode().to_vec(),
            read.cut(),
        );
        groups.entry(key).or_insert_with(Vec::new).push(i);
    }

    let mut observations = Vec::with_capacity(groups.len());
    for ((umi, _guide, _pam, sample_index, _stagger, _rbc, cut), indices) in groups {
        let mut target_seqs = Vec::with_capacity(indices.len());
        for &i in indices.iter() {
            assert_eq!(
                reads[i].cut(),
                cut,
                "mixed cut and uncut reads in one duplicate group, umi {}",
                seq_string(&umi)
            );
            target_seqs.push(reads[i].target().to_vec());
        }
        observations.push(BltObservation {
            sample_index: sample_index,
            umi: umi,
            target_seqs: target_seqs,
            cut: cut,
        });
    }

    reads.clear();
    reads.shrink_to_fit();
    observations
}

/// Validates each `(UMI, guide, PAM)` pairing against the uncut evidence
/// from eligible samples, writing one validation row per pairing and
/// returning a `TargetInfo` for each pairing that passes.
pub fn validate_targets<W: Write>(
    manifest: &SampleManifest,
    observations: Vec<BltObservation>,
    options: &AnalysisOptions,
    validation_out: &mut W,
) -> Result<Vec<TargetInfo>, failure::Error> {
    writeln!(validation_out, "{}", TargetValidationMetric::header())?;

    let mut groups: BTreeMap<(Vec<u8>, Vec<u8>, Vec<u8>), Vec<BltObservation>> = BTreeMap::new();
    for obs in observations {
        let sample = &manifest.samples()[obs.sample_index];
        let key = (
            obs.umi.clone(),
            sample.guide().to_vec(),
            sample.pam().to_vec(),
        );
        groups.entry(key).or_insert_with(Vec::new).push(obs);
    }

    let mut target_infos = Vec::new();
    for ((umi, guide, pam), group) in groups {
        let mut cut_sample_cut = 0;
        let mut cut_sample_uncut = 0;
        let mut naive_sample_cut = 0;
        let mut naive_sample_uncut = 0;
        let mut seq_counts: BTreeMap<&[u8], usize> = BTreeMap::new();
        let mut eligible_reads = 0;

        for obs in group.iter() {
            let sample = &manifest.samples()[obs.sample_index];
            let read_count = obs.target_seqs.len();
            match (sample.cut(), obs.cut) {
                (true, true) => cut_sample_cut += read_count,
                (true, false) => cut_sample_uncut += read_count,
                (false, true) => naive_sample_cut += read_count,
                (false, false) => naive_sample_uncut += read_count,
            }

            if !obs.cut && (!sample.cut() || options.use_cut_samples_in_validation) {
                for seq in obs.target_seqs.iter() {
                    *seq_counts.entry(seq.as_slice()).or_insert(0) += 1;
                    eligible_reads += 1;
                }
            }
        }

        // Most frequent uncut sequence wins; ties go to the
        // lexicographically first so input order cannot matter.
        let consensus = seq_counts
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(seq, count)| (seq.to_vec(), *count));

        let fraction = consensus
            .as_ref()
            .map(|&(_, count)| count as f64 / eligible_reads as f64);
        let valid = eligible_reads >= options.min_uncut_reads
            && fraction.map_or(false, |f| f >= options.min_identical_fraction);

        let metric = TargetValidationMetric {
            umi: seq_string(&umi),
            guide: seq_string(&guide),
            pam: seq_string(&pam),
            cut_sample_cut_reads: cut_sample_cut,
            cut_sample_uncut_reads: cut_sample_uncut,
            naive_sample_cut_reads: naive_sample_cut,
            naive_sample_uncut_reads: naive_sample_uncut,
            target: consensus
                .as_ref()
                .map_or_else(String::new, |(seq, _)| seq_string(seq)),
            valid: valid,
            fraction_identical: fraction,
        };
        writeln!(validation_out, "{}", metric.line())?;

        if valid {
            let (target, _) = consensus.unwrap();
            let enzyme = manifest.samples()[group[0].sample_index].enzyme();
            let annotation =
                TargetAnnotation::new(&guide, &target, enzyme.pam_is_5prime_of_target());
            target_infos.push(TargetInfo {
                guide: guide,
                pam: pam,
                target: target,
                umi: umi,
                observations: group,
                annotation: annotation,
            });
        }
    }

    Ok(target_infos)
}

/// The metric tables computed for one sample.
#[derive(Debug, Clone)]
pub struct SampleMetricSet {
    pub umi_rows: Vec<SampleTargetMetric>,
    pub target_rows: Vec<SampleTargetMetric>,
    pub rollup: Vec<SampleMetric>,
    pub score: f64,
}

pub fn compute_sample_metrics(
    sample: &Sample,
    sample_index: usize,
    target_infos: &[TargetInfo],
    options: &AnalysisOptions,
) -> SampleMetricSet {
    let mut umi_rows = umi_rows(sample, sample_index, target_infos);
    normalize_rows(&mut umi_rows);

    let mut target_rows = target_rows(&umi_rows);
    normalize_rows(&mut target_rows);

    for row in umi_rows.iter().chain(target_rows.iter()) {
        row.check();
    }

    let rollup = mismatch_rollup(sample, &target_rows);
    let score = specificity_score(&rollup, options.score_max_mismatches);

    SampleMetricSet {
        umi_rows: umi_rows,
        target_rows: target_rows,
        rollup: rollup,
        score: score,
    }
}

/// One row per validated target/UMI pairing observed in this sample.
fn umi_rows(
    sample: &Sample,
    sample_index: usize,
    target_infos: &[TargetInfo],
) -> Vec<SampleTargetMetric> {
    let mut rows = Vec::new();

    for info in target_infos.iter() {
        let obs: Vec<&BltObservation> = info
            .observations
            .iter()
            .filter(|o| o.sample_index == sample_index)
            .collect();
        if obs.is_empty() {
            continue;
        }

        let obs_cut = obs.iter().filter(|o| o.cut).count();
        let obs_uncut = obs.len() - obs_cut;
        let obs_total = obs_cut + obs_uncut;
        let annotation = &info.annotation;

        rows.push(SampleTargetMetric {
            sample: sample.name().to_string(),
            umi: seq_string(&info.umi),
            target: seq_string(&info.target),
            location: sample
                .location_of(&info.target)
                .unwrap_or("")
                .to_string(),
            cigar: annotation.cigar().to_string(),
            mismatches: annotation.mismatches(),
            indel_bases: annotation.indel_bases(),
            mean_mismatch_position: annotation.mean_mismatch_position(),
            mismatch_tuples: annotation.mismatch_tuples_string(),
            obs_cut: obs_cut,
            obs_uncut: obs_uncut,
            obs_total: obs_total,
            cut_rate: obs_cut as f64 / obs_total as f64,
            normalized_cut_rate: 0.0,
            norm_cut_rate_ci95_low: 0.0,
            norm_cut_rate_ci95_high: 0.0,
            padded_guide: annotation.padded_guide().to_string(),
            alignment: annotation.alignment().to_string(),
            padded_target: annotation.padded_target().to_string(),
        });
    }

    rows
}

/// Normalizes cut rates against the perfect-target base rate: the pooled
/// rate over rows with neither mismatches nor indels. An empty pool leaves
/// rates unnormalized.
fn normalize_rows(rows: &mut [SampleTargetMetric]) {
    let mut zero_cut = 0;
    let mut zero_total = 0;
    for row in rows.iter() {
        if row.mismatches == 0 && row.indel_bases == 0 {
            zero_cut += row.obs_cut;
            zero_total += row.obs_total;
        }
    }

    let base_rate = if zero_total == 0 {
        1.0
    } else {
        zero_cut as f64 / zero_total as f64
    };

    for row in rows.iter_mut() {
        row.normalized_cut_rate = row.cut_rate / base_rate;
        let (low, high) = stats::wilson_interval(row.obs_cut, row.obs_total, stats::Z_95);
        row.norm_cut_rate_ci95_low = low / base_rate;
        row.norm_cut_rate_ci95_high = high / base_rate;
    }
}

/// Rolls per-UMI rows up by target sequence, summing observations.
fn target_rows(umi_rows: &[SampleTargetMetric]) -> Vec<SampleTargetMetric> {
    let mut groups: BTreeMap<&str, Vec<&SampleTargetMetric>> = BTreeMap::new();
    for row in umi_rows.iter() {
        groups.entry(&row.target).or_insert_with(Vec::new).push(row);
    }

    let mut rows = Vec::with_capacity(groups.len());
    for (_, group) in groups {
        let first = group[0];
        let obs_cut: usize = group.iter().map(|r| r.obs_cut).sum();
        let obs_uncut: usize = group.iter().map(|r| r.obs_uncut).sum();
        let obs_total = obs_cut + obs_uncut;

        let mut umis: Vec<&str> = group.iter().map(|r| r.umi.as_str()).collect();
        umis.sort();
        umis.dedup();

        let mut row = first.clone();
        row.umi = if umis.len() > 1 {
            MULTIPLE_UMIS.to_string()
        } else {
            umis[0].to_string()
        };
        row.obs_cut = obs_cut;
        row.obs_uncut = obs_uncut;
        row.obs_total = obs_total;
        row.cut_rate = obs_cut as f64 / obs_total as f64;
        rows.push(row);
    }

    rows
}

/// Buckets indel-free per-target rows by mismatch count, emitting a row for
/// every count up to the highest observed so the curve has no holes.
fn mismatch_rollup(sample: &Sample, target_rows: &[SampleTargetMetric]) -> Vec<SampleMetric> {
    let mut buckets: BTreeMap<usize, (usize, usize, usize)> = BTreeMap::new();
    for row in target_rows.iter().filter(|r| r.indel_bases == 0) {
        let bucket = buckets.entry(row.mismatches).or_insert((0, 0, 0));
        bucket.0 += 1;
        bucket.1 += row.obs_cut;
        bucket.2 += row.obs_uncut;
    }

    if buckets.is_empty() {
        return Vec::new();
    }
    let max_observed = *buckets.keys().max().unwrap();

    let zero_mm_cut_rate = buckets
        .get(&0)
        .map_or(1.0, |&(_, cut, uncut)| cut as f64 / (cut + uncut) as f64);

    let mut rows = Vec::with_capacity(max_observed + 1);
    for mismatches in 0..=max_observed {
        let (targets, obs_cut, obs_uncut) =
            buckets.get(&mismatches).cloned().unwrap_or((0, 0, 0));
        let obs_total = obs_cut + obs_uncut;
        let cut_rate = if obs_total == 0 {
            0.0
        } else {
            obs_cut as f64 / obs_total as f64
        };
        rows.push(SampleMetric {
            sample: sample.name().to_string(),
            guide: seq_string(sample.guide()),
            mismatches: mismatches,
            targets: targets,
            obs_cut: obs_cut,
            obs_uncut: obs_uncut,
            obs_total: obs_total,
            cut_rate: cut_rate,
            normalized_cut_rate: cut_rate / zero_mm_cut_rate,
        });
    }

    rows
}

/// Area under the trapezoidal normalized-cut-rate curve over mismatch
/// counts `1..=max_mismatches`, divided by `max_mismatches - 1`. Counts
/// past the observed range contribute a rate of zero.
pub fn specificity_score(rollup: &[SampleMetric], max_mismatches: usize) -> f64 {
    if max_mismatches <= 1 {
        return 0.0;
    }

    let rate = |mismatches: usize| {
        rollup
            .iter()
            .find(|r| r.mismatches == mismatches)
            .map_or(0.0, |r| r.normalized_cut_rate)
    };

    let mut area = 0.0;
    for mismatches in 1..max_mismatches {
        area += (rate(mismatches) + rate(mismatches + 1)) / 2.0;
    }
    area / (max_mismatches - 1) as f64
}

struct SampleOutput {
    metric: BltMetric,
    summary_file: PathBuf,
    cut: bool,
    has_data: bool,
}

fn generate_sample_outputs(
    sample: &Sample,
    sample_index: usize,
    target_infos: &[TargetInfo],
    options: &AnalysisOptions,
    output_dir: &Path,
) -> Result<SampleOutput, failure::Error> {
    let metrics = compute_sample_metrics(sample, sample_index, target_infos, options);

    let sample_dir = output_dir.join(sample.name());
    fs::create_dir_all(&sample_dir).map_err(|e| {
        format_err!(
            "Failed to create sample directory {}: {}",
            sample_dir.display(),
            e
        )
    })?;

    let umis_file = sample_dir.join(format!("{}.umis.txt.gz", sample.name()));
    write_gz_table(
        &umis_file,
        &SampleTargetMetric::header(),
        metrics.umi_rows.iter().map(SampleTargetMetric::line),
    )?;

    let targets_file = sample_dir.join(format!("{}.targets.txt.gz", sample.name()));
    write_gz_table(
        &targets_file,
        &SampleTargetMetric::header(),
        metrics.target_rows.iter().map(SampleTargetMetric::line),
    )?;

    let summary_file = sample_dir.join(format!("{}.summary.txt", sample.name()));
    let mut summary_out = BufWriter::new(File::create(&summary_file)?);
    writeln!(summary_out, "{}", SampleMetric::header())?;
    for row in metrics.rollup.iter() {
        writeln!(summary_out, "{}", row.line())?;
    }

    let has_data = !metrics.umi_rows.is_empty();
    if sample.cut() && has_data {
        let pdf_file = sample_dir.join(format!("{}.pdf", sample.name()));
        plot::plot_targets(&targets_file, &pdf_file)?;
    }

    Ok(SampleOutput {
        metric: BltMetric {
            sample: sample.name().to_string(),
            guide: seq_string(sample.guide()),
            enzyme: sample.enzyme().to_string(),
            pam: seq_string(sample.pam()),
            score: metrics.score,
            extras: sample.extras().values().cloned().collect(),
        },
        summary_file: summary_file,
        cut: sample.cut(),
        has_data: has_data,
    })
}

fn write_gz_table<I: Iterator<Item = String>>(
    path: &Path,
    header: &str,
    lines: I,
) -> Result<(), failure::Error> {
    let file = File::create(path)
        .map_err(|e| format_err!("Failed to create {}: {}", path.display(), e))?;
    let mut out = GzEncoder::new(BufWriter::new(file), Compression::default());
    writeln!(out, "{}", header)?;
    for line in lines {
        writeln!(out, "{}", line)?;
    }
    out.finish()?;
    Ok(())
}

/// Runs the full analysis over extracted reads: deduplication, validation,
/// parallel per-sample metric generation, the experiment summary, and the
/// plotting step.
pub fn analyze_reads(
    manifest: &SampleManifest,
    mut reads: Vec<BltRead>,
    options: &AnalysisOptions,
    output_dir: &Path,
) -> Result<(), failure::Error> {
    info!("Collapsing {} reads into observations", reads.len());
    let observations = build_observations(manifest, &mut reads);
    drop(reads);
    info!("Validating {} observations", observations.len());

    let validation_file = output_dir.join("target_validation.txt.gz");
    let file = File::create(&validation_file)
        .map_err(|e| format_err!("Failed to create {}: {}", validation_file.display(), e))?;
    let mut validation_out = GzEncoder::new(BufWriter::new(file), Compression::default());
    let target_infos = validate_targets(manifest, observations, options, &mut validation_out)?;
    validation_out.finish()?;
    info!("Validated {} target/UMI pairings", target_infos.len());

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.threads)
        .build()?;
    let outputs: Result<Vec<SampleOutput>, failure::Error> = pool.install(|| {
        manifest
            .samples()
            .par_iter()
            .enumerate()
            .map(|(i, sample)| {
                generate_sample_outputs(sample, i, &target_infos, options, output_dir)
            })
            .collect()
    });
    let outputs = outputs?;

    let summary_file = output_dir.join("summary.txt");
    let mut summary_out = BufWriter::new(File::create(&summary_file)?);
    writeln!(summary_out, "{}", BltMetric::header(manifest.extra_keys()))?;
    for output in outputs.iter() {
        writeln!(summary_out, "{}", output.metric.line())?;
    }

    let cut_summaries: Vec<PathBuf> = outputs
        .iter()
        .filter(|o| o.cut && o.has_data)
        .map(|o| o.summary_file.clone())
        .collect();
    if cut_summaries.is_empty() {
        warn!("###################################################################");
        warn!("# No cut sample produced any usable target data.");
        warn!("# The cut-rate-by-mismatches plot will not be generated.");
        warn!("###################################################################");
    } else {
        plot::plot_summary(&output_dir.join("cut_rate_by_mismatches.pdf"), &cut_summaries)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::SampleManifest;

    const GUIDE: &str = "GGCCTCCCCAAAGCCTGGCCA";
    const PAM: &str = "GGGAGT";
    const UMI_A: &str = "AGTCAGTCAGTC";
    const UMI_B: &str = "TTTCAGTCAGTC";

    fn manifest() -> SampleManifest {
        let text = format!(
            "sample\tsample_barcode\tguide\tenzyme\tpam\tcut\toff_target_file\n\
             s1\tAAAAAAAAAAAAAAA\t{}\tCas9\t{}\ttrue\t\n\
             s2\tCCCCCCCCCCCCCCC\t{}\tCas9\t{}\tfalse\t\n",
            GUIDE, PAM, GUIDE, PAM
        );
        SampleManifest::read(text.as_bytes()).unwrap()
    }

    fn options(min_uncut_reads: usize, use_cut: bool) -> AnalysisOptions {
        AnalysisOptions {
            min_uncut_reads: min_uncut_reads,
            min_identical_fraction: 0.9,
            use_cut_samples_in_validation: use_cut,
            score_max_mismatches: DEFAULT_SCORE_MAX_MISMATCHES,
            threads: 1,
        }
    }

    fn read(sample_index: usize, umi: &str, rbc: &str, target: &str, cut: bool) -> BltRead {
        BltRead::new(
            sample_index,
            1,
            rbc.as_bytes().to_vec(),
            umi.as_bytes().to_vec(),
            target.as_bytes().to_vec(),
            cut,
        )
    }

    fn observation(sample_index: usize, umi: &str, targets: &[&str], cut: bool) -> BltObservation {
        BltObservation {
            sample_index: sample_index,
            umi: umi.as_bytes().to_vec(),
            target_seqs: targets.iter().map(|t| t.as_bytes().to_vec()).collect(),
            cut: cut,
        }
    }

    #[test]
    fn dedup_collapses_duplicate_reads() {
        let manifest = manifest();
        let mut reads = vec![
            read(0, UMI_A, "ACGTGC", GUIDE, true),
            read(0, UMI_A, "ACGTGC", GUIDE, true),
            read(0, UMI_A, "TTTTTT", GUIDE, true),
            read(0, UMI_A, "ACGTGC", GUIDE, false),
            read(1, UMI_A, "ACGTGC", GUIDE, false),
        ];
        let observations = build_observations(&manifest, &mut reads);
        assert!(reads.is_empty());
        assert_eq!(observations.len(), 4);

        let duplicated: Vec<&BltObservation> = observations
            .iter()
            .filter(|o| o.target_seqs().len() == 2)
            .collect();
        assert_eq!(duplicated.len(), 1);
        assert!(duplicated[0].cut());
        assert_eq!(duplicated[0].sample_index(), 0);
    }

    #[test]
    fn dedup_is_idempotent() {
        let manifest = manifest();
        let mut reads = vec![
            read(0, UMI_A, "ACGTGC", GUIDE, true),
            read(0, UMI_A, "ACGTGC", GUIDE, true),
            read(0, UMI_B, "GGGGGG", GUIDE, false),
        ];
        let first = build_observations(&manifest, &mut reads);

        // Rebuild one read per observation: a second collapse is a no-op.
        let mut collapsed: Vec<BltRead> = first
            .iter()
            .map(|o| {
                BltRead::new(
                    o.sample_index(),
                    1,
                    b"ACGTGC".to_vec(),
                    o.umi().to_vec(),
                    o.target_seqs()[0].clone(),
                    o.cut(),
                )
            })
            .collect();
        let second = build_observations(&manifest, &mut collapsed);
        assert_eq!(second.len(), first.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.umi(), b.umi());
            assert_eq!(a.cut(), b.cut());
        }
    }

    #[test]
    fn dedup_is_order_independent() {
        let manifest = manifest();
        let mut forward = vec![
            read(0, UMI_A, "ACGTGC", GUIDE, true),
            read(0, UMI_B, "TTTTTT", GUIDE, false),
            read(1, UMI_A, "ACGTGC", GUIDE, false),
        ];
        let mut reversed: Vec<BltRead> = forward.iter().cloned().rev().collect();

        let a = build_observations(&manifest, &mut forward);
        let b = build_observations(&manifest, &mut reversed);
        assert_eq!(a, b);
    }

    #[test]
    fn validation_needs_enough_uncut_reads() {
        let manifest = manifest();
        // One uncut read in the cut sample, one in the naive sample.
        let observations = vec![
            observation(0, UMI_A, &[GUIDE], false),
            observation(1, UMI_A, &[GUIDE], false),
        ];

        let mut sink = Vec::new();
        let infos = validate_targets(
            &manifest,
            observations.clone(),
            &options(2, false),
            &mut sink,
        )
        .unwrap();
        assert!(infos.is_empty());

        let mut sink = Vec::new();
        let infos =
            validate_targets(&manifest, observations, &options(2, true), &mut sink).unwrap();
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].target(), GUIDE.as_bytes());
    }

    #[test]
    fn validation_metric_counts_reads_by_sample_kind() {
        let manifest = manifest();
        let observations = vec![
            observation(0, UMI_A, &[GUIDE, GUIDE, GUIDE], true),
            observation(0, UMI_A, &[GUIDE], false),
            observation(1, UMI_A, &[GUIDE, GUIDE], false),
        ];

        let mut sink = Vec::new();
        validate_targets(&manifest, observations, &options(2, false), &mut sink).unwrap();
        let text = String::from_utf8(sink).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let fields: Vec<&str> = lines[1].split('\t').collect();
        // cut/cut, cut/uncut, naive/cut, naive/uncut
        assert_eq!(&fields[3..7], &["3", "1", "0", "2"]);
        assert_eq!(fields[8], "true");
        assert_eq!(fields[9], "1");
    }

    #[test]
    fn validation_rejects_mixed_consensus() {
        let manifest = manifest();
        let other = "GGACTCCCCATAGCCTGGCCG";
        let observations = vec![
            observation(1, UMI_A, &[GUIDE, GUIDE], false),
            observation(1, UMI_A, &[other, other], false),
        ];

        let mut sink = Vec::new();
        let infos =
            validate_targets(&manifest, observations, &options(3, false), &mut sink).unwrap();
        // Four eligible reads but only half agree: below the 0.9 fraction.
        assert!(infos.is_empty());
    }

    #[test]
    fn pure_match_sample_metrics() {
        let manifest = manifest();
        let sample = &manifest.samples()[0];

        // Four cut observations and one uncut in the cut sample, plus one
        // naive uncut observation to validate against.
        let mut observations = vec![observation(1, UMI_A, &[GUIDE], false)];
        for _ in 0..4 {
            observations.push(observation(0, UMI_A, &[GUIDE], true));
        }
        observations.push(observation(0, UMI_A, &[GUIDE], false));

        let mut sink = Vec::new();
        let infos =
            validate_targets(&manifest, observations, &options(1, false), &mut sink).unwrap();
        assert_eq!(infos.len(), 1);

        let metrics = compute_sample_metrics(sample, 0, &infos, &options(1, false));
        assert_eq!(metrics.umi_rows.len(), 1);
        let row = &metrics.umi_rows[0];
        assert_eq!(row.obs_cut, 4);
        assert_eq!(row.obs_uncut, 1);
        assert_eq!(row.cut_rate, 0.8);
        assert_eq!(row.normalized_cut_rate, 1.0);
        assert_eq!(row.mismatches, 0);
        assert_eq!(row.indel_bases, 0);
        assert_eq!(row.mismatch_tuples, "[]");
        assert!(row.norm_cut_rate_ci95_low > 0.0);
        assert!(row.norm_cut_rate_ci95_high > 1.0);

        assert_eq!(metrics.rollup[0].mismatches, 0);
        assert_eq!(metrics.rollup[0].normalized_cut_rate, 1.0);
    }

    #[test]
    fn target_rollup_merges_umis() {
        let manifest = manifest();
        let sample = &manifest.samples()[0];
        let observations = vec![
            observation(0, UMI_A, &[GUIDE], true),
            observation(0, UMI_A, &[GUIDE], false),
            observation(0, UMI_B, &[GUIDE], true),
            observation(0, UMI_B, &[GUIDE], false),
        ];

        let mut sink = Vec::new();
        let infos = validate_targets(
            &manifest,
            observations,
            &options(1, true),
            &mut sink,
        )
        .unwrap();
        assert_eq!(infos.len(), 2);

        let metrics = compute_sample_metrics(sample, 0, &infos, &options(1, true));
        assert_eq!(metrics.umi_rows.len(), 2);
        assert_eq!(metrics.target_rows.len(), 1);
        let row = &metrics.target_rows[0];
        assert_eq!(row.umi, MULTIPLE_UMIS);
        assert_eq!(row.obs_cut, 2);
        assert_eq!(row.obs_uncut, 2);
        assert_eq!(row.cut_rate, 0.5);
    }

    #[test]
    fn rollup_fills_empty_buckets() {
        let manifest = manifest();
        let sample = &manifest.samples()[0];
        let two_mismatch = "GGACTCCCCATAGCCTGGCCA";

        let observations = vec![
            observation(0, UMI_A, &[GUIDE], true),
            observation(0, UMI_A, &[GUIDE], false),
            observation(0, UMI_B, &[two_mismatch], true),
            observation(0, UMI_B, &[two_mismatch], false),
        ];

        let mut sink = Vec::new();
        let infos =
            validate_targets(&manifest, observations, &options(1, true), &mut sink).unwrap();
        let metrics = compute_sample_metrics(sample, 0, &infos, &options(1, true));

        let mismatch_counts: Vec<usize> =
            metrics.rollup.iter().map(|r| r.mismatches).collect();
        assert_eq!(mismatch_counts, vec![0, 1, 2]);
        assert_eq!(metrics.rollup[1].targets, 0);
        assert_eq!(metrics.rollup[1].obs_total, 0);
        assert_eq!(metrics.rollup[1].cut_rate, 0.0);
        assert_eq!(metrics.rollup[0].normalized_cut_rate, 1.0);
    }

    #[test]
    fn rollup_without_perfect_targets_is_unnormalized() {
        let manifest = manifest();
        let sample = &manifest.samples()[0];
        let two_mismatch = "GGACTCCCCATAGCCTGGCCA";

        let observations = vec![
            observation(0, UMI_B, &[two_mismatch], true),
            observation(0, UMI_B, &[two_mismatch], false),
        ];

        let mut sink = Vec::new();
        let infos =
            validate_targets(&manifest, observations, &options(1, true), &mut sink).unwrap();
        let metrics = compute_sample_metrics(sample, 0, &infos, &options(1, true));

        // The empty 0-mismatch bucket normalizes by 1: the 0 row stays 0 and
        // the observed bucket keeps its raw rate.
        assert_eq!(metrics.rollup[0].obs_total, 0);
        assert_eq!(metrics.rollup[0].normalized_cut_rate, 0.0);
        assert_eq!(metrics.rollup[2].cut_rate, 0.5);
        assert_eq!(metrics.rollup[2].normalized_cut_rate, 0.5);
    }

    #[test]
    fn specificity_score_trapezoid() {
        let rates = [1.0, 0.9375, 0.875, 0.6875, 0.5];
        let rollup: Vec<SampleMetric> = rates
            .iter()
            .enumerate()
            .map(|(mismatches, &rate)| SampleMetric {
                sample: "s1".to_string(),
                guide: GUIDE.to_string(),
                mismatches: mismatches,
                targets: 1,
                obs_cut: 1,
                obs_uncut: 1,
                obs_total: 2,
                cut_rate: rate,
                normalized_cut_rate: rate,
            })
            .collect();

        let score = specificity_score(&rollup, 4);
        assert!((score - 0.76041).abs() < 1e-4, "score {}", score);
    }

    #[test]
    fn specificity_score_missing_buckets_are_zero() {
        assert_eq!(specificity_score(&[], 4), 0.0);
    }
}
