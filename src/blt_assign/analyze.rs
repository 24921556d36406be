//! Orchestration of a full experiment analysis: input validation, read
//! extraction over the concatenated FASTQ inputs, demultiplexing metrics,
//! and the handoff to the analysis engine.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use bio::io::fastq;
use flate2::read::MultiGzDecoder;

use crate::analysis::{self, AnalysisOptions};
use crate::extract::ReadExtractor;
use crate::manifest::SampleManifest;

const PROGRESS_INTERVAL: usize = 2_500_000;

#[derive(Debug)]
pub struct Config {
    pub input_fastqs: Vec<PathBuf>,
    pub manifest: PathBuf,
    pub output_dir: PathBuf,
    pub max_mismatches: usize,
    pub min_distance: usize,
    pub min_mean_quality: f64,
    pub min_uncut_reads: usize,
    pub min_identical_fraction: f64,
    pub use_cut_samples_in_validation: bool,
    pub fixed_guide_length: Option<usize>,
    pub threads: usize,
}

pub fn analyze_experiment(config: &Config) -> Result<(), failure::Error> {
    validate_config(config)?;

    let manifest = SampleManifest::from_path(&config.manifest)?;
    if let Some(fixed) = config.fixed_guide_length {
        if fixed < manifest.max_guide_length() {
            bail!(
                "fixed-guide-length {} is shorter than the longest guide ({})",
                fixed,
                manifest.max_guide_length()
            );
        }
    }

    let mut extractor = ReadExtractor::new(
        &manifest,
        config.max_mismatches,
        config.min_distance,
        config.min_mean_quality,
        config.fixed_guide_length,
    );

    let mut reads = Vec::new();
    for path in config.input_fastqs.iter() {
        info!("Reading {}", path.display());
        let reader = open_fastq(path)?;
        for record_res in reader.records() {
            let record =
                record_res.map_err(|e| format_err!("Reading {}: {}", path.display(), e))?;
            if let Some(read) = extractor.extract(record.seq(), record.qual()) {
                reads.push(read);
            }
            if extractor.total_reads() % PROGRESS_INTERVAL == 0 {
                info!(
                    "Processed {} reads, extracted {}",
                    extractor.total_reads(),
                    reads.len()
                );
            }
        }
    }
    info!(
        "Processed {} reads in total, extracted {}",
        extractor.total_reads(),
        reads.len()
    );

    write_demux_metrics(&extractor, &config.output_dir)?;

    let options = AnalysisOptions {
        min_uncut_reads: config.min_uncut_reads,
        min_identical_fraction: config.min_identical_fraction,
        use_cut_samples_in_validation: config.use_cut_samples_in_validation,
        score_max_mismatches: analysis::DEFAULT_SCORE_MAX_MISMATCHES,
        threads: config.threads,
    };
    analysis::analyze_reads(&manifest, reads, &options, &config.output_dir)
}

fn validate_config(config: &Config) -> Result<(), failure::Error> {
    if config.min_uncut_reads < 1 {
        bail!("min-uncut-reads must be at least 1");
    }
    if config.min_identical_fraction < 0.0 || config.min_identical_fraction > 1.0 {
        bail!(
            "min-identical-fraction must be within [0, 1], got {}",
            config.min_identical_fraction
        );
    }
    if config.threads < 1 {
        bail!("threads must be at least 1");
    }

    if config.input_fastqs.is_empty() {
        bail!("No input FASTQ files given");
    }
    for path in config.input_fastqs.iter() {
        File::open(path)
            .map_err(|e| format_err!("Cannot read input FASTQ {}: {}", path.display(), e))?;
    }

    fs::create_dir_all(&config.output_dir).map_err(|e| {
        format_err!(
            "Cannot create output directory {}: {}",
            config.output_dir.display(),
            e
        )
    })?;

    Ok(())
}

fn open_fastq(path: &Path) -> Result<fastq::Reader<BufReader<Box<dyn Read>>>, failure::Error> {
    let file = File::open(path)
        .map_err(|e| format_err!("Failed to open input FASTQ {}: {}", path.display(), e))?;
    let stream: Box<dyn Read> = if path.extension().map_or(false, |ext| ext == "gz") {
        Box::new(MultiGzDecoder::new(file))
    } else {
        Box::new(file)
    };
    Ok(fastq::Reader::new(stream))
}

fn write_demux_metrics(
    extractor: &ReadExtractor,
    output_dir: &Path,
) -> Result<(), failure::Error> {
    use crate::extract::{DemuxSampleMetric, DemuxSummaryMetric};

    let summary_path = output_dir.join("demultiplexing.summary.txt");
    let mut summary_out = BufWriter::new(File::create(&summary_path)?);
    writeln!(summary_out, "{}", DemuxSummaryMetric::header())?;
    writeln!(summary_out, "{}", extractor.summary_metric().line())?;

    let details_path = output_dir.join("demultiplexing.details.txt");
    let mut details_out = BufWriter::new(File::create(&details_path)?);
    writeln!(details_out, "{}", DemuxSampleMetric::header())?;
    for metric in extractor.detail_metrics() {
        writeln!(details_out, "{}", metric.line())?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            input_fastqs: vec![PathBuf::from("reads.fq")],
            manifest: PathBuf::from("samples.txt"),
            output_dir: PathBuf::from("out"),
            max_mismatches: 2,
            min_distance: 2,
            min_mean_quality: 20.0,
            min_uncut_reads: 3,
            min_identical_fraction: 0.9,
            use_cut_samples_in_validation: false,
            fixed_guide_length: None,
            threads: 4,
        }
    }

    #[test]
    fn rejects_zero_min_uncut_reads() {
        let mut config = config();
        config.min_uncut_reads = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn rejects_fraction_out_of_range() {
        let mut config = config();
        config.min_identical_fraction = 1.5;
        assert!(validate_config(&config).is_err());
        config.min_identical_fraction = -0.1;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn rejects_zero_threads() {
        let mut config = config();
        config.threads = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn rejects_missing_inputs() {
        let mut cfg = config();
        cfg.input_fastqs.clear();
        assert!(validate_config(&cfg).is_err());

        let mut cfg = config();
        cfg.input_fastqs = vec![PathBuf::from("/no/such/file.fq")];
        assert!(validate_config(&cfg).is_err());
    }
}
