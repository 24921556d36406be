//! Tab-delimited metric rows produced by the analysis engine.

fn opt_f64(value: Option<f64>) -> String {
    value.map_or_else(String::new, |v| v.to_string())
}

/// One row per observed `(UMI, guide, PAM)` triple, valid or not.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetValidationMetric {
    pub umi: String,
    pub guide: String,
    pub pam: String,
    pub cut_sample_cut_reads: usize,
    pub cut_sample_uncut_reads: usize,
    pub naive_sample_cut_reads: usize,
    pub naive_sample_uncut_reads: usize,
    pub target: String,
    pub valid: bool,
    pub fraction_identical: Option<f64>,
}

impl TargetValidationMetric {
    pub fn header() -> String {
        "umi\tguide\tpam\tcut_sample_cut_reads\tcut_sample_uncut_reads\tnaive_sample_cut_reads\tnaive_sample_uncut_reads\ttarget\tvalid\tfraction_identical".to_string()
    }

    pub fn line(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.umi,
            self.guide,
            self.pam,
            self.cut_sample_cut_reads,
            self.cut_sample_uncut_reads,
            self.naive_sample_cut_reads,
            self.naive_sample_uncut_reads,
            self.target,
            self.valid,
            opt_f64(self.fraction_identical)
        )
    }
}

/// Per-UMI and per-target cut-rate rows for one sample. A per-target row is
/// the rollup of the per-UMI rows sharing a target sequence, with
/// `umi = "multiple"` when more than one UMI contributed.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleTargetMetric {
    pub sample: String,
    pub umi: String,
    pub target: String,
    pub location: String,
    pub cigar: String,
    pub mismatches: usize,
    pub indel_bases: usize,
    pub mean_mismatch_position: Option<f64>,
    pub mismatch_tuples: String,
    pub obs_cut: usize,
    pub obs_uncut: usize,
    pub obs_total: usize,
    pub cut_rate: f64,
    pub normalized_cut_rate: f64,
    pub norm_cut_rate_ci95_low: f64,
    pub norm_cut_rate_ci95_high: f64,
    pub padded_guide: String,
    pub alignment: String,
    pub padded_target: String,
}

impl SampleTargetMetric {
    pub fn header() -> String {
        "sample\tumi\ttarget\tlocation\tcigar\tmismatches\tindel_bases\tmean_mismatch_position\tmismatch_tuples\tobs_cut\tobs_uncut\tobs_total\tcut_rate\tnormalized_cut_rate\tnorm_cut_rate_ci95_low\tnorm_cut_rate_ci95_high\tpadded_guide\talignment\tpadded_target".to_string()
    }

    pub fn line(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.sample,
            self.umi,
            self.target,
            self.location,
            self.cigar,
            self.mismatches,
            self.indel_bases,
            opt_f64(self.mean_mismatch_position),
            self.mismatch_tuples,
            self.obs_cut,
            self.obs_uncut,
            self.obs_total,
            self.cut_rate,
            self.normalized_cut_rate,
            self.norm_cut_rate_ci95_low,
            self.norm_cut_rate_ci95_high,
            self.padded_guide,
            self.alignment,
            self.padded_target
        )
    }

    /// Panics when the row breaks its structural invariants, which would
    /// mean a bug in the aggregation rather than bad input.
    pub fn check(&self) {
        assert_eq!(
            self.obs_total,
            self.obs_cut + self.obs_uncut,
            "obs_total {} != obs_cut {} + obs_uncut {} for sample {} umi {}",
            self.obs_total,
            self.obs_cut,
            self.obs_uncut,
            self.sample,
            self.umi
        );
        assert!(
            self.padded_guide.len() == self.alignment.len()
                && self.alignment.len() == self.padded_target.len(),
            "padded alignment length mismatch for sample {} umi {}",
            self.sample,
            self.umi
        );
    }
}

/// Per-mismatch-count rollup for one sample, indel-free targets only.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleMetric {
    pub sample: String,
    pub guide: String,
    pub mismatches: usize,
    pub targets: usize,
    pub obs_cut: usize,
    pub obs_uncut: usize,
    pub obs_total: usize,
    pub cut_rate: f64,
    pub normalized_cut_rate: f64,
}

impl SampleMetric {
    pub fn header() -> String {
        "sample\tguide\tmismatches\ttargets\tobs_cut\tobs_uncut\tobs_total\tcut_rate\tnormalized_cut_rate".to_string()
    }

    pub fn line(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.sample,
            self.guide,
            self.mismatches,
            self.targets,
            self.obs_cut,
            self.obs_uncut,
            self.obs_total,
            self.cut_rate,
            self.normalized_cut_rate
        )
    }
}

/// One row per sample in the experiment summary, with the integrated
/// specificity score and any extra manifest attributes appended.
#[derive(Debug, Clone, PartialEq)]
pub struct BltMetric {
    pub sample: String,
    pub guide: String,
    pub enzyme: String,
    pub pam: String,
    pub score: f64,
    pub extras: Vec<String>,
}

impl BltMetric {
    pub fn header(extra_keys: &[String]) -> String {
        let mut fields = vec![
            "sample".to_string(),
            "guide".to_string(),
            "enzyme".to_string(),
            "pam".to_string(),
            "score".to_string(),
        ];
        fields.extend(extra_keys.iter().cloned());
        fields.join("\t")
    }

    pub fn line(&self) -> String {
        let mut fields = vec![
            self.sample.clone(),
            self.guide.clone(),
            self.enzyme.clone(),
            self.pam.clone(),
            self.score.to_string(),
        ];
        fields.extend(self.extras.iter().cloned());
        fields.join("\t")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target_metric() -> SampleTargetMetric {
        SampleTargetMetric {
            sample: "s1".to_string(),
            umi: "AGTCAGTCAGTC".to_string(),
            target: "ACGT".to_string(),
            location: String::new(),
            cigar: "4=".to_string(),
            mismatches: 0,
            indel_bases: 0,
            mean_mismatch_position: None,
            mismatch_tuples: "[]".to_string(),
            obs_cut: 4,
            obs_uncut: 1,
            obs_total: 5,
            cut_rate: 0.8,
            normalized_cut_rate: 1.0,
            norm_cut_rate_ci95_low: 0.4,
            norm_cut_rate_ci95_high: 1.2,
            padded_guide: "ACGT".to_string(),
            alignment: "||||".to_string(),
            padded_target: "ACGT".to_string(),
        }
    }

    #[test]
    fn target_metric_line() {
        let metric = target_metric();
        metric.check();
        let line = metric.line();
        assert_eq!(line.split('\t').count(), SampleTargetMetric::header().split('\t').count());
        assert!(line.contains("\t0.8\t"));
        assert!(line.contains("\t[]\t"));
        // Absent optionals serialize as empty fields.
        assert!(line.contains("\t4=\t0\t0\t\t[]\t"));
    }

    #[test]
    #[should_panic]
    fn inconsistent_totals_panic() {
        let mut metric = target_metric();
        metric.obs_total = 6;
        metric.check();
    }

    #[test]
    #[should_panic]
    fn padded_length_mismatch_panics() {
        let mut metric = target_metric();
        metric.padded_target.push('A');
        metric.check();
    }

    #[test]
    fn blt_metric_extras_append() {
        let metric = BltMetric {
            sample: "s1".to_string(),
            guide: "ACGT".to_string(),
            enzyme: "Cas9".to_string(),
            pam: "GGG".to_string(),
            score: 0.5,
            extras: vec!["d1".to_string(), "x".to_string()],
        };
        let header = BltMetric::header(&["donor".to_string(), "lot".to_string()]);
        assert!(header.ends_with("score\tdonor\tlot"));
        assert!(metric.line().ends_with("0.5\td1\tx"));
    }

    #[test]
    fn validation_metric_line() {
        let metric = TargetValidationMetric {
            umi: "AGTCAGTCAGTC".to_string(),
            guide: "ACGT".to_string(),
            pam: "GGG".to_string(),
            cut_sample_cut_reads: 3,
            cut_sample_uncut_reads: 1,
            naive_sample_cut_reads: 0,
            naive_sample_uncut_reads: 4,
            target: "ACGT".to_string(),
            valid: true,
            fraction_identical: Some(1.0),
        };
        assert!(metric.line().ends_with("ACGT\ttrue\t1"));

        let empty = TargetValidationMetric {
            target: String::new(),
            valid: false,
            fraction_identical: None,
            ..metric
        };
        assert!(empty.line().ends_with("\t\tfalse\t"));
    }
}
