//! Sample manifests: one row per pooled sample, tab-delimited with a header.
//! Known columns describe the sample; unknown columns ride along as extra
//! attributes and reappear in the experiment summary.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv;
use failure;

use crate::enzyme::Enzyme;
use crate::offtarget;
use crate::seqs;

const COL_SAMPLE: &str = "sample";
const COL_BARCODE: &str = "sample_barcode";
const COL_GUIDE: &str = "guide";
const COL_ENZYME: &str = "enzyme";
const COL_PAM: &str = "pam";
const COL_CUT: &str = "cut";
const COL_OFF_TARGET_FILE: &str = "off_target_file";

const REQUIRED_COLUMNS: [&str; 7] = [
    COL_SAMPLE,
    COL_BARCODE,
    COL_GUIDE,
    COL_ENZYME,
    COL_PAM,
    COL_CUT,
    COL_OFF_TARGET_FILE,
];

#[derive(Debug, Clone)]
pub struct Sample {
    name: String,
    barcode: Vec<u8>,
    guide: Vec<u8>,
    pam: Vec<u8>,
    enzyme: Enzyme,
    cut: bool,
    off_target_file: String,
    off_targets: HashMap<Vec<u8>, String>,
    extras: BTreeMap<String, String>,
}

impl Sample {
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn barcode(&self) -> &[u8] {
        &self.barcode
    }
    pub fn guide(&self) -> &[u8] {
        &self.guide
    }
    pub fn pam(&self) -> &[u8] {
        &self.pam
    }
    pub fn enzyme(&self) -> Enzyme {
        self.enzyme
    }
    pub fn cut(&self) -> bool {
        self.cut
    }

    /// Genomic location of a target sequence, when the sample carries an
    /// off-target mapping that knows it.
    pub fn location_of(&self, target: &[u8]) -> Option<&str> {
        self.off_targets.get(target).map(String::as_str)
    }

    /// Extra manifest columns, ordered by key.
    pub fn extras(&self) -> &BTreeMap<String, String> {
        &self.extras
    }

    pub fn parse_cut(field: &str) -> bool {
        let lower = field.to_ascii_lowercase();
        lower == "true" || lower == "yes" || lower == "t" || lower == "y"
    }

    fn line(&self) -> String {
        let mut fields = vec![
            self.name.clone(),
            String::from_utf8_lossy(&self.barcode).to_string(),
            String::from_utf8_lossy(&self.guide).to_string(),
            self.enzyme.to_string(),
            String::from_utf8_lossy(&self.pam).to_string(),
            self.cut.to_string(),
            self.off_target_file.clone(),
        ];
        fields.extend(self.extras.values().cloned());
        fields.join("\t")
    }
}

#[derive(Debug, Clone)]
pub struct SampleManifest {
    samples: Vec<Sample>,
    extra_keys: Vec<String>,
}

impl SampleManifest {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, failure::Error> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| format_err!("Failed to open sample manifest {}: {}", path.display(), e))?;
        Self::read(file).map_err(|e| format_err!("Sample manifest {}: {}", path.display(), e))
    }

    pub fn read<R: Read>(input: R) -> Result<Self, failure::Error> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .from_reader(input);

        let headers = reader.headers()?.clone();
        for required in REQUIRED_COLUMNS.iter() {
            if !headers.iter().any(|h| h == *required) {
                bail!("Missing required column {:?}", required);
            }
        }

        let mut samples = Vec::new();
        for (line_no, record_res) in reader.records().enumerate() {
            let record = record_res?;
            let sample = Self::parse_sample(&headers, &record)
                .map_err(|e| format_err!("Sample on line {}: {}", line_no + 2, e))?;
            samples.push(sample);
        }

        if samples.is_empty() {
            bail!("No samples in manifest");
        }

        let mut names = HashSet::new();
        for sample in samples.iter() {
            if !names.insert(sample.name.clone()) {
                bail!("Duplicate sample name {:?}", sample.name);
            }
        }

        let barcode_length = samples[0].barcode.len();
        for sample in samples.iter() {
            if sample.barcode.len() != barcode_length {
                bail!(
                    "Sample {:?} barcode length {} != {}, all barcodes must be one length",
                    sample.name,
                    sample.barcode.len(),
                    barcode_length
                );
            }
        }

        let extra_keys: Vec<String> = samples[0].extras.keys().cloned().collect();

        Ok(SampleManifest {
            samples: samples,
            extra_keys: extra_keys,
        })
    }

    fn parse_sample(
        headers: &csv::StringRecord,
        record: &csv::StringRecord,
    ) -> Result<Sample, failure::Error> {
        let mut known: HashMap<&str, &str> = HashMap::new();
        let mut extras = BTreeMap::new();

        for (header, field) in headers.iter().zip(record.iter()) {
            if REQUIRED_COLUMNS.contains(&header) {
                known.insert(header, field);
            } else {
                extras.insert(header.to_string(), field.to_string());
            }
        }

        fn field<'a>(
            known: &HashMap<&str, &'a str>,
            name: &str,
        ) -> Result<&'a str, failure::Error> {
            known
                .get(name)
                .copied()
                .ok_or_else(|| format_err!("Missing field {:?}", name))
        }

        fn dna_field(
            known: &HashMap<&str, &str>,
            name: &str,
        ) -> Result<Vec<u8>, failure::Error> {
            let raw = field(known, name)?;
            let seq = raw.as_bytes().to_ascii_uppercase();
            if seq.is_empty() || !seqs::are_valid_bases(&seq, false) {
                bail!("Bad {} sequence {:?}", name, raw);
            }
            Ok(seq)
        }

        let name = field(&known, COL_SAMPLE)?.to_string();
        if name.is_empty() {
            bail!("Empty sample name");
        }

        let off_target_file = field(&known, COL_OFF_TARGET_FILE)?.to_string();
        let off_targets = if off_target_file.is_empty() {
            HashMap::new()
        } else {
            offtarget::load_off_targets(&off_target_file)?
        };

        Ok(Sample {
            name: name,
            barcode: dna_field(&known, COL_BARCODE)?,
            guide: dna_field(&known, COL_GUIDE)?,
            pam: dna_field(&known, COL_PAM)?,
            enzyme: field(&known, COL_ENZYME)?.parse()?,
            cut: Sample::parse_cut(field(&known, COL_CUT)?),
            off_target_file: off_target_file,
            off_targets: off_targets,
            extras: extras,
        })
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn barcode_length(&self) -> usize {
        self.samples[0].barcode.len()
    }

    pub fn max_guide_length(&self) -> usize {
        self.samples.iter().map(|s| s.guide.len()).max().unwrap_or(0)
    }

    /// Extra-attribute column names, sorted, as they appear on every sample.
    pub fn extra_keys(&self) -> &[String] {
        &self.extra_keys
    }

    pub fn header_line(&self) -> String {
        let mut fields: Vec<String> = REQUIRED_COLUMNS.iter().map(|c| c.to_string()).collect();
        fields.extend(self.extra_keys.iter().cloned());
        fields.join("\t")
    }

    pub fn lines(&self) -> Vec<String> {
        self.samples.iter().map(Sample::line).collect()
    }
}
