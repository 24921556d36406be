//! Off-target site files: headerless CSV mapping known off-target sequences
//! to genomic locations.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv;
use failure;

use crate::seqs;

// guide_with_pam, chrom, pos, off_target_with_pam, strand, mismatches,
// off_target, loc
const FIELD_COUNT: usize = 8;
const OFF_TARGET_FIELD: usize = 6;
const LOC_FIELD: usize = 7;

/// Reads a headerless off-target CSV into a map from off-target sequence
/// (uppercased) to genomic location. An empty file yields an empty map.
pub fn read_off_targets<R: Read>(input: R) -> Result<HashMap<Vec<u8>, String>, failure::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_reader(input);

    let mut off_targets = HashMap::new();

    for (line_no, record_res) in reader.records().enumerate() {
        let record = record_res?;
        if record.len() < FIELD_COUNT {
            bail!(
                "Malformed off-target line {}: expecting {} fields, found {}",
                line_no + 1,
                FIELD_COUNT,
                record.len()
            );
        }

        let off_target = record[OFF_TARGET_FIELD].as_bytes().to_ascii_uppercase();
        if !seqs::are_valid_bases(&off_target, false) {
            bail!(
                "Bad off-target sequence {:?} on line {}",
                &record[OFF_TARGET_FIELD],
                line_no + 1
            );
        }

        let loc = record[LOC_FIELD].to_string();
        if !loc.contains(':') {
            bail!(
                "Bad off-target location {:?} on line {}, expecting chrom:pos",
                loc,
                line_no + 1
            );
        }

        off_targets.insert(off_target, loc);
    }

    Ok(off_targets)
}

pub fn load_off_targets<P: AsRef<Path>>(
    path: P,
) -> Result<HashMap<Vec<u8>, String>, failure::Error> {
    let path = path.as_ref();
    let file = File::open(path)
        .map_err(|e| format_err!("Failed to open off-target file {}: {}", path.display(), e))?;
    read_off_targets(file).map_err(|e| format_err!("Off-target file {}: {}", path.display(), e))
}
