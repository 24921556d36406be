//! External plotting: the packaged R scripts are written to a temporary
//! location and handed to an R interpreter along with the metric files.

use std::env;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use failure;

const SUMMARY_SCRIPT: &str = include_str!("r/plot_blt_summary.R");
const TARGETS_SCRIPT: &str = include_str!("r/plot_blt_targets.R");

const RSCRIPT_ENV: &str = "BLT_RSCRIPT";
const DEFAULT_RSCRIPT: &str = "Rscript";

fn interpreter() -> String {
    env::var(RSCRIPT_ENV).unwrap_or_else(|_| DEFAULT_RSCRIPT.to_string())
}

fn run_script<S: AsRef<OsStr>>(source: &str, name: &str, args: &[S]) -> Result<(), failure::Error> {
    let script_path = env::temp_dir().join(format!("{}.{}.R", name, std::process::id()));
    fs::write(&script_path, source)
        .map_err(|e| format_err!("Failed to write {}: {}", script_path.display(), e))?;

    let status = Command::new(interpreter())
        .arg(&script_path)
        .args(args)
        .status()
        .map_err(|e| format_err!("Failed to run {} for {}: {}", interpreter(), name, e));
    let _ = fs::remove_file(&script_path);

    let status = status?;
    if !status.success() {
        bail!("Plotting script {} exited with {}", name, status);
    }
    Ok(())
}

/// Renders the experiment-wide cut-rate-by-mismatches curve from the
/// per-mismatch summary tables of every cut sample with data.
pub fn plot_summary(output_pdf: &Path, summary_files: &[PathBuf]) -> Result<(), failure::Error> {
    info!("Plotting {}", output_pdf.display());
    let mut args: Vec<&OsStr> = vec![output_pdf.as_os_str()];
    args.extend(summary_files.iter().map(|p| p.as_os_str()));
    run_script(SUMMARY_SCRIPT, "plot_blt_summary", &args)
}

/// Renders one sample's per-target cut-rate plot from its targets table.
pub fn plot_targets(targets_file: &Path, output_pdf: &Path) -> Result<(), failure::Error> {
    info!("Plotting {}", output_pdf.display());
    run_script(
        TARGETS_SCRIPT,
        "plot_blt_targets",
        &[targets_file.as_os_str(), output_pdf.as_os_str()],
    )
}
