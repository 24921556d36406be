extern crate blt_assign;
#[macro_use]
extern crate clap;
extern crate env_logger;

use std::path::PathBuf;
use std::process;

use clap::{App, Arg};

use blt_assign::analyze::{analyze_experiment, Config};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let matches = App::new("blt-analyze")
        .version("1.0")
        .about("Analyze a Barcoded Library of Targets (BLT) nuclease specificity experiment")
        .arg(Arg::with_name("input")
             .short("i")
             .long("input")
             .value_name("FASTQ")
             .help("Input FASTQ file(s), plain or gzipped")
             .takes_value(true)
             .multiple(true)
             .required(true))
        .arg(Arg::with_name("samples")
             .short("s")
             .long("samples")
             .value_name("MANIFEST")
             .help("Tab-delimited sample manifest")
             .takes_value(true)
             .required(true))
        .arg(Arg::with_name("output")
             .short("o")
             .long("output")
             .value_name("DIR")
             .help("Output directory")
             .takes_value(true)
             .required(true))
        .arg(Arg::with_name("maxmismatches")
             .short("m")
             .long("max-mismatches")
             .value_name("MISMATCHES")
             .help("Maximum mismatches between a read and a sample barcode")
             .takes_value(true)
             .default_value("2"))
        .arg(Arg::with_name("mindistance")
             .short("d")
             .long("min-distance")
             .value_name("DISTANCE")
             .help("Minimum mismatch margin between the best and next-best sample barcode")
             .takes_value(true)
             .default_value("2"))
        .arg(Arg::with_name("minquality")
             .short("q")
             .long("min-quality")
             .value_name("QUALITY")
             .help("Minimum mean quality across the barcode, target, and UMI bases")
             .takes_value(true)
             .default_value("20"))
        .arg(Arg::with_name("minuncutreads")
             .short("u")
             .long("min-uncut-reads")
             .value_name("READS")
             .help("Minimum uncut reads to validate a target/UMI pairing")
             .takes_value(true)
             .default_value("3"))
        .arg(Arg::with_name("minidenticalfraction")
             .short("f")
             .long("min-identical-fraction")
             .value_name("FRACTION")
             .help("Minimum fraction of uncut reads agreeing on the target sequence")
             .takes_value(true)
             .default_value("0.9"))
        .arg(Arg::with_name("usecutsamples")
             .short("c")
             .long("use-cut-samples-in-validation")
             .help("Use uncut reads from cut samples when validating targets"))
        .arg(Arg::with_name("fixedguidelength")
             .short("l")
             .long("fixed-guide-length")
             .value_name("LENGTH")
             .help("Fixed target region length for libraries padded beyond the guide")
             .takes_value(true))
        .arg(Arg::with_name("threads")
             .short("t")
             .long("threads")
             .value_name("THREADS")
             .help("Worker threads for per-sample metric generation")
             .takes_value(true)
             .default_value("4"))
        .get_matches();

    let fixed_guide_length = if matches.is_present("fixedguidelength") {
        Some(value_t!(matches.value_of("fixedguidelength"), usize).unwrap_or_else(|e| e.exit()))
    } else {
        None
    };

    let config = Config {
        input_fastqs: matches
            .values_of("input")
            .unwrap()
            .map(PathBuf::from)
            .collect(),
        manifest: PathBuf::from(matches.value_of("samples").unwrap()),
        output_dir: PathBuf::from(matches.value_of("output").unwrap()),
        max_mismatches: value_t!(matches.value_of("maxmismatches"), usize)
            .unwrap_or_else(|e| e.exit()),
        min_distance: value_t!(matches.value_of("mindistance"), usize)
            .unwrap_or_else(|e| e.exit()),
        min_mean_quality: value_t!(matches.value_of("minquality"), f64)
            .unwrap_or_else(|e| e.exit()),
        min_uncut_reads: value_t!(matches.value_of("minuncutreads"), usize)
            .unwrap_or_else(|e| e.exit()),
        min_identical_fraction: value_t!(matches.value_of("minidenticalfraction"), f64)
            .unwrap_or_else(|e| e.exit()),
        use_cut_samples_in_validation: matches.is_present("usecutsamples"),
        fixed_guide_length: fixed_guide_length,
        threads: value_t!(matches.value_of("threads"), usize).unwrap_or_else(|e| e.exit()),
    };

    if let Err(ref e) = analyze_experiment(&config) {
        eprintln!("error: {}", e);
        for cause in e.iter_causes() {
            eprintln!("caused by: {}", cause);
        }
        process::exit(1);
    }
}
