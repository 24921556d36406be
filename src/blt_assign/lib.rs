extern crate bio;
extern crate csv;
#[macro_use]
extern crate failure;
extern crate flate2;
#[macro_use]
extern crate log;
extern crate rayon;

pub mod align;
pub mod analysis;
pub mod analyze;
pub mod demux;
pub mod enzyme;
pub mod extract;
pub mod manifest;
pub mod metrics;
pub mod offtarget;
pub mod plot;
pub mod seqs;
pub mod stats;
