use std::fmt;
use std::str::FromStr;

use failure;

/// Closed set of supported nucleases. Each variant knows where its PAM sits
/// relative to the target and which tail layout the read extractor applies.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum Enzyme {
    Cas9,
}

impl Enzyme {
    pub fn pam_is_5prime_of_target(&self) -> bool {
        match self {
            Enzyme::Cas9 => false,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Enzyme::Cas9 => "Cas9",
        }
    }
}

impl FromStr for Enzyme {
    type Err = failure::Error;

    fn from_str(s: &str) -> Result<Self, failure::Error> {
        if s.eq_ignore_ascii_case("cas9") {
            Ok(Enzyme::Cas9)
        } else {
            Err(format_err!("Unknown enzyme {:?}", s))
        }
    }
}

impl fmt::Display for Enzyme {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}
