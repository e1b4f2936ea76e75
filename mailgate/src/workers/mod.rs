pub mod dated;
pub mod naturalness;
pub mod sequential;
pub mod structure;

use dated::DatedPattern;
use naturalness::Naturalness;
use sequential::SequentialPattern;
use structure::StructuralFeatures;

/// Everything the local-part analyzers know about one normalized local part.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocalPartSignals {
    pub structure: StructuralFeatures,
    pub naturalness: Naturalness,
    pub sequential: SequentialPattern,
    pub dated: DatedPattern,
}

/// Run every analyzer over the normalized local part.
/// All analyzers are total: degenerate input yields their neutral result.
pub fn run_all(local: &str, reference_year: i32) -> LocalPartSignals {
    LocalPartSignals {
        structure: structure::analyze(local),
        naturalness: naturalness::analyze(local),
        sequential: sequential::analyze(local),
        dated: dated::analyze(local, reference_year),
    }
}
