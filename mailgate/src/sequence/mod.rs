pub mod model;
pub mod ood;

pub use model::CharSequenceModel;
pub use ood::{OodAssessment, OodDetector, OodZone};
