pub mod vector;

pub use vector::{build, FeatureInputs, FeatureSpec, FeatureVector, FEATURE_COUNT, SCHEMA};
