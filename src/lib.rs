pub mod browser;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod content;
pub mod dataset;
pub mod dns;
pub mod domain_utils;
pub mod features;
pub mod liveness;
pub mod logger;
pub mod pipeline;
pub mod visual;
pub mod whois;

pub use classifier::{Classifier, Predictor};
pub use features::{Feature, FeatureExtractor, FeatureVector, FEATURE_NAMES};
pub use liveness::{Liveness, LivenessGate, LivenessState};
pub use pipeline::{Pipeline, UrlOutcome};
