//! Trained phishing classifier loaded from a JSON model file.
//!
//! Two model kinds are supported: a logistic regression and a random forest
//! exported in scikit-learn's flattened tree layout. Class order for the
//! forest is `[-1, 1]` (legitimate, phishing).

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::features::{FeatureVector, FEATURE_COUNT, FEATURE_NAMES};

/// Sentinel sklearn uses for "no child"
const LEAF: i64 = -1;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("Model file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read model file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse model file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Model expects {found} features, vector has {expected}")]
    FeatureCount { expected: usize, found: usize },

    #[error("Model feature {index} is '{found}', expected '{expected}'")]
    FeatureName {
        index: usize,
        expected: String,
        found: String,
    },

    #[error("Logistic model has {0} weights")]
    WeightCount(usize),

    #[error("Forest has no trees")]
    EmptyForest,

    #[error("Tree {tree}: {reason}")]
    MalformedTree { tree: usize, reason: String },
}

/// Binary phishing verdict for a feature vector.
pub trait Predictor: Send + Sync {
    /// `true` means phishing.
    fn predict(&self, vector: &FeatureVector) -> Result<bool, ClassifierError>;
}

#[derive(Debug, Clone, Deserialize)]
struct ModelFile {
    feature_names: Vec<String>,
    #[serde(flatten)]
    model: Model,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum Model {
    Logistic {
        weights: Vec<f64>,
        intercept: f64,
        #[serde(default = "default_threshold")]
        threshold: f64,
    },
    Forest { trees: Vec<Tree> },
}

fn default_threshold() -> f64 {
    0.5
}

/// One decision tree in sklearn's parallel-array layout
#[derive(Debug, Clone, Deserialize)]
pub struct Tree {
    pub children_left: Vec<i64>,
    pub children_right: Vec<i64>,
    pub feature: Vec<i64>,
    pub threshold: Vec<f64>,
    /// Per node class counts (or weights) in class order `[-1, 1]`
    pub value: Vec<[f64; 2]>,
}

impl Tree {
    fn validate(&self, index: usize) -> Result<(), ClassifierError> {
        let nodes = self.children_left.len();
        let malformed = |reason: String| ClassifierError::MalformedTree { tree: index, reason };

        if nodes == 0 {
            return Err(malformed("no nodes".to_string()));
        }
        if [self.children_right.len(), self.feature.len(), self.threshold.len(), self.value.len()]
            .iter()
            .any(|&len| len != nodes)
        {
            return Err(malformed("node arrays differ in length".to_string()));
        }
        for node in 0..nodes {
            let (left, right) = (self.children_left[node], self.children_right[node]);
            if (left == LEAF) != (right == LEAF) {
                return Err(malformed(format!("node {} has exactly one child", node)));
            }
            if left == LEAF {
                continue;
            }
            // Children always follow their parent in sklearn exports, which also rules out cycles
            for child in [left, right] {
                if child <= node as i64 || child as usize >= nodes {
                    return Err(malformed(format!("node {} points to invalid child {}", node, child)));
                }
            }
            let feature = self.feature[node];
            if feature < 0 || feature as usize >= FEATURE_COUNT {
                return Err(malformed(format!("node {} splits on feature {}", node, feature)));
            }
        }
        Ok(())
    }

    /// Phishing probability at the leaf reached by `values`.
    fn phish_probability(&self, values: &[i32; FEATURE_COUNT]) -> f64 {
        let mut node = 0usize;
        while self.children_left[node] != LEAF {
            let value = values[self.feature[node] as usize] as f64;
            node = if value <= self.threshold[node] {
                self.children_left[node] as usize
            } else {
                self.children_right[node] as usize
            };
        }
        let [legit, phish] = self.value[node];
        let total = legit + phish;
        if total > 0.0 { phish / total } else { 0.5 }
    }
}

/// A validated model, loaded once and shared by the pipeline.
#[derive(Debug, Clone)]
pub struct Classifier {
    model: Model,
    source: PathBuf,
}

impl Classifier {
    /// Load and validate a model file. Every schema problem is reported
    /// here so that prediction never sees an inconsistent model.
    pub fn load(path: &Path) -> Result<Self, ClassifierError> {
        if !path.exists() {
            return Err(ClassifierError::NotFound(path.to_path_buf()));
        }
        let content = fs::read_to_string(path)?;
        let classifier = Self::from_json(&content, path)?;
        info!("Loaded {} model from {}", classifier.kind(), path.display());
        Ok(classifier)
    }

    pub fn from_json(content: &str, source: &Path) -> Result<Self, ClassifierError> {
        let file: ModelFile = serde_json::from_str(content)?;
        validate_feature_names(&file.feature_names)?;

        match &file.model {
            Model::Logistic { weights, .. } => {
                if weights.len() != FEATURE_COUNT {
                    return Err(ClassifierError::WeightCount(weights.len()));
                }
            }
            Model::Forest { trees } => {
                if trees.is_empty() {
                    return Err(ClassifierError::EmptyForest);
                }
                for (i, tree) in trees.iter().enumerate() {
                    tree.validate(i)?;
                }
            }
        }

        Ok(Self {
            model: file.model,
            source: source.to_path_buf(),
        })
    }

    pub fn kind(&self) -> &'static str {
        match self.model {
            Model::Logistic { .. } => "logistic",
            Model::Forest { .. } => "forest",
        }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Probability that the vector is phishing
    pub fn phish_probability(&self, vector: &FeatureVector) -> f64 {
        let values = vector.to_array();
        match &self.model {
            Model::Logistic { weights, intercept, .. } => {
                let z = weights
                    .iter()
                    .zip(values.iter())
                    .map(|(w, &x)| w * x as f64)
                    .sum::<f64>()
                    + intercept;
                1.0 / (1.0 + (-z).exp())
            }
            Model::Forest { trees } => {
                trees.iter().map(|t| t.phish_probability(&values)).sum::<f64>() / trees.len() as f64
            }
        }
    }

    fn threshold(&self) -> f64 {
        match self.model {
            Model::Logistic { threshold, .. } => threshold,
            Model::Forest { .. } => 0.5,
        }
    }
}

impl Predictor for Classifier {
    fn predict(&self, vector: &FeatureVector) -> Result<bool, ClassifierError> {
        let probability = self.phish_probability(vector);
        debug!("Phishing probability {:.3} ({} model)", probability, self.kind());
        Ok(probability > self.threshold())
    }
}

fn validate_feature_names(names: &[String]) -> Result<(), ClassifierError> {
    if names.len() != FEATURE_COUNT {
        return Err(ClassifierError::FeatureCount {
            expected: FEATURE_COUNT,
            found: names.len(),
        });
    }
    for (index, (found, expected)) in names.iter().zip(FEATURE_NAMES.iter()).enumerate() {
        if !found.eq_ignore_ascii_case(expected) {
            return Err(ClassifierError::FeatureName {
                index,
                expected: expected.to_string(),
                found: found.clone(),
            });
        }
    }
    Ok(())
}
