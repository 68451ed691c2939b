//! Top-k stone prediction on top of the model provider.

use std::cmp::Ordering;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

use log::warn;
use serde::Serialize;

use crate::error::ClassifyError;
use crate::labels::LabelMap;
use crate::model::ModelProvider;
use crate::preprocess;

/// Number of candidates returned by `predict_top3`.
pub const TOP_K: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionEntry {
    /// 1-based position, 1 being the most likely stone
    pub rank: u32,

    /// Stone label
    pub stone: String,

    /// Confidence among the returned candidates, rounded to 4 decimals
    pub probability: f64,
}

/// Ranked predictions, most likely first. Serializes as a bare list.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PredictionResult(Vec<PredictionEntry>);

impl PredictionResult {
    pub fn entries(&self) -> &[PredictionEntry] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PredictionEntry> {
        self.0.iter()
    }
}

impl IntoIterator for PredictionResult {
    type Item = PredictionEntry;
    type IntoIter = std::vec::IntoIter<PredictionEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

pub struct InferenceEngine {
    labels: LabelMap,
    provider: ModelProvider,

    /// Class count of the last model seen to disagree with the labels
    mismatched_classes: AtomicUsize,
}

impl InferenceEngine {
    pub fn new(labels: LabelMap, provider: ModelProvider) -> Self {
        InferenceEngine {
            labels,
            provider,
            mismatched_classes: AtomicUsize::new(0),
        }
    }

    pub fn labels(&self) -> &LabelMap {
        &self.labels
    }

    pub fn provider(&self) -> &ModelProvider {
        &self.provider
    }

    pub fn predict_top3(&self, raw: &[u8]) -> Result<PredictionResult, ClassifyError> {
        self.predict_top_k(raw, TOP_K)
    }

    /// Classify `raw` and return the `k` most likely stones, their
    /// probabilities rescaled to sum to one.
    ///
    /// The image is decoded before the model is touched; only resizing and
    /// normalization depend on the model's profile.
    pub fn predict_top_k(&self, raw: &[u8], k: usize) -> Result<PredictionResult, ClassifyError> {
        let image = preprocess::decode(raw)?;

        let model = self.provider.get_model()?;
        let tensor = preprocess::shape(&image, model.profile());
        let probs = model.infer(&tensor)?;

        if probs.is_empty() {
            return Err(ClassifyError::Inference(
                "model returned an empty probability vector".to_owned(),
            ));
        }

        self.check_class_count(probs.len());

        let entries = top_k(&probs, k)
            .into_iter()
            .enumerate()
            .map(|(i, (index, probability))| PredictionEntry {
                rank: i as u32 + 1,
                stone: self.labels.resolve(index),
                probability,
            })
            .collect();

        Ok(PredictionResult(entries))
    }

    /// Classify an image previously stored on disk.
    pub fn predict_file(&self, path: &Path) -> Result<PredictionResult, ClassifyError> {
        self.predict_file_top_k(path, TOP_K)
    }

    pub fn predict_file_top_k(
        &self,
        path: &Path,
        k: usize,
    ) -> Result<PredictionResult, ClassifyError> {
        let raw = fs::read(path).map_err(|source| ClassifyError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        self.predict_top_k(&raw, k)
    }

    /// Warn once per model size that disagrees with the label map. Returns
    /// whether a warning was emitted.
    fn check_class_count(&self, classes: usize) -> bool {
        if classes == self.labels.len() {
            return false;
        }

        if self.mismatched_classes.swap(classes, AtomicOrdering::Relaxed) == classes {
            return false;
        }

        warn!(
            "Model scores {} classes but the label map has {}; unmapped classes get placeholder labels",
            classes,
            self.labels.len()
        );

        true
    }
}

/// Indices of the `k` highest scores, highest first, with their scores
/// divided by the sum of the selected ones and rounded to 4 decimals.
///
/// Equal scores keep ascending index order. NaN ranks below any number. If
/// the selected scores sum to zero the candidates share the mass evenly.
pub fn top_k(probs: &[f32], k: usize) -> Vec<(usize, f64)> {
    let score = |i: usize| {
        let p = probs[i];
        if p.is_nan() {
            f64::NEG_INFINITY
        } else {
            p as f64
        }
    };

    let mut order: Vec<usize> = (0..probs.len()).collect();
    order.sort_by(|&a, &b| score(b).partial_cmp(&score(a)).unwrap_or(Ordering::Equal));
    order.truncate(k);

    let selected: Vec<f64> = order.iter().map(|&i| score(i).max(0.0)).collect();
    let sum: f64 = selected.iter().sum();

    order
        .into_iter()
        .zip(selected)
        .map(|(index, p)| {
            let share = if sum > 0.0 && sum.is_finite() {
                p / sum
            } else {
                1.0 / k.min(probs.len()) as f64
            };
            (index, round4(share))
        })
        .collect()
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
