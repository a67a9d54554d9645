use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::StoreError;
use crate::types::Label;

/// Binary classification metrics with label 1 as the positive class.
///
/// Ratios are `None` when their denominator is zero.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub tn: f64,
    pub fp: f64,
    #[serde(rename = "fn")]
    pub fn_: f64,
    pub tp: f64,
    pub accuracy: Option<f64>,
    pub precision: Option<f64>,
    pub recall: Option<f64>,
    pub specificity: Option<f64>,
    pub f1_score: Option<f64>,
    pub f05_score: Option<f64>,
    pub f2_score: Option<f64>,
    /// Area under the ROC curve of the predictions; `None` unless both classes occur.
    pub roc_auc: Option<f64>,
}

impl ClassificationMetrics {
    /// Compare `predictions` against `labels` position by position.
    pub fn from_predictions(predictions: &[Label], labels: &[Label]) -> Result<Self, StoreError> {
        if predictions.len() != labels.len() {
            return Err(StoreError::Input(format!(
                "{} predictions for {} labels",
                predictions.len(),
                labels.len()
            )));
        }
        let (mut tn, mut fp, mut fn_, mut tp) = (0_u64, 0_u64, 0_u64, 0_u64);
        for (prediction, label) in predictions.iter().zip(labels) {
            match (*prediction, *label) {
                (0, 0) => tn += 1,
                (1, 0) => fp += 1,
                (0, 1) => fn_ += 1,
                (1, 1) => tp += 1,
                (prediction, label) => {
                    return Err(StoreError::Input(format!(
                        "prediction {prediction} / label {label} outside {{0, 1}}"
                    )));
                }
            }
        }
        let (tn, fp, fn_, tp) = (tn as f64, fp as f64, fn_ as f64, tp as f64);
        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fn_);
        Ok(Self {
            tn,
            fp,
            fn_,
            tp,
            accuracy: ratio(tp + tn, tp + tn + fp + fn_),
            precision,
            recall,
            specificity: ratio(tn, tn + fp),
            f1_score: f_beta(precision, recall, 1.0),
            f05_score: f_beta(precision, recall, 0.5),
            f2_score: f_beta(precision, recall, 2.0),
            roc_auc: roc_auc(predictions, labels),
        })
    }

    /// Field-wise mean; each ratio averages only the runs where it is defined.
    pub fn average(runs: &[ClassificationMetrics]) -> Option<ClassificationMetrics> {
        if runs.is_empty() {
            return None;
        }
        let count = runs.len() as f64;
        let mean = |get: fn(&ClassificationMetrics) -> f64| runs.iter().map(get).sum::<f64>() / count;
        let mean_defined = |get: fn(&ClassificationMetrics) -> Option<f64>| {
            let values: Vec<f64> = runs.iter().filter_map(get).collect();
            (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
        };
        Some(ClassificationMetrics {
            tn: mean(|m| m.tn),
            fp: mean(|m| m.fp),
            fn_: mean(|m| m.fn_),
            tp: mean(|m| m.tp),
            accuracy: mean_defined(|m| m.accuracy),
            precision: mean_defined(|m| m.precision),
            recall: mean_defined(|m| m.recall),
            specificity: mean_defined(|m| m.specificity),
            f1_score: mean_defined(|m| m.f1_score),
            f05_score: mean_defined(|m| m.f05_score),
            f2_score: mean_defined(|m| m.f2_score),
            roc_auc: mean_defined(|m| m.roc_auc),
        })
    }
}

impl fmt::Display for ClassificationMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "TP: {} | TN: {} | FP: {} | FN: {}",
            self.tp, self.tn, self.fp, self.fn_
        )?;
        let rows = [
            ("Accuracy", self.accuracy),
            ("Precision", self.precision),
            ("Recall", self.recall),
            ("Specificity", self.specificity),
            ("F1-score", self.f1_score),
            ("F0.5-score", self.f05_score),
            ("F2-score", self.f2_score),
            ("AUC", self.roc_auc),
        ];
        for (name, value) in rows {
            match value {
                Some(value) => writeln!(f, "{name}: {:.3}%", value * 100.0)?,
                None => writeln!(f, "{name}: undefined")?,
            }
        }
        Ok(())
    }
}

fn ratio(numerator: f64, denominator: f64) -> Option<f64> {
    (denominator > 0.0).then(|| numerator / denominator)
}

fn f_beta(precision: Option<f64>, recall: Option<f64>, beta: f64) -> Option<f64> {
    let (precision, recall) = (precision?, recall?);
    let beta2 = beta * beta;
    ratio((1.0 + beta2) * precision * recall, beta2 * precision + recall)
}

/// Probability that a random positive is ranked above a random negative (ties count half).
fn roc_auc(predictions: &[Label], labels: &[Label]) -> Option<f64> {
    let mut positives = [0_u64; 2];
    let mut negatives = [0_u64; 2];
    for (prediction, label) in predictions.iter().zip(labels) {
        let slot = usize::from(*prediction);
        if *label == 1 {
            positives[slot] += 1;
        } else {
            negatives[slot] += 1;
        }
    }
    let pos_total = positives[0] + positives[1];
    let neg_total = negatives[0] + negatives[1];
    if pos_total == 0 || neg_total == 0 {
        return None;
    }
    let wins = positives[1] * negatives[0];
    let ties = positives[0] * negatives[0] + positives[1] * negatives[1];
    Some((wins as f64 + 0.5 * ties as f64) / (pos_total * neg_total) as f64)
}
