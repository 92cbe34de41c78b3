//! Evaluation metrics for the churn classifier.
use serde::{Deserialize, Serialize};

/// Accuracy/precision/recall/F1 on the evaluation partition. Positive class
/// is churned (1). Informational only; training never fails on low values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvalMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

impl EvalMetrics {
    pub fn zero() -> Self {
        EvalMetrics {
            accuracy: 0.0,
            precision: 0.0,
            recall: 0.0,
            f1: 0.0,
        }
    }
}

/// Compute classification metrics from true and predicted 0/1 labels.
/// Empty inputs and zero denominators yield 0.0 instead of NaN.
pub fn classification_metrics(y_true: &[u8], y_pred: &[u8]) -> EvalMetrics {
    debug_assert_eq!(y_true.len(), y_pred.len());
    if y_true.is_empty() {
        return EvalMetrics::zero();
    }

    let mut tp = 0.0;
    let mut fp = 0.0;
    let mut tn = 0.0;
    let mut fn_ = 0.0;
    for (&truth, &pred) in y_true.iter().zip(y_pred) {
        match (truth, pred) {
            (1, 1) => tp += 1.0,
            (0, 1) => fp += 1.0,
            (0, 0) => tn += 1.0,
            _ => fn_ += 1.0,
        }
    }

    let accuracy = (tp + tn) / y_true.len() as f64;
    let precision = ratio(tp, tp + fp);
    let recall = ratio(tp, tp + fn_);
    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };

    EvalMetrics {
        accuracy,
        precision,
        recall,
        f1,
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}
