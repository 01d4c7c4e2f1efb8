use crate::scoring::RiskClass;
use serde::{Deserialize, Serialize};

const LOG_LOSS_EPS: f64 = 1e-15;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    pub rmse: f64,
    pub mae: f64,
    pub r2: f64,
}

impl RegressionMetrics {
    pub fn evaluate(actual: &[f64], predicted: &[f64]) -> Self {
        let n = actual.len().max(1) as f64;
        let mean = actual.iter().sum::<f64>() / n;

        let mut squared = 0.0;
        let mut absolute = 0.0;
        let mut total = 0.0;
        for (y, p) in actual.iter().zip(predicted) {
            squared += (y - p) * (y - p);
            absolute += (y - p).abs();
            total += (y - mean) * (y - mean);
        }

        let r2 = if total > 0.0 {
            1.0 - squared / total
        } else if squared == 0.0 {
            1.0
        } else {
            0.0
        };

        Self {
            rmse: (squared / n).sqrt(),
            mae: absolute / n,
            r2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    /// Macro one-vs-rest AUC over classes with both positives and negatives in the test set.
    pub auc: Option<f64>,
    pub log_loss: Option<f64>,
    /// Rows are actual classes, columns predicted classes.
    pub confusion_matrix: [[u32; RiskClass::COUNT]; RiskClass::COUNT],
}

impl ClassificationMetrics {
    pub fn evaluate(actual: &[usize], probabilities: &[[f64; RiskClass::COUNT]]) -> Self {
        let predicted: Vec<usize> = probabilities.iter().map(argmax).collect();

        let mut confusion_matrix = [[0u32; RiskClass::COUNT]; RiskClass::COUNT];
        let mut correct = 0usize;
        for (truth, guess) in actual.iter().zip(&predicted) {
            confusion_matrix[*truth][*guess] += 1;
            if truth == guess {
                correct += 1;
            }
        }

        Self {
            accuracy: correct as f64 / actual.len().max(1) as f64,
            auc: macro_auc(actual, probabilities),
            log_loss: log_loss(actual, probabilities),
            confusion_matrix,
        }
    }
}

pub(crate) fn argmax(probabilities: &[f64; RiskClass::COUNT]) -> usize {
    let mut best = 0;
    for (index, value) in probabilities.iter().enumerate() {
        if *value > probabilities[best] {
            best = index;
        }
    }
    best
}

fn macro_auc(actual: &[usize], probabilities: &[[f64; RiskClass::COUNT]]) -> Option<f64> {
    let scores: Vec<f64> = (0..RiskClass::COUNT)
        .filter_map(|class| {
            let column: Vec<f64> = probabilities.iter().map(|row| row[class]).collect();
            let positives: Vec<bool> = actual.iter().map(|label| *label == class).collect();
            binary_auc(&column, &positives)
        })
        .collect();

    if scores.is_empty() {
        None
    } else {
        Some(scores.iter().sum::<f64>() / scores.len() as f64)
    }
}

/// Mann-Whitney AUC with average ranks for ties.
fn binary_auc(scores: &[f64], positives: &[bool]) -> Option<f64> {
    let n_pos = positives.iter().filter(|p| **p).count();
    let n_neg = positives.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|a, b| scores[*a].total_cmp(&scores[*b]));

    let mut rank_sum = 0.0;
    let mut start = 0;
    while start < order.len() {
        let mut end = start;
        while end + 1 < order.len() && scores[order[end + 1]] == scores[order[start]] {
            end += 1;
        }
        let average_rank = (start + end) as f64 / 2.0 + 1.0;
        for &index in &order[start..=end] {
            if positives[index] {
                rank_sum += average_rank;
            }
        }
        start = end + 1;
    }

    let n_pos = n_pos as f64;
    Some((rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg as f64))
}

fn log_loss(actual: &[usize], probabilities: &[[f64; RiskClass::COUNT]]) -> Option<f64> {
    if actual.is_empty() {
        return None;
    }
    let total: f64 = actual
        .iter()
        .zip(probabilities)
        .map(|(truth, row)| {
            let clipped: Vec<f64> = row
                .iter()
                .map(|p| p.clamp(LOG_LOSS_EPS, 1.0 - LOG_LOSS_EPS))
                .collect();
            let norm: f64 = clipped.iter().sum();
            -(clipped[*truth] / norm).ln()
        })
        .sum();
    Some(total / actual.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_regression_scores_one() {
        let metrics = RegressionMetrics::evaluate(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]);
        assert_eq!(metrics.rmse, 0.0);
        assert_eq!(metrics.r2, 1.0);
    }

    #[test]
    fn regression_errors_accumulate() {
        let metrics = RegressionMetrics::evaluate(&[0.0, 4.0], &[1.0, 3.0]);
        assert_eq!(metrics.mae, 1.0);
        assert_eq!(metrics.rmse, 1.0);
        assert!((metrics.r2 - 0.75).abs() < 1e-12);
    }

    #[test]
    fn separable_probabilities_reach_full_auc() {
        let actual = [0, 1, 2, 0];
        let probabilities = [
            [0.9, 0.05, 0.05, 0.0],
            [0.1, 0.8, 0.1, 0.0],
            [0.1, 0.1, 0.8, 0.0],
            [0.7, 0.2, 0.1, 0.0],
        ];
        let metrics = ClassificationMetrics::evaluate(&actual, &probabilities);
        assert_eq!(metrics.accuracy, 1.0);
        assert_eq!(metrics.auc, Some(1.0));
        assert_eq!(metrics.confusion_matrix[0][0], 2);
        assert!(metrics.log_loss.expect("non-empty") < 0.3);
    }

    #[test]
    fn tied_scores_give_half_auc() {
        assert_eq!(binary_auc(&[0.5, 0.5], &[true, false]), Some(0.5));
        assert_eq!(binary_auc(&[0.5, 0.5], &[true, true]), None);
    }
}
