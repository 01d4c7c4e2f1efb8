use super::ensemble::{Classifier, EnsembleParams, TrainingMatrix};
use super::split::stratified_folds;
use super::tree::StructureError;
use crate::scoring::RiskClass;
use serde::{Deserialize, Serialize};

const N_CLASSES: usize = RiskClass::COUNT;
pub const CALIBRATION_FOLDS: usize = 3;

/// Monotone non-decreasing step fit, interpolated linearly between knots and clipped at the ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsotonicRegression {
    x: Vec<f64>,
    y: Vec<f64>,
}

impl IsotonicRegression {
    /// Pool-adjacent-violators over `(x, y)` pairs. Equal `x` values are merged first.
    pub fn fit(x: &[f64], y: &[f64]) -> Self {
        let mut order: Vec<usize> = (0..x.len()).collect();
        order.sort_by(|a, b| x[*a].total_cmp(&x[*b]));

        // (x, mean y, weight)
        let mut points: Vec<(f64, f64, f64)> = Vec::with_capacity(order.len());
        for index in order {
            match points.last_mut() {
                Some(last) if last.0 == x[index] => {
                    last.1 = (last.1 * last.2 + y[index]) / (last.2 + 1.0);
                    last.2 += 1.0;
                }
                _ => points.push((x[index], y[index], 1.0)),
            }
        }

        // Blocks of (first point, last point, mean, weight).
        let mut blocks: Vec<(usize, usize, f64, f64)> = Vec::with_capacity(points.len());
        for (position, (_, value, weight)) in points.iter().enumerate() {
            blocks.push((position, position, *value, *weight));
            while blocks.len() > 1 {
                let last = blocks[blocks.len() - 1];
                let previous = blocks[blocks.len() - 2];
                if previous.2 <= last.2 {
                    break;
                }
                let weight = previous.3 + last.3;
                let merged = (
                    previous.0,
                    last.1,
                    (previous.2 * previous.3 + last.2 * last.3) / weight,
                    weight,
                );
                blocks.pop();
                blocks.pop();
                blocks.push(merged);
            }
        }

        let mut fitted_y = vec![0.0; points.len()];
        for (start, end, value, _) in blocks {
            fitted_y[start..=end].iter_mut().for_each(|slot| *slot = value);
        }

        Self {
            x: points.iter().map(|point| point.0).collect(),
            y: fitted_y,
        }
    }

    pub fn check(&self) -> Result<(), StructureError> {
        if self.x.len() == self.y.len() {
            Ok(())
        } else {
            Err(StructureError::Calibrator {
                knots: self.x.len(),
                values: self.y.len(),
            })
        }
    }

    pub fn predict(&self, value: f64) -> f64 {
        let (Some(first), Some(last)) = (self.x.first(), self.x.last()) else {
            return 0.0;
        };
        if value <= *first {
            return self.y[0];
        }
        if value >= *last {
            return self.y[self.y.len() - 1];
        }
        let upper = self.x.partition_point(|knot| *knot < value);
        let lower = upper - 1;
        let span = self.x[upper] - self.x[lower];
        if span <= 0.0 {
            return self.y[upper];
        }
        let t = (value - self.x[lower]) / span;
        self.y[lower] + t * (self.y[upper] - self.y[lower])
    }
}

/// One fold's classifier with a per-class isotonic map learned on its held-out rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibratedFold {
    classifier: Classifier,
    calibrators: Vec<IsotonicRegression>,
}

impl CalibratedFold {
    fn check(&self, n_features: usize) -> Result<(), StructureError> {
        self.classifier.check(n_features)?;
        if self.calibrators.len() != N_CLASSES {
            return Err(StructureError::ClassCount {
                expected: N_CLASSES,
                found: self.calibrators.len(),
            });
        }
        self.calibrators.iter().try_for_each(IsotonicRegression::check)
    }

    fn predict_proba(&self, row: &[f64]) -> [f64; N_CLASSES] {
        let raw = self.classifier.predict_proba(row);
        let mut out = [0.0; N_CLASSES];
        for ((slot, value), calibrator) in out.iter_mut().zip(raw).zip(&self.calibrators) {
            *slot = calibrator.predict(value).clamp(0.0, 1.0);
        }
        let total: f64 = out.iter().sum();
        if total > 0.0 {
            out.iter_mut().for_each(|p| *p /= total);
            out
        } else {
            [1.0 / N_CLASSES as f64; N_CLASSES]
        }
    }
}

/// Cross-validated isotonic calibration of the risk classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibratedClassifier {
    folds: Vec<CalibratedFold>,
}

impl CalibratedClassifier {
    /// `None` when there are too few training rows to hold out a fold.
    pub fn fit(
        matrix: &TrainingMatrix<'_>,
        labels: &[usize],
        samples: &[usize],
        params: &EnsembleParams,
    ) -> Option<Self> {
        if samples.len() < CALIBRATION_FOLDS {
            return None;
        }

        let sample_labels: Vec<usize> = samples.iter().map(|&sample| labels[sample]).collect();
        let fold_positions = stratified_folds(&sample_labels, CALIBRATION_FOLDS, params.seed);

        let mut folds = Vec::with_capacity(CALIBRATION_FOLDS);
        for (held_out_index, held_out) in fold_positions.iter().enumerate() {
            let held_out: Vec<usize> = held_out.iter().map(|&position| samples[position]).collect();
            let fitting: Vec<usize> = fold_positions
                .iter()
                .enumerate()
                .filter(|(index, _)| *index != held_out_index)
                .flat_map(|(_, fold)| fold.iter().map(|&position| samples[position]))
                .collect();
            if held_out.is_empty() || fitting.is_empty() {
                continue;
            }

            let classifier = Classifier::fit(matrix, labels, &fitting, params).model;
            let held_out_proba: Vec<[f64; N_CLASSES]> = held_out
                .iter()
                .map(|&sample| classifier.predict_proba(matrix.row(sample)))
                .collect();

            let calibrators = (0..N_CLASSES)
                .map(|class| {
                    let x: Vec<f64> = held_out_proba.iter().map(|p| p[class]).collect();
                    let y: Vec<f64> = held_out
                        .iter()
                        .map(|&sample| if labels[sample] == class { 1.0 } else { 0.0 })
                        .collect();
                    IsotonicRegression::fit(&x, &y)
                })
                .collect();

            folds.push(CalibratedFold {
                classifier,
                calibrators,
            });
        }

        if folds.is_empty() {
            None
        } else {
            Some(Self { folds })
        }
    }

    pub fn check(&self, n_features: usize) -> Result<(), StructureError> {
        self.folds.iter().try_for_each(|fold| fold.check(n_features))
    }

    pub fn predict_proba(&self, row: &[f64]) -> [f64; N_CLASSES] {
        let mut out = [0.0; N_CLASSES];
        for fold in &self.folds {
            for (acc, value) in out.iter_mut().zip(fold.predict_proba(row)) {
                *acc += value;
            }
        }
        let n = self.folds.len().max(1) as f64;
        out.iter_mut().for_each(|p| *p /= n);
        out
    }
}
