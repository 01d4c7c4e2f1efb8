use super::tree::StructureError;
use super::ModelError;
use serde::{Deserialize, Serialize};

/// Per-column z-score standardization fitted on the training partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl StandardScaler {
    /// Population statistics; constant columns keep a unit scale.
    pub fn fit(rows: &[Vec<f64>]) -> Self {
        let width = rows.first().map_or(0, Vec::len);
        let n = rows.len().max(1) as f64;

        let mut mean = vec![0.0; width];
        for row in rows {
            for (acc, value) in mean.iter_mut().zip(row) {
                *acc += value;
            }
        }
        mean.iter_mut().for_each(|acc| *acc /= n);

        let mut variance = vec![0.0; width];
        for row in rows {
            for ((acc, value), mu) in variance.iter_mut().zip(row).zip(&mean) {
                *acc += (value - mu) * (value - mu);
            }
        }
        let scale = variance
            .into_iter()
            .map(|sum| {
                let std = (sum / n).sqrt();
                if std > f64::EPSILON {
                    std
                } else {
                    1.0
                }
            })
            .collect();

        Self { mean, scale }
    }

    pub fn width(&self) -> usize {
        self.mean.len()
    }

    pub fn check(&self, n_features: usize) -> Result<(), StructureError> {
        let found = self.mean.len().min(self.scale.len());
        if self.mean.len() == n_features && self.scale.len() == n_features {
            Ok(())
        } else {
            Err(StructureError::ScalerWidth {
                expected: n_features,
                found,
            })
        }
    }

    pub fn transform_row(&self, row: &[f64]) -> Result<Vec<f64>, ModelError> {
        if row.len() != self.width() {
            return Err(ModelError::DimensionMismatch {
                expected: self.width(),
                found: row.len(),
            });
        }
        Ok(row
            .iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(value, (mu, sigma))| (value - mu) / sigma)
            .collect())
    }

    pub fn transform(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, ModelError> {
        rows.iter().map(|row| self.transform_row(row)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standardizes_columns_and_keeps_constant_columns_finite() {
        let rows = vec![vec![1.0, 5.0], vec![3.0, 5.0]];
        let scaler = StandardScaler::fit(&rows);
        let scaled = scaler.transform(&rows).expect("widths match");
        assert_eq!(scaled[0], vec![-1.0, 0.0]);
        assert_eq!(scaled[1], vec![1.0, 0.0]);
    }

    #[test]
    fn rejects_rows_of_the_wrong_width() {
        let scaler = StandardScaler::fit(&[vec![1.0, 2.0]]);
        assert!(matches!(
            scaler.transform_row(&[1.0]),
            Err(ModelError::DimensionMismatch { expected: 2, found: 1 })
        ));
    }
}
