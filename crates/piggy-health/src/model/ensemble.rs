use super::tree::{
    BinnedMatrix, Criterion, DecisionTree, FeatureBins, MaxFeatures, StructureError, TreeParams,
};
use crate::scoring::RiskClass;
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

const N_CLASSES: usize = RiskClass::COUNT;
const MIN_PRIOR: f64 = 1e-12;

/// Tree ensemble family used for both model heads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnsembleKind {
    GradientBoosting,
    RandomForest,
}

impl EnsembleKind {
    pub fn label(self) -> &'static str {
        match self {
            EnsembleKind::GradientBoosting => "gradient_boosting",
            EnsembleKind::RandomForest => "random_forest",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnsembleParams {
    pub kind: EnsembleKind,
    pub n_estimators: usize,
    pub seed: u64,
}

impl EnsembleParams {
    fn forest_tree(&self, max_features: MaxFeatures) -> TreeParams {
        TreeParams {
            max_depth: 10,
            min_samples_split: 10,
            min_samples_leaf: 5,
            max_features,
        }
    }

    fn boosting_tree(&self) -> TreeParams {
        TreeParams {
            max_depth: 5,
            min_samples_split: 40,
            min_samples_leaf: 20,
            max_features: MaxFeatures::All,
        }
    }
}

const LEARNING_RATE: f64 = 0.05;
const SUBSAMPLE: f64 = 0.8;

/// Training rows with their histogram bins, shared by every head and calibration fold.
pub struct TrainingMatrix<'a> {
    rows: &'a [Vec<f64>],
    bins: FeatureBins,
    binned: BinnedMatrix,
}

impl<'a> TrainingMatrix<'a> {
    pub fn new(rows: &'a [Vec<f64>], max_bins: usize) -> Self {
        let bins = FeatureBins::fit(rows, max_bins);
        let binned = bins.apply(rows);
        Self { rows, bins, binned }
    }

    pub fn n_features(&self) -> usize {
        self.binned.n_features()
    }

    pub fn row(&self, index: usize) -> &[f64] {
        &self.rows[index]
    }
}

/// A fitted ensemble and its normalized impurity-based feature importances.
pub struct Fitted<T> {
    pub model: T,
    pub importances: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Regressor {
    RandomForest {
        trees: Vec<DecisionTree>,
    },
    GradientBoosting {
        init: f64,
        learning_rate: f64,
        trees: Vec<DecisionTree>,
    },
}

impl Regressor {
    pub fn fit(
        matrix: &TrainingMatrix<'_>,
        targets: &[f64],
        samples: &[usize],
        params: &EnsembleParams,
    ) -> Fitted<Self> {
        match params.kind {
            EnsembleKind::RandomForest => fit_forest_regressor(matrix, targets, samples, params),
            EnsembleKind::GradientBoosting => {
                fit_boosted_regressor(matrix, targets, samples, params)
            }
        }
    }

    pub fn check(&self, n_features: usize) -> Result<(), StructureError> {
        let (Regressor::RandomForest { trees } | Regressor::GradientBoosting { trees, .. }) = self;
        trees.iter().try_for_each(|tree| tree.check(n_features, 1))
    }

    pub fn predict(&self, row: &[f64]) -> f64 {
        match self {
            Regressor::RandomForest { trees } => {
                if trees.is_empty() {
                    return 0.0;
                }
                let sum: f64 = trees.iter().map(|tree| leaf_scalar(tree, row)).sum();
                sum / trees.len() as f64
            }
            Regressor::GradientBoosting {
                init,
                learning_rate,
                trees,
            } => {
                init + trees
                    .iter()
                    .map(|tree| learning_rate * leaf_scalar(tree, row))
                    .sum::<f64>()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Classifier {
    RandomForest {
        trees: Vec<DecisionTree>,
    },
    GradientBoosting {
        init: [f64; N_CLASSES],
        learning_rate: f64,
        /// One tree per present class per round; absent classes keep their prior.
        rounds: Vec<[Option<DecisionTree>; N_CLASSES]>,
    },
}

impl Classifier {
    pub fn fit(
        matrix: &TrainingMatrix<'_>,
        labels: &[usize],
        samples: &[usize],
        params: &EnsembleParams,
    ) -> Fitted<Self> {
        match params.kind {
            EnsembleKind::RandomForest => fit_forest_classifier(matrix, labels, samples, params),
            EnsembleKind::GradientBoosting => {
                fit_boosted_classifier(matrix, labels, samples, params)
            }
        }
    }

    /// Forest leaves hold class proportions; boosted leaves hold one Newton step.
    pub fn check(&self, n_features: usize) -> Result<(), StructureError> {
        match self {
            Classifier::RandomForest { trees } => trees
                .iter()
                .try_for_each(|tree| tree.check(n_features, N_CLASSES)),
            Classifier::GradientBoosting { rounds, .. } => rounds
                .iter()
                .flatten()
                .flatten()
                .try_for_each(|tree| tree.check(n_features, 1)),
        }
    }

    pub fn predict_proba(&self, row: &[f64]) -> [f64; N_CLASSES] {
        match self {
            Classifier::RandomForest { trees } => {
                let mut probabilities = [0.0; N_CLASSES];
                for tree in trees {
                    for (acc, value) in probabilities.iter_mut().zip(tree.predict(row)) {
                        *acc += value;
                    }
                }
                let total: f64 = probabilities.iter().sum();
                if total > 0.0 {
                    probabilities.iter_mut().for_each(|p| *p /= total);
                    probabilities
                } else {
                    [1.0 / N_CLASSES as f64; N_CLASSES]
                }
            }
            Classifier::GradientBoosting {
                init,
                learning_rate,
                rounds,
            } => {
                let mut raw = *init;
                for round in rounds {
                    for (acc, tree) in raw.iter_mut().zip(round) {
                        if let Some(tree) = tree {
                            *acc += learning_rate * leaf_scalar(tree, row);
                        }
                    }
                }
                softmax(&raw)
            }
        }
    }
}

/// `n / (n_present_classes * n_c)` per row, computed over `samples`.
pub fn balanced_weights(labels: &[usize], samples: &[usize]) -> Vec<f64> {
    let mut counts = [0usize; N_CLASSES];
    for &sample in samples {
        counts[labels[sample]] += 1;
    }
    let present = counts.iter().filter(|count| **count > 0).count().max(1);
    let n = samples.len() as f64;

    labels
        .iter()
        .map(|label| {
            let count = counts[*label];
            if count == 0 {
                0.0
            } else {
                n / (present as f64 * count as f64)
            }
        })
        .collect()
}

fn leaf_scalar(tree: &DecisionTree, row: &[f64]) -> f64 {
    tree.predict(row).first().copied().unwrap_or(0.0)
}

fn softmax(raw: &[f64; N_CLASSES]) -> [f64; N_CLASSES] {
    let max = raw.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mut out = [0.0; N_CLASSES];
    for (slot, value) in out.iter_mut().zip(raw) {
        *slot = (value - max).exp();
    }
    let total: f64 = out.iter().sum();
    out.iter_mut().for_each(|p| *p /= total);
    out
}

fn bootstrap(samples: &[usize], rng: &mut StdRng) -> Vec<usize> {
    (0..samples.len())
        .map(|_| samples[rng.gen_range(0..samples.len())])
        .collect()
}

fn subsample(samples: &[usize], rng: &mut StdRng) -> Vec<usize> {
    let take = ((samples.len() as f64 * SUBSAMPLE).floor() as usize).clamp(1, samples.len());
    index::sample(rng, samples.len(), take)
        .into_iter()
        .map(|position| samples[position])
        .collect()
}

struct ImportanceAccumulator {
    totals: Vec<f64>,
}

impl ImportanceAccumulator {
    fn new(width: usize) -> Self {
        Self {
            totals: vec![0.0; width],
        }
    }

    fn add(&mut self, tree_importances: &[f64]) {
        let sum: f64 = tree_importances.iter().sum();
        if sum <= 0.0 {
            return;
        }
        for (acc, value) in self.totals.iter_mut().zip(tree_importances) {
            *acc += value / sum;
        }
    }

    fn finish(self) -> Vec<f64> {
        let sum: f64 = self.totals.iter().sum();
        if sum <= 0.0 {
            return self.totals;
        }
        self.totals.into_iter().map(|value| value / sum).collect()
    }
}

fn fit_forest_regressor(
    matrix: &TrainingMatrix<'_>,
    targets: &[f64],
    samples: &[usize],
    params: &EnsembleParams,
) -> Fitted<Regressor> {
    let weights = vec![1.0; matrix.rows.len()];
    let tree_params = params.forest_tree(MaxFeatures::All);
    let mut importances = ImportanceAccumulator::new(matrix.n_features());
    let mut trees = Vec::with_capacity(params.n_estimators);

    for index in 0..params.n_estimators {
        let mut rng = StdRng::seed_from_u64(params.seed.wrapping_add(index as u64));
        let drawn = bootstrap(samples, &mut rng);
        let fitted = DecisionTree::fit(
            &matrix.bins,
            &matrix.binned,
            Criterion::Variance { targets },
            &weights,
            drawn,
            &tree_params,
            &mut rng,
        );
        importances.add(&fitted.importances);
        trees.push(fitted.tree);
    }

    Fitted {
        model: Regressor::RandomForest { trees },
        importances: importances.finish(),
    }
}

fn fit_forest_classifier(
    matrix: &TrainingMatrix<'_>,
    labels: &[usize],
    samples: &[usize],
    params: &EnsembleParams,
) -> Fitted<Classifier> {
    let weights = balanced_weights(labels, samples);
    let tree_params = params.forest_tree(MaxFeatures::Sqrt);
    let mut importances = ImportanceAccumulator::new(matrix.n_features());
    let mut trees = Vec::with_capacity(params.n_estimators);

    for index in 0..params.n_estimators {
        let mut rng = StdRng::seed_from_u64(params.seed.wrapping_add(index as u64));
        let drawn = bootstrap(samples, &mut rng);
        let fitted = DecisionTree::fit(
            &matrix.bins,
            &matrix.binned,
            Criterion::Gini {
                labels,
                n_classes: N_CLASSES,
            },
            &weights,
            drawn,
            &tree_params,
            &mut rng,
        );
        importances.add(&fitted.importances);
        trees.push(fitted.tree);
    }

    Fitted {
        model: Classifier::RandomForest { trees },
        importances: importances.finish(),
    }
}

fn fit_boosted_regressor(
    matrix: &TrainingMatrix<'_>,
    targets: &[f64],
    samples: &[usize],
    params: &EnsembleParams,
) -> Fitted<Regressor> {
    let n_rows = matrix.rows.len();
    let weights = vec![1.0; n_rows];
    let tree_params = params.boosting_tree();
    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut importances = ImportanceAccumulator::new(matrix.n_features());

    let init = if samples.is_empty() {
        0.0
    } else {
        samples.iter().map(|&sample| targets[sample]).sum::<f64>() / samples.len() as f64
    };
    let mut current = vec![init; n_rows];
    let mut residuals = vec![0.0; n_rows];
    let mut trees = Vec::with_capacity(params.n_estimators);

    for _ in 0..params.n_estimators {
        for &sample in samples {
            residuals[sample] = targets[sample] - current[sample];
        }
        let drawn = subsample(samples, &mut rng);
        let fitted = DecisionTree::fit(
            &matrix.bins,
            &matrix.binned,
            Criterion::Variance {
                targets: &residuals,
            },
            &weights,
            drawn,
            &tree_params,
            &mut rng,
        );
        for &sample in samples {
            current[sample] += LEARNING_RATE * leaf_scalar(&fitted.tree, &matrix.rows[sample]);
        }
        importances.add(&fitted.importances);
        trees.push(fitted.tree);
    }

    Fitted {
        model: Regressor::GradientBoosting {
            init,
            learning_rate: LEARNING_RATE,
            trees,
        },
        importances: importances.finish(),
    }
}

fn fit_boosted_classifier(
    matrix: &TrainingMatrix<'_>,
    labels: &[usize],
    samples: &[usize],
    params: &EnsembleParams,
) -> Fitted<Classifier> {
    let n_rows = matrix.rows.len();
    let weights = balanced_weights(labels, samples);
    let tree_params = params.boosting_tree();
    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut importances = ImportanceAccumulator::new(matrix.n_features());

    let mut class_weight = [0.0; N_CLASSES];
    for &sample in samples {
        class_weight[labels[sample]] += weights[sample];
    }
    let total_weight: f64 = class_weight.iter().sum();
    let present: Vec<usize> = (0..N_CLASSES).filter(|k| class_weight[*k] > 0.0).collect();
    let mut init = [0.0; N_CLASSES];
    for (k, slot) in init.iter_mut().enumerate() {
        let prior = if total_weight > 0.0 {
            class_weight[k] / total_weight
        } else {
            1.0 / N_CLASSES as f64
        };
        *slot = prior.max(MIN_PRIOR).ln();
    }

    // Newton step scale for multinomial deviance.
    let n_present = present.len().max(2) as f64;
    let newton_scale = (n_present - 1.0) / n_present;

    let mut raw = vec![init; n_rows];
    let mut residuals = vec![0.0; n_rows];
    let mut rounds = Vec::with_capacity(params.n_estimators);

    for _ in 0..params.n_estimators {
        let probabilities: Vec<[f64; N_CLASSES]> = raw.iter().map(softmax).collect();
        let drawn = subsample(samples, &mut rng);
        let mut round: [Option<DecisionTree>; N_CLASSES] = Default::default();

        for &k in &present {
            for &sample in samples {
                let target = if labels[sample] == k { 1.0 } else { 0.0 };
                residuals[sample] = target - probabilities[sample][k];
            }

            let mut fitted = DecisionTree::fit(
                &matrix.bins,
                &matrix.binned,
                Criterion::Variance {
                    targets: &residuals,
                },
                &weights,
                drawn.clone(),
                &tree_params,
                &mut rng,
            );

            for (node, members) in &fitted.leaves {
                let mut numerator = 0.0;
                let mut denominator = 0.0;
                for &sample in members {
                    let r = residuals[sample];
                    numerator += weights[sample] * r;
                    denominator += weights[sample] * r.abs() * (1.0 - r.abs());
                }
                let gamma = if denominator.abs() < 1e-12 {
                    0.0
                } else {
                    newton_scale * numerator / denominator
                };
                fitted.tree.set_leaf(*node, vec![gamma]);
            }

            for &sample in samples {
                raw[sample][k] += LEARNING_RATE * leaf_scalar(&fitted.tree, &matrix.rows[sample]);
            }
            importances.add(&fitted.importances);
            round[k] = Some(fitted.tree);
        }

        rounds.push(round);
    }

    Fitted {
        model: Classifier::GradientBoosting {
            init,
            learning_rate: LEARNING_RATE,
            rounds,
        },
        importances: importances.finish(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset() -> (Vec<Vec<f64>>, Vec<f64>, Vec<usize>) {
        let rows: Vec<Vec<f64>> = (0..200)
            .map(|i| vec![f64::from(i % 100) / 100.0, f64::from(i % 7)])
            .collect();
        let targets: Vec<f64> = rows.iter().map(|row| row[0] * 80.0).collect();
        let labels: Vec<usize> = rows
            .iter()
            .map(|row| match row[0] {
                x if x < 0.25 => 3,
                x if x < 0.5 => 2,
                x if x < 0.75 => 1,
                _ => 0,
            })
            .collect();
        (rows, targets, labels)
    }

    fn params(kind: EnsembleKind) -> EnsembleParams {
        EnsembleParams {
            kind,
            n_estimators: 30,
            seed: 42,
        }
    }

    #[test]
    fn balanced_weights_equalize_class_mass() {
        let labels = [0, 0, 0, 1];
        let weights = balanced_weights(&labels, &[0, 1, 2, 3]);
        let zero: f64 = weights[..3].iter().sum();
        assert!((zero - weights[3]).abs() < 1e-12);
        assert!((weights[3] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn both_ensembles_learn_a_monotone_target() {
        let (rows, targets, labels) = dataset();
        let matrix = TrainingMatrix::new(&rows, 64);
        let samples: Vec<usize> = (0..rows.len()).collect();

        for kind in [EnsembleKind::GradientBoosting, EnsembleKind::RandomForest] {
            let regressor = Regressor::fit(&matrix, &targets, &samples, &params(kind));
            let low = regressor.model.predict(&[0.05, 3.0]);
            let high = regressor.model.predict(&[0.95, 3.0]);
            assert!(high > low, "{kind:?}: {low} !< {high}");
            assert!(regressor.importances[0] > regressor.importances[1]);

            let classifier = Classifier::fit(&matrix, &labels, &samples, &params(kind));
            let proba = classifier.model.predict_proba(&[0.9, 3.0]);
            assert!((proba.iter().sum::<f64>() - 1.0).abs() < 1e-9);
            assert!(proba[0] > proba[3], "{kind:?}: {proba:?}");
        }
    }

    #[test]
    fn absent_classes_keep_negligible_probability() {
        let (rows, targets, _) = dataset();
        let labels: Vec<usize> = targets.iter().map(|t| usize::from(*t < 40.0)).collect();
        let matrix = TrainingMatrix::new(&rows, 64);
        let samples: Vec<usize> = (0..rows.len()).collect();

        let classifier = Classifier::fit(
            &matrix,
            &labels,
            &samples,
            &params(EnsembleKind::GradientBoosting),
        );
        let proba = classifier.model.predict_proba(&[0.1, 0.0]);
        assert!(proba[2] < 1e-6 && proba[3] < 1e-6);
        assert!(proba[1] > proba[0]);
    }
}
