//! CART trees grown on histogram-binned features.
//!
//! Features are bucketed once per training run; split search then scans at most 256
//! bins per feature instead of sorting samples at every node.

use rand::rngs::StdRng;
use rand::seq::index;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound on bins per feature; bin ids are stored as `u8`.
pub const MAX_BINS: usize = 256;

const MIN_GAIN: f64 = 1e-12;

/// Per-feature split candidates. Bin `b` holds values in `(edges[b - 1], edges[b]]`.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureBins {
    edges: Vec<Vec<f64>>,
}

impl FeatureBins {
    pub fn fit(rows: &[Vec<f64>], max_bins: usize) -> Self {
        let width = rows.first().map_or(0, Vec::len);
        let max_edges = max_bins.clamp(2, MAX_BINS) - 1;

        let edges = (0..width)
            .map(|feature| {
                let mut values: Vec<f64> = rows
                    .iter()
                    .map(|row| row[feature])
                    .filter(|value| value.is_finite())
                    .collect();
                values.sort_by(f64::total_cmp);

                let mut distinct = values.clone();
                distinct.dedup();
                if distinct.len() <= max_edges + 1 {
                    return distinct
                        .windows(2)
                        .map(|pair| (pair[0] + pair[1]) / 2.0)
                        .collect();
                }

                let mut cuts: Vec<f64> = (1..=max_edges)
                    .map(|i| values[i * values.len() / (max_edges + 1)])
                    .collect();
                cuts.dedup();
                cuts
            })
            .collect();

        Self { edges }
    }

    pub fn width(&self) -> usize {
        self.edges.len()
    }

    fn n_bins(&self, feature: usize) -> usize {
        self.edges[feature].len() + 1
    }

    fn bin(&self, feature: usize, value: f64) -> u8 {
        self.edges[feature].partition_point(|edge| *edge < value) as u8
    }

    pub fn apply(&self, rows: &[Vec<f64>]) -> BinnedMatrix {
        let columns = (0..self.width())
            .map(|feature| rows.iter().map(|row| self.bin(feature, row[feature])).collect())
            .collect();
        BinnedMatrix { columns }
    }
}

/// Column-major bin ids of a training matrix.
#[derive(Debug, Clone)]
pub struct BinnedMatrix {
    columns: Vec<Vec<u8>>,
}

impl BinnedMatrix {
    pub fn n_rows(&self) -> usize {
        self.columns.first().map_or(0, Vec::len)
    }

    pub fn n_features(&self) -> usize {
        self.columns.len()
    }
}

/// Split quality measure, borrowing the training targets.
#[derive(Debug, Clone, Copy)]
pub enum Criterion<'a> {
    /// Weighted squared error around the node mean.
    Variance { targets: &'a [f64] },
    /// Weighted Gini impurity over class labels.
    Gini { labels: &'a [usize], n_classes: usize },
}

// Node statistics layout: [weight, count, criterion-specific...]
const WEIGHT: usize = 0;
const COUNT: usize = 1;

impl Criterion<'_> {
    fn width(&self) -> usize {
        match self {
            Criterion::Variance { .. } => 4,
            Criterion::Gini { n_classes, .. } => 2 + n_classes,
        }
    }

    fn accumulate(&self, stats: &mut [f64], sample: usize, weight: f64) {
        stats[WEIGHT] += weight;
        stats[COUNT] += 1.0;
        match self {
            Criterion::Variance { targets } => {
                let y = targets[sample];
                stats[2] += weight * y;
                stats[3] += weight * y * y;
            }
            Criterion::Gini { labels, .. } => stats[2 + labels[sample]] += weight,
        }
    }

    /// Weight-scaled impurity, so child impurities add up comparably to the parent's.
    fn impurity(&self, stats: &[f64]) -> f64 {
        let weight = stats[WEIGHT];
        if weight <= 0.0 {
            return 0.0;
        }
        match self {
            Criterion::Variance { .. } => (stats[3] - stats[2] * stats[2] / weight).max(0.0),
            Criterion::Gini { .. } => {
                let squares: f64 = stats[2..].iter().map(|w| w * w).sum();
                (weight - squares / weight).max(0.0)
            }
        }
    }

    fn leaf_value(&self, stats: &[f64]) -> Vec<f64> {
        let weight = stats[WEIGHT];
        match self {
            Criterion::Variance { .. } => {
                vec![if weight > 0.0 { stats[2] / weight } else { 0.0 }]
            }
            Criterion::Gini { n_classes, .. } => {
                if weight > 0.0 {
                    stats[2..].iter().map(|w| w / weight).collect()
                } else {
                    vec![1.0 / *n_classes as f64; *n_classes]
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxFeatures {
    All,
    Sqrt,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    Leaf {
        value: Vec<f64>,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// Shape problems found in a deserialized model.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StructureError {
    #[error("tree has no nodes")]
    EmptyTree,
    #[error("node {node} splits on feature {feature} but the model has {n_features}")]
    FeatureOutOfRange {
        node: usize,
        feature: usize,
        n_features: usize,
    },
    #[error("node {node} links to child {child}, which is missing or not after its parent")]
    BadChild { node: usize, child: usize },
    #[error("leaf {node} holds {found} values, expected {expected}")]
    LeafWidth {
        node: usize,
        expected: usize,
        found: usize,
    },
    #[error("scaler covers {found} features, expected {expected}")]
    ScalerWidth { expected: usize, found: usize },
    #[error("calibrator has {knots} knots and {values} values")]
    Calibrator { knots: usize, values: usize },
    #[error("expected {expected} per-class entries, found {found}")]
    ClassCount { expected: usize, found: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
}

/// A freshly grown tree with the bookkeeping ensembles need.
pub struct FittedTree {
    pub tree: DecisionTree,
    /// Impurity decrease per feature, unnormalized.
    pub importances: Vec<f64>,
    /// Training samples that reached each leaf, by node index.
    pub leaves: Vec<(usize, Vec<usize>)>,
}

impl DecisionTree {
    pub fn fit(
        bins: &FeatureBins,
        binned: &BinnedMatrix,
        criterion: Criterion<'_>,
        weights: &[f64],
        samples: Vec<usize>,
        params: &TreeParams,
        rng: &mut StdRng,
    ) -> FittedTree {
        let mut builder = Builder {
            bins,
            binned,
            criterion,
            weights,
            params,
            rng,
            nodes: Vec::new(),
            importances: vec![0.0; binned.n_features()],
            leaves: Vec::new(),
        };
        builder.grow(samples, 0);

        FittedTree {
            tree: DecisionTree {
                nodes: builder.nodes,
            },
            importances: builder.importances,
            leaves: builder.leaves,
        }
    }

    /// Children must come after their parent, so a checked tree always reaches a leaf.
    pub fn check(&self, n_features: usize, leaf_width: usize) -> Result<(), StructureError> {
        if self.nodes.is_empty() {
            return Err(StructureError::EmptyTree);
        }
        for (node, entry) in self.nodes.iter().enumerate() {
            match entry {
                Node::Leaf { value } => {
                    if value.len() != leaf_width {
                        return Err(StructureError::LeafWidth {
                            node,
                            expected: leaf_width,
                            found: value.len(),
                        });
                    }
                }
                Node::Split {
                    feature,
                    left,
                    right,
                    ..
                } => {
                    if *feature >= n_features {
                        return Err(StructureError::FeatureOutOfRange {
                            node,
                            feature: *feature,
                            n_features,
                        });
                    }
                    for child in [*left, *right] {
                        if child <= node || child >= self.nodes.len() {
                            return Err(StructureError::BadChild { node, child });
                        }
                    }
                }
            }
        }
        Ok(())
    }

    pub fn leaf_index(&self, row: &[f64]) -> usize {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                Node::Leaf { .. } => return index,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    pub fn predict(&self, row: &[f64]) -> &[f64] {
        match &self.nodes[self.leaf_index(row)] {
            Node::Leaf { value } => value,
            Node::Split { .. } => &[],
        }
    }

    pub fn set_leaf(&mut self, node: usize, value: Vec<f64>) {
        if let Some(slot @ Node::Leaf { .. }) = self.nodes.get_mut(node) {
            *slot = Node::Leaf { value };
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

struct Builder<'a> {
    bins: &'a FeatureBins,
    binned: &'a BinnedMatrix,
    criterion: Criterion<'a>,
    weights: &'a [f64],
    params: &'a TreeParams,
    rng: &'a mut StdRng,
    nodes: Vec<Node>,
    importances: Vec<f64>,
    leaves: Vec<(usize, Vec<usize>)>,
}

struct SplitCandidate {
    feature: usize,
    bin: usize,
    gain: f64,
}

impl Builder<'_> {
    fn grow(&mut self, samples: Vec<usize>, depth: usize) -> usize {
        let width = self.criterion.width();
        let mut stats = vec![0.0; width];
        for &sample in &samples {
            self.criterion
                .accumulate(&mut stats, sample, self.weights[sample]);
        }

        let index = self.nodes.len();
        self.nodes.push(Node::Leaf {
            value: self.criterion.leaf_value(&stats),
        });

        let parent_impurity = self.criterion.impurity(&stats);
        let splittable = depth < self.params.max_depth
            && samples.len() >= self.params.min_samples_split
            && samples.len() >= 2 * self.params.min_samples_leaf
            && parent_impurity > MIN_GAIN;

        let best = if splittable {
            self.best_split(&samples, &stats, parent_impurity)
        } else {
            None
        };

        let Some(best) = best else {
            self.leaves.push((index, samples));
            return index;
        };

        let column = &self.binned.columns[best.feature];
        let (left_samples, right_samples): (Vec<usize>, Vec<usize>) = samples
            .into_iter()
            .partition(|&sample| usize::from(column[sample]) <= best.bin);

        self.importances[best.feature] += best.gain;
        let threshold = self.bins.edges[best.feature][best.bin];
        let left = self.grow(left_samples, depth + 1);
        let right = self.grow(right_samples, depth + 1);
        self.nodes[index] = Node::Split {
            feature: best.feature,
            threshold,
            left,
            right,
        };
        index
    }

    fn candidate_features(&mut self) -> Vec<usize> {
        let n_features = self.binned.n_features();
        match self.params.max_features {
            MaxFeatures::All => (0..n_features).collect(),
            MaxFeatures::Sqrt => {
                let take = ((n_features as f64).sqrt().floor() as usize).clamp(1, n_features);
                index::sample(&mut *self.rng, n_features, take).into_vec()
            }
        }
    }

    fn best_split(
        &mut self,
        samples: &[usize],
        totals: &[f64],
        parent_impurity: f64,
    ) -> Option<SplitCandidate> {
        let width = self.criterion.width();
        let min_leaf = self.params.min_samples_leaf.max(1) as f64;
        let mut best: Option<SplitCandidate> = None;

        for feature in self.candidate_features() {
            let n_bins = self.bins.n_bins(feature);
            if n_bins < 2 {
                continue;
            }

            let column = &self.binned.columns[feature];
            let mut histogram = vec![0.0; n_bins * width];
            for &sample in samples {
                let offset = usize::from(column[sample]) * width;
                self.criterion.accumulate(
                    &mut histogram[offset..offset + width],
                    sample,
                    self.weights[sample],
                );
            }

            let mut left = vec![0.0; width];
            let mut right = vec![0.0; width];
            for bin in 0..n_bins - 1 {
                let slice = &histogram[bin * width..(bin + 1) * width];
                for (acc, value) in left.iter_mut().zip(slice) {
                    *acc += value;
                }
                if left[COUNT] < min_leaf {
                    continue;
                }
                for ((slot, total), l) in right.iter_mut().zip(totals).zip(&left) {
                    *slot = total - l;
                }
                if right[COUNT] < min_leaf {
                    break;
                }
                if left[WEIGHT] <= 0.0 || right[WEIGHT] <= 0.0 {
                    continue;
                }

                let gain = parent_impurity
                    - self.criterion.impurity(&left)
                    - self.criterion.impurity(&right);
                if gain > MIN_GAIN && best.as_ref().map_or(true, |current| gain > current.gain) {
                    best = Some(SplitCandidate { feature, bin, gain });
                }
            }
        }

        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn params(max_depth: usize) -> TreeParams {
        TreeParams {
            max_depth,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::All,
        }
    }

    #[test]
    fn bins_respect_upper_bound_and_thresholds() {
        let rows: Vec<Vec<f64>> = (0..1000).map(|i| vec![f64::from(i)]).collect();
        let bins = FeatureBins::fit(&rows, MAX_BINS);
        assert!(bins.n_bins(0) <= MAX_BINS);

        let small = FeatureBins::fit(&[vec![1.0], vec![2.0], vec![4.0]], MAX_BINS);
        assert_eq!(small.edges[0], vec![1.5, 3.0]);
        assert_eq!(small.bin(0, 1.0), 0);
        assert_eq!(small.bin(0, 3.0), 1);
        assert_eq!(small.bin(0, 3.5), 2);
    }

    #[test]
    fn regression_tree_separates_step_function() {
        let rows: Vec<Vec<f64>> = (0..40).map(|i| vec![f64::from(i), 0.0]).collect();
        let targets: Vec<f64> = (0..40).map(|i| if i < 20 { 1.0 } else { 5.0 }).collect();
        let weights = vec![1.0; rows.len()];
        let bins = FeatureBins::fit(&rows, MAX_BINS);
        let binned = bins.apply(&rows);
        let mut rng = StdRng::seed_from_u64(7);

        let fitted = DecisionTree::fit(
            &bins,
            &binned,
            Criterion::Variance { targets: &targets },
            &weights,
            (0..rows.len()).collect(),
            &params(3),
            &mut rng,
        );

        assert_eq!(fitted.tree.predict(&[3.0, 0.0]), &[1.0]);
        assert_eq!(fitted.tree.predict(&[33.0, 0.0]), &[5.0]);
        assert!(fitted.importances[0] > 0.0);
        assert_eq!(fitted.importances[1], 0.0);
        assert_eq!(fitted.leaves.len(), 2);
    }

    #[test]
    fn gini_tree_reports_class_proportions() {
        let rows: Vec<Vec<f64>> = (0..30).map(|i| vec![f64::from(i)]).collect();
        let labels: Vec<usize> = (0..30).map(|i| if i < 10 { 0 } else { 2 }).collect();
        let weights = vec![1.0; rows.len()];
        let bins = FeatureBins::fit(&rows, MAX_BINS);
        let binned = bins.apply(&rows);
        let mut rng = StdRng::seed_from_u64(7);

        let mut fitted = DecisionTree::fit(
            &bins,
            &binned,
            Criterion::Gini {
                labels: &labels,
                n_classes: 3,
            },
            &weights,
            (0..rows.len()).collect(),
            &params(1),
            &mut rng,
        );

        assert_eq!(fitted.tree.predict(&[2.0]), &[1.0, 0.0, 0.0]);
        assert_eq!(fitted.tree.predict(&[25.0]), &[0.0, 0.0, 1.0]);

        let (leaf, _) = fitted.leaves[0].clone();
        fitted.tree.set_leaf(leaf, vec![0.5, 0.5, 0.0]);
        assert_eq!(fitted.tree.predict(&[2.0]), &[0.5, 0.5, 0.0]);
    }

    fn split(feature: usize, left: usize, right: usize) -> Node {
        Node::Split {
            feature,
            threshold: 0.5,
            left,
            right,
        }
    }

    fn leaf() -> Node {
        Node::Leaf { value: vec![1.0] }
    }

    #[test]
    fn check_accepts_well_formed_trees() {
        let tree = DecisionTree {
            nodes: vec![split(1, 1, 2), leaf(), leaf()],
        };
        assert_eq!(tree.check(2, 1), Ok(()));
    }

    #[test]
    fn check_rejects_out_of_range_features_and_children() {
        let tree = DecisionTree {
            nodes: vec![split(999, 1, 2), leaf(), leaf()],
        };
        assert_eq!(
            tree.check(21, 1),
            Err(StructureError::FeatureOutOfRange {
                node: 0,
                feature: 999,
                n_features: 21,
            })
        );

        let dangling = DecisionTree {
            nodes: vec![split(0, 1, 7), leaf()],
        };
        assert_eq!(
            dangling.check(1, 1),
            Err(StructureError::BadChild { node: 0, child: 7 })
        );

        let cyclic = DecisionTree {
            nodes: vec![split(0, 1, 2), split(0, 0, 2), leaf()],
        };
        assert_eq!(
            cyclic.check(1, 1),
            Err(StructureError::BadChild { node: 1, child: 0 })
        );
    }

    #[test]
    fn check_rejects_empty_trees_and_wrong_leaf_widths() {
        assert_eq!(
            DecisionTree { nodes: Vec::new() }.check(1, 1),
            Err(StructureError::EmptyTree)
        );
        let tree = DecisionTree {
            nodes: vec![Node::Leaf {
                value: vec![0.25; 4],
            }],
        };
        assert_eq!(
            tree.check(1, 1),
            Err(StructureError::LeafWidth {
                node: 0,
                expected: 1,
                found: 4,
            })
        );
    }
}
