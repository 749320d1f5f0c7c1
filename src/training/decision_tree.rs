//! Decision tree classifier

use crate::error::{ReportError, Result};
use ndarray::{Array2, ArrayView1};
use rand::seq::index;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Decision tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    /// Leaf node holding the class distribution of its training samples
    Leaf {
        proba: Vec<f64>,
        n_samples: usize,
    },
    /// Internal node; samples with `x[feature_idx] <= threshold` go left
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
        impurity: f64,
    },
}

impl TreeNode {
    /// Training samples that reached this node (the node cover)
    pub fn n_samples(&self) -> usize {
        match self {
            TreeNode::Leaf { n_samples, .. } | TreeNode::Split { n_samples, .. } => *n_samples,
        }
    }
}

/// Gini impurity of a node with the given class counts
fn gini(counts: &[usize], total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let n = total as f64;
    1.0 - counts
        .iter()
        .map(|&c| (c as f64 / n).powi(2))
        .sum::<f64>()
}

/// Decision tree classification model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    /// Tree root
    root: Option<TreeNode>,
    /// Maximum depth
    pub max_depth: Option<usize>,
    /// Features drawn at each split (all when `None`)
    pub max_features: Option<usize>,
    /// Seed for feature sampling
    pub random_state: Option<u64>,
    /// Number of features
    n_features: usize,
    /// Number of classes
    n_classes: usize,
}

impl Default for DecisionTree {
    fn default() -> Self {
        Self::new_classifier()
    }
}

impl DecisionTree {
    /// Create a new classifier tree
    pub fn new_classifier() -> Self {
        Self {
            root: None,
            max_depth: None,
            max_features: None,
            random_state: None,
            n_features: 0,
            n_classes: 0,
        }
    }

    /// Set maximum depth
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Set number of features drawn per split
    pub fn with_max_features(mut self, max_features: usize) -> Self {
        self.max_features = Some(max_features.max(1));
        self
    }

    /// Set random state
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Fix the number of classes; needed when a bootstrap sample misses one
    pub fn with_n_classes(mut self, n_classes: usize) -> Self {
        self.n_classes = n_classes;
        self
    }

    /// Fit the tree to training data; `y` holds class indices
    pub fn fit(&mut self, x: &Array2<f64>, y: &[usize]) -> Result<&mut Self> {
        let n_samples = x.nrows();
        let n_features = x.ncols();

        if n_samples != y.len() {
            return Err(ReportError::Shape {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }

        if n_samples == 0 {
            return Err(ReportError::Training("cannot fit a tree on zero samples".to_string()));
        }

        let observed_classes = y.iter().max().map_or(0, |&m| m + 1);
        if self.n_classes == 0 {
            self.n_classes = observed_classes;
        } else if observed_classes > self.n_classes {
            return Err(ReportError::Training(format!(
                "label {} out of range for {} classes",
                observed_classes - 1,
                self.n_classes
            )));
        }

        self.n_features = n_features;
        let mut rng = match self.random_state {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };

        let indices: Vec<usize> = (0..n_samples).collect();
        self.root = Some(self.build_tree(x, y, &indices, 0, &mut rng));

        Ok(self)
    }

    fn class_counts(&self, y: &[usize], indices: &[usize]) -> Vec<usize> {
        let mut counts = vec![0usize; self.n_classes];
        for &i in indices {
            counts[y[i]] += 1;
        }
        counts
    }

    fn make_leaf(&self, counts: &[usize], n_samples: usize) -> TreeNode {
        let proba = counts
            .iter()
            .map(|&c| c as f64 / n_samples.max(1) as f64)
            .collect();
        TreeNode::Leaf { proba, n_samples }
    }

    fn build_tree(
        &self,
        x: &Array2<f64>,
        y: &[usize],
        indices: &[usize],
        depth: usize,
        rng: &mut ChaCha8Rng,
    ) -> TreeNode {
        let n_samples = indices.len();
        let counts = self.class_counts(y, indices);
        let is_pure = counts.iter().filter(|&&c| c > 0).count() <= 1;

        // Grow until pure, unless a depth limit is set
        let should_stop = n_samples < 2 || self.max_depth.map_or(false, |d| depth >= d) || is_pure;

        if should_stop {
            return self.make_leaf(&counts, n_samples);
        }

        let parent_impurity = gini(&counts, n_samples);

        let Some(split) = self.find_best_split(x, y, indices, parent_impurity, rng) else {
            return self.make_leaf(&counts, n_samples);
        };

        let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| x[[i, split.feature]] <= split.threshold);

        if left_indices.is_empty() || right_indices.is_empty() {
            return self.make_leaf(&counts, n_samples);
        }

        let left = Box::new(self.build_tree(x, y, &left_indices, depth + 1, rng));
        let right = Box::new(self.build_tree(x, y, &right_indices, depth + 1, rng));

        TreeNode::Split {
            feature_idx: split.feature,
            threshold: split.threshold,
            left,
            right,
            n_samples,
            impurity: parent_impurity,
        }
    }

    /// Search a random subset of features for the best split. When none of the
    /// drawn features can split the node, the remaining ones are tried as well.
    fn find_best_split(
        &self,
        x: &Array2<f64>,
        y: &[usize],
        indices: &[usize],
        parent_impurity: f64,
        rng: &mut ChaCha8Rng,
    ) -> Option<SplitCandidate> {
        let n_features = x.ncols();
        let n_draw = self.max_features.unwrap_or(n_features).min(n_features);

        let mut drawn = index::sample(rng, n_features, n_draw).into_vec();
        drawn.sort_unstable();

        let best = self.best_split_among(x, y, indices, parent_impurity, &drawn);
        if best.is_some() || n_draw == n_features {
            return best;
        }

        let rest: Vec<usize> = (0..n_features).filter(|f| !drawn.contains(f)).collect();
        self.best_split_among(x, y, indices, parent_impurity, &rest)
    }

    fn best_split_among(
        &self,
        x: &Array2<f64>,
        y: &[usize],
        indices: &[usize],
        parent_impurity: f64,
        features: &[usize],
    ) -> Option<SplitCandidate> {
        // Each feature independently finds its best split
        let feature_results: Vec<Option<SplitCandidate>> = features
            .par_iter()
            .map(|&feature| self.best_split_for_feature(x, y, indices, parent_impurity, feature))
            .collect();

        feature_results
            .into_iter()
            .flatten()
            .fold(None, |best: Option<SplitCandidate>, candidate| match best {
                Some(b) if b.gain >= candidate.gain => Some(b),
                _ => Some(candidate),
            })
    }

    /// Sort the node's samples by one feature and sweep the class counts
    fn best_split_for_feature(
        &self,
        x: &Array2<f64>,
        y: &[usize],
        indices: &[usize],
        parent_impurity: f64,
        feature: usize,
    ) -> Option<SplitCandidate> {
        let mut sorted: Vec<(f64, usize)> = indices.iter().map(|&i| (x[[i, feature]], y[i])).collect();
        sorted.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        let n = sorted.len();
        let total_counts = {
            let mut counts = vec![0usize; self.n_classes];
            for &(_, class) in &sorted {
                counts[class] += 1;
            }
            counts
        };

        let mut left_counts = vec![0usize; self.n_classes];
        let mut right_counts = total_counts;
        let mut best: Option<SplitCandidate> = None;

        for pos in 0..n - 1 {
            let (value, class) = sorted[pos];
            left_counts[class] += 1;
            right_counts[class] -= 1;

            let next_value = sorted[pos + 1].0;
            if next_value <= value {
                continue;
            }

            let n_left = pos + 1;
            let n_right = n - n_left;
            let weighted = (n_left as f64 * gini(&left_counts, n_left)
                + n_right as f64 * gini(&right_counts, n_right))
                / n as f64;
            let gain = parent_impurity - weighted;

            if gain > best.as_ref().map_or(0.0, |b| b.gain) {
                let mut threshold = (value + next_value) / 2.0;
                if threshold >= next_value {
                    threshold = value;
                }
                best = Some(SplitCandidate {
                    feature,
                    threshold,
                    gain,
                });
            }
        }

        best
    }

    /// Class probabilities for one sample
    pub fn predict_proba_row(&self, sample: ArrayView1<f64>) -> Result<&[f64]> {
        let mut node = self.root.as_ref().ok_or(ReportError::ModelNotFitted)?;
        loop {
            match node {
                TreeNode::Leaf { proba, .. } => return Ok(proba),
                TreeNode::Split { feature_idx, threshold, left, right, .. } => {
                    node = if sample[*feature_idx] <= *threshold {
                        left.as_ref()
                    } else {
                        right.as_ref()
                    };
                }
            }
        }
    }

    /// Class probabilities, one row per sample
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let mut proba = Array2::zeros((x.nrows(), self.n_classes));
        for (i, sample) in x.rows().into_iter().enumerate() {
            let row = self.predict_proba_row(sample)?;
            for (j, &p) in row.iter().enumerate() {
                proba[[i, j]] = p;
            }
        }
        Ok(proba)
    }

    /// Most probable class index per sample
    pub fn predict(&self, x: &Array2<f64>) -> Result<Vec<usize>> {
        let proba = self.predict_proba(x)?;
        Ok(proba.rows().into_iter().map(|row| argmax(row)).collect())
    }

    /// Tree root, `None` before fitting
    pub fn root(&self) -> Option<&TreeNode> {
        self.root.as_ref()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    /// Get tree depth
    pub fn get_depth(&self) -> usize {
        self.root.as_ref().map_or(0, node_depth)
    }

    /// Get number of leaves
    pub fn get_n_leaves(&self) -> usize {
        self.root.as_ref().map_or(0, count_leaves)
    }
}

#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

/// Index of the largest value; the first one wins ties
pub(crate) fn argmax(row: ArrayView1<f64>) -> usize {
    row.iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |(bi, bv), (i, &v)| if v > bv { (i, v) } else { (bi, bv) })
        .0
}

fn node_depth(node: &TreeNode) -> usize {
    match node {
        TreeNode::Leaf { .. } => 1,
        TreeNode::Split { left, right, .. } => 1 + node_depth(left).max(node_depth(right)),
    }
}

fn count_leaves(node: &TreeNode) -> usize {
    match node {
        TreeNode::Leaf { .. } => 1,
        TreeNode::Split { left, right, .. } => count_leaves(left) + count_leaves(right),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_classifier_simple() {
        let x = array![[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]];
        let y = vec![0, 0, 1, 1];

        let mut tree = DecisionTree::new_classifier().with_random_state(0);
        tree.fit(&x, &y).unwrap();

        assert_eq!(tree.predict(&x).unwrap(), y);
    }

    #[test]
    fn test_max_depth() {
        let x = array![[1.0, 1.0], [2.0, 2.0], [3.0, 3.0], [4.0, 4.0]];
        let y = vec![0, 1, 0, 1];

        let mut tree = DecisionTree::new_classifier().with_max_depth(2).with_random_state(0);
        tree.fit(&x, &y).unwrap();

        assert!(tree.get_depth() <= 3);
    }

    #[test]
    fn test_stump_has_two_leaves() {
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let y = vec![0, 0, 1, 1];

        let mut tree = DecisionTree::new_classifier().with_max_depth(1);
        tree.fit(&x, &y).unwrap();

        assert_eq!(tree.get_n_leaves(), 2);
        match tree.root().unwrap() {
            TreeNode::Split { feature_idx, threshold, n_samples, .. } => {
                assert_eq!(*feature_idx, 0);
                assert_eq!(*threshold, 2.5);
                assert_eq!(*n_samples, 4);
            }
            TreeNode::Leaf { .. } => panic!("expected a split at the root"),
        }
    }

    #[test]
    fn test_leaf_probabilities() {
        let x = array![[1.0], [1.0], [1.0], [2.0]];
        let y = vec![0, 1, 1, 0];

        let mut tree = DecisionTree::new_classifier().with_max_depth(1);
        tree.fit(&x, &y).unwrap();

        let proba = tree.predict_proba(&array![[1.0], [2.0]]).unwrap();
        assert!((proba[[0, 1]] - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(proba[[1, 0]], 1.0);
    }

    #[test]
    fn test_n_classes_pads_missing_class() {
        let x = array![[1.0], [2.0]];
        let y = vec![0, 1];

        let mut tree = DecisionTree::new_classifier().with_n_classes(3);
        tree.fit(&x, &y).unwrap();

        let proba = tree.predict_proba(&x).unwrap();
        assert_eq!(proba.ncols(), 3);
        assert_eq!(proba[[0, 2]], 0.0);
    }

    #[test]
    fn test_gini() {
        assert_eq!(gini(&[4, 0], 4), 0.0);
        assert_eq!(gini(&[2, 2], 4), 0.5);
        assert_eq!(gini(&[], 0), 0.0);
    }

    #[test]
    fn test_grows_until_pure() {
        let x = array![[1.0, 0.0], [2.0, 0.0], [3.0, 0.0], [4.0, 0.0]];
        let y = vec![0, 1, 0, 1];

        let mut tree = DecisionTree::new_classifier().with_random_state(0);
        tree.fit(&x, &y).unwrap();

        assert_eq!(tree.get_n_leaves(), 4);
        assert_eq!(tree.predict(&x).unwrap(), y);
    }

    #[test]
    fn test_predict_before_fit() {
        let tree = DecisionTree::new_classifier();
        assert!(matches!(tree.predict(&array![[1.0]]), Err(ReportError::ModelNotFitted)));
    }
}
