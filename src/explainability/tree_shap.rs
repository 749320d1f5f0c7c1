//! Exact TreeSHAP for random forest classifiers
//!
//! Path-dependent TreeSHAP (Lundberg et al., Algorithm 2). Each tree is walked
//! once per row while tracking the proportion of feature subsets that flow
//! down the current path; node covers stand in for the conditional
//! expectations. The forest attribution is the mean over trees, the same way
//! the forest averages tree probabilities.

use crate::error::{ReportError, Result};
use crate::training::{DecisionTree, RandomForest, TreeNode};
use ndarray::{s, Array1, Array2, Array3, ArrayView1, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Attributions for a batch of rows: `values[[row, feature, class]]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShapTensor {
    pub values: Array3<f64>,
    /// Mean model output per class over the training covers
    pub expected_values: Array1<f64>,
}

impl ShapTensor {
    pub fn n_rows(&self) -> usize {
        self.values.dim().0
    }

    pub fn n_features(&self) -> usize {
        self.values.dim().1
    }

    pub fn n_classes(&self) -> usize {
        self.values.dim().2
    }

    /// Attributions towards one class, shaped (rows, features)
    pub fn class_slice(&self, class_index: usize) -> Result<Array2<f64>> {
        self.check_class(class_index)?;
        if self.n_classes() > 2 {
            warn!(
                n_classes = self.n_classes(),
                class_index, "Explaining one class of a multi-class model"
            );
        }
        Ok(self.values.index_axis(Axis(2), class_index).to_owned())
    }

    /// Baseline for one class
    pub fn expected_value(&self, class_index: usize) -> Result<f64> {
        self.check_class(class_index)?;
        Ok(self.expected_values[class_index])
    }

    fn check_class(&self, class_index: usize) -> Result<()> {
        if class_index >= self.n_classes() {
            return Err(ReportError::Config(format!(
                "class index {} out of range for {} classes",
                class_index,
                self.n_classes()
            )));
        }
        Ok(())
    }
}

/// Mean absolute attribution per feature (column) of a (rows, features) matrix
pub fn mean_abs(values: &Array2<f64>) -> Array1<f64> {
    if values.nrows() == 0 {
        return Array1::zeros(values.ncols());
    }
    values.mapv(f64::abs).mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(values.ncols()))
}

/// Feature indices sorted by descending mean |SHAP|
pub fn importance_order(values: &Array2<f64>) -> Vec<usize> {
    let importance = mean_abs(values);
    let mut order: Vec<usize> = (0..importance.len()).collect();
    order.sort_by(|&a, &b| {
        importance[b]
            .partial_cmp(&importance[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    order
}

/// Explainer bound to a fitted forest
pub struct TreeExplainer<'a> {
    forest: &'a RandomForest,
    expected_values: Array1<f64>,
}

impl<'a> TreeExplainer<'a> {
    /// Create an explainer; the forest must already be fitted
    pub fn new(forest: &'a RandomForest) -> Result<Self> {
        if forest.trees().is_empty() {
            return Err(ReportError::ModelNotFitted);
        }

        let n_classes = forest.n_classes();
        let mut expected_values = Array1::zeros(n_classes);
        for tree in forest.trees() {
            expected_values += &tree_expected_value(tree, n_classes)?;
        }
        expected_values /= forest.trees().len() as f64;

        debug!(
            n_trees = forest.trees().len(),
            expected = ?expected_values.to_vec(),
            "Tree explainer ready"
        );

        Ok(Self {
            forest,
            expected_values,
        })
    }

    /// Baseline per class
    pub fn expected_values(&self) -> &Array1<f64> {
        &self.expected_values
    }

    /// Exact attributions for every row of `x`
    pub fn shap_values(&self, x: &Array2<f64>) -> Result<ShapTensor> {
        let n_features = self.forest.n_features();
        let n_classes = self.forest.n_classes();

        if x.ncols() != n_features {
            return Err(ReportError::Shape {
                expected: format!("{} features", n_features),
                actual: format!("{} features", x.ncols()),
            });
        }

        if x.nrows() == 0 {
            return Err(ReportError::Attribution("no rows to attribute".to_string()));
        }

        let per_row: Vec<Array2<f64>> = (0..x.nrows())
            .into_par_iter()
            .map(|i| self.explain_row(x.row(i)))
            .collect::<Result<Vec<_>>>()?;

        let mut values = Array3::zeros((x.nrows(), n_features, n_classes));
        for (i, phi) in per_row.into_iter().enumerate() {
            values.slice_mut(s![i, .., ..]).assign(&phi);
        }

        Ok(ShapTensor {
            values,
            expected_values: self.expected_values.clone(),
        })
    }

    /// Largest gap between `sum(phi) + E` and the forest probabilities
    pub fn additivity_error(&self, x: &Array2<f64>, tensor: &ShapTensor) -> Result<f64> {
        let proba = self.forest.predict_proba(x)?;
        let reconstructed = tensor.values.sum_axis(Axis(1)) + &tensor.expected_values;

        Ok(proba
            .iter()
            .zip(reconstructed.iter())
            .map(|(p, r)| (p - r).abs())
            .fold(0.0, f64::max))
    }

    fn explain_row(&self, row: ArrayView1<f64>) -> Result<Array2<f64>> {
        let n_classes = self.forest.n_classes();
        let mut phi = Array2::zeros((self.forest.n_features(), n_classes));

        for tree in self.forest.trees() {
            let root = tree.root().ok_or(ReportError::ModelNotFitted)?;
            let mut walker = PathWalker {
                row,
                phi: &mut phi,
            };
            walker.recurse(root, &[], 0, 1.0, 1.0, -1);
        }

        phi /= self.forest.trees().len() as f64;
        Ok(phi)
    }
}

/// Cover-weighted mean of the leaf distributions
fn tree_expected_value(tree: &DecisionTree, n_classes: usize) -> Result<Array1<f64>> {
    let root = tree.root().ok_or(ReportError::ModelNotFitted)?;
    let mut acc = Array1::zeros(n_classes);
    accumulate_leaves(root, &mut acc);
    acc /= root.n_samples().max(1) as f64;
    Ok(acc)
}

fn accumulate_leaves(node: &TreeNode, acc: &mut Array1<f64>) {
    match node {
        TreeNode::Leaf { proba, n_samples } => {
            for (a, p) in acc.iter_mut().zip(proba) {
                *a += *n_samples as f64 * p;
            }
        }
        TreeNode::Split { left, right, .. } => {
            accumulate_leaves(left, acc);
            accumulate_leaves(right, acc);
        }
    }
}

/// One entry of the unique feature path
#[derive(Debug, Clone, Copy)]
struct PathElement {
    /// Split feature; -1 marks the root sentinel
    feature_index: isize,
    /// Fraction of "feature absent" paths flowing through this split
    zero_fraction: f64,
    /// Whether the row itself flows through this split (0 or 1)
    one_fraction: f64,
    /// Permutation weight of subsets of this size
    pweight: f64,
}

impl Default for PathElement {
    fn default() -> Self {
        Self {
            feature_index: -1,
            zero_fraction: 0.0,
            one_fraction: 0.0,
            pweight: 0.0,
        }
    }
}

struct PathWalker<'r, 'p> {
    row: ArrayView1<'r, f64>,
    phi: &'p mut Array2<f64>,
}

impl PathWalker<'_, '_> {
    fn recurse(
        &mut self,
        node: &TreeNode,
        parent_path: &[PathElement],
        unique_depth: usize,
        parent_zero_fraction: f64,
        parent_one_fraction: f64,
        parent_feature_index: isize,
    ) {
        let mut path = Vec::with_capacity(unique_depth + 1);
        path.extend_from_slice(&parent_path[..unique_depth]);
        path.push(PathElement::default());
        extend_path(
            &mut path,
            unique_depth,
            parent_zero_fraction,
            parent_one_fraction,
            parent_feature_index,
        );

        match node {
            TreeNode::Leaf { proba, .. } => {
                for i in 1..=unique_depth {
                    let w = unwound_path_sum(&path, unique_depth, i);
                    let el = path[i];
                    let scale = w * (el.one_fraction - el.zero_fraction);
                    let mut phi_row = self.phi.row_mut(el.feature_index as usize);
                    for (dst, p) in phi_row.iter_mut().zip(proba) {
                        *dst += scale * p;
                    }
                }
            }
            TreeNode::Split {
                feature_idx,
                threshold,
                left,
                right,
                n_samples,
                ..
            } => {
                let (hot, cold) = if self.row[*feature_idx] <= *threshold {
                    (left.as_ref(), right.as_ref())
                } else {
                    (right.as_ref(), left.as_ref())
                };

                let cover = (*n_samples).max(1) as f64;
                let hot_zero_fraction = hot.n_samples() as f64 / cover;
                let cold_zero_fraction = cold.n_samples() as f64 / cover;
                let mut incoming_zero_fraction = 1.0;
                let mut incoming_one_fraction = 1.0;
                let mut depth = unique_depth;

                let split_feature = *feature_idx as isize;

                // A feature split twice on the same path is folded into one element
                if let Some(path_index) = path[..=depth]
                    .iter()
                    .position(|el| el.feature_index == split_feature)
                {
                    incoming_zero_fraction = path[path_index].zero_fraction;
                    incoming_one_fraction = path[path_index].one_fraction;
                    unwind_path(&mut path, depth, path_index);
                    depth -= 1;
                }

                self.recurse(
                    hot,
                    &path,
                    depth + 1,
                    hot_zero_fraction * incoming_zero_fraction,
                    incoming_one_fraction,
                    split_feature,
                );
                self.recurse(
                    cold,
                    &path,
                    depth + 1,
                    cold_zero_fraction * incoming_zero_fraction,
                    0.0,
                    split_feature,
                );
            }
        }
    }
}

fn extend_path(
    path: &mut [PathElement],
    unique_depth: usize,
    zero_fraction: f64,
    one_fraction: f64,
    feature_index: isize,
) {
    path[unique_depth] = PathElement {
        feature_index,
        zero_fraction,
        one_fraction,
        pweight: if unique_depth == 0 { 1.0 } else { 0.0 },
    };

    let depth_plus = (unique_depth + 1) as f64;
    for i in (0..unique_depth).rev() {
        path[i + 1].pweight += one_fraction * path[i].pweight * (i + 1) as f64 / depth_plus;
        path[i].pweight = zero_fraction * path[i].pweight * (unique_depth - i) as f64 / depth_plus;
    }
}

fn unwind_path(path: &mut [PathElement], unique_depth: usize, path_index: usize) {
    let one_fraction = path[path_index].one_fraction;
    let zero_fraction = path[path_index].zero_fraction;
    let depth_plus = (unique_depth + 1) as f64;
    let mut next_one_portion = path[unique_depth].pweight;

    for i in (0..unique_depth).rev() {
        if one_fraction != 0.0 {
            let tmp = path[i].pweight;
            path[i].pweight = next_one_portion * depth_plus / ((i + 1) as f64 * one_fraction);
            next_one_portion =
                tmp - path[i].pweight * zero_fraction * (unique_depth - i) as f64 / depth_plus;
        } else {
            path[i].pweight =
                path[i].pweight * depth_plus / (zero_fraction * (unique_depth - i) as f64);
        }
    }

    for i in path_index..unique_depth {
        path[i].feature_index = path[i + 1].feature_index;
        path[i].zero_fraction = path[i + 1].zero_fraction;
        path[i].one_fraction = path[i + 1].one_fraction;
    }
}

/// Total permutation weight if the element at `path_index` were unwound
fn unwound_path_sum(path: &[PathElement], unique_depth: usize, path_index: usize) -> f64 {
    let one_fraction = path[path_index].one_fraction;
    let zero_fraction = path[path_index].zero_fraction;
    let depth_plus = (unique_depth + 1) as f64;
    let mut next_one_portion = path[unique_depth].pweight;
    let mut total = 0.0;

    for i in (0..unique_depth).rev() {
        if one_fraction != 0.0 {
            let tmp = next_one_portion * depth_plus / ((i + 1) as f64 * one_fraction);
            total += tmp;
            next_one_portion =
                path[i].pweight - tmp * zero_fraction * ((unique_depth - i) as f64 / depth_plus);
        } else if zero_fraction != 0.0 {
            total += (path[i].pweight / zero_fraction) / ((unique_depth - i) as f64 / depth_plus);
        }
    }

    total
}
