//! Stratified train/test splitting

use crate::error::{ReportError, Result};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// A single train/test partition of row indices
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainTestSplit {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
}

/// Shuffled split that keeps every class's share of rows in both partitions
#[derive(Debug, Clone)]
pub struct StratifiedSplitter {
    test_size: f64,
    random_state: Option<u64>,
}

impl StratifiedSplitter {
    /// Create a splitter holding out `test_size` of the rows
    pub fn new(test_size: f64) -> Self {
        Self {
            test_size,
            random_state: None,
        }
    }

    /// Set random state for reproducibility
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Split rows given their encoded class labels.
    ///
    /// The test partition takes `ceil(test_size * n)` rows. Each class
    /// contributes its floor share and the leftover slots go to the classes
    /// with the largest fractional remainders.
    pub fn split(&self, y: &[usize]) -> Result<TrainTestSplit> {
        if !(self.test_size > 0.0 && self.test_size < 1.0) {
            return Err(ReportError::Split(format!(
                "test_size must be in (0, 1), got {}",
                self.test_size
            )));
        }

        let n_samples = y.len();
        let n_test = (self.test_size * n_samples as f64).ceil() as usize;
        let n_train = n_samples.saturating_sub(n_test);

        let n_classes = y.iter().max().map_or(0, |&m| m + 1);
        let mut class_indices: Vec<Vec<usize>> = vec![Vec::new(); n_classes];
        for (idx, &class) in y.iter().enumerate() {
            class_indices[class].push(idx);
        }
        class_indices.retain(|members| !members.is_empty());
        let n_classes = class_indices.len();

        if n_classes < 2 {
            return Err(ReportError::Split(format!(
                "need at least 2 classes to stratify, got {}",
                n_classes
            )));
        }

        if let Some(smallest) = class_indices.iter().map(Vec::len).min().filter(|&m| m < 2) {
            return Err(ReportError::Split(format!(
                "the least populated class has only {} member; every class needs at least 2",
                smallest
            )));
        }

        if n_test < n_classes || n_train < n_classes {
            return Err(ReportError::Split(format!(
                "train size {} and test size {} must each be at least the number of classes {}",
                n_train, n_test, n_classes
            )));
        }

        let counts: Vec<usize> = class_indices.iter().map(Vec::len).collect();
        let test_counts = approximate_mode(&counts, n_test);

        let mut rng = match self.random_state {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };

        let mut train_indices = Vec::with_capacity(n_train);
        let mut test_indices = Vec::with_capacity(n_test);

        for (members, &take) in class_indices.iter_mut().zip(&test_counts) {
            members.shuffle(&mut rng);
            test_indices.extend_from_slice(&members[..take]);
            train_indices.extend_from_slice(&members[take..]);
        }

        train_indices.shuffle(&mut rng);
        test_indices.shuffle(&mut rng);

        Ok(TrainTestSplit {
            train_indices,
            test_indices,
        })
    }
}

/// Apportion `n_draws` over classes proportionally to `counts`
fn approximate_mode(counts: &[usize], n_draws: usize) -> Vec<usize> {
    let total: usize = counts.iter().sum();
    let exact: Vec<f64> = counts
        .iter()
        .map(|&c| c as f64 * n_draws as f64 / total as f64)
        .collect();

    let mut alloc: Vec<usize> = exact.iter().map(|e| e.floor() as usize).collect();
    let mut remaining = n_draws - alloc.iter().sum::<usize>();

    let mut order: Vec<usize> = (0..counts.len()).collect();
    // Stable sort keeps lower class indices first among equal remainders
    order.sort_by(|&a, &b| {
        let ra = exact[a] - alloc[a] as f64;
        let rb = exact[b] - alloc[b] as f64;
        rb.partial_cmp(&ra).unwrap_or(std::cmp::Ordering::Equal)
    });

    for &class in &order {
        if remaining == 0 {
            break;
        }
        if alloc[class] < counts[class] {
            alloc[class] += 1;
            remaining -= 1;
        }
    }

    alloc
}
