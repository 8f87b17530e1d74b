//! Regression trees grown on gradient histograms

use super::binning::{BinMapper, BinnedMatrix};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// A node of a regression tree
///
/// Every node carries the shrunken value it would predict as a leaf; split
/// nodes keep it so path attributions can be computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
        value: f64,
    },
}

impl Node {
    pub fn value(&self) -> f64 {
        match self {
            Node::Leaf { value } | Node::Split { value, .. } => *value,
        }
    }
}

/// A fitted regression tree stored as a flat node array, root at index 0
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    /// Value of the leaf reached by `row`
    ///
    /// A row goes left when `row[feature] <= threshold`; `NaN` goes right.
    pub fn predict(&self, row: &[f64]) -> f64 {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    index = if row[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    /// Add per-feature path attributions to `out` and return the root value
    ///
    /// Each split credits its feature with the change in node value between
    /// the split node and the child the row follows. The root value plus all
    /// credits equals [`RegressionTree::predict`].
    pub fn contributions(&self, row: &[f64], out: &mut [f64]) -> f64 {
        let mut index = 0;
        while let Node::Split {
            feature,
            threshold,
            left,
            right,
            value,
        } = &self.nodes[index]
        {
            let next = if row[*feature] <= *threshold { *left } else { *right };
            out[*feature] += self.nodes[next].value() - value;
            index = next;
        }
        self.nodes[0].value()
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Largest feature index referenced by any split
    pub(crate) fn max_feature(&self) -> Option<usize> {
        self.nodes
            .iter()
            .filter_map(|node| match node {
                Node::Split { feature, .. } => Some(*feature),
                Node::Leaf { .. } => None,
            })
            .max()
    }
}

/// Hyper-parameters used while growing one tree
#[derive(Debug, Clone)]
pub(crate) struct GrowthParams {
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    pub min_child_weight: f64,
    pub lambda: f64,
    pub learning_rate: f64,
    pub max_delta_step: f64,
    pub min_split_gain: f64,
}

#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature: usize,
    bin: usize,
    gain: f64,
}

/// Depth-first tree grower over binned features
pub(crate) struct TreeBuilder<'a> {
    bins: &'a BinnedMatrix,
    mapper: &'a BinMapper,
    gradients: &'a [f64],
    hessians: &'a [f64],
    params: &'a GrowthParams,
    n_features: usize,
    nodes: Vec<Node>,
}

impl<'a> TreeBuilder<'a> {
    pub(crate) fn new(
        bins: &'a BinnedMatrix,
        mapper: &'a BinMapper,
        gradients: &'a [f64],
        hessians: &'a [f64],
        params: &'a GrowthParams,
        n_features: usize,
    ) -> Self {
        Self {
            bins,
            mapper,
            gradients,
            hessians,
            params,
            n_features,
            nodes: Vec::new(),
        }
    }

    pub(crate) fn build(mut self, rows: &mut [usize]) -> RegressionTree {
        self.grow(rows, 0);
        RegressionTree { nodes: self.nodes }
    }

    fn leaf_value(&self, grad_sum: f64, hess_sum: f64) -> f64 {
        let mut weight = -grad_sum / (hess_sum + self.params.lambda);
        if self.params.max_delta_step > 0.0 {
            weight = weight.clamp(-self.params.max_delta_step, self.params.max_delta_step);
        }
        weight * self.params.learning_rate
    }

    fn grow(&mut self, rows: &mut [usize], depth: usize) -> usize {
        let (grad_sum, hess_sum) = rows.iter().fold((0.0, 0.0), |(g, h), &r| {
            (g + self.gradients[r], h + self.hessians[r])
        });
        let value = self.leaf_value(grad_sum, hess_sum);
        let index = self.nodes.len();
        self.nodes.push(Node::Leaf { value });

        if depth >= self.params.max_depth || rows.len() < 2 * self.params.min_samples_leaf {
            return index;
        }

        let Some(split) = self.best_split(rows, grad_sum, hess_sum) else {
            return index;
        };

        let bins = self.bins;
        let mid = partition(rows, |r| bins.get(r, split.feature) <= split.bin);
        let (left_rows, right_rows) = rows.split_at_mut(mid);
        let left = self.grow(left_rows, depth + 1);
        let right = self.grow(right_rows, depth + 1);

        self.nodes[index] = Node::Split {
            feature: split.feature,
            threshold: self.mapper.threshold(split.feature, split.bin),
            left,
            right,
            value,
        };
        index
    }

    fn best_split(&self, rows: &[usize], grad_sum: f64, hess_sum: f64) -> Option<SplitCandidate> {
        let candidates: Vec<SplitCandidate> = (0..self.n_features)
            .into_par_iter()
            .filter_map(|feature| self.best_split_for_feature(feature, rows, grad_sum, hess_sum))
            .collect();

        // Ties go to the lowest feature index
        candidates.into_iter().fold(None, |best, candidate| match best {
            Some(b) if b.gain >= candidate.gain => Some(b),
            _ => Some(candidate),
        })
    }

    fn best_split_for_feature(
        &self,
        feature: usize,
        rows: &[usize],
        grad_sum: f64,
        hess_sum: f64,
    ) -> Option<SplitCandidate> {
        let n_thresholds = self.mapper.n_thresholds(feature);
        if n_thresholds == 0 {
            return None;
        }

        let mut histogram = vec![(0.0f64, 0.0f64, 0usize); n_thresholds + 1];
        for &r in rows {
            let slot = &mut histogram[self.bins.get(r, feature)];
            slot.0 += self.gradients[r];
            slot.1 += self.hessians[r];
            slot.2 += 1;
        }

        let lambda = self.params.lambda;
        let parent_score = grad_sum * grad_sum / (hess_sum + lambda);
        let (mut left_g, mut left_h, mut left_n) = (0.0, 0.0, 0usize);
        let mut best: Option<SplitCandidate> = None;

        for (bin, (g, h, n)) in histogram.iter().take(n_thresholds).enumerate() {
            left_g += g;
            left_h += h;
            left_n += n;
            let right_n = rows.len() - left_n;
            if left_n < self.params.min_samples_leaf || right_n < self.params.min_samples_leaf {
                continue;
            }
            let right_g = grad_sum - left_g;
            let right_h = hess_sum - left_h;
            if left_h < self.params.min_child_weight || right_h < self.params.min_child_weight {
                continue;
            }

            let gain = 0.5
                * (left_g * left_g / (left_h + lambda) + right_g * right_g / (right_h + lambda)
                    - parent_score);
            if gain > self.params.min_split_gain && best.map_or(true, |b| gain > b.gain) {
                best = Some(SplitCandidate { feature, bin, gain });
            }
        }

        best
    }
}

/// Move rows matching `pred` to the front and return how many matched
fn partition(rows: &mut [usize], pred: impl Fn(usize) -> bool) -> usize {
    let mut mid = 0;
    for i in 0..rows.len() {
        if pred(rows[i]) {
            rows.swap(mid, i);
            mid += 1;
        }
    }
    mid
}
