//! Row-major factor matrices stored in model artifacts.

use serde::{Deserialize, Serialize};

/// A dense row-major `rows × cols` matrix of latent factors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl FactorMatrix {
    /// Returns `None` if `data` does not hold exactly `rows * cols` values
    pub fn new(rows: usize, cols: usize, data: Vec<f64>) -> Option<Self> {
        (data.len() == rows * cols).then_some(Self { rows, cols, data })
    }

    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn row(&self, index: usize) -> &[f64] {
        let start = index * self.cols;
        &self.data[start..start + self.cols]
    }

    pub(crate) fn set(&mut self, row: usize, col: usize, value: f64) {
        self.data[row * self.cols + col] = value;
    }

    /// Checks the invariant that deserialization cannot enforce
    pub fn is_consistent(&self) -> bool {
        self.data.len() == self.rows * self.cols
    }
}

/// Dot product of two equally long slices
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
