//! Random forest consumer of the sequence tensor
//!
//! Windows are flattened to `window_size * features` columns and fed to a
//! smartcore forest: a classifier for the trade-success label, a regressor for
//! the forward percent change.

use ndarray::Array1;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use smartcore::ensemble::random_forest_classifier::{
    RandomForestClassifier, RandomForestClassifierParameters,
};
use smartcore::ensemble::random_forest_regressor::{
    RandomForestRegressor, RandomForestRegressorParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tracing::info;

use crate::error::{PipelineError, Result};
use crate::sequence::Sequences;

/// Seeded shuffle split into (train, test)
pub fn train_test_split(sequences: &Sequences, test_size: f64, random_state: u64) -> (Sequences, Sequences) {
    let n = sequences.len();
    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(random_state);
    indices.shuffle(&mut rng);

    let mut n_test = (n as f64 * test_size).round() as usize;
    if n > 1 {
        n_test = n_test.clamp(1, n - 1);
    } else {
        n_test = 0;
    }
    let (test, train) = indices.split_at(n_test);
    (sequences.select(train), sequences.select(test))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForestTask {
    Classification,
    Regression,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelReport {
    pub task: ForestTask,
    pub samples: usize,
    pub accuracy: Option<f64>,
    pub mse: Option<f64>,
    pub mae: Option<f64>,
}

impl std::fmt::Display for ModelReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.task {
            ForestTask::Classification => write!(
                f,
                "accuracy={:.4} on {} samples",
                self.accuracy.unwrap_or(f64::NAN),
                self.samples
            ),
            ForestTask::Regression => write!(
                f,
                "mse={:.6} mae={:.6} on {} samples",
                self.mse.unwrap_or(f64::NAN),
                self.mae.unwrap_or(f64::NAN),
                self.samples
            ),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub enum ForestModel {
    Classifier(RandomForestClassifier<f64, i64, DenseMatrix<f64>, Vec<i64>>),
    Regressor(RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>),
}

fn flatten(sequences: &Sequences) -> Result<DenseMatrix<f64>> {
    if sequences.is_empty() {
        return Err(PipelineError::Model("no sequences to flatten".to_string()));
    }
    let rows: Vec<Vec<f64>> = (0..sequences.len())
        .map(|i| sequences.flat_window(i))
        .collect();
    DenseMatrix::from_2d_vec(&rows).map_err(|e| PipelineError::Model(e.to_string()))
}

fn labels(sequences: &Sequences) -> Result<&Array1<f64>> {
    sequences
        .labels
        .as_ref()
        .ok_or_else(|| PipelineError::Model("sequences carry no labels".to_string()))
}

impl ForestModel {
    pub fn fit(
        sequences: &Sequences,
        task: ForestTask,
        n_trees: usize,
        max_depth: Option<u16>,
        seed: u64,
    ) -> Result<Self> {
        let x = flatten(sequences)?;
        let y = labels(sequences)?;
        info!(
            "🌲 Training {:?} forest: {} trees on {} samples x {} features",
            task,
            n_trees,
            sequences.len(),
            sequences.window_size() * sequences.feature_width()
        );

        match task {
            ForestTask::Classification => {
                let y: Vec<i64> = y.iter().map(|&v| if v >= 0.5 { 1 } else { 0 }).collect();
                let mut params = RandomForestClassifierParameters::default()
                    .with_n_trees(n_trees as _)
                    .with_seed(seed);
                if let Some(depth) = max_depth {
                    params = params.with_max_depth(depth);
                }
                let model = RandomForestClassifier::fit(&x, &y, params)
                    .map_err(|e| PipelineError::Model(e.to_string()))?;
                Ok(ForestModel::Classifier(model))
            }
            ForestTask::Regression => {
                let y: Vec<f64> = y.to_vec();
                let mut params = RandomForestRegressorParameters::default()
                    .with_n_trees(n_trees as _)
                    .with_seed(seed);
                if let Some(depth) = max_depth {
                    params = params.with_max_depth(depth);
                }
                let model = RandomForestRegressor::fit(&x, &y, params)
                    .map_err(|e| PipelineError::Model(e.to_string()))?;
                Ok(ForestModel::Regressor(model))
            }
        }
    }

    pub fn task(&self) -> ForestTask {
        match self {
            ForestModel::Classifier(_) => ForestTask::Classification,
            ForestModel::Regressor(_) => ForestTask::Regression,
        }
    }

    /// One prediction per window; classes come back as 0.0 / 1.0
    pub fn predict(&self, sequences: &Sequences) -> Result<Vec<f64>> {
        let x = flatten(sequences)?;
        match self {
            ForestModel::Classifier(model) => model
                .predict(&x)
                .map(|p| p.into_iter().map(|c| c as f64).collect())
                .map_err(|e| PipelineError::Model(e.to_string())),
            ForestModel::Regressor(model) => model
                .predict(&x)
                .map_err(|e| PipelineError::Model(e.to_string())),
        }
    }

    pub fn evaluate(&self, sequences: &Sequences) -> Result<ModelReport> {
        let predicted = self.predict(sequences)?;
        let actual = labels(sequences)?;
        let n = predicted.len() as f64;

        let mut report = ModelReport {
            task: self.task(),
            samples: predicted.len(),
            accuracy: None,
            mse: None,
            mae: None,
        };
        match self.task() {
            ForestTask::Classification => {
                let hits = predicted
                    .iter()
                    .zip(actual.iter())
                    .filter(|(p, a)| (**p >= 0.5) == (**a >= 0.5))
                    .count();
                report.accuracy = Some(hits as f64 / n);
            }
            ForestTask::Regression => {
                let errors: Vec<f64> = predicted.iter().zip(actual.iter()).map(|(p, a)| p - a).collect();
                report.mse = Some(errors.iter().map(|e| e * e).sum::<f64>() / n);
                report.mae = Some(errors.iter().map(|e| e.abs()).sum::<f64>() / n);
            }
        }
        Ok(report)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        serde_json::to_writer(BufWriter::new(File::create(path)?), self)?;
        info!("💾 Forest saved to {}", path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let model = serde_json::from_reader(BufReader::new(File::open(path)?))?;
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    /// Positive windows have a high first feature
    fn separable(n: usize) -> Sequences {
        let mut windows = Array3::<f64>::zeros((n, 2, 2));
        let mut labels = Vec::with_capacity(n);
        for i in 0..n {
            let positive = i % 2 == 0;
            let level = if positive { 0.9 } else { 0.1 };
            for t in 0..2 {
                windows[[i, t, 0]] = level;
                windows[[i, t, 1]] = (i % 5) as f64 / 5.0;
            }
            labels.push(if positive { 1.0 } else { 0.0 });
        }
        Sequences {
            windows,
            labels: Some(Array1::from_vec(labels)),
        }
    }

    #[test]
    fn test_split_is_seeded_and_disjoint() {
        let seqs = separable(20);
        let (train_a, test_a) = train_test_split(&seqs, 0.25, 7);
        let (train_b, test_b) = train_test_split(&seqs, 0.25, 7);
        assert_eq!(train_a.len(), 15);
        assert_eq!(test_a.len(), 5);
        assert_eq!(test_a, test_b);
        assert_eq!(train_a, train_b);
    }

    #[test]
    fn test_classifier_learns_separable_windows() {
        let seqs = separable(40);
        let model = ForestModel::fit(&seqs, ForestTask::Classification, 10, Some(4), 42).unwrap();
        let report = model.evaluate(&seqs).unwrap();
        assert!(report.accuracy.unwrap() > 0.9, "{}", report);
    }

    #[test]
    fn test_regressor_report() {
        let seqs = separable(30);
        let model = ForestModel::fit(&seqs, ForestTask::Regression, 10, None, 1).unwrap();
        let report = model.evaluate(&seqs).unwrap();
        assert!(report.mse.unwrap() < 0.1);
        assert!(report.mae.is_some());
    }

    #[test]
    fn test_unlabelled_sequences_rejected() {
        let mut seqs = separable(4);
        seqs.labels = None;
        let err = ForestModel::fit(&seqs, ForestTask::Regression, 2, None, 0).unwrap_err();
        assert!(matches!(err, PipelineError::Model(_)));
    }
}
