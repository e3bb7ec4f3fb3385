use std::path::Path;

use crate::error::{Result, TrainError};

/// Feature vectors paired with scalar regression targets.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub features: Vec<Vec<f64>>,
    pub targets: Vec<f64>,
    pub feature_dimension: usize,
}

impl Dataset {
    /// Checks that there is at least one sample, one target per sample and a
    /// single feature width.
    pub fn new(features: Vec<Vec<f64>>, targets: Vec<f64>) -> Result<Dataset> {
        if features.is_empty() {
            return Err(TrainError::Data("dataset contains no samples".into()));
        }
        if features.len() != targets.len() {
            return Err(TrainError::Data(format!(
                "{} feature rows but {} targets",
                features.len(), targets.len()
            )));
        }
        let feature_dimension = features[0].len();
        if feature_dimension == 0 {
            return Err(TrainError::Data("samples have no features".into()));
        }
        if let Some(i) = features.iter().position(|row| row.len() != feature_dimension) {
            return Err(TrainError::Data(format!(
                "row {}: feature count {} does not match first row's {}",
                i + 1, features[i].len(), feature_dimension
            )));
        }
        Ok(Dataset { features, targets, feature_dimension })
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Rows picked by index, in the given order.
    pub fn select(&self, indices: &[usize]) -> Dataset {
        Dataset {
            features: indices.iter().map(|&i| self.features[i].clone()).collect(),
            targets: indices.iter().map(|&i| self.targets[i]).collect(),
            feature_dimension: self.feature_dimension,
        }
    }
}

/// Loads a numeric CSV file: every column but the last is a feature, the
/// last is the target. A first row containing any non-numeric cell is taken
/// as a header and skipped.
pub fn load_csv(path: impl AsRef<Path>) -> Result<Dataset> {
    let path = path.as_ref();
    let reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| TrainError::Data(format!("cannot open '{}': {e}", path.display())))?;
    parse_records(reader)
}

/// Same as `load_csv`, over in-memory bytes.
pub fn parse_csv(data: &[u8]) -> Result<Dataset> {
    let reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(data);
    parse_records(reader)
}

fn parse_records<R: std::io::Read>(mut reader: csv::Reader<R>) -> Result<Dataset> {
    let mut features = Vec::new();
    let mut targets = Vec::new();

    for (row_idx, record) in reader.records().enumerate() {
        let record = record.map_err(|e| TrainError::Data(format!("row {}: {e}", row_idx + 1)))?;
        if record.iter().all(|c| c.is_empty()) {
            continue;
        }
        if row_idx == 0 && is_header(&record) {
            continue;
        }
        if record.len() < 2 {
            return Err(TrainError::Data(format!(
                "row {}: expected at least 2 columns (features + target), got {}",
                row_idx + 1, record.len()
            )));
        }

        let values = record.iter()
            .map(|c| match c.parse::<f64>() {
                Ok(v) if v.is_finite() => Ok(v),
                _ => Err(TrainError::Data(format!("row {}: '{c}' is not a finite number", row_idx + 1))),
            })
            .collect::<Result<Vec<f64>>>()?;
        let (feats, target) = values.split_at(values.len() - 1);
        features.push(feats.to_vec());
        targets.push(target[0]);
    }

    Dataset::new(features, targets)
}

fn is_header(record: &csv::StringRecord) -> bool {
    record.iter().any(|c| !c.is_empty() && c.parse::<f64>().is_err())
}
