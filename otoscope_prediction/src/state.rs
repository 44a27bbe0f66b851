use crate::config::{LabelsConfig, Validatable};
use std::{
    collections::HashSet,
    fs::File,
    io::{self, BufRead},
    path::Path,
};
use thiserror::Error;

/// A class label paired with the model output index it reads from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassLabel {
    pub index: usize,
    pub label: String,
}

#[derive(Error, Debug)]
pub enum LabelsError {
    #[error("Failed to read labels file: {0}")]
    Io(#[from] io::Error),
    #[error("Invalid line format at line {line_number}: {line}")]
    InvalidLine { line_number: usize, line: String },
    #[error("Duplicate output index {0}")]
    DuplicateIndex(usize),
    #[error("Duplicate label {0}")]
    DuplicateLabel(String),
    #[error("Output indices must cover 0..{count}, missing {missing}")]
    MissingIndex { count: usize, missing: usize },
    #[error("Labels file contains no labels")]
    Empty,
}

pub trait State: Send + Sync + 'static {
    fn new(labels_cfg: &LabelsConfig) -> Result<Self, LabelsError>
    where
        Self: Sized;
    /// Labels ordered by output index.
    fn get_labels(&self) -> &[ClassLabel];
}

#[derive(Debug)]
pub struct ServiceState {
    class_labels: Vec<ClassLabel>,
}

impl ServiceState {
    pub fn from_labels(class_labels: Vec<ClassLabel>) -> Result<Self, LabelsError> {
        Ok(Self {
            class_labels: validate_class_labels(class_labels)?,
        })
    }
}

impl State for ServiceState {
    fn new(labels_cfg: &LabelsConfig) -> Result<ServiceState, LabelsError> {
        let labels = load_class_labels(&labels_cfg.get_path())?;
        tracing::info!(
            labels = ?labels.iter().map(|l| l.label.as_str()).collect::<Vec<_>>(),
            "Loaded class labels"
        );
        Self::from_labels(labels)
    }

    fn get_labels(&self) -> &[ClassLabel] {
        &self.class_labels
    }
}

pub fn load_class_labels(filepath: &Path) -> Result<Vec<ClassLabel>, LabelsError> {
    let file = File::open(filepath)?;
    parse_class_labels(io::BufReader::new(file))
}

/// Parses `index,label` lines. Blank lines are skipped.
pub fn parse_class_labels(reader: impl BufRead) -> Result<Vec<ClassLabel>, LabelsError> {
    let mut class_labels = Vec::new();

    for (line_number, line_result) in reader.lines().enumerate() {
        let line = line_result?;
        if line.trim().is_empty() {
            continue;
        }

        let invalid = || LabelsError::InvalidLine {
            line_number: line_number + 1,
            line: line.clone(),
        };

        let (index, label) = line.split_once(',').ok_or_else(invalid)?;
        let index: usize = index.trim().parse().map_err(|_| invalid())?;
        let label = label.trim();
        if label.is_empty() || label.contains(',') {
            return Err(invalid());
        }

        class_labels.push(ClassLabel {
            index,
            label: label.to_string(),
        });
    }

    Ok(class_labels)
}

fn validate_class_labels(mut class_labels: Vec<ClassLabel>) -> Result<Vec<ClassLabel>, LabelsError> {
    if class_labels.is_empty() {
        return Err(LabelsError::Empty);
    }

    let mut seen_labels = HashSet::new();
    for class_label in &class_labels {
        if !seen_labels.insert(class_label.label.as_str()) {
            return Err(LabelsError::DuplicateLabel(class_label.label.clone()));
        }
    }

    class_labels.sort_by_key(|class_label| class_label.index);
    let count = class_labels.len();
    for (expected, class_label) in class_labels.iter().enumerate() {
        if class_label.index < expected {
            return Err(LabelsError::DuplicateIndex(class_label.index));
        }
        if class_label.index > expected {
            return Err(LabelsError::MissingIndex {
                count,
                missing: expected,
            });
        }
    }

    Ok(class_labels)
}
