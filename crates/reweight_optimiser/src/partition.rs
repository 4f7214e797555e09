//! Training / validation split of target columns.

/// Which side of the split to evaluate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    /// Columns used for the gradient
    Training,
    /// Held-out columns, evaluated only
    Validation,
}

/// Partition of one design's columns by name.
///
/// A column is held out when its name appears in the exclusion list. When
/// nothing is excluded every column trains and validation is empty.
///
/// # Examples
///
/// ```
/// use reweight_optimiser::{Split, TargetPartition};
///
/// let names = vec!["age/0_10".to_string(), "income".to_string(), "uc".to_string()];
/// let partition = TargetPartition::new(&names, &["income".to_string()]);
/// assert_eq!(partition.columns(Split::Training), &[0, 2]);
/// assert_eq!(partition.columns(Split::Validation), &[1]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TargetPartition {
    training: Vec<usize>,
    validation: Vec<usize>,
}

impl TargetPartition {
    /// Split `names` by membership in `excluded`.
    pub fn new(names: &[String], excluded: &[String]) -> Self {
        let (validation, training): (Vec<usize>, Vec<usize>) =
            (0..names.len()).partition(|&i| excluded.contains(&names[i]));
        Self {
            training,
            validation,
        }
    }

    /// Every one of `count` columns trains.
    pub fn all(count: usize) -> Self {
        Self {
            training: (0..count).collect(),
            validation: Vec::new(),
        }
    }

    /// Column indices on one side of the split.
    pub fn columns(&self, split: Split) -> &[usize] {
        match split {
            Split::Training => &self.training,
            Split::Validation => &self.validation,
        }
    }

    /// Whether column `col` is held out.
    pub fn is_validation(&self, col: usize) -> bool {
        self.validation.contains(&col)
    }

    /// Total number of columns.
    pub fn len(&self) -> usize {
        self.training.len() + self.validation.len()
    }

    /// Whether the design has no columns.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
