//! Target providers.
//!
//! A [`TargetProvider`] supplies the targets of one statistical source.
//! Providers are registered explicitly with a
//! [`TargetRegistry`](crate::TargetRegistry) and are asked for their targets
//! at build time; there is no process-wide registry.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use reweight_core::types::{GeographicLevel, Target, Unit, Year};
use serde::Deserialize;
use tracing::debug;

use crate::error::MatrixError;

/// Source of calibration targets.
pub trait TargetProvider: Send + Sync {
    /// Provider name for logging.
    fn name(&self) -> &str;

    /// All targets this provider knows about.
    fn targets(&self) -> Result<Vec<Target>, MatrixError>;
}

/// Provider over a fixed in-memory list.
#[derive(Debug, Clone, Default)]
pub struct StaticTargetProvider {
    name: String,
    targets: Vec<Target>,
}

impl StaticTargetProvider {
    /// Create a provider returning `targets`.
    pub fn new(name: impl Into<String>, targets: Vec<Target>) -> Self {
        Self {
            name: name.into(),
            targets,
        }
    }
}

impl TargetProvider for StaticTargetProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn targets(&self) -> Result<Vec<Target>, MatrixError> {
        Ok(self.targets.clone())
    }
}

/// One row of a long-format target file: one target in one year.
#[derive(Debug, Clone, Deserialize)]
struct TargetRecord {
    name: String,
    variable: String,
    #[serde(default)]
    source: String,
    unit: String,
    #[serde(default)]
    geographic_level: Option<String>,
    #[serde(default)]
    geo_code: Option<String>,
    #[serde(default)]
    geo_name: Option<String>,
    year: Year,
    value: f64,
    #[serde(default)]
    breakdown_variable: Option<String>,
    #[serde(default)]
    lower_bound: Option<f64>,
    #[serde(default)]
    upper_bound: Option<f64>,
    #[serde(default)]
    is_count: Option<bool>,
    #[serde(default)]
    reference_url: Option<String>,
    #[serde(default)]
    metric: Option<String>,
}

impl TargetRecord {
    fn into_target(self) -> Result<Target, MatrixError> {
        let unit: Unit = self.unit.parse()?;
        let level: GeographicLevel = match self.geographic_level.as_deref() {
            Some(level) if !level.trim().is_empty() => level.parse()?,
            _ => GeographicLevel::National,
        };
        let mut target = Target::new(self.name, self.variable, unit)
            .with_source(self.source)
            .with_level(level)
            .with_value(self.year, self.value);
        target.geo_code = self.geo_code.filter(|s| !s.is_empty());
        target.geo_name = self.geo_name.filter(|s| !s.is_empty());
        target.breakdown_variable = self.breakdown_variable.filter(|s| !s.is_empty());
        target.lower_bound = self.lower_bound;
        target.upper_bound = self.upper_bound;
        target.is_count = self.is_count.unwrap_or(false);
        target.reference_url = self.reference_url.filter(|s| !s.is_empty());
        target.metric = self.metric.filter(|s| !s.is_empty());
        Ok(target)
    }
}

/// Provider reading a long-format CSV file.
///
/// Required columns: `name`, `variable`, `unit`, `year`, `value`. Optional:
/// `source`, `geographic_level`, `geo_code`, `geo_name`,
/// `breakdown_variable`, `lower_bound`, `upper_bound`, `is_count`,
/// `reference_url`, `metric`. Rows sharing a `name` are merged into one
/// target; descriptive fields come from the first row.
#[derive(Debug, Clone)]
pub struct CsvTargetProvider {
    path: PathBuf,
}

impl CsvTargetProvider {
    /// Create a provider for the file at `path`.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Path of the target file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TargetProvider for CsvTargetProvider {
    fn name(&self) -> &str {
        "csv"
    }

    fn targets(&self) -> Result<Vec<Target>, MatrixError> {
        let records: Vec<TargetRecord> = infra_store::read_csv(&self.path)?;
        let row_count = records.len();

        let mut order: Vec<String> = Vec::new();
        let mut merged: BTreeMap<String, Target> = BTreeMap::new();
        for record in records {
            let (year, value) = (record.year, record.value);
            match merged.get_mut(&record.name) {
                Some(existing) => {
                    existing.values.insert(year, value);
                }
                None => {
                    let target = record.into_target()?;
                    order.push(target.name.clone());
                    merged.insert(target.name.clone(), target);
                }
            }
        }

        debug!(
            path = %self.path.display(),
            rows = row_count,
            targets = order.len(),
            "Loaded target file"
        );
        Ok(order
            .into_iter()
            .filter_map(|name| merged.remove(&name))
            .collect())
    }
}
