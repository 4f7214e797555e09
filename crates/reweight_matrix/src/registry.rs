//! Target registry.

use std::collections::HashSet;

use infra_config::TargetSettings;
use reweight_core::types::{GeographicLevel, Target, Year};
use tracing::{debug, warn};

use crate::error::MatrixError;
use crate::provider::{CsvTargetProvider, TargetProvider};

/// Ordered collection of target providers.
///
/// Targets are de-duplicated by name across providers: the first provider
/// registered wins. Targets failing validation are skipped with a warning.
///
/// # Examples
///
/// ```
/// use reweight_core::types::{GeographicLevel, Target, Unit};
/// use reweight_matrix::{StaticTargetProvider, TargetRegistry};
///
/// let mut registry = TargetRegistry::new();
/// registry.register(StaticTargetProvider::new(
///     "obr",
///     vec![Target::new("obr/income_tax", "income_tax", Unit::Gbp).with_value(2025, 1.0)],
/// ));
/// let national = registry.targets(Some(GeographicLevel::National), None)?;
/// assert_eq!(national.len(), 1);
/// # Ok::<(), reweight_matrix::MatrixError>(())
/// ```
#[derive(Default)]
pub struct TargetRegistry {
    providers: Vec<Box<dyn TargetProvider>>,
}

impl TargetRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the targets file named in `settings`, if any.
    ///
    /// Providers registered afterwards lose name clashes to the file.
    pub fn from_settings(settings: &TargetSettings) -> Self {
        let mut registry = Self::new();
        if let Some(path) = &settings.targets_csv {
            registry.register(CsvTargetProvider::new(path));
        }
        registry
    }

    /// Append a provider. Earlier providers take precedence on name clashes.
    pub fn register<P: TargetProvider + 'static>(&mut self, provider: P) -> &mut Self {
        self.providers.push(Box::new(provider));
        self
    }

    /// Number of registered providers.
    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    /// De-duplicated targets, optionally filtered.
    ///
    /// # Arguments
    ///
    /// * `level` - keep only targets at this geographic level
    /// * `year` - keep only targets with a value for exactly this year
    ///
    /// # Errors
    ///
    /// Propagates the first provider failure.
    pub fn targets(
        &self,
        level: Option<GeographicLevel>,
        year: Option<Year>,
    ) -> Result<Vec<Target>, MatrixError> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut targets = Vec::new();

        for provider in &self.providers {
            for target in provider.targets()? {
                if let Err(e) = target.validate() {
                    warn!(provider = provider.name(), target_name = %target.name, error = %e, "Skipping invalid target");
                    continue;
                }
                if !seen.insert(target.name.clone()) {
                    debug!(provider = provider.name(), target_name = %target.name, "Duplicate target ignored");
                    continue;
                }
                if level.is_some_and(|l| target.geographic_level != l) {
                    continue;
                }
                if year.is_some_and(|y| !target.values.contains_key(&y)) {
                    continue;
                }
                targets.push(target);
            }
        }
        Ok(targets)
    }

    /// De-duplicated targets at any of `levels`, in provider order.
    pub fn targets_at(&self, levels: &[GeographicLevel]) -> Result<Vec<Target>, MatrixError> {
        Ok(self
            .targets(None, None)?
            .into_iter()
            .filter(|t| levels.contains(&t.geographic_level))
            .collect())
    }
}

impl std::fmt::Debug for TargetRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.providers.iter().map(|p| p.name()).collect();
        f.debug_struct("TargetRegistry")
            .field("providers", &names)
            .finish()
    }
}
