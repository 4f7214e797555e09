//! Calibration targets.
//!
//! A [`Target`] is one official statistic the weighted microdata should
//! reproduce, e.g. "income tax receipts in 2025". Targets are built once
//! per calibration run with the `with_*` methods and are not mutated
//! afterwards.
//!
//! How a target turns into a household-level design column is decided by
//! its [`ComputeStrategy`], attached at registration time. Targets without
//! an explicit strategy fall back to one derived from their unit, count
//! flag and band (see [`Target::compute_strategy`]).

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use super::error::TargetError;
use super::geography::GeographicLevel;
use super::microdata::Microdata;

/// Calendar year.
pub type Year = i32;

/// Unit a target value is expressed in.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    /// Pounds sterling
    Gbp,
    /// Headcount of people, benefit units or households
    Count,
    /// Dimensionless rate
    Rate,
}

impl Unit {
    /// Lower-case code.
    pub fn code(&self) -> &'static str {
        match self {
            Unit::Gbp => "gbp",
            Unit::Count => "count",
            Unit::Rate => "rate",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for Unit {
    type Err = TargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gbp" | "£" => Ok(Unit::Gbp),
            "count" => Ok(Unit::Count),
            "rate" => Ok(Unit::Rate),
            _ => Err(TargetError::unknown_code("unit", s)),
        }
    }
}

/// Signature of a per-target custom compute function.
///
/// Receives the microdata, the target and the calibration year and returns
/// one value per household.
pub type CustomComputeFn =
    dyn Fn(&dyn Microdata, &Target, Year) -> anyhow::Result<Array1<f64>> + Send + Sync;

/// Shared handle to a [`CustomComputeFn`].
#[derive(Clone)]
pub struct CustomCompute(Arc<CustomComputeFn>);

impl CustomCompute {
    /// Wrap a closure.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&dyn Microdata, &Target, Year) -> anyhow::Result<Array1<f64>> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Evaluate for one target.
    pub fn call(
        &self,
        microdata: &dyn Microdata,
        target: &Target,
        year: Year,
    ) -> anyhow::Result<Array1<f64>> {
        (self.0)(microdata, target, year)
    }
}

impl fmt::Debug for CustomCompute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CustomCompute(..)")
    }
}

/// How a target's household-level column is computed.
#[derive(Clone, Debug)]
pub enum ComputeStrategy {
    /// Sum the target variable over each household's members.
    Sum,
    /// Count the members of each household with a positive value of the
    /// target variable.
    Count,
    /// Like `Sum` (or `Count` for count targets) but only over entities whose
    /// `breakdown` variable lies in `[lower, upper)`.
    BandedSum {
        /// Variable the band is defined on, e.g. `total_income`
        breakdown: String,
        /// Inclusive lower bound
        lower: f64,
        /// Exclusive upper bound
        upper: f64,
    },
    /// Target-specific function for cross-tabulations and counterfactuals.
    Custom(CustomCompute),
}

impl ComputeStrategy {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            ComputeStrategy::Sum => "sum",
            ComputeStrategy::Count => "count",
            ComputeStrategy::BandedSum { .. } => "banded_sum",
            ComputeStrategy::Custom(_) => "custom",
        }
    }
}

/// How a value taken from an earlier year is carried forward.
#[derive(Clone, Debug, Default)]
pub enum Extrapolation {
    /// Use the earlier value unchanged.
    #[default]
    Hold,
    /// Scale by `index[requested] / index[source]`, e.g. population growth
    /// for household counts.
    IndexScaled(Arc<BTreeMap<Year, f64>>),
}

impl Extrapolation {
    /// Index-scaled extrapolation over the given series.
    pub fn index_scaled(index: impl IntoIterator<Item = (Year, f64)>) -> Self {
        Extrapolation::IndexScaled(Arc::new(index.into_iter().collect()))
    }

    /// Factor to carry a value from `from` to `to`.
    ///
    /// Falls back to 1 when the index is missing either year or the base is
    /// not positive.
    pub fn factor(&self, from: Year, to: Year) -> f64 {
        match self {
            Extrapolation::Hold => 1.0,
            Extrapolation::IndexScaled(index) => match (index.get(&from), index.get(&to)) {
                (Some(&base), Some(&current)) if base > 0.0 => current / base,
                _ => 1.0,
            },
        }
    }
}

/// One calibration target.
///
/// # Examples
///
/// ```
/// use reweight_core::types::{GeographicLevel, Target, Unit};
///
/// let target = Target::new("ons/age/0_10", "age", Unit::Count)
///     .with_level(GeographicLevel::Constituency)
///     .with_geo("E14000530", "Aldershot")
///     .with_metric("age/0_10")
///     .with_value(2022, 9_812.0)
///     .as_count();
/// assert_eq!(target.metric_key(), "age/0_10");
/// assert!(target.validate().is_ok());
/// ```
#[derive(Clone, Debug)]
pub struct Target {
    /// Unique name, e.g. `obr/income_tax`
    pub name: String,
    /// Simulation variable the target measures
    pub variable: String,
    /// Publishing body, e.g. `obr`
    pub source: String,
    /// Unit of `values`
    pub unit: Unit,
    /// Geographic resolution
    pub geographic_level: GeographicLevel,
    /// GSS code of the geography, for non-national targets
    pub geo_code: Option<String>,
    /// Display name of the geography
    pub geo_name: Option<String>,
    /// Value per calendar year
    pub values: BTreeMap<Year, f64>,
    /// Variable a banded breakdown is defined on
    pub breakdown_variable: Option<String>,
    /// Inclusive lower band bound
    pub lower_bound: Option<f64>,
    /// Exclusive upper band bound
    pub upper_bound: Option<f64>,
    /// Whether the target counts entities rather than summing amounts
    pub is_count: bool,
    /// Link to the published table
    pub reference_url: Option<String>,
    /// Metric key shared by the per-area targets of one local breakdown
    pub metric: Option<String>,
    /// Carry-forward rule for earlier-year values
    pub extrapolation: Extrapolation,
    /// Explicit compute strategy, if any
    pub strategy: Option<ComputeStrategy>,
}

impl Target {
    /// Create a national target with no values.
    pub fn new(name: impl Into<String>, variable: impl Into<String>, unit: Unit) -> Self {
        Self {
            name: name.into(),
            variable: variable.into(),
            source: String::new(),
            unit,
            geographic_level: GeographicLevel::National,
            geo_code: None,
            geo_name: None,
            values: BTreeMap::new(),
            breakdown_variable: None,
            lower_bound: None,
            upper_bound: None,
            is_count: false,
            reference_url: None,
            metric: None,
            extrapolation: Extrapolation::Hold,
            strategy: None,
        }
    }

    /// Set the publishing source.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Set the geographic level.
    pub fn with_level(mut self, level: GeographicLevel) -> Self {
        self.geographic_level = level;
        self
    }

    /// Set the geography code and name.
    pub fn with_geo(mut self, code: impl Into<String>, name: impl Into<String>) -> Self {
        self.geo_code = Some(code.into());
        self.geo_name = Some(name.into());
        self
    }

    /// Add or replace the value for one year.
    pub fn with_value(mut self, year: Year, value: f64) -> Self {
        self.values.insert(year, value);
        self
    }

    /// Add or replace values for several years.
    pub fn with_values(mut self, values: impl IntoIterator<Item = (Year, f64)>) -> Self {
        self.values.extend(values);
        self
    }

    /// Restrict the target to a band of another variable.
    pub fn with_band(mut self, breakdown: impl Into<String>, lower: f64, upper: f64) -> Self {
        self.breakdown_variable = Some(breakdown.into());
        self.lower_bound = Some(lower);
        self.upper_bound = Some(upper);
        self
    }

    /// Mark the target as a count.
    pub fn as_count(mut self) -> Self {
        self.is_count = true;
        self
    }

    /// Set the reference URL.
    pub fn with_reference_url(mut self, url: impl Into<String>) -> Self {
        self.reference_url = Some(url.into());
        self
    }

    /// Set the local metric key.
    pub fn with_metric(mut self, metric: impl Into<String>) -> Self {
        self.metric = Some(metric.into());
        self
    }

    /// Set the carry-forward rule.
    pub fn with_extrapolation(mut self, extrapolation: Extrapolation) -> Self {
        self.extrapolation = extrapolation;
        self
    }

    /// Attach an explicit compute strategy.
    pub fn with_strategy(mut self, strategy: ComputeStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Attach a custom compute function.
    pub fn with_custom_compute<F>(self, f: F) -> Self
    where
        F: Fn(&dyn Microdata, &Target, Year) -> anyhow::Result<Array1<f64>> + Send + Sync + 'static,
    {
        self.with_strategy(ComputeStrategy::Custom(CustomCompute::new(f)))
    }

    /// Metric key: `metric` if set, otherwise `name`.
    pub fn metric_key(&self) -> &str {
        self.metric.as_deref().unwrap_or(&self.name)
    }

    /// Strategy used to compute this target's column.
    ///
    /// An explicit strategy wins. Otherwise, in order:
    /// 1. a declared band (breakdown variable with both bounds) gives `BandedSum`
    /// 2. a currency amount that is not a count gives `Sum`
    /// 3. a count in count units gives `Count`
    ///
    /// Anything else has no strategy and is skipped by the builder.
    pub fn compute_strategy(&self) -> Option<ComputeStrategy> {
        if let Some(strategy) = &self.strategy {
            return Some(strategy.clone());
        }
        if let (Some(breakdown), Some(lower), Some(upper)) =
            (&self.breakdown_variable, self.lower_bound, self.upper_bound)
        {
            return Some(ComputeStrategy::BandedSum {
                breakdown: breakdown.clone(),
                lower,
                upper,
            });
        }
        match (self.unit, self.is_count) {
            (Unit::Gbp, false) => Some(ComputeStrategy::Sum),
            (Unit::Count, true) => Some(ComputeStrategy::Count),
            _ => None,
        }
    }

    /// Check the target is well formed.
    ///
    /// # Errors
    /// - [`TargetError::EmptyName`] for an empty name
    /// - [`TargetError::NonFiniteValue`] for a NaN or infinite value
    /// - [`TargetError::InvalidBand`] when `lower >= upper`
    pub fn validate(&self) -> Result<(), TargetError> {
        if self.name.trim().is_empty() {
            return Err(TargetError::EmptyName);
        }
        if let Some((&year, _)) = self.values.iter().find(|(_, v)| !v.is_finite()) {
            return Err(TargetError::NonFiniteValue {
                name: self.name.clone(),
                year,
            });
        }
        if let (Some(lower), Some(upper)) = (self.lower_bound, self.upper_bound) {
            if lower.partial_cmp(&upper) != Some(std::cmp::Ordering::Less) {
                return Err(TargetError::InvalidBand {
                    name: self.name.clone(),
                    lower,
                    upper,
                });
            }
        }
        Ok(())
    }
}
