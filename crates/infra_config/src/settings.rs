//! Settings and configuration structures.

use crate::error::ConfigError;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Epoch budget for a full calibration run.
pub const FULL_EPOCHS: usize = 512;

/// Epoch budget in fast/testing mode.
pub const FAST_EPOCHS: usize = 32;

/// Main application settings.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    /// Optimiser configuration
    #[serde(default)]
    pub optimiser: OptimiserSettings,
    /// Target resolution configuration
    #[serde(default)]
    pub targets: TargetSettings,
    /// Output locations
    #[serde(default)]
    pub storage: StorageSettings,
}

impl Settings {
    /// Load settings from configuration files and environment variables.
    ///
    /// Configuration is loaded in the following order (later sources override earlier):
    /// 1. `config/default.toml`
    /// 2. `config/{environment}.toml` (based on `REWEIGHT_ENV`)
    /// 3. Environment variables prefixed with `REWEIGHT__`
    ///    (e.g. `REWEIGHT__OPTIMISER__EPOCHS=128`)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Path::new("config"))
    }

    /// Load settings using `dir` as the configuration directory.
    pub fn load_from(dir: &Path) -> Result<Self, ConfigError> {
        let env = std::env::var("REWEIGHT_ENV").unwrap_or_else(|_| "development".into());

        let config = Config::builder()
            .add_source(File::with_name(&dir.join("default").to_string_lossy()).required(false))
            .add_source(File::with_name(&dir.join(&env).to_string_lossy()).required(false))
            .add_source(
                Environment::with_prefix("REWEIGHT")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Parse settings from a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let settings: Settings = toml::from_str(content)
            .map_err(|e| ConfigError::FileError(format!("Failed to parse TOML: {}", e)))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a single TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileError(format!("Failed to read config file: {}", e)))?;
        Self::from_toml_str(&content)
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.optimiser.validate()?;
        self.targets.validate()?;
        Ok(())
    }
}

/// Compute device used by the optimiser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    /// Single-threaded dense CPU kernels
    #[default]
    Cpu,
    /// Rayon-parallel CPU kernels
    Parallel,
}

impl FromStr for DeviceKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cpu" => Ok(DeviceKind::Cpu),
            "parallel" | "rayon" => Ok(DeviceKind::Parallel),
            _ => Err(ConfigError::invalid_value(
                "optimiser.device",
                format!("unknown device '{}', expected cpu or parallel", s),
            )),
        }
    }
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceKind::Cpu => write!(f, "cpu"),
            DeviceKind::Parallel => write!(f, "parallel"),
        }
    }
}

/// Optimiser configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct OptimiserSettings {
    /// Explicit epoch budget; falls back to the mode default when unset
    #[serde(default)]
    pub epochs: Option<usize>,
    /// Fast/testing mode (reduced epochs)
    #[serde(default = "default_testing")]
    pub testing: bool,
    /// Adam learning rate
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    /// Fraction of log-weights replaced by their mean each epoch
    #[serde(default = "default_dropout_rate")]
    pub dropout_rate: f64,
    /// Scale of the uniform noise added to initial weights
    #[serde(default = "default_jitter")]
    pub jitter: f64,
    /// Epochs between checkpoints
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: usize,
    /// RNG seed; entropy-seeded when unset
    #[serde(default)]
    pub seed: Option<u64>,
    /// Compute device
    #[serde(default)]
    pub device: DeviceKind,
    /// Worker threads for the parallel device
    #[serde(default = "default_threads")]
    pub threads: usize,
}

impl Default for OptimiserSettings {
    fn default() -> Self {
        Self {
            epochs: None,
            testing: default_testing(),
            learning_rate: default_learning_rate(),
            dropout_rate: default_dropout_rate(),
            jitter: default_jitter(),
            checkpoint_interval: default_checkpoint_interval(),
            seed: None,
            device: DeviceKind::default(),
            threads: default_threads(),
        }
    }
}

impl OptimiserSettings {
    /// Epoch budget after applying the testing-mode default.
    pub fn effective_epochs(&self) -> usize {
        self.epochs
            .unwrap_or(if self.testing { FAST_EPOCHS } else { FULL_EPOCHS })
    }

    /// Validate value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(ConfigError::invalid_value(
                "optimiser.learning_rate",
                format!("must be positive, got {}", self.learning_rate),
            ));
        }
        if !(0.0..1.0).contains(&self.dropout_rate) {
            return Err(ConfigError::invalid_value(
                "optimiser.dropout_rate",
                format!("must lie in [0, 1), got {}", self.dropout_rate),
            ));
        }
        if !(self.jitter >= 0.0 && self.jitter.is_finite()) {
            return Err(ConfigError::invalid_value(
                "optimiser.jitter",
                format!("must be non-negative, got {}", self.jitter),
            ));
        }
        if self.checkpoint_interval == 0 {
            return Err(ConfigError::invalid_value(
                "optimiser.checkpoint_interval",
                "must be at least 1",
            ));
        }
        if self.threads == 0 {
            return Err(ConfigError::invalid_value(
                "optimiser.threads",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

fn default_testing() -> bool {
    std::env::var("TESTING").map(|v| v == "1").unwrap_or(false)
}

fn default_learning_rate() -> f64 {
    0.1
}

fn default_dropout_rate() -> f64 {
    0.05
}

fn default_jitter() -> f64 {
    0.01
}

fn default_checkpoint_interval() -> usize {
    10
}

fn default_threads() -> usize {
    num_cpus::get()
}

/// Target resolution configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct TargetSettings {
    /// Calibration year
    #[serde(default = "default_year")]
    pub year: i32,
    /// Maximum distance (years) to the nearest available target value
    #[serde(default = "default_year_tolerance")]
    pub year_tolerance: u32,
    /// Target names held out of training for validation
    #[serde(default)]
    pub excluded: Vec<String>,
    /// Multiplier applied on top of the national-consistency rescaling,
    /// read by `DesignMatrixBuilder::from_settings`
    #[serde(default = "default_consistency_factor")]
    pub national_consistency_factor: f64,
    /// Long-format targets CSV
    #[serde(default)]
    pub targets_csv: Option<PathBuf>,
}

impl Default for TargetSettings {
    fn default() -> Self {
        Self {
            year: default_year(),
            year_tolerance: default_year_tolerance(),
            excluded: Vec::new(),
            national_consistency_factor: default_consistency_factor(),
            targets_csv: None,
        }
    }
}

impl TargetSettings {
    /// Validate value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.national_consistency_factor > 0.0 && self.national_consistency_factor.is_finite())
        {
            return Err(ConfigError::invalid_value(
                "targets.national_consistency_factor",
                format!("must be positive, got {}", self.national_consistency_factor),
            ));
        }
        Ok(())
    }
}

fn default_year() -> i32 {
    2025
}

fn default_year_tolerance() -> u32 {
    3
}

fn default_consistency_factor() -> f64 {
    1.0
}

/// Output locations.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageSettings {
    /// Root directory of the weight-snapshot store
    #[serde(default = "default_weights_dir")]
    pub weights_dir: PathBuf,
    /// Weight file name for this area group
    #[serde(default = "default_weight_file")]
    pub weight_file: String,
    /// Optional performance log
    #[serde(default)]
    pub log_csv: Option<PathBuf>,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            weights_dir: default_weights_dir(),
            weight_file: default_weight_file(),
            log_csv: None,
        }
    }
}

fn default_weights_dir() -> PathBuf {
    PathBuf::from("storage")
}

fn default_weight_file() -> String {
    "local_area_weights".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings {
            optimiser: OptimiserSettings {
                testing: false,
                ..OptimiserSettings::default()
            },
            ..Settings::default()
        };
        assert_eq!(settings.optimiser.effective_epochs(), FULL_EPOCHS);
        assert!((settings.optimiser.learning_rate - 0.1).abs() < 1e-15);
        assert!((settings.optimiser.dropout_rate - 0.05).abs() < 1e-15);
        assert_eq!(settings.optimiser.checkpoint_interval, 10);
        assert_eq!(settings.targets.year_tolerance, 3);
        assert!(settings.optimiser.threads > 0);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_testing_mode_epochs() {
        let optimiser = OptimiserSettings {
            testing: true,
            ..OptimiserSettings::default()
        };
        assert_eq!(optimiser.effective_epochs(), FAST_EPOCHS);

        let explicit = OptimiserSettings {
            testing: true,
            epochs: Some(200),
            ..OptimiserSettings::default()
        };
        assert_eq!(explicit.effective_epochs(), 200);
    }

    #[test]
    fn test_from_toml_str() {
        let settings = Settings::from_toml_str(
            r#"
            [optimiser]
            epochs = 64
            learning_rate = 0.05
            device = "parallel"
            seed = 7

            [targets]
            year = 2024
            excluded = ["hmrc/income_tax"]

            [storage]
            weight_file = "parliamentary_constituency_weights"
            log_csv = "constituency_calibration_log.csv"
            "#,
        )
        .unwrap();

        assert_eq!(settings.optimiser.effective_epochs(), 64);
        assert_eq!(settings.optimiser.device, DeviceKind::Parallel);
        assert_eq!(settings.optimiser.seed, Some(7));
        assert_eq!(settings.targets.year, 2024);
        assert_eq!(settings.targets.excluded, vec!["hmrc/income_tax".to_string()]);
        assert_eq!(
            settings.storage.weight_file,
            "parliamentary_constituency_weights"
        );
        assert!(settings.storage.log_csv.is_some());
    }

    #[test]
    fn test_invalid_dropout_rejected() {
        let result = Settings::from_toml_str(
            r#"
            [optimiser]
            dropout_rate = 1.5
            "#,
        );
        assert!(matches!(result, Err(ref e) if e.is_invalid_value()));
    }

    #[test]
    fn test_zero_checkpoint_interval_rejected() {
        let optimiser = OptimiserSettings {
            checkpoint_interval: 0,
            ..OptimiserSettings::default()
        };
        assert!(optimiser.validate().is_err());
    }

    #[test]
    fn test_device_kind_parsing() {
        assert_eq!(DeviceKind::from_str("CPU").unwrap(), DeviceKind::Cpu);
        assert_eq!(DeviceKind::from_str("parallel").unwrap(), DeviceKind::Parallel);
        assert_eq!(DeviceKind::from_str("rayon").unwrap(), DeviceKind::Parallel);
        assert!(DeviceKind::from_str("gpu").is_err());
        assert_eq!(DeviceKind::Parallel.to_string(), "parallel");
    }

    #[test]
    fn test_load_from_missing_directory_uses_defaults() {
        let settings = Settings::load_from(Path::new("does/not/exist")).unwrap();
        assert_eq!(settings.targets.year, 2025);
        assert_eq!(settings.storage.weight_file, "local_area_weights");
    }
}
