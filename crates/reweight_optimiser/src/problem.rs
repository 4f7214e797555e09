//! Validated calibration inputs.

use reweight_core::types::{DesignError, GeographyMask, LocalDesign, NationalDesign};
use tracing::warn;

use crate::partition::{Split, TargetPartition};

/// Everything the optimiser needs apart from the starting weights.
///
/// Construction checks that the local design, national design and mask
/// agree on the household count and that the mask has one row per area.
#[derive(Debug, Clone)]
pub struct CalibrationProblem {
    local: LocalDesign,
    national: NationalDesign,
    mask: GeographyMask,
    excluded: Vec<String>,
    local_partition: TargetPartition,
    national_partition: TargetPartition,
}

impl CalibrationProblem {
    /// Create a problem with every column in training.
    ///
    /// # Errors
    ///
    /// [`DesignError`] when shapes disagree or a design fails validation.
    pub fn new(
        local: LocalDesign,
        national: NationalDesign,
        mask: GeographyMask,
    ) -> Result<Self, DesignError> {
        local.validate()?;
        national.validate()?;
        let households = mask.household_count();
        if local.household_count() != households {
            return Err(DesignError::shape_mismatch(
                "local matrix rows",
                households,
                local.household_count(),
            ));
        }
        if national.household_count() != households {
            return Err(DesignError::shape_mismatch(
                "national matrix rows",
                households,
                national.household_count(),
            ));
        }
        if local.area_count() != mask.area_count() {
            return Err(DesignError::shape_mismatch(
                "mask rows",
                local.area_count(),
                mask.area_count(),
            ));
        }

        let local_partition = TargetPartition::all(local.target_count());
        let national_partition = TargetPartition::all(national.target_count());
        Ok(Self {
            local,
            national,
            mask,
            excluded: Vec::new(),
            local_partition,
            national_partition,
        })
    }

    /// Hold out the named columns of either design for validation.
    pub fn with_excluded<S: AsRef<str>>(mut self, excluded: &[S]) -> Self {
        self.excluded = excluded.iter().map(|s| s.as_ref().to_string()).collect();
        for name in &self.excluded {
            if !self.local.names.contains(name) && !self.national.names.contains(name) {
                warn!(column = %name, "Excluded column not present in either design");
            }
        }
        self.local_partition = TargetPartition::new(&self.local.names, &self.excluded);
        self.national_partition = TargetPartition::new(&self.national.names, &self.excluded);
        self
    }

    /// Local design.
    pub fn local(&self) -> &LocalDesign {
        &self.local
    }

    /// National design.
    pub fn national(&self) -> &NationalDesign {
        &self.national
    }

    /// Geography mask.
    pub fn mask(&self) -> &GeographyMask {
        &self.mask
    }

    /// Held-out column names.
    pub fn excluded(&self) -> &[String] {
        &self.excluded
    }

    /// Split of local columns.
    pub fn local_partition(&self) -> &TargetPartition {
        &self.local_partition
    }

    /// Split of national columns.
    pub fn national_partition(&self) -> &TargetPartition {
        &self.national_partition
    }

    /// Whether any column is held out.
    pub fn has_validation(&self) -> bool {
        !self.local_partition.columns(Split::Validation).is_empty()
            || !self.national_partition.columns(Split::Validation).is_empty()
    }

    /// Number of areas.
    pub fn area_count(&self) -> usize {
        self.mask.area_count()
    }

    /// Number of households.
    pub fn household_count(&self) -> usize {
        self.mask.household_count()
    }

    /// Shape of the weight matrix, `(A, H)`.
    pub fn weight_dim(&self) -> (usize, usize) {
        (self.area_count(), self.household_count())
    }
}
