//! Geography mask construction.

use ndarray::Array2;
use reweight_core::types::{Area, Country, GeographicLevel, GeographyMask, Microdata};

use crate::error::MatrixError;

/// Country of every household, read from the microdata's country geography.
pub fn household_countries<M: Microdata + ?Sized>(
    microdata: &M,
) -> Result<Vec<Country>, MatrixError> {
    microdata
        .household_geography(GeographicLevel::Country)?
        .into_iter()
        .enumerate()
        .map(|(household, value)| {
            value
                .parse::<Country>()
                .map_err(|_| MatrixError::UnknownHouseholdCountry { household, value })
        })
        .collect()
}

/// Build the area × household mask: `R[a, h] = 1` iff household `h` is in
/// the same country as area `a`.
///
/// An area's country is read from the first letter of its GSS code.
///
/// # Errors
///
/// [`MatrixError::UnknownAreaCode`] for a code that does not start with
/// `E`, `W`, `S` or `N`.
///
/// # Examples
///
/// ```
/// use reweight_core::types::{Area, Country};
/// use reweight_matrix::build_country_mask;
///
/// let households = [Country::England, Country::Scotland, Country::England];
/// let areas = [Area::new("E14000530", "Aldershot"), Area::new("S14000021", "East Renfrewshire")];
/// let mask = build_country_mask(&households, &areas)?;
/// assert_eq!(mask.as_array().row(0).to_vec(), vec![1.0, 0.0, 1.0]);
/// assert_eq!(mask.as_array().row(1).to_vec(), vec![0.0, 1.0, 0.0]);
/// # Ok::<(), reweight_matrix::MatrixError>(())
/// ```
pub fn build_country_mask(
    household_countries: &[Country],
    areas: &[Area],
) -> Result<GeographyMask, MatrixError> {
    let area_countries = areas
        .iter()
        .map(|area| area.country().ok_or_else(|| MatrixError::unknown_area_code(&area.code)))
        .collect::<Result<Vec<_>, _>>()?;

    let mask = Array2::from_shape_fn(
        (areas.len(), household_countries.len()),
        |(a, h)| {
            if household_countries[h] == area_countries[a] {
                1.0
            } else {
                0.0
            }
        },
    );
    Ok(GeographyMask::new(mask)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_household_in_one_area_country() {
        let households = [
            Country::Wales,
            Country::NorthernIreland,
            Country::England,
            Country::Wales,
        ];
        let areas = [
            Area::new("E14000001", "A"),
            Area::new("W07000041", "B"),
            Area::new("N06000001", "C"),
            Area::new("E14000002", "D"),
        ];
        let mask = build_country_mask(&households, &areas).unwrap();
        assert_eq!(mask.area_count(), 4);
        assert_eq!(mask.household_count(), 4);
        assert_eq!(mask.areas_per_household().to_vec(), vec![1.0, 1.0, 2.0, 1.0]);
        assert!(mask.uncovered_households().is_empty());
    }

    #[test]
    fn test_unknown_area_code() {
        let err = build_country_mask(&[Country::England], &[Area::new("K02000001", "UK")])
            .unwrap_err();
        assert!(err.is_unknown_area_code());
    }

    #[test]
    fn test_household_without_matching_area() {
        let mask = build_country_mask(
            &[Country::England, Country::Scotland],
            &[Area::new("E06000001", "Hartlepool")],
        )
        .unwrap();
        assert_eq!(mask.uncovered_households(), vec![1]);
    }
}
