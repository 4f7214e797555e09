//! Geography types.
//!
//! # Examples
//!
//! ```
//! use reweight_core::types::{Country, GeographicLevel};
//!
//! assert_eq!(Country::from_area_code("S14000001"), Some(Country::Scotland));
//! assert_eq!("NORTHERN_IRELAND".parse::<Country>().unwrap(), Country::NorthernIreland);
//! assert!(GeographicLevel::Constituency.is_local());
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::TargetError;

/// Geographic resolution of a target.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeographicLevel {
    /// United Kingdom total
    National,
    /// One of the four constituent countries
    Country,
    /// ITL1 region
    Region,
    /// Parliamentary constituency
    Constituency,
    /// Local authority district
    LocalAuthority,
}

impl GeographicLevel {
    /// Snake-case code, as used in target files.
    pub fn code(&self) -> &'static str {
        match self {
            GeographicLevel::National => "national",
            GeographicLevel::Country => "country",
            GeographicLevel::Region => "region",
            GeographicLevel::Constituency => "constituency",
            GeographicLevel::LocalAuthority => "local_authority",
        }
    }

    /// Whether each area of this level gets its own weight row.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            GeographicLevel::Constituency | GeographicLevel::LocalAuthority
        )
    }

    /// Whether targets at this level feed the national design matrix.
    ///
    /// Country and region targets are nationally scoped but restricted to
    /// the households of one geography.
    pub fn is_national_scope(&self) -> bool {
        !self.is_local()
    }
}

impl fmt::Display for GeographicLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for GeographicLevel {
    type Err = TargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "national" | "uk" => Ok(GeographicLevel::National),
            "country" => Ok(GeographicLevel::Country),
            "region" => Ok(GeographicLevel::Region),
            "constituency" => Ok(GeographicLevel::Constituency),
            "local_authority" | "la" => Ok(GeographicLevel::LocalAuthority),
            _ => Err(TargetError::unknown_code("geographic level", s)),
        }
    }
}

/// UK constituent country.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Country {
    /// England (GSS codes starting `E`)
    England,
    /// Wales (GSS codes starting `W`)
    Wales,
    /// Scotland (GSS codes starting `S`)
    Scotland,
    /// Northern Ireland (GSS codes starting `N`)
    NorthernIreland,
}

impl Country {
    /// All countries in GSS order.
    pub const ALL: [Country; 4] = [
        Country::England,
        Country::Wales,
        Country::Scotland,
        Country::NorthernIreland,
    ];

    /// Country of a GSS area code, from its first letter.
    pub fn from_area_code(code: &str) -> Option<Self> {
        match code.trim().chars().next()? {
            'E' | 'e' => Some(Country::England),
            'W' | 'w' => Some(Country::Wales),
            'S' | 's' => Some(Country::Scotland),
            'N' | 'n' => Some(Country::NorthernIreland),
            _ => None,
        }
    }

    /// Upper snake-case name used by household country variables.
    pub fn name(&self) -> &'static str {
        match self {
            Country::England => "ENGLAND",
            Country::Wales => "WALES",
            Country::Scotland => "SCOTLAND",
            Country::NorthernIreland => "NORTHERN_IRELAND",
        }
    }
}

impl fmt::Display for Country {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Country {
    type Err = TargetError;

    /// Accepts a country name in any case (`"Scotland"`, `"NORTHERN_IRELAND"`,
    /// `"northern ireland"`) or a GSS area code such as `"W92000004"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalised = s.trim().to_ascii_uppercase().replace([' ', '-'], "_");
        let by_name = Country::ALL
            .iter()
            .copied()
            .find(|country| country.name() == normalised);
        if let Some(country) = by_name {
            return Ok(country);
        }
        let looks_like_code = normalised.len() > 1
            && normalised.chars().skip(1).all(|c| c.is_ascii_digit());
        if looks_like_code {
            if let Some(country) = Country::from_area_code(&normalised) {
                return Ok(country);
            }
        }
        Err(TargetError::unknown_code("country", s))
    }
}

/// One local area: a weight row of the calibration.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Area {
    /// GSS code, e.g. `E14001063`
    pub code: String,
    /// Display name
    pub name: String,
}

impl Area {
    /// Create a new area.
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
        }
    }

    /// Country of this area, from its code.
    pub fn country(&self) -> Option<Country> {
        Country::from_area_code(&self.code)
    }
}
