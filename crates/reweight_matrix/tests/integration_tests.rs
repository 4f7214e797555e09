//! Integration tests for design matrix construction.
//!
//! These tests run the full path from a long-format target file through the
//! registry and builder to validated local and national designs.

use std::io::Write;

use approx::assert_relative_eq;
use infra_config::Settings;
use ndarray::array;
use reweight_core::types::{Area, Entity, EntityArray, GeographicLevel, Target, Unit};
use reweight_matrix::{
    apply_area_mapping, apply_national_consistency, CsvTargetProvider, DesignMatrixBuilder,
    InMemoryMicrodata, StaticTargetProvider, TargetRegistry,
};

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Four households, six people: three English households and one Scottish.
fn microdata() -> InMemoryMicrodata {
    InMemoryMicrodata::new(array![100.0, 200.0, 150.0, 50.0])
        .with_persons(vec![0, 0, 1, 2, 3, 3])
        .with_variable(
            "people",
            EntityArray::new(Entity::Person, array![1.0, 1.0, 1.0, 1.0, 1.0, 1.0]),
        )
        .with_variable(
            "age",
            EntityArray::new(Entity::Person, array![5.0, 40.0, 70.0, 12.0, 33.0, 8.0]),
        )
        .with_geography(
            GeographicLevel::Country,
            vec![
                "ENGLAND".into(),
                "ENGLAND".into(),
                "SCOTLAND".into(),
                "ENGLAND".into(),
            ],
        )
}

fn areas() -> Vec<Area> {
    vec![
        Area::new("E14000001", "Aldershot"),
        Area::new("E14000002", "Aldridge-Brownhills"),
        Area::new("S14000001", "Aberdeen North"),
    ]
}

const TARGETS_CSV: &str = "\
name,variable,source,unit,geographic_level,geo_code,geo_name,year,value,breakdown_variable,lower_bound,upper_bound,is_count,metric
ons/age/0_18/E14000001,people,ons,count,constituency,E14000001,Aldershot,2022,10,age,0,18,true,age/0_18
ons/age/0_18/E14000002,people,ons,count,constituency,E14000002,Aldridge-Brownhills,2022,20,age,0,18,true,age/0_18
ons/age/0_18/S14000001,people,ons,count,constituency,S14000001,Aberdeen North,2022,30,age,0,18,true,age/0_18
ons/age/18_100/E14000001,people,ons,count,constituency,E14000001,Aldershot,2022,15,age,18,100,true,age/18_100
ons/age/18_100/E14000002,people,ons,count,constituency,E14000002,Aldridge-Brownhills,2022,25,age,18,100,true,age/18_100
ons/uk_population,people,ons,count,national,,,2024,6000,,,,true,
ons/scotland_population,people,ons,count,country,S92000003,Scotland,2025,1000,,,,true,
ons/employment_rate,employed,ons,rate,national,,,2025,0.75,,,,false,
obr/income_tax_2030,income_tax,obr,gbp,national,,,2030,1,,,,false,
";

fn registry_from_csv() -> (tempfile::NamedTempFile, TargetRegistry) {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(TARGETS_CSV.as_bytes()).unwrap();
    let mut registry = TargetRegistry::new();
    registry.register(CsvTargetProvider::new(file.path()));
    (file, registry)
}

// ============================================================================
// Local design
// ============================================================================

#[test]
fn test_local_design_from_csv() {
    init_logging();
    let data = microdata();
    let (_file, registry) = registry_from_csv();
    let builder = DesignMatrixBuilder::new(&data, 2025);

    let local = builder
        .build_local(&registry, GeographicLevel::Constituency, &areas())
        .unwrap();

    // age/18_100 lacks a Scottish value and is dropped
    assert_eq!(local.names, vec!["age/0_18"]);
    assert_eq!(local.matrix.column(0).to_vec(), vec![1.0, 0.0, 1.0, 1.0]);
    assert_eq!(local.targets.column(0).to_vec(), vec![10.0, 20.0, 30.0]);
    assert!(local.validate().is_ok());
}

#[test]
fn test_mask_matches_area_countries() {
    let data = microdata();
    let mask = DesignMatrixBuilder::new(&data, 2025)
        .build_mask(&areas())
        .unwrap();
    assert_eq!(
        mask.as_array(),
        &array![
            [1.0, 1.0, 0.0, 1.0],
            [1.0, 1.0, 0.0, 1.0],
            [0.0, 0.0, 1.0, 0.0]
        ]
    );
    assert!(mask.uncovered_households().is_empty());
}

// ============================================================================
// National design
// ============================================================================

#[test]
fn test_national_design_skips_unusable_targets() {
    init_logging();
    let data = microdata();
    let (_file, registry) = registry_from_csv();

    let national = DesignMatrixBuilder::new(&data, 2025)
        .build_national(&registry)
        .unwrap();

    // Rate has no strategy; 2030 value lies in the future
    assert_eq!(
        national.names,
        vec!["ons/uk_population", "ons/scotland_population"]
    );
    assert_eq!(national.targets.to_vec(), vec![6000.0, 1000.0]);
    assert_eq!(national.matrix.column(0).to_vec(), vec![2.0, 1.0, 1.0, 2.0]);
    assert_eq!(national.matrix.column(1).to_vec(), vec![0.0, 0.0, 1.0, 0.0]);
}

#[test]
fn test_year_tolerance_from_settings() {
    let data = microdata();
    let (_file, registry) = registry_from_csv();
    let settings = Settings::from_toml_str(
        r#"
        [targets]
        year = 2026
        year_tolerance = 1
        "#,
    )
    .unwrap();

    let builder = DesignMatrixBuilder::from_settings(&data, &settings.targets);
    assert_eq!(builder.year(), 2026);

    // 2022 local values are four years old: nothing survives
    let local = builder
        .build_local(&registry, GeographicLevel::Constituency, &areas())
        .unwrap();
    assert_eq!(local.target_count(), 0);
    assert_eq!(local.targets.dim(), (3, 0));

    // Only the 2025 Scottish total is within one year
    let national = builder.build_national(&registry).unwrap();
    assert_eq!(national.names, vec!["ons/scotland_population"]);
}

#[test]
fn test_registry_from_settings_reads_targets_file() {
    let data = microdata();
    let (file, _) = registry_from_csv();
    let settings = Settings::from_toml_str(&format!(
        r#"
        [targets]
        year = 2025
        targets_csv = "{}"
        "#,
        file.path().display()
    ))
    .unwrap();

    let registry = TargetRegistry::from_settings(&settings.targets);
    assert_eq!(registry.provider_count(), 1);
    let national = DesignMatrixBuilder::from_settings(&data, &settings.targets)
        .build_national(&registry)
        .unwrap();
    assert_eq!(national.target_count(), 2);
}

#[test]
fn test_static_provider_takes_precedence_over_csv() {
    let data = microdata();
    let (file, _) = registry_from_csv();
    let mut registry = TargetRegistry::new();
    registry
        .register(StaticTargetProvider::new(
            "override",
            vec![Target::new("ons/uk_population", "people", Unit::Count)
                .as_count()
                .with_value(2025, 7000.0)],
        ))
        .register(CsvTargetProvider::new(file.path()));

    let national = DesignMatrixBuilder::new(&data, 2025)
        .build_national(&registry)
        .unwrap();
    assert_eq!(national.targets[0], 7000.0);
}

// ============================================================================
// Adjustments
// ============================================================================

#[test]
fn test_consistency_then_boundary_mapping() {
    let data = microdata();
    let (_file, registry) = registry_from_csv();
    let settings = Settings::from_toml_str(
        r#"
        [targets]
        national_consistency_factor = 0.9
        "#,
    )
    .unwrap();

    let builder = DesignMatrixBuilder::from_settings(&data, &settings.targets);
    let mut local = builder
        .build_local(&registry, GeographicLevel::Constituency, &areas())
        .unwrap();

    let scale = builder
        .align_to_national(&mut local, &["age/0_18"], 120.0)
        .unwrap();
    assert_relative_eq!(scale, 1.8, epsilon = 1e-12);
    assert_relative_eq!(local.targets.sum(), 108.0, epsilon = 1e-9);

    // Merge the two English seats; keep Aberdeen North
    let mapping = array![[1.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
    let mapped = apply_area_mapping(
        local,
        &mapping,
        vec![
            Area::new("E14001001", "Merged"),
            Area::new("S14000001", "Aberdeen North"),
        ],
    )
    .unwrap();
    assert_relative_eq!(mapped.targets[[0, 0]], 54.0, epsilon = 1e-9);
    assert_relative_eq!(mapped.targets[[1, 0]], 54.0, epsilon = 1e-9);
    assert_eq!(mapped.matrix.dim(), (4, 1));

    // Explicit factor gives the same result as the settings-driven one
    let mut again = builder
        .build_local(&registry, GeographicLevel::Constituency, &areas())
        .unwrap();
    apply_national_consistency(&mut again, &["age/0_18"], 120.0, 0.9).unwrap();
    assert_relative_eq!(again.targets.sum(), 108.0, epsilon = 1e-9);
}

#[test]
fn test_local_design_at_country_level_is_rejected() {
    let data = microdata();
    let (_file, registry) = registry_from_csv();
    let err = DesignMatrixBuilder::new(&data, 2025)
        .build_local(&registry, GeographicLevel::Country, &areas())
        .unwrap_err();
    assert!(err.is_non_local_level());
}
