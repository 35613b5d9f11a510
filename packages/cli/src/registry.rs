//! Compile-time registry of supported cities.
//!
//! Each entry is a `(slug, toml_content)` pair embedded via `include_str!`.
//! Adding a city requires creating a TOML file in `cities/` and adding a
//! corresponding entry here.

use urbanicity_models::{CityConfig, ConfigError};

/// Number of registered cities. Enforced by a test.
#[cfg(test)]
const EXPECTED_CITY_COUNT: usize = 5;

/// Embedded TOML city definitions, in processing order.
const CITY_TOMLS: &[(&str, &str)] = &[
    ("seattle", include_str!("../cities/seattle.toml")),
    ("los_angeles", include_str!("../cities/los_angeles.toml")),
    ("austin", include_str!("../cities/austin.toml")),
    ("chicago", include_str!("../cities/chicago.toml")),
    ("boston", include_str!("../cities/boston.toml")),
];

/// Returns all registered cities.
///
/// # Panics
///
/// Panics if any embedded TOML file fails to parse. Since these are
/// compile-time constants, parse failures indicate a development error
/// and are caught by the tests below.
#[must_use]
pub fn all_cities() -> Vec<CityConfig> {
    CITY_TOMLS
        .iter()
        .map(|(slug, toml_str)| {
            toml::de::from_str(toml_str)
                .unwrap_or_else(|e| panic!("Failed to parse city definition '{slug}': {e}"))
        })
        .collect()
}

/// Resolves a `--cities` argument: `all`, or a comma-separated list of
/// slugs. Duplicates are ignored; order follows the argument.
///
/// # Errors
///
/// Returns [`ConfigError::UnknownCity`] for the first slug not in the
/// registry.
pub fn select_cities(selection: &str) -> Result<Vec<CityConfig>, ConfigError> {
    let cities = all_cities();
    if selection.trim().eq_ignore_ascii_case("all") {
        return Ok(cities);
    }

    let mut selected: Vec<CityConfig> = Vec::new();
    for slug in selection.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let Some(city) = cities.iter().find(|c| c.slug == slug) else {
            return Err(ConfigError::UnknownCity {
                slug: slug.to_string(),
                valid: cities
                    .iter()
                    .map(|c| c.slug.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            });
        };
        if !selected.iter().any(|c| c.slug == city.slug) {
            selected.push(city.clone());
        }
    }
    Ok(selected)
}
