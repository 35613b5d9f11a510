//! JSON cache of extracted features, one file per city.

use std::path::{Path, PathBuf};

use crate::{GeographicFeatures, OsmError};

/// Cache file for a city's extracted features.
#[must_use]
pub fn cache_path(cache_dir: &Path, slug: &str) -> PathBuf {
    cache_dir.join(format!("{slug}_features.json"))
}

/// Reads cached features, or `None` if no cache file exists.
///
/// # Errors
///
/// Returns [`OsmError::Io`] or [`OsmError::Cache`] if the file exists but
/// cannot be read or decoded.
pub fn read_cache(path: &Path) -> Result<Option<GeographicFeatures>, OsmError> {
    if !path.exists() {
        return Ok(None);
    }

    let bytes = std::fs::read(path).map_err(|source| OsmError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let features = serde_json::from_slice(&bytes).map_err(|source| OsmError::Cache {
        path: path.display().to_string(),
        source,
    })?;
    Ok(Some(features))
}

/// Writes features to the cache, creating the directory if needed.
///
/// # Errors
///
/// Returns [`OsmError::Io`] or [`OsmError::Cache`] on failure.
pub fn write_cache(path: &Path, features: &GeographicFeatures) -> Result<(), OsmError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| OsmError::Io {
            path: parent.display().to_string(),
            source,
        })?;
    }

    let json = serde_json::to_vec(features).map_err(|source| OsmError::Cache {
        path: path.display().to_string(),
        source,
    })?;
    std::fs::write(path, json).map_err(|source| OsmError::Io {
        path: path.display().to_string(),
        source,
    })
}
