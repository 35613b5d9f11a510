//! Two-pass OSM PBF reader.
//!
//! Pass 1 collects drivable ways (as node refs) and traffic-control nodes.
//! Way nodes carry no coordinates of their own in PBF, so pass 2 resolves
//! the coordinates of every node a drivable way references.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use osmpbf::{Element, ElementReader};

use crate::OsmError;
use crate::tags::{is_drivable, is_signal};

/// Raw extract contents, before graph construction.
#[derive(Debug, Clone, Default)]
pub struct RawExtract {
    /// Drivable ways as node-id sequences.
    pub ways: Vec<Vec<i64>>,
    /// Traffic-control nodes as `(id, [lon, lat])`.
    pub signals: Vec<(i64, [f64; 2])>,
    /// Coordinates (`[lon, lat]`) of every node referenced by a drivable way.
    pub coords: HashMap<i64, [f64; 2]>,
}

#[derive(Default)]
struct FirstPass {
    ways: Vec<Vec<i64>>,
    signals: Vec<(i64, [f64; 2])>,
}

impl FirstPass {
    fn merge(mut self, mut other: Self) -> Self {
        self.ways.append(&mut other.ways);
        self.signals.append(&mut other.signals);
        self
    }
}

fn valid_lon_lat(lon: f64, lat: f64) -> Option<[f64; 2]> {
    let valid = lon.is_finite()
        && lat.is_finite()
        && (-180.0..=180.0).contains(&lon)
        && (-90.0..=90.0).contains(&lat);
    valid.then_some([lon, lat])
}

fn open(path: &Path) -> Result<ElementReader<std::io::BufReader<std::fs::File>>, OsmError> {
    ElementReader::from_path(path).map_err(|e| OsmError::Parse {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

/// Reads the drivable network and traffic controls from a PBF extract.
///
/// Uses `osmpbf`'s parallel reader for both passes.
///
/// # Errors
///
/// Returns [`OsmError::FileNotFound`] if the extract does not exist, or
/// [`OsmError::Parse`] if it cannot be decoded.
pub fn read_extract(path: &Path) -> Result<RawExtract, OsmError> {
    if !path.exists() {
        return Err(OsmError::FileNotFound(path.display().to_string()));
    }

    log::info!("Parsing OSM PBF (pass 1: ways and signals): {}", path.display());

    let first = open(path)?
        .par_map_reduce(
            |element| {
                let mut pass = FirstPass::default();
                match element {
                    Element::Way(way) => {
                        if is_drivable(way.tags()) {
                            pass.ways.push(way.refs().collect());
                        }
                    }
                    Element::Node(node) => {
                        if is_signal(node.tags())
                            && let Some(coord) = valid_lon_lat(node.lon(), node.lat())
                        {
                            pass.signals.push((node.id(), coord));
                        }
                    }
                    Element::DenseNode(node) => {
                        if is_signal(node.tags())
                            && let Some(coord) = valid_lon_lat(node.lon(), node.lat())
                        {
                            pass.signals.push((node.id(), coord));
                        }
                    }
                    Element::Relation(_) => {}
                }
                pass
            },
            FirstPass::default,
            FirstPass::merge,
        )
        .map_err(|e| OsmError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

    let needed: HashSet<i64> = first.ways.iter().flatten().copied().collect();
    log::info!(
        "Pass 1 found {} drivable ways referencing {} nodes, {} signal nodes",
        first.ways.len(),
        needed.len(),
        first.signals.len()
    );

    log::info!("Parsing OSM PBF (pass 2: node coordinates)");

    let coords = open(path)?
        .par_map_reduce(
            |element| {
                let (id, lon, lat) = match element {
                    Element::Node(node) => (node.id(), node.lon(), node.lat()),
                    Element::DenseNode(node) => (node.id(), node.lon(), node.lat()),
                    Element::Way(_) | Element::Relation(_) => return Vec::new(),
                };
                if !needed.contains(&id) {
                    return Vec::new();
                }
                valid_lon_lat(lon, lat).map_or_else(Vec::new, |coord| vec![(id, coord)])
            },
            Vec::new,
            |mut a, mut b| {
                a.append(&mut b);
                a
            },
        )
        .map_err(|e| OsmError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

    let coords: HashMap<i64, [f64; 2]> = coords.into_iter().collect();
    if coords.len() < needed.len() {
        log::warn!(
            "{} way nodes have no coordinates in the extract",
            needed.len() - coords.len()
        );
    }

    Ok(RawExtract {
        ways: first.ways,
        signals: first.signals,
        coords,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_coordinates() {
        assert_eq!(valid_lon_lat(-122.3, 47.6), Some([-122.3, 47.6]));
        assert_eq!(valid_lon_lat(200.0, 47.6), None);
        assert_eq!(valid_lon_lat(-122.3, f64::NAN), None);
    }

    #[test]
    fn missing_extract_is_reported() {
        let err = read_extract(Path::new("/nonexistent/city.osm.pbf")).unwrap_err();
        assert!(matches!(err, OsmError::FileNotFound(_)), "{err:?}");
    }

    #[test]
    fn first_pass_merge_keeps_both_sides() {
        let a = FirstPass {
            ways: vec![vec![1, 2]],
            signals: vec![(7, [0.0, 0.0])],
        };
        let b = FirstPass {
            ways: vec![vec![3, 4]],
            signals: vec![],
        };
        let merged = a.merge(b);
        assert_eq!(merged.ways, vec![vec![1, 2], vec![3, 4]]);
        assert_eq!(merged.signals.len(), 1);
    }
}
