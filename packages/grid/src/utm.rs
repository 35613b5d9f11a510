//! WGS84 Universal Transverse Mercator projection.
//!
//! Series expansions from Snyder, *Map Projections: A Working Manual*
//! (USGS PP 1395), pp. 61-64. Sub-millimetre round-trip error inside a
//! zone, which is far below the precision the density metrics need.

use geo::{Coord, MapCoords};

/// WGS84 semi-major axis (metres).
const A: f64 = 6_378_137.0;
/// WGS84 flattening.
const F: f64 = 1.0 / 298.257_223_563;
/// UTM scale factor on the central meridian.
const K0: f64 = 0.9996;
const FALSE_EASTING: f64 = 500_000.0;
const FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

/// First eccentricity squared.
const E2: f64 = F * (2.0 - F);
/// Second eccentricity squared.
const EP2: f64 = E2 / (1.0 - E2);

/// A UTM zone and hemisphere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UtmZone {
    /// Zone number, 1 to 60.
    pub number: u8,
    /// Northern hemisphere.
    pub north: bool,
}

impl std::fmt::Display for UtmZone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "UTM {}{} (EPSG:{})",
            self.number,
            if self.north { 'N' } else { 'S' },
            self.epsg()
        )
    }
}

impl UtmZone {
    /// Zone containing a longitude/latitude in degrees.
    #[must_use]
    pub fn for_lon_lat(lon: f64, lat: f64) -> Self {
        let raw = ((lon + 180.0) / 6.0).floor() + 1.0;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let number = raw.clamp(1.0, 60.0) as u8;
        Self {
            number,
            north: lat >= 0.0,
        }
    }

    /// EPSG code of the WGS84 / UTM zone CRS.
    #[must_use]
    pub fn epsg(&self) -> u32 {
        let base = if self.north { 32_600 } else { 32_700 };
        base + u32::from(self.number)
    }

    /// Central meridian in degrees.
    #[must_use]
    pub fn central_meridian(&self) -> f64 {
        f64::from(self.number).mul_add(6.0, -183.0)
    }

    /// Projects a lon/lat coordinate (degrees) to easting/northing (metres).
    #[must_use]
    pub fn forward(&self, coord: Coord<f64>) -> Coord<f64> {
        let phi = coord.y.to_radians();
        let lambda = (coord.x - self.central_meridian()).to_radians();

        let (sin_phi, cos_phi) = phi.sin_cos();
        let tan_phi = phi.tan();

        let n = A / (1.0 - E2 * sin_phi * sin_phi).sqrt();
        let t = tan_phi * tan_phi;
        let c = EP2 * cos_phi * cos_phi;
        let a = cos_phi * lambda;
        let m = meridian_arc(phi);

        let x = K0
            * n
            * (a + (1.0 - t + c) * a.powi(3) / 6.0
                + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * EP2) * a.powi(5) / 120.0)
            + FALSE_EASTING;

        let mut y = K0
            * (m + n
                * tan_phi
                * (a * a / 2.0
                    + (5.0 - t + 9.0 * c + 4.0 * c * c) * a.powi(4) / 24.0
                    + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * EP2) * a.powi(6) / 720.0));
        if !self.north {
            y += FALSE_NORTHING_SOUTH;
        }

        Coord { x, y }
    }

    /// Unprojects easting/northing (metres) back to lon/lat (degrees).
    #[must_use]
    pub fn inverse(&self, coord: Coord<f64>) -> Coord<f64> {
        let x = coord.x - FALSE_EASTING;
        let y = if self.north {
            coord.y
        } else {
            coord.y - FALSE_NORTHING_SOUTH
        };

        let e4 = E2 * E2;
        let e6 = e4 * E2;
        let mu = y / K0 / (A * (1.0 - E2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0));
        let e1 = (1.0 - (1.0 - E2).sqrt()) / (1.0 + (1.0 - E2).sqrt());

        let phi1 = mu
            + (3.0 * e1 / 2.0 - 27.0 * e1.powi(3) / 32.0) * (2.0 * mu).sin()
            + (21.0 * e1 * e1 / 16.0 - 55.0 * e1.powi(4) / 32.0) * (4.0 * mu).sin()
            + (151.0 * e1.powi(3) / 96.0) * (6.0 * mu).sin()
            + (1097.0 * e1.powi(4) / 512.0) * (8.0 * mu).sin();

        let (sin1, cos1) = phi1.sin_cos();
        let tan1 = phi1.tan();
        let n1 = A / (1.0 - E2 * sin1 * sin1).sqrt();
        let t1 = tan1 * tan1;
        let c1 = EP2 * cos1 * cos1;
        let r1 = A * (1.0 - E2) / (1.0 - E2 * sin1 * sin1).powf(1.5);
        let d = x / (n1 * K0);

        let phi = phi1
            - (n1 * tan1 / r1)
                * (d * d / 2.0
                    - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * EP2) * d.powi(4) / 24.0
                    + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1
                        - 252.0 * EP2
                        - 3.0 * c1 * c1)
                        * d.powi(6)
                        / 720.0);

        let lambda = (d - (1.0 + 2.0 * t1 + c1) * d.powi(3) / 6.0
            + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * EP2 + 24.0 * t1 * t1)
                * d.powi(5)
                / 120.0)
            / cos1;

        Coord {
            x: self.central_meridian() + lambda.to_degrees(),
            y: phi.to_degrees(),
        }
    }

    /// Projects any geometry from lon/lat degrees to zone metres.
    #[must_use]
    pub fn project<G>(&self, geometry: &G) -> G::Output
    where
        G: MapCoords<f64, f64>,
    {
        let zone = *self;
        geometry.map_coords(move |c| zone.forward(c))
    }

    /// Unprojects any geometry from zone metres to lon/lat degrees.
    #[must_use]
    pub fn unproject<G>(&self, geometry: &G) -> G::Output
    where
        G: MapCoords<f64, f64>,
    {
        let zone = *self;
        geometry.map_coords(move |c| zone.inverse(c))
    }
}

/// Distance along the meridian from the equator to latitude `phi` (radians).
fn meridian_arc(phi: f64) -> f64 {
    let e4 = E2 * E2;
    let e6 = e4 * E2;
    A * ((1.0 - E2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * phi
        - (3.0 * E2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * phi).sin()
        + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * phi).sin()
        - (35.0 * e6 / 3072.0) * (6.0 * phi).sin())
}
