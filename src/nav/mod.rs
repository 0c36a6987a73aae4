//! Spherical navigation: geometry on the surface of a planet.
//!
//! Everything a trajectory integrator needs to move points around on a
//! sphere: great-circle distance and bearing, displacement along a
//! bearing, conversion of local east/north offsets into new coordinates
//! (including pole crossings), and the conformal rotation applied to
//! wind vectors relocated near a pole.

mod sphere;

pub use sphere::{NavError, Quality, SphereNav, EARTH_RADIUS_KM};

/// Degrees-to-radians conversion factor.
pub(crate) const RCONV: f64 = std::f64::consts::PI / 180.0;
