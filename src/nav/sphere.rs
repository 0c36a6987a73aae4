//! Navigation on a spherical planet.

use thiserror::Error;

use super::RCONV;

/// Mean Earth radius in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.009;

/// Latitude threshold (degrees) poleward of which the plane-tangent
/// approximations break down and the exact spherical formulas are used.
const POLAR_LIMIT: f64 = 75.0;

/// Errors from navigation operations.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum NavError {
    /// A position is non-finite or has a latitude outside [-90, 90].
    #[error("bad location: ({lon}, {lat})")]
    BadLocation { lon: f64, lat: f64 },

    /// Applying a position increment produced an invalid location.
    #[error("bad position increment")]
    BadIncrement,
}

/// Which formulation `delta_xy` and `v_relocate` should use.
///
/// `Approximate` switches between plane-tangent formulas and series
/// expansions of the spherical triangle depending on latitude and
/// displacement size. `Exact` always solves the oblique spherical
/// triangle. `Crude` applies the plane-tangent formulas unconditionally.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Quality {
    #[default]
    Approximate,
    Exact,
    Crude,
}

// =============================================================================
// SphereNav
// =============================================================================

/// Navigation on a spherical planet.
///
/// Longitudes are wrapped into `[wrap_lon, wrap_lon + 360)`, with
/// `wrap_lon = -180` by default. Latitudes run from -90 to 90; crossing a
/// pole reflects the latitude and flips the longitude by 180 degrees.
///
/// # Example
///
/// ```
/// use windtraj::nav::SphereNav;
///
/// let nav = SphereNav::earth();
/// let d = nav.distance(0.0, 0.0, 90.0, 0.0);
/// assert!((d - nav.radius() * std::f64::consts::FRAC_PI_2).abs() < 1e-6);
/// ```
#[derive(Clone, Debug)]
pub struct SphereNav {
    r: f64,
    wrap_lon: f64,
    conformal: bool,
    quality: Quality,
    polar_lat: f64,
}

impl SphereNav {
    /// A sphere with the given radius in kilometers.
    pub fn new(radius_km: f64) -> Self {
        Self {
            r: radius_km,
            wrap_lon: -180.0,
            conformal: true,
            quality: Quality::default(),
            polar_lat: POLAR_LIMIT,
        }
    }

    /// A sphere with the mean Earth radius.
    pub fn earth() -> Self {
        Self::new(EARTH_RADIUS_KM)
    }

    /// The planet radius in kilometers.
    pub fn radius(&self) -> f64 {
        self.r
    }

    /// Lower edge of the canonical longitude range.
    pub fn wrapping_longitude(&self) -> f64 {
        self.wrap_lon
    }

    /// Set the lower edge of the canonical longitude range
    /// (use 0.0 for [0, 360), -180.0 for [-180, 180)).
    pub fn set_wrapping_longitude(&mut self, limit: f64) {
        self.wrap_lon = limit;
    }

    /// Whether conformal vector rotation is applied near the poles.
    pub fn conformal(&self) -> bool {
        self.conformal
    }

    /// Enable or disable conformal vector rotation.
    pub fn set_conformal(&mut self, on: bool) {
        self.conformal = on;
    }

    /// The default formulation used when an operation is not given one.
    pub fn quality(&self) -> Quality {
        self.quality
    }

    /// Set the default formulation.
    pub fn set_quality(&mut self, q: Quality) {
        self.quality = q;
    }

    /// Latitude poleward of which exact spherical formulas are required.
    pub fn polar_limit(&self) -> f64 {
        self.polar_lat
    }

    // =========================================================================
    // Longitude wrapping and position checks
    // =========================================================================

    /// Wrap a longitude into the canonical range.
    ///
    /// Non-finite values pass through untouched.
    pub fn wrap(&self, lon: f64) -> f64 {
        self.wrap_with(lon, self.wrap_lon)
    }

    /// Wrap a longitude into `[limit, limit + 360)`.
    pub fn wrap_with(&self, mut lon: f64, limit: f64) -> f64 {
        if lon.is_finite() {
            while lon < limit {
                lon += 360.0;
            }
            while lon >= limit + 360.0 {
                lon -= 360.0;
            }
        }
        lon
    }

    /// Wrap a slice of longitudes in place.
    pub fn wrap_slice(&self, lons: &mut [f64]) {
        for lon in lons.iter_mut() {
            *lon = self.wrap(*lon);
        }
    }

    /// Verify that a position is usable.
    pub fn check_pos(&self, lon: f64, lat: f64) -> Result<(), NavError> {
        if !lat.is_finite() || !lon.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(NavError::BadLocation { lon, lat });
        }
        Ok(())
    }

    // =========================================================================
    // Position increments
    // =========================================================================

    /// Apply longitude/latitude increments to a position in place.
    ///
    /// A latitude that overshoots a pole is reflected back and the
    /// longitude advanced by 180 degrees. Non-finite increments leave the
    /// position untouched. A position that is invalid after the latitude
    /// update is reported as [`NavError::BadIncrement`].
    pub fn delta_pos(
        &self,
        lon: &mut f64,
        lat: &mut f64,
        dlon: f64,
        dlat: f64,
    ) -> Result<(), NavError> {
        if !dlat.is_finite() || !dlon.is_finite() {
            return Ok(());
        }
        *lat += dlat;
        if *lat > 90.0 {
            *lat = 90.0 - (*lat - 90.0);
            *lon += 180.0;
        } else if *lat < -90.0 {
            *lat = -90.0 - (*lat + 90.0);
            *lon += 180.0;
        }
        self.check_pos(*lon, *lat)
            .map_err(|_| NavError::BadIncrement)?;
        *lon = self.wrap(*lon + dlon);
        Ok(())
    }

    /// Batched form of [`SphereNav::delta_pos`].
    pub fn delta_pos_slice(
        &self,
        lons: &mut [f64],
        lats: &mut [f64],
        dlons: &[f64],
        dlats: &[f64],
    ) -> Result<(), NavError> {
        for i in 0..lons.len() {
            self.delta_pos(&mut lons[i], &mut lats[i], dlons[i], dlats[i])?;
        }
        Ok(())
    }

    // =========================================================================
    // Local-offset displacement (delta_xy)
    // =========================================================================

    /// Move a position by local east/north offsets in kilometers.
    ///
    /// `quality` of `None` defers to the object's default formulation.
    pub fn delta_xy(
        &self,
        lon: &mut f64,
        lat: &mut f64,
        dx: f64,
        dy: f64,
        quality: Option<Quality>,
    ) -> Result<(), NavError> {
        let mut lons = [*lon];
        let mut lats = [*lat];
        self.delta_xy_slice(&mut lons, &mut lats, &[dx], &[dy], quality)?;
        *lon = lons[0];
        *lat = lats[0];
        Ok(())
    }

    /// Batched form of [`SphereNav::delta_xy`].
    pub fn delta_xy_slice(
        &self,
        lons: &mut [f64],
        lats: &mut [f64],
        dxs: &[f64],
        dys: &[f64],
        quality: Option<Quality>,
    ) -> Result<(), NavError> {
        match quality.unwrap_or(self.quality) {
            Quality::Approximate => self.delta_xy_approx(lons, lats, dxs, dys),
            Quality::Exact => self.delta_xy_exact(lons, lats, dxs, dys),
            Quality::Crude => self.delta_xy_crude(lons, lats, dxs, dys),
        }
    }

    /// Oblique-spherical-triangle solution, valid everywhere.
    ///
    /// One vertex sits at the north pole, one at the start point, one at
    /// the end point: side c is the start colatitude, side a the angular
    /// distance traveled, side b the end colatitude, and the angle at the
    /// pole is the longitude change.
    fn delta_xy_exact(
        &self,
        lons: &mut [f64],
        lats: &mut [f64],
        dxs: &[f64],
        dys: &[f64],
    ) -> Result<(), NavError> {
        for i in 0..lons.len() {
            let (dx, dy) = (dxs[i], dys[i]);
            if !dx.is_finite() || !dy.is_finite() || !lons[i].is_finite() || !lats[i].is_finite()
            {
                continue;
            }
            let mut lon = lons[i];
            let mut lat = lats[i];
            let ds = (dx * dx + dy * dy).sqrt();

            if ds > 0.0 {
                if lat > 90.0 {
                    return Err(NavError::BadLocation { lon, lat });
                } else if lat == 90.0 {
                    // starting exactly at the north pole
                    lat -= ds / self.r / RCONV;
                    lon += -dx.atan2(dy) / RCONV + 180.0;
                } else if lat == -90.0 {
                    lat += ds / self.r / RCONV;
                    lon += dx.atan2(dy) / RCONV + 180.0;
                } else if lat < -90.0 {
                    return Err(NavError::BadLocation { lon, lat });
                } else {
                    let sin_bb = dx / ds;
                    let cos_bb = dy / ds;

                    let c = (90.0 - lat) * RCONV;
                    let (sin_c, cos_c) = c.sin_cos();

                    let a = ds / self.r;
                    let (sin_a, cos_a) = a.sin_cos();

                    let cos_b = cos_c * cos_a + sin_c * sin_a * cos_bb;
                    let mut b = cos_b.acos();
                    let sin_b = b.sin();

                    let dlon = if sin_b != 0.0 {
                        let sin_aa = sin_a / sin_b * sin_bb;
                        let cos_aa = (cos_a - cos_b * cos_c) / sin_b / sin_c;
                        sin_aa.atan2(cos_aa) / RCONV
                    } else {
                        // landed exactly on a pole; nudge past it so a
                        // repeated path does not keep hitting the pole
                        if b == 0.0 {
                            b = 1.0e-9;
                        } else {
                            b -= 1.0e-9;
                        }
                        let sin_b = b.sin();
                        let cos_b = b.cos();
                        let sin_aa = sin_a / sin_b * sin_bb;
                        let cos_aa = (cos_a - cos_b * cos_c) / sin_b / sin_c;
                        sin_aa.atan2(cos_aa) / RCONV + 180.0
                    };

                    lat = 90.0 - b / RCONV;
                    lon += dlon;
                }
            }

            self.check_pos(lon, lat)?;
            lons[i] = self.wrap(lon);
            lats[i] = lat;
        }
        Ok(())
    }

    /// Latitude- and size-adaptive approximation.
    ///
    /// Small displacements equatorward of the polar limit use the
    /// plane-tangent formulas; anything else falls back on series
    /// expansions of the spherical triangle good to about 180 degrees.
    fn delta_xy_approx(
        &self,
        lons: &mut [f64],
        lats: &mut [f64],
        dxs: &[f64],
        dys: &[f64],
    ) -> Result<(), NavError> {
        for i in 0..lons.len() {
            let (dx, dy) = (dxs[i], dys[i]);
            if !dx.is_finite() || !dy.is_finite() || !lons[i].is_finite() || !lats[i].is_finite()
            {
                continue;
            }
            let lon = lons[i];
            let lat = lats[i];
            let ds = (dx * dx + dy * dy).sqrt();

            let (mut new_lon, mut new_lat) = (lon, lat);

            if ds > 0.0 {
                if lat > 90.0 || lat < -90.0 {
                    return Err(NavError::BadLocation { lon, lat });
                } else if lat == 90.0 {
                    new_lat = lat - ds / self.r / RCONV;
                    new_lon = lon - dx.atan2(dy) / RCONV + 180.0;
                } else if lat == -90.0 {
                    new_lat = lat + ds / self.r / RCONV;
                    new_lon = lon + dx.atan2(dy) / RCONV + 180.0;
                } else {
                    let a = ds / self.r;
                    let a2 = a * a;

                    if a < 0.01 {
                        if lat.abs() < self.polar_lat {
                            new_lat = lat + dy / self.r / RCONV;
                            new_lon = lon + dx / self.r / (lat * RCONV).cos() / RCONV;
                        } else {
                            // too close to a pole for the flat formulas
                            let sin_a = a;
                            let sin_bb = dx / ds;
                            let cos_bb = dy / ds;

                            let c = (90.0 - lat) * RCONV;
                            let c2 = c * c;

                            let (b, dlon) = if lat >= self.polar_lat {
                                let b2 = c2 + a2 - 2.0 * c * a * cos_bb;
                                let b = b2.sqrt();
                                if b > 0.0 {
                                    let sin_b = b;
                                    let sin_aa = sin_a / sin_b * sin_bb;
                                    let cos_aa = (b2 + c2 - a2) / 2.0 / b / c;
                                    (b, sin_aa.atan2(cos_aa) / RCONV)
                                } else {
                                    // hit the north pole exactly
                                    let b = 1.0e-9;
                                    let sin_b = b;
                                    let sin_aa = sin_a / sin_b * sin_bb;
                                    let cos_aa = (b * b + c2 - a2) / 2.0 / b / c;
                                    (b, sin_aa.atan2(cos_aa) / RCONV + 180.0)
                                }
                            } else {
                                // near the south pole
                                let eta = std::f64::consts::PI - c;
                                let zeta =
                                    (eta * eta + a2 + 2.0 * eta * a * cos_bb).sqrt();
                                let b = std::f64::consts::PI - zeta;
                                let sin_aa = a / eta * sin_bb;
                                let cos_aa =
                                    (eta * eta + zeta * zeta - a2) / 2.0 / eta / zeta;
                                (b, sin_aa.atan2(cos_aa) / RCONV)
                            };

                            new_lat = 90.0 - b / RCONV;
                            new_lon = lon + dlon;
                        }
                    } else {
                        // displacement is NOT small
                        let cos_a = series_cos(a);
                        let sin_a = series_sin(a);

                        let sin_bb = dx / ds;
                        let cos_bb = dy / ds;

                        let c = (90.0 - lat) * RCONV;
                        let cos_c = series_cos(c);
                        let sin_c = series_sin(c);

                        let cos_b = cos_c * cos_a + sin_c * sin_a * cos_bb;
                        let mut b = cos_b.acos();
                        let sin_b = b.sin();

                        let dlon = if sin_b != 0.0 {
                            let sin_aa = sin_a / sin_b * sin_bb;
                            let cos_aa = (cos_a - cos_b * cos_c) / sin_b / sin_c;
                            sin_aa.atan2(cos_aa) / RCONV
                        } else {
                            if b == 0.0 {
                                b = 1.0e-9;
                            } else {
                                b -= 1.0e-9;
                            }
                            let sin_b = b.sin();
                            let cos_b = b.cos();
                            let sin_aa = sin_a / sin_b * sin_bb;
                            let cos_aa = (cos_a - cos_b * cos_c) / sin_b / sin_c;
                            sin_aa.atan2(cos_aa) / RCONV + 180.0
                        };

                        new_lat = 90.0 - b / RCONV;
                        new_lon = lon + dlon;
                    }
                }
            }

            self.check_pos(new_lon, new_lat)?;
            lons[i] = self.wrap(new_lon);
            lats[i] = new_lat;
        }
        Ok(())
    }

    /// Plane-tangent formulas applied unconditionally.
    fn delta_xy_crude(
        &self,
        lons: &mut [f64],
        lats: &mut [f64],
        dxs: &[f64],
        dys: &[f64],
    ) -> Result<(), NavError> {
        for i in 0..lons.len() {
            let (dx, dy) = (dxs[i], dys[i]);
            if !dx.is_finite() || !dy.is_finite() || !lons[i].is_finite() || !lats[i].is_finite()
            {
                continue;
            }
            let mut lon = lons[i];
            let mut lat = lats[i];
            let ds = (dx * dx + dy * dy).sqrt();

            if ds > 0.0 {
                if lat > 90.0 || lat < -90.0 {
                    return Err(NavError::BadLocation { lon, lat });
                } else if lat == 90.0 {
                    lat -= ds / self.r / RCONV;
                    lon += -dx.atan2(dy) + 180.0;
                } else if lat == -90.0 {
                    lat += ds / self.r / RCONV;
                    lon += dx.atan2(dy);
                } else {
                    let dlat = dy / self.r / RCONV;

                    // midpoint latitude for the longitude conversion
                    let mut midlat = lat + dlat / 2.0;
                    if midlat > 90.0 {
                        midlat = 90.0 - (midlat - 90.0);
                    } else if midlat < -90.0 {
                        midlat = -90.0 - (midlat + 90.0);
                    }

                    let dlon = dx / self.r / (midlat * RCONV).cos() / RCONV;

                    lat += dlat;
                    if lat > 90.0 {
                        lat = 90.0 - (lat - 90.0);
                        lon += 180.0;
                    } else if lat < -90.0 {
                        lat = -90.0 - (lat + 90.0);
                        lon += 180.0;
                    }
                    lon += dlon;
                }
            }

            self.check_pos(lon, lat)?;
            lons[i] = self.wrap(lon);
            lats[i] = lat;
        }
        Ok(())
    }

    // =========================================================================
    // Distance, bearing, displacement
    // =========================================================================

    /// Great-circle distance between two points, in kilometers.
    ///
    /// Uses the Vincenty atan2 formulation, which stays accurate for both
    /// very small and near-antipodal separations.
    pub fn distance(&self, lon1: f64, lat1: f64, lon2: f64, lat2: f64) -> f64 {
        let (sdlon, cdlon) = ((lon2 - lon1) * RCONV).sin_cos();
        let (slat1, clat1) = (lat1 * RCONV).sin_cos();
        let (slat2, clat2) = (lat2 * RCONV).sin_cos();

        let a = ((clat2 * sdlon).powi(2)
            + (clat1 * slat2 - slat1 * clat2 * cdlon).powi(2))
        .sqrt();
        let b = slat1 * slat2 + clat1 * clat2 * cdlon;

        a.atan2(b) * self.r
    }

    /// Batched form of [`SphereNav::distance`].
    pub fn distance_slice(
        &self,
        lon1: &[f64],
        lat1: &[f64],
        lon2: &[f64],
        lat2: &[f64],
        d: &mut [f64],
    ) {
        for i in 0..d.len() {
            d[i] = self.distance(lon1[i], lat1[i], lon2[i], lat2[i]);
        }
    }

    /// Bearing from the first point to the second, degrees clockwise
    /// from north.
    ///
    /// From the north pole every direction is south: the bearing is 180.
    /// Between antipodal points every great circle works; 90 is returned
    /// by convention.
    pub fn bearing(&self, lon1: f64, lat1: f64, lon2: f64, lat2: f64) -> f64 {
        let (slat1, clat1) = (lat1 * RCONV).sin_cos();
        let (slat2, clat2) = (lat2 * RCONV).sin_cos();
        let (slons, clons) = ((lon2 - lon1) * RCONV).sin_cos();

        let result = if clat2.abs() > 1e-15 {
            if clons < -1.0 || lat1 != -lat2 {
                slons.atan2(clat1 * slat2 / clat2 - slat1 * clons)
            } else {
                // antipode: any bearing reaches it along a great circle
                std::f64::consts::FRAC_PI_2
            }
        } else if slat2 > 0.0 {
            std::f64::consts::PI
        } else {
            -std::f64::consts::PI
        };

        result / RCONV
    }

    /// Destination point a given distance (km) along a given bearing
    /// (degrees clockwise from north), via the spherical law of cosines.
    pub fn displace(&self, clon: f64, clat: f64, d: f64, bearing: f64) -> (f64, f64) {
        if d <= 0.0 {
            return (clon, clat);
        }
        if clat >= 90.0 {
            let lat = clat - d / self.r / RCONV;
            let lon = self.wrap(clon - bearing + 180.0);
            return (lon, lat);
        }
        if clat <= -90.0 {
            let lat = clat + d / self.r / RCONV;
            let lon = self.wrap(clon + bearing);
            return (lon, lat);
        }

        let mut ang = bearing;
        while ang < 0.0 {
            ang += 360.0;
        }
        while ang >= 360.0 {
            ang -= 360.0;
        }
        let (sinrb, cosrb) = (ang * RCONV).sin_cos();

        let dr = d / self.r;
        let (sindr, cosdr) = dr.sin_cos();

        let colat = (90.0 - clat) * RCONV;
        let (sincolat, coscolat) = colat.sin_cos();

        let cosb = coscolat * cosdr + sincolat * sindr * cosrb;
        let b = cosb.acos();
        let sinb = b.sin();

        let lat = 90.0 - b / RCONV;

        let sina = sindr / sinb * sinrb;
        let cosa = (cosdr - cosb * coscolat) / sinb / sincolat;
        let a = sina.atan2(cosa);

        (self.wrap(a / RCONV + clon), lat)
    }

    // =========================================================================
    // Conformal vector relocation
    // =========================================================================

    /// Rotate an (east, north) vector moved from one point to another
    /// so that its physical orientation is preserved near a pole.
    ///
    /// East/north basis vectors are not parallel along a path that skirts
    /// a pole, so a vector sampled at one longitude and applied at another
    /// must be rotated by the longitude difference (sign flipped in the
    /// southern hemisphere). Applied only when the conformal flag is set
    /// and either latitude is poleward of the polar limit.
    pub fn v_relocate(
        &self,
        new_lon: f64,
        new_lat: f64,
        lon0: f64,
        lat0: f64,
        u: &mut f64,
        v: &mut f64,
        quality: Option<Quality>,
    ) {
        let mut us = [*u];
        let mut vs = [*v];
        self.v_relocate_slice(
            &[new_lon],
            &[new_lat],
            &[lon0],
            &[lat0],
            &mut us,
            &mut vs,
            quality,
        );
        *u = us[0];
        *v = vs[0];
    }

    /// Batched form of [`SphereNav::v_relocate`].
    #[allow(clippy::too_many_arguments)]
    pub fn v_relocate_slice(
        &self,
        new_lons: &[f64],
        new_lats: &[f64],
        lon0s: &[f64],
        lat0s: &[f64],
        us: &mut [f64],
        vs: &mut [f64],
        quality: Option<Quality>,
    ) {
        if !self.conformal {
            return;
        }
        let quality = quality.unwrap_or(self.quality);

        for i in 0..us.len() {
            let (lat0, new_lat) = (lat0s[i], new_lats[i]);
            if !(lat0 >= self.polar_lat
                || lat0 <= -self.polar_lat
                || new_lat >= self.polar_lat
                || new_lat <= -self.polar_lat)
            {
                continue;
            }
            if !new_lons[i].is_finite()
                || !lon0s[i].is_finite()
                || !us[i].is_finite()
                || !vs[i].is_finite()
            {
                continue;
            }

            let mut dlon = match quality {
                Quality::Exact => (new_lons[i] - lon0s[i]) * RCONV,
                _ => self.wrap_with(new_lons[i] - lon0s[i], -180.0) * RCONV,
            };
            if lat0 < 0.0 {
                dlon = -dlon;
            }

            let (cos_dlon, sin_dlon) = match quality {
                Quality::Exact => (dlon.cos(), dlon.sin()),
                _ => {
                    if dlon.abs() <= 0.001 {
                        (1.0 - dlon * dlon / 2.0, dlon)
                    } else {
                        (series_cos(dlon), series_sin(dlon))
                    }
                }
            };

            let tmp_u = us[i] * cos_dlon - vs[i] * sin_dlon;
            let tmp_v = us[i] * sin_dlon + vs[i] * cos_dlon;
            us[i] = tmp_u;
            vs[i] = tmp_v;
        }
    }
}

impl Default for SphereNav {
    fn default() -> Self {
        Self::earth()
    }
}

/// Taylor series for cosine, good to about 180 degrees.
fn series_cos(x: f64) -> f64 {
    let x2 = x * x;
    1.0 + x2
        * (-1.0 / 2.0
            + x2 * (1.0 / 24.0
                + x2 * (-1.0 / 720.0 + x2 * (1.0 / 40320.0 - 1.0 / 3628800.0 * x2))))
}

/// Taylor series for sine, good to about 180 degrees.
fn series_sin(x: f64) -> f64 {
    let x2 = x * x;
    x * (1.0 + x2 * (-1.0 / 6.0 + x2 * (1.0 / 120.0 + x2 * (-1.0 / 5040.0 + x2 / 362880.0))))
}
