//! Four-stage Runge-Kutta integration of parcel trajectories.

use std::cell::RefCell;

use thiserror::Error;

use crate::met::{MetError, MetSource};
use crate::nav::{NavError, SphereNav, RCONV};

/// Latitude threshold (degrees) poleward of which stage winds are
/// rotated into the frame of the stage's sample point.
const NEARPOLE: f64 = 88.0;

/// Planetary radius used for the wind-to-angular-rate conversion, km.
const R: f64 = 6371.0;

/// Errors from a single integration step.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StepError {
    #[error(transparent)]
    Met(#[from] MetError),
    #[error(transparent)]
    Nav(#[from] NavError),
}

// =============================================================================
// Integrator trait
// =============================================================================

/// Advances parcel state through a wind field.
pub trait Integrator: Send {
    /// Short name for diagnostics.
    fn name(&self) -> &'static str;

    /// Advance one parcel state by `dt` days.
    #[allow(clippy::too_many_arguments)]
    fn go(
        &self,
        lon: &mut f64,
        lat: &mut f64,
        z: &mut f64,
        t: &mut f64,
        met: &dyn MetSource,
        nav: &SphereNav,
        dt: f64,
    ) -> Result<(), StepError>;

    /// Advance a batch of parcel states by `dt` days.
    ///
    /// Only entries with `flags[i] == 0` participate. An entry whose
    /// intermediate values go non-finite at any stage keeps its old
    /// position and has its flag set to 1; the rest of the batch is
    /// unaffected. One wind-field query is issued per stage for the
    /// whole batch.
    #[allow(clippy::too_many_arguments)]
    fn go_batch(
        &self,
        lons: &mut [f64],
        lats: &mut [f64],
        zs: &mut [f64],
        flags: &mut [i32],
        t: &mut f64,
        met: &dyn MetSource,
        nav: &SphereNav,
        dt: f64,
    ) -> Result<(), StepError>;
}

// =============================================================================
// Rk4
// =============================================================================

/// Scratch buffers reused across batched steps.
#[derive(Default)]
struct Scratch {
    iused: Vec<usize>,
    kus: Vec<f64>,
    kvs: Vec<f64>,
    kws: Vec<f64>,
    dlons: [Vec<f64>; 3],
    dlats: [Vec<f64>; 3],
    dzs: [Vec<f64>; 3],
    tmplons: Vec<f64>,
    tmplats: Vec<f64>,
    tmpzs: Vec<f64>,
}

impl Scratch {
    fn reserve(&mut self, n: usize) {
        self.iused.clear();
        self.iused.reserve(n);
        for buf in [&mut self.kus, &mut self.kvs, &mut self.kws]
            .into_iter()
            .chain(self.dlons.iter_mut())
            .chain(self.dlats.iter_mut())
            .chain(self.dzs.iter_mut())
            .chain([&mut self.tmplons, &mut self.tmplats, &mut self.tmpzs])
        {
            buf.clear();
            buf.resize(n, 0.0);
        }
    }
}

/// The classic four-stage Runge-Kutta scheme on the sphere.
///
/// Winds are sampled at the step start, two midpoints, and the endpoint;
/// the final increments are the (1, 2, 2, 1)/6 weighted average of the
/// four stage increments. Near a pole (poleward of 88 degrees), when
/// conformal mode is on, each stage's wind vector is rotated by the
/// longitude difference between the sample point and the step's starting
/// point before use.
///
/// Time steps are in days; winds in m/s; the horizontal increments are
/// computed in degrees on a sphere of radius 6371 km.
pub struct Rk4 {
    conformal: bool,
    scratch: RefCell<Scratch>,
}

impl Rk4 {
    pub fn new() -> Self {
        Self {
            conformal: false,
            scratch: RefCell::new(Scratch::default()),
        }
    }

    /// Whether near-pole wind rotation is applied.
    pub fn conformal(&self) -> bool {
        self.conformal
    }

    /// Enable or disable near-pole wind rotation.
    pub fn set_conformal(&mut self, on: bool) {
        self.conformal = on;
    }

    /// Rotate a stage wind vector into the frame of the sample point.
    #[inline]
    fn rotate_stage_wind(
        &self,
        lon0: f64,
        lat0: f64,
        tmplon: f64,
        tmplat: f64,
        ku: &mut f64,
        kv: &mut f64,
    ) {
        if !self.conformal {
            return;
        }
        if lat0 >= NEARPOLE || lat0 <= -NEARPOLE || tmplat >= NEARPOLE || tmplat <= -NEARPOLE {
            let (sdlon, cdlon) = ((tmplon - lon0) * RCONV).sin_cos();
            let up = *ku * cdlon + *kv * sdlon;
            let vp = -*ku * sdlon + *kv * cdlon;
            *ku = up;
            *kv = vp;
        }
    }

    /// Latitude increment (degrees) for a meridional wind in km/s.
    #[inline]
    fn dlat_of(dt_s: f64, kv: f64) -> f64 {
        dt_s * kv / R / RCONV
    }

    /// Longitude increment (degrees) for a zonal wind in km/s at the
    /// provisional latitude, zero at an exact pole.
    #[inline]
    fn dlon_of(dt_s: f64, ku: f64, tmplat: f64) -> f64 {
        if tmplat.abs() != 90.0 {
            dt_s * ku / R / RCONV / (tmplat * RCONV).cos()
        } else {
            0.0
        }
    }
}

impl Default for Rk4 {
    fn default() -> Self {
        Self::new()
    }
}

impl Integrator for Rk4 {
    fn name(&self) -> &'static str {
        "RK4"
    }

    fn go(
        &self,
        lon: &mut f64,
        lat: &mut f64,
        z: &mut f64,
        t: &mut f64,
        met: &dyn MetSource,
        nav: &SphereNav,
        dt: f64,
    ) -> Result<(), StepError> {
        let debug = met.debug();
        let dt_s = dt * 86400.0;
        let lat0 = *lat;
        let lon0 = *lon;

        // stage 1: winds at the starting point
        let (u1, v1, w1) = met.get_uvw(*t, *lon, *lat, *z)?;
        if debug >= 100 {
            eprintln!("    rk4 @ ({}, {}, {}, {}): u1={}, v1={}", t, lon, lat, z, u1, v1);
        }
        let k1u = u1 / 1000.0;
        let k1v = v1 / 1000.0;

        let dlat1 = Self::dlat_of(dt_s, k1v);
        let mut tmplon = *lon;
        let mut tmplat = *lat;
        nav.delta_pos(&mut tmplon, &mut tmplat, 0.0, dlat1 / 2.0)?;
        let dlon1 = Self::dlon_of(dt_s, k1u, tmplat);
        let dz1 = dt_s * w1;

        tmplon = *lon;
        tmplat = *lat;
        nav.delta_pos(&mut tmplon, &mut tmplat, dlon1 / 2.0, dlat1 / 2.0)?;

        // stage 2: winds at the first midpoint
        let (u2, v2, w2) = met.get_uvw(*t + dt / 2.0, tmplon, tmplat, *z + dz1 / 2.0)?;
        let mut k2u = u2 / 1000.0;
        let mut k2v = v2 / 1000.0;
        self.rotate_stage_wind(lon0, lat0, tmplon, tmplat, &mut k2u, &mut k2v);

        let dlat2 = Self::dlat_of(dt_s, k2v);
        tmplon = *lon;
        tmplat = *lat;
        nav.delta_pos(&mut tmplon, &mut tmplat, 0.0, dlat2 / 2.0)?;
        let dlon2 = Self::dlon_of(dt_s, k2u, tmplat);
        let dz2 = dt_s * w2;

        tmplon = *lon;
        tmplat = *lat;
        nav.delta_pos(&mut tmplon, &mut tmplat, dlon2 / 2.0, dlat2 / 2.0)?;

        // stage 3: winds at the second midpoint
        let (u3, v3, w3) = met.get_uvw(*t + dt / 2.0, tmplon, tmplat, *z + dz2 / 2.0)?;
        let mut k3u = u3 / 1000.0;
        let mut k3v = v3 / 1000.0;
        self.rotate_stage_wind(lon0, lat0, tmplon, tmplat, &mut k3u, &mut k3v);

        let dlat3 = Self::dlat_of(dt_s, k3v);
        tmplon = *lon;
        tmplat = *lat;
        nav.delta_pos(&mut tmplon, &mut tmplat, 0.0, dlat3 / 2.0)?;
        let dlon3 = Self::dlon_of(dt_s, k3u, tmplat);
        let dz3 = dt_s * w3;

        tmplon = *lon;
        tmplat = *lat;
        nav.delta_pos(&mut tmplon, &mut tmplat, dlon3, dlat3)?;

        // stage 4: winds at the endpoint
        let (u4, v4, w4) = met.get_uvw(*t + dt, tmplon, tmplat, *z + dz3)?;
        let mut k4u = u4 / 1000.0;
        let mut k4v = v4 / 1000.0;
        self.rotate_stage_wind(lon0, lat0, tmplon, tmplat, &mut k4u, &mut k4v);

        let dlat4 = Self::dlat_of(dt_s, k4v);
        tmplon = *lon;
        tmplat = *lat;
        nav.delta_pos(&mut tmplon, &mut tmplat, 0.0, dlat4 / 2.0)?;
        let dlon4 = Self::dlon_of(dt_s, k4u, tmplat);
        let dz4 = dt_s * w4;

        // weighted average of the stage increments
        let dx = (dlon1 + 2.0 * dlon2 + 2.0 * dlon3 + dlon4) / 6.0;
        let dy = (dlat1 + 2.0 * dlat2 + 2.0 * dlat3 + dlat4) / 6.0;
        let dz = (dz1 + 2.0 * dz2 + 2.0 * dz3 + dz4) / 6.0;

        nav.delta_pos(lon, lat, dx, dy)?;
        if debug >= 100 {
            eprintln!("    rk4: dx={}, dy={}, lon={}, lat={}", dx, dy, lon, lat);
        }
        *z += dz;
        *t += dt;

        Ok(())
    }

    fn go_batch(
        &self,
        lons: &mut [f64],
        lats: &mut [f64],
        zs: &mut [f64],
        flags: &mut [i32],
        t: &mut f64,
        met: &dyn MetSource,
        nav: &SphereNav,
        dt: f64,
    ) -> Result<(), StepError> {
        let n = lons.len();
        let dt_s = dt * 86400.0;

        let mut scratch = self.scratch.borrow_mut();
        scratch.reserve(n);
        let s = &mut *scratch;

        for (i, &flag) in flags.iter().enumerate().take(n) {
            if flag == 0 {
                s.iused.push(i);
            }
        }
        let nuse = s.iused.len();
        if nuse == 0 {
            *t += dt;
            return Ok(());
        }

        // stage 1 samples at the current positions of the active parcels
        for (j, &i) in s.iused.iter().enumerate() {
            s.tmplons[j] = lons[i];
            s.tmplats[j] = lats[i];
            s.tmpzs[j] = zs[i];
        }
        met.get_uvw_slice(
            *t,
            &s.tmplons[..nuse],
            &s.tmplats[..nuse],
            &s.tmpzs[..nuse],
            &mut s.kus[..nuse],
            &mut s.kvs[..nuse],
            &mut s.kws[..nuse],
        );

        for j in 0..nuse {
            let i = s.iused[j];
            if s.kus[j].is_finite() && s.kvs[j].is_finite() && s.kws[j].is_finite() {
                let k1u = s.kus[j] / 1000.0;
                let k1v = s.kvs[j] / 1000.0;

                let dlat1 = Self::dlat_of(dt_s, k1v);
                let mut tmplon = lons[i];
                let mut tmplat = lats[i];
                let ok = nav
                    .delta_pos(&mut tmplon, &mut tmplat, 0.0, dlat1 / 2.0)
                    .is_ok();
                let dlon1 = Self::dlon_of(dt_s, k1u, tmplat);
                let dz1 = dt_s * s.kws[j];

                tmplon = lons[i];
                tmplat = lats[i];
                let ok = ok
                    && nav
                        .delta_pos(&mut tmplon, &mut tmplat, dlon1 / 2.0, dlat1 / 2.0)
                        .is_ok();

                if ok {
                    s.dlons[0][j] = dlon1;
                    s.dlats[0][j] = dlat1;
                    s.dzs[0][j] = dz1;
                    s.tmplons[j] = tmplon;
                    s.tmplats[j] = tmplat;
                    s.tmpzs[j] = zs[i] + dz1 / 2.0;
                    continue;
                }
            }
            s.dlons[0][j] = f64::NAN;
            s.dlats[0][j] = f64::NAN;
            s.dzs[0][j] = f64::NAN;
            s.tmplons[j] = lons[i];
            s.tmplats[j] = lats[i];
            s.tmpzs[j] = zs[i];
        }

        // stages 2 and 3 sample at midpoints, stage 4 at the endpoint
        for stage in 1..=2 {
            met.get_uvw_slice(
                *t + dt / 2.0,
                &s.tmplons[..nuse],
                &s.tmplats[..nuse],
                &s.tmpzs[..nuse],
                &mut s.kus[..nuse],
                &mut s.kvs[..nuse],
                &mut s.kws[..nuse],
            );

            for j in 0..nuse {
                let i = s.iused[j];
                let prior_ok = (0..stage).all(|k| {
                    s.dlons[k][j].is_finite()
                        && s.dlats[k][j].is_finite()
                        && s.dzs[k][j].is_finite()
                });
                if prior_ok
                    && s.kus[j].is_finite()
                    && s.kvs[j].is_finite()
                    && s.kws[j].is_finite()
                {
                    let mut ku = s.kus[j] / 1000.0;
                    let mut kv = s.kvs[j] / 1000.0;
                    self.rotate_stage_wind(
                        lons[i],
                        lats[i],
                        s.tmplons[j],
                        s.tmplats[j],
                        &mut ku,
                        &mut kv,
                    );

                    let dlat = Self::dlat_of(dt_s, kv);
                    let mut tmplon = lons[i];
                    let mut tmplat = lats[i];
                    let ok = nav
                        .delta_pos(&mut tmplon, &mut tmplat, 0.0, dlat / 2.0)
                        .is_ok();
                    let dlon = Self::dlon_of(dt_s, ku, tmplat);
                    let dz = dt_s * s.kws[j];

                    tmplon = lons[i];
                    tmplat = lats[i];
                    // stage 3's provisional position is the full step
                    let (adv_lon, adv_lat) = if stage == 2 {
                        (dlon, dlat)
                    } else {
                        (dlon / 2.0, dlat / 2.0)
                    };
                    let ok = ok
                        && nav
                            .delta_pos(&mut tmplon, &mut tmplat, adv_lon, adv_lat)
                            .is_ok();

                    if ok {
                        s.dlons[stage][j] = dlon;
                        s.dlats[stage][j] = dlat;
                        s.dzs[stage][j] = dz;
                        s.tmplons[j] = tmplon;
                        s.tmplats[j] = tmplat;
                        s.tmpzs[j] = if stage == 2 {
                            zs[i] + dz
                        } else {
                            zs[i] + dz / 2.0
                        };
                        continue;
                    }
                }
                s.dlons[stage][j] = f64::NAN;
                s.dlats[stage][j] = f64::NAN;
                s.dzs[stage][j] = f64::NAN;
                s.tmplons[j] = lons[i];
                s.tmplats[j] = lats[i];
                s.tmpzs[j] = zs[i];
            }
        }

        // stage 4 winds at the endpoint
        met.get_uvw_slice(
            *t + dt,
            &s.tmplons[..nuse],
            &s.tmplats[..nuse],
            &s.tmpzs[..nuse],
            &mut s.kus[..nuse],
            &mut s.kvs[..nuse],
            &mut s.kws[..nuse],
        );

        for j in 0..nuse {
            let i = s.iused[j];
            let prior_ok = (0..3).all(|k| {
                s.dlons[k][j].is_finite() && s.dlats[k][j].is_finite() && s.dzs[k][j].is_finite()
            });
            let mut advanced = false;

            if prior_ok && s.kus[j].is_finite() && s.kvs[j].is_finite() && s.kws[j].is_finite() {
                let mut k4u = s.kus[j] / 1000.0;
                let mut k4v = s.kvs[j] / 1000.0;
                self.rotate_stage_wind(
                    lons[i],
                    lats[i],
                    s.tmplons[j],
                    s.tmplats[j],
                    &mut k4u,
                    &mut k4v,
                );

                let dlat4 = Self::dlat_of(dt_s, k4v);
                let mut tmplon = lons[i];
                let mut tmplat = lats[i];
                let ok = nav
                    .delta_pos(&mut tmplon, &mut tmplat, 0.0, dlat4 / 2.0)
                    .is_ok();
                let dlon4 = Self::dlon_of(dt_s, k4u, tmplat);
                let dz4 = dt_s * s.kws[j];

                if ok {
                    let dx = (s.dlons[0][j] + 2.0 * s.dlons[1][j] + 2.0 * s.dlons[2][j] + dlon4)
                        / 6.0;
                    let dy = (s.dlats[0][j] + 2.0 * s.dlats[1][j] + 2.0 * s.dlats[2][j] + dlat4)
                        / 6.0;
                    let dz =
                        (s.dzs[0][j] + 2.0 * s.dzs[1][j] + 2.0 * s.dzs[2][j] + dz4) / 6.0;

                    if dx.is_finite() && dy.is_finite() && dz.is_finite() {
                        let mut lon = lons[i];
                        let mut lat = lats[i];
                        if nav.delta_pos(&mut lon, &mut lat, dx, dy).is_ok() {
                            lons[i] = lon;
                            lats[i] = lat;
                            zs[i] += dz;
                            advanced = true;
                        }
                    }
                }
            }

            if !advanced {
                // disable tracing this parcel; position is left untouched
                flags[i] = 1;
            }
        }

        *t += dt;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::met::DataFlags;

    /// Uniform eastward wind of fixed speed.
    struct Zonal(f64);

    impl MetSource for Zonal {
        fn name(&self) -> &'static str {
            "zonal"
        }
        fn get_uvw(
            &self,
            _t: f64,
            _lon: f64,
            _lat: f64,
            _z: f64,
        ) -> Result<(f64, f64, f64), MetError> {
            Ok((self.0, 0.0, 0.0))
        }
        fn get_data(
            &self,
            quantity: &str,
            _t: f64,
            _lon: f64,
            _lat: f64,
            _z: f64,
            _flags: DataFlags,
        ) -> Result<f64, MetError> {
            Err(MetError::BadQuantity(quantity.to_string()))
        }
    }

    /// A wind field that returns NaN inside a longitude window.
    struct Holey;

    impl MetSource for Holey {
        fn name(&self) -> &'static str {
            "holey"
        }
        fn get_uvw(
            &self,
            _t: f64,
            lon: f64,
            _lat: f64,
            _z: f64,
        ) -> Result<(f64, f64, f64), MetError> {
            if (30.0..40.0).contains(&lon) {
                Ok((f64::NAN, 0.0, 0.0))
            } else {
                Ok((10.0, 0.0, 0.0))
            }
        }
        fn get_data(
            &self,
            quantity: &str,
            _t: f64,
            _lon: f64,
            _lat: f64,
            _z: f64,
            _flags: DataFlags,
        ) -> Result<f64, MetError> {
            Err(MetError::BadQuantity(quantity.to_string()))
        }
    }

    #[test]
    fn equatorial_zonal_wind_moves_east_at_the_right_rate() {
        let integ = Rk4::new();
        let nav = SphereNav::earth();
        let met = Zonal(10.0); // m/s

        let (mut lon, mut lat, mut z, mut t) = (0.0, 0.0, 5.0, 0.0);
        let dt = 0.01;
        integ
            .go(&mut lon, &mut lat, &mut z, &mut t, &met, &nav, dt)
            .unwrap();

        // expected eastward angular displacement on a 6371 km sphere
        let expect = 10.0 / 1000.0 * dt * 86400.0 / 6371.0 / RCONV;
        assert!((lon - expect).abs() < 1e-9);
        assert!(lat.abs() < 1e-12);
        assert!((z - 5.0).abs() < 1e-12);
        assert!((t - dt).abs() < 1e-12);
    }

    #[test]
    fn batch_matches_scalar_for_clean_inputs() {
        let integ = Rk4::new();
        let nav = SphereNav::earth();
        let met = Zonal(25.0);
        let dt = 0.05;

        let lons0 = [0.0, 45.0, -120.0];
        let lats0 = [10.0, -35.0, 60.0];
        let zs0 = [1.0, 2.0, 3.0];

        let mut lons = lons0;
        let mut lats = lats0;
        let mut zs = zs0;
        let mut flags = [0i32; 3];
        let mut t = 0.0;
        integ
            .go_batch(&mut lons, &mut lats, &mut zs, &mut flags, &mut t, &met, &nav, dt)
            .unwrap();

        for i in 0..3 {
            let (mut lon, mut lat, mut z, mut ts) = (lons0[i], lats0[i], zs0[i], 0.0);
            integ
                .go(&mut lon, &mut lat, &mut z, &mut ts, &met, &nav, dt)
                .unwrap();
            assert!((lons[i] - lon).abs() < 1e-12, "lon mismatch at {}", i);
            assert!((lats[i] - lat).abs() < 1e-12, "lat mismatch at {}", i);
            assert!((zs[i] - z).abs() < 1e-12, "z mismatch at {}", i);
            assert_eq!(flags[i], 0);
        }
        assert!((t - dt).abs() < 1e-12);
    }

    #[test]
    fn poisoned_parcel_is_flagged_and_held_in_place() {
        let integ = Rk4::new();
        let nav = SphereNav::earth();
        let met = Holey;
        let dt = 0.01;

        let mut lons = [0.0, 35.0, 100.0];
        let mut lats = [0.0; 3];
        let mut zs = [0.0; 3];
        let mut flags = [0i32; 3];
        let mut t = 0.0;
        integ
            .go_batch(&mut lons, &mut lats, &mut zs, &mut flags, &mut t, &met, &nav, dt)
            .unwrap();

        // the parcel in the hole is disabled and unmoved
        assert_eq!(flags[1], 1);
        assert_eq!(lons[1], 35.0);

        // the others advanced exactly as the scalar path would
        for &i in &[0usize, 2] {
            assert_eq!(flags[i], 0);
            let start = if i == 0 { 0.0 } else { 100.0 };
            let (mut lon, mut lat, mut z, mut ts) = (start, 0.0, 0.0, 0.0);
            integ
                .go(&mut lon, &mut lat, &mut z, &mut ts, &met, &nav, dt)
                .unwrap();
            assert!((lons[i] - lon).abs() < 1e-12);
            assert!((lats[i] - lat).abs() < 1e-12);
        }
    }

    #[test]
    fn flagged_parcels_are_skipped_entirely() {
        let integ = Rk4::new();
        let nav = SphereNav::earth();
        let met = Zonal(10.0);

        let mut lons = [0.0, 10.0];
        let mut lats = [0.0, 0.0];
        let mut zs = [0.0, 0.0];
        let mut flags = [1i32, 0];
        let mut t = 0.0;
        integ
            .go_batch(&mut lons, &mut lats, &mut zs, &mut flags, &mut t, &met, &nav, 0.01)
            .unwrap();

        assert_eq!(lons[0], 0.0);
        assert!(lons[1] > 10.0);
    }
}
