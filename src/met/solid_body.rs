//! Analytic solid-body-rotation wind field.
//!
//! The wind is that of an atmosphere rotating rigidly about an axis
//! that may be tilted away from the planet's rotation axis by a set of
//! Euler angles. Scalar quantities come from the built-in US Standard
//! Atmosphere 1976 profile. Useful as a test field with known exact
//! trajectories: parcels ride small circles about the tilted axis.

use super::{DataFlags, MetError, MetSource};
use crate::nav::RCONV;

/// Seconds per day; model time arrives in fractional days.
const SECONDS_PER_DAY: f64 = 86400.0;

/// A wind field in solid-body rotation about a (possibly tilted) axis.
///
/// # Example
///
/// ```
/// use windtraj::met::{MetSource, SolidBodyRotation};
///
/// // 40 m/s max wind, untilted: pure eastward flow on the equator
/// let met = SolidBodyRotation::new();
/// let (u, v, w) = met.get_uvw(0.0, 0.0, 0.0, 10.0).unwrap();
/// assert!((u - 40.0).abs() < 1e-10);
/// assert!(v.abs() < 1e-10);
/// assert_eq!(w, 0.0);
/// ```
pub struct SolidBodyRotation {
    /// Maximum (equatorial) wind speed, m/s.
    ws: f64,
    /// Euler angles of the rotation axis, degrees.
    alpha: f64,
    beta: f64,
    gamma: f64,
    /// Vertical-oscillation amplitude and frequency.
    vs: f64,
    fr: f64,
    /// Wind-speed modulation frequency (rad/s); zero for steady flow.
    pr: f64,
    debug: i32,
}

impl SolidBodyRotation {
    /// Untilted rotation at 40 m/s.
    pub fn new() -> Self {
        Self::with_speed(40.0)
    }

    /// Untilted rotation at the given speed (m/s).
    pub fn with_speed(ws: f64) -> Self {
        Self {
            ws,
            alpha: 0.0,
            beta: 0.0,
            gamma: 0.0,
            vs: 0.0,
            fr: 0.0,
            pr: 0.0,
            debug: 0,
        }
    }

    /// Rotation about an axis tilted by `tilt` degrees.
    pub fn with_tilt(ws: f64, tilt: f64) -> Self {
        let mut s = Self::with_speed(ws);
        s.beta = tilt;
        s
    }

    /// Rotation about an axis given by three Euler angles, degrees.
    pub fn with_angles(ws: f64, alpha: f64, beta: f64, gamma: f64) -> Self {
        let mut s = Self::with_speed(ws);
        s.alpha = alpha;
        s.beta = beta;
        s.gamma = gamma;
        s
    }

    /// Add a vertical-wind oscillation of amplitude `vs` and angular
    /// frequency `fr` (rad/s).
    pub fn set_vertical(&mut self, vs: f64, fr: f64) {
        self.vs = vs;
        self.fr = fr;
    }

    /// Modulate the wind speed in time with angular frequency `pr`.
    pub fn set_period(&mut self, pr: f64) {
        self.pr = pr;
    }
}

impl Default for SolidBodyRotation {
    fn default() -> Self {
        Self::new()
    }
}

impl MetSource for SolidBodyRotation {
    fn name(&self) -> &'static str {
        "SolidBodyRotation"
    }

    fn get_uvw(&self, t: f64, lon: f64, lat: f64, _z: f64) -> Result<(f64, f64, f64), MetError> {
        let time = t * SECONDS_PER_DAY;

        let (sa, ca) = (self.alpha * RCONV).sin_cos();
        let (sb, cb) = (self.beta * RCONV).sin_cos();
        let (sg, cg) = (self.gamma * RCONV).sin_cos();

        let (slat, clat) = (lat * RCONV).sin_cos();
        let (slon, clon) = (lon * RCONV).sin_cos();

        // position in rectangular coordinates
        let xx = clat * clon;
        let yy = clat * slon;
        let zz = slat;

        // rotate into the tilted frame
        let xt = (ca * cg - sa * cb * sg) * xx + (-sa * cg - ca * cb * sg) * yy + (sb * sg) * zz;
        let yt = (ca * sg + sa * cb * cg) * xx + (-sa * sg + ca * cb * cg) * yy + (-sb * cg) * zz;
        // the tilted z component drops out of the wind projection

        // pseudo-latitude and pseudo-longitude on the tilted sphere
        let ht = (xt * xt + yt * yt).sqrt();
        let cxlat = ht;
        let (sxlon, cxlon) = if ht > 0.0 {
            (yt / ht, xt / ht)
        } else {
            // at a pole of the tilted sphere
            (0.0, 0.0)
        };

        // tilted-frame wind (u, 0, 0) taken back to rectangular
        // coordinates and then out of the tilted frame
        let wst = self.ws * (self.pr * time).cos();
        let wxu = ca * ((-sxlon * cxlat * wst * cg) + (sg * cxlon * cxlat * wst))
            + sa * (cb * ((cg * cxlon * cxlat * wst) - (-sxlon * cxlat * wst * sg)));
        let wyu = ca * (cb * ((cg * cxlon * cxlat * wst) - (-sg * sxlon * cxlat * wst)))
            - sa * ((sg * cxlon * cxlat * wst) + (-cg * sxlon * cxlat * wst));
        let wzu = sb * ((-sg * sxlon * cxlat * wst) - (cxlon * cxlat * wst * cg));

        // project onto the local east/north/up directions
        let u = -slon * wxu + clon * wyu;
        let v = -slat * clon * wxu - slat * slon * wyu + clat * wzu;
        let w = self.vs * (self.fr * time).cos();

        Ok((u, v, w))
    }

    fn get_data(
        &self,
        quantity: &str,
        t: f64,
        lon: f64,
        lat: f64,
        z: f64,
        flags: DataFlags,
    ) -> Result<f64, MetError> {
        let fault = |e: MetError| {
            if flags.contains(DataFlags::NAN_BAD) {
                Ok(f64::NAN)
            } else if flags.contains(DataFlags::INF_BAD) {
                Ok(f64::INFINITY)
            } else {
                Err(e)
            }
        };

        match quantity {
            "u" => self.get_uvw(t, lon, lat, z).map(|(u, _, _)| u),
            "v" => self.get_uvw(t, lon, lat, z).map(|(_, v, _)| v),
            "w" | "omega" | "heating rate" => Ok(0.0),
            "alt" => Ok(z),
            "p" => match usta76("p", z) {
                Some(p) => Ok(if flags.contains(DataFlags::MKS) {
                    p * 0.10
                } else {
                    p
                }),
                None => fault(MetError::OutOfDomain),
            },
            other => match usta76(other, z) {
                Some(val) => Ok(val),
                None if usta76_knows(other) => fault(MetError::OutOfDomain),
                None => fault(MetError::BadQuantity(other.to_string())),
            },
        }
    }

    /// Served vertical winds travel in km/s on the wire.
    fn vertical_wind_factor(&self) -> f64 {
        0.001
    }

    fn debug(&self) -> i32 {
        self.debug
    }

    fn set_debug(&mut self, level: i32) {
        self.debug = level;
    }
}

// =============================================================================
// US Standard Atmosphere 1976
// =============================================================================

/// Altitudes, km.
#[rustfmt::skip]
static Z_STD: [f64; 86] = [
     0.00000,  1.00000,  2.00000,  3.00000,  4.00000,  5.00000,
     6.00000,  7.00000,  8.00000,  9.00000, 10.0000, 11.0000,
    12.0000, 13.0000, 14.0000, 15.0000, 16.0000, 17.0000,
    18.0000, 19.0000, 20.0000, 21.0000, 22.0000, 23.0000,
    24.0000, 25.0000, 26.0000, 27.0000, 28.0000, 29.0000,
    30.0000, 31.0000, 32.0000, 33.0000, 34.0000, 35.0000,
    36.0000, 37.0000, 38.0000, 39.0000, 40.0000, 41.0000,
    42.0000, 43.0000, 44.0000, 45.0000, 46.0000, 47.0000,
    48.0000, 49.0000, 50.0000, 51.0000, 52.0000, 53.0000,
    54.0000, 55.0000, 56.0000, 57.0000, 58.0000, 59.0000,
    60.0000, 61.0000, 62.0000, 63.0000, 64.0000, 65.0000,
    66.0000, 67.0000, 68.0000, 69.0000, 70.0000, 71.0000,
    72.0000, 73.0000, 74.0000, 75.0000, 76.0000, 77.0000,
    78.0000, 79.0000, 80.0000, 81.0000, 82.0000, 83.0000,
    84.0000, 85.0000,
];

/// Temperatures, K.
#[rustfmt::skip]
static T_STD: [f64; 86] = [
    288.150, 281.650, 275.150, 268.650, 262.150, 255.650,
    249.150, 242.650, 236.150, 229.650, 223.150, 216.650,
    216.650, 216.650, 216.650, 216.650, 216.650, 216.650,
    216.650, 216.650, 216.650, 217.650, 218.650, 219.650,
    220.650, 221.650, 222.650, 223.650, 224.650, 225.650,
    226.650, 227.650, 228.650, 231.450, 234.250, 237.050,
    239.850, 242.650, 245.450, 248.250, 251.050, 253.850,
    256.650, 259.450, 262.250, 265.050, 267.850, 270.650,
    270.650, 270.650, 270.650, 270.650, 267.850, 265.050,
    262.250, 259.450, 256.650, 253.850, 251.050, 248.250,
    245.450, 242.650, 239.850, 237.050, 234.250, 231.450,
    228.650, 225.850, 223.050, 220.250, 217.450, 214.650,
    212.650, 210.650, 208.650, 206.650, 204.650, 202.650,
    200.650, 198.650, 196.650, 194.650, 192.650, 190.650,
    188.650, 186.867,
];

/// Pressures, hPa.
#[rustfmt::skip]
static P_STD: [f64; 86] = [
    1013.25,    898.746,    794.952,    701.086,    616.402,    540.199,
     471.810,   410.607,    355.998,    307.425,    264.363,    226.321,
     193.304,   165.104,    141.018,    120.446,    102.875,     87.8668,
      75.0484,   64.1001,    54.7489,    46.7789,    39.9979,    34.2243,
      29.3049,   25.1102,    21.5309,    18.4746,    15.8629,    13.6296,
      11.7187,   10.0823,     8.68019,    7.48228,    6.46122,    5.58924,
       4.84317,   4.20367,    3.65455,    3.18221,    2.77522,    2.42396,
       2.12030,   1.85738,    1.62937,    1.43135,    1.25910,    1.10906,
       0.977546,  0.861624,   0.759448,   0.669389,   0.589622,   0.518669,
       0.455632,  0.399700,   0.350137,   0.306274,   0.267509,   0.233296,
       0.203143,  0.176606,   0.153287,   0.132826,   0.114900,   0.0992204,
       0.0855276, 0.0735896,  0.0631992,  0.0541718,  0.0463423,  0.0395643,
       0.0337177, 0.0286917,  0.0243773,  0.0206792,  0.0175141,  0.0148092,
       0.0125013, 0.0105351,  0.00886281, 0.00744281, 0.00623906, 0.00522038,
       0.00435982, 0.00363421,
];

/// Potential temperatures, K.
#[rustfmt::skip]
static H_STD: [f64; 86] = [
     287.068,  290.373,  293.794,  297.339,  301.015,  304.831,
     308.795,  312.917,  317.209,  321.682,  326.349,  331.225,
     346.489,  362.457,  379.161,  396.634,  414.912,  434.033,
     454.035,  474.959,  496.847,  522.089,  548.488,  576.093,
     604.952,  635.116,  666.639,  699.573,  733.978,  769.910,
     807.430,  846.602,  887.489,  937.294,  989.245, 1043.41,
    1099.84,  1158.63,  1219.82,  1283.50,  1349.73,  1418.59,
    1490.14,  1564.47,  1641.65,  1721.76,  1804.87,  1891.06,
    1960.51,  2032.50,  2107.14,  2184.52,  2241.74,  2301.07,
    2362.64,  2426.54,  2492.88,  2561.80,  2633.42,  2707.88,
    2785.33,  2865.92,  2949.82,  3037.20,  3128.26,  3223.19,
    3322.21,  3425.55,  3533.45,  3646.18,  3764.02,  3887.27,
    4031.07,  4181.63,  4339.33,  4504.58,  4677.83,  4859.54,
    5050.21,  5250.39,  5460.66,  5681.62,  5913.95,  6158.36,
    6415.60,  6694.25,
];

/// Densities, kg/m3.
#[rustfmt::skip]
static D_STD: [f64; 86] = [
    1.22500,      1.11164,      1.00649,      0.909122,     0.819129,     0.736115,
    0.659697,     0.589501,     0.525167,     0.466348,     0.412706,     0.363918,
    0.310828,     0.265483,     0.226753,     0.193674,     0.165420,     0.141288,
    0.120676,     0.103071,     0.0880348,    0.0748737,    0.0637273,    0.0542802,
    0.0462673,    0.0394658,    0.0336882,    0.0287769,    0.0245988,    0.0210420,
    0.0180119,    0.0154287,    0.0132250,    0.0112620,    0.00960888,   0.00821392,
    0.00703441,   0.00603513,   0.00518691,   0.00446557,   0.00385101,   0.00332648,
    0.00287802,   0.00249393,   0.00216443,   0.00188129,   0.00163760,   0.00142753,
    0.00125825,   0.00110904,   0.000977525,  0.000861606,  0.000766867,  0.000681710,
    0.000605253,  0.000536684,  0.000475264,  0.000420311,  0.000371207,  0.000327383,
    0.000288321,  0.000253550,  0.000222640,  0.000195200,  0.000170875,  0.000149342,
    0.000130308,  0.000113510,  9.87069e-05,  8.56831e-05,  7.42430e-05,  6.42111e-05,
    5.52370e-05,  4.74496e-05,  4.07010e-05,  3.48607e-05,  2.98135e-05,  2.54579e-05,
    2.17046e-05,  1.84751e-05,  1.57006e-05,  1.33205e-05,  1.12820e-05,  9.53900e-06,
    8.05099e-06,  6.77508e-06,
];

fn usta76_table(quantity: &str) -> Option<&'static [f64; 86]> {
    match quantity {
        "alt" => Some(&Z_STD),
        "p" => Some(&P_STD),
        "t" => Some(&T_STD),
        "theta" => Some(&H_STD),
        "rho" => Some(&D_STD),
        _ => None,
    }
}

fn usta76_knows(quantity: &str) -> bool {
    usta76_table(quantity).is_some()
}

/// Linearly interpolate a standard-atmosphere quantity in altitude (km).
///
/// Returns `None` for an unknown quantity or an altitude off the table.
fn usta76(quantity: &str, z: f64) -> Option<f64> {
    let y = usta76_table(quantity)?;
    let x = &Z_STD;
    for i in 0..x.len() - 1 {
        if (x[i] - z) * (x[i + 1] - z) <= 0.0 {
            return Some(y[i + 1] - (y[i + 1] - y[i]) / (x[i + 1] - x[i]) * (x[i + 1] - z));
        }
    }
    None
}
