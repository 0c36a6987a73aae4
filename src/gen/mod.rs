//! Initial-condition generators for parcel populations.
//!
//! A generator produces positions; everything else (time, tag, flags)
//! is cloned from a sample parcel. [`ParcelSink`] lets the same
//! generator fill a `Vec<Parcel>` or a distributed collection, where the
//! lock-step `set` calls distribute each parcel to its owning rank.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::swarm::{Authority, Flock, Swarm, SwarmError};
use crate::types::Parcel;

/// A destination that accepts parcels by global index.
pub trait ParcelSink {
    /// Capacity of the destination.
    fn total(&self) -> usize;

    /// Place a parcel at global index `n`.
    fn put(&mut self, n: usize, p: &Parcel) -> Result<(), SwarmError>;
}

impl ParcelSink for Vec<Parcel> {
    fn total(&self) -> usize {
        self.len()
    }

    fn put(&mut self, n: usize, p: &Parcel) -> Result<(), SwarmError> {
        match self.get_mut(n) {
            Some(slot) => {
                *slot = *p;
                Ok(())
            }
            None => Err(SwarmError::BadParcelIndex(n)),
        }
    }
}

impl ParcelSink for Flock {
    fn total(&self) -> usize {
        self.size()
    }

    fn put(&mut self, n: usize, p: &Parcel) -> Result<(), SwarmError> {
        self.set(n, p, Authority::Root)
    }
}

impl ParcelSink for Swarm {
    fn total(&self) -> usize {
        self.size()
    }

    fn put(&mut self, n: usize, p: &Parcel) -> Result<(), SwarmError> {
        self.set(n, p, Authority::Root)
    }
}

/// A source of initial parcel positions.
pub trait ParcelGenerator {
    /// Produce the full population, cloning non-position state from
    /// `sample`.
    fn make_parcels(&self, sample: &Parcel) -> Vec<Parcel>;

    /// Fill the leading slots of a destination with generated parcels,
    /// returning how many were placed. Every rank of a distributed
    /// destination must call this identically.
    fn init<S: ParcelSink>(&self, sink: &mut S, sample: &Parcel) -> Result<usize, SwarmError>
    where
        Self: Sized,
    {
        let parcels = self.make_parcels(sample);
        let n = parcels.len().min(sink.total());
        for (i, p) in parcels.iter().take(n).enumerate() {
            sink.put(i, p)?;
        }
        Ok(n)
    }
}

// =============================================================================
// Generators
// =============================================================================

/// A regular lon/lat/z lattice with inclusive endpoints.
pub struct GridGenerator {
    pub lon: (f64, f64, f64),
    pub lat: (f64, f64, f64),
    pub z: (f64, f64, f64),
}

impl GridGenerator {
    /// A horizontal grid at a single level: `(begin, end, delta)` for
    /// each of longitude and latitude.
    pub fn horizontal(lon: (f64, f64, f64), lat: (f64, f64, f64), z: f64) -> Self {
        Self {
            lon,
            lat,
            z: (z, z, 1.0),
        }
    }

    fn axis(range: (f64, f64, f64)) -> Vec<f64> {
        let (beg, end, delta) = range;
        let mut vals = Vec::new();
        if delta == 0.0 || (end - beg) * delta < 0.0 {
            vals.push(beg);
            return vals;
        }
        let mut v = beg;
        // inclusive endpoint, padded against rounding
        while (v - end) * delta.signum() <= delta.abs() * 1e-9 {
            vals.push(v);
            v += delta;
        }
        vals
    }
}

impl ParcelGenerator for GridGenerator {
    fn make_parcels(&self, sample: &Parcel) -> Vec<Parcel> {
        let lons = Self::axis(self.lon);
        let lats = Self::axis(self.lat);
        let zs = Self::axis(self.z);
        let mut out = Vec::with_capacity(lons.len() * lats.len() * zs.len());
        for &z in &zs {
            for &lat in &lats {
                for &lon in &lons {
                    let mut p = *sample;
                    p.lon = lon;
                    p.lat = lat;
                    p.z = z;
                    out.push(p);
                }
            }
        }
        out
    }
}

/// `n` points linearly interpolated between two endpoints.
pub struct LineGenerator {
    pub begin: (f64, f64, f64),
    pub end: (f64, f64, f64),
    pub n: usize,
}

impl ParcelGenerator for LineGenerator {
    fn make_parcels(&self, sample: &Parcel) -> Vec<Parcel> {
        let mut out = Vec::with_capacity(self.n);
        for i in 0..self.n {
            let f = if self.n > 1 {
                i as f64 / (self.n - 1) as f64
            } else {
                0.0
            };
            let mut p = *sample;
            p.lon = self.begin.0 + f * (self.end.0 - self.begin.0);
            p.lat = self.begin.1 + f * (self.end.1 - self.begin.1);
            p.z = self.begin.2 + f * (self.end.2 - self.begin.2);
            out.push(p);
        }
        out
    }
}

/// `n` points distributed uniformly over the sphere's surface.
///
/// Longitude is uniform; latitude is the arcsine of a uniform deviate,
/// which weights by area instead of piling parcels at the poles. The
/// seed makes the population reproducible across ranks, which the
/// lock-step `init` fill depends on.
pub struct RandomGenerator {
    pub n: usize,
    pub z_range: Option<(f64, f64)>,
    pub seed: u64,
}

impl ParcelGenerator for RandomGenerator {
    fn make_parcels(&self, sample: &Parcel) -> Vec<Parcel> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut out = Vec::with_capacity(self.n);
        for _ in 0..self.n {
            let mut p = *sample;
            p.lon = rng.gen_range(-180.0..180.0);
            p.lat = rng.gen_range(-1.0f64..1.0).asin().to_degrees();
            if let Some((lo, hi)) = self.z_range {
                p.z = rng.gen_range(lo..hi);
            }
            out.push(p);
        }
        out
    }
}
