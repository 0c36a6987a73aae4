//! Meteorological data sources and the per-process tracing context.
//!
//! A [`MetSource`] answers wind and scalar-field queries at a given time
//! and position. Sources evaluate locally; the [`DistributedMet`] wrapper
//! adds the client/server protocol that lets a process-group subgroup
//! reserve one rank to hold the data and serve every other rank's
//! queries over the group's message-passing primitives.

mod distributed;
mod solid_body;

pub use distributed::{DistributedMet, MetCommand};
pub use solid_body::SolidBodyRotation;

use thiserror::Error;

use crate::integ::{Integrator, Rk4, StepError};
use crate::nav::{NavError, SphereNav};
use crate::types::Parcel;

/// Errors from meteorological data access.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MetError {
    /// The source has no valid data for the requested point.
    #[error("bad meteorological data for '{quantity}'")]
    BadData { quantity: String },

    /// The requested point lies outside the source's domain.
    #[error("request outside the meteorological data domain")]
    OutOfDomain,

    /// The source does not provide the requested quantity.
    #[error("unknown quantity '{0}'")]
    BadQuantity(String),

    /// A protocol exchange with a dedicated met server failed.
    #[error("met server exchange failed")]
    ServerExchange,
}

/// Behavior selection for scalar-field queries hitting invalid data.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DataFlags(u32);

impl DataFlags {
    /// Default behavior: invalid data is an error.
    pub const NONE: Self = Self(0);
    /// Convert the result to MKS units where the native units differ.
    pub const MKS: Self = Self(0x01);
    /// Return NaN instead of failing on invalid data.
    pub const NAN_BAD: Self = Self(0x02);
    /// Return infinity instead of failing on invalid data.
    pub const INF_BAD: Self = Self(0x04);

    /// True if every bit of `other` is set.
    #[inline]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Combine two flag sets.
    #[inline]
    pub fn with(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

// =============================================================================
// MetSource trait
// =============================================================================

/// A source of wind and scalar meteorological fields.
///
/// Winds are in m/s; the vertical coordinate is in the source's own
/// units; time is model time in fractional days. Implementations must be
/// shareable across the serve loop and the tracing loop.
pub trait MetSource: Send + Sync {
    /// Short name for diagnostics.
    fn name(&self) -> &'static str;

    /// Wind components (u, v, w) at a point.
    fn get_uvw(&self, t: f64, lon: f64, lat: f64, z: f64) -> Result<(f64, f64, f64), MetError>;

    /// A scalar field value at a point.
    fn get_data(
        &self,
        quantity: &str,
        t: f64,
        lon: f64,
        lat: f64,
        z: f64,
        flags: DataFlags,
    ) -> Result<f64, MetError>;

    /// Batched wind query: one call for a whole set of positions.
    ///
    /// A per-point failure writes NaN into that point's components rather
    /// than failing the batch. Implementations backed by remote data
    /// should override this to amortize round trips.
    #[allow(clippy::too_many_arguments)]
    fn get_uvw_slice(
        &self,
        t: f64,
        lons: &[f64],
        lats: &[f64],
        zs: &[f64],
        us: &mut [f64],
        vs: &mut [f64],
        ws: &mut [f64],
    ) {
        for i in 0..lons.len() {
            match self.get_uvw(t, lons[i], lats[i], zs[i]) {
                Ok((u, v, w)) => {
                    us[i] = u;
                    vs[i] = v;
                    ws[i] = w;
                }
                Err(_) => {
                    us[i] = f64::NAN;
                    vs[i] = f64::NAN;
                    ws[i] = f64::NAN;
                }
            }
        }
    }

    /// Batched scalar query.
    #[allow(clippy::too_many_arguments)]
    fn get_data_slice(
        &self,
        quantity: &str,
        t: f64,
        lons: &[f64],
        lats: &[f64],
        zs: &[f64],
        values: &mut [f64],
        flags: DataFlags,
    ) {
        for i in 0..lons.len() {
            values[i] = self
                .get_data(quantity, t, lons[i], lats[i], zs[i], flags)
                .unwrap_or(f64::NAN);
        }
    }

    /// Factor applied to served vertical-wind values on the client side
    /// (unit conversion between the wire and the vertical coordinate).
    fn vertical_wind_factor(&self) -> f64 {
        1.0
    }

    /// Diagnostic verbosity level.
    fn debug(&self) -> i32 {
        0
    }

    /// Set the diagnostic verbosity level.
    fn set_debug(&mut self, _level: i32) {}
}

// =============================================================================
// TracingContext
// =============================================================================

/// The per-process collaborators every parcel in a process shares.
///
/// One context per process: the navigation object, the (possibly
/// distributed) wind source, and the integrator. Replacing any of them
/// affects every parcel traced by this process from that point on.
pub struct TracingContext {
    pub nav: SphereNav,
    pub met: DistributedMet,
    pub integ: Rk4,
}

impl TracingContext {
    /// Build a context around a local wind source.
    pub fn new(nav: SphereNav, source: Box<dyn MetSource>) -> Self {
        Self {
            nav,
            met: DistributedMet::new(source),
            integ: Rk4::new(),
        }
    }

    /// Toggle conformal wind adjustment on both the navigation object
    /// and the integrator.
    pub fn set_conformal(&mut self, on: bool) {
        self.nav.set_conformal(on);
        self.integ.set_conformal(on);
    }

    /// Advance a single parcel by `dt` days.
    ///
    /// Data faults retire the parcel via its status flags instead of
    /// propagating: invalid data sets `HIT_BAD`, an out-of-domain query
    /// sets `HIT_BDY`; both suppress further tracing. Navigation errors
    /// indicate a corrupted position and do propagate.
    pub fn advance(&self, p: &mut Parcel, dt: f64) -> Result<(), NavError> {
        if !p.is_traceable() {
            return Ok(());
        }
        match self
            .integ
            .go(&mut p.lon, &mut p.lat, &mut p.z, &mut p.t, &self.met, &self.nav, dt)
        {
            Ok(()) => Ok(()),
            Err(StepError::Met(MetError::OutOfDomain)) => {
                p.mark_boundary();
                Ok(())
            }
            Err(StepError::Met(_)) => {
                p.mark_bad();
                Ok(())
            }
            Err(StepError::Nav(e)) => Err(e),
        }
    }
}
