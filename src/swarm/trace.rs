//! A single trace driver over any parcel container.

use crate::met::TracingContext;
use crate::types::Parcel;

use super::{Flock, Swarm, SwarmError};

/// Anything whose parcels can be advanced one time step collectively.
///
/// Implemented by the distributed collections and by a plain
/// `Vec<Parcel>` for serial work, so a driver loop is written once.
pub trait Traceable {
    /// Advance every parcel by `dt` days.
    fn advance(&mut self, ctx: &TracingContext, dt: f64) -> Result<(), SwarmError>;
}

impl Traceable for Flock {
    fn advance(&mut self, ctx: &TracingContext, dt: f64) -> Result<(), SwarmError> {
        Flock::advance(self, ctx, dt)
    }
}

impl Traceable for Swarm {
    fn advance(&mut self, ctx: &TracingContext, dt: f64) -> Result<(), SwarmError> {
        Swarm::advance(self, ctx, dt)
    }
}

impl Traceable for Vec<Parcel> {
    fn advance(&mut self, ctx: &TracingContext, dt: f64) -> Result<(), SwarmError> {
        for p in self.iter_mut() {
            ctx.advance(p, dt)?;
        }
        Ok(())
    }
}

/// Trace a container forward (or backward, with negative `dt`) through
/// `steps` time steps.
///
/// Every rank of a distributed collection must run this with identical
/// arguments; the step count is fixed up front so ranks that own no
/// parcels stay in lock-step with the rest.
pub fn trace<T: Traceable>(
    parcels: &mut T,
    ctx: &TracingContext,
    dt: f64,
    steps: usize,
) -> Result<(), SwarmError> {
    for _ in 0..steps {
        parcels.advance(ctx, dt)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::met::SolidBodyRotation;
    use crate::nav::SphereNav;

    #[test]
    fn vec_of_parcels_traces_serially() {
        let ctx = TracingContext::new(
            SphereNav::earth(),
            Box::new(SolidBodyRotation::new()),
        );
        let mut parcels = vec![Parcel::new(0.0, 0.0, 16.0); 3];
        trace(&mut parcels, &ctx, 0.1, 10).unwrap();
        for p in &parcels {
            assert!(p.lon > 0.0);
            assert!((p.t - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn forward_then_backward_returns_home() {
        let ctx = TracingContext::new(
            SphereNav::earth(),
            Box::new(SolidBodyRotation::with_tilt(40.0, 30.0)),
        );
        let mut parcels = vec![Parcel::new(0.0, 0.0, 16.0)];
        trace(&mut parcels, &ctx, 0.05, 100).unwrap();
        trace(&mut parcels, &ctx, -0.05, 100).unwrap();
        assert!(parcels[0].lon.abs() < 0.01);
        assert!(parcels[0].lat.abs() < 0.01);
    }
}
