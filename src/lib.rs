//! # windtraj
//!
//! A parallel atmospheric parcel-trajectory engine.
//!
//! This crate provides the building blocks for tracing air parcels
//! through gridded or analytic wind fields:
//! - Spherical navigation (wrapping, displacement, bearings, conformal
//!   wind rotation near the poles)
//! - A four-stage Runge-Kutta integrator, scalar and batched
//! - Meteorological sources with an optional client/server split over a
//!   process group
//! - Distributed parcel collections in record and field-array layouts
//! - Initial-condition generators and calendar/model-time conversion
//!
//! # Example
//!
//! ```
//! use windtraj::met::{SolidBodyRotation, TracingContext};
//! use windtraj::nav::SphereNav;
//! use windtraj::swarm::trace;
//! use windtraj::types::Parcel;
//!
//! // one parcel riding a 40 m/s solid-body wind for a day
//! let ctx = TracingContext::new(
//!     SphereNav::earth(),
//!     Box::new(SolidBodyRotation::new()),
//! );
//! let mut parcels = vec![Parcel::new(0.0, 0.0, 16.0)];
//! trace(&mut parcels, &ctx, 0.05, 20).unwrap();
//! assert!(parcels[0].lon > 30.0);
//! ```

pub mod cal;
pub mod error;
pub mod gen;
pub mod integ;
pub mod met;
pub mod nav;
pub mod pgroup;
pub mod swarm;
pub mod types;

// Re-export main types for convenience
pub use cal::{cal2time, time2cal, CalFormat};
pub use error::{Result, TrajError};
pub use gen::{GridGenerator, LineGenerator, ParcelGenerator, ParcelSink, RandomGenerator};
pub use integ::{Integrator, Rk4};
pub use met::{DataFlags, DistributedMet, MetSource, SolidBodyRotation, TracingContext};
pub use nav::{Quality, SphereNav, EARTH_RADIUS_KM};
pub use pgroup::{ProcessGroup, Role, SerialGroup, Tag, ThreadFabric, ThreadGroup};
pub use swarm::{trace, Authority, Flock, Partition, Swarm, Traceable};
pub use types::{Parcel, ParcelFlags, ParcelStatus};
