//! Time integration of parcel positions.
//!
//! The integrator advances a parcel's (longitude, latitude, vertical,
//! time) state through a wind field, one step at a time, using the
//! navigation object for all spherical geometry. The batched entry point
//! advances a whole population with one wind-field query per stage.

mod rk4;

pub use rk4::{Integrator, Rk4, StepError};
