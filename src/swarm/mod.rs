//! Parcel collections distributed over a process group.
//!
//! A collection owns a logical sequence of N parcels, splits them across
//! the tracing ranks of a [`ProcessGroup`](crate::pgroup::ProcessGroup),
//! and advances them in lock-step. Two storage layouts ship: [`Flock`]
//! keeps whole [`Parcel`](crate::types::Parcel) records per rank, and
//! [`Swarm`] keeps the same population as parallel field arrays, which
//! is what the batched integrator wants to eat.
//!
//! Partitioning, ownership ranges, and the optional reservation of
//! dedicated met-server ranks are computed once at construction by
//! [`Partition`] and never change for the collection's lifetime.

mod flock;
mod partition;
mod soa;
mod trace;

pub use flock::Flock;
pub use partition::{GroupPlan, Partition, RankShare};
pub use soa::Swarm;
pub use trace::{trace, Traceable};

use thiserror::Error;

use crate::nav::NavError;
use crate::pgroup::GroupError;

/// Errors from parcel-collection construction and collective operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SwarmError {
    /// Fewer parcels than tracing ranks to put them on.
    #[error("too few parcels ({parcels}) for {tracers} tracing ranks")]
    BadParcelCount { parcels: usize, tracers: usize },

    /// Distributing parcel state across the group failed.
    #[error("parcel distribution failed")]
    BadGeneration,

    /// A global parcel index outside [0, N).
    #[error("parcel index {0} out of range")]
    BadParcelIndex(usize),

    /// A met-server rank was asked to iterate parcels as a tracer.
    #[error("a met server rank owns no parcels to iterate")]
    MetIsNotTracer,

    /// A transport failure during a collective operation.
    #[error(transparent)]
    Group(#[from] GroupError),

    /// A corrupted position was handed to navigation.
    #[error(transparent)]
    Nav(#[from] NavError),
}

/// Which rank's copy of a parcel is authoritative in a collective
/// `set`/`parcel` call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Authority {
    /// The group root holds the value; it is communicated to or from the
    /// owning rank (and broadcast on reads).
    #[default]
    Root,
    /// The owning rank holds the value; no communication happens and
    /// non-owners see nothing.
    Owner,
}
