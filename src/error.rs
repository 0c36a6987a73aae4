//! The crate-wide error type.

use thiserror::Error;

use crate::cal::CalError;
use crate::met::MetError;
use crate::nav::NavError;
use crate::pgroup::GroupError;
use crate::swarm::SwarmError;

/// Any error the trajectory engine can produce, for callers that do not
/// care which subsystem failed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrajError {
    #[error(transparent)]
    Nav(#[from] NavError),

    #[error(transparent)]
    Met(#[from] MetError),

    #[error(transparent)]
    Swarm(#[from] SwarmError),

    #[error(transparent)]
    Group(#[from] GroupError),

    #[error(transparent)]
    Cal(#[from] CalError),
}

/// Shorthand result type used by driver-level code.
pub type Result<T> = std::result::Result<T, TrajError>;
