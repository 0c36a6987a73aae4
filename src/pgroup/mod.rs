//! Cooperating process groups: ranks, typed message passing, barriers.
//!
//! A [`ProcessGroup`] is the transport a parcel collection distributes
//! itself over: rank and size queries, blocking point-to-point sends and
//! receives of typed buffers with a message tag, a collective barrier,
//! and subgroup formation. The engine never assumes anything about the
//! transport beyond these primitives.
//!
//! Two implementations ship: [`SerialGroup`] for single-process runs,
//! where every transfer degenerates to a no-op, and [`ThreadGroup`],
//! which maps each rank onto an OS thread in one address space and is
//! what the protocol tests run on.

mod serial;
mod threaded;

pub use serial::SerialGroup;
pub use threaded::{ThreadFabric, ThreadGroup};

use thiserror::Error;

/// Errors from process-group transport operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GroupError {
    /// A rank outside the group was named.
    #[error("rank {0} is not a member of this group")]
    BadRank(usize),

    /// The peer side of a transfer is gone.
    #[error("transport disconnected")]
    Disconnected,

    /// A subgroup specification was empty or out of range.
    #[error("invalid subgroup specification")]
    BadSubgroup,

    /// Shared transport state was poisoned by a panicked rank.
    #[error("transport state poisoned")]
    Poisoned,
}

/// The part a rank plays in a parcel collection's division of labor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Role {
    #[default]
    All,
    /// Owns and integrates parcels.
    Tracer,
    /// Reserved to serve meteorological data.
    MetReader,
    Coordinator,
    Unknown,
}

/// Message tags that keep the distinct phases of an exchange apart.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tag {
    /// Parcel state transfers.
    Parcel,
    /// A met-protocol command code.
    Req,
    /// The time argument of a met query.
    Time,
    /// The position arguments of a met query.
    Coords,
    /// The quantity name of a scalar met query.
    Quant,
    /// A met query's reply values.
    Recv,
    /// Server status exchanges.
    Status,
}

// =============================================================================
// ProcessGroup trait
// =============================================================================

/// A set of cooperating workers with blocking message passing.
///
/// All sends and receives block until matched; `sync` blocks until every
/// member of the group arrives. There are no timeouts: an unmatched
/// collective call deadlocks, by design.
pub trait ProcessGroup: Send {
    /// This rank's id within the group.
    fn id(&self) -> usize;

    /// An identifier for the group itself.
    fn group_id(&self) -> usize;

    /// The rank of the group's root.
    fn root_id(&self) -> usize {
        0
    }

    /// Number of ranks in the group.
    fn size(&self) -> usize;

    /// True on the root rank.
    fn is_root(&self) -> bool {
        self.id() == self.root_id()
    }

    /// True if `rank` is a member of this group.
    fn belongs(&self, rank: usize) -> bool {
        rank < self.size()
    }

    /// This rank's role in the collection's division of labor.
    fn role(&self) -> Role;

    /// Assign this rank's role.
    fn set_role(&mut self, role: Role);

    /// A second handle onto the same group membership.
    fn duplicate(&self) -> Box<dyn ProcessGroup>;

    /// Form a subgroup from the given ranks of this group.
    ///
    /// Every named rank must call this with the identical member list;
    /// the caller must be one of the members. Local ranks in the new
    /// group follow the order of `members`.
    fn subgroup(&self, members: &[usize]) -> Result<Box<dyn ProcessGroup>, GroupError>;

    /// Collective barrier across the whole group.
    fn sync(&self);

    /// Send a buffer of f64 values to `dest`.
    fn send_f64s(&self, dest: usize, vals: &[f64], tag: Tag) -> Result<(), GroupError>;

    /// Receive f64 values into `buf` from `src`, or from any rank when
    /// `src` is `None`. Returns the actual source rank.
    fn receive_f64s(&self, src: Option<usize>, buf: &mut [f64], tag: Tag)
        -> Result<usize, GroupError>;

    /// Send a buffer of i32 values to `dest`.
    fn send_i32s(&self, dest: usize, vals: &[i32], tag: Tag) -> Result<(), GroupError>;

    /// Receive i32 values into `buf`; returns the actual source rank.
    fn receive_i32s(&self, src: Option<usize>, buf: &mut [i32], tag: Tag)
        -> Result<usize, GroupError>;

    /// Send a string to `dest`.
    fn send_str(&self, dest: usize, s: &str, tag: Tag) -> Result<(), GroupError>;

    /// Receive a string; returns it with the actual source rank.
    fn receive_str(&self, src: Option<usize>, tag: Tag) -> Result<(String, usize), GroupError>;
}
