//! The parcel value type and its flag/status bit-sets.
//!
//! A parcel is a point mass representing an air sample. It carries a
//! horizontal position in degrees, a vertical coordinate in the units of
//! whatever meteorological source is in use, a model time in fractional
//! days, an arbitrary scalar tag, and two small bit-sets that record
//! whether and why tracing has been suspended.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign, Not};

// =============================================================================
// ParcelFlags (user-settable tracing controls)
// =============================================================================

/// Bit-set of user-settable parcel flags.
///
/// Flags control how a parcel participates in tracing; they are set by
/// the user or by the engine when a parcel must be retired.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(transparent)]
pub struct ParcelFlags(u32);

impl ParcelFlags {
    /// No flags set; the parcel traces normally.
    pub const NONE: Self = Self(0);
    /// Do not trace this parcel any further.
    pub const NO_TRACE: Self = Self(0x01);
    /// Trace this parcel only until it catches up with the current time.
    pub const SYNC_TRACE: Self = Self(0x02);

    /// True if no flag bit is set.
    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True if every bit of `other` is set in `self`.
    #[inline]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Raw bits, for the wire format.
    #[inline]
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Reconstruct from raw wire bits.
    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }
}

impl BitOr for ParcelFlags {
    type Output = Self;
    #[inline]
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ParcelFlags {
    #[inline]
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for ParcelFlags {
    type Output = Self;
    #[inline]
    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl Not for ParcelFlags {
    type Output = Self;
    #[inline]
    fn not(self) -> Self {
        Self(!self.0)
    }
}

// =============================================================================
// ParcelStatus (engine-reported conditions)
// =============================================================================

/// Bit-set of engine-reported parcel status conditions.
///
/// Status bits record why a parcel stopped tracing; they are informational
/// and never cleared by the engine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(transparent)]
pub struct ParcelStatus(u32);

impl ParcelStatus {
    /// No status conditions.
    pub const NONE: Self = Self(0);
    /// The parcel encountered invalid or missing meteorological data.
    pub const HIT_BAD: Self = Self(0x01);
    /// The parcel left the meteorological data domain.
    pub const HIT_BDY: Self = Self(0x02);

    /// True if no status bit is set.
    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True if every bit of `other` is set in `self`.
    #[inline]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// True if any bit of `other` is set in `self`.
    #[inline]
    pub fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Raw bits, for the wire format.
    #[inline]
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Reconstruct from raw wire bits.
    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }
}

impl BitOr for ParcelStatus {
    type Output = Self;
    #[inline]
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ParcelStatus {
    #[inline]
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

// =============================================================================
// Parcel
// =============================================================================

/// A point mass traced through a wind field.
///
/// Positions are degrees east and north; the vertical coordinate is in the
/// units of the meteorological source; time is in fractional days. The
/// `tag` field is an arbitrary scalar payload carried along untouched.
///
/// Invariant: position values are finite, or [`ParcelFlags::NO_TRACE`]
/// is set.
///
/// # Example
///
/// ```
/// use windtraj::types::Parcel;
///
/// let p = Parcel::new(0.0, 0.0, 10.0);
/// assert_eq!(p.t, 0.0);
/// assert!(p.is_traceable());
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Parcel {
    /// Longitude, degrees east.
    pub lon: f64,
    /// Latitude, degrees north.
    pub lat: f64,
    /// Vertical coordinate, met-source units.
    pub z: f64,
    /// Model time, fractional days.
    pub t: f64,
    /// Arbitrary scalar payload.
    pub tag: f64,
    /// User-settable tracing controls.
    pub flags: ParcelFlags,
    /// Engine-reported conditions.
    pub status: ParcelStatus,
}

impl Parcel {
    /// Number of f64 slots in the parcel wire layout.
    pub const WIRE_REALS: usize = 5;
    /// Number of i32 slots in the parcel wire layout.
    pub const WIRE_INTS: usize = 2;

    /// Create a parcel at the given position, at time zero with no flags.
    pub const fn new(lon: f64, lat: f64, z: f64) -> Self {
        Self {
            lon,
            lat,
            z,
            t: 0.0,
            tag: 0.0,
            flags: ParcelFlags::NONE,
            status: ParcelStatus::NONE,
        }
    }

    /// True if this parcel should still be advanced.
    #[inline]
    pub fn is_traceable(&self) -> bool {
        !self.flags.contains(ParcelFlags::NO_TRACE)
            && !self.status.intersects(ParcelStatus::HIT_BAD | ParcelStatus::HIT_BDY)
    }

    /// Retire the parcel after a data fault.
    #[inline]
    pub fn mark_bad(&mut self) {
        self.status |= ParcelStatus::HIT_BAD;
        self.flags |= ParcelFlags::NO_TRACE;
    }

    /// Retire the parcel after leaving the data domain.
    #[inline]
    pub fn mark_boundary(&mut self) {
        self.status |= ParcelStatus::HIT_BDY;
        self.flags |= ParcelFlags::NO_TRACE;
    }

    /// Pack the floating-point fields in wire order.
    ///
    /// Order is fixed: lon, lat, z, t, tag. The integer fields travel
    /// separately via [`Parcel::wire_ints`].
    #[inline]
    pub fn wire_reals(&self) -> [f64; Self::WIRE_REALS] {
        [self.lon, self.lat, self.z, self.t, self.tag]
    }

    /// Pack the integer fields in wire order: flags, status.
    #[inline]
    pub fn wire_ints(&self) -> [i32; Self::WIRE_INTS] {
        [self.flags.bits() as i32, self.status.bits() as i32]
    }

    /// Reassemble a parcel from its two wire buffers.
    #[inline]
    pub fn from_wire(reals: &[f64; Self::WIRE_REALS], ints: &[i32; Self::WIRE_INTS]) -> Self {
        Self {
            lon: reals[0],
            lat: reals[1],
            z: reals[2],
            t: reals[3],
            tag: reals[4],
            flags: ParcelFlags::from_bits(ints[0] as u32),
            status: ParcelStatus::from_bits(ints[1] as u32),
        }
    }
}

impl Default for Parcel {
    fn default() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }
}

impl fmt::Display for Parcel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({:.4}, {:.4}, {:.4}) @ t={:.4}",
            self.lon, self.lat, self.z, self.t
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_parcel_is_traceable() {
        let p = Parcel::new(10.0, 20.0, 5.0);
        assert!(p.is_traceable());
        assert_eq!(p.tag, 0.0);
    }

    #[test]
    fn marked_parcel_stops_tracing() {
        let mut p = Parcel::new(0.0, 0.0, 0.0);
        p.mark_bad();
        assert!(!p.is_traceable());
        assert!(p.status.contains(ParcelStatus::HIT_BAD));
        assert!(p.flags.contains(ParcelFlags::NO_TRACE));

        let mut q = Parcel::new(0.0, 0.0, 0.0);
        q.mark_boundary();
        assert!(q.status.contains(ParcelStatus::HIT_BDY));
        assert!(!q.status.contains(ParcelStatus::HIT_BAD));
    }

    #[test]
    fn wire_constants_size_preallocated_buffers() {
        let p = Parcel::new(1.0, 2.0, 3.0);
        let reals: [f64; Parcel::WIRE_REALS] = p.wire_reals();
        let ints: [i32; Parcel::WIRE_INTS] = p.wire_ints();
        assert_eq!(reals.len(), 5);
        assert_eq!(ints.len(), 2);
    }

    #[test]
    fn wire_round_trip_preserves_all_fields() {
        let mut p = Parcel::new(-75.25, 41.5, 12.0);
        p.t = 3.75;
        p.tag = 99.0;
        p.flags |= ParcelFlags::SYNC_TRACE;
        p.status |= ParcelStatus::HIT_BDY;

        let q = Parcel::from_wire(&p.wire_reals(), &p.wire_ints());
        assert_eq!(p, q);
    }

    #[test]
    fn flag_ops_behave_like_bitsets() {
        let f = ParcelFlags::NO_TRACE | ParcelFlags::SYNC_TRACE;
        assert!(f.contains(ParcelFlags::NO_TRACE));
        assert!((f & ParcelFlags::SYNC_TRACE) == ParcelFlags::SYNC_TRACE);
        assert!((f & !ParcelFlags::NO_TRACE) == ParcelFlags::SYNC_TRACE);
    }
}
