//! Strongly-typed domain types for safer APIs.
//!
//! This module provides the parcel value type and its flag/status
//! bit-sets, including the fixed wire layout used for message passing.
//!
//! # Example
//!
//! ```
//! use windtraj::types::{Parcel, ParcelFlags};
//!
//! let mut p = Parcel::new(-75.0, 40.0, 10.0);
//! p.tag = 3.0;
//! assert!(p.is_traceable());
//!
//! p.flags |= ParcelFlags::NO_TRACE;
//! assert!(!p.is_traceable());
//! ```

mod parcel;

pub use parcel::{Parcel, ParcelFlags, ParcelStatus};
