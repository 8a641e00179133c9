//! Shared vocabulary types for describing disks, partitions, and file systems.
//!
//! This crate carries no device-I/O code: it is pure data plus the small amount of
//! validation logic (size bounds, partition-table capacity) that is independent of
//! any particular probing or execution backend.

#[macro_use]
extern crate failure_derive;

mod fs;
mod partition;
mod table;

pub use self::fs::*;
pub use self::partition::*;
pub use self::table::*;
