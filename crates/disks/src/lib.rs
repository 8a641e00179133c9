//! In-memory disk, partition, LVM, and ZFS device model for the guided storage planner.
//!
//! Unlike the teacher crate this one began as, nothing here performs block-device I/O: every
//! type is a plan that an external action executor would later carry out. `DiskError` exists to
//! catch a violated invariant before it reaches that executor, never to report a failed syscall.

#[macro_use]
extern crate failure_derive;

pub mod action_log;
pub mod config;
pub mod core_boot;
mod error;
pub mod recovery_key;
pub mod zfs;

pub use self::action_log::{Action, ActionLog};
pub use self::config::*;
pub use self::error::{DiskError, PartitionError, PartitionSizeError};
pub use disk_types::PartitionFlag;
