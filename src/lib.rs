//! Guided storage planner: decides what a guided (or autoinstall-declared) OS install would do
//! to local storage, and lets a caller apply or edit that plan in memory. No partition table is
//! ever written, no file system is ever created -- this crate is the Device Model and its
//! decision logic, not the executor that would later carry a plan out onto real block devices.

pub extern crate disk_types;
pub extern crate distinst_bootloader as bootloader;
pub extern crate distinst_disks as disks;
pub extern crate distinst_geometry as geometry;
pub extern crate distinst_probe_coordinator as probe_coordinator;

extern crate dirs;
extern crate failure;
#[macro_use]
extern crate failure_derive;
extern crate fern;
#[macro_use]
extern crate log;
extern crate uuid;

pub use bootloader::Bootloader;
pub use disk_types::*;
pub use disks::*;

pub mod autoinstall;
pub mod capability;
pub mod config;
pub(crate) mod errors;
pub mod guided;
mod logging;
pub mod planner;
pub mod scenario;
pub mod system;
pub mod variation;

pub use self::config::Config;
pub use self::errors::PlannerError;
pub use self::logging::log;
pub use self::planner::{Planner, StorageResponse};
