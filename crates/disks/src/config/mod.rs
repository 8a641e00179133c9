//! The in-memory Device Model (spec C2): disks, partitions, and LVM volume groups, along with
//! the traits and helpers shared between physical and logical block devices.

pub mod arbitrary;
pub mod disk;
pub mod disk_trait;
pub mod disks;
pub mod lvm;
pub mod partitions;
pub mod raid;

pub use self::arbitrary::ArbitraryDevice;
pub use self::disk::Disk;
pub use self::disk_trait::{find_partition, find_partition_mut, DiskExt};
pub use self::disks::Disks;
pub use self::lvm::{generate_unique_id, LvmDevice};
pub use self::partitions::*;
pub use self::raid::{Raid, RaidLevel};
pub use disk_types::PartitionTable;
