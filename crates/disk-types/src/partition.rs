use serde::{Deserialize, Serialize};

/// Defines whether the partition is a primary, logical, or extended partition.
///
/// # Note
///
/// This only applies for MBR partition tables.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Serialize, Deserialize)]
pub enum PartitionType {
    Primary,
    Logical,
    Extended,
}

/// A single-purpose marker carried by a partition: at most one of these applies at a time.
///
/// Grounded in `libparted::PartitionFlag`, reduced to the subset this planner ever derives or
/// assigns (it performs no real partition-table I/O, so the dozens of cosmetic libparted flags
/// that only matter to `parted` itself are not represented).
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Serialize, Deserialize)]
pub enum PartitionFlag {
    Boot,
    BiosGrub,
    Esp,
    Msftres,
    LvmMember,
    LuksMember,
}

impl PartitionFlag {
    /// True if this flag marks the partition as a UEFI system partition.
    pub fn is_esp(self) -> bool { self == PartitionFlag::Esp }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn esp_flag_recognized() {
        assert!(PartitionFlag::Esp.is_esp());
        assert!(!PartitionFlag::Boot.is_esp());
    }
}
