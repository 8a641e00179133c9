mod builder;

pub use self::builder::PartitionBuilder;
use crate::recovery_key::LuksEncryption;
use disk_types::{FileSystem, PartitionFlag, PartitionType};
use std::path::PathBuf;

// Defines that this partition exists in the original probed snapshot.
pub const SOURCE: u8 = 0b000_0001;
// Defines that this partition will be removed.
pub const REMOVE: u8 = 0b000_0010;
// Defines that this partition will be formatted.
pub const FORMAT: u8 = 0b000_0100;
// Defines that the partition is immovable -- currently mounted, or otherwise in active use.
pub const IN_USE: u8 = 0b000_1000;
// Defines that the partition is marked not to be wiped even on a Reformat.
pub const PRESERVE: u8 = 0b001_0000;
// Defines that a resize has been requested for this partition.
pub const RESIZE: u8 = 0b010_0000;

/// One entry in a disk's partition list, in-memory only: no field here ever reflects a real
/// disk read, and no method performs I/O. Offsets and sizes are byte quantities, never
/// sectors, since this planner never probes a sector size. The append-only record of how a
/// partition list reached its current state lives separately, in `ActionLog`.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    pub bitflags: u8,
    /// The partition number, as it would appear appended to the disk's device path.
    pub number: i32,
    /// Physical placement on the disk.
    pub offset: u64,
    pub size: u64,
    pub part_type: PartitionType,
    /// `None` means "no specific marker" in spec terms (`boot`, `esp`, ... or none).
    pub flag: Option<PartitionFlag>,
    /// The partition type GUID, for GPT disks.
    pub type_guid: Option<uuid::Uuid>,
    pub filesystem: Option<FileSystem>,
    pub mount_point: Option<PathBuf>,
    pub name: Option<String>,
    /// The smallest size this partition could be shrunk to, if known.
    pub estimated_min_size: Option<u64>,
    pub lvm_vg: Option<String>,
    pub encryption: Option<LuksEncryption>,
}

impl Partition {
    pub fn end(&self) -> u64 { self.offset + self.size }

    pub fn flag_is_enabled(&self, flag: u8) -> bool { self.bitflags & flag != 0 }

    pub fn flag_enable(&mut self, flag: u8) { self.bitflags |= flag; }

    pub fn flag_disable(&mut self, flag: u8) { self.bitflags &= 255 ^ flag; }

    pub fn is_in_use(&self) -> bool { self.flag_is_enabled(IN_USE) }

    pub fn is_preserved(&self) -> bool { self.flag_is_enabled(PRESERVE) }

    pub fn is_esp_partition(&self) -> bool {
        self.flag == Some(PartitionFlag::Esp)
            && matches!(self.filesystem, Some(FileSystem::Fat16) | Some(FileSystem::Fat32))
    }

    pub fn is_linux_compatible(&self) -> bool {
        match self.filesystem {
            Some(FileSystem::Exfat | FileSystem::Ntfs | FileSystem::Fat16 | FileSystem::Fat32
                | FileSystem::Lvm | FileSystem::Luks | FileSystem::Swap) => false,
            Some(_) => true,
            None => false,
        }
    }

    /// True if the given offset range overlaps this partition's extent.
    pub fn sectors_overlap(&self, start: u64, end: u64) -> bool {
        !((start < self.offset && end < self.offset) || (start > self.end() && end > self.end()))
    }

    pub fn sectors_differ_from(&self, other: &Partition) -> bool {
        self.offset != other.offset || self.size != other.size
    }

    /// True if the compared partition has differing parameters from the source.
    pub fn requires_changes(&self, other: &Partition) -> bool {
        self.sectors_differ_from(other)
            || self.filesystem != other.filesystem
            || self.flag != other.flag
            || other.flag_is_enabled(FORMAT)
    }

    /// True if the compared partition is the same one, by identity, as the source.
    pub fn is_same_partition_as(&self, other: &Partition) -> bool {
        self.flag_is_enabled(SOURCE) && other.flag_is_enabled(SOURCE) && self.number == other.number
    }

    /// Defines a mount target for this partition.
    pub fn set_mount(&mut self, target: PathBuf) { self.mount_point = Some(target); }

    pub fn set_volume_group(&mut self, group: String) { self.lvm_vg = Some(group); }

    pub fn set_encryption(&mut self, encryption: LuksEncryption) { self.encryption = Some(encryption); }

    /// Shrinks the partition to the new `size`, in bytes. The requested resize flag is set.
    pub fn shrink_to(&mut self, size: u64) -> Result<(), crate::error::PartitionError> {
        if size > self.size {
            return Err(crate::error::PartitionError::ShrinkValueTooHigh);
        }
        self.size = size;
        self.flag_enable(RESIZE);
        Ok(())
    }

    /// Defines that a new file system will be applied to this partition.
    /// NOTE: this also unsets the partition's name.
    pub fn format_with(&mut self, fs: FileSystem) {
        self.flag_enable(FORMAT);
        self.filesystem = Some(fs);
        self.name = None;
    }

    pub fn will_format(&self) -> bool { self.flag_is_enabled(FORMAT) }

    /// Specifies to delete this partition from the partition table.
    pub fn remove(&mut self) { self.flag_enable(REMOVE); }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    fn efi_partition() -> Partition {
        Partition {
            bitflags: SOURCE | IN_USE,
            offset: MIB,
            size: 500 * MIB,
            number: 1,
            part_type: PartitionType::Primary,
            flag: Some(PartitionFlag::Esp),
            type_guid: None,
            filesystem: Some(FileSystem::Fat32),
            mount_point: Some("/boot/efi".into()),
            name: None,
            estimated_min_size: None,
            lvm_vg: None,
            encryption: None,
        }
    }

    fn root_partition() -> Partition {
        Partition {
            bitflags: SOURCE | IN_USE,
            offset: 501 * MIB,
            size: 200_000 * MIB,
            number: 2,
            part_type: PartitionType::Primary,
            flag: None,
            type_guid: None,
            filesystem: Some(FileSystem::Ext4),
            mount_point: Some("/".into()),
            name: Some("Pop!_OS".into()),
            estimated_min_size: None,
            lvm_vg: None,
            encryption: None,
        }
    }

    fn swap_partition() -> Partition {
        Partition {
            bitflags: SOURCE,
            offset: 900_000 * MIB,
            size: 8_000 * MIB,
            number: 3,
            part_type: PartitionType::Primary,
            flag: None,
            type_guid: None,
            filesystem: Some(FileSystem::Swap),
            mount_point: None,
            name: None,
            estimated_min_size: None,
            lvm_vg: None,
            encryption: None,
        }
    }

    #[test]
    fn partition_is_esp_partition() {
        assert!(!root_partition().is_esp_partition());
        assert!(efi_partition().is_esp_partition());
    }

    #[test]
    fn partition_is_linux_compatible() {
        assert!(root_partition().is_linux_compatible());
        assert!(!swap_partition().is_linux_compatible());
        assert!(!efi_partition().is_linux_compatible());
    }

    #[test]
    fn partition_requires_changes() {
        let root = root_partition();

        let mut other = root_partition();
        assert!(!root.requires_changes(&other));
        other.offset = 0;
        assert!(root.requires_changes(&other));

        let mut formatted = root_partition();
        formatted.format_with(FileSystem::Btrfs);
        assert!(root.requires_changes(&formatted));
    }

    #[test]
    fn partition_sectors_differ_from() {
        assert!(root_partition().sectors_differ_from(&efi_partition()));
        assert!(!root_partition().sectors_differ_from(&root_partition()));
    }

    #[test]
    fn partition_is_same_as() {
        let root = root_partition();
        let dup = root.clone();
        let efi = efi_partition();

        assert!(root.is_same_partition_as(&dup));
        assert!(!root.is_same_partition_as(&efi));
    }

    #[test]
    fn shrink_rejects_growth() {
        let mut root = root_partition();
        let original_size = root.size;
        assert!(root.shrink_to(original_size + 1).is_err());
        assert!(root.shrink_to(original_size / 2).is_ok());
        assert!(root.flag_is_enabled(RESIZE));
    }
}
