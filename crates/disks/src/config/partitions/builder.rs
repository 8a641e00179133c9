use super::{Partition, FORMAT};
use crate::recovery_key::LuksEncryption;
use disk_types::{FileSystem, PartitionFlag, PartitionType};
use std::path::PathBuf;

/// Partition builders are supplied as inputs to `Disk::add_partition`.
pub struct PartitionBuilder {
    pub offset: u64,
    pub size: u64,
    pub filesystem: Option<FileSystem>,
    pub part_type: PartitionType,
    pub name: Option<String>,
    pub flag: Option<PartitionFlag>,
    pub type_guid: Option<uuid::Uuid>,
    pub mount: Option<PathBuf>,
    pub volume_group: Option<(String, Option<LuksEncryption>)>,
}

impl PartitionBuilder {
    /// Creates a new partition builder spanning `[offset, offset + size)`.
    pub fn new<O: Into<Option<FileSystem>>>(offset: u64, size: u64, fs: O) -> PartitionBuilder {
        PartitionBuilder {
            offset,
            size,
            filesystem: fs.into(),
            part_type: PartitionType::Primary,
            name: None,
            flag: None,
            type_guid: None,
            mount: None,
            volume_group: None,
        }
    }

    /// Defines a label for the new partition.
    pub fn name(mut self, name: String) -> PartitionBuilder {
        self.name = Some(name);
        self
    }

    /// Defines whether the partition shall be a logical, primary, or extended partition.
    pub fn partition_type(mut self, part_type: PartitionType) -> PartitionBuilder {
        self.part_type = part_type;
        self
    }

    /// Sets the partition's single marker flag (spec: `boot`, `bios_grub`, `esp`, `msftres`).
    pub fn flag(mut self, flag: PartitionFlag) -> PartitionBuilder {
        self.flag = Some(flag);
        self
    }

    /// Sets the GPT partition type GUID.
    pub fn type_guid(mut self, guid: uuid::Uuid) -> PartitionBuilder {
        self.type_guid = Some(guid);
        self
    }

    /// Specifies where the new partition should be mounted.
    pub fn mount(mut self, mount: PathBuf) -> PartitionBuilder {
        self.mount = Some(mount);
        self
    }

    /// Assigns the new partition to an LVM volume group, which may optionally be encrypted.
    pub fn logical_volume(mut self, group: String, encryption: Option<LuksEncryption>) -> PartitionBuilder {
        self.volume_group = Some((group, encryption));
        self
    }

    /// Builds a brand new `Partition` from the current state of the builder.
    pub fn build(self) -> Partition {
        let (lvm_vg, encryption, filesystem) = match self.volume_group {
            Some((group, Some(enc))) => (Some(group), Some(enc), Some(FileSystem::Luks)),
            Some((group, None)) => (Some(group), None, Some(FileSystem::Lvm)),
            None => (None, None, self.filesystem),
        };

        Partition {
            bitflags: FORMAT,
            number: -1,
            offset: self.offset,
            size: self.size,
            part_type: self.part_type,
            flag: self.flag,
            type_guid: self.type_guid,
            filesystem,
            mount_point: self.mount,
            name: self.name,
            estimated_min_size: None,
            lvm_vg,
            encryption,
        }
    }
}
