use super::partitions::{Partition, PartitionBuilder, REMOVE};
use crate::action_log::{Action, ActionLog};
use crate::error::DiskError;
use disk_types::{PartitionCounts, PartitionTable, PartitionType};
use distinst_geometry::{gaps, Alignment, Gap};
use log::debug;
use std::path::{Path, PathBuf};

/// Contains methods that are shared between physical disks and logical (LVM) devices.
///
/// Every method here is pure in-memory bookkeeping: the planner never reads or writes an
/// actual block device, so `add_partition`/`remove_partition` only mutate the in-memory
/// partition list and the device's `ActionLog`.
pub trait DiskExt {
    const LOGICAL: bool;

    fn get_device_path(&self) -> &Path;

    fn get_partitions(&self) -> &[Partition];

    fn get_partitions_mut(&mut self) -> &mut Vec<Partition>;

    /// The total addressable size of the device, in bytes.
    fn get_size(&self) -> u64;

    fn get_table_type(&self) -> Option<PartitionTable>;

    fn action_log(&self) -> &ActionLog;

    fn action_log_mut(&mut self) -> &mut ActionLog;

    fn is_logical(&self) -> bool { Self::LOGICAL }

    /// A stable numeric identity for this device, used only to tie-break gap comparisons
    /// across multiple disks. Physical disks and logical devices each derive this from their
    /// device path.
    fn device_id(&self) -> u64 {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        self.get_device_path().hash(&mut hasher);
        hasher.finish()
    }

    fn extended_exists(&self) -> bool {
        self.get_partitions().iter().any(|p| p.part_type == PartitionType::Extended)
    }

    /// Computes the free space on this device as a set of byte-addressed gaps.
    fn gaps(&self, alignment: Alignment) -> Vec<Gap> {
        let extents: Vec<_> = self
            .get_partitions()
            .iter()
            .filter(|p| !p.flag_is_enabled(REMOVE))
            .map(|p| distinst_geometry::PartitionExtent { offset: p.offset, size: p.size, part_type: p.part_type })
            .collect();

        gaps(self.device_id(), self.get_size(), alignment, &extents)
    }

    /// Returns the first partition whose offset is after the given byte offset.
    fn get_partition_after(&self, offset: u64) -> Option<&Partition> {
        self.get_partitions().iter().filter(|p| !p.flag_is_enabled(REMOVE)).find(|p| p.offset > offset)
    }

    fn get_partition(&self, number: i32) -> Option<&Partition> {
        self.get_partitions().iter().find(|p| p.number == number)
    }

    fn get_partition_mut(&mut self, number: i32) -> Option<&mut Partition> {
        self.get_partitions_mut().iter_mut().find(|p| p.number == number)
    }

    /// If a given byte range overlaps a pre-existing, non-removed, non-extended partition,
    /// that partition's number is returned to signal the conflict.
    fn overlaps_region(&self, start: u64, end: u64) -> Option<i32> {
        self.get_partitions()
            .iter()
            .filter(|part| !part.flag_is_enabled(REMOVE))
            .filter(|part| part.part_type != PartitionType::Extended)
            .find(|part| part.sectors_overlap(start, end))
            .map(|part| part.number)
    }

    /// Assigns the next available partition number for the given partition type.
    ///
    /// MSDOS numbers logicals starting at 5, mirroring the kernel's own convention;
    /// everything else (primary, extended, and all GPT partitions) is numbered sequentially.
    fn next_partition_number(&self, part_type: PartitionType) -> i32 {
        if part_type == PartitionType::Logical {
            let max = self.get_partitions().iter().filter(|p| p.part_type == PartitionType::Logical).map(|p| p.number).max();
            return max.map_or(5, |n| n + 1);
        }

        let max = self
            .get_partitions()
            .iter()
            .filter(|p| p.part_type != PartitionType::Logical)
            .map(|p| p.number)
            .max();
        max.map_or(1, |n| n + 1)
    }

    /// Adds a new partition to the in-memory partition list.
    ///
    /// An error occurs if the partition overlaps another, exceeds the size of the disk, or
    /// would exceed the primary-partition budget of an MSDOS table.
    fn add_partition(&mut self, mut builder: PartitionBuilder) -> Result<(), DiskError> {
        if !Self::LOGICAL && builder.part_type != PartitionType::Extended {
            if let Some(id) = self.overlaps_region(builder.offset, builder.offset + builder.size) {
                debug!("add_partition: {:?} overlaps existing partition {}", self.get_device_path(), id);
                return Err(DiskError::SectorOverlaps { id });
            }
        }

        if Self::LOGICAL {
            let used: u64 = self.get_partitions().iter().filter(|p| !p.flag_is_enabled(REMOVE)).map(|p| p.size).sum();
            if self.get_size() < used + builder.size {
                debug!("add_partition: {:?} would exceed device capacity", self.get_device_path());
                return Err(DiskError::PartitionOOB);
            }
        } else if self.get_size() < builder.offset + builder.size {
            debug!("add_partition: {:?} would exceed device capacity", self.get_device_path());
            return Err(DiskError::PartitionOOB);
        }

        if let Some(table) = self.get_table_type() {
            let counts = PartitionCounts::count(self.get_partitions().iter().filter(|p| !p.flag_is_enabled(REMOVE)).map(|p| p.part_type));
            match disk_types::supports_additional_partition_type(table, builder.part_type, counts) {
                Ok(()) => (),
                Err(disk_types::PartitionTableError::PrimaryPartitionsExceeded) => {
                    builder.part_type = PartitionType::Logical;
                }
                Err(why) => return Err(DiskError::from(why)),
            }
        }

        if builder.part_type == PartitionType::Logical && !self.extended_exists() {
            let extended_end = self
                .get_partition_after(builder.offset)
                .map_or(self.get_size(), |part| part.offset);

            let mut extended = PartitionBuilder::new(builder.offset, extended_end - builder.offset, None::<disk_types::FileSystem>).build();
            extended.part_type = PartitionType::Extended;
            extended.number = self.next_partition_number(PartitionType::Extended);
            self.get_partitions_mut().push(extended);

            builder.offset += distinst_geometry::Alignment::standard().logical_spacer;
        }

        let number = self.next_partition_number(builder.part_type);
        let device = self.get_device_path().to_path_buf();
        let (offset, size, filesystem) = (builder.offset, builder.size, builder.filesystem);
        let mut partition = builder.build();
        partition.number = number;

        self.get_partitions_mut().push(partition);
        self.action_log_mut().push(Action::AddPartition { device, offset, size, filesystem });
        Ok(())
    }

    /// Marks a partition for removal from the table.
    fn remove_partition(&mut self, number: i32) -> Result<(), DiskError> {
        self.get_partition_mut(number).ok_or(DiskError::PartitionNotFound { partition: number })?.remove();
        let device = self.get_device_path().to_path_buf();
        self.action_log_mut().push(Action::RemovePartition { device, number });
        Ok(())
    }

    /// Requests that the given partition be formatted with a new file system.
    fn format_partition(&mut self, number: i32, fs: disk_types::FileSystem) -> Result<(), DiskError> {
        self.get_partition_mut(number).ok_or(DiskError::PartitionNotFound { partition: number })?.format_with(fs);
        let device = self.get_device_path().to_path_buf();
        self.action_log_mut().push(Action::FormatPartition { device, number, filesystem: fs });
        Ok(())
    }

    /// Shrinks or grows a partition to the given byte size, so long as it does not collide
    /// with a neighboring partition or the end of the disk.
    fn resize_partition(&mut self, number: i32, new_size: u64) -> Result<(), DiskError> {
        let (offset, disk_size) = (self.get_partitions().iter().find(|p| p.number == number).map(|p| p.offset).ok_or(DiskError::PartitionNotFound { partition: number })?, self.get_size());

        if offset + new_size > disk_size {
            debug!("resize_partition: {} on {:?} would exceed device capacity", number, self.get_device_path());
            return Err(DiskError::PartitionOOB);
        }

        if let Some(id) = self.overlaps_region(offset, offset + new_size).filter(|&id| id != number) {
            debug!("resize_partition: {} on {:?} collides with partition {}", number, self.get_device_path(), id);
            return Err(DiskError::SectorOverlaps { id });
        }

        let partition = self.get_partition_mut(number).ok_or(DiskError::PartitionNotFound { partition: number })?;
        partition.size = new_size;
        partition.flag_enable(super::partitions::RESIZE);
        let device = self.get_device_path().to_path_buf();
        self.action_log_mut().push(Action::ResizePartition { device, number, new_size });
        Ok(())
    }
}

/// Finds the disk and partition whose mount point matches `target`, across a slice of devices.
pub fn find_partition<'a, T: DiskExt>(disks: &'a [T], target: &Path) -> Option<(&'a Path, &'a Partition)> {
    disks.iter().find_map(|disk| {
        disk.get_partitions()
            .iter()
            .find(|p| p.mount_point.as_deref() == Some(target))
            .map(|p| (disk.get_device_path(), p))
    })
}

/// Mutable variant of [`find_partition`].
pub fn find_partition_mut<'a, T: DiskExt>(disks: &'a mut [T], target: &Path) -> Option<(PathBuf, &'a mut Partition)> {
    for disk in disks {
        let path = disk.get_device_path().to_path_buf();
        if let Some(partition) = disk.get_partitions_mut().iter_mut().find(|p| p.mount_point.as_deref() == Some(target.as_ref() as &Path)) {
            return Some((path, partition));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use disk_types::FileSystem;

    struct TestDisk {
        path: PathBuf,
        size: u64,
        table: Option<PartitionTable>,
        partitions: Vec<Partition>,
        action_log: ActionLog,
    }

    impl DiskExt for TestDisk {
        const LOGICAL: bool = false;
        fn get_device_path(&self) -> &Path { &self.path }
        fn get_partitions(&self) -> &[Partition] { &self.partitions }
        fn get_partitions_mut(&mut self) -> &mut Vec<Partition> { &mut self.partitions }
        fn get_size(&self) -> u64 { self.size }
        fn get_table_type(&self) -> Option<PartitionTable> { self.table }
        fn action_log(&self) -> &ActionLog { &self.action_log }
        fn action_log_mut(&mut self) -> &mut ActionLog { &mut self.action_log }
    }

    const MIB: u64 = 1024 * 1024;
    const GIB: u64 = 1024 * MIB;

    fn empty_disk() -> TestDisk {
        TestDisk { path: "/dev/sdz".into(), size: 20 * GIB, table: Some(PartitionTable::Gpt), partitions: Vec::new(), action_log: ActionLog::new() }
    }

    #[test]
    fn add_partition_assigns_sequential_numbers() {
        let mut disk = empty_disk();
        disk.add_partition(PartitionBuilder::new(MIB, 500 * MIB, FileSystem::Fat32)).unwrap();
        disk.add_partition(PartitionBuilder::new(501 * MIB, 2 * GIB, FileSystem::Ext4)).unwrap();
        assert_eq!(disk.get_partitions()[0].number, 1);
        assert_eq!(disk.get_partitions()[1].number, 2);
    }

    #[test]
    fn add_partition_rejects_overlap() {
        let mut disk = empty_disk();
        disk.add_partition(PartitionBuilder::new(MIB, 500 * MIB, FileSystem::Fat32)).unwrap();
        let result = disk.add_partition(PartitionBuilder::new(MIB, 10 * MIB, FileSystem::Ext4));
        assert!(result.is_err());
    }

    #[test]
    fn add_partition_rejects_out_of_bounds() {
        let mut disk = empty_disk();
        let result = disk.add_partition(PartitionBuilder::new(MIB, disk.size, FileSystem::Ext4));
        assert!(result.is_err());
    }

    #[test]
    fn add_partition_appends_to_action_log() {
        let mut disk = empty_disk();
        disk.add_partition(PartitionBuilder::new(MIB, 500 * MIB, FileSystem::Fat32)).unwrap();
        assert_eq!(disk.action_log().entries().len(), 1);
        disk.remove_partition(1).unwrap();
        assert_eq!(disk.action_log().entries().len(), 2);
    }

    #[test]
    fn resize_partition_detects_collision() {
        let mut disk = empty_disk();
        disk.add_partition(PartitionBuilder::new(MIB, 500 * MIB, FileSystem::Fat32)).unwrap();
        disk.add_partition(PartitionBuilder::new(501 * MIB, GIB, FileSystem::Ext4)).unwrap();
        assert!(disk.resize_partition(1, GIB).is_err());
        assert!(disk.resize_partition(1, 400 * MIB).is_ok());
    }
}
