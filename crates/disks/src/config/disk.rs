use super::disk_trait::DiskExt;
use super::partitions::{Partition, SOURCE};
use crate::action_log::{Action, ActionLog};
use crate::error::DiskError;
use disk_types::PartitionTable;
use distinst_geometry::Alignment;
use std::path::PathBuf;

/// A physical block device and the in-memory model of the changes a guided scenario, or a
/// manual edit, has requested against it.
///
/// Nothing on this struct is ever re-read from the device it describes: `size`, `table_type`,
/// and the initial `partitions` are populated once by the probe coordinator (C6) from a
/// snapshot, and every later mutation goes through `DiskExt`'s methods, which only append to
/// this in-memory state. Committing those changes to a real device is out of scope for this
/// crate (spec Non-goals).
#[derive(Debug, Clone, PartialEq)]
pub struct Disk {
    /// True if a new partition table should be written, discarding the probed one.
    pub mklabel: bool,
    pub model_name: String,
    pub serial: String,
    pub device_path: PathBuf,
    pub size: u64,
    pub table_type: Option<PartitionTable>,
    pub alignment: Alignment,
    pub partitions: Vec<Partition>,
    pub action_log: ActionLog,
}

impl Disk {
    pub fn new(device_path: PathBuf, model_name: String, serial: String, size: u64, table_type: Option<PartitionTable>) -> Disk {
        Disk {
            mklabel: false,
            model_name,
            serial,
            device_path,
            size,
            table_type,
            alignment: Alignment::standard(),
            partitions: Vec::new(),
            action_log: ActionLog::new(),
        }
    }

    /// Marks the disk to be completely reformatted: every partition is removed and a fresh
    /// table of the given schema is written, as performed by the `Reformat` guided target.
    pub fn mklabel(&mut self, table: PartitionTable) {
        self.mklabel = true;
        self.table_type = Some(table);
        self.partitions.clear();
        self.action_log.push(Action::Mklabel { device: self.device_path.clone(), table });
    }

    /// True if none of the disk's source partitions are mounted or otherwise in active use --
    /// the gate `Reformat` scenarios check before proposing themselves.
    pub fn is_free_of_in_use_partitions(&self) -> bool {
        self.partitions.iter().filter(|p| p.flag_is_enabled(SOURCE)).all(|p| !p.is_in_use())
    }

    /// Validates that `new` retains every source partition that `self` has, by identity.
    /// A layout that drops a source partition outright (rather than marking it for removal)
    /// has diverged from what was actually probed and must be rejected (spec §7, LayoutChanged).
    pub fn validate_layout(&self, new: &Disk) -> Result<(), DiskError> {
        for source in self.partitions.iter().filter(|p| p.flag_is_enabled(SOURCE)) {
            if !new.partitions.iter().any(|p| p.is_same_partition_as(source)) {
                return Err(DiskError::LayoutChanged);
            }
        }
        Ok(())
    }
}

impl DiskExt for Disk {
    const LOGICAL: bool = false;

    fn get_device_path(&self) -> &std::path::Path { &self.device_path }
    fn get_partitions(&self) -> &[Partition] { &self.partitions }
    fn get_partitions_mut(&mut self) -> &mut Vec<Partition> { &mut self.partitions }
    fn get_size(&self) -> u64 { self.size }
    fn get_table_type(&self) -> Option<PartitionTable> { self.table_type }
    fn action_log(&self) -> &ActionLog { &self.action_log }
    fn action_log_mut(&mut self) -> &mut ActionLog { &mut self.action_log }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::partitions::PartitionBuilder;
    use disk_types::FileSystem;

    const MIB: u64 = 1024 * 1024;
    const GIB: u64 = 1024 * MIB;

    fn sample() -> Disk {
        let mut disk = Disk::new("/dev/sdz".into(), "Test Disk".into(), "Test Disk 123".into(), 20 * GIB, Some(PartitionTable::Gpt));
        disk.add_partition(PartitionBuilder::new(MIB, 500 * MIB, FileSystem::Fat32)).unwrap();
        disk.add_partition(PartitionBuilder::new(501 * MIB, 10 * GIB, FileSystem::Ext4)).unwrap();
        for part in &mut disk.partitions {
            part.flag_enable(SOURCE);
        }
        disk
    }

    #[test]
    fn mklabel_clears_partitions() {
        let mut disk = sample();
        disk.mklabel(PartitionTable::Gpt);
        assert!(disk.partitions.is_empty());
        assert!(disk.mklabel);
        assert!(matches!(disk.action_log.entries().last(), Some(Action::Mklabel { .. })));
    }

    #[test]
    fn validate_layout_rejects_dropped_source_partition() {
        let source = sample();
        let mut new = source.clone();
        new.partitions.remove(0);
        assert!(source.validate_layout(&new).is_err());
    }

    #[test]
    fn validate_layout_allows_marked_removal() {
        let source = sample();
        let mut new = source.clone();
        new.remove_partition(1).unwrap();
        assert!(source.validate_layout(&new).is_ok());
    }

    #[test]
    fn is_free_of_in_use_partitions() {
        let mut disk = sample();
        assert!(disk.is_free_of_in_use_partitions());
        disk.partitions[0].flag_enable(super::super::partitions::IN_USE);
        assert!(!disk.is_free_of_in_use_partitions());
    }
}
