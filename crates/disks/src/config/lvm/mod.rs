use super::disk_trait::DiskExt;
use super::partitions::{Partition, REMOVE};
use crate::action_log::{Action, ActionLog};
use crate::error::DiskError;
use crate::recovery_key::LuksEncryption;
use disk_types::PartitionTable;
use std::path::{Path, PathBuf};

/// Generates a volume group name that does not collide with any name already in `taken`,
/// appending a short numeric suffix on collision. The teacher's `generate_unique_id` resolved
/// collisions against `dmlist()` (the kernel's live device-mapper table); since this planner
/// never touches a real device mapper, it resolves collisions against the in-memory set of
/// volume groups already named by earlier guided choices or probe results instead.
pub fn generate_unique_id(prefix: &str, taken: &[String]) -> String {
    if !taken.iter().any(|id| id == prefix) {
        return prefix.to_string();
    }

    for suffix in 1.. {
        let candidate = format!("{}_{}", prefix, suffix);
        if !taken.iter().any(|id| id == &candidate) {
            return candidate;
        }
    }

    unreachable!()
}

/// An LVM volume group, modeled the way `Disk` is: a block device abstraction that happens to
/// be backed by other partitions rather than a raw disk. `LOGICAL = true` changes how
/// `DiskExt::add_partition` enforces capacity (against `sectors`, not a partition-table cap).
#[derive(Debug, Clone, PartialEq)]
pub struct LvmDevice {
    pub model_name: String,
    pub volume_group: String,
    pub device_path: PathBuf,
    /// The partition, if any, that this volume group's sole physical volume lives on.
    pub luks_parent: Option<PathBuf>,
    pub size: u64,
    pub partitions: Vec<Partition>,
    pub encryption: Option<LuksEncryption>,
    /// True if this volume group was present in the original probed snapshot.
    pub is_source: bool,
    pub remove: bool,
    pub action_log: ActionLog,
}

impl DiskExt for LvmDevice {
    const LOGICAL: bool = true;

    fn get_device_path(&self) -> &Path { &self.device_path }
    fn get_partitions(&self) -> &[Partition] { &self.partitions }
    fn get_partitions_mut(&mut self) -> &mut Vec<Partition> { &mut self.partitions }
    fn get_size(&self) -> u64 { self.size }
    fn get_table_type(&self) -> Option<PartitionTable> { None }
    fn action_log(&self) -> &ActionLog { &self.action_log }
    fn action_log_mut(&mut self) -> &mut ActionLog { &mut self.action_log }
}

impl LvmDevice {
    pub fn new(volume_group: String, encryption: Option<LuksEncryption>, size: u64, is_source: bool) -> LvmDevice {
        let device_path = PathBuf::from(format!("/dev/mapper/{}", volume_group.replace('-', "--")));

        let mut action_log = ActionLog::new();
        if !is_source {
            action_log.push(Action::CreateVolumeGroup { volume_group: volume_group.clone(), encrypted: encryption.is_some() });
        }

        LvmDevice {
            model_name: format!("LVM {}", volume_group),
            volume_group,
            device_path,
            luks_parent: None,
            size,
            partitions: Vec::new(),
            encryption,
            is_source,
            remove: false,
            action_log,
        }
    }

    pub fn add_capacity(&mut self, bytes: u64) { self.size += bytes; }

    /// Every logical volume must carry a label before the plan can be considered complete,
    /// since the planner identifies logical volumes by name rather than by number.
    pub fn validate(&self) -> Result<(), DiskError> {
        if self.get_partitions().iter().any(|p| p.name.is_none()) {
            return Err(DiskError::VolumePartitionLacksLabel { device: self.get_device_path().to_path_buf() });
        }
        Ok(())
    }

    pub fn get_last_used_offset(&self) -> u64 {
        self.get_partitions().iter().filter(|p| !p.flag_is_enabled(REMOVE)).map(|p| p.end()).max().unwrap_or(0)
    }

    pub fn get_logical_volume(&self, volume: &str) -> Option<&Partition> {
        self.partitions.iter().find(|p| p.name.as_deref() == Some(volume))
    }

    pub fn get_logical_volume_mut(&mut self, volume: &str) -> Option<&mut Partition> {
        self.partitions.iter_mut().find(|p| p.name.as_deref() == Some(volume))
    }

    pub fn remove(&mut self) {
        self.remove = true;
        self.action_log.push(Action::RemoveVolumeGroup { volume_group: self.volume_group.clone() });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_unique_id_resolves_collision() {
        let taken = vec!["data".to_string()];
        assert_eq!(generate_unique_id("data", &taken), "data_1");
        assert_eq!(generate_unique_id("other", &taken), "other");
    }

    #[test]
    fn generate_unique_id_skips_multiple_collisions() {
        let taken = vec!["data".to_string(), "data_1".to_string()];
        assert_eq!(generate_unique_id("data", &taken), "data_2");
    }

    #[test]
    fn device_path_escapes_hyphens() {
        let device = LvmDevice::new("ubuntu-vg".into(), None, 10 * 1024 * 1024 * 1024, false);
        assert_eq!(device.device_path, PathBuf::from("/dev/mapper/ubuntu--vg"));
    }

    #[test]
    fn new_volume_group_logs_creation_unless_sourced_from_probe() {
        let created = LvmDevice::new("ubuntu-vg".into(), None, 10 * 1024 * 1024 * 1024, false);
        assert_eq!(created.action_log.entries().len(), 1);

        let sourced = LvmDevice::new("ubuntu-vg".into(), None, 10 * 1024 * 1024 * 1024, true);
        assert!(sourced.action_log.is_empty());
    }

    #[test]
    fn remove_logs_volume_group_removal() {
        let mut device = LvmDevice::new("ubuntu-vg".into(), None, 10 * 1024 * 1024 * 1024, true);
        device.remove();
        assert!(device.remove);
        assert!(matches!(device.action_log.entries().last(), Some(Action::RemoveVolumeGroup { .. })));
    }
}
