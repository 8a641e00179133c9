//! Ties every component together behind the shape an HTTP transport would dispatch onto with no
//! translation logic of its own. Grounded in `original_source/subiquity/server/controllers/
//! filesystem.py`'s `FilesystemController` method list (`GET`/`POST`, `reset_POST`,
//! `v2_guided_GET`/`POST`, `v2_add_partition_POST`, `v2_edit_partition_POST`,
//! `v2_delete_partition_POST`, `has_rst_GET`, `has_bitlocker_GET`).

use crate::autoinstall::{self, AutoinstallLayout};
use crate::config::Config;
use crate::errors::PlannerError;
use crate::guided::{self, GuidedChoiceV2};
use crate::scenario::{self, Scenario};
use crate::variation::VariationCatalog;
use disk_types::{FileSystem, PartitionTable};
use distinst_bootloader::Bootloader;
use distinst_disks::config::{DiskExt, PartitionBuilder};
use distinst_disks::recovery_key::RecoveryKeyHandler;
use distinst_disks::{Action, DiskError, Disks};
use distinst_geometry::{largest_gap, Alignment, GeometryError};
use distinst_probe_coordinator::{ProbeCoordinator, ProbeSnapshot, ProbeState};
use log::info;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// What `GET storage` hands back: the current plan plus whether a probe is still outstanding.
#[derive(Debug, Clone)]
pub struct StorageResponse {
    pub disks: Disks,
    pub probe_state: ProbeState,
}

/// The root object a transport layer would hold one of per installer session.
pub struct Planner {
    pub config: Config,
    pub catalog: VariationCatalog,
    pub firmware: Bootloader,
    pub third_party_drivers: bool,
    /// The probed generation: rebuilt from whatever `ProbeSnapshot` the coordinator last
    /// applied, never mutated by a guided choice or a manual edit.
    pub original: Disks,
    /// The working generation: starts as a copy of `original` and accumulates every guided
    /// choice and manual edit, each recorded in its devices' `ActionLog`s.
    pub disks: Disks,
    pub probe: Arc<ProbeCoordinator>,
}

impl Planner {
    pub fn new(config: Config, catalog: VariationCatalog, firmware: Bootloader, third_party_drivers: bool) -> Planner {
        let probe = Arc::new(ProbeCoordinator::new(config.probe.clone()));
        Planner { config, catalog, firmware, third_party_drivers, original: Disks::default(), disks: Disks::default(), probe }
    }

    /// Rebuilds `original` from whatever the probe coordinator has currently applied, without
    /// touching the working generation. Called once a probe completes and before the first
    /// `reset`, so `original` reflects real hardware rather than an empty default.
    pub fn load_probe(&mut self) {
        if let Some(snapshot) = self.probe.snapshot() {
            info!("planner: loading probed snapshot into the original generation");
            self.original = Disks::from_snapshot(&snapshot.blockdev);
        }
    }

    /// `GET storage`.
    pub fn storage(&self) -> StorageResponse {
        StorageResponse { disks: self.disks.clone(), probe_state: self.probe.state() }
    }

    /// `POST storage`. Rejects a replacement that drops a source partition outright rather than
    /// marking it for removal (`Disk::validate_layout`), and any logical-device constraint
    /// violation, before committing.
    pub fn replace_storage(&mut self, disks: Disks) -> Result<(), PlannerError> {
        for existing in &self.disks.physical {
            let replacement = disks
                .get_physical_device(&existing.device_path)
                .ok_or_else(|| DiskError::DiskGet { device: existing.device_path.clone() })?;
            existing.validate_layout(replacement)?;
        }
        disks.validate_logical_devices()?;
        self.disks = disks;
        Ok(())
    }

    /// `reset`. Drops every pending edit and unlocks the probe coordinator, applying whatever
    /// probe result was queued behind the lock. The working generation is rebuilt from
    /// `original`, rebuilding `original` itself first if a queued or newly unlocked probe result
    /// is available.
    pub fn reset(&mut self) {
        info!("planner: reset");
        if let Some(snapshot) = self.probe.reset() {
            self.original = Disks::from_snapshot(&snapshot.blockdev);
        }
        self.disks = self.original.clone();
    }

    /// `v2/guided GET`.
    pub fn guided_scenarios(&self) -> Vec<Scenario> {
        scenario::available_targets(&self.disks, &self.catalog, self.firmware, self.third_party_drivers)
    }

    /// `v2/guided POST`.
    pub fn guided(&mut self, choice: GuidedChoiceV2) -> Result<(), PlannerError> {
        guided::guided(&mut self.disks, &self.catalog, self.firmware, choice)
    }

    /// Applies an autoinstall-declared layout, translating it into a `GuidedChoiceV2` first.
    pub fn apply_autoinstall(&mut self, layout: &AutoinstallLayout) -> Result<(), PlannerError> {
        autoinstall::run_autoinstall_guided(&mut self.disks, &self.catalog, layout)
    }

    /// `v2/reformat_disk`.
    pub fn reformat_disk(&mut self, device_path: &Path) -> Result<(), PlannerError> {
        let disk = self.disks.get_physical_device_mut(device_path).ok_or_else(|| DiskError::DiskGet { device: device_path.to_path_buf() })?;
        disk.mklabel(disk.table_type.unwrap_or(PartitionTable::Gpt));
        Ok(())
    }

    /// `v2/add_boot_partition`: drops whatever partitions the active firmware needs for
    /// bootability into the disk's largest remaining gap.
    pub fn add_boot_partition(&mut self, device_path: &Path) -> Result<(), PlannerError> {
        let disk = self.disks.get_physical_device_mut(device_path).ok_or_else(|| DiskError::DiskGet { device: device_path.to_path_buf() })?;
        let gap = largest_gap(&disk.gaps(Alignment::standard())).ok_or(GeometryError::GapNotFound { offset: 0 })?;

        if let Some(plan) = distinst_bootloader::plan_boot(disk, self.firmware, gap.offset, gap.size) {
            plan.mutate(disk)?;
        }
        Ok(())
    }

    /// `v2/add_partition`.
    pub fn add_partition(&mut self, device_path: &Path, builder: PartitionBuilder) -> Result<(), PlannerError> {
        let disk = self.disks.get_physical_device_mut(device_path).ok_or_else(|| DiskError::DiskGet { device: device_path.to_path_buf() })?;
        disk.add_partition(builder)?;
        Ok(())
    }

    /// `v2/edit_partition`. Each field is applied only when present; any combination may be
    /// supplied in one call, matching the original's single merged edit request.
    pub fn edit_partition(
        &mut self,
        device_path: &Path,
        number: i32,
        new_size: Option<u64>,
        format_with: Option<FileSystem>,
        mount_point: Option<PathBuf>,
    ) -> Result<(), PlannerError> {
        let disk = self.disks.get_physical_device_mut(device_path).ok_or_else(|| DiskError::DiskGet { device: device_path.to_path_buf() })?;

        if let Some(size) = new_size {
            disk.resize_partition(number, size)?;
        }
        if let Some(fs) = format_with {
            disk.format_partition(number, fs)?;
        }
        if let Some(mount) = mount_point {
            let device = disk.device_path.clone();
            let partition = disk.get_partition_mut(number).ok_or(DiskError::PartitionNotFound { partition: number })?;
            partition.set_mount(mount.clone());
            disk.action_log.push(Action::SetMountPoint { device, number, target: mount });
        }
        Ok(())
    }

    /// `v2/delete_partition`.
    pub fn delete_partition(&mut self, device_path: &Path, number: i32) -> Result<(), PlannerError> {
        let disk = self.disks.get_physical_device_mut(device_path).ok_or_else(|| DiskError::DiskGet { device: device_path.to_path_buf() })?;
        disk.remove_partition(number)?;
        Ok(())
    }

    /// `v2/ensure_transaction`: latches `locked_probe_data`, so a probe result that lands mid-edit
    /// is queued rather than applied.
    pub fn ensure_transaction(&self) {
        self.probe.ensure_transaction();
    }

    /// `has_rst`. Reads the same sysfs marker the original inspects: an NVMe drive remapped
    /// behind Intel Rapid Storage Technology's fake-RAID controller exposes a positive
    /// `remapped_nvme` counter under its `ahci` driver directory.
    pub fn has_rst(&self) -> bool {
        let driver_dir = Path::new("/sys/module/ahci/drivers/pci:ahci");
        let entries = match std::fs::read_dir(driver_dir) {
            Ok(entries) => entries,
            Err(_) => return false,
        };

        for entry in entries.flatten() {
            let marker = entry.path().join("remapped_nvme");
            if let Ok(contents) = std::fs::read_to_string(&marker) {
                if contents.trim().parse::<u64>().unwrap_or(0) > 0 {
                    return true;
                }
            }
        }
        false
    }

    /// `has_bitlocker`. `FileSystem` (the in-memory partition model) has no BitLocker variant of
    /// its own -- that file-system name only ever appears in a live probe's raw `blockdev`
    /// attributes, so this inspects the snapshot directly rather than the planned partitions.
    pub fn has_bitlocker(&self, snapshot: &ProbeSnapshot) -> Vec<PathBuf> {
        snapshot
            .blockdev
            .iter()
            .filter(|(_, attrs)| attrs.get("FSTYPE").and_then(|v| v.as_str()) == Some("BitLocker"))
            .map(|(device, _)| PathBuf::from(device))
            .collect()
    }

    /// `generate_recovery_key`.
    pub fn generate_recovery_key(&self, volume_group: &str) -> RecoveryKeyHandler {
        let mut handler = RecoveryKeyHandler::for_volume_group(volume_group);
        handler.destination = self.config.recovery_key_dir.clone();
        handler
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variation::VariationInfo;
    use disk_types::PartitionTable as PT;
    use distinst_disks::config::Disk;

    const MIB: u64 = 1024 * 1024;
    const GIB: u64 = 1024 * MIB;

    fn planner() -> Planner {
        Planner::new(Config::default(), VariationCatalog::new(vec![VariationInfo::classic("ubuntu", 5 * GIB)]), Bootloader::Efi, false)
    }

    #[test]
    fn reset_reloads_the_original_generation_when_no_probe_is_queued() {
        let mut planner = planner();
        planner.original.add(Disk::new("/dev/sdz".into(), "Test".into(), "123".into(), 20 * GIB, Some(PT::Gpt)));
        planner.disks = planner.original.clone();

        let mut edited = Disk::new("/dev/sdy".into(), "Scratch".into(), "456".into(), 5 * GIB, Some(PT::Gpt));
        edited.add_partition(PartitionBuilder::new(MIB, GIB, FileSystem::Ext4)).unwrap();
        planner.disks.add(edited);
        assert_eq!(planner.disks.physical.len(), 2);

        planner.reset();
        assert_eq!(planner.disks, planner.original);
        assert_eq!(planner.disks.physical.len(), 1);
    }

    #[test]
    fn reformat_disk_wipes_partitions() {
        let mut planner = planner();
        let mut disk = Disk::new("/dev/sdz".into(), "Test".into(), "123".into(), 20 * GIB, Some(PT::Gpt));
        disk.add_partition(PartitionBuilder::new(MIB, GIB, FileSystem::Ext4)).unwrap();
        planner.disks.add(disk);

        planner.reformat_disk(Path::new("/dev/sdz")).unwrap();
        assert!(planner.disks.get_physical_device("/dev/sdz").unwrap().partitions.is_empty());
    }

    #[test]
    fn delete_partition_on_missing_disk_is_an_error() {
        let mut planner = planner();
        assert!(planner.delete_partition(Path::new("/dev/sdz"), 1).is_err());
    }

    #[test]
    fn has_bitlocker_reads_raw_probe_fstype() {
        let planner = planner();
        let mut snapshot = ProbeSnapshot::default();
        let mut attrs = serde_json::Map::new();
        attrs.insert("FSTYPE".to_string(), serde_json::Value::String("BitLocker".to_string()));
        snapshot.blockdev.insert("/dev/sda3".to_string(), serde_json::Value::Object(attrs));

        let disks = planner.has_bitlocker(&snapshot);
        assert_eq!(disks, vec![PathBuf::from("/dev/sda3")]);
    }

    #[test]
    fn has_rst_is_false_without_the_sysfs_marker() {
        let planner = planner();
        assert!(!planner.has_rst());
    }

    #[test]
    fn generate_recovery_key_uses_configured_destination() {
        let mut planner = planner();
        planner.config.recovery_key_dir = Some(PathBuf::from("/tmp/keys"));
        let handler = planner.generate_recovery_key("ubuntu-vg");
        assert_eq!(handler.destination, Some(PathBuf::from("/tmp/keys")));
        assert_eq!(handler.filename(), "recovery-key-ubuntu-vg.txt");
    }
}
