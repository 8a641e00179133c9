//! The guided planner's top-level dispatcher and per-capability construction algorithms (spec
//! component C7). Grounded in `original_source/subiquity/server/controllers/filesystem.py`'s
//! `guided`, `guided_direct`, `guided_lvm`, `guided_zfs`, `guided_dd`.

use crate::capability::GuidedCapability;
use crate::errors::PlannerError;
use crate::scenario::{disk_for_target, GuidedStorageTarget};
use crate::system::SystemDetails;
use crate::variation::VariationCatalog;
use disk_types::{FileSystem, PartitionFlag, PartitionTable};
use distinst_bootloader::{plan_boot, Bootloader};
use distinst_disks::config::{Disk, DiskExt, LvmDevice, PartitionBuilder};
use distinst_disks::core_boot::{self, Role, Structure};
use distinst_disks::recovery_key::{LuksEncryption, RecoveryKeyHandler};
use distinst_disks::zfs::{guided_bpool, guided_rpool};
use distinst_disks::Disks;
use distinst_geometry::{align_down, align_up, Alignment, Gap};
use log::error;
use std::str::FromStr;
use uuid::Uuid;

/// The well-known EFI System Partition GPT type GUID, used to recognize an ESP structure in an
/// external system's declared layout without hardcoding the recognition inside `core_boot`.
const ESP_TYPE_GUID: &str = "c12a7328-f81f-11d2-ba4b-00a0c93ec93b";

fn role_from_str(role: &str) -> Role {
    match role {
        "system-seed" => Role::SystemSeed,
        "system-boot" => Role::SystemBoot,
        "system-data" => Role::SystemData,
        _ => Role::Other,
    }
}

/// Translates the external system's declared volume layout into the reconciler's structure
/// list. A structure whose filesystem or type GUID string fails to parse is treated as absent
/// rather than rejecting the whole layout, since those fields are optional in the source data.
fn structures_for_system(system: &SystemDetails) -> Vec<Structure> {
    system
        .volumes
        .values()
        .flat_map(|volume| &volume.structure)
        .map(|s| Structure {
            role: role_from_str(&s.role),
            name: s.name.clone(),
            size: s.size,
            filesystem: s.filesystem.as_deref().and_then(|fs| FileSystem::from_str(fs).ok()),
            type_guid: s.gpt_type_guid.as_deref().and_then(|guid| Uuid::parse_str(guid).ok()),
            label: s.label.clone(),
            explicit_offset: s.offset,
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizingPolicy {
    Scaled,
    All,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GuidedChoiceV2 {
    pub target: GuidedStorageTarget,
    pub capability: GuidedCapability,
    pub password: Option<String>,
    pub recovery_key: Option<RecoveryKeyHandler>,
    pub sizing_policy: SizingPolicy,
    pub reset_partition: bool,
    pub reset_partition_size: Option<u64>,
    pub reset_partition_only: bool,
}

/// The minimum bootable-firmware-independent size a `/boot` partition needs for a guided LVM or
/// ZFS install; scaled up as the gap grows, capped so it never dominates a small gap.
fn get_bootfs_size(gap_size: u64) -> u64 {
    const MIN_BOOTFS: u64 = 512 * 1024 * 1024;
    const MAX_BOOTFS: u64 = 2 * 1024 * 1024 * 1024;
    (gap_size / 16).clamp(MIN_BOOTFS, MAX_BOOTFS).min(gap_size)
}

const LVM_CHUNK_SIZE: u64 = 64 * 1024 * 1024;

/// The root logical volume's size under `SCALED`: leaves headroom proportional to the volume
/// group rather than consuming it entirely, mirroring the original's `sizes.scaled_rootfs_size`.
fn scaled_rootfs_size(vg_size: u64) -> u64 {
    let scaled = vg_size - (vg_size / 5).min(100 * 1024 * 1024 * 1024);
    align_down(scaled, LVM_CHUNK_SIZE)
}

/// Suggested swap size given the space left after boot+root: a fixed 4 GiB for any disk with
/// room to spare, tapering to zero once there isn't enough slack left to justify one.
fn suggested_swapsize(avail: u64) -> u64 {
    const SWAP_SIZE: u64 = 4 * 1024 * 1024 * 1024;
    if avail < SWAP_SIZE * 2 {
        0
    } else {
        SWAP_SIZE
    }
}

const DRY_RUN_RESET_SIZE: u64 = 500 * 1024 * 1024;
const RESET_PARTITION_ALIGN: u64 = 256 * 1024 * 1024;

fn existing_volume_groups(disks: &Disks) -> Vec<String> {
    disks.logical.iter().map(|d| d.volume_group.clone()).collect()
}

/// Dispatches `target` against `disk`, mutating it and returning the gap the chosen capability
/// should install into. Mirrors `start_guided`'s per-variant behavior.
fn start_guided(target: &GuidedStorageTarget, disk: &mut Disk) -> Result<Gap, PlannerError> {
    match target {
        GuidedStorageTarget::Reformat { .. } => {
            let in_use_remains = disk.partitions.iter().any(|p| p.is_in_use());
            if in_use_remains {
                for partition in &mut disk.partitions {
                    if !partition.is_in_use() {
                        partition.remove();
                    }
                }
            } else {
                disk.mklabel(disk.table_type.unwrap_or(PartitionTable::Gpt));
            }

            let gaps = disk.gaps(Alignment::standard());
            distinst_geometry::largest_gap(&gaps).ok_or_else(|| PlannerError::Geometry { why: distinst_geometry::GeometryError::GapNotFound { offset: 0 } })
        }
        GuidedStorageTarget::UseGap { gap, .. } => {
            let gaps = disk.gaps(Alignment::standard());
            Ok(distinst_geometry::at_offset(&gaps, gap.offset)?)
        }
        GuidedStorageTarget::Resize { partition, new_size, .. } => {
            let aligned = align_up(*new_size, Alignment::standard().part_align);
            let current = disk.get_partition(*partition).ok_or(distinst_disks::DiskError::PartitionNotFound { partition: *partition })?;
            if aligned > current.size {
                return Err(distinst_disks::DiskError::PartitionOOB.into());
            }
            let offset = current.offset;
            disk.resize_partition(*partition, aligned)?;
            let gaps = disk.gaps(Alignment::standard());
            distinst_geometry::after(&gaps, offset).ok_or_else(|| PlannerError::Geometry { why: distinst_geometry::GeometryError::GapNotFound { offset } })
        }
        GuidedStorageTarget::Manual => unreachable!("guided() rejects Manual before dispatching to start_guided"),
    }
}

/// Applies the boot planner's mutation to `disk` if it supports the boot-device toggle,
/// returning the gap re-derived within the original span afterward.
fn apply_boot_plan(disk: &mut Disk, firmware: Bootloader, gap: Gap) -> Result<Gap, PlannerError> {
    if !distinst_bootloader::DeviceAction::TOGGLE_BOOT.supported(disk) {
        return Ok(gap);
    }

    let plan = match plan_boot(disk, firmware, gap.offset, gap.size) {
        Some(plan) => plan,
        None => return Ok(gap),
    };
    plan.mutate(disk)?;

    let gaps = disk.gaps(Alignment::standard());
    distinst_geometry::within(&gaps, gap).ok_or_else(|| PlannerError::Geometry { why: distinst_geometry::GeometryError::GapNotFound { offset: gap.offset } })
}

/// Splits a reset (recovery) partition off the front of `gap`, sized per `choice`: explicit
/// size if given, else a `1.10`-scaled, 256 MiB-aligned source-media estimate, else the
/// dry-run constant.
fn apply_reset_partition(disk: &mut Disk, gap: Gap, choice: &GuidedChoiceV2, source_media_size: Option<u64>) -> Result<Gap, PlannerError> {
    let raw_size = choice
        .reset_partition_size
        .or_else(|| source_media_size.map(|size| align_up((size * 11) / 10, RESET_PARTITION_ALIGN)))
        .unwrap_or(DRY_RUN_RESET_SIZE);

    let (reset_gap, remainder) = gap.split(raw_size, Alignment::standard());

    disk.add_partition(PartitionBuilder::new(reset_gap.offset, reset_gap.size, FileSystem::Fat32).flag(PartitionFlag::Msftres).name("Reset".into()))?;

    remainder.ok_or_else(|| PlannerError::Geometry { why: distinst_geometry::GeometryError::GapNotFound { offset: reset_gap.offset } })
}

/// One whole-disk partition spanning `gap`, ext4, mounted at `/`.
fn guided_direct(disk: &mut Disk, gap: Gap) -> Result<(), PlannerError> {
    disk.add_partition(PartitionBuilder::new(gap.offset, gap.size, FileSystem::Ext4).mount("/".into()))?;
    Ok(())
}

/// Splits a `/boot` partition off `gap`, turns the remainder into an LVM physical volume
/// backing a freshly named volume group, and creates its single root logical volume.
fn guided_lvm(disks: &mut Disks, disk_path: &std::path::Path, gap: Gap, choice: &GuidedChoiceV2) -> Result<(), PlannerError> {
    let align = Alignment::standard();
    let bootfs_size = align_up(get_bootfs_size(gap.size), align.part_align);
    let (gap_boot, gap_rest) = gap.split(bootfs_size, align);
    let gap_rest = gap_rest.ok_or_else(|| PlannerError::Geometry { why: distinst_geometry::GeometryError::GapNotFound { offset: gap.offset } })?;

    let disk = disks.get_physical_device_mut(disk_path).ok_or(distinst_disks::DiskError::DiskGet { device: disk_path.to_path_buf() })?;
    disk.add_partition(PartitionBuilder::new(gap_boot.offset, gap_boot.size, FileSystem::Ext4).mount("/boot".into()))?;

    let taken = existing_volume_groups(disks);
    let vg_name = distinst_disks::generate_unique_id("ubuntu-vg", &taken);

    let encryption = choice.password.as_ref().map(|password| LuksEncryption::new(format!("{}-crypt", vg_name), Some(password.clone()), FileSystem::Ext4));

    let disk = disks.get_physical_device_mut(disk_path).ok_or(distinst_disks::DiskError::DiskGet { device: disk_path.to_path_buf() })?;
    let mut pv_builder = PartitionBuilder::new(gap_rest.offset, gap_rest.size, None::<FileSystem>).logical_volume(vg_name.clone(), encryption.clone());
    if encryption.is_some() {
        pv_builder = pv_builder.flag(PartitionFlag::LuksMember);
    }
    disk.add_partition(pv_builder)?;

    let mut vg = LvmDevice::new(vg_name.clone(), encryption, gap_rest.size, false);

    let lv_size = match choice.sizing_policy {
        SizingPolicy::Scaled => scaled_rootfs_size(vg.size),
        SizingPolicy::All => vg.size,
    };

    vg.add_partition(PartitionBuilder::new(0, lv_size, FileSystem::Ext4).name("ubuntu-lv".into()).mount("/".into()))?;
    disks.add_logical_volume(vg);
    Ok(())
}

/// Splits `/boot`, an optional swap, and a root partition off `gap`, then builds the fixed
/// zsys dataset tree on top of the root partition (`bpool`/`rpool`).
fn guided_zfs(disks: &mut Disks, disk_path: &std::path::Path, gap: Gap, choice: &GuidedChoiceV2, variation_min_size: u64) -> Result<(), PlannerError> {
    let disk = disks.get_physical_device_mut(disk_path).ok_or(distinst_disks::DiskError::DiskGet { device: disk_path.to_path_buf() })?;
    let align = Alignment::standard();
    let bootfs_size = align_up(get_bootfs_size(gap.size), align.part_align);
    let (gap_boot, gap_rest) = gap.split(bootfs_size, align);
    let gap_rest = gap_rest.ok_or_else(|| PlannerError::Geometry { why: distinst_geometry::GeometryError::GapNotFound { offset: gap.offset } })?;

    disk.add_partition(PartitionBuilder::new(gap_boot.offset, gap_boot.size, None::<FileSystem>).name("bpool".into()))?;

    let encrypted = choice.password.is_some();
    let avail = gap_rest.size.saturating_sub(variation_min_size);
    let swap_size = align_down(suggested_swapsize(avail), align.part_align);

    let gap_root = if swap_size > 0 {
        let (gap_swap, remainder) = gap_rest.split(swap_size, align);
        let swap_fs = if encrypted { None } else { Some(FileSystem::Swap) };
        let mut swap_builder = PartitionBuilder::new(gap_swap.offset, gap_swap.size, swap_fs);
        if encrypted {
            swap_builder = swap_builder.flag(PartitionFlag::LuksMember);
        }
        disk.add_partition(swap_builder)?;
        remainder.ok_or_else(|| PlannerError::Geometry { why: distinst_geometry::GeometryError::GapNotFound { offset: gap_swap.offset } })?
    } else {
        gap_rest
    };

    disk.add_partition(PartitionBuilder::new(gap_root.offset, gap_root.size, None::<FileSystem>).name("rpool".into()))?;

    let root_id = Uuid::new_v4();
    let userdata_id = Uuid::new_v4();
    disks.zfs_pools.push(guided_rpool(root_id, userdata_id));
    disks.zfs_pools.push(guided_bpool());
    Ok(())
}

/// Wraps the whole disk in a single arbitrary-device entry; no partition-level mutation is
/// performed, since the disk image itself owns the entire on-disk layout.
fn guided_dd(disks: &mut Disks, disk_path: &std::path::Path) -> Result<(), PlannerError> {
    disks.arbitrary.push(distinst_disks::config::ArbitraryDevice::new(disk_path.to_path_buf()));
    Ok(())
}

/// Top-level guided entry point: resolves the requested capability, dispatches storage target
/// setup, applies the boot plan and optional reset partition, then builds the capability's
/// concrete layout.
pub fn guided(disks: &mut Disks, catalog: &VariationCatalog, firmware: Bootloader, choice: GuidedChoiceV2) -> Result<(), PlannerError> {
    if choice.capability == GuidedCapability::Manual {
        return Ok(());
    }

    let variation = catalog.resolve(choice.capability)?;
    let variation_min_size = variation.min_size;

    if variation.is_core_boot() {
        let disk_path = match &choice.target {
            GuidedStorageTarget::Reformat { disk } => disk.clone(),
            _ => return Err(PlannerError::AutoinstallValidationError { why: "core-boot variations require a Reformat target".into() }),
        };

        let system = variation.external_system_layout.as_ref().ok_or_else(|| {
            error!("guided: core-boot variation {:?} has no external system layout", variation.name);
            PlannerError::NoSnapdSystemsOnSource
        })?;
        let structures = structures_for_system(system);
        let esp_guid = Uuid::parse_str(ESP_TYPE_GUID).expect("well-known GUID literal is valid");

        let disk = disks.get_physical_device_mut(&disk_path).ok_or(distinst_disks::DiskError::DiskGet { device: disk_path })?;
        core_boot::reconcile(disk, &structures, esp_guid);
        return Ok(());
    }

    let disk_path = disk_for_target(disks, &choice.target).map(|d| d.device_path.clone()).ok_or(distinst_disks::DiskError::DiskGet { device: Default::default() })?;

    let disk = disks.get_physical_device_mut(&disk_path).ok_or(distinst_disks::DiskError::DiskGet { device: disk_path.clone() })?;
    let mut gap = start_guided(&choice.target, disk)?;
    gap = apply_boot_plan(disk, firmware, gap)?;

    if choice.reset_partition {
        gap = apply_reset_partition(disk, gap, &choice, None)?;
        if choice.reset_partition_only {
            return Ok(());
        }
    }

    match choice.capability {
        GuidedCapability::Direct => guided_direct(disk, gap),
        GuidedCapability::Lvm | GuidedCapability::LvmLuks => guided_lvm(disks, &disk_path, gap, &choice),
        GuidedCapability::Zfs | GuidedCapability::ZfsLuksKeystore => guided_zfs(disks, &disk_path, gap, &choice, variation_min_size),
        GuidedCapability::Dd => guided_dd(disks, &disk_path),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variation::VariationInfo;
    use disk_types::PartitionTable;

    const MIB: u64 = 1024 * 1024;
    const GIB: u64 = 1024 * MIB;

    fn empty_disk() -> Disks {
        let disk = Disk::new("/dev/sdz".into(), "Test Disk".into(), "Test Disk 123".into(), 40 * GIB, Some(PartitionTable::Gpt));
        Disks { physical: vec![disk], ..Disks::default() }
    }

    #[test]
    fn guided_direct_fills_gap_with_ext4_root() {
        let mut disks = empty_disk();
        let catalog = VariationCatalog::new(vec![VariationInfo::classic("ubuntu", 5 * GIB)]);
        let target = GuidedStorageTarget::Reformat { disk: "/dev/sdz".into() };
        let choice = GuidedChoiceV2 {
            target,
            capability: GuidedCapability::Direct,
            password: None,
            recovery_key: None,
            sizing_policy: SizingPolicy::Scaled,
            reset_partition: false,
            reset_partition_size: None,
            reset_partition_only: false,
        };

        guided(&mut disks, &catalog, Bootloader::Bios, choice).unwrap();
        let disk = disks.get_physical_device("/dev/sdz").unwrap();
        assert!(disk.partitions.iter().any(|p| p.mount_point.as_deref() == Some(std::path::Path::new("/"))));
    }

    #[test]
    fn guided_lvm_creates_boot_partition_and_volume_group() {
        let mut disks = empty_disk();
        let catalog = VariationCatalog::new(vec![VariationInfo::classic("ubuntu", 5 * GIB)]);
        let target = GuidedStorageTarget::Reformat { disk: "/dev/sdz".into() };
        let choice = GuidedChoiceV2 {
            target,
            capability: GuidedCapability::Lvm,
            password: None,
            recovery_key: None,
            sizing_policy: SizingPolicy::All,
            reset_partition: false,
            reset_partition_size: None,
            reset_partition_only: false,
        };

        guided(&mut disks, &catalog, Bootloader::Bios, choice).unwrap();
        let disk = disks.get_physical_device("/dev/sdz").unwrap();
        assert!(disk.partitions.iter().any(|p| p.mount_point.as_deref() == Some(std::path::Path::new("/boot"))));
        assert_eq!(disks.get_logical_devices().len(), 1);
        assert_eq!(disks.get_logical_devices()[0].volume_group, "ubuntu-vg");
    }

    #[test]
    fn guided_zfs_creates_boot_and_root_pools() {
        let mut disks = empty_disk();
        let catalog = VariationCatalog::new(vec![VariationInfo::classic("ubuntu", 5 * GIB)]);
        let target = GuidedStorageTarget::Reformat { disk: "/dev/sdz".into() };
        let choice = GuidedChoiceV2 {
            target,
            capability: GuidedCapability::Zfs,
            password: None,
            recovery_key: None,
            sizing_policy: SizingPolicy::Scaled,
            reset_partition: false,
            reset_partition_size: None,
            reset_partition_only: false,
        };

        guided(&mut disks, &catalog, Bootloader::Bios, choice).unwrap();
        let disk = disks.get_physical_device("/dev/sdz").unwrap();
        assert!(disk.partitions.iter().any(|p| p.name.as_deref() == Some("bpool")));
        assert!(disk.partitions.iter().any(|p| p.name.as_deref() == Some("rpool")));
        assert_eq!(disks.zfs_pools.len(), 2);
    }

    #[test]
    fn guided_dd_registers_an_arbitrary_device() {
        let mut disks = empty_disk();
        let catalog = VariationCatalog::new(vec![VariationInfo::dd("ubuntu-dd", 5 * GIB)]);
        let target = GuidedStorageTarget::Reformat { disk: "/dev/sdz".into() };
        let choice = GuidedChoiceV2 {
            target,
            capability: GuidedCapability::Dd,
            password: None,
            recovery_key: None,
            sizing_policy: SizingPolicy::Scaled,
            reset_partition: false,
            reset_partition_size: None,
            reset_partition_only: false,
        };

        guided(&mut disks, &catalog, Bootloader::Bios, choice).unwrap();
        assert_eq!(disks.arbitrary.len(), 1);
        assert_eq!(disks.arbitrary[0].device_path, std::path::Path::new("/dev/sdz"));
    }

    #[test]
    fn guided_manual_is_a_no_op() {
        let mut disks = empty_disk();
        let catalog = VariationCatalog::new(vec![VariationInfo::classic("ubuntu", 5 * GIB)]);
        let choice = GuidedChoiceV2 {
            target: GuidedStorageTarget::Manual,
            capability: GuidedCapability::Manual,
            password: None,
            recovery_key: None,
            sizing_policy: SizingPolicy::Scaled,
            reset_partition: false,
            reset_partition_size: None,
            reset_partition_only: false,
        };
        guided(&mut disks, &catalog, Bootloader::Bios, choice).unwrap();
        let disk = disks.get_physical_device("/dev/sdz").unwrap();
        assert!(disk.partitions.is_empty());
    }

    #[test]
    fn get_bootfs_size_is_bounded() {
        assert_eq!(get_bootfs_size(1 * GIB), 512 * MIB);
        assert_eq!(get_bootfs_size(1000 * GIB), 2 * GIB);
    }

    #[test]
    fn suggested_swapsize_tapers_off_with_little_room() {
        assert_eq!(suggested_swapsize(1 * GIB), 0);
        assert_eq!(suggested_swapsize(10 * GIB), 4 * GIB);
    }
}
