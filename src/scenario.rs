//! Enumerates the guided install targets offered for the current disk set (`available_targets`,
//! spec `v2_guided_GET`). Grounded in `src/auto/options/{mod.rs,apply.rs,erase_option.rs}` for
//! the disk fan-out/best-free-region shape, and in the original source's
//! `available_use_gap_scenarios`/`available_target_resize_scenarios`/`v2_guided_GET` for the
//! exact per-capability construction. See DESIGN.md for the Open Question resolutions this
//! enumeration required (full disks still offering `Reformat`; `Resize` disk filtering).

use crate::capability::CapabilityInfo;
use crate::variation::VariationCatalog;
use distinst_bootloader::{can_be_boot_device, Bootloader};
use distinst_disks::config::{Disk, DiskExt};
use distinst_disks::Disks;
use distinst_geometry::{Alignment, Gap};
use log::debug;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq)]
pub enum GuidedStorageTarget {
    Reformat { disk: PathBuf },
    UseGap { disk: PathBuf, gap: Gap },
    Resize { disk: PathBuf, partition: i32, new_size: u64 },
    Manual,
}

/// One offered scenario, with the capability set available on it and the size proxy the
/// enumeration result is sorted by.
#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    pub target: GuidedStorageTarget,
    pub capability_info: CapabilityInfo,
    pub size_proxy: u64,
}

fn new_primary_parts_for(disk: &Disk, into_logical: bool, boot_new_partitions: usize) -> usize {
    let own = if into_logical { 0 } else { 1 };
    own + boot_new_partitions
}

/// Whether placing a new root partition (plus whatever boot partitions the firmware requires)
/// into `gap` still leaves `disk` within its primary-partition budget.
fn has_enough_room_for_partitions(disk: &Disk, firmware: Bootloader, gap: Gap, into_logical: bool) -> bool {
    let boot_partitions = match distinst_bootloader::plan_boot(disk, firmware, gap.offset, gap.size) {
        Some(plan) => plan.new_partition_count(),
        None => return false,
    };

    let table = match disk.table_type {
        Some(table) => table,
        None => return true,
    };

    let extents: Vec<_> = disk
        .partitions
        .iter()
        .map(|p| distinst_geometry::PartitionExtent { offset: p.offset, size: p.size, part_type: p.part_type })
        .collect();

    let remaining = distinst_geometry::remaining_primary_partitions(table, &extents);
    new_primary_parts_for(disk, into_logical, boot_partitions) <= remaining
}

/// Builds the hypothetical fully-reformatted version of `disk`: every partition gone, table
/// wiped to its existing schema (or GPT, if the disk is currently unpartitioned).
fn reformatted(disk: &Disk) -> Disk {
    let mut reformatted = disk.clone();
    reformatted.mklabel(disk.table_type.unwrap_or(disk_types::PartitionTable::Gpt));
    reformatted
}

/// `Reformat` is offered for every potentially-bootable disk, combining every variation's
/// capability info against the largest gap the hypothetical reformat would produce.
fn reformat_scenario(disk: &Disk, catalog: &VariationCatalog, firmware: Bootloader, third_party_drivers: bool) -> Option<Scenario> {
    let reformatted = reformatted(disk);
    let gap = distinst_geometry::largest_gap(&reformatted.gaps(Alignment::standard()))?;

    if !can_be_boot_device(&reformatted, firmware, gap.offset, gap.size, None) {
        return None;
    }

    let combined = catalog.variations.iter().fold(CapabilityInfo::default(), |acc, variation| {
        let mut info = variation.capability_info.clone();
        info.apply_filters(gap.size, variation.min_size, firmware == Bootloader::Efi, third_party_drivers);
        acc.combine(info)
    });

    if combined.allowed.is_empty() {
        return None;
    }

    Some(Scenario { target: GuidedStorageTarget::Reformat { disk: disk.device_path.clone() }, capability_info: combined, size_proxy: disk.size })
}

/// `UseGap` is offered for each disk's current largest usable gap (after excluding `bios_grub`
/// and in-use partitions, which `DiskExt::gaps` already does by construction since those
/// partitions are never removed), so long as it is non-empty and still leaves room for the
/// boot partitions a guided install would need.
fn use_gap_scenario(disk: &Disk, catalog: &VariationCatalog, firmware: Bootloader, third_party_drivers: bool) -> Option<Scenario> {
    let gaps = disk.gaps(Alignment::standard());
    let gap = distinst_geometry::largest_gap(&gaps)?;
    debug!("use_gap_scenario: {:?} largest gap {}:{}", disk.device_path, gap.offset, gap.size);

    if gap.size == 0 {
        return None;
    }

    if !has_enough_room_for_partitions(disk, firmware, gap, gap.in_extended) {
        return None;
    }

    let combined = catalog.variations.iter().fold(CapabilityInfo::default(), |acc, variation| {
        let mut info = variation.capability_info.clone();
        info.apply_filters(gap.size, variation.min_size, firmware == Bootloader::Efi, third_party_drivers);
        acc.combine(info)
    });

    if combined.allowed.is_empty() {
        return None;
    }

    Some(Scenario { target: GuidedStorageTarget::UseGap { disk: disk.device_path.clone(), gap }, capability_info: combined, size_proxy: gap.size })
}

/// `Resize` is offered for every partition whose shrinkage would open up enough room for the
/// smallest classic variation, so long as the disk remains (or becomes) bootable and still has
/// primary-partition headroom. Disk filtering here deliberately does not pre-check current
/// bootability (`check_boot=false` in the original) so a resize that would make an otherwise
/// non-bootable disk bootable is still considered; `can_be_boot_device` is the actual gate,
/// evaluated per candidate partition (Open Question OQ2).
fn resize_scenarios(disk: &Disk, catalog: &VariationCatalog, firmware: Bootloader, third_party_drivers: bool) -> Vec<Scenario> {
    let min_classic = match catalog.classic_variations().map(|v| v.min_size).min() {
        Some(min) => min,
        None => return Vec::new(),
    };

    let mut scenarios = Vec::new();

    for partition in &disk.partitions {
        if partition.is_in_use() || !partition.is_linux_compatible() {
            continue;
        }

        let estimated_min = match partition.estimated_min_size {
            Some(min) => min,
            None => continue,
        };
        let install_max = partition.size.saturating_sub(estimated_min);
        if install_max < min_classic {
            continue;
        }

        let new_size = distinst_geometry::align_up(estimated_min, Alignment::standard().part_align);
        if new_size >= partition.size {
            continue;
        }

        let freed_offset = partition.offset + new_size;
        let freed_size = partition.size - new_size;

        if !can_be_boot_device(disk, firmware, freed_offset, freed_size, Some(partition.number)) {
            continue;
        }

        let combined = catalog.variations.iter().fold(CapabilityInfo::default(), |acc, variation| {
            let mut info = variation.capability_info.clone();
            info.apply_filters(freed_size, variation.min_size, firmware == Bootloader::Efi, third_party_drivers);
            acc.combine(info)
        });

        if combined.allowed.is_empty() {
            continue;
        }

        scenarios.push(Scenario {
            target: GuidedStorageTarget::Resize { disk: disk.device_path.clone(), partition: partition.number, new_size },
            capability_info: combined,
            size_proxy: install_max,
        });
    }

    scenarios
}

/// Enumerates every guided target the current disk set and variation catalog offer, sorted
/// descending by each scenario's size proxy (`Reformat`: disk size; `UseGap`: gap size;
/// `Resize`: `install_max`). `Manual` is appended first when `DIRECT` is classically available,
/// matching the original ordering where the manual fallback is always listed.
pub fn available_targets(disks: &Disks, catalog: &VariationCatalog, firmware: Bootloader, third_party_drivers: bool) -> Vec<Scenario> {
    debug!("available_targets: enumerating scenarios across {} physical disks", disks.physical.len());
    let mut scenarios = Vec::new();

    if catalog.classic_variations().any(|v| v.capability_info.allowed.contains(&crate::capability::GuidedCapability::Direct)) {
        scenarios.push(Scenario { target: GuidedStorageTarget::Manual, capability_info: CapabilityInfo::default(), size_proxy: 0 });
    }

    for disk in &disks.physical {
        scenarios.extend(reformat_scenario(disk, catalog, firmware, third_party_drivers));
        scenarios.extend(use_gap_scenario(disk, catalog, firmware, third_party_drivers));
        scenarios.extend(resize_scenarios(disk, catalog, firmware, third_party_drivers));
    }

    scenarios.sort_by(|a, b| b.size_proxy.cmp(&a.size_proxy));
    scenarios
}

/// Finds the disk a `Manual`-excluded target refers to, for callers that need to apply a
/// scenario rather than merely display it.
pub fn disk_for_target<'a>(disks: &'a Disks, target: &GuidedStorageTarget) -> Option<&'a Disk> {
    match target {
        GuidedStorageTarget::Reformat { disk } | GuidedStorageTarget::UseGap { disk, .. } | GuidedStorageTarget::Resize { disk, .. } => {
            disks.get_physical_device(Path::new(disk))
        }
        GuidedStorageTarget::Manual => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variation::VariationInfo;
    use disk_types::{FileSystem, PartitionTable};
    use distinst_disks::config::PartitionBuilder;

    const MIB: u64 = 1024 * 1024;
    const GIB: u64 = 1024 * MIB;

    fn empty_gpt_disk() -> Disk {
        Disk::new("/dev/sdz".into(), "Test Disk".into(), "Test Disk 123".into(), 20 * GIB, Some(PartitionTable::Gpt))
    }

    fn classic_catalog() -> VariationCatalog {
        VariationCatalog::new(vec![VariationInfo::classic("ubuntu", 5 * GIB)])
    }

    #[test]
    fn manual_offered_when_direct_is_classically_available() {
        let disks = Disks::default();
        let catalog = classic_catalog();
        let scenarios = available_targets(&disks, &catalog, Bootloader::Efi, false);
        assert!(scenarios.iter().any(|s| s.target == GuidedStorageTarget::Manual));
    }

    #[test]
    fn reformat_offered_for_empty_disk() {
        let mut disks = Disks::default();
        disks.add(empty_gpt_disk());
        let catalog = classic_catalog();
        let scenarios = available_targets(&disks, &catalog, Bootloader::Efi, false);
        assert!(scenarios.iter().any(|s| matches!(s.target, GuidedStorageTarget::Reformat { .. })));
    }

    #[test]
    fn use_gap_offered_for_disk_with_free_space() {
        let mut disk = empty_gpt_disk();
        disk.add_partition(PartitionBuilder::new(MIB, 1 * GIB, FileSystem::Ext4)).unwrap();
        let mut disks = Disks::default();
        disks.add(disk);
        let catalog = classic_catalog();
        let scenarios = available_targets(&disks, &catalog, Bootloader::Efi, false);
        assert!(scenarios.iter().any(|s| matches!(s.target, GuidedStorageTarget::UseGap { .. })));
    }

    #[test]
    fn too_small_gap_offers_no_classic_scenario() {
        let disk = empty_gpt_disk();
        let catalog = VariationCatalog::new(vec![VariationInfo::classic("ubuntu", 1000 * GIB)]);
        let scenarios = available_targets(&Disks { physical: vec![disk], ..Disks::default() }, &catalog, Bootloader::Efi, false);
        assert!(!scenarios.iter().any(|s| matches!(s.target, GuidedStorageTarget::Reformat { .. }) || matches!(s.target, GuidedStorageTarget::UseGap { .. })));
    }

    #[test]
    fn scenarios_sorted_descending_by_size_proxy() {
        let mut small = Disk::new("/dev/sda".into(), "Small".into(), "S".into(), 10 * GIB, Some(PartitionTable::Gpt));
        let large = Disk::new("/dev/sdb".into(), "Large".into(), "L".into(), 100 * GIB, Some(PartitionTable::Gpt));
        small.table_type = Some(PartitionTable::Gpt);
        let disks = Disks { physical: vec![small, large], ..Disks::default() };
        let catalog = classic_catalog();
        let scenarios = available_targets(&disks, &catalog, Bootloader::Efi, false);
        let reformats: Vec<_> = scenarios.iter().filter(|s| matches!(s.target, GuidedStorageTarget::Reformat { .. })).collect();
        assert!(reformats[0].size_proxy >= reformats[1].size_proxy);
    }
}
