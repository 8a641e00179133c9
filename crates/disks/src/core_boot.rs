//! Reconciles a core-boot (TPM/snapd-managed) disk against the external system's declared
//! volume layout (spec component C8). No teacher analog exists for core-boot itself
//! (`distinst` predates it); the reconciliation *pattern* -- match existing state by identity,
//! delete what doesn't match, then walk and create -- is adapted from
//! `crates/disks/src/config/disk.rs`'s `diff`/`commit` pair, generalized from real-disk
//! diffing to this purely in-memory structure-list reconciliation. Role names and the GPT
//! type-UUID-to-flag derivation follow `original_source/subiquity/server/controllers/
//! filesystem.py`'s `guided_core_boot`.

use crate::action_log::Action;
use crate::config::disk::Disk;
use crate::config::partitions::{Partition, FORMAT, SOURCE};
use disk_types::{FileSystem, PartitionFlag, PartitionType};
use log::info;
use std::path::PathBuf;
use uuid::Uuid;

/// One entry in the external system's declared volume layout for a core-boot install.
#[derive(Debug, Clone, PartialEq)]
pub struct Structure {
    pub role: Role,
    pub name: Option<String>,
    pub size: u64,
    pub filesystem: Option<FileSystem>,
    pub type_guid: Option<Uuid>,
    pub label: Option<String>,
    pub explicit_offset: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    SystemSeed,
    SystemBoot,
    SystemData,
    Other,
}

impl Role {
    fn mount_point(self) -> Option<&'static str> {
        match self {
            Role::SystemData => Some("/"),
            Role::SystemBoot => Some("/boot"),
            _ => None,
        }
    }
}

/// Derives the partition marker flag a structure's type GUID implies, mirroring the ESP
/// detection `original_source` performs off the same well-known GPT type UUIDs the rest of
/// this crate's `PartitionFlag::Esp` recognizes.
fn flag_for_type_guid(guid: Option<Uuid>, esp_guid: Uuid) -> Option<PartitionFlag> {
    guid.filter(|g| *g == esp_guid).map(|_| PartitionFlag::Esp)
}

/// Reconciles `disk`'s partitions against `structures`, in place, per the spec's five-step
/// algorithm. `esp_guid` is the well-known EFI System Partition type GUID the external system
/// reports in its layout so an ESP structure's flag can be derived without hardcoding it here.
pub fn reconcile(disk: &mut Disk, structures: &[Structure], esp_guid: Uuid) {
    info!("reconcile: {:?} against {} declared structures", disk.device_path, structures.len());
    let device = disk.device_path.clone();

    // Step 2: index existing partitions by (offset, size); anything that doesn't match exactly
    // is deleted. If nothing survives, the disk is reformatted outright.
    let preserved: Vec<bool> = disk
        .partitions
        .iter()
        .map(|existing| structures.iter().any(|s| s.explicit_offset == Some(existing.offset) && s.size == existing.size))
        .collect();

    if preserved.iter().all(|&p| !p) && !disk.partitions.is_empty() {
        disk.mklabel(disk.table_type.unwrap_or(disk_types::PartitionTable::Gpt));
    } else {
        let mut kept = Vec::new();
        for (partition, keep) in disk.partitions.drain(..).zip(preserved) {
            if keep {
                kept.push(partition);
            }
        }
        disk.partitions = kept;
    }

    // Step 3: walk structures in declaration order, each offset is max(explicit, running); the
    // final SYSTEM_DATA structure grows to fill whatever remains on the disk.
    let mut cursor = disk.alignment.min_start_offset;
    let last_index = structures.len().saturating_sub(1);

    for (index, structure) in structures.iter().enumerate() {
        let offset = structure.explicit_offset.map_or(cursor, |explicit| explicit.max(cursor));

        let size = if index == last_index && structure.role == Role::SystemData {
            disk.size.saturating_sub(disk.alignment.end_overhead).saturating_sub(offset)
        } else {
            structure.size
        };

        if let Some(existing) = disk.partitions.iter_mut().find(|p| p.offset == offset && p.size == size) {
            let number = existing.number;
            apply_structure(existing, structure, esp_guid);
            if let Some(fs) = structure.filesystem {
                disk.action_log.push(Action::FormatPartition { device: device.clone(), number, filesystem: fs });
            }
        } else {
            let mut partition = Partition {
                bitflags: FORMAT,
                number: -1,
                offset,
                size,
                part_type: PartitionType::Primary,
                flag: None,
                type_guid: structure.type_guid,
                filesystem: structure.filesystem,
                mount_point: None,
                name: structure.label.clone(),
                estimated_min_size: None,
                lvm_vg: None,
                encryption: None,
            };
            apply_structure(&mut partition, structure, esp_guid);
            disk.partitions.push(partition);
            disk.action_log.push(Action::AddPartition { device: device.clone(), offset, size, filesystem: structure.filesystem });
        }

        cursor = offset + size;
    }

    // Step 6: structures dictate partition ordering; number by position and keep source
    // partitions' identity flag intact for any that survived the preservation pass.
    disk.partitions.sort_by_key(|p| p.offset);
    for (index, partition) in disk.partitions.iter_mut().enumerate() {
        partition.number = index as i32 + 1;
        if !partition.flag_is_enabled(SOURCE) {
            partition.flag_enable(FORMAT);
        }
    }
}

fn apply_structure(partition: &mut Partition, structure: &Structure, esp_guid: Uuid) {
    partition.type_guid = structure.type_guid;
    partition.flag = flag_for_type_guid(structure.type_guid, esp_guid);
    partition.name = structure.label.clone();

    if let Some(fs) = structure.filesystem {
        partition.format_with(fs);
    }

    partition.mount_point = if partition.flag == Some(PartitionFlag::Esp) {
        Some(PathBuf::from("/boot/efi"))
    } else {
        structure.role.mount_point().map(PathBuf::from)
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use disk_types::PartitionTable;

    const MIB: u64 = 1024 * 1024;
    const GIB: u64 = 1024 * MIB;

    fn empty_disk() -> Disk {
        Disk::new("/dev/mmcblk0".into(), "core-boot".into(), "core-boot".into(), 20 * GIB, Some(PartitionTable::Gpt))
    }

    #[test]
    fn reconcile_creates_structures_in_order() {
        let mut disk = empty_disk();
        let esp = Uuid::new_v4();
        let structures = vec![
            Structure { role: Role::SystemSeed, name: None, size: 100 * MIB, filesystem: Some(FileSystem::Fat32), type_guid: Some(esp), label: Some("ubuntu-seed".into()), explicit_offset: None },
            Structure { role: Role::SystemBoot, name: None, size: 750 * MIB, filesystem: Some(FileSystem::Ext4), type_guid: None, label: Some("ubuntu-boot".into()), explicit_offset: None },
            Structure { role: Role::SystemData, name: None, size: 0, filesystem: Some(FileSystem::Ext4), type_guid: None, label: Some("writable".into()), explicit_offset: None },
        ];

        reconcile(&mut disk, &structures, esp);

        assert_eq!(disk.partitions.len(), 3);
        assert_eq!(disk.partitions[0].mount_point, Some(PathBuf::from("/boot/efi")));
        assert_eq!(disk.partitions[2].mount_point, Some(PathBuf::from("/")));
        assert!(disk.partitions[2].size > structures[1].size);
        assert_eq!(disk.action_log.entries().iter().filter(|a| matches!(a, Action::AddPartition { .. })).count(), 3);
    }

    #[test]
    fn reconcile_preserves_exact_offset_size_match() {
        let mut disk = empty_disk();
        let esp = Uuid::new_v4();
        let mut existing = Partition {
            bitflags: SOURCE,
            number: 1,
            offset: disk.alignment.min_start_offset,
            size: 100 * MIB,
            part_type: PartitionType::Primary,
            flag: None,
            type_guid: None,
            filesystem: Some(FileSystem::Fat32),
            mount_point: None,
            name: Some("ubuntu-seed".into()),
            estimated_min_size: None,
            lvm_vg: None,
            encryption: None,
        };
        existing.flag_enable(SOURCE);
        disk.partitions.push(existing);

        let structures = vec![Structure {
            role: Role::SystemSeed,
            name: None,
            size: 100 * MIB,
            filesystem: Some(FileSystem::Fat32),
            type_guid: None,
            label: Some("ubuntu-seed".into()),
            explicit_offset: Some(disk.alignment.min_start_offset),
        }];

        reconcile(&mut disk, &structures, esp);
        assert_eq!(disk.partitions.len(), 1);
        assert!(disk.partitions[0].flag_is_enabled(SOURCE));
        assert!(disk.action_log.entries().iter().any(|a| matches!(a, Action::FormatPartition { .. })));
    }
}
