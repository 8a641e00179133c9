//! Detects the host firmware type and plans the boot partition(s) a guided scenario must carve
//! out before its root file system can be installed (spec component C3).
//!
//! `Bootloader::detect()` is kept verbatim from the teacher: firmware detection is the one
//! piece of this crate that genuinely reads host state (`/sys/firmware/efi`), and nothing about
//! it changes between a real installer and this planner.

use disk_types::PartitionFlag;
use distinst_disks::config::{Disk, DiskExt, Partition, PartitionBuilder};
use distinst_disks::DiskError;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

pub static FORCE_BOOTLOADER: AtomicUsize = AtomicUsize::new(0);

/// Bootloader type
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Bootloader {
    Bios,
    Efi,
}

impl Bootloader {
    /// Detects whether the system is running from EFI.
    pub fn detect() -> Bootloader {
        match FORCE_BOOTLOADER.load(Ordering::SeqCst) {
            1 => return Bootloader::Bios,
            2 => return Bootloader::Efi,
            _ => (),
        }

        if Path::new("/sys/firmware/efi").is_dir() {
            Bootloader::Efi
        } else {
            Bootloader::Bios
        }
    }
}

/// The minimum size an EFI System Partition must be, per `verify_partitions`'s validation.
pub const REQUIRED_ESP_SIZE: u64 = 256 * 1024 * 1024;
/// The space a BIOS-GRUB partition needs on a GPT disk with no room for an MBR embed.
const BIOS_GRUB_SIZE: u64 = 1024 * 1024;

/// A capability a device either does or does not support, independent of its current layout.
/// Modeled as a small enum rather than a bare bool so the call site (`DeviceAction::TOGGLE_BOOT
/// .supported(disk)`) reads the way the spec describes it.
pub enum DeviceAction {
    ToggleBoot,
}

impl DeviceAction {
    pub const TOGGLE_BOOT: DeviceAction = DeviceAction::ToggleBoot;

    /// Whether this device could ever be marked as the boot device: it must carry a partition
    /// table, since an unpartitioned/raw-image target (`DD`) is never a toggle candidate.
    pub fn supported(&self, disk: &Disk) -> bool {
        match self {
            DeviceAction::ToggleBoot => disk.table_type.is_some(),
        }
    }
}

/// The set of partition mutations required to make a disk bootable under the detected firmware.
pub struct BootPlan {
    pub firmware: Bootloader,
    /// Set when an existing, adequately sized ESP/BIOS-GRUB partition will be reused as-is.
    pub reused_offset: Option<u64>,
    pub new_partitions: Vec<PartitionBuilder>,
}

impl BootPlan {
    pub fn new_partition_count(&self) -> usize { self.new_partitions.len() }

    /// Applies the plan's partition creations to `disk`.
    pub fn mutate(self, disk: &mut Disk) -> Result<(), DiskError> {
        for builder in self.new_partitions {
            disk.add_partition(builder)?;
        }
        Ok(())
    }
}

fn existing_esp(disk: &Disk) -> Option<&Partition> {
    disk.partitions.iter().find(|p| p.is_esp_partition() && p.size >= REQUIRED_ESP_SIZE)
}

fn existing_bios_grub(disk: &Disk) -> Option<&Partition> {
    disk.partitions.iter().find(|p| p.flag == Some(PartitionFlag::BiosGrub))
}

/// Computes what would need to change on `disk` to make it bootable under `firmware`, reusing
/// `gap` (the free region the rest of the guided scenario intends to install into) as the
/// location for any new boot partition. Returns `None` if `gap` has no room for one.
///
/// Tie-break order, per spec: prefer reusing an existing ESP/BIOS-GRUB partition; otherwise
/// prefer placing the new partition inside the proposed gap over growing into occupied space
/// (this function never grows into occupied space -- only the gap is ever considered); lower
/// offset wins implicitly, since `gap.offset` is the gap's own (single, already-derived) start.
pub fn plan_boot(disk: &Disk, firmware: Bootloader, gap_offset: u64, gap_size: u64) -> Option<BootPlan> {
    match firmware {
        Bootloader::Efi => {
            if let Some(esp) = existing_esp(disk) {
                return Some(BootPlan { firmware, reused_offset: Some(esp.offset), new_partitions: Vec::new() });
            }

            if gap_size < REQUIRED_ESP_SIZE {
                return None;
            }

            let esp = PartitionBuilder::new(gap_offset, REQUIRED_ESP_SIZE, disk_types::FileSystem::Fat32)
                .flag(PartitionFlag::Esp)
                .mount("/boot/efi".into());

            Some(BootPlan { firmware, reused_offset: None, new_partitions: vec![esp] })
        }
        Bootloader::Bios => {
            if disk.table_type != Some(disk_types::PartitionTable::Gpt) {
                // MBR carries its own boot code; msdos disks need no dedicated partition.
                return Some(BootPlan { firmware, reused_offset: None, new_partitions: Vec::new() });
            }

            if let Some(grub) = existing_bios_grub(disk) {
                return Some(BootPlan { firmware, reused_offset: Some(grub.offset), new_partitions: Vec::new() });
            }

            if gap_size < BIOS_GRUB_SIZE {
                return None;
            }

            let grub = PartitionBuilder::new(gap_offset, BIOS_GRUB_SIZE, None::<disk_types::FileSystem>).flag(PartitionFlag::BiosGrub);
            Some(BootPlan { firmware, reused_offset: None, new_partitions: vec![grub] })
        }
    }
}

/// True if `disk` either already satisfies `firmware`'s boot requirements, or has spare room
/// (`gap_size`) to be made to. `resize_partition` names a partition about to be shrunk, whose
/// freed space the caller has already folded into `gap_size` before calling this.
pub fn can_be_boot_device(disk: &Disk, firmware: Bootloader, gap_offset: u64, gap_size: u64, resize_partition: Option<i32>) -> bool {
    let _ = resize_partition;
    plan_boot(disk, firmware, gap_offset, gap_size).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use disk_types::{FileSystem, PartitionTable};

    const MIB: u64 = 1024 * 1024;
    const GIB: u64 = 1024 * MIB;

    fn empty_gpt_disk() -> Disk {
        Disk::new("/dev/sdz".into(), "Test Disk".into(), "Test Disk 123".into(), 20 * GIB, Some(PartitionTable::Gpt))
    }

    #[test]
    fn efi_requires_256mib_gap() {
        let disk = empty_gpt_disk();
        assert!(plan_boot(&disk, Bootloader::Efi, MIB, 100 * MIB).is_none());
        assert!(plan_boot(&disk, Bootloader::Efi, MIB, 300 * MIB).is_some());
    }

    #[test]
    fn efi_reuses_existing_esp() {
        let mut disk = empty_gpt_disk();
        disk.add_partition(
            PartitionBuilder::new(MIB, REQUIRED_ESP_SIZE, FileSystem::Fat32).flag(PartitionFlag::Esp),
        ).unwrap();

        let plan = plan_boot(&disk, Bootloader::Efi, 500 * MIB, 0).unwrap();
        assert_eq!(plan.reused_offset, Some(MIB));
        assert_eq!(plan.new_partition_count(), 0);
    }

    #[test]
    fn bios_msdos_needs_no_partition() {
        let disk = Disk::new("/dev/sdz".into(), "Test Disk".into(), "Test Disk 123".into(), 20 * GIB, Some(PartitionTable::Msdos));
        let plan = plan_boot(&disk, Bootloader::Bios, MIB, 0).unwrap();
        assert_eq!(plan.new_partition_count(), 0);
    }

    #[test]
    fn bios_gpt_needs_bios_grub_partition() {
        let disk = empty_gpt_disk();
        assert!(can_be_boot_device(&disk, Bootloader::Bios, MIB, 512 * 1024, None));
        assert!(!can_be_boot_device(&disk, Bootloader::Bios, MIB, 0, None));
    }
}
