use super::arbitrary::ArbitraryDevice;
use super::disk::Disk;
use super::disk_trait::{find_partition, find_partition_mut, DiskExt};
use super::lvm::LvmDevice;
use super::partitions::Partition;
use super::raid::Raid;
use crate::error::DiskError;
use crate::zfs::ZfsPool;
use disk_types::{FileSystem, PartitionTable, PartitionType};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// The complete set of physical disks and logical (LVM) devices known to a plan, mirroring
/// the teacher's `Disks` aggregate. `logical` devices are resolved and applied only after
/// every physical disk's partitions have been finalized, since a logical volume's capacity
/// depends on the physical partitions assigned to its volume group.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Disks {
    pub physical: Vec<Disk>,
    pub logical: Vec<LvmDevice>,
    /// zsys dataset trees built by a ZFS guided scenario, one per pool (`rpool`, `bpool`).
    pub zfs_pools: Vec<ZfsPool>,
    /// Software RAID arrays known to the plan, probed or planner-created alike.
    pub raid: Vec<Raid>,
    /// Block devices the planner treats as opaque targets rather than partitioning itself.
    pub arbitrary: Vec<ArbitraryDevice>,
}

impl Disks {
    pub fn add(&mut self, disk: Disk) { self.physical.push(disk); }

    pub fn get_physical_devices(&self) -> &[Disk] { &self.physical }

    pub fn get_physical_devices_mut(&mut self) -> &mut [Disk] { &mut self.physical }

    pub fn get_physical_device<P: AsRef<Path>>(&self, path: P) -> Option<&Disk> {
        self.physical.iter().find(|d| d.device_path == path.as_ref())
    }

    pub fn get_physical_device_mut<P: AsRef<Path>>(&mut self, path: P) -> Option<&mut Disk> {
        self.physical.iter_mut().find(|d| d.device_path == path.as_ref())
    }

    pub fn get_physical_device_with_partition<P: AsRef<Path>>(&self, path: P) -> Option<&Disk> {
        self.physical.iter().find(|d| d.partitions.iter().any(|p| self.partition_device_path(d, p) == path.as_ref()))
    }

    fn partition_device_path(&self, disk: &Disk, partition: &Partition) -> PathBuf {
        let mut path = disk.device_path.clone().into_os_string();
        path.push(partition.number.to_string());
        PathBuf::from(path)
    }

    pub fn get_logical_device(&self, group: &str) -> Option<&LvmDevice> {
        self.logical.iter().find(|d| d.volume_group == group)
    }

    pub fn get_logical_device_mut(&mut self, group: &str) -> Option<&mut LvmDevice> {
        self.logical.iter_mut().find(|d| d.volume_group == group)
    }

    pub fn get_logical_devices(&self) -> &[LvmDevice] { &self.logical }

    pub fn get_logical_devices_mut(&mut self) -> &mut [LvmDevice] { &mut self.logical }

    /// Iterates over every partition across both physical disks and logical volumes.
    pub fn get_partitions(&self) -> impl Iterator<Item = &Partition> {
        self.physical.iter().flat_map(|d| d.partitions.iter()).chain(self.logical.iter().flat_map(|d| d.partitions.iter()))
    }

    pub fn get_partition_with_target(&self, target: &Path) -> Option<&Partition> {
        self.get_partitions().find(|p| p.mount_point.as_deref() == Some(target))
    }

    pub fn find_disk<P: AsRef<Path>>(&self, path: P) -> Option<&Disk> { self.get_physical_device(path) }

    pub fn find_disk_mut<P: AsRef<Path>>(&mut self, path: P) -> Option<&mut Disk> { self.get_physical_device_mut(path) }

    pub fn find_partition<'a>(&'a self, target: &Path) -> Option<(&'a Path, &'a Partition)> {
        find_partition(&self.physical, target).or_else(|| find_partition(&self.logical, target))
    }

    pub fn find_partition_mut<'a>(&'a mut self, target: &Path) -> Option<(PathBuf, &'a mut Partition)> {
        if let Some(found) = find_partition_mut(&mut self.physical, target) {
            return Some(found);
        }
        find_partition_mut(&mut self.logical, target)
    }

    /// True if any physical partition is configured with LUKS encryption.
    pub fn contains_luks(&self) -> bool {
        self.physical.iter().flat_map(|d| d.partitions.iter()).any(|p| p.encryption.is_some())
    }

    /// Drops every disk that was neither reformatted, resized, nor had a partition touched --
    /// the teacher's `remove_untouched_disks`, used to shrink the plan handed to the action
    /// executor down to only what actually changed.
    pub fn remove_untouched_disks(&mut self) {
        self.physical.retain(|disk| disk.mklabel || disk.partitions.iter().any(|p| p.requires_removal_or_change()));
    }

    /// Assigns a logical volume's volume group, creating the `LvmDevice` entry on first use.
    pub fn add_logical_volume(&mut self, device: LvmDevice) {
        if self.get_logical_device(&device.volume_group).is_none() {
            self.logical.push(device);
        }
    }

    pub fn remove_logical_device(&mut self, volume: &str) {
        let mut remove_index = None;
        for (index, device) in self.logical.iter_mut().enumerate() {
            if device.volume_group == volume {
                if device.is_source {
                    device.remove();
                } else {
                    remove_index = Some(index);
                }
                break;
            }
        }

        if let Some(index) = remove_index {
            self.logical.remove(index);
        }
    }

    /// Checks that every logical device's constraints hold before a plan is considered final:
    /// an encrypted volume group backed by more than one physical volume is not supported.
    pub fn validate_logical_devices(&self) -> Result<(), DiskError> {
        for device in &self.logical {
            let backing = self
                .physical
                .iter()
                .flat_map(|d| d.partitions.iter())
                .filter(|p| p.lvm_vg.as_deref() == Some(device.volume_group.as_str()))
                .count();

            if device.encryption.is_some() && backing > 1 {
                return Err(DiskError::SameGroup);
            }
        }
        Ok(())
    }

    /// Rebuilds the physical side of the Device Model from a probe's `blockdev` map: one entry
    /// per device node, keyed by device path, with udev-style properties as values (`DEVTYPE`,
    /// `ID_MODEL`, `ID_SERIAL_SHORT`, `ID_PART_TABLE_TYPE`, and, on partition nodes, `PKNAME`,
    /// `PARTN`, `START`, `SIZE`, `FSTYPE`, `LABEL`, `MOUNTPOINT`). Every reconstructed partition
    /// is marked `SOURCE`, matching what a fresh probe -- never a planner edit -- produced.
    pub fn from_snapshot(blockdev: &BTreeMap<String, serde_json::Value>) -> Disks {
        let mut disks = Disks::default();

        for (path, entry) in blockdev {
            if str_attr(entry, "DEVTYPE").as_deref() != Some("disk") {
                continue;
            }

            let model_name = str_attr(entry, "ID_MODEL").unwrap_or_default();
            let serial = str_attr(entry, "ID_SERIAL_SHORT").unwrap_or_default();
            let size = entry.get("SIZE").and_then(serde_json::Value::as_u64).unwrap_or(0);
            let table_type = str_attr(entry, "ID_PART_TABLE_TYPE").and_then(|schema| match schema.as_str() {
                "gpt" => Some(PartitionTable::Gpt),
                "dos" | "mbr" => Some(PartitionTable::Msdos),
                _ => None,
            });

            let mut disk = Disk::new(PathBuf::from(path), model_name, serial, size, table_type);

            let disk_name = device_name(path);
            let mut members: Vec<_> = blockdev
                .iter()
                .filter(|(_, e)| str_attr(e, "PKNAME").as_deref() == Some(disk_name.as_str()))
                .collect();
            members.sort_by_key(|(_, e)| e.get("PARTN").and_then(serde_json::Value::as_i64).unwrap_or(0));

            for (_, entry) in members {
                let number = entry.get("PARTN").and_then(serde_json::Value::as_i64).unwrap_or(-1) as i32;
                let offset = entry.get("START").and_then(serde_json::Value::as_u64).unwrap_or(0);
                let size = entry.get("SIZE").and_then(serde_json::Value::as_u64).unwrap_or(0);
                let filesystem = str_attr(entry, "FSTYPE").and_then(|fs| fs.parse::<FileSystem>().ok());
                let mount_point = str_attr(entry, "MOUNTPOINT").map(PathBuf::from);
                let mut bitflags = super::partitions::SOURCE;
                if mount_point.is_some() {
                    bitflags |= super::partitions::IN_USE;
                }

                disk.partitions.push(Partition {
                    bitflags,
                    number,
                    offset,
                    size,
                    part_type: PartitionType::Primary,
                    flag: None,
                    type_guid: None,
                    filesystem,
                    mount_point,
                    name: str_attr(entry, "LABEL"),
                    estimated_min_size: None,
                    lvm_vg: None,
                    encryption: None,
                });
            }

            disks.add(disk);
        }

        disks
    }
}

fn str_attr(entry: &serde_json::Value, key: &str) -> Option<String> {
    entry.get(key).and_then(serde_json::Value::as_str).map(str::to_string)
}

fn device_name(path: &str) -> String {
    Path::new(path).file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| path.to_string())
}

impl Partition {
    fn requires_removal_or_change(&self) -> bool {
        self.flag_is_enabled(super::partitions::REMOVE)
            || self.flag_is_enabled(super::partitions::FORMAT)
            || self.flag_is_enabled(super::partitions::RESIZE)
            || !self.flag_is_enabled(super::partitions::SOURCE)
    }
}

impl IntoIterator for Disks {
    type Item = Disk;
    type IntoIter = std::vec::IntoIter<Disk>;
    fn into_iter(self) -> Self::IntoIter { self.physical.into_iter() }
}

impl std::iter::FromIterator<Disk> for Disks {
    fn from_iter<I: IntoIterator<Item = Disk>>(iter: I) -> Self {
        Disks { physical: iter.into_iter().collect(), ..Disks::default() }
    }
}
