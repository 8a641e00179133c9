//! The ordered, serializable record of every mutation applied to the working generation of the
//! Device Model (spec §9, "Action log as the source of truth"). The working `Disks` is always
//! derived by replaying this log against the original probed snapshot, so `reset()` is simply
//! "discard the log and start over" rather than a bespoke undo path.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Action {
    Mklabel { device: PathBuf, table: disk_types::PartitionTable },
    AddPartition { device: PathBuf, offset: u64, size: u64, filesystem: Option<disk_types::FileSystem> },
    RemovePartition { device: PathBuf, number: i32 },
    FormatPartition { device: PathBuf, number: i32, filesystem: disk_types::FileSystem },
    ResizePartition { device: PathBuf, number: i32, new_size: u64 },
    SetMountPoint { device: PathBuf, number: i32, target: PathBuf },
    CreateVolumeGroup { volume_group: String, encrypted: bool },
    CreateLogicalVolume { volume_group: String, name: String, size: u64, filesystem: disk_types::FileSystem },
    RemoveVolumeGroup { volume_group: String },
}

/// An append-only, replayable history of `Action`s. Elements own their dependents by
/// construction: removing a volume group's `CreateVolumeGroup` entry on reset also discards any
/// `CreateLogicalVolume` entries appended after it, since the log is simply truncated, not
/// edited in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionLog {
    entries: Vec<Action>,
}

impl ActionLog {
    pub fn new() -> ActionLog { ActionLog::default() }

    pub fn push(&mut self, action: Action) { self.entries.push(action); }

    pub fn entries(&self) -> &[Action] { &self.entries }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    /// Discards every recorded mutation, returning the log to the state a freshly probed disk
    /// set would start from.
    pub fn reset(&mut self) { self.entries.clear(); }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_clears_entries() {
        let mut log = ActionLog::new();
        log.push(Action::Mklabel { device: "/dev/sda".into(), table: disk_types::PartitionTable::Gpt });
        assert!(!log.is_empty());
        log.reset();
        assert!(log.is_empty());
    }

    #[test]
    fn entries_preserve_order() {
        let mut log = ActionLog::new();
        log.push(Action::CreateVolumeGroup { volume_group: "ubuntu-vg".into(), encrypted: false });
        log.push(Action::CreateLogicalVolume {
            volume_group: "ubuntu-vg".into(),
            name: "ubuntu-lv".into(),
            size: 1024,
            filesystem: disk_types::FileSystem::Ext4,
        });
        assert_eq!(log.entries().len(), 2);
    }
}
