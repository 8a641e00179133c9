use disk_types::FileSystem;
use std::path::PathBuf;

/// The redundancy scheme of a software RAID array, as reported by `mdadm --detail` or a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaidLevel {
    Raid0,
    Raid1,
    Raid5,
    Raid6,
    Raid10,
}

/// A software RAID array: a set of member block devices combined under one `/dev/mdN` device.
/// The planner only ever records that an array exists and where it should be mounted; creating
/// or assembling the array with `mdadm` is out of scope for this crate, so there is no `DiskExt`
/// impl here -- an array has no partition table of its own to add partitions to.
#[derive(Debug, Clone, PartialEq)]
pub struct Raid {
    pub name: String,
    pub level: RaidLevel,
    pub devices: Vec<PathBuf>,
    pub filesystem: Option<FileSystem>,
    pub mount_point: Option<PathBuf>,
}

impl Raid {
    pub fn new(name: String, level: RaidLevel, devices: Vec<PathBuf>) -> Raid {
        Raid { name, level, devices, filesystem: None, mount_point: None }
    }

    pub fn device_path(&self) -> PathBuf { PathBuf::from(format!("/dev/md/{}", self.name)) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_path_is_under_dev_md() {
        let raid = Raid::new("data".into(), RaidLevel::Raid1, vec!["/dev/sda1".into(), "/dev/sdb1".into()]);
        assert_eq!(raid.device_path(), PathBuf::from("/dev/md/data"));
    }
}
