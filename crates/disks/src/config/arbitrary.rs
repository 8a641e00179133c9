use disk_types::FileSystem;
use std::path::PathBuf;

/// A block device the planner treats as an opaque, pre-formatted target rather than something
/// it partitions itself -- a disk image written wholesale by `guided_dd`, or a device the probe
/// found with a file system the guided scenarios don't otherwise model. No partition list: the
/// whole device is the unit the action log records.
#[derive(Debug, Clone, PartialEq)]
pub struct ArbitraryDevice {
    pub device_path: PathBuf,
    pub filesystem: Option<FileSystem>,
    pub mount_point: Option<PathBuf>,
}

impl ArbitraryDevice {
    pub fn new(device_path: PathBuf) -> ArbitraryDevice {
        ArbitraryDevice { device_path, filesystem: None, mount_point: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_device_has_no_filesystem_or_mount() {
        let device = ArbitraryDevice::new("/dev/sdz".into());
        assert!(device.filesystem.is_none());
        assert!(device.mount_point.is_none());
    }
}
