pub use disk_types::PartitionSizeError;
use disk_types::{FileSystem, PartitionTableError};
use distinst_geometry::GeometryError;
use std::path::PathBuf;

/// Defines a variety of errors that may arise from configuring and committing changes to disks.
///
/// Unlike the teacher this is adapted from, no variant here can arise from a real I/O failure:
/// this crate performs no disk access, so every `DiskError` is, by construction, a planner bug --
/// a violated invariant caught before it could be handed to the action executor.
#[rustfmt::skip]
#[derive(Debug, Fail)]
pub enum DiskError {
    #[fail(display = "unable to find disk at {:?}", device)]
    DiskGet { device: PathBuf },
    #[fail(display = "serial model does not match")]
    InvalidSerial,
    #[fail(display = "the root partition may not be contained on a key-encrypted volume")]
    KeyContainsRoot,
    #[fail(display = "LUKS key path was already set for {}", id)]
    KeyPathAlreadySet { id: String },
    #[fail(display = "partition layout on disk has changed")]
    LayoutChanged,
    #[fail(display = "logical partition '{}-{}' does not exist", group, volume)]
    LogicalPartitionNotFound { group: String, volume: String },
    #[fail(display = "new partition could not be found")]
    NewPartNotFound,
    #[fail(display = "partition error ({:?}): {}", partition, why)]
    PartitionError { partition: PathBuf, why: PartitionError },
    #[fail(display = "partition {} not found on disk", partition)]
    PartitionNotFound { partition: i32 },
    #[fail(display = "partition exceeds size of disk")]
    PartitionOOB,
    #[fail(display = "{}", why)]
    PartitionTable { why: PartitionTableError },
    #[fail(display = "multiple devices had the same volume group: currently unsupported")]
    SameGroup,
    #[fail(display = "sector overlaps partition {}", id)]
    SectorOverlaps { id: i32 },
    #[fail(display = "unable to create volume group '{}' on {:?}", vg, device)]
    VolumeGroupCreate { device: PathBuf, vg: String },
    #[fail(display = "logical partition on {:?} lacks a label", device)]
    VolumePartitionLacksLabel { device: PathBuf },
    #[fail(display = "{}", why)]
    Geometry { why: GeometryError },
}

#[derive(Debug, Fail)]
/// An error that involves partitions.
pub enum PartitionError {
    #[fail(display = "no file system was found on the partition")]
    NoFilesystem,
    #[fail(display = "partition overlaps other partitions")]
    PartitionOverlaps,
    #[fail(display = "partition was too large (size: {}, max: {})", size, max)]
    PartitionTooLarge { size: u64, max: u64 },
    #[fail(display = "partition was too small (size: {}, min: {})", size, min)]
    PartitionTooSmall { size: u64, min: u64 },
    #[fail(display = "partition resize value is too small")]
    ResizeTooSmall,
    #[fail(display = "shrink value too high")]
    ShrinkValueTooHigh,
    #[fail(display = "shrinking not supported for {:?}", fs)]
    UnsupportedShrinking { fs: FileSystem },
}

impl DiskError {
    pub fn new_partition_error<E: Into<PartitionError>>(partition: PathBuf, why: E) -> DiskError {
        DiskError::PartitionError { partition, why: why.into() }
    }
}

impl From<PartitionSizeError> for PartitionError {
    fn from(err: PartitionSizeError) -> PartitionError {
        match err {
            PartitionSizeError::TooSmall(size, min) => PartitionError::PartitionTooSmall { size, min },
            PartitionSizeError::TooLarge(size, max) => PartitionError::PartitionTooLarge { size, max },
        }
    }
}

impl From<PartitionTableError> for DiskError {
    fn from(why: PartitionTableError) -> DiskError { DiskError::PartitionTable { why } }
}

impl From<GeometryError> for DiskError {
    fn from(why: GeometryError) -> DiskError { DiskError::Geometry { why } }
}
