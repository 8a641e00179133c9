use crate::partition::PartitionType;
use serde::{Deserialize, Serialize};

/// Specifies whether the partition table on the disk is **MSDOS** or **GPT**, or absent.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Serialize, Deserialize)]
pub enum PartitionTable {
    Msdos,
    Gpt,
}

/// A possible error when validating the partition table.
#[derive(Debug, Fail, PartialEq, Eq)]
pub enum PartitionTableError {
    #[fail(display = "primary partitions exceeded on partition table")]
    PrimaryPartitionsExceeded,
    #[fail(display = "partition table not found")]
    NotFound,
}

/// Counts of primary partitions, logical partitions, and whether an extended
/// partition is present -- the inputs `supports_additional_partition_type` needs.
#[derive(Debug, Clone, Copy, Default)]
pub struct PartitionCounts {
    pub primary: usize,
    pub logical: usize,
    pub extended: bool,
}

impl PartitionCounts {
    pub fn count<I: IntoIterator<Item = PartitionType>>(types: I) -> PartitionCounts {
        types.into_iter().fold(PartitionCounts::default(), |mut sum, part| {
            match part {
                PartitionType::Primary => sum.primary += 1,
                PartitionType::Logical => sum.logical += 1,
                PartitionType::Extended => sum.extended = true,
            }
            sum
        })
    }
}

/// Checks whether a new partition of `new_type` can be added to a table of schema
/// `table`, given the existing partition counts.
///
/// On GPT, up to 128 primary partitions are permitted and there is no logical/extended
/// concept, so only a plain primary count is ever relevant (enforced by the caller, not
/// here, since GPT's only limit is the 128-entry table).
pub fn supports_additional_partition_type(
    table: PartitionTable,
    new_type: PartitionType,
    counts: PartitionCounts,
) -> Result<(), PartitionTableError> {
    match table {
        PartitionTable::Gpt => Ok(()),
        PartitionTable::Msdos => {
            if new_type == PartitionType::Primary {
                if counts.primary >= 4 || (counts.primary >= 3 && (counts.extended || counts.logical != 0)) {
                    return Err(PartitionTableError::PrimaryPartitionsExceeded);
                }
            } else if counts.primary >= 4 {
                return Err(PartitionTableError::PrimaryPartitionsExceeded);
            }

            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn msdos_primary_limit() {
        let counts = PartitionCounts::count(vec![
            PartitionType::Primary,
            PartitionType::Primary,
            PartitionType::Primary,
            PartitionType::Primary,
        ]);

        assert_eq!(
            supports_additional_partition_type(PartitionTable::Msdos, PartitionType::Primary, counts),
            Err(PartitionTableError::PrimaryPartitionsExceeded)
        );
        assert_eq!(
            supports_additional_partition_type(PartitionTable::Msdos, PartitionType::Logical, counts),
            Err(PartitionTableError::PrimaryPartitionsExceeded)
        );
    }

    #[test]
    fn msdos_logical_after_extended() {
        let counts = PartitionCounts::count(vec![
            PartitionType::Primary,
            PartitionType::Primary,
            PartitionType::Primary,
            PartitionType::Extended,
            PartitionType::Logical,
            PartitionType::Logical,
        ]);

        assert_eq!(
            supports_additional_partition_type(PartitionTable::Msdos, PartitionType::Primary, counts),
            Err(PartitionTableError::PrimaryPartitionsExceeded)
        );
        assert!(supports_additional_partition_type(PartitionTable::Msdos, PartitionType::Logical, counts).is_ok());
    }

    #[test]
    fn gpt_has_no_logical_restriction() {
        let counts = PartitionCounts::count(vec![PartitionType::Primary; 10]);
        assert!(supports_additional_partition_type(PartitionTable::Gpt, PartitionType::Primary, counts).is_ok());
    }
}
