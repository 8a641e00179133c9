//! Pure alignment and gap-derivation math for partition layout (spec component C1).
//!
//! Gaps are *derived state*: nothing here is cached. Every query walks the partition
//! extents it is given and recomputes the free regions from scratch, per the teacher's
//! "recompute, never cache" philosophy for anything whose staleness would be a bug
//! (`distinst`'s `Disks::diff`/`commit` pair exists precisely because the alternative --
//! keeping a derived view in sync by hand -- is where that kind of bug lives).

#[macro_use]
extern crate failure_derive;

use disk_types::{PartitionCounts, PartitionTable, PartitionType};

/// Minimum start offset, partition/end alignment, and extended-partition overhead for a disk.
#[derive(Debug, Clone, Copy)]
pub struct Alignment {
    pub min_start_offset: u64,
    pub part_align: u64,
    pub end_overhead: u64,
    /// Space reserved ahead of the first logical partition in an extended partition.
    pub logical_spacer: u64,
}

impl Alignment {
    /// The alignment distinst itself uses: 1 MiB partition alignment, a 1 MiB logical spacer
    /// (`1_024_000 / 512 + 1` sectors in the teacher's sector-based arithmetic, expressed here
    /// in bytes since this crate never probes a sector size).
    pub fn standard() -> Alignment {
        const MIB: u64 = 1024 * 1024;
        Alignment { min_start_offset: MIB, part_align: MIB, end_overhead: MIB, logical_spacer: MIB }
    }
}

/// A partition's extent on a disk, as far as geometry math is concerned.
#[derive(Debug, Clone, Copy)]
pub struct PartitionExtent {
    pub offset: u64,
    pub size: u64,
    pub part_type: PartitionType,
}

impl PartitionExtent {
    pub fn end(&self) -> u64 { self.offset + self.size }
}

/// A free region on a disk. Always derived from [`gaps`]; never stored on the disk itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gap {
    pub device_id: u64,
    pub offset: u64,
    pub size: u64,
    pub in_extended: bool,
}

#[derive(Debug, Fail, PartialEq, Eq)]
pub enum GeometryError {
    #[fail(display = "no gap at offset {}", offset)]
    GapNotFound { offset: u64 },
    #[fail(display = "value {} is not aligned to {}", value, alignment)]
    AlignmentError { value: u64, alignment: u64 },
}

/// Rounds `x` up to the nearest multiple of `a`.
pub fn align_up(x: u64, a: u64) -> u64 {
    if a == 0 {
        return x;
    }
    let rem = x % a;
    if rem == 0 {
        x
    } else {
        x + (a - rem)
    }
}

/// Rounds `x` down to the nearest multiple of `a`.
pub fn align_down(x: u64, a: u64) -> u64 {
    if a == 0 {
        return x;
    }
    x - (x % a)
}

/// Computes every free region on a disk between `alignment.min_start_offset` and
/// `disk_size - alignment.end_overhead`, subtracting the space occupied by an extended
/// partition's logical spacer where applicable. Deterministic; adjacent gaps never occur
/// (they are merged by construction, since we walk the sorted partition list once).
pub fn gaps(device_id: u64, disk_size: u64, alignment: Alignment, partitions: &[PartitionExtent]) -> Vec<Gap> {
    let mut sorted: Vec<&PartitionExtent> = partitions.iter().collect();
    sorted.sort_by_key(|p| p.offset);

    let usable_end = disk_size.saturating_sub(alignment.end_overhead);
    let mut gaps = Vec::new();
    let mut cursor = alignment.min_start_offset;

    for part in sorted {
        // Extended partitions carry no free space of their own; their logicals do, and
        // those logicals appear as their own entries in `partitions`.
        if part.part_type == PartitionType::Extended {
            continue;
        }

        if part.offset > cursor {
            gaps.push(Gap {
                device_id,
                offset: cursor,
                size: part.offset - cursor,
                in_extended: false,
            });
        }

        cursor = cursor.max(part.end());
    }

    if cursor < usable_end {
        gaps.push(Gap { device_id, offset: cursor, size: usable_end - cursor, in_extended: false });
    }

    gaps
}

/// Of a set of already-derived gaps (whether from one disk or many), finds the largest,
/// breaking ties by lower device id then lower offset.
pub fn largest_gap(gaps: &[Gap]) -> Option<Gap> {
    gaps.iter()
        .copied()
        .max_by(|a, b| {
            a.size
                .cmp(&b.size)
                .then_with(|| b.device_id.cmp(&a.device_id))
                .then_with(|| b.offset.cmp(&a.offset))
        })
}

/// The gap whose offset equals `offset` exactly.
pub fn at_offset(gaps: &[Gap], offset: u64) -> Result<Gap, GeometryError> {
    gaps.iter().copied().find(|g| g.offset == offset).ok_or(GeometryError::GapNotFound { offset })
}

/// The smallest-offset gap strictly after `offset`.
pub fn after(gaps: &[Gap], offset: u64) -> Option<Gap> {
    gaps.iter().copied().filter(|g| g.offset > offset).min_by_key(|g| g.offset)
}

/// The gap remaining within `original`'s span after some of it was consumed (e.g. by a
/// boot-planner mutation). `gaps` must be freshly re-derived from the mutated disk; this
/// never caches a value across mutations.
pub fn within(gaps: &[Gap], original: Gap) -> Option<Gap> {
    gaps.iter()
        .copied()
        .filter(|g| g.offset >= original.offset && g.offset < original.offset + original.size)
        .min_by_key(|g| g.offset)
}

/// Schema-specific count of additional primary partitions a disk can still accept.
/// For `msdos`, an implicit extended partition (if one does not yet exist but logicals
/// would require one) is accounted for by `disk_types::supports_additional_partition_type`
/// at the point a partition is actually added; here we report the simple numeric bound.
pub fn remaining_primary_partitions(table: PartitionTable, partitions: &[PartitionExtent]) -> usize {
    let counts = PartitionCounts::count(partitions.iter().map(|p| p.part_type));
    match table {
        PartitionTable::Gpt => 128 - counts.primary,
        PartitionTable::Msdos => {
            let cap = if counts.extended || counts.logical > 0 { 3 } else { 4 };
            cap.saturating_sub(counts.primary)
        }
    }
}

impl Gap {
    /// Splits the leading `size`-byte region off this gap, aligned to `part_align`. Returns
    /// the leading gap and whatever remains (or `None` if nothing is left). If this gap lies
    /// within an extended partition, the remainder begins after the 1 MiB logical spacer.
    pub fn split(self, size: u64, alignment: Alignment) -> (Gap, Option<Gap>) {
        let aligned_size = align_up(size, alignment.part_align).min(self.size);
        let leading = Gap { device_id: self.device_id, offset: self.offset, size: aligned_size, in_extended: self.in_extended };

        let mut remainder_offset = self.offset + aligned_size;
        if self.in_extended {
            remainder_offset += alignment.logical_spacer;
        }

        if remainder_offset >= self.offset + self.size {
            (leading, None)
        } else {
            let remainder = Gap {
                device_id: self.device_id,
                offset: remainder_offset,
                size: (self.offset + self.size) - remainder_offset,
                in_extended: self.in_extended,
            };
            (leading, Some(remainder))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extent(offset: u64, size: u64) -> PartitionExtent {
        PartitionExtent { offset, size, part_type: PartitionType::Primary }
    }

    #[test]
    fn align_up_down_roundtrip() {
        assert_eq!(align_up(1, 1024 * 1024), 1024 * 1024);
        assert_eq!(align_up(1024 * 1024, 1024 * 1024), 1024 * 1024);
        assert_eq!(align_down(1024 * 1024 + 5, 1024 * 1024), 1024 * 1024);
    }

    #[test]
    fn gap_coverage_empty_disk() {
        let align = Alignment::standard();
        let disk_size = 100 * 1024 * 1024 * 1024u64;
        let g = gaps(0, disk_size, align, &[]);
        assert_eq!(g.len(), 1);
        assert_eq!(g[0].offset, align.min_start_offset);
        assert_eq!(g[0].size, disk_size - align.min_start_offset - align.end_overhead);
    }

    #[test]
    fn gap_coverage_with_one_partition() {
        let align = Alignment::standard();
        let disk_size = 100 * 1024 * 1024 * 1024u64;
        let parts = [extent(align.min_start_offset, 40 * 1024 * 1024 * 1024)];
        let g = gaps(0, disk_size, align, &parts);
        assert_eq!(g.len(), 1);
        assert_eq!(g[0].offset, parts[0].end());

        let total_partitions: u64 = parts.iter().map(|p| p.size).sum();
        let total_gaps: u64 = g.iter().map(|gap| gap.size).sum();
        let usable = disk_size - align.min_start_offset - align.end_overhead;
        assert_eq!(total_partitions + total_gaps, usable);
    }

    #[test]
    fn largest_gap_tie_break() {
        let gaps = vec![
            Gap { device_id: 1, offset: 0, size: 100, in_extended: false },
            Gap { device_id: 0, offset: 0, size: 100, in_extended: false },
        ];
        assert_eq!(largest_gap(&gaps).unwrap().device_id, 0);
    }

    #[test]
    fn split_in_extended_adds_spacer() {
        let align = Alignment::standard();
        let gap = Gap { device_id: 0, offset: align.min_start_offset, size: 10 * 1024 * 1024, in_extended: true };
        let (leading, remainder) = gap.split(2 * 1024 * 1024, align);
        assert_eq!(leading.size, 2 * 1024 * 1024);
        let remainder = remainder.unwrap();
        assert_eq!(remainder.offset, leading.offset + leading.size + align.logical_spacer);
    }

    #[test]
    fn split_exhausts_gap() {
        let align = Alignment::standard();
        let gap = Gap { device_id: 0, offset: 0, size: 2 * 1024 * 1024, in_extended: false };
        let (_, remainder) = gap.split(2 * 1024 * 1024, align);
        assert!(remainder.is_none());
    }

    #[test]
    fn remaining_primary_partitions_msdos() {
        let parts = [
            extent(0, 1),
            extent(1, 1),
            extent(2, 1),
        ];
        assert_eq!(remaining_primary_partitions(PartitionTable::Msdos, &parts), 1);
    }
}
