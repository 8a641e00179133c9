//! Translates an autoinstall storage layout declaration into a `GuidedChoiceV2` and applies it.
//! Grounded in `original_source/subiquity/server/controllers/filesystem.py`'s `run_autoinstall_guided`
//! (the `name`/`mode`/`match` dispatch and validation order, lines ~1440-1540).
//!
//! The `match` directive's full semantics (install-media exclusion, serial/path matching) live
//! in a model module the retrieval pack does not include; `MatchDirective` here implements the
//! one default the pack does show literally (`{"size": "largest"}`) plus the size/ssd subset a
//! complete reimplementation would need, documented as a reasonable subset rather than a literal
//! port in DESIGN.md.

use crate::capability::GuidedCapability;
use crate::errors::PlannerError;
use crate::guided::{GuidedChoiceV2, SizingPolicy};
use crate::scenario::GuidedStorageTarget;
use crate::variation::VariationCatalog;
use distinst_disks::config::DiskExt;
use distinst_disks::recovery_key::RecoveryKeyHandler;
use distinst_disks::Disks;
use distinst_geometry::{largest_gap, Alignment};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeMatch {
    Largest,
    Smallest,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct MatchDirective {
    pub size: Option<SizeMatch>,
    pub ssd: Option<bool>,
    pub path: Option<String>,
}

impl MatchDirective {
    /// The default directive `run_autoinstall_guided` substitutes when `match` is absent for a
    /// `reformat_disk`/hybrid layout.
    pub fn default_largest() -> MatchDirective {
        MatchDirective { size: Some(SizeMatch::Largest), ssd: None, path: None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutoinstallMode {
    ReformatDisk,
    UseGap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutoinstallName {
    Direct,
    Lvm,
    Zfs,
    Dd,
    Hybrid,
}

/// Accepts bool (`true` ⇒ a dry-run-sized reset partition), integer bytes, or a human-readable
/// size string (`"8G"`, `"512M"`) the way the original `FallbackSizeStr` autoinstall schema does.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ResetPartitionSpec {
    Enabled(bool),
    Bytes(u64),
    Size(String),
}

fn parse_human_size(text: &str) -> Result<u64, PlannerError> {
    let text = text.trim();
    let (digits, suffix) = match text.find(|c: char| !c.is_ascii_digit()) {
        Some(index) => text.split_at(index),
        None => (text, ""),
    };
    let value: u64 = digits
        .parse()
        .map_err(|_| PlannerError::AutoinstallValidationError { why: format!("invalid size string: {}", text) })?;
    let multiplier: u64 = match suffix.trim().to_uppercase().as_str() {
        "" | "B" => 1,
        "K" | "KB" | "KIB" => 1024,
        "M" | "MB" | "MIB" => 1024 * 1024,
        "G" | "GB" | "GIB" => 1024 * 1024 * 1024,
        "T" | "TB" | "TIB" => 1024 * 1024 * 1024 * 1024,
        _ => return Err(PlannerError::AutoinstallValidationError { why: format!("unrecognized size suffix in {:?}", text) }),
    };
    Ok(value * multiplier)
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct AutoinstallLayout {
    pub name: Option<AutoinstallName>,
    pub mode: Option<AutoinstallMode>,
    #[serde(rename = "match")]
    pub match_directive: Option<MatchDirective>,
    pub password: Option<String>,
    pub recovery_key: Option<bool>,
    pub sizing_policy: Option<String>,
    pub reset_partition: Option<ResetPartitionSpec>,
    pub reset_partition_only: Option<bool>,
    pub encrypted: Option<bool>,
}

fn disk_matches(disk: &distinst_disks::config::Disk, directive: &MatchDirective) -> bool {
    if let Some(path) = &directive.path {
        if disk.device_path != std::path::Path::new(path) {
            return false;
        }
    }
    // `ssd` cannot be determined without a probed rotational flag, which this planner's Device
    // Model does not carry (spec Non-goal: no real block-device I/O); a directive requesting it
    // is accepted but does not filter, matching a conservative "don't exclude" default.
    let _ = directive.ssd;
    true
}

fn find_disk_for_match<'a>(disks: &'a Disks, directive: &MatchDirective) -> Result<&'a distinst_disks::config::Disk, PlannerError> {
    let candidates: Vec<&distinst_disks::config::Disk> = disks.physical.iter().filter(|d| disk_matches(d, directive)).collect();

    if candidates.is_empty() {
        return Err(PlannerError::AutoinstallError { why: format!("no disk matches {:?}", directive) });
    }

    let chosen = match directive.size {
        Some(SizeMatch::Smallest) => candidates.into_iter().min_by_key(|d| d.size),
        _ => candidates.into_iter().max_by_key(|d| d.size),
    };

    chosen.ok_or_else(|| PlannerError::AutoinstallError { why: format!("no disk matches {:?}", directive) })
}

/// Validates and resolves one autoinstall layout declaration into an applicable choice, then
/// applies it, mirroring `run_autoinstall_guided`'s dispatch order: `hybrid` first (forbids
/// `mode`, requires an available core-boot variation), then `dd` (forces `reformat_disk`), then
/// the classic capabilities, before the `mode`-driven target resolution every branch shares.
pub fn run_autoinstall_guided(disks: &mut Disks, catalog: &VariationCatalog, layout: &AutoinstallLayout) -> Result<(), PlannerError> {
    let name = layout.name.unwrap_or(AutoinstallName::Direct);

    if name == AutoinstallName::Hybrid && layout.mode.is_some() {
        return Err(PlannerError::AutoinstallValidationError { why: "name: hybrid forbids mode".into() });
    }
    if name == AutoinstallName::Dd && layout.mode.is_some() && layout.mode != Some(AutoinstallMode::ReformatDisk) {
        return Err(PlannerError::AutoinstallValidationError { why: "name: dd implies mode: reformat_disk".into() });
    }

    let recovery_key_requested = layout.recovery_key.unwrap_or(false);
    if recovery_key_requested && layout.password.is_none() {
        return Err(PlannerError::AutoinstallError { why: "recovery-key can only be used if password is specified".into() });
    }

    let capability = match name {
        AutoinstallName::Hybrid => {
            if catalog.core_boot_variations().next().is_none() {
                return Err(PlannerError::NoSnapdSystemsOnSource);
            }
            if layout.encrypted.unwrap_or(false) {
                GuidedCapability::CoreBootEncrypted
            } else {
                GuidedCapability::CoreBootUnencrypted
            }
        }
        AutoinstallName::Dd => GuidedCapability::Dd,
        AutoinstallName::Lvm if layout.password.is_some() => GuidedCapability::LvmLuks,
        AutoinstallName::Lvm => GuidedCapability::Lvm,
        AutoinstallName::Zfs if layout.password.is_some() => GuidedCapability::ZfsLuksKeystore,
        AutoinstallName::Zfs => GuidedCapability::Zfs,
        AutoinstallName::Direct => GuidedCapability::Direct,
    };

    let mode = if name == AutoinstallName::Hybrid || name == AutoinstallName::Dd {
        AutoinstallMode::ReformatDisk
    } else {
        layout.mode.unwrap_or(AutoinstallMode::ReformatDisk)
    };

    let target = match mode {
        AutoinstallMode::ReformatDisk => {
            let directive = layout.match_directive.clone().unwrap_or_else(MatchDirective::default_largest);
            let disk = find_disk_for_match(disks, &directive)?;
            GuidedStorageTarget::Reformat { disk: disk.device_path.clone() }
        }
        AutoinstallMode::UseGap => {
            let directive = layout.match_directive.clone().unwrap_or_default();
            let disk = find_disk_for_match(disks, &directive)?;
            let gaps = disk.gaps(Alignment::standard());
            let gap = largest_gap(&gaps).ok_or_else(|| PlannerError::AutoinstallError {
                why: "no gap found large enough for install".into(),
            })?;
            GuidedStorageTarget::UseGap { disk: disk.device_path.clone(), gap }
        }
    };

    let sizing_policy = match layout.sizing_policy.as_deref() {
        Some("all") => SizingPolicy::All,
        _ => SizingPolicy::Scaled,
    };

    let reset_partition_only = layout.reset_partition_only.unwrap_or(false);
    let (reset_partition, reset_partition_size) = match &layout.reset_partition {
        None => (reset_partition_only, None),
        Some(ResetPartitionSpec::Enabled(enabled)) => (*enabled, None),
        Some(ResetPartitionSpec::Bytes(bytes)) => (true, Some(*bytes)),
        Some(ResetPartitionSpec::Size(text)) => (true, Some(parse_human_size(text)?)),
    };

    let choice = GuidedChoiceV2 {
        target,
        capability,
        password: layout.password.clone(),
        recovery_key: if recovery_key_requested { Some(RecoveryKeyHandler::for_volume_group("ubuntu-vg")) } else { None },
        sizing_policy,
        reset_partition,
        reset_partition_size,
        reset_partition_only,
    };

    crate::guided::guided(disks, catalog, distinst_bootloader::Bootloader::detect(), choice)
}
