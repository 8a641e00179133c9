//! Computes which guided install capabilities a variation can offer on a given gap (spec
//! component C4). Grounded in `original_source/subiquity/server/controllers/filesystem.py`'s
//! `CapabilityInfo.combine`/`info_for_system`/`set_info_for_capability`; reimplemented here as a
//! sealed Rust enum with exhaustive matching rather than the original's open string-keyed dicts,
//! in the error-handling idiom `crates/disks/src/error.rs` established for this codebase.

use crate::errors::PlannerError;
use crate::system::{EncryptionSupport, StorageSafety};
use log::debug;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GuidedCapability {
    Direct,
    Lvm,
    LvmLuks,
    Zfs,
    ZfsLuksKeystore,
    Dd,
    CoreBootEncrypted,
    CoreBootUnencrypted,
    CoreBootPreferEncrypted,
    CoreBootPreferUnencrypted,
    Manual,
}

impl GuidedCapability {
    fn is_core_boot(self) -> bool {
        matches!(
            self,
            GuidedCapability::CoreBootEncrypted
                | GuidedCapability::CoreBootUnencrypted
                | GuidedCapability::CoreBootPreferEncrypted
                | GuidedCapability::CoreBootPreferUnencrypted
        )
    }
}

pub const CLASSIC_CAPABILITIES: &[GuidedCapability] =
    &[GuidedCapability::Direct, GuidedCapability::Lvm, GuidedCapability::LvmLuks, GuidedCapability::Zfs, GuidedCapability::ZfsLuksKeystore];

pub const DD_CAPABILITIES: &[GuidedCapability] = &[GuidedCapability::Dd];

/// The allowed/disallowed split for one variation against one candidate gap, with a reason
/// recorded for every disallowed capability.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilityInfo {
    pub allowed: BTreeSet<GuidedCapability>,
    pub disallowed: BTreeMap<GuidedCapability, String>,
}

impl CapabilityInfo {
    pub fn from_allowed(allowed: impl IntoIterator<Item = GuidedCapability>) -> CapabilityInfo {
        CapabilityInfo { allowed: allowed.into_iter().collect(), disallowed: BTreeMap::new() }
    }

    fn disallow_all(&mut self, reason: &str) {
        let allowed = std::mem::take(&mut self.allowed);
        for capability in allowed {
            self.disallowed.entry(capability).or_insert_with(|| reason.to_string());
        }
    }

    fn disallow_core_boot(&mut self, reason: &str) {
        let core_boot: Vec<_> = self.allowed.iter().copied().filter(|c| c.is_core_boot()).collect();
        for capability in core_boot {
            self.allowed.remove(&capability);
            self.disallowed.entry(capability).or_insert_with(|| reason.to_string());
        }
    }

    /// Applies the fixed-order filter chain §4.4 describes.
    pub fn apply_filters(&mut self, gap_size: u64, install_min: u64, firmware_is_uefi: bool, third_party_drivers: bool) {
        debug!("apply_filters: gap_size={}, install_min={}, uefi={}, third_party_drivers={}", gap_size, install_min, firmware_is_uefi, third_party_drivers);
        if gap_size < install_min {
            debug!("apply_filters: gap too small, disallowing every capability");
            self.disallow_all("TOO_SMALL");
            return;
        }
        if !firmware_is_uefi {
            debug!("apply_filters: firmware is not UEFI, disallowing core-boot capabilities");
            self.disallow_core_boot("NOT_UEFI");
        }
        if third_party_drivers {
            debug!("apply_filters: third-party drivers requested, disallowing core-boot capabilities");
            self.disallow_core_boot("THIRD_PARTY_DRIVERS");
        }
    }

    /// Merges two variations' capability infos for the `Reformat` scenario: union of allowed; a
    /// disallowed entry is dropped if any variation allows that capability; otherwise the first
    /// reason seen for it wins.
    pub fn combine(mut self, other: CapabilityInfo) -> CapabilityInfo {
        for capability in &other.allowed {
            self.disallowed.remove(capability);
        }
        for capability in &self.allowed {
            self.disallowed.remove(capability);
        }

        self.allowed.extend(other.allowed);

        for (capability, reason) in other.disallowed {
            if !self.allowed.contains(&capability) {
                self.disallowed.entry(capability).or_insert(reason);
            }
        }

        self
    }
}

/// Derives the initial core-boot capability set from the external system's encryption
/// descriptor, per §4.4's derivation table.
pub fn core_boot_initial_set(encryption_support: EncryptionSupport, storage_safety: Option<StorageSafety>, unavailable_reason: Option<&str>) -> CapabilityInfo {
    use EncryptionSupport::*;

    let mut info = CapabilityInfo::default();
    match encryption_support {
        Defective => {
            info.disallowed.insert(
                GuidedCapability::CoreBootEncrypted,
                unavailable_reason.unwrap_or("CORE_BOOT_ENCRYPTION_UNAVAILABLE").to_string(),
            );
        }
        Disabled => {
            info.allowed.insert(GuidedCapability::CoreBootUnencrypted);
            info.disallowed.insert(GuidedCapability::CoreBootEncrypted, "CORE_BOOT_ENCRYPTION_UNAVAILABLE".to_string());
        }
        Unavailable => {
            info.allowed.insert(GuidedCapability::CoreBootUnencrypted);
            info.disallowed.insert(
                GuidedCapability::CoreBootEncrypted,
                unavailable_reason.unwrap_or("CORE_BOOT_ENCRYPTION_UNAVAILABLE").to_string(),
            );
        }
        Available => match storage_safety {
            Some(StorageSafety::Encrypted) => { info.allowed.insert(GuidedCapability::CoreBootEncrypted); }
            Some(StorageSafety::PreferEncrypted) => { info.allowed.insert(GuidedCapability::CoreBootPreferEncrypted); }
            Some(StorageSafety::PreferUnencrypted) => { info.allowed.insert(GuidedCapability::CoreBootPreferUnencrypted); }
            None => { info.allowed.insert(GuidedCapability::CoreBootUnencrypted); }
        },
    }
    info
}

/// Resolves a requested capability against a set of variation capability infos. Requesting
/// `CORE_BOOT_ENCRYPTED` matches a variation allowing it or either "prefer" variant; requesting
/// `CORE_BOOT_UNENCRYPTED` is the symmetrical case. Everything else requires an exact match.
pub fn set_info_for_capability<'a>(requested: GuidedCapability, infos: impl IntoIterator<Item = &'a CapabilityInfo>) -> Result<&'a CapabilityInfo, PlannerError> {
    let candidates: &[GuidedCapability] = match requested {
        GuidedCapability::CoreBootEncrypted => {
            &[GuidedCapability::CoreBootEncrypted, GuidedCapability::CoreBootPreferEncrypted, GuidedCapability::CoreBootPreferUnencrypted]
        }
        GuidedCapability::CoreBootUnencrypted => {
            &[GuidedCapability::CoreBootUnencrypted, GuidedCapability::CoreBootPreferEncrypted, GuidedCapability::CoreBootPreferUnencrypted]
        }
        _ => std::slice::from_ref(&requested),
    };

    infos
        .into_iter()
        .find(|info| candidates.iter().any(|c| info.allowed.contains(c)))
        .ok_or(PlannerError::NoVariationForCapability { capability: requested })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn too_small_gap_disallows_everything() {
        let mut info = CapabilityInfo::from_allowed(CLASSIC_CAPABILITIES.iter().copied());
        info.apply_filters(1, 100, true, false);
        assert!(info.allowed.is_empty());
        assert_eq!(info.disallowed.len(), CLASSIC_CAPABILITIES.len());
    }

    #[test]
    fn non_uefi_disallows_only_core_boot() {
        let mut info = CapabilityInfo::from_allowed(vec![GuidedCapability::Direct, GuidedCapability::CoreBootUnencrypted]);
        info.apply_filters(1_000_000, 100, false, false);
        assert!(info.allowed.contains(&GuidedCapability::Direct));
        assert!(info.disallowed.contains_key(&GuidedCapability::CoreBootUnencrypted));
    }

    #[test]
    fn combine_drops_disallowed_when_any_variation_allows() {
        let a = CapabilityInfo { allowed: BTreeSet::new(), disallowed: [(GuidedCapability::Direct, "TOO_SMALL".into())].into() };
        let b = CapabilityInfo::from_allowed(vec![GuidedCapability::Direct]);
        let combined = a.combine(b);
        assert!(combined.allowed.contains(&GuidedCapability::Direct));
        assert!(!combined.disallowed.contains_key(&GuidedCapability::Direct));
    }

    #[test]
    fn core_boot_defective_disallows_encrypted_only() {
        let info = core_boot_initial_set(EncryptionSupport::Defective, None, Some("tpm missing"));
        assert!(info.allowed.is_empty());
        assert_eq!(info.disallowed.get(&GuidedCapability::CoreBootEncrypted).unwrap(), "tpm missing");
    }

    #[test]
    fn set_info_for_capability_matches_prefer_variants() {
        let info = CapabilityInfo::from_allowed(vec![GuidedCapability::CoreBootPreferEncrypted]);
        let resolved = set_info_for_capability(GuidedCapability::CoreBootEncrypted, std::iter::once(&info));
        assert!(resolved.is_ok());
    }

    #[test]
    fn set_info_for_capability_fails_without_match() {
        let info = CapabilityInfo::from_allowed(vec![GuidedCapability::Direct]);
        let resolved = set_info_for_capability(GuidedCapability::Zfs, std::iter::once(&info));
        assert!(resolved.is_err());
    }
}
