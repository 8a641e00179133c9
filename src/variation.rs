//! Per-source-variation metadata: minimum install size and, for core-boot sources, the external
//! system's declared on-disk layout (spec component C5). Grounded alongside `capability.rs` in
//! `original_source/subiquity/server/controllers/filesystem.py`'s `VariationInfo.classic`/`.dd`
//! and `info_for_system`.

use crate::capability::{CapabilityInfo, GuidedCapability, CLASSIC_CAPABILITIES, DD_CAPABILITIES};
use crate::system::SystemDetails;

#[derive(Debug, Clone, PartialEq)]
pub struct VariationInfo {
    pub name: String,
    /// Presence marks this as a core-boot-classic variation.
    pub label: Option<String>,
    pub min_size: u64,
    pub capability_info: CapabilityInfo,
    pub external_system_layout: Option<SystemDetails>,
}

impl VariationInfo {
    /// A conventional (non-core-boot) source variation: `ubuntu`, `ubuntu-server`, etc.
    pub fn classic(name: impl Into<String>, min_size: u64) -> VariationInfo {
        VariationInfo {
            name: name.into(),
            label: None,
            min_size,
            capability_info: CapabilityInfo::from_allowed(CLASSIC_CAPABILITIES.iter().copied()),
            external_system_layout: None,
        }
    }

    /// A disk-image ("dd") source variation.
    pub fn dd(name: impl Into<String>, min_size: u64) -> VariationInfo {
        VariationInfo {
            name: name.into(),
            label: None,
            min_size,
            capability_info: CapabilityInfo::from_allowed(DD_CAPABILITIES.iter().copied()),
            external_system_layout: None,
        }
    }

    /// Builds a core-boot variation from the external system service's layout for one labeled
    /// system. The system must declare exactly one volume, with a GPT schema; `min_size` is the
    /// tail offset of its last structure.
    pub fn info_for_system(name: impl Into<String>, label: impl Into<String>, system: SystemDetails, capability_info: CapabilityInfo) -> Option<VariationInfo> {
        if system.volumes.len() != 1 {
            return None;
        }
        let volume = system.volumes.values().next().expect("checked len == 1 above");
        if volume.schema != "gpt" {
            return None;
        }
        let min_size = volume.min_size()?;

        Some(VariationInfo { name: name.into(), label: Some(label.into()), min_size, capability_info, external_system_layout: Some(system) })
    }

    pub fn is_core_boot(&self) -> bool {
        self.label.is_some()
    }
}

/// The immutable set of variations offered by the installation source for the current session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariationCatalog {
    pub variations: Vec<VariationInfo>,
}

impl VariationCatalog {
    pub fn new(variations: Vec<VariationInfo>) -> VariationCatalog {
        VariationCatalog { variations }
    }

    pub fn classic_variations(&self) -> impl Iterator<Item = &VariationInfo> {
        self.variations.iter().filter(|v| !v.is_core_boot())
    }

    pub fn core_boot_variations(&self) -> impl Iterator<Item = &VariationInfo> {
        self.variations.iter().filter(|v| v.is_core_boot())
    }

    /// Union of every variation's capability info, as `Reformat` scenarios require: a capability
    /// is offered if any variation on the source supports it.
    pub fn combined_capability_info(&self) -> CapabilityInfo {
        self.variations.iter().fold(CapabilityInfo::default(), |acc, v| acc.combine(v.capability_info.clone()))
    }

    pub fn resolve(&self, capability: GuidedCapability) -> Result<&VariationInfo, crate::errors::PlannerError> {
        let infos: Vec<&CapabilityInfo> = self.variations.iter().map(|v| &v.capability_info).collect();
        crate::capability::set_info_for_capability(capability, infos)?;
        self.variations
            .iter()
            .find(|v| crate::capability::set_info_for_capability(capability, std::iter::once(&v.capability_info)).is_ok())
            .ok_or(crate::errors::PlannerError::NoVariationForCapability { capability })
    }
}
