//! The external system service's view of a core-boot install candidate:
//! `GET /v2/systems/{label}` responses, decoded with `serde` the way the rest of this crate's
//! external-facing types are.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EncryptionSupport {
    Defective,
    Disabled,
    Unavailable,
    Available,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorageSafety {
    Encrypted,
    PreferEncrypted,
    PreferUnencrypted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageEncryption {
    pub support: EncryptionSupport,
    pub storage_safety: Option<StorageSafety>,
    pub unavailable_reason: Option<String>,
}

/// One structure in a volume's declared on-disk layout, as reported by the external system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeStructure {
    pub role: String,
    pub name: Option<String>,
    pub size: u64,
    pub filesystem: Option<String>,
    pub gpt_type_guid: Option<String>,
    pub label: Option<String>,
    pub offset: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Volume {
    pub schema: String,
    pub structure: Vec<VolumeStructure>,
}

impl Volume {
    /// The minimum disk size this volume's layout would require: the tail end of its last
    /// structure, per `VariationCatalog::info_for_system`.
    pub fn min_size(&self) -> Option<u64> {
        self.structure.last().map(|s| s.offset.unwrap_or(0) + s.size)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemDetails {
    pub volumes: std::collections::BTreeMap<String, Volume>,
    pub storage_encryption: StorageEncryption,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_size_is_last_structure_tail() {
        let volume = Volume {
            schema: "gpt".into(),
            structure: vec![
                VolumeStructure { role: "system-seed".into(), name: None, size: 100, filesystem: None, gpt_type_guid: None, label: None, offset: Some(0) },
                VolumeStructure { role: "system-data".into(), name: None, size: 900, filesystem: None, gpt_type_guid: None, label: None, offset: Some(100) },
            ],
        };
        assert_eq!(volume.min_size(), Some(1000));
    }
}
