use disk_types::FileSystem;
use serde::{Deserialize, Serialize};

/// Describes a LUKS-encrypted physical volume, whether it backs an LVM PV or a bare
/// filesystem. Adapted from the teacher's `LuksEncryption`/`LvmEncryption`: this crate keeps
/// a single representation (one struct, not two near-duplicates) since it never needs to
/// distinguish "LVM-on-LUKS" from "LUKS-on-LVM" wiring at the type level -- both are simply
/// a `Partition` whose `encryption` field is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LuksEncryption {
    /// The name the decrypted mapper device will be opened as.
    pub physical_volume: String,
    pub password: Option<String>,
    /// The file system that exists within the encrypted volume, once opened.
    pub filesystem: FileSystem,
}

impl LuksEncryption {
    pub fn new(physical_volume: String, password: Option<String>, filesystem: FileSystem) -> LuksEncryption {
        LuksEncryption { physical_volume, password, filesystem }
    }
}

/// Optional metadata describing where a generated recovery key should be persisted.
/// The key itself is generated lazily -- this struct only carries the *handler*.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryKeyHandler {
    /// Directory the key file should be written beneath (resolved via `dirs`).
    pub destination: Option<std::path::PathBuf>,
    pub filename_suffix: String,
}

impl RecoveryKeyHandler {
    /// The teacher's naming convention: `recovery-key-<vg-or-pool-name>.txt`.
    pub fn for_volume_group(vg: &str) -> RecoveryKeyHandler {
        RecoveryKeyHandler { destination: None, filename_suffix: format!("recovery-key-{}.txt", vg) }
    }

    pub fn filename(&self) -> &str { &self.filename_suffix }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovery_key_filename_matches_convention() {
        let handler = RecoveryKeyHandler::for_volume_group("ubuntu-vg");
        assert_eq!(handler.filename(), "recovery-key-ubuntu-vg.txt");
    }
}
