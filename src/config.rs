//! Top-level planner configuration. `distinst_probe_coordinator::PlannerConfig` already owns
//! every probe-timing knob, so this wraps it rather than duplicating its fields, adding only the
//! settings that sit above the probe layer -- where generated recovery-key files land.

use distinst_probe_coordinator::PlannerConfig as ProbeConfig;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    pub probe: ProbeConfig,
    /// Directory generated recovery-key text files are written beneath. `None` resolves to
    /// `dirs::home_dir()` at write time, matching `RecoveryKeyHandler`'s own default.
    pub recovery_key_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Config {
        Config { probe: ProbeConfig::default(), recovery_key_dir: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_no_explicit_recovery_key_dir() {
        let config = Config::default();
        assert!(config.recovery_key_dir.is_none());
    }
}
