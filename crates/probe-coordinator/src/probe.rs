//! Drives the two-phase probe sequence and the lock/queue protocol that keeps a completed probe
//! from clobbering a manual edit in progress (spec §4.6, LP#1954848).

use crate::single_instance::SingleInstanceTask;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::process::Command;

/// Probe result snapshots, persisted verbatim as `probe-data.json` / `probe-data-restricted.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProbeSnapshot {
    pub blockdev: BTreeMap<String, serde_json::Value>,
    pub filesystem: BTreeMap<String, serde_json::Value>,
    pub dasd: BTreeMap<String, serde_json::Value>,
    pub os: Option<BTreeMap<String, serde_json::Value>>,
    pub nvme: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeState {
    Idle,
    Probing,
    Ready,
    Configured,
}

#[derive(Debug, Clone)]
pub struct PlannerConfig {
    pub probe_timeout: Duration,
    pub os_prober_enabled: bool,
    pub udev_retry_interval: Duration,
}

impl Default for PlannerConfig {
    fn default() -> PlannerConfig {
        PlannerConfig {
            probe_timeout: Duration::from_secs(90),
            os_prober_enabled: false,
            udev_retry_interval: Duration::from_millis(100),
        }
    }
}

impl PlannerConfig {
    fn phase_timeout(&self) -> Duration {
        if self.os_prober_enabled {
            self.probe_timeout * 2
        } else {
            self.probe_timeout
        }
    }
}

/// One phase's worth of probe failures, keyed by whether the phase was restricted.
pub type PhaseErrors = BTreeMap<bool, String>;

/// Runs `subiquity-probe-helper <mode>` the way `external.rs::exec()` invokes any other
/// subprocess: arguments built up-front, stdout captured, a non-zero exit treated as failure.
/// `mode` selects which probe categories the helper gathers, per phase.
async fn run_probe_helper(mode: &str, timeout: Duration) -> Result<ProbeSnapshot, String> {
    let run = async {
        let output = Command::new("subiquity-probe-helper")
            .arg(mode)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .output()
            .await
            .map_err(|e| e.to_string())?;

        if !output.status.success() {
            return Err(format!("subiquity-probe-helper {} failed with {:?}", mode, output.status.code()));
        }

        serde_json::from_slice(&output.stdout).map_err(|e| e.to_string())
    };

    match tokio::time::timeout(timeout, run).await {
        Ok(result) => result,
        Err(_) => Err(format!("probe phase '{}' timed out after {:?}", mode, timeout)),
    }
}

/// Coordinates the probe lifecycle: `Idle → Probing → Ready → Configured`, guarded by
/// `locked_probe_data` once a manual transaction has begun.
pub struct ProbeCoordinator {
    config: PlannerConfig,
    state: Mutex<ProbeState>,
    locked: AtomicBool,
    pub(crate) once_task: SingleInstanceTask,
    pub(crate) task: SingleInstanceTask,
    current: Mutex<Option<ProbeSnapshot>>,
    restricted: Mutex<Option<ProbeSnapshot>>,
    queued: Mutex<Option<ProbeSnapshot>>,
    errors: Mutex<PhaseErrors>,
}

impl ProbeCoordinator {
    pub fn new(config: PlannerConfig) -> ProbeCoordinator {
        ProbeCoordinator {
            config,
            state: Mutex::new(ProbeState::Idle),
            locked: AtomicBool::new(false),
            once_task: SingleInstanceTask::new(),
            task: SingleInstanceTask::new(),
            current: Mutex::new(None),
            restricted: Mutex::new(None),
            queued: Mutex::new(None),
            errors: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn state(&self) -> ProbeState { *self.state.lock().unwrap() }

    pub fn is_locked(&self) -> bool { self.locked.load(Ordering::SeqCst) }

    /// Entered the first time the user starts a manual-partitioning transaction. From then on,
    /// a completed probe is queued rather than applied.
    pub fn ensure_transaction(&self) { self.locked.store(true, Ordering::SeqCst); }

    /// Runs both probe phases sequentially, storing each phase's result (or error) as it
    /// completes. If the model has since been `Configured`, any result that arrives is dropped
    /// on the floor -- the user's edits win (LP#1954848).
    async fn run_phases(&self) {
        info!("probe: Idle -> Probing");
        *self.state.lock().unwrap() = ProbeState::Probing;

        let unrestricted_mode = if self.config.os_prober_enabled { "defaults,filesystem_sizing,os" } else { "defaults,filesystem_sizing" };
        let unrestricted = run_probe_helper(unrestricted_mode, self.config.phase_timeout()).await;
        match unrestricted {
            Ok(snapshot) => self.apply_result(snapshot, false),
            Err(why) => {
                warn!("probe: unrestricted phase failed: {}", why);
                self.errors.lock().unwrap().insert(false, why);
            }
        }

        let restricted = run_probe_helper("blockdev,filesystem,nvme", self.config.phase_timeout()).await;
        match restricted {
            Ok(snapshot) => self.apply_result(snapshot, true),
            Err(why) => {
                warn!("probe: restricted phase failed: {}", why);
                self.errors.lock().unwrap().insert(true, why);
            }
        }

        let mut state = self.state.lock().unwrap();
        if *state == ProbeState::Probing {
            info!("probe: Probing -> Ready");
            *state = ProbeState::Ready;
        }
    }

    fn apply_result(&self, snapshot: ProbeSnapshot, restricted: bool) {
        if *self.state.lock().unwrap() == ProbeState::Configured {
            warn!("probe: discarding a result that arrived after the model was Configured");
            return;
        }

        if self.is_locked() {
            warn!("probe: queuing a result while a manual transaction is locked");
            *self.queued.lock().unwrap() = Some(snapshot);
            return;
        }

        if restricted {
            *self.restricted.lock().unwrap() = Some(snapshot);
        } else {
            *self.current.lock().unwrap() = Some(snapshot);
        }
    }

    /// Starts `probe_task`: a no-op if a probe is already running.
    pub fn start_probe(self: &std::sync::Arc<Self>) -> bool {
        let this = self.clone();
        self.task.start(async move { this.run_phases().await })
    }

    pub async fn wait_for_probe(&self) { self.task.wait().await; }

    pub fn mark_configured(&self) {
        info!("probe: -> Configured");
        *self.state.lock().unwrap() = ProbeState::Configured;
    }

    /// The current unrestricted snapshot, if any, without touching the lock or queue.
    pub fn snapshot(&self) -> Option<ProbeSnapshot> { self.current.lock().unwrap().clone() }

    /// Consumes and applies `queued`, if a probe arrived while locked; otherwise falls back to
    /// whatever the last unlocked probe produced.
    pub fn reset(&self) -> Option<ProbeSnapshot> {
        self.locked.store(false, Ordering::SeqCst);
        if let Some(queued) = self.queued.lock().unwrap().take() {
            info!("probe: reset applying a queued result");
            *self.current.lock().unwrap() = Some(queued.clone());
            return Some(queued);
        }
        self.current.lock().unwrap().clone()
    }

    pub fn errors(&self) -> PhaseErrors { self.errors.lock().unwrap().clone() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_timeout_doubles_with_os_prober() {
        let mut config = PlannerConfig::default();
        assert_eq!(config.phase_timeout(), Duration::from_secs(90));
        config.os_prober_enabled = true;
        assert_eq!(config.phase_timeout(), Duration::from_secs(180));
    }

    #[test]
    fn locked_probe_is_queued_not_applied() {
        let coordinator = ProbeCoordinator::new(PlannerConfig::default());
        coordinator.ensure_transaction();
        coordinator.apply_result(ProbeSnapshot::default(), false);
        assert!(coordinator.current.lock().unwrap().is_none());
        assert!(coordinator.queued.lock().unwrap().is_some());
    }

    #[test]
    fn configured_model_discards_late_probe_result() {
        let coordinator = ProbeCoordinator::new(PlannerConfig::default());
        coordinator.mark_configured();
        coordinator.apply_result(ProbeSnapshot::default(), false);
        assert!(coordinator.current.lock().unwrap().is_none());
        assert!(coordinator.queued.lock().unwrap().is_none());
    }

    #[test]
    fn reset_applies_queued_result_and_unlocks() {
        let coordinator = ProbeCoordinator::new(PlannerConfig::default());
        coordinator.ensure_transaction();
        coordinator.apply_result(ProbeSnapshot::default(), false);
        assert!(coordinator.is_locked());

        let applied = coordinator.reset();
        assert!(applied.is_some());
        assert!(!coordinator.is_locked());
        assert!(coordinator.current.lock().unwrap().is_some());
    }
}
