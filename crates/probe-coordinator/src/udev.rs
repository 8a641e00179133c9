//! Debounces block-subsystem udev events into a single probe request, so a storm of add/remove
//! events from one partitioning operation doesn't trigger a probe per event.

use crate::probe::ProbeCoordinator;
use crate::single_instance::SingleInstanceTask;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;

/// Runs `udevadm settle -t 0` and reports whether the udev queue was idle.
async fn udev_queue_idle() -> bool {
    Command::new("udevadm")
        .args(["settle", "-t", "0"])
        .stdout(Stdio::null())
        .status()
        .await
        .map(|status| status.success())
        .unwrap_or(false)
}

/// On a block-subsystem event, settles the udev queue and starts a probe once it is idle,
/// retrying every `retry_interval` while events are still landing. Wrapped in a
/// `SingleInstanceTask` of its own so overlapping events debounce onto one debounce loop rather
/// than spawning one per event.
pub fn on_block_event(debounce: &SingleInstanceTask, coordinator: Arc<ProbeCoordinator>, retry_interval: Duration) -> bool {
    debounce.start(async move {
        loop {
            if udev_queue_idle().await {
                coordinator.start_probe();
                coordinator.wait_for_probe().await;
                return;
            }
            tokio::time::sleep(retry_interval).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::PlannerConfig;

    #[tokio::test]
    async fn overlapping_events_debounce_to_one_probe() {
        let debounce = SingleInstanceTask::new();
        let coordinator = Arc::new(ProbeCoordinator::new(PlannerConfig::default()));

        let started_first = on_block_event(&debounce, coordinator.clone(), Duration::from_millis(1));
        let started_second = on_block_event(&debounce, coordinator.clone(), Duration::from_millis(1));

        assert!(started_first);
        assert!(!started_second);

        debounce.wait().await;
    }
}
