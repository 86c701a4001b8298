use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::Maintenance;

impl Maintenance {
    /// Spawns the maintenance loop: one pass right away if the last one is
    /// overdue, then one pass every interval until `cancel` fires. A pass in
    /// flight at cancellation is dropped where it stands.
    pub fn start_auto_maintenance(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let period = self.config.interval;
            info!(interval_secs = period.as_secs(), "maintenance scheduler started");

            if self.is_overdue().await {
                info!("maintenance overdue, running startup pass");
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!(passes = self.passes_completed(), "maintenance scheduler stopped");
                        return;
                    }
                    _ = self.perform_maintenance() => {}
                }
            }

            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = self.perform_maintenance() => {}
                }
            }
            info!(passes = self.passes_completed(), "maintenance scheduler stopped");
        })
    }
}
