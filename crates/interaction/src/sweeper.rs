use tokio::time::Instant;
use tracing::info;

use crate::registry::{PendingWaitRegistry, WaiterId};

/// Arms one deadline timer per waiter. Resolution aborts the timer, so a
/// waiter is woken exactly once whichever happens first.
#[derive(Clone)]
pub struct DeadlineSweeper {
    registry: PendingWaitRegistry,
}

impl DeadlineSweeper {
    pub fn new(registry: PendingWaitRegistry) -> Self {
        Self { registry }
    }

    pub fn arm(&self, waiter: WaiterId, deadline: Instant) {
        let registry = self.registry.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if registry.expire(waiter) {
                info!(
                    event_name = "dialogue.prompt.timed_out",
                    waiter_id = waiter,
                    "prompt deadline elapsed without a response"
                );
            }
        });

        if !self.registry.attach_timer(waiter, task.abort_handle()) {
            task.abort();
        }
    }
}
