//! Quartz pass: source labels and routing through the worker pool

use super::types::RefreshScope;
use crate::error::Result;
use crate::fetch_scheduler::FetchScheduler;
use crate::integration::RouterTarget;
use crate::mv_state::{QuartzSyncResult, SourceEntry, StateStore};
use chrono::Utc;
use tracing::{info, warn};

pub struct QuartzSync<'a> {
    target: &'a RouterTarget,
    store: &'a dyn StateStore,
    scheduler: FetchScheduler,
}

impl<'a> QuartzSync<'a> {
    pub fn new(
        target: &'a RouterTarget,
        store: &'a dyn StateStore,
        scheduler: FetchScheduler,
    ) -> Self {
        Self {
            target,
            store,
            scheduler,
        }
    }

    /// Per-item read failures are collected; store failures abort the pass
    pub async fn run(&self, scope: &RefreshScope) -> Result<QuartzSyncResult> {
        let mut result = QuartzSyncResult::default();

        // Source names come from the output-name verb on this firmware
        let inputs = scope.inputs_within(self.target.max_inputs);
        info!(
            count = inputs.len(),
            workers = self.scheduler.workers(),
            "[Quartz Sync] Fetching source names"
        );

        let device = self.target.device.clone();
        let names = self
            .scheduler
            .run(inputs, |n| {
                let device = device.clone();
                async move { device.read_output_name(n).await }
            })
            .await;

        let mut failed = names.failed;
        failed.sort_by_key(|(n, _)| *n);
        for (n, e) in failed {
            warn!(input = n, error = %e, "[Quartz Sync] Source read failed");
            result.errors.push(format!("Source {}: {}", n, e));
        }

        let mut labels: Vec<_> = names.succeeded.into_iter().collect();
        labels.sort_by_key(|(n, _)| *n);
        for (input, label) in labels {
            self.store.upsert_source(&SourceEntry { input, label }).await?;
            result.sources_synced += 1;
        }
        info!(synced = result.sources_synced, "[Quartz Sync] Sources synced");

        let outputs = scope.outputs_within(self.target.max_outputs);
        info!(count = outputs.len(), "[Quartz Sync] Fetching routing");

        let device = self.target.device.clone();
        let routes = self
            .scheduler
            .run(outputs, |out| {
                let device = device.clone();
                async move { device.read_routing(out).await }
            })
            .await;

        let mut failed = routes.failed;
        failed.sort_by_key(|(out, _)| *out);
        for (out, e) in failed {
            warn!(output = out, error = %e, "[Quartz Sync] Routing read failed");
            result.errors.push(format!("Routing out {}: {}", out, e));
        }

        let mut assignments: Vec<_> = routes.succeeded.into_iter().collect();
        assignments.sort_by_key(|(out, _)| *out);
        let now = Utc::now();
        for (output, input) in assignments {
            self.store.upsert_routing(output, input, now).await?;
            result.routes_synced += 1;
        }
        info!(synced = result.routes_synced, "[Quartz Sync] Routes synced");

        Ok(result)
    }
}
