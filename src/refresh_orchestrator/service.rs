//! Refresh Orchestrator
//!
//! ## Pass lifecycle
//! 1. Resolve devices; none configured fails before the lock is touched
//! 2. Take the persisted lock (conflict / throttle rejections write nothing)
//! 3. Run the NEXX and Quartz passes side by side
//! 4. Release the lock and store the result document on every exit path
//!
//! Steps 3 and 4 run on their own task, so a caller that stops waiting
//! (client disconnect, timeout) cannot strand the lock.

use super::nexx_sync::NexxSync;
use super::quartz_sync::QuartzSync;
use super::types::{RefreshRequest, RefreshScope, RefreshSettings};
use crate::error::{Error, Result};
use crate::fetch_scheduler::FetchScheduler;
use crate::integration::{DeviceProvider, DeviceSet};
use crate::mv_state::{RefreshClaim, RefreshResult, RefreshStatus, StateStore, SubResult};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Refresh Orchestrator
pub struct RefreshOrchestrator {
    store: Arc<dyn StateStore>,
    devices: Arc<dyn DeviceProvider>,
    settings: RefreshSettings,
}

impl RefreshOrchestrator {
    pub fn new(
        store: Arc<dyn StateStore>,
        devices: Arc<dyn DeviceProvider>,
        settings: RefreshSettings,
    ) -> Self {
        Self {
            store,
            devices,
            settings,
        }
    }

    pub fn settings(&self) -> &RefreshSettings {
        &self.settings
    }

    /// Run one pass
    pub async fn refresh(&self, request: RefreshRequest) -> Result<RefreshResult> {
        let devices = self.devices.devices().await?;
        if devices.is_empty() {
            return Err(Error::Configuration(
                "No integrations configured. Configure Quartz and/or NEXX first.".to_string(),
            ));
        }

        let started_at = Utc::now();
        let claim = RefreshClaim {
            started_by: request.started_by.clone(),
            started_at,
            cooldown: self.settings.cooldown,
            stale_after: self.settings.stale_after,
        };
        let decision = self.store.try_begin_refresh(&claim).await?;

        info!(
            started_by = %request.started_by,
            decision = ?decision,
            nexx = devices.nexx.is_some(),
            quartz = devices.quartz.is_some(),
            "Refresh started"
        );

        let pass = tokio::spawn(complete_pass(
            Arc::clone(&self.store),
            devices,
            request.scope,
            self.settings,
            started_at,
        ));
        pass.await
            .map_err(|e| Error::Internal(format!("Refresh pass aborted: {}", e)))?
    }

    /// Current lock row and last result (read only)
    pub async fn status(&self) -> Result<RefreshStatus> {
        self.store.load_refresh_status().await
    }

    /// Clear a lock left behind by a crashed pass
    pub async fn force_release(&self, released_by: &str) -> Result<RefreshStatus> {
        let status = self.store.load_refresh_status().await?;
        if !status.is_running {
            return Ok(status);
        }

        let now = Utc::now();
        let mut result = RefreshResult::new(now);
        result.errors.push(format!(
            "Refresh lock held by {} since {} was manually released by {}",
            status.started_by.as_deref().unwrap_or("unknown"),
            status
                .started_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "unknown time".to_string()),
            released_by
        ));

        self.store.finish_refresh(now, &result).await?;
        warn!(
            released_by = %released_by,
            previous_holder = ?status.started_by,
            "Refresh lock force-released"
        );

        self.store.load_refresh_status().await
    }
}

/// Run the pass, then release the lock with its result document
async fn complete_pass(
    store: Arc<dyn StateStore>,
    devices: DeviceSet,
    scope: RefreshScope,
    settings: RefreshSettings,
    started_at: DateTime<Utc>,
) -> Result<RefreshResult> {
    let result = run_pass(store.as_ref(), &devices, &scope, settings, started_at).await;

    let finished_at = Utc::now();
    if let Err(e) = store.finish_refresh(finished_at, &result).await {
        error!(error = %e, "Failed to release refresh lock");
        return Err(e);
    }

    info!(
        elapsed_ms = (finished_at - started_at).num_milliseconds(),
        errors = result.errors.len(),
        "Refresh finished"
    );
    Ok(result)
}

/// Never fails: integration errors and panics land in the document
async fn run_pass(
    store: &dyn StateStore,
    devices: &DeviceSet,
    scope: &RefreshScope,
    settings: RefreshSettings,
    started_at: DateTime<Utc>,
) -> RefreshResult {
    let scheduler = FetchScheduler::new(settings.quartz_workers);

    let nexx = async {
        let device = devices.nexx.as_ref()?;
        let sync = NexxSync::new(device.as_ref(), store);
        Some(guarded(sync.run(scope)).await)
    };
    let quartz = async {
        let target = devices.quartz.as_ref()?;
        let sync = QuartzSync::new(target, store, scheduler);
        Some(guarded(sync.run(scope)).await)
    };
    let (nexx, quartz) = tokio::join!(nexx, quartz);

    let mut errors = Vec::new();
    let nexx = nexx.map(|outcome| sub_result(outcome, "NEXX", &mut errors));
    let quartz = quartz.map(|outcome| sub_result(outcome, "Quartz", &mut errors));

    RefreshResult {
        timestamp: started_at,
        nexx,
        quartz,
        errors,
    }
}

fn sub_result<T>(outcome: Result<T>, name: &str, errors: &mut Vec<String>) -> SubResult<T> {
    match outcome {
        Ok(r) => SubResult::Completed(r),
        Err(e) => {
            error!(integration = name, error = %e, "Sync pass failed");
            errors.push(format!("{} error: {}", name, e));
            SubResult::Failed { error: e.to_string() }
        }
    }
}

/// Turn a panic inside a pass into an error
async fn guarded<T>(pass: impl Future<Output = Result<T>>) -> Result<T> {
    AssertUnwindSafe(pass)
        .catch_unwind()
        .await
        .unwrap_or_else(|_| Err(Error::Internal("Sync pass panicked".to_string())))
}
