//! Local state store surface used by sync and push operations

use super::types::*;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Idempotent upsert-by-natural-key persistence plus the refresh lock row
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Fetch the unit with this chassis index, creating it (`MV {n+1}`,
    /// enabled) on first observation
    async fn ensure_multiviewer(&self, nexx_index: u32) -> Result<Multiviewer>;

    async fn get_multiviewer_by_index(&self, nexx_index: u32) -> Result<Option<Multiviewer>>;

    /// All known units, by chassis index
    async fn list_multiviewers(&self) -> Result<Vec<Multiviewer>>;

    async fn upsert_mv_settings(&self, mv_id: i64, settings: &MvSettings) -> Result<()>;

    async fn get_mv_settings(&self, mv_id: i64) -> Result<Option<MvSettings>>;

    async fn upsert_window_state(&self, mv_id: i64, state: &WindowState) -> Result<()>;

    async fn get_window_state(&self, mv_id: i64, window_index: u32) -> Result<Option<WindowState>>;

    async fn upsert_source(&self, entry: &SourceEntry) -> Result<()>;

    async fn upsert_routing(
        &self,
        output: u32,
        input: Option<u32>,
        at: DateTime<Utc>,
    ) -> Result<()>;

    async fn get_routing(&self, output: u32) -> Result<Option<RoutingEntry>>;

    /// Read the lock row; a missing row reads as idle
    async fn load_refresh_status(&self) -> Result<RefreshStatus>;

    /// Atomically check `claim` against the lock row and mark it running.
    /// Fails with `Conflict` or `Throttled` without writing anything.
    async fn try_begin_refresh(&self, claim: &RefreshClaim) -> Result<ClaimDecision>;

    /// Clear the running flag and store the result document
    async fn finish_refresh(
        &self,
        finished_at: DateTime<Utc>,
        result: &RefreshResult,
    ) -> Result<()>;
}
