//! In-process state store
//!
//! Same semantics as the MySQL repository; used by tests and by tools that
//! run a pass without a database.

use super::store::StateStore;
use super::types::*;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    multiviewers: Vec<Multiviewer>,
    settings: HashMap<i64, MvSettings>,
    windows: HashMap<(i64, u32), WindowState>,
    sources: HashMap<u32, SourceEntry>,
    routing: HashMap<u32, RoutingEntry>,
}

/// Memory-backed [`StateStore`]
#[derive(Default)]
pub struct MemoryStateStore {
    tables: RwLock<Tables>,
    refresh: tokio::sync::Mutex<RefreshStatus>,
    entity_writes: AtomicUsize,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a given lock row
    pub fn with_refresh_status(status: RefreshStatus) -> Self {
        Self {
            refresh: tokio::sync::Mutex::new(status),
            ..Self::default()
        }
    }

    /// Number of entity-table writes (lock row excluded)
    pub fn entity_writes(&self) -> usize {
        self.entity_writes.load(Ordering::SeqCst)
    }

    pub async fn multiviewers(&self) -> Vec<Multiviewer> {
        self.tables.read().await.multiviewers.clone()
    }

    pub async fn window_count(&self, mv_id: i64) -> usize {
        self.tables
            .read()
            .await
            .windows
            .keys()
            .filter(|(id, _)| *id == mv_id)
            .count()
    }

    pub async fn sources(&self) -> Vec<SourceEntry> {
        let mut sources: Vec<_> = self.tables.read().await.sources.values().cloned().collect();
        sources.sort_by_key(|s| s.input);
        sources
    }

    pub async fn routes(&self) -> Vec<RoutingEntry> {
        let mut routes: Vec<_> = self.tables.read().await.routing.values().cloned().collect();
        routes.sort_by_key(|r| r.output);
        routes
    }

    fn touch(&self) {
        self.entity_writes.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn ensure_multiviewer(&self, nexx_index: u32) -> Result<Multiviewer> {
        let mut tables = self.tables.write().await;
        if let Some(mv) = tables.multiviewers.iter().find(|m| m.nexx_index == nexx_index) {
            return Ok(mv.clone());
        }

        let mv = Multiviewer {
            id: tables.multiviewers.len() as i64 + 1,
            nexx_index,
            label: Multiviewer::default_label(nexx_index),
            enabled: true,
        };
        tables.multiviewers.push(mv.clone());
        self.touch();
        Ok(mv)
    }

    async fn get_multiviewer_by_index(&self, nexx_index: u32) -> Result<Option<Multiviewer>> {
        Ok(self
            .tables
            .read()
            .await
            .multiviewers
            .iter()
            .find(|m| m.nexx_index == nexx_index)
            .cloned())
    }

    async fn list_multiviewers(&self) -> Result<Vec<Multiviewer>> {
        let mut units = self.tables.read().await.multiviewers.clone();
        units.sort_by_key(|m| m.nexx_index);
        Ok(units)
    }

    async fn upsert_mv_settings(&self, mv_id: i64, settings: &MvSettings) -> Result<()> {
        self.tables.write().await.settings.insert(mv_id, settings.clone());
        self.touch();
        Ok(())
    }

    async fn get_mv_settings(&self, mv_id: i64) -> Result<Option<MvSettings>> {
        Ok(self.tables.read().await.settings.get(&mv_id).cloned())
    }

    async fn upsert_window_state(&self, mv_id: i64, state: &WindowState) -> Result<()> {
        self.tables
            .write()
            .await
            .windows
            .insert((mv_id, state.window_index), state.clone());
        self.touch();
        Ok(())
    }

    async fn get_window_state(&self, mv_id: i64, window_index: u32) -> Result<Option<WindowState>> {
        Ok(self
            .tables
            .read()
            .await
            .windows
            .get(&(mv_id, window_index))
            .cloned())
    }

    async fn upsert_source(&self, entry: &SourceEntry) -> Result<()> {
        self.tables
            .write()
            .await
            .sources
            .insert(entry.input, entry.clone());
        self.touch();
        Ok(())
    }

    async fn upsert_routing(
        &self,
        output: u32,
        input: Option<u32>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.tables.write().await.routing.insert(
            output,
            RoutingEntry {
                output,
                input,
                updated_at: at,
            },
        );
        self.touch();
        Ok(())
    }

    async fn get_routing(&self, output: u32) -> Result<Option<RoutingEntry>> {
        Ok(self.tables.read().await.routing.get(&output).cloned())
    }

    async fn load_refresh_status(&self) -> Result<RefreshStatus> {
        Ok(self.refresh.lock().await.clone())
    }

    async fn try_begin_refresh(&self, claim: &RefreshClaim) -> Result<ClaimDecision> {
        let mut status = self.refresh.lock().await;
        let decision = status.check_claim(claim)?;

        status.is_running = true;
        status.started_at = Some(claim.started_at);
        status.started_by = Some(claim.started_by.clone());
        Ok(decision)
    }

    async fn finish_refresh(
        &self,
        finished_at: DateTime<Utc>,
        result: &RefreshResult,
    ) -> Result<()> {
        let mut status = self.refresh.lock().await;
        status.is_running = false;
        status.finished_at = Some(finished_at);
        status.result = Some(result.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[tokio::test]
    async fn test_ensure_multiviewer_is_idempotent() {
        let store = MemoryStateStore::new();
        let a = store.ensure_multiviewer(4).await.unwrap();
        let b = store.ensure_multiviewer(4).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.label, "MV 5");
        assert_eq!(store.multiviewers().await.len(), 1);
    }

    #[tokio::test]
    async fn test_list_multiviewers_orders_by_chassis_index() {
        let store = MemoryStateStore::new();
        for index in [5, 0, 2] {
            store.ensure_multiviewer(index).await.unwrap();
        }

        let indices: Vec<u32> = store
            .list_multiviewers()
            .await
            .unwrap()
            .iter()
            .map(|m| m.nexx_index)
            .collect();
        assert_eq!(indices, vec![0, 2, 5]);
    }

    #[tokio::test]
    async fn test_fresh_store_reports_idle_lock() {
        let store = MemoryStateStore::new();
        let status = store.load_refresh_status().await.unwrap();
        assert_eq!(status, RefreshStatus::default());
        assert_eq!(store.entity_writes(), 0);
    }

    #[tokio::test]
    async fn test_routing_upsert_overwrites_by_output() {
        let store = MemoryStateStore::new();
        let now = Utc::now();
        store.upsert_routing(3, Some(10), now).await.unwrap();
        store.upsert_routing(3, None, now).await.unwrap();
        assert_eq!(store.routes().await.len(), 1);
        assert_eq!(store.get_routing(3).await.unwrap().unwrap().input, None);
    }

    #[tokio::test]
    async fn test_lock_round_trip() {
        let store = MemoryStateStore::new();
        let claim = RefreshClaim {
            started_by: "op".into(),
            started_at: Utc::now(),
            cooldown: chrono::Duration::seconds(60),
            stale_after: None,
        };

        store.try_begin_refresh(&claim).await.unwrap();
        assert!(store.load_refresh_status().await.unwrap().is_running);
        assert!(matches!(
            store.try_begin_refresh(&claim).await,
            Err(Error::Conflict(_))
        ));

        let finished = claim.started_at;
        store
            .finish_refresh(finished, &RefreshResult::new(claim.started_at))
            .await
            .unwrap();
        let status = store.load_refresh_status().await.unwrap();
        assert!(!status.is_running);
        assert!(status.result.is_some());
        assert_eq!(store.entity_writes(), 0);
    }
}
